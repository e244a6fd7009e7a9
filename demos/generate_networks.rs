use log::{Level, LevelFilter, Metadata, Record};

use phylonet_sim::augment::AugmentationMode;
use phylonet_sim::rates::{GrowthRule, RateFunction};
use phylonet_sim::{
    simulate_beta_splitting_network, simulate_heath_network, BetaSplittingConfig, HeathConfig,
    NetworkGraph, ReticulationModel,
};

struct MinimalLogger;

impl log::Log for MinimalLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if record.level() > Level::Warn {
            println!("{:<5} {}", record.level(), record.args())
        } else {
            eprintln!("{:<5} {}", record.level(), record.args())
        }
    }

    fn flush(&self) {}
}

static LOGGER: MinimalLogger = MinimalLogger;

fn print_edges(network: &NetworkGraph) {
    for e in network.edges() {
        if let Some(record) = network.edge(e) {
            println!(
                "{}\t{}\t{:?}\t{:.4}\t{:.4}",
                record.source.as_index(),
                record.target.as_index(),
                record.kind,
                network.time(record.source),
                network.time(record.target),
            );
        }
    }
}

// Usage: generate_networks [heath.json] [beta_splitting.json]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    log::set_logger(&LOGGER).map_err(|e| e.to_string())?;
    log::set_max_level(LevelFilter::Debug);

    let mut args = std::env::args().skip(1);
    let heath = match args.next() {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => HeathConfig {
            target_leaf_count: 8,
            extinction_rate: 0.2,
            reticulation: ReticulationModel::Hybridization {
                rate: RateFunction::Exponential {
                    rate: 0.3,
                    decay: 1.0,
                },
                growth: GrowthRule::default(),
            },
            seed: 42,
            ..Default::default()
        },
    };
    let beta = match args.next() {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => BetaSplittingConfig {
            leaf_count: 10,
            edge_count: 3,
            mode: AugmentationMode::Local,
            seed: 7,
            ..Default::default()
        },
    };

    let network = simulate_heath_network(&heath)?;
    println!("# birth-death network");
    print_edges(&network);

    let generated = simulate_beta_splitting_network(&beta)?;
    println!("# beta-splitting network");
    if let Some(warning) = generated.warning {
        println!("# {warning}");
    }
    print_edges(&generated.network);
    Ok(())
}
