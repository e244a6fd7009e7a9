// This module encapsulates the bitflags API
// so that we don't leak details that may
// affect semver later on.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    struct SimulationBitFlags: u32 {
        const EMPTY = 0;
        const KEEP_EXTINCT_LINEAGES = 1 << 1;
        const STEM_START = 1 << 2;
    }
}

/// Options for the birth-death simulation.
///
/// The default returns the reconstructed network of a run started
/// from a crown (two lineages leaving the root).
#[repr(transparent)]
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationOptions(SimulationBitFlags);

impl SimulationOptions {
    /// Return the complete network, extinct tips included.
    pub fn with_keep_extinct_lineages(self) -> Self {
        Self(self.0 | SimulationBitFlags::KEEP_EXTINCT_LINEAGES)
    }

    /// Start from a single lineage below the root.
    pub fn with_stem_start(self) -> Self {
        Self(self.0 | SimulationBitFlags::STEM_START)
    }

    pub fn keep_extinct_lineages(&self) -> bool {
        self.0.contains(SimulationBitFlags::KEEP_EXTINCT_LINEAGES)
    }

    pub fn stem_start(&self) -> bool {
        self.0.contains(SimulationBitFlags::STEM_START)
    }
}

#[cfg(test)]
mod test_simulation_flags {
    use super::SimulationOptions;

    #[test]
    fn test_default_is_empty() {
        let flags = SimulationOptions::default();
        assert!(!flags.keep_extinct_lineages());
        assert!(!flags.stem_start());
    }

    #[test]
    fn test_keep_extinct() {
        let flags = SimulationOptions::default().with_keep_extinct_lineages();
        assert!(flags.keep_extinct_lineages());
        assert!(!flags.stem_start());
    }

    #[test]
    fn test_combined() {
        let flags = SimulationOptions::default()
            .with_stem_start()
            .with_keep_extinct_lineages();
        assert!(flags.keep_extinct_lineages());
        assert!(flags.stem_start());
    }
}
