//! Compiler configuration
//!
//! All knobs recognized by the pipeline. Deserializable so embedders can
//! read them straight from a config file.

use serde::Deserialize;

/// Dispatcher shape emitted around the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherKind {
    /// Flat switch over the state variable
    #[default]
    Switch,
    /// Recursive if/else search tree
    Bst,
    /// Salted hierarchical bucket tree
    Cluster,
    /// Alias states, trampolines and a three-way split state variable
    Chaos,
}

/// Which opaque predicate families are eligible
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpaqueLevel {
    /// Math congruences only
    #[default]
    Low,
    /// + array aliasing
    Medium,
    /// + VM-state-history LCG and timing checks
    High,
}

/// Compiler options
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Skip string concealment; the pool stores plaintext
    pub no_encryption: bool,

    /// Enable opaque predicate injection
    pub opaque_predicates: bool,

    /// Which predicate kinds are eligible
    pub opaque_level: OpaqueLevel,

    /// Per-injection-point insertion probability
    pub opaque_prob: f64,

    /// Map logical state ids to random 32-bit ints and fuzz numeric literals
    pub state_randomization: bool,

    /// Dispatcher shape
    pub dispatcher: DispatcherKind,

    /// Upper bound on ops per merged superblock (>= 2)
    pub max_superblock_size: usize,

    /// Disable the IR optimizer entirely
    pub no_optimize: bool,

    /// RNG seed; fixed seed makes compilation byte-reproducible
    pub seed: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            no_encryption: false,
            opaque_predicates: false,
            opaque_level: OpaqueLevel::Low,
            opaque_prob: 0.5,
            state_randomization: false,
            dispatcher: DispatcherKind::Switch,
            max_superblock_size: 8,
            no_optimize: false,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = Options::default();
        assert!(!opts.no_encryption);
        assert_eq!(opts.dispatcher, DispatcherKind::Switch);
        assert!(opts.max_superblock_size >= 2);
    }

    #[test]
    fn test_deserialize_partial() {
        let opts: Options =
            serde_json::from_str(r#"{"dispatcher": "chaos", "opaqueLevel": "high"}"#).unwrap();
        assert_eq!(opts.dispatcher, DispatcherKind::Chaos);
        assert_eq!(opts.opaque_level, OpaqueLevel::High);
        assert!(!opts.state_randomization);
    }

    #[test]
    fn test_opaque_level_ordering() {
        assert!(OpaqueLevel::Low < OpaqueLevel::Medium);
        assert!(OpaqueLevel::Medium < OpaqueLevel::High);
    }
}
