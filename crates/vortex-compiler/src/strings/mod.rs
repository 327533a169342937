//! String concealment engine
//!
//! The collector gathers every string the emitted program will need into
//! a pool; the concealer turns each one into a seeded wave-transform
//! payload the emitted decoder can invert.

pub mod conceal;
pub mod pool;

pub use conceal::{conceal, conceal_with_seed, decode_payload, SEED_LEN};
pub use pool::{StringPool, GENERATOR_SENTINEL, RESERVED_RUNTIME_NAMES};
