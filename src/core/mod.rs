//! Core deterministic primitives.
//!
//! Seeded randomness and state hashing shared by the coordinator and its
//! replicas.

pub mod rng;
pub mod hash;

// Re-export core types
pub use rng::DeterministicRng;
pub use hash::{StateHash, StateHasher, compute_state_hash};
