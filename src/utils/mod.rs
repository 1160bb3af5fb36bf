//! Utility data structures shared across the crate.
//!
//! - [`BitSet`] - dense bit vector used as a scoped visited set
//! - [`graph`] - graph traits and algorithms (traversal orders, dominators)

mod bitset;
pub mod graph;

pub use bitset::BitSet;
