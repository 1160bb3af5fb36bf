//! Graph algorithms used by IR construction and verification.
//!
//! - [`postorder`] / [`reverse_postorder`] - block visiting orders
//! - [`reachable`] - reachability from a node
//! - [`compute_dominators`] - dominator tree ([`DominatorTree`])

mod dominators;
mod traversal;

pub use dominators::{compute_dominators, DominatorTree};
pub use traversal::{postorder, reachable, reverse_postorder};
