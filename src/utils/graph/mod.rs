//! Graph abstractions shared by the IR and its analyses.
//!
//! The algorithms in [`algorithms`] only need to enumerate the edges of a
//! graph, so they are written against the small trait family defined here
//! rather than a concrete graph type. The IR [`Graph`](crate::ir::Graph)
//! implements these traits over its normal (non-exceptional) control-flow
//! edges.

pub mod algorithms;
mod node;

pub use node::NodeId;

/// A graph whose nodes can enumerate their successors.
pub trait Successors {
    /// Returns an upper bound on node indices (`NodeId::index() < node_count()`).
    fn node_count(&self) -> usize;

    /// Returns the successors of `node` in edge order.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_;
}

/// A graph whose nodes can also enumerate their predecessors.
pub trait Predecessors: Successors {
    /// Returns the predecessors of `node` in edge order.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_;
}

/// A graph with a distinguished entry node.
pub trait RootedGraph: Successors {
    /// Returns the entry node.
    fn entry(&self) -> NodeId;
}
