//! Dominator tree computation.
//!
//! A node `d` **dominates** `n` if every path from the entry to `n` passes
//! through `d`. The immediate dominator of `n` is its closest strict dominator;
//! linking every node to its immediate dominator forms the dominator tree.
//!
//! # Algorithm
//!
//! The iterative scheme of Cooper, Harvey and Kennedy ("A Simple, Fast
//! Dominance Algorithm"): nodes are processed in reverse postorder and each
//! node's dominator is the intersection of its processed predecessors'
//! dominators, walking up the partially built tree by postorder number. The
//! graphs built from bytecode methods are small and mostly reducible, where
//! the scheme converges in two or three sweeps.

use crate::utils::graph::{
    algorithms::traversal::reverse_postorder, NodeId, Predecessors, RootedGraph,
};

/// Result of dominator tree computation.
///
/// Nodes unreachable from the entry have no immediate dominator and dominate
/// nothing.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// The entry (root) node of the dominator tree
    entry: NodeId,
    /// Immediate dominator per node; the entry maps to itself
    idom: Vec<Option<NodeId>>,
    /// Depth in the dominator tree per reachable node
    depth: Vec<usize>,
}

impl DominatorTree {
    /// Returns the entry (root) node of the dominator tree.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the immediate dominator of a node, or `None` for the entry node
    /// and for unreachable nodes.
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.entry {
            return None;
        }
        self.idom.get(node.index()).copied().flatten()
    }

    /// Returns `true` if `node` is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        matches!(self.idom.get(node.index()), Some(Some(_)))
    }

    /// Returns `true` if `a` dominates `b`. Every reachable node dominates itself.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut current = b;
        while self.depth[current.index()] > self.depth[a.index()] {
            match self.immediate_dominator(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        current == a
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns the depth of `node` in the tree (the entry has depth 0).
    #[must_use]
    pub fn depth(&self, node: NodeId) -> usize {
        self.depth.get(node.index()).copied().unwrap_or(0)
    }

    /// Returns the nodes immediately dominated by `node`, in index order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        (0..self.idom.len())
            .map(NodeId::new)
            .filter(|&n| n != self.entry && self.idom[n.index()] == Some(node))
            .collect()
    }

    /// Returns the number of node slots in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.idom.len()
    }
}

/// Computes the dominator tree of `graph` rooted at its entry node.
pub fn compute_dominators<G>(graph: &G) -> DominatorTree
where
    G: Predecessors + RootedGraph,
{
    let entry = graph.entry();
    let node_count = graph.node_count();
    let rpo = reverse_postorder(graph, entry);

    // Postorder number per node; unreachable nodes stay at usize::MAX.
    let mut po_number = vec![usize::MAX; node_count];
    for (i, node) in rpo.iter().enumerate() {
        po_number[node.index()] = rpo.len() - 1 - i;
    }

    let mut idom: Vec<Option<NodeId>> = vec![None; node_count];
    if entry.index() < node_count {
        idom[entry.index()] = Some(entry);
    }

    let intersect = |idom: &[Option<NodeId>], mut a: NodeId, mut b: NodeId| -> NodeId {
        while a != b {
            while po_number[a.index()] < po_number[b.index()] {
                a = idom[a.index()].unwrap_or(entry);
            }
            while po_number[b.index()] < po_number[a.index()] {
                b = idom[b.index()].unwrap_or(entry);
            }
        }
        a
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &node in rpo.iter().skip(1) {
            let mut new_idom: Option<NodeId> = None;
            for pred in graph.predecessors(node) {
                if pred.index() >= node_count || idom[pred.index()].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(&idom, pred, current),
                });
            }
            if new_idom.is_some() && idom[node.index()] != new_idom {
                idom[node.index()] = new_idom;
                changed = true;
            }
        }
    }

    let mut depth = vec![0; node_count];
    for &node in rpo.iter().skip(1) {
        if let Some(parent) = idom[node.index()] {
            depth[node.index()] = depth[parent.index()] + 1;
        }
    }

    DominatorTree { entry, idom, depth }
}
