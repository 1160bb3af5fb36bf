//! Depth-first orderings.
//!
//! Both traversals use an explicit stack of `(node, next successor position)`
//! frames, so arbitrarily deep control flow cannot overflow the native stack.

use crate::utils::{graph::NodeId, graph::Successors, BitSet};

/// Computes the postorder of nodes reachable from `start`.
///
/// Successors are explored in edge order. Returns an empty vector when `start`
/// is out of range.
///
/// # Examples
///
/// ```rust,ignore
/// // a -> b -> c
/// let order = postorder(&graph, a);
/// assert_eq!(order, vec![c, b, a]);
/// ```
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }

    let mut visited = BitSet::new(node_count);
    let mut order = Vec::with_capacity(node_count);
    let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();

    visited.insert(start.index());
    stack.push((start, graph.successors(start).collect(), 0));

    while let Some((node, succs, cursor)) = stack.last_mut() {
        if let Some(&next) = succs.get(*cursor) {
            *cursor += 1;
            if next.index() < node_count && visited.insert(next.index()) {
                let next_succs = graph.successors(next).collect();
                stack.push((next, next_succs, 0));
            }
        } else {
            order.push(*node);
            stack.pop();
        }
    }

    order
}

/// Computes the reverse postorder of nodes reachable from `start`.
///
/// In reverse postorder every node precedes its successors except along back
/// edges, which makes it the natural visiting order for forward dataflow and
/// for single-pass SSA construction.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut order = postorder(graph, start);
    order.reverse();
    order
}

/// Returns the set of node indices reachable from `start`, `start` included.
pub fn reachable<G: Successors>(graph: &G, start: NodeId) -> BitSet {
    let mut visited = BitSet::new(graph.node_count());
    if start.index() >= graph.node_count() {
        return visited;
    }
    let mut worklist = vec![start];
    visited.insert(start.index());
    while let Some(node) = worklist.pop() {
        for succ in graph.successors(node) {
            if visited.insert(succ.index()) {
                worklist.push(succ);
            }
        }
    }
    visited
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::graph::{Predecessors, RootedGraph};

    /// Adjacency-list graph used by the algorithm tests.
    pub(crate) struct TestGraph {
        succs: Vec<Vec<NodeId>>,
    }

    impl TestGraph {
        pub(crate) fn new(edges: &[(usize, usize)], nodes: usize) -> Self {
            let mut succs = vec![Vec::new(); nodes];
            for &(from, to) in edges {
                succs[from].push(NodeId::new(to));
            }
            Self { succs }
        }
    }

    impl Successors for TestGraph {
        fn node_count(&self) -> usize {
            self.succs.len()
        }

        fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
            self.succs[node.index()].iter().copied()
        }
    }

    impl Predecessors for TestGraph {
        fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
            self.succs
                .iter()
                .enumerate()
                .flat_map(move |(from, succs)| {
                    succs
                        .iter()
                        .filter(move |&&s| s == node)
                        .map(move |_| NodeId::new(from))
                })
        }
    }

    impl RootedGraph for TestGraph {
        fn entry(&self) -> NodeId {
            NodeId::new(0)
        }
    }

    fn ids(raw: &[usize]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId::new).collect()
    }

    #[test]
    fn test_postorder_linear() {
        let graph = TestGraph::new(&[(0, 1), (1, 2)], 3);
        assert_eq!(postorder(&graph, NodeId::new(0)), ids(&[2, 1, 0]));
    }

    #[test]
    fn test_reverse_postorder_diamond() {
        let graph = TestGraph::new(&[(0, 1), (0, 2), (1, 3), (2, 3)], 4);
        let rpo = reverse_postorder(&graph, NodeId::new(0));
        assert_eq!(rpo.first(), Some(&NodeId::new(0)));
        assert_eq!(rpo.last(), Some(&NodeId::new(3)));
        assert_eq!(rpo.len(), 4);
    }

    #[test]
    fn test_reverse_postorder_loop_header_first() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3
        let graph = TestGraph::new(&[(0, 1), (1, 2), (2, 1), (1, 3)], 4);
        let rpo = reverse_postorder(&graph, NodeId::new(0));
        let pos = |n: usize| rpo.iter().position(|&x| x == NodeId::new(n)).unwrap();
        assert!(pos(1) < pos(2));
        assert!(pos(1) < pos(3));
    }

    #[test]
    fn test_reachable_skips_orphans() {
        let graph = TestGraph::new(&[(0, 1), (2, 1)], 3);
        let seen = reachable(&graph, NodeId::new(0));
        assert!(seen.contains(0) && seen.contains(1));
        assert!(!seen.contains(2));
    }

    #[test]
    fn test_invalid_start() {
        let graph = TestGraph::new(&[], 1);
        assert!(postorder(&graph, NodeId::new(5)).is_empty());
    }
}
