//! Depth-first orderings.
//!
//! - [`postorder`] - every node after all of its DFS descendants
//! - [`reverse_postorder`] - every node before its successors along forward edges
//!
//! Both return collected vectors since the order needs the full traversal anyway.
//! Only nodes reachable from `start` are included.

use crate::utils::graph::{NodeId, Successors};

#[derive(Clone, Copy)]
enum Visit {
    Enter,
    Exit,
}

/// Computes the postorder of the nodes reachable from `start`.
///
/// Successors are explored in the order the graph yields them. Edges to node ids
/// outside the graph are ignored.
///
/// # Complexity
///
/// - Time: O(V + E)
/// - Space: O(V)
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }

    let mut visited = vec![false; node_count];
    let mut result = Vec::with_capacity(node_count);
    let mut stack = vec![(start, Visit::Enter)];

    while let Some((node, visit)) = stack.pop() {
        match visit {
            Visit::Enter => {
                if visited[node.index()] {
                    continue;
                }
                visited[node.index()] = true;
                stack.push((node, Visit::Exit));

                let successors: Vec<NodeId> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if succ.index() < node_count && !visited[succ.index()] {
                        stack.push((succ, Visit::Enter));
                    }
                }
            }
            Visit::Exit => result.push(node),
        }
    }

    result
}

/// Computes the reverse postorder of the nodes reachable from `start`.
///
/// In reverse postorder a block comes before every block it reaches through a
/// forward edge, which is the order definitions have to be visited in when
/// checking that they dominate their uses.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}
