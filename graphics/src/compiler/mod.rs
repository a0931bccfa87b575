//! Frame graph compilation.
//!
//! Orders the dense vertex IDs of one graph level (passes or nodes) so that
//! for every edge `from -> to`, `from` comes first. The sort is a depth-first
//! post-order over every unvisited vertex in ID order, reversed. Vertices are
//! colored unvisited / in-progress / done; reaching an in-progress vertex is a
//! back edge and therefore a cycle.
//!
//! # Example
//!
//! ```
//! use ironframe_graphics::compiler::topological_sort;
//!
//! // 0 -> 1, 0 -> 2, 2 -> 1
//! let order = topological_sort(&[vec![1, 2], vec![], vec![1]]).unwrap();
//! assert_eq!(order, vec![0, 2, 1]);
//! ```

use thiserror::Error;

/// Errors raised while building a frame graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The edge `from -> to` closes a cycle.
    #[error("cyclic dependency: edge '{from}' -> '{to}' closes a cycle")]
    CyclicDependency { from: String, to: String },

    #[error("unknown pass '{0}'")]
    UnknownPass(String),

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    /// A node edge runs against the pass order.
    #[error(
        "node edge '{from}' -> '{to}' runs from pass '{from_pass}' to earlier pass '{to_pass}'"
    )]
    CrossPassOrderViolation {
        from: String,
        to: String,
        from_pass: String,
        to_pass: String,
    },

    #[error("pass '{0}' is already registered")]
    DuplicatePass(String),

    #[error("node '{0}' is already registered")]
    DuplicateNode(String),

    /// Registration or setup on a graph that was already set up.
    #[error("frame graph is already built; call clear() before registering again")]
    AlreadyBuilt,

    #[error("frame graph has not been set up")]
    NotBuilt,
}

/// An edge that reaches a vertex still on the DFS stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackEdge {
    pub from: usize,
    pub to: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Topologically sort `adjacency`, where `adjacency[v]` lists the targets of
/// edges leaving `v`.
///
/// Targets must be valid vertex IDs.
pub fn topological_sort(adjacency: &[Vec<usize>]) -> Result<Vec<usize>, BackEdge> {
    let n = adjacency.len();
    let mut marks = vec![Mark::Unvisited; n];
    let mut post_order = Vec::with_capacity(n);
    // (vertex, index of the next outgoing edge to follow)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::InProgress;
        stack.push((root, 0));

        while let Some(top) = stack.last_mut() {
            let vertex = top.0;
            match adjacency[vertex].get(top.1) {
                Some(&target) => {
                    top.1 += 1;
                    match marks[target] {
                        Mark::Unvisited => {
                            marks[target] = Mark::InProgress;
                            stack.push((target, 0));
                        }
                        Mark::InProgress => {
                            return Err(BackEdge {
                                from: vertex,
                                to: target,
                            });
                        }
                        Mark::Done => {}
                    }
                }
                None => {
                    marks[vertex] = Mark::Done;
                    post_order.push(vertex);
                    stack.pop();
                }
            }
        }
    }

    post_order.reverse();
    Ok(post_order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_respects(order: &[usize], adjacency: &[Vec<usize>]) {
        let position = |v: usize| order.iter().position(|&x| x == v).unwrap();
        for (from, targets) in adjacency.iter().enumerate() {
            for &to in targets {
                assert!(
                    position(from) < position(to),
                    "edge {from} -> {to} violated by {order:?}"
                );
            }
        }
    }

    #[test]
    fn empty_graph() {
        assert_eq!(topological_sort(&[]).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn independent_vertices_reverse_registration() {
        // Reversed post-order visits later roots first.
        assert_eq!(topological_sort(&[vec![], vec![], vec![]]).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn chain() {
        let adjacency = vec![vec![1], vec![2], vec![]];
        assert_eq!(topological_sort(&adjacency).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn edges_against_registration_order() {
        let adjacency = vec![vec![], vec![0], vec![1]];
        assert_eq!(topological_sort(&adjacency).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn diamond() {
        let adjacency = vec![vec![1, 2], vec![3], vec![3], vec![]];
        let order = topological_sort(&adjacency).unwrap();
        assert_eq!(order.len(), 4);
        assert_respects(&order, &adjacency);
    }

    #[test]
    fn duplicate_edges_are_harmless() {
        let adjacency = vec![vec![1, 1, 1], vec![]];
        assert_eq!(topological_sort(&adjacency).unwrap(), vec![0, 1]);
    }

    #[test]
    fn cycle_reports_back_edge() {
        let adjacency = vec![vec![1], vec![2], vec![0]];
        assert_eq!(
            topological_sort(&adjacency),
            Err(BackEdge { from: 2, to: 0 })
        );
    }

    #[test]
    fn self_loop() {
        let adjacency = vec![vec![], vec![1]];
        assert_eq!(
            topological_sort(&adjacency),
            Err(BackEdge { from: 1, to: 1 })
        );
    }

    #[test]
    fn pseudo_random_dags() {
        // Edges only go from lower to higher IDs, so every graph is acyclic.
        let mut seed = 0x2545_f491_u32;
        for n in 1..24 {
            let adjacency: Vec<Vec<usize>> = (0..n)
                .map(|from| {
                    (from + 1..n)
                        .filter(|_| {
                            seed ^= seed << 13;
                            seed ^= seed >> 17;
                            seed ^= seed << 5;
                            seed % 3 == 0
                        })
                        .collect()
                })
                .collect();
            let order = topological_sort(&adjacency).unwrap();
            assert_eq!(order.len(), n);
            assert_respects(&order, &adjacency);
        }
    }

    #[test]
    fn error_display_names_edge() {
        let err = GraphError::CyclicDependency {
            from: "shadow".into(),
            to: "gbuffer".into(),
        };
        assert_eq!(
            err.to_string(),
            "cyclic dependency: edge 'shadow' -> 'gbuffer' closes a cycle"
        );
    }
}
