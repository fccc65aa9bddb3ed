//! Dependency scheduling for stage graphs.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Returned when the dependency edges contain a cycle. Holds the lowest node
/// index that could not be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleError {
    pub node: usize,
}

/// Topologically order `deps.len()` nodes, where `deps[i]` lists the nodes
/// node `i` depends on. Dependencies come first; among nodes that are ready at
/// the same time the lowest index (earliest registration) wins, so identical
/// graphs always produce identical orders.
pub fn dependency_order(deps: &[Vec<usize>]) -> Result<Vec<usize>, CycleError> {
    let n = deps.len();
    let mut indeg: Vec<usize> = vec![0; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (node, node_deps) in deps.iter().enumerate() {
        let mut unique = node_deps.clone();
        unique.sort_unstable();
        unique.dedup();
        for dep in unique {
            indeg[node] += 1;
            dependents[dep].push(node);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = indeg
        .iter()
        .enumerate()
        .filter_map(|(i, d)| (*d == 0).then_some(Reverse(i)))
        .collect();
    let mut order: Vec<usize> = Vec::with_capacity(n);

    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &next in &dependents[node] {
            indeg[next] -= 1;
            if indeg[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() != n {
        let node = (0..n).find(|i| indeg[*i] > 0).unwrap_or(0);
        return Err(CycleError { node });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn chain_orders_dependencies_first() {
        // a(0) -> b(1) -> c(2), registered as a, b, c
        let deps = vec![vec![1], vec![2], vec![]];
        assert_eq!(dependency_order(&deps).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn independent_nodes_keep_registration_order() {
        let deps = vec![vec![], vec![], vec![], vec![]];
        assert_eq!(dependency_order(&deps).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn duplicate_edges_are_counted_once() {
        let deps = vec![vec![], vec![0, 0, 0]];
        assert_eq!(dependency_order(&deps).unwrap(), vec![0, 1]);
    }

    #[test]
    fn cycle_is_reported() {
        let deps = vec![vec![1], vec![0], vec![]];
        assert_eq!(dependency_order(&deps), Err(CycleError { node: 0 }));
    }

    fn dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
        // Random DAG over a random permutation so edges may point at later indices.
        (1usize..14)
            .prop_flat_map(|n| {
                (
                    Just(n),
                    Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
                    proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..4), n),
                )
            })
            .prop_map(|(n, perm, picks)| {
                let mut deps = vec![Vec::new(); n];
                for (rank, choices) in picks.iter().enumerate() {
                    if rank == 0 {
                        continue;
                    }
                    let node = perm[rank];
                    for pick in choices {
                        deps[node].push(perm[pick.index(rank)]);
                    }
                }
                deps
            })
    }

    proptest! {
        #[test]
        fn order_is_topological_and_deterministic(deps in dag()) {
            let order = dependency_order(&deps).unwrap();
            prop_assert_eq!(order.len(), deps.len());

            let mut position = vec![0usize; deps.len()];
            for (pos, node) in order.iter().enumerate() {
                position[*node] = pos;
            }
            for (node, node_deps) in deps.iter().enumerate() {
                for dep in node_deps {
                    prop_assert!(position[*dep] < position[node]);
                }
            }

            prop_assert_eq!(dependency_order(&deps).unwrap(), order);
        }

        #[test]
        fn first_scheduled_node_is_lowest_root(deps in dag()) {
            let order = dependency_order(&deps).unwrap();
            let lowest_root = (0..deps.len()).find(|i| deps[*i].is_empty()).unwrap();
            prop_assert_eq!(order[0], lowest_root);
        }
    }
}
