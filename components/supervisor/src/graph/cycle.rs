//! Cycle detection over a proposed `blocked_by` graph.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::DependencyNode;

/// Replaces `id`'s blockers with `candidate_blockers` and searches for a cycle
/// through `id` in the resulting graph.
///
/// The whole candidate set is applied at once, so cycles that only appear
/// when several new edges combine are caught. Returns the cycle in traversal
/// order starting at `id`, without repeating `id` at the end.
#[must_use]
pub fn detect_cycle_with_all<N: DependencyNode>(
    id: &N::Id,
    candidate_blockers: &[N::Id],
    nodes: &[N],
) -> Option<Vec<N::Id>> {
    let mut adjacency: HashMap<&N::Id, &[N::Id]> = nodes
        .iter()
        .map(|n| (n.node_id(), n.blockers()))
        .collect();
    adjacency.insert(id, candidate_blockers);

    let path = search(id, &adjacency)?;
    debug!(node = %id, length = path.len(), "Cycle detected in proposed edges");
    Some(path.into_iter().cloned().collect())
}

/// Iterative depth-first search from `start` back to itself. Each frame holds
/// a node and the index of its next unexplored blocker; the frames on the
/// stack are the current path.
fn search<'a, Id: Eq + std::hash::Hash>(
    start: &'a Id,
    adjacency: &HashMap<&'a Id, &'a [Id]>,
) -> Option<Vec<&'a Id>> {
    let mut visited: HashSet<&Id> = HashSet::from([start]);
    let mut stack: Vec<(&Id, usize)> = vec![(start, 0)];

    while let Some((node, next_child)) = stack.last_mut() {
        let blockers = adjacency.get(*node).copied().unwrap_or_default();
        let Some(blocker) = blockers.get(*next_child) else {
            stack.pop();
            continue;
        };
        *next_child += 1;
        if blocker == start {
            return Some(stack.iter().map(|(n, _)| *n).collect());
        }
        if visited.insert(blocker) {
            stack.push((blocker, 0));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Task, TaskId};

    fn task(n: u64, blocked_by: &[u64]) -> Task {
        let mut t = Task::new(TaskId::from_sequence(n), format!("Task {n}")).unwrap();
        t.blocked_by = blocked_by.iter().map(|b| TaskId::from_sequence(*b)).collect();
        t
    }

    fn ids(ns: &[u64]) -> Vec<TaskId> {
        ns.iter().map(|n| TaskId::from_sequence(*n)).collect()
    }

    #[test]
    fn no_cycle_in_a_chain() {
        let tasks = vec![task(1, &[]), task(2, &[1]), task(3, &[2])];
        assert_eq!(detect_cycle_with_all(&ids(&[4])[0], &ids(&[3]), &tasks), None);
    }

    #[test]
    fn finds_transitive_cycle() {
        let tasks = vec![task(1, &[]), task(2, &[1]), task(3, &[2])];
        let path = detect_cycle_with_all(&ids(&[1])[0], &ids(&[3]), &tasks).unwrap();
        assert_eq!(path, ids(&[1, 3, 2]));
    }

    #[test]
    fn combined_edges_form_cycle_through_other_nodes() {
        // The unknown id 4 is a dead end; the edge to 2 closes 1 -> 2 -> 3 -> 1.
        let tasks = vec![task(1, &[]), task(2, &[3]), task(3, &[1])];
        let path = detect_cycle_with_all(&ids(&[1])[0], &ids(&[4, 2]), &tasks).unwrap();
        assert_eq!(path, ids(&[1, 2, 3]));
    }

    #[test]
    fn proposed_edges_replace_existing_ones() {
        // 1 currently waits on 2 and 2 on 1 would cycle, but the update drops 1 -> 2.
        let tasks = vec![task(1, &[2]), task(2, &[])];
        assert_eq!(detect_cycle_with_all(&ids(&[1])[0], &[], &tasks), None);
        let tasks = vec![task(1, &[]), task(2, &[1])];
        assert!(detect_cycle_with_all(&ids(&[1])[0], &ids(&[2]), &tasks).is_some());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let tasks = vec![task(1, &[]), task(2, &[1]), task(3, &[1]), task(4, &[2, 3])];
        assert_eq!(detect_cycle_with_all(&ids(&[5])[0], &ids(&[4, 2]), &tasks), None);
    }

    #[test]
    fn deep_chain_fits_a_worker_stack() {
        const DEPTH: u64 = 20_000;
        let handle = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(|| {
                let tasks: Vec<Task> = (1..=DEPTH)
                    .map(|n| if n == 1 { task(1, &[]) } else { task(n, &[n - 1]) })
                    .collect();

                let next = TaskId::from_sequence(DEPTH + 1);
                assert_eq!(detect_cycle_with_all(&next, &ids(&[DEPTH]), &tasks), None);

                let path = detect_cycle_with_all(&ids(&[1])[0], &ids(&[DEPTH]), &tasks).unwrap();
                assert_eq!(path.len(), usize::try_from(DEPTH).unwrap());
                assert_eq!(path[0], TaskId::from_sequence(1));
                assert_eq!(path[1], TaskId::from_sequence(DEPTH));
                assert_eq!(path[path.len() - 1], TaskId::from_sequence(2));
            })
            .unwrap();
        handle.join().unwrap();
    }
}
