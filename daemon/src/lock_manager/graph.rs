//! Wait-for graph cycle detection: a plain DFS over `(waiter, holder)`
//! edges, keyed by owner identifier rather than `(owner, resource)` pairs.
//! An owner stuck waiting on two different resources held by the same
//! cycle collapses to one graph node, which is an intentional
//! simplification — it can only make the detector more eager, never miss
//! a real cycle.

use std::collections::{HashMap, HashSet};

/// Returns the first cycle found as a list of owner ids, starting at the
/// node where the DFS re-entered an in-progress path, or `None` if the
/// graph is acyclic.
pub fn detect_cycle(edges: &[(String, String)]) -> Option<Vec<String>> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in edges {
        adjacency.entry(from.as_str()).or_default().push(to.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: Vec<&str> = Vec::new();
    let mut on_stack_set: HashSet<&str> = HashSet::new();

    let nodes: HashSet<&str> = adjacency
        .keys()
        .copied()
        .chain(edges.iter().map(|(_, to)| to.as_str()))
        .collect();

    for start in nodes {
        if visited.contains(start) {
            continue;
        }
        if let Some(cycle) = dfs(start, &adjacency, &mut visited, &mut on_stack, &mut on_stack_set) {
            return Some(cycle.into_iter().map(str::to_string).collect());
        }
    }
    None
}

fn dfs<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    on_stack: &mut Vec<&'a str>,
    on_stack_set: &mut HashSet<&'a str>,
) -> Option<Vec<&'a str>> {
    visited.insert(node);
    on_stack.push(node);
    on_stack_set.insert(node);

    if let Some(neighbors) = adjacency.get(node) {
        for &neighbor in neighbors {
            if on_stack_set.contains(neighbor) {
                let start = on_stack.iter().position(|&n| n == neighbor).unwrap();
                return Some(on_stack[start..].to_vec());
            }
            if !visited.contains(neighbor) {
                if let Some(cycle) = dfs(neighbor, adjacency, visited, on_stack, on_stack_set) {
                    return Some(cycle);
                }
            }
        }
    }

    on_stack.pop();
    on_stack_set.remove(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acyclic_graph_reports_no_cycle() {
        let edges = vec![("a".to_string(), "b".to_string()), ("b".to_string(), "c".to_string())];
        assert!(detect_cycle(&edges).is_none());
    }

    #[test]
    fn direct_two_node_cycle_is_detected() {
        let edges = vec![("a".to_string(), "b".to_string()), ("b".to_string(), "a".to_string())];
        let cycle = detect_cycle(&edges).unwrap();
        assert_eq!(cycle.len(), 2);
        assert!(cycle.contains(&"a".to_string()));
        assert!(cycle.contains(&"b".to_string()));
    }

    #[test]
    fn longer_cycle_across_three_nodes_is_detected() {
        let edges = vec![
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "c".to_string()),
            ("c".to_string(), "a".to_string()),
        ];
        let cycle = detect_cycle(&edges).unwrap();
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn disjoint_acyclic_component_does_not_mask_a_cycle_elsewhere() {
        let edges = vec![
            ("x".to_string(), "y".to_string()),
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "a".to_string()),
        ];
        assert!(detect_cycle(&edges).is_some());
    }
}
