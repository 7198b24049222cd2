// src/watch/dag_filter.rs

//! DAG-aware filtering logic for watch events.

use std::collections::{HashMap, HashSet};

/// Return true if some other task in `matching_names` depends on `task`,
/// directly or transitively.
///
/// Dependencies are followed via the `after = [...]` lists encoded in
/// `dep_map`.
pub fn has_dependent_in_matching(
    task: &str,
    matching_names: &HashSet<String>,
    dep_map: &HashMap<String, Vec<String>>,
) -> bool {
    matching_names
        .iter()
        .filter(|m| m.as_str() != task)
        .any(|m| depends_on(m, task, dep_map))
}

/// Walk the dependencies of `from` looking for `target`.
fn depends_on(from: &str, target: &str, dep_map: &HashMap<String, Vec<String>>) -> bool {
    let mut stack: Vec<&str> = dep_map
        .get(from)
        .map(|deps| deps.iter().map(String::as_str).collect())
        .unwrap_or_default();
    let mut visited: HashSet<&str> = HashSet::new();

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        if current == target {
            return true;
        }
        if let Some(deps) = dep_map.get(current) {
            stack.extend(deps.iter().map(String::as_str));
        }
    }

    false
}
