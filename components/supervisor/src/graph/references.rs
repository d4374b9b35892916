//! Free-text task mentions (`TASK-NNN`) and the derived `referenced_by` field.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{Task, TaskId};

static TASK_REFERENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bTASK-\d{3,}\b").ok());

/// Extracts unique task ids mentioned in `text`, in order of first appearance.
#[must_use]
pub fn detect_task_references(text: &str) -> Vec<TaskId> {
    let Some(pattern) = TASK_REFERENCE.as_ref() else {
        return Vec::new();
    };
    let mut found: Vec<TaskId> = Vec::new();
    for m in pattern.find_iter(text) {
        if let Ok(id) = TaskId::new(m.as_str()) {
            if !found.contains(&id) {
                found.push(id);
            }
        }
    }
    found
}

/// Returns the tasks whose title or description mention `id`, excluding `id`
/// itself and tasks that already relate to it through `blocked_by` or
/// `related_to`. Sorted.
#[must_use]
pub fn referenced_by(id: &TaskId, tasks: &[Task]) -> Vec<TaskId> {
    let mut referrers: Vec<TaskId> = tasks
        .iter()
        .filter(|t| &t.id != id && mentions_implicitly(t, id))
        .map(|t| t.id.clone())
        .collect();
    referrers.sort();
    referrers
}

/// Builds `referenced_by` for every mentioned task in one pass over the snapshot.
pub(super) fn referenced_by_index(tasks: &[Task]) -> HashMap<TaskId, Vec<TaskId>> {
    let mut index: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for task in tasks {
        for mentioned in detect_task_references(&task.searchable_text()) {
            if mentioned == task.id
                || task.blocked_by.contains(&mentioned)
                || task.related_to.contains(&mentioned)
            {
                continue;
            }
            index.entry(mentioned).or_default().push(task.id.clone());
        }
    }
    for referrers in index.values_mut() {
        referrers.sort();
    }
    index
}

fn mentions_implicitly(task: &Task, id: &TaskId) -> bool {
    !task.blocked_by.contains(id)
        && !task.related_to.contains(id)
        && detect_task_references(&task.searchable_text()).contains(id)
}
