//! Todo list validation.
//!
//! Validators are advisory: each returns the first problem it finds as a
//! [`ValidationError`] whose `Display` text tells the model what is wrong and
//! how to fix it. Callers surface that text as a tool error; nothing here
//! panics or mutates.
//!
//! Dependencies and blocking are evaluated per sibling list: top-level items
//! against top-level items, and each parent's subtasks against each other.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::graph::DependencyGraph;
use crate::types::TodoItem;

/// Why a proposed todo list was rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Two items share an id.
    #[error(
        "Todo id \"{id}\" is used more than once. Give every todo and subtask its own id."
    )]
    DuplicateId {
        /// Repeated id.
        id: String,
    },
    /// A dependency names an id that is not in the same list.
    #[error(
        "Todo \"{id}\" depends on \"{dependency}\", which is not in the list. Add \"{dependency}\" or remove the dependency."
    )]
    MissingDependency {
        /// Item carrying the dependency.
        id: String,
        /// Unknown id.
        dependency: String,
    },
    /// Dependencies form a cycle.
    #[error(
        "Circular dependency: {}. Remove one of these dependencies so the chain has a starting point.",
        .path.join(" -> ")
    )]
    CircularDependency {
        /// Ids along the cycle, first id repeated at the end.
        path: Vec<String>,
    },
    /// A subtask has subtasks of its own.
    #[error(
        "Subtask \"{id}\" of \"{parent}\" has its own subtasks. Subtasks can only be one level deep; move them up into \"{parent}\"."
    )]
    SubtaskTooDeep {
        /// Top-level parent.
        parent: String,
        /// Offending subtask.
        id: String,
    },
    /// An in-progress item has unfinished dependencies.
    #[error(
        "Todo \"{id}\" cannot be in_progress: it depends on {}, which must complete first. Set \"{id}\" to pending or finish its dependencies.",
        quote_list(.blockers)
    )]
    InProgressBlocked {
        /// Blocked item.
        id: String,
        /// Dependencies not yet completed.
        blockers: Vec<String>,
    },
    /// More than one top-level item is in progress.
    #[error(
        "Only one todo may be in_progress at a time, but {} are: {}. Keep one in_progress and set the others to pending.",
        .ids.len(),
        quote_list(.ids)
    )]
    MultipleInProgress {
        /// Items marked in progress.
        ids: Vec<String>,
    },
    /// A parent with unfinished subtasks does not have exactly one in progress.
    #[error(
        "Todo \"{parent}\" has unfinished subtasks, so exactly one of them must be in_progress (found {in_progress}). Mark the subtask you are working on as in_progress."
    )]
    SubtaskInProgress {
        /// Parent item.
        parent: String,
        /// How many subtasks are in progress.
        in_progress: usize,
    },
}

fn quote_list(ids: &[String]) -> String {
    ids.iter()
        .map(|id| format!("\"{id}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ids in `items` with at least one dependency that is not completed.
///
/// A dependency missing from the list counts as not completed.
#[must_use]
pub fn blocked_ids(items: &[TodoItem]) -> HashSet<String> {
    let completed: HashSet<&str> = items
        .iter()
        .filter(|i| i.is_completed())
        .map(|i| i.id.as_str())
        .collect();
    items
        .iter()
        .filter(|i| i.dependencies.iter().any(|d| !completed.contains(d.as_str())))
        .map(|i| i.id.clone())
        .collect()
}

/// No two items, subtasks included, share an id.
pub fn validate_unique_ids(items: &[TodoItem]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    let all = items.iter().flat_map(|item| std::iter::once(item).chain(&item.subtasks));
    for item in all {
        if !seen.insert(item.id.as_str()) {
            return Err(ValidationError::DuplicateId { id: item.id.clone() });
        }
    }
    Ok(())
}

/// Every dependency resolves within its sibling list and there is no cycle.
pub fn validate_dependencies(items: &[TodoItem]) -> Result<(), ValidationError> {
    check_dependency_list(items)?;
    items
        .iter()
        .try_for_each(|item| check_dependency_list(&item.subtasks))
}

fn check_dependency_list(items: &[TodoItem]) -> Result<(), ValidationError> {
    let graph = DependencyGraph::from_items(items);
    if let Some((id, dependency)) = graph.dangling_edges().first() {
        return Err(ValidationError::MissingDependency {
            id: id.clone(),
            dependency: dependency.clone(),
        });
    }
    match graph.find_cycle() {
        Some(path) => Err(ValidationError::CircularDependency { path }),
        None => Ok(()),
    }
}

/// Subtasks carry no subtasks of their own.
pub fn validate_subtask_depth(items: &[TodoItem]) -> Result<(), ValidationError> {
    for parent in items {
        if let Some(sub) = parent.subtasks.iter().find(|s| !s.subtasks.is_empty()) {
            return Err(ValidationError::SubtaskTooDeep {
                parent: parent.id.clone(),
                id: sub.id.clone(),
            });
        }
    }
    Ok(())
}

/// No in-progress item is blocked.
pub fn validate_in_progress_not_blocked(items: &[TodoItem]) -> Result<(), ValidationError> {
    check_not_blocked(items)?;
    items
        .iter()
        .try_for_each(|item| check_not_blocked(&item.subtasks))
}

fn check_not_blocked(items: &[TodoItem]) -> Result<(), ValidationError> {
    let blocked = blocked_ids(items);
    let Some(item) = items
        .iter()
        .find(|i| i.is_in_progress() && blocked.contains(&i.id))
    else {
        return Ok(());
    };
    let status: HashMap<&str, bool> = items
        .iter()
        .map(|i| (i.id.as_str(), i.is_completed()))
        .collect();
    let blockers = item
        .dependencies
        .iter()
        .filter(|d| !status.get(d.as_str()).copied().unwrap_or(false))
        .cloned()
        .collect();
    Err(ValidationError::InProgressBlocked {
        id: item.id.clone(),
        blockers,
    })
}

/// At most one top-level item is in progress. Zero is fine.
pub fn validate_at_most_one_in_progress(items: &[TodoItem]) -> Result<(), ValidationError> {
    let ids: Vec<String> = items
        .iter()
        .filter(|i| i.is_in_progress())
        .map(|i| i.id.clone())
        .collect();
    if ids.len() > 1 {
        return Err(ValidationError::MultipleInProgress { ids });
    }
    Ok(())
}

/// A parent with any unfinished subtask has exactly one in progress.
pub fn validate_subtask_in_progress(parent: &TodoItem) -> Result<(), ValidationError> {
    if !parent.has_incomplete_subtasks() {
        return Ok(());
    }
    let in_progress = parent.subtasks.iter().filter(|s| s.is_in_progress()).count();
    if in_progress == 1 {
        Ok(())
    } else {
        Err(ValidationError::SubtaskInProgress {
            parent: parent.id.clone(),
            in_progress,
        })
    }
}

/// Run every validator in a fixed order and return the first failure.
///
/// Order: unique ids, subtask depth, dependencies, single in-progress, not
/// blocked, subtask in-progress (per parent, in list order).
pub fn validate_all(items: &[TodoItem]) -> Result<(), ValidationError> {
    validate_unique_ids(items)?;
    validate_subtask_depth(items)?;
    validate_dependencies(items)?;
    validate_at_most_one_in_progress(items)?;
    validate_in_progress_not_blocked(items)?;
    items.iter().try_for_each(validate_subtask_in_progress)
}

/// Mark every parent whose subtasks are all completed as completed.
#[must_use]
pub fn auto_complete_parents(mut items: Vec<TodoItem>) -> Vec<TodoItem> {
    for item in &mut items {
        if !item.subtasks.is_empty() && !item.has_incomplete_subtasks() && !item.is_completed() {
            item.complete();
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TodoStatus;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn item(id: &str, status: TodoStatus) -> TodoItem {
        TodoItem::new(id, format!("Task {id}")).with_status(status)
    }

    #[test]
    fn blocked_by_pending_dependency() {
        let todos = vec![
            item("A", TodoStatus::Pending),
            item("B", TodoStatus::InProgress).with_dependencies(["A"]),
        ];
        let err = validate_in_progress_not_blocked(&todos).unwrap_err();
        assert_matches!(&err, ValidationError::InProgressBlocked { id, blockers } if id == "B" && blockers == &["A"]);
        let text = err.to_string();
        assert!(text.contains("\"A\""));
        assert!(text.contains("must complete first"));
    }

    #[test]
    fn unblocked_once_dependency_completes() {
        let todos = vec![
            item("A", TodoStatus::Completed),
            item("B", TodoStatus::InProgress).with_dependencies(["A"]),
        ];
        assert!(validate_in_progress_not_blocked(&todos).is_ok());
        assert!(blocked_ids(&todos).is_empty());
    }

    #[test]
    fn blocked_ids_counts_missing_dependency() {
        let todos = vec![item("A", TodoStatus::Pending).with_dependencies(["ghost"])];
        assert!(blocked_ids(&todos).contains("A"));
    }

    #[test]
    fn missing_dependency() {
        let todos = vec![item("A", TodoStatus::Pending).with_dependencies(["Z"])];
        assert_eq!(
            validate_dependencies(&todos).unwrap_err(),
            ValidationError::MissingDependency {
                id: "A".into(),
                dependency: "Z".into()
            }
        );
    }

    #[test]
    fn cycle_message_shows_path() {
        let todos = vec![
            item("A", TodoStatus::Pending).with_dependencies(["B"]),
            item("B", TodoStatus::Pending).with_dependencies(["A"]),
        ];
        let err = validate_dependencies(&todos).unwrap_err();
        assert!(err.to_string().contains("A -> B -> A"));
    }

    #[test]
    fn subtask_dependencies_resolve_among_siblings() {
        let parent = item("P", TodoStatus::InProgress).with_subtasks(vec![
            item("s1", TodoStatus::InProgress),
            item("s2", TodoStatus::Pending).with_dependencies(["s1"]),
        ]);
        assert!(validate_dependencies(&[parent.clone()]).is_ok());

        let bad = parent.with_subtasks(vec![item("s1", TodoStatus::Pending).with_dependencies(["P"])]);
        assert_matches!(
            validate_dependencies(&[bad]),
            Err(ValidationError::MissingDependency { .. })
        );
    }

    #[test]
    fn subtask_depth() {
        let deep = item("P", TodoStatus::Pending).with_subtasks(vec![
            item("s1", TodoStatus::Pending).with_subtasks(vec![item("x", TodoStatus::Pending)]),
        ]);
        assert_eq!(
            validate_subtask_depth(&[deep]).unwrap_err(),
            ValidationError::SubtaskTooDeep {
                parent: "P".into(),
                id: "s1".into()
            }
        );
    }

    #[test]
    fn at_most_one_in_progress() {
        let none = vec![item("A", TodoStatus::Pending)];
        assert!(validate_at_most_one_in_progress(&none).is_ok());
        let two = vec![item("A", TodoStatus::InProgress), item("B", TodoStatus::InProgress)];
        let err = validate_at_most_one_in_progress(&two).unwrap_err();
        assert!(err.to_string().contains("2 are"));
    }

    #[test]
    fn subtask_in_progress_rule() {
        let zero = item("P", TodoStatus::InProgress)
            .with_subtasks(vec![item("s1", TodoStatus::Pending), item("s2", TodoStatus::Pending)]);
        assert_matches!(
            validate_subtask_in_progress(&zero),
            Err(ValidationError::SubtaskInProgress { in_progress: 0, .. })
        );
        let two = item("P", TodoStatus::InProgress)
            .with_subtasks(vec![item("s1", TodoStatus::InProgress), item("s2", TodoStatus::InProgress)]);
        assert_matches!(
            validate_subtask_in_progress(&two),
            Err(ValidationError::SubtaskInProgress { in_progress: 2, .. })
        );
        let done = item("P", TodoStatus::InProgress).with_subtasks(vec![item("s1", TodoStatus::Completed)]);
        assert!(validate_subtask_in_progress(&done).is_ok());
        assert!(validate_subtask_in_progress(&item("leaf", TodoStatus::Pending)).is_ok());
    }

    #[test]
    fn validate_all_reports_first_failure_in_order() {
        let todos = vec![
            item("A", TodoStatus::InProgress).with_dependencies(["Z"]),
            item("B", TodoStatus::InProgress),
        ];
        assert_matches!(
            validate_all(&todos),
            Err(ValidationError::MissingDependency { .. })
        );
    }

    #[test]
    fn duplicate_ids_are_rejected_across_levels() {
        let top = vec![item("A", TodoStatus::Pending), item("A", TodoStatus::Completed)];
        assert_matches!(
            validate_all(&top),
            Err(ValidationError::DuplicateId { id }) if id == "A"
        );

        let nested = vec![
            item("P", TodoStatus::Pending).with_subtasks(vec![item("s1", TodoStatus::Pending)]),
            item("s1", TodoStatus::Pending),
        ];
        let err = validate_all(&nested).unwrap_err();
        assert!(err.to_string().contains("\"s1\" is used more than once"));
        assert!(validate_unique_ids(&[item("A", TodoStatus::Pending)]).is_ok());
    }

    #[test]
    fn auto_complete_parent_with_finished_subtasks() {
        let parent = item("P", TodoStatus::InProgress).with_subtasks(vec![
            item("s1", TodoStatus::Completed),
            item("s2", TodoStatus::Completed),
        ]);
        let out = auto_complete_parents(vec![parent, item("Q", TodoStatus::Pending)]);
        assert_eq!(out[0].status, TodoStatus::Completed);
        assert_eq!(out[1].status, TodoStatus::Pending);
    }

    #[test]
    fn auto_complete_leaves_unfinished_parents() {
        let parent = item("P", TodoStatus::InProgress).with_subtasks(vec![
            item("s1", TodoStatus::Completed),
            item("s2", TodoStatus::InProgress),
        ]);
        let out = auto_complete_parents(vec![parent]);
        assert_eq!(out[0].status, TodoStatus::InProgress);
    }

    // -- properties --

    fn status() -> impl Strategy<Value = TodoStatus> {
        prop_oneof![
            Just(TodoStatus::Proposed),
            Just(TodoStatus::Pending),
            Just(TodoStatus::InProgress),
            Just(TodoStatus::Completed),
        ]
    }

    fn todo_list() -> impl Strategy<Value = Vec<TodoItem>> {
        let sub = prop::collection::vec(status(), 0..4);
        let entry = (status(), sub, prop::collection::vec(0usize..6, 0..3));
        prop::collection::vec(entry, 0..6).prop_map(|entries| {
            let n = entries.len();
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (st, subs, deps))| {
                    let id = format!("t{i}");
                    let subtasks = subs
                        .into_iter()
                        .enumerate()
                        .map(|(j, s)| item(&format!("{id}.{j}"), s))
                        .collect();
                    let deps: Vec<String> = deps
                        .into_iter()
                        .filter(|d| *d < n)
                        .map(|d| format!("t{d}"))
                        .collect();
                    item(&id, st).with_subtasks(subtasks).with_dependencies(deps)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn valid_lists_respect_in_progress_rules(todos in todo_list()) {
            if validate_all(&todos).is_ok() {
                prop_assert!(todos.iter().filter(|t| t.is_in_progress()).count() <= 1);
                for parent in todos.iter().filter(|t| t.has_incomplete_subtasks()) {
                    prop_assert_eq!(parent.subtasks.iter().filter(|s| s.is_in_progress()).count(), 1);
                }
                let blocked = blocked_ids(&todos);
                prop_assert!(todos.iter().all(|t| !(t.is_in_progress() && blocked.contains(&t.id))));
            }
        }

        #[test]
        fn auto_complete_is_idempotent(todos in todo_list()) {
            let once = auto_complete_parents(todos);
            let twice = auto_complete_parents(once.clone());
            prop_assert_eq!(once, twice);
        }
    }
}
