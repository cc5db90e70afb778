#![forbid(unsafe_code)]

//! Validation errors and the ordered error stack.
//!
//! The stack holds at most one entry per path. A new error for a path that
//! already has one replaces it in place, so the position of a field's error
//! is stable while the user keeps editing it.
//!
//! Sub-form helpers select the entries under a path prefix, letting a parent
//! form ask only about the errors of one nested section.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A user-data problem reported by a validator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldError {
    /// Machine-readable error kind, e.g. `"required"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional human-readable text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FieldError {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// One error attributed to a field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub path: String,
    pub error: FieldError,
}

impl ErrorEntry {
    #[must_use]
    pub fn new(path: impl Into<String>, error: FieldError) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// Ordered list of field errors, at most one per path.
pub type ErrorStack = Vec<ErrorEntry>;

/// Insert `entry`, replacing the existing entry for the same path in place.
#[must_use]
pub fn add_or_replace(stack: &[ErrorEntry], entry: ErrorEntry) -> ErrorStack {
    let mut next = Vec::with_capacity(stack.len() + 1);
    let mut slot = None;
    for existing in stack {
        if existing.path != entry.path {
            next.push(existing.clone());
        } else if slot.is_none() {
            slot = Some(next.len());
            next.push(existing.clone());
        }
    }
    match slot {
        Some(idx) => next[idx] = entry,
        None => next.push(entry),
    }
    next
}

/// Drop every entry for `path`.
#[must_use]
pub fn remove_path(stack: &[ErrorEntry], path: &str) -> ErrorStack {
    stack.iter().filter(|e| e.path != path).cloned().collect()
}

/// The error currently recorded for exactly `path`.
#[must_use]
pub fn error_for<'a>(stack: &'a [ErrorEntry], path: &str) -> Option<&'a FieldError> {
    stack.iter().find(|e| e.path == path).map(|e| &e.error)
}

/// Entries whose path equals `path` or starts with it, in stack order.
#[must_use]
pub fn sub_errors<'a>(stack: &'a [ErrorEntry], path: &str) -> Vec<&'a ErrorEntry> {
    stack.iter().filter(|e| e.path.starts_with(path)).collect()
}

/// Whether any entry falls under `path`.
#[must_use]
pub fn has_sub_errors(stack: &[ErrorEntry], path: &str) -> bool {
    stack.iter().any(|e| e.path.starts_with(path))
}

/// Entries whose path is exactly one of `paths`, in stack order.
#[must_use]
pub fn errors_in<'a, S: AsRef<str>>(stack: &'a [ErrorEntry], paths: &[S]) -> Vec<&'a ErrorEntry> {
    stack
        .iter()
        .filter(|e| paths.iter().any(|p| p.as_ref() == e.path))
        .collect()
}

/// Build a stack from a path-to-error mapping, in path order.
#[must_use]
pub fn from_map(errors: BTreeMap<String, FieldError>) -> ErrorStack {
    errors
        .into_iter()
        .map(|(path, error)| ErrorEntry { path, error })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, kind: &str) -> ErrorEntry {
        ErrorEntry::new(path, FieldError::new(kind))
    }

    #[test]
    fn add_appends_new_paths() {
        let stack = add_or_replace(&[], entry("/a", "required"));
        let stack = add_or_replace(&stack, entry("/b", "min"));
        assert_eq!(stack, vec![entry("/a", "required"), entry("/b", "min")]);
    }

    #[test]
    fn replace_keeps_position_and_one_entry_per_path() {
        let stack = vec![entry("/a", "required"), entry("/b", "min")];
        let stack = add_or_replace(&stack, entry("/a", "pattern"));
        assert_eq!(stack, vec![entry("/a", "pattern"), entry("/b", "min")]);

        let stack = add_or_replace(&stack, entry("/a", "pattern"));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn replace_collapses_external_duplicates() {
        let stack = vec![entry("/a", "x"), entry("/b", "y"), entry("/a", "z")];
        let stack = add_or_replace(&stack, entry("/a", "w"));
        assert_eq!(stack, vec![entry("/a", "w"), entry("/b", "y")]);
    }

    #[test]
    fn remove_path_only_touches_that_path() {
        let stack = vec![entry("/a", "x"), entry("/ab", "y")];
        assert_eq!(remove_path(&stack, "/a"), vec![entry("/ab", "y")]);
        assert_eq!(remove_path(&stack, "/zzz"), stack);
    }

    #[test]
    fn error_for_is_exact() {
        let stack = vec![entry("/user/name", "required")];
        assert_eq!(
            error_for(&stack, "/user/name").map(|e| e.kind.as_str()),
            Some("required")
        );
        assert!(error_for(&stack, "/user").is_none());
    }

    #[test]
    fn sub_errors_filters_by_prefix_in_order() {
        let stack = vec![
            entry("/user/name", "required"),
            entry("/user/age", "min"),
            entry("/org", "required"),
        ];
        let subset = sub_errors(&stack, "/user");
        assert_eq!(subset, vec![&stack[0], &stack[1]]);
        assert!(has_sub_errors(&stack, "/org"));
        assert!(!has_sub_errors(&stack, "/billing"));
    }

    #[test]
    fn errors_in_matches_exact_paths() {
        let stack = vec![entry("/a", "x"), entry("/a/b", "y"), entry("/c", "z")];
        let subset = errors_in(&stack, &["/a", "/c"]);
        assert_eq!(subset, vec![&stack[0], &stack[2]]);
    }

    #[test]
    fn field_error_serializes_kind_as_type() {
        let json = serde_json::to_value(FieldError::new("required")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "required"}));

        let parsed: FieldError =
            serde_json::from_value(serde_json::json!({"type": "min", "message": "too small"}))
                .unwrap();
        assert_eq!(parsed, FieldError::new("min").with_message("too small"));
    }
}
