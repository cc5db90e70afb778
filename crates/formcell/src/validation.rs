#![forbid(unsafe_code)]

//! Per-field validators and bulk resolution.
//!
//! A validator sees the field's value together with its current dirty and
//! touched flags, and either reports a [`FieldError`] or passes. Validators
//! run only when a field's value changes through a binding; mount, blur and
//! programmatic writes never trigger them.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;

use crate::error_stack::{self, ErrorEntry, FieldError};
use crate::state::FormState;

/// What a validator is shown.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldStatus {
    /// `None` when the data object does not hold the path.
    pub value: Option<Value>,
    pub dirty: bool,
    pub touched: bool,
}

/// Field validator: `Some(error)` fails, `None` passes.
pub type Validator = Rc<dyn Fn(&FieldStatus) -> Option<FieldError>>;

/// Wrap a closure as a [`Validator`].
pub fn validator(check: impl Fn(&FieldStatus) -> Option<FieldError> + 'static) -> Validator {
    Rc::new(check)
}

/// Fails with `required` when the value is missing, null or an empty string.
#[must_use]
pub fn required() -> Validator {
    validator(|status| match &status.value {
        None | Some(Value::Null) => Some(FieldError::new("required")),
        Some(Value::String(s)) if s.is_empty() => Some(FieldError::new("required")),
        Some(_) => None,
    })
}

/// Run the validator registered for `path` against `value` and reconcile
/// the error stack. Returns the error the validator reported, if any.
pub(crate) fn check_error(
    state: &FormState,
    path: &str,
    value: Option<Value>,
) -> Option<FieldError> {
    let validator = state.validators.borrow().get(path).cloned()?;
    let status = FieldStatus {
        value,
        dirty: state.is_dirty(path),
        touched: state.is_touched(path),
    };
    let outcome = validator(&status);
    match &outcome {
        Some(error) => {
            let entry = ErrorEntry::new(path, error.clone());
            let next = state
                .errors
                .with(|stack| error_stack::add_or_replace(stack, entry));
            state.errors.set(next);
        }
        None => {
            if state
                .errors
                .with(|stack| error_stack::error_for(stack, path).is_some())
            {
                let next = state
                    .errors
                    .with(|stack| error_stack::remove_path(stack, path));
                state.errors.set(next);
            }
        }
    }
    tracing::debug!(
        message = "form.validate",
        path,
        failed = outcome.is_some(),
        kind = outcome.as_ref().map(|e| e.kind.as_str()),
    );
    outcome
}

/// Replace the whole error stack with `resolver`'s verdict on `data`, or on
/// the current data object when `data` is `None`.
pub(crate) fn resolve(
    state: &FormState,
    resolver: impl FnOnce(&Value) -> BTreeMap<String, FieldError>,
    data: Option<&Value>,
) {
    let found = match data {
        Some(data) => resolver(data),
        None => state.data.with(resolver),
    };
    let count = found.len();
    state.errors.set(error_stack::from_map(found));
    tracing::debug!(message = "form.validate", bulk = true, errors = count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormConfig;
    use crate::state::TransientStore;
    use formcell_reactive::Observable;
    use serde_json::json;

    fn state(data: Value) -> FormState {
        FormState::new(
            Observable::new(data),
            Observable::new(Vec::new()),
            Observable::new(TransientStore::new()),
            FormConfig::default(),
        )
    }

    #[test]
    fn no_validator_means_no_error() {
        let state = state(json!({}));
        assert!(check_error(&state, "/a", None).is_none());
        assert!(state.errors.get().is_empty());
        assert_eq!(state.errors.version(), 0);
    }

    #[test]
    fn failing_then_passing_reconciles_stack() {
        let state = state(json!({"a": ""}));
        state.validators.borrow_mut().insert("/a".into(), required());

        let err = check_error(&state, "/a", Some(json!("")));
        assert_eq!(err, Some(FieldError::new("required")));
        assert_eq!(state.errors.get().len(), 1);

        check_error(&state, "/a", Some(json!("")));
        assert_eq!(state.errors.get().len(), 1);

        assert!(check_error(&state, "/a", Some(json!("x"))).is_none());
        assert!(state.errors.get().is_empty());
    }

    #[test]
    fn validator_sees_current_flags() {
        let state = state(json!({"a": 1}));
        state.ensure_snapshot();
        state.write_data("/a", json!(2));
        state.touch("/a");
        state.validators.borrow_mut().insert(
            "/a".into(),
            validator(|status| {
                (status.dirty && status.touched).then(|| FieldError::new("seen"))
            }),
        );
        assert_eq!(
            check_error(&state, "/a", Some(json!(2))).map(|e| e.kind),
            Some("seen".to_string())
        );
    }

    #[test]
    fn resolve_replaces_whole_stack() {
        let state = state(json!({"name": ""}));
        state
            .errors
            .set(vec![ErrorEntry::new("/old", FieldError::new("stale"))]);

        resolve(
            &state,
            |data| {
                let mut found = BTreeMap::new();
                if data["name"] == json!("") {
                    found.insert("/name".to_string(), FieldError::new("required"));
                }
                found
            },
            None,
        );
        assert_eq!(
            state.errors.get(),
            vec![ErrorEntry::new("/name", FieldError::new("required"))]
        );

        resolve(&state, |_| BTreeMap::new(), Some(&json!({"name": "ok"})));
        assert!(state.errors.get().is_empty());
    }
}
