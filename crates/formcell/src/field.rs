#![forbid(unsafe_code)]

//! Field bundles: the memoized group of derived cells for one path.

use std::fmt;
use std::rc::Rc;

use formcell_reactive::Computed;
use serde_json::Value;

use crate::binding::{BindingConfig, BindingKind};
use crate::error_stack::{self, FieldError};
use crate::state::{self, FormState};
use crate::validation::Validator;

/// Options for [`FormEngine::field_bundle`](crate::FormEngine::field_bundle).
#[derive(Clone, Default)]
pub struct FieldOptions {
    pub kind: BindingKind,
    /// Installed for the path on every call, replacing any earlier one.
    pub validate: Option<Validator>,
}

impl FieldOptions {
    #[must_use]
    pub fn controlled() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn uncontrolled() -> Self {
        Self {
            kind: BindingKind::Uncontrolled,
            validate: None,
        }
    }

    #[must_use]
    pub fn transient() -> Self {
        Self {
            kind: BindingKind::Transient,
            validate: None,
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validate: Validator) -> Self {
        self.validate = Some(validate);
        self
    }
}

impl fmt::Debug for FieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldOptions")
            .field("kind", &self.kind)
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

/// Value of a field as the engine manages it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// Uncontrolled field: the host element owns the value.
    Unmanaged,
    /// The path does not resolve.
    #[default]
    Absent,
    Present(Value),
}

impl FieldValue {
    fn from_option(value: Option<Value>) -> Self {
        value.map_or(Self::Absent, Self::Present)
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Present(value) => Some(value),
            _ => None,
        }
    }
}

/// Plain snapshot of every cell in a bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldState {
    pub name: String,
    pub value: FieldValue,
    pub error: Option<FieldError>,
    pub dirty: bool,
    pub touched: bool,
}

struct BundleInner {
    name: String,
    value: Computed<FieldValue>,
    error: Computed<Option<FieldError>>,
    dirty: Computed<bool>,
    touched: Computed<bool>,
    binding: BindingConfig,
}

/// Derived cells for one field. Clones share the same cells.
#[derive(Clone)]
pub struct FieldBundle {
    inner: Rc<BundleInner>,
}

impl FieldBundle {
    pub(crate) fn build(path: &str, kind: BindingKind, state: &Rc<FormState>) -> Self {
        let value = match kind {
            BindingKind::Uncontrolled => Computed::constant(FieldValue::Unmanaged),
            BindingKind::Transient => {
                let path = path.to_string();
                Computed::from_observable(&state.transient, move |overlay| {
                    FieldValue::from_option(overlay.get(&path).cloned())
                })
            }
            BindingKind::Controlled => {
                let path = path.to_string();
                Computed::from2(&state.transient, &state.data, move |overlay, data| {
                    FieldValue::from_option(state::overlay_or_data(overlay, data, &path))
                })
            }
        };

        let error = {
            let path = path.to_string();
            Computed::from_observable(&state.errors, move |stack| {
                error_stack::error_for(stack, &path).cloned()
            })
        };
        let dirty = {
            let path = path.to_string();
            Computed::from2(&state.data, &state.snapshot, move |data, snapshot| {
                state::dirty_at(data, snapshot.as_ref(), &path)
            })
        };
        let touched = {
            let path = path.to_string();
            Computed::from_observable(&state.touched, move |set| set.contains(&path))
        };

        Self {
            inner: Rc::new(BundleInner {
                name: path.to_string(),
                value,
                error,
                dirty,
                touched,
                binding: BindingConfig::new(kind, path, Rc::clone(state)),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn value(&self) -> &Computed<FieldValue> {
        &self.inner.value
    }

    #[must_use]
    pub fn error(&self) -> &Computed<Option<FieldError>> {
        &self.inner.error
    }

    #[must_use]
    pub fn dirty(&self) -> &Computed<bool> {
        &self.inner.dirty
    }

    #[must_use]
    pub fn touched(&self) -> &Computed<bool> {
        &self.inner.touched
    }

    #[must_use]
    pub fn binding(&self) -> &BindingConfig {
        &self.inner.binding
    }

    #[must_use]
    pub fn kind(&self) -> BindingKind {
        self.inner.binding.kind()
    }

    /// Read every cell at once.
    #[must_use]
    pub fn state(&self) -> FieldState {
        FieldState {
            name: self.inner.name.clone(),
            value: self.inner.value.get(),
            error: self.inner.error.get(),
            dirty: self.inner.dirty.get(),
            touched: self.inner.touched.get(),
        }
    }

    /// Whether both handles are the same bundle instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for FieldBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBundle")
            .field("name", &self.inner.name)
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormConfig;
    use crate::error_stack::ErrorEntry;
    use crate::state::TransientStore;
    use formcell_reactive::Observable;
    use serde_json::json;

    fn state(data: Value) -> Rc<FormState> {
        Rc::new(FormState::new(
            Observable::new(data),
            Observable::new(Vec::new()),
            Observable::new(TransientStore::new()),
            FormConfig::default(),
        ))
    }

    #[test]
    fn controlled_value_tracks_data_and_overlay() {
        let state = state(json!({"a": 1}));
        let bundle = FieldBundle::build("/a", BindingKind::Controlled, &state);
        assert_eq!(bundle.value().get(), FieldValue::Present(json!(1)));

        state.write_data("/a", json!(2));
        assert_eq!(bundle.value().get(), FieldValue::Present(json!(2)));

        state.set_transient("/a", json!("shadow"));
        assert_eq!(bundle.value().get(), FieldValue::Present(json!("shadow")));

        let missing = FieldBundle::build("/nope", BindingKind::Controlled, &state);
        assert_eq!(missing.value().get(), FieldValue::Absent);
    }

    #[test]
    fn uncontrolled_value_is_unmanaged() {
        let state = state(json!({"a": 1}));
        let bundle = FieldBundle::build("/a", BindingKind::Uncontrolled, &state);
        assert_eq!(bundle.value().get(), FieldValue::Unmanaged);
        assert_eq!(bundle.value().get().as_value(), None);
    }

    #[test]
    fn transient_value_ignores_data() {
        let state = state(json!({"a": 1}));
        let bundle = FieldBundle::build("/a", BindingKind::Transient, &state);
        assert_eq!(bundle.value().get(), FieldValue::Absent);
        state.set_transient("/a", json!(false));
        assert_eq!(bundle.value().get(), FieldValue::Present(json!(false)));
    }

    #[test]
    fn status_cells_follow_roots() {
        let state = state(json!({"a": 1}));
        state.ensure_snapshot();
        let bundle = FieldBundle::build("/a", BindingKind::Controlled, &state);
        assert!(!bundle.dirty().get());
        assert!(!bundle.touched().get());
        assert_eq!(bundle.error().get(), None);

        state.write_data("/a", json!(5));
        state.touch("/a");
        state
            .errors
            .set(vec![ErrorEntry::new("/a", FieldError::new("max"))]);

        let snapshot = bundle.state();
        assert_eq!(snapshot.name, "/a");
        assert!(snapshot.dirty);
        assert!(snapshot.touched);
        assert_eq!(snapshot.error, Some(FieldError::new("max")));
    }

    #[test]
    fn options_builders() {
        assert_eq!(FieldOptions::controlled().kind, BindingKind::Controlled);
        assert_eq!(FieldOptions::transient().kind, BindingKind::Transient);
        let opts = FieldOptions::uncontrolled().with_validator(crate::validation::required());
        assert_eq!(opts.kind, BindingKind::Uncontrolled);
        assert!(opts.validate.is_some());
    }
}
