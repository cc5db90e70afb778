#![forbid(unsafe_code)]

//! Binding strategies: how a field's events mutate form state.
//!
//! | Kind           | Value lives in    | On change                        | Mount / unmount            |
//! |----------------|-------------------|----------------------------------|----------------------------|
//! | `Controlled`   | data object       | write, touch, validate           | reserve slot / remove path |
//! | `Uncontrolled` | host element      | read element, write, validate    | reserve slot / remove path |
//! | `Transient`    | transient overlay | write overlay                    | nothing / drop entry       |
//!
//! Each strategy is resolved once, when the field bundle is built, into a
//! [`BindingConfig`] variant. The host drives lifecycle through
//! [`Listeners`], which must fire once per real mount and unmount.

use std::fmt;
use std::rc::Rc;

use formcell_reactive::BatchScope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::element::{ChangeEventKind, FieldElement};
use crate::state::FormState;
use crate::validation;

/// Binding strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    #[default]
    Controlled,
    Uncontrolled,
    Transient,
}

/// Lifecycle callbacks handed to the host UI layer.
#[derive(Clone)]
pub struct Listeners {
    on_mount: Rc<dyn Fn()>,
    on_unmount: Rc<dyn Fn()>,
}

impl Listeners {
    pub fn new(on_mount: impl Fn() + 'static, on_unmount: impl Fn() + 'static) -> Self {
        Self {
            on_mount: Rc::new(on_mount),
            on_unmount: Rc::new(on_unmount),
        }
    }

    pub fn on_mount(&self) {
        (self.on_mount)();
    }

    pub fn on_unmount(&self) {
        (self.on_unmount)();
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").finish_non_exhaustive()
    }
}

/// Mount for data-backed fields: reserve the slot, register the path.
fn mount_data_field(state: &FormState, path: &str, kind: BindingKind) {
    let _batch = BatchScope::new();
    state.reserve_slot(path);
    state.register(path);
    tracing::debug!(message = "form.mount", path, kind = ?kind);
}

fn unmount_data_field(state: &FormState, path: &str, kind: BindingKind) {
    let _batch = BatchScope::new();
    if state.has_data(path) {
        state.remove_data(path);
    }
    state.unregister(path);
    tracing::debug!(message = "form.unmount", path, kind = ?kind);
}

/// Engine-driven field: the host displays whatever the engine holds.
#[derive(Clone)]
pub struct ControlledBinding {
    path: Rc<str>,
    state: Rc<FormState>,
}

impl ControlledBinding {
    pub(crate) fn new(path: &str, state: Rc<FormState>) -> Self {
        Self {
            path: Rc::from(path),
            state,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.path
    }

    pub fn mount(&self) {
        mount_data_field(&self.state, &self.path, BindingKind::Controlled);
    }

    pub fn unmount(&self) {
        unmount_data_field(&self.state, &self.path, BindingKind::Controlled);
    }

    /// Commit a new value: write it, mark the field touched, validate.
    pub fn on_change(&self, value: Value) {
        let _batch = BatchScope::new();
        self.state.write_data(&self.path, value.clone());
        self.state.touch(&self.path);
        tracing::debug!(message = "form.change", path = &*self.path, kind = "controlled");
        validation::check_error(&self.state, &self.path, Some(value));
    }

    pub fn on_blur(&self) {
        self.state.touch(&self.path);
    }

    #[must_use]
    pub fn listeners(&self) -> Listeners {
        let (mount, unmount) = (self.clone(), self.clone());
        Listeners::new(move || mount.mount(), move || unmount.unmount())
    }
}

impl fmt::Debug for ControlledBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlledBinding")
            .field("path", &self.path)
            .finish()
    }
}

/// Element-driven field: the host element owns the displayed value and the
/// engine reads it back on committed changes.
#[derive(Clone)]
pub struct UncontrolledBinding {
    path: Rc<str>,
    state: Rc<FormState>,
}

impl UncontrolledBinding {
    pub(crate) fn new(path: &str, state: Rc<FormState>) -> Self {
        Self {
            path: Rc::from(path),
            state,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.path
    }

    pub fn mount(&self) {
        mount_data_field(&self.state, &self.path, BindingKind::Uncontrolled);
    }

    pub fn unmount(&self) {
        unmount_data_field(&self.state, &self.path, BindingKind::Uncontrolled);
    }

    /// Track `element` for this path and show the current value in it.
    /// Attaching the same element twice is a no-op.
    pub fn attach(&self, element: Rc<dyn FieldElement>) {
        {
            let refs = self.state.refs.borrow();
            if refs
                .get(&*self.path)
                .is_some_and(|tracked| tracked.iter().any(|el| Rc::ptr_eq(el, &element)))
            {
                return;
            }
        }
        if let Some(current) = self
            .state
            .data
            .with(|data| crate::path::get(data, &self.path).cloned())
        {
            element.write_value(Some(&current));
        }
        self.state
            .refs
            .borrow_mut()
            .entry(self.path.to_string())
            .or_default()
            .push(element);
    }

    /// Forget every element tracked for this path.
    pub fn detach(&self) {
        self.state.refs.borrow_mut().remove(&*self.path);
    }

    /// Number of elements currently tracked for this path.
    #[must_use]
    pub fn attached(&self) -> usize {
        self.state
            .refs
            .borrow()
            .get(&*self.path)
            .map_or(0, Vec::len)
    }

    /// Event kind to listen for, taken from the first attached element.
    #[must_use]
    pub fn change_event_kind(&self) -> ChangeEventKind {
        self.state
            .refs
            .borrow()
            .get(&*self.path)
            .and_then(|tracked| tracked.first())
            .map_or(ChangeEventKind::Change, |el| el.change_event_kind())
    }

    /// Handle a committed change on `element`. An empty string clears the
    /// field instead of storing `""`.
    pub fn on_element_change(&self, element: &dyn FieldElement) {
        let value = element.read_value();
        let _batch = BatchScope::new();
        self.state.touch(&self.path);
        let committed = if value.as_str() == Some("") {
            self.state.remove_data(&self.path);
            None
        } else {
            self.state.write_data(&self.path, value.clone());
            Some(value)
        };
        tracing::debug!(
            message = "form.change",
            path = &*self.path,
            kind = "uncontrolled",
            cleared = committed.is_none(),
        );
        validation::check_error(&self.state, &self.path, committed);
    }

    pub fn on_blur(&self) {
        self.state.touch(&self.path);
    }

    #[must_use]
    pub fn listeners(&self) -> Listeners {
        let (mount, unmount) = (self.clone(), self.clone());
        Listeners::new(move || mount.mount(), move || unmount.unmount())
    }
}

impl fmt::Debug for UncontrolledBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UncontrolledBinding")
            .field("path", &self.path)
            .field("attached", &self.attached())
            .finish()
    }
}

/// UI-only field whose value never reaches the data object.
#[derive(Clone)]
pub struct TransientBinding {
    path: Rc<str>,
    state: Rc<FormState>,
}

impl TransientBinding {
    pub(crate) fn new(path: &str, state: Rc<FormState>) -> Self {
        Self {
            path: Rc::from(path),
            state,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.path
    }

    pub fn mount(&self) {
        tracing::debug!(message = "form.mount", path = &*self.path, kind = ?BindingKind::Transient);
    }

    pub fn unmount(&self) {
        self.state.clear_transient(&self.path);
        tracing::debug!(message = "form.unmount", path = &*self.path, kind = ?BindingKind::Transient);
    }

    pub fn on_change(&self, value: Value) {
        self.state.set_transient(&self.path, value);
        tracing::debug!(message = "form.change", path = &*self.path, kind = "transient");
    }

    #[must_use]
    pub fn listeners(&self) -> Listeners {
        let (mount, unmount) = (self.clone(), self.clone());
        Listeners::new(move || mount.mount(), move || unmount.unmount())
    }
}

impl fmt::Debug for TransientBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientBinding")
            .field("path", &self.path)
            .finish()
    }
}

/// A field's binding, fixed when its bundle is built.
#[derive(Debug, Clone)]
pub enum BindingConfig {
    Controlled(ControlledBinding),
    Uncontrolled(UncontrolledBinding),
    Transient(TransientBinding),
}

impl BindingConfig {
    pub(crate) fn new(kind: BindingKind, path: &str, state: Rc<FormState>) -> Self {
        match kind {
            BindingKind::Controlled => Self::Controlled(ControlledBinding::new(path, state)),
            BindingKind::Uncontrolled => Self::Uncontrolled(UncontrolledBinding::new(path, state)),
            BindingKind::Transient => Self::Transient(TransientBinding::new(path, state)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> BindingKind {
        match self {
            Self::Controlled(_) => BindingKind::Controlled,
            Self::Uncontrolled(_) => BindingKind::Uncontrolled,
            Self::Transient(_) => BindingKind::Transient,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Controlled(b) => b.name(),
            Self::Uncontrolled(b) => b.name(),
            Self::Transient(b) => b.name(),
        }
    }

    #[must_use]
    pub fn listeners(&self) -> Listeners {
        match self {
            Self::Controlled(b) => b.listeners(),
            Self::Uncontrolled(b) => b.listeners(),
            Self::Transient(b) => b.listeners(),
        }
    }

    pub fn mount(&self) {
        match self {
            Self::Controlled(b) => b.mount(),
            Self::Uncontrolled(b) => b.mount(),
            Self::Transient(b) => b.mount(),
        }
    }

    pub fn unmount(&self) {
        match self {
            Self::Controlled(b) => b.unmount(),
            Self::Uncontrolled(b) => b.unmount(),
            Self::Transient(b) => b.unmount(),
        }
    }

    #[must_use]
    pub fn as_controlled(&self) -> Option<&ControlledBinding> {
        match self {
            Self::Controlled(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_uncontrolled(&self) -> Option<&UncontrolledBinding> {
        match self {
            Self::Uncontrolled(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_transient(&self) -> Option<&TransientBinding> {
        match self {
            Self::Transient(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormConfig;
    use crate::element::{InputElement, InputKind};
    use crate::state::TransientStore;
    use formcell_reactive::Observable;
    use serde_json::json;
    use std::cell::Cell;

    fn state(data: Value) -> Rc<FormState> {
        Rc::new(FormState::new(
            Observable::new(data),
            Observable::new(Vec::new()),
            Observable::new(TransientStore::new()),
            FormConfig::default(),
        ))
    }

    #[test]
    fn controlled_mount_change_unmount() {
        let state = state(json!({}));
        let binding = ControlledBinding::new("/email", Rc::clone(&state));

        binding.mount();
        assert_eq!(state.data.get(), json!({"email": null}));
        assert!(state.registry.with(|r| r.contains("/email")));

        binding.on_change(json!("a@b.com"));
        assert_eq!(state.data.get(), json!({"email": "a@b.com"}));
        assert!(state.is_touched("/email"));

        binding.unmount();
        assert_eq!(state.data.get(), json!({}));
        assert!(!state.registry.with(|r| r.contains("/email")));
        assert!(state.is_touched("/email"));
    }

    #[test]
    fn controlled_mount_keeps_existing_value() {
        let state = state(json!({"name": "ada"}));
        ControlledBinding::new("/name", Rc::clone(&state)).mount();
        assert_eq!(state.data.get(), json!({"name": "ada"}));
    }

    #[test]
    fn blur_touches_without_writing() {
        let state = state(json!({"a": 1}));
        ControlledBinding::new("/a", Rc::clone(&state)).on_blur();
        assert!(state.is_touched("/a"));
        assert_eq!(state.data.version(), 0);
    }

    #[test]
    fn change_is_one_notification() {
        let state = state(json!({}));
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _sub = state.data.subscribe(move |_| counter.set(counter.get() + 1));
        let binding = ControlledBinding::new("/a", Rc::clone(&state));
        binding.on_change(json!(1));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn uncontrolled_empty_string_removes_path() {
        let state = state(json!({}));
        let binding = UncontrolledBinding::new("/age", Rc::clone(&state));
        binding.mount();

        let input = InputElement::new(InputKind::Number);
        input.set_text("31");
        binding.on_element_change(&input);
        assert_eq!(state.data.get(), json!({"age": 31}));

        input.set_text("");
        binding.on_element_change(&input);
        assert_eq!(state.data.get(), json!({}));
        assert!(state.is_touched("/age"));
    }

    #[test]
    fn recommitting_same_number_stays_clean() {
        let state = state(json!({"age": 42}));
        state.ensure_snapshot();
        let binding = UncontrolledBinding::new("/age", Rc::clone(&state));
        binding.mount();

        let input = Rc::new(InputElement::new(InputKind::Number));
        binding.attach(input.clone());
        assert_eq!(input.text(), "42");

        binding.on_element_change(&*input);
        assert_eq!(state.data.get(), json!({"age": 42}));
        assert!(!state.is_dirty("/age"));

        input.set_text("43");
        binding.on_element_change(&*input);
        assert!(state.is_dirty("/age"));

        input.set_text("42.0");
        binding.on_element_change(&*input);
        assert!(!state.is_dirty("/age"));
    }

    #[test]
    fn attach_writes_current_value_once() {
        let state = state(json!({"agree": true}));
        let binding = UncontrolledBinding::new("/agree", Rc::clone(&state));
        let checkbox = Rc::new(InputElement::new(InputKind::Checkbox));
        let handle: Rc<dyn FieldElement> = checkbox.clone();

        binding.attach(Rc::clone(&handle));
        binding.attach(handle);
        assert!(checkbox.checked());
        assert_eq!(binding.attached(), 1);
        assert_eq!(binding.change_event_kind(), ChangeEventKind::Click);

        binding.detach();
        assert_eq!(binding.attached(), 0);
        assert_eq!(binding.change_event_kind(), ChangeEventKind::Change);
    }

    #[test]
    fn transient_never_touches_data() {
        let state = state(json!({"keep": 1}));
        let binding = TransientBinding::new("/open", Rc::clone(&state));
        binding.mount();
        binding.on_change(json!(true));
        assert_eq!(state.data.get(), json!({"keep": 1}));
        assert_eq!(state.transient.get().get("/open"), Some(&json!(true)));
        assert!(!state.is_touched("/open"));

        binding.unmount();
        assert!(state.transient.get().is_empty());
    }

    #[test]
    fn listeners_drive_the_binding() {
        let state = state(json!({}));
        let config = BindingConfig::new(BindingKind::Controlled, "/x", Rc::clone(&state));
        let listeners = config.listeners();
        listeners.on_mount();
        assert_eq!(state.data.get(), json!({"x": null}));
        listeners.on_unmount();
        assert_eq!(state.data.get(), json!({}));
        assert_eq!(config.kind(), BindingKind::Controlled);
        assert_eq!(config.name(), "/x");
        assert!(config.as_controlled().is_some());
        assert!(config.as_transient().is_none());
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(BindingKind::Uncontrolled).unwrap(),
            json!("uncontrolled")
        );
    }
}
