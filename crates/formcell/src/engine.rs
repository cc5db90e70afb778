#![forbid(unsafe_code)]

//! The form engine: keyed cache of field bundles over shared root cells.
//!
//! # Ownership
//!
//! ```text
//! FormEngine ──Rc──> EngineInner ──Rc──> FormState (root cells, registries)
//!                        │                   ▲
//!                        ├── bundles ────────┤ (bindings hold Rc<FormState>)
//!                        ├── watch cells     │
//!                        └── form_data / form_errors
//! ```
//!
//! `FormState` never points back at the engine, so dropping the last engine
//! handle frees every bundle and cell.
//!
//! # Multiple engines
//!
//! Engines built over the same `Observable<Value>` see each other's writes.
//! Touched set, registry, snapshot and validators stay per engine.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use ahash::AHashMap;
use formcell_reactive::{BatchScope, Computed, Observable};
use serde_json::{Map, Value};

use crate::binding::BindingKind;
use crate::config::FormConfig;
use crate::error_stack::{ErrorStack, FieldError};
use crate::field::{FieldBundle, FieldOptions};
use crate::path;
use crate::state::{self, FormState, TransientStore};
use crate::validation;

/// A root cell either created by the engine or injected by the host.
#[derive(Debug, Clone)]
pub enum Store<T> {
    Owned(Observable<T>),
    Shared(Observable<T>),
}

impl<T: Clone + PartialEq + Default + 'static> Store<T> {
    fn resolve(shared: Option<Observable<T>>) -> Self {
        shared.map_or_else(|| Self::Owned(Observable::new(T::default())), Self::Shared)
    }
}

impl<T> Store<T> {
    #[must_use]
    pub fn handle(&self) -> &Observable<T> {
        match self {
            Self::Owned(cell) | Self::Shared(cell) => cell,
        }
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }
}

/// Builder for [`FormEngine`].
#[derive(Debug)]
pub struct FormEngineBuilder {
    data: Observable<Value>,
    errors: Option<Observable<ErrorStack>>,
    transient: Option<Observable<TransientStore>>,
    config: FormConfig,
}

impl FormEngineBuilder {
    /// Use a host-owned error stack instead of an internal one.
    #[must_use]
    pub fn errors(mut self, errors: Observable<ErrorStack>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Use a host-owned transient overlay instead of an internal one.
    #[must_use]
    pub fn transient(mut self, transient: Observable<TransientStore>) -> Self {
        self.transient = Some(transient);
        self
    }

    #[must_use]
    pub fn config(mut self, config: FormConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> FormEngine {
        let errors = Store::resolve(self.errors);
        let transient = Store::resolve(self.transient);
        let state = Rc::new(FormState::new(
            self.data,
            errors.handle().clone(),
            transient.handle().clone(),
            self.config,
        ));

        let form_data = Computed::from2(&state.data, &state.registry, |data, registry| {
            scoped_data(data, registry)
        });
        let form_errors = Computed::from2(&state.errors, &state.registry, |stack, registry| {
            scoped_errors(stack, registry)
        });

        FormEngine {
            inner: Rc::new(EngineInner {
                state,
                errors,
                transient,
                bundles: RefCell::new(AHashMap::new()),
                watches: RefCell::new(AHashMap::new()),
                form_data,
                form_errors,
            }),
        }
    }
}

struct EngineInner {
    state: Rc<FormState>,
    errors: Store<ErrorStack>,
    transient: Store<TransientStore>,
    bundles: RefCell<AHashMap<String, FieldBundle>>,
    watches: RefCell<AHashMap<String, Computed<Option<Value>>>>,
    form_data: Computed<Value>,
    form_errors: Computed<ErrorStack>,
}

/// Reactive state engine for one form.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct FormEngine {
    inner: Rc<EngineInner>,
}

impl std::fmt::Debug for FormEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormEngine")
            .field("bundles", &self.bundle_count())
            .field("registered", &self.inner.state.registry.get())
            .field("shared_errors", &self.inner.errors.is_shared())
            .field("shared_transient", &self.inner.transient.is_shared())
            .finish()
    }
}

impl FormEngine {
    /// Engine with internally owned error stack and transient overlay.
    #[must_use]
    pub fn new(data: Observable<Value>) -> Self {
        Self::builder(data).build()
    }

    #[must_use]
    pub fn builder(data: Observable<Value>) -> FormEngineBuilder {
        FormEngineBuilder {
            data,
            errors: None,
            transient: None,
            config: FormConfig::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &FormConfig {
        &self.inner.state.config
    }

    /// The data object cell.
    #[must_use]
    pub fn data(&self) -> &Observable<Value> {
        &self.inner.state.data
    }

    /// The transient overlay cell.
    #[must_use]
    pub fn transient(&self) -> &Observable<TransientStore> {
        self.inner.transient.handle()
    }

    /// The full error stack.
    #[must_use]
    pub fn errors(&self) -> &Observable<ErrorStack> {
        self.inner.errors.handle()
    }

    /// Memoized bundle for `path`, built on first request.
    ///
    /// Later calls return the same instance whatever their options; only a
    /// supplied validator is applied, replacing the previous one.
    pub fn field_bundle(&self, path: &str, options: FieldOptions) -> FieldBundle {
        let state = &self.inner.state;
        state.ensure_snapshot();
        if let Some(validate) = options.validate {
            state.validators.borrow_mut().insert(path.to_string(), validate);
        }

        let existing = self.inner.bundles.borrow().get(path).cloned();
        let bundle = match existing {
            Some(bundle) => {
                if bundle.kind() != options.kind {
                    tracing::debug!(
                        message = "form.kind_conflict",
                        path,
                        kept = ?bundle.kind(),
                        requested = ?options.kind,
                    );
                }
                bundle
            }
            None => {
                let bundle = FieldBundle::build(path, options.kind, state);
                state.kinds.borrow_mut().insert(path.to_string(), options.kind);
                self.inner
                    .bundles
                    .borrow_mut()
                    .insert(path.to_string(), bundle.clone());
                bundle
            }
        };
        if bundle.kind() != BindingKind::Transient {
            state.register(path);
        }
        bundle
    }

    /// Live value at `path`: transient overlay first, then the data object.
    #[must_use]
    pub fn watch(&self, path: &str) -> Computed<Option<Value>> {
        if let Some(cell) = self.inner.watches.borrow().get(path) {
            return cell.clone();
        }
        let state = &self.inner.state;
        let key = path.to_string();
        let cell = Computed::from2(&state.transient, &state.data, move |overlay, data| {
            state::overlay_or_data(overlay, data, &key)
        });
        self.inner
            .watches
            .borrow_mut()
            .insert(path.to_string(), cell.clone());
        cell
    }

    /// Programmatic write. Goes to the transient overlay for transient paths
    /// and to the data object otherwise; a data path that does not exist yet
    /// is left alone. Never validates.
    pub fn set_field(&self, path: &str, value: Value) {
        let state = &self.inner.state;
        let in_overlay = state.transient.with(|overlay| overlay.contains_key(path));
        if in_overlay || state.kind_of(path) == Some(BindingKind::Transient) {
            state.set_transient(path, value);
            tracing::debug!(message = "form.change", path, origin = "set_field", target = "transient");
        } else if state.has_data(path) {
            state.write_data(path, value);
            tracing::debug!(message = "form.change", path, origin = "set_field", target = "data");
        } else {
            tracing::debug!(message = "form.change", path, origin = "set_field", skipped = true);
        }
    }

    /// Mark `path` touched without changing its value.
    pub fn touch(&self, path: &str) {
        self.inner.state.touch(path);
    }

    /// Run `path`'s validator against `value` and update the error stack.
    pub fn check_error(&self, path: &str, value: Option<Value>) -> Option<FieldError> {
        validation::check_error(&self.inner.state, path, value)
    }

    /// Replace the whole error stack with `resolver`'s output over `data`,
    /// or over the current data object.
    pub fn validate(
        &self,
        resolver: impl FnOnce(&Value) -> BTreeMap<String, FieldError>,
        data: Option<&Value>,
    ) {
        validation::resolve(&self.inner.state, resolver, data);
    }

    /// Data limited to the top-level keys of registered paths.
    #[must_use]
    pub fn form_data(&self) -> &Computed<Value> {
        &self.inner.form_data
    }

    /// Error stack limited to entries under registered paths.
    #[must_use]
    pub fn form_errors(&self) -> &Computed<ErrorStack> {
        &self.inner.form_errors
    }

    /// The initial snapshot, capturing it now if nothing has yet.
    #[must_use]
    pub fn initial_data(&self) -> Value {
        let state = &self.inner.state;
        state.ensure_snapshot();
        state
            .snapshot
            .get()
            .unwrap_or_else(|| state.data.get())
    }

    #[must_use]
    pub fn is_registered(&self, path: &str) -> bool {
        self.inner.state.registry.with(|set| set.contains(path))
    }

    #[must_use]
    pub fn registered_paths(&self) -> Vec<String> {
        self.inner.state.registry.with(|set| set.iter().cloned().collect())
    }

    #[must_use]
    pub fn bundle_count(&self) -> usize {
        self.inner.bundles.borrow().len()
    }

    /// Clear element displays, element handles, the transient overlay and the
    /// data object, plus whatever the configured [`ResetPolicy`] adds.
    ///
    /// [`ResetPolicy`]: crate::config::ResetPolicy
    pub fn reset(&self) {
        let state = &self.inner.state;
        let policy = state.config.reset;
        let _batch = BatchScope::new();

        let refs = std::mem::take(&mut *state.refs.borrow_mut());
        let cleared_elements: usize = refs.values().map(Vec::len).sum();
        for element in refs.values().flatten() {
            element.write_value(None);
        }
        state.transient.set(TransientStore::new());
        state.data.set(Value::Object(Map::new()));

        if policy.clear_touched {
            state.touched.set(BTreeSet::new());
        }
        if policy.clear_errors {
            state.errors.set(ErrorStack::new());
        }
        if policy.clear_registry {
            state.registry.set(BTreeSet::new());
        }
        if policy.clear_snapshot {
            state.snapshot.set(None);
        }
        tracing::debug!(message = "form.reset", cleared_elements, policy = ?policy);
    }

    /// Evict the bundle, watch cell, validator and binding kind cached for
    /// `path`. Returns whether anything was cached.
    pub fn dispose(&self, path: &str) -> bool {
        let state = &self.inner.state;
        let bundle = self.inner.bundles.borrow_mut().remove(path).is_some();
        let watch = self.inner.watches.borrow_mut().remove(path).is_some();
        let validator = state.validators.borrow_mut().remove(path).is_some();
        state.kinds.borrow_mut().remove(path);
        let found = bundle || watch || validator;
        tracing::debug!(message = "form.dispose", path, found);
        found
    }
}

/// Shallow copy of `data` keeping the top-level keys of registered paths.
fn scoped_data(data: &Value, registry: &BTreeSet<String>) -> Value {
    let mut scoped = Map::new();
    for field in registry {
        let Some(token) = path::top_level_token(field) else {
            continue;
        };
        if scoped.contains_key(&token) {
            continue;
        }
        if let Some(value) = path::get(data, &path::compile(&[token.as_str()])) {
            scoped.insert(token, value.clone());
        }
    }
    Value::Object(scoped)
}

/// Entries under any registered path, in stack order.
fn scoped_errors(stack: &ErrorStack, registry: &BTreeSet<String>) -> ErrorStack {
    stack
        .iter()
        .filter(|entry| registry.iter().any(|field| entry.path.starts_with(field.as_str())))
        .cloned()
        .collect()
}
