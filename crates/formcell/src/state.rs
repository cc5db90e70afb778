#![forbid(unsafe_code)]

//! Root cells and side tables shared by an engine and its bindings.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use ahash::AHashMap;
use formcell_reactive::Observable;
use serde_json::Value;

use crate::binding::BindingKind;
use crate::config::FormConfig;
use crate::element::FieldElement;
use crate::error_stack::ErrorStack;
use crate::path;
use crate::validation::Validator;

/// Transient overlay: path to value, never written into the data object.
pub type TransientStore = BTreeMap<String, Value>;

/// Element handles tracked per uncontrolled path.
pub(crate) type ElementRefs = AHashMap<String, Vec<Rc<dyn FieldElement>>>;

pub(crate) struct FormState {
    pub(crate) data: Observable<Value>,
    pub(crate) errors: Observable<ErrorStack>,
    pub(crate) transient: Observable<TransientStore>,
    pub(crate) touched: Observable<BTreeSet<String>>,
    pub(crate) registry: Observable<BTreeSet<String>>,
    /// Initial snapshot of `data`; `None` until first captured.
    pub(crate) snapshot: Observable<Option<Value>>,
    pub(crate) validators: RefCell<AHashMap<String, Validator>>,
    pub(crate) kinds: RefCell<AHashMap<String, BindingKind>>,
    pub(crate) refs: RefCell<ElementRefs>,
    pub(crate) config: FormConfig,
}

impl FormState {
    pub(crate) fn new(
        data: Observable<Value>,
        errors: Observable<ErrorStack>,
        transient: Observable<TransientStore>,
        config: FormConfig,
    ) -> Self {
        Self {
            data,
            errors,
            transient,
            touched: Observable::new(BTreeSet::new()),
            registry: Observable::new(BTreeSet::new()),
            snapshot: Observable::new(None),
            validators: RefCell::new(AHashMap::new()),
            kinds: RefCell::new(AHashMap::new()),
            refs: RefCell::new(AHashMap::new()),
            config,
        }
    }

    /// Capture the initial snapshot if it has not been taken yet.
    pub(crate) fn ensure_snapshot(&self) {
        if self.snapshot.with(Option::is_none) {
            self.snapshot.set(Some(self.data.get()));
        }
    }

    pub(crate) fn has_data(&self, path: &str) -> bool {
        self.data.with(|data| path::has(data, path))
    }

    /// Store `value` at `path` in the data object. A rejected write is
    /// logged and dropped.
    pub(crate) fn write_data(&self, path: &str, value: Value) {
        match self.data.with(|data| path::set(data, path, value)) {
            Ok(next) => self.data.set(next),
            Err(err) => {
                tracing::warn!(message = "form.write_rejected", path, error = %err);
            }
        }
    }

    pub(crate) fn remove_data(&self, path: &str) {
        match self.data.with(|data| path::remove(data, path)) {
            Ok(next) => self.data.set(next),
            Err(err) => {
                tracing::warn!(message = "form.write_rejected", path, error = %err);
            }
        }
    }

    /// Reserve an empty slot at `path` unless the data already has one.
    pub(crate) fn reserve_slot(&self, path: &str) {
        if !self.has_data(path) {
            self.write_data(path, Value::Null);
        }
    }

    pub(crate) fn touch(&self, path: &str) {
        if !self.touched.with(|set| set.contains(path)) {
            self.touched.update(|set| {
                set.insert(path.to_string());
            });
        }
    }

    pub(crate) fn is_touched(&self, path: &str) -> bool {
        self.touched.with(|set| set.contains(path))
    }

    pub(crate) fn is_dirty(&self, path: &str) -> bool {
        self.snapshot
            .with(|snapshot| self.data.with(|data| dirty_at(data, snapshot.as_ref(), path)))
    }

    pub(crate) fn register(&self, path: &str) {
        if !self.registry.with(|set| set.contains(path)) {
            self.registry.update(|set| {
                set.insert(path.to_string());
            });
        }
    }

    pub(crate) fn unregister(&self, path: &str) {
        if self.registry.with(|set| set.contains(path)) {
            self.registry.update(|set| {
                set.remove(path);
            });
        }
    }

    pub(crate) fn set_transient(&self, path: &str, value: Value) {
        self.transient.update(|overlay| {
            overlay.insert(path.to_string(), value);
        });
    }

    pub(crate) fn clear_transient(&self, path: &str) {
        if self.transient.with(|overlay| overlay.contains_key(path)) {
            self.transient.update(|overlay| {
                overlay.remove(path);
            });
        }
    }

    /// Overlay value if present, data value otherwise.
    pub(crate) fn read(&self, path: &str) -> Option<Value> {
        self.transient
            .with(|overlay| overlay.get(path).cloned())
            .or_else(|| self.data.with(|data| path::get(data, path).cloned()))
    }

    pub(crate) fn kind_of(&self, path: &str) -> Option<BindingKind> {
        self.kinds.borrow().get(path).copied()
    }
}

/// Whether `path` differs from its snapshot value.
///
/// False before a snapshot exists and for paths the data does not hold.
pub(crate) fn dirty_at(data: &Value, snapshot: Option<&Value>, path: &str) -> bool {
    let Some(current) = path::get(data, path) else {
        return false;
    };
    let Some(snapshot) = snapshot else {
        return false;
    };
    path::get(snapshot, path).is_none_or(|initial| !same_value(initial, current))
}

/// Value equality where numbers compare numerically, so `42` equals `42.0`.
pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_f64() || y.is_f64() {
                x.as_f64() == y.as_f64()
            } else {
                x == y
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| same_value(x, y)))
        }
        _ => a == b,
    }
}

/// Overlay first, then data.
pub(crate) fn overlay_or_data(overlay: &TransientStore, data: &Value, path: &str) -> Option<Value> {
    overlay
        .get(path)
        .or_else(|| path::get(data, path))
        .cloned()
}
