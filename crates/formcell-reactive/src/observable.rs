#![forbid(unsafe_code)]

//! Shared, version-tracked observable cells.
//!
//! # Design
//!
//! [`Observable<T>`] is the root of every reactive graph in formcell: the form
//! data object, the error stack, the touched set and the transient overlay are
//! all observables. Writes go through [`set`](Observable::set) or
//! [`update`](Observable::update); both compare against the current value and
//! do nothing when it is unchanged.
//!
//! Subscribers are stored as `Weak` callbacks. The strong side lives in the
//! [`Subscription`] guard returned from [`subscribe`](Observable::subscribe),
//! so dropping the guard is all it takes to disconnect. Dead entries are
//! pruned lazily on the next notification.
//!
//! Derived cells attach through a separate edge list. On a write, edges run
//! first and synchronously (they only mark computed cells dirty); subscriber
//! callbacks are queued and run once the whole invalidation wave is done.
//!
//! # Failure Modes
//!
//! - **Subscriber writes back into the same observable**: the nested write
//!   starts a fresh wave and notifies synchronously; every callback receives
//!   the value current at the time it runs.
//! - **Subscriber panics**: propagates to the writer. The value and version
//!   have already been committed.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::batch::{self, Wave};

type Callback<T> = dyn Fn(&T);

struct ObservableInner<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<Callback<T>>>,
    edges: Vec<Weak<dyn Fn()>>,
}

/// A shared, mutable value with change notification.
///
/// Cloning an `Observable` creates a new handle to the **same** cell, so two
/// forms built over one data handle observe each other's writes.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .field("edges", &inner.edges.len())
            .finish()
    }
}

impl<T: Default + Clone + PartialEq + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a new observable holding `value` at version 0.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
                edges: Vec::new(),
            })),
        }
    }

    /// Clone out the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference.
    ///
    /// # Panics
    ///
    /// Panics if the closure writes to this same observable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value. Equal values are ignored.
    pub fn set(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value;
            inner.version += 1;
        }
        self.notify();
    }

    /// Mutate a copy of the value and commit it if it changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }

    /// Number of value-changing writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Register a callback invoked with the new value after every change.
    ///
    /// The callback stays registered for as long as the returned
    /// [`Subscription`] is alive.
    #[must_use = "dropping the subscription immediately unsubscribes"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<Callback<T>> = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription::new(strong)
    }

    /// Number of live subscribers, derived cells included.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.borrow();
        let hosts = inner
            .subscribers
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count();
        let edges = inner
            .edges
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count();
        hosts + edges
    }

    /// Whether both handles point at the same cell.
    #[must_use]
    pub fn same_cell(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn subscribe_edge(&self, edge: Rc<dyn Fn()>) -> Subscription {
        self.inner.borrow_mut().edges.push(Rc::downgrade(&edge));
        Subscription::new(edge)
    }

    fn notify(&self) {
        let _wave = Wave::open();
        let (edges, has_subscribers) = {
            let mut inner = self.inner.borrow_mut();
            inner.edges.retain(|weak| weak.strong_count() > 0);
            inner.subscribers.retain(|weak| weak.strong_count() > 0);
            let edges: Vec<Rc<dyn Fn()>> =
                inner.edges.iter().filter_map(Weak::upgrade).collect();
            (edges, !inner.subscribers.is_empty())
        };
        for edge in edges {
            edge();
        }
        if has_subscribers {
            let key = Rc::as_ptr(&self.inner) as *const () as usize;
            let weak = Rc::downgrade(&self.inner);
            batch::defer(
                key,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        Observable { inner }.notify_subscribers();
                    }
                }),
            );
        }
    }

    fn notify_subscribers(&self) {
        let (value, callbacks) = {
            let inner = self.inner.borrow();
            let callbacks: Vec<Rc<Callback<T>>> =
                inner.subscribers.iter().filter_map(Weak::upgrade).collect();
            (inner.value.clone(), callbacks)
        };
        for callback in callbacks {
            callback(&value);
        }
    }
}

/// RAII guard for a registered callback.
///
/// Holds the only strong reference to the callback; the cell being observed
/// keeps a `Weak`. Dropping the guard unsubscribes.
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl Subscription {
    pub(crate) fn new<G: 'static>(guard: G) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
