#![forbid(unsafe_code)]

//! Derived cells.
//!
//! A [`Computed<T>`] caches the result of a closure over other cells. Writes
//! upstream only mark it stale (and, through its edges, every cell derived
//! from it); the closure runs again on the next read. A form engine can
//! therefore keep one cell per field and flag without paying for the ones
//! nobody is looking at.
//!
//! Sources are wired through the [`Dependency`] trait. [`Observable`] and
//! `Computed` both implement it, so cells nest.
//!
//! # Invariants
//!
//! 1. A read never returns a value older than the last completed write to
//!    any upstream cell, however many computed cells sit in between.
//! 2. Between two upstream changes the closure runs at most once.
//! 3. `version()` counts closure runs.
//! 4. Host callbacks run once per wave, after every stale cell is flagged.
//!
//! # Edge cases
//!
//! - A source dropped while the cell lives leaves the last cached value in
//!   place; that source can no longer stale it.
//! - A panicking closure leaves the cell stale, so the next read retries.
//! - Cycles are not detected: a closure that reads its own cell recurses
//!   until the stack overflows.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::batch::{self, Wave};
use crate::observable::{Observable, Subscription};

/// A source a [`Computed`] can depend on.
pub trait Dependency {
    /// Run `on_change` synchronously whenever this source changes or is
    /// invalidated. The edge lives as long as the returned subscription.
    fn on_invalidate(&self, on_change: Rc<dyn Fn()>) -> Subscription;
}

impl<T: Clone + PartialEq + 'static> Dependency for Observable<T> {
    fn on_invalidate(&self, on_change: Rc<dyn Fn()>) -> Subscription {
        self.subscribe_edge(on_change)
    }
}

impl<T: Clone + 'static> Dependency for Computed<T> {
    fn on_invalidate(&self, on_change: Rc<dyn Fn()>) -> Subscription {
        self.inner
            .edges
            .borrow_mut()
            .push(Rc::downgrade(&on_change));
        Subscription::new(on_change)
    }
}

struct ComputedInner<T> {
    compute: Box<dyn Fn() -> T>,
    /// `None` until the first read.
    cached: RefCell<Option<T>>,
    dirty: Cell<bool>,
    version: Cell<u64>,
    /// Cells derived from this one.
    edges: RefCell<Vec<Weak<dyn Fn()>>>,
    /// Host callbacks, run after the invalidation wave.
    listeners: RefCell<Vec<Weak<dyn Fn()>>>,
    /// Keeps the edges into our sources alive.
    subscriptions: RefCell<Vec<Subscription>>,
}

impl<T: 'static> ComputedInner<T> {
    fn mark_dirty(self: &Rc<Self>) {
        self.dirty.set(true);

        let edges: Vec<Rc<dyn Fn()>> = {
            let mut edges = self.edges.borrow_mut();
            edges.retain(|weak| weak.strong_count() > 0);
            edges.iter().filter_map(Weak::upgrade).collect()
        };
        for edge in edges {
            edge();
        }

        let has_listeners = {
            let mut listeners = self.listeners.borrow_mut();
            listeners.retain(|weak| weak.strong_count() > 0);
            !listeners.is_empty()
        };
        if has_listeners {
            let key = Rc::as_ptr(self) as *const () as usize;
            let weak = Rc::downgrade(self);
            batch::defer(
                key,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.notify_listeners();
                    }
                }),
            );
        }
    }

    fn notify_listeners(&self) {
        let listeners: Vec<Rc<dyn Fn()>> = self
            .listeners
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for listener in listeners {
            listener();
        }
    }

    fn refresh(&self) {
        let stale = self.dirty.get() || self.cached.borrow().is_none();
        if stale {
            let new_value = (self.compute)();
            *self.cached.borrow_mut() = Some(new_value);
            self.dirty.set(false);
            self.version.set(self.version.get() + 1);
        }
    }
}

/// Memoized value derived from other cells.
///
/// Handles are cheap to clone and all point at one cache.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("cached", &self.inner.cached.borrow())
            .field("dirty", &self.inner.dirty.get())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value from an explicit dependency list.
    ///
    /// `compute` may read any of `deps` (and anything else), but only changes
    /// to `deps` invalidate the cached value.
    pub fn derive(deps: &[&dyn Dependency], compute: impl Fn() -> T + 'static) -> Self {
        let computed = Self::from_fn(compute, Vec::new());
        let subscriptions: Vec<Subscription> = deps
            .iter()
            .map(|dep| {
                let weak = Rc::downgrade(&computed.inner);
                let edge: Rc<dyn Fn()> = Rc::new(move || {
                    if let Some(strong) = weak.upgrade() {
                        strong.mark_dirty();
                    }
                });
                dep.on_invalidate(edge)
            })
            .collect();
        computed.inner.subscriptions.borrow_mut().extend(subscriptions);
        computed
    }

    /// Map one observable.
    pub fn from_observable<S: Clone + PartialEq + 'static>(
        source: &Observable<S>,
        map: impl Fn(&S) -> T + 'static,
    ) -> Self {
        let source_clone = source.clone();
        Self::derive(&[source], move || source_clone.with(|v| map(v)))
    }

    /// Combine two observables.
    pub fn from2<S1, S2>(
        s1: &Observable<S1>,
        s2: &Observable<S2>,
        map: impl Fn(&S1, &S2) -> T + 'static,
    ) -> Self
    where
        S1: Clone + PartialEq + 'static,
        S2: Clone + PartialEq + 'static,
    {
        let s1_clone = s1.clone();
        let s2_clone = s2.clone();
        Self::derive(&[s1, s2], move || {
            s1_clone.with(|v1| s2_clone.with(|v2| map(v1, v2)))
        })
    }

    /// Combine three observables.
    pub fn from3<S1, S2, S3>(
        s1: &Observable<S1>,
        s2: &Observable<S2>,
        s3: &Observable<S3>,
        map: impl Fn(&S1, &S2, &S3) -> T + 'static,
    ) -> Self
    where
        S1: Clone + PartialEq + 'static,
        S2: Clone + PartialEq + 'static,
        S3: Clone + PartialEq + 'static,
    {
        let s1_clone = s1.clone();
        let s2_clone = s2.clone();
        let s3_clone = s3.clone();
        Self::derive(&[s1, s2, s3], move || {
            s1_clone.with(|v1| s2_clone.with(|v2| s3_clone.with(|v3| map(v1, v2, v3))))
        })
    }

    /// Map another computed cell.
    pub fn from_computed<S: Clone + 'static>(
        source: &Computed<S>,
        map: impl Fn(&S) -> T + 'static,
    ) -> Self {
        let source_clone = source.clone();
        Self::derive(&[source], move || source_clone.with(|v| map(v)))
    }

    /// A cell that always yields `value`.
    pub fn constant(value: T) -> Self {
        Self::from_fn(move || value.clone(), Vec::new())
    }

    /// Cell over `compute` whose staleness is driven only by the given
    /// subscriptions (or by [`invalidate`](Self::invalidate)).
    pub fn from_fn(compute: impl Fn() -> T + 'static, subscriptions: Vec<Subscription>) -> Self {
        Self {
            inner: Rc::new(ComputedInner {
                compute: Box::new(compute),
                cached: RefCell::new(None),
                dirty: Cell::new(true),
                version: Cell::new(0),
                edges: RefCell::new(Vec::new()),
                listeners: RefCell::new(Vec::new()),
                subscriptions: RefCell::new(subscriptions),
            }),
        }
    }

    /// Current value, recomputed first when stale.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(Clone::clone)
    }

    /// Borrow the current value, recomputing first when stale.
    ///
    /// # Panics
    ///
    /// Panics if `f` reads this same cell while it is stale.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.refresh();
        let cached = self.inner.cached.borrow();
        f(cached
            .as_ref()
            .expect("refresh fills the cache"))
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Force invalidation of the cached value and of every cell derived from
    /// it. The next `get()` will recompute.
    pub fn invalidate(&self) {
        let _wave = Wave::open();
        self.inner.mark_dirty();
    }

    /// Number of recomputations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Register a callback that runs whenever this cell goes stale.
    ///
    /// The callback does not receive the value; read it with `get()`, which
    /// is safe from inside the callback.
    #[must_use = "dropping the subscription immediately unsubscribes"]
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        let strong: Rc<dyn Fn()> = Rc::new(callback);
        self.inner
            .listeners
            .borrow_mut()
            .push(Rc::downgrade(&strong));
        Subscription::new(strong)
    }

    /// Whether both handles point at the same cell.
    #[must_use]
    pub fn same_cell(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn recomputes_after_source_write() {
        let age = Observable::new(17);
        let adult = Computed::from_observable(&age, |v| *v >= 18);

        assert!(!adult.get());
        assert_eq!(adult.version(), 1);

        age.set(30);
        assert!(adult.is_dirty());
        assert!(adult.get());
        assert_eq!(adult.version(), 2);
    }

    #[test]
    fn combines_two_and_three_sources() {
        let first = Observable::new("Ada".to_string());
        let last = Observable::new("Lovelace".to_string());
        let full = Computed::from2(&first, &last, |f, l| format!("{f} {l}"));
        assert_eq!(full.get(), "Ada Lovelace");
        last.set("King".into());
        assert_eq!(full.get(), "Ada King");

        let (x, y, z) = (Observable::new(1), Observable::new(2), Observable::new(4));
        let mask = Computed::from3(&x, &y, &z, |a, b, c| a | b | c);
        assert_eq!(mask.get(), 7);
        z.set(8);
        assert_eq!(mask.get(), 11);
    }

    #[test]
    fn reads_between_writes_hit_the_cache() {
        let runs = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&runs);
        let text = Observable::new("abc".to_string());
        let len = Computed::from_observable(&text, move |t| {
            counter.set(counter.get() + 1);
            t.len()
        });

        for _ in 0..3 {
            assert_eq!(len.get(), 3);
        }
        assert_eq!(runs.get(), 1);

        text.set("abcdef".into());
        assert_eq!(len.get(), 6);
        assert_eq!(len.get(), 6);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn staleness_reaches_the_end_of_a_chain() {
        let raw = Observable::new(2);
        let doubled = Computed::from_observable(&raw, |v| v * 2);
        let label = Computed::from_computed(&doubled, |v| format!("#{v}"));

        assert_eq!(label.get(), "#4");
        raw.set(3);
        assert!(doubled.is_dirty());
        assert!(label.is_dirty());
        assert_eq!(label.get(), "#6");
    }

    #[test]
    fn diamond_callback_sees_consistent_graph() {
        let root = Observable::new(10);
        let left = Computed::from_observable(&root, |v| v + 1);
        let right = Computed::from_observable(&root, |v| v * 2);

        let (l, r) = (left.clone(), right.clone());
        let joined = Computed::derive(&[&left, &right], move || l.get() + r.get());
        assert_eq!(joined.get(), 31);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let (reader, log) = (joined.clone(), Rc::clone(&seen));
        let _sub = joined.subscribe(move || log.borrow_mut().push(reader.get()));

        root.set(5);
        assert_eq!(*seen.borrow(), vec![16]);
    }

    #[test]
    fn manual_invalidate_propagates() {
        let source = Observable::new(5);
        let base = Computed::from_observable(&source, |v| *v);
        let derived = Computed::from_computed(&base, |v| v + 1);

        assert_eq!(derived.get(), 6);
        base.invalidate();
        assert!(derived.is_dirty());
        assert_eq!(derived.get(), 6);
        assert_eq!(base.version(), 2);
    }

    #[test]
    fn equal_write_keeps_cache_fresh() {
        let flag = Observable::new(true);
        let shown = Computed::from_observable(&flag, |v| !*v);
        let _ = shown.get();
        flag.set(true);
        assert!(!shown.is_dirty());
    }

    #[test]
    fn subscription_fires_per_change_until_dropped() {
        let source = Observable::new(0);
        let cell = Computed::from_observable(&source, |v| *v);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let sub = cell.subscribe(move || counter.set(counter.get() + 1));

        source.set(1);
        source.set(2);
        assert_eq!(calls.get(), 2);

        drop(sub);
        source.set(3);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn constant_is_computed_once() {
        let unmanaged = Computed::constant("unmanaged");
        assert_eq!(unmanaged.get(), "unmanaged");
        assert_eq!(unmanaged.get(), "unmanaged");
        assert!(!unmanaged.is_dirty());
        assert_eq!(unmanaged.version(), 1);
    }

    #[test]
    fn outlives_its_source() {
        let cell;
        {
            let source = Observable::new(7);
            cell = Computed::from_observable(&source, |v| v * 3);
            assert_eq!(cell.get(), 21);
        }
        assert_eq!(cell.get(), 21);
        assert!(!cell.is_dirty());
    }

    #[test]
    fn handles_share_one_cache() {
        let source = Observable::new(1);
        let a = Computed::from_observable(&source, |v| v + 1);
        let b = a.clone();
        source.set(9);
        assert_eq!(a.get(), 10);
        assert_eq!(b.version(), 1);
        assert!(a.same_cell(&b));
    }

    #[test]
    fn debug_shows_cache_state() {
        let source = Observable::new(7);
        let cell = Computed::from_observable(&source, |v| *v);
        let _ = cell.get();
        let dbg = format!("{cell:?}");
        assert!(dbg.starts_with("Computed"));
        assert!(dbg.contains("Some(7)"));
    }
}
