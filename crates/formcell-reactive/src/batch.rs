#![forbid(unsafe_code)]

//! Deferred notification scopes.
//!
//! Every write to an [`Observable`](crate::Observable) runs in two phases.
//! First the invalidation wave: derived cells reachable from the written cell
//! are marked dirty, synchronously and transitively. Then, once the wave is
//! complete, subscriber callbacks run. A callback therefore never observes a
//! graph in which some derived cells have been invalidated and others have
//! not.
//!
//! A [`BatchScope`] stretches the second phase: while one is alive on the
//! current thread, callbacks queue up and run once, when the outermost scope
//! drops.
//!
//! # Invariants
//!
//! 1. Reads inside a scope see the latest written values, including through
//!    computed cells.
//! 2. A cell written or invalidated several times inside one wave or scope
//!    notifies its subscribers once.
//! 3. Nested scopes flush only when the outermost scope exits.
//! 4. Callbacks run in the order their cells were first queued.

use std::cell::RefCell;
use std::fmt;

use ahash::AHashSet;

type Deferred = Box<dyn FnOnce()>;

#[derive(Default)]
struct BatchState {
    scopes: usize,
    waves: usize,
    pending: Vec<Deferred>,
    /// Keys of `pending`, cleared together with it.
    queued: AHashSet<usize>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Queue a notification keyed by cell identity. A key already queued is
/// ignored; its callback will read the latest state when it runs.
///
/// `key` is the address of the cell's `Rc` allocation. The queued callback
/// holds a `Weak` to that allocation, which keeps the address reserved until
/// the flush drops the callback.
pub(crate) fn defer(key: usize, notify: Deferred) {
    BATCH.with(|state| {
        let mut state = state.borrow_mut();
        if state.queued.insert(key) {
            state.pending.push(notify);
        }
    });
}

fn flush_if_idle() {
    let pending = BATCH.with(|state| {
        let mut state = state.borrow_mut();
        if state.scopes == 0 && state.waves == 0 {
            state.queued.clear();
            std::mem::take(&mut state.pending)
        } else {
            Vec::new()
        }
    });
    if pending.is_empty() {
        return;
    }
    tracing::trace!(message = "batch.flush", notifications = pending.len());
    for notify in pending {
        notify();
    }
}

/// Guard for one invalidation wave. Callbacks queued during the wave run when
/// the outermost wave closes, unless a [`BatchScope`] holds them longer.
pub(crate) struct Wave {
    _private: (),
}

impl Wave {
    pub(crate) fn open() -> Self {
        BATCH.with(|state| state.borrow_mut().waves += 1);
        Self { _private: () }
    }
}

impl Drop for Wave {
    fn drop(&mut self) {
        BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.waves = state.waves.saturating_sub(1);
        });
        flush_if_idle();
    }
}

/// RAII guard that batches subscriber notifications.
///
/// ```
/// use formcell_reactive::{BatchScope, Observable};
///
/// let a = Observable::new(0);
/// {
///     let _batch = BatchScope::new();
///     a.set(1);
///     a.set(2);
///     assert_eq!(a.get(), 2);
/// } // subscribers of `a` run once here
/// ```
#[must_use = "notifications flush when the scope is dropped"]
pub struct BatchScope {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl BatchScope {
    /// Open a batch scope on the current thread.
    pub fn new() -> Self {
        BATCH.with(|state| state.borrow_mut().scopes += 1);
        Self {
            _not_send: std::marker::PhantomData,
        }
    }

    /// Nesting depth of open scopes on this thread.
    #[must_use]
    pub fn depth() -> usize {
        BATCH.with(|state| state.borrow().scopes)
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.scopes = state.scopes.saturating_sub(1);
        });
        flush_if_idle();
    }
}

impl fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScope")
            .field("depth", &Self::depth())
            .finish()
    }
}
