#![forbid(unsafe_code)]

//! Single-threaded reactive cells used by the formcell engine.
//!
//! - [`Observable`]: root cell. Versioned, equality-gated writes.
//! - [`Computed`]: memoized cell derived from observables or other computed
//!   cells through the [`Dependency`] trait.
//! - [`Subscription`]: guard that keeps a callback registered while alive.
//! - [`BatchScope`]: guard that holds host callbacks back until it drops.
//!
//! Cells are `Rc`-based and `!Send`; each UI thread owns its own graph.
//!
//! # Propagation
//!
//! A write first flags every reachable computed cell as stale, depth first
//! and synchronously. Host callbacks queued along the way run after that
//! wave (or after the outermost [`BatchScope`]), once per cell, in the order
//! the cells were first reached. Values are recomputed only when read.
//!
//! # Invariants
//!
//! 1. An observable's version grows by one per value-changing write.
//! 2. Writing an equal value changes nothing and notifies nobody.
//! 3. Callbacks on one cell run in registration order.
//! 4. A dropped [`Subscription`] never fires again.
//! 5. Reads never see stale derived values, inside a batch or not.

pub mod batch;
pub mod computed;
pub mod observable;

pub use batch::BatchScope;
pub use computed::{Computed, Dependency};
pub use observable::{Observable, Subscription};
