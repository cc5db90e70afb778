#![forbid(unsafe_code)]

//! Mount lifecycle helpers for hosts without their own component lifecycle.
//!
//! A [`MountScope`] is an RAII guard: constructing it fires every listener's
//! `on_mount`, dropping it fires every `on_unmount` in reverse order.
//! [`Conditional`] holds a scope only while a section is visible, so toggling
//! visibility mounts and unmounts its fields exactly once per transition.

use crate::binding::Listeners;

/// Mounted group of fields.
#[derive(Debug)]
#[must_use = "dropping the scope unmounts its fields immediately"]
pub struct MountScope {
    listeners: Vec<Listeners>,
}

impl MountScope {
    pub fn new(listeners: impl IntoIterator<Item = Listeners>) -> Self {
        let listeners: Vec<Listeners> = listeners.into_iter().collect();
        for listener in &listeners {
            listener.on_mount();
        }
        Self { listeners }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl Drop for MountScope {
    fn drop(&mut self) {
        for listener in self.listeners.iter().rev() {
            listener.on_unmount();
        }
    }
}

/// Section shown or hidden by a condition.
#[derive(Debug)]
pub struct Conditional {
    listeners: Vec<Listeners>,
    scope: Option<MountScope>,
}

impl Conditional {
    /// A hidden section over `listeners`.
    pub fn new(listeners: impl IntoIterator<Item = Listeners>) -> Self {
        Self {
            listeners: listeners.into_iter().collect(),
            scope: None,
        }
    }

    /// Apply `visible`. Repeating the current state does nothing.
    pub fn set_visible(&mut self, visible: bool) {
        match (visible, self.scope.is_some()) {
            (true, false) => self.scope = Some(MountScope::new(self.listeners.clone())),
            (false, true) => self.scope = None,
            _ => {}
        }
    }

    pub fn show(&mut self) {
        self.set_visible(true);
    }

    pub fn hide(&mut self) {
        self.set_visible(false);
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.scope.is_some()
    }
}
