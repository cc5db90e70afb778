#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! The defaults reproduce the long-standing behavior of `reset()`: it clears
//! the data object, the transient overlay and the element handles, and leaves
//! interaction history, the error stack, the field registry and the initial
//! snapshot alone. [`ResetPolicy`] opts into clearing those as well.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What `reset()` clears beyond the data object and transient overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetPolicy {
    /// Forget which fields have been touched.
    pub clear_touched: bool,
    /// Empty the error stack.
    pub clear_errors: bool,
    /// Unregister every field.
    pub clear_registry: bool,
    /// Drop the initial snapshot; it is recaptured on the next read.
    pub clear_snapshot: bool,
}

impl ResetPolicy {
    /// Clear everything the engine tracks.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            clear_touched: true,
            clear_errors: true,
            clear_registry: true,
            clear_snapshot: true,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    pub reset: ResetPolicy,
}

impl FormConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reset(mut self, reset: ResetPolicy) -> Self {
        self.reset = reset;
        self
    }

    /// Parse a JSON configuration. Missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
