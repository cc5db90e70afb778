#![forbid(unsafe_code)]

//! Reactive form state engine.
//!
//! A [`FormEngine`] sits over a host-owned data object (an
//! [`Observable<serde_json::Value>`](formcell_reactive::Observable)) and hands
//! out one memoized [`FieldBundle`] per JSON-pointer path. Each bundle holds
//! derived cells for the field's value, error, dirty and touched state, plus
//! a [`BindingConfig`] describing how UI events mutate that state:
//!
//! - **controlled**: the engine holds the value and the host displays it;
//! - **uncontrolled**: a host [`FieldElement`] holds the value and the engine
//!   reads it back on committed changes;
//! - **transient**: the value lives in an overlay and never reaches the data
//!   object.
//!
//! # Example
//!
//! ```
//! use formcell::{FieldOptions, FormEngine, validation};
//! use formcell_reactive::Observable;
//! use serde_json::json;
//!
//! let data = Observable::new(json!({}));
//! let engine = FormEngine::new(data.clone());
//!
//! let email = engine.field_bundle(
//!     "/email",
//!     FieldOptions::controlled().with_validator(validation::required()),
//! );
//! email.binding().mount();
//! assert_eq!(data.get(), json!({"email": null}));
//!
//! let control = email.binding().as_controlled().unwrap();
//! control.on_change(json!(""));
//! assert_eq!(email.error().get().map(|e| e.kind), Some("required".into()));
//!
//! control.on_change(json!("a@b.com"));
//! assert!(email.error().get().is_none());
//! assert!(email.touched().get());
//! ```

pub mod binding;
pub mod config;
pub mod element;
pub mod engine;
pub mod error;
pub mod error_stack;
pub mod field;
pub mod lifecycle;
pub mod path;
mod state;
pub mod validation;

pub use binding::{
    BindingConfig, BindingKind, ControlledBinding, Listeners, TransientBinding,
    UncontrolledBinding,
};
pub use config::{FormConfig, ResetPolicy};
pub use element::{ChangeEventKind, FieldElement, InputElement, InputKind};
pub use engine::{FormEngine, FormEngineBuilder, Store};
pub use error::{FormError, PathError, Result};
pub use error_stack::{ErrorEntry, ErrorStack, FieldError, has_sub_errors, sub_errors};
pub use field::{FieldBundle, FieldOptions, FieldState, FieldValue};
pub use lifecycle::{Conditional, MountScope};
pub use state::TransientStore;
pub use validation::{FieldStatus, Validator};
