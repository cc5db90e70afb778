#![forbid(unsafe_code)]

//! Host element adapter for uncontrolled fields.
//!
//! Uncontrolled fields leave the displayed value to a UI element and only
//! read it back when the element reports a change. The engine talks to the
//! element through [`FieldElement`]; concrete UI layers implement it for
//! their own widgets. [`InputElement`] is an in-memory implementation that
//! follows the usual HTML input coercions, useful for headless hosts and
//! tests.

use std::cell::RefCell;

use serde_json::{Number, Value};

/// Which host event carries a committed change for an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeEventKind {
    #[default]
    Change,
    Click,
    Input,
}

/// Capability interface for a UI element that owns its displayed value.
pub trait FieldElement {
    /// The element's current value mapped to an engine value. An empty
    /// string means "cleared".
    fn read_value(&self) -> Value;

    /// Display `value`; `None` clears the element.
    fn write_value(&self, value: Option<&Value>);

    /// Event that signals a committed change.
    fn change_event_kind(&self) -> ChangeEventKind {
        ChangeEventKind::Change
    }
}

/// Input flavors understood by [`InputElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Number,
    Range,
    Checkbox,
    Radio,
    Select,
}

#[derive(Debug, Default)]
struct InputState {
    text: String,
    checked: bool,
}

/// In-memory input element.
#[derive(Debug)]
pub struct InputElement {
    kind: InputKind,
    state: RefCell<InputState>,
}

impl InputElement {
    #[must_use]
    pub fn new(kind: InputKind) -> Self {
        Self {
            kind,
            state: RefCell::new(InputState::default()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> InputKind {
        self.kind
    }

    /// Raw text, as a user would type it.
    #[must_use]
    pub fn text(&self) -> String {
        self.state.borrow().text.clone()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.state.borrow_mut().text = text.into();
    }

    #[must_use]
    pub fn checked(&self) -> bool {
        self.state.borrow().checked
    }

    pub fn set_checked(&self, checked: bool) {
        self.state.borrow_mut().checked = checked;
    }
}

impl FieldElement for InputElement {
    fn read_value(&self) -> Value {
        let state = self.state.borrow();
        match self.kind {
            InputKind::Checkbox => Value::Bool(state.checked),
            InputKind::Number | InputKind::Range => state
                .text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(number_from_f64)
                .map_or_else(|| Value::String(String::new()), Value::Number),
            InputKind::Text | InputKind::Radio | InputKind::Select => {
                Value::String(state.text.clone())
            }
        }
    }

    fn write_value(&self, value: Option<&Value>) {
        let mut state = self.state.borrow_mut();
        match self.kind {
            InputKind::Checkbox => {
                state.checked = matches!(value, Some(Value::Bool(true)));
            }
            _ => {
                state.text = match value {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => render_number(n),
                    Some(other) => other.to_string(),
                };
            }
        }
    }

    fn change_event_kind(&self) -> ChangeEventKind {
        match self.kind {
            InputKind::Checkbox | InputKind::Radio => ChangeEventKind::Click,
            InputKind::Range => ChangeEventKind::Input,
            _ => ChangeEventKind::Change,
        }
    }
}

/// Largest magnitude below which every integer is exact in an `f64`.
const EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Whole numbers become integer `Number`s so they equal integer data.
fn number_from_f64(parsed: f64) -> Option<Number> {
    if parsed.fract() == 0.0 && parsed.abs() < EXACT_INT {
        #[allow(clippy::cast_possible_truncation)]
        return Some(Number::from(parsed as i64));
    }
    Number::from_f64(parsed)
}

fn render_number(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < EXACT_INT => {
            #[allow(clippy::cast_possible_truncation)]
            let whole = f as i64;
            whole.to_string()
        }
        _ => n.to_string(),
    }
}
