//! The browser driver capability.
//!
//! Everything the core does goes through [`Driver`]. Calls are blocking and
//! strictly sequential; a driver is owned by exactly one [`Session`](crate::Session).

use crate::query::Query;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Opaque handle to a live element, issued by the driver that found it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure conditions reported by a driver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("stale element: {0}")]
    StaleElement(String),

    #[error("element not interactable: {0}")]
    NotInteractable(String),

    #[error("no such alert")]
    NoSuchAlert,

    #[error("unexpected alert open: {0}")]
    UnexpectedAlert(String),

    #[error("no such window: {0}")]
    NoSuchWindow(String),

    #[error("no such frame: {0}")]
    NoSuchFrame(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("session error: {0}")]
    Session(String),
}

impl DriverError {
    /// Session-level faults are never recovered locally.
    pub fn is_session_fault(&self) -> bool {
        matches!(self, DriverError::Session(_))
    }

    /// Absence conditions that a lookup treats as a non-match.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            DriverError::NoSuchElement(_) | DriverError::StaleElement(_)
        )
    }
}

/// Which option of a `<select>` to pick.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionChoice {
    /// Position among the options, from zero.
    Index(usize),
    /// The option's `value`.
    Value(String),
    /// The option's visible text, trimmed.
    Text(String),
}

impl fmt::Display for OptionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionChoice::Index(i) => write!(f, "option #{}", i),
            OptionChoice::Value(v) => write!(f, "option value {:?}", v),
            OptionChoice::Text(t) => write!(f, "option {:?}", t),
        }
    }
}

/// Result type for driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Synchronous browser capability.
///
/// Implementations direct every call at the currently active context
/// (window + frame). While a native dialog is open, every call other than
/// the alert methods must fail with [`DriverError::UnexpectedAlert`].
pub trait Driver {
    // Lookup
    fn find_all(&mut self, query: &Query) -> DriverResult<Vec<ElementRef>>;
    fn find_within(&mut self, parent: &ElementRef, query: &Query) -> DriverResult<Vec<ElementRef>>;

    // State reads
    fn is_displayed(&mut self, el: &ElementRef) -> DriverResult<bool>;
    fn is_selected(&mut self, el: &ElementRef) -> DriverResult<bool>;
    fn text(&mut self, el: &ElementRef) -> DriverResult<String>;
    fn attribute(&mut self, el: &ElementRef, name: &str) -> DriverResult<Option<String>>;
    /// Live DOM property (`value`, `checked`, ...), as opposed to the markup attribute.
    fn property(&mut self, el: &ElementRef, name: &str) -> DriverResult<Option<String>>;

    // Actions
    fn click(&mut self, el: &ElementRef) -> DriverResult<()>;
    fn send_keys(&mut self, el: &ElementRef, text: &str) -> DriverResult<()>;
    fn clear(&mut self, el: &ElementRef) -> DriverResult<()>;
    /// Move the pointer over the element, firing its hover handlers.
    fn hover(&mut self, el: &ElementRef) -> DriverResult<()>;
    /// Select one option of a `<select>` and fire `change`. A choice that
    /// matches no option is [`DriverError::NoSuchElement`].
    fn select_option(&mut self, el: &ElementRef, choice: &OptionChoice) -> DriverResult<()>;

    /// Run a script with `arguments[i]` bound to `args[i]`.
    fn execute_script(&mut self, script: &str, args: &[ElementRef]) -> DriverResult<Value>;

    /// Forced click that bypasses hit-testing.
    fn script_click(&mut self, el: &ElementRef) -> DriverResult<()> {
        self.execute_script("arguments[0].click();", std::slice::from_ref(el))?;
        Ok(())
    }

    // Alerts
    fn alert_text(&mut self) -> DriverResult<String>;
    fn accept_alert(&mut self) -> DriverResult<()>;
    fn dismiss_alert(&mut self) -> DriverResult<()>;
    fn send_alert_text(&mut self, text: &str) -> DriverResult<()>;

    // Windows
    fn window_handle(&mut self) -> DriverResult<String>;
    fn window_handles(&mut self) -> DriverResult<Vec<String>>;
    fn switch_to_window(&mut self, handle: &str) -> DriverResult<()>;
    /// Close the current window. The driver has no current window until the
    /// caller switches to another handle.
    fn close_window(&mut self) -> DriverResult<()>;

    // Frames
    fn switch_to_frame(&mut self, frame: &ElementRef) -> DriverResult<()>;
    fn switch_to_parent_frame(&mut self) -> DriverResult<()>;
    fn switch_to_default_content(&mut self) -> DriverResult<()>;

    // Document
    fn goto(&mut self, url: &str) -> DriverResult<()>;
    fn current_url(&mut self) -> DriverResult<String>;
    fn title(&mut self) -> DriverResult<String>;
    fn page_source(&mut self) -> DriverResult<String>;

    /// End the browsing session.
    fn quit(&mut self) -> DriverResult<()>;
}
