//! # grapple-core
//!
//! Resilient browser interaction: ordered-candidate element lookup,
//! strategies that only count when observable state changes, scoped
//! frame and window switching that always restores, and table
//! reconciliation. Everything runs against the [`Driver`] trait.
//!
//! ## Quick Start
//!
//! ```rust
//! use grapple_core::memory::{MemoryDriver, Node};
//! use grapple_core::{ActionStrategy, Expectation, Property, Query, Session, Target, Verification};
//!
//! # fn main() -> grapple_core::Result<()> {
//! let mut driver = MemoryDriver::new();
//! driver.add(Node::new("label").attr("for", "ctl00_SeniorCitizenDiscount"));
//! driver.add(Node::new("input").attr("type", "checkbox").id("ctl00_SeniorCitizenDiscount"));
//!
//! let target = Target::new("senior citizen")
//!     .candidate(Query::label_for("SeniorCitizen"))
//!     .candidate(Query::id_contains("SeniorCitizen"));
//! let proof = Verification::new(Property::Checked, Expectation::Flip)
//!     .probe(Target::new("checkbox").candidate(Query::id_contains("SeniorCitizen")));
//!
//! let mut session = Session::new(driver);
//! let run = session.execute(
//!     &target,
//!     &[
//!         ActionStrategy::direct_click(proof.clone()),
//!         ActionStrategy::scripted_click(proof),
//!     ],
//! )?;
//! assert!(run.succeeded());
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod context;
pub mod driver;
pub mod locator;
pub mod memory;
pub mod query;
pub mod reconcile;
pub mod session;
pub mod snapshot;
pub mod strategy;
pub mod table;
pub mod wait;

pub use alert::Disposition;
pub use context::{BrowsingContext, ContextDescriptor, ContextFrame, ContextStack};
pub use driver::{Driver, DriverError, DriverResult, ElementRef, OptionChoice};
pub use locator::{Resolved, Target, TextMatch};
pub use query::Query;
pub use reconcile::ReconciliationResult;
pub use session::{Scope, Session};
pub use snapshot::{Expectation, Property, Snapshot, StateValue};
pub use strategy::{
    ActionStrategy, Attempt, Diagnostic, Execution, Interaction, Precondition, StrategyOutcome,
    Verification,
};
pub use table::{TableExtractor, TableRecord};
pub use wait::{CancelToken, Poll};

/// Result type for grapple-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core. Strategy-level trouble is an outcome, not
/// an error; see [`StrategyOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("element not found: {target}")]
    NotFound { target: String },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("no active alert")]
    NoActiveAlert,

    #[error("context lost: window {handle} no longer exists")]
    ContextLost { handle: String },

    #[error("malformed aggregate input at {}: {value:?}", location(.row, .column))]
    MalformedAggregateInput {
        row: Option<usize>,
        column: usize,
        value: String,
    },

    #[error("timeout after {elapsed_ms}ms waiting for {waited_for}")]
    Timeout { waited_for: String, elapsed_ms: u64 },

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),
}

fn location(row: &Option<usize>, column: &usize) -> String {
    match row {
        Some(r) => format!("row {}, column {}", r, column),
        None => "declared value".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_names_the_cell() {
        let err = Error::MalformedAggregateInput {
            row: Some(2),
            column: 3,
            value: "n/a".into(),
        };
        assert_eq!(err.to_string(), "malformed aggregate input at row 2, column 3: \"n/a\"");
        let err = Error::MalformedAggregateInput {
            row: None,
            column: 3,
            value: "pending".into(),
        };
        assert!(err.to_string().contains("declared value"));
    }

    #[test]
    fn driver_errors_convert() {
        let err: Error = DriverError::Session("websocket closed".into()).into();
        assert!(matches!(err, Error::Driver(DriverError::Session(_))));
        assert!(err.to_string().contains("websocket closed"));
    }
}
