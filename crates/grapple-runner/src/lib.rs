//! # grapple-runner
//!
//! Scenario-driven browser automation on top of `grapple-core`. Describe
//! targets with fallback candidates, strategies with proof of effect, frame
//! and window scopes and table reconciliations in YAML, then run them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grapple_runner::{Config, Runner};
//!
//! # fn main() -> grapple_runner::Result<()> {
//! let config = Config::load("scenario.yaml")?;
//! let mut runner = Runner::launch(&config.browser)?;
//! let result = runner.run(&config)?;
//! println!("Success: {}", result.success);
//! for finding in &result.findings {
//!     println!("{}", finding);
//! }
//! runner.close()?;
//! # Ok(())
//! # }
//! ```

pub mod browser;
mod config;
mod runner;

pub use browser::EokaDriver;
pub use config::{
    BrowserConfig, Condition, Config, OnFailure, ParamDef, Params, PollConfig,
    ReconcileExpectation, RetryConfig, Step, SuccessCondition, TargetUrl, Viewport,
};
pub use runner::{Finding, RunResult, Runner};

/// Result type for grapple-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during config loading or execution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] grapple_core::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("step failed: {0}")]
    StepFailed(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),
}

impl From<grapple_core::DriverError> for Error {
    fn from(e: grapple_core::DriverError) -> Self {
        Error::Core(e.into())
    }
}

impl Error {
    /// The browser session itself is gone; retrying cannot help.
    pub fn is_session_fault(&self) -> bool {
        matches!(
            self,
            Error::Core(grapple_core::Error::Driver(e)) if e.is_session_fault()
        )
    }
}
