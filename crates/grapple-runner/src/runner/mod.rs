mod executor;

use crate::browser::EokaDriver;
use crate::config::{BrowserConfig, Condition, Config};
use crate::Result;
use executor::Executor;
use grapple_core::{
    CancelToken, Disposition, Driver, Error as CoreError, Execution, ReconciliationResult, Session,
};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Something a run observed that the caller should see, pass or fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    /// Trace of an interact step, including which strategy won.
    Interaction { target: String, execution: Execution },
    /// Table total against the declared total.
    Reconciliation {
        table: String,
        result: ReconciliationResult,
    },
    /// A dialog that was read and resolved.
    Alert {
        text: String,
        disposition: Disposition,
    },
    /// Entry picked from a suggestion list.
    Choice {
        options: String,
        chosen: String,
        /// Zero-based position among the `offered` entries.
        position: usize,
        offered: usize,
    },
    /// Cell read from a table row found by its text.
    Lookup {
        table: String,
        row: String,
        column: usize,
        value: String,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Interaction { target, execution } => {
                match execution.winner.and_then(|i| execution.trace.get(i)) {
                    Some(won) => write!(f, "'{}': handled by {}", target, won.strategy)?,
                    None => write!(f, "'{}': {}", target, execution.outcome)?,
                }
                for attempt in &execution.trace {
                    write!(f, "\n    {}: {}", attempt.strategy, attempt.outcome)?;
                }
                if let Some(excerpt) = execution.diagnostic.as_ref().and_then(|d| d.excerpt.as_ref()) {
                    write!(f, "\n    near: {}", excerpt)?;
                }
                Ok(())
            }
            Finding::Reconciliation { table, result } => write!(f, "'{}': {}", table, result),
            Finding::Alert { text, disposition } => write!(f, "alert {:?}: {}", text, disposition),
            Finding::Choice {
                options,
                chosen,
                position,
                offered,
            } => write!(f, "'{}': chose {:?} ({} of {})", options, chosen, position + 1, offered),
            Finding::Lookup {
                table,
                row,
                column,
                value,
            } => write!(f, "'{}' row {:?} column {}: {:?}", table, row, column, value),
        }
    }
}

/// Result of running a config.
#[derive(Debug)]
pub struct RunResult {
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Steps completed in the last attempt, nested steps included.
    pub steps_executed: usize,
    pub duration_ms: u64,
    /// Retry attempts made.
    pub retries: u32,
    /// Findings of the last attempt.
    pub findings: Vec<Finding>,
}

/// Executes scenario configs against one browser session.
pub struct Runner<D: Driver> {
    session: Session<D>,
    cancel: CancelToken,
}

impl Runner<EokaDriver> {
    /// Launch a browser and wrap it.
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        Ok(Self::new(EokaDriver::launch(config)?))
    }
}

impl<D: Driver> Runner<D> {
    pub fn new(driver: D) -> Self {
        Self {
            session: Session::new(driver),
            cancel: CancelToken::new(),
        }
    }

    pub fn session(&self) -> &Session<D> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<D> {
        &mut self.session
    }

    /// Cancelling aborts the wait in progress and every later one.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the config with retry support.
    pub fn run(&mut self, config: &Config) -> Result<RunResult> {
        let start = Instant::now();
        self.session
            .set_poll(config.poll.to_poll().with_cancel(self.cancel.clone()));

        let retry_config = config.on_failure.as_ref().and_then(|f| f.retry.as_ref());
        let max_attempts = retry_config.map(|r| r.attempts).unwrap_or(1);
        let retry_delay = retry_config.map(|r| r.delay_ms).unwrap_or(0);

        let mut last_error = None;
        let mut last = Executor::default();
        let mut retries = 0;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                retries += 1;
                info!("Retry attempt {}/{}", attempt, max_attempts);
                if retry_delay > 0 {
                    std::thread::sleep(Duration::from_millis(retry_delay));
                }
            }

            let mut executor = Executor::default();
            let outcome = self.run_once(config, &mut executor);
            last = executor;
            match outcome {
                Ok(true) => {
                    return Ok(RunResult {
                        success: true,
                        error: None,
                        steps_executed: last.executed,
                        duration_ms: start.elapsed().as_millis() as u64,
                        retries,
                        findings: last.findings,
                    });
                }
                Ok(false) => {
                    last_error = Some("success conditions not met".to_string());
                }
                Err(e) => {
                    warn!("Attempt {} failed: {}", attempt, e);
                    let fatal = e.is_session_fault();
                    last_error = Some(e.to_string());
                    if fatal {
                        warn!("Browser session lost, not retrying");
                        break;
                    }
                }
            }
        }

        self.handle_failure(config);
        Ok(RunResult {
            success: false,
            error: last_error,
            steps_executed: last.executed,
            duration_ms: start.elapsed().as_millis() as u64,
            retries,
            findings: last.findings,
        })
    }

    fn handle_failure(&mut self, config: &Config) {
        let Some(path) = config.on_failure.as_ref().and_then(|f| f.page_source.as_ref()) else {
            return;
        };
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let path = path.replace("{timestamp}", &timestamp);
        info!("Saving failure page source to: {}", path);
        match self.session.driver_mut().page_source() {
            Ok(source) => {
                if let Err(e) = std::fs::write(&path, source) {
                    warn!("Failed to save page source: {}", e);
                }
            }
            Err(e) => warn!("Page source unavailable: {}", e),
        }
    }

    fn run_once(&mut self, config: &Config, executor: &mut Executor) -> Result<bool> {
        self.leave_stale_contexts()?;
        info!("Navigating to: {}", config.target.url);
        self.session.driver_mut().goto(&config.target.url)?;

        executor.run_steps(&mut self.session, &config.steps)?;

        let success = self.check_success(config)?;
        debug!("Success check: {}", success);
        Ok(success)
    }

    /// Get back to the top-level document when an earlier run could not.
    /// A dialog left open blocks every switch, so it is dismissed first.
    fn leave_stale_contexts(&mut self) -> Result<()> {
        if self.session.contexts().is_empty() {
            return Ok(());
        }
        warn!(
            "{} context(s) still entered from an earlier attempt",
            self.session.contexts().depth()
        );
        if self.session.unwind().is_ok() {
            return Ok(());
        }
        match self.session.handle_alert(&Disposition::Dismiss) {
            Ok(text) => info!("Dismissed leftover alert: {:?}", text),
            Err(CoreError::NoActiveAlert) => {}
            Err(e) => return Err(e.into()),
        }
        self.session.unwind()?;
        Ok(())
    }

    fn check_success(&mut self, config: &Config) -> Result<bool> {
        let Some(ref success) = config.success else {
            return Ok(true);
        };

        if let Some(ref any) = success.any {
            for cond in any {
                if self.check_condition(cond)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        if let Some(ref all) = success.all {
            for cond in all {
                if !self.check_condition(cond)? {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    fn check_condition(&mut self, condition: &Condition) -> Result<bool> {
        let driver = self.session.driver_mut();
        let holds = match condition {
            Condition::UrlContains(pattern) => driver.current_url()?.contains(pattern.as_str()),
            Condition::TextContains(pattern) => executor::page_text(driver)?.contains(pattern.as_str()),
            Condition::TitleContains(pattern) => driver.title()?.contains(pattern.as_str()),
        };
        debug!("condition {:?}: {}", condition, holds);
        Ok(holds)
    }

    /// End the browser session.
    pub fn close(self) -> Result<()> {
        self.session.close()?;
        Ok(())
    }
}
