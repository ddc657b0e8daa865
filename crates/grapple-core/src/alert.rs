//! Native dialog handling.
//!
//! An open alert is modal: the driver refuses every other call until it is
//! resolved. The handler reads the text, then resolves exactly once.

use crate::driver::{Driver, DriverError};
use crate::wait::Poll;
use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use tracing::debug;

/// How to resolve a dialog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Accept,
    Dismiss,
    /// Type into a prompt, then accept.
    Respond(String),
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Accept => f.write_str("accept"),
            Disposition::Dismiss => f.write_str("dismiss"),
            Disposition::Respond(t) => write!(f, "respond {:?}", t),
        }
    }
}

fn no_alert(e: DriverError) -> Error {
    match e {
        DriverError::NoSuchAlert => Error::NoActiveAlert,
        other => other.into(),
    }
}

/// Read the open dialog's text and resolve it.
pub fn handle<D: Driver + ?Sized>(driver: &mut D, disposition: &Disposition) -> Result<String> {
    let text = driver.alert_text().map_err(no_alert)?;
    debug!("alert {:?}: {}", text, disposition);
    match disposition {
        Disposition::Accept => driver.accept_alert(),
        Disposition::Dismiss => driver.dismiss_alert(),
        Disposition::Respond(answer) => driver
            .send_alert_text(answer)
            .and_then(|_| driver.accept_alert()),
    }
    .map_err(no_alert)?;
    Ok(text)
}

/// Whether a dialog is currently open.
pub fn is_present<D: Driver + ?Sized>(driver: &mut D) -> Result<bool> {
    match driver.alert_text() {
        Ok(_) => Ok(true),
        Err(DriverError::NoSuchAlert) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Poll for a dialog to appear, then handle it.
pub fn wait_and_handle<D: Driver + ?Sized>(
    driver: &mut D,
    disposition: &Disposition,
    poll: &Poll,
) -> Result<String> {
    poll.until("alert", || Ok(is_present(driver)?.then_some(())))?;
    handle(driver, disposition)
}
