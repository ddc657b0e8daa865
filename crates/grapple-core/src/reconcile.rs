//! Aggregate cross-checking between a table and a separately displayed total.

use crate::driver::Driver;
use crate::locator::{self, Target};
use crate::table::TableRecord;
use crate::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Tolerance for `matches`.
pub const EPSILON: f64 = 1e-9;

/// Computed sum against the declared value. A mismatch is a finding, not
/// an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub computed: f64,
    pub declared: f64,
    pub matches: bool,
    /// `computed - declared`.
    pub delta: f64,
}

impl fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.matches {
            write!(f, "computed {} matches declared {}", self.computed, self.declared)
        } else {
            write!(
                f,
                "computed {} differs from declared {} by {}",
                self.computed, self.declared, self.delta
            )
        }
    }
}

/// Sum `column` over `records`, then read and parse the declared total
/// through the resolver.
pub fn reconcile<D: Driver + ?Sized>(
    driver: &mut D,
    records: &[TableRecord],
    column: usize,
    declared: &Target,
) -> Result<ReconciliationResult> {
    let resolved = locator::require(driver, declared)?;
    let text = driver.text(&resolved.element)?;
    reconcile_values(records, column, &text)
}

/// Reconcile against an already-read declared text.
pub fn reconcile_values(records: &[TableRecord], column: usize, declared_text: &str) -> Result<ReconciliationResult> {
    let computed = records
        .iter()
        .map(|r| {
            let raw = r.cell(column).ok_or_else(|| Error::MalformedAggregateInput {
                row: Some(r.index),
                column,
                value: "<missing cell>".into(),
            })?;
            parse_number(raw).ok_or_else(|| Error::MalformedAggregateInput {
                row: Some(r.index),
                column,
                value: raw.to_string(),
            })
        })
        .sum::<Result<f64>>()?;

    let declared = parse_declared(declared_text).ok_or_else(|| Error::MalformedAggregateInput {
        row: None,
        column,
        value: declared_text.trim().to_string(),
    })?;

    let delta = computed - declared;
    let result = ReconciliationResult {
        computed,
        declared,
        matches: delta.abs() <= EPSILON,
        delta,
    };
    if result.matches {
        info!("reconciliation: {}", result);
    } else {
        warn!("reconciliation: {}", result);
    }
    Ok(result)
}

/// Numeric cell value: trimmed, one leading currency sign and thousands
/// separators dropped.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let s = s
        .strip_prefix(|c: char| matches!(c, '$' | '€' | '£' | '¥' | '₹'))
        .unwrap_or(s)
        .trim_start();
    let cleaned: String = s.chars().filter(|&c| c != ',').collect();
    if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+')) {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// The last number in a label such as `"Total Amount Collected: 296"`.
pub fn parse_declared(text: &str) -> Option<f64> {
    static TRAILING: OnceLock<Option<Regex>> = OnceLock::new();
    let re = TRAILING
        .get_or_init(|| Regex::new(r"-?[0-9][0-9,]*(?:\.[0-9]+)?\s*$").ok())
        .as_ref()?;
    let m = re.find(text.trim())?;
    parse_number(m.as_str())
}
