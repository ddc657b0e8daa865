//! Ordered-candidate element resolution.

use crate::driver::{Driver, ElementRef};
use crate::query::Query;
use crate::wait::Poll;
use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use tracing::debug;

/// A semantic element description with ordered fallback queries.
///
/// Candidates are tried in declared order: most specific first, generic
/// fallback last.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Target {
    pub name: String,
    pub candidates: Vec<Query>,
    /// Needle for diagnostic extraction. Defaults to `name`.
    #[serde(default)]
    pub hint: Option<String>,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            candidates: Vec::new(),
            hint: None,
        }
    }

    pub fn candidate(mut self, query: Query) -> Self {
        self.candidates.push(query);
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn diagnostic_hint(&self) -> &str {
        self.hint.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.name)
    }
}

/// A resolved element plus the candidate that found it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub element: ElementRef,
    /// Index into `Target::candidates`.
    pub candidate: usize,
    pub query: Query,
}

/// Resolve to the first match of the first candidate that matches anything.
///
/// Absence is `Ok(None)`; only faults unrelated to absence are errors.
pub fn resolve<D: Driver + ?Sized>(driver: &mut D, target: &Target) -> Result<Option<Resolved>> {
    Ok(resolve_all(driver, target)?.and_then(|(candidate, mut elements)| {
        if elements.is_empty() {
            return None;
        }
        Some(Resolved {
            element: elements.swap_remove(0),
            candidate,
            query: target.candidates[candidate].clone(),
        })
    }))
}

/// Every match of the winning candidate, in document order.
pub fn resolve_all<D: Driver + ?Sized>(
    driver: &mut D,
    target: &Target,
) -> Result<Option<(usize, Vec<ElementRef>)>> {
    for (i, query) in target.candidates.iter().enumerate() {
        match driver.find_all(query) {
            Ok(found) if !found.is_empty() => {
                debug!("{} matched candidate {} ({}): {} element(s)", target, i, query, found.len());
                return Ok(Some((i, found)));
            }
            Ok(_) => debug!("{} candidate {} ({}) matched nothing", target, i, query),
            Err(e) if e.is_absence() => debug!("{} candidate {} ({}): {}", target, i, query, e),
            Err(e) => return Err(e.into()),
        }
    }
    debug!("{} not found after {} candidate(s)", target, target.candidates.len());
    Ok(None)
}

/// Resolve, failing with [`Error::NotFound`] when absent.
pub fn require<D: Driver + ?Sized>(driver: &mut D, target: &Target) -> Result<Resolved> {
    resolve(driver, target)?.ok_or_else(|| Error::NotFound {
        target: target.name.clone(),
    })
}

/// Poll until the target resolves.
pub fn wait_for<D: Driver + ?Sized>(driver: &mut D, target: &Target, poll: &Poll) -> Result<Resolved> {
    poll.until(&target.to_string(), || resolve(driver, target))
}

/// Poll until the target's winning candidate has at least `min` matches.
pub fn wait_for_all<D: Driver + ?Sized>(
    driver: &mut D,
    target: &Target,
    min: usize,
    poll: &Poll,
) -> Result<Vec<ElementRef>> {
    poll.until(&target.to_string(), || {
        Ok(resolve_all(driver, target)?
            .map(|(_, found)| found)
            .filter(|found| found.len() >= min.max(1)))
    })
}

/// Entry picked by [`wait_for_text`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    pub element: ElementRef,
    /// The entry's text as read, trimmed.
    pub text: String,
    /// Position among the matches on the poll that found it.
    pub position: usize,
    /// How many matches that poll saw.
    pub offered: usize,
}

/// Poll until one of the target's matches reads `wanted`, compared trimmed
/// and ignoring case. A list that re-renders mid-read is read again on the
/// next poll.
pub fn wait_for_text<D: Driver + ?Sized>(
    driver: &mut D,
    target: &Target,
    wanted: &str,
    poll: &Poll,
) -> Result<TextMatch> {
    let needle = wanted.trim().to_lowercase();
    poll.until(&format!("{} reading {:?}", target, wanted.trim()), || {
        let Some((_, found)) = resolve_all(driver, target)? else {
            return Ok(None);
        };
        let offered = found.len();
        for (position, element) in found.into_iter().enumerate() {
            let text = match driver.text(&element) {
                Ok(t) => t.trim().to_string(),
                Err(e) if e.is_absence() => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            if text.to_lowercase() == needle {
                debug!("{} entry {} of {} reads {:?}", target, position + 1, offered, text);
                return Ok(Some(TextMatch {
                    element,
                    text,
                    position,
                    offered,
                }));
            }
        }
        Ok(None)
    })
}
