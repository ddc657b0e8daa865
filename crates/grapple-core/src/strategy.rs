//! Ordered, state-verified interaction strategies.
//!
//! A strategy only counts as having worked when the observed property moved
//! in the expected direction. "No error" is not proof: drivers happily
//! accept clicks on labels, wrappers and overlays that never reach the
//! control. Strategies run in declared order until one is verified; when
//! all are exhausted the result carries a page-source excerpt to triage from.

use crate::driver::{Driver, DriverError, ElementRef, OptionChoice};
use crate::locator::{self, Target};
use crate::snapshot::{Expectation, Property, Snapshot, StateValue};
use crate::wait::Poll;
use crate::Result;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Characters of page source kept on either side of the hint.
pub const DIAGNOSTIC_RADIUS: usize = 200;

/// What to do to the resolved element.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interaction {
    /// Native click. Falls back to a scripted click on the same element when
    /// the driver rejects it as not interactable.
    Click,
    /// Scripted click through `execute_script`.
    ScriptClick,
    SendKeys(String),
    Clear,
    ClearAndType(String),
    /// Pointer over the element, for menus that open on hover.
    Hover,
    /// Pick an option of a `<select>`.
    Select(OptionChoice),
    /// Arbitrary script with `arguments[0]` bound to the element.
    Script(String),
}

impl Interaction {
    /// Apply the interaction once, without verification.
    pub fn perform<D: Driver + ?Sized>(&self, driver: &mut D, el: &ElementRef) -> std::result::Result<(), DriverError> {
        match self {
            Interaction::Click => match driver.click(el) {
                Err(DriverError::NotInteractable(reason)) => {
                    debug!("native click rejected ({}), forcing scripted click", reason);
                    driver.script_click(el)
                }
                other => other,
            },
            Interaction::ScriptClick => driver.script_click(el),
            Interaction::SendKeys(text) => driver.send_keys(el, text),
            Interaction::Clear => driver.clear(el),
            Interaction::ClearAndType(text) => {
                driver.clear(el)?;
                driver.send_keys(el, text)
            }
            Interaction::Hover => driver.hover(el),
            Interaction::Select(choice) => driver.select_option(el, choice),
            Interaction::Script(js) => driver
                .execute_script(js, std::slice::from_ref(el))
                .map(|_| ()),
        }
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interaction::Click => f.write_str("click"),
            Interaction::ScriptClick => f.write_str("script click"),
            Interaction::SendKeys(t) => write!(f, "send keys {:?}", t),
            Interaction::Clear => f.write_str("clear"),
            Interaction::ClearAndType(t) => write!(f, "clear and type {:?}", t),
            Interaction::Hover => f.write_str("hover"),
            Interaction::Select(choice) => write!(f, "select {}", choice),
            Interaction::Script(_) => f.write_str("script"),
        }
    }
}

/// Check made against the resolved element before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    Displayed,
    Hidden,
}

/// How success is proven.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Verification {
    pub property: Property,
    pub expect: Expectation,
    /// Element whose state proves the effect, when it differs from the one
    /// acted on (clicking a label, observing its checkbox).
    #[serde(default)]
    pub probe: Option<Target>,
    /// How long to keep re-reading the probe for the change to land.
    #[serde(default)]
    pub settle_ms: u64,
}

impl Verification {
    pub fn new(property: Property, expect: Expectation) -> Self {
        Self {
            property,
            expect,
            probe: None,
            settle_ms: 0,
        }
    }

    pub fn probe(mut self, target: Target) -> Self {
        self.probe = Some(target);
        self
    }

    pub fn settle(mut self, ms: u64) -> Self {
        self.settle_ms = ms;
        self
    }
}

/// One candidate way to achieve an outcome, with its own proof of effect.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionStrategy {
    pub name: String,
    #[serde(default)]
    pub precondition: Option<Precondition>,
    #[serde(rename = "action")]
    pub interaction: Interaction,
    pub verify: Verification,
}

impl ActionStrategy {
    pub fn new(name: impl Into<String>, interaction: Interaction, verify: Verification) -> Self {
        Self {
            name: name.into(),
            precondition: None,
            interaction,
            verify,
        }
    }

    pub fn when(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    /// Native click named `direct_click`.
    pub fn direct_click(verify: Verification) -> Self {
        Self::new("direct_click", Interaction::Click, verify)
    }

    /// Scripted click named `scripted_click`.
    pub fn scripted_click(verify: Verification) -> Self {
        Self::new("scripted_click", Interaction::ScriptClick, verify)
    }
}

/// Result of one strategy attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Succeeded,
    ActedButUnverified { before: StateValue, after: StateValue },
    NotApplicable(String),
    Failed(String),
}

impl StrategyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StrategyOutcome::Succeeded)
    }
}

impl fmt::Display for StrategyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyOutcome::Succeeded => f.write_str("succeeded"),
            StrategyOutcome::ActedButUnverified { before, after } => {
                write!(f, "acted but unverified ({} -> {})", before, after)
            }
            StrategyOutcome::NotApplicable(reason) => write!(f, "not applicable: {}", reason),
            StrategyOutcome::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// One entry of the execution trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub strategy: String,
    pub outcome: StrategyOutcome,
}

/// Page-source context captured after every strategy failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub needle: String,
    /// `None` when the needle does not occur in the source.
    pub excerpt: Option<String>,
    pub source_len: usize,
}

impl Diagnostic {
    /// Excerpt `radius` bytes either side of the first case-insensitive
    /// occurrence of `needle`, clamped to char boundaries.
    pub fn extract(source: &str, needle: &str, radius: usize) -> Self {
        let excerpt = find_case_insensitive(source, needle).map(|at| {
            let start = floor_char_boundary(source, at.saturating_sub(radius));
            let end = ceil_char_boundary(source, (at + needle.len() + radius).min(source.len()));
            source[start..end].to_string()
        });
        Self {
            needle: needle.to_string(),
            excerpt,
            source_len: source.len(),
        }
    }
}

fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    haystack.char_indices().map(|(i, _)| i).find(|&i| {
        let mut rest = haystack[i..].chars().flat_map(char::to_lowercase);
        needle.iter().all(|c| rest.next() == Some(*c))
    })
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// The whole call: final outcome, which strategy won, and what was tried.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub outcome: StrategyOutcome,
    /// Index of the verified strategy.
    pub winner: Option<usize>,
    pub trace: Vec<Attempt>,
    pub diagnostic: Option<Diagnostic>,
}

impl Execution {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn attempted(&self, strategy: &str) -> bool {
        self.trace.iter().any(|a| a.strategy == strategy)
    }
}

/// Try `strategies` in order against `target` until one is verified.
///
/// Strategy-level problems are recorded and the next strategy runs. Only
/// session faults escape as errors.
pub fn execute<D: Driver + ?Sized>(
    driver: &mut D,
    target: &Target,
    strategies: &[ActionStrategy],
) -> Result<Execution> {
    let mut trace = Vec::with_capacity(strategies.len());

    for (i, strategy) in strategies.iter().enumerate() {
        let outcome = attempt(driver, target, strategy)?;
        debug!("{} strategy {} '{}': {}", target, i + 1, strategy.name, outcome);
        let done = outcome.is_success();
        trace.push(Attempt {
            strategy: strategy.name.clone(),
            outcome: outcome.clone(),
        });
        if done {
            info!("{} handled by strategy '{}'", target, strategy.name);
            return Ok(Execution {
                outcome,
                winner: Some(i),
                trace,
                diagnostic: None,
            });
        }
    }

    warn!("{}: all {} strategies exhausted", target, strategies.len());
    let diagnostic = match driver.page_source() {
        Ok(source) => Diagnostic::extract(&source, target.diagnostic_hint(), DIAGNOSTIC_RADIUS),
        Err(e) if e.is_session_fault() => return Err(e.into()),
        Err(e) => {
            warn!("{}: page source unavailable for diagnostics: {}", target, e);
            Diagnostic {
                needle: target.diagnostic_hint().to_string(),
                excerpt: None,
                source_len: 0,
            }
        }
    };
    let outcome = trace
        .last()
        .map(|a| a.outcome.clone())
        .unwrap_or_else(|| StrategyOutcome::NotApplicable("no strategies".into()));

    Ok(Execution {
        outcome,
        winner: None,
        trace,
        diagnostic: Some(diagnostic),
    })
}

fn attempt<D: Driver + ?Sized>(
    driver: &mut D,
    target: &Target,
    strategy: &ActionStrategy,
) -> Result<StrategyOutcome> {
    let resolved = match locator::resolve(driver, target) {
        Ok(Some(r)) => r,
        Ok(None) => return Ok(StrategyOutcome::NotApplicable(format!("{} not found", target))),
        Err(e) => return recover(e),
    };
    let el = resolved.element;

    if let Some(pre) = strategy.precondition {
        match check_precondition(driver, &el, pre) {
            Ok(None) => {}
            Ok(Some(reason)) => return Ok(StrategyOutcome::NotApplicable(reason)),
            Err(e) => return classify(e),
        }
    }

    let verify = &strategy.verify;
    let probe_target = verify.probe.as_ref().unwrap_or(target);
    let before = match read_probe(driver, probe_target, &verify.property) {
        Err(e) => return recover(e),
        Ok(Some(Ok(s))) => s,
        Ok(Some(Err(e))) => return classify(e),
        Ok(None) => {
            return Ok(StrategyOutcome::NotApplicable(format!(
                "probe {} not found",
                probe_target
            )))
        }
    };

    debug!("{} '{}': {} before {}", target, strategy.name, strategy.interaction, before);
    if let Err(e) = strategy.interaction.perform(driver, &el) {
        return classify(e);
    }

    let settle = Poll::new(Duration::from_millis(verify.settle_ms), Duration::from_millis(50));
    let mut after = before.value.clone();
    let waited = settle.until("state change", || {
        match read_probe(driver, probe_target, &verify.property)? {
            Some(Ok(s)) => {
                after = s.value;
                Ok(verify.expect.is_met(&before.value, &after).then_some(()))
            }
            Some(Err(e)) if e.is_session_fault() => Err(e.into()),
            _ => {
                after = StateValue::Absent;
                Ok(None)
            }
        }
    });

    match waited {
        Ok(()) => Ok(StrategyOutcome::Succeeded),
        Err(crate::Error::Timeout { .. }) => Ok(StrategyOutcome::ActedButUnverified {
            before: before.value,
            after,
        }),
        Err(e) => recover(e),
    }
}

/// Resolve the probe and read its property. Outer `None` means absent.
fn read_probe<D: Driver + ?Sized>(
    driver: &mut D,
    probe: &Target,
    property: &Property,
) -> Result<Option<std::result::Result<Snapshot, DriverError>>> {
    let Some(resolved) = locator::resolve(driver, probe)? else {
        return Ok(None);
    };
    Ok(Some(Snapshot::capture(driver, &resolved.element, property)))
}

fn check_precondition<D: Driver + ?Sized>(
    driver: &mut D,
    el: &ElementRef,
    pre: Precondition,
) -> std::result::Result<Option<String>, DriverError> {
    let displayed = driver.is_displayed(el)?;
    Ok(match (pre, displayed) {
        (Precondition::Displayed, false) => Some("element not displayed".into()),
        (Precondition::Hidden, true) => Some("element is displayed".into()),
        _ => None,
    })
}

/// A driver fault while locating, such as a dialog the previous strategy
/// raised, fails this strategy only.
fn recover(e: crate::Error) -> Result<StrategyOutcome> {
    match e {
        crate::Error::Driver(e) => classify(e),
        e => Err(e),
    }
}

fn classify(e: DriverError) -> Result<StrategyOutcome> {
    if e.is_session_fault() {
        Err(e.into())
    } else {
        Ok(StrategyOutcome::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Effect, MemoryDriver, Node};
    use crate::query::Query;

    const ID: &str = "ctl00_mainContent_chk_SeniorCitizenDiscount";

    fn checkbox_target() -> Target {
        Target::new("SeniorCitizen")
            .candidate(Query::label_for("SeniorCitizen"))
            .candidate(Query::id_contains("SeniorCitizen"))
    }

    fn checked_flips() -> Verification {
        Verification::new(Property::Checked, Expectation::Flip).probe(
            Target::new("SeniorCitizen checkbox").candidate(Query::id_contains("SeniorCitizen")),
        )
    }

    fn strategies() -> Vec<ActionStrategy> {
        vec![
            ActionStrategy::direct_click(checked_flips()),
            ActionStrategy::scripted_click(checked_flips()),
        ]
    }

    fn page(label: Node) -> (MemoryDriver, ElementRef) {
        let mut d = MemoryDriver::new();
        d.add(label.attr("for", ID).text("Senior Citizen"));
        let input = d.add(Node::new("input").attr("type", "checkbox").id(ID));
        (d, input)
    }

    #[test]
    fn direct_click_that_flips_state_wins_immediately() {
        let (mut d, input) = page(Node::new("label"));
        let exec = execute(&mut d, &checkbox_target(), &strategies()).unwrap();

        assert!(exec.succeeded());
        assert_eq!(exec.winner, Some(0));
        assert_eq!(exec.trace.len(), 1);
        assert!(!exec.attempted("scripted_click"));
        assert!(d.is_checked(&input));
        assert!(!d.calls().iter().any(|c| c.starts_with("script")));
        assert!(exec.diagnostic.is_none());
    }

    #[test]
    fn decoy_click_falls_through_to_scripted_click() {
        let (mut d, input) = page(Node::new("label").decoy());
        let exec = execute(&mut d, &checkbox_target(), &strategies()).unwrap();

        assert!(exec.succeeded());
        assert_eq!(exec.winner, Some(1));
        assert_eq!(
            exec.trace[0].outcome,
            StrategyOutcome::ActedButUnverified {
                before: StateValue::Flag(false),
                after: StateValue::Flag(false),
            }
        );
        assert_eq!(exec.trace[1].outcome, StrategyOutcome::Succeeded);
        assert!(d.is_checked(&input));
    }

    #[test]
    fn no_exception_without_state_change_is_never_success() {
        let (mut d, input) = page(Node::new("label").decoy().script_decoy());
        let exec = execute(&mut d, &checkbox_target(), &strategies()).unwrap();

        assert!(!exec.succeeded());
        assert_eq!(exec.winner, None);
        assert!(exec
            .trace
            .iter()
            .all(|a| matches!(a.outcome, StrategyOutcome::ActedButUnverified { .. })));
        assert!(!d.is_checked(&input));
    }

    #[test]
    fn exhaustion_attaches_bounded_diagnostic() {
        let (mut d, _) = page(Node::new("label").decoy().script_decoy());
        let exec = execute(&mut d, &checkbox_target(), &strategies()).unwrap();

        let diag = exec.diagnostic.unwrap();
        let excerpt = diag.excerpt.unwrap();
        assert!(excerpt.to_lowercase().contains("seniorcitizen"));
        assert!(excerpt.len() <= 2 * DIAGNOSTIC_RADIUS + "SeniorCitizen".len());
        assert_eq!(
            exec.outcome,
            exec.trace.last().unwrap().outcome,
            "last non-succeeded outcome is returned"
        );
    }

    #[test]
    fn missing_target_is_not_applicable_for_every_strategy() {
        let mut d = MemoryDriver::new();
        let exec = execute(&mut d, &checkbox_target(), &strategies()).unwrap();
        assert_eq!(exec.trace.len(), 2);
        assert!(exec
            .trace
            .iter()
            .all(|a| matches!(a.outcome, StrategyOutcome::NotApplicable(_))));
        assert_eq!(exec.diagnostic.unwrap().excerpt, None);
    }

    #[test]
    fn unmet_precondition_skips_to_next_strategy() {
        let (mut d, input) = page(Node::new("label").hidden());
        let list = vec![
            ActionStrategy::direct_click(checked_flips()).when(Precondition::Displayed),
            ActionStrategy::scripted_click(checked_flips()),
        ];
        let exec = execute(&mut d, &checkbox_target(), &list).unwrap();
        assert!(matches!(exec.trace[0].outcome, StrategyOutcome::NotApplicable(_)));
        assert_eq!(exec.winner, Some(1));
        assert!(d.is_checked(&input));
    }

    #[test]
    fn action_error_is_recorded_and_next_strategy_runs() {
        let mut d = MemoryDriver::new();
        d.add(
            Node::new("label")
                .attr("for", ID)
                .click_error(DriverError::UnexpectedAlert("promo".into())),
        );
        d.add(Node::new("input").attr("type", "checkbox").id(ID));
        let exec = execute(&mut d, &checkbox_target(), &strategies()).unwrap();
        assert!(matches!(exec.trace[0].outcome, StrategyOutcome::Failed(_)));
        assert_eq!(exec.winner, Some(1));
    }

    #[test]
    fn not_interactable_click_is_forced_within_the_same_strategy() {
        let (mut d, input) = page(Node::new("label").not_interactable());
        let exec = execute(&mut d, &checkbox_target(), &strategies()).unwrap();
        assert_eq!(exec.winner, Some(0));
        assert!(d.is_checked(&input));
        assert!(d.calls().iter().any(|c| c.starts_with("script")));
    }

    #[test]
    fn session_fault_propagates() {
        let mut d = MemoryDriver::new();
        d.add(
            Node::new("label")
                .attr("for", ID)
                .click_error(DriverError::Session("websocket closed".into())),
        );
        d.add(Node::new("input").attr("type", "checkbox").id(ID));
        let err = execute(&mut d, &checkbox_target(), &strategies()).unwrap_err();
        assert!(matches!(err, crate::Error::Driver(DriverError::Session(_))));
    }

    #[test]
    fn empty_strategy_list() {
        let (mut d, _) = page(Node::new("label"));
        let exec = execute(&mut d, &checkbox_target(), &[]).unwrap();
        assert_eq!(exec.outcome, StrategyOutcome::NotApplicable("no strategies".into()));
        assert!(exec.diagnostic.is_some());
    }

    #[test]
    fn typing_verified_by_value() {
        let mut d = MemoryDriver::new();
        let input = d.add(Node::new("input").id("autocomplete"));
        let target = Target::new("country").candidate(Query::id("autocomplete"));
        let list = vec![ActionStrategy::new(
            "type",
            Interaction::ClearAndType("Ind".into()),
            Verification::new(Property::Value, Expectation::Equals("Ind".into())),
        )];
        let exec = execute(&mut d, &target, &list).unwrap();
        assert!(exec.succeeded());
        assert_eq!(d.value_of(&input).as_deref(), Some("Ind"));
    }

    #[test]
    fn dialog_raised_by_an_action_fails_later_strategies_without_erroring() {
        let mut d = MemoryDriver::new();
        let label = d.add(Node::new("label").attr("for", ID).text("Senior Citizen"));
        let input = d.add(Node::new("input").attr("type", "checkbox").id(ID));
        d.on_click(&label, Effect::Alert("Discount applied".into()));

        let exec = execute(&mut d, &checkbox_target(), &strategies()).unwrap();

        assert!(!exec.succeeded());
        assert_eq!(exec.trace.len(), 2);
        for attempt in &exec.trace {
            assert!(
                matches!(&attempt.outcome, StrategyOutcome::Failed(m) if m.contains("Discount applied")),
                "{}: {}",
                attempt.strategy,
                attempt.outcome
            );
        }
        assert!(d.is_checked(&input));
        let diagnostic = exec.diagnostic.unwrap();
        assert_eq!(diagnostic.excerpt, None);
        assert_eq!(diagnostic.needle, "SeniorCitizen");
    }

    #[test]
    fn select_strategy_is_verified_by_value() {
        let mut d = MemoryDriver::new();
        let select = d.add(Node::new("select").id("ctl00_mainContent_DropDownListCurrency"));
        for code in ["INR", "AED", "USD"] {
            d.add_child(&select, Node::new("option").value(code).text(code));
        }
        let target = Target::new("currency").candidate(Query::id_contains("DropDownListCurrency"));
        let list = vec![
            ActionStrategy {
                name: "by_text".into(),
                precondition: None,
                interaction: Interaction::Select(OptionChoice::Text("Euro".into())),
                verify: Verification::new(Property::Value, Expectation::Equals("EUR".into())),
            },
            ActionStrategy {
                name: "by_index".into(),
                precondition: None,
                interaction: Interaction::Select(OptionChoice::Index(1)),
                verify: Verification::new(Property::Value, Expectation::Equals("AED".into())),
            },
        ];
        let exec = execute(&mut d, &target, &list).unwrap();
        assert!(matches!(exec.trace[0].outcome, StrategyOutcome::Failed(_)));
        assert_eq!(exec.winner, Some(1));
        assert_eq!(d.value_of(&select).as_deref(), Some("AED"));
    }

    #[test]
    fn hover_reveals_hidden_menu() {
        let mut d = MemoryDriver::new();
        let trigger = d.add(Node::new("button").id("mousehover").text("Mouse Hover"));
        let menu = d.add(Node::new("div").id("hover-menu").class("mouse-hover-content").hidden());
        d.add_child(&menu, Node::new("a").text("Top"));
        d.on_hover(&trigger, Effect::SetDisplayed(menu, true));

        let strategy = ActionStrategy {
            name: "hover".into(),
            precondition: None,
            interaction: Interaction::Hover,
            verify: Verification::new(Property::Displayed, Expectation::BecomeTrue)
                .probe(Target::new("menu").candidate(Query::id("hover-menu"))),
        };
        let target = Target::new("hover button").candidate(Query::id("mousehover"));
        let exec = execute(&mut d, &target, &[strategy]).unwrap();
        assert!(exec.succeeded(), "{}", exec.outcome);
    }

    #[test]
    fn diagnostic_extract_respects_char_boundaries() {
        let source = format!("{}<label for=\"Séñior\">{}", "é".repeat(300), "ü".repeat(300));
        let d = Diagnostic::extract(&source, "séñior", 7);
        let excerpt = d.excerpt.unwrap();
        assert!(excerpt.contains("Séñior"));
        assert!(d.source_len > excerpt.len());
        assert_eq!(Diagnostic::extract("abc", "zzz", 10).excerpt, None);
    }

    #[test]
    fn strategy_deserializes_from_config_form() {
        let s: ActionStrategy = serde_json::from_str(
            r#"{
                "name": "scripted",
                "precondition": "displayed",
                "action": "script_click",
                "verify": {"property": "checked", "expect": "flip",
                           "probe": {"name": "box", "candidates": ["id-contains:Senior"]}}
            }"#,
        )
        .unwrap();
        assert_eq!(s.interaction, Interaction::ScriptClick);
        assert_eq!(s.precondition, Some(Precondition::Displayed));
        assert_eq!(s.verify.settle_ms, 0);
        assert!(s.verify.probe.is_some());
    }
}
