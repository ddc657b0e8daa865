use grapple_core::{ActionStrategy, Disposition, OptionChoice, Query, Target};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// One scenario step.
#[derive(Debug, Clone)]
pub enum Step {
    // Navigation
    Goto(GotoStep),

    // Waiting
    WaitFor(WaitForStep),

    // Interaction
    Interact(InteractStep),
    Click(ClickStep),
    Hover(HoverStep),
    Select(SelectStep),
    Choose(ChooseStep),
    Alert(AlertStep),

    // Contexts
    WithinFrame(WithinFrameStep),
    WithinNewWindow(WithinNewWindowStep),

    // Data
    Reconcile(ReconcileStep),
    Lookup(LookupStep),

    // Checks
    AssertText(AssertTextStep),
    AssertUrl(AssertUrlStep),
    Log(LogStep),
}

impl Step {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Goto(_) => "goto",
            Self::WaitFor(_) => "wait_for",
            Self::Interact(_) => "interact",
            Self::Click(_) => "click",
            Self::Hover(_) => "hover",
            Self::Select(_) => "select",
            Self::Choose(_) => "choose",
            Self::Alert(_) => "alert",
            Self::WithinFrame(_) => "within_frame",
            Self::WithinNewWindow(_) => "within_new_window",
            Self::Reconcile(_) => "reconcile",
            Self::Lookup(_) => "lookup",
            Self::AssertText(_) => "assert_text",
            Self::AssertUrl(_) => "assert_url",
            Self::Log(_) => "log",
        }
    }

    /// Every target this step names, nested steps included.
    pub fn targets(&self) -> Vec<&Target> {
        let mut out = Vec::new();
        self.collect_targets(&mut out);
        out
    }

    fn collect_targets<'a>(&'a self, out: &mut Vec<&'a Target>) {
        match self {
            Self::WaitFor(s) => out.push(&s.target),
            Self::Click(s) => out.push(&s.target),
            Self::Hover(s) => out.push(&s.target),
            Self::Select(s) => out.push(&s.target),
            Self::Choose(s) => {
                out.extend(s.input.as_ref());
                out.push(&s.options);
            }
            Self::Interact(s) => {
                out.push(&s.target);
                out.extend(s.strategies.iter().filter_map(|st| st.verify.probe.as_ref()));
            }
            Self::WithinFrame(s) => {
                out.push(&s.target);
                for step in &s.steps {
                    step.collect_targets(out);
                }
            }
            Self::WithinNewWindow(s) => {
                out.push(&s.trigger);
                for step in &s.steps {
                    step.collect_targets(out);
                }
            }
            Self::Reconcile(s) => {
                out.push(&s.table);
                out.push(&s.declared);
            }
            Self::Lookup(s) => out.push(&s.table),
            Self::AssertText(s) => out.extend(s.target.as_ref()),
            Self::Goto(_) | Self::Alert(_) | Self::AssertUrl(_) | Self::Log(_) => {}
        }
    }
}

const STEP_NAMES: &[&str] = &[
    "goto",
    "wait_for",
    "interact",
    "click",
    "hover",
    "select",
    "choose",
    "alert",
    "within_frame",
    "within_new_window",
    "reconcile",
    "lookup",
    "assert_text",
    "assert_url",
    "log",
];

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(StepVisitor)
    }
}

struct StepVisitor;

impl<'de> Visitor<'de> for StepVisitor {
    type Value = Step;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a step map with a single key")
    }

    fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected step type key"))?;

        let step = match key.as_str() {
            "goto" => Step::Goto(map.next_value()?),
            "wait_for" => Step::WaitFor(map.next_value()?),
            "interact" => Step::Interact(map.next_value()?),
            "click" => Step::Click(map.next_value()?),
            "hover" => Step::Hover(map.next_value()?),
            "select" => Step::Select(map.next_value()?),
            "choose" => Step::Choose(map.next_value()?),
            "alert" => Step::Alert(map.next_value()?),
            "within_frame" => Step::WithinFrame(map.next_value()?),
            "within_new_window" => Step::WithinNewWindow(map.next_value()?),
            "reconcile" => Step::Reconcile(map.next_value()?),
            "lookup" => Step::Lookup(map.next_value()?),
            "assert_text" => Step::AssertText(map.next_value()?),
            "assert_url" => Step::AssertUrl(map.next_value()?),
            "log" => Step::Log(map.next_value()?),
            other => return Err(de::Error::unknown_variant(other, STEP_NAMES)),
        };

        if let Some(extra) = map.next_key::<String>()? {
            return Err(de::Error::custom(format!(
                "step '{}' has a second key '{}'",
                key, extra
            )));
        }

        Ok(step)
    }
}

// --- Step payloads ---

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct GotoStep {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitForStep {
    pub target: Target,
    /// Overrides the scenario's poll timeout.
    pub timeout_ms: Option<u64>,
    /// Wait for at least this many matches instead of one.
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractStep {
    pub target: Target,
    pub strategies: Vec<ActionStrategy>,
    /// Fail the step when no strategy is verified. When false the
    /// exhausted trace is only recorded.
    #[serde(default = "default_true")]
    pub required: bool,
}

/// Click with no proof of effect, for triggers whose result a later step
/// checks (a dialog, a window).
#[derive(Debug, Clone, Deserialize)]
pub struct ClickStep {
    pub target: Target,
}

/// Pointer over the target, unverified. Use `interact` with `hover` to
/// prove the menu opened.
#[derive(Debug, Clone, Deserialize)]
pub struct HoverStep {
    pub target: Target,
}

/// Pick an option of a static `<select>`.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectStep {
    pub target: Target,
    pub option: OptionChoice,
}

/// Type into a field, wait for its suggestion list and click the entry
/// that reads `text`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChooseStep {
    /// Field the suggestions belong to.
    pub input: Option<Target>,
    /// Typed into `input` after clearing it.
    #[serde(rename = "type")]
    pub typed: Option<String>,
    /// Every entry of the suggestion list.
    pub options: Target,
    /// Compared trimmed and ignoring case.
    pub text: String,
    /// Value `input` must hold once the entry is picked.
    pub expect_value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertStep {
    pub disposition: Disposition,
    /// Wait for the dialog to open instead of requiring it now.
    #[serde(default = "default_true")]
    pub wait: bool,
    /// Dialog text must contain this.
    pub expect_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithinFrameStep {
    pub target: Target,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithinNewWindowStep {
    /// Element whose click opens the window.
    pub trigger: Target,
    /// Close the window after the nested steps.
    #[serde(default)]
    pub close: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// What a reconciliation must show for the step to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileExpectation {
    /// Record the result either way.
    #[default]
    Report,
    Match,
    Mismatch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileStep {
    pub table: Target,
    pub column: usize,
    /// Drop the first extracted row before summing.
    #[serde(default)]
    pub skip_header: bool,
    /// Row query relative to the table.
    pub rows: Option<Query>,
    /// Cell query relative to each row.
    pub cells: Option<Query>,
    pub declared: Target,
    #[serde(default)]
    pub expect: ReconcileExpectation,
}

/// Read one cell from the row whose `key_column` contains `row`.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupStep {
    pub table: Target,
    pub rows: Option<Query>,
    pub cells: Option<Query>,
    #[serde(default)]
    pub key_column: usize,
    pub row: String,
    /// Column read from the matching row.
    pub column: usize,
    /// The cell must equal this, trimmed.
    pub expect: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssertTextStep {
    pub text: String,
    /// Element whose text must contain `text`. Page text when absent.
    pub target: Option<Target>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssertUrlStep {
    pub contains: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogStep {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use grapple_core::{Expectation, Interaction, Property};

    fn parse(yaml: &str) -> Step {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_interact() {
        let step = parse(
            r#"
interact:
  target: { name: "Senior citizen", candidates: ["label-for:SeniorCitizen", "id-contains:SeniorCitizen"] }
  strategies:
    - name: direct_click
      action: click
      verify:
        property: checked
        expect: flip
        probe: { name: box, candidates: ["id-contains:SeniorCitizen"] }
    - name: typed
      action: { send_keys: "Ind" }
      verify: { property: value, expect: { contains: Ind } }
"#,
        );
        let Step::Interact(s) = step else {
            panic!("expected interact");
        };
        assert!(s.required);
        assert_eq!(s.target.candidates[0], Query::LabelFor("SeniorCitizen".into()));
        assert_eq!(s.strategies.len(), 2);
        assert_eq!(s.strategies[0].interaction, Interaction::Click);
        assert_eq!(s.strategies[0].verify.property, Property::Checked);
        assert_eq!(s.strategies[1].interaction, Interaction::SendKeys("Ind".into()));
        assert_eq!(s.strategies[1].verify.expect, Expectation::Contains("Ind".into()));
    }

    #[test]
    fn test_parse_alert_dispositions() {
        let Step::Alert(a) = parse("alert: { disposition: accept, expect_text: Hello }") else {
            panic!("expected alert");
        };
        assert_eq!(a.disposition, Disposition::Accept);
        assert!(a.wait);
        assert_eq!(a.expect_text.as_deref(), Some("Hello"));

        let Step::Alert(a) = parse("alert: { disposition: { respond: Jo }, wait: false }") else {
            panic!("expected alert");
        };
        assert_eq!(a.disposition, Disposition::Respond("Jo".into()));
        assert!(!a.wait);
    }

    #[test]
    fn test_parse_nested_contexts() {
        let step = parse(
            r#"
within_frame:
  target: { name: frame, candidates: ["id:courses-iframe"] }
  steps:
    - wait_for: { target: { name: link, candidates: ["link:Mentorship"] } }
    - within_new_window:
        trigger: { name: open, candidates: ["id:openwindow"] }
        close: true
        steps:
          - assert_text: { text: "Access all our Courses" }
"#,
        );
        let Step::WithinFrame(f) = step else {
            panic!("expected within_frame");
        };
        assert_eq!(f.steps.len(), 2);
        let Step::WithinNewWindow(w) = &f.steps[1] else {
            panic!("expected within_new_window");
        };
        assert!(w.close);
        assert_eq!(w.steps[0].name(), "assert_text");
        assert_eq!(step_targets(&Step::WithinFrame(f.clone())), vec!["frame", "link", "open"]);
    }

    fn step_targets(step: &Step) -> Vec<String> {
        step.targets().iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn test_parse_reconcile_defaults() {
        let Step::Reconcile(r) = parse(
            r#"
reconcile:
  table: { name: table, candidates: ["id:product"] }
  column: 3
  declared: { name: total, candidates: [".totalAmount"] }
"#,
        ) else {
            panic!("expected reconcile");
        };
        assert_eq!(r.expect, ReconcileExpectation::Report);
        assert!(!r.skip_header);
        assert!(r.rows.is_none());
        assert_eq!(r.declared.candidates[0], Query::Css(".totalAmount".into()));
    }

    #[test]
    fn test_parse_select_and_hover() {
        let Step::Select(s) = parse(
            r#"
select:
  target: { name: currency, candidates: ["id:ctl00_mainContent_DropDownListCurrency"] }
  option: { text: AED }
"#,
        ) else {
            panic!("expected select");
        };
        assert_eq!(s.option, OptionChoice::Text("AED".into()));

        let Step::Select(s) = parse("select: { target: { name: c, candidates: [\"id:c\"] }, option: { index: 3 } }") else {
            panic!("expected select");
        };
        assert_eq!(s.option, OptionChoice::Index(3));

        let step = parse("hover: { target: { name: menu, candidates: [\"id:mousehover\"] } }");
        assert_eq!(step.name(), "hover");
        assert_eq!(step_targets(&step), vec!["menu"]);
    }

    #[test]
    fn test_parse_choose_and_lookup() {
        let step = parse(
            r#"
choose:
  input: { name: country, candidates: ["id:autocomplete"] }
  type: ind
  options: { name: suggestions, candidates: ["li.ui-menu-item a", "li.ui-menu-item"] }
  text: India
  expect_value: India
"#,
        );
        assert_eq!(step_targets(&step), vec!["country", "suggestions"]);
        let Step::Choose(c) = step else {
            panic!("expected choose");
        };
        assert_eq!(c.typed.as_deref(), Some("ind"));
        assert_eq!(c.text, "India");

        let Step::Lookup(l) = parse(
            r#"
lookup:
  table: { name: courses, candidates: ["//table[@name='courses']"] }
  row: "Selenium Webdriver"
  column: 2
  expect: "30"
"#,
        ) else {
            panic!("expected lookup");
        };
        assert_eq!(l.key_column, 0);
        assert_eq!(l.column, 2);
        assert_eq!(l.expect.as_deref(), Some("30"));
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        let err = serde_yaml::from_str::<Step>("drag: { target: x }").unwrap_err();
        assert!(err.to_string().contains("drag"));
    }

    #[test]
    fn test_two_keys_are_rejected() {
        let err = serde_yaml::from_str::<Step>("{ log: { message: a }, goto: { url: b } }").unwrap_err();
        assert!(err.to_string().contains("second key"));
    }
}
