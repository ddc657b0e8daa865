//! Integration tests for grapple-runner against a real browser.
//!
//! These tests require Chrome to be installed and available.
//! Run with: cargo test -p grapple-runner --test integration -- --ignored

use grapple_runner::{BrowserConfig, Config, Finding, Runner};

fn chrome_available() -> bool {
    eoka::stealth::patcher::find_chrome().is_ok()
}

fn headless() -> BrowserConfig {
    BrowserConfig {
        headless: true,
        ..Default::default()
    }
}

fn run(yaml: &str) -> grapple_runner::RunResult {
    let config = Config::parse(yaml).expect("Failed to parse scenario");
    let mut runner = Runner::launch(&headless()).expect("Failed to launch browser");
    let result = runner.run(&config).expect("Run failed to start");
    runner.close().expect("Failed to close browser");
    result
}

#[test]
#[ignore = "requires Chrome"]
fn test_label_click_toggles_checkbox() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let result = run(
        r#"
name: "label click"
target:
  url: "data:text/html,<label for='ctl00_SeniorCitizenDiscount'>Senior</label><input type='checkbox' id='ctl00_SeniorCitizenDiscount'>"
poll: { timeout_ms: 3000, interval_ms: 50 }
steps:
  - interact:
      target: { name: "senior", candidates: ["label-for:SeniorCitizen", "id-contains:SeniorCitizen"] }
      strategies:
        - name: label_click
          action: click
          verify:
            property: checked
            expect: flip
            probe: { name: box, candidates: ["id-contains:SeniorCitizen"] }
            settle_ms: 500
"#,
    );

    assert!(result.success, "{:?}", result.error);
    let Finding::Interaction { ref execution, .. } = result.findings[0] else {
        panic!("expected interaction finding");
    };
    assert_eq!(execution.winner, Some(0));
}

#[test]
#[ignore = "requires Chrome"]
fn test_alert_is_read_and_accepted() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let result = run(
        r#"
name: "alert"
target:
  url: "data:text/html,<button id='b' onclick=\"alert('Hello Jo'); document.title='done'\">go</button>"
poll: { timeout_ms: 3000, interval_ms: 50 }
steps:
  - click:
      target: { name: button, candidates: ["id:b"] }
  - alert: { disposition: accept, expect_text: "Hello" }
success:
  all:
    - title_contains: "done"
"#,
    );

    assert!(result.success, "{:?}", result.error);
    assert!(matches!(
        &result.findings[0],
        Finding::Alert { text, .. } if text == "Hello Jo"
    ));
}

#[test]
#[ignore = "requires Chrome"]
fn test_table_reconciliation_reports_totals() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let result = run(
        r#"
name: "table"
target:
  url: "data:text/html,<table id='t'><tr><th>n</th><th>amount</th></tr><tr><td>a</td><td>10</td></tr><tr><td>b</td><td>32</td></tr></table><div class='total'>Total Amount Collected: 42</div>"
poll: { timeout_ms: 3000, interval_ms: 50 }
steps:
  - reconcile:
      table: { name: table, candidates: ["id:t"] }
      column: 1
      skip_header: true
      declared: { name: total, candidates: [".total"] }
      expect: match
"#,
    );

    assert!(result.success, "{:?}", result.error);
    let Finding::Reconciliation { ref result, .. } = result.findings[0] else {
        panic!("expected reconciliation finding");
    };
    assert_eq!(result.computed, 42.0);
    assert!(result.matches);
}

#[test]
#[ignore = "requires Chrome"]
fn test_missing_element_fails_with_error() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let result = run(
        r#"
name: "missing"
target:
  url: "data:text/html,<p>nothing here</p>"
poll: { timeout_ms: 500, interval_ms: 50 }
steps:
  - wait_for:
      target: { name: ghost, candidates: ["id:ghost", "link:Ghost"] }
"#,
    );

    assert!(!result.success);
    assert!(result.error.unwrap().contains("ghost"));
}

#[test]
#[ignore = "requires Chrome"]
fn test_dismissed_confirm_returns_false_to_the_page() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let result = run(
        r#"
name: "confirm"
target:
  url: "data:text/html,<button id='b' onclick=\"document.title = confirm('Sure?') ? 'yes' : 'no'\">go</button>"
poll: { timeout_ms: 3000, interval_ms: 50 }
steps:
  - click:
      target: { name: button, candidates: ["id:b"] }
  - alert: { disposition: dismiss, expect_text: "Sure" }
success:
  all:
    - title_contains: "no"
"#,
    );

    assert!(result.success, "{:?}", result.error);
}

#[test]
#[ignore = "requires Chrome"]
fn test_prompt_answer_reaches_the_page() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let result = run(
        r#"
name: "prompt"
target:
  url: "data:text/html,<button id='b' onclick=\"document.title = 'got ' + prompt('Name?')\">go</button>"
poll: { timeout_ms: 3000, interval_ms: 50 }
steps:
  - click:
      target: { name: button, candidates: ["id:b"] }
  - alert: { disposition: { respond: "Jo" } }
success:
  all:
    - title_contains: "got Jo"
"#,
    );

    assert!(result.success, "{:?}", result.error);
}

#[test]
#[ignore = "requires Chrome"]
fn test_select_and_lookup_steps() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let result = run(
        r#"
name: "select and lookup"
target:
  url: "data:text/html,<select id='s' onchange=\"document.title = 'picked ' + this.value\"><option value='a'>Alpha</option><option value='b'>Beta</option></select><table id='c'><tr><th>course</th><th>price</th></tr><tr><td>Learn SQL</td><td>25</td></tr></table>"
poll: { timeout_ms: 3000, interval_ms: 50 }
steps:
  - select:
      target: { name: dropdown, candidates: ["id:s"] }
      option: { text: "Beta" }
  - lookup:
      table: { name: courses, candidates: ["id:c"] }
      row: "Learn SQL"
      column: 1
      expect: "25"
success:
  all:
    - title_contains: "picked b"
"#,
    );

    assert!(result.success, "{:?}", result.error);
    assert!(matches!(
        &result.findings[0],
        Finding::Lookup { value, .. } if value == "25"
    ));
}
