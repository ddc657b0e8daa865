use super::Finding;
use crate::config::steps::{
    AlertStep, AssertTextStep, ChooseStep, InteractStep, LookupStep, ReconcileExpectation,
    ReconcileStep, WithinNewWindowStep,
};
use crate::config::Step;
use crate::{Error, Result};
use grapple_core::{
    locator, table, ContextDescriptor, Driver, Interaction, Query, Session, Target,
    TableExtractor,
};
use std::time::Duration;
use tracing::{debug, info};

/// Walks a step list, collecting findings as it goes.
#[derive(Debug, Default)]
pub(crate) struct Executor {
    pub findings: Vec<Finding>,
    pub executed: usize,
}

impl Executor {
    pub fn run_steps<D: Driver>(&mut self, session: &mut Session<D>, steps: &[Step]) -> Result<()> {
        for step in steps {
            debug!("Executing step {}: {}", self.executed + 1, step.name());
            self.run_step(session, step)?;
            self.executed += 1;
        }
        Ok(())
    }

    fn run_step<D: Driver>(&mut self, session: &mut Session<D>, step: &Step) -> Result<()> {
        match step {
            Step::Goto(s) => {
                info!("goto: {}", s.url);
                session.driver_mut().goto(&s.url)?;
            }
            Step::WaitFor(s) => {
                debug!("wait_for: {}", s.target);
                let poll = match s.timeout_ms {
                    Some(ms) => session.poll().with_timeout(Duration::from_millis(ms)),
                    None => session.poll().clone(),
                };
                match s.count {
                    Some(min) => {
                        let found = locator::wait_for_all(session.driver_mut(), &s.target, min, &poll)?;
                        debug!("{}: {} match(es)", s.target, found.len());
                    }
                    None => {
                        locator::wait_for(session.driver_mut(), &s.target, &poll)?;
                    }
                }
            }
            Step::Interact(s) => self.interact(session, s)?,
            Step::Click(s) => {
                info!("click: {}", s.target);
                let found = session.wait_for(&s.target)?;
                Interaction::Click.perform(session.driver_mut(), &found.element)?;
            }
            Step::Hover(s) => {
                info!("hover: {}", s.target);
                let found = session.wait_for(&s.target)?;
                Interaction::Hover.perform(session.driver_mut(), &found.element)?;
            }
            Step::Select(s) => {
                info!("select: {} in {}", s.option, s.target);
                let found = session.wait_for(&s.target)?;
                Interaction::Select(s.option.clone()).perform(session.driver_mut(), &found.element)?;
            }
            Step::Choose(s) => self.choose(session, s)?,
            Step::Alert(s) => self.alert(session, s)?,
            Step::WithinFrame(s) => {
                info!("within_frame: {}", s.target);
                session.within(ContextDescriptor::Frame(s.target.clone()), |scope| {
                    self.run_steps(scope, &s.steps)
                })?;
            }
            Step::WithinNewWindow(s) => self.within_new_window(session, s)?,
            Step::Reconcile(s) => self.reconcile(session, s)?,
            Step::Lookup(s) => self.lookup(session, s)?,
            Step::AssertText(s) => assert_text(session, s)?,
            Step::AssertUrl(s) => {
                debug!("assert_url: contains '{}'", s.contains);
                let url = session.driver_mut().current_url()?;
                if !url.contains(&s.contains) {
                    return Err(Error::AssertionFailed(format!(
                        "url '{}' does not contain '{}'",
                        url, s.contains
                    )));
                }
            }
            Step::Log(s) => {
                info!("[log] {}", s.message);
            }
        }
        Ok(())
    }

    fn interact<D: Driver>(&mut self, session: &mut Session<D>, step: &InteractStep) -> Result<()> {
        info!("interact: {} ({} strategies)", step.target, step.strategies.len());
        if step.required {
            session.wait_for(&step.target)?;
        }
        let execution = session.execute(&step.target, &step.strategies)?;
        let outcome = execution.outcome.clone();
        let succeeded = execution.succeeded();
        self.findings.push(Finding::Interaction {
            target: step.target.name.clone(),
            execution,
        });
        if !succeeded && step.required {
            return Err(Error::StepFailed(format!(
                "{}: no strategy verified ({})",
                step.target, outcome
            )));
        }
        Ok(())
    }

    fn choose<D: Driver>(&mut self, session: &mut Session<D>, step: &ChooseStep) -> Result<()> {
        info!("choose: {:?} from {}", step.text, step.options);
        if let (Some(input), Some(typed)) = (&step.input, &step.typed) {
            let field = session.wait_for(input)?;
            Interaction::ClearAndType(typed.clone()).perform(session.driver_mut(), &field.element)?;
        }

        let offered = session.wait_for_all(&step.options, 1)?;
        debug!("{}: {} entries offered", step.options, offered.len());
        let chosen = session.wait_for_text(&step.options, &step.text)?;
        Interaction::Click.perform(session.driver_mut(), &chosen.element)?;
        self.findings.push(Finding::Choice {
            options: step.options.name.clone(),
            chosen: chosen.text.clone(),
            position: chosen.position,
            offered: chosen.offered,
        });

        let (Some(input), Some(expected)) = (&step.input, &step.expect_value) else {
            return Ok(());
        };
        let field = session.require(input)?;
        let value = session
            .driver_mut()
            .property(&field.element, "value")?
            .unwrap_or_default();
        if value.trim() != expected.trim() {
            return Err(Error::AssertionFailed(format!(
                "{} holds {:?} after choosing {:?}, expected {:?}",
                input, value, chosen.text, expected
            )));
        }
        Ok(())
    }

    fn alert<D: Driver>(&mut self, session: &mut Session<D>, step: &AlertStep) -> Result<()> {
        info!("alert: {}", step.disposition);
        let text = if step.wait {
            session.wait_for_alert(&step.disposition)?
        } else {
            session.handle_alert(&step.disposition)?
        };
        self.findings.push(Finding::Alert {
            text: text.clone(),
            disposition: step.disposition.clone(),
        });
        if let Some(ref expected) = step.expect_text {
            if !text.contains(expected.as_str()) {
                return Err(Error::AssertionFailed(format!(
                    "alert text {:?} does not contain {:?}",
                    text, expected
                )));
            }
        }
        Ok(())
    }

    fn within_new_window<D: Driver>(
        &mut self,
        session: &mut Session<D>,
        step: &WithinNewWindowStep,
    ) -> Result<()> {
        info!("within_new_window: trigger {}", step.trigger);
        let known = session.driver_mut().window_handles()?;
        let trigger = session.wait_for(&step.trigger)?;
        Interaction::Click.perform(session.driver_mut(), &trigger.element)?;

        session.within(ContextDescriptor::NewWindow { known }, |scope| {
            self.run_steps(scope, &step.steps)?;
            if step.close {
                debug!("closing window {:?}", scope.context().map(|c| c.window.clone()));
                scope.close_window()?;
            }
            Ok(())
        })
    }

    fn reconcile<D: Driver>(&mut self, session: &mut Session<D>, step: &ReconcileStep) -> Result<()> {
        info!("reconcile: {} column {} against {}", step.table, step.column, step.declared);
        session.wait_for(&step.table)?;

        let extractor = extractor_for(&step.table, step.rows.as_ref(), step.cells.as_ref());
        let records = session.extract_table(&extractor)?;
        let body = match (step.skip_header, records.split_first()) {
            (true, Some((_, rest))) => rest,
            _ => &records[..],
        };

        let result = session.reconcile(body, step.column, &step.declared)?;
        let matches = result.matches;
        let summary = result.to_string();
        self.findings.push(Finding::Reconciliation {
            table: step.table.name.clone(),
            result,
        });

        match (step.expect, matches) {
            (ReconcileExpectation::Match, false) => Err(Error::AssertionFailed(format!(
                "{}: expected totals to match, {}",
                step.table, summary
            ))),
            (ReconcileExpectation::Mismatch, true) => Err(Error::AssertionFailed(format!(
                "{}: expected totals to differ, {}",
                step.table, summary
            ))),
            _ => Ok(()),
        }
    }

    fn lookup<D: Driver>(&mut self, session: &mut Session<D>, step: &LookupStep) -> Result<()> {
        info!("lookup: {} row {:?} column {}", step.table, step.row, step.column);
        session.wait_for(&step.table)?;
        let extractor = extractor_for(&step.table, step.rows.as_ref(), step.cells.as_ref());
        let records = session.extract_table(&extractor)?;

        let Some(record) = table::find_row(&records, step.key_column, &step.row) else {
            return Err(Error::StepFailed(format!(
                "{}: no row has {:?} in column {} (column holds: {})",
                step.table,
                step.row,
                step.key_column,
                table::column(&records, step.key_column).join(", ")
            )));
        };
        let Some(value) = record.cell(step.column) else {
            return Err(Error::StepFailed(format!(
                "{}: row {} has {} cell(s), no column {}",
                step.table,
                record.index,
                record.cells.len(),
                step.column
            )));
        };
        debug!("{} row {}: {:?}", step.table, record.index, record.cells);

        let value = value.to_string();
        self.findings.push(Finding::Lookup {
            table: step.table.name.clone(),
            row: step.row.clone(),
            column: step.column,
            value: value.clone(),
        });
        match step.expect {
            Some(ref expected) if value != expected.trim() => Err(Error::AssertionFailed(format!(
                "{} row {:?} column {} reads {:?}, expected {:?}",
                step.table, step.row, step.column, value, expected
            ))),
            _ => Ok(()),
        }
    }
}

fn extractor_for(table: &Target, rows: Option<&Query>, cells: Option<&Query>) -> TableExtractor {
    let mut extractor = TableExtractor::new(table.clone());
    if let Some(rows) = rows {
        extractor = extractor.rows_query(rows.clone());
    }
    if let Some(cells) = cells {
        extractor = extractor.cells_query(cells.clone());
    }
    extractor
}

fn assert_text<D: Driver>(session: &mut Session<D>, step: &AssertTextStep) -> Result<()> {
    debug!("assert_text: '{}'", step.text);
    let (text, place) = match step.target {
        Some(ref target) => {
            let found = session.wait_for(target)?;
            (session.driver_mut().text(&found.element)?, target.to_string())
        }
        None => (page_text(session.driver_mut())?, "page".to_string()),
    };
    if !text.contains(&step.text) {
        return Err(Error::AssertionFailed(format!(
            "text '{}' not found in {}",
            step.text, place
        )));
    }
    Ok(())
}

/// Visible text of the current document, or its source when it has no body.
pub(crate) fn page_text<D: Driver + ?Sized>(driver: &mut D) -> Result<String> {
    let bodies = match driver.find_all(&Query::tag("body")) {
        Ok(found) => found,
        Err(e) if e.is_absence() => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    match bodies.first() {
        Some(body) => Ok(driver.text(body)?),
        None => Ok(driver.page_source()?),
    }
}
