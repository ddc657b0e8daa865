//! Driver ownership and scoped context switching.

use crate::alert::{self, Disposition};
use crate::context::{BrowsingContext, ContextDescriptor, ContextFrame, ContextStack};
use crate::driver::Driver;
use crate::driver::ElementRef;
use crate::locator::{self, Resolved, Target, TextMatch};
use crate::reconcile::{self, ReconciliationResult};
use crate::strategy::{self, ActionStrategy, Execution};
use crate::table::{TableExtractor, TableRecord};
use crate::wait::Poll;
use crate::{Error, Result};
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

/// One browsing session. Owns the driver and the context stack, and ends
/// the driver session exactly once: through [`Session::close`] or on drop.
///
/// The context stack assumes window and frame switches only happen through
/// [`Session::enter`].
pub struct Session<D: Driver> {
    driver: D,
    contexts: ContextStack,
    poll: Poll,
    closed: bool,
}

impl<D: Driver> Session<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            contexts: ContextStack::new(),
            poll: Poll::default(),
            closed: false,
        }
    }

    /// Bound used by every wait the session performs.
    pub fn with_poll(mut self, poll: Poll) -> Self {
        self.poll = poll;
        self
    }

    pub fn set_poll(&mut self, poll: Poll) {
        self.poll = poll;
    }

    pub fn poll(&self) -> &Poll {
        &self.poll
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn contexts(&self) -> &ContextStack {
        &self.contexts
    }

    /// The context driver calls are currently directed at.
    pub fn current_context(&mut self) -> Result<BrowsingContext> {
        match self.contexts.top() {
            Some(top) if !top.closed => Ok(top.context.clone()),
            _ => Ok(BrowsingContext::top(self.driver.window_handle()?)),
        }
    }

    pub fn resolve(&mut self, target: &Target) -> Result<Option<Resolved>> {
        locator::resolve(&mut self.driver, target)
    }

    pub fn require(&mut self, target: &Target) -> Result<Resolved> {
        locator::require(&mut self.driver, target)
    }

    pub fn wait_for(&mut self, target: &Target) -> Result<Resolved> {
        locator::wait_for(&mut self.driver, target, &self.poll)
    }

    /// Wait until the target's winning candidate has at least `min` matches.
    pub fn wait_for_all(&mut self, target: &Target, min: usize) -> Result<Vec<ElementRef>> {
        locator::wait_for_all(&mut self.driver, target, min, &self.poll)
    }

    /// Wait for the target entry that reads `wanted`, as in a suggestion list.
    pub fn wait_for_text(&mut self, target: &Target, wanted: &str) -> Result<TextMatch> {
        locator::wait_for_text(&mut self.driver, target, wanted, &self.poll)
    }

    pub fn execute(&mut self, target: &Target, strategies: &[ActionStrategy]) -> Result<Execution> {
        strategy::execute(&mut self.driver, target, strategies)
    }

    pub fn handle_alert(&mut self, disposition: &Disposition) -> Result<String> {
        alert::handle(&mut self.driver, disposition)
    }

    pub fn wait_for_alert(&mut self, disposition: &Disposition) -> Result<String> {
        alert::wait_and_handle(&mut self.driver, disposition, &self.poll)
    }

    pub fn extract_table(&mut self, extractor: &TableExtractor) -> Result<Vec<TableRecord>> {
        extractor.extract(&mut self.driver)
    }

    pub fn reconcile(
        &mut self,
        records: &[TableRecord],
        column: usize,
        declared: &Target,
    ) -> Result<ReconciliationResult> {
        reconcile::reconcile(&mut self.driver, records, column, declared)
    }

    /// Switch into a frame or window. The returned scope restores the
    /// previous context when released or dropped.
    pub fn enter(&mut self, descriptor: ContextDescriptor) -> Result<Scope<'_, D>> {
        let previous = self.current_context()?;
        let context = match descriptor {
            ContextDescriptor::Frame(target) => {
                let frame = locator::wait_for(&mut self.driver, &target, &self.poll)?;
                self.driver.switch_to_frame(&frame.element)?;
                previous.child_frame(frame.element)
            }
            ContextDescriptor::FrameElement(frame) => {
                self.driver.switch_to_frame(&frame)?;
                previous.child_frame(frame)
            }
            ContextDescriptor::Window(handle) => {
                self.driver.switch_to_window(&handle)?;
                BrowsingContext::top(handle)
            }
            ContextDescriptor::NewWindow { known } => {
                let driver = &mut self.driver;
                let handle = self.poll.until("new window", || {
                    Ok(driver.window_handles()?.into_iter().find(|h| !known.contains(h)))
                })?;
                self.driver.switch_to_window(&handle)?;
                BrowsingContext::top(handle)
            }
        };

        debug!("enter {} (from {})", context, previous);
        self.contexts.push(ContextFrame {
            context,
            previous,
            closed: false,
        });
        let depth = self.contexts.depth();
        Ok(Scope {
            session: self,
            depth,
            armed: true,
        })
    }

    /// Run `body` inside a context and restore afterwards on every path.
    /// A body error wins over a restoration error. The body may use any
    /// error type the core's errors convert into.
    pub fn within<T, E, F>(&mut self, descriptor: ContextDescriptor, body: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut Scope<'_, D>) -> std::result::Result<T, E>,
    {
        let mut scope = self.enter(descriptor)?;
        let out = body(&mut scope);
        let restored = scope.release();
        match (out, restored) {
            (Err(e), Err(restore)) => {
                warn!("context restore after failure also failed: {}", restore);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(restore)) => Err(restore.into()),
            (Ok(v), Ok(())) => Ok(v),
        }
    }

    /// End the driver session.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.driver.quit()?;
        Ok(())
    }

    /// Finish every pending restore, innermost first.
    ///
    /// A restore that failed (typically because a dialog blocked the
    /// switch) leaves its entry on the stack; call this once the blocker
    /// is gone to get back to the top-level document.
    pub fn unwind(&mut self) -> Result<()> {
        self.restore_to(0)
    }

    fn restore_to(&mut self, depth: usize) -> Result<()> {
        while self.contexts.depth() > depth {
            self.restore_top()?;
        }
        Ok(())
    }

    /// Switch back from the innermost context. The entry is popped only
    /// once the switch succeeds, or when its way back no longer exists.
    fn restore_top(&mut self) -> Result<()> {
        let Some(frame) = self.contexts.top().cloned() else {
            return Ok(());
        };
        debug!("leave {} (back to {})", frame.context, frame.previous);
        match self.switch_back(&frame) {
            Ok(()) => {
                self.contexts.pop();
                Ok(())
            }
            Err(e @ Error::ContextLost { .. }) => {
                self.contexts.pop();
                Err(e)
            }
            Err(e) => {
                debug!("{} still active: {}", frame.context, e);
                Err(e)
            }
        }
    }

    fn switch_back(&mut self, frame: &ContextFrame) -> Result<()> {
        let previous = &frame.previous;

        if !frame.closed && frame.context.is_child_of(previous) {
            self.driver.switch_to_parent_frame()?;
            return Ok(());
        }

        if frame.closed || frame.context.window != previous.window {
            let handles = self.driver.window_handles()?;
            if !handles.contains(&previous.window) {
                return Err(Error::ContextLost {
                    handle: previous.window.clone(),
                });
            }
            self.driver.switch_to_window(&previous.window)?;
        } else {
            self.driver.switch_to_default_content()?;
        }
        for f in &previous.frames {
            self.driver.switch_to_frame(f)?;
        }
        Ok(())
    }
}

impl<D: Driver> Drop for Session<D> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.driver.quit() {
            warn!("failed to quit driver session: {}", e);
        }
    }
}

/// An entered context. Derefs to the session so work inside the scope uses
/// the same API, including nested [`Session::enter`].
pub struct Scope<'s, D: Driver> {
    session: &'s mut Session<D>,
    /// Stack depth with this scope's entry on top.
    depth: usize,
    armed: bool,
}

impl<D: Driver> Scope<'_, D> {
    /// The context this scope entered.
    pub fn context(&self) -> Option<&BrowsingContext> {
        let index = self.depth.checked_sub(1)?;
        self.session.contexts.frames().get(index).map(|f| &f.context)
    }

    /// Close the entered window. Restoration then switches back to the
    /// window the scope was entered from.
    pub fn close_window(&mut self) -> Result<()> {
        self.session.restore_to(self.depth)?;
        self.session.driver.close_window()?;
        self.session.contexts.mark_closed();
        Ok(())
    }

    /// Restore the previous context, reporting failure. Entries left by
    /// inner scopes that failed to restore are finished first.
    pub fn release(mut self) -> Result<()> {
        self.armed = false;
        self.session.restore_to(self.depth.saturating_sub(1))
    }
}

impl<D: Driver> Deref for Scope<'_, D> {
    type Target = Session<D>;

    fn deref(&self) -> &Session<D> {
        &*self.session
    }
}

impl<D: Driver> DerefMut for Scope<'_, D> {
    fn deref_mut(&mut self) -> &mut Session<D> {
        &mut *self.session
    }
}

impl<D: Driver> Drop for Scope<'_, D> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.session.restore_to(self.depth.saturating_sub(1)) {
            warn!("failed to restore browsing context: {}", e);
        }
    }
}
