//! Browsing-context bookkeeping: which window and frame path driver calls
//! are directed at, and where to return to when a scope ends.

use crate::driver::ElementRef;
use crate::locator::Target;
use std::fmt;

/// An active browsing scope: a window plus the frame path inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowsingContext {
    pub window: String,
    /// Frame elements from the top-level document down. Empty = main document.
    pub frames: Vec<ElementRef>,
}

impl BrowsingContext {
    pub fn top(window: impl Into<String>) -> Self {
        Self {
            window: window.into(),
            frames: Vec::new(),
        }
    }

    pub fn child_frame(&self, frame: ElementRef) -> Self {
        let mut frames = self.frames.clone();
        frames.push(frame);
        Self {
            window: self.window.clone(),
            frames,
        }
    }

    pub fn is_main_document(&self) -> bool {
        self.frames.is_empty()
    }

    /// `self` is `other` plus exactly one more frame.
    pub(crate) fn is_child_of(&self, other: &BrowsingContext) -> bool {
        self.window == other.window
            && self.frames.len() == other.frames.len() + 1
            && self.frames.starts_with(&other.frames)
    }
}

impl fmt::Display for BrowsingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window {}", self.window)?;
        for frame in &self.frames {
            write!(f, " > frame {}", frame)?;
        }
        Ok(())
    }
}

/// What to switch into.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextDescriptor {
    /// An iframe located through the resolver.
    Frame(Target),
    /// An already-resolved iframe element.
    FrameElement(ElementRef),
    /// A window or tab by handle.
    Window(String),
    /// Wait for a window whose handle is not in `known`, then switch to it.
    NewWindow { known: Vec<String> },
}

/// A pushed context and the one it was entered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFrame {
    pub context: BrowsingContext,
    pub previous: BrowsingContext,
    /// The entered window was closed inside the scope.
    pub closed: bool,
}

/// LIFO record of entered contexts. Owned by the session.
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<ContextFrame>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Innermost entered context.
    pub fn top(&self) -> Option<&ContextFrame> {
        self.frames.last()
    }

    pub fn frames(&self) -> &[ContextFrame] {
        &self.frames
    }

    pub(crate) fn push(&mut self, frame: ContextFrame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop(&mut self) -> Option<ContextFrame> {
        self.frames.pop()
    }

    pub(crate) fn mark_closed(&mut self) {
        if let Some(top) = self.frames.last_mut() {
            top.closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_frame_relationship() {
        let main = BrowsingContext::top("w1");
        let inner = main.child_frame(ElementRef::new("n4"));
        let deeper = inner.child_frame(ElementRef::new("n9"));
        assert!(main.is_main_document());
        assert!(inner.is_child_of(&main));
        assert!(deeper.is_child_of(&inner));
        assert!(!deeper.is_child_of(&main));
        assert!(!BrowsingContext::top("w2").child_frame(ElementRef::new("n4")).is_child_of(&main));
        assert_eq!(deeper.to_string(), "window w1 > frame n4 > frame n9");
    }

    #[test]
    fn stack_is_lifo() {
        let mut stack = ContextStack::new();
        let main = BrowsingContext::top("w1");
        let frame = main.child_frame(ElementRef::new("n1"));
        stack.push(ContextFrame {
            context: frame.clone(),
            previous: main.clone(),
            closed: false,
        });
        stack.push(ContextFrame {
            context: BrowsingContext::top("w2"),
            previous: frame.clone(),
            closed: false,
        });
        stack.mark_closed();
        assert_eq!(stack.depth(), 2);
        let popped = stack.pop().unwrap();
        assert!(popped.closed);
        assert_eq!(popped.previous, frame);
        assert_eq!(stack.top().unwrap().previous, main);
    }
}
