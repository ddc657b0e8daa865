//! Deterministic in-memory [`Driver`].
//!
//! A tree of [`Node`]s per document, documents per window or iframe, and
//! just enough browser behaviour to exercise the core: label activation,
//! checkbox and radio state, `<select>` options, modal alerts, click- and
//! hover-triggered effects and
//! elements that only appear after a number of lookups. Structural queries
//! are evaluated on the tree; CSS and XPath are answered from routes the
//! fixture registers.

use crate::driver::{Driver, DriverError, DriverResult, ElementRef, OptionChoice};
use crate::query::Query;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Handle of the window every driver starts with.
pub const MAIN_WINDOW: &str = "main";

/// Cell query pre-registered by [`MemoryDriver::new`].
const CELL_XPATH: &str = "./td | ./th";

/// A document inside the driver: a window's page or an iframe's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocId(usize);

/// Element description used to build fixtures.
#[derive(Debug, Clone, Default)]
pub struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    value: Option<String>,
    checked: bool,
    hidden: bool,
    decoy: bool,
    script_decoy: bool,
    not_interactable: bool,
    click_error: Option<DriverError>,
    appear_after: usize,
}

impl Node {
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into().to_ascii_lowercase();
        let value = matches!(tag.as_str(), "input" | "textarea" | "select").then(String::new);
        Self {
            tag,
            value,
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
        self
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: impl Into<String>) -> Self {
        let class = class.into();
        let joined = match self.attribute("class") {
            Some(existing) => format!("{} {}", existing, class),
            None => class,
        };
        self.attr("class", joined)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    /// Not displayed. Native clicks and typing are rejected.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Native clicks succeed without doing anything.
    pub fn decoy(mut self) -> Self {
        self.decoy = true;
        self
    }

    /// Scripted clicks succeed without doing anything.
    pub fn script_decoy(mut self) -> Self {
        self.script_decoy = true;
        self
    }

    /// Native clicks fail with [`DriverError::NotInteractable`].
    pub fn not_interactable(mut self) -> Self {
        self.not_interactable = true;
        self
    }

    /// Native clicks fail with this error.
    pub fn click_error(mut self, err: DriverError) -> Self {
        self.click_error = Some(err);
        self
    }

    /// Found from the `lookups`-th lookup on.
    pub fn appear_after(mut self, lookups: usize) -> Self {
        self.appear_after = lookups;
        self
    }

    pub fn tag_name(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn own_text(&self) -> &str {
        &self.text
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|c| c.split_whitespace().any(|x| x == class))
    }
}

/// Side effect of a successful click or hover.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a modal alert with this text.
    Alert(String),
    /// Make the window with this handle visible (creating an empty one if
    /// it was never registered).
    OpenWindow(String),
    SetDisplayed(ElementRef, bool),
    SetText(ElementRef, String),
    SetValue(ElementRef, String),
    Remove(ElementRef),
}

type Predicate = Box<dyn Fn(&Node) -> bool>;

struct Route {
    query: Query,
    children_only: bool,
    matches: Predicate,
}

#[derive(Debug)]
struct Slot {
    node: Node,
    doc: DocId,
    children: Vec<usize>,
    frame_doc: Option<DocId>,
    pending: usize,
    removed: bool,
}

#[derive(Debug, Default)]
struct Doc {
    roots: Vec<usize>,
}

#[derive(Debug)]
struct Window {
    handle: String,
    title: String,
    url: String,
    doc: DocId,
    open: bool,
    closed: bool,
}

#[derive(Debug)]
struct PendingAlert {
    text: String,
    after: usize,
    response: Option<String>,
}

/// In-memory browser. See the module docs.
pub struct MemoryDriver {
    slots: Vec<Slot>,
    docs: Vec<Doc>,
    windows: Vec<Window>,
    current: Option<usize>,
    frames: Vec<usize>,
    routes: Vec<Route>,
    failures: Vec<(Query, DriverError)>,
    effects: HashMap<usize, Vec<Effect>>,
    hover_effects: HashMap<usize, Vec<Effect>>,
    alert: Option<PendingAlert>,
    alert_log: Vec<(String, String)>,
    calls: Vec<String>,
    quits: Arc<AtomicUsize>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    /// One open window, [`MAIN_WINDOW`], with an empty document.
    pub fn new() -> Self {
        let mut driver = Self {
            slots: Vec::new(),
            docs: vec![Doc::default()],
            windows: vec![Window {
                handle: MAIN_WINDOW.to_string(),
                title: String::new(),
                url: "about:blank".to_string(),
                doc: DocId(0),
                open: true,
                closed: false,
            }],
            current: Some(0),
            frames: Vec::new(),
            routes: Vec::new(),
            failures: Vec::new(),
            effects: HashMap::new(),
            hover_effects: HashMap::new(),
            alert: None,
            alert_log: Vec::new(),
            calls: Vec::new(),
            quits: Arc::new(AtomicUsize::new(0)),
        };
        driver.route(Query::xpath(CELL_XPATH), |n| {
            matches!(n.tag_name(), "td" | "th")
        });
        driver
    }

    // Fixture building

    /// Document of the main window.
    pub fn main_doc(&self) -> DocId {
        DocId(0)
    }

    /// Append a root-level node to the main window's document.
    pub fn add(&mut self, node: Node) -> ElementRef {
        self.add_in(DocId(0), node)
    }

    pub fn add_in(&mut self, doc: DocId, node: Node) -> ElementRef {
        let idx = self.insert(doc, node);
        self.docs[doc.0].roots.push(idx);
        handle_of(idx)
    }

    /// Append `node` under `parent`. Panics on a foreign handle.
    pub fn add_child(&mut self, parent: &ElementRef, node: Node) -> ElementRef {
        let parent = index_of(parent)
            .filter(|&i| i < self.slots.len())
            .unwrap_or_else(|| panic!("unknown parent {}", parent));
        let doc = self.slots[parent].doc;
        let idx = self.insert(doc, node);
        self.slots[parent].children.push(idx);
        handle_of(idx)
    }

    /// Add an iframe element to the main document. Returns the element and
    /// the frame's own document.
    pub fn add_frame(&mut self, node: Node) -> (ElementRef, DocId) {
        self.add_frame_in(DocId(0), node)
    }

    pub fn add_frame_in(&mut self, doc: DocId, node: Node) -> (ElementRef, DocId) {
        let el = self.add_in(doc, node);
        let inner = self.new_doc();
        if let Some(idx) = index_of(&el) {
            self.slots[idx].frame_doc = Some(inner);
        }
        (el, inner)
    }

    /// Register an already open window.
    pub fn add_window(&mut self, handle: &str, title: &str, url: &str) -> DocId {
        self.push_window(handle, title, url, true)
    }

    /// Register a window that stays invisible until an
    /// [`Effect::OpenWindow`] opens it.
    pub fn add_popup(&mut self, handle: &str, title: &str, url: &str) -> DocId {
        self.push_window(handle, title, url, false)
    }

    /// Answer `query` with every node satisfying `matches`. An XPath that
    /// starts with `./` only considers direct children of the context.
    pub fn route<F>(&mut self, query: Query, matches: F)
    where
        F: Fn(&Node) -> bool + 'static,
    {
        let children_only = matches!(&query, Query::XPath(x) if x.starts_with("./") && !x.starts_with(".//"));
        self.routes.retain(|r| r.query != query);
        self.routes.push(Route {
            query,
            children_only,
            matches: Box::new(matches),
        });
    }

    /// Make every lookup of `query` fail with `err`.
    pub fn fail_query(&mut self, query: Query, err: DriverError) {
        self.failures.push((query, err));
    }

    pub fn on_click(&mut self, el: &ElementRef, effect: Effect) {
        if let Some(idx) = index_of(el) {
            self.effects.entry(idx).or_default().push(effect);
        }
    }

    pub fn on_hover(&mut self, el: &ElementRef, effect: Effect) {
        if let Some(idx) = index_of(el) {
            self.hover_effects.entry(idx).or_default().push(effect);
        }
    }

    pub fn raise_alert(&mut self, text: impl Into<String>) {
        self.raise_alert_after(text, 0);
    }

    /// The alert is reported absent to the first `polls` alert reads.
    pub fn raise_alert_after(&mut self, text: impl Into<String>, polls: usize) {
        self.alert = Some(PendingAlert {
            text: text.into(),
            after: polls,
            response: None,
        });
    }

    pub fn remove(&mut self, el: &ElementRef) {
        if let Some(slot) = index_of(el).and_then(|i| self.slots.get_mut(i)) {
            slot.removed = true;
        }
    }

    pub fn set_text(&mut self, el: &ElementRef, text: impl Into<String>) {
        if let Some(slot) = index_of(el).and_then(|i| self.slots.get_mut(i)) {
            slot.node.text = text.into();
        }
    }

    // Inspection

    pub fn tag_of(&self, el: &ElementRef) -> Option<String> {
        self.slot(el).map(|s| s.node.tag.clone())
    }

    pub fn text_of(&self, el: &ElementRef) -> Option<String> {
        index_of(el)
            .filter(|&i| i < self.slots.len())
            .map(|i| self.full_text(i))
    }

    pub fn is_checked(&self, el: &ElementRef) -> bool {
        self.slot(el).is_some_and(|s| s.node.checked)
    }

    pub fn value_of(&self, el: &ElementRef) -> Option<String> {
        self.slot(el).and_then(|s| s.node.value.clone())
    }

    /// Every driver call, in order.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Resolved alerts as `(text, disposition)`.
    pub fn alert_log(&self) -> &[(String, String)] {
        &self.alert_log
    }

    pub fn current_handle(&self) -> Option<&str> {
        self.current.map(|w| self.windows[w].handle.as_str())
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn quit_count(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }

    /// Shared quit counter, still readable after the driver is dropped.
    pub fn quit_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.quits)
    }

    // Internals

    fn new_doc(&mut self) -> DocId {
        self.docs.push(Doc::default());
        DocId(self.docs.len() - 1)
    }

    fn push_window(&mut self, handle: &str, title: &str, url: &str, open: bool) -> DocId {
        let doc = self.new_doc();
        self.windows.push(Window {
            handle: handle.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            doc,
            open,
            closed: false,
        });
        doc
    }

    fn insert(&mut self, doc: DocId, node: Node) -> usize {
        let pending = node.appear_after;
        self.slots.push(Slot {
            node,
            doc,
            children: Vec::new(),
            frame_doc: None,
            pending,
            removed: false,
        });
        self.slots.len() - 1
    }

    fn slot(&self, el: &ElementRef) -> Option<&Slot> {
        index_of(el).and_then(|i| self.slots.get(i))
    }

    fn gate(&mut self, call: String) -> DriverResult<()> {
        self.calls.push(call);
        if self.quits.load(Ordering::SeqCst) > 0 {
            return Err(DriverError::Session("session has been quit".into()));
        }
        match &self.alert {
            Some(a) if a.after == 0 => Err(DriverError::UnexpectedAlert(a.text.clone())),
            _ => Ok(()),
        }
    }

    fn alert_gate(&mut self, call: &str) -> DriverResult<()> {
        self.calls.push(call.to_string());
        if self.quits.load(Ordering::SeqCst) > 0 {
            return Err(DriverError::Session("session has been quit".into()));
        }
        Ok(())
    }

    fn open_alert(&mut self) -> DriverResult<&mut PendingAlert> {
        match self.alert.as_mut() {
            Some(a) if a.after == 0 => Ok(a),
            _ => Err(DriverError::NoSuchAlert),
        }
    }

    fn current_window(&self) -> DriverResult<usize> {
        self.current
            .ok_or_else(|| DriverError::NoSuchWindow("current window is closed".into()))
    }

    fn current_doc(&self) -> DriverResult<DocId> {
        let window = &self.windows[self.current_window()?];
        Ok(match self.frames.last() {
            Some(&frame) => self.slots[frame].frame_doc.unwrap_or(window.doc),
            None => window.doc,
        })
    }

    /// A handle that is live in the current browsing context.
    fn element(&self, el: &ElementRef) -> DriverResult<usize> {
        let doc = self.current_doc()?;
        let idx = index_of(el)
            .filter(|&i| i < self.slots.len())
            .ok_or_else(|| DriverError::StaleElement(el.to_string()))?;
        let slot = &self.slots[idx];
        if slot.removed || slot.pending > 0 || slot.doc != doc {
            return Err(DriverError::StaleElement(format!(
                "{} is not attached to the current context",
                el
            )));
        }
        Ok(idx)
    }

    fn tick_pending(&mut self) {
        for slot in &mut self.slots {
            slot.pending = slot.pending.saturating_sub(1);
        }
    }

    fn find(&mut self, roots: Vec<usize>, query: &Query) -> DriverResult<Vec<ElementRef>> {
        if let Some((_, err)) = self.failures.iter().find(|(q, _)| q == query) {
            return Err(err.clone());
        }
        self.tick_pending();

        let route = self.routes.iter().find(|r| &r.query == query);
        let mut pool = Vec::new();
        if route.is_some_and(|r| r.children_only) {
            pool.extend(roots.iter().copied().filter(|&i| self.visible(i)));
        } else {
            for root in roots {
                self.descend(root, &mut pool);
            }
        }

        let found = pool
            .into_iter()
            .filter(|&i| {
                let node = &self.slots[i].node;
                match query {
                    Query::Css(_) | Query::XPath(_) => route.is_some_and(|r| (r.matches)(node)),
                    _ => matches_structural(query, node, &self.full_text(i)),
                }
            })
            .map(handle_of)
            .collect();
        Ok(found)
    }

    fn visible(&self, idx: usize) -> bool {
        let slot = &self.slots[idx];
        !slot.removed && slot.pending == 0
    }

    fn descend(&self, idx: usize, out: &mut Vec<usize>) {
        if !self.visible(idx) {
            return;
        }
        out.push(idx);
        for &child in &self.slots[idx].children {
            self.descend(child, out);
        }
    }

    fn full_text(&self, idx: usize) -> String {
        let slot = &self.slots[idx];
        let mut parts = Vec::new();
        let own = slot.node.text.trim();
        if !own.is_empty() {
            parts.push(own.to_string());
        }
        for &child in &slot.children {
            if self.visible(child) {
                let t = self.full_text(child);
                if !t.is_empty() {
                    parts.push(t);
                }
            }
        }
        parts.join(" ")
    }

    fn activate(&mut self, idx: usize) {
        let slot = &self.slots[idx];
        let doc = slot.doc;
        let tag = slot.node.tag.clone();
        let kind = slot.node.attribute("type").map(str::to_string);
        let label_for = slot.node.attribute("for").map(str::to_string);

        match (tag.as_str(), kind.as_deref()) {
            ("label", _) => {
                let control = label_for.and_then(|target| {
                    self.slots.iter().position(|s| {
                        s.doc == doc && !s.removed && s.node.attribute("id") == Some(target.as_str())
                    })
                });
                if let Some(control) = control {
                    self.toggle(control);
                }
            }
            ("input", Some("checkbox" | "radio")) => self.toggle(idx),
            _ => {}
        }

        let effects = self.effects.get(&idx).cloned().unwrap_or_default();
        for effect in effects {
            self.apply(effect);
        }
    }

    fn toggle(&mut self, idx: usize) {
        let node = &self.slots[idx].node;
        if node.attribute("type") == Some("radio") {
            let group = node.attribute("name").map(str::to_string);
            let doc = self.slots[idx].doc;
            if let Some(group) = group {
                for slot in self.slots.iter_mut().filter(|s| s.doc == doc) {
                    if slot.node.attribute("type") == Some("radio")
                        && slot.node.attribute("name") == Some(group.as_str())
                    {
                        slot.node.checked = false;
                    }
                }
            }
            self.slots[idx].node.checked = true;
        } else if node.tag == "input" && node.attribute("type") == Some("checkbox") {
            self.slots[idx].node.checked = !self.slots[idx].node.checked;
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Alert(text) => self.raise_alert(text),
            Effect::OpenWindow(handle) => {
                match self.windows.iter_mut().find(|w| w.handle == handle) {
                    Some(w) => w.open = true,
                    None => {
                        self.push_window(&handle, "", "about:blank", true);
                    }
                }
            }
            Effect::SetDisplayed(el, shown) => {
                if let Some(slot) = index_of(&el).and_then(|i| self.slots.get_mut(i)) {
                    slot.node.hidden = !shown;
                }
            }
            Effect::SetText(el, text) => self.set_text(&el, text),
            Effect::SetValue(el, value) => {
                if let Some(slot) = index_of(&el).and_then(|i| self.slots.get_mut(i)) {
                    slot.node.value = Some(value);
                }
            }
            Effect::Remove(el) => self.remove(&el),
        }
    }

    fn serialize(&self, idx: usize, out: &mut String) {
        if !self.visible(idx) {
            return;
        }
        let node = &self.slots[idx].node;
        let _ = write!(out, "<{}", node.tag);
        for (k, v) in &node.attrs {
            let _ = write!(out, " {}=\"{}\"", k, v.replace('"', "&quot;"));
        }
        if node.checked {
            out.push_str(" checked");
        }
        out.push('>');
        out.push_str(&node.text);
        for &child in &self.slots[idx].children {
            self.serialize(child, out);
        }
        let _ = write!(out, "</{}>", node.tag);
    }
}

fn handle_of(idx: usize) -> ElementRef {
    ElementRef(format!("n{}", idx))
}

fn index_of(el: &ElementRef) -> Option<usize> {
    el.as_str().strip_prefix('n')?.parse().ok()
}

fn matches_structural(query: &Query, node: &Node, text: &str) -> bool {
    match query {
        Query::Id(v) => node.attribute("id") == Some(v.as_str()),
        Query::IdContains(v) => node.tag == "input" && node.attribute("id").is_some_and(|id| id.contains(v.as_str())),
        Query::LabelFor(v) => node.tag == "label" && node.attribute("for").is_some_and(|f| f.contains(v.as_str())),
        Query::Name(v) => node.attribute("name") == Some(v.as_str()),
        Query::Tag(v) => node.tag.eq_ignore_ascii_case(v),
        Query::LinkText(v) => node.tag == "a" && text.trim() == v.as_str(),
        Query::Css(_) | Query::XPath(_) => false,
    }
}

impl Driver for MemoryDriver {
    fn find_all(&mut self, query: &Query) -> DriverResult<Vec<ElementRef>> {
        self.gate(format!("find {}", query))?;
        let doc = self.current_doc()?;
        let roots = self.docs[doc.0].roots.clone();
        self.find(roots, query)
    }

    fn find_within(&mut self, parent: &ElementRef, query: &Query) -> DriverResult<Vec<ElementRef>> {
        self.gate(format!("find {} within {}", query, parent))?;
        let idx = self.element(parent)?;
        let roots = self.slots[idx].children.clone();
        self.find(roots, query)
    }

    fn is_displayed(&mut self, el: &ElementRef) -> DriverResult<bool> {
        self.gate(format!("displayed {}", el))?;
        let idx = self.element(el)?;
        Ok(!self.slots[idx].node.hidden)
    }

    fn is_selected(&mut self, el: &ElementRef) -> DriverResult<bool> {
        self.gate(format!("selected {}", el))?;
        let idx = self.element(el)?;
        Ok(self.slots[idx].node.checked)
    }

    fn text(&mut self, el: &ElementRef) -> DriverResult<String> {
        self.gate(format!("text {}", el))?;
        let idx = self.element(el)?;
        Ok(self.full_text(idx))
    }

    fn attribute(&mut self, el: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        self.gate(format!("attribute {} {}", el, name))?;
        let idx = self.element(el)?;
        Ok(self.slots[idx].node.attribute(name).map(str::to_string))
    }

    fn property(&mut self, el: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        self.gate(format!("property {} {}", el, name))?;
        let idx = self.element(el)?;
        let node = &self.slots[idx].node;
        Ok(match name {
            "value" => node.value.clone(),
            "checked" => Some(node.checked.to_string()),
            _ => node.attribute(name).map(str::to_string),
        })
    }

    fn click(&mut self, el: &ElementRef) -> DriverResult<()> {
        self.gate(format!("click {}", el))?;
        let idx = self.element(el)?;
        let node = &self.slots[idx].node;
        if let Some(err) = &node.click_error {
            return Err(err.clone());
        }
        if node.hidden {
            return Err(DriverError::NotInteractable(format!("{} is not displayed", el)));
        }
        if node.not_interactable {
            return Err(DriverError::NotInteractable(format!(
                "click on {} intercepted by another element",
                el
            )));
        }
        if !node.decoy {
            self.activate(idx);
        }
        Ok(())
    }

    fn send_keys(&mut self, el: &ElementRef, text: &str) -> DriverResult<()> {
        self.gate(format!("send keys {} {:?}", el, text))?;
        let idx = self.element(el)?;
        let node = &mut self.slots[idx].node;
        if node.hidden {
            return Err(DriverError::NotInteractable(format!("{} is not displayed", el)));
        }
        node.value.get_or_insert_with(String::new).push_str(text);
        Ok(())
    }

    fn clear(&mut self, el: &ElementRef) -> DriverResult<()> {
        self.gate(format!("clear {}", el))?;
        let idx = self.element(el)?;
        self.slots[idx].node.value = Some(String::new());
        Ok(())
    }

    fn hover(&mut self, el: &ElementRef) -> DriverResult<()> {
        self.gate(format!("hover {}", el))?;
        let idx = self.element(el)?;
        if self.slots[idx].node.hidden {
            return Err(DriverError::NotInteractable(format!("{} is not displayed", el)));
        }
        let effects = self.hover_effects.get(&idx).cloned().unwrap_or_default();
        for effect in effects {
            self.apply(effect);
        }
        Ok(())
    }

    fn select_option(&mut self, el: &ElementRef, choice: &OptionChoice) -> DriverResult<()> {
        self.gate(format!("select {} {}", el, choice))?;
        let idx = self.element(el)?;
        if self.slots[idx].node.tag != "select" {
            return Err(DriverError::NotInteractable(format!("{} is not a <select>", el)));
        }
        let options: Vec<usize> = self.slots[idx]
            .children
            .iter()
            .copied()
            .filter(|&i| self.visible(i) && self.slots[i].node.tag == "option")
            .collect();
        let option_value = |i: usize| {
            self.slots[i]
                .node
                .value
                .clone()
                .unwrap_or_else(|| self.full_text(i))
        };
        let picked = match choice {
            OptionChoice::Index(n) => options.get(*n).copied(),
            OptionChoice::Value(v) => options.iter().copied().find(|&i| option_value(i) == *v),
            OptionChoice::Text(t) => options.iter().copied().find(|&i| self.full_text(i) == t.trim()),
        }
        .ok_or_else(|| DriverError::NoSuchElement(format!("{} in {}", choice, el)))?;

        let value = option_value(picked);
        for &i in &options {
            self.slots[i].node.checked = i == picked;
        }
        self.slots[idx].node.value = Some(value);
        Ok(())
    }

    fn execute_script(&mut self, script: &str, args: &[ElementRef]) -> DriverResult<Value> {
        self.gate(format!("script {}", script))?;
        let targets = args
            .iter()
            .map(|a| self.element(a))
            .collect::<DriverResult<Vec<_>>>()?;
        if script.contains(".click()") {
            if let Some(&idx) = targets.first() {
                if !self.slots[idx].node.script_decoy {
                    self.activate(idx);
                }
            }
        }
        Ok(Value::Null)
    }

    fn alert_text(&mut self) -> DriverResult<String> {
        self.alert_gate("alert text")?;
        match self.alert.as_mut() {
            Some(a) if a.after > 0 => {
                a.after -= 1;
                Err(DriverError::NoSuchAlert)
            }
            Some(a) => Ok(a.text.clone()),
            None => Err(DriverError::NoSuchAlert),
        }
    }

    fn accept_alert(&mut self) -> DriverResult<()> {
        self.alert_gate("accept alert")?;
        let alert = self.open_alert()?;
        let text = alert.text.clone();
        let disposition = match alert.response.take() {
            Some(r) => format!("respond {}", r),
            None => "accept".to_string(),
        };
        self.alert = None;
        self.alert_log.push((text, disposition));
        Ok(())
    }

    fn dismiss_alert(&mut self) -> DriverResult<()> {
        self.alert_gate("dismiss alert")?;
        let text = self.open_alert()?.text.clone();
        self.alert = None;
        self.alert_log.push((text, "dismiss".to_string()));
        Ok(())
    }

    fn send_alert_text(&mut self, text: &str) -> DriverResult<()> {
        self.alert_gate("send alert text")?;
        self.open_alert()?.response = Some(text.to_string());
        Ok(())
    }

    fn window_handle(&mut self) -> DriverResult<String> {
        self.gate("window handle".into())?;
        let w = self.current_window()?;
        Ok(self.windows[w].handle.clone())
    }

    fn window_handles(&mut self) -> DriverResult<Vec<String>> {
        self.gate("window handles".into())?;
        Ok(self
            .windows
            .iter()
            .filter(|w| w.open && !w.closed)
            .map(|w| w.handle.clone())
            .collect())
    }

    fn switch_to_window(&mut self, handle: &str) -> DriverResult<()> {
        self.gate(format!("switch to window {}", handle))?;
        let w = self
            .windows
            .iter()
            .position(|w| w.handle == handle && w.open && !w.closed)
            .ok_or_else(|| DriverError::NoSuchWindow(handle.to_string()))?;
        self.current = Some(w);
        self.frames.clear();
        Ok(())
    }

    fn close_window(&mut self) -> DriverResult<()> {
        self.gate("close window".into())?;
        let w = self.current_window()?;
        self.windows[w].closed = true;
        self.current = None;
        self.frames.clear();
        Ok(())
    }

    fn switch_to_frame(&mut self, frame: &ElementRef) -> DriverResult<()> {
        self.gate(format!("switch to frame {}", frame))?;
        let idx = self.element(frame)?;
        if self.slots[idx].frame_doc.is_none() {
            return Err(DriverError::NoSuchFrame(frame.to_string()));
        }
        self.frames.push(idx);
        Ok(())
    }

    fn switch_to_parent_frame(&mut self) -> DriverResult<()> {
        self.gate("switch to parent frame".into())?;
        self.current_window()?;
        self.frames.pop();
        Ok(())
    }

    fn switch_to_default_content(&mut self) -> DriverResult<()> {
        self.gate("switch to default content".into())?;
        self.current_window()?;
        self.frames.clear();
        Ok(())
    }

    fn goto(&mut self, url: &str) -> DriverResult<()> {
        self.gate(format!("goto {}", url))?;
        let w = self.current_window()?;
        self.windows[w].url = url.to_string();
        self.frames.clear();
        Ok(())
    }

    fn current_url(&mut self) -> DriverResult<String> {
        self.gate("current url".into())?;
        let w = self.current_window()?;
        Ok(self.windows[w].url.clone())
    }

    fn title(&mut self) -> DriverResult<String> {
        self.gate("title".into())?;
        let w = self.current_window()?;
        Ok(self.windows[w].title.clone())
    }

    fn page_source(&mut self) -> DriverResult<String> {
        self.gate("page source".into())?;
        let doc = self.current_doc()?;
        let title = &self.windows[self.current_window()?].title;
        let mut out = format!("<html><head><title>{}</title></head><body>", title);
        for &root in &self.docs[doc.0].roots {
            self.serialize(root, &mut out);
        }
        out.push_str("</body></html>");
        Ok(out)
    }

    fn quit(&mut self) -> DriverResult<()> {
        self.calls.push("quit".into());
        if self.quits.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(DriverError::Session("session has been quit".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_activates_its_control() {
        let mut d = MemoryDriver::new();
        let label = d.add(Node::new("label").attr("for", "friends"));
        let input = d.add(Node::new("input").attr("type", "checkbox").id("friends"));
        d.click(&label).unwrap();
        assert!(d.is_checked(&input));
        d.click(&label).unwrap();
        assert!(!d.is_checked(&input));
    }

    #[test]
    fn radio_buttons_are_exclusive() {
        let mut d = MemoryDriver::new();
        let a = d.add(Node::new("input").attr("type", "radio").attr("name", "radioButton").checked());
        let b = d.add(Node::new("input").attr("type", "radio").attr("name", "radioButton"));
        d.click(&b).unwrap();
        assert!(!d.is_checked(&a));
        assert!(d.is_checked(&b));
    }

    #[test]
    fn structural_queries_walk_descendants() {
        let mut d = MemoryDriver::new();
        let table = d.add(Node::new("table").attr("name", "courses"));
        let row = d.add_child(&table, Node::new("tr"));
        d.add_child(&row, Node::new("td").text("Selenium"));
        d.add_child(&row, Node::new("td").text("30"));

        assert_eq!(d.find_all(&Query::tag("tr")).unwrap(), vec![row.clone()]);
        assert_eq!(d.find_all(&Query::name("courses")).unwrap(), vec![table.clone()]);
        let cells = d.find_within(&row, &Query::xpath(CELL_XPATH)).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(d.text(&row).unwrap(), "Selenium 30");
        // children-only route does not reach grandchildren
        assert!(d.find_within(&table, &Query::xpath(CELL_XPATH)).unwrap().is_empty());
    }

    #[test]
    fn unrouted_css_matches_nothing() {
        let mut d = MemoryDriver::new();
        d.add(Node::new("div").class("totalAmount"));
        assert!(d.find_all(&Query::css(".totalAmount")).unwrap().is_empty());
        d.route(Query::css(".totalAmount"), |n| n.has_class("totalAmount"));
        assert_eq!(d.find_all(&Query::css(".totalAmount")).unwrap().len(), 1);
    }

    #[test]
    fn delayed_nodes_appear_after_lookups() {
        let mut d = MemoryDriver::new();
        d.add(Node::new("li").id("late").appear_after(3));
        assert!(d.find_all(&Query::id("late")).unwrap().is_empty());
        assert!(d.find_all(&Query::id("late")).unwrap().is_empty());
        assert_eq!(d.find_all(&Query::id("late")).unwrap().len(), 1);
    }

    #[test]
    fn frame_elements_are_scoped_to_their_document() {
        let mut d = MemoryDriver::new();
        let outside = d.add(Node::new("a").text("Home"));
        let (frame, inner) = d.add_frame(Node::new("iframe").id("courses-iframe"));
        let inside = d.add_in(inner, Node::new("a").text("Mentorship"));

        assert!(matches!(d.text(&inside), Err(DriverError::StaleElement(_))));
        d.switch_to_frame(&frame).unwrap();
        assert_eq!(d.text(&inside).unwrap(), "Mentorship");
        assert!(matches!(d.text(&outside), Err(DriverError::StaleElement(_))));
        assert_eq!(d.find_all(&Query::link_text("Mentorship")).unwrap(), vec![inside]);
        d.switch_to_parent_frame().unwrap();
        assert_eq!(d.text(&outside).unwrap(), "Home");
        assert!(matches!(d.switch_to_frame(&outside), Err(DriverError::NoSuchFrame(_))));
    }

    #[test]
    fn popup_opens_on_click_and_closes() {
        let mut d = MemoryDriver::new();
        let link = d.add(Node::new("a").id("openwindow"));
        d.add_popup("popup", "QA Click Academy", "https://example.test/popup");
        d.on_click(&link, Effect::OpenWindow("popup".into()));

        assert_eq!(d.window_handles().unwrap(), vec![MAIN_WINDOW]);
        d.click(&link).unwrap();
        assert_eq!(d.window_handles().unwrap(), vec![MAIN_WINDOW, "popup"]);
        d.switch_to_window("popup").unwrap();
        assert_eq!(d.title().unwrap(), "QA Click Academy");
        d.close_window().unwrap();
        assert!(matches!(d.title(), Err(DriverError::NoSuchWindow(_))));
        assert!(matches!(d.switch_to_window("popup"), Err(DriverError::NoSuchWindow(_))));
        d.switch_to_window(MAIN_WINDOW).unwrap();
    }

    fn currency_dropdown(d: &mut MemoryDriver) -> (ElementRef, Vec<ElementRef>) {
        let select = d.add(Node::new("select").id("ctl00_mainContent_DropDownListCurrency"));
        let options = [("", "Select"), ("INR", "INR"), ("AED", "AED"), ("USD", "USD")]
            .into_iter()
            .map(|(value, text)| d.add_child(&select, Node::new("option").value(value).text(text)))
            .collect();
        (select, options)
    }

    #[test]
    fn select_option_by_index_value_and_text() {
        let mut d = MemoryDriver::new();
        let (select, options) = currency_dropdown(&mut d);

        d.select_option(&select, &OptionChoice::Index(3)).unwrap();
        assert_eq!(d.value_of(&select).as_deref(), Some("USD"));
        assert!(d.is_selected(&options[3]).unwrap());

        d.select_option(&select, &OptionChoice::Text("AED".into())).unwrap();
        assert_eq!(d.value_of(&select).as_deref(), Some("AED"));
        assert!(!d.is_selected(&options[3]).unwrap());

        d.select_option(&select, &OptionChoice::Value("INR".into())).unwrap();
        assert!(d.is_selected(&options[1]).unwrap());

        assert!(matches!(
            d.select_option(&select, &OptionChoice::Text("GBP".into())),
            Err(DriverError::NoSuchElement(_))
        ));
        assert!(matches!(
            d.select_option(&options[0], &OptionChoice::Index(0)),
            Err(DriverError::NotInteractable(_))
        ));
    }

    #[test]
    fn hover_applies_hover_effects_only() {
        let mut d = MemoryDriver::new();
        let trigger = d.add(Node::new("button").id("mousehover"));
        let menu = d.add(Node::new("div").class("mouse-hover-content").hidden());
        d.on_hover(&trigger, Effect::SetDisplayed(menu.clone(), true));

        d.click(&trigger).unwrap();
        assert!(!d.is_displayed(&menu).unwrap());
        d.hover(&trigger).unwrap();
        assert!(d.is_displayed(&menu).unwrap());
    }

    #[test]
    fn removed_nodes_go_stale() {
        let mut d = MemoryDriver::new();
        let el = d.add(Node::new("div").text("x"));
        d.remove(&el);
        assert!(matches!(d.text(&el), Err(DriverError::StaleElement(_))));
        assert!(d.find_all(&Query::tag("div")).unwrap().is_empty());
    }

    #[test]
    fn page_source_serializes_current_document() {
        let mut d = MemoryDriver::new();
        d.add(Node::new("label").attr("for", "ctl00_Senior").text("Senior Citizen"));
        let source = d.page_source().unwrap();
        assert!(source.contains("<label for=\"ctl00_Senior\">Senior Citizen</label>"));
    }

    #[test]
    fn quit_is_counted_and_ends_the_session() {
        let mut d = MemoryDriver::new();
        let counter = d.quit_counter();
        d.quit().unwrap();
        assert!(matches!(d.title(), Err(DriverError::Session(_))));
        assert!(d.quit().is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
