//! [`Driver`] over the eoka CDP browser.
//!
//! eoka is async; the driver owns a current-thread tokio runtime and blocks
//! on each call, so it must not be used from inside another runtime.
//!
//! Elements are tagged with a `data-grapple-ref` attribute when found and
//! re-located by it on every call; a missing tag means the node is stale.
//! Frames are entered by walking `contentDocument` along the recorded frame
//! path, which limits frame support to same-origin frames.
//!
//! Dialogs are the browser's own. Their text comes from
//! `Page.javascriptDialogOpening` events, and accepting, dismissing or
//! answering one goes through `Page.handleJavaScriptDialog`, so a page sees
//! the real `confirm`/`prompt` result. A page with an open dialog answers no
//! other command, so every other call fails with
//! [`DriverError::UnexpectedAlert`] until the dialog is handled, and a
//! command that opens one stops waiting for its reply.
//!
//! The driver is the only reader of the browser's event stream; events other
//! than dialog events are dropped.

use crate::config::BrowserConfig;
use crate::Result;
use eoka::cdp::transport::CdpMessage;
use eoka::cdp::{MouseEventType, Transport};
use eoka::{Browser, Page, StealthConfig};
use grapple_core::{Driver, DriverError, DriverResult, ElementRef, OptionChoice, Query};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attribute carrying element refs.
pub const REF_ATTRIBUTE: &str = "data-grapple-ref";

const DIALOG_OPENING: &str = "Page.javascriptDialogOpening";
const DIALOG_CLOSED: &str = "Page.javascriptDialogClosed";

const PRELUDE: &str = r#"
const R = 'data-grapple-ref';
let doc = document;
for (const ref of FRAMES) {
  const f = doc.querySelector('[' + R + '="' + ref + '"]');
  if (!f) return { error: 'frame', detail: ref };
  let inner = null;
  try { inner = f.contentDocument; } catch (e) {}
  if (!inner) return { error: 'frame', detail: ref };
  doc = inner;
}
const el = (ref) => doc.querySelector('[' + R + '="' + ref + '"]');
const tag = (n, i) => {
  if (!n.hasAttribute(R)) n.setAttribute(R, PREFIX + i);
  return n.getAttribute(R);
};
"#;

const TRANSPORT_HINTS: &[&str] = &[
    "websocket",
    "transport",
    "timed out",
    "connection",
    "broken pipe",
    "reset by peer",
];

fn is_transport_error(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    TRANSPORT_HINTS.iter().any(|h| msg.contains(h))
}

fn map_eoka(e: eoka::Error) -> DriverError {
    match e {
        eoka::Error::ElementNotFound(m) => DriverError::NoSuchElement(m),
        other => {
            let msg = other.to_string();
            if is_transport_error(&msg) {
                DriverError::Session(msg)
            } else {
                DriverError::Script(msg)
            }
        }
    }
}

/// Decode a `{ok}` / `{error, detail}` envelope.
fn decode(v: Value) -> DriverResult<Value> {
    if let Some(kind) = v.get("error").and_then(Value::as_str) {
        let detail = v
            .get("detail")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(match kind {
            "stale" => DriverError::StaleElement(detail),
            "frame" => DriverError::NoSuchFrame(detail),
            "none" => DriverError::NoSuchElement(detail),
            "hidden" | "unsupported" => DriverError::NotInteractable(detail),
            _ => DriverError::Script(detail),
        });
    }
    Ok(v.get("ok").cloned().unwrap_or(Value::Null))
}

#[derive(Debug, PartialEq)]
enum DialogEvent {
    Opened(String),
    Closed,
}

fn dialog_event(method: &str, params: &Value) -> Option<DialogEvent> {
    match method {
        DIALOG_OPENING => Some(DialogEvent::Opened(
            params
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        )),
        DIALOG_CLOSED => Some(DialogEvent::Closed),
        _ => None,
    }
}

/// Resolves with the text of the next dialog `session` opens.
async fn dialog_opened(transport: &Transport, session: &str) -> String {
    loop {
        match transport.recv_event().await {
            Some(CdpMessage::Event {
                method,
                params,
                session_id,
            }) if session_id.as_deref() == Some(session) => {
                if let Some(DialogEvent::Opened(text)) = dialog_event(&method, &params) {
                    return text;
                }
            }
            Some(_) => {}
            None => return std::future::pending().await,
        }
    }
}

/// How a command sent to the page ended.
enum Settled<T> {
    Done(T),
    /// The page opened a dialog before replying.
    Dialog(String),
}

/// JS literal for a string.
fn js(s: &str) -> String {
    Value::from(s).to_string()
}

fn lookup_body(parent: Option<&ElementRef>, query: &Query) -> String {
    let parent = parent.map(|p| js(p.as_str())).unwrap_or_else(|| "null".into());
    let (xpath, css) = match query {
        Query::Css(sel) => ("null".to_string(), js(sel)),
        q => {
            let xp = if parent == "null" { q.to_xpath() } else { q.scoped_xpath() };
            (xp.map(|x| js(&x)).unwrap_or_else(|| "null".into()), "null".to_string())
        }
    };
    format!(
        r#"
const P = {parent};
const ctx = P === null ? doc : el(P);
if (!ctx) return {{ error: 'stale', detail: P }};
const XP = {xpath};
let nodes = [];
if (XP !== null) {{
  const r = doc.evaluate(XP, ctx, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
  for (let i = 0; i < r.snapshotLength; i++) nodes.push(r.snapshotItem(i));
}} else {{
  nodes = Array.from(ctx.querySelectorAll({css}));
}}
return {{ ok: nodes.filter((n) => n.nodeType === 1).map((n, i) => tag(n, i)) }};
"#
    )
}

/// Body operating on one element bound to `e`.
fn element_body(el: &ElementRef, op: &str) -> String {
    format!(
        "const e = el({}); if (!e) return {{ error: 'stale', detail: {} }};\n{}",
        js(el.as_str()),
        js(el.as_str()),
        op
    )
}

/// Select one option of `e` and fire the events a user's pick would.
fn select_body(choice: &OptionChoice) -> String {
    let pick = match choice {
        OptionChoice::Index(i) => format!("opts[{}]", i),
        OptionChoice::Value(v) => format!("opts.find((o) => o.value === {})", js(v)),
        OptionChoice::Text(t) => format!("opts.find((o) => o.text.trim() === {})", js(t.trim())),
    };
    format!(
        r#"
if (e.tagName.toLowerCase() !== 'select') return {{ error: 'unsupported', detail: 'not a <select>: <' + e.tagName.toLowerCase() + '>' }};
const opts = Array.from(e.options);
const opt = {pick};
if (!opt) return {{ error: 'none', detail: {what} }};
opt.selected = true;
e.dispatchEvent(new Event('input', {{ bubbles: true }}));
e.dispatchEvent(new Event('change', {{ bubbles: true }}));
return {{ ok: true }};
"#,
        what = js(&choice.to_string())
    )
}

const DISPLAYED: &str = r#"
const s = doc.defaultView.getComputedStyle(e);
const r = e.getBoundingClientRect();
return { ok: s.display !== 'none' && s.visibility !== 'hidden' && (r.width > 0 || r.height > 0) };
"#;

/// Scroll into view and hit-test the centre point.
const HIT_TEST: &str = r#"
e.scrollIntoView({ block: 'center', inline: 'center' });
const r = e.getBoundingClientRect();
if (r.width === 0 && r.height === 0) return { error: 'hidden', detail: 'element has no size' };
const hit = doc.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
if (hit && hit !== e && !e.contains(hit)) {
  return { error: 'hidden', detail: 'click would land on <' + hit.tagName.toLowerCase() + '>' };
}
"#;

/// Native click emulation for elements inside frames, which CDP mouse
/// input addressed by selector cannot reach.
const FRAME_CLICK: &str = r#"
const target = doc.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2) || e;
for (const type of ['mousedown', 'mouseup', 'click']) {
  target.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: doc.defaultView }));
}
return { ok: true };
"#;

/// Centre of the element in top-level viewport coordinates.
const HOVER_POINT: &str = r#"
e.scrollIntoView({ block: 'center', inline: 'center' });
const r = e.getBoundingClientRect();
if (r.width === 0 && r.height === 0) return { error: 'hidden', detail: 'element has no size' };
return { ok: { x: r.left + r.width / 2, y: r.top + r.height / 2 } };
"#;

/// Pointer events for elements inside frames. Script-dispatched events run
/// hover handlers but do not apply CSS `:hover`.
const FRAME_HOVER: &str = r#"
e.scrollIntoView({ block: 'center', inline: 'center' });
for (const type of ['mouseover', 'mouseenter', 'mousemove']) {
  e.dispatchEvent(new MouseEvent(type, { bubbles: type !== 'mouseenter', view: doc.defaultView }));
}
return { ok: true };
"#;

const CLEAR: &str = r#"
e.focus();
e.value = '';
e.dispatchEvent(new Event('input', { bubbles: true }));
e.dispatchEvent(new Event('change', { bubbles: true }));
return { ok: true };
"#;

const ENTER_FRAME: &str = r#"
if (!/^i?frame$/i.test(e.tagName)) return { error: 'frame', detail: 'not a frame: ' + e.tagName.toLowerCase() };
let d = null;
try { d = e.contentDocument; } catch (err) {}
if (!d) return { error: 'frame', detail: 'frame document not accessible' };
return { ok: true };
"#;

struct Window {
    /// Handle callers see. Differs from the page's target id for adopted popups.
    handle: String,
    page: Page,
}

/// A CDP browser driven synchronously.
pub struct EokaDriver {
    runtime: tokio::runtime::Runtime,
    browser: Option<Browser>,
    windows: Vec<Window>,
    current: Option<usize>,
    frames: Vec<ElementRef>,
    lookups: u64,
    /// Open dialog text by CDP session id.
    dialogs: HashMap<String, String>,
    /// Prompt answer sent with the next accept.
    response: Option<String>,
}

impl EokaDriver {
    /// Launch a browser with one blank window.
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let stealth = StealthConfig {
            headless: config.headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
            viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            config.headless, config.proxy
        );
        let (browser, page) = runtime.block_on(async {
            let browser = Browser::launch_with_config(stealth).await?;
            let page = browser.new_page("about:blank").await?;
            Ok::<_, eoka::Error>((browser, page))
        })?;

        let handle = page.target_id().to_string();
        Ok(Self {
            runtime,
            browser: Some(browser),
            windows: vec![Window { handle, page }],
            current: Some(0),
            frames: Vec::new(),
            lookups: 0,
            dialogs: HashMap::new(),
            response: None,
        })
    }

    fn block<T, F>(&self, fut: F) -> DriverResult<T>
    where
        F: Future<Output = eoka::Result<T>>,
    {
        self.runtime.block_on(fut).map_err(map_eoka)
    }

    /// Like [`Self::block`], but stop waiting when the current page opens a
    /// dialog: the page only replies once the dialog is closed.
    fn settle<T, F>(&self, fut: F) -> DriverResult<Settled<T>>
    where
        F: Future<Output = eoka::Result<T>>,
    {
        let session = self.page()?.session();
        let transport = Arc::clone(session.transport());
        let id = session.session_id();
        self.runtime.block_on(async {
            tokio::select! {
                out = fut => out.map(Settled::Done).map_err(map_eoka),
                text = dialog_opened(&transport, id) => Ok(Settled::Dialog(text)),
            }
        })
    }

    fn browser(&self) -> DriverResult<&Browser> {
        self.browser
            .as_ref()
            .ok_or_else(|| DriverError::Session("browser has been closed".into()))
    }

    fn page(&self) -> DriverResult<&Page> {
        self.browser()?;
        self.current
            .and_then(|i| self.windows.get(i))
            .map(|w| &w.page)
            .ok_or_else(|| DriverError::NoSuchWindow("no current window".into()))
    }

    fn session_id(&self) -> DriverResult<String> {
        Ok(self.page()?.session().session_id().to_string())
    }

    /// Apply dialog events received since the last call.
    fn pump(&mut self) -> DriverResult<()> {
        let transport = Arc::clone(self.page()?.session().transport());
        while let Some(message) = self.runtime.block_on(transport.try_recv_event()) {
            let CdpMessage::Event {
                method,
                params,
                session_id: Some(session),
            } = message
            else {
                continue;
            };
            match dialog_event(&method, &params) {
                Some(DialogEvent::Opened(text)) => {
                    debug!("dialog opened: {:?}", text);
                    self.dialogs.insert(session, text);
                }
                Some(DialogEvent::Closed) => {
                    self.dialogs.remove(&session);
                }
                None => {}
            }
        }
        Ok(())
    }

    fn open_dialog(&self) -> Option<&str> {
        let id = self.page().ok()?.session().session_id();
        self.dialogs.get(id).map(String::as_str)
    }

    fn record_dialog(&mut self, text: String) {
        debug!("dialog opened mid-command: {:?}", text);
        if let Ok(id) = self.session_id() {
            self.dialogs.insert(id, text);
        }
    }

    /// Fail while the current page shows a dialog.
    fn guard(&mut self) -> DriverResult<()> {
        self.pump()?;
        match self.open_dialog() {
            Some(text) => Err(DriverError::UnexpectedAlert(text.to_string())),
            None => Ok(()),
        }
    }

    /// Evaluate `body` in the current context.
    fn evaluate(&mut self, body: &str, prefix: &str) -> DriverResult<Settled<Value>> {
        self.guard()?;
        let frames: Vec<&str> = self.frames.iter().map(ElementRef::as_str).collect();
        let script = format!(
            "(() => {{ try {{\nconst FRAMES = {frames};\nconst PREFIX = {prefix};\n{PRELUDE}\n{body}\n}} catch (err) {{ return {{ error: 'script', detail: String((err && err.message) || err) }}; }} }})()",
            frames = Value::from(frames),
            prefix = js(prefix),
        );
        let page = self.page()?;
        match self.settle(page.evaluate::<Value>(&script))? {
            Settled::Done(out) => decode(out).map(Settled::Done),
            Settled::Dialog(text) => {
                self.record_dialog(text.clone());
                Ok(Settled::Dialog(text))
            }
        }
    }

    fn call(&mut self, body: &str, prefix: &str) -> DriverResult<Value> {
        match self.evaluate(body, prefix)? {
            Settled::Done(v) => Ok(v),
            Settled::Dialog(text) => Err(DriverError::UnexpectedAlert(text)),
        }
    }

    fn run(&mut self, body: &str) -> DriverResult<Value> {
        self.call(body, "")
    }

    fn on_element(&mut self, el: &ElementRef, op: &str) -> DriverResult<Value> {
        self.run(&element_body(el, op))
    }

    /// Run an action on `el`. A dialog it opens is its effect, not a failure.
    fn act(&mut self, el: &ElementRef, op: &str) -> DriverResult<()> {
        self.evaluate(&element_body(el, op), "")?;
        Ok(())
    }

    fn lookup(&mut self, parent: Option<&ElementRef>, query: &Query) -> DriverResult<Vec<ElementRef>> {
        self.lookups += 1;
        let prefix = format!("g{}-", self.lookups);
        let found = self.call(&lookup_body(parent, query), &prefix)?;
        let refs = found
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ElementRef::new)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        debug!("{} -> {} element(s)", query, refs.len());
        Ok(refs)
    }

    /// Text of the dialog the current page shows.
    fn require_dialog(&mut self) -> DriverResult<String> {
        self.pump()?;
        self.open_dialog()
            .map(str::to_string)
            .ok_or(DriverError::NoSuchAlert)
    }

    fn dialog_handled(&mut self) -> DriverResult<()> {
        let id = self.session_id()?;
        self.dialogs.remove(&id);
        Ok(())
    }

    fn activate(&mut self, index: usize) -> DriverResult<()> {
        let id = self.windows[index].page.target_id().to_string();
        self.block(self.browser()?.activate_tab(&id))?;
        self.current = Some(index);
        self.frames.clear();
        Ok(())
    }

    /// Take over a tab the page opened itself. eoka only hands out pages it
    /// created, so the tab is reopened at its URL and the original closed.
    fn adopt(&mut self, handle: &str, url: &str) -> DriverResult<usize> {
        debug!("adopting window {} at {}", handle, url);
        let browser = self.browser()?;
        let page = self.block(browser.new_page(url))?;
        if let Err(e) = self.block(browser.close_tab(handle)) {
            warn!("failed to close original window {}: {}", handle, e);
        }
        self.windows.push(Window {
            handle: handle.to_string(),
            page,
        });
        Ok(self.windows.len() - 1)
    }

    fn current_window_index(&self) -> DriverResult<usize> {
        self.current
            .ok_or_else(|| DriverError::NoSuchWindow("no current window".into()))
    }
}

impl Driver for EokaDriver {
    fn find_all(&mut self, query: &Query) -> DriverResult<Vec<ElementRef>> {
        self.lookup(None, query)
    }

    fn find_within(&mut self, parent: &ElementRef, query: &Query) -> DriverResult<Vec<ElementRef>> {
        self.lookup(Some(parent), query)
    }

    fn is_displayed(&mut self, el: &ElementRef) -> DriverResult<bool> {
        Ok(self.on_element(el, DISPLAYED)?.as_bool().unwrap_or(false))
    }

    fn is_selected(&mut self, el: &ElementRef) -> DriverResult<bool> {
        let v = self.on_element(el, "return { ok: !!(e.checked || e.selected) };")?;
        Ok(v.as_bool().unwrap_or(false))
    }

    fn text(&mut self, el: &ElementRef) -> DriverResult<String> {
        let v = self.on_element(el, "return { ok: String(e.innerText ?? e.textContent ?? '') };")?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    fn attribute(&mut self, el: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        let op = format!("return {{ ok: e.getAttribute({}) }};", js(name));
        Ok(self.on_element(el, &op)?.as_str().map(str::to_string))
    }

    fn property(&mut self, el: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        let op = format!(
            "const v = e[{}]; return {{ ok: v === null || v === undefined ? null : String(v) }};",
            js(name)
        );
        Ok(self.on_element(el, &op)?.as_str().map(str::to_string))
    }

    fn click(&mut self, el: &ElementRef) -> DriverResult<()> {
        if !self.frames.is_empty() {
            return self.act(el, &format!("{}\n{}", HIT_TEST, FRAME_CLICK));
        }
        self.on_element(el, &format!("{}\nreturn {{ ok: true }};", HIT_TEST))?;
        let selector = format!("[{}=\"{}\"]", REF_ATTRIBUTE, el.as_str());
        let page = self.page()?;
        if let Settled::Dialog(text) = self.settle(page.click(&selector))? {
            self.record_dialog(text);
        }
        Ok(())
    }

    fn script_click(&mut self, el: &ElementRef) -> DriverResult<()> {
        self.act(el, "e.click(); return { ok: true };")
    }

    fn send_keys(&mut self, el: &ElementRef, text: &str) -> DriverResult<()> {
        self.on_element(el, "e.focus(); return { ok: true };")?;
        let page = self.page()?;
        if let Settled::Dialog(message) = self.settle(page.type_text(text))? {
            self.record_dialog(message);
        }
        Ok(())
    }

    fn clear(&mut self, el: &ElementRef) -> DriverResult<()> {
        self.on_element(el, CLEAR)?;
        Ok(())
    }

    fn hover(&mut self, el: &ElementRef) -> DriverResult<()> {
        if !self.frames.is_empty() {
            return self.act(el, FRAME_HOVER);
        }
        let at = self.on_element(el, HOVER_POINT)?;
        let x = at["x"].as_f64().unwrap_or(0.0);
        let y = at["y"].as_f64().unwrap_or(0.0);
        let page = self.page()?;
        let moved = page
            .session()
            .dispatch_mouse_event(MouseEventType::MouseMoved, x, y, None, None);
        if let Settled::Dialog(text) = self.settle(moved)? {
            self.record_dialog(text);
        }
        Ok(())
    }

    fn select_option(&mut self, el: &ElementRef, choice: &OptionChoice) -> DriverResult<()> {
        self.act(el, &select_body(choice))
    }

    fn execute_script(&mut self, script: &str, args: &[ElementRef]) -> DriverResult<Value> {
        let refs: Vec<&str> = args.iter().map(ElementRef::as_str).collect();
        let body = format!(
            "const refs = {};\nconst args = refs.map(el);\nconst lost = refs.find((r, i) => !args[i]);\nif (lost !== undefined) return {{ error: 'stale', detail: lost }};\nconst v = (function () {{\n{}\n}}).apply(doc.defaultView, args);\nreturn {{ ok: v === undefined ? null : v }};",
            Value::from(refs),
            script
        );
        self.run(&body)
    }

    fn alert_text(&mut self) -> DriverResult<String> {
        self.require_dialog()
    }

    fn accept_alert(&mut self) -> DriverResult<()> {
        self.require_dialog()?;
        let response = self.response.take();
        let page = self.page()?;
        self.block(page.accept_dialog(response.as_deref()))?;
        self.dialog_handled()
    }

    fn dismiss_alert(&mut self) -> DriverResult<()> {
        self.require_dialog()?;
        self.response = None;
        let page = self.page()?;
        self.block(page.dismiss_dialog())?;
        self.dialog_handled()
    }

    /// Held until the dialog is accepted; CDP answers a prompt on accept.
    fn send_alert_text(&mut self, text: &str) -> DriverResult<()> {
        self.require_dialog()?;
        self.response = Some(text.to_string());
        Ok(())
    }

    fn window_handle(&mut self) -> DriverResult<String> {
        let i = self.current_window_index()?;
        Ok(self.windows[i].handle.clone())
    }

    fn window_handles(&mut self) -> DriverResult<Vec<String>> {
        let tabs = self.block(self.browser()?.tabs())?;
        Ok(tabs
            .into_iter()
            .map(|tab| {
                self.windows
                    .iter()
                    .find(|w| w.page.target_id().to_string() == tab.id)
                    .map(|w| w.handle.clone())
                    .unwrap_or(tab.id)
            })
            .collect())
    }

    fn switch_to_window(&mut self, handle: &str) -> DriverResult<()> {
        if let Some(i) = self.windows.iter().position(|w| w.handle == handle) {
            return self.activate(i);
        }
        let tabs = self.block(self.browser()?.tabs())?;
        let Some(tab) = tabs.into_iter().find(|t| t.id == handle) else {
            return Err(DriverError::NoSuchWindow(handle.to_string()));
        };
        let i = self.adopt(handle, &tab.url)?;
        self.activate(i)
    }

    fn close_window(&mut self) -> DriverResult<()> {
        let i = self.current_window_index()?;
        let id = self.windows[i].page.target_id().to_string();
        let session = self.session_id()?;
        self.block(self.browser()?.close_tab(&id))?;
        self.dialogs.remove(&session);
        self.windows.remove(i);
        self.current = None;
        self.frames.clear();
        Ok(())
    }

    fn switch_to_frame(&mut self, frame: &ElementRef) -> DriverResult<()> {
        self.on_element(frame, ENTER_FRAME)?;
        self.frames.push(frame.clone());
        Ok(())
    }

    fn switch_to_parent_frame(&mut self) -> DriverResult<()> {
        self.guard()?;
        self.frames.pop();
        Ok(())
    }

    fn switch_to_default_content(&mut self) -> DriverResult<()> {
        self.guard()?;
        self.frames.clear();
        Ok(())
    }

    fn goto(&mut self, url: &str) -> DriverResult<()> {
        self.guard()?;
        let page = self.page()?;
        self.block(page.goto(url))?;
        self.frames.clear();
        Ok(())
    }

    fn current_url(&mut self) -> DriverResult<String> {
        self.guard()?;
        let page = self.page()?;
        self.block(page.url())
    }

    fn title(&mut self) -> DriverResult<String> {
        self.guard()?;
        let page = self.page()?;
        self.block(page.title())
    }

    fn page_source(&mut self) -> DriverResult<String> {
        let v = self.run("return { ok: doc.documentElement ? doc.documentElement.outerHTML : '' };")?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    fn quit(&mut self) -> DriverResult<()> {
        let Some(browser) = self.browser.take() else {
            return Err(DriverError::Session("browser already closed".into()));
        };
        self.windows.clear();
        self.current = None;
        self.frames.clear();
        self.dialogs.clear();
        self.runtime.block_on(browser.close()).map_err(map_eoka)
    }
}
