//! Page driver: the operation surface the locator and workflow layers use.
//!
//! [`CdpDriver`] implements it against a live transport with raw protocol
//! commands plus small injected scripts. Queried elements are parked in an
//! in-page registry (`window.__ir_nodes`) and addressed by index, so the
//! Rust side never holds DOM object references across calls.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::DriverError;
use crate::transport::{CdpTransport, CommandTarget};

/// Index into the in-page element registry. Valid until the next navigation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeRef(pub u32);

/// One element produced by a query: its registry handle, extracted text and
/// computed visibility. Transient; never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElementHit {
    pub node: NodeRef,
    pub text: String,
    pub visible: bool,
}

impl ElementHit {
    pub fn new(node: u32, text: impl Into<String>, visible: bool) -> Self {
        Self {
            node: NodeRef(node),
            text: text.into(),
            visible,
        }
    }
}

/// Minimal browser-page surface needed by the automation layers.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    /// All elements matching a CSS selector, with text and visibility.
    /// Invisible elements are included; filtering is the caller's concern.
    async fn query(&self, selector: &str) -> Result<Vec<ElementHit>, DriverError>;

    async fn click(&self, node: NodeRef) -> Result<(), DriverError>;

    /// Replace an input's value, firing input/change events.
    async fn fill(&self, node: NodeRef, value: &str) -> Result<(), DriverError>;

    /// Current value of an input, or text content for other elements.
    async fn read_value(&self, node: NodeRef) -> Result<String, DriverError>;

    async fn focus(&self, node: NodeRef) -> Result<(), DriverError>;

    /// Insert text into the focused element as real keyboard input.
    async fn type_text(&self, text: &str) -> Result<(), DriverError>;

    async fn press_enter(&self) -> Result<(), DriverError>;

    /// Scroll the first element matching `selector` (the document when the
    /// selector matches nothing scrollable) by `delta_y` pixels.
    async fn scroll_by(&self, selector: &str, delta_y: f64) -> Result<(), DriverError>;

    /// Attach files to a file input.
    async fn set_files(&self, node: NodeRef, paths: &[PathBuf]) -> Result<(), DriverError>;

    fn is_alive(&self) -> bool;

    async fn close(&self);
}

/// Driver bound to one page in one browser process.
pub struct CdpDriver {
    transport: Arc<dyn CdpTransport>,
    session: String,
}

impl CdpDriver {
    /// Create a page on the given transport and attach to it.
    pub async fn attach(transport: Arc<dyn CdpTransport>) -> Result<Self, DriverError> {
        let created = transport
            .send_command(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": "about:blank" }),
            )
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol("createTarget returned no targetId".into()))?
            .to_string();

        let attached = transport
            .send_command(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol("attachToTarget returned no sessionId".into()))?
            .to_string();

        let driver = Self { transport, session };
        driver.send("Page.enable", json!({})).await?;
        driver.send("Runtime.enable", json!({})).await?;
        Ok(driver)
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, DriverError> {
        self.transport
            .send_command(CommandTarget::Session(self.session.clone()), method, params)
            .await
    }

    /// Evaluate an expression and return its JSON value.
    async fn evaluate(&self, expression: String) -> Result<Value, DriverError> {
        let resp = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = resp.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str)
                .unwrap_or("script exception");
            return Err(DriverError::Script(text.to_string()));
        }

        Ok(resp
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Evaluate an expression that yields a DOM object and return its
    /// remote object id.
    async fn evaluate_object(&self, expression: String) -> Result<String, DriverError> {
        let resp = self
            .send(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": false }),
            )
            .await?;
        resp.get("result")
            .and_then(|r| r.get("objectId"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DriverError::Script("expression yielded no object".into()))
    }

    /// Run a script against a registered node, propagating stale handles as
    /// script errors.
    async fn with_node(&self, node: NodeRef, body: &str) -> Result<Value, DriverError> {
        let expression = format!(
            "(() => {{\n  const el = (window.__ir_nodes || [])[{idx}];\n  if (!el) return JSON.stringify({{ ok: false, err: 'stale node handle' }});\n  {body}\n}})()",
            idx = node.0,
            body = body,
        );
        let value = self.evaluate(expression).await?;
        let text = value
            .as_str()
            .ok_or_else(|| DriverError::Protocol("node script returned non-string".into()))?;
        let parsed: NodeScriptResult = serde_json::from_str(text)
            .map_err(|err| DriverError::Protocol(format!("node script payload: {err}")))?;
        if !parsed.ok {
            return Err(DriverError::Script(
                parsed.err.unwrap_or_else(|| "node script failed".into()),
            ));
        }
        Ok(parsed.value.unwrap_or(Value::Null))
    }
}

#[derive(Deserialize)]
struct NodeScriptResult {
    ok: bool,
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    value: Option<Value>,
}

#[derive(Deserialize)]
struct QueryHit {
    idx: u32,
    text: String,
    visible: bool,
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        debug!(target: "browser-adapter", %url, "navigating");
        self.send("Page.navigate", json!({ "url": url })).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let value = self.evaluate("window.location.href".to_string()).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("location.href was not a string".into()))
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementHit>, DriverError> {
        let selector_js = serde_json::to_string(selector)
            .map_err(|err| DriverError::Protocol(err.to_string()))?;
        // Visibility mirrors the target app's rendering rules: display,
        // visibility, opacity and layout containment via offsetParent.
        let expression = format!(
            r#"(() => {{
  window.__ir_nodes = window.__ir_nodes || [];
  const out = [];
  let els;
  try {{ els = Array.from(document.querySelectorAll({selector_js})); }}
  catch (e) {{ return JSON.stringify(out); }}
  for (const el of els) {{
    const style = window.getComputedStyle(el);
    const visible = style.display !== 'none' &&
      style.visibility !== 'hidden' &&
      style.opacity !== '0' &&
      el.offsetParent !== null;
    const idx = window.__ir_nodes.push(el) - 1;
    out.push({{ idx, text: (el.textContent || '').trim(), visible }});
  }}
  return JSON.stringify(out);
}})()"#
        );

        let value = self.evaluate(expression).await?;
        let text = value
            .as_str()
            .ok_or_else(|| DriverError::Protocol("query returned non-string".into()))?;
        let hits: Vec<QueryHit> = serde_json::from_str(text)
            .map_err(|err| DriverError::Protocol(format!("query payload: {err}")))?;
        Ok(hits
            .into_iter()
            .map(|h| ElementHit::new(h.idx, h.text, h.visible))
            .collect())
    }

    async fn click(&self, node: NodeRef) -> Result<(), DriverError> {
        // Full mousedown/mouseup/click burst plus the native click, matching
        // what stubborn framework widgets in the target app respond to.
        self.with_node(
            node,
            r#"el.scrollIntoView({ block: 'center' });
  for (const type of ['mousedown', 'mouseup', 'click']) {
    el.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: window, button: 0 }));
  }
  el.click();
  return JSON.stringify({ ok: true });"#,
        )
        .await?;
        Ok(())
    }

    async fn fill(&self, node: NodeRef, value: &str) -> Result<(), DriverError> {
        let value_js =
            serde_json::to_string(value).map_err(|err| DriverError::Protocol(err.to_string()))?;
        let body = format!(
            r#"el.value = {value_js};
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return JSON.stringify({{ ok: true }});"#
        );
        self.with_node(node, &body).await?;
        Ok(())
    }

    async fn read_value(&self, node: NodeRef) -> Result<String, DriverError> {
        let value = self
            .with_node(
                node,
                r#"const v = el.value !== undefined ? el.value : (el.textContent || '');
  return JSON.stringify({ ok: true, value: String(v) });"#,
            )
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("read_value returned non-string".into()))
    }

    async fn focus(&self, node: NodeRef) -> Result<(), DriverError> {
        self.with_node(node, "el.focus(); return JSON.stringify({ ok: true });")
            .await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.send("Input.insertText", json!({ "text": text })).await?;
        Ok(())
    }

    async fn press_enter(&self) -> Result<(), DriverError> {
        self.send(
            "Input.dispatchKeyEvent",
            json!({
                "type": "rawKeyDown",
                "key": "Enter",
                "code": "Enter",
                "windowsVirtualKeyCode": 13,
                "nativeVirtualKeyCode": 13,
            }),
        )
        .await?;
        self.send(
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "key": "Enter",
                "code": "Enter",
                "windowsVirtualKeyCode": 13,
                "nativeVirtualKeyCode": 13,
            }),
        )
        .await?;
        Ok(())
    }

    async fn scroll_by(&self, selector: &str, delta_y: f64) -> Result<(), DriverError> {
        let selector_js = serde_json::to_string(selector)
            .map_err(|err| DriverError::Protocol(err.to_string()))?;
        let expression = format!(
            r#"(() => {{
  let target = null;
  try {{ target = document.querySelector({selector_js}); }} catch (e) {{}}
  if (target && target.scrollHeight > target.clientHeight) {{
    target.scrollBy(0, {delta_y});
  }} else {{
    (document.scrollingElement || document.documentElement).scrollBy(0, {delta_y});
  }}
  return 'ok';
}})()"#
        );
        self.evaluate(expression).await?;
        Ok(())
    }

    async fn set_files(&self, node: NodeRef, paths: &[PathBuf]) -> Result<(), DriverError> {
        let files: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let object_id = self
            .evaluate_object(format!("(window.__ir_nodes || [])[{}]", node.0))
            .await?;
        self.send(
            "DOM.setFileInputFiles",
            json!({ "files": files, "objectId": object_id }),
        )
        .await?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    async fn close(&self) {
        self.transport.shutdown().await;
    }
}
