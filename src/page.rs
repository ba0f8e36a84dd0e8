//! The browser tab a session drives: navigation, panel calls, area selection
//! and control writes, all over CDP.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::page::Page as CrPage;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::element::Element;
use crate::error::{Error, Result};
use crate::fill::{ControlDriver, ControlState};
use crate::overlay;
use crate::scope::{SelectionCandidate, SelectionSurface};
use crate::session::Panel;

/// A button press on the floating panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    SelectArea,
    StartAutofill,
}

/// Wrapper around a chromiumoxide Page. Implements both the selection
/// surface and the control driver on top of the injected overlay.
#[derive(Clone)]
pub struct Page {
    inner: CrPage,
    default_timeout: Duration,
}

/// CSS selector for a stamped control.
pub fn handle_selector(handle: &str) -> String {
    format!(r#"[data-autofill-id="{handle}"]"#)
}

fn js_string(value: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::JsError(e.to_string()))
}

impl Page {
    pub(crate) fn new(inner: CrPage, default_timeout: Duration) -> Self {
        Self {
            inner,
            default_timeout,
        }
    }

    /// Returns a reference to the underlying chromiumoxide Page.
    pub fn inner(&self) -> &CrPage {
        &self.inner
    }

    // ── Navigation ──────────────────────────────────────────────────

    /// Navigate to the given URL and wait for the page to load.
    pub async fn goto(&self, url: &str) -> Result<()> {
        self.inner
            .goto(url)
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?;
        Ok(())
    }

    /// Get the current page title.
    pub async fn title(&self) -> Result<String> {
        let title: Option<String> = self.evaluate_json("document.title").await?;
        Ok(title.unwrap_or_default())
    }

    /// Wait for an element matching the given CSS selector to appear in the DOM.
    /// Polls every 100ms up to the configured default timeout.
    pub async fn wait_for_selector(&self, selector: &str) -> Result<Element> {
        let timeout = self.default_timeout;
        let interval = Duration::from_millis(100);
        let start = std::time::Instant::now();

        loop {
            match self.find_element(selector).await {
                Ok(el) => return Ok(el),
                Err(_) if start.elapsed() < timeout => {
                    tokio::time::sleep(interval).await;
                }
                Err(_) => {
                    return Err(Error::Timeout(format!(
                        "Timed out waiting for selector: {selector}"
                    )));
                }
            }
        }
    }

    // ── Evaluation ──────────────────────────────────────────────────

    /// Evaluate an expression and deserialize its value. `undefined` reads as `null`.
    pub async fn evaluate_json<T: DeserializeOwned>(&self, expression: &str) -> Result<T> {
        let result = self
            .inner
            .evaluate(expression)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        let value = result.value().cloned().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value).map_err(|e| Error::JsError(e.to_string()))
    }

    async fn overlay_call<T: DeserializeOwned>(&self, expression: &str) -> Result<T> {
        self.evaluate_json(&overlay::call(expression)).await
    }

    /// Run an element helper that reports `false` when the handle is gone.
    async fn overlay_on_handle(&self, handle: &str, expression: &str) -> Result<()> {
        let found: bool = self.overlay_call(expression).await?;
        if found {
            Ok(())
        } else {
            Err(Error::ElementNotFound(handle_selector(handle)))
        }
    }

    // ── Panel ───────────────────────────────────────────────────────

    /// Install the panel into the current document. A no-op when present.
    pub async fn install_panel(&self) -> Result<()> {
        self.inner
            .evaluate(overlay::PANEL_JS)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        Ok(())
    }

    /// The last unconsumed panel button press, if any.
    pub async fn take_trigger(&self) -> Result<Option<Trigger>> {
        self.overlay_call("takeTrigger()").await
    }

    pub async fn panel_closed(&self) -> Result<bool> {
        self.overlay_call("isClosed()").await
    }

    pub async fn set_status(&self, text: &str) -> Result<()> {
        let _: bool = self
            .overlay_call(&format!("setStatus({})", js_string(text)?))
            .await?;
        Ok(())
    }

    // ── Element Queries ─────────────────────────────────────────────

    /// Find an element matching the given CSS selector.
    pub async fn find_element(&self, selector: &str) -> Result<Element> {
        let el = self
            .inner
            .find_element(selector)
            .await
            .map_err(|e| Error::ElementNotFound(e.to_string()))?;
        Ok(Element::new(el))
    }
}

#[async_trait]
impl SelectionSurface for Page {
    async fn arm_selection(&self) -> Result<()> {
        let _: bool = self.overlay_call("arm()").await?;
        Ok(())
    }

    async fn take_selection(&self) -> Result<Option<SelectionCandidate>> {
        let raw: Option<String> = self.overlay_call("takeSelection()").await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| Error::JsError(format!("Malformed selection snapshot: {e}")))
        })
        .transpose()
    }

    async fn disarm_selection(&self) -> Result<()> {
        let _: bool = self.overlay_call("disarm()").await?;
        Ok(())
    }

    async fn show_status(&self, text: &str) -> Result<()> {
        self.set_status(text).await
    }

    async fn selection_abandoned(&self) -> Result<bool> {
        self.panel_closed().await
    }
}

#[async_trait]
impl Panel for Page {
    async fn install_panel(&self) -> Result<()> {
        Page::install_panel(self).await
    }

    async fn take_trigger(&self) -> Result<Option<Trigger>> {
        Page::take_trigger(self).await
    }

    async fn panel_closed(&self) -> Result<bool> {
        Page::panel_closed(self).await
    }
}

#[async_trait]
impl ControlDriver for Page {
    async fn clear(&self, handle: &str) -> Result<()> {
        self.overlay_on_handle(handle, &format!("clear({})", js_string(handle)?))
            .await
    }

    async fn type_char(&self, handle: &str, ch: char) -> Result<()> {
        // A newline key press would submit single-line inputs.
        if ch != '\n' {
            let el = self.find_element(&handle_selector(handle)).await?;
            let mut buf = [0u8; 4];
            let typed = async {
                el.focus().await?;
                el.type_text(ch.encode_utf8(&mut buf)).await
            }
            .await;
            match typed {
                Ok(()) => return Ok(()),
                Err(e) => debug!(handle, error = %e, "key event failed, inserting text"),
            }
        }
        let mut buf = [0u8; 4];
        let text = js_string(ch.encode_utf8(&mut buf))?;
        self.overlay_on_handle(handle, &format!("insert({}, {text})", js_string(handle)?))
            .await
    }

    async fn click(&self, handle: &str) -> Result<()> {
        let el = self.find_element(&handle_selector(handle)).await?;
        if let Err(e) = el.click().await {
            // Styled checkboxes often hide the input itself, leaving no box to click.
            debug!(handle, error = %e, "pointer click failed, dispatching click");
            return self
                .overlay_on_handle(handle, &format!("click({})", js_string(handle)?))
                .await;
        }
        Ok(())
    }

    async fn select_values(&self, handle: &str, values: &[String]) -> Result<()> {
        let values = serde_json::to_string(values).map_err(|e| Error::JsError(e.to_string()))?;
        self.overlay_on_handle(handle, &format!("select({}, {values})", js_string(handle)?))
            .await
    }

    async fn read_state(&self, handle: &str) -> Result<ControlState> {
        let raw: Option<String> = self
            .overlay_call(&format!("read({})", js_string(handle)?))
            .await?;
        let raw = raw.ok_or_else(|| Error::ElementNotFound(handle_selector(handle)))?;
        serde_json::from_str(&raw).map_err(|e| Error::JsError(e.to_string()))
    }

    async fn show_progress(&self, text: &str) -> Result<()> {
        self.set_status(text).await
    }
}
