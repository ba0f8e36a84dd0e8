//! Interactive selection of the page region a run is confined to.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::discover::is_fillable;
use crate::error::{Error, Result};
use crate::fill::CancelFlag;

/// Bounding box in document coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// One `<option>` of a `<select>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOption {
    pub label: String,
    pub value: String,
    pub selected: bool,
}

/// A fillable control as seen by the in-page snapshot script. Every label
/// source is captured so that the label policy lives on the Rust side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawControl {
    /// Value of the `data-autofill-id` attribute stamped on the element.
    pub handle: String,
    /// Position in DOM order within the scope.
    pub doc_index: usize,
    pub tag: String,
    pub r#type: String,
    pub name: String,
    pub id: String,
    pub value: String,
    pub checked: bool,
    pub multiple: bool,
    pub required: bool,
    pub disabled: bool,
    pub visible: bool,
    pub placeholder: String,
    pub title: String,
    /// Text of `label[for=id]` and `aria-labelledby` targets.
    pub label_by_ref: String,
    /// Text of the enclosing `<label>`, control text removed.
    pub label_enclosing: String,
    /// Nearest preceding text within the bounded ancestor walk.
    pub label_preceding: String,
    /// `aria-labelledby`/`aria-label` text of a `role=radiogroup|group` ancestor.
    pub group_label_by_ref: String,
    /// Legend of the enclosing fieldset.
    pub group_legend: String,
    pub rect: Rect,
    pub options: Vec<RawOption>,
}

/// What the page reports when the user clicks during selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionCandidate {
    pub scope_id: String,
    pub tag: String,
    pub rect: Rect,
    pub controls: Vec<RawControl>,
}

/// An immutable snapshot of the user-selected region and its controls.
#[derive(Debug, Clone, PartialEq)]
pub struct FormScope {
    scope_id: String,
    tag: String,
    rect: Rect,
    controls: Vec<RawControl>,
}

impl FormScope {
    /// Fails with [`Error::EmptyScope`] when the region holds no control
    /// that could actually be filled.
    pub fn from_candidate(candidate: SelectionCandidate) -> Result<Self> {
        if !candidate.controls.iter().any(is_fillable) {
            return Err(Error::EmptyScope(format!(
                "<{}> {}",
                candidate.tag, candidate.scope_id
            )));
        }
        Ok(Self {
            scope_id: candidate.scope_id,
            tag: candidate.tag,
            rect: candidate.rect,
            controls: candidate.controls,
        })
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn controls(&self) -> &[RawControl] {
        &self.controls
    }
}

/// The page-side half of area selection.
#[async_trait]
pub trait SelectionSurface: Send + Sync {
    /// Enter the hover-highlight loop.
    async fn arm_selection(&self) -> Result<()>;

    /// Take the pending click, if the user made one since the last call.
    async fn take_selection(&self) -> Result<Option<SelectionCandidate>>;

    /// Leave the hover loop and remove the highlight overlay.
    async fn disarm_selection(&self) -> Result<()>;

    /// Show a short message to the user.
    async fn show_status(&self, text: &str) -> Result<()>;

    /// True once the user has dismissed the selection UI.
    async fn selection_abandoned(&self) -> Result<bool> {
        Ok(false)
    }
}

/// Polls a [`SelectionSurface`] until the user picks a non-empty region.
#[derive(Debug, Clone)]
pub struct ScopeSelector {
    poll_interval: Duration,
    timeout: Duration,
}

impl ScopeSelector {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Run the selection loop. Empty regions re-arm the loop instead of
    /// returning. Fails with [`Error::Timeout`] when nobody clicks in time and
    /// with [`Error::Cancelled`] once `cancel` is set or the surface is
    /// dismissed.
    pub async fn select_scope<S>(&self, surface: &S, cancel: &CancelFlag) -> Result<FormScope>
    where
        S: SelectionSurface + ?Sized,
    {
        surface.arm_selection().await?;
        surface.show_status("Click on the form area to select it").await?;
        let start = Instant::now();

        loop {
            if cancel.is_cancelled() || matches!(surface.selection_abandoned().await, Ok(true)) {
                if let Err(e) = surface.disarm_selection().await {
                    warn!(error = %e, "could not leave selection mode");
                }
                info!("form area selection cancelled");
                return Err(Error::Cancelled("form area selection".into()));
            }

            if let Some(candidate) = surface.take_selection().await? {
                match FormScope::from_candidate(candidate) {
                    Ok(scope) => {
                        surface.disarm_selection().await?;
                        info!(
                            scope = %scope.scope_id(),
                            controls = scope.controls().len(),
                            "form area selected"
                        );
                        return Ok(scope);
                    }
                    Err(err @ Error::EmptyScope(_)) => {
                        warn!(error = %err, "selection rejected; waiting for another click");
                        surface
                            .show_status("No fillable fields there. Pick another area")
                            .await?;
                        surface.arm_selection().await?;
                    }
                    Err(err) => return Err(err),
                }
            }

            if start.elapsed() >= self.timeout {
                surface.disarm_selection().await?;
                return Err(Error::Timeout("form area selection".into()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
