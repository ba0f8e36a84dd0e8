//! Ties the pipeline to the panel: select an area, start a run, report.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::AutofillConfig;
use crate::discover::discover;
use crate::error::{Error, Result};
use crate::fill::{CancelFlag, ControlDriver, FillExecutor, FillReport, ResolvedField, TypingCadence};
use crate::generate::{AnswerBridge, GenerationSettings, Generator};
use crate::page::Trigger;
use crate::profile::ProfileRecord;
use crate::resolve::{FieldResolver, Resolution};
use crate::scope::{FormScope, ScopeSelector, SelectionSurface};

/// Discover and resolve every field of `scope`, before anything is written.
pub fn plan(scope: &FormScope, resolver: &FieldResolver, profile: &ProfileRecord) -> Vec<ResolvedField> {
    let plan: Vec<ResolvedField> = discover(scope)
        .into_iter()
        .map(|descriptor| {
            let resolution = resolver.resolve(&descriptor, profile);
            ResolvedField {
                descriptor,
                resolution,
            }
        })
        .collect();

    let bound = plan
        .iter()
        .filter(|f| matches!(f.resolution, Resolution::Bound { .. }))
        .count();
    let open = plan
        .iter()
        .filter(|f| matches!(f.resolution, Resolution::Abstract { .. }))
        .count();
    info!(
        scope = scope.scope_id(),
        fields = plan.len(),
        bound,
        open,
        unresolved = plan.len() - bound - open,
        "resolved form scope"
    );
    plan
}

/// The floating panel a session takes its orders from. The page it lives in
/// is also where areas are selected and controls are written.
#[async_trait]
pub trait Panel: SelectionSurface + ControlDriver + Clone + 'static {
    /// Put the panel into the current document. A no-op when present.
    async fn install_panel(&self) -> Result<()>;

    /// The last unconsumed button press, if any.
    async fn take_trigger(&self) -> Result<Option<Trigger>>;

    async fn panel_closed(&self) -> Result<bool>;
}

pub struct AutofillSession {
    profile: ProfileRecord,
    generator: Arc<dyn Generator>,
    resolver: FieldResolver,
    settings: GenerationSettings,
    cadence: TypingCadence,
    selector: ScopeSelector,
    poll_interval: Duration,
}

impl AutofillSession {
    pub fn new(config: &AutofillConfig, profile: ProfileRecord, generator: Arc<dyn Generator>) -> Self {
        Self {
            profile,
            generator,
            resolver: config.resolver(),
            settings: config.generation_settings(),
            cadence: config.cadence(),
            selector: config.scope_selector(),
            poll_interval: Duration::from_millis(config.selection.poll_interval_ms),
        }
    }

    pub fn profile(&self) -> &ProfileRecord {
        &self.profile
    }

    /// One fill run over an already selected scope. Generated answers are
    /// cached for the duration of this call only.
    pub async fn fill_scope<D>(&self, scope: &FormScope, driver: &D, cancel: CancelFlag) -> FillReport
    where
        D: ControlDriver + ?Sized,
    {
        let plan = plan(scope, &self.resolver, &self.profile);
        let mut bridge = AnswerBridge::new(Arc::clone(&self.generator), self.settings);
        FillExecutor::new(driver, &mut bridge, &self.profile, self.cadence.clone(), cancel)
            .fill(&plan)
            .await
    }

    /// Serve panel triggers until the panel is closed or `cancel` is set.
    /// Returns the report of every run, in order. Each run consumes the
    /// selected area, so the next run needs a fresh selection.
    pub async fn run<P: Panel>(&self, page: &P, cancel: &CancelFlag) -> Result<Vec<FillReport>> {
        page.install_panel().await?;
        let mut scope: Option<FormScope> = None;
        let mut reports = Vec::new();

        loop {
            if cancel.is_cancelled() {
                info!("session cancelled");
                break;
            }
            if page.panel_closed().await.unwrap_or(false) {
                info!("panel closed");
                break;
            }

            // A navigation drops the overlay until the new document boots it.
            let trigger = match page.take_trigger().await {
                Ok(trigger) => trigger,
                Err(e) => {
                    debug!(error = %e, "overlay unavailable, reinstalling");
                    tokio::time::sleep(self.poll_interval).await;
                    if let Err(e) = page.install_panel().await {
                        debug!(error = %e, "reinstall failed");
                    }
                    continue;
                }
            };

            match trigger {
                Some(Trigger::SelectArea) => {
                    scope = None;
                    page.show_status("Click on the form area to fill").await?;
                    match self.selector.select_scope(page, cancel).await {
                        Ok(selected) => {
                            let status = format!(
                                "Selected {} control(s). Ready to auto-fill",
                                selected.controls().len()
                            );
                            page.show_status(&status).await?;
                            scope = Some(selected);
                        }
                        Err(Error::Timeout(what)) => {
                            error!(%what, "no form area selected");
                            page.show_status("Selection timed out").await?;
                        }
                        Err(Error::Cancelled(what)) => debug!(%what, "selection abandoned"),
                        Err(e) => return Err(e),
                    }
                }
                Some(Trigger::StartAutofill) => match scope.take() {
                    None => page.show_status("Select a form area first").await?,
                    Some(selected) => {
                        let watcher = tokio::spawn(watch_panel(page.clone(), cancel.clone(), self.poll_interval));
                        let report = self.fill_scope(&selected, page, cancel.clone()).await;
                        watcher.abort();

                        log_report(&report);
                        let status = format!("{}. Select an area to fill again", report.summary());
                        if let Err(e) = page.show_status(&status).await {
                            debug!(error = %e, "could not show summary");
                        }
                        reports.push(report);
                    }
                },
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }

        if let Err(e) = page.disarm_selection().await {
            debug!(error = %e, "overlay already gone");
        }
        Ok(reports)
    }
}

/// Turns a panel close during a run into cancellation.
async fn watch_panel<P: Panel>(page: P, cancel: CancelFlag, poll: Duration) {
    loop {
        tokio::time::sleep(poll).await;
        match page.panel_closed().await {
            Ok(true) => {
                info!("panel closed during fill, cancelling");
                cancel.cancel();
                return;
            }
            Ok(false) => {}
            Err(e) => debug!(error = %e, "panel state unavailable"),
        }
    }
}

fn log_report(report: &FillReport) {
    info!(
        filled = report.filled,
        skipped = report.skipped,
        mismatched = report.mismatched,
        "{}",
        report.summary()
    );
    for label in &report.skipped_labels {
        warn!(label = %label, "left for manual completion");
    }
    for label in &report.mismatched_labels {
        warn!(label = %label, "value did not stick");
    }
}
