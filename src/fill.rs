//! Writes resolved values into the page, one field at a time.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::discover::{ControlKind, FieldDescriptor};
use crate::error::Result;
use crate::generate::AnswerBridge;
use crate::profile::ProfileRecord;
use crate::resolve::{FillValue, Resolution, UnresolvedReason};

/// Live state of one element as read back from the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlState {
    pub value: String,
    pub checked: bool,
    /// Values of the selected `<option>`s.
    pub selected: Vec<String>,
}

/// Element-level primitives the executor builds its strategies from.
/// `handle` is the `data-autofill-id` of the target element.
#[async_trait]
pub trait ControlDriver: Send + Sync {
    /// Focus the element and empty its value.
    async fn clear(&self, handle: &str) -> Result<()>;

    /// Type one character into the focused element as a key event.
    async fn type_char(&self, handle: &str, ch: char) -> Result<()>;

    async fn click(&self, handle: &str) -> Result<()>;

    /// Make exactly `values` the selected options of a `<select>`.
    async fn select_values(&self, handle: &str, values: &[String]) -> Result<()>;

    async fn read_state(&self, handle: &str) -> Result<ControlState>;

    /// Progress message for the user; failures are ignored by callers.
    async fn show_progress(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// Randomized per-keystroke delay plus a pause between fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TypingCadence {
    keystroke_ms: RangeInclusive<u64>,
    between_fields: Duration,
}

impl TypingCadence {
    pub fn new(min_keystroke_ms: u64, max_keystroke_ms: u64, between_fields: Duration) -> Self {
        let (lo, hi) = if min_keystroke_ms <= max_keystroke_ms {
            (min_keystroke_ms, max_keystroke_ms)
        } else {
            (max_keystroke_ms, min_keystroke_ms)
        };
        Self {
            keystroke_ms: lo..=hi,
            between_fields,
        }
    }

    /// No delays at all; deterministic.
    pub fn instant() -> Self {
        Self::new(0, 0, Duration::ZERO)
    }

    fn keystroke_delay(&self) -> Duration {
        if self.keystroke_ms.end() == &0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.keystroke_ms.clone()))
    }
}

impl Default for TypingCadence {
    fn default() -> Self {
        Self::new(40, 140, Duration::from_millis(300))
    }
}

/// Shared abort switch checked between fields.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A descriptor paired with its resolution, in document order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedField {
    pub descriptor: FieldDescriptor,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SkipReason {
    Unresolved(UnresolvedReason),
    GenerationFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldOutcome {
    /// Written and verified.
    Filled,
    /// Already held the intended value; nothing written.
    AlreadySet,
    Skipped(SkipReason),
    /// The read-back did not match what was written.
    Mismatched { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldReport {
    pub label: String,
    pub kind: ControlKind,
    pub outcome: FieldOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FillReport {
    pub filled: usize,
    pub skipped: usize,
    pub mismatched: usize,
    /// Labels of skipped fields, for manual follow-up.
    pub skipped_labels: Vec<String>,
    pub mismatched_labels: Vec<String>,
    pub fields: Vec<FieldReport>,
    pub cancelled: bool,
}

impl FillReport {
    fn record(&mut self, descriptor: &FieldDescriptor, outcome: FieldOutcome) {
        match &outcome {
            FieldOutcome::Filled | FieldOutcome::AlreadySet => self.filled += 1,
            FieldOutcome::Skipped(_) => {
                self.skipped += 1;
                self.skipped_labels.push(descriptor.label.clone());
            }
            FieldOutcome::Mismatched { .. } => {
                self.mismatched += 1;
                self.mismatched_labels.push(descriptor.label.clone());
            }
        }
        self.fields.push(FieldReport {
            label: descriptor.label.clone(),
            kind: descriptor.kind,
            outcome,
        });
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "Filled {}, skipped {}, mismatched {}",
            self.filled, self.skipped, self.mismatched
        );
        if self.cancelled {
            line.push_str(" (cancelled)");
        }
        line
    }
}

/// Consumes a resolved plan and drives the page.
pub struct FillExecutor<'a, D: ControlDriver + ?Sized> {
    driver: &'a D,
    bridge: &'a mut AnswerBridge,
    profile: &'a ProfileRecord,
    cadence: TypingCadence,
    cancel: CancelFlag,
}

impl<'a, D: ControlDriver + ?Sized> FillExecutor<'a, D> {
    pub fn new(
        driver: &'a D,
        bridge: &'a mut AnswerBridge,
        profile: &'a ProfileRecord,
        cadence: TypingCadence,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            driver,
            bridge,
            profile,
            cadence,
            cancel,
        }
    }

    /// Fill every field in order. Per-field problems land in the report; the
    /// run stops early only when cancelled.
    pub async fn fill(&mut self, plan: &[ResolvedField]) -> FillReport {
        let mut report = FillReport::default();
        let total = plan.len();

        for (index, item) in plan.iter().enumerate() {
            if index > 0 && !self.cadence.between_fields.is_zero() {
                tokio::time::sleep(self.cadence.between_fields).await;
            }
            if self.cancel.is_cancelled() {
                info!(done = index, total, "fill cancelled");
                report.cancelled = true;
                break;
            }

            let descriptor = &item.descriptor;
            let outcome = match &item.resolution {
                Resolution::Unresolved { reason } => FieldOutcome::Skipped(SkipReason::Unresolved(*reason)),
                Resolution::Bound { field, value } => {
                    debug!(control = %descriptor.id, field = %field, "writing profile value");
                    self.write(descriptor, value).await
                }
                Resolution::Abstract { question } => {
                    match self.bridge.get_answer(descriptor, question, self.profile).await {
                        Some(answer) => self.write(descriptor, &FillValue::Text(answer)).await,
                        None => FieldOutcome::Skipped(SkipReason::GenerationFailed),
                    }
                }
            };

            match &outcome {
                FieldOutcome::Mismatched { expected, actual } => warn!(
                    control = %descriptor.id,
                    label = %descriptor.label,
                    expected = %expected,
                    actual = %actual,
                    "write verification mismatch"
                ),
                FieldOutcome::Skipped(reason) => {
                    debug!(control = %descriptor.id, label = %descriptor.label, ?reason, "skipped")
                }
                _ => {}
            }
            report.record(descriptor, outcome);

            let progress = format!("Filled {}/{} fields", report.filled, total);
            if let Err(e) = self.driver.show_progress(&progress).await {
                debug!(error = %e, "could not update progress");
            }
        }

        info!(
            filled = report.filled,
            skipped = report.skipped,
            mismatched = report.mismatched,
            cancelled = report.cancelled,
            "fill finished"
        );
        report
    }

    async fn write(&self, descriptor: &FieldDescriptor, value: &FillValue) -> FieldOutcome {
        let result = match (descriptor.kind, value) {
            (ControlKind::Text | ControlKind::Multiline, FillValue::Text(text)) => {
                self.write_text(descriptor, text).await
            }
            (ControlKind::RadioGroup | ControlKind::CheckboxGroup, FillValue::Options(chosen)) => {
                self.write_checkables(descriptor, chosen).await
            }
            (ControlKind::SingleSelect | ControlKind::MultiSelect, FillValue::Options(chosen)) => {
                self.write_select(descriptor, chosen).await
            }
            (kind, value) => {
                warn!(?kind, ?value, "value shape does not fit control kind");
                return FieldOutcome::Skipped(SkipReason::Unresolved(UnresolvedReason::NoMatch));
            }
        };
        result.unwrap_or_else(|e| FieldOutcome::Mismatched {
            expected: describe(value, descriptor),
            actual: format!("error: {e}"),
        })
    }

    async fn write_text(&self, descriptor: &FieldDescriptor, text: &str) -> Result<FieldOutcome> {
        let handle = descriptor.id.as_str();
        let single_line;
        let text = if descriptor.kind == ControlKind::Text {
            single_line = one_line(text);
            single_line.as_str()
        } else {
            text
        };
        if self.driver.read_state(handle).await?.value == text {
            return Ok(FieldOutcome::AlreadySet);
        }

        self.driver.clear(handle).await?;
        for ch in text.chars() {
            self.driver.type_char(handle, ch).await?;
            let delay = self.cadence.keystroke_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let actual = self.driver.read_state(handle).await?.value;
        Ok(if actual == text {
            FieldOutcome::Filled
        } else {
            FieldOutcome::Mismatched {
                expected: text.to_string(),
                actual,
            }
        })
    }

    /// Radio and checkbox members: click each chosen option that is not
    /// already checked. Unchosen options are never touched.
    async fn write_checkables(&self, descriptor: &FieldDescriptor, chosen: &[usize]) -> Result<FieldOutcome> {
        let chosen: &[usize] = if descriptor.kind == ControlKind::RadioGroup {
            &chosen[..chosen.len().min(1)]
        } else {
            chosen
        };

        let mut wrote = false;
        for option in chosen.iter().filter_map(|&i| descriptor.options.get(i)) {
            if !self.driver.read_state(&option.handle).await?.checked {
                self.driver.click(&option.handle).await?;
                wrote = true;
            }
        }

        let mut unchecked = Vec::new();
        for option in chosen.iter().filter_map(|&i| descriptor.options.get(i)) {
            if !self.driver.read_state(&option.handle).await?.checked {
                unchecked.push(option.label.clone());
            }
        }
        Ok(match (unchecked.is_empty(), wrote) {
            (true, true) => FieldOutcome::Filled,
            (true, false) => FieldOutcome::AlreadySet,
            (false, _) => FieldOutcome::Mismatched {
                expected: describe(&FillValue::Options(chosen.to_vec()), descriptor),
                actual: format!("not checked: {}", unchecked.join(", ")),
            },
        })
    }

    /// Single select replaces the selection; multi-select adds to it.
    async fn write_select(&self, descriptor: &FieldDescriptor, chosen: &[usize]) -> Result<FieldOutcome> {
        let handle = descriptor.id.as_str();
        let wanted: Vec<String> = chosen
            .iter()
            .filter_map(|&i| descriptor.options.get(i))
            .map(|o| o.value.clone())
            .take(if descriptor.kind == ControlKind::SingleSelect { 1 } else { usize::MAX })
            .collect();

        let before = self.driver.read_state(handle).await?.selected;
        if wanted.iter().all(|w| before.contains(w)) {
            return Ok(FieldOutcome::AlreadySet);
        }

        let target = if descriptor.kind == ControlKind::MultiSelect {
            let mut merged = before.clone();
            merged.extend(wanted.iter().filter(|w| !before.contains(w)).cloned());
            merged
        } else {
            wanted.clone()
        };
        self.driver.select_values(handle, &target).await?;

        let after = self.driver.read_state(handle).await?.selected;
        Ok(if wanted.iter().all(|w| after.contains(w)) {
            FieldOutcome::Filled
        } else {
            FieldOutcome::Mismatched {
                expected: wanted.join(", "),
                actual: after.join(", "),
            }
        })
    }
}

/// Single-line inputs drop line breaks, so multi-line text is joined with
/// spaces before it is typed and compared.
fn one_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn describe(value: &FillValue, descriptor: &FieldDescriptor) -> String {
    match value {
        FillValue::Text(text) => text.clone(),
        FillValue::Options(indices) => indices
            .iter()
            .filter_map(|&i| descriptor.options.get(i))
            .map(|o| o.label.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_bounds_are_ordered_and_respected() {
        let cadence = TypingCadence::new(90, 30, Duration::ZERO);
        for _ in 0..50 {
            let d = cadence.keystroke_delay();
            assert!(d >= Duration::from_millis(30) && d <= Duration::from_millis(90));
        }
        assert_eq!(TypingCadence::instant().keystroke_delay(), Duration::ZERO);
    }

    #[test]
    fn line_breaks_collapse_to_single_spaces() {
        assert_eq!(one_line("Adaptability.\n\n  Fast learning.\r\n"), "Adaptability. Fast learning.");
        assert_eq!(one_line("plain"), "plain");
        assert_eq!(one_line("\n"), "");
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn summary_mentions_cancellation() {
        let report = FillReport {
            filled: 2,
            skipped: 1,
            cancelled: true,
            ..Default::default()
        };
        assert_eq!(report.summary(), "Filled 2, skipped 1, mismatched 0 (cancelled)");
    }
}
