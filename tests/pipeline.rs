//! Scope → discovery → resolution → generation → fill, against an in-memory page.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use form_autofill::fill::{ControlState, FieldOutcome, SkipReason};
use form_autofill::resolve::UnresolvedReason;
use form_autofill::scope::{RawControl, RawOption, Rect, SelectionCandidate};
use form_autofill::session::plan;
use form_autofill::{
    AutofillConfig, AutofillSession, CancelFlag, ControlDriver, Error, FormScope, GenerationError,
    Generator, ProfileRecord, ProfileValue, Resolution, Result,
};

const STRENGTH: &str = "What is your greatest strength?";
const STRENGTH_ANSWER: &str = "Adaptability and fast learning.";

// ── Page double ─────────────────────────────────────────────────────

struct FakePage {
    states: Mutex<HashMap<String, ControlState>>,
    /// Radio handle → group name.
    radio_groups: HashMap<String, String>,
    clicks: Mutex<Vec<String>>,
    /// `<input>` handles; like a browser, they swallow line breaks.
    single_line: HashSet<String>,
    /// Set on the first `clear`, simulating a close mid-run.
    cancel_on_clear: Option<CancelFlag>,
}

impl FakePage {
    fn from_scope(scope: &FormScope) -> Self {
        let mut states = HashMap::new();
        let mut radio_groups = HashMap::new();
        let mut single_line = HashSet::new();
        for c in scope.controls() {
            if c.tag == "input" {
                single_line.insert(c.handle.clone());
            }
            states.insert(
                c.handle.clone(),
                ControlState {
                    value: c.value.clone(),
                    checked: c.checked,
                    selected: c
                        .options
                        .iter()
                        .filter(|o| o.selected)
                        .map(|o| o.value.clone())
                        .collect(),
                },
            );
            if c.r#type == "radio" {
                radio_groups.insert(c.handle.clone(), c.name.clone());
            }
        }
        Self {
            states: Mutex::new(states),
            radio_groups,
            clicks: Mutex::new(Vec::new()),
            single_line,
            cancel_on_clear: None,
        }
    }

    fn state(&self, handle: &str) -> ControlState {
        self.states.lock().unwrap()[handle].clone()
    }

    fn with_state<T>(&self, handle: &str, f: impl FnOnce(&mut ControlState) -> T) -> Result<T> {
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(handle)
            .ok_or_else(|| Error::ElementNotFound(handle.to_string()))?;
        Ok(f(state))
    }
}

#[async_trait]
impl ControlDriver for FakePage {
    async fn clear(&self, handle: &str) -> Result<()> {
        if let Some(cancel) = &self.cancel_on_clear {
            cancel.cancel();
        }
        self.with_state(handle, |s| s.value.clear())
    }

    async fn type_char(&self, handle: &str, ch: char) -> Result<()> {
        if matches!(ch, '\n' | '\r') && self.single_line.contains(handle) {
            return self.with_state(handle, |_| ());
        }
        self.with_state(handle, |s| s.value.push(ch))
    }

    async fn click(&self, handle: &str) -> Result<()> {
        self.clicks.lock().unwrap().push(handle.to_string());
        if let Some(group) = self.radio_groups.get(handle) {
            let mut states = self.states.lock().unwrap();
            for (member, name) in &self.radio_groups {
                if name == group {
                    if let Some(s) = states.get_mut(member) {
                        s.checked = member == handle;
                    }
                }
            }
            return Ok(());
        }
        self.with_state(handle, |s| s.checked = !s.checked)
    }

    async fn select_values(&self, handle: &str, values: &[String]) -> Result<()> {
        self.with_state(handle, |s| {
            s.selected = values.to_vec();
            s.value = values.first().cloned().unwrap_or_default();
        })
    }

    async fn read_state(&self, handle: &str) -> Result<ControlState> {
        self.with_state(handle, |s| s.clone())
    }
}

// ── Generator doubles ───────────────────────────────────────────────

struct Canned {
    answer: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for Canned {
    async fn generate(&self, prompt: &str, _: u32, _: f32) -> std::result::Result<String, GenerationError> {
        assert!(prompt.contains(STRENGTH));
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.to_string())
    }
}

struct Broken;

#[async_trait]
impl Generator for Broken {
    async fn generate(&self, _: &str, _: u32, _: f32) -> std::result::Result<String, GenerationError> {
        Err(GenerationError::EmptyResponse)
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

fn at(handle: &str, doc_index: usize, tag: &str, ty: &str, top: f64, left: f64) -> RawControl {
    RawControl {
        handle: handle.into(),
        doc_index,
        tag: tag.into(),
        r#type: ty.into(),
        visible: true,
        rect: Rect {
            top,
            left,
            width: 200.0,
            height: 24.0,
        },
        ..Default::default()
    }
}

fn member(handle: &str, doc_index: usize, ty: &str, name: &str, label: &str, legend: &str, top: f64, left: f64) -> RawControl {
    RawControl {
        name: name.into(),
        value: label.to_lowercase(),
        label_enclosing: label.into(),
        group_legend: legend.into(),
        ..at(handle, doc_index, "input", ty, top, left)
    }
}

fn application_scope() -> FormScope {
    let controls = vec![
        RawControl {
            label_by_ref: "Email Address".into(),
            ..at("af-0", 0, "input", "email", 0.0, 10.0)
        },
        RawControl {
            label_enclosing: "First name".into(),
            ..at("af-1", 1, "input", "text", 40.0, 10.0)
        },
        member("af-2", 2, "radio", "degree", "Bachelor's Degree", "Highest degree", 80.0, 10.0),
        member("af-3", 3, "radio", "degree", "Master's Degree", "Highest degree", 80.0, 150.0),
        member("af-4", 4, "radio", "degree", "PhD", "Highest degree", 80.0, 300.0),
        member("af-5", 5, "checkbox", "skills", "Rust", "Technical skills", 120.0, 10.0),
        member("af-6", 6, "checkbox", "skills", "Python", "Technical skills", 120.0, 150.0),
        member("af-7", 7, "checkbox", "skills", "COBOL", "Technical skills", 120.0, 300.0),
        RawControl {
            label_by_ref: STRENGTH.into(),
            ..at("af-8", 8, "textarea", "textarea", 160.0, 10.0)
        },
        // No label source at all.
        at("af-9", 9, "input", "text", 260.0, 10.0),
        RawControl {
            label_preceding: "Country".into(),
            options: vec![
                RawOption {
                    label: "Select...".into(),
                    value: String::new(),
                    selected: true,
                },
                RawOption {
                    label: "United States".into(),
                    value: "us".into(),
                    selected: false,
                },
                RawOption {
                    label: "Germany".into(),
                    value: "de".into(),
                    selected: false,
                },
            ],
            ..at("af-10", 10, "select", "select-one", 300.0, 10.0)
        },
    ];
    FormScope::from_candidate(SelectionCandidate {
        scope_id: "scope-0".into(),
        tag: "form".into(),
        rect: Rect::default(),
        controls,
    })
    .unwrap()
}

fn profile() -> ProfileRecord {
    ProfileRecord::default()
        .with("email", ProfileValue::Text("a@b.com".into()))
        .with("first_name", ProfileValue::Text("Ada".into()))
        .with("degree_level", ProfileValue::Choice("Masters".into()))
        .with("skills", ProfileValue::List(vec!["Rust".into(), "Python".into()]))
        .with("country", ProfileValue::Text("Germany".into()))
}

fn config() -> AutofillConfig {
    AutofillConfig::from_toml_str(
        r#"
        [typing]
        min_delay_ms = 0
        max_delay_ms = 0
        action_delay_ms = 0

        [generation]
        retry_backoff_ms = 0
        "#,
    )
    .unwrap()
}

fn canned() -> Arc<Canned> {
    Arc::new(Canned {
        answer: STRENGTH_ANSWER,
        calls: AtomicUsize::new(0),
    })
}

fn outcome_for<'a>(report: &'a form_autofill::FillReport, label: &str) -> &'a FieldOutcome {
    &report
        .fields
        .iter()
        .find(|f| f.label == label)
        .unwrap_or_else(|| panic!("no field labelled {label:?}"))
        .outcome
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn plan_resolves_every_descriptor_before_filling() {
    let scope = application_scope();
    let plan = plan(&scope, &config().resolver(), &profile());

    let labels: Vec<&str> = plan.iter().map(|f| f.descriptor.label.as_str()).collect();
    assert_eq!(
        labels,
        [
            "Email Address",
            "First name",
            "Highest degree",
            "Technical skills",
            STRENGTH,
            "",
            "Country"
        ]
    );
    assert!(matches!(&plan[0].resolution, Resolution::Bound { field, .. } if field == "email"));
    assert!(matches!(&plan[4].resolution, Resolution::Abstract { question } if question == STRENGTH));
    assert_eq!(
        plan[5].resolution,
        Resolution::Unresolved {
            reason: UnresolvedReason::LabelUnavailable
        }
    );
}

#[tokio::test]
async fn first_fill_writes_and_verifies_every_resolvable_field() {
    let scope = application_scope();
    let page = FakePage::from_scope(&scope);
    let generator = canned();
    let session = AutofillSession::new(&config(), profile(), generator.clone());

    let report = session.fill_scope(&scope, &page, CancelFlag::new()).await;

    assert_eq!(report.filled, 6, "{report:#?}");
    assert_eq!(report.skipped, 1);
    assert_eq!(report.mismatched, 0);
    assert!(!report.cancelled);
    assert_eq!(
        outcome_for(&report, ""),
        &FieldOutcome::Skipped(SkipReason::Unresolved(UnresolvedReason::LabelUnavailable))
    );

    assert_eq!(page.state("af-0").value, "a@b.com");
    assert_eq!(page.state("af-1").value, "Ada");
    assert_eq!(page.state("af-8").value, STRENGTH_ANSWER);
    assert_eq!(page.state("af-10").selected, vec!["de".to_string()]);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    // Exactly one degree, and it is the master's.
    let degrees: Vec<bool> = ["af-2", "af-3", "af-4"].iter().map(|h| page.state(h).checked).collect();
    assert_eq!(degrees, [false, true, false]);

    // Both matching skills ticked, the unrelated one untouched.
    assert!(page.state("af-5").checked);
    assert!(page.state("af-6").checked);
    assert!(!page.state("af-7").checked);
}

#[tokio::test]
async fn second_fill_changes_nothing() {
    let scope = application_scope();
    let page = FakePage::from_scope(&scope);
    let session = AutofillSession::new(&config(), profile(), canned());

    session.fill_scope(&scope, &page, CancelFlag::new()).await;
    page.clicks.lock().unwrap().clear();

    let again = session.fill_scope(&scope, &page, CancelFlag::new()).await;
    assert_eq!(again.mismatched, 0);
    assert_eq!(again.filled, 6);
    assert!(page.clicks.lock().unwrap().is_empty(), "checkables were re-clicked");
    for field in again.fields.iter().filter(|f| !f.label.is_empty()) {
        assert_eq!(field.outcome, FieldOutcome::AlreadySet, "{}", field.label);
    }
}

#[tokio::test]
async fn failed_generation_skips_only_the_open_question() {
    let scope = application_scope();
    let page = FakePage::from_scope(&scope);
    let session = AutofillSession::new(&config(), profile(), Arc::new(Broken));

    let report = session.fill_scope(&scope, &page, CancelFlag::new()).await;

    assert_eq!(report.filled, 5);
    assert_eq!(report.skipped, 2);
    assert_eq!(
        outcome_for(&report, STRENGTH),
        &FieldOutcome::Skipped(SkipReason::GenerationFailed)
    );
    assert!(report.skipped_labels.iter().any(|l| l == STRENGTH));
    assert_eq!(page.state("af-8").value, "");
    assert_eq!(page.state("af-0").value, "a@b.com");
}

#[tokio::test]
async fn cancelling_mid_run_returns_a_partial_report() {
    let scope = application_scope();
    let cancel = CancelFlag::new();
    let page = FakePage {
        cancel_on_clear: Some(cancel.clone()),
        ..FakePage::from_scope(&scope)
    };
    let session = AutofillSession::new(&config(), profile(), canned());

    let report = session.fill_scope(&scope, &page, cancel).await;

    assert!(report.cancelled);
    assert_eq!(report.fields.len(), 1);
    assert_eq!(report.filled, 1);
    assert_eq!(page.state("af-0").value, "a@b.com");
    assert_eq!(page.state("af-1").value, "");
}

#[tokio::test]
async fn vanished_control_is_a_field_mismatch_not_a_run_failure() {
    let scope = application_scope();
    let page = FakePage::from_scope(&scope);
    page.states.lock().unwrap().remove("af-1");
    let session = AutofillSession::new(&config(), profile(), canned());

    let report = session.fill_scope(&scope, &page, CancelFlag::new()).await;

    assert_eq!(report.mismatched, 1);
    assert_eq!(report.mismatched_labels, vec!["First name".to_string()]);
    assert_eq!(report.filled, 5);
    assert_eq!(page.state("af-0").value, "a@b.com");
}

#[tokio::test]
async fn multi_line_answer_in_a_single_line_input_is_not_a_mismatch() {
    let scope = FormScope::from_candidate(SelectionCandidate {
        scope_id: "scope-1".into(),
        tag: "form".into(),
        rect: Rect::default(),
        controls: vec![RawControl {
            label_by_ref: STRENGTH.into(),
            ..at("af-0", 0, "input", "text", 0.0, 10.0)
        }],
    })
    .unwrap();
    let page = FakePage::from_scope(&scope);
    let generator = Arc::new(Canned {
        answer: "Adaptability.\nFast learning.",
        calls: AtomicUsize::new(0),
    });
    let session = AutofillSession::new(&config(), profile(), generator);

    let report = session.fill_scope(&scope, &page, CancelFlag::new()).await;

    assert_eq!(report.mismatched, 0, "{report:#?}");
    assert_eq!(outcome_for(&report, STRENGTH), &FieldOutcome::Filled);
    assert_eq!(page.state("af-0").value, "Adaptability. Fast learning.");

    let again = session.fill_scope(&scope, &page, CancelFlag::new()).await;
    assert_eq!(outcome_for(&again, STRENGTH), &FieldOutcome::AlreadySet);
}

#[tokio::test]
async fn multi_select_adds_profile_values_to_the_existing_selection() {
    let option = |label: &str, value: &str, selected: bool| RawOption {
        label: label.into(),
        value: value.into(),
        selected,
    };
    let scope = FormScope::from_candidate(SelectionCandidate {
        scope_id: "scope-2".into(),
        tag: "form".into(),
        rect: Rect::default(),
        controls: vec![RawControl {
            label_by_ref: "Languages".into(),
            multiple: true,
            options: vec![
                option("English", "en", false),
                option("German", "de", false),
                option("French", "fr", true),
            ],
            ..at("af-0", 0, "select", "select-multiple", 0.0, 10.0)
        }],
    })
    .unwrap();
    let page = FakePage::from_scope(&scope);
    let profile = ProfileRecord::default().with(
        "languages",
        ProfileValue::List(vec!["English".into(), "German".into()]),
    );
    let session = AutofillSession::new(&config(), profile, canned());

    let report = session.fill_scope(&scope, &page, CancelFlag::new()).await;

    assert_eq!(outcome_for(&report, "Languages"), &FieldOutcome::Filled);
    let selected: HashSet<String> = page.state("af-0").selected.into_iter().collect();
    assert_eq!(
        selected,
        ["en", "de", "fr"].iter().map(|v| v.to_string()).collect::<HashSet<_>>()
    );

    let again = session.fill_scope(&scope, &page, CancelFlag::new()).await;
    assert_eq!(outcome_for(&again, "Languages"), &FieldOutcome::AlreadySet);
}
