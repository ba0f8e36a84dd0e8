//! Decides what, if anything, each discovered field should receive.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::discover::{ControlKind, FieldDescriptor};
use crate::profile::{ProfileRecord, ProfileValue};
use crate::text::{contains_phrase, levenshtein_ratio, normalize, similarity};

/// Leading words that mark a label as an open question or prompt.
const QUESTION_CUES: &[&str] = &[
    "what", "why", "how", "which", "who", "when", "where", "describe", "explain", "tell",
    "share", "please", "briefly", "discuss", "give", "provide", "list",
];

/// One synonym table entry: a profile field and the label phrasings that
/// identify it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynonymEntry {
    pub field: String,
    pub phrases: Vec<String>,
}

/// Ordered field → phrase table. Entries are tried in order, so more specific
/// phrasings must come first.
#[derive(Debug, Clone, PartialEq)]
pub struct SynonymTable {
    entries: Vec<(String, Vec<String>)>,
}

impl SynonymTable {
    pub fn new(entries: impl IntoIterator<Item = SynonymEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| {
                let phrases = e
                    .phrases
                    .iter()
                    .map(|p| normalize(p))
                    .filter(|p| !p.is_empty())
                    .collect();
                (e.field, phrases)
            })
            .collect();
        Self { entries }
    }

    /// The first field whose phrases occur in the normalized label.
    pub fn lookup(&self, normalized_label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, phrases)| phrases.iter().any(|p| contains_phrase(normalized_label, p)))
            .map(|(field, _)| field.as_str())
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::new(default_synonyms())
    }
}

/// Built-in table, most specific first ("first name" before "name",
/// "email address" before "address").
pub fn default_synonyms() -> Vec<SynonymEntry> {
    let table: &[(&str, &[&str])] = &[
        ("first_name", &["first name", "given name", "forename"]),
        ("last_name", &["last name", "surname", "family name"]),
        ("email", &["e-mail address", "email address", "email", "e-mail"]),
        ("linkedin", &["linkedin profile", "linkedin url", "linkedin"]),
        ("github", &["github profile", "github url", "github"]),
        ("website", &["personal website", "portfolio", "website"]),
        ("phone", &["phone number", "mobile number", "telephone", "phone", "mobile"]),
        ("current_company", &["current company", "current employer", "company name", "employer"]),
        ("current_title", &["current title", "job title", "current position", "position title"]),
        ("years_experience", &["years of experience", "years experience"]),
        ("university", &["university", "college", "school", "institution"]),
        ("degree_level", &["highest degree", "degree level", "level of education", "education level", "degree"]),
        ("field_of_study", &["field of study", "major", "discipline"]),
        ("graduation_year", &["graduation year", "year of graduation"]),
        ("requires_sponsorship", &["require sponsorship", "visa sponsorship", "sponsorship"]),
        ("work_authorization", &["work authorization", "authorized to work", "work permit"]),
        ("willing_to_relocate", &["willing to relocate", "relocation", "relocate"]),
        ("postal_code", &["postal code", "zip code", "postcode", "zip"]),
        ("address", &["street address", "address line", "address"]),
        ("city", &["city", "town"]),
        ("state", &["state", "province", "region"]),
        ("country", &["country"]),
        ("gender", &["gender"]),
        ("skills", &["technical skills", "skills"]),
        ("languages", &["languages spoken", "spoken languages", "languages"]),
        ("full_name", &["full name", "legal name", "your name", "name"]),
    ];
    table
        .iter()
        .map(|(field, phrases)| SynonymEntry {
            field: field.to_string(),
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        })
        .collect()
}

/// Why a field was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnresolvedReason {
    /// No label text could be found for the control.
    LabelUnavailable,
    /// Matched a profile field but no option was similar enough.
    AmbiguousChoice,
    /// Neither a profile field nor an open question.
    NoMatch,
}

/// Value ready to be written by the executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FillValue {
    Text(String),
    /// Indices into the descriptor's options.
    Options(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Resolution {
    Bound { field: String, value: FillValue },
    Abstract { question: String },
    Unresolved { reason: UnresolvedReason },
}

impl Resolution {
    fn unresolved(reason: UnresolvedReason) -> Self {
        Resolution::Unresolved { reason }
    }
}

#[derive(Debug, Clone)]
pub struct FieldResolver {
    table: SynonymTable,
    similarity_threshold: f64,
    open_prompt_min_len: usize,
}

impl FieldResolver {
    pub fn new(table: SynonymTable, similarity_threshold: f64, open_prompt_min_len: usize) -> Self {
        Self {
            table,
            similarity_threshold,
            open_prompt_min_len,
        }
    }

    pub fn resolve(&self, descriptor: &FieldDescriptor, profile: &ProfileRecord) -> Resolution {
        let label = descriptor.label.trim();
        if label.is_empty() {
            return Resolution::unresolved(UnresolvedReason::LabelUnavailable);
        }
        let normalized = normalize(label);

        if let Some(field) = self.table.lookup(&normalized) {
            match profile.get(field) {
                Some(value) => return self.bind(descriptor, field, value),
                None => debug!(field, label, "label matches a field the profile lacks"),
            }
        }

        if descriptor.kind.is_text() && self.reads_as_question(label, &normalized) {
            return Resolution::Abstract {
                question: descriptor.label.clone(),
            };
        }
        Resolution::unresolved(UnresolvedReason::NoMatch)
    }

    fn bind(&self, descriptor: &FieldDescriptor, field: &str, value: &ProfileValue) -> Resolution {
        if descriptor.kind.is_text() {
            return Resolution::Bound {
                field: field.to_string(),
                value: FillValue::Text(value.as_text()),
            };
        }

        let chosen = self.choose_options(descriptor, value);
        if chosen.is_empty() {
            debug!(field, label = %descriptor.label, "no option close enough to the profile value");
            return Resolution::unresolved(UnresolvedReason::AmbiguousChoice);
        }
        Resolution::Bound {
            field: field.to_string(),
            value: FillValue::Options(chosen),
        }
    }

    /// Option indices to select: the single best one for radio/single-select,
    /// every option clearing the threshold for checkbox/multi-select. An exact
    /// label match always wins over a merely similar one.
    fn choose_options(&self, descriptor: &FieldDescriptor, value: &ProfileValue) -> Vec<usize> {
        let wanted: Vec<String> = value.wanted().into_iter().map(normalize).collect();
        let labels: Vec<String> = descriptor
            .options
            .iter()
            .map(|option| normalize(&option.label))
            .collect();

        if descriptor.kind.is_single_choice() {
            let mut best: Option<(usize, f64, f64)> = None;
            for w in &wanted {
                for (index, label) in labels.iter().enumerate() {
                    let score = similarity(w, label);
                    if score < self.similarity_threshold {
                        continue;
                    }
                    let closeness = levenshtein_ratio(w, label);
                    let better = best.map_or(true, |(_, s, c)| {
                        score > s || (score == s && closeness > c)
                    });
                    if better {
                        best = Some((index, score, closeness));
                    }
                }
            }
            return best.map(|(index, _, _)| vec![index]).unwrap_or_default();
        }

        let mut chosen = BTreeSet::new();
        for w in &wanted {
            let scores: Vec<f64> = labels.iter().map(|label| similarity(w, label)).collect();
            let exact = scores.iter().any(|&score| score >= 1.0);
            chosen.extend(
                scores
                    .iter()
                    .enumerate()
                    .filter(|&(_, &score)| {
                        if exact {
                            score >= 1.0
                        } else {
                            score >= self.similarity_threshold
                        }
                    })
                    .map(|(index, _)| index),
            );
        }
        chosen.into_iter().collect()
    }

    fn reads_as_question(&self, label: &str, normalized: &str) -> bool {
        if label.ends_with('?') {
            return true;
        }
        let starts_with_cue = normalized
            .split(' ')
            .next()
            .is_some_and(|first| QUESTION_CUES.contains(&first));
        starts_with_cue || label.chars().count() >= self.open_prompt_min_len
    }
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self::new(SynonymTable::default(), 0.6, 50)
    }
}
