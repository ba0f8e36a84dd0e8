//! The structured profile record a run fills forms from.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Version of the field-name schema below.
pub const SCHEMA_VERSION: &str = "1";

/// Key carrying the schema marker in a profile file.
const SCHEMA_VERSION_KEY: &str = "schema_version";

/// At most this many list items go into a generation prompt.
const PROMPT_LIST_LIMIT: usize = 10;

/// Shape of a profile field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Choice,
    List,
}

/// Known profile fields, in the order they are summarised for prompts.
pub const SCHEMA: &[(&str, ValueKind)] = &[
    ("full_name", ValueKind::Text),
    ("first_name", ValueKind::Text),
    ("last_name", ValueKind::Text),
    ("email", ValueKind::Text),
    ("phone", ValueKind::Text),
    ("address", ValueKind::Text),
    ("city", ValueKind::Text),
    ("state", ValueKind::Text),
    ("postal_code", ValueKind::Text),
    ("country", ValueKind::Text),
    ("linkedin", ValueKind::Text),
    ("github", ValueKind::Text),
    ("website", ValueKind::Text),
    ("current_company", ValueKind::Text),
    ("current_title", ValueKind::Text),
    ("years_experience", ValueKind::Text),
    ("university", ValueKind::Text),
    ("degree_level", ValueKind::Choice),
    ("field_of_study", ValueKind::Text),
    ("graduation_year", ValueKind::Text),
    ("work_authorization", ValueKind::Choice),
    ("requires_sponsorship", ValueKind::Choice),
    ("willing_to_relocate", ValueKind::Choice),
    ("gender", ValueKind::Choice),
    ("skills", ValueKind::List),
    ("languages", ValueKind::List),
    ("summary", ValueKind::Text),
];

pub fn schema_kind(field: &str) -> Option<ValueKind> {
    SCHEMA
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, kind)| *kind)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileValue {
    Text(String),
    /// A label from a fixed vocabulary, matched against option labels.
    Choice(String),
    List(Vec<String>),
}

impl ProfileValue {
    /// Plain-text rendering used for text controls.
    pub fn as_text(&self) -> String {
        match self {
            ProfileValue::Text(s) | ProfileValue::Choice(s) => s.clone(),
            ProfileValue::List(items) => items.join(", "),
        }
    }

    /// The individual values a choice control should be matched against.
    pub fn wanted(&self) -> Vec<&str> {
        match self {
            ProfileValue::Text(s) | ProfileValue::Choice(s) => vec![s.as_str()],
            ProfileValue::List(items) => items.iter().map(String::as_str).collect(),
        }
    }

    fn coerce(kind: ValueKind, raw: &Value) -> Option<Self> {
        let value = match (kind, raw) {
            (ValueKind::List, Value::Array(items)) => {
                let items: Vec<String> = items.iter().filter_map(scalar_text).collect();
                ProfileValue::List(items)
            }
            (ValueKind::List, other) => ProfileValue::List(scalar_text(other).into_iter().collect()),
            (ValueKind::Text, other) => ProfileValue::Text(scalar_text(other)?),
            (ValueKind::Choice, other) => ProfileValue::Choice(scalar_text(other)?),
        };
        (!value.is_empty()).then_some(value)
    }

    fn is_empty(&self) -> bool {
        match self {
            ProfileValue::Text(s) | ProfileValue::Choice(s) => s.is_empty(),
            ProfileValue::List(items) => items.is_empty(),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "Yes" } else { "No" }.to_string()),
        _ => None,
    }
}

/// Field name to value, restricted to the schema. Read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileRecord {
    schema_version: Option<String>,
    fields: BTreeMap<String, ProfileValue>,
}

impl ProfileRecord {
    /// Load a profile from a `.json` or `.toml` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&raw),
            Some("json") => Self::from_json_str(&raw),
            other => Err(Error::ProfileError(format!(
                "unsupported profile extension {other:?} for {}",
                path.display()
            ))),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| Error::ProfileError(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let table: toml::Value = toml::from_str(raw).map_err(|e| Error::ProfileError(e.to_string()))?;
        let value = serde_json::to_value(table).map_err(|e| Error::ProfileError(e.to_string()))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::ProfileError("profile must be a key/value table".into()));
        };

        let mut record = ProfileRecord::default();
        for (key, raw) in &map {
            if key == SCHEMA_VERSION_KEY {
                record.schema_version = scalar_text(raw);
                continue;
            }
            let Some(kind) = schema_kind(key) else {
                debug!(field = %key, "ignoring field outside the profile schema");
                continue;
            };
            if let Some(value) = ProfileValue::coerce(kind, raw) {
                record.fields.insert(key.clone(), value);
            }
        }

        match record.schema_version.as_deref() {
            Some(SCHEMA_VERSION) => {}
            Some(other) => warn!(found = other, expected = SCHEMA_VERSION, "profile schema version differs"),
            None => warn!(expected = SCHEMA_VERSION, "profile has no schema version marker"),
        }
        if record.fields.is_empty() {
            warn!("profile has no usable fields; only generated answers can be filled");
        }
        Ok(record)
    }

    /// Insert a value, ignoring fields outside the schema.
    pub fn with(mut self, field: &str, value: ProfileValue) -> Self {
        if schema_kind(field).is_some() && !value.is_empty() {
            self.fields.insert(field.to_string(), value);
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&ProfileValue> {
        self.fields.get(field)
    }

    pub fn schema_version(&self) -> Option<&str> {
        self.schema_version.as_deref()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// One `field: value` line per present field, in schema order, with long
    /// lists truncated. Used as generation context.
    pub fn compact_summary(&self) -> String {
        let mut lines = Vec::new();
        for (name, _) in SCHEMA {
            let Some(value) = self.fields.get(*name) else {
                continue;
            };
            let rendered = match value {
                ProfileValue::List(items) => items
                    .iter()
                    .take(PROMPT_LIST_LIMIT)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
                other => other.as_text(),
            };
            lines.push(format!("{name}: {rendered}"));
        }
        lines.join("\n")
    }
}
