use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::browser::AutofillBrowser;
use crate::error::{Error, Result};
use crate::fill::TypingCadence;
use crate::generate::GenerationSettings;
use crate::resolve::{FieldResolver, SynonymEntry, SynonymTable};
use crate::scope::ScopeSelector;

pub struct BrowserConfig {
    /// Form filling is interactive, so a visible window is the default.
    pub headless: bool,
    pub stealth: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub chrome_path: Option<String>,
    /// Default timeout for operations like `wait_for_selector` (default: 30s).
    pub default_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            stealth: true,
            viewport_width: 1280,
            viewport_height: 900,
            chrome_path: None,
            default_timeout: Duration::from_secs(30),
        }
    }
}

pub struct BrowserBuilder {
    config: BrowserConfig,
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self {
            config: BrowserConfig::default(),
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    pub fn stealth(mut self, stealth: bool) -> Self {
        self.config.stealth = stealth;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<String>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn build_config(self) -> BrowserConfig {
        self.config
    }

    pub async fn build(self) -> Result<AutofillBrowser> {
        AutofillBrowser::launch(self.build_config()).await
    }
}

impl Default for BrowserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Run configuration (TOML) ────────────────────────────────────────

/// Everything a fill run treats as constant input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AutofillConfig {
    pub generation: GenerationConfig,
    pub matching: MatchingConfig,
    pub typing: TypingConfig,
    pub selection: SelectionConfig,
    /// Replaces the built-in synonym table when non-empty. Order matters.
    pub synonyms: Vec<SynonymEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub max_length: u32,
    pub creativity: f32,
    pub timeout_secs: u64,
    pub retry_backoff_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            max_length: 500,
            creativity: 0.7,
            timeout_secs: 30,
            retry_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum similarity for an option to count as the profile's choice.
    pub similarity_threshold: f64,
    /// Labels at least this long are treated as open prompts.
    pub open_prompt_min_len: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            open_prompt_min_len: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TypingConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Pause between consecutive fields.
    pub action_delay_ms: u64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 40,
            max_delay_ms: 140,
            action_delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            timeout_secs: 300,
        }
    }
}

impl AutofillConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let threshold = self.matching.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::ConfigError(format!(
                "similarity_threshold must be within 0..=1, got {threshold}"
            )));
        }
        if !(0.0..=2.0).contains(&self.generation.creativity) {
            return Err(Error::ConfigError(format!(
                "creativity must be within 0..=2, got {}",
                self.generation.creativity
            )));
        }
        if let Some(entry) = self.synonyms.iter().find(|e| e.phrases.is_empty()) {
            return Err(Error::ConfigError(format!(
                "synonym entry for '{}' has no phrases",
                entry.field
            )));
        }
        Ok(())
    }

    pub fn resolver(&self) -> FieldResolver {
        let table = if self.synonyms.is_empty() {
            SynonymTable::default()
        } else {
            SynonymTable::new(self.synonyms.clone())
        };
        FieldResolver::new(
            table,
            self.matching.similarity_threshold,
            self.matching.open_prompt_min_len,
        )
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            max_length: self.generation.max_length,
            creativity: self.generation.creativity,
            timeout: Duration::from_secs(self.generation.timeout_secs),
            retry_backoff: Duration::from_millis(self.generation.retry_backoff_ms),
        }
    }

    pub fn cadence(&self) -> TypingCadence {
        TypingCadence::new(
            self.typing.min_delay_ms,
            self.typing.max_delay_ms,
            Duration::from_millis(self.typing.action_delay_ms),
        )
    }

    pub fn scope_selector(&self) -> ScopeSelector {
        ScopeSelector::new(
            Duration::from_millis(self.selection.poll_interval_ms),
            Duration::from_secs(self.selection.timeout_secs),
        )
    }
}
