//! Configuration loading, validation, and management for QueryLens.
//!
//! Loads configuration from `~/.querylens/config.toml` with environment
//! variable overrides. Validates all settings at startup.

pub mod knowledge;

pub use knowledge::KnowledgeBase;

use querylens_core::{ContextCategory, IntentType, ValidationType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.querylens/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model and embedding endpoint
    #[serde(default)]
    pub model: ModelConfig,

    /// Analysis pipeline settings
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Confidence validator settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Token budget settings
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Per-user preferences keyed by user id
    #[serde(default)]
    pub users: HashMap<String, UserPreferences>,

    /// Replaces the built-in knowledge base when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_path: Option<PathBuf>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "openai" (any OpenAI-compatible endpoint) or "disabled"
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding model; prioritization stays lexical when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Upper bound for a single model call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub temperature: f32,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_timeout_ms() -> u64 {
    8_000
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("timeout_ms", &self.timeout_ms)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            embedding_model: None,
            timeout_ms: default_timeout_ms(),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Entities below this after re-scoring are dropped
    #[serde(default = "default_min_entity_confidence")]
    pub min_entity_confidence: f64,

    /// Best domain score below which the glossary fallback runs
    #[serde(default = "default_low_domain_threshold")]
    pub low_domain_threshold: f64,

    /// Top-two domain gap that triggers disambiguation
    #[serde(default = "default_disambiguation_margin")]
    pub disambiguation_margin: f64,
}

fn default_cache_ttl() -> u64 {
    900
}
fn default_cache_capacity() -> u64 {
    10_000
}
fn default_min_entity_confidence() -> f64 {
    0.6
}
fn default_low_domain_threshold() -> f64 {
    0.3
}
fn default_disambiguation_margin() -> f64 {
    0.1
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
            min_entity_confidence: default_min_entity_confidence(),
            low_domain_threshold: default_low_domain_threshold(),
            disambiguation_margin: default_disambiguation_margin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_intent_threshold")]
    pub intent_threshold: f64,

    #[serde(default = "default_entity_threshold")]
    pub entity_threshold: f64,

    #[serde(default = "default_domain_threshold")]
    pub domain_threshold: f64,

    /// Number of recorded scores in the rolling accuracy average
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Historical accuracy assumed for keys never seen before
    #[serde(default = "default_accuracy")]
    pub default_accuracy: f64,

    /// A validation passes when its weighted score exceeds this
    #[serde(default = "default_valid_score")]
    pub valid_score: f64,
}

fn default_intent_threshold() -> f64 {
    0.7
}
fn default_entity_threshold() -> f64 {
    0.6
}
fn default_domain_threshold() -> f64 {
    0.5
}
fn default_history_window() -> usize {
    20
}
fn default_accuracy() -> f64 {
    0.75
}
fn default_valid_score() -> f64 {
    0.6
}

impl ValidationConfig {
    pub fn threshold(&self, kind: ValidationType) -> f64 {
        match kind {
            ValidationType::Intent => self.intent_threshold,
            ValidationType::Entity => self.entity_threshold,
            ValidationType::Domain => self.domain_threshold,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            intent_threshold: default_intent_threshold(),
            entity_threshold: default_entity_threshold(),
            domain_threshold: default_domain_threshold(),
            history_window: default_history_window(),
            default_accuracy: default_accuracy(),
            valid_score: default_valid_score(),
        }
    }
}

/// One value per context category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    #[serde(default = "one")]
    pub schema: f64,
    #[serde(default = "one")]
    pub business: f64,
    #[serde(default = "one")]
    pub examples: f64,
    #[serde(default = "one")]
    pub rules: f64,
    #[serde(default = "one")]
    pub glossary: f64,
}

fn one() -> f64 {
    1.0
}

impl CategoryWeights {
    pub const NEUTRAL: CategoryWeights = CategoryWeights::new(1.0, 1.0, 1.0, 1.0, 1.0);

    pub const fn new(schema: f64, business: f64, examples: f64, rules: f64, glossary: f64) -> Self {
        Self {
            schema,
            business,
            examples,
            rules,
            glossary,
        }
    }

    pub fn get(&self, category: ContextCategory) -> f64 {
        match category {
            ContextCategory::Schema => self.schema,
            ContextCategory::BusinessContext => self.business,
            ContextCategory::Examples => self.examples,
            ContextCategory::Rules => self.rules,
            ContextCategory::Glossary => self.glossary,
        }
    }

    pub fn sum(&self) -> f64 {
        ContextCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Token counts per category for the fixed minimal budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTokens {
    pub schema: usize,
    pub business: usize,
    pub examples: usize,
    pub rules: usize,
    pub glossary: usize,
}

impl CategoryTokens {
    pub fn get(&self, category: ContextCategory) -> usize {
        match category {
            ContextCategory::Schema => self.schema,
            ContextCategory::BusinessContext => self.business,
            ContextCategory::Examples => self.examples,
            ContextCategory::Rules => self.rules,
            ContextCategory::Glossary => self.glossary,
        }
    }

    pub fn total(&self) -> usize {
        ContextCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

impl Default for CategoryTokens {
    fn default() -> Self {
        Self {
            schema: 400,
            business: 200,
            examples: 250,
            rules: 150,
            glossary: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_total_tokens")]
    pub default_max_tokens: usize,

    #[serde(default = "default_reserved_tokens")]
    pub default_reserved_tokens: usize,

    /// Fixed cost of the system preamble
    #[serde(default = "default_system_prompt_tokens")]
    pub system_prompt_tokens: usize,

    /// Fixed cost of headers and closing instructions
    #[serde(default = "default_template_tokens")]
    pub template_tokens: usize,

    /// Used when nothing is left for context
    #[serde(default)]
    pub minimal: CategoryTokens,

    /// Category percentages keyed by intent name; each row sums to 1.0
    #[serde(default = "default_intent_allocations")]
    pub intent_allocations: BTreeMap<String, CategoryWeights>,

    /// Category multipliers keyed by domain name
    #[serde(default = "default_domain_multipliers")]
    pub domain_multipliers: BTreeMap<String, CategoryWeights>,
}

fn default_max_total_tokens() -> usize {
    8192
}
fn default_reserved_tokens() -> usize {
    1024
}
fn default_system_prompt_tokens() -> usize {
    180
}
fn default_template_tokens() -> usize {
    60
}

fn default_intent_allocations() -> BTreeMap<String, CategoryWeights> {
    [
        (IntentType::Aggregation, CategoryWeights::new(0.35, 0.20, 0.25, 0.12, 0.08)),
        (IntentType::Trend, CategoryWeights::new(0.30, 0.20, 0.25, 0.15, 0.10)),
        (IntentType::Comparison, CategoryWeights::new(0.30, 0.25, 0.20, 0.15, 0.10)),
        (IntentType::Detail, CategoryWeights::new(0.45, 0.15, 0.20, 0.12, 0.08)),
        (IntentType::Exploratory, CategoryWeights::new(0.25, 0.35, 0.15, 0.10, 0.15)),
        (IntentType::Operational, CategoryWeights::new(0.35, 0.20, 0.20, 0.18, 0.07)),
        (IntentType::Analytical, CategoryWeights::new(0.30, 0.25, 0.20, 0.15, 0.10)),
    ]
    .into_iter()
    .map(|(intent, weights)| (intent.as_str().to_string(), weights))
    .collect()
}

fn default_domain_multipliers() -> BTreeMap<String, CategoryWeights> {
    BTreeMap::from([
        ("Banking".to_string(), CategoryWeights::new(1.0, 1.0, 0.8, 1.5, 1.0)),
        ("Gaming".to_string(), CategoryWeights::new(1.0, 1.2, 1.0, 1.0, 1.1)),
        ("Finance".to_string(), CategoryWeights::new(1.0, 1.0, 1.0, 1.3, 1.1)),
    ])
}

impl BudgetConfig {
    /// Category percentages for an intent; unknown intents use `analytical`.
    pub fn allocation(&self, intent: IntentType) -> CategoryWeights {
        self.intent_allocations
            .get(intent.as_str())
            .or_else(|| self.intent_allocations.get(IntentType::Analytical.as_str()))
            .copied()
            .unwrap_or(CategoryWeights::new(0.30, 0.25, 0.20, 0.15, 0.10))
    }

    pub fn domain_multiplier(&self, domain: &str) -> CategoryWeights {
        self.domain_multipliers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(domain))
            .map(|(_, w)| *w)
            .unwrap_or(CategoryWeights::NEUTRAL)
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_total_tokens(),
            default_reserved_tokens: default_reserved_tokens(),
            system_prompt_tokens: default_system_prompt_tokens(),
            template_tokens: default_template_tokens(),
            minimal: CategoryTokens::default(),
            intent_allocations: default_intent_allocations(),
            domain_multipliers: default_domain_multipliers(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Multipliers applied on top of intent and domain allocations
    #[serde(default)]
    pub category_multipliers: CategoryWeights,

    /// Replaces a `General` or low-confidence domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_domain: Option<String>,

    /// Added to a business term's relevance (result clamped to 1.0)
    #[serde(default)]
    pub term_boosts: HashMap<String, f64>,
}

impl AppConfig {
    /// Load configuration from the default path with env overrides.
    ///
    /// Priority: env vars > config file > defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.model.api_key.is_none() {
            config.model.api_key = std::env::var("QUERYLENS_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("QUERYLENS_MODEL") {
            config.model.model = model;
        }

        if let Ok(base_url) = std::env::var("QUERYLENS_BASE_URL") {
            config.model.base_url = base_url;
        }

        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".querylens")
    }

    /// The knowledge base named by `knowledge_path`, or the built-in one.
    pub fn knowledge(&self) -> Result<KnowledgeBase, ConfigError> {
        match &self.knowledge_path {
            Some(path) => KnowledgeBase::load_from(path),
            None => Ok(KnowledgeBase::builtin()),
        }
    }

    pub fn user(&self, user_id: &str) -> Option<&UserPreferences> {
        self.users.get(user_id)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "model.timeout_ms must be > 0".into(),
            ));
        }

        for (name, value) in [
            ("validation.intent_threshold", self.validation.intent_threshold),
            ("validation.entity_threshold", self.validation.entity_threshold),
            ("validation.domain_threshold", self.validation.domain_threshold),
            ("validation.default_accuracy", self.validation.default_accuracy),
            ("analysis.min_entity_confidence", self.analysis.min_entity_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) || (value == 0.0 && name.ends_with("threshold")) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be within (0, 1]"
                )));
            }
        }

        if self.validation.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "validation.history_window must be > 0".into(),
            ));
        }

        for (intent, weights) in &self.budget.intent_allocations {
            if IntentType::parse(intent).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "budget.intent_allocations: unknown intent '{intent}'"
                )));
            }
            if (weights.sum() - 1.0).abs() > 0.01 {
                return Err(ConfigError::ValidationError(format!(
                    "budget.intent_allocations.{intent} must sum to 1.0 (got {:.3})",
                    weights.sum()
                )));
            }
        }

        let multipliers = self
            .budget
            .domain_multipliers
            .values()
            .chain(self.users.values().map(|u| &u.category_multipliers));
        for weights in multipliers {
            if ContextCategory::ALL.iter().any(|c| weights.get(*c) < 0.0) {
                return Err(ConfigError::ValidationError(
                    "category multipliers must be non-negative".into(),
                ));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            analysis: AnalysisConfig::default(),
            validation: ValidationConfig::default(),
            budget: BudgetConfig::default(),
            users: HashMap::new(),
            knowledge_path: None,
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.validation.threshold(ValidationType::Intent), 0.7);
        assert_eq!(config.budget.default_max_tokens, 8192);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.model, config.model.model);
        assert_eq!(parsed.budget.intent_allocations, config.budget.intent_allocations);
    }

    #[test]
    fn every_intent_has_an_allocation_summing_to_one() {
        let budget = BudgetConfig::default();
        for intent in IntentType::ALL {
            let row = budget.allocation(intent);
            assert!((row.sum() - 1.0).abs() < 1e-9, "{intent}: {}", row.sum());
        }
    }

    #[test]
    fn domain_multiplier_lookup_is_case_insensitive() {
        let budget = BudgetConfig::default();
        assert_eq!(budget.domain_multiplier("banking").rules, 1.5);
        assert_eq!(budget.domain_multiplier("Unknown"), CategoryWeights::NEUTRAL);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.model.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn allocation_not_summing_to_one_rejected() {
        let mut config = AppConfig::default();
        config
            .budget
            .intent_allocations
            .insert("trend".into(), CategoryWeights::new(0.5, 0.5, 0.5, 0.0, 0.0));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("trend"));
    }

    #[test]
    fn unknown_intent_allocation_rejected() {
        let mut config = AppConfig::default();
        config
            .budget
            .intent_allocations
            .insert("forecast".into(), CategoryWeights::new(0.2, 0.2, 0.2, 0.2, 0.2));
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model.timeout_ms, 8_000);
    }

    #[test]
    fn api_key_is_redacted() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn user_preferences_parse() {
        let toml_str = r#"
[users.alice]
preferred_domain = "Gaming"

[users.alice.category_multipliers]
examples = 1.5

[users.alice.term_boosts]
ggr = 0.2
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml_str).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        let alice = config.user("alice").unwrap();
        assert_eq!(alice.preferred_domain.as_deref(), Some("Gaming"));
        assert_eq!(alice.category_multipliers.examples, 1.5);
        assert_eq!(alice.category_multipliers.schema, 1.0);
        assert_eq!(alice.term_boosts["ggr"], 0.2);
        assert!(config.user("bob").is_none());
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("[budget.intent_allocations.aggregation]"));
    }

    #[test]
    fn builtin_knowledge_when_no_path() {
        let kb = AppConfig::default().knowledge().unwrap();
        assert!(kb.domain("Banking").is_some());
    }
}
