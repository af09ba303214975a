//! Configuration for the evaluation engine.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{EvalError, Result};
use crate::eval::metrics::DEFAULT_HIT_THRESHOLD;
use crate::eval::results::RunIdentity;
use crate::eval::score::MetricWeights;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// LLM configuration for the judge model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name, or deployment name when talking to Azure OpenAI
    pub model: String,

    /// Azure OpenAI API version. Setting it switches the client to
    /// deployment-style routing with an `api-key` header.
    #[serde(default)]
    pub api_version: Option<String>,

    /// Maximum tokens for response (optional)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation (optional)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4.1".to_string(),
            api_version: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Where the conversational chain under evaluation lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    /// URL accepting `{"question": ...}` and returning the answer with sources.
    pub endpoint: String,

    /// HTTP timeout for the chain client. Unset means no timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Identity and tuning of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: String,
    pub experiment_name: String,
    pub variant: String,
    pub weights: MetricWeights,
    pub hit_threshold: f64,
    pub goldset_path: PathBuf,
    pub output_dir: PathBuf,
    /// Issue the five judge calls of an item concurrently.
    pub concurrent_judges: bool,
    /// Maximum characters of question/answer text echoed into log lines.
    pub log_max_chars: usize,
    /// Evaluate only the first N gold items.
    pub max_items: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: "local-run".to_string(),
            experiment_name: "offline-eval".to_string(),
            variant: "default".to_string(),
            weights: MetricWeights::default(),
            hit_threshold: DEFAULT_HIT_THRESHOLD,
            goldset_path: PathBuf::from("eval/gold_qa.json"),
            output_dir: PathBuf::from("eval/experiments"),
            concurrent_judges: false,
            log_max_chars: 500,
            max_items: None,
        }
    }
}

impl RunConfig {
    /// The `(experiment_name, run_id, variant)` triple stamped on every artifact.
    pub fn identity(&self) -> RunIdentity {
        RunIdentity {
            experiment_name: self.experiment_name.clone(),
            run_id: self.run_id.clone(),
            variant: self.variant.clone(),
        }
    }
}

/// External dataset/experiment registry (Phoenix-compatible).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl RegistryConfig {
    /// Registration only happens when an endpoint is configured.
    pub fn enabled(&self) -> bool {
        self.endpoint.as_deref().is_some_and(|e| !e.trim().is_empty())
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Judge LLM settings
    pub llm: LlmConfig,
    /// Chain under evaluation
    pub chain: ChainConfig,
    /// Run identity and tuning
    pub run: RunConfig,
    /// Dataset registry
    pub registry: RegistryConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    chain: Option<ChainFileSection>,
    run: Option<RunFileSection>,
    registry: Option<RegistryFileSection>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    api_version: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChainFileSection {
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RunFileSection {
    run_id: Option<String>,
    experiment_name: Option<String>,
    variant: Option<String>,
    weights: Option<BTreeMap<String, f64>>,
    hit_threshold: Option<f64>,
    goldset_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    concurrent_judges: Option<bool>,
    log_max_chars: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RegistryFileSection {
    endpoint: Option<String>,
    api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_*, CHAIN_*, EVAL_*, PHOENIX_*)
    /// 2. Config file (~/.config/rag-eval/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env(|key| env::var(key).ok())?;

        Ok(config)
    }

    /// Override fields from an environment-style lookup.
    ///
    /// Unparseable numeric and boolean values are ignored; a malformed
    /// `EVAL_WEIGHTS` document is an error.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base) = lookup("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }
        if let Some(api_key) = lookup("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(version) = lookup("LLM_API_VERSION") {
            self.llm.api_version = Some(version).filter(|v| !v.is_empty());
        }
        if let Some(tokens) = lookup("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.llm.max_tokens = tokens;
        }
        if let Some(temp) = lookup("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.llm.temperature = temp;
        }

        if let Some(endpoint) = lookup("CHAIN_ENDPOINT") {
            self.chain.endpoint = endpoint;
        }
        if let Some(secs) = lookup("CHAIN_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.chain.timeout_secs = Some(secs);
        }

        if let Some(run_id) = lookup("EVAL_RUN_ID").or_else(|| lookup("GIT_COMMIT")) {
            self.run.run_id = run_id;
        }
        if let Some(experiment) = lookup("EVAL_EXPERIMENT") {
            self.run.experiment_name = experiment;
        }
        if let Some(variant) = lookup("EVAL_VARIANT") {
            self.run.variant = variant;
        }
        if let Some(weights) = lookup("EVAL_WEIGHTS") {
            self.run.weights = self.run.weights.with_override_json(&weights)?;
        }
        if let Some(threshold) = lookup("EVAL_HIT_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.run.hit_threshold = threshold;
        }
        if let Some(path) = lookup("EVAL_GOLDSET") {
            self.run.goldset_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("EVAL_OUTPUT_DIR") {
            self.run.output_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("EVAL_CONCURRENT_JUDGES").and_then(|v| parse_flag(&v)) {
            self.run.concurrent_judges = flag;
        }
        if let Some(chars) = lookup("EVAL_LOG_MAX_CHARS").and_then(|v| v.parse().ok()) {
            self.run.log_max_chars = chars;
        }

        if let Some(endpoint) = lookup("PHOENIX_ENDPOINT") {
            self.registry.endpoint = Some(endpoint);
        }
        if let Some(key) = lookup("PHOENIX_API_KEY") {
            self.registry.api_key = Some(key);
        }

        Ok(())
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_yaml(&content)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if llm.api_version.is_some() {
                config.llm.api_version = llm.api_version;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
        }

        if let Some(chain) = file_config.chain {
            if let Some(endpoint) = chain.endpoint {
                config.chain.endpoint = endpoint;
            }
            config.chain.timeout_secs = chain.timeout_secs;
        }

        if let Some(run) = file_config.run {
            if let Some(run_id) = run.run_id {
                config.run.run_id = run_id;
            }
            if let Some(experiment_name) = run.experiment_name {
                config.run.experiment_name = experiment_name;
            }
            if let Some(variant) = run.variant {
                config.run.variant = variant;
            }
            if let Some(weights) = run.weights {
                let mut merged = config.run.weights;
                for (key, value) in &weights {
                    merged.set(key, *value);
                }
                merged.validate()?;
                config.run.weights = merged;
            }
            if let Some(threshold) = run.hit_threshold {
                config.run.hit_threshold = threshold;
            }
            if let Some(path) = run.goldset_path {
                config.run.goldset_path = path;
            }
            if let Some(dir) = run.output_dir {
                config.run.output_dir = dir;
            }
            if let Some(flag) = run.concurrent_judges {
                config.run.concurrent_judges = flag;
            }
            if let Some(chars) = run.log_max_chars {
                config.run.log_max_chars = chars;
            }
        }

        if let Some(registry) = file_config.registry {
            config.registry.endpoint = registry.endpoint;
            config.registry.api_key = registry.api_key;
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-eval")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that the judge model is configured.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(EvalError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(EvalError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(EvalError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.run.hit_threshold) {
            return Err(EvalError::Config(format!(
                "Hit threshold must be within [0, 1], got {}",
                self.run.hit_threshold
            )));
        }

        self.run.weights.validate()
    }

    /// Validate everything `run` needs on top of [`Config::validate`].
    pub fn validate_for_run(&self) -> Result<()> {
        self.validate()?;

        if self.chain.endpoint.is_empty() {
            return Err(EvalError::Config(
                "Chain endpoint is required. Set CHAIN_ENDPOINT environment variable or add to config file.".to_string()
            ));
        }

        if self.run.run_id.trim().is_empty() || self.run.experiment_name.trim().is_empty() {
            return Err(EvalError::Config(
                "Run id and experiment name must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_base.is_empty());
        assert!(config.llm.api_key.is_empty());
        assert_eq!(config.llm.model, "gpt-4.1");
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.run.run_id, "local-run");
        assert_eq!(config.run.experiment_name, "offline-eval");
        assert_eq!(config.run.hit_threshold, 0.5);
        assert!(!config.registry.enabled());
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_for_run_requires_chain_endpoint() {
        let mut config = Config::with_llm("https://api.example.com", "test-key", "gpt-4");
        assert!(config.validate().is_ok());
        assert!(config.validate_for_run().is_err());

        config.chain.endpoint = "http://localhost:8000/chat".to_string();
        assert!(config.validate_for_run().is_ok());
    }

    #[test]
    fn test_with_llm() {
        let config = Config::with_llm("https://api.example.com", "test-key", "gpt-4");
        assert_eq!(config.llm.api_base, "https://api.example.com");
        assert_eq!(config.llm.api_key, "test-key");
        assert_eq!(config.llm.model, "gpt-4");
    }

    #[test]
    fn test_env_overrides_run_identity() {
        let mut config = Config::default();
        config
            .apply_env(lookup_from(&[
                ("EVAL_RUN_ID", "abc123"),
                ("EVAL_EXPERIMENT", "manifesto"),
                ("EVAL_VARIANT", "mmr-k4"),
                ("EVAL_CONCURRENT_JUDGES", "yes"),
                ("PHOENIX_ENDPOINT", "http://127.0.0.1:6006"),
            ]))
            .unwrap();

        assert_eq!(config.run.run_id, "abc123");
        assert_eq!(config.run.experiment_name, "manifesto");
        assert_eq!(config.run.variant, "mmr-k4");
        assert!(config.run.concurrent_judges);
        assert!(config.registry.enabled());
    }

    #[test]
    fn test_run_id_falls_back_to_git_commit() {
        let mut config = Config::default();
        config
            .apply_env(lookup_from(&[("GIT_COMMIT", "deadbeef")]))
            .unwrap();
        assert_eq!(config.run.run_id, "deadbeef");

        let mut config = Config::default();
        config
            .apply_env(lookup_from(&[("GIT_COMMIT", "deadbeef"), ("EVAL_RUN_ID", "explicit")]))
            .unwrap();
        assert_eq!(config.run.run_id, "explicit");
    }

    #[test]
    fn test_env_weights_override_ignores_unknown_keys() {
        let mut config = Config::default();
        config
            .apply_env(lookup_from(&[(
                "EVAL_WEIGHTS",
                r#"{"answer_clarity": 0.5, "latency": 9.0}"#,
            )]))
            .unwrap();

        assert_eq!(config.run.weights.answer_clarity, 0.5);
        assert_eq!(config.run.weights.retrieval_relevance, 0.25);
    }

    #[test]
    fn test_env_malformed_weights_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(lookup_from(&[("EVAL_WEIGHTS", "not json")]))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unparseable_numbers_are_ignored() {
        let mut config = Config::default();
        config
            .apply_env(lookup_from(&[
                ("LLM_MAX_TOKENS", "lots"),
                ("EVAL_HIT_THRESHOLD", "half"),
            ]))
            .unwrap();
        assert_eq!(config.llm.max_tokens, 1024);
        assert_eq!(config.run.hit_threshold, 0.5);
    }

    #[test]
    fn test_yaml_file_sections() {
        let yaml = r#"
llm:
  api_base: https://example.openai.azure.com
  api_key: secret
  model: gpt-4.1
  api_version: 2023-12-01-preview
chain:
  endpoint: http://localhost:8000/chat
run:
  experiment_name: manifesto
  variant: baseline
  weights:
    answer_clarity: 0.3
    unknown_metric: 1.0
registry:
  endpoint: http://127.0.0.1:6006
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.llm.api_version.as_deref(), Some("2023-12-01-preview"));
        assert_eq!(config.chain.endpoint, "http://localhost:8000/chat");
        assert_eq!(config.run.experiment_name, "manifesto");
        assert_eq!(config.run.variant, "baseline");
        assert_eq!(config.run.weights.answer_clarity, 0.3);
        assert_eq!(config.run.run_id, "local-run");
        assert!(config.registry.enabled());
    }

    #[test]
    fn test_identity_from_run_config() {
        let run = RunConfig::default();
        let identity = run.identity();
        assert_eq!(identity.experiment_name, "offline-eval");
        assert_eq!(identity.run_id, "local-run");
        assert_eq!(identity.variant, "default");
    }
}
