//! TOML configuration with environment overrides.
//!
//! The file is optional: when it does not exist every section falls back to
//! its defaults, and the environment variables listed in [`apply_env`] are
//! layered on top. This lets the server run from a `.env`-style deployment
//! with no config file at all.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub lead: LeadConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Business name used in the assistant persona and lead emails.
    #[serde(default = "default_business_name")]
    pub business_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            business_name: default_business_name(),
        }
    }
}

fn default_app_name() -> String {
    "OveloAI API".to_string()
}
fn default_business_name() -> String {
    "OveloAI".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_db")]
    pub db_path: PathBuf,
    #[serde(default = "default_docs_root")]
    pub docs_root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            db_path: default_knowledge_db(),
            docs_root: default_docs_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
            top_k: default_top_k(),
        }
    }
}

fn default_knowledge_db() -> PathBuf {
    PathBuf::from("data/knowledge.sqlite")
}
fn default_docs_root() -> PathBuf {
    PathBuf::from("knowledge_base")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}
fn default_chunk_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}
fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_provider")]
    pub provider: String,
    #[serde(default = "default_generator_url")]
    pub url: String,
    #[serde(default = "default_generator_model")]
    pub model: String,
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_generator_provider(),
            url: default_generator_url(),
            model: default_generator_model(),
            timeout_secs: default_generator_timeout(),
        }
    }
}

fn default_generator_provider() -> String {
    "ollama".to_string()
}
fn default_generator_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_generator_model() -> String {
    "phi3:mini".to_string()
}
fn default_generator_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct LeadConfig {
    #[serde(default = "default_trigger_phrases")]
    pub trigger_phrases: Vec<String>,
}

impl Default for LeadConfig {
    fn default() -> Self {
        Self {
            trigger_phrases: default_trigger_phrases(),
        }
    }
}

fn default_trigger_phrases() -> Vec<String> {
    [
        "price", "quote", "cost", "contact", "talk to", "meeting", "schedule",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Mailbox that receives lead notifications.
    #[serde(default)]
    pub receiver: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: default_smtp_port(),
            username: None,
            password: None,
            receiver: None,
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

impl SmtpConfig {
    /// True when server, username, password and receiver are all set and non-empty.
    pub fn is_complete(&self) -> bool {
        [&self.server, &self.username, &self.password, &self.receiver]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// is absent, then apply environment overrides and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        Config::default()
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Layer environment variables over the parsed file.
///
/// `lookup` is injected so tests don't have to mutate the process
/// environment.
pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("SMTP_SERVER") {
        config.smtp.server = Some(v);
    }
    if let Some(v) = lookup("SMTP_PORT") {
        config.smtp.port = v
            .parse()
            .with_context(|| format!("SMTP_PORT is not a valid port: '{}'", v))?;
    }
    if let Some(v) = lookup("SMTP_USERNAME") {
        config.smtp.username = Some(v);
    }
    if let Some(v) = lookup("SMTP_PASSWORD") {
        config.smtp.password = Some(v);
    }
    if let Some(v) = lookup("RECEIVER_EMAIL") {
        config.smtp.receiver = Some(v);
    }
    if let Some(v) = lookup("OLLAMA_HOST") {
        config.generator.url = v;
    }
    if let Some(v) = lookup("OLLAMA_MODEL") {
        config.generator.model = v;
    }
    if let Some(v) = lookup("KNOWLEDGE_DB_PATH") {
        config.knowledge.db_path = PathBuf::from(v);
    }
    if let Some(v) = lookup("CONCIERGE_BIND") {
        config.server.bind = v;
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    let knowledge = &config.knowledge;
    if knowledge.chunk_chars == 0 {
        bail!("knowledge.chunk_chars must be > 0");
    }
    if knowledge.overlap_chars >= knowledge.chunk_chars {
        bail!("knowledge.overlap_chars must be smaller than knowledge.chunk_chars");
    }
    if knowledge.top_k == 0 {
        bail!("knowledge.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.generator.provider.as_str() {
        "ollama" | "openai" => {}
        other => bail!(
            "Unknown generator provider: '{}'. Must be ollama or openai.",
            other
        ),
    }

    if config.lead.trigger_phrases.iter().all(|p| p.trim().is_empty()) {
        bail!("lead.trigger_phrases must contain at least one phrase");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_shipped_behaviour() {
        let cfg = Config::default();
        assert_eq!(cfg.knowledge.top_k, 3);
        assert_eq!(cfg.knowledge.chunk_chars, 1000);
        assert_eq!(cfg.knowledge.overlap_chars, 200);
        assert_eq!(cfg.generator.model, "phi3:mini");
        assert_eq!(cfg.smtp.port, 587);
        assert_eq!(cfg.lead.trigger_phrases.len(), 7);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg = parse_config(
            r#"
[server]
bind = "127.0.0.1:9000"

[lead]
trigger_phrases = ["demo"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert_eq!(cfg.lead.trigger_phrases, vec!["demo".to_string()]);
        assert_eq!(cfg.knowledge.top_k, 3);
        assert_eq!(cfg.embedding.provider, "local");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SMTP_SERVER", "smtp.example.com"),
            ("SMTP_PORT", "2525"),
            ("SMTP_USERNAME", "bot@example.com"),
            ("SMTP_PASSWORD", "secret"),
            ("RECEIVER_EMAIL", "sales@example.com"),
            ("OLLAMA_HOST", "http://10.0.0.5:11434"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        apply_env(&mut cfg, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.smtp.port, 2525);
        assert_eq!(cfg.generator.url, "http://10.0.0.5:11434");
        assert!(cfg.smtp.is_complete());
    }

    #[test]
    fn test_bad_smtp_port_rejected() {
        let mut cfg = Config::default();
        let err = apply_env(&mut cfg, |k| (k == "SMTP_PORT").then(|| "abc".to_string()));
        assert!(err.is_err());
    }

    #[test]
    fn test_incomplete_smtp() {
        let mut cfg = Config::default();
        cfg.smtp.server = Some("smtp.example.com".into());
        cfg.smtp.username = Some("bot".into());
        cfg.smtp.password = Some(String::new());
        cfg.smtp.receiver = Some("sales@example.com".into());
        assert!(!cfg.smtp.is_complete());
    }

    #[test]
    fn test_validation_rejects_overlap_ge_chunk() {
        let mut cfg = Config::default();
        cfg.knowledge.overlap_chars = 1000;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_providers() {
        let mut cfg = Config::default();
        cfg.embedding.provider = "magic".into();
        assert!(validate(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.generator.provider = "magic".into();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_remote_embedding_requires_model_and_dims() {
        let mut cfg = Config::default();
        cfg.embedding.provider = "ollama".into();
        assert!(validate(&cfg).is_err());
        cfg.embedding.model = Some("nomic-embed-text".into());
        cfg.embedding.dims = Some(768);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.knowledge.top_k, 3);
    }

    #[test]
    fn test_example_config_parses() {
        let cfg = parse_config(include_str!("../config/concierge.example.toml")).unwrap();
        assert!(validate(&cfg).is_ok());
        assert_eq!(cfg.generator.model, "phi3:mini");
        assert_eq!(cfg.lead.trigger_phrases.len(), 7);
        assert!(!cfg.smtp.is_complete());
    }
}
