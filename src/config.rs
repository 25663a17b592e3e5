//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all, see [`load_config_or_default`]) yields a working stub-backed server
//! on `127.0.0.1:8000`.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8000"
//! allowed_origins = ["http://localhost:3000"]
//! hide_foreign_notes = false
//!
//! [enrichment]
//! backend = "gemini"
//! model = "gemini-2.5-flash"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Browser origins allowed by CORS.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Report another user's note as `404` instead of `403`.
    #[serde(default)]
    pub hide_foreign_notes: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: default_allowed_origins(),
            hide_foreign_notes: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    /// `"stub"` or `"gemini"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

fn default_backend() -> String {
    "stub".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_temperature() -> f64 {
    0.1
}
fn default_top_p() -> f64 {
    0.8
}
fn default_top_k() -> u32 {
    40
}
fn default_max_output_tokens() -> u32 {
    2048
}

impl EnrichmentConfig {
    pub fn is_stub(&self) -> bool {
        self.backend == "stub"
    }
}

/// Parse and validate a TOML config string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate_config(&config)?;
    Ok(config)
}

/// Read, parse and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Like [`load_config`], but a missing file yields [`Config::default`].
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate_config(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        bail!("server.bind must not be empty");
    }

    let e = &config.enrichment;
    match e.backend.as_str() {
        "stub" | "gemini" => {}
        other => bail!(
            "Unknown enrichment backend: '{}'. Must be stub or gemini.",
            other
        ),
    }
    if e.model.trim().is_empty() {
        bail!("enrichment.model must not be empty");
    }
    if e.timeout_secs == 0 {
        bail!("enrichment.timeout_secs must be > 0");
    }
    if !(0.0..=2.0).contains(&e.temperature) {
        bail!("enrichment.temperature must be in [0.0, 2.0]");
    }
    if !(0.0..=1.0).contains(&e.top_p) {
        bail!("enrichment.top_p must be in [0.0, 1.0]");
    }
    if e.max_output_tokens == 0 {
        bail!("enrichment.max_output_tokens must be > 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.server.allowed_origins.len(), 2);
        assert!(!config.server.hide_foreign_notes);
        assert!(config.enrichment.is_stub());
        assert_eq!(config.enrichment.model, "gemini-2.5-flash");
        assert_eq!(config.enrichment.top_k, 40);
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
            [server]
            bind = "0.0.0.0:9000"
            allowed_origins = []
            hide_foreign_notes = true

            [enrichment]
            backend = "gemini"
            model = "gemini-2.0-flash"
            base_url = "http://localhost:9999"
            timeout_secs = 5
            temperature = 0.0
            top_p = 1.0
            top_k = 1
            max_output_tokens = 512
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(config.server.allowed_origins.is_empty());
        assert!(config.server.hide_foreign_notes);
        assert!(!config.enrichment.is_stub());
        assert_eq!(config.enrichment.base_url, "http://localhost:9999");
        assert_eq!(config.enrichment.max_output_tokens, 512);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = parse_config("[enrichment]\nbackend = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown enrichment backend"), "{err}");
    }

    #[test]
    fn test_out_of_range_sampling_rejected() {
        assert!(parse_config("[enrichment]\ntemperature = 3.5\n").is_err());
        assert!(parse_config("[enrichment]\ntop_p = 1.5\n").is_err());
        assert!(parse_config("[enrichment]\ntimeout_secs = 0\n").is_err());
        assert!(parse_config("[enrichment]\nmax_output_tokens = 0\n").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = load_config_or_default(Path::new("/definitely/not/here.toml")).unwrap();
        assert!(config.enrichment.is_stub());
        assert!(load_config(Path::new("/definitely/not/here.toml")).is_err());
    }
}
