use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use vector_surfer_core::analysis::AnalysisSettings;

/// Name that always refers to the `[db]` store.
pub const DEFAULT_STORE: &str = "default";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Additional named stores, selectable with `--store <name>` or
    /// `?store=<name>`.
    #[serde(default)]
    pub stores: BTreeMap<String, DbConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    0
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
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}
fn default_max_entries() -> usize {
    100
}

impl Config {
    /// Database path for a store name; `None` selects `[db]`.
    pub fn store_path(&self, name: Option<&str>) -> Result<&Path> {
        match name {
            None | Some(DEFAULT_STORE) => Ok(&self.db.path),
            Some(name) => self
                .stores
                .get(name)
                .map(|s| s.path.as_path())
                .ok_or_else(|| anyhow::anyhow!("unknown store: '{}'", name)),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let a = &config.analysis;
    for (name, value) in [
        ("analysis.drift_threshold", a.drift_threshold),
        ("analysis.coverage_threshold", a.coverage_threshold),
    ] {
        if !(0.0..=2.0).contains(&value) {
            anyhow::bail!("{} must be in [0.0, 2.0]", name);
        }
    }
    if a.drift_window < 2 {
        anyhow::bail!("analysis.drift_window must be >= 2");
    }
    if a.drift_neighbors == 0 || a.hallucination_neighbors == 0 {
        anyhow::bail!("analysis neighbor counts must be > 0");
    }
    if a.bottleneck_factor <= 0.0 {
        anyhow::bail!("analysis.bottleneck_factor must be > 0");
    }
    if a.simulate_population == 0 || a.reference_limit == 0 {
        anyhow::bail!("analysis.simulate_population and analysis.reference_limit must be > 0");
    }

    if config.stores.contains_key(DEFAULT_STORE) {
        anyhow::bail!(
            "stores.{} is reserved for [db]; pick another store name",
            DEFAULT_STORE
        );
    }

    if config.cache.max_entries == 0 {
        anyhow::bail!("cache.max_entries must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse("[db]\npath = \"./data/vsurf.sqlite\"\n").unwrap();
        assert_eq!(cfg.analysis, AnalysisSettings::default());
        assert_eq!(cfg.analysis.drift_threshold, 0.3);
        assert_eq!(cfg.server.bind, "127.0.0.1:7340");
        assert_eq!(cfg.cache.ttl_secs, 300);
        assert_eq!(cfg.cache.max_entries, 100);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.embedding.max_retries, 0);
    }

    #[test]
    fn test_analysis_overrides_and_named_stores() {
        let cfg = parse(
            r#"
[db]
path = "main.sqlite"

[analysis]
drift_threshold = 0.45
bottleneck_factor = 1.5

[stores.staging]
path = "staging.sqlite"
"#,
        )
        .unwrap();
        assert_eq!(cfg.analysis.drift_threshold, 0.45);
        assert_eq!(cfg.analysis.drift_window, 10);
        assert_eq!(cfg.analysis.bottleneck_factor, 1.5);
        assert_eq!(
            cfg.store_path(Some("staging")).unwrap(),
            Path::new("staging.sqlite")
        );
        assert_eq!(cfg.store_path(None).unwrap(), Path::new("main.sqlite"));
        assert!(cfg.store_path(Some("prod")).is_err());
    }

    #[test]
    fn test_store_named_default_rejected() {
        let err = parse(
            "[db]\npath = \"main.sqlite\"\n[stores.default]\npath = \"other.sqlite\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("reserved"));

        let cfg = parse("[db]\npath = \"main.sqlite\"\n").unwrap();
        assert_eq!(
            cfg.store_path(Some(DEFAULT_STORE)).unwrap(),
            Path::new("main.sqlite")
        );
    }

    #[test]
    fn test_enabled_provider_requires_model_and_dims() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\nmodel = \"m\"\ndims = 3\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_small_drift_window_rejected() {
        let err = parse("[db]\npath = \"x\"\n[analysis]\ndrift_window = 1\n").unwrap_err();
        assert!(err.to_string().contains("drift_window"));
    }
}
