//! Service configuration and location management.
//!
//! Values are resolved in three layers: built-in defaults, then an optional
//! YAML/JSON file, then `INSIGHT_*` environment variables. API keys never live
//! in the file; [`InsightConfig::llm_client`] reads them from the environment.

use crate::llm::LlmClient;
use crate::query::StatementPolicy;
use crate::storage::BaselineSource;
use crate::types::{InsightError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// SQLite database file backing the schema store
    pub database_path: PathBuf,

    /// Directory uploaded CSV files are saved to
    pub upload_dir: PathBuf,

    /// Directory chart artifacts are written to
    pub artifact_dir: PathBuf,

    /// Relation reloaded on every ingestion cycle, fed by `<upload_dir>/<name>.csv`
    pub baseline_relation: Option<String>,

    /// Language model name; its prefix selects the provider
    pub model: String,

    /// Which statements the executor runs
    pub statement_policy: StatementPolicy,

    /// Bind address for `serve`
    pub host: String,
    pub port: u16,

    /// Largest accepted upload, in megabytes
    pub upload_limit_mb: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("dataset.db"),
            upload_dir: PathBuf::from("uploads"),
            artifact_dir: PathBuf::from("static"),
            baseline_relation: None,
            model: "gemini-pro".to_string(),
            statement_policy: StatementPolicy::Unrestricted,
            host: "127.0.0.1".to_string(),
            port: 5000,
            upload_limit_mb: 50,
        }
    }
}

impl InsightConfig {
    /// Load configuration.
    ///
    /// # Arguments
    ///
    /// * `file` - Optional YAML or JSON config file (JSON is valid YAML)
    ///
    /// # Errors
    ///
    /// Returns `InsightError::ConfigError` if the file cannot be parsed or an
    /// environment override holds an invalid value
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.expand_paths()?;
        Ok(config)
    }

    /// Parse a config file without applying environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            InsightError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| InsightError::ConfigError(format!("Invalid config: {}", e)))
    }

    /// Apply `INSIGHT_*` overrides from `lookup`.
    ///
    /// Taking the lookup as a closure keeps tests off the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("INSIGHT_DB_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("INSIGHT_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("INSIGHT_ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("INSIGHT_BASELINE_RELATION") {
            let v = v.trim();
            self.baseline_relation = (!v.is_empty()).then(|| v.to_string());
        }
        if let Some(v) = lookup("INSIGHT_LLM_MODEL") {
            self.model = v;
        }
        if let Some(v) = lookup("INSIGHT_STATEMENT_POLICY") {
            self.statement_policy = v.parse()?;
        }
        if let Some(v) = lookup("INSIGHT_HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("INSIGHT_PORT") {
            self.port = parse_number("INSIGHT_PORT", &v)?;
        }
        if let Some(v) = lookup("INSIGHT_UPLOAD_LIMIT_MB") {
            self.upload_limit_mb = parse_number("INSIGHT_UPLOAD_LIMIT_MB", &v)?;
        }
        Ok(())
    }

    fn expand_paths(&mut self) -> Result<()> {
        self.database_path = expand(&self.database_path)?;
        self.upload_dir = expand(&self.upload_dir)?;
        self.artifact_dir = expand(&self.artifact_dir)?;
        Ok(())
    }

    /// Baseline relation and its source file, if one is configured.
    pub fn baseline(&self) -> Option<BaselineSource> {
        self.baseline_relation
            .as_deref()
            .map(|name| BaselineSource::in_dir(&self.upload_dir, name))
    }

    /// Build the language-model client for the configured model.
    ///
    /// # Errors
    ///
    /// Returns `InsightError::ConfigError` if the provider's API key is not set
    pub fn llm_client(&self) -> Result<LlmClient> {
        LlmClient::from_env(&self.model)
    }

    /// Upload limit in bytes.
    pub fn upload_limit_bytes(&self) -> usize {
        self.upload_limit_mb.saturating_mul(1024 * 1024)
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| InsightError::ConfigError(format!("{} must be a number, got '{}'", key, value)))
}

fn expand(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .map_err(|e| InsightError::ConfigError(format!("cannot expand {}: {}", raw, e)))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = InsightConfig::default();
        assert_eq!(config.database_path, PathBuf::from("dataset.db"));
        assert_eq!(config.model, "gemini-pro");
        assert_eq!(config.statement_policy, StatementPolicy::Unrestricted);
        assert_eq!(config.bind_addr(), "127.0.0.1:5000");
        assert!(config.baseline().is_none());
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("insight.yaml");
        fs::write(
            &file,
            "model: gpt-4o-mini\nbaseline_relation: heart\nupload_dir: /data/uploads\nport: 8080\n",
        )
        .unwrap();

        let mut config = InsightConfig::from_file(&file).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.port, 8080);
        assert_eq!(config.artifact_dir, PathBuf::from("static"));

        config
            .apply_env(env(&[
                ("INSIGHT_PORT", "9000"),
                ("INSIGHT_STATEMENT_POLICY", "read_only"),
            ]))
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.statement_policy, StatementPolicy::ReadOnly);

        let baseline = config.baseline().unwrap();
        assert_eq!(baseline.relation, "heart");
        assert_eq!(baseline.path, PathBuf::from("/data/uploads/heart.csv"));
    }

    #[test]
    fn test_json_file_is_accepted() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("insight.json");
        fs::write(&file, r#"{"statement_policy": "read_only", "upload_limit_mb": 5}"#).unwrap();

        let config = InsightConfig::from_file(&file).unwrap();
        assert_eq!(config.statement_policy, StatementPolicy::ReadOnly);
        assert_eq!(config.upload_limit_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = InsightConfig::default();
        let result = config.apply_env(env(&[("INSIGHT_PORT", "lots")]));
        assert!(matches!(result, Err(InsightError::ConfigError(_))));

        let result = config.apply_env(env(&[("INSIGHT_STATEMENT_POLICY", "anything-goes")]));
        assert!(matches!(result, Err(InsightError::ConfigError(_))));
    }

    #[test]
    fn test_blank_baseline_clears_it() {
        let mut config = InsightConfig {
            baseline_relation: Some("heart".to_string()),
            ..Default::default()
        };
        config.apply_env(env(&[("INSIGHT_BASELINE_RELATION", " ")])).unwrap();
        assert!(config.baseline().is_none());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("broken.yaml");
        fs::write(&file, "port: [not, a, number]\n").unwrap();
        assert!(matches!(
            InsightConfig::from_file(&file),
            Err(InsightError::ConfigError(_))
        ));
    }
}
