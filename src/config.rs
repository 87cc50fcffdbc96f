//! Configuration for fitplan runs.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (FITPLAN_MODEL, FITPLAN_BASE_URL, FITPLAN_MAX_ATTEMPTS)
//! 2. Config file (.fitplan/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .fitplan/config.yaml
//! - Falls back to ~/.fitplan/config.yaml
//! - `prompts_dir` is relative to the directory containing .fitplan/

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::retry::RetryPolicy;
use crate::core::safety::SafetyLimits;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".fitplan";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub safety: Option<SafetyLimits>,
    #[serde(default)]
    pub evaluation: EvaluationSection,
    pub prompts_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSection {
    pub base_url: Option<String>,
    pub name: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationSection {
    pub enabled: Option<bool>,
}

/// Model backend settings after defaults and overrides
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSettings {
    pub base_url: String,
    pub name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub api_key_env: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            name: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_seconds: 60,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedConfig {
    pub model: ModelSettings,
    pub retry: RetryPolicy,
    pub safety: SafetyLimits,
    /// Run the optional Evaluation stage
    pub evaluation_enabled: bool,
    /// Directory with per-stage prompt overrides
    pub prompts_dir: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.model.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model.timeout_seconds)
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    let home_config = dirs::home_dir()?.join(CONFIG_DIR).join(CONFIG_FILE);
    home_config.exists().then_some(home_config)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge file settings, then environment overrides, over the defaults
fn resolve<F>(config_file: Option<PathBuf>, file: ConfigFile, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = ModelSettings::default();
    let mut model = ModelSettings {
        base_url: file.model.base_url.unwrap_or(defaults.base_url),
        name: file.model.name.unwrap_or(defaults.name),
        temperature: file.model.temperature.unwrap_or(defaults.temperature),
        timeout_seconds: file.model.timeout_seconds.unwrap_or(defaults.timeout_seconds),
        api_key_env: file.model.api_key_env.unwrap_or(defaults.api_key_env),
    };
    let mut retry = file.retry.unwrap_or_default();

    if let Some(name) = env("FITPLAN_MODEL") {
        model.name = name;
    }
    if let Some(base_url) = env("FITPLAN_BASE_URL") {
        model.base_url = base_url;
    }
    if let Some(attempts) = env("FITPLAN_MAX_ATTEMPTS") {
        retry.max_attempts = attempts
            .trim()
            .parse()
            .with_context(|| format!("Invalid FITPLAN_MAX_ATTEMPTS: {}", attempts))?;
    }

    // prompts_dir is relative to the project root (parent of .fitplan/)
    let prompts_dir = file.prompts_dir.map(|dir| {
        let base_dir = config_file
            .as_deref()
            .and_then(Path::parent)
            .and_then(Path::parent)
            .unwrap_or(Path::new("."));
        resolve_path(base_dir, &dir)
    });

    Ok(ResolvedConfig {
        model,
        retry,
        safety: file.safety.unwrap_or_default(),
        evaluation_enabled: file.evaluation.enabled.unwrap_or(false),
        prompts_dir,
        config_file,
    })
}

/// Load configuration, discovering the config file from `dir` upward
pub fn load_config_from(dir: &Path) -> Result<ResolvedConfig> {
    let config_file = find_config_file(dir);
    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve(config_file, file, |key| std::env::var(key).ok())
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(root: &Path, yaml: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        std::fs::write(&path, yaml).unwrap();
        path
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None, ConfigFile::default(), no_env).unwrap();

        assert_eq!(config.model.name, "gpt-4o-mini");
        assert_eq!(config.model.temperature, 0.0);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.safety.max_model_calls, 24);
        assert!(!config.evaluation_enabled);
        assert!(config.prompts_dir.is_none());
    }

    #[test]
    fn test_config_discovered_from_subdirectory() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            r#"
model:
  name: local-model
  base_url: http://localhost:8080
retry:
  max_attempts: 5
evaluation:
  enabled: true
prompts_dir: prompts
"#,
        );
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, path);

        let file = load_config_file(&found).unwrap();
        let config = resolve(Some(found), file, no_env).unwrap();

        assert_eq!(config.model.name, "local-model");
        assert_eq!(config.model.base_url, "http://localhost:8080");
        assert_eq!(config.retry.max_attempts, 5);
        // Unset retry fields keep their defaults
        assert_eq!(config.retry.initial_delay_ms, 100);
        assert!(config.evaluation_enabled);
        assert!(config.prompts_dir.unwrap().ends_with("prompts"));
    }

    #[test]
    fn test_env_overrides_file() {
        let file: ConfigFile = serde_yaml::from_str("model:\n  name: from-file\n").unwrap();
        let env = |key: &str| match key {
            "FITPLAN_MODEL" => Some("from-env".to_string()),
            "FITPLAN_MAX_ATTEMPTS" => Some("1".to_string()),
            _ => None,
        };

        let config = resolve(None, file, env).unwrap();
        assert_eq!(config.model.name, "from-env");
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn test_invalid_env_attempts() {
        let env = |key: &str| (key == "FITPLAN_MAX_ATTEMPTS").then(|| "many".to_string());
        assert!(resolve(None, ConfigFile::default(), env).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "modle:\n  name: typo\n");
        assert!(load_config_file(&path).is_err());
    }

    #[test]
    fn test_load_config_from_dir() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "safety:\n  max_model_calls: 4\n");

        let config = load_config_from(temp.path()).unwrap();
        assert_eq!(config.safety.max_model_calls, 4);
        assert_eq!(config.safety.run_timeout_seconds, 600);
        assert!(config.config_file.is_some());
    }
}
