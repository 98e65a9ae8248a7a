//! Configuration loading and resolution
//!
//! Settings resolve with the priority: CLI argument > environment variable >
//! TOML config file > compiled default. The TOML file lives at
//! `~/.config/landmark-finder/config.toml` (platform equivalent elsewhere).

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

const ENV_DATA_ROOT: &str = "LANDMARK_FINDER_DATA_ROOT";
const ENV_DATABASE: &str = "LANDMARK_FINDER_DATABASE";
const ENV_SUMMARY_API_KEY: &str = "LANDMARK_FINDER_SUMMARY_API_KEY";

/// Raw TOML configuration file contents. All fields optional; missing values
/// fall back to environment/defaults during resolution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub data_root: Option<String>,
    pub database_path: Option<String>,
    pub knowledge_base_endpoint: Option<String>,
    pub facts_endpoint: Option<String>,
    pub image_search_endpoint: Option<String>,
    pub summary_endpoint: Option<String>,
    pub summary_model: Option<String>,
    pub summary_api_key: Option<String>,
    pub classifier_endpoint: Option<String>,
    pub trainer_command: Option<Vec<String>>,
    pub api_timeout_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub min_image_edge: Option<u32>,
    pub images_per_class_target: Option<usize>,
    pub epochs: Option<u32>,
    pub model_name: Option<String>,
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the per-landmark image corpus (`<data_root>/<name>/<n>.jpg`)
    pub data_root: PathBuf,
    pub database_path: PathBuf,
    pub knowledge_base_endpoint: String,
    pub facts_endpoint: String,
    pub image_search_endpoint: String,
    pub summary_endpoint: String,
    pub summary_model: String,
    pub summary_api_key: Option<String>,
    pub classifier_endpoint: String,
    /// External trainer invocation, argv style
    pub trainer_command: Vec<String>,
    pub api_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub user_agent: String,
    /// Candidates smaller than this on either edge are rejected
    pub min_image_edge: u32,
    pub images_per_class_target: usize,
    pub epochs: u32,
    pub model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("landmark-finder"))
            .unwrap_or_else(|| PathBuf::from("./landmark-finder-data"));

        Self {
            data_root: data_dir.join("raw"),
            database_path: data_dir.join("landmark-finder.db"),
            knowledge_base_endpoint: "https://www.wikidata.org/w/api.php".to_string(),
            facts_endpoint: "https://en.wikipedia.org/api/rest_v1/page/summary".to_string(),
            image_search_endpoint: "https://duckduckgo.com".to_string(),
            summary_endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            summary_model: "gemini-2.5-flash".to_string(),
            summary_api_key: None,
            classifier_endpoint: "http://127.0.0.1:8000".to_string(),
            trainer_command: vec!["python".to_string(), "scripts/train_landmarks.py".to_string()],
            api_timeout_secs: 10,
            download_timeout_secs: 15,
            user_agent: "landmark-finder/0.1 (+https://github.com/landmark-finder)".to_string(),
            min_image_edge: 100,
            images_per_class_target: 250,
            epochs: 5,
            model_name: "landmark_resnet18".to_string(),
        }
    }
}

impl Config {
    /// Resolve configuration from TOML + environment + CLI overrides.
    ///
    /// `cli_data_root` and `cli_database` take precedence over everything
    /// else; environment variables beat the TOML file; the compiled defaults
    /// are the fallback.
    pub fn resolve(cli_data_root: Option<&str>, cli_database: Option<&str>) -> Result<Self> {
        let toml_config = match default_config_file() {
            Some(path) if path.exists() => load_toml(&path)?,
            _ => TomlConfig::default(),
        };
        Ok(Self::from_sources(cli_data_root, cli_database, toml_config))
    }

    /// Pure resolution over already-loaded sources (testable without disk)
    pub fn from_sources(
        cli_data_root: Option<&str>,
        cli_database: Option<&str>,
        toml_config: TomlConfig,
    ) -> Self {
        let defaults = Config::default();

        let data_root = cli_data_root
            .map(PathBuf::from)
            .or_else(|| std::env::var(ENV_DATA_ROOT).ok().map(PathBuf::from))
            .or_else(|| toml_config.data_root.as_ref().map(PathBuf::from))
            .unwrap_or(defaults.data_root);

        let database_path = cli_database
            .map(PathBuf::from)
            .or_else(|| std::env::var(ENV_DATABASE).ok().map(PathBuf::from))
            .or_else(|| toml_config.database_path.as_ref().map(PathBuf::from))
            .unwrap_or(defaults.database_path);

        let env_key = std::env::var(ENV_SUMMARY_API_KEY)
            .ok()
            .filter(|k| is_valid_key(k));
        let toml_key = toml_config.summary_api_key.clone().filter(|k| is_valid_key(k));

        let mut key_sources = Vec::new();
        if env_key.is_some() {
            key_sources.push("environment");
        }
        if toml_key.is_some() {
            key_sources.push("TOML");
        }
        warn_on_shadowed_key(&key_sources);

        let summary_api_key = env_key.or(toml_key);

        Self {
            data_root,
            database_path,
            knowledge_base_endpoint: toml_config
                .knowledge_base_endpoint
                .unwrap_or(defaults.knowledge_base_endpoint),
            facts_endpoint: toml_config.facts_endpoint.unwrap_or(defaults.facts_endpoint),
            image_search_endpoint: toml_config
                .image_search_endpoint
                .unwrap_or(defaults.image_search_endpoint),
            summary_endpoint: toml_config
                .summary_endpoint
                .unwrap_or(defaults.summary_endpoint),
            summary_model: toml_config.summary_model.unwrap_or(defaults.summary_model),
            summary_api_key,
            classifier_endpoint: toml_config
                .classifier_endpoint
                .unwrap_or(defaults.classifier_endpoint),
            trainer_command: toml_config
                .trainer_command
                .filter(|cmd| !cmd.is_empty())
                .unwrap_or(defaults.trainer_command),
            api_timeout_secs: toml_config.api_timeout_secs.unwrap_or(defaults.api_timeout_secs),
            download_timeout_secs: toml_config
                .download_timeout_secs
                .unwrap_or(defaults.download_timeout_secs),
            user_agent: toml_config.user_agent.unwrap_or(defaults.user_agent),
            min_image_edge: toml_config.min_image_edge.unwrap_or(defaults.min_image_edge),
            images_per_class_target: toml_config
                .images_per_class_target
                .unwrap_or(defaults.images_per_class_target),
            epochs: toml_config.epochs.unwrap_or(defaults.epochs),
            model_name: toml_config.model_name.unwrap_or(defaults.model_name),
        }
    }

    /// Per-landmark corpus folder
    pub fn landmark_folder(&self, landmark_name: &str) -> PathBuf {
        self.data_root.join(landmark_name)
    }
}

/// Platform config file path (`~/.config/landmark-finder/config.toml` on Linux)
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("landmark-finder").join("config.toml"))
}

fn load_toml(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let parsed = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    Ok(parsed)
}

/// Validate an API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Warn when a key is configured in more than one place
pub fn warn_on_shadowed_key(sources: &[&str]) {
    if sources.len() > 1 {
        warn!(
            "Summary API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.min_image_edge, 100);
        assert_eq!(config.images_per_class_target, 250);
        assert_eq!(config.api_timeout_secs, 10);
        assert_eq!(config.download_timeout_secs, 15);
    }

    #[test]
    fn test_cli_beats_toml() {
        let toml_config = TomlConfig {
            data_root: Some("/from/toml".to_string()),
            ..Default::default()
        };
        let config = Config::from_sources(Some("/from/cli"), None, toml_config);
        assert_eq!(config.data_root, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_toml_fills_missing() {
        let toml_config = TomlConfig {
            epochs: Some(12),
            model_name: Some("landmark_resnet50".to_string()),
            ..Default::default()
        };
        let config = Config::from_sources(None, None, toml_config);
        assert_eq!(config.epochs, 12);
        assert_eq!(config.model_name, "landmark_resnet50");
        // Untouched fields keep their defaults
        assert_eq!(config.min_image_edge, 100);
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key("   "));
        assert!(!is_valid_key(""));
    }

    #[test]
    fn test_landmark_folder() {
        let mut config = Config::default();
        config.data_root = PathBuf::from("/data/raw");
        assert_eq!(
            config.landmark_folder("eiffel_tower"),
            PathBuf::from("/data/raw/eiffel_tower")
        );
    }
}
