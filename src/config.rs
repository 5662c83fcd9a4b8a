//! Configuration for joyful.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (JOYFUL_HOME, provider API keys)
//! 2. Config file (.joyful/config.yaml)
//! 3. Defaults (~/.joyful)
//!
//! Config file discovery:
//! - Searches current directory and parents for .joyful/config.yaml
//! - `paths.home` is relative to the .joyful/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::{PipelineSettings, RetryPolicy, ReviewSettings};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".joyful";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub search: Option<SearchConfig>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub article: Option<ArticleConfig>,
    #[serde(default)]
    pub validation: Option<ValidationConfig>,
    #[serde(default)]
    pub synthesis: Option<SynthesisConfig>,
    #[serde(default)]
    pub image: Option<ImageConfig>,
    #[serde(default)]
    pub review: Option<ReviewConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .joyful/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchConfig {
    pub queries: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub endpoint: Option<String>,
    pub market: Option<String>,
    pub freshness: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleConfig {
    pub enabled: Option<bool>,
    pub min_words: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationConfig {
    pub model: Option<String>,
    pub min_positivity: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SynthesisConfig {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConfig {
    pub model: Option<String>,
    pub aspect_ratio: Option<String>,
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewConfig {
    pub enabled: Option<bool>,
    pub model: Option<String>,
    pub score_threshold: Option<f64>,
    pub max_rounds: Option<u32>,
}

/// Discovery settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSettings {
    pub queries: Vec<String>,
    pub limit: usize,
    /// Overrides the Bing default endpoint
    pub endpoint: Option<String>,
    pub market: String,
    pub freshness: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            queries: [
                "good news",
                "heartwarming story",
                "acts of kindness",
                "community comes together",
            ]
            .iter()
            .map(|q| q.to_string())
            .collect(),
            limit: 50,
            endpoint: None,
            market: "en-US".to_string(),
            freshness: "Day".to_string(),
        }
    }
}

/// Article text fetching
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleSettings {
    pub enabled: bool,
    pub min_words: usize,
    pub timeout_secs: u64,
}

impl Default for ArticleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_words: 300,
            timeout_secs: 10,
        }
    }
}

/// Language-model and image-model settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSettings {
    pub validation_model: String,
    pub min_positivity: f64,
    pub synthesis_model: String,
    pub image_model: String,
    pub aspect_ratio: String,
    pub file_type: String,
    pub review_enabled: bool,
    pub review_model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            validation_model: "gpt-4o-mini".to_string(),
            min_positivity: 0.5,
            synthesis_model: "gpt-4o".to_string(),
            image_model: crate::adapters::replicate::DEFAULT_MODEL.to_string(),
            aspect_ratio: "16:9".to_string(),
            file_type: "png".to_string(),
            review_enabled: false,
            review_model: "gpt-4o".to_string(),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Absolute path to joyful home (artifacts, images, journal)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub search: SearchSettings,
    pub article: ArticleSettings,
    pub retry: RetryPolicy,
    pub models: ModelSettings,
    pub review: ReviewSettings,
}

impl ResolvedConfig {
    /// Defaults rooted at `home`
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            config_file: None,
            search: SearchSettings::default(),
            article: ArticleSettings::default(),
            retry: RetryPolicy::default(),
            models: ModelSettings::default(),
            review: ReviewSettings::default(),
        }
    }

    /// Directory of per-date artifact records
    pub fn artifacts_dir(&self) -> PathBuf {
        self.home.join("artifacts")
    }

    /// Directory generated images are downloaded into
    pub fn images_dir(&self) -> PathBuf {
        self.home.join("images")
    }

    /// Directory of per-date run journals
    pub fn journal_dir(&self) -> PathBuf {
        self.home.join("journal")
    }

    /// Settings handed to the orchestrator
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            queries: self.search.queries.clone(),
            search_limit: self.search.limit,
            min_article_words: self.article.min_words,
            retry: self.retry.clone(),
            review: self.review.clone(),
        }
    }

    /// Overlay a parsed config file onto these settings
    fn apply(&mut self, file: ConfigFile) {
        if let Some(search) = file.search {
            if let Some(queries) = search.queries.filter(|q| !q.is_empty()) {
                self.search.queries = queries;
            }
            if let Some(limit) = search.limit {
                self.search.limit = limit;
            }
            if search.endpoint.is_some() {
                self.search.endpoint = search.endpoint;
            }
            if let Some(market) = search.market {
                self.search.market = market;
            }
            if let Some(freshness) = search.freshness {
                self.search.freshness = freshness;
            }
        }

        if let Some(article) = file.article {
            if let Some(enabled) = article.enabled {
                self.article.enabled = enabled;
            }
            if let Some(min_words) = article.min_words {
                self.article.min_words = min_words;
            }
            if let Some(timeout) = article.timeout_secs {
                self.article.timeout_secs = timeout;
            }
        }

        if let Some(retry) = file.retry {
            self.retry = retry;
        }

        let models = &mut self.models;
        if let Some(validation) = file.validation {
            if let Some(model) = validation.model {
                models.validation_model = model;
            }
            if let Some(min) = validation.min_positivity {
                models.min_positivity = min;
            }
        }
        if let Some(model) = file.synthesis.and_then(|s| s.model) {
            models.synthesis_model = model;
        }
        if let Some(image) = file.image {
            if let Some(model) = image.model {
                models.image_model = model;
            }
            if let Some(aspect_ratio) = image.aspect_ratio {
                models.aspect_ratio = aspect_ratio;
            }
            if let Some(file_type) = image.file_type {
                models.file_type = file_type;
            }
        }
        if let Some(review) = file.review {
            if let Some(enabled) = review.enabled {
                models.review_enabled = enabled;
            }
            if let Some(model) = review.model {
                models.review_model = model;
            }
            if let Some(threshold) = review.score_threshold {
                self.review.score_threshold = threshold;
            }
            if let Some(rounds) = review.max_rounds {
                self.review.max_rounds = rounds.max(1);
            }
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
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

/// Resolve configuration from an optional config file and home override
fn resolve(
    config_file: Option<PathBuf>,
    env_home: Option<PathBuf>,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let Some(config_path) = config_file else {
        return Ok(ResolvedConfig::with_home(env_home.unwrap_or(default_home)));
    };

    let file = load_config_file(&config_path)?;

    let home = match (env_home, file.paths.home.as_deref()) {
        (Some(home), _) => home,
        (None, Some(home_path)) => {
            let joyful_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(joyful_dir, home_path)
        }
        (None, None) => default_home,
    };

    let mut resolved = ResolvedConfig::with_home(home);
    resolved.config_file = Some(config_path);
    resolved.apply(file);
    Ok(resolved)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);
    let env_home = std::env::var("JOYFUL_HOME").ok().map(PathBuf::from);

    resolve(find_config_file(), env_home, default_home)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Whether a provider credential is present in the environment
pub fn has_env(key: &str) -> bool {
    std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(temp: &TempDir, yaml: &str) -> PathBuf {
        let dir = temp.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", yaml).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None, None, PathBuf::from("/home/u/.joyful")).unwrap();

        assert_eq!(config.home, PathBuf::from("/home/u/.joyful"));
        assert!(config.config_file.is_none());
        assert_eq!(config.search.limit, 50);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.artifacts_dir(), PathBuf::from("/home/u/.joyful/artifacts"));
        assert_eq!(config.journal_dir(), PathBuf::from("/home/u/.joyful/journal"));
    }

    #[test]
    fn test_env_home_wins() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp, "paths:\n  home: ./state\n");

        let config = resolve(
            Some(path),
            Some(PathBuf::from("/override")),
            PathBuf::from("/default"),
        )
        .unwrap();
        assert_eq!(config.home, PathBuf::from("/override"));
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            &temp,
            r#"
version: "1.0"
paths:
  home: ./state
search:
  queries: ["kindness", "rescue"]
  limit: 20
  freshness: Week
article:
  min_words: 150
retry:
  max_retries_per_stage: 5
  initial_delay_ms: 10
validation:
  min_positivity: 0.7
image:
  aspect_ratio: "1:1"
review:
  enabled: true
  max_rounds: 3
"#,
        );

        let config = resolve(Some(path.clone()), None, PathBuf::from("/default")).unwrap();

        assert_eq!(config.config_file, Some(path));
        assert!(config.home.ends_with("state"));
        assert_eq!(config.search.queries, vec!["kindness", "rescue"]);
        assert_eq!(config.search.limit, 20);
        assert_eq!(config.search.freshness, "Week");
        assert_eq!(config.search.market, "en-US");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 10);
        assert_eq!(config.retry.backoff_multiplier, 2.0);
        assert_eq!(config.models.min_positivity, 0.7);
        assert_eq!(config.models.aspect_ratio, "1:1");
        assert!(config.models.review_enabled);
        assert_eq!(config.review.max_rounds, 3);
        assert_eq!(config.review.score_threshold, 8.0);

        assert!(config.article.enabled);
        assert_eq!(config.article.timeout_secs, 10);

        let settings = config.pipeline_settings();
        assert_eq!(settings.search_limit, 20);
        assert_eq!(settings.min_article_words, 150);
        assert_eq!(settings.retry.max_attempts, 5);
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp, "search: [unclosed");

        let err = resolve(Some(path), None, PathBuf::from("/default")).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
