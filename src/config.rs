//! Configuration module for econtopics.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.econtopics/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides (applied by the command handlers)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `ECONTOPICS_` and use double
//! underscores to separate nested levels:
//! - `ECONTOPICS_CLUSTERER__MIN_CLUSTER_SIZE=30` sets `clusterer.min_cluster_size`
//! - `ECONTOPICS_REDUCER__N_NEIGHBORS=15` sets `reducer.n_neighbors`
//! - `ECONTOPICS_PERFORMANCE__PARALLEL_THREADS=4` sets `performance.parallel_threads`

use crate::cluster::ClustererConfig;
use crate::error::{IoContext, TopicError, TopicResult};
use crate::export::ExportConfig;
use crate::model::TrainingConfig;
use crate::reduce::ReducerConfig;
use crate::store::{CorpusColumns, DateRange};
use crate::topics::{EmptyBuckets, Granularity, MergeConfig, TemporalOptions};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".econtopics";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "ECONTOPICS_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .econtopics is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub paths: PathsConfig,

    /// Column names of the source corpus CSV
    #[serde(default)]
    pub corpus: CorpusColumns,

    #[serde(default)]
    pub reducer: ReducerConfig,

    #[serde(default)]
    pub clusterer: ClustererConfig,

    #[serde(default)]
    pub topics: TopicsConfig,

    #[serde(default)]
    pub vocabulary: VocabularyConfig,

    /// On-the-fly encoder settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub temporal: TemporalConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PathsConfig {
    /// Archive of precomputed embeddings used when `train` gets no path
    #[serde(default = "default_archive_path")]
    pub archive: PathBuf,

    /// Source corpus CSV joined with the archive, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus: Option<PathBuf>,

    /// Where trained models are stored
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Where exports are written
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TopicsConfig {
    /// Topics closer than `1 - merge_delta` in cosine similarity are merged
    #[serde(default = "default_merge_delta")]
    pub merge_delta: f32,

    /// Keywords stored per topic
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Keywords shown per topic in tables
    #[serde(default = "default_display_keywords")]
    pub display_keywords: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VocabularyConfig {
    /// Minimum occurrences for a token built from texts
    #[serde(default = "default_min_count")]
    pub min_count: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// fastembed model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Model download cache, defaults to the user cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TemporalConfig {
    #[serde(default)]
    pub granularity: Granularity,

    #[serde(default)]
    pub empty_buckets: EmptyBuckets,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PerformanceConfig {
    /// Number of rayon worker threads
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_archive_path() -> PathBuf {
    PathBuf::from("embeddings")
}
fn default_models_dir() -> PathBuf {
    PathBuf::from(".econtopics/models")
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}
fn default_merge_delta() -> f32 {
    0.1
}
fn default_max_keywords() -> usize {
    50
}
fn default_display_keywords() -> usize {
    10
}
fn default_min_count() -> usize {
    25
}
fn default_embedding_model() -> String {
    "MultilingualE5Small".to_string()
}
fn default_embedding_batch_size() -> usize {
    32
}
fn default_true() -> bool {
    true
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            debug: false,
            paths: PathsConfig::default(),
            corpus: CorpusColumns::default(),
            reducer: ReducerConfig::default(),
            clusterer: ClustererConfig::default(),
            topics: TopicsConfig::default(),
            vocabulary: VocabularyConfig::default(),
            embedding: EmbeddingConfig::default(),
            temporal: TemporalConfig::default(),
            export: ExportConfig::default(),
            performance: PerformanceConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            archive: default_archive_path(),
            corpus: None,
            models_dir: default_models_dir(),
            results_dir: default_results_dir(),
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            merge_delta: default_merge_delta(),
            max_keywords: default_max_keywords(),
            display_keywords: default_display_keywords(),
        }
    }
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            min_count: default_min_count(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_embedding_batch_size(),
            cache_dir: None,
            show_download_progress: true,
        }
    }
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Month,
            empty_buckets: EmptyBuckets::Omit,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
        }
    }
}

impl Settings {
    fn figment(config_path: &Path) -> Figment {
        Self::figment_with_prefix(config_path, ENV_PREFIX)
    }

    fn figment_with_prefix(config_path: &Path, env_prefix: &str) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore (__) separates nested levels, single
            // underscores stay part of the field name
            .merge(Env::prefixed(env_prefix).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    /// Find the workspace config by looking for a .econtopics directory
    /// from the current directory upwards
    pub fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .econtopics is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'econtopics init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Resolve a configured path against the workspace root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Check every section the pipeline reads.
    pub fn validate(&self) -> TopicResult<()> {
        self.training_config(None).validate()?;
        if self.performance.parallel_threads == 0 {
            return Err(TopicError::invalid_parameter(
                "performance.parallel_threads",
                0,
                "must be at least 1",
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(TopicError::invalid_parameter(
                "embedding.batch_size",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Training parameters for one run.
    pub fn training_config(&self, date_range: Option<DateRange>) -> TrainingConfig {
        TrainingConfig {
            reducer: self.reducer.clone(),
            clusterer: self.clusterer.clone(),
            merge: MergeConfig {
                merge_delta: self.topics.merge_delta,
            },
            max_keywords: self.topics.max_keywords,
            min_word_count: self.vocabulary.min_count,
            date_range,
        }
    }

    /// Temporal options from the `temporal` section.
    pub fn temporal_options(&self, range: Option<DateRange>) -> TemporalOptions {
        TemporalOptions {
            range,
            empty_buckets: self.temporal.empty_buckets,
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> TopicResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).write_context(parent)?;
        }
        let toml_string = toml::to_string_pretty(self).map_err(|e| TopicError::Config {
            reason: format!("cannot serialize settings: {e}"),
        })?;
        std::fs::write(path, toml_string).write_context(path)
    }

    /// Create `.econtopics/settings.toml` in the current directory
    pub fn init_config_file(force: bool) -> TopicResult<PathBuf> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);
        Self::write_template(&config_path, force)?;
        Ok(config_path)
    }

    /// Write the commented default configuration to `path`.
    pub fn write_template(path: &Path, force: bool) -> TopicResult<()> {
        if !force && path.exists() {
            return Err(TopicError::Config {
                reason: format!(
                    "configuration file '{}' already exists, use --force to overwrite",
                    path.display()
                ),
            });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).write_context(parent)?;
        }
        std::fs::write(path, Self::template()).write_context(path)
    }

    fn template() -> String {
        let defaults = Settings::default();
        format!(
            r#"# econtopics configuration
#
# Every value can be overridden with an ECONTOPICS_ environment variable,
# using __ between section and key: ECONTOPICS_CLUSTERER__MIN_CLUSTER_SIZE=30

# Version of the configuration schema
version = 1

# Global debug mode
debug = false

[paths]
# Archive directory with document_vectors.vec, word_vectors.vec and JSON arrays
archive = "embeddings"
# Source corpus CSV (body, pub_date, doc_id) joined with the archive
# corpus = "data/noticias.csv"
models_dir = ".econtopics/models"
results_dir = "results"

[corpus]
text = "body"
date = "pub_date"
id = "doc_id"

[reducer]
# Size of the local neighbourhood; larger values give more global structure
n_neighbors = 50
# Dimensions of the reduced space the clusterer works in
n_components = 5
metric = "cosine"
random_state = 42
n_epochs = 200
min_dist = 0.1
negative_sample_rate = 5

[clusterer]
# Smallest group of documents that counts as a topic
min_cluster_size = 50
min_samples = 25
metric = "euclidean"
# "eom" for stable clusters, "leaf" for finer ones
selection = "eom"
allow_single_cluster = false

[topics]
merge_delta = 0.1
max_keywords = 50
display_keywords = 10

[vocabulary]
# Used only when the archive has no word vectors
min_count = 25

[embedding]
# Used only when encoding texts on the fly
model = "MultilingualE5Small"
batch_size = 32
show_download_progress = true

[temporal]
# day, week, month, quarter or year
granularity = "month"
# "omit" or "zero_fill"
empty_buckets = "omit"

[export]
summary_keywords = 10
temporal_top_topics = 10
wordcloud_words = 50
text_preview_chars = 300

[performance]
# Worker threads (defaults to CPU count)
# parallel_threads = {}
"#,
            defaults.performance.parallel_threads
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.reducer.n_neighbors, 50);
        assert_eq!(settings.clusterer.min_cluster_size, 50);
        assert_eq!(settings.topics.max_keywords, 50);
        assert!(settings.performance.parallel_threads > 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_template_matches_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(".econtopics").join("settings.toml");
        Settings::write_template(&config_path, false).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings, Settings::default());

        let err = Settings::write_template(&config_path, false).unwrap_err();
        assert_eq!(err.status_code(), "CONFIG_ERROR");
        assert!(Settings::write_template(&config_path, true).is_ok());
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[clusterer]
min_cluster_size = 15
selection = "leaf"

[temporal]
granularity = "quarter"
empty_buckets = "zero_fill"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.clusterer.min_cluster_size, 15);
        assert_eq!(settings.clusterer.selection, crate::cluster::ClusterSelection::Leaf);
        assert_eq!(settings.temporal.granularity, Granularity::Quarter);
        assert_eq!(settings.temporal.empty_buckets, EmptyBuckets::ZeroFill);

        // Untouched values keep their defaults
        assert_eq!(settings.clusterer.min_samples, 25);
        assert_eq!(settings.reducer.n_components, 5);
        assert_eq!(settings.paths.results_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.reducer.n_neighbors = 15;
        settings.paths.corpus = Some(PathBuf::from("data/news.csv"));
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.reducer.n_neighbors, 15);
        assert_eq!(loaded.paths.corpus, Some(PathBuf::from("data/news.csv")));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[topics]\nmerge_delta = 0.2\nmax_keywords = 20\n").unwrap();

        // Own prefix so parallel tests loading the real one are unaffected
        unsafe {
            std::env::set_var("ECONTOPICS_ENVTEST_TOPICS__MAX_KEYWORDS", "7");
        }
        let settings: Settings = Settings::figment_with_prefix(&config_path, "ECONTOPICS_ENVTEST_")
            .extract()
            .unwrap();
        unsafe {
            std::env::remove_var("ECONTOPICS_ENVTEST_TOPICS__MAX_KEYWORDS");
        }

        // Environment variable overrides the file
        assert_eq!(settings.topics.max_keywords, 7);
        // File value is used when no env var is set
        assert!((settings.topics.merge_delta - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_training_config_and_validation() {
        let mut settings = Settings::default();
        settings.topics.merge_delta = 0.3;
        settings.vocabulary.min_count = 5;

        let config = settings.training_config(Some(DateRange::years(2020, 2021).unwrap()));
        assert!((config.merge.merge_delta - 0.3).abs() < 1e-6);
        assert_eq!(config.min_word_count, 5);
        assert!(config.date_range.is_some());

        settings.reducer.n_neighbors = 1;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("reducer.n_neighbors"));
    }

    #[test]
    fn test_resolve_against_workspace_root() {
        let mut settings = Settings::default();
        settings.workspace_root = Some(PathBuf::from("/work"));
        assert_eq!(
            settings.resolve(Path::new("results")),
            PathBuf::from("/work/results")
        );
        assert_eq!(settings.resolve(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
