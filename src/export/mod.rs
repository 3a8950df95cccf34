//! Tabular export of a trained model.
//!
//! Writes CSV tables and a plain-text summary into
//! `<results_dir>/<model>/`. Word clouds and charts are rendered elsewhere
//! from `wordcloud_weights.csv` and `temporal_evolution.csv`.

use crate::error::{TopicError, TopicResult};
use crate::model::ModelArtifact;
use crate::store::TIMESTAMP_FORMAT;
use crate::topics::{Granularity, Keyword, TemporalOptions, Topic, clean_keywords};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TOPIC_SUMMARY_FILE: &str = "topic_summary.csv";
pub const DOCUMENT_TOPICS_FILE: &str = "document_topics.csv";
pub const TEMPORAL_EVOLUTION_FILE: &str = "temporal_evolution.csv";
pub const WORDCLOUD_FILE: &str = "wordcloud_weights.csv";
pub const SUMMARY_FILE: &str = "summary.txt";

/// Keywords shown next to each document.
const DOCUMENT_KEYWORDS: usize = 5;

/// Export parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Cleaned keywords per topic in the summary table
    #[serde(default = "default_summary_keywords")]
    pub summary_keywords: usize,

    /// Largest topics included in the temporal table
    #[serde(default = "default_temporal_top_topics")]
    pub temporal_top_topics: usize,

    /// Cleaned keywords per topic in the word-cloud table
    #[serde(default = "default_wordcloud_words")]
    pub wordcloud_words: usize,

    /// Characters of document text kept in the document table
    #[serde(default = "default_text_preview_chars")]
    pub text_preview_chars: usize,
}

fn default_summary_keywords() -> usize {
    10
}
fn default_temporal_top_topics() -> usize {
    10
}
fn default_wordcloud_words() -> usize {
    50
}
fn default_text_preview_chars() -> usize {
    300
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            summary_keywords: default_summary_keywords(),
            temporal_top_topics: default_temporal_top_topics(),
            wordcloud_words: default_wordcloud_words(),
            text_preview_chars: default_text_preview_chars(),
        }
    }
}

/// Files produced by one export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub directory: PathBuf,
    pub files: Vec<PathBuf>,
}

fn export_failed(path: &Path, reason: impl fmt::Display) -> TopicError {
    TopicError::ExportFailed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn open_csv(path: &Path) -> TopicResult<csv::Writer<fs::File>> {
    csv::Writer::from_path(path).map_err(|e| export_failed(path, e))
}

fn finish_csv(mut writer: csv::Writer<fs::File>, path: &Path) -> TopicResult<()> {
    writer.flush().map_err(|e| export_failed(path, e))
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let mut cut: String = flat.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}

/// Writes the export tables for a model.
#[derive(Debug, Clone, Default)]
pub struct ResultExporter {
    config: ExportConfig,
}

impl ResultExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export `artifact` into `<results_dir>/<model name>/`.
    ///
    /// Failures are reported as `ExportFailed`; the saved model is never
    /// touched.
    pub fn export(&self, artifact: &ModelArtifact, results_dir: &Path) -> TopicResult<ExportReport> {
        let directory = results_dir.join(artifact.name());
        fs::create_dir_all(&directory).map_err(|e| export_failed(&directory, e))?;

        let files = vec![
            self.write_topic_summary(artifact, &directory.join(TOPIC_SUMMARY_FILE))?,
            self.write_document_topics(artifact, &directory.join(DOCUMENT_TOPICS_FILE))?,
            self.write_temporal_evolution(artifact, &directory.join(TEMPORAL_EVOLUTION_FILE))?,
            self.write_wordcloud_weights(artifact, &directory.join(WORDCLOUD_FILE))?,
            self.write_summary(artifact, &directory.join(SUMMARY_FILE))?,
        ];
        info!(
            model = artifact.name(),
            directory = %directory.display(),
            files = files.len(),
            "exported results"
        );
        Ok(ExportReport { directory, files })
    }

    fn cleaned(&self, topic: &Topic, target: usize) -> Vec<Keyword> {
        clean_keywords(&topic.keywords, target)
    }

    fn write_topic_summary(&self, artifact: &ModelArtifact, path: &Path) -> TopicResult<PathBuf> {
        let index = artifact.index();
        let n = self.config.summary_keywords;
        let total = index.assignments().len().max(1);
        let mut writer = open_csv(path)?;

        let mut header = vec![
            "topic_id".to_string(),
            "num_documents".to_string(),
            "percentage".to_string(),
            "keywords".to_string(),
        ];
        header.extend((1..=n).map(|j| format!("word_{j}")));
        header.extend((1..=n).map(|j| format!("score_{j}")));
        writer.write_record(&header).map_err(|e| export_failed(path, e))?;

        for topic in index.topics() {
            let size = index.topic_size(topic.id);
            let keywords = self.cleaned(topic, n);
            let mut record = vec![
                topic.id.to_string(),
                size.to_string(),
                format!("{:.2}", size as f64 * 100.0 / total as f64),
                keywords
                    .iter()
                    .map(|k| k.word.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ];
            record.extend((0..n).map(|j| keywords.get(j).map(|k| k.word.clone()).unwrap_or_default()));
            record.extend(
                (0..n).map(|j| keywords.get(j).map_or(String::new(), |k| format!("{:.4}", k.score))),
            );
            writer.write_record(&record).map_err(|e| export_failed(path, e))?;
        }
        finish_csv(writer, path)?;
        debug!(path = %path.display(), "wrote topic summary");
        Ok(path.to_path_buf())
    }

    fn write_document_topics(&self, artifact: &ModelArtifact, path: &Path) -> TopicResult<PathBuf> {
        let index = artifact.index();
        let keywords: Vec<String> = index
            .topics()
            .iter()
            .map(|t| {
                self.cleaned(t, DOCUMENT_KEYWORDS)
                    .into_iter()
                    .map(|k| k.word)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect();

        let mut writer = open_csv(path)?;
        writer
            .write_record([
                "doc_id", "topic_id", "score", "outlier", "pub_date", "keywords", "text",
            ])
            .map_err(|e| export_failed(path, e))?;

        for (document, assignment) in index.documents().iter().zip(index.assignments()) {
            let text = document
                .text
                .map(|t| preview(t, self.config.text_preview_chars))
                .unwrap_or_default();
            let record = [
                document.id.to_string(),
                assignment.topic.to_string(),
                format!("{:.4}", assignment.score),
                assignment.outlier.to_string(),
                document.published.format(TIMESTAMP_FORMAT).to_string(),
                keywords[assignment.topic.value()].clone(),
                text,
            ];
            writer
                .write_record(&record)
                .map_err(|e| export_failed(path, e))?;
        }
        finish_csv(writer, path)?;
        Ok(path.to_path_buf())
    }

    fn write_temporal_evolution(
        &self,
        artifact: &ModelArtifact,
        path: &Path,
    ) -> TopicResult<PathBuf> {
        let overview = artifact.index().temporal_overview(
            Granularity::Month,
            self.config.temporal_top_topics,
            TemporalOptions::default(),
        )?;

        let mut writer = open_csv(path)?;
        writer
            .write_record(["topic_id", "period", "num_documents"])
            .map_err(|e| export_failed(path, e))?;
        for (topic, distribution) in &overview {
            for (period, count) in distribution {
                writer
                    .write_record([topic.to_string(), period.label(), count.to_string()])
                    .map_err(|e| export_failed(path, e))?;
            }
        }
        finish_csv(writer, path)?;
        Ok(path.to_path_buf())
    }

    fn write_wordcloud_weights(
        &self,
        artifact: &ModelArtifact,
        path: &Path,
    ) -> TopicResult<PathBuf> {
        let mut writer = open_csv(path)?;
        writer
            .write_record(["topic_id", "word", "weight"])
            .map_err(|e| export_failed(path, e))?;

        for topic in artifact.index().topics() {
            let keywords: Vec<Keyword> = self
                .cleaned(topic, self.config.wordcloud_words)
                .into_iter()
                .filter(|k| k.score > 0.0)
                .collect();
            let Some(max) = keywords.first().map(|k| k.score) else {
                continue;
            };
            for keyword in &keywords {
                writer
                    .write_record([
                        topic.id.to_string(),
                        keyword.word.clone(),
                        format!("{:.4}", keyword.score / max),
                    ])
                    .map_err(|e| export_failed(path, e))?;
            }
        }
        finish_csv(writer, path)?;
        Ok(path.to_path_buf())
    }

    fn write_summary(&self, artifact: &ModelArtifact, path: &Path) -> TopicResult<PathBuf> {
        let metadata = artifact.metadata();
        let index = artifact.index();
        let mut out = String::new();

        // fmt::Write into a String cannot fail
        let _ = writeln!(out, "Model: {}", metadata.name);
        let _ = writeln!(out, "Trained: {}", metadata.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "Documents: {}", metadata.num_documents);
        let _ = writeln!(out, "Topics: {}", metadata.num_topics);
        let _ = writeln!(out, "Outliers reassigned: {}", metadata.num_outliers);
        let _ = writeln!(out, "Training time: {:.1}s", metadata.execution_time_seconds);
        if let Some((first, last)) = index.documents().date_bounds() {
            let _ = writeln!(out, "Date range: {first} to {last}");
        }
        let config = &metadata.config;
        let _ = writeln!(
            out,
            "Parameters: n_neighbors={} n_components={} min_cluster_size={} min_samples={} merge_delta={}",
            config.reducer.n_neighbors,
            config.reducer.n_components,
            config.clusterer.min_cluster_size,
            config.clusterer.min_samples,
            config.merge.merge_delta,
        );
        let _ = writeln!(out);

        for topic in index.topics() {
            let words: Vec<String> = self
                .cleaned(topic, self.config.summary_keywords)
                .into_iter()
                .map(|k| k.word)
                .collect();
            let _ = writeln!(
                out,
                "Topic {} ({} documents): {}",
                topic.id,
                index.topic_size(topic.id),
                words.join(", ")
            );
        }

        fs::write(path, out).map_err(|e| export_failed(path, e))?;
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::artifact::tests::sample_artifact;
    use tempfile::TempDir;

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_export_writes_all_tables() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = sample_artifact("export-demo");
        let exporter = ResultExporter::new(ExportConfig {
            summary_keywords: 2,
            ..ExportConfig::default()
        });

        let report = exporter.export(&artifact, temp_dir.path()).unwrap();
        assert_eq!(report.directory, temp_dir.path().join("export-demo"));
        assert_eq!(report.files.len(), 5);
        assert!(report.files.iter().all(|f| f.exists()));

        let summary = read_rows(&report.directory.join(TOPIC_SUMMARY_FILE));
        assert_eq!(summary.len(), 2);
        // topic_id, num_documents, percentage, keywords, 2 words, 2 scores
        assert_eq!(summary[0].len(), 8);
        let sizes: usize = summary.iter().map(|r| r[1].parse::<usize>().unwrap()).sum();
        assert_eq!(sizes, 5);

        let documents = read_rows(&report.directory.join(DOCUMENT_TOPICS_FILE));
        assert_eq!(documents.len(), 5);
        assert_eq!(documents[0][0], "n1");
        assert_eq!(documents[4][3], "true");
        assert_eq!(documents[0][6], "la inflación sube");

        let temporal = read_rows(&report.directory.join(TEMPORAL_EVOLUTION_FILE));
        let total: usize = temporal.iter().map(|r| r[2].parse::<usize>().unwrap()).sum();
        assert_eq!(total, 5);
        assert!(temporal.iter().all(|r| r[1].len() == 7));

        let text = fs::read_to_string(report.directory.join(SUMMARY_FILE)).unwrap();
        assert!(text.contains("Model: export-demo"));
        assert!(text.contains("Topics: 2"));
    }

    #[test]
    fn test_wordcloud_weights_are_normalised() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = sample_artifact("cloud");
        let report = ResultExporter::default()
            .export(&artifact, temp_dir.path())
            .unwrap();

        let rows = read_rows(&report.directory.join(WORDCLOUD_FILE));
        assert!(!rows.is_empty());
        for topic in ["0", "1"] {
            let weights: Vec<f32> = rows
                .iter()
                .filter(|r| r[0] == topic)
                .map(|r| r[2].parse().unwrap())
                .collect();
            assert_eq!(weights[0], 1.0);
            assert!(weights.iter().all(|w| *w > 0.0 && *w <= 1.0));
        }
    }

    #[test]
    fn test_unwritable_destination_is_export_failed() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        fs::write(&blocker, "occupied").unwrap();

        let err = ResultExporter::default()
            .export(&sample_artifact("blocked"), &blocker)
            .unwrap_err();
        assert_eq!(err.status_code(), "EXPORT_FAILED");
    }

    #[test]
    fn test_preview_truncates_on_characters() {
        assert_eq!(preview("línea  uno\n dos", 100), "línea uno dos");
        assert_eq!(preview("ñandú veloz", 5), "ñandú...");
    }
}
