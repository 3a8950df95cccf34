//! Table formatting for topics, search hits and temporal series.

use crate::model::ModelSummary;
use crate::topics::{DocumentHit, Keyword, TemporalDistribution, Topic, TopicHit};
use comfy_table::{
    Attribute, Cell, CellAlignment, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        // Apply rounded corners
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Right-align the numeric columns at `indices`.
    pub fn align_right(mut self, indices: &[usize]) -> Self {
        for &i in indices {
            if let Some(column) = self.table.column_mut(i) {
                column.set_cell_alignment(CellAlignment::Right);
            }
        }
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

/// Topic overview: id, documents, share and leading keywords.
pub fn create_topics_table(topics: &[(&Topic, usize)], total: usize, words: usize) -> String {
    let total = total.max(1) as f64;
    let mut builder = TableBuilder::new().set_headers(vec!["Topic", "Documents", "%", "Keywords"]);
    for (topic, size) in topics {
        builder = builder.add_row(vec![
            topic.id.to_string(),
            size.to_string(),
            format!("{:.1}", *size as f64 * 100.0 / total),
            topic.top_words(words).join(", "),
        ]);
    }
    builder.align_right(&[0, 1, 2]).build()
}

/// Topics returned by a keyword search.
pub fn create_topic_hits_table(hits: &[TopicHit], keywords: &[Vec<&str>]) -> String {
    let mut builder =
        TableBuilder::new().set_headers(vec!["Topic", "Similarity", "Documents", "Keywords"]);
    for (hit, words) in hits.iter().zip(keywords) {
        builder = builder.add_row(vec![
            hit.topic.to_string(),
            format!("{:.4}", hit.score),
            hit.size.to_string(),
            words.join(", "),
        ]);
    }
    builder.align_right(&[0, 1, 2]).build()
}

/// Documents returned by a search, with a text preview when available.
pub fn create_document_hits_table(hits: &[(DocumentHit, Option<&str>)]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec![
        "Document", "Topic", "Score", "Published", "Text",
    ]);
    for (hit, text) in hits {
        builder = builder.add_row(vec![
            hit.doc_id.to_string(),
            hit.topic.to_string(),
            format!("{:.4}", hit.score),
            hit.published.format("%Y-%m-%d").to_string(),
            text.map(|t| shorten(t, 80)).unwrap_or_default(),
        ]);
    }
    builder.align_right(&[1, 2]).build()
}

/// Ranked words with their similarity.
pub fn create_keywords_table(keywords: &[Keyword]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec!["#", "Word", "Similarity"]);
    for (rank, keyword) in keywords.iter().enumerate() {
        builder = builder.add_row(vec![
            (rank + 1).to_string(),
            keyword.word.clone(),
            format!("{:.4}", keyword.score),
        ]);
    }
    builder.align_right(&[0, 2]).build()
}

/// Document counts per period with a proportional bar.
pub fn create_temporal_table(distribution: &TemporalDistribution) -> String {
    const BAR_WIDTH: usize = 30;
    let max = distribution.iter().map(|(_, c)| c).max().unwrap_or(0).max(1);
    let mut builder = TableBuilder::new().set_headers(vec!["Period", "Documents", ""]);
    for (period, count) in distribution {
        let width = count * BAR_WIDTH / max;
        builder = builder.add_row(vec![period.label(), count.to_string(), "█".repeat(width)]);
    }
    builder.align_right(&[1]).build()
}

/// Saved models, newest first.
pub fn create_models_table(models: &[ModelSummary]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec![
        "Model", "Trained", "Documents", "Topics", "Time",
    ]);
    for model in models {
        let metadata = &model.metadata;
        builder = builder.add_row(vec![
            metadata.name.clone(),
            metadata.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            metadata.num_documents.to_string(),
            metadata.num_topics.to_string(),
            format!("{:.1}s", metadata.execution_time_seconds),
        ]);
    }
    builder.align_right(&[2, 3, 4]).build()
}
