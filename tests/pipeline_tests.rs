//! End-to-end checks: train a model on synthetic news, persist it, query it
//! and export it through the public API.

use chrono::{NaiveDate, NaiveDateTime};
use econtopics::model::ModelStore;
use econtopics::store::{DocumentTable, EmbeddingStore, Vocabulary};
use econtopics::topics::{TemporalOptions, clean_keywords};
use econtopics::vector::Matrix;
use econtopics::{
    ClusterSelection, ClustererConfig, DocumentId, ExportConfig, Granularity, ReducerConfig,
    ResultExporter, Stage, TopicError, Trainer, TrainingConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tempfile::TempDir;

const DIM: usize = 8;
const PER_THEME: usize = 50;

fn axis(axis: usize, scale: f32) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = scale;
    v
}

/// Mostly `main`, with a little of `side`.
fn leaning(main: usize, side: usize, amount: f32) -> Vec<f32> {
    let mut v = axis(main, 0.9);
    v[side] = amount;
    v
}

fn date(year: i32, month: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

/// Fifty inflation stories followed by fifty labour market stories.
fn news_store() -> EmbeddingStore {
    let mut rng = StdRng::seed_from_u64(3);
    let mut rows = Vec::new();
    let mut texts = Vec::new();
    for (theme, text) in [(0, "la inflación sube otra vez"), (1, "el empleo crece en el sector")] {
        for _ in 0..PER_THEME {
            let row = axis(theme, 1.0)
                .into_iter()
                .map(|c| c + (rng.random::<f32>() - 0.5) * 0.1)
                .collect();
            rows.push(row);
            texts.push(text.to_string());
        }
    }
    let n = rows.len();
    let ids = (0..n).map(|i| DocumentId::new(format!("news-{i}"))).collect();
    let dates = (0..n)
        .map(|i| date(2021 + (i % 2) as i32, 1 + (i % 12) as u32))
        .collect();
    let documents =
        DocumentTable::new(ids, dates, Some(texts), Matrix::from_rows(rows).unwrap()).unwrap();

    let vocabulary_words = [
        ("inflación", axis(0, 1.0)),
        ("precios", leaning(0, 3, 0.2)),
        ("ipc", leaning(0, 4, 0.3)),
        ("empleo", axis(1, 1.0)),
        ("salarios", leaning(1, 3, 0.2)),
        ("paro", leaning(1, 5, 0.3)),
        ("petróleo", axis(2, 1.0)),
    ];
    let (words, vectors): (Vec<_>, Vec<_>) = vocabulary_words.into_iter().unzip();
    let vocabulary = Vocabulary::new(
        words.into_iter().map(String::from).collect(),
        Matrix::from_rows(vectors).unwrap(),
    )
    .unwrap();

    EmbeddingStore::from_parts(documents, Some(vocabulary))
}

fn training_config() -> TrainingConfig {
    TrainingConfig {
        reducer: ReducerConfig {
            n_neighbors: 15,
            n_components: 2,
            n_epochs: 100,
            ..ReducerConfig::default()
        },
        clusterer: ClustererConfig {
            min_cluster_size: 30,
            min_samples: 10,
            selection: ClusterSelection::Eom,
            ..ClustererConfig::default()
        },
        max_keywords: 5,
        ..TrainingConfig::default()
    }
}

#[test]
fn train_persist_query_and_export() {
    let workspace = TempDir::new().unwrap();
    let models = ModelStore::new(workspace.path().join("models"));
    let trainer = Trainer::new(training_config()).unwrap();

    let (artifact, path) = trainer
        .train_and_save("economia-2021", news_store(), &models, &mut |_| {})
        .unwrap();
    assert!(path.join("metadata.json").exists());
    assert_eq!(artifact.metadata().num_topics, 2);
    assert_eq!(artifact.metadata().num_documents, 2 * PER_THEME);

    let index = artifact.index();
    for size in index.topic_sizes() {
        assert!(
            PER_THEME.abs_diff(size) <= 5,
            "topic size {size} is not close to {PER_THEME}"
        );
    }
    let keyword_sets: Vec<HashSet<String>> = index
        .topics()
        .iter()
        .map(|topic| {
            clean_keywords(&topic.keywords, 3)
                .into_iter()
                .map(|keyword| keyword.word)
                .collect()
        })
        .collect();
    assert!(keyword_sets.iter().all(|set| set.len() == 3));
    assert!(keyword_sets[0].is_disjoint(&keyword_sets[1]));

    let listed = models.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].metadata.name, "economia-2021");

    let session = models.session("economia-2021").unwrap();
    let hits = session.search_topics(&["inflación"], 1).unwrap();
    let inflation = hits[0].topic;
    assert!(session.topic(inflation).unwrap().top_words(2).contains(&"inflación"));

    let docs = session.search_documents(&["empleo"], 5).unwrap();
    assert_eq!(docs.len(), 5);
    assert!(docs.iter().all(|hit| hit.position >= PER_THEME));
    assert_eq!(session.text(&docs[0]), Some("el empleo crece en el sector"));

    let similar = session.similar_words(&["inflación"], &[], 1).unwrap();
    assert_eq!(similar[0].word, "precios");

    let yearly = session
        .temporal(inflation, Granularity::Year, TemporalOptions::default())
        .unwrap();
    assert_eq!(yearly.total(), session.index().topic_size(inflation));
    assert!(yearly.iter().count() <= 2);

    let results = workspace.path().join("results");
    let report = ResultExporter::new(ExportConfig::default())
        .export(session.artifact(), &results)
        .unwrap();
    assert_eq!(report.directory, results.join("economia-2021"));
    assert_eq!(report.files.len(), 5);
    assert!(report.files.iter().all(|file| file.exists()));

    let summary = std::fs::read_to_string(report.directory.join("topic_summary.csv")).unwrap();
    assert_eq!(summary.lines().count(), 3);
}

#[test]
fn retraining_under_the_same_name_is_rejected() {
    let workspace = TempDir::new().unwrap();
    let models = ModelStore::new(workspace.path());
    let trainer = Trainer::new(training_config()).unwrap();

    trainer
        .train_and_save("repetido", news_store(), &models, &mut |_| {})
        .unwrap();
    let err = trainer
        .train_and_save("repetido", news_store(), &models, &mut |_| {})
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Persist));
    assert!(matches!(err.root(), TopicError::NameConflict { .. }));
}

#[test]
fn unknown_keywords_are_reported() {
    let workspace = TempDir::new().unwrap();
    let models = ModelStore::new(workspace.path());
    Trainer::new(training_config())
        .unwrap()
        .train_and_save("consultas", news_store(), &models, &mut |_| {})
        .unwrap();

    let session = models.session("consultas").unwrap();
    let err = session.search_topics(&["criptomoneda"], 3).unwrap_err();
    assert!(matches!(err, TopicError::UnknownTerm { .. }));
    assert!(matches!(
        models.session("inexistente").unwrap_err(),
        TopicError::ModelNotFound { .. }
    ));
}
