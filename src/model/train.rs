//! Training pipeline: load, reduce, cluster, synthesize, assign, persist.

use crate::cluster::{ClustererConfig, DensityClusterer};
use crate::error::{Stage, StageContext, TopicError, TopicResult};
use crate::model::artifact::ModelArtifact;
use crate::model::store::ModelStore;
use crate::reduce::{DimensionalityReducer, ReducerConfig};
use crate::store::{
    DateRange, DocumentTable, EmbeddingStore, Vocabulary, build_vocabulary, encode_vocabulary,
};
use crate::topics::{MergeConfig, TopicAssignmentIndex, TopicSynthesizer};
use crate::vector::EmbeddingGenerator;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Everything that determines a training run, stored with the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub reducer: ReducerConfig,

    #[serde(default)]
    pub clusterer: ClustererConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    /// Keywords kept per topic
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Minimum occurrences for a token to enter a vocabulary built from texts
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,

    /// Only train on documents published in this range
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

fn default_max_keywords() -> usize {
    50
}
fn default_min_word_count() -> usize {
    25
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            reducer: ReducerConfig::default(),
            clusterer: ClustererConfig::default(),
            merge: MergeConfig::default(),
            max_keywords: default_max_keywords(),
            min_word_count: default_min_word_count(),
            date_range: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> TopicResult<()> {
        self.reducer.validate()?;
        self.clusterer.validate()?;
        self.merge.validate()?;
        if self.max_keywords == 0 {
            return Err(TopicError::invalid_parameter(
                "topics.max_keywords",
                0,
                "must be at least 1",
            ));
        }
        if self.min_word_count == 0 {
            return Err(TopicError::invalid_parameter(
                "vocabulary.min_count",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

struct VocabularyEncoder {
    generator: Arc<dyn EmbeddingGenerator>,
    batch_size: usize,
}

/// Runs the pipeline stages in order, tagging failures with their stage.
pub struct Trainer {
    config: TrainingConfig,
    reducer: DimensionalityReducer,
    clusterer: DensityClusterer,
    synthesizer: TopicSynthesizer,
    encoder: Option<VocabularyEncoder>,
}

impl Trainer {
    /// Validate the configuration and build the stage components.
    pub fn new(config: TrainingConfig) -> TopicResult<Self> {
        config.validate()?;
        Ok(Self {
            reducer: DimensionalityReducer::new(config.reducer.clone())?,
            clusterer: DensityClusterer::new(config.clusterer.clone())?,
            synthesizer: TopicSynthesizer::new(config.merge, config.max_keywords)?,
            encoder: None,
            config,
        })
    }

    /// Encoder used to embed a vocabulary built from document texts when the
    /// input has no word vectors.
    pub fn with_encoder(mut self, generator: Arc<dyn EmbeddingGenerator>, batch_size: usize) -> Self {
        self.encoder = Some(VocabularyEncoder {
            generator,
            batch_size: batch_size.max(1),
        });
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train a model in memory.
    pub fn train(
        &self,
        name: &str,
        store: EmbeddingStore,
        on_stage: &mut dyn FnMut(Stage),
    ) -> TopicResult<ModelArtifact> {
        let started = Instant::now();
        info!(model = name, documents = store.len(), "training started");

        on_stage(Stage::Load);
        let (documents, vocabulary) = self.prepare(store).in_stage(Stage::Load)?;

        on_stage(Stage::Reduce);
        let stage_start = Instant::now();
        let reduced = self
            .reducer
            .fit_transform(documents.vectors())
            .in_stage(Stage::Reduce)?;
        debug!(elapsed_ms = stage_start.elapsed().as_millis() as u64, "reduce stage done");

        on_stage(Stage::Cluster);
        let clusters = self.clusterer.cluster(&reduced).in_stage(Stage::Cluster)?;

        on_stage(Stage::Synthesize);
        let topics = self
            .synthesizer
            .synthesize(&clusters, documents.vectors(), &vocabulary)
            .in_stage(Stage::Synthesize)?;

        on_stage(Stage::Assign);
        let index = TopicAssignmentIndex::assign(documents, vocabulary, topics, &clusters)
            .in_stage(Stage::Assign)?;

        let artifact = ModelArtifact::new(
            name,
            index,
            clusters,
            self.config.clone(),
            started.elapsed(),
        );
        info!(
            model = name,
            topics = artifact.metadata().num_topics,
            outliers = artifact.metadata().num_outliers,
            elapsed_secs = artifact.metadata().execution_time_seconds,
            "training finished"
        );
        Ok(artifact)
    }

    /// Reserve `name`, train, then commit the bundle into `models`.
    ///
    /// The name is reserved before any work so a concurrent run with the same
    /// name fails fast with `NameConflict`.
    pub fn train_and_save(
        &self,
        name: &str,
        store: EmbeddingStore,
        models: &ModelStore,
        on_stage: &mut dyn FnMut(Stage),
    ) -> TopicResult<(ModelArtifact, PathBuf)> {
        let reservation = models.reserve(name).in_stage(Stage::Persist)?;
        let mut artifact = self.train(name, store, on_stage)?;

        on_stage(Stage::Persist);
        let path = reservation.commit(&mut artifact).in_stage(Stage::Persist)?;
        info!(model = name, path = %path.display(), "model saved");
        Ok((artifact, path))
    }

    fn prepare(&self, store: EmbeddingStore) -> TopicResult<(DocumentTable, Vocabulary)> {
        let store = match &self.config.date_range {
            Some(range) => {
                let filtered = store.filter_by_date_range(range);
                info!(
                    start = %range.start,
                    end = %range.end,
                    documents = filtered.len(),
                    "filtered documents by publication date"
                );
                filtered
            }
            None => store,
        };
        if store.is_empty() {
            return Err(TopicError::NoTopicsFound { documents: 0 });
        }

        let (documents, vocabulary) = store.into_parts();
        let vocabulary = match vocabulary {
            Some(vocabulary) => vocabulary,
            None => self.vocabulary_from_texts(&documents)?,
        };
        Ok((documents, vocabulary))
    }

    fn vocabulary_from_texts(&self, documents: &DocumentTable) -> TopicResult<Vocabulary> {
        let (Some(texts), Some(encoder)) = (documents.texts(), &self.encoder) else {
            return Err(TopicError::MalformedInput {
                origin: "embedding store".to_string(),
                reason: "no word vectors, and no texts plus encoder to build a vocabulary from"
                    .to_string(),
            });
        };

        let tokens = build_vocabulary(texts, self.config.min_word_count);
        if tokens.is_empty() {
            return Err(TopicError::invalid_parameter(
                "vocabulary.min_count",
                self.config.min_word_count,
                "no token occurs often enough to enter the vocabulary",
            ));
        }
        info!(tokens = tokens.len(), "encoding vocabulary built from texts");
        encode_vocabulary(tokens, encoder.generator.clone(), encoder.batch_size)
    }
}
