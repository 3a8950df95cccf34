//! CLI entry point for topic discovery over economic news.
//!
//! Trains topic models from embedding archives, stores them by name and
//! answers queries against a stored model. Main components: Cli parser,
//! Commands enum and one handler per command.

use chrono::NaiveDate;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use econtopics::display::{
    StageProgress, THEME, Theme, create_document_hits_table, create_keywords_table,
    create_models_table, create_progress_bar, create_temporal_table, create_topic_hits_table,
    create_topics_table,
};
use econtopics::error::StageContext;
use econtopics::io::{ExitCode, OutputFormat, OutputManager};
use econtopics::store::{EncoderSource, read_corpus};
use econtopics::topics::EmptyBuckets;
use econtopics::vector::{EmbeddingGenerator, FastEmbedGenerator, default_model_cache_dir};
use econtopics::{
    ClusterSelection, DateRange, EmbeddingStore, Granularity, ModelStore, ResultExporter,
    Settings, Stage, TopicError, TopicId, TopicResult, Trainer,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct TrainReport {
    name: String,
    path: PathBuf,
    num_documents: usize,
    num_topics: usize,
    num_outliers: usize,
    execution_time_seconds: f64,
    stages: Vec<StageTiming>,
}

#[derive(Debug, Serialize)]
struct StageTiming {
    stage: &'static str,
    seconds: f64,
}

#[derive(Debug, Serialize)]
struct TopicRow {
    topic: TopicId,
    documents: usize,
    percentage: f64,
    keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PeriodCount {
    period: String,
    start: NaiveDate,
    documents: usize,
}

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Quick start shown after the generated help
fn create_after_help() -> String {
    use console::style;

    let title = if Theme::should_disable_colors() {
        "Quick Start:".to_string()
    } else {
        style("Quick Start:").cyan().bold().to_string()
    };

    let mut help = format!("{title}\n");
    help.push_str("  $ econtopics init                          # Create .econtopics/settings.toml\n");
    help.push_str("  $ econtopics train macro-2023 --years 2020 2023\n");
    help.push_str("  $ econtopics topics macro-2023             # Topic overview\n");
    help.push_str("  $ econtopics search-topics macro-2023 inflación\n");
    help.push_str("  $ econtopics export macro-2023             # CSV files under results/\n");
    help
}

/// Topic discovery for economic news
#[derive(Parser)]
#[command(
    name = "econtopics",
    version = env!("CARGO_PKG_VERSION"),
    about = "Topic discovery for economic news",
    long_about = "Cluster news embeddings into keyword topics, then search and export them.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = create_after_help()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as a JSON envelope
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Inclusive date filter shared by `train` and `temporal`
#[derive(clap::Args, Debug, Default)]
struct DateArgs {
    /// First and last year, inclusive
    #[arg(long, num_args = 2, value_names = ["START", "END"], conflicts_with_all = ["from", "to"])]
    years: Option<Vec<i32>>,

    /// First day, YYYY-MM-DD
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    /// Last day, YYYY-MM-DD
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
}

impl DateArgs {
    fn range(&self) -> TopicResult<Option<DateRange>> {
        match (&self.years, self.from, self.to) {
            (Some(years), _, _) => match years.as_slice() {
                [start, end] => DateRange::years(*start, *end).map(Some),
                _ => Err(TopicError::invalid_parameter(
                    "years",
                    format!("{years:?}"),
                    "expected START END",
                )),
            },
            (None, Some(from), Some(to)) => DateRange::new(from, to).map(Some),
            _ => Ok(None),
        }
    }
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    #[command(about = "Set up .econtopics directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    #[command(about = "Display active settings")]
    Config,

    #[command(
        about = "Train a topic model and save it under a name",
        after_help = "Reads the configured archive unless --archive is given.\n\
                      With --corpus, ids, dates and texts come from the CSV.\n\
                      With --encode, documents are embedded from the corpus texts."
    )]
    Train {
        /// Model name, unique within the models directory
        name: String,

        /// Embedding archive directory
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Source corpus CSV
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Embed the corpus texts instead of reading an archive
        #[arg(long)]
        encode: bool,

        #[command(flatten)]
        dates: DateArgs,

        #[arg(long)]
        min_cluster_size: Option<usize>,

        #[arg(long)]
        min_samples: Option<usize>,

        #[arg(long)]
        n_neighbors: Option<usize>,

        #[arg(long)]
        n_components: Option<usize>,

        /// eom or leaf
        #[arg(long)]
        selection: Option<ClusterSelection>,

        /// Random seed for the reducer
        #[arg(long)]
        seed: Option<u64>,

        /// Hide the progress spinner
        #[arg(short, long)]
        quiet: bool,
    },

    #[command(about = "List trained models, newest first")]
    Models,

    #[command(about = "Show the topics of a model")]
    Topics {
        model: String,

        /// Keywords per topic
        #[arg(short, long)]
        words: Option<usize>,
    },

    #[command(
        name = "search-topics",
        about = "Find topics closest to a set of keywords"
    )]
    SearchTopics {
        model: String,

        #[arg(required = true, num_args = 1..)]
        keywords: Vec<String>,

        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
    },

    #[command(
        name = "search-docs",
        about = "Find documents closest to a set of keywords"
    )]
    SearchDocs {
        model: String,

        #[arg(required = true, num_args = 1..)]
        keywords: Vec<String>,

        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,
    },

    #[command(name = "topic-docs", about = "Documents of a topic, best match first")]
    TopicDocs {
        model: String,

        topic: usize,

        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,
    },

    #[command(
        name = "similar-words",
        about = "Vocabulary words closest to the keywords"
    )]
    SimilarWords {
        model: String,

        #[arg(required = true, num_args = 1..)]
        keywords: Vec<String>,

        /// Words to move away from
        #[arg(long, num_args = 1..)]
        negative: Vec<String>,

        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,
    },

    #[command(about = "Documents of a topic per period")]
    Temporal {
        model: String,

        topic: usize,

        /// day, week, month, quarter or year
        #[arg(short, long)]
        granularity: Option<Granularity>,

        /// Show periods without documents
        #[arg(long)]
        zero_fill: bool,

        #[command(flatten)]
        dates: DateArgs,
    },

    #[command(about = "Write CSV summaries of a model")]
    Export {
        model: String,

        /// Results directory, defaults to paths.results_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    /// Model a query command runs against.
    fn model(&self) -> Option<&str> {
        match self {
            Commands::Topics { model, .. }
            | Commands::SearchTopics { model, .. }
            | Commands::SearchDocs { model, .. }
            | Commands::TopicDocs { model, .. }
            | Commands::SimilarWords { model, .. }
            | Commands::Temporal { model, .. }
            | Commands::Export { model, .. } => Some(model),
            Commands::Train { name, .. } => Some(name),
            Commands::Init { .. } | Commands::Config | Commands::Models => None,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let format = OutputFormat::from_json_flag(cli.json);

    if !matches!(cli.command, Commands::Init { .. }) && !cli.json {
        if let Err(warning) = Settings::check_init() {
            eprintln!("{}", THEME.warning_with_icon(&warning));
            eprintln!("Using default configuration for now.");
        }
    }

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => exit_with_error(&e, format),
    };

    init_tracing(cli.verbose || settings.debug);
    init_thread_pool(settings.performance.parallel_threads);

    let mut output = OutputManager::new(format).with_model(cli.command.model());
    let code = match run(cli.command, &settings, &mut output) {
        Ok(code) => code,
        Err(e) => output.error(&e).unwrap_or(ExitCode::IoError),
    };
    std::process::exit(code.into());
}

fn load_settings(cli: &Cli) -> TopicResult<Settings> {
    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path).map(|mut settings| {
            if settings.workspace_root.is_none() {
                settings.workspace_root = Settings::workspace_root();
            }
            settings
        }),
        None => Settings::load(),
    };
    loaded.map_err(|e| TopicError::Config {
        reason: e.to_string(),
    })
}

fn exit_with_error(error: &TopicError, format: OutputFormat) -> ! {
    let code = OutputManager::new(format)
        .error(error)
        .unwrap_or(ExitCode::IoError);
    std::process::exit(code.into());
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn init_thread_pool(threads: usize) {
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build_global()
    {
        warn!(error = %e, "could not configure the rayon thread pool");
    }
}

/// Collapse output failures (closed pipe, full disk) into an exit code.
fn emitted(result: std::io::Result<ExitCode>) -> ExitCode {
    result.unwrap_or(ExitCode::IoError)
}

fn run(command: Commands, settings: &Settings, output: &mut OutputManager) -> TopicResult<ExitCode> {
    let models = ModelStore::new(settings.resolve(&settings.paths.models_dir));
    debug!(models = %models.root().display(), "using models directory");

    match command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force)?;
            Ok(emitted(output.success(&path, || {
                format!(
                    "{}\nEdit this file to customize your settings.",
                    THEME.success_with_icon(&format!(
                        "Created configuration file at: {}",
                        path.display()
                    ))
                )
            })))
        }

        Commands::Config => {
            let text = toml::to_string_pretty(settings).map_err(|e| TopicError::Config {
                reason: format!("cannot display settings: {e}"),
            })?;
            Ok(emitted(output.success(settings, || {
                format!("Current Configuration:\n{}\n{text}", "=".repeat(50))
            })))
        }

        Commands::Train {
            name,
            archive,
            corpus,
            encode,
            dates,
            min_cluster_size,
            min_samples,
            n_neighbors,
            n_components,
            selection,
            seed,
            quiet,
        } => {
            let mut training = settings.training_config(dates.range()?);
            if let Some(value) = min_cluster_size {
                training.clusterer.min_cluster_size = value;
            }
            if let Some(value) = min_samples {
                training.clusterer.min_samples = value;
            }
            if let Some(value) = n_neighbors {
                training.reducer.n_neighbors = value;
            }
            if let Some(value) = n_components {
                training.reducer.n_components = value;
            }
            if let Some(value) = selection {
                training.clusterer.selection = value;
            }
            if let Some(value) = seed {
                training.reducer.random_state = value;
            }
            settings.validate()?;

            let quiet = quiet || output.format().is_json();
            let archive = settings.resolve(archive.as_ref().unwrap_or(&settings.paths.archive));
            let corpus = corpus
                .or_else(|| settings.paths.corpus.clone())
                .map(|path| settings.resolve(&path));

            let generator = if encode {
                Some(load_encoder(settings)?)
            } else {
                None
            };
            let store = load_training_store(settings, &archive, corpus, generator.clone(), quiet)
                .in_stage(Stage::Load)?;

            let mut trainer = Trainer::new(training)?;
            if let Some(generator) = generator {
                trainer = trainer.with_encoder(generator, settings.embedding.batch_size);
            }

            let mut progress = StageProgress::new(quiet);
            let result = trainer.train_and_save(&name, store, &models, &mut |stage| {
                progress.enter(stage)
            });
            let timings = progress.finish();
            let (artifact, path) = result?;

            let metadata = artifact.metadata();
            let report = TrainReport {
                name: metadata.name.clone(),
                path: path.clone(),
                num_documents: metadata.num_documents,
                num_topics: metadata.num_topics,
                num_outliers: metadata.num_outliers,
                execution_time_seconds: metadata.execution_time_seconds,
                stages: timings
                    .iter()
                    .map(|(stage, elapsed)| StageTiming {
                        stage: stage.as_str(),
                        seconds: elapsed.as_secs_f64(),
                    })
                    .collect(),
            };

            let index = artifact.index();
            let rows: Vec<_> = index
                .topics()
                .iter()
                .map(|topic| (topic, index.topic_size(topic.id)))
                .collect();
            Ok(emitted(output.success(&report, || {
                let mut text = THEME.success_with_icon(&format!(
                    "Trained '{}': {} topics from {} documents in {:.1}s",
                    report.name,
                    report.num_topics,
                    report.num_documents,
                    report.execution_time_seconds
                ));
                text.push_str(&format!(
                    "\nSaved to {}\n\n",
                    THEME.apply(&THEME.path, path.display())
                ));
                text.push_str(&create_topics_table(
                    &rows,
                    report.num_documents,
                    settings.topics.display_keywords,
                ));
                text
            })))
        }

        Commands::Models => {
            let summaries = models.list()?;
            let metadata: Vec<_> = summaries.iter().map(|s| s.metadata.clone()).collect();
            Ok(emitted(output.collection(&metadata, "models", || {
                create_models_table(&summaries)
            })))
        }

        Commands::Topics { model, words } => {
            let session = models.session(&model)?;
            let words = words.unwrap_or(settings.topics.display_keywords);
            let index = session.index();
            let total = index.documents().len();

            let sized: Vec<_> = session
                .topics()
                .iter()
                .map(|topic| (topic, index.topic_size(topic.id)))
                .collect();
            let rows: Vec<TopicRow> = sized
                .iter()
                .map(|(topic, size)| TopicRow {
                    topic: topic.id,
                    documents: *size,
                    percentage: *size as f64 * 100.0 / total.max(1) as f64,
                    keywords: topic.top_words(words).into_iter().map(str::to_string).collect(),
                })
                .collect();

            Ok(emitted(output.collection(&rows, "topics", || {
                create_topics_table(&sized, total, words)
            })))
        }

        Commands::SearchTopics {
            model,
            keywords,
            top_k,
        } => {
            let session = models.session(&model)?;
            let hits = session.search_topics(&keywords, top_k).in_stage(Stage::Query)?;
            let words = hits
                .iter()
                .map(|hit| {
                    session
                        .topic(hit.topic)
                        .map(|topic| topic.top_words(settings.topics.display_keywords))
                })
                .collect::<TopicResult<Vec<_>>>()?;
            Ok(emitted(output.collection(&hits, "topics", || {
                create_topic_hits_table(&hits, &words)
            })))
        }

        Commands::SearchDocs {
            model,
            keywords,
            top_k,
        } => {
            let session = models.session(&model)?;
            let hits = session
                .search_documents(&keywords, top_k)
                .in_stage(Stage::Query)?;
            let rows: Vec<_> = hits.iter().map(|hit| (hit.clone(), session.text(hit))).collect();
            Ok(emitted(output.collection(&hits, "documents", || {
                create_document_hits_table(&rows)
            })))
        }

        Commands::TopicDocs {
            model,
            topic,
            top_k,
        } => {
            let session = models.session(&model)?;
            let topic = TopicId(topic);
            let hits = session.topic_documents(topic, top_k).in_stage(Stage::Query)?;
            let rows: Vec<_> = hits.iter().map(|hit| (hit.clone(), session.text(hit))).collect();
            let keywords = session.topic(topic)?.top_words(settings.topics.display_keywords);
            Ok(emitted(output.collection(&hits, "documents", || {
                format!(
                    "{}\n\n{}",
                    THEME.topic_line(topic, &keywords),
                    create_document_hits_table(&rows)
                )
            })))
        }

        Commands::SimilarWords {
            model,
            keywords,
            negative,
            top_k,
        } => {
            let session = models.session(&model)?;
            let words = session
                .similar_words(&keywords, &negative, top_k)
                .in_stage(Stage::Query)?;
            Ok(emitted(output.collection(&words, "words", || {
                create_keywords_table(&words)
            })))
        }

        Commands::Temporal {
            model,
            topic,
            granularity,
            zero_fill,
            dates,
        } => {
            let session = models.session(&model)?;
            let topic = TopicId(topic);
            let granularity = granularity.unwrap_or(settings.temporal.granularity);
            let mut options = settings.temporal_options(dates.range()?);
            if zero_fill {
                options.empty_buckets = EmptyBuckets::ZeroFill;
            }

            let distribution = session
                .temporal(topic, granularity, options)
                .in_stage(Stage::Query)?;
            let rows: Vec<PeriodCount> = distribution
                .iter()
                .map(|(period, documents)| PeriodCount {
                    period: period.label(),
                    start: period.start(),
                    documents,
                })
                .collect();
            let keywords = session.topic(topic)?.top_words(settings.topics.display_keywords);
            Ok(emitted(output.collection(&rows, "periods", || {
                format!(
                    "{} ({granularity})\n\n{}",
                    THEME.topic_line(topic, &keywords),
                    create_temporal_table(&distribution)
                )
            })))
        }

        Commands::Export { model, output: dir } => {
            let artifact = models.load(&model)?;
            let results_dir = settings.resolve(dir.as_ref().unwrap_or(&settings.paths.results_dir));
            let report = ResultExporter::new(settings.export.clone())
                .export(&artifact, &results_dir)
                .in_stage(Stage::Export)?;
            Ok(emitted(output.success(&report, || {
                let mut text = THEME.success_with_icon(&format!(
                    "Exported '{model}' to {}",
                    report.directory.display()
                ));
                for file in &report.files {
                    text.push_str(&format!("\n  {}", THEME.apply(&THEME.path, file.display())));
                }
                text
            })))
        }
    }
}

fn load_encoder(settings: &Settings) -> TopicResult<Arc<dyn EmbeddingGenerator>> {
    let cache_dir = settings
        .embedding
        .cache_dir
        .clone()
        .unwrap_or_else(default_model_cache_dir);
    let generator = FastEmbedGenerator::new(
        &settings.embedding.model,
        cache_dir,
        settings.embedding.batch_size,
        settings.embedding.show_download_progress,
    )?;
    Ok(Arc::new(generator))
}

/// Documents for a training run, from an archive or encoded from the corpus.
fn load_training_store(
    settings: &Settings,
    archive: &std::path::Path,
    corpus: Option<PathBuf>,
    generator: Option<Arc<dyn EmbeddingGenerator>>,
    quiet: bool,
) -> TopicResult<EmbeddingStore> {
    match (generator, corpus) {
        (Some(generator), Some(corpus)) => {
            let records = read_corpus(&corpus, &settings.corpus)?;
            let mut source = EncoderSource::new(records.texts.clone(), generator);
            let progress = (!quiet).then(|| {
                create_progress_bar(records.len() as u64, "Encoding documents")
            });
            let store = EmbeddingStore::from_source(
                records,
                &mut source,
                settings.embedding.batch_size,
                &mut |n| {
                    if let Some(bar) = &progress {
                        bar.inc(n as u64);
                    }
                },
            )?;
            if let Some(bar) = progress {
                bar.finish_and_clear();
            }
            Ok(store)
        }
        (Some(_), None) => Err(TopicError::invalid_parameter(
            "corpus",
            "none",
            "--encode needs a corpus CSV, pass --corpus or set paths.corpus",
        )),
        (None, Some(corpus)) => EmbeddingStore::load_with_corpus(archive, &corpus, &settings.corpus),
        (None, None) => EmbeddingStore::load(archive),
    }
}
