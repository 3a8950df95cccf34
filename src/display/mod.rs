//! Terminal display for the CLI: tables, progress and colours.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::{StageProgress, create_progress_bar, create_spinner, with_spinner};
pub use tables::{
    TableBuilder, create_document_hits_table, create_keywords_table, create_models_table,
    create_temporal_table, create_topic_hits_table, create_topics_table,
};
pub use theme::{THEME, Theme};
