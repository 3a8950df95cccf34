//! Progress reporting for training and encoding.

use crate::error::Stage;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Create a styled progress bar for batch encoding.
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a spinner for indeterminate progress.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn stage_message(stage: Stage) -> &'static str {
    match stage {
        Stage::Load => "Loading documents and vocabulary",
        Stage::Reduce => "Reducing embeddings",
        Stage::Cluster => "Clustering documents",
        Stage::Synthesize => "Extracting topics",
        Stage::Assign => "Assigning documents to topics",
        Stage::Persist => "Saving model",
        Stage::Export => "Exporting results",
        Stage::Query => "Querying model",
    }
}

/// Spinner that follows the training stages and records how long each took.
pub struct StageProgress {
    spinner: Option<ProgressBar>,
    current: Option<(Stage, Instant)>,
    timings: Vec<(Stage, Duration)>,
}

impl StageProgress {
    /// `quiet` suppresses the spinner but still records timings.
    pub fn new(quiet: bool) -> Self {
        Self {
            spinner: (!quiet).then(|| create_spinner("Starting")),
            current: None,
            timings: Vec::new(),
        }
    }

    /// Mark the start of `stage`, closing the previous one.
    pub fn enter(&mut self, stage: Stage) {
        self.close_current();
        if let Some(spinner) = &self.spinner {
            spinner.set_message(stage_message(stage));
        }
        self.current = Some((stage, Instant::now()));
    }

    fn close_current(&mut self) {
        if let Some((stage, started)) = self.current.take() {
            self.timings.push((stage, started.elapsed()));
        }
    }

    /// Stop the spinner and return the per-stage durations.
    pub fn finish(mut self) -> Vec<(Stage, Duration)> {
        self.close_current();
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
        self.timings
    }
}

/// Helper to display a temporary spinner during an operation.
pub fn with_spinner<F, T>(message: &str, operation: F) -> T
where
    F: FnOnce() -> T,
{
    let spinner = create_spinner(message);
    let result = operation();
    spinner.finish_and_clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progress_records_each_stage() {
        let mut progress = StageProgress::new(true);
        progress.enter(Stage::Load);
        progress.enter(Stage::Reduce);
        progress.enter(Stage::Cluster);

        let stages: Vec<Stage> = progress.finish().into_iter().map(|(s, _)| s).collect();
        assert_eq!(stages, vec![Stage::Load, Stage::Reduce, Stage::Cluster]);
    }
}
