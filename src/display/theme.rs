//! Terminal styling for CLI messages and topic listings.

use console::Style;
use owo_colors::OwoColorize;
use std::fmt::Display;
use std::sync::LazyLock;

/// Shared theme used by the CLI and the output manager.
pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

/// Styles for each kind of text the CLI prints.
#[derive(Debug, Clone)]
pub struct Theme {
    pub success: Style,
    pub error: Style,
    pub warning: Style,
    /// Topic labels
    pub header: Style,
    /// Recovery hints under an error
    pub dim: Style,
    pub path: Style,
    pub keyword: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Style::new().green().bright(),
            error: Style::new().red().bright(),
            warning: Style::new().yellow().bright(),
            header: Style::new().cyan().bold(),
            dim: Style::new().dim(),
            path: Style::new().magenta(),
            keyword: Style::new().yellow(),
        }
    }
}

impl Theme {
    fn with_icon(&self, icon: &str, colored_icon: String, style: &Style, text: &str) -> String {
        if Self::should_disable_colors() {
            format!("{icon} {text}")
        } else {
            format!("{colored_icon} {}", style.apply_to(text))
        }
    }

    pub fn success_with_icon(&self, text: &str) -> String {
        self.with_icon("✓", "✓".green().to_string(), &self.success, text)
    }

    pub fn error_with_icon(&self, text: &str) -> String {
        self.with_icon("✗", "✗".red().to_string(), &self.error, text)
    }

    pub fn warning_with_icon(&self, text: &str) -> String {
        self.with_icon("⚠", "⚠".yellow().to_string(), &self.warning, text)
    }

    /// `Topic 3: inflación, precios, ipc` with the keywords highlighted.
    pub fn topic_line(&self, topic: impl Display, words: &[&str]) -> String {
        format!(
            "{} {}",
            self.apply(&self.header, format!("Topic {topic}:")),
            self.apply(&self.keyword, words.join(", "))
        )
    }

    /// `NO_COLOR` set or stdout redirected.
    pub fn should_disable_colors() -> bool {
        use is_terminal::IsTerminal;
        std::env::var("NO_COLOR").is_ok() || !std::io::stdout().is_terminal()
    }

    /// `style` applied to `text` unless colours are disabled.
    pub fn apply<T: Display>(&self, style: &Style, text: T) -> String {
        if Self::should_disable_colors() {
            text.to_string()
        } else {
            style.apply_to(text).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icons_keep_the_message() {
        let theme = Theme::default();
        assert!(theme.error_with_icon("modelo no encontrado").contains("modelo no encontrado"));
        assert!(theme.success_with_icon("listo").contains("listo"));
        assert!(theme.topic_line(2, &["inflación", "precios"]).contains("inflación, precios"));
    }
}
