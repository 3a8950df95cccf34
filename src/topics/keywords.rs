//! Keyword cleanup for display and export.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// A vocabulary token with its similarity to a topic centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub word: String,
    pub score: f32,
}

impl Keyword {
    pub fn new(word: impl Into<String>, score: f32) -> Self {
        Self {
            word: word.into(),
            score,
        }
    }
}

static EDGE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\W+|\W+$").expect("valid edge pattern"));

static DOTTED_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.[a-záéíóúñ]+$").expect("valid suffix pattern"));

static INNER_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[?!\-()\[\]"';:,]"#).expect("valid punctuation pattern"));

/// Particles glued to a token by a period, as in `inflación.el`.
const PARTICLE_SUFFIXES: &[&str] = &[
    ".el", ".la", ".de", ".y", ".en", ".los", ".las", ".un", ".una", ".al", ".del", ".por",
    ".con", ".sin", ".para", ".sobre", ".entre", ".o", ".u",
];

/// Canonical form of one keyword, or `None` if it should be dropped.
pub fn clean_keyword(word: &str) -> Option<String> {
    let mut cleaned = EDGE_PUNCTUATION.replace_all(word, "").into_owned();

    let lower = cleaned.to_lowercase();
    if DOTTED_SUFFIX.is_match(&cleaned) || PARTICLE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        cleaned = cleaned.split('.').next().unwrap_or_default().to_string();
    }
    let cleaned = INNER_PUNCTUATION.replace_all(&cleaned, "");

    if cleaned.is_empty() || cleaned.chars().any(|c| c.is_numeric()) {
        return None;
    }
    Some(cleaned.into_owned())
}

/// De-duplicate a ranked keyword list.
///
/// Keywords are visited in input order. Variants that differ only in case
/// or in a glued particle collapse to one entry holding the highest score;
/// tokens with digits are dropped. Stops once `target` distinct forms were
/// collected and returns them by descending score.
pub fn clean_keywords(keywords: &[Keyword], target: usize) -> Vec<Keyword> {
    if target == 0 {
        return Vec::new();
    }
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, Keyword> = HashMap::new();

    for keyword in keywords {
        let Some(cleaned) = clean_keyword(&keyword.word) else {
            continue;
        };
        let key = cleaned.to_lowercase();
        match best.get_mut(&key) {
            Some(existing) => {
                if keyword.score > existing.score {
                    *existing = Keyword::new(cleaned, keyword.score);
                }
            }
            None => {
                order.push(key.clone());
                best.insert(key, Keyword::new(cleaned, keyword.score));
            }
        }
        if best.len() >= target {
            break;
        }
    }

    let mut cleaned: Vec<Keyword> = order
        .into_iter()
        .filter_map(|key| best.remove(&key))
        .collect();
    // stable: equal scores keep first-seen order
    cleaned.sort_by(|a, b| b.score.total_cmp(&a.score));
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(words: &[&str]) -> Vec<Keyword> {
        words
            .iter()
            .enumerate()
            .map(|(i, w)| Keyword::new(*w, 1.0 - i as f32 * 0.1))
            .collect()
    }

    #[test]
    fn test_clean_keywords_collapses_variants() {
        let keywords = ranked(&["inflación", "inflación.el", "Inflación", "precio2"]);
        let cleaned = clean_keywords(&keywords, 10);

        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].word, "inflación");
        assert!((cleaned[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_clean_keyword_rules() {
        assert_eq!(clean_keyword("¿dólar?").as_deref(), Some("dólar"));
        assert_eq!(clean_keyword("banco.central").as_deref(), Some("banco"));
        assert_eq!(clean_keyword("tipo-cambio").as_deref(), Some("tipocambio"));
        assert_eq!(clean_keyword("\"fmi\"").as_deref(), Some("fmi"));
        assert_eq!(clean_keyword("covid19"), None);
        assert_eq!(clean_keyword("..."), None);
    }

    #[test]
    fn test_clean_keywords_stops_at_target() {
        let keywords = ranked(&["tasa", "Tasa", "dólar", "bono", "riesgo"]);
        let cleaned = clean_keywords(&keywords, 2);
        let words: Vec<&str> = cleaned.iter().map(|k| k.word.as_str()).collect();
        assert_eq!(words, vec!["tasa", "dólar"]);
    }

    #[test]
    fn test_higher_scoring_variant_wins() {
        let keywords = vec![
            Keyword::new("Empleo", 0.4),
            Keyword::new("empleo", 0.9),
            Keyword::new("salario", 0.5),
        ];
        let cleaned = clean_keywords(&keywords, 5);
        assert_eq!(cleaned[0], Keyword::new("empleo", 0.9));
        assert_eq!(cleaned[1].word, "salario");
    }
}
