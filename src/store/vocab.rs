//! Vocabulary: ordered tokens with their word vectors, plus the tokenizer
//! used to build one from raw texts.

use crate::error::{TopicError, TopicResult};
use crate::vector::{Matrix, mean_vector};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

/// Runs of word characters without digits. Accents and ñ are kept.
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\W\d]+").expect("valid token pattern"));

const MIN_TOKEN_CHARS: usize = 2;
const MAX_TOKEN_CHARS: usize = 15;

/// Split a document into lowercase tokens.
///
/// HTML tags are stripped first; tokens shorter than 2 or longer than 15
/// characters and tokens starting with `_` are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let stripped = TAG_PATTERN.replace_all(text, " ");
    let lower = stripped.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|token| {
            let chars = token.chars().count();
            (MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS).contains(&chars) && !token.starts_with('_')
        })
        .map(str::to_string)
        .collect()
}

/// Tokens occurring at least `min_count` times across `texts`.
///
/// Ordered by descending frequency, then lexicographically, so the result
/// does not depend on document order.
pub fn build_vocabulary<S: AsRef<str>>(texts: &[S], min_count: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for token in tokenize(text.as_ref()) {
            *counts.entry(token).or_default() += 1;
        }
    }

    let mut tokens: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count >= min_count.max(1))
        .collect();
    tokens.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    tokens.into_iter().map(|(token, _)| token).collect()
}

/// Ordered vocabulary with one word vector per token.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    tokens: Vec<String>,
    vectors: Matrix,
    positions: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn new(tokens: Vec<String>, vectors: Matrix) -> TopicResult<Self> {
        if tokens.len() != vectors.rows() {
            return Err(TopicError::misaligned(
                "vocabulary",
                vectors.rows(),
                tokens.len(),
            ));
        }
        let mut positions = HashMap::with_capacity(tokens.len());
        for (index, token) in tokens.iter().enumerate() {
            if positions.insert(token.clone(), index).is_some() {
                return Err(TopicError::DuplicateKey {
                    kind: "vocabulary token",
                    key: token.clone(),
                });
            }
        }
        Ok(Self {
            tokens,
            vectors,
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn vectors(&self) -> &Matrix {
        &self.vectors
    }

    pub fn dim(&self) -> usize {
        self.vectors.dim()
    }

    pub fn token(&self, index: usize) -> &str {
        &self.tokens[index]
    }

    pub fn vector(&self, index: usize) -> &[f32] {
        self.vectors.row(index)
    }

    /// Exact lookup, falling back to the lowercase form.
    pub fn position(&self, term: &str) -> Option<usize> {
        let term = term.trim();
        self.positions
            .get(term)
            .or_else(|| self.positions.get(&term.to_lowercase()))
            .copied()
    }

    /// Resolve query terms to vocabulary positions.
    ///
    /// A multi-word term that is not a token itself contributes each of its
    /// known words. Returns the positions found and the terms that matched
    /// nothing.
    pub fn resolve_terms<S: AsRef<str>>(&self, terms: &[S]) -> (Vec<usize>, Vec<String>) {
        let mut found = Vec::new();
        let mut unknown = Vec::new();
        for term in terms {
            let term = term.as_ref();
            if let Some(position) = self.position(term) {
                found.push(position);
                continue;
            }
            let parts: Vec<usize> = term
                .split_whitespace()
                .filter_map(|word| self.position(word))
                .collect();
            if parts.is_empty() {
                unknown.push(term.to_string());
            } else {
                found.extend(parts);
            }
        }
        (found, unknown)
    }

    /// Mean vector of the known terms.
    ///
    /// Fails with `UnknownTerm` only when every term is out of vocabulary.
    pub fn query_vector<S: AsRef<str>>(&self, terms: &[S]) -> TopicResult<Vec<f32>> {
        let (found, unknown) = self.resolve_terms(terms);
        if !unknown.is_empty() {
            tracing::debug!(?unknown, "ignoring out-of-vocabulary terms");
        }
        mean_vector(found.iter().map(|&i| self.vector(i)), self.dim()).ok_or_else(|| {
            TopicError::UnknownTerm {
                terms: terms.iter().map(|t| t.as_ref().to_string()).collect(),
            }
        })
    }
}
