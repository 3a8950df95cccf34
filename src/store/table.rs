//! Columnar document table.
//!
//! Ids, publication dates, optional texts and embeddings live in one table
//! and every subset is taken through [`DocumentTable::select`], so the
//! per-document columns cannot drift apart.

use crate::error::{TopicError, TopicResult};
use crate::types::DocumentId;
use crate::vector::Matrix;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Format used when timestamps are written back to disk.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a publication timestamp in one of the accepted layouts.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`
/// (optionally with fractional seconds) and RFC 3339. Offsets are dropped
/// and the wall-clock date kept.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> TopicResult<Self> {
        if start > end {
            return Err(TopicError::invalid_parameter(
                "date_range",
                format!("{start}..{end}"),
                "start date must not be after end date",
            ));
        }
        Ok(Self { start, end })
    }

    /// January 1st of `start_year` to December 31st of `end_year`.
    pub fn years(start_year: i32, end_year: i32) -> TopicResult<Self> {
        let start = NaiveDate::from_ymd_opt(start_year, 1, 1);
        let end = NaiveDate::from_ymd_opt(end_year, 12, 31);
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Err(TopicError::invalid_parameter(
                "date_range",
                format!("{start_year}..{end_year}"),
                "years out of range",
            )),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRef<'a> {
    pub index: usize,
    pub id: &'a DocumentId,
    pub published: NaiveDateTime,
    pub text: Option<&'a str>,
    pub embedding: &'a [f32],
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTable {
    ids: Vec<DocumentId>,
    dates: Vec<NaiveDateTime>,
    texts: Option<Vec<String>>,
    vectors: Matrix,
    positions: HashMap<DocumentId, usize>,
}

impl DocumentTable {
    /// Build a table, checking that every column has one entry per vector.
    pub fn new(
        ids: Vec<DocumentId>,
        dates: Vec<NaiveDateTime>,
        texts: Option<Vec<String>>,
        vectors: Matrix,
    ) -> TopicResult<Self> {
        let expected = vectors.rows();
        if ids.len() != expected {
            return Err(TopicError::misaligned("doc_ids", expected, ids.len()));
        }
        if dates.len() != expected {
            return Err(TopicError::misaligned("pub_dates", expected, dates.len()));
        }
        if let Some(texts) = &texts {
            if texts.len() != expected {
                return Err(TopicError::misaligned("documents", expected, texts.len()));
            }
        }

        let mut positions = HashMap::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate() {
            if positions.insert(id.clone(), index).is_some() {
                return Err(TopicError::DuplicateKey {
                    kind: "document id",
                    key: id.to_string(),
                });
            }
        }

        Ok(Self {
            ids,
            dates,
            texts,
            vectors,
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[DocumentId] {
        &self.ids
    }

    pub fn dates(&self) -> &[NaiveDateTime] {
        &self.dates
    }

    pub fn texts(&self) -> Option<&[String]> {
        self.texts.as_deref()
    }

    pub fn vectors(&self) -> &Matrix {
        &self.vectors
    }

    pub fn position(&self, id: &DocumentId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn document(&self, index: usize) -> DocumentRef<'_> {
        DocumentRef {
            index,
            id: &self.ids[index],
            published: self.dates[index],
            text: self.texts.as_ref().map(|t| t[index].as_str()),
            embedding: self.vectors.row(index),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = DocumentRef<'_>> + '_ {
        (0..self.len()).map(|i| self.document(i))
    }

    /// New table with the given rows, in the given order, all columns together.
    pub fn select(&self, indices: &[usize]) -> Self {
        let ids: Vec<DocumentId> = indices.iter().map(|&i| self.ids[i].clone()).collect();
        let positions = ids
            .iter()
            .enumerate()
            .map(|(position, id)| (id.clone(), position))
            .collect();
        Self {
            dates: indices.iter().map(|&i| self.dates[i]).collect(),
            texts: self
                .texts
                .as_ref()
                .map(|t| indices.iter().map(|&i| t[i].clone()).collect()),
            vectors: self.vectors.select(indices),
            ids,
            positions,
        }
    }

    /// Rows published within the range (inclusive, by calendar date).
    pub fn filter_by_date_range(&self, range: &DateRange) -> Self {
        let keep: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, date)| range.contains(date.date()))
            .map(|(i, _)| i)
            .collect();
        self.select(&keep)
    }

    /// Earliest and latest publication dates.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.dates.iter().min()?.date();
        let max = self.dates.iter().max()?.date();
        Some((min, max))
    }

    /// Distinct publication years, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.dates.iter().map(|d| d.year()).collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_time(NaiveTime::MIN)
    }

    fn sample_table() -> DocumentTable {
        DocumentTable::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![date(2020, 1, 5), date(2021, 6, 1), date(2022, 12, 31)],
            Some(vec!["uno".into(), "dos".into(), "tres".into()]),
            Matrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_misaligned_dates_are_rejected() {
        let result = DocumentTable::new(
            vec!["a".into(), "b".into()],
            vec![date(2020, 1, 1)],
            None,
            Matrix::from_rows(vec![vec![1.0], vec![2.0]]).unwrap(),
        );
        match result {
            Err(TopicError::MisalignedArrays {
                field,
                expected,
                actual,
            }) => {
                assert_eq!(field, "pub_dates");
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("expected MisalignedArrays, got {other:?}"),
        }
    }

    #[test]
    fn test_misaligned_ids_and_texts_are_rejected() {
        let vectors = Matrix::from_rows(vec![vec![1.0], vec![2.0]]).unwrap();
        let ids_short = DocumentTable::new(
            vec!["a".into()],
            vec![date(2020, 1, 1), date(2020, 1, 2)],
            None,
            vectors.clone(),
        );
        assert!(matches!(ids_short, Err(TopicError::MisalignedArrays { .. })));

        let texts_long = DocumentTable::new(
            vec!["a".into(), "b".into()],
            vec![date(2020, 1, 1), date(2020, 1, 2)],
            Some(vec!["x".into(), "y".into(), "z".into()]),
            vectors,
        );
        assert!(matches!(texts_long, Err(TopicError::MisalignedArrays { .. })));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let result = DocumentTable::new(
            vec!["a".into(), "a".into()],
            vec![date(2020, 1, 1), date(2020, 1, 2)],
            None,
            Matrix::from_rows(vec![vec![1.0], vec![2.0]]).unwrap(),
        );
        assert!(matches!(result, Err(TopicError::DuplicateKey { .. })));
    }

    #[test]
    fn test_date_filter_moves_all_columns_together() {
        let table = sample_table();
        let range = DateRange::years(2021, 2022).unwrap();
        let filtered = table.filter_by_date_range(&range);

        assert_eq!(filtered.len(), 2);
        let first = filtered.document(0);
        assert_eq!(first.id.as_str(), "b");
        assert_eq!(first.text, Some("dos"));
        assert_eq!(first.embedding, &[0.0, 1.0]);
        assert_eq!(filtered.position(&"c".into()), Some(1));
        assert_eq!(filtered.position(&"a".into()), None);
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        assert_eq!(parse_timestamp("2023-03-15"), Some(date(2023, 3, 15)));
        assert!(parse_timestamp("2023-03-15 10:30:00").is_some());
        assert!(parse_timestamp("2023-03-15T10:30:00.250").is_some());
        assert!(parse_timestamp("2023-03-15T10:30:00-03:00").is_some());
        assert!(parse_timestamp("15/03/2023").is_none());
    }

    #[test]
    fn test_date_range_validation() {
        assert!(DateRange::years(2024, 2020).is_err());
        let range = DateRange::years(2020, 2020).unwrap();
        assert!(range.contains(NaiveDate::from_ymd_opt(2020, 12, 31).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()));
    }
}
