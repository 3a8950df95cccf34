//! Bucketing publication dates into calendar periods.

use crate::error::TopicError;
use crate::store::DateRange;
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// Width of a temporal bucket, ordered from finest to coarsest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    /// ISO week, starting on Monday.
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Granularity {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "d" => Ok(Self::Day),
            "week" | "w" => Ok(Self::Week),
            "month" | "m" => Ok(Self::Month),
            "quarter" | "q" => Ok(Self::Quarter),
            "year" | "y" => Ok(Self::Year),
            other => Err(TopicError::invalid_parameter(
                "granularity",
                other,
                "expected day, week, month, quarter or year",
            )),
        }
    }
}

/// What to do with periods that have no documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyBuckets {
    #[default]
    Omit,
    ZeroFill,
}

/// One calendar bucket, identified by its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    start: NaiveDate,
    granularity: Granularity,
}

impl Period {
    /// The bucket of `granularity` that contains `date`.
    pub fn containing(granularity: Granularity, date: NaiveDate) -> Self {
        let start = match granularity {
            Granularity::Day => date,
            Granularity::Week => {
                date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
            Granularity::Quarter => {
                let month = (date.month0() / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
            }
            Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        };
        Self { start, granularity }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// The following bucket, `None` past the end of the calendar.
    pub fn next(&self) -> Option<Self> {
        let start = match self.granularity {
            Granularity::Day => self.start.succ_opt(),
            Granularity::Week => self.start.checked_add_days(chrono::Days::new(7)),
            Granularity::Month => self.start.checked_add_months(Months::new(1)),
            Granularity::Quarter => self.start.checked_add_months(Months::new(3)),
            Granularity::Year => self.start.checked_add_months(Months::new(12)),
        }?;
        Some(Self {
            start,
            granularity: self.granularity,
        })
    }

    /// `2024-03-15`, `2024-W11`, `2024-03`, `2024-Q1` or `2024`.
    pub fn label(&self) -> String {
        let d = self.start;
        match self.granularity {
            Granularity::Day => d.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let week = d.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Granularity::Month => d.format("%Y-%m").to_string(),
            Granularity::Quarter => format!("{}-Q{}", d.year(), d.month0() / 3 + 1),
            Granularity::Year => d.year().to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

/// Options for a temporal distribution.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalOptions {
    /// Only count documents published within this range, inclusive.
    pub range: Option<DateRange>,
    pub empty_buckets: EmptyBuckets,
}

/// Document counts per period, ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalDistribution {
    granularity: Granularity,
    empty_buckets: EmptyBuckets,
    counts: BTreeMap<Period, usize>,
    span: Option<(Period, Period)>,
}

impl TemporalDistribution {
    pub fn from_dates(
        dates: impl IntoIterator<Item = NaiveDate>,
        granularity: Granularity,
        options: TemporalOptions,
    ) -> Self {
        let mut counts = BTreeMap::new();
        for date in dates {
            if options.range.is_some_and(|r| !r.contains(date)) {
                continue;
            }
            *counts
                .entry(Period::containing(granularity, date))
                .or_insert(0) += 1;
        }

        let span = match options.range {
            Some(range) => Some((
                Period::containing(granularity, range.start),
                Period::containing(granularity, range.end),
            )),
            None => counts
                .keys()
                .next()
                .copied()
                .zip(counts.keys().next_back().copied()),
        };

        Self {
            granularity,
            empty_buckets: options.empty_buckets,
            counts,
            span,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Documents counted across all periods.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count for one period, zero when absent.
    pub fn count(&self, period: &Period) -> usize {
        self.counts.get(period).copied().unwrap_or(0)
    }

    /// Walk the periods in ascending order.
    ///
    /// Every call starts a fresh pass; periods are produced on demand, so
    /// zero-filled ranges are never materialised.
    pub fn iter(&self) -> TemporalIter<'_> {
        match (self.empty_buckets, self.span) {
            (EmptyBuckets::ZeroFill, Some((first, last))) => TemporalIter::Dense {
                next: Some(first),
                last,
                counts: &self.counts,
            },
            _ => TemporalIter::Sparse(self.counts.iter()),
        }
    }
}

impl<'a> IntoIterator for &'a TemporalDistribution {
    type Item = (Period, usize);
    type IntoIter = TemporalIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator returned by [`TemporalDistribution::iter`].
pub enum TemporalIter<'a> {
    /// Counted periods only.
    Sparse(btree_map::Iter<'a, Period, usize>),
    /// Every period from the first to the last, zero where nothing was counted.
    Dense {
        next: Option<Period>,
        last: Period,
        counts: &'a BTreeMap<Period, usize>,
    },
}

impl Iterator for TemporalIter<'_> {
    type Item = (Period, usize);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            TemporalIter::Sparse(iter) => iter.next().map(|(period, count)| (*period, *count)),
            TemporalIter::Dense { next, last, counts } => {
                let current = (*next)?;
                if current > *last {
                    *next = None;
                    return None;
                }
                *next = current.next();
                Some((current, counts.get(&current).copied().unwrap_or(0)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn january_and_march() -> Vec<NaiveDate> {
        vec![day(2023, 1, 5), day(2023, 1, 20), day(2023, 3, 2)]
    }

    #[test]
    fn test_periods_order_by_start_date() {
        let mut periods = vec![
            Period::containing(Granularity::Quarter, day(2023, 8, 14)),
            Period::containing(Granularity::Quarter, day(2022, 12, 31)),
            Period::containing(Granularity::Quarter, day(2023, 2, 1)),
        ];
        periods.sort();
        let labels: Vec<String> = periods.iter().map(Period::label).collect();
        assert_eq!(labels, vec!["2022-Q4", "2023-Q1", "2023-Q3"]);

        assert!(Granularity::Day < Granularity::Year);
        let distribution = TemporalDistribution::from_dates(
            vec![day(2024, 3, 1), day(2021, 6, 1), day(2024, 1, 9)],
            Granularity::Year,
            TemporalOptions::default(),
        );
        let years: Vec<(NaiveDate, usize)> =
            distribution.iter().map(|(p, c)| (p.start(), c)).collect();
        assert_eq!(years, vec![(day(2021, 1, 1), 1), (day(2024, 1, 1), 2)]);
    }

    #[test]
    fn test_empty_months_are_omitted() {
        let range = DateRange::new(day(2023, 1, 1), day(2023, 4, 30)).unwrap();
        let distribution = TemporalDistribution::from_dates(
            january_and_march(),
            Granularity::Month,
            TemporalOptions {
                range: Some(range),
                ..TemporalOptions::default()
            },
        );

        let entries: Vec<(String, usize)> =
            distribution.iter().map(|(p, c)| (p.label(), c)).collect();
        assert_eq!(
            entries,
            vec![("2023-01".to_string(), 2), ("2023-03".to_string(), 1)]
        );
    }

    #[test]
    fn test_zero_fill_covers_requested_range() {
        let range = DateRange::new(day(2023, 1, 1), day(2023, 4, 30)).unwrap();
        let distribution = TemporalDistribution::from_dates(
            january_and_march(),
            Granularity::Month,
            TemporalOptions {
                range: Some(range),
                empty_buckets: EmptyBuckets::ZeroFill,
            },
        );

        let counts: Vec<usize> = distribution.iter().map(|(_, c)| c).collect();
        assert_eq!(counts, vec![2, 0, 1, 0]);
    }

    #[test]
    fn test_iteration_is_restartable() {
        let distribution = TemporalDistribution::from_dates(
            january_and_march(),
            Granularity::Quarter,
            TemporalOptions::default(),
        );
        let first: Vec<_> = distribution.iter().collect();
        let second: Vec<_> = (&distribution).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0.label(), "2023-Q1");
        assert_eq!(distribution.total(), 3);
    }

    #[test]
    fn test_period_labels_and_weeks_start_monday() {
        // 2024-03-14 is a Thursday
        let week = Period::containing(Granularity::Week, day(2024, 3, 14));
        assert_eq!(week.start(), day(2024, 3, 11));
        assert_eq!(week.label(), "2024-W11");

        // ISO week 1 of 2025 starts in December 2024
        let week = Period::containing(Granularity::Week, day(2024, 12, 31));
        assert_eq!(week.label(), "2025-W01");

        assert_eq!(Period::containing(Granularity::Day, day(2024, 3, 14)).label(), "2024-03-14");
        assert_eq!(Period::containing(Granularity::Quarter, day(2024, 11, 2)).label(), "2024-Q4");
        assert_eq!(Period::containing(Granularity::Year, day(2024, 11, 2)).label(), "2024");
    }

    #[test]
    fn test_dense_iteration_with_weeks() {
        let distribution = TemporalDistribution::from_dates(
            vec![day(2024, 1, 1), day(2024, 1, 22)],
            Granularity::Week,
            TemporalOptions {
                range: None,
                empty_buckets: EmptyBuckets::ZeroFill,
            },
        );
        let counts: Vec<usize> = distribution.iter().map(|(_, c)| c).collect();
        assert_eq!(counts, vec![1, 0, 0, 1]);
    }

    #[test]
    fn test_parse_granularity() {
        assert_eq!("Month".parse::<Granularity>().unwrap(), Granularity::Month);
        assert!("decade".parse::<Granularity>().is_err());
    }
}
