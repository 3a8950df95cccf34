//! Topics: synthesis from clusters, keyword cleanup, document assignment
//! and temporal distributions.

pub mod index;
pub mod keywords;
pub mod synthesize;
pub mod temporal;

pub use index::{DocumentHit, TopicAssignment, TopicAssignmentIndex, TopicHit};
pub use keywords::{Keyword, clean_keyword, clean_keywords};
pub use synthesize::{MergeConfig, Topic, TopicSet, TopicSynthesizer, rank_keywords};
pub use temporal::{
    EmptyBuckets, Granularity, Period, TemporalDistribution, TemporalIter, TemporalOptions,
};
