use serde::Deserialize;

use crate::connection::GroupMode;
use crate::matching::{BucketStrategy, MatchMode};

/// Matching pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Candidate bucketing strategy
    pub bucket_strategy: BucketStrategy,
    /// Minimum normalized score for a valid match
    pub score_threshold: f64,
    /// One-to-one (greedy) or one-to-many selection
    pub match_mode: MatchMode,
    /// Fold flows sharing a 5-tuple into one connection
    pub merge_five_tuple: bool,
    /// Downsampling of oversized connection lists
    pub sampling: SamplingConfig,
}

impl Default for MatchConfig {
    fn default() -> MatchConfig {
        MatchConfig {
            bucket_strategy: BucketStrategy::Auto,
            score_threshold: 0.60,
            match_mode: MatchMode::OneToOne,
            merge_five_tuple: false,
            sampling: SamplingConfig::default(),
        }
    }
}

impl MatchConfig {
    pub fn group_mode(&self) -> GroupMode {
        if self.merge_five_tuple {
            GroupMode::FiveTupleMerge
        } else {
            GroupMode::PerFlow
        }
    }
}

/// Sampling configuration; disabled unless explicitly enabled.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub enabled: bool,
    /// Connection count above which sampling kicks in
    pub threshold: usize,
    /// Fraction of regular connections to keep, in `(0, 1]`
    pub rate: f64,
}

impl Default for SamplingConfig {
    fn default() -> SamplingConfig {
        SamplingConfig {
            enabled: false,
            threshold: 1000,
            rate: 0.5,
        }
    }
}
