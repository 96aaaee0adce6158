use serde::{Deserialize, Serialize};

/// Outcome of scoring one candidate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    /// Normalized score in `[0, 1]` (matched weight over comparable
    /// weight)
    pub normalized: f64,
    /// Sum of weights of matched features
    pub raw: f64,
    /// Sum of weights of features that were comparable at all
    pub available_weight: f64,
    /// Whether the IP-ID necessary condition held
    pub ipid_match: bool,
    /// Tags of the features that matched, e.g. `synopt isnC ipid`
    pub evidence: String,
    /// Strong IP-ID evidence: accept regardless of the normalized score
    #[serde(default)]
    pub force_accept: bool,
    /// Short-flow rule satisfied without the standard IP-ID minimum
    #[serde(default)]
    pub microflow_accept: bool,
}

impl MatchScore {
    /// A pair is accepted at `threshold` iff the microflow rule fired,
    /// or the IP-ID condition held and the score clears the threshold
    /// (or the strong IP-ID path forces acceptance).
    pub fn is_accepted(&self, threshold: f64) -> bool {
        if self.microflow_accept {
            return true;
        }
        self.ipid_match && (self.normalized >= threshold || self.force_accept)
    }

    /// Rejection with a single evidence tag and nothing comparable.
    pub fn rejected(evidence: &str) -> MatchScore {
        MatchScore {
            normalized: 0.0,
            raw: 0.0,
            available_weight: 0.0,
            ipid_match: false,
            evidence: evidence.to_string(),
            force_accept: false,
            microflow_accept: false,
        }
    }

    /// Perfect-confidence score used by the exact-match stages.
    pub fn exact(evidence: String) -> MatchScore {
        MatchScore {
            normalized: 1.0,
            raw: 1.0,
            available_weight: 1.0,
            ipid_match: true,
            evidence,
            force_accept: true,
            microflow_accept: false,
        }
    }
}
