use serde::{Deserialize, Serialize};

/// Which quantity the user constrains when picking a validation threshold
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdType {
    Confidence,
    #[default]
    Fdr,
    Fnr,
}

/// Operating point selected by a threshold search on a
/// [`crate::series::TargetDecoySeries`].
///
/// The request (`threshold_type`, `user_input` and the two estimator flags)
/// is filled in by the caller; the search writes everything else. All
/// percentages are in [0, 100].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetDecoyResults {
    pub threshold_type: ThresholdType,
    /// Requested limit, in percent
    pub user_input: f64,
    /// Estimate FDR and false positives from decoy counts rather than PEPs
    pub classical_estimators: bool,
    /// Validate hits against the score limit rather than their own confidence
    pub classical_validation: bool,

    pub score_limit: f64,
    pub confidence_limit: f64,
    pub fdr_limit: f64,
    pub fnr_limit: f64,
    /// Number of target hits retained
    pub n: f64,
    /// Estimated number of false positives among the retained hits
    pub n_fp: f64,
    /// Estimated number of true positives reachable in the whole map
    pub n_tp_total: f64,
    pub no_validated: bool,
}

impl Default for TargetDecoyResults {
    fn default() -> Self {
        Self::new(ThresholdType::Fdr, 1.0)
    }
}

impl TargetDecoyResults {
    pub fn new(threshold_type: ThresholdType, user_input: f64) -> Self {
        Self {
            threshold_type,
            user_input,
            classical_estimators: true,
            classical_validation: true,
            score_limit: 0.0,
            confidence_limit: 100.0,
            fdr_limit: 0.0,
            fnr_limit: 0.0,
            n: 0.0,
            n_fp: 0.0,
            n_tp_total: 0.0,
            no_validated: true,
        }
    }

    pub fn estimators(mut self, classical_estimators: bool, classical_validation: bool) -> Self {
        self.classical_estimators = classical_estimators;
        self.classical_validation = classical_validation;
        self
    }

    /// Estimated number of true positives among the retained hits
    pub fn n_tp(&self) -> f64 {
        self.n - self.n_fp
    }

    /// Does a hit with this score and PEP pass the selected threshold?
    pub fn validates(&self, score: f64, pep: f64) -> bool {
        if self.no_validated {
            return false;
        }
        match self.classical_validation {
            true => score <= self.score_limit,
            false => 100.0 * (1.0 - pep) >= self.confidence_limit,
        }
    }
}
