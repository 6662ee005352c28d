use serde::{Deserialize, Serialize};

/// PEP at or above which the probability curve is considered saturated:
/// every higher score is assigned a PEP of exactly 1
pub const SATURATION_PEP: f64 = 0.98;
/// Minimum Nmax for a map to be considered statistically meaningful
pub const MIN_NMAX: usize = 100;
/// Decoy-bearing scores at or above this value never close an Nmax run
pub const TAIL_SCORE: f64 = 1.0;
/// Default initial FDR (as a ratio) a category must be able to reach
pub const MINIMAL_FDR: f64 = 0.01;

#[derive(Deserialize, Serialize, Default, Clone, Debug)]
/// User-facing estimation settings, every field optional
pub struct Builder {
    /// PEP cutoff after which all higher scores get a PEP of 1
    pub saturation_pep: Option<f64>,
    /// Maps with an Nmax below this are merged away during curation
    pub min_nmax: Option<usize>,
    /// Scores at or above this value are ignored by the Nmax estimation
    pub tail_score: Option<f64>,
    /// Only close an Nmax run at a single-decoy score, or when the run is
    /// shorter than the target-only head
    pub strict_nmax: Option<bool>,
    /// Minimal FDR (ratio, 0.01 = 1%) a category must reach to stand alone
    pub minimal_fdr: Option<f64>,
}

impl Builder {
    pub fn make_parameters(self) -> EstimationParameters {
        let default = EstimationParameters::default();

        let saturation_pep = self.saturation_pep.unwrap_or(default.saturation_pep);
        let saturation_pep = if (0.0..=1.0).contains(&saturation_pep) {
            saturation_pep
        } else {
            log::warn!(
                "saturation_pep {} is outside of [0, 1], clamping",
                saturation_pep
            );
            saturation_pep.clamp(0.0, 1.0)
        };

        let minimal_fdr = self.minimal_fdr.unwrap_or(default.minimal_fdr);
        let minimal_fdr = if minimal_fdr < 0.0 {
            log::warn!("minimal_fdr {} is negative, using 0", minimal_fdr);
            0.0
        } else {
            if minimal_fdr > 1.0 {
                log::warn!(
                    "minimal_fdr is a ratio, {} looks like a percentage",
                    minimal_fdr
                );
            }
            minimal_fdr
        };

        EstimationParameters {
            saturation_pep,
            min_nmax: self.min_nmax.unwrap_or(default.min_nmax),
            tail_score: self.tail_score.unwrap_or(default.tail_score),
            strict_nmax: self.strict_nmax.unwrap_or(default.strict_nmax),
            minimal_fdr,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimationParameters {
    pub saturation_pep: f64,
    pub min_nmax: usize,
    pub tail_score: f64,
    pub strict_nmax: bool,
    pub minimal_fdr: f64,
}

impl Default for EstimationParameters {
    fn default() -> Self {
        Self {
            saturation_pep: SATURATION_PEP,
            min_nmax: MIN_NMAX,
            tail_score: TAIL_SCORE,
            strict_nmax: true,
            minimal_fdr: MINIMAL_FDR,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let parameters = Builder::default().make_parameters();
        assert_eq!(parameters, EstimationParameters::default());
        assert_eq!(parameters.saturation_pep, 0.98);
        assert_eq!(parameters.min_nmax, 100);
        assert!(parameters.strict_nmax);
    }

    #[test]
    fn clamp_out_of_range() {
        let parameters = Builder {
            saturation_pep: Some(1.5),
            minimal_fdr: Some(-0.1),
            ..Default::default()
        }
        .make_parameters();
        assert_eq!(parameters.saturation_pep, 1.0);
        assert_eq!(parameters.minimal_fdr, 0.0);
    }
}
