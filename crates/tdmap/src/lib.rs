//! Target/decoy statistics for proteomics identifications.
//!
//! Scored target and decoy hits are accumulated per category into a
//! [`map::TargetDecoyMap`], weak categories are merged away, and a smoothed
//! posterior error probability (PEP) curve is estimated for every surviving
//! category. A [`series::TargetDecoySeries`] turns a PEP curve into
//! cumulative FDR/FNR/confidence arrays used to pick a validation threshold.

pub mod input;
pub mod map;
pub mod parameters;
pub mod point;
pub mod progress;
pub mod results;
pub mod series;
pub mod specific;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Scores must be finite; NaN and infinities can't be placed on the score axis
    NonFiniteScore(f64),
    /// Attempted to remove an observation that was never added
    MissingObservation { score: f64, decoy: bool },
    /// PEP was requested before `estimate_probabilities` completed
    NotEstimated,
    /// The operation requires at least one observation
    EmptyMap,
    /// Observations can't be added once a container has been curated
    AlreadyCurated,
    /// No category, grouped or surviving, is registered under this key
    UnknownCategory(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFiniteScore(s) => write!(f, "score {} is not finite", s),
            Self::MissingObservation { score, decoy } => write!(
                f,
                "no {} observation recorded at score {}",
                if *decoy { "decoy" } else { "target" },
                score
            ),
            Self::NotEstimated => f.write_str("probabilities have not been estimated"),
            Self::EmptyMap => f.write_str("target/decoy map contains no observations"),
            Self::AlreadyCurated => {
                f.write_str("observations added after the categories were curated")
            }
            Self::UnknownCategory(key) => write!(f, "unknown category `{}`", key),
        }
    }
}

impl std::error::Error for Error {}
