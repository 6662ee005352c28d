//! Cumulative target/decoy statistics and validation threshold search
//!
//! A series is a snapshot of a [`TargetDecoyMap`]: ranks are distinct scores
//! in ascending order (best hits first), and every array is accumulated from
//! rank 0 up to and including the given rank.

use crate::map::TargetDecoyMap;
use crate::point::TargetDecoyPoint;
use crate::results::{TargetDecoyResults, ThresholdType};
use crate::Error;

#[derive(Clone, Debug)]
pub struct TargetDecoySeries {
    scores: Vec<f64>,
    n_target: Vec<usize>,
    classical_fp: Vec<f64>,
    proba_fp: Vec<f64>,
    classical_fdr: Vec<f64>,
    proba_fdr: Vec<f64>,
    proba_fnr: Vec<f64>,
    confidence: Vec<f64>,
    pep: Vec<f64>,
    decoy_only: Vec<bool>,
    proba_n_total: f64,
}

/// Percentage, with an empty denominator mapping to 0% if there is nothing
/// to count either, and 100% otherwise
fn percent(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        100.0 * numerator / denominator
    } else if numerator > 0.0 {
        100.0
    } else {
        0.0
    }
}

impl TargetDecoySeries {
    /// Build a series from estimated points.
    ///
    /// # Errors
    /// * [`Error::EmptyMap`] if there are no points
    /// * [`Error::NotEstimated`] if any point is missing its PEP
    pub fn new<'a, I>(points: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (f64, &'a TargetDecoyPoint)>,
    {
        let mut points = points
            .into_iter()
            .map(|(score, point)| point.p.map(|p| (score, *point, p)))
            .collect::<Option<Vec<_>>>()
            .ok_or(Error::NotEstimated)?;
        if points.is_empty() {
            return Err(Error::EmptyMap);
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let proba_n_total = points
            .iter()
            .map(|(_, point, p)| point.n_target as f64 * (1.0 - p))
            .sum::<f64>();

        let len = points.len();
        let mut series = TargetDecoySeries {
            scores: Vec::with_capacity(len),
            n_target: Vec::with_capacity(len),
            classical_fp: Vec::with_capacity(len),
            proba_fp: Vec::with_capacity(len),
            classical_fdr: Vec::with_capacity(len),
            proba_fdr: Vec::with_capacity(len),
            proba_fnr: Vec::with_capacity(len),
            confidence: Vec::with_capacity(len),
            pep: Vec::with_capacity(len),
            decoy_only: Vec::with_capacity(len),
            proba_n_total,
        };

        let mut n_target = 0;
        let mut n_decoy = 0;
        let mut proba_fp = 0.0;
        let mut proba_tp = 0.0;
        for (score, point, p) in points {
            n_target += point.n_target;
            n_decoy += point.n_decoy;
            proba_fp += point.n_target as f64 * p;
            proba_tp += point.n_target as f64 * (1.0 - p);

            series.scores.push(score);
            series.n_target.push(n_target);
            series.classical_fp.push(n_decoy as f64);
            series.proba_fp.push(proba_fp);
            series
                .classical_fdr
                .push(percent(n_decoy as f64, n_target as f64));
            series.proba_fdr.push(percent(proba_fp, n_target as f64));
            series.proba_fnr.push(if proba_n_total > 0.0 {
                (100.0 * (proba_n_total - proba_tp) / proba_n_total).max(0.0)
            } else {
                0.0
            });
            series.confidence.push(100.0 * (1.0 - p));
            series.pep.push(100.0 * p);
            series.decoy_only.push(point.n_target == 0);
        }

        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Cumulative number of target hits
    pub fn n_target(&self) -> &[usize] {
        &self.n_target
    }

    /// Cumulative number of decoy hits
    pub fn classical_fp(&self) -> &[f64] {
        &self.classical_fp
    }

    /// Cumulative sum of `n_target * PEP`
    pub fn proba_fp(&self) -> &[f64] {
        &self.proba_fp
    }

    pub fn classical_fdr(&self) -> &[f64] {
        &self.classical_fdr
    }

    pub fn proba_fdr(&self) -> &[f64] {
        &self.proba_fdr
    }

    pub fn proba_fnr(&self) -> &[f64] {
        &self.proba_fnr
    }

    pub fn confidence(&self) -> &[f64] {
        &self.confidence
    }

    pub fn pep(&self) -> &[f64] {
        &self.pep
    }

    pub fn decoy_only(&self) -> &[bool] {
        &self.decoy_only
    }

    pub fn proba_n_total(&self) -> f64 {
        self.proba_n_total
    }

    fn estimators(&self, classical: bool) -> (&[f64], &[f64]) {
        match classical {
            true => (&self.classical_fdr, &self.classical_fp),
            false => (&self.proba_fdr, &self.proba_fp),
        }
    }

    fn select(&self, results: &mut TargetDecoyResults, rank: usize) {
        let (fdr, fp) = self.estimators(results.classical_estimators);
        results.no_validated = false;
        results.score_limit = self.scores[rank];
        results.confidence_limit = self.confidence[rank];
        results.fdr_limit = fdr[rank];
        results.fnr_limit = self.proba_fnr[rank];
        results.n = self.n_target[rank] as f64;
        results.n_fp = fp[rank];
        results.n_tp_total = self.proba_n_total;
    }

    fn select_none(&self, results: &mut TargetDecoyResults) {
        results.no_validated = true;
        results.score_limit = self.scores[0];
        results.confidence_limit = 100.0;
        results.fdr_limit = 0.0;
        results.fnr_limit = self.proba_fnr[0];
        results.n = 0.0;
        results.n_fp = 0.0;
        results.n_tp_total = self.proba_n_total;
    }

    /// Run the search requested by `results.threshold_type`
    pub fn results(&self, results: &mut TargetDecoyResults) {
        match results.threshold_type {
            ThresholdType::Confidence => self.confidence_results(results),
            ThresholdType::Fdr => self.fdr_results(results),
            ThresholdType::Fnr => self.fnr_results(results),
        }
    }

    /// Select the highest score whose cumulative FDR is within
    /// `results.user_input` percent, skipping decoy-only ranks
    pub fn fdr_results(&self, results: &mut TargetDecoyResults) {
        let (fdr, _) = self.estimators(results.classical_estimators);
        let threshold = results.user_input;
        match (0..self.len())
            .rev()
            .find(|&rank| fdr[rank] <= threshold && !self.decoy_only[rank])
        {
            Some(rank) => self.select(results, rank),
            None => self.select_none(results),
        }
    }

    /// Select the last non decoy-only rank before confidence first drops
    /// below `results.user_input` percent
    pub fn confidence_results(&self, results: &mut TargetDecoyResults) {
        let threshold = results.user_input;
        let boundary = self
            .confidence
            .iter()
            .position(|&confidence| confidence < threshold)
            .unwrap_or(self.len());
        match (0..boundary).rev().find(|&rank| !self.decoy_only[rank]) {
            Some(rank) => self.select(results, rank),
            None => self.select_none(results),
        }
    }

    /// Select the first non decoy-only rank above the highest score whose
    /// FNR exceeds `results.user_input` percent
    pub fn fnr_results(&self, results: &mut TargetDecoyResults) {
        let threshold = results.user_input;
        let start = (0..self.len())
            .rev()
            .find(|&rank| self.proba_fnr[rank] > threshold)
            .map(|rank| rank + 1)
            .unwrap_or(0);
        match (start..self.len()).find(|&rank| !self.decoy_only[rank]) {
            Some(rank) => self.select(results, rank),
            None => self.select_none(results),
        }
    }
}

impl TryFrom<&TargetDecoyMap> for TargetDecoySeries {
    type Error = Error;

    fn try_from(map: &TargetDecoyMap) -> Result<Self, Self::Error> {
        TargetDecoySeries::new(map.points())
    }
}
