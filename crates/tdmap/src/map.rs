//! Per-category accumulation of target/decoy hits and PEP estimation
//!
//! Scores follow the e-value convention: lower is better. The map is swept in
//! ascending score order, starting with the most confident hits.
//!
//! Posterior error probabilities are estimated with an adaptive-width sliding
//! window holding roughly `window_size` target hits around each score; the
//! PEP of a score is the fraction of decoys over targets inside the window.

use crate::parameters::EstimationParameters;
use crate::point::TargetDecoyPoint;
use crate::progress::{Estimation, Progress};
use crate::results::TargetDecoyResults;
use crate::series::TargetDecoySeries;
use crate::Error;
use fnv::FnvHashMap;
use std::collections::hash_map::Entry;
use std::sync::OnceLock;

/// Map a score onto a hashable key. -0.0 and 0.0 share a key
fn score_key(score: f64) -> Result<u64, Error> {
    if !score.is_finite() {
        return Err(Error::NonFiniteScore(score));
    }
    Ok((score + 0.0).to_bits())
}

/// Summary statistics derived from the score distribution
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Metrics {
    /// Largest run of target hits between two decoy-bearing scores
    pub nmax: usize,
    /// Target hits observed before the first decoy
    pub n_target_only: usize,
    /// Minimal cumulative decoy/target ratio, 1.0 if no decoy was seen
    pub min_fdr: f64,
}

#[derive(Clone, Debug, Default)]
pub struct TargetDecoyMap {
    hits: FnvHashMap<u64, TargetDecoyPoint>,
    parameters: EstimationParameters,
    /// User override of the smoothing window, defaults to Nmax
    window_size: Option<usize>,
    results: TargetDecoyResults,

    scores: OnceLock<Vec<f64>>,
    metrics: OnceLock<Metrics>,
}

impl TargetDecoyMap {
    pub fn new(parameters: EstimationParameters) -> Self {
        Self {
            parameters,
            ..Default::default()
        }
    }

    /// Rebuild a map from stored points, e.g. when reloading a saved analysis.
    /// Empty points are skipped, PEPs are kept as-is.
    pub fn from_points<I>(parameters: EstimationParameters, points: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (f64, TargetDecoyPoint)>,
    {
        let mut map = Self::new(parameters);
        for (score, point) in points {
            if point.is_empty() {
                continue;
            }
            let key = score_key(score)?;
            let entry = map.hits.entry(key).or_default();
            entry.n_target += point.n_target;
            entry.n_decoy += point.n_decoy;
            entry.p = point.p;
        }
        Ok(map)
    }

    fn invalidate(&mut self, new_score: bool) {
        if new_score {
            self.scores.take();
        }
        self.metrics.take();
    }

    /// Record one hit at `score`
    pub fn put(&mut self, score: f64, decoy: bool) -> Result<(), Error> {
        let key = score_key(score)?;
        let new_score = match self.hits.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().add(decoy);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(TargetDecoyPoint::default()).add(decoy);
                true
            }
        };
        self.invalidate(new_score);
        Ok(())
    }

    /// Remove one previously recorded hit, discarding the point once it is empty
    pub fn remove(&mut self, score: f64, decoy: bool) -> Result<(), Error> {
        let key = score_key(score)?;
        let point = self
            .hits
            .get_mut(&key)
            .filter(|point| point.count(decoy) > 0)
            .ok_or(Error::MissingObservation { score, decoy })?;
        point.remove(decoy);
        let emptied = point.is_empty();
        if emptied {
            self.hits.remove(&key);
        }
        self.invalidate(emptied);
        Ok(())
    }

    /// Merge every hit of `other` into this map. Merged points must be
    /// estimated again.
    pub fn add_all(&mut self, other: &TargetDecoyMap) {
        if other.is_empty() {
            return;
        }
        let mut new_score = false;
        for (key, point) in &other.hits {
            let entry = self.hits.entry(*key).or_insert_with(|| {
                new_score = true;
                TargetDecoyPoint::default()
            });
            entry.n_target += point.n_target;
            entry.n_decoy += point.n_decoy;
            entry.p = None;
        }
        self.invalidate(new_score);
    }

    /// Distinct scores, ascending
    pub fn scores(&self) -> &[f64] {
        self.scores.get_or_init(|| {
            let mut scores = self
                .hits
                .keys()
                .map(|key| f64::from_bits(*key))
                .collect::<Vec<_>>();
            scores.sort_by(|a, b| a.total_cmp(b));
            scores
        })
    }

    /// Points in ascending score order
    pub fn points(&self) -> impl Iterator<Item = (f64, &TargetDecoyPoint)> + '_ {
        self.scores()
            .iter()
            .map(move |score| (*score, &self.hits[&score.to_bits()]))
    }

    pub fn point(&self, score: f64) -> Option<&TargetDecoyPoint> {
        score_key(score).ok().and_then(|key| self.hits.get(&key))
    }

    /// Number of distinct scores
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn n_target(&self) -> usize {
        self.hits.values().map(|p| p.n_target).sum()
    }

    pub fn n_decoy(&self) -> usize {
        self.hits.values().map(|p| p.n_decoy).sum()
    }

    pub fn min_score(&self) -> Option<f64> {
        self.scores().first().copied()
    }

    pub fn max_score(&self) -> Option<f64> {
        self.scores().last().copied()
    }

    pub fn parameters(&self) -> &EstimationParameters {
        &self.parameters
    }

    pub fn metrics(&self) -> Metrics {
        *self.metrics.get_or_init(|| self.estimate_ns())
    }

    pub fn nmax(&self) -> usize {
        self.metrics().nmax
    }

    pub fn n_target_only(&self) -> usize {
        self.metrics().n_target_only
    }

    pub fn min_fdr(&self) -> f64 {
        self.metrics().min_fdr
    }

    /// Smallest PEP step, in percent, the data can resolve; 0 without Nmax
    pub fn resolution(&self) -> f64 {
        match self.nmax() {
            0 => 0.0,
            nmax => 100.0 / nmax as f64,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size.unwrap_or_else(|| self.nmax())
    }

    /// The user override, if any
    pub fn window_size_override(&self) -> Option<usize> {
        self.window_size
    }

    pub fn set_window_size(&mut self, window_size: Option<usize>) {
        self.window_size = window_size;
    }

    /// Is this map too sparse, or unable to reach `initial_fdr`?
    pub fn suspicious_input(&self, initial_fdr: f64) -> bool {
        let metrics = self.metrics();
        metrics.nmax < self.parameters.min_nmax || metrics.min_fdr > initial_fdr
    }

    fn estimate_ns(&self) -> Metrics {
        let tail_score = self.parameters.tail_score;
        let strict = self.parameters.strict_nmax;

        let mut decoy_found = false;
        let mut n_target_only = 0;
        let mut nmax = 0;
        let mut target_cpt = 0;

        let mut cumulative_target = 0;
        let mut cumulative_decoy = 0;
        let mut min_fdr = 1.0f64;

        for (score, point) in self.points() {
            let (n_target, n_decoy) = (point.n_target, point.n_decoy);

            cumulative_target += n_target;
            cumulative_decoy += n_decoy;
            if cumulative_target > 0 && cumulative_decoy > 0 {
                min_fdr = min_fdr.min(cumulative_decoy as f64 / cumulative_target as f64);
            }

            // Targets sitting at a decoy-bearing score are split in half
            // between the run that closes there and the run that starts there
            if !decoy_found {
                if n_decoy == 0 {
                    n_target_only += n_target;
                } else {
                    decoy_found = true;
                    n_target_only += n_target - n_target / 2;
                    target_cpt = n_target / 2;
                }
            } else if n_decoy > 0 && score < tail_score {
                target_cpt += n_target - n_target / 2;
                if target_cpt > nmax && (!strict || n_decoy == 1 || target_cpt < n_target_only) {
                    nmax = target_cpt;
                }
                target_cpt = n_target / 2;
            } else {
                target_cpt += n_target;
            }
        }

        log::trace!(
            "nmax: {}, target only: {}, min fdr: {:.4}",
            nmax,
            n_target_only,
            min_fdr
        );

        Metrics {
            nmax,
            n_target_only,
            min_fdr,
        }
    }

    /// Estimate the PEP of every score.
    ///
    /// The window around the score at rank `i` spans ranks `inf..sup`.
    /// `n_target_inf` counts the targets from `inf` up to half of rank `i`,
    /// `n_target_sup` the other half of rank `i` up to `sup`. The lower edge
    /// moves up while more than half a window of targets remains below, the
    /// upper edge moves up until half a window of targets is above.
    ///
    /// Once a PEP reaches `saturation_pep`, all higher scores get a PEP of 1.
    ///
    /// If `progress` is canceled, PEPs of the remaining scores are left unset.
    pub fn estimate_probabilities<P: Progress + ?Sized>(&mut self, progress: &P) -> Estimation {
        for point in self.hits.values_mut() {
            point.p = None;
        }
        if self.is_empty() {
            return Estimation::Complete;
        }

        let limit = 0.5 * self.window_size() as f64;
        let saturation = self.parameters.saturation_pep;
        let scores = self.scores().to_vec();
        let counts = self
            .points()
            .map(|(_, point)| (point.n_target as f64, point.n_decoy as f64))
            .collect::<Vec<_>>();

        let (first_target, first_decoy) = counts[0];
        let mut n_target_inf = -0.5 * first_target;
        let mut n_target_sup = 1.5 * first_target;
        let mut n_decoy = first_decoy;
        let mut inf = 0;
        let mut sup = 1;
        let mut previous = first_target;
        let mut saturated = false;

        for (ix, &(n_target, _)) in counts.iter().enumerate() {
            if progress.is_canceled() {
                log::warn!(
                    "probability estimation canceled after {}/{} scores",
                    ix,
                    counts.len()
                );
                return Estimation::Canceled;
            }

            let p = if saturated {
                1.0
            } else {
                let change = 0.5 * (previous + n_target);
                n_target_inf += change;
                n_target_sup -= change;

                while n_target_inf > limit && inf < ix {
                    let (t, d) = counts[inf];
                    let remaining = n_target_inf - t;
                    if remaining < limit {
                        break;
                    }
                    n_target_inf = remaining;
                    n_decoy -= d;
                    inf += 1;
                }

                while (sup <= ix || n_target_sup < limit) && sup < counts.len() {
                    let (t, d) = counts[sup];
                    n_target_sup += t;
                    n_decoy += d;
                    sup += 1;
                }

                let p = window_pep(n_decoy, n_target_inf + n_target_sup);
                saturated = p >= saturation;
                p
            };

            if let Some(point) = self.hits.get_mut(&scores[ix].to_bits()) {
                point.p = Some(p);
            }
            previous = n_target;
            progress.increase_progress();
        }

        Estimation::Complete
    }

    /// Have all scores been assigned a PEP?
    pub fn is_estimated(&self) -> bool {
        !self.is_empty() && self.hits.values().all(|point| point.p.is_some())
    }

    /// PEP at `score`. Scores between two observed scores are linearly
    /// interpolated, scores outside the observed range take the PEP of the
    /// closest observed score.
    pub fn probability(&self, score: f64) -> Result<f64, Error> {
        let key = score_key(score)?;
        if let Some(point) = self.hits.get(&key) {
            return point.p.ok_or(Error::NotEstimated);
        }

        let scores = self.scores();
        let pep = |score: f64| self.hits[&score.to_bits()].p.ok_or(Error::NotEstimated);
        match scores.partition_point(|s| *s < score) {
            _ if scores.is_empty() => Err(Error::EmptyMap),
            0 => pep(scores[0]),
            ix if ix == scores.len() => pep(scores[ix - 1]),
            ix => {
                let (lo, hi) = (scores[ix - 1], scores[ix]);
                let (p_lo, p_hi) = (pep(lo)?, pep(hi)?);
                Ok(p_lo + (p_hi - p_lo) * (score - lo) / (hi - lo))
            }
        }
    }

    pub fn series(&self) -> Result<TargetDecoySeries, Error> {
        TargetDecoySeries::try_from(self)
    }

    /// Results of the last threshold search on this map
    pub fn results(&self) -> &TargetDecoyResults {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut TargetDecoyResults {
        &mut self.results
    }

    /// Run the threshold search described by `request` and keep its outcome
    pub fn validate(&mut self, request: TargetDecoyResults) -> Result<&TargetDecoyResults, Error> {
        let series = self.series()?;
        self.results = request;
        series.results(&mut self.results);
        Ok(&self.results)
    }
}

/// Window PEP: decoys over targets, clamped to [0, 1]. A window without
/// targets is certain to be wrong if it holds any decoy.
fn window_pep(n_decoy: f64, n_target: f64) -> f64 {
    if n_target > 0.0 {
        (n_decoy / n_target).clamp(0.0, 1.0)
    } else if n_decoy > 0.0 {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::progress::ProgressCounter;
    use crate::results::ThresholdType;
    use quickcheck_macros::quickcheck;

    fn build(points: &[(f64, usize, usize)]) -> TargetDecoyMap {
        let mut map = TargetDecoyMap::default();
        for &(score, n_target, n_decoy) in points {
            for _ in 0..n_target {
                map.put(score, false).unwrap();
            }
            for _ in 0..n_decoy {
                map.put(score, true).unwrap();
            }
        }
        map
    }

    fn peps(map: &TargetDecoyMap) -> Vec<f64> {
        map.points().map(|(_, point)| point.p.unwrap()).collect()
    }

    #[test]
    fn put_remove_inverse() {
        let mut map = TargetDecoyMap::default();
        map.put(0.25, false).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.scores(), &[0.25]);
        map.remove(0.25, false).unwrap();
        assert!(map.is_empty());
        assert!(map.scores().is_empty());
        assert_eq!(map.point(0.25), None);
    }

    #[test]
    fn remove_missing() {
        let mut map = build(&[(0.5, 1, 0)]);
        assert_eq!(
            map.remove(0.5, true),
            Err(Error::MissingObservation {
                score: 0.5,
                decoy: true
            })
        );
        assert!(map.remove(0.7, false).is_err());
        assert_eq!(map.n_target(), 1);
    }

    #[test]
    fn reject_non_finite() {
        let mut map = TargetDecoyMap::default();
        for score in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                map.put(score, false),
                Err(Error::NonFiniteScore(_))
            ));
        }
        assert!(map.is_empty());
        map.put(-0.0, false).unwrap();
        map.put(0.0, true).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn sorted_scores_refresh() {
        let mut map = build(&[(0.3, 1, 0), (0.1, 1, 0)]);
        assert_eq!(map.scores(), &[0.1, 0.3]);
        map.put(0.2, true).unwrap();
        assert_eq!(map.scores(), &[0.1, 0.2, 0.3]);
        assert_eq!(map.min_score(), Some(0.1));
        assert_eq!(map.max_score(), Some(0.3));
    }

    #[test]
    fn empty_map() {
        let mut map = TargetDecoyMap::default();
        assert_eq!(map.nmax(), 0);
        assert_eq!(map.n_target_only(), 0);
        assert_eq!(map.min_fdr(), 1.0);
        assert_eq!(map.resolution(), 0.0);
        assert!(map.suspicious_input(0.01));
        assert!(map.estimate_probabilities(&()).is_complete());
        assert!(!map.is_estimated());
        assert_eq!(map.probability(0.5), Err(Error::EmptyMap));
        assert_eq!(map.series().unwrap_err(), Error::EmptyMap);
    }

    #[test]
    fn nmax_half_counting() {
        let map = build(&[
            (0.1, 10, 0),
            (0.2, 5, 1),
            (0.3, 120, 0),
            (0.4, 3, 1),
            (0.5, 7, 0),
            (1.2, 50, 1),
        ]);
        assert_eq!(map.n_target_only(), 13);
        assert_eq!(map.nmax(), 124);
        assert!((map.min_fdr() - 1.0 / 135.0).abs() < 1e-12);
        assert!((map.resolution() - 100.0 / 124.0).abs() < 1e-12);
        assert!(!map.suspicious_input(0.01));
        assert!(map.suspicious_input(0.005));
    }

    #[test]
    fn nmax_strict_rule() {
        let points = [(0.1, 10, 0), (0.2, 5, 1), (0.3, 120, 0), (0.4, 3, 2)];
        let map = build(&points);
        assert_eq!(map.nmax(), 0);

        let parameters = EstimationParameters {
            strict_nmax: false,
            ..Default::default()
        };
        let mut relaxed = TargetDecoyMap::new(parameters);
        relaxed.add_all(&map);
        assert_eq!(relaxed.nmax(), 124);
    }

    #[test]
    fn min_fdr_without_decoys() {
        let map = build(&[(0.1, 10, 0), (0.2, 3, 0)]);
        assert_eq!(map.min_fdr(), 1.0);
        assert_eq!(map.nmax(), 0);
        assert_eq!(map.n_target_only(), 13);
    }

    #[test]
    fn metrics_invalidated() {
        let mut map = build(&[(0.1, 10, 0)]);
        assert_eq!(map.n_target_only(), 10);
        map.put(0.1, false).unwrap();
        assert_eq!(map.n_target_only(), 11);
        map.put(0.05, true).unwrap();
        assert_eq!(map.n_target_only(), 0);
        map.remove(0.05, true).unwrap();
        assert_eq!(map.n_target_only(), 11);
    }

    #[test]
    fn sliding_window() {
        let mut map = build(&[(0.1, 2, 0), (0.2, 2, 0), (0.3, 0, 2), (0.4, 2, 0)]);
        map.set_window_size(Some(2));
        assert_eq!(map.window_size(), 2);
        assert!(map.estimate_probabilities(&()).is_complete());
        assert_eq!(peps(&map), vec![0.0, 0.0, 0.5, 1.0]);
        assert!(map.is_estimated());
    }

    #[test]
    fn single_point_windows() {
        // Nmax is 0, so every window only holds its own score
        let mut map = build(&[(0.1, 4, 0), (0.2, 3, 1), (0.3, 5, 0)]);
        assert_eq!(map.window_size(), 0);
        assert!(map.estimate_probabilities(&()).is_complete());
        assert_eq!(peps(&map), vec![0.0, 1.0 / 3.0, 0.0]);
    }

    #[test]
    fn saturated_tail() {
        let mut map = build(&[(0.1, 0, 1), (0.2, 100, 0), (0.3, 100, 0)]);
        assert!(map.estimate_probabilities(&()).is_complete());
        assert_eq!(peps(&map), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn cancellation() {
        let mut map = build(&[(0.1, 2, 0), (0.2, 2, 0), (0.3, 0, 2), (0.4, 2, 0)]);
        let progress = ProgressCounter::with_limit(2);
        assert_eq!(map.estimate_probabilities(&progress), Estimation::Canceled);
        assert_eq!(progress.processed(), 2);
        assert!(map.point(0.1).unwrap().p.is_some());
        assert!(map.point(0.2).unwrap().p.is_some());
        assert!(map.point(0.3).unwrap().p.is_none());
        assert!(!map.is_estimated());
        assert_eq!(map.probability(0.4), Err(Error::NotEstimated));

        let progress = ProgressCounter::default();
        assert!(map.estimate_probabilities(&progress).is_complete());
        assert_eq!(progress.processed(), 4);
    }

    #[test]
    fn interpolation() {
        let mut map = build(&[(0.1, 2, 0), (0.2, 2, 0), (0.3, 0, 2), (0.4, 2, 0)]);
        map.set_window_size(Some(2));
        let _ = map.estimate_probabilities(&());
        assert_eq!(map.probability(0.3), Ok(0.5));
        assert!((map.probability(0.25).unwrap() - 0.25).abs() < 1e-12);
        assert!((map.probability(0.35).unwrap() - 0.75).abs() < 1e-12);
        assert_eq!(map.probability(0.0), Ok(0.0));
        assert_eq!(map.probability(7.0), Ok(1.0));
    }

    #[test]
    fn add_all_totals() {
        let mut a = build(&[(0.1, 3, 0), (0.2, 1, 1)]);
        let b = build(&[(0.2, 2, 4), (0.5, 0, 1)]);
        a.add_all(&b);
        assert_eq!(a.scores(), &[0.1, 0.2, 0.5]);
        let point = a.point(0.2).unwrap();
        assert_eq!((point.n_target, point.n_decoy), (3, 5));
        assert_eq!(a.n_target(), 6);
        assert_eq!(a.n_decoy(), 6);

        let before = a.points().map(|(s, p)| (s, *p)).collect::<Vec<_>>();
        a.add_all(&TargetDecoyMap::default());
        let after = a.points().map(|(s, p)| (s, *p)).collect::<Vec<_>>();
        assert_eq!(before, after);
    }

    #[test]
    fn validate_stores_results() {
        let mut map = build(&[(0.1, 100, 0), (0.5, 50, 5), (0.9, 10, 10)]);
        let _ = map.estimate_probabilities(&());
        let results = map
            .validate(TargetDecoyResults::new(ThresholdType::Fdr, 5.0))
            .unwrap()
            .clone();
        assert_eq!(results.score_limit, 0.5);
        assert_eq!(results.n, 150.0);
        assert_eq!(map.results(), &results);
    }

    #[test]
    fn from_points_roundtrip() {
        let mut map = build(&[(0.1, 3, 0), (0.2, 1, 1)]);
        map.set_window_size(Some(1));
        let _ = map.estimate_probabilities(&());
        let copy = TargetDecoyMap::from_points(
            *map.parameters(),
            map.points().map(|(s, p)| (s, *p)),
        )
        .unwrap();
        assert_eq!(copy.n_target(), 4);
        assert_eq!(copy.probability(0.2), map.probability(0.2));
    }

    fn quickcheck_map(hits: &[(u8, bool)]) -> TargetDecoyMap {
        let mut map = TargetDecoyMap::default();
        for (bin, decoy) in hits {
            map.put(*bin as f64 / 50.0, *decoy).unwrap();
        }
        map
    }

    #[quickcheck]
    fn pep_bounds_and_tail(hits: Vec<(u8, bool)>, window: Option<u8>) -> bool {
        let mut map = quickcheck_map(&hits);
        map.set_window_size(window.map(|w| w as usize));
        let _ = map.estimate_probabilities(&());

        let mut saturated = false;
        for (_, point) in map.points() {
            let p = point.p.unwrap();
            if !(0.0..=1.0).contains(&p) || (saturated && p != 1.0) {
                return false;
            }
            saturated |= p >= map.parameters().saturation_pep;
        }
        true
    }

    #[quickcheck]
    fn add_all_sums_counts(a: Vec<(u8, bool)>, b: Vec<(u8, bool)>) -> bool {
        let lhs = quickcheck_map(&a);
        let rhs = quickcheck_map(&b);
        let mut merged = lhs.clone();
        merged.add_all(&rhs);

        let count = |map: &TargetDecoyMap, score: f64| {
            map.point(score)
                .map(|p| (p.n_target, p.n_decoy))
                .unwrap_or((0, 0))
        };
        merged.scores().iter().all(|&score| {
            let (t1, d1) = count(&lhs, score);
            let (t2, d2) = count(&rhs, score);
            count(&merged, score) == (t1 + t2, d1 + d2)
        }) && merged.n_target() + merged.n_decoy() == a.len() + b.len()
    }
}
