use super::Stage;
use crate::map::TargetDecoyMap;
use crate::parameters::EstimationParameters;
use crate::progress::{Estimation, Progress};
use crate::results::TargetDecoyResults;
use crate::series::TargetDecoySeries;
use crate::Error;
use std::sync::{Mutex, PoisonError};

/// Protein groups are not split into categories: a single map, shared by
/// all ingestion threads.
#[derive(Default)]
pub struct ProteinMap {
    map: Mutex<TargetDecoyMap>,
    stage: Stage,
}

impl ProteinMap {
    pub fn new(parameters: EstimationParameters) -> Self {
        Self::from_map(TargetDecoyMap::new(parameters), Stage::Accumulating)
    }

    pub fn from_map(map: TargetDecoyMap, stage: Stage) -> Self {
        Self {
            map: Mutex::new(map),
            stage,
        }
    }

    pub fn into_map(self) -> TargetDecoyMap {
        self.map.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn add_observation(&self, score: f64, decoy: bool) -> Result<(), Error> {
        if self.stage != Stage::Accumulating {
            return Err(Error::AlreadyCurated);
        }
        self.with_map_mut(|map| map.put(score, decoy))
    }

    /// Nothing to merge; closes ingestion
    pub fn cure(&mut self) {
        if self.stage == Stage::Accumulating {
            self.stage = Stage::Curated;
        }
    }

    pub fn set_window_size(&mut self, window_size: Option<usize>) {
        self.with_map_mut(|map| map.set_window_size(window_size))
    }

    pub fn with_map<R>(&self, f: impl FnOnce(&TargetDecoyMap) -> R) -> R {
        let map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        f(&map)
    }

    fn with_map_mut<R>(&self, f: impl FnOnce(&mut TargetDecoyMap) -> R) -> R {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut map)
    }

    pub fn estimate_probabilities<P: Progress + ?Sized>(&mut self, progress: &P) -> Estimation {
        let outcome = self.with_map_mut(|map| map.estimate_probabilities(progress));
        if outcome.is_complete() {
            self.stage = Stage::Estimated;
        }
        outcome
    }

    pub fn probability(&self, score: f64) -> Result<f64, Error> {
        self.with_map(|map| map.probability(score))
    }

    pub fn score_limit(&self) -> f64 {
        self.with_map(|map| map.results().score_limit)
    }

    pub fn results(&self) -> TargetDecoyResults {
        self.with_map(|map| map.results().clone())
    }

    pub fn suspicious_input(&self, minimal_fdr: f64) -> bool {
        self.with_map(|map| map.suspicious_input(minimal_fdr))
    }

    pub fn series(&self) -> Result<TargetDecoySeries, Error> {
        self.with_map(TargetDecoyMap::series)
    }

    pub fn validate(&mut self, request: &TargetDecoyResults) -> Result<TargetDecoyResults, Error> {
        self.with_map_mut(|map| map.validate(request.clone()).cloned())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn shared_ingestion() {
        let mut proteins = ProteinMap::new(EstimationParameters::default());
        (0..1000usize).into_par_iter().for_each(|ix| {
            let score = (ix % 100) as f64 / 1000.0;
            proteins.add_observation(score, ix >= 990).unwrap();
        });
        assert_eq!(proteins.with_map(|m| (m.n_target(), m.n_decoy())), (990, 10));

        proteins.cure();
        assert_eq!(proteins.add_observation(0.5, false), Err(Error::AlreadyCurated));
        assert_eq!(proteins.probability(0.0), Err(Error::NotEstimated));

        assert!(proteins.estimate_probabilities(&()).is_complete());
        assert_eq!(proteins.stage(), Stage::Estimated);
        assert_eq!(proteins.probability(0.0), Ok(0.0));

        let results = proteins.validate(&TargetDecoyResults::default()).unwrap();
        assert!(!results.no_validated);
        assert_eq!(proteins.score_limit(), results.score_limit);
        assert_eq!(proteins.series().map(|s| s.scores().len()), Ok(100));
        assert_eq!(proteins.into_map().len(), 100);
    }
}
