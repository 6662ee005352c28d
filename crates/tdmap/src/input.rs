//! Raw search engine e-values, one map per search engine
//!
//! Used to calibrate each engine's own scores before hits from several
//! engines are combined. No curation happens here: an engine either has
//! enough hits or its statistics are reported as unreliable.

use crate::map::TargetDecoyMap;
use crate::parameters::EstimationParameters;
use crate::progress::{Estimation, Progress};
use crate::results::TargetDecoyResults;
use crate::specific::SpecificMap;
use crate::Error;
use fnv::FnvHashMap;
use std::collections::HashMap;
use std::hash::BuildHasher;

/// Human readable name of a search engine id, for log messages
pub trait SearchEngineNames: Send + Sync {
    fn name(&self, id: u32) -> Option<String>;
}

impl<S> SearchEngineNames for HashMap<u32, String, S>
where
    S: BuildHasher + Send + Sync,
{
    fn name(&self, id: u32) -> Option<String> {
        self.get(&id).cloned()
    }
}

pub struct InputMap {
    maps: SpecificMap<u32>,
    names: Box<dyn SearchEngineNames>,
}

impl Default for InputMap {
    fn default() -> Self {
        Self::new(EstimationParameters::default())
    }
}

impl InputMap {
    pub fn new(parameters: EstimationParameters) -> Self {
        Self::with_names(parameters, FnvHashMap::<u32, String>::default())
    }

    pub fn with_names<N: SearchEngineNames + 'static>(
        parameters: EstimationParameters,
        names: N,
    ) -> Self {
        Self::from_container(SpecificMap::new(parameters), names)
    }

    /// Wrap an existing container, e.g. one restored from disk
    pub fn from_container<N: SearchEngineNames + 'static>(maps: SpecificMap<u32>, names: N) -> Self {
        Self {
            maps,
            names: Box::new(names),
        }
    }

    pub fn container(&self) -> &SpecificMap<u32> {
        &self.maps
    }

    fn engine(&self, id: u32) -> String {
        self.names
            .name(id)
            .unwrap_or_else(|| format!("search engine {}", id))
    }

    pub fn add_observation(&self, engine: u32, e_value: f64, decoy: bool) -> Result<(), Error> {
        self.maps.add_observation(engine, e_value, decoy)
    }

    /// Ids of the search engines with at least one hit, sorted
    pub fn algorithms(&self) -> Vec<u32> {
        self.maps.keys()
    }

    pub fn is_multiple_algorithms(&self) -> bool {
        self.maps.len() > 1
    }

    /// Number of hits recorded for `engine`
    pub fn n_entries(&self, engine: u32) -> usize {
        self.maps
            .with_map(&engine, |map| map.n_target() + map.n_decoy())
            .unwrap_or(0)
    }

    pub fn estimate_probabilities<P: Progress + ?Sized>(&mut self, progress: &P) -> Estimation {
        for engine in self.algorithms() {
            let minimal_fdr = self.maps.parameters().minimal_fdr;
            let weak = self
                .maps
                .with_map(&engine, |map| map.suspicious_input(minimal_fdr))
                .unwrap_or(false);
            if weak {
                log::warn!(
                    "{}: not enough hits for reliable e-value calibration",
                    self.engine(engine)
                );
            }
        }
        let outcome = self.maps.estimate_probabilities(progress);
        if outcome.is_complete() {
            log::trace!("estimated e-value PEPs for {} engines", self.maps.len());
        }
        outcome
    }

    pub fn set_window_size(&mut self, engine: u32, window_size: Option<usize>) -> Result<(), Error> {
        self.maps.set_window_size(&engine, window_size)
    }

    pub fn probability(&self, engine: u32, e_value: f64) -> Result<f64, Error> {
        self.maps.probability(&engine, e_value)
    }

    pub fn validate(&mut self, request: &TargetDecoyResults) -> Result<(), Error> {
        self.maps.validate(request)
    }

    pub fn results(&self, engine: u32) -> Result<TargetDecoyResults, Error> {
        self.maps.results(&engine)
    }

    pub fn with_map<R>(&self, engine: u32, f: impl FnOnce(&TargetDecoyMap) -> R) -> Result<R, Error> {
        self.maps.with_map(&engine, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn per_engine_maps() {
        let names: FnvHashMap<u32, String> =
            [(1, "X!Tandem".to_string()), (2, "MS-GF+".to_string())]
                .into_iter()
                .collect();
        let mut input = InputMap::with_names(EstimationParameters::default(), names);
        assert!(!input.is_multiple_algorithms());

        for ix in 0..200 {
            input.add_observation(1, ix as f64 * 1e-4, false).unwrap();
        }
        input.add_observation(1, 0.5, true).unwrap();
        input.add_observation(2, 0.01, false).unwrap();
        input.add_observation(2, 0.02, true).unwrap();

        assert_eq!(input.algorithms(), vec![1, 2]);
        assert!(input.is_multiple_algorithms());
        assert_eq!(input.n_entries(1), 201);
        assert_eq!(input.n_entries(2), 2);
        assert_eq!(input.n_entries(3), 0);
        assert_eq!(input.engine(2), "MS-GF+");
        assert_eq!(input.engine(7), "search engine 7");

        assert!(input.estimate_probabilities(&()).is_complete());
        assert_eq!(input.probability(1, 0.0), Ok(0.0));
        assert_eq!(input.probability(2, 0.02), Ok(1.0));
        assert_eq!(input.probability(3, 0.02), Err(Error::UnknownCategory("3".into())));

        input.validate(&TargetDecoyResults::default()).unwrap();
        assert_eq!(input.results(1).map(|r| r.n), Ok(200.0));
    }
}
