//! Category-keyed collections of [`TargetDecoyMap`]s
//!
//! Hits are routed to one map per category (charge state, modification
//! profile, file...). Once all hits are in, categories without enough data
//! are merged away, either into a neighbouring category ([`SpecificMap::cure`])
//! or into a shared dustbin ([`SpecificMap::clean`]). Lookups for a merged
//! category are transparently redirected to the map that absorbed it.
//!
//! Lifecycle: accumulating -> curated -> estimated. Adding hits after
//! curation is an error.

pub mod charge;
pub mod grouped;
pub mod peptide;
pub mod protein;

use crate::map::TargetDecoyMap;
use crate::parameters::EstimationParameters;
use crate::progress::{Estimation, Progress};
use crate::results::TargetDecoyResults;
use crate::Error;
use dashmap::DashMap;
use fnv::{FnvBuildHasher, FnvHashMap};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::hash::Hash;

pub use charge::PsmSpecificMap;
pub use grouped::SimpleSpecificMap;
pub use peptide::PeptideSpecificMap;
pub use protein::ProteinMap;

pub trait CategoryKey: Clone + Eq + Hash + Ord + Display + Send + Sync {}

impl<T> CategoryKey for T where T: Clone + Eq + Hash + Ord + Display + Send + Sync {}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Accumulating,
    Curated,
    Estimated,
}

/// Where the hits of a merged category ended up
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Redirect<K> {
    Category(K),
    Dustbin,
}

impl<K: Display> Display for Redirect<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Redirect::Category(key) => key.fmt(f),
            Redirect::Dustbin => f.write_str("OTHER"),
        }
    }
}

pub struct SpecificMap<K: CategoryKey> {
    maps: DashMap<K, TargetDecoyMap, FnvBuildHasher>,
    /// Categories too weak to stand alone
    dustbin: Option<TargetDecoyMap>,
    grouping: FnvHashMap<K, Redirect<K>>,
    parameters: EstimationParameters,
    stage: Stage,
}

impl<K: CategoryKey> Default for SpecificMap<K> {
    fn default() -> Self {
        Self::new(EstimationParameters::default())
    }
}

impl<K: CategoryKey> SpecificMap<K> {
    pub fn new(parameters: EstimationParameters) -> Self {
        Self {
            maps: DashMap::default(),
            dustbin: None,
            grouping: FnvHashMap::default(),
            parameters,
            stage: Stage::Accumulating,
        }
    }

    /// Reassemble a container from saved state
    pub fn from_parts(
        parameters: EstimationParameters,
        maps: Vec<(K, TargetDecoyMap)>,
        dustbin: Option<TargetDecoyMap>,
        grouping: Vec<(K, Redirect<K>)>,
        stage: Stage,
    ) -> Self {
        Self {
            maps: maps.into_iter().collect(),
            dustbin,
            grouping: grouping.into_iter().collect(),
            parameters,
            stage,
        }
    }

    pub fn parameters(&self) -> &EstimationParameters {
        &self.parameters
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Record one hit for `key`. Safe to call from several threads at once.
    pub fn add_observation(&self, key: K, score: f64, decoy: bool) -> Result<(), Error> {
        if self.stage != Stage::Accumulating {
            return Err(Error::AlreadyCurated);
        }
        self.maps
            .entry(key)
            .or_insert_with(|| TargetDecoyMap::new(self.parameters))
            .put(score, decoy)
    }

    /// Categories with their own map, sorted
    pub fn keys(&self) -> Vec<K> {
        let mut keys = self
            .maps
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    /// Clones of the surviving maps, sorted by key
    pub fn maps(&self) -> Vec<(K, TargetDecoyMap)> {
        let mut maps = self
            .maps
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect::<Vec<_>>();
        maps.sort_by(|a, b| a.0.cmp(&b.0));
        maps
    }

    pub fn dustbin(&self) -> Option<&TargetDecoyMap> {
        self.dustbin.as_ref()
    }

    /// Merged categories and where they went, sorted by key
    pub fn grouping(&self) -> Vec<(K, Redirect<K>)> {
        let mut grouping = self
            .grouping
            .iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect::<Vec<_>>();
        grouping.sort_by(|a, b| a.0.cmp(&b.0));
        grouping
    }

    pub fn is_grouped(&self, key: &K) -> bool {
        self.grouping.contains_key(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.maps.contains_key(key) || self.grouping.contains_key(key)
    }

    /// Number of independently estimated maps, dustbin included
    pub fn len(&self) -> usize {
        self.maps.len() + self.dustbin.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of hits across all maps
    pub fn n_observations(&self) -> usize {
        self.maps
            .iter()
            .map(|entry| entry.n_target() + entry.n_decoy())
            .chain(self.dustbin.iter().map(|m| m.n_target() + m.n_decoy()))
            .sum()
    }

    /// Distinct scores across all maps, i.e. the work of one estimation pass
    pub fn n_scores(&self) -> usize {
        self.maps
            .iter()
            .map(|entry| entry.len())
            .chain(self.dustbin.iter().map(TargetDecoyMap::len))
            .sum()
    }

    /// Run `f` on the map currently holding the hits of `key`
    pub fn with_map<R>(&self, key: &K, f: impl FnOnce(&TargetDecoyMap) -> R) -> Result<R, Error> {
        let redirect = self
            .grouping
            .get(key)
            .cloned()
            .unwrap_or_else(|| Redirect::Category(key.clone()));
        match redirect {
            Redirect::Category(key) => self
                .maps
                .get(&key)
                .map(|map| f(map.value()))
                .ok_or_else(|| Error::UnknownCategory(key.to_string())),
            Redirect::Dustbin => self
                .dustbin
                .as_ref()
                .map(f)
                .ok_or_else(|| Error::UnknownCategory(Redirect::<K>::Dustbin.to_string())),
        }
    }

    pub fn probability(&self, key: &K, score: f64) -> Result<f64, Error> {
        self.with_map(key, |map| map.probability(score))?
    }

    pub fn score_limit(&self, key: &K) -> Result<f64, Error> {
        self.with_map(key, |map| map.results().score_limit)
    }

    pub fn results(&self, key: &K) -> Result<TargetDecoyResults, Error> {
        self.with_map(key, |map| map.results().clone())
    }

    /// Is any independently estimated map statistically unreliable?
    pub fn suspicious_input(&self) -> bool {
        let fdr = self.parameters.minimal_fdr;
        self.maps.iter().any(|entry| entry.suspicious_input(fdr))
            || self.dustbin.iter().any(|map| map.suspicious_input(fdr))
    }

    /// Coarsest PEP resolution, in percent, across all maps
    pub fn max_resolution(&self) -> f64 {
        self.maps
            .iter()
            .map(|entry| entry.resolution())
            .chain(self.dustbin.iter().map(TargetDecoyMap::resolution))
            .fold(0.0, f64::max)
    }

    /// Override the smoothing window of the map holding `key`
    pub fn set_window_size(&mut self, key: &K, window_size: Option<usize>) -> Result<(), Error> {
        match self.grouping.get(key).cloned() {
            Some(Redirect::Dustbin) => match self.dustbin.as_mut() {
                Some(map) => map.set_window_size(window_size),
                None => return Err(Error::UnknownCategory(key.to_string())),
            },
            Some(Redirect::Category(target)) => self.set_window_size(&target, window_size)?,
            None => match self.maps.get_mut(key) {
                Some(mut map) => map.set_window_size(window_size),
                None => return Err(Error::UnknownCategory(key.to_string())),
            },
        }
        Ok(())
    }

    /// Move every hit of `from` into `into`, and record the redirection
    fn merge(&mut self, from: &K, into: Redirect<K>) {
        let Some((_, map)) = self.maps.remove(from) else {
            return;
        };
        log::trace!(
            "merging {} ({} hits) into {}",
            from,
            map.n_target() + map.n_decoy(),
            into
        );
        match &into {
            Redirect::Category(key) => {
                if let Some(mut target) = self.maps.get_mut(key) {
                    target.add_all(&map);
                }
            }
            Redirect::Dustbin => self
                .dustbin
                .get_or_insert_with(|| TargetDecoyMap::new(self.parameters))
                .add_all(&map),
        }

        let absorbed = Redirect::Category(from.clone());
        for target in self.grouping.values_mut() {
            if *target == absorbed {
                *target = into.clone();
            }
        }
        self.grouping.insert(from.clone(), into);
    }

    /// Fold the dustbin into `key`
    fn empty_dustbin(&mut self, key: &K) {
        let Some(dustbin) = self.dustbin.take() else {
            return;
        };
        match self.maps.get_mut(key) {
            Some(mut target) => target.add_all(&dustbin),
            None => {
                self.dustbin = Some(dustbin);
                return;
            }
        }
        for target in self.grouping.values_mut() {
            if *target == Redirect::Dustbin {
                *target = Redirect::Category(key.clone());
            }
        }
    }

    /// Estimate the PEPs of every map, in parallel
    pub fn estimate_probabilities<P: Progress + ?Sized>(&mut self, progress: &P) -> Estimation {
        let mut maps = std::mem::take(&mut self.maps)
            .into_iter()
            .collect::<Vec<_>>();

        let outcome = maps
            .par_iter_mut()
            .map(|(key, map)| {
                log::trace!(
                    "{}: estimating {} scores, window size {}",
                    key,
                    map.len(),
                    map.window_size()
                );
                map.estimate_probabilities(progress)
            })
            .reduce(|| Estimation::Complete, Estimation::and);
        self.maps = maps.into_iter().collect();

        let outcome = match self.dustbin.as_mut() {
            Some(dustbin) => outcome.and(dustbin.estimate_probabilities(progress)),
            None => outcome,
        };

        if outcome.is_complete() {
            self.stage = Stage::Estimated;
        }
        outcome
    }

    /// Run the threshold search described by `request` on every map
    pub fn validate(&mut self, request: &TargetDecoyResults) -> Result<(), Error> {
        for mut entry in self.maps.iter_mut() {
            entry.validate(request.clone())?;
        }
        if let Some(dustbin) = self.dustbin.as_mut() {
            dustbin.validate(request.clone())?;
        }
        Ok(())
    }
}
