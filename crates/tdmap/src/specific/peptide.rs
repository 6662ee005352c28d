//! Peptide maps keyed by modification profile
//!
//! The key of a peptide is the sorted, underscore-joined list of the distinct
//! variable modifications it carries; unmodified peptides share the empty key.
//! Modification names are normalized through a [`ModificationCatalog`].
//! Names the catalog does not know are handed to a [`NameResolver`] once, and
//! the answer is reused for the rest of the run.

use super::{SpecificMap, Stage};
use crate::parameters::EstimationParameters;
use crate::progress::{Estimation, Progress};
use crate::results::TargetDecoyResults;
use crate::Error;
use dashmap::DashMap;
use fnv::FnvBuildHasher;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::ops::Deref;

/// Key shared by all unmodified peptides
pub const UNMODIFIED: &str = "";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationInfo {
    /// Canonical name, as used in category keys
    pub name: String,
    /// Fixed modifications never contribute to a key
    pub variable: bool,
}

/// Read-only lookup of modification metadata by name
pub trait ModificationCatalog: Send + Sync {
    fn lookup(&self, name: &str) -> Option<&ModificationInfo>;
}

impl<S> ModificationCatalog for HashMap<String, ModificationInfo, S>
where
    S: BuildHasher + Send + Sync,
{
    fn lookup(&self, name: &str) -> Option<&ModificationInfo> {
        self.get(name)
    }
}

/// Maps a modification name the catalog does not know to a canonical one
pub trait NameResolver: Send + Sync {
    fn resolve_ambiguous_name(&self, name: &str) -> String;
}

impl<F> NameResolver for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn resolve_ambiguous_name(&self, name: &str) -> String {
        self(name)
    }
}

pub struct PeptideSpecificMap {
    map: SpecificMap<String>,
    catalog: Box<dyn ModificationCatalog>,
    resolver: Box<dyn NameResolver>,
    resolved: DashMap<String, String, FnvBuildHasher>,
}

impl PeptideSpecificMap {
    pub fn new<C, R>(parameters: EstimationParameters, catalog: C, resolver: R) -> Self
    where
        C: ModificationCatalog + 'static,
        R: NameResolver + 'static,
    {
        Self::from_map(SpecificMap::new(parameters), catalog, resolver)
    }

    /// Unknown modification names are kept as they are
    pub fn with_catalog<C>(parameters: EstimationParameters, catalog: C) -> Self
    where
        C: ModificationCatalog + 'static,
    {
        Self::new(parameters, catalog, |name: &str| name.to_string())
    }

    /// Wrap an existing container, e.g. one restored from disk
    pub fn from_map<C, R>(map: SpecificMap<String>, catalog: C, resolver: R) -> Self
    where
        C: ModificationCatalog + 'static,
        R: NameResolver + 'static,
    {
        Self {
            map,
            catalog: Box::new(catalog),
            resolver: Box::new(resolver),
            resolved: DashMap::default(),
        }
    }

    pub fn into_inner(self) -> SpecificMap<String> {
        self.map
    }

    /// Canonical metadata for `name`, resolving it at most once per run
    fn modification(&self, name: &str) -> ModificationInfo {
        if let Some(info) = self.catalog.lookup(name) {
            return info.clone();
        }
        let canonical = self
            .resolved
            .entry(name.to_string())
            .or_insert_with(|| {
                let canonical = self.resolver.resolve_ambiguous_name(name);
                log::trace!("modification '{}' resolved to '{}'", name, canonical);
                canonical
            })
            .clone();
        match self.catalog.lookup(&canonical) {
            Some(info) => info.clone(),
            None => ModificationInfo {
                name: canonical,
                variable: true,
            },
        }
    }

    /// Category key of a peptide carrying `modifications`
    pub fn category_key<S: AsRef<str>>(&self, modifications: &[S]) -> String {
        let mut names = modifications
            .iter()
            .map(|name| self.modification(name.as_ref()))
            .filter(|info| info.variable)
            .map(|info| info.name)
            .collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        names.join("_")
    }

    pub fn add_observation<S: AsRef<str>>(
        &self,
        modifications: &[S],
        score: f64,
        decoy: bool,
    ) -> Result<(), Error> {
        let key = self.category_key(modifications);
        self.map.add_observation(key, score, decoy)
    }

    pub fn probability<S: AsRef<str>>(&self, modifications: &[S], score: f64) -> Result<f64, Error> {
        self.map.probability(&self.category_key(modifications), score)
    }

    pub fn score_limit<S: AsRef<str>>(&self, modifications: &[S]) -> Result<f64, Error> {
        self.map.score_limit(&self.category_key(modifications))
    }

    /// Dustbin curation, with unmodified peptides as the catch-all
    pub fn clean(&mut self, minimal_fdr: f64) {
        let catch_all = UNMODIFIED.to_string();
        self.map.clean_with_catch_all(minimal_fdr, Some(&catch_all));
    }

    pub fn estimate_probabilities<P: Progress + ?Sized>(&mut self, progress: &P) -> Estimation {
        if self.map.stage() == Stage::Accumulating {
            log::warn!("estimating peptide probabilities before curation");
        }
        self.map.estimate_probabilities(progress)
    }

    pub fn validate(&mut self, request: &TargetDecoyResults) -> Result<(), Error> {
        self.map.validate(request)
    }

    pub fn set_window_size(&mut self, key: &str, window_size: Option<usize>) -> Result<(), Error> {
        self.map.set_window_size(&key.to_string(), window_size)
    }
}

impl Deref for PeptideSpecificMap {
    type Target = SpecificMap<String>;

    fn deref(&self) -> &Self::Target {
        &self.map
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::specific::test::category;
    use crate::specific::Redirect;
    use fnv::FnvHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn catalog() -> FnvHashMap<String, ModificationInfo> {
        [
            ("Oxidation of M", true),
            ("Phosphorylation of S", true),
            ("Carbamidomethylation of C", false),
        ]
        .into_iter()
        .map(|(name, variable)| {
            let info = ModificationInfo {
                name: name.to_string(),
                variable,
            };
            (name.to_string(), info)
        })
        .collect()
    }

    #[test]
    fn key_derivation() {
        let map = PeptideSpecificMap::with_catalog(EstimationParameters::default(), catalog());
        let empty: [&str; 0] = [];
        assert_eq!(map.category_key(&empty), UNMODIFIED);
        assert_eq!(map.category_key(&["Carbamidomethylation of C"]), UNMODIFIED);
        assert_eq!(
            map.category_key(&[
                "Phosphorylation of S",
                "Oxidation of M",
                "Carbamidomethylation of C",
                "Oxidation of M",
            ]),
            "Oxidation of M_Phosphorylation of S"
        );
        // unknown names are kept as variable modifications
        assert_eq!(map.category_key(&["Deamidation of N"]), "Deamidation of N");
    }

    #[test]
    fn ambiguous_names_resolved_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let map = PeptideSpecificMap::new(
            EstimationParameters::default(),
            catalog(),
            move |name: &str| {
                counter.fetch_add(1, Ordering::Relaxed);
                match name {
                    "ox" => "Oxidation of M".to_string(),
                    "cam" => "Carbamidomethylation of C".to_string(),
                    other => other.to_string(),
                }
            },
        );

        for _ in 0..10 {
            map.add_observation(&["ox", "cam"], 0.01, false).unwrap();
        }
        map.add_observation(&["Oxidation of M"], 0.02, true).unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(map.keys(), vec!["Oxidation of M".to_string()]);
        assert_eq!(map.with_map(&"Oxidation of M".into(), |m| m.n_target()), Ok(10));
    }

    #[test]
    fn unmodified_is_catch_all() {
        let mut map = PeptideSpecificMap::with_catalog(EstimationParameters::default(), catalog());
        category(&map.map, UNMODIFIED.to_string(), 5);
        category(&map.map, "Oxidation of M".to_string(), 300);
        category(&map.map, "Phosphorylation of S".to_string(), 7);
        let total = map.n_observations();

        map.clean(0.01);
        assert_eq!(
            map.keys(),
            vec![UNMODIFIED.to_string(), "Oxidation of M".to_string()]
        );
        assert_eq!(
            map.grouping(),
            vec![(
                "Phosphorylation of S".to_string(),
                Redirect::Category(UNMODIFIED.to_string())
            )]
        );
        assert_eq!(map.n_observations(), total);

        assert!(map.estimate_probabilities(&()).is_complete());
        assert_eq!(map.probability(&["Phosphorylation of S"], 0.001), Ok(0.0));
        map.validate(&TargetDecoyResults::default()).unwrap();
        assert_eq!(
            map.score_limit(&["Phosphorylation of S"]),
            map.score_limit(&["Carbamidomethylation of C"])
        );
    }
}
