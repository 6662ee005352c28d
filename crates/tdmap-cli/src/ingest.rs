//! Observation tables: one scored hit per row, tab separated
//!
//! ```text
//! level   charge  modifications           engine  score   decoy
//! psm     2                                       0.0012  false
//! peptide         Oxidation of M;Phospho          0.0004  false
//! protein                                         0.31    true
//! engine                                  1       1e-5    false
//! ```

use crate::input::Run;
use anyhow::{ensure, Context};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tdmap_core::input::InputMap;
use tdmap_core::specific::peptide::ModificationInfo;
use tdmap_core::specific::{PeptideSpecificMap, ProteinMap, PsmSpecificMap};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Psm,
    Peptide,
    Protein,
    /// Raw search engine e-values
    Engine,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Level::Psm => "psm",
            Level::Peptide => "peptide",
            Level::Protein => "protein",
            Level::Engine => "engine",
        })
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Observation {
    pub level: Level,
    pub charge: Option<u8>,
    /// Modification names, separated by `;`
    pub modifications: Option<String>,
    pub engine: Option<u32>,
    pub score: f64,
    pub decoy: bool,
}

/// One container per identification level
pub struct Maps {
    pub psms: PsmSpecificMap,
    pub peptides: PeptideSpecificMap,
    pub proteins: ProteinMap,
    pub engines: InputMap,
}

impl Maps {
    pub fn new(run: &Run) -> Self {
        Self {
            psms: PsmSpecificMap::new(run.estimation),
            peptides: PeptideSpecificMap::new(
                run.estimation,
                catalog(&run.modifications),
                resolver(run),
            ),
            proteins: ProteinMap::new(run.estimation),
            engines: InputMap::with_names(run.estimation, run.engines.clone()),
        }
    }

    pub fn record(&self, observation: &Observation) -> anyhow::Result<()> {
        let Observation {
            level,
            score,
            decoy,
            ..
        } = *observation;
        match level {
            Level::Psm => {
                let charge = observation.charge.context("psm rows require a charge")?;
                self.psms.add_observation(charge, score, decoy)?;
            }
            Level::Peptide => {
                let modifications = observation
                    .modifications
                    .as_deref()
                    .unwrap_or_default()
                    .split(';')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .collect::<Vec<_>>();
                self.peptides.add_observation(&modifications, score, decoy)?;
            }
            Level::Protein => self.proteins.add_observation(score, decoy)?,
            Level::Engine => {
                let engine = observation.engine.context("engine rows require an engine id")?;
                self.engines.add_observation(engine, score, decoy)?;
            }
        }
        Ok(())
    }
}

pub fn catalog(modifications: &[ModificationInfo]) -> fnv::FnvHashMap<String, ModificationInfo> {
    modifications
        .iter()
        .map(|info| (info.name.clone(), info.clone()))
        .collect()
}

/// Resolve ambiguous modification names through the configured aliases
pub fn resolver(run: &Run) -> impl Fn(&str) -> String + Send + Sync + 'static {
    let aliases = run.aliases.clone();
    move |name: &str| match aliases.get(name) {
        Some(canonical) => canonical.clone(),
        None => {
            log::warn!("unknown modification `{}`, treated as variable", name);
            name.to_string()
        }
    }
}

/// Read every row of `path` into `maps`, returning the number of rows
pub fn read_observations(path: &str, maps: &Maps) -> anyhow::Result<usize> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut rows = 0;
    for (ix, row) in rdr.deserialize::<Observation>().enumerate() {
        let observation = row?;
        ensure!(
            observation.score.is_finite(),
            "row {}: score {} is not finite",
            ix + 1,
            observation.score
        );
        maps.record(&observation)
            .with_context(|| format!("row {}", ix + 1))?;
        rows += 1;
    }
    Ok(rows)
}

/// Read all files in parallel, one task per file
pub fn read_all(paths: &[String], maps: &Maps) -> anyhow::Result<usize> {
    let counts = paths
        .par_iter()
        .map(|path| {
            let rows = read_observations(path, maps)
                .with_context(|| format!("Failed to read observations from `{path}`"))?;
            log::trace!("- {}: read {} observations", path, rows);
            Ok(rows)
        })
        .collect::<anyhow::Result<Vec<usize>>>()?;
    Ok(counts.into_iter().sum())
}
