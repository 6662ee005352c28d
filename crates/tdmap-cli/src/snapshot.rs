//! Versioned JSON snapshot of every map, so that a run can be reloaded,
//! re-estimated with other windows or re-validated at another threshold
//! without reading the observations again.

use crate::ingest::{catalog, resolver, Maps};
use crate::input::Run;
use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tdmap_core::input::InputMap;
use tdmap_core::map::TargetDecoyMap;
use tdmap_core::parameters::EstimationParameters;
use tdmap_core::point::TargetDecoyPoint;
use tdmap_core::specific::{
    CategoryKey, PeptideSpecificMap, ProteinMap, Redirect, SpecificMap, Stage,
};

pub const VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PointRecord {
    pub score: f64,
    pub n_target: usize,
    pub n_decoy: usize,
    pub p: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MapSnapshot {
    pub window_size: Option<usize>,
    pub points: Vec<PointRecord>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ContainerSnapshot<K> {
    pub stage: Stage,
    pub categories: Vec<(K, MapSnapshot)>,
    pub dustbin: Option<MapSnapshot>,
    pub grouping: Vec<(K, Redirect<K>)>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProteinSnapshot {
    pub stage: Stage,
    pub map: MapSnapshot,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub version: u32,
    pub parameters: EstimationParameters,
    pub psm: ContainerSnapshot<u8>,
    pub peptide: ContainerSnapshot<String>,
    pub protein: ProteinSnapshot,
    pub engine: ContainerSnapshot<u32>,
}

impl From<&TargetDecoyMap> for MapSnapshot {
    fn from(map: &TargetDecoyMap) -> Self {
        MapSnapshot {
            window_size: map.window_size_override(),
            points: map
                .points()
                .map(|(score, point)| PointRecord {
                    score,
                    n_target: point.n_target,
                    n_decoy: point.n_decoy,
                    p: point.p,
                })
                .collect(),
        }
    }
}

impl MapSnapshot {
    fn restore(self, parameters: EstimationParameters) -> anyhow::Result<TargetDecoyMap> {
        let points = self.points.into_iter().map(|record| {
            let point = TargetDecoyPoint {
                n_target: record.n_target,
                n_decoy: record.n_decoy,
                p: record.p,
            };
            (record.score, point)
        });
        let mut map = TargetDecoyMap::from_points(parameters, points)?;
        map.set_window_size(self.window_size);
        Ok(map)
    }
}

impl<K: CategoryKey> From<&SpecificMap<K>> for ContainerSnapshot<K> {
    fn from(container: &SpecificMap<K>) -> Self {
        ContainerSnapshot {
            stage: container.stage(),
            categories: container
                .maps()
                .into_iter()
                .map(|(key, map)| (key, MapSnapshot::from(&map)))
                .collect(),
            dustbin: container.dustbin().map(MapSnapshot::from),
            grouping: container.grouping(),
        }
    }
}

impl<K: CategoryKey> ContainerSnapshot<K> {
    fn restore(self, parameters: EstimationParameters) -> anyhow::Result<SpecificMap<K>> {
        let categories = self
            .categories
            .into_iter()
            .map(|(key, map)| Ok((key, map.restore(parameters)?)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let dustbin = self
            .dustbin
            .map(|map| map.restore(parameters))
            .transpose()?;
        Ok(SpecificMap::from_parts(
            parameters,
            categories,
            dustbin,
            self.grouping,
            self.stage,
        ))
    }
}

impl Snapshot {
    pub fn capture(maps: &Maps) -> Self {
        Snapshot {
            version: VERSION,
            parameters: *maps.psms.parameters(),
            psm: ContainerSnapshot::from(&maps.psms),
            peptide: ContainerSnapshot::from(&*maps.peptides),
            protein: ProteinSnapshot {
                stage: maps.proteins.stage(),
                map: maps.proteins.with_map(|map| MapSnapshot::from(map)),
            },
            engine: ContainerSnapshot::from(maps.engines.container()),
        }
    }

    /// Rebuild the maps. Estimation parameters of the current run win over
    /// the saved ones, so a snapshot can be re-estimated with new settings.
    pub fn restore(self, run: &Run) -> anyhow::Result<Maps> {
        ensure!(
            self.version == VERSION,
            "unsupported snapshot version {}, expected {}",
            self.version,
            VERSION
        );
        if self.parameters != run.estimation {
            log::info!("snapshot was estimated with different parameters");
        }
        let parameters = run.estimation;

        let peptides = self.peptide.restore(parameters)?;
        Ok(Maps {
            psms: self.psm.restore(parameters)?,
            peptides: PeptideSpecificMap::from_map(
                peptides,
                catalog(&run.modifications),
                resolver(run),
            ),
            proteins: ProteinMap::from_map(
                self.protein.map.restore(parameters)?,
                self.protein.stage,
            ),
            engines: InputMap::from_container(
                self.engine.restore(parameters)?,
                run.engines.clone(),
            ),
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open snapshot `{}`", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse snapshot `{}`", path.display()))
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
