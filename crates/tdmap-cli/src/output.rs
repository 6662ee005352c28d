use crate::ingest::Level;
use crate::input::Run;
use crate::runner::Runner;
use crate::snapshot::Snapshot;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tdmap_core::map::TargetDecoyMap;
use tdmap_core::point::TargetDecoyPoint;
use tdmap_core::results::TargetDecoyResults;
use tdmap_core::specific::{CategoryKey, Redirect, SpecificMap};

#[derive(Serialize, Clone, Debug)]
pub struct CategorySummary {
    pub category: String,
    pub n_target: usize,
    pub n_decoy: usize,
    pub nmax: usize,
    pub window_size: usize,
    /// PEP step, in percent
    pub resolution: f64,
    pub suspicious: bool,
    pub results: TargetDecoyResults,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct LevelSummary {
    pub categories: Vec<CategorySummary>,
    /// Merged category -> category now holding its hits
    pub grouping: Vec<(String, String)>,
    pub max_resolution: f64,
    /// Target hits passing the threshold, summed over categories
    pub validated: f64,
}

#[derive(Serialize, Clone, Debug)]
pub struct Summary {
    pub psm: LevelSummary,
    pub peptide: LevelSummary,
    pub protein: LevelSummary,
    pub engine: LevelSummary,
}

#[derive(Serialize)]
struct Report<'a> {
    parameters: &'a Run,
    #[serde(flatten)]
    summary: &'a Summary,
}

impl CategorySummary {
    fn new(category: String, map: &TargetDecoyMap, minimal_fdr: f64) -> Self {
        CategorySummary {
            category,
            n_target: map.n_target(),
            n_decoy: map.n_decoy(),
            nmax: map.nmax(),
            window_size: map.window_size(),
            resolution: map.resolution(),
            suspicious: map.suspicious_input(minimal_fdr),
            results: map.results().clone(),
        }
    }
}

impl LevelSummary {
    fn from_categories(categories: Vec<CategorySummary>, grouping: Vec<(String, String)>) -> Self {
        let max_resolution = categories
            .iter()
            .map(|c| c.resolution)
            .fold(0.0, f64::max);
        let validated = categories
            .iter()
            .filter(|c| !c.results.no_validated)
            .map(|c| c.results.n)
            .sum();
        LevelSummary {
            categories,
            grouping,
            max_resolution,
            validated,
        }
    }

    fn from_container<K: CategoryKey>(container: &SpecificMap<K>) -> Self {
        let minimal_fdr = container.parameters().minimal_fdr;
        let mut categories = container
            .maps()
            .into_iter()
            .map(|(key, map)| CategorySummary::new(key.to_string(), &map, minimal_fdr))
            .collect::<Vec<_>>();
        if let Some(dustbin) = container.dustbin() {
            categories.push(CategorySummary::new(
                Redirect::<K>::Dustbin.to_string(),
                dustbin,
                minimal_fdr,
            ));
        }
        let grouping = container
            .grouping()
            .into_iter()
            .map(|(from, into)| (from.to_string(), into.to_string()))
            .collect();
        Self::from_categories(categories, grouping)
    }

    fn from_map(category: &str, map: &TargetDecoyMap) -> Self {
        if map.is_empty() {
            return Self::default();
        }
        let minimal_fdr = map.parameters().minimal_fdr;
        Self::from_categories(
            vec![CategorySummary::new(category.into(), map, minimal_fdr)],
            Vec::new(),
        )
    }
}

impl Runner {
    // Create a path for `file_name` in the output directory
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    pub fn summary(&self) -> Summary {
        Summary {
            psm: LevelSummary::from_container(&self.maps.psms),
            peptide: LevelSummary::from_container(&*self.maps.peptides),
            protein: self
                .maps
                .proteins
                .with_map(|map| LevelSummary::from_map(&Level::Protein.to_string(), map)),
            engine: LevelSummary::from_container(self.maps.engines.container()),
        }
    }

    fn serialize_point(
        level: Level,
        category: &str,
        score: f64,
        point: &TargetDecoyPoint,
    ) -> csv::ByteRecord {
        let mut record = csv::ByteRecord::new();
        record.push_field(level.to_string().as_bytes());
        record.push_field(category.as_bytes());
        record.push_field(ryu::Buffer::new().format(score).as_bytes());
        record.push_field(itoa::Buffer::new().format(point.n_target).as_bytes());
        record.push_field(itoa::Buffer::new().format(point.n_decoy).as_bytes());
        match point.p {
            Some(p) => record.push_field(ryu::Buffer::new().format(p).as_bytes()),
            None => record.push_field(b""),
        }
        record
    }

    fn serialize_map(level: Level, category: &str, map: &TargetDecoyMap) -> Vec<csv::ByteRecord> {
        map.points()
            .map(|(score, point)| Self::serialize_point(level, category, score, point))
            .collect()
    }

    fn serialize_container<K: CategoryKey>(
        level: Level,
        container: &SpecificMap<K>,
    ) -> Vec<csv::ByteRecord> {
        let mut records = container
            .maps()
            .iter()
            .flat_map(|(key, map)| Self::serialize_map(level, &key.to_string(), map))
            .collect::<Vec<_>>();
        if let Some(dustbin) = container.dustbin() {
            let category = Redirect::<K>::Dustbin.to_string();
            records.extend(Self::serialize_map(level, &category, dustbin));
        }
        records
    }

    pub fn write_peps(&self) -> anyhow::Result<String> {
        let path = self.make_path("pep.tdmap.tsv");

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "level", "category", "score", "targets", "decoys", "pep",
        ]);
        wtr.write_byte_record(&headers)?;

        let records = Self::serialize_container(Level::Psm, &self.maps.psms)
            .into_iter()
            .chain(Self::serialize_container(Level::Peptide, &*self.maps.peptides))
            .chain(
                self.maps
                    .proteins
                    .with_map(|map| Self::serialize_map(Level::Protein, "", map)),
            )
            .chain(Self::serialize_container(
                Level::Engine,
                self.maps.engines.container(),
            ));
        for record in records {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }

    pub fn write_snapshot(&self) -> anyhow::Result<String> {
        let path = self.make_path("snapshot.tdmap.json");
        Snapshot::capture(&self.maps).write(&path)?;
        Ok(path.display().to_string())
    }

    pub fn write_summary(&self, path: &Path, summary: Summary) -> anyhow::Result<()> {
        let report = Report {
            parameters: &self.parameters,
            summary: &summary,
        };
        let bytes = serde_json::to_vec_pretty(&report)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
