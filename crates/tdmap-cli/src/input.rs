use crate::ingest::Level;
use anyhow::{ensure, Context};
use clap::ArgMatches;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tdmap_core::parameters::{Builder, EstimationParameters};
use tdmap_core::results::{TargetDecoyResults, ThresholdType};
use tdmap_core::specific::peptide::ModificationInfo;

#[derive(Serialize)]
/// Actual run parameters - may include overrides or default values not set by user
pub struct Run {
    pub version: String,
    pub estimation: EstimationParameters,
    pub threshold: ThresholdSettings,
    pub observations: Vec<String>,
    pub window_sizes: Vec<WindowOverride>,
    pub modifications: Vec<ModificationInfo>,
    pub aliases: FnvHashMap<String, String>,
    pub engines: FnvHashMap<u32, String>,
    pub load_snapshot: Option<String>,
    pub write_snapshot: bool,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input parameters deserialized from JSON file
pub struct Input {
    estimation: Option<Builder>,
    threshold: Option<ThresholdOptions>,
    observations: Option<Vec<String>>,
    output_directory: Option<String>,
    window_sizes: Option<Vec<WindowOverride>>,
    modifications: Option<Vec<ModificationInfo>>,
    /// Ambiguous modification name -> canonical name
    aliases: Option<FnvHashMap<String, String>>,
    /// Search engine id -> name, used in log messages
    engines: Option<FnvHashMap<u32, String>>,
    load_snapshot: Option<String>,
    write_snapshot: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
/// Fixed smoothing window for one category
pub struct WindowOverride {
    pub level: Level,
    pub category: String,
    pub window_size: usize,
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct ThresholdOptions {
    #[serde(rename = "type")]
    pub threshold_type: Option<ThresholdType>,
    pub value: Option<f64>,
    pub classical_estimators: Option<bool>,
    pub classical_validation: Option<bool>,
}

#[derive(Serialize, Copy, Clone, Debug, PartialEq)]
pub struct ThresholdSettings {
    #[serde(rename = "type")]
    pub threshold_type: ThresholdType,
    /// Percent
    pub value: f64,
    pub classical_estimators: bool,
    pub classical_validation: bool,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            threshold_type: ThresholdType::Fdr,
            value: 1.0,
            classical_estimators: true,
            classical_validation: true,
        }
    }
}

impl From<ThresholdOptions> for ThresholdSettings {
    fn from(value: ThresholdOptions) -> Self {
        let default = Self::default();
        let settings = Self {
            threshold_type: value.threshold_type.unwrap_or(default.threshold_type),
            value: value.value.unwrap_or(default.value),
            classical_estimators: value
                .classical_estimators
                .unwrap_or(default.classical_estimators),
            classical_validation: value
                .classical_validation
                .unwrap_or(default.classical_validation),
        };
        if !(0.0..=100.0).contains(&settings.value) {
            log::warn!(
                "threshold.value is a percentage, {} is outside of [0, 100]",
                settings.value
            );
        } else if settings.threshold_type != ThresholdType::Confidence && settings.value > 10.0 {
            log::warn!("threshold.value is higher than expected");
        }
        settings
    }
}

impl ThresholdSettings {
    /// Threshold search request handed to every map
    pub fn request(&self) -> TargetDecoyResults {
        TargetDecoyResults::new(self.threshold_type, self.value)
            .estimators(self.classical_estimators, self.classical_validation)
    }
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let mut input = match matches.get_one::<String>("parameters") {
            Some(path) => Input::load(path)
                .with_context(|| format!("Failed to read parameters from `{path}`"))?,
            None => Input::default(),
        };

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(paths) = matches.get_many::<String>("observations") {
            log::trace!("overriding `observations` parameter.");
            input.observations = Some(paths.map(|p| p.into()).collect());
        }
        if let Some(path) = matches.get_one::<String>("snapshot") {
            log::trace!("overriding `load_snapshot` parameter.");
            input.load_snapshot = Some(path.into());
        }
        if let Some(fdr) = matches.get_one::<f64>("fdr").copied() {
            log::trace!("overriding `threshold` parameter.");
            let threshold = input.threshold.get_or_insert_with(Default::default);
            threshold.threshold_type = Some(ThresholdType::Fdr);
            threshold.value = Some(fdr);
        }
        if matches.get_flag("write-snapshot") {
            input.write_snapshot = Some(true);
        }

        ensure!(
            input.observations.is_some() || input.load_snapshot.is_some(),
            "`observations` or `load_snapshot` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Run> {
        let estimation = self.estimation.unwrap_or_default().make_parameters();
        let threshold: ThresholdSettings = self.threshold.map(Into::into).unwrap_or_default();

        let observations = self.observations.unwrap_or_default();
        if observations.is_empty() && self.load_snapshot.is_none() {
            log::warn!("no observation files and no snapshot: nothing to estimate");
        }

        let window_sizes = self.window_sizes.unwrap_or_default();
        for window in &window_sizes {
            if window.window_size == 0 {
                log::warn!(
                    "{} {}: a window size of 0 estimates every score on its own",
                    window.level,
                    window.category
                );
            }
        }

        let modifications = self.modifications.unwrap_or_default();
        for modification in &modifications {
            ensure!(
                !modification.name.is_empty(),
                "modification names must not be empty"
            );
        }

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path)
                    .with_context(|| format!("Failed to create `{}`", path.display()))?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Run {
            version: clap::crate_version!().into(),
            estimation,
            threshold,
            observations,
            window_sizes,
            modifications,
            aliases: self.aliases.unwrap_or_default(),
            engines: self.engines.unwrap_or_default(),
            load_snapshot: self.load_snapshot,
            write_snapshot: self.write_snapshot.unwrap_or(false),
            output_paths: Vec::new(),
            output_directory,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() -> anyhow::Result<()> {
        let input: Input = serde_json::from_str(r#"{ "observations": ["a.tsv"] }"#)?;
        let run = input.build()?;
        assert_eq!(run.estimation, EstimationParameters::default());
        assert_eq!(run.threshold, ThresholdSettings::default());
        assert_eq!(run.observations, vec!["a.tsv".to_string()]);
        assert!(!run.write_snapshot);

        let request = run.threshold.request();
        assert_eq!(request.threshold_type, ThresholdType::Fdr);
        assert_eq!(request.user_input, 1.0);
        Ok(())
    }

    #[test]
    fn full_input() -> anyhow::Result<()> {
        let json = r#"{
            "estimation": { "min_nmax": 50, "minimal_fdr": 0.05 },
            "threshold": { "type": "confidence", "value": 95.0, "classical_validation": false },
            "observations": ["a.tsv", "b.tsv"],
            "window_sizes": [{ "level": "psm", "category": "2", "window_size": 40 }],
            "modifications": [{ "name": "Oxidation of M", "variable": true }],
            "aliases": { "ox": "Oxidation of M" },
            "engines": { "1": "X!Tandem" },
            "write_snapshot": true
        }"#;
        let run = serde_json::from_str::<Input>(json)?.build()?;
        assert_eq!(run.estimation.min_nmax, 50);
        assert_eq!(run.estimation.minimal_fdr, 0.05);
        assert_eq!(run.threshold.threshold_type, ThresholdType::Confidence);
        assert_eq!(run.threshold.value, 95.0);
        assert!(run.threshold.classical_estimators);
        assert!(!run.threshold.classical_validation);
        assert_eq!(run.window_sizes[0].level, Level::Psm);
        assert_eq!(run.aliases.get("ox").map(String::as_str), Some("Oxidation of M"));
        assert_eq!(run.engines.get(&1).map(String::as_str), Some("X!Tandem"));
        assert!(run.write_snapshot);
        Ok(())
    }
}
