use crate::ingest::{self, Level, Maps};
use crate::input::Run;
use crate::snapshot::Snapshot;
use anyhow::{ensure, Context};
use log::info;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tdmap_core::progress::Progress;
use tdmap_core::specific::Stage;

pub struct Runner {
    pub parameters: Run,
    pub(crate) maps: Maps,
    start: Instant,
}

/// Logs estimation progress of one level in tenths
struct LevelProgress {
    level: Level,
    total: usize,
    processed: AtomicUsize,
}

impl LevelProgress {
    fn new(level: Level, total: usize) -> Self {
        Self {
            level,
            total,
            processed: AtomicUsize::new(0),
        }
    }
}

impl Progress for LevelProgress {
    fn increase_progress(&self) {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        let step = (self.total / 10).max(1);
        if processed % step == 0 {
            log::trace!(
                "{}: estimated {}/{} scores",
                self.level,
                processed,
                self.total
            );
        }
    }

    fn is_canceled(&self) -> bool {
        false
    }
}

impl Runner {
    pub fn new(parameters: Run) -> anyhow::Result<Self> {
        let start = Instant::now();
        let maps = match &parameters.load_snapshot {
            Some(path) => {
                info!("loading snapshot from {}", path);
                Snapshot::load(path)?.restore(&parameters)?
            }
            None => Maps::new(&parameters),
        };
        Ok(Self {
            parameters,
            maps,
            start,
        })
    }

    pub fn maps(&self) -> &Maps {
        &self.maps
    }

    fn ingest(&self) -> anyhow::Result<usize> {
        if self.parameters.observations.is_empty() {
            return Ok(0);
        }
        ensure!(
            self.maps.psms.stage() == Stage::Accumulating
                && self.maps.peptides.stage() == Stage::Accumulating
                && self.maps.proteins.stage() == Stage::Accumulating,
            "observations can't be added to a curated snapshot"
        );

        let start = Instant::now();
        let rows = ingest::read_all(&self.parameters.observations, &self.maps)?;
        info!(
            "read {} observations from {} files in {:#?}",
            rows,
            self.parameters.observations.len(),
            start.elapsed()
        );
        Ok(rows)
    }

    fn curate(&mut self) {
        let minimal_fdr = self.parameters.estimation.minimal_fdr;
        self.maps.psms.cure();
        self.maps.peptides.clean(minimal_fdr);
        self.maps.proteins.cure();

        for (level, kept, grouped) in [
            (
                Level::Psm,
                self.maps.psms.len(),
                self.maps.psms.grouping().len(),
            ),
            (
                Level::Peptide,
                self.maps.peptides.len(),
                self.maps.peptides.grouping().len(),
            ),
        ] {
            log::trace!("{}: {} maps estimated, {} categories grouped", level, kept, grouped);
        }
    }

    fn apply_window_sizes(&mut self) -> anyhow::Result<()> {
        for window in &self.parameters.window_sizes {
            let size = Some(window.window_size);
            let applied = match window.level {
                Level::Psm => {
                    let charge = window
                        .category
                        .parse::<u8>()
                        .with_context(|| format!("invalid charge `{}`", window.category))?;
                    self.maps.psms.set_window_size(&charge, size)
                }
                Level::Peptide => self.maps.peptides.set_window_size(&window.category, size),
                Level::Protein => {
                    self.maps.proteins.set_window_size(size);
                    Ok(())
                }
                Level::Engine => {
                    let engine = window
                        .category
                        .parse::<u32>()
                        .with_context(|| format!("invalid engine id `{}`", window.category))?;
                    self.maps.engines.set_window_size(engine, size)
                }
            };
            match applied {
                Ok(()) => log::trace!(
                    "{} {}: window size set to {}",
                    window.level,
                    window.category,
                    window.window_size
                ),
                Err(e) => log::warn!("{} {}: {}", window.level, window.category, e),
            }
        }
        Ok(())
    }

    fn estimate(&mut self) -> anyhow::Result<()> {
        let start = Instant::now();

        let psm = LevelProgress::new(Level::Psm, self.maps.psms.n_scores());
        let peptide = LevelProgress::new(Level::Peptide, self.maps.peptides.n_scores());
        let protein = LevelProgress::new(Level::Protein, self.maps.proteins.with_map(|m| m.len()));
        let engine = LevelProgress::new(Level::Engine, self.maps.engines.container().n_scores());

        let outcome = self
            .maps
            .psms
            .estimate_probabilities(&psm)
            .and(self.maps.peptides.estimate_probabilities(&peptide))
            .and(self.maps.proteins.estimate_probabilities(&protein))
            .and(self.maps.engines.estimate_probabilities(&engine));
        ensure!(outcome.is_complete(), "probability estimation was canceled");

        let minimal_fdr = self.parameters.estimation.minimal_fdr;
        if self.maps.psms.suspicious_input() {
            log::warn!("psm: some charges lack the hits for reliable statistics");
        }
        if self.maps.peptides.suspicious_input() {
            log::warn!("peptide: some modification profiles lack the hits for reliable statistics");
        }
        if self.maps.proteins.with_map(|m| !m.is_empty())
            && self.maps.proteins.suspicious_input(minimal_fdr)
        {
            log::warn!("protein: not enough hits for reliable statistics");
        }

        info!(
            "- estimated probabilities: {:8} ms",
            start.elapsed().as_millis()
        );
        Ok(())
    }

    fn validate(&mut self) -> anyhow::Result<()> {
        let request = self.parameters.threshold.request();
        self.maps.psms.validate(&request)?;
        self.maps.peptides.validate(&request)?;
        if self.maps.proteins.with_map(|m| !m.is_empty()) {
            self.maps.proteins.validate(&request)?;
        }
        self.maps.engines.validate(&request)?;
        Ok(())
    }

    pub fn run(mut self) -> anyhow::Result<Run> {
        self.ingest()?;
        self.curate();
        self.apply_window_sizes()?;
        self.estimate()?;
        self.validate()?;

        let summary = self.summary();
        info!(
            "validated {} psms, {} peptides, {} proteins at {:?} {}%",
            summary.psm.validated,
            summary.peptide.validated,
            summary.protein.validated,
            self.parameters.threshold.threshold_type,
            self.parameters.threshold.value
        );
        log::trace!("writing outputs");

        let path = self.write_peps()?;
        self.parameters.output_paths.push(path);
        if self.parameters.write_snapshot {
            let path = self.write_snapshot()?;
            self.parameters.output_paths.push(path);
        }

        let path = self.make_path("results.json");
        self.parameters
            .output_paths
            .push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);
        self.write_summary(&path, summary)?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(self.parameters)
    }
}
