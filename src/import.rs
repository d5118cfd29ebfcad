//! One import run: connect, read, simulate, replace.
//!
//! ```text
//! Idle -> Connecting -> Reading -> Simulating -> Clearing -> Inserting -> Done
//!            |             |
//!            +-> Failed <--+   (any later fatal error also ends in Failed)
//! ```
//!
//! Nothing is retried. A failed run must be started again from the top.

use crate::config::{ImportSettings, SimulationParams};
use crate::db::{LoadReport, LoadStage, ReadingStore};
use crate::geo;
use crate::ingest::csv_source;
use crate::logging::{self, DataSource};
use crate::model::ImportError;
use crate::simulate::Simulator;
use crate::stations::StationRegistry;
use std::fmt;

// ---------------------------------------------------------------------------
// Run phases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Idle,
    Connecting,
    Reading,
    Simulating,
    Clearing,
    Inserting,
    Done,
    Failed,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportPhase::Idle => "idle",
            ImportPhase::Connecting => "connecting",
            ImportPhase::Reading => "reading",
            ImportPhase::Simulating => "simulating",
            ImportPhase::Clearing => "clearing",
            ImportPhase::Inserting => "inserting",
            ImportPhase::Done => "done",
            ImportPhase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

impl ImportPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ImportPhase::Done | ImportPhase::Failed)
    }

    /// Forward edges of the run state machine. `Failed` is reachable from
    /// every non-terminal phase except `Idle`.
    pub fn can_advance_to(self, next: ImportPhase) -> bool {
        use ImportPhase::*;
        match (self, next) {
            (Idle, Connecting)
            | (Connecting, Reading)
            | (Reading, Simulating)
            | (Simulating, Clearing)
            | (Clearing, Inserting)
            | (Inserting, Done) => true,
            (from, Failed) => !from.is_terminal() && from != Idle,
            _ => false,
        }
    }
}

/// Tracks the phase of one run and every phase it has passed through.
#[derive(Debug, Clone)]
pub struct ImportRun {
    phase: ImportPhase,
    history: Vec<ImportPhase>,
}

impl Default for ImportRun {
    fn default() -> Self {
        ImportRun {
            phase: ImportPhase::Idle,
            history: vec![ImportPhase::Idle],
        }
    }
}

impl ImportRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    pub fn history(&self) -> &[ImportPhase] {
        &self.history
    }

    fn advance(&mut self, next: ImportPhase) -> Result<(), ImportError> {
        if !self.phase.can_advance_to(next) {
            return Err(ImportError::config(format!(
                "illegal import transition {} -> {}",
                self.phase, next
            )));
        }
        logging::debug(
            DataSource::System,
            None,
            &format!("import phase {} -> {}", self.phase, next),
        );
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// Moves the run to `Failed` and hands the error back for propagation.
    fn fail(&mut self, err: ImportError) -> ImportError {
        if self.phase.can_advance_to(ImportPhase::Failed) {
            logging::error(
                DataSource::System,
                None,
                &format!("import failed while {}: {}", self.phase, err),
            );
            self.phase = ImportPhase::Failed;
            self.history.push(ImportPhase::Failed);
        }
        err
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    /// Rows read from the input, including unknown stations.
    pub rows_read: usize,
    /// Rows that passed the station filter and were simulated.
    pub rows_accepted: usize,
    /// Rows dropped because their station is not registered.
    pub rows_skipped: usize,
    pub load: LoadReport,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Runs one full import against the store `connect` opens.
///
/// `run` must be fresh (`Idle`). On return it is `Done` or `Failed`, so the
/// caller can see where a failed run stopped.
pub fn run_import<S, C>(
    run: &mut ImportRun,
    settings: &ImportSettings,
    params: &SimulationParams,
    registry: &StationRegistry,
    connect: C,
) -> Result<ImportSummary, ImportError>
where
    S: ReadingStore,
    C: FnOnce() -> Result<S, ImportError>,
{
    run.advance(ImportPhase::Connecting)?;
    let mut store = connect().map_err(|e| run.fail(e))?;

    run.advance(ImportPhase::Reading)?;
    logging::info(
        DataSource::Csv,
        None,
        &format!("Starting data import from {}", settings.input.display()),
    );
    let rows = csv_source::read_rows(&settings.input).map_err(|e| run.fail(e))?;
    let rows_read = rows.len();

    run.advance(ImportPhase::Simulating)?;
    let accepted = registry.filter_rows(rows);
    let rows_accepted = accepted.len();
    let rows_skipped = rows_read - rows_accepted;
    if rows_skipped > 0 {
        logging::debug(
            DataSource::Csv,
            None,
            &format!("{} rows skipped for unregistered stations", rows_skipped),
        );
    }

    let mut simulator = Simulator::seeded(params.clone(), settings.state_scope, settings.seed)
        .map_err(|e| run.fail(e))?;
    let values = simulator.run(&accepted);
    let readings = geo::format_all(registry, values).map_err(|e| run.fail(e))?;
    logging::info(
        DataSource::Simulator,
        None,
        &format!(
            "Simulated {} readings ({:?} state, {} stations)",
            readings.len(),
            simulator.scope(),
            registry.len()
        ),
    );

    let mut stage_error = None;
    let mut on_stage = |stage: LoadStage| {
        let next = match stage {
            LoadStage::Clearing => ImportPhase::Clearing,
            LoadStage::Inserting => ImportPhase::Inserting,
        };
        if let Err(e) = run.advance(next) {
            stage_error.get_or_insert(e);
        }
    };
    let result = store.replace_all(&readings, &mut on_stage);
    let load = result.map_err(|e| run.fail(e))?;
    if let Some(e) = stage_error {
        return Err(run.fail(e));
    }

    for failure in &load.failures {
        logging::log_insert_failure(failure);
    }
    logging::log_import_summary(load.attempted, load.failed());

    run.advance(ImportPhase::Done)?;
    Ok(ImportSummary {
        rows_read,
        rows_accepted,
        rows_skipped,
        load,
    })
}
