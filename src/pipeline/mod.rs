//! Dataset-to-graph import: parse, aggregate, materialize, stage, load.

pub mod aggregate;
pub mod load;
pub mod materialize;
pub mod staging;

use crate::config::{ImportConfig, StoreConfig};
use crate::error::{ImportError, PipelineError};
use crate::ingest::edge_list::EdgeListSource;
use crate::store::GraphStore;
use aggregate::Aggregator;
use load::BulkLoader;
use staging::StagingPaths;
use std::fmt;
use tracing::{info, warn};

/// Progress of an import run. Each stage names the last step completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NotStarted,
    ConstraintsApplied,
    UsersLoaded,
    EdgesLoaded,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    At(Stage),
    Failed(Stage),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub events: u64,
    pub users: usize,
    pub observed_pairs: usize,
    pub dropped_self_loops: u64,
    pub staged_follows: usize,
    pub users_loaded: usize,
    pub follows_loaded: usize,
}

/// Drives one import against an open store.
///
/// Every write is an idempotent upsert, so recovery from any failure is a
/// fresh run.
pub struct ImportPipeline<'s> {
    store: &'s mut GraphStore,
    config: &'s ImportConfig,
    state: PipelineState,
}

impl<'s> ImportPipeline<'s> {
    pub fn new(store: &'s mut GraphStore, config: &'s ImportConfig) -> Self {
        Self {
            store,
            config,
            state: PipelineState::At(Stage::NotStarted),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn stage(&self) -> Stage {
        match self.state {
            PipelineState::At(stage) | PipelineState::Failed(stage) => stage,
        }
    }

    fn advance(&mut self, next: Stage) {
        info!(stage = %next, "import stage reached");
        self.state = PipelineState::At(next);
    }

    fn fail(&mut self, source: ImportError) -> PipelineError {
        let stage = self.stage();
        warn!(stage = %stage, error = %source, "import failed");
        self.state = PipelineState::Failed(stage);
        PipelineError { stage, source }
    }

    /// Parses `source`, stages the derived tables and loads them.
    pub fn run(&mut self, source: &EdgeListSource) -> Result<ImportReport, PipelineError> {
        self.state = PipelineState::At(Stage::NotStarted);
        let (mut report, paths) = match self.prepare(source) {
            Ok(prepared) => prepared,
            Err(e) => return Err(self.fail(e)),
        };
        let (users_loaded, follows_loaded) = self.load(&paths)?;
        report.users_loaded = users_loaded;
        report.follows_loaded = follows_loaded;
        info!(
            events = report.events,
            users = report.users,
            follows = report.follows_loaded,
            "import complete"
        );
        Ok(report)
    }

    fn prepare(
        &self,
        source: &EdgeListSource,
    ) -> Result<(ImportReport, StagingPaths), ImportError> {
        info!(dataset = %source.path().display(), "reading dataset");
        let aggregation = Aggregator::new(self.config.self_loops).consume(source.open()?)?;
        let users = materialize::materialize(aggregation.identifiers())?;
        let edges = aggregation.follow_edges();
        info!(
            users = users.len(),
            follows = edges.len(),
            events = aggregation.event_count(),
            "derived follow graph"
        );
        let paths = staging::stage(&self.config.data_dir, &users, &edges)?;

        let report = ImportReport {
            events: aggregation.event_count(),
            users: users.len(),
            observed_pairs: aggregation.observed_pair_count(),
            dropped_self_loops: aggregation.dropped_self_loops(),
            staged_follows: edges.len(),
            ..ImportReport::default()
        };
        Ok((report, paths))
    }

    /// Applies the schema and loads already staged tables.
    ///
    /// Returns `(users upserted, follows upserted)`.
    pub fn load(&mut self, paths: &StagingPaths) -> Result<(usize, usize), PipelineError> {
        let batch_size = self.config.batch_size;

        let result = BulkLoader::new(&mut *self.store, batch_size).apply_schema();
        self.check(result)?;
        self.advance(Stage::ConstraintsApplied);

        let result = staging::read_users(&paths.users)
            .and_then(|rows| BulkLoader::new(&mut *self.store, batch_size).load_users(rows));
        let users = self.check(result)?;
        self.advance(Stage::UsersLoaded);

        let result = staging::read_follows(&paths.follows)
            .and_then(|rows| BulkLoader::new(&mut *self.store, batch_size).load_follows(rows));
        let follows = self.check(result)?;
        self.advance(Stage::EdgesLoaded);

        self.advance(Stage::Complete);
        Ok((users, follows))
    }

    fn check<T>(&mut self, result: Result<T, ImportError>) -> Result<T, PipelineError> {
        result.map_err(|e| self.fail(e))
    }
}

/// Opens the store, runs one import and closes the store on every path.
pub fn run_import(
    store_config: &StoreConfig,
    config: &ImportConfig,
    source: &EdgeListSource,
) -> Result<ImportReport, PipelineError> {
    let mut store = store_config.open().map_err(|e| PipelineError {
        stage: Stage::NotStarted,
        source: e.into(),
    })?;
    ImportPipeline::new(&mut store, config).run(source)
}

/// Opens the store and loads existing staging files from `config.data_dir`.
pub fn run_staged_load(
    store_config: &StoreConfig,
    config: &ImportConfig,
) -> Result<(usize, usize), PipelineError> {
    let mut store = store_config.open().map_err(|e| PipelineError {
        stage: Stage::NotStarted,
        source: e.into(),
    })?;
    let paths = StagingPaths::in_dir(&config.data_dir);
    ImportPipeline::new(&mut store, config).load(&paths)
}
