//! Import orchestration
//!
//! One [`Importer`] drives one job run: optional cleanup statement,
//! datasource lifecycle bracketing, one tree execution per graph with
//! a fresh copy of the base context, trailing batch commits and
//! last-run bookkeeping. Datasources are always finished, even when a
//! graph fails mid-run.

use chrono::Local;
use serde_json::json;
use tracing::{info, instrument};

use crate::config::JobConfig;
use crate::context::BindingContext;
use crate::datasource::DataSourceRegistry;
use crate::error::ImportError;
use crate::executor::TreeExecutor;
use crate::properties::{PropertiesStore, LAST_INDEX_TIME};
use crate::sink::{CypherSink, WriteStats};

/// Submitted in clean mode when the job declares no override
pub const DEFAULT_CLEAN_QUERY: &str = "MATCH (n) OPTIONAL MATCH (n)-[r]-(m) DELETE n,r,m;";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Aggregated outcome of one job run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Store counters summed over every submission of the run
    pub stats: WriteStats,
    /// Batches committed (periodic and trailing; the clean statement
    /// is outside batching and not counted)
    pub batches: usize,
    /// Cypher nodes processed across all graphs
    pub iterations: usize,
    /// Generated script text; only collected in debug mode, where
    /// nothing is submitted
    pub script: String,
}

pub struct Importer {
    config: JobConfig,
    registry: DataSourceRegistry,
    properties: PropertiesStore,
    sink: Box<dyn CypherSink>,
    clean: bool,
    debug: bool,
}

impl Importer {
    /// Build an importer for a job description. Every declared
    /// datasource is constructed here, so a bad declaration fails
    /// before anything touches the store.
    pub fn new(
        config: JobConfig,
        properties: PropertiesStore,
        sink: Box<dyn CypherSink>,
        clean: bool,
        debug: bool,
    ) -> Result<Self, ImportError> {
        config.validate()?;
        let registry = DataSourceRegistry::from_config(&config)?;
        Ok(Self {
            config,
            registry,
            properties,
            sink,
            clean,
            debug,
        })
    }

    /// Build an importer around a hand-assembled registry (embedding,
    /// tests). The job description is still validated; its datasource
    /// declarations are assumed to match the registry.
    pub fn with_registry(
        config: JobConfig,
        registry: DataSourceRegistry,
        properties: PropertiesStore,
        sink: Box<dyn CypherSink>,
        clean: bool,
        debug: bool,
    ) -> Result<Self, ImportError> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            properties,
            sink,
            clean,
            debug,
        })
    }

    pub fn properties(&self) -> &PropertiesStore {
        &self.properties
    }

    /// Execute the whole job
    #[instrument(skip(self), fields(graphs = self.config.graphs.len(), debug = self.debug))]
    pub fn run(&mut self) -> Result<RunReport, ImportError> {
        let started_at = Local::now().format(TIMESTAMP_FORMAT).to_string();

        let mut base = self.properties.as_map();
        base.insert("debug".to_string(), json!(self.debug));
        base.insert("clean".to_string(), json!(self.clean));

        let mut report = RunReport::default();

        if !self.debug {
            self.run_clean(&mut report)?;
        }

        match self.registry.start_all() {
            Ok(()) => {
                let ran = self.run_graphs(&base, &started_at, &mut report);
                let finished = self.registry.finish_all();
                ran.and(finished)?;
            }
            Err(e) => {
                // Some sources may have started before the failure;
                // sweep finish over all of them, then report the
                // original error.
                let _ = self.registry.finish_all();
                return Err(e);
            }
        }

        info!(batches = report.batches, iterations = report.iterations, "import finished");
        Ok(report)
    }

    fn run_clean(&mut self, report: &mut RunReport) -> Result<(), ImportError> {
        if !self.clean {
            return Ok(());
        }
        let query = self.config.clean.as_deref().unwrap_or(DEFAULT_CLEAN_QUERY);
        info!("clean mode: submitting cleanup statement");
        let stats = self.sink.submit(query)?;
        report.stats.merge(&stats);
        Ok(())
    }

    fn run_graphs(
        &mut self,
        base: &std::collections::HashMap<String, serde_json::Value>,
        started_at: &str,
        report: &mut RunReport,
    ) -> Result<(), ImportError> {
        for (index, graph) in self.config.graphs.iter().enumerate() {
            info!(graph = index + 1, "processing graph");

            let mut ctx = BindingContext::from_map(base.clone());
            let executor = TreeExecutor::new(
                &self.registry,
                self.sink.as_ref(),
                graph.periodic_commit,
                self.debug,
            );
            let mut outcome = executor.execute(&graph.nodes, &mut ctx)?;

            report.iterations += outcome.batch.iterations();
            report.stats.merge(&outcome.stats);
            report.batches += outcome.flushes;

            if self.debug {
                report.script.push_str(&outcome.batch.take_script());
            } else {
                // A graph that never reached its commit threshold still
                // commits its trailing partial batch here.
                if let Some(stats) = outcome.batch.flush(self.sink.as_ref())? {
                    report.stats.merge(&stats);
                    report.batches += 1;
                }
                self.properties.set(LAST_INDEX_TIME, json!(started_at));
                self.properties.save()?;
            }
        }
        Ok(())
    }
}
