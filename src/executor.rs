//! Recursive entity-tree execution
//!
//! Walks a graph's node list in order. Cypher nodes render against the
//! binding context and accumulate into the batch; entity nodes stream
//! rows from their datasource, bind each row under the entity's name
//! (overwriting any prior binding) and recurse into their children once
//! per row. A row's whole subtree, including any periodic commits it
//! triggers, completes before the next row is pulled.

use tracing::{debug, instrument};

use crate::batch::BatchAccumulator;
use crate::config::{EntityConfig, Node};
use crate::context::BindingContext;
use crate::datasource::{DataSourceRegistry, RowCursor};
use crate::error::ImportError;
use crate::sink::{CypherSink, WriteStats};
use crate::template;

/// What one graph's traversal produced
#[derive(Debug)]
pub struct TreeOutcome {
    /// Accumulator with any trailing, not-yet-committed script
    pub batch: BatchAccumulator,
    /// Stats aggregated over periodic commits
    pub stats: WriteStats,
    /// Number of periodic commits submitted
    pub flushes: usize,
}

/// Executes one graph's node tree against a datasource registry and a sink
pub struct TreeExecutor<'a> {
    registry: &'a DataSourceRegistry,
    sink: &'a dyn CypherSink,
    batch: BatchAccumulator,
    stats: WriteStats,
    flushes: usize,
    debug_mode: bool,
}

impl<'a> TreeExecutor<'a> {
    pub fn new(
        registry: &'a DataSourceRegistry,
        sink: &'a dyn CypherSink,
        periodic_commit: Option<usize>,
        debug_mode: bool,
    ) -> Self {
        Self {
            registry,
            sink,
            batch: BatchAccumulator::new(periodic_commit),
            stats: WriteStats::default(),
            flushes: 0,
            debug_mode,
        }
    }

    /// Process the whole node list, then hand back the accumulator so
    /// the caller can commit the trailing partial batch.
    pub fn execute(
        mut self,
        nodes: &[Node],
        ctx: &mut BindingContext,
    ) -> Result<TreeOutcome, ImportError> {
        self.process(nodes, ctx)?;
        Ok(TreeOutcome {
            batch: self.batch,
            stats: self.stats,
            flushes: self.flushes,
        })
    }

    fn process(&mut self, nodes: &[Node], ctx: &mut BindingContext) -> Result<(), ImportError> {
        for node in nodes {
            match node {
                Node::Cypher { cypher } => self.process_cypher(cypher, ctx)?,
                Node::Entity { entity } => self.process_entity(entity, ctx)?,
            }
        }
        Ok(())
    }

    #[instrument(skip(self, entity, ctx), fields(entity = %entity.name))]
    fn process_entity(
        &mut self,
        entity: &EntityConfig,
        ctx: &mut BindingContext,
    ) -> Result<(), ImportError> {
        let source = self.registry.resolve(&entity.datasource)?;
        let mut cursor = source.execute(entity, ctx)?;

        // The cursor is closed exactly once on every exit path; a
        // failure inside the row loop still reaches close below.
        let walked = self.walk_rows(cursor.as_mut(), entity, ctx);
        let closed = cursor.close();
        walked?;
        closed?;
        Ok(())
    }

    fn walk_rows(
        &mut self,
        cursor: &mut dyn RowCursor,
        entity: &EntityConfig,
        ctx: &mut BindingContext,
    ) -> Result<(), ImportError> {
        let mut rows = 0usize;
        while cursor.has_next()? {
            let row = cursor.next_row()?;
            ctx.bind(entity.name.clone(), row);
            self.process(&entity.nodes, ctx)?;
            rows += 1;
        }
        debug!(entity = %entity.name, rows, "entity exhausted");
        Ok(())
    }

    fn process_cypher(&mut self, cypher: &str, ctx: &BindingContext) -> Result<(), ImportError> {
        let rendered = template::render(cypher, ctx)?;
        self.batch.push(&rendered);

        if !self.debug_mode && self.batch.at_commit_point() {
            if let Some(stats) = self.batch.flush(self.sink)? {
                debug!(iterations = self.batch.iterations(), "periodic commit");
                self.stats.merge(&stats);
                self.flushes += 1;
            }
        }
        Ok(())
    }
}
