//! Batched script accumulation
//!
//! Rendered statements accumulate into one script buffer per graph.
//! The iteration counter counts every processed cypher node for the
//! lifetime of the graph; a flush clears the buffer but never the
//! counter, so periodic commits trigger on iteration multiples rather
//! than on buffer size.

use crate::error::ImportError;
use crate::sink::{CypherSink, WriteStats};

/// Accumulates rendered statement text between commits
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    script: String,
    iterations: usize,
    periodic_commit: Option<usize>,
}

impl BatchAccumulator {
    pub fn new(periodic_commit: Option<usize>) -> Self {
        Self {
            script: String::new(),
            iterations: 0,
            periodic_commit,
        }
    }

    /// Append one rendered statement and count the iteration
    pub fn push(&mut self, statement: &str) {
        self.iterations += 1;
        self.script.push_str(statement);
    }

    /// True when a periodic commit is configured and the iteration
    /// count has just reached a multiple of it
    pub fn at_commit_point(&self) -> bool {
        match self.periodic_commit {
            Some(n) => self.iterations % n == 0,
            None => false,
        }
    }

    /// Submit the buffered script as one transaction and clear the
    /// buffer. An empty buffer submits nothing.
    pub fn flush(&mut self, sink: &dyn CypherSink) -> Result<Option<WriteStats>, ImportError> {
        if self.script.is_empty() {
            return Ok(None);
        }
        let stats = sink.submit(&self.script)?;
        self.script.clear();
        Ok(Some(stats))
    }

    /// Processed cypher nodes since the start of the graph
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Currently buffered script text
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Take the buffered text without submitting (debug runs)
    pub fn take_script(&mut self) -> String {
        std::mem::take(&mut self.script)
    }
}
