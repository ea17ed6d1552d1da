//! Pluggable datasource backends
//!
//! A datasource turns an entity declaration plus the current binding
//! context into a cursor over rows. Four built-in kinds are matched by
//! exact type tag (`sql`, `csv`, `xml`, `json`); any other tag is
//! looked up in the extension registry populated via
//! [`register_datasource`].
//!
//! Lifecycle: `start()` and `finish()` are called exactly once each per
//! job run, bracketing all graphs, in declaration order. Both default
//! to no-ops and are safe to call on sources that were never queried.

mod csv;
mod json;
mod sql;
mod xml;

pub use self::csv::CsvDataSource;
pub use self::json::JsonDataSource;
pub use self::sql::SqlDataSource;
pub use self::xml::XmlDataSource;

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::config::{DataSourceConfig, EntityConfig, JobConfig};
use crate::context::BindingContext;
use crate::error::ImportError;

// ============================================================================
// CONTRACTS
// ============================================================================

/// A backend that produces rows for entities bound to it.
///
/// `execute` receives the live binding context so backend parameters
/// (the location url, a sql query) can themselves be templated against
/// already-bound rows.
pub trait DataSource {
    fn start(&mut self) -> Result<(), ImportError> {
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ImportError> {
        Ok(())
    }

    fn execute(
        &self,
        entity: &EntityConfig,
        ctx: &BindingContext,
    ) -> Result<Box<dyn RowCursor>, ImportError>;
}

/// Single-use, forward-only sequence of rows.
///
/// `next_row` past exhaustion is a contract violation and fails with
/// an iteration error. `close` is idempotent and must be called exactly
/// once by the consumer, on every exit path.
pub trait RowCursor {
    fn has_next(&mut self) -> Result<bool, ImportError>;
    fn next_row(&mut self) -> Result<Value, ImportError>;
    fn close(&mut self) -> Result<(), ImportError>;
}

/// Cursor over rows materialized at execute() time. Backends whose
/// rows cannot outlive their statement or parse buffer drain one of
/// these instead of streaming.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    rows: VecDeque<Value>,
}

impl BufferedCursor {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows: rows.into() }
    }
}

impl RowCursor for BufferedCursor {
    fn has_next(&mut self) -> Result<bool, ImportError> {
        Ok(!self.rows.is_empty())
    }

    fn next_row(&mut self) -> Result<Value, ImportError> {
        self.rows.pop_front().ok_or_else(|| {
            ImportError::Iteration("next_row() called past the end of the cursor".into())
        })
    }

    fn close(&mut self) -> Result<(), ImportError> {
        self.rows.clear();
        Ok(())
    }
}

// ============================================================================
// EXTENSION REGISTRY
// ============================================================================

/// Factory for a third-party datasource backend
pub type DataSourceFactory = fn(&DataSourceConfig) -> anyhow::Result<Box<dyn DataSource>>;

static EXTENSIONS: Lazy<RwLock<HashMap<String, DataSourceFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a datasource backend under a type tag not covered by the
/// built-in kinds. Call at startup, before any job runs; later job
/// files may then declare `type: <tag>`.
pub fn register_datasource(tag: &str, factory: DataSourceFactory) {
    EXTENSIONS.write().insert(tag.to_string(), factory);
}

// ============================================================================
// DATASOURCE REGISTRY
// ============================================================================

/// All datasources of one job run, constructed eagerly from the job
/// description so a bad declaration fails before anything is written.
pub struct DataSourceRegistry {
    sources: HashMap<String, Box<dyn DataSource>>,
    /// Declaration order, used for start/finish bracketing
    order: Vec<String>,
}

impl DataSourceRegistry {
    pub fn from_config(config: &JobConfig) -> Result<Self, ImportError> {
        let mut registry = Self {
            sources: HashMap::new(),
            order: Vec::new(),
        };
        for declaration in &config.datasources {
            let source = build_datasource(declaration)?;
            registry.insert(declaration.name.clone(), source);
        }
        Ok(registry)
    }

    /// Empty registry, populated via [`DataSourceRegistry::with_source`].
    /// Useful when embedding the engine with hand-built backends.
    pub fn empty() -> Self {
        Self {
            sources: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn with_source(mut self, name: impl Into<String>, source: Box<dyn DataSource>) -> Self {
        self.insert(name.into(), source);
        self
    }

    fn insert(&mut self, name: String, source: Box<dyn DataSource>) {
        if self.sources.insert(name.clone(), source).is_none() {
            self.order.push(name);
        }
    }

    pub fn resolve(&self, name: &str) -> Result<&dyn DataSource, ImportError> {
        self.sources
            .get(name)
            .map(|s| s.as_ref())
            .ok_or_else(|| ImportError::Configuration(format!("unknown datasource '{name}'")))
    }

    /// Start every source once, in declaration order
    pub fn start_all(&mut self) -> Result<(), ImportError> {
        for name in &self.order {
            if let Some(source) = self.sources.get_mut(name) {
                source
                    .start()
                    .map_err(|e| ImportError::Backend(format!("starting '{name}': {e}")))?;
            }
        }
        Ok(())
    }

    /// Finish every source once, in declaration order. Best-effort:
    /// every source is finished even when an earlier one fails; the
    /// first error is returned after the sweep.
    pub fn finish_all(&mut self) -> Result<(), ImportError> {
        let mut first_error = None;
        for name in &self.order {
            if let Some(source) = self.sources.get_mut(name) {
                if let Err(e) = source.finish() {
                    warn!(datasource = %name, error = %e, "failed to finish datasource");
                    first_error
                        .get_or_insert(ImportError::Backend(format!("finishing '{name}': {e}")));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }
}

fn build_datasource(declaration: &DataSourceConfig) -> Result<Box<dyn DataSource>, ImportError> {
    let wrap = |e: anyhow::Error| {
        ImportError::Configuration(format!("datasource '{}': {e:#}", declaration.name))
    };
    match declaration.kind.as_str() {
        "sql" => Ok(Box::new(SqlDataSource::from_config(declaration).map_err(wrap)?)),
        "csv" => Ok(Box::new(CsvDataSource::from_config(declaration).map_err(wrap)?)),
        "xml" => Ok(Box::new(XmlDataSource::from_config(declaration).map_err(wrap)?)),
        "json" => Ok(Box::new(JsonDataSource::from_config(declaration).map_err(wrap)?)),
        other => match EXTENSIONS.read().get(other) {
            Some(factory) => factory(declaration).map_err(wrap),
            None => Err(ImportError::Configuration(format!(
                "type '{}' on datasource '{}' is mandatory and must exist",
                other, declaration.name
            ))),
        },
    }
}

// ============================================================================
// LOCATION FETCHING
// ============================================================================

static FETCH_CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .user_agent("graphload/0.1")
        .build()
        .expect("failed to build HTTP client")
});

/// True when a datasource location is a remote document rather than a
/// local file path
pub(crate) fn is_remote(location: &str) -> bool {
    matches!(url::Url::parse(location), Ok(u) if u.scheme() == "http" || u.scheme() == "https")
}

/// Read a datasource location into memory: http(s) urls are fetched,
/// anything else is treated as a file path.
pub(crate) fn read_location(location: &str) -> anyhow::Result<String> {
    use anyhow::Context;

    if is_remote(location) {
        let response = FETCH_CLIENT
            .get(location)
            .send()
            .with_context(|| format!("fetching {location}"))?
            .error_for_status()
            .with_context(|| format!("fetching {location}"))?;
        Ok(response.text()?)
    } else {
        std::fs::read_to_string(location).with_context(|| format!("reading {location}"))
    }
}
