//! graphload - configuration-driven import of hierarchical data
//! sources into a graph database

pub mod batch;
pub mod config;
pub mod context;
pub mod datasource;
pub mod error;
pub mod executor;
pub mod importer;
pub mod properties;
pub mod sink;
pub mod template;

pub use batch::BatchAccumulator;
pub use config::{DataSourceConfig, EntityConfig, GraphConfig, JobConfig, Node, TargetConfig};
pub use context::BindingContext;
pub use datasource::{
    register_datasource, BufferedCursor, DataSource, DataSourceFactory, DataSourceRegistry,
    RowCursor,
};
pub use error::{FixSuggestion, ImportError};
pub use executor::{TreeExecutor, TreeOutcome};
pub use importer::{Importer, RunReport, DEFAULT_CLEAN_QUERY};
pub use properties::{PropertiesStore, LAST_INDEX_TIME};
pub use sink::{CypherSink, HttpSink, MockSink, NullSink, WriteStats};
pub use template::TemplateRenderer;
