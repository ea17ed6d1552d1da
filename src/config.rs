//! Job description parsing structures
//!
//! A job file declares named datasources, one or more graphs (each an
//! ordered tree of entity/cypher nodes with an optional periodic commit),
//! an optional clean statement and an optional target endpoint.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ImportError;

/// Schema tag every job file must carry
pub const JOB_SCHEMA: &str = "graphload/job@0.1";

/// Entity and datasource names become template variables, so they are
/// restricted to identifier characters.
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Job description parsed from YAML
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub schema: String,
    #[serde(default)]
    pub datasources: Vec<DataSourceConfig>,
    pub graphs: Vec<GraphConfig>,
    /// Override for the clean statement submitted in clean mode
    #[serde(default)]
    pub clean: Option<String>,
    /// Graph store endpoint; may be absent for validate/debug runs
    #[serde(default)]
    pub target: Option<TargetConfig>,
}

/// One datasource declaration: a name, a type tag and backend-specific
/// parameters captured as a flattened map.
#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Location of the backing data: a file path or an http(s) url.
    /// Rendered against the binding context before use.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub params: HashMap<String, Value>,
}

impl DataSourceConfig {
    /// Backend-specific string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Backend-specific bool parameter
    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(Value::as_bool)
    }
}

/// One independently committed unit of the job
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    /// Submit the accumulated script every N processed cypher nodes.
    /// Absent means a single commit at the end of the graph.
    #[serde(default)]
    pub periodic_commit: Option<usize>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// Tree node: either a literal cypher template or an entity bound to a
/// datasource. Serde picks the variant from the single key used.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Cypher { cypher: String },
    Entity { entity: EntityConfig },
}

/// A named binding point populated by streaming rows from a datasource
#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub datasource: String,
    /// Children processed once per row of this entity
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Backend-specific parameters (e.g. `query` for sql sources)
    #[serde(flatten)]
    pub params: HashMap<String, Value>,
}

impl EntityConfig {
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Graph store endpoint for batch submission
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl JobConfig {
    /// Parse a job description from YAML and validate it
    pub fn from_yaml(yaml: &str) -> Result<Self, ImportError> {
        let config: JobConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a job description from a file
    pub fn load(path: &Path) -> Result<Self, ImportError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Structural checks performed before anything executes, so a bad
    /// declaration fails fast without touching the graph store.
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.schema != JOB_SCHEMA {
            return Err(ImportError::Configuration(format!(
                "invalid schema: expected '{}', got '{}'",
                JOB_SCHEMA, self.schema
            )));
        }

        let mut names = HashSet::new();
        for ds in &self.datasources {
            check_name(&ds.name, "datasource")?;
            if !names.insert(ds.name.as_str()) {
                return Err(ImportError::Configuration(format!(
                    "duplicate datasource name '{}'",
                    ds.name
                )));
            }
        }

        for (i, graph) in self.graphs.iter().enumerate() {
            if let Some(0) = graph.periodic_commit {
                return Err(ImportError::Configuration(format!(
                    "graph #{}: periodic_commit must be >= 1",
                    i + 1
                )));
            }
            validate_nodes(&graph.nodes, &names)?;
        }

        Ok(())
    }
}

fn validate_nodes(nodes: &[Node], datasources: &HashSet<&str>) -> Result<(), ImportError> {
    for node in nodes {
        if let Node::Entity { entity } = node {
            check_name(&entity.name, "entity")?;
            if !datasources.contains(entity.datasource.as_str()) {
                return Err(ImportError::Configuration(format!(
                    "entity '{}' references unknown datasource '{}'",
                    entity.name, entity.datasource
                )));
            }
            validate_nodes(&entity.nodes, datasources)?;
        }
    }
    Ok(())
}

fn check_name(name: &str, what: &str) -> Result<(), ImportError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ImportError::Configuration(format!(
            "invalid {what} name '{name}': use letters, digits and underscores"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
schema: graphload/job@0.1
datasources:
  - name: db
    type: sql
    url: ./crm.db
  - name: people
    type: csv
    url: people.csv
    separator: ";"
graphs:
  - periodic_commit: 500
    nodes:
      - cypher: "CREATE INDEX FOR (p:Person) ON (p.id);"
      - entity:
          name: person
          datasource: db
          query: "SELECT * FROM person"
          nodes:
            - cypher: "MERGE (p:Person {id: {{person.id}}});"
clean: "MATCH (n) DETACH DELETE n;"
"#;

    #[test]
    fn parses_sample_job() {
        let config = JobConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.datasources.len(), 2);
        assert_eq!(config.graphs.len(), 1);
        assert_eq!(config.graphs[0].periodic_commit, Some(500));
        assert_eq!(config.clean.as_deref(), Some("MATCH (n) DETACH DELETE n;"));
    }

    #[test]
    fn node_order_is_preserved() {
        let config = JobConfig::from_yaml(SAMPLE).unwrap();
        let nodes = &config.graphs[0].nodes;
        assert!(matches!(&nodes[0], Node::Cypher { .. }));
        match &nodes[1] {
            Node::Entity { entity } => {
                assert_eq!(entity.name, "person");
                assert_eq!(entity.param_str("query"), Some("SELECT * FROM person"));
                assert_eq!(entity.nodes.len(), 1);
            }
            other => panic!("expected entity node, got {other:?}"),
        }
    }

    #[test]
    fn flattened_datasource_params() {
        let config = JobConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.datasources[1].param_str("separator"), Some(";"));
    }

    #[test]
    fn rejects_wrong_schema() {
        let err = JobConfig::from_yaml("schema: other@1\ngraphs: []").unwrap_err();
        assert!(matches!(err, ImportError::Configuration(_)));
    }

    #[test]
    fn rejects_duplicate_datasource_names() {
        let yaml = r#"
schema: graphload/job@0.1
datasources:
  - { name: db, type: sql, url: a.db }
  - { name: db, type: csv, url: b.csv }
graphs: []
"#;
        let err = JobConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate datasource name"));
    }

    #[test]
    fn rejects_unknown_datasource_reference() {
        let yaml = r#"
schema: graphload/job@0.1
datasources: []
graphs:
  - nodes:
      - entity:
          name: person
          datasource: nope
"#;
        let err = JobConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown datasource 'nope'"));
    }

    #[test]
    fn rejects_zero_periodic_commit() {
        let yaml = r#"
schema: graphload/job@0.1
graphs:
  - periodic_commit: 0
    nodes: []
"#;
        let err = JobConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("periodic_commit"));
    }

    #[test]
    fn rejects_bad_entity_name() {
        let yaml = r#"
schema: graphload/job@0.1
datasources:
  - { name: db, type: sql, url: a.db }
graphs:
  - nodes:
      - entity:
          name: "not a name"
          datasource: db
"#;
        let err = JobConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("invalid entity name"));
    }
}
