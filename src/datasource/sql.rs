//! Relational datasource backed by SQLite
//!
//! The connection is opened at `start()` and held for the whole run.
//! Each entity carries its own `query` parameter, rendered against the
//! binding context before execution, so nested entities can filter on
//! the parent's current row.

use anyhow::Context;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::config::{DataSourceConfig, EntityConfig};
use crate::context::BindingContext;
use crate::datasource::{BufferedCursor, DataSource, RowCursor};
use crate::error::ImportError;
use crate::template;

pub struct SqlDataSource {
    url: String,
    conn: Option<Connection>,
}

impl SqlDataSource {
    pub fn from_config(config: &DataSourceConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .clone()
            .context("sql datasource requires a 'url' (database file path)")?;
        Ok(Self { url, conn: None })
    }
}

impl DataSource for SqlDataSource {
    fn start(&mut self) -> Result<(), ImportError> {
        let conn = Connection::open(&self.url)
            .map_err(|e| ImportError::Backend(format!("opening '{}': {e}", self.url)))?;
        self.conn = Some(conn);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ImportError> {
        // Dropping the connection closes it
        self.conn = None;
        Ok(())
    }

    fn execute(
        &self,
        entity: &EntityConfig,
        ctx: &BindingContext,
    ) -> Result<Box<dyn RowCursor>, ImportError> {
        let query = entity.param_str("query").ok_or_else(|| {
            ImportError::Configuration(format!(
                "entity '{}' on a sql datasource requires a 'query' parameter",
                entity.name
            ))
        })?;
        let query = template::render(query, ctx)?;
        debug!(entity = %entity.name, %query, "executing sql query");

        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| ImportError::Backend("sql datasource was not started".into()))?;

        let rows =
            run_query(conn, &query).map_err(|e| ImportError::Backend(format!("{e:#}")))?;
        Ok(Box::new(BufferedCursor::new(rows)))
    }
}

fn run_query(conn: &Connection, query: &str) -> anyhow::Result<Vec<Value>> {
    let mut stmt = conn
        .prepare(query)
        .with_context(|| format!("preparing query '{query}'"))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([]).context("executing query")?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().context("fetching row")? {
        let mut object = Map::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            object.insert(column.clone(), column_value(row.get_ref(i)?));
        }
        out.push(Value::Object(object));
    }
    Ok(out)
}

fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobConfig;
    use serde_json::json;

    fn seeded_db(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("crm.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE person (id INTEGER, name TEXT, score REAL);
             INSERT INTO person VALUES (1, 'Ada', 9.5);
             INSERT INTO person VALUES (2, 'Brian', 7.0);
             CREATE TABLE pet (owner_id INTEGER, name TEXT);
             INSERT INTO pet VALUES (1, 'Rex');",
        )
        .unwrap();
        path.to_string_lossy().into_owned()
    }

    fn source_and_entity(db_path: &str, query: &str) -> (SqlDataSource, EntityConfig) {
        let yaml = format!(
            r#"
schema: graphload/job@0.1
datasources:
  - {{ name: db, type: sql, url: "{db_path}" }}
graphs:
  - nodes:
      - entity:
          name: person
          datasource: db
          query: "{query}"
"#
        );
        let config = JobConfig::from_yaml(&yaml).unwrap();
        let source = SqlDataSource::from_config(&config.datasources[0]).unwrap();
        let entity = match &config.graphs[0].nodes[0] {
            crate::config::Node::Entity { entity } => entity.clone(),
            _ => unreachable!(),
        };
        (source, entity)
    }

    #[test]
    fn rows_keyed_by_column_name() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(&dir);
        let (mut source, entity) =
            source_and_entity(&db, "SELECT id, name, score FROM person ORDER BY id");
        source.start().unwrap();

        let mut cursor = source.execute(&entity, &BindingContext::new()).unwrap();
        assert!(cursor.has_next().unwrap());
        let row = cursor.next_row().unwrap();
        assert_eq!(row, json!({"id": 1, "name": "Ada", "score": 9.5}));
        let row = cursor.next_row().unwrap();
        assert_eq!(row["name"], "Brian");
        assert!(!cursor.has_next().unwrap());
        cursor.close().unwrap();

        source.finish().unwrap();
    }

    #[test]
    fn query_is_rendered_against_context() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(&dir);
        let (mut source, entity) = source_and_entity(
            &db,
            "SELECT name FROM pet WHERE owner_id = {{person.id}}",
        );
        source.start().unwrap();

        let mut ctx = BindingContext::new();
        ctx.bind("person", json!({"id": 1}));
        let mut cursor = source.execute(&entity, &ctx).unwrap();
        assert_eq!(cursor.next_row().unwrap()["name"], "Rex");
        cursor.close().unwrap();

        // A parent row with no pets yields an empty cursor
        ctx.bind("person", json!({"id": 2}));
        let mut cursor = source.execute(&entity, &ctx).unwrap();
        assert!(!cursor.has_next().unwrap());
        cursor.close().unwrap();
    }

    #[test]
    fn missing_query_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(&dir);
        let yaml = format!(
            r#"
schema: graphload/job@0.1
datasources:
  - {{ name: db, type: sql, url: "{db}" }}
graphs:
  - nodes:
      - entity: {{ name: person, datasource: db }}
"#
        );
        let config = JobConfig::from_yaml(&yaml).unwrap();
        let mut source = SqlDataSource::from_config(&config.datasources[0]).unwrap();
        source.start().unwrap();
        let entity = match &config.graphs[0].nodes[0] {
            crate::config::Node::Entity { entity } => entity.clone(),
            _ => unreachable!(),
        };
        let err = source.execute(&entity, &BindingContext::new()).err().unwrap();
        assert!(matches!(err, ImportError::Configuration(_)));
    }

    #[test]
    fn execute_before_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(&dir);
        let (source, entity) = source_and_entity(&db, "SELECT 1");
        let err = source.execute(&entity, &BindingContext::new()).err().unwrap();
        assert!(matches!(err, ImportError::Backend(_)));
    }

    #[test]
    fn requires_url() {
        let yaml = r#"
schema: graphload/job@0.1
datasources:
  - { name: db, type: sql }
graphs: []
"#;
        let config = JobConfig::from_yaml(yaml).unwrap();
        assert!(SqlDataSource::from_config(&config.datasources[0]).is_err());
    }
}
