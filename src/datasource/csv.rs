//! Delimited-file datasource
//!
//! Local files stream record by record; remote documents are fetched
//! whole and parsed from memory. Every field is a string; quoting for
//! cypher is the template's business.

use std::fs::File;
use std::io::Read;

use anyhow::Context;
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use serde_json::{Map, Value};

use crate::config::{DataSourceConfig, EntityConfig};
use crate::context::BindingContext;
use crate::datasource::{is_remote, read_location, DataSource, RowCursor};
use crate::error::ImportError;
use crate::template;

pub struct CsvDataSource {
    url: String,
    separator: u8,
    headers: bool,
}

impl CsvDataSource {
    pub fn from_config(config: &DataSourceConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .clone()
            .context("csv datasource requires a 'url' (file path or http url)")?;

        let separator = match config.param_str("separator") {
            Some(s) if s.len() == 1 => s.as_bytes()[0],
            Some(s) => anyhow::bail!("'separator' must be a single character, got '{s}'"),
            None => b',',
        };

        Ok(Self {
            url,
            separator,
            headers: config.param_bool("headers").unwrap_or(true),
        })
    }
}

impl DataSource for CsvDataSource {
    fn execute(
        &self,
        _entity: &EntityConfig,
        ctx: &BindingContext,
    ) -> Result<Box<dyn RowCursor>, ImportError> {
        let location = template::render(&self.url, ctx)?;

        let input: Box<dyn Read> = if is_remote(&location) {
            let text =
                read_location(&location).map_err(|e| ImportError::Backend(format!("{e:#}")))?;
            Box::new(std::io::Cursor::new(text.into_bytes()))
        } else {
            let file = File::open(&location)
                .map_err(|e| ImportError::Backend(format!("opening '{location}': {e}")))?;
            Box::new(file)
        };

        let mut reader = ReaderBuilder::new()
            .delimiter(self.separator)
            .has_headers(self.headers)
            .from_reader(input);

        let headers = if self.headers {
            let record = reader
                .headers()
                .map_err(|e| ImportError::Backend(format!("reading header of '{location}': {e}")))?;
            Some(record.iter().map(str::to_string).collect())
        } else {
            None
        };

        Ok(Box::new(CsvCursor {
            headers,
            records: reader.into_records(),
            peeked: None,
            done: false,
        }))
    }
}

/// Streaming cursor over csv records
struct CsvCursor {
    /// Column names; absent when the file has no header row
    headers: Option<Vec<String>>,
    records: StringRecordsIntoIter<Box<dyn Read>>,
    peeked: Option<StringRecord>,
    done: bool,
}

impl CsvCursor {
    fn advance(&mut self) -> Result<(), ImportError> {
        if self.peeked.is_none() && !self.done {
            match self.records.next() {
                Some(Ok(record)) => self.peeked = Some(record),
                Some(Err(e)) => {
                    self.done = true;
                    return Err(ImportError::Backend(format!("reading csv record: {e}")));
                }
                None => self.done = true,
            }
        }
        Ok(())
    }

    fn row_from(&self, record: &StringRecord) -> Value {
        let mut object = Map::with_capacity(record.len());
        for (i, field) in record.iter().enumerate() {
            let key = match &self.headers {
                Some(headers) => headers.get(i).cloned().unwrap_or_else(|| format!("col{i}")),
                None => format!("col{i}"),
            };
            object.insert(key, Value::String(field.to_string()));
        }
        Value::Object(object)
    }
}

impl RowCursor for CsvCursor {
    fn has_next(&mut self) -> Result<bool, ImportError> {
        self.advance()?;
        Ok(self.peeked.is_some())
    }

    fn next_row(&mut self) -> Result<Value, ImportError> {
        self.advance()?;
        match self.peeked.take() {
            Some(record) => Ok(self.row_from(&record)),
            None => Err(ImportError::Iteration(
                "next_row() called past the end of the cursor".into(),
            )),
        }
    }

    fn close(&mut self) -> Result<(), ImportError> {
        self.peeked = None;
        self.done = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobConfig;
    use serde_json::json;
    use std::io::Write;

    fn source_for(dir: &tempfile::TempDir, contents: &str, extra: &str) -> CsvDataSource {
        let path = dir.path().join("people.csv");
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();

        let yaml = format!(
            r#"
schema: graphload/job@0.1
datasources:
  - {{ name: people, type: csv, url: "{}"{extra} }}
graphs: []
"#,
            path.to_string_lossy()
        );
        let config = JobConfig::from_yaml(&yaml).unwrap();
        CsvDataSource::from_config(&config.datasources[0]).unwrap()
    }

    fn entity() -> EntityConfig {
        let yaml = r#"
schema: graphload/job@0.1
datasources:
  - { name: people, type: csv, url: x.csv }
graphs:
  - nodes:
      - entity: { name: person, datasource: people }
"#;
        let config = JobConfig::from_yaml(yaml).unwrap();
        match &config.graphs[0].nodes[0] {
            crate::config::Node::Entity { entity } => entity.clone(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn rows_keyed_by_header() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_for(&dir, "id,name\n1,Ada\n2,Brian\n", "");

        let mut cursor = source.execute(&entity(), &BindingContext::new()).unwrap();
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.next_row().unwrap(), json!({"id": "1", "name": "Ada"}));
        assert_eq!(cursor.next_row().unwrap()["name"], "Brian");
        assert!(!cursor.has_next().unwrap());
        assert!(matches!(
            cursor.next_row(),
            Err(ImportError::Iteration(_))
        ));
        cursor.close().unwrap();
    }

    #[test]
    fn custom_separator() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_for(&dir, "id;name\n1;Ada\n", r#", separator: ";""#);

        let mut cursor = source.execute(&entity(), &BindingContext::new()).unwrap();
        assert_eq!(cursor.next_row().unwrap()["name"], "Ada");
    }

    #[test]
    fn headerless_files_use_positional_keys() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_for(&dir, "1,Ada\n2,Brian\n", ", headers: false");

        let mut cursor = source.execute(&entity(), &BindingContext::new()).unwrap();
        assert_eq!(cursor.next_row().unwrap(), json!({"col0": "1", "col1": "Ada"}));
    }

    #[test]
    fn has_next_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_for(&dir, "id\n1\n", "");

        let mut cursor = source.execute(&entity(), &BindingContext::new()).unwrap();
        assert!(cursor.has_next().unwrap());
        assert!(cursor.has_next().unwrap());
        cursor.next_row().unwrap();
        assert!(!cursor.has_next().unwrap());
    }

    #[test]
    fn rejects_multichar_separator() {
        let yaml = r#"
schema: graphload/job@0.1
datasources:
  - { name: people, type: csv, url: x.csv, separator: "||" }
graphs: []
"#;
        let config = JobConfig::from_yaml(yaml).unwrap();
        assert!(CsvDataSource::from_config(&config.datasources[0]).is_err());
    }

    #[test]
    fn missing_file_is_a_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_for(&dir, "id\n", "");
        // Point at a file that does not exist via a templated url
        let mut bad = source;
        bad.url = dir.path().join("nope.csv").to_string_lossy().into_owned();
        let err = bad.execute(&entity(), &BindingContext::new()).err().unwrap();
        assert!(matches!(err, ImportError::Backend(_)));
    }
}
