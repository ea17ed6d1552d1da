//! JSON document datasource
//!
//! The optional `pointer` parameter (RFC 6901 JSON Pointer) selects
//! the rows inside the document: an array yields one row per element,
//! an object yields a single row.

use anyhow::Context;
use serde_json::Value;

use crate::config::{DataSourceConfig, EntityConfig};
use crate::context::BindingContext;
use crate::datasource::{read_location, BufferedCursor, DataSource, RowCursor};
use crate::error::ImportError;
use crate::template;

pub struct JsonDataSource {
    url: String,
    pointer: String,
}

impl JsonDataSource {
    pub fn from_config(config: &DataSourceConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .clone()
            .context("json datasource requires a 'url' (file path or http url)")?;
        let pointer = config.param_str("pointer").unwrap_or("").to_string();
        if !pointer.is_empty() && !pointer.starts_with('/') {
            anyhow::bail!("'pointer' must be a JSON Pointer starting with '/', got '{pointer}'");
        }
        Ok(Self { url, pointer })
    }
}

impl DataSource for JsonDataSource {
    fn execute(
        &self,
        _entity: &EntityConfig,
        ctx: &BindingContext,
    ) -> Result<Box<dyn RowCursor>, ImportError> {
        let location = template::render(&self.url, ctx)?;
        let text = read_location(&location).map_err(|e| ImportError::Backend(format!("{e:#}")))?;

        let document: Value = serde_json::from_str(&text)
            .map_err(|e| ImportError::Backend(format!("parsing '{location}': {e}")))?;

        let selected = document.pointer(&self.pointer).ok_or_else(|| {
            ImportError::Backend(format!(
                "pointer '{}' matched nothing in '{location}'",
                self.pointer
            ))
        })?;

        let rows = match selected {
            Value::Array(items) => items.clone(),
            object @ Value::Object(_) => vec![object.clone()],
            other => {
                return Err(ImportError::Backend(format!(
                    "pointer '{}' selects a {} in '{location}'; expected array or object",
                    self.pointer,
                    type_name(other)
                )))
            }
        };

        Ok(Box::new(BufferedCursor::new(rows)))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
