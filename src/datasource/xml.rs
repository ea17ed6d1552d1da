//! XML document datasource
//!
//! The `select` parameter names the row element as a path suffix
//! (`item` or `catalog/item`). Each matching element becomes one row:
//! its attributes plus the text of its direct children, keyed by name.
//! Namespaces are not interpreted; local names only.

use anyhow::Context;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::config::{DataSourceConfig, EntityConfig};
use crate::context::BindingContext;
use crate::datasource::{read_location, BufferedCursor, DataSource, RowCursor};
use crate::error::ImportError;
use crate::template;

pub struct XmlDataSource {
    url: String,
    select: Vec<String>,
}

impl XmlDataSource {
    pub fn from_config(config: &DataSourceConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .clone()
            .context("xml datasource requires a 'url' (file path or http url)")?;
        let select = config
            .param_str("select")
            .context("xml datasource requires a 'select' element path (e.g. 'catalog/item')")?;
        let select: Vec<String> = select
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if select.is_empty() {
            anyhow::bail!("'select' must name at least one element");
        }
        Ok(Self { url, select })
    }
}

impl DataSource for XmlDataSource {
    fn execute(
        &self,
        _entity: &EntityConfig,
        ctx: &BindingContext,
    ) -> Result<Box<dyn RowCursor>, ImportError> {
        let location = template::render(&self.url, ctx)?;
        let text = read_location(&location).map_err(|e| ImportError::Backend(format!("{e:#}")))?;
        let rows = extract_rows(&text, &self.select)
            .map_err(|e| ImportError::Backend(format!("parsing '{location}': {e:#}")))?;
        Ok(Box::new(BufferedCursor::new(rows)))
    }
}

fn extract_rows(xml: &str, select: &[String]) -> anyhow::Result<Vec<Value>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut rows = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<Map<String, Value>> = None;
    let mut row_depth = 0;
    let mut child: Option<(String, String)> = None;

    loop {
        match reader.read_event().context("malformed XML")? {
            Event::Start(e) => {
                let name = local_name(e.local_name().as_ref());
                stack.push(name.clone());

                if current.is_none() && path_matches(&stack, select) {
                    let mut row = Map::new();
                    read_attributes(&e, &mut row)?;
                    current = Some(row);
                    row_depth = stack.len();
                } else if current.is_some() && stack.len() == row_depth + 1 {
                    child = Some((name, String::new()));
                }
            }
            Event::Empty(e) => {
                let name = local_name(e.local_name().as_ref());
                stack.push(name.clone());
                if current.is_none() && path_matches(&stack, select) {
                    // Self-closing row element: attributes only
                    let mut row = Map::new();
                    read_attributes(&e, &mut row)?;
                    rows.push(Value::Object(row));
                } else if let Some(row) = &mut current {
                    if stack.len() == row_depth + 1 {
                        row.insert(name, Value::String(String::new()));
                    }
                }
                stack.pop();
            }
            Event::Text(t) => {
                if let Some((_, text)) = &mut child {
                    text.push_str(&t.unescape().context("malformed text node")?);
                }
            }
            Event::End(_) => {
                if let Some(row) = &mut current {
                    if stack.len() == row_depth + 1 {
                        if let Some((name, text)) = child.take() {
                            row.insert(name, Value::String(text));
                        }
                    } else if stack.len() == row_depth {
                        rows.push(Value::Object(current.take().unwrap_or_default()));
                    }
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rows)
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn read_attributes(
    element: &quick_xml::events::BytesStart<'_>,
    row: &mut Map<String, Value>,
) -> anyhow::Result<()> {
    for attribute in element.attributes() {
        let attribute = attribute.context("malformed attribute")?;
        let key = local_name(attribute.key.local_name().as_ref());
        let value = attribute.unescape_value().context("malformed attribute")?;
        row.insert(key, Value::String(value.into_owned()));
    }
    Ok(())
}

/// True when the element stack ends with the selected path
fn path_matches(stack: &[String], select: &[String]) -> bool {
    stack.len() >= select.len() && stack[stack.len() - select.len()..] == *select
}
