//! Shared binding context for template rendering
//!
//! One context instance is threaded mutably through the whole tree
//! traversal of a graph. A value bound while looping over an entity's
//! rows stays visible to every node processed afterwards (including
//! later siblings) until something overwrites it. That leakage is part
//! of the contract, not an accident: nested entities and trailing
//! cypher nodes rely on the last-bound row.

use std::collections::HashMap;

use serde_json::Value;

/// Variable store used to render cypher templates
#[derive(Debug, Clone, Default)]
pub struct BindingContext {
    vars: HashMap<String, Value>,
}

impl BindingContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context pre-populated with run-level values
    /// (job properties plus the debug/clean flags)
    pub fn from_map(vars: HashMap<String, Value>) -> Self {
        Self { vars }
    }

    /// Bind a name, overwriting any prior value under that name
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Look up a top-level name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Resolve a dot-separated path (e.g. "person.address.city" or
    /// "row.items.0"). Numeric segments index into arrays.
    pub fn resolve_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut value = self.vars.get(parts.next()?)?;

        for segment in parts {
            value = if let Ok(idx) = segment.parse::<usize>() {
                value.get(idx)?
            } else {
                value.get(segment)?
            };
        }
        Some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// String form of a context value as it appears in rendered cypher:
/// strings unquoted, null empty, everything else in JSON display form.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
