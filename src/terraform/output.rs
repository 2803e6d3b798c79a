//! Decoding `terraform output -json`

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

/// One entry of `terraform output -json` (no name argument)
#[derive(Debug, Deserialize)]
struct OutputEntry {
    #[serde(default)]
    sensitive: bool,
    value: Value,
}

/// Parse the JSON printed for a single named output
pub(crate) fn parse_value(name: &str, stdout: &str) -> Result<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(Error::output(name, "terraform printed nothing"));
    }
    serde_json::from_str(trimmed)
        .map_err(|e| Error::output(name, format!("not valid JSON: {e}")))
}

/// Scalars as their literal text, composites as compact JSON
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// A single output as a string
pub(crate) fn as_string(name: &str, value: &Value) -> Result<String> {
    if value.is_null() {
        return Err(Error::output(name, "output has no value"));
    }
    Ok(value_to_string(value))
}

/// A list output as strings
pub(crate) fn as_list(name: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Array(items) => Ok(items.iter().map(value_to_string).collect()),
        other => Err(Error::output(
            name,
            format!("expected a list, got {}", kind(other)),
        )),
    }
}

/// A map output as string values
pub(crate) fn as_map(name: &str, value: &Value) -> Result<BTreeMap<String, String>> {
    match value {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect()),
        other => Err(Error::output(
            name,
            format!("expected a map, got {}", kind(other)),
        )),
    }
}

/// Every output, unwrapped to its value
pub(crate) fn parse_all(stdout: &str) -> Result<BTreeMap<String, Value>> {
    let entries: BTreeMap<String, OutputEntry> = serde_json::from_str(stdout.trim())?;
    Ok(entries
        .into_iter()
        .map(|(name, entry)| {
            if entry.sensitive {
                tracing::debug!(output = %name, "reading sensitive output");
            }
            (name, entry.value)
        })
        .collect())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
