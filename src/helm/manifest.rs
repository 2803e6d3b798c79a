//! Decoding rendered helm output into typed objects

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::Value;

use crate::{Error, Result};

/// Split a multi-document YAML stream into its non-empty documents
///
/// Documents that are empty or hold only comments (helm emits a
/// `# Source:` header per template) are dropped.
pub fn split_documents(output: &str) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(output) {
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            docs.push(value);
        }
    }
    Ok(docs)
}

/// Decode a render that must contain exactly one object
pub fn unmarshal_k8s_yaml<T: DeserializeOwned>(output: &str) -> Result<T> {
    let mut docs = split_documents(output)?;
    match docs.len() {
        0 => Err(Error::manifest("rendered output contains no documents")),
        1 => Ok(serde_yaml::from_value(docs.remove(0))?),
        n => Err(Error::manifest(format!(
            "expected a single document, rendered output contains {n}"
        ))),
    }
}

/// Decode every object in a render
pub fn unmarshal_k8s_yaml_all<T: DeserializeOwned>(output: &str) -> Result<Vec<T>> {
    split_documents(output)?
        .into_iter()
        .map(|doc| serde_yaml::from_value(doc).map_err(Error::from))
        .collect()
}
