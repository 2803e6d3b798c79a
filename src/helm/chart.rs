//! Chart.yaml metadata

use std::path::Path;

use serde::Deserialize;

use crate::Result;

/// Name of the chart metadata file at the chart root
pub const CHART_FILE: &str = "Chart.yaml";

/// Decoded `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart API version (`v2` for Helm 3 charts)
    pub api_version: String,
    /// Chart name
    pub name: String,
    /// SemVer chart version
    pub version: String,
    /// Version of the packaged application
    #[serde(default)]
    pub app_version: Option<String>,
    /// One-line description
    #[serde(default)]
    pub description: Option<String>,
    /// `application` or `library`
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    /// Sub-chart dependencies
    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,
}

impl ChartMetadata {
    /// Whether this chart renders resources (library charts do not)
    pub fn is_application(&self) -> bool {
        self.type_.as_deref().unwrap_or("application") == "application"
    }
}

/// A `dependencies` entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDependency {
    /// Dependency chart name
    pub name: String,
    /// Version constraint
    pub version: String,
    /// Chart repository URL
    #[serde(default)]
    pub repository: Option<String>,
    /// Values path that toggles the dependency
    #[serde(default)]
    pub condition: Option<String>,
}

/// Read and decode `<chart>/Chart.yaml`
///
/// A missing file surfaces as [`crate::Error::Io`] with `NotFound`.
pub fn load_chart_metadata(chart_path: &Path) -> Result<ChartMetadata> {
    let content = std::fs::read_to_string(chart_path.join(CHART_FILE))?;
    Ok(serde_yaml::from_str(&content)?)
}
