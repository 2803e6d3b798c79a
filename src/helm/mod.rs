//! Helm chart rendering
//!
//! Renders chart templates with `helm template` so the resulting manifests can
//! be decoded and checked without a cluster. Every template asked for must
//! exist in the chart; a missing file is reported before helm runs.
//!
//! # Example
//!
//! ```no_run
//! use fx_infra::config::HarnessConfig;
//! use fx_infra::helm::{unmarshal_k8s_yaml, Helm, HelmOptions};
//! use k8s_openapi::api::apps::v1::Deployment;
//!
//! # async fn run() -> fx_infra::Result<()> {
//! let config = HarnessConfig::from_env();
//! let helm = Helm::new(&config);
//! let options = HelmOptions::default().set("image.tag", "test");
//!
//! let output = helm
//!     .render_template(&options, &config.chart_path("eventserver"), "eventserver", &["templates/deployment.yaml"])
//!     .await?;
//! let deployment: Deployment = unmarshal_k8s_yaml(&output)?;
//! # Ok(())
//! # }
//! ```

mod chart;
mod manifest;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::exec::{run_checked, CommandRunner, Invocation, TokioCommandRunner};
use crate::k8s::KubectlOptions;
use crate::{Error, Result, HELM_DEFAULT_NAMESPACE};

pub use chart::{load_chart_metadata, ChartDependency, ChartMetadata, CHART_FILE};
pub use manifest::{split_documents, unmarshal_k8s_yaml, unmarshal_k8s_yaml_all};

/// Inputs to a render or lint
#[derive(Debug, Clone, Default)]
pub struct HelmOptions {
    /// `--set key=value` overrides; keys may contain escaped dots
    pub set_values: BTreeMap<String, String>,
    /// `--values` files, applied before `set_values`
    pub values_files: Vec<PathBuf>,
    /// Target cluster coordinates (only the namespace affects rendering)
    pub kubectl_options: Option<KubectlOptions>,
    /// Extra arguments appended to `helm template`
    pub extra_template_args: Vec<String>,
}

impl HelmOptions {
    /// Add a `--set` override
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_values.insert(key.into(), value.into());
        self
    }

    /// Add several `--set` overrides
    pub fn set_all<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.set_values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Add a `--values` file
    pub fn values_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.values_files.push(path.into());
        self
    }

    /// Target the given cluster coordinates
    pub fn with_kubectl_options(mut self, options: KubectlOptions) -> Self {
        self.kubectl_options = Some(options);
        self
    }

    /// Namespace passed to helm
    pub fn namespace(&self) -> &str {
        self.kubectl_options
            .as_ref()
            .and_then(KubectlOptions::namespace)
            .unwrap_or(HELM_DEFAULT_NAMESPACE)
    }

    /// `--values` and `--set` flags shared by render and lint
    fn value_args(&self) -> Result<Vec<String>> {
        let mut args = Vec::new();
        for file in &self.values_files {
            if !file.is_file() {
                return Err(Error::validation(format!(
                    "values file {} does not exist",
                    file.display()
                )));
            }
            args.push("--values".to_string());
            args.push(file.display().to_string());
        }
        for (key, value) in &self.set_values {
            args.push("--set".to_string());
            args.push(format!("{key}={value}"));
        }
        Ok(args)
    }
}

/// Whether `template` (relative to the chart root) is a file in the chart
pub fn template_exists(chart_path: &Path, template: &str) -> bool {
    chart_path.join(template).is_file()
}

/// Helm CLI wrapper
#[derive(Clone)]
pub struct Helm {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl std::fmt::Debug for Helm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Helm").field("binary", &self.binary).finish()
    }
}

impl Helm {
    /// Helm using the configured binary and real processes
    pub fn new(config: &HarnessConfig) -> Self {
        Self::with_runner(Arc::new(TokioCommandRunner), config.helm_bin.clone())
    }

    /// Helm using a custom runner
    pub fn with_runner(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    /// Build the `helm template` invocation without running it
    pub fn template_invocation(
        &self,
        options: &HelmOptions,
        chart_path: &Path,
        release_name: &str,
        templates: &[&str],
    ) -> Result<Invocation> {
        for template in templates {
            if !template_exists(chart_path, template) {
                return Err(Error::TemplateNotFound {
                    chart: chart_path.display().to_string(),
                    template: template.to_string(),
                });
            }
        }

        let mut inv = Invocation::new(&self.binary)
            .args(["template", release_name])
            .arg(chart_path.display().to_string())
            .args(["--namespace", options.namespace()])
            .args(options.value_args()?);
        for template in templates {
            inv = inv.args(["--show-only", *template]);
        }
        Ok(inv.args(options.extra_template_args.iter().cloned()))
    }

    /// Render the given templates and return the raw YAML stream
    ///
    /// An empty `templates` slice renders the whole chart.
    pub async fn render_template(
        &self,
        options: &HelmOptions,
        chart_path: &Path,
        release_name: &str,
        templates: &[&str],
    ) -> Result<String> {
        let inv = self.template_invocation(options, chart_path, release_name, templates)?;
        let output = run_checked(self.runner.as_ref(), &inv).await?;

        info!(
            chart = %chart_path.display(),
            release = release_name,
            templates = ?templates,
            bytes = output.len(),
            "Rendered chart templates"
        );
        Ok(output)
    }

    /// Run `helm lint` on the chart with the same overrides
    pub async fn lint(&self, options: &HelmOptions, chart_path: &Path) -> Result<String> {
        let inv = Invocation::new(&self.binary)
            .arg("lint")
            .arg(chart_path.display().to_string())
            .args(["--namespace", options.namespace()])
            .args(options.value_args()?);

        let output = run_checked(self.runner.as_ref(), &inv).await?;
        debug!(chart = %chart_path.display(), "Chart lint passed");
        Ok(output)
    }
}
