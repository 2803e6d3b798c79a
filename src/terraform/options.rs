//! Terraform run options and variable formatting

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

use crate::{Error, Result};

/// Retries applied by [`with_default_retryable_errors`] when unset
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Spacing applied by [`with_default_retryable_errors`] when unset
pub const DEFAULT_TIME_BETWEEN_RETRIES: Duration = Duration::from_secs(5);

/// Known-transient terraform failures, as (stderr regex, description)
pub fn default_retryable_errors() -> BTreeMap<String, String> {
    const PLUGIN: &str = "Failed to retrieve plugin due to transient network error.";
    [
        // Parallel helm provider runs contend on the network
        (".*read: connection reset by peer.*", "Failed to reach helm charts repository."),
        (".*transport is closing.*", "Failed to reach Kubernetes API."),
        // `terraform init` plugin downloads flake in CI
        (".*unable to verify signature.*", PLUGIN),
        (".*unable to verify checksum.*", PLUGIN),
        (".*no provider exists with the given name.*", PLUGIN),
        (".*registry service is unreachable.*", PLUGIN),
        (".*Error installing provider.*", PLUGIN),
        (".*Failed to query available provider packages.*", PLUGIN),
        (".*timeout while waiting for plugin to start.*", PLUGIN),
        (".*timed out waiting for server handshake.*", PLUGIN),
        ("could not query provider registry for", PLUGIN),
        // Provider state not yet propagated after apply
        (
            ".*Provider produced inconsistent result after apply.*",
            "Provider eventual consistency error.",
        ),
    ]
    .into_iter()
    .map(|(pattern, description)| (pattern.to_string(), description.to_string()))
    .collect()
}

/// Options for one terraform working directory
#[derive(Debug, Clone, Default)]
pub struct TerraformOptions {
    /// Directory holding the module or environment root
    pub terraform_dir: PathBuf,
    /// `-var` inputs
    pub vars: BTreeMap<String, Value>,
    /// Environment variables for every terraform command
    pub env_vars: BTreeMap<String, String>,
    /// stderr regex -> description of failures worth retrying
    pub retryable_errors: BTreeMap<String, String>,
    /// Extra attempts after a retryable failure
    pub max_retries: u32,
    /// Delay between attempts
    pub time_between_retries: Duration,
    /// Pass `-no-color` to every command
    pub no_color: bool,
}

impl TerraformOptions {
    /// Options for the given directory with no variables
    pub fn new(terraform_dir: impl Into<PathBuf>) -> Self {
        Self {
            terraform_dir: terraform_dir.into(),
            no_color: true,
            ..Default::default()
        }
    }

    /// Set a `-var` input
    pub fn var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Set an environment variable for terraform
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// `-var name=value` pairs, sorted by name
    pub fn var_args(&self) -> Vec<String> {
        self.vars
            .iter()
            .flat_map(|(name, value)| ["-var".to_string(), format!("{name}={}", format_var(value))])
            .collect()
    }

    /// Compile `retryable_errors` into matchable rules
    pub fn retryable_rules(&self) -> Result<Vec<(Regex, String)>> {
        self.retryable_errors
            .iter()
            .map(|(pattern, description)| {
                Regex::new(pattern)
                    .map(|re| (re, description.clone()))
                    .map_err(|e| {
                        Error::validation(format!("invalid retryable error pattern {pattern:?}: {e}"))
                    })
            })
            .collect()
    }

    /// Check the options before running anything
    pub fn validate(&self) -> Result<()> {
        if self.terraform_dir.as_os_str().is_empty() {
            return Err(Error::validation("terraform_dir must be set"));
        }
        if !self.terraform_dir.is_dir() {
            return Err(Error::validation(format!(
                "terraform_dir {} is not a directory",
                self.terraform_dir.display()
            )));
        }
        Ok(())
    }
}

/// Merge the default retryable errors into `options`
///
/// Caller-provided patterns win. Unset (zero) retry count and spacing take
/// the defaults.
pub fn with_default_retryable_errors(mut options: TerraformOptions) -> TerraformOptions {
    for (pattern, description) in default_retryable_errors() {
        options.retryable_errors.entry(pattern).or_insert(description);
    }
    if options.max_retries == 0 {
        options.max_retries = DEFAULT_MAX_RETRIES;
    }
    if options.time_between_retries.is_zero() {
        options.time_between_retries = DEFAULT_TIME_BETWEEN_RETRIES;
    }
    options
}

/// Render a variable value as the right-hand side of `-var name=...`
///
/// Top-level strings are passed raw; strings nested in lists and maps are
/// quoted.
pub fn format_var(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => format_hcl(other),
    }
}

fn format_hcl(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_hcl(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(format_hcl).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{} = {}", quote_hcl(k), format_hcl(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

/// Quoted HCL string literal
///
/// `${` and `%{` open template sequences inside quotes and are doubled so
/// the value stays literal.
fn quote_hcl(s: &str) -> String {
    let escaped = s.replace("${", "$${").replace("%{", "%%{");
    Value::String(escaped).to_string()
}
