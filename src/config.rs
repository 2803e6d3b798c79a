//! Harness configuration
//!
//! Resolves tool binaries and the fixture roots holding the charts and
//! Terraform modules under test.

use std::path::{Path, PathBuf};

/// Fallback charts root, relative to the working directory
const DEFAULT_CHARTS_DIR: &str = "infrastructure/helm/charts";

/// Fallback terraform root, relative to the working directory
const DEFAULT_TERRAFORM_DIR: &str = "infrastructure/terraform";

/// Get charts directory - checks runtime env var first, then compile-time, then default
fn get_charts_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FX_CHARTS_DIR") {
        return PathBuf::from(dir);
    }
    // Set by build.rs to the in-repo fixture charts
    if let Some(dir) = option_env!("FX_CHARTS_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from(DEFAULT_CHARTS_DIR)
}

/// Get terraform root - same precedence as [`get_charts_dir`]
fn get_terraform_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FX_TERRAFORM_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = option_env!("FX_TERRAFORM_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from(DEFAULT_TERRAFORM_DIR)
}

/// Binaries and fixture roots used by the suites
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// helm binary (looked up on PATH)
    pub helm_bin: String,
    /// terraform binary (looked up on PATH)
    pub terraform_bin: String,
    /// Directory containing one sub-directory per chart
    pub charts_dir: PathBuf,
    /// Directory containing `modules/` and `environments/`
    pub terraform_root: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            helm_bin: "helm".to_string(),
            terraform_bin: "terraform".to_string(),
            charts_dir: PathBuf::from(DEFAULT_CHARTS_DIR),
            terraform_root: PathBuf::from(DEFAULT_TERRAFORM_DIR),
        }
    }
}

impl HarnessConfig {
    /// Build a config from the environment
    ///
    /// `FX_HELM_BIN` and `FX_TERRAFORM_BIN` override the binaries;
    /// `FX_CHARTS_DIR` and `FX_TERRAFORM_DIR` override the fixture roots.
    pub fn from_env() -> Self {
        Self {
            helm_bin: std::env::var("FX_HELM_BIN").unwrap_or_else(|_| "helm".to_string()),
            terraform_bin: std::env::var("FX_TERRAFORM_BIN")
                .unwrap_or_else(|_| "terraform".to_string()),
            charts_dir: get_charts_dir(),
            terraform_root: get_terraform_dir(),
        }
    }

    /// Absolute path of the named chart
    pub fn chart_path(&self, name: &str) -> PathBuf {
        absolute(&self.charts_dir.join(name))
    }

    /// Absolute path of the named Terraform module
    pub fn module_path(&self, name: &str) -> PathBuf {
        absolute(&self.terraform_root.join("modules").join(name))
    }

    /// Absolute path of the named Terraform environment
    pub fn environment_path(&self, name: &str) -> PathBuf {
        absolute(&self.terraform_root.join("environments").join(name))
    }
}

/// Anchor a relative path at the current directory
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
