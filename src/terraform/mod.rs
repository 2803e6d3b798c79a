//! Terraform provisioning
//!
//! Drives `terraform init/apply/output/destroy` against a module or
//! environment directory. Failures whose stderr matches a retryable pattern
//! are retried; everything else surfaces immediately.
//!
//! Live cloud resources are owned through [`Terraform::scoped`]: apply,
//! run the checks, then always destroy, even when a check panics.
//!
//! # Example
//!
//! ```no_run
//! use fx_infra::config::HarnessConfig;
//! use fx_infra::terraform::{with_default_retryable_errors, Terraform, TerraformOptions};
//!
//! # async fn run() -> fx_infra::Result<()> {
//! let config = HarnessConfig::from_env();
//! let options = with_default_retryable_errors(
//!     TerraformOptions::new(config.module_path("rds")).var("db_name", "fxorleans"),
//! );
//!
//! Terraform::new(&config)
//!     .scoped(&options, |tf, opts| async move {
//!         let port = tf.output(&opts, "db_port").await?;
//!         assert_eq!(port, "5432");
//!         Ok::<_, fx_infra::Error>(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod options;
mod output;

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{error, info};

use crate::config::HarnessConfig;
use crate::exec::{run_checked, CommandRunner, Invocation, TokioCommandRunner};
use crate::retry::{retry_if, RetryConfig};
use crate::{Error, Result};

pub use options::{
    default_retryable_errors, format_var, with_default_retryable_errors, TerraformOptions,
    DEFAULT_MAX_RETRIES, DEFAULT_TIME_BETWEEN_RETRIES,
};

/// Terraform CLI wrapper
#[derive(Clone)]
pub struct Terraform {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl std::fmt::Debug for Terraform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terraform")
            .field("binary", &self.binary)
            .finish()
    }
}

impl Terraform {
    /// Terraform using the configured binary and real processes
    pub fn new(config: &HarnessConfig) -> Self {
        Self::with_runner(Arc::new(TokioCommandRunner), config.terraform_bin.clone())
    }

    /// Terraform using a custom runner
    pub fn with_runner(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    /// Base invocation: subcommand, working directory and environment
    fn invocation(&self, options: &TerraformOptions, subcommand: &str) -> Invocation {
        let mut inv = Invocation::new(&self.binary)
            .arg(subcommand)
            .current_dir(&options.terraform_dir);
        for (key, value) in &options.env_vars {
            inv = inv.env(key, value);
        }
        inv
    }

    fn with_color_flag(options: &TerraformOptions, inv: Invocation) -> Invocation {
        if options.no_color {
            inv.arg("-no-color")
        } else {
            inv
        }
    }

    /// Build the `terraform init` invocation
    pub fn init_invocation(&self, options: &TerraformOptions) -> Invocation {
        let inv = self
            .invocation(options, "init")
            .args(["-input=false", "-upgrade=false"]);
        Self::with_color_flag(options, inv)
    }

    /// Build the `terraform apply` invocation
    pub fn apply_invocation(&self, options: &TerraformOptions) -> Invocation {
        let inv = self
            .invocation(options, "apply")
            .args(["-input=false", "-auto-approve", "-lock=false"])
            .args(options.var_args());
        Self::with_color_flag(options, inv)
    }

    /// Build the `terraform destroy` invocation
    pub fn destroy_invocation(&self, options: &TerraformOptions) -> Invocation {
        let inv = self
            .invocation(options, "destroy")
            .args(["-input=false", "-auto-approve", "-lock=false"])
            .args(options.var_args());
        Self::with_color_flag(options, inv)
    }

    /// Run a mutating command, retrying failures that match a retryable rule
    async fn run_retryable(
        &self,
        options: &TerraformOptions,
        description: &str,
        inv: Invocation,
    ) -> Result<String> {
        options.validate()?;
        let rules = options.retryable_rules()?;
        let config = retry_config(options);

        let runner = self.runner.as_ref();
        let inv = &inv;
        let dir = options.terraform_dir.display().to_string();

        retry_if(
            &config,
            description,
            |err: &Error| match err.retryable_reason(&rules) {
                Some(reason) => {
                    info!(dir = %dir, command = description, reason, "Retryable terraform error");
                    true
                }
                None => false,
            },
            move || run_checked(runner, inv),
        )
        .await
    }

    /// `terraform init`
    pub async fn init(&self, options: &TerraformOptions) -> Result<String> {
        self.run_retryable(options, "terraform init", self.init_invocation(options))
            .await
    }

    /// `terraform apply`
    pub async fn apply(&self, options: &TerraformOptions) -> Result<String> {
        self.run_retryable(options, "terraform apply", self.apply_invocation(options))
            .await
    }

    /// `terraform init` followed by `terraform apply`
    pub async fn init_and_apply(&self, options: &TerraformOptions) -> Result<String> {
        self.init(options).await?;
        let stdout = self.apply(options).await?;
        info!(dir = %options.terraform_dir.display(), "Applied terraform");
        Ok(stdout)
    }

    /// `terraform destroy`
    pub async fn destroy(&self, options: &TerraformOptions) -> Result<String> {
        let stdout = self
            .run_retryable(options, "terraform destroy", self.destroy_invocation(options))
            .await?;
        info!(dir = %options.terraform_dir.display(), "Destroyed terraform resources");
        Ok(stdout)
    }

    /// Raw JSON value of a named output
    pub async fn output_json(&self, options: &TerraformOptions, name: &str) -> Result<Value> {
        let inv = self
            .invocation(options, "output")
            .args(["-no-color", "-json", name]);
        let stdout = run_checked(self.runner.as_ref(), &inv).await?;
        output::parse_value(name, &stdout)
    }

    /// A named output as a string
    ///
    /// Numbers and booleans are returned as their literal text.
    pub async fn output(&self, options: &TerraformOptions, name: &str) -> Result<String> {
        let value = self.output_json(options, name).await?;
        output::as_string(name, &value)
    }

    /// A list output
    pub async fn output_list(&self, options: &TerraformOptions, name: &str) -> Result<Vec<String>> {
        let value = self.output_json(options, name).await?;
        output::as_list(name, &value)
    }

    /// A map output
    pub async fn output_map(
        &self,
        options: &TerraformOptions,
        name: &str,
    ) -> Result<BTreeMap<String, String>> {
        let value = self.output_json(options, name).await?;
        output::as_map(name, &value)
    }

    /// Every output of the root module
    pub async fn output_all(&self, options: &TerraformOptions) -> Result<BTreeMap<String, Value>> {
        let inv = self.invocation(options, "output").args(["-no-color", "-json"]);
        let stdout = run_checked(self.runner.as_ref(), &inv).await?;
        output::parse_all(&stdout)
    }

    /// Apply, run `body`, then always destroy
    ///
    /// Destroy runs when `body` returns an error, when it panics, and when
    /// apply itself fails part-way. A failed init returns at once, since
    /// nothing has been created yet. A panic from `body` is resumed after
    /// teardown. If `body` succeeds but destroy fails, the destroy error is
    /// returned.
    pub async fn scoped<F, Fut, T>(&self, options: &TerraformOptions, body: F) -> Result<T>
    where
        F: FnOnce(Terraform, TerraformOptions) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.init(options).await?;

        let outcome = match self.apply(options).await {
            Ok(_) => {
                info!(dir = %options.terraform_dir.display(), "Applied terraform");
                AssertUnwindSafe(body(self.clone(), options.clone()))
                    .catch_unwind()
                    .await
            }
            Err(e) => Ok(Err(e)),
        };

        let destroyed = self.destroy(options).await;
        if let Err(e) = &destroyed {
            error!(
                dir = %options.terraform_dir.display(),
                error = %e,
                "Failed to destroy terraform resources; manual cleanup required"
            );
        }

        match outcome {
            Err(panic) => std::panic::resume_unwind(panic),
            Ok(Err(e)) => Err(e),
            Ok(Ok(value)) => destroyed.map(|_| value),
        }
    }
}

/// Fixed-spacing retry policy: the first attempt plus `max_retries`
fn retry_config(options: &TerraformOptions) -> RetryConfig {
    RetryConfig::fixed(
        options.max_retries.saturating_add(1),
        options.time_between_retries,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::exec::{CommandOutput, MockCommandRunner};
    use serde_json::json;

    /// Options for a real temp dir with fast retries
    fn fast_options(dir: &tempfile::TempDir) -> TerraformOptions {
        let mut opts = with_default_retryable_errors(
            TerraformOptions::new(dir.path())
                .var("aws_region", "us-west-2")
                .var("environment", "test"),
        );
        opts.time_between_retries = Duration::from_millis(1);
        opts
    }

    /// Mock runner that records each subcommand and answers via `respond`
    fn recording_runner<F>(calls: Arc<Mutex<Vec<String>>>, respond: F) -> MockCommandRunner
    where
        F: Fn(&Invocation) -> CommandOutput + Send + Sync + 'static,
    {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |inv| {
            calls.lock().unwrap().push(inv.args[0].clone());
            Ok(respond(inv))
        });
        runner
    }

    fn tf(runner: MockCommandRunner) -> Terraform {
        Terraform::with_runner(Arc::new(runner), "terraform")
    }

    #[test]
    fn apply_and_destroy_carry_vars_and_run_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let opts = fast_options(&dir)
            .var("azs", json!(["us-west-2a", "us-west-2b"]))
            .env("AWS_PROFILE", "fx-test");
        let tf = tf(MockCommandRunner::new());

        let apply = tf.apply_invocation(&opts);
        assert_eq!(apply.cwd.as_deref(), Some(dir.path()));
        assert_eq!(
            apply.args,
            vec![
                "apply",
                "-input=false",
                "-auto-approve",
                "-lock=false",
                "-var",
                "aws_region=us-west-2",
                "-var",
                r#"azs=["us-west-2a", "us-west-2b"]"#,
                "-var",
                "environment=test",
                "-no-color",
            ]
        );
        assert_eq!(
            apply.env,
            vec![("AWS_PROFILE".to_string(), "fx-test".to_string())]
        );

        let destroy = tf.destroy_invocation(&opts);
        assert_eq!(destroy.args[0], "destroy");
        assert!(destroy.args.contains(&"aws_region=us-west-2".to_string()));

        let init = tf.init_invocation(&opts);
        assert_eq!(init.args, vec!["init", "-input=false", "-upgrade=false", "-no-color"]);
    }

    #[tokio::test]
    async fn retryable_apply_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let opts = fast_options(&dir);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let attempts = Arc::new(Mutex::new(0u32));

        let a = attempts.clone();
        let runner = recording_runner(calls.clone(), move |_| {
            let mut n = a.lock().unwrap();
            *n += 1;
            if *n < 3 {
                CommandOutput::failed("Error: Failed to query available provider packages")
            } else {
                CommandOutput::ok("Apply complete! Resources: 12 added, 0 changed, 0 destroyed.")
            }
        });

        let out = tf(runner).apply(&opts).await.unwrap();
        assert!(out.contains("Apply complete"));
        assert_eq!(*calls.lock().unwrap(), vec!["apply", "apply", "apply"]);
    }

    #[tokio::test]
    async fn retries_stop_after_max_retries() {
        let dir = tempfile::tempdir().unwrap();
        let opts = fast_options(&dir);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = recording_runner(calls.clone(), |_| {
            CommandOutput::failed("Error: read: connection reset by peer")
        });

        let err = tf(runner).init(&opts).await.unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
        // First attempt plus DEFAULT_MAX_RETRIES
        assert_eq!(calls.lock().unwrap().len(), 1 + DEFAULT_MAX_RETRIES as usize);
    }

    #[tokio::test]
    async fn non_retryable_failure_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let opts = fast_options(&dir);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = recording_runner(calls.clone(), |_| {
            CommandOutput::failed("Error: creating RDS DB Instance: InvalidParameterValue")
        });

        let err = tf(runner).apply(&opts).await.unwrap_err();
        assert!(err.to_string().contains("InvalidParameterValue"));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_directory_fails_validation_without_running() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(0);
        let opts = TerraformOptions::new("/definitely/not/a/module");

        let err = tf(runner).init(&opts).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn outputs_decode_by_shape() {
        let dir = tempfile::tempdir().unwrap();
        let opts = fast_options(&dir);
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|inv| {
            assert_eq!(&inv.args[..3], ["output", "-no-color", "-json"]);
            let body = match inv.args.get(3).map(String::as_str) {
                Some("vpc_id") => r#""vpc-0123456789abcdef0""#,
                Some("db_port") => "5432",
                Some("public_subnet_ids") => r#"["subnet-a","subnet-b","subnet-c"]"#,
                Some("secret_arns") => r#"{"openai_api_key":"arn:1","stripe_secret":"arn:2"}"#,
                None => r#"{"vpc_id":{"sensitive":false,"type":"string","value":"vpc-0123456789abcdef0"}}"#,
                Some(other) => panic!("unexpected output {other}"),
            };
            Ok(CommandOutput::ok(body))
        });
        let tf = tf(runner);

        assert_eq!(tf.output(&opts, "vpc_id").await.unwrap(), "vpc-0123456789abcdef0");
        assert_eq!(tf.output(&opts, "db_port").await.unwrap(), "5432");
        assert_eq!(tf.output_list(&opts, "public_subnet_ids").await.unwrap().len(), 3);

        let arns = tf.output_map(&opts, "secret_arns").await.unwrap();
        assert_eq!(arns.get("stripe_secret").map(String::as_str), Some("arn:2"));

        let all = tf.output_all(&opts).await.unwrap();
        assert_eq!(all["vpc_id"], json!("vpc-0123456789abcdef0"));

        assert!(tf.output_list(&opts, "vpc_id").await.is_err());
    }

    #[tokio::test]
    async fn scoped_destroys_after_successful_body() {
        let dir = tempfile::tempdir().unwrap();
        let opts = fast_options(&dir);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = recording_runner(calls.clone(), |inv| match inv.args[0].as_str() {
            "output" => CommandOutput::ok(r#""vpc-1""#),
            _ => CommandOutput::ok(""),
        });

        let vpc = tf(runner)
            .scoped(&opts, |tf, opts| async move { tf.output(&opts, "vpc_id").await })
            .await
            .unwrap();

        assert_eq!(vpc, "vpc-1");
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["init", "apply", "output", "destroy"]
        );
    }

    #[tokio::test]
    async fn scoped_destroys_when_body_panics() {
        let dir = tempfile::tempdir().unwrap();
        let opts = fast_options(&dir);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = recording_runner(calls.clone(), |_| CommandOutput::ok(""));
        let tf = tf(runner);

        let result = AssertUnwindSafe(tf.scoped(&opts, |_, _| async move {
            let subnets: Vec<String> = Vec::new();
            assert_eq!(subnets.len(), 3, "assertion inside scoped body");
            Ok(())
        }))
        .catch_unwind()
        .await;

        assert!(result.is_err(), "panic should propagate after teardown");
        assert_eq!(*calls.lock().unwrap(), vec!["init", "apply", "destroy"]);
    }

    #[tokio::test]
    async fn scoped_destroys_when_apply_fails() {
        let dir = tempfile::tempdir().unwrap();
        let opts = fast_options(&dir);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = recording_runner(calls.clone(), |inv| match inv.args[0].as_str() {
            "apply" => CommandOutput::failed("Error: creating EKS Cluster: AccessDeniedException"),
            _ => CommandOutput::ok(""),
        });

        let ran_body = Arc::new(Mutex::new(false));
        let flag = ran_body.clone();
        let err = tf(runner)
            .scoped(&opts, move |_, _| async move {
                *flag.lock().unwrap() = true;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("AccessDeniedException"));
        assert!(!*ran_body.lock().unwrap());
        assert_eq!(*calls.lock().unwrap(), vec!["init", "apply", "destroy"]);
    }

    #[tokio::test]
    async fn scoped_skips_destroy_when_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let opts = fast_options(&dir);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = recording_runner(calls.clone(), |inv| match inv.args[0].as_str() {
            "init" => CommandOutput::failed("Error: Module not installed"),
            _ => CommandOutput::ok(""),
        });

        let err = tf(runner)
            .scoped(&opts, |_, _| async move { Ok(()) })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Module not installed"));
        assert_eq!(*calls.lock().unwrap(), vec!["init"]);
    }

    #[tokio::test]
    async fn scoped_skips_destroy_for_missing_directory() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(0);
        let opts = TerraformOptions::new("/definitely/not/a/module");

        let err = tf(runner)
            .scoped(&opts, |_, _| async move { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn retry_count_saturates_at_max() {
        let mut opts = TerraformOptions::new("/tmp");
        opts.max_retries = u32::MAX;
        opts.time_between_retries = Duration::from_secs(5);

        let config = retry_config(&opts);
        assert_eq!(config.max_attempts, u32::MAX);
        assert_eq!(config.initial_delay, Duration::from_secs(5));
        assert!(!config.jitter);

        opts.max_retries = DEFAULT_MAX_RETRIES;
        assert_eq!(retry_config(&opts).max_attempts, DEFAULT_MAX_RETRIES + 1);
    }

    #[tokio::test]
    async fn scoped_reports_destroy_failure_after_successful_body() {
        let dir = tempfile::tempdir().unwrap();
        let opts = fast_options(&dir);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = recording_runner(calls.clone(), |inv| match inv.args[0].as_str() {
            "destroy" => CommandOutput::failed("Error: deleting VPC: DependencyViolation"),
            _ => CommandOutput::ok(""),
        });

        let err = tf(runner)
            .scoped(&opts, |_, _| async move { Ok(()) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("DependencyViolation"));
    }

    #[tokio::test]
    async fn scoped_body_error_wins_over_destroy_error() {
        let dir = tempfile::tempdir().unwrap();
        let opts = fast_options(&dir);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = recording_runner(calls.clone(), |inv| match inv.args[0].as_str() {
            "destroy" => CommandOutput::failed("Error: deleting VPC: DependencyViolation"),
            _ => CommandOutput::ok(""),
        });

        let err = tf(runner)
            .scoped(&opts, |_, _| async move {
                Err::<(), _>(Error::output("vpc_id", "output has no value"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Output { .. }));
    }
}
