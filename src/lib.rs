//! fx-infra - render and provisioning checks for the fx-orleans infrastructure
//!
//! The fx-orleans stack ships as a set of Helm charts (event server, Blazor
//! frontend, Keycloak, External Secrets wiring) and Terraform modules (VPC,
//! EKS, RDS, Secrets Manager). This crate drives the real `helm` and
//! `terraform` binaries and decodes what they produce so tests can assert on
//! typed Kubernetes objects and Terraform outputs.
//!
//! # Modules
//!
//! - [`helm`] - `helm template` rendering, manifest decoding, chart metadata
//! - [`terraform`] - init/apply/destroy with retryable errors and scoped teardown
//! - [`k8s`] - kubectl options and accessors over rendered `k8s-openapi` objects
//! - [`aws`] - stable region selection and availability zones
//! - [`exec`] - the process-runner seam all tool invocations go through
//! - [`retry`] - backoff and retryable-error aware retry loops
//! - [`config`] - binary names and fixture roots
//! - [`random`] - unique suffixes for isolated namespaces
//! - [`telemetry`] - tracing setup for test binaries
//! - [`error`] - error types

#![deny(missing_docs)]

pub mod aws;
pub mod config;
pub mod error;
pub mod exec;
pub mod helm;
pub mod k8s;
pub mod random;
pub mod retry;
pub mod telemetry;
pub mod terraform;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Namespace every fx-orleans chart deploys into unless overridden
pub const DEFAULT_NAMESPACE: &str = "fx-orleans";

/// Namespace passed to `helm template` when no kubectl options are given
pub const HELM_DEFAULT_NAMESPACE: &str = "default";

/// Annotation key used for IAM Roles for Service Accounts
pub const IRSA_ROLE_ANNOTATION: &str = "eks.amazonaws.com/role-arn";

/// PostgreSQL port exposed by the RDS module and consumed by the charts
pub const POSTGRES_PORT: u16 = 5432;
