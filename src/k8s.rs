//! Kubernetes-side helpers
//!
//! [`KubectlOptions`] carries the cluster coordinates a render targets, and
//! the accessor functions walk rendered `k8s-openapi` objects down to the
//! fields the chart checks care about. Accessors return `Option`/`Result`
//! rather than indexing so a malformed render fails with a message instead of
//! a panic deep inside the object tree.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, EnvVar};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::{Error, Result};

/// kubectl/helm cluster coordinates
///
/// Empty strings mean "unset" and leave the tool's own default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubectlOptions {
    /// kubeconfig context name
    pub context: String,
    /// Path to the kubeconfig file
    pub config_path: String,
    /// Target namespace
    pub namespace: String,
}

impl KubectlOptions {
    /// Create options for the given context, kubeconfig and namespace
    pub fn new(
        context: impl Into<String>,
        config_path: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            config_path: config_path.into(),
            namespace: namespace.into(),
        }
    }

    /// The namespace, if one was set
    pub fn namespace(&self) -> Option<&str> {
        non_empty(&self.namespace)
    }

    /// The kubeconfig context, if one was set
    pub fn context(&self) -> Option<&str> {
        non_empty(&self.context)
    }

    /// The kubeconfig path, if one was set
    pub fn config_path(&self) -> Option<&str> {
        non_empty(&self.config_path)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Which half of a container's resource requirements to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceBound {
    /// `resources.limits`
    Limits,
    /// `resources.requests`
    Requests,
}

/// First container of the deployment's pod template
pub fn primary_container(deployment: &Deployment) -> Result<&Container> {
    let name = deployment.metadata.name.as_deref().unwrap_or("<unnamed>");
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod| pod.containers.first())
        .ok_or_else(|| Error::manifest(format!("deployment {name} has no containers")))
}

/// Environment variables declared on a container
pub fn container_env(container: &Container) -> &[EnvVar] {
    container.env.as_deref().unwrap_or_default()
}

/// Whether `env` holds a literal `name=value` entry
///
/// Entries sourced from secrets or config maps never match.
pub fn has_env(env: &[EnvVar], name: &str, value: &str) -> bool {
    env.iter()
        .any(|var| var.name == name && var.value_from.is_none() && var.value.as_deref() == Some(value))
}

/// Hosts of every rule on the ingress, in declaration order
pub fn ingress_hosts(ingress: &Ingress) -> Vec<&str> {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_ref())
        .map(|rules| rules.iter().filter_map(|r| r.host.as_deref()).collect())
        .unwrap_or_default()
}

/// A single resource quantity (e.g. `cpu`, `memory`) from a container
pub fn resource_quantity<'a>(
    container: &'a Container,
    bound: ResourceBound,
    resource: &str,
) -> Option<&'a str> {
    let resources = container.resources.as_ref()?;
    let map = match bound {
        ResourceBound::Limits => resources.limits.as_ref()?,
        ResourceBound::Requests => resources.requests.as_ref()?,
    };
    map.get(resource).map(|q| q.0.as_str())
}

/// Annotation value on an object
pub fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations.as_ref()?.get(key).map(String::as_str)
}
