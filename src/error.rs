//! Error types for fx-infra

use regex::Regex;
use thiserror::Error;

/// Main error type for harness operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An external tool exited unsuccessfully
    #[error("command failed: {command} - {message}")]
    CommandFailed {
        /// The command line that failed
        command: String,
        /// Captured stderr of the command
        message: String,
    },

    /// A template requested for rendering is not part of the chart
    #[error("template {template} not found in chart {chart}")]
    TemplateNotFound {
        /// Chart directory
        chart: String,
        /// Template path relative to the chart root
        template: String,
    },

    /// Rendered output could not be decoded into the expected shape
    #[error("manifest error: {0}")]
    Manifest(String),

    /// A Terraform output is missing or has the wrong shape
    #[error("output {name}: {message}")]
    Output {
        /// Output variable name
        name: String,
        /// Description of what's wrong
        message: String,
    },

    /// Invalid harness options
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error (process spawn, chart file access)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML decoding error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON decoding error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a command failure for the given program and arguments
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a manifest error with the given message
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create an output error for the named output
    pub fn output(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Output {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Description of the first retryable rule whose pattern matches this
    /// error's stderr
    ///
    /// Only command failures are ever retryable.
    pub fn retryable_reason<'a>(&self, rules: &'a [(Regex, String)]) -> Option<&'a str> {
        match self {
            Error::CommandFailed { message, .. } => rules
                .iter()
                .find(|(pattern, _)| pattern.is_match(message))
                .map(|(_, description)| description.as_str()),
            _ => None,
        }
    }

    /// Whether any retryable rule matches this error
    pub fn is_retryable(&self, rules: &[(Regex, String)]) -> bool {
        self.retryable_reason(rules).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failure_carries_command_and_stderr() {
        let err = Error::command_failed(
            "helm template test ./charts/eventserver",
            "Error: parse error at (eventserver/templates/deployment.yaml:12)",
        );
        let msg = err.to_string();
        assert!(msg.contains("command failed"));
        assert!(msg.contains("helm template"));
        assert!(msg.contains("deployment.yaml:12"));
    }

    #[test]
    fn missing_template_names_chart_and_template() {
        let err = Error::TemplateNotFound {
            chart: "/charts/keycloak".to_string(),
            template: "templates/configmap.yaml".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "template templates/configmap.yaml not found in chart /charts/keycloak"
        );
    }

    #[test]
    fn output_errors_name_the_output() {
        let err = Error::output("db_port", "expected a string");
        assert!(err.to_string().starts_with("output db_port"));
    }

    #[test]
    fn only_matching_command_failures_are_retryable() {
        let rules = vec![
            (
                Regex::new(".*read: connection reset by peer.*").unwrap(),
                "Failed to reach helm charts repository.".to_string(),
            ),
            (
                Regex::new(".*Error installing provider.*").unwrap(),
                "Failed to retrieve plugin due to transient network error.".to_string(),
            ),
        ];

        let transient = Error::command_failed(
            "terraform init",
            "Error installing provider \"aws\": unexpected EOF",
        );
        assert!(transient.is_retryable(&rules));
        assert_eq!(
            transient.retryable_reason(&rules),
            Some("Failed to retrieve plugin due to transient network error.")
        );

        let permanent = Error::command_failed("terraform apply", "Error: Invalid CIDR block");
        assert!(!permanent.is_retryable(&rules));

        // Non-command errors never retry even if the text matches
        let other = Error::validation("read: connection reset by peer");
        assert!(!other.is_retryable(&rules));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "helm: not found");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("helm: not found"));
    }
}
