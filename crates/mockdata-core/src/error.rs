//! Error types for configuration loading and playbook execution.

use thiserror::Error;

/// Errors raised while rendering, parsing, and merging template sources.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Source file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Template rendering error.
    #[error("template error: {0}")]
    Template(String),

    /// YAML parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Document does not have the expected playbook structure.
    #[error("invalid configuration: {0}")]
    Structure(String),

    /// Request parameters could not be decoded.
    #[error("invalid request params: {0}")]
    Params(String),
}

impl From<minijinja::Error> for LoadError {
    fn from(err: minijinja::Error) -> Self {
        LoadError::Template(err.to_string())
    }
}

/// Errors raised by the playbook execution engine.
///
/// Variants name the playbook (and step, where applicable) so the
/// user-visible error identifies what failed and why.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to build HTTP client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },

    #[error("playbook {playbook} missing type")]
    MissingKind { playbook: String },

    #[error("playbook {playbook} has unknown type {kind}")]
    UnknownKind { playbook: String, kind: String },

    #[error("playbook {playbook} missing params")]
    MissingParams { playbook: String },

    #[error("playbook {playbook} missing steps")]
    MissingSteps { playbook: String },

    #[error("error serializing step {step} in playbook {playbook}: {source}")]
    BodySerialize {
        playbook: String,
        step: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("error building request for step {step} in playbook {playbook}: {message}")]
    Request {
        playbook: String,
        step: usize,
        message: String,
    },

    #[error("request failed for step {step} in playbook {playbook}: {source}")]
    Transport {
        playbook: String,
        step: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("request failed with status {status} for step {step} in playbook {playbook}: {body}")]
    Status {
        playbook: String,
        step: usize,
        status: u16,
        body: String,
    },

    #[error("error reading response for step {step} in playbook {playbook}: {source}")]
    ResponseRead {
        playbook: String,
        step: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("error parsing response JSON for step {step} in playbook {playbook}: {source}")]
    ResponseDecode {
        playbook: String,
        step: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_error_display() {
        let err = RunError::MissingKind {
            playbook: "create_user".to_string(),
        };
        assert_eq!(err.to_string(), "playbook create_user missing type");

        let err = RunError::Status {
            playbook: "create_user".to_string(),
            step: 2,
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "request failed with status 500 for step 2 in playbook create_user: boom"
        );
    }

    #[test]
    fn test_load_error_from_yaml() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>(": not yaml: [").unwrap_err();
        let err: LoadError = yaml_err.into();
        assert!(matches!(err, LoadError::Yaml(_)));
    }
}
