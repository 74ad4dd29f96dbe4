use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InjectorError>;

#[derive(Error, Debug)]
pub enum InjectorError {
    #[error("Malformed network annotation: {0}")]
    MalformedAnnotation(String),

    #[error("Malformed pod object: {0}")]
    MalformedPod(#[source] serde_json::Error),

    #[error("Failed to resolve network {network}: {source}")]
    Resolution {
        network: String,
        #[source]
        source: LookupError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl InjectorError {
    /// Stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            InjectorError::MalformedAnnotation(_) => "malformed_annotation",
            InjectorError::MalformedPod(_) => "malformed_pod",
            InjectorError::Resolution { .. } => "resolution",
            InjectorError::Serialization(_) => "serialization",
        }
    }

    /// Whether the error was caused by the submitted object rather than the environment
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            InjectorError::MalformedAnnotation(_) | InjectorError::MalformedPod(_)
        )
    }
}

/// Failure of the network definition lookup collaborator
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}
