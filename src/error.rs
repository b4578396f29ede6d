//! Error types for the SGX admission webhook

use axum::http::StatusCode;
use thiserror::Error;

/// Main error type for webhook operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A container carries an `sgx.intel.com/*` resource entry that cannot be
    /// interpreted (non-integral quantity, requests differing from limits, ...)
    #[error("container '{container}': malformed resource '{resource}': {reason}")]
    MalformedResource {
        /// Name of the offending container
        container: String,
        /// Fully qualified resource name
        resource: String,
        /// Why the entry was rejected
        reason: String,
    },

    /// A quantity string could not be parsed
    #[error("invalid quantity '{quantity}': {reason}")]
    Quantity {
        /// The raw quantity string
        quantity: String,
        /// Why parsing failed
        reason: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid runtime configuration (TLS material, addresses, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a malformed-resource error
    pub fn malformed_resource(
        container: impl Into<String>,
        resource: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedResource {
            container: container.into(),
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Create a quantity parse error
    pub fn quantity(quantity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Quantity {
            quantity: quantity.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status reported in the admission response for this error.
    ///
    /// A Pod whose SGX resources cannot be read cannot be mutated safely, so
    /// every engine failure is reported as an internal error. Only a Pod that
    /// fails to decode is answered with 400, by the handler itself.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
