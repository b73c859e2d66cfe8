//! Error taxonomy for backend calls.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
#[error("configuration error: {message}")]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SDKError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("provider '{provider}' returned status {status}: {message}")]
    Provider {
        provider: String,
        status: u16,
        message: String,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("no object generated: {0}")]
    NoObjectGenerated(String),
}

impl SDKError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Provider { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_are_retryable_only_for_throttling_and_server_faults() {
        let throttled = SDKError::Provider {
            provider: "openai".to_string(),
            status: 429,
            message: "slow down".to_string(),
        };
        let bad_request = SDKError::Provider {
            provider: "openai".to_string(),
            status: 400,
            message: "bad".to_string(),
        };
        assert!(throttled.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!SDKError::NoObjectGenerated("x".to_string()).is_retryable());
    }
}
