//! Error taxonomy for the Impact Card pipeline.
//!
//! - [`CallError`]: one failed attempt against an external API (network or HTTP status).
//!   The retry policy decides whether it is transient.
//! - [`PipelineError`]: what a caller of the pipeline sees. A run is all-or-nothing, so any
//!   variant means no card was produced.
//!
//! Cache and call-log failures never show up here: both are absorbed where they happen.

use serde_json::Value;
use thiserror::Error;

use crate::types::ApiType;

/// Failure category of a single external call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorKind {
    /// Connection refused, timeout, TLS, body read failure.
    Network,
    /// The server answered with a non-2xx status.
    Status,
}

/// One failed attempt against an external API.
#[derive(Debug, Clone, Error)]
#[error("{api_type} call to {endpoint} failed: {message}")]
pub struct CallError {
    pub api_type: ApiType,
    pub endpoint: String,
    pub kind: CallErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
    /// Response body (JSON if it parsed, otherwise the raw text as a JSON string).
    pub payload: Value,
}

impl CallError {
    pub fn network(api_type: ApiType, endpoint: &str, message: impl Into<String>) -> Self {
        Self {
            api_type,
            endpoint: endpoint.to_string(),
            kind: CallErrorKind::Network,
            status_code: None,
            message: message.into(),
            payload: Value::Null,
        }
    }

    pub fn status(api_type: ApiType, endpoint: &str, status_code: u16, payload: Value) -> Self {
        Self {
            api_type,
            endpoint: endpoint.to_string(),
            kind: CallErrorKind::Status,
            status_code: Some(status_code),
            message: format!("HTTP {status_code}"),
            payload,
        }
    }

    /// 4xx responses.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status_code, Some(code) if (400..500).contains(&code))
    }
}

/// Error returned by [`crate::pipeline::ImpactPipeline::generate`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An external call failed after the retry policy gave up.
    #[error("{message}")]
    ApiCall {
        message: String,
        api_type: ApiType,
        status_code: Option<u16>,
        payload: Value,
        #[source]
        source: CallError,
    },

    /// The analysis reply did not carry the required fields with the required types.
    #[error("malformed analysis response: `{field}` {detail}")]
    MalformedResponse { field: String, detail: String },

    /// The notification rule store could not be read or written.
    #[error("notification rule store failed: {0}")]
    RuleStore(String),
}

impl PipelineError {
    /// Wrap an exhausted call into the domain-level error.
    pub fn from_call(err: CallError) -> Self {
        let message = format!("{} API request failed: {}", err.api_type, err.message);
        Self::ApiCall {
            message,
            api_type: err.api_type,
            status_code: err.status_code,
            payload: err.payload.clone(),
            source: err,
        }
    }

    pub fn malformed(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            field: field.into(),
            detail: detail.into(),
        }
    }

    pub fn api_type(&self) -> Option<ApiType> {
        match self {
            Self::ApiCall { api_type, .. } => Some(*api_type),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiCall { status_code, .. } => *status_code,
            _ => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }
}

impl From<CallError> for PipelineError {
    fn from(err: CallError) -> Self {
        Self::from_call(err)
    }
}
