use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::JsonMap;

#[derive(Error, Debug)]
pub enum UnmeshedError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UnmeshedError {
    /// True when the server answered with the given HTTP status
    pub fn is_status(&self, code: u16) -> bool {
        matches!(self, UnmeshedError::Api { status, .. } if *status == code)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Worker name must not be empty")]
    EmptyName,

    #[error("Worker '{0}' must allow at least one step in progress")]
    ZeroCapacity(String),

    #[error("Queue {namespace}/{queue} is already served by worker '{owner}'")]
    DuplicateQueue {
        namespace: String,
        queue: String,
        owner: String,
    },

    #[error("No handler named '{0}' in the catalog")]
    UnknownHandler(String),

    #[error("Invalid worker manifest {path}: {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("Workers cannot be registered after the client has started")]
    AlreadyStarted,
}

/// Failure raised by a worker while executing a step.
///
/// `code` and `data` travel back to the engine next to the message so that a
/// process can branch on a structured failure.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct StepError {
    pub message: String,
    pub code: Option<String>,
    pub data: Option<JsonValue>,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            data: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    /// Output map reported to the engine for a failed step
    pub fn to_output(&self) -> JsonMap {
        let mut output = JsonMap::new();
        output.insert("error".to_string(), JsonValue::String(self.message.clone()));
        if let Some(code) = &self.code {
            output.insert("errorCode".to_string(), JsonValue::String(code.clone()));
        }
        if let Some(data) = &self.data {
            output.insert("errorData".to_string(), data.clone());
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_error_output_carries_code_and_data() {
        let err = StepError::new("boom")
            .with_code("E42")
            .with_data(json!({"attempt": 3}));

        let output = err.to_output();
        assert_eq!(output.get("error"), Some(&json!("boom")));
        assert_eq!(output.get("errorCode"), Some(&json!("E42")));
        assert_eq!(output.get("errorData"), Some(&json!({"attempt": 3})));
    }

    #[test]
    fn plain_step_error_only_reports_message() {
        let err = StepError::new("plain");
        assert_eq!(err.to_output().len(), 1);
        assert_eq!(err.to_string(), "plain");
    }

    #[test]
    fn api_error_status_matching() {
        let err = UnmeshedError::Api {
            status: 404,
            message: "missing".to_string(),
        };
        assert!(err.is_status(404));
        assert!(!err.is_status(500));
    }
}
