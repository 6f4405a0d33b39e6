use serde_json::{json, Value as JsonValue};
use unmeshedcore::{JsonMap, StepError};

pub const CUSTOM_ERROR_CODE: &str = "CUSTOM_ERROR_123";

/// Always fails with a coded error and structured error data
pub fn exception_step(_input: JsonMap) -> Result<JsonValue, StepError> {
    Err(StepError::new("Intentional exception from exception_step")
        .with_code(CUSTOM_ERROR_CODE)
        .with_data(json!({"step": 2, "status": "failed"})))
}
