use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use unmeshedcore::{JsonMap, StepError};

pub const BLOCKING_WAIT: Duration = Duration::from_millis(200);
pub const ASYNC_WAIT: Duration = Duration::from_millis(500);

/// Blocks its thread; only meant to run on the blocking pool
pub fn waiting_function(input: JsonMap) -> Result<JsonValue, StepError> {
    std::thread::sleep(BLOCKING_WAIT);
    Ok(json!({
        "message": "Hello, world! waiting_function",
        "input_received": input,
    }))
}

/// Served as `waiting_worker`
pub async fn async_waiting_function(input: JsonMap) -> Result<JsonValue, StepError> {
    tokio::time::sleep(ASYNC_WAIT).await;
    Ok(json!({
        "message": "Hello, world! async waiting_function",
        "input_received": input,
    }))
}
