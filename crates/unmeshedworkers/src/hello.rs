use serde_json::{json, Value as JsonValue};
use unmeshedcore::{JsonMap, StepError};

fn greeting(message: &str, input: JsonMap) -> JsonValue {
    json!({
        "message": message,
        "input_received": input,
    })
}

/// Served as `worker3_alt`
pub fn task_hello_world1(input: JsonMap) -> Result<JsonValue, StepError> {
    Ok(greeting("Hello, world!", input))
}

pub fn sample_function(input: JsonMap) -> Result<JsonValue, StepError> {
    Ok(greeting("Hello, world! sample_function", input))
}

pub async fn sample_async_function(input: JsonMap) -> Result<JsonValue, StepError> {
    Ok(greeting("Hello, world! sample_async_function", input))
}

/// Served as `worker3` and `worker4`
pub async fn task_hello_world2(input: JsonMap) -> Result<JsonValue, StepError> {
    Ok(greeting("Hello, world! task_hello_world2", input))
}
