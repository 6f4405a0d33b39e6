use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use unmeshedcore::{JsonMap, StepError, StepOutcome, WorkContext, Worker};

/// Free-form response carried through the typed sample workers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SampleResponse {
    pub success: bool,
    pub message: String,
    pub data: JsonMap,
}

fn processed(response: SampleResponse, message: &str, note: &str) -> SampleResponse {
    tracing::info!("Processing response: {:?}", response);
    let mut data = JsonMap::new();
    data.insert(
        "original_response".to_string(),
        serde_json::to_value(&response).unwrap_or(JsonValue::Null),
    );
    data.insert("worker_note".to_string(), json!(note));
    SampleResponse {
        success: true,
        message: message.to_string(),
        data,
    }
}

pub fn sample_annotated_worker(response: SampleResponse) -> Result<SampleResponse, StepError> {
    Ok(processed(
        response,
        "Sample Annotated Worker",
        "Processed by sample_annotated_worker",
    ))
}

pub fn task_second_worker(response: SampleResponse) -> Result<SampleResponse, StepError> {
    Ok(processed(
        response,
        "Second worker processed",
        "Processed by secondary worker",
    ))
}

/// Worker implemented on a type instead of a function
#[derive(Debug, Default, Clone)]
pub struct ClassWorker;

#[async_trait]
impl Worker for ClassWorker {
    async fn execute(&self, ctx: WorkContext) -> Result<StepOutcome, StepError> {
        tracing::info!("Input received is {:?}", ctx.input());
        Ok(StepOutcome::Completed(json!({ "a": "bcd" })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unmeshedcore::{FnWorker, WorkRequest};

    fn ctx(input: JsonValue) -> WorkContext {
        let input_param = match input {
            JsonValue::Object(map) => map,
            _ => JsonMap::new(),
        };
        WorkContext::new(WorkRequest {
            input_param,
            ..Default::default()
        })
    }

    #[test]
    fn annotated_worker_wraps_original() {
        let response = SampleResponse {
            success: false,
            message: "in".to_string(),
            data: JsonMap::new(),
        };
        let out = sample_annotated_worker(response).unwrap();
        assert!(out.success);
        assert_eq!(out.message, "Sample Annotated Worker");
        assert_eq!(out.data["original_response"]["message"], "in");
        assert_eq!(out.data["worker_note"], "Processed by sample_annotated_worker");
    }

    #[tokio::test]
    async fn typed_worker_accepts_partial_input() {
        let worker = FnWorker::typed(task_second_worker);
        let outcome = worker.execute(ctx(json!({"message": "hi"}))).await.unwrap();
        let output = outcome.to_output();
        assert_eq!(output["success"], true);
        assert_eq!(output["message"], "Second worker processed");
        assert_eq!(output["data"]["original_response"]["success"], false);
    }

    #[tokio::test]
    async fn class_worker_returns_constant() {
        let outcome = ClassWorker.execute(ctx(json!({"x": 1}))).await.unwrap();
        assert_eq!(outcome, StepOutcome::Completed(json!({"a": "bcd"})));
    }
}
