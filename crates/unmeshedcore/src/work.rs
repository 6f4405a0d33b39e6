use crate::{JsonMap, StepStatus, StepType};
use serde::{Deserialize, Serialize};

/// Identifies one worker queue on the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default, rename_all = "camelCase")]
pub struct StepQueueNameData {
    pub org_id: u64,
    pub namespace: String,
    pub step_type: StepType,
    pub name: String,
}

impl Default for StepQueueNameData {
    fn default() -> Self {
        Self {
            org_id: 0,
            namespace: "default".to_string(),
            step_type: StepType::Worker,
            name: String::new(),
        }
    }
}

impl StepQueueNameData {
    pub fn worker(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// How many items the client is ready to take from one queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepSize {
    pub step_queue_name_data: StepQueueNameData,
    pub size: u32,
}

/// A unit of work handed out by the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkRequest {
    pub process_id: u64,
    pub step_id: u64,
    pub step_execution_id: u64,
    pub run_count: u32,
    pub step_name: String,
    pub step_namespace: String,
    pub step_ref: String,
    pub input_param: JsonMap,
    pub is_optional: bool,
    pub polled: i64,
    pub scheduled: i64,
    pub updated: i64,
    pub priority: i32,
}

/// Result of a work request, sent back in batches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkResponse {
    pub process_id: u64,
    pub step_id: u64,
    pub step_execution_id: u64,
    pub run_count: u32,
    pub output: JsonMap,
    pub status: StepStatus,
    pub reschedule_after_seconds: Option<u64>,
    pub started_at: i64,
}

impl WorkResponse {
    /// Response skeleton echoing the identifiers of a request
    pub fn for_request(request: &WorkRequest, started_at: i64) -> Self {
        Self {
            process_id: request.process_id,
            step_id: request.step_id,
            step_execution_id: request.step_execution_id,
            run_count: request.run_count,
            started_at,
            ..Default::default()
        }
    }
}
