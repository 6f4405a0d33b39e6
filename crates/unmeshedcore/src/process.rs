use crate::JsonMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessType {
    #[default]
    Standard,
    ApiOrchestration,
    Internal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    #[default]
    Worker,
    Http,
    Wait,
    Fail,
    Python,
    Javascript,
    Jq,
    Managed,
    Builtin,
    Noop,
    PersistedState,
    Dependson,
    Integration,
    Exit,
    SubProcess,
    List,
    Parallel,
    Foreach,
    Switch,
}

impl StepType {
    /// Wire name of the step type (e.g. `NOOP`)
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Worker => "WORKER",
            StepType::Http => "HTTP",
            StepType::Wait => "WAIT",
            StepType::Fail => "FAIL",
            StepType::Python => "PYTHON",
            StepType::Javascript => "JAVASCRIPT",
            StepType::Jq => "JQ",
            StepType::Managed => "MANAGED",
            StepType::Builtin => "BUILTIN",
            StepType::Noop => "NOOP",
            StepType::PersistedState => "PERSISTED_STATE",
            StepType::Dependson => "DEPENDSON",
            StepType::Integration => "INTEGRATION",
            StepType::Exit => "EXIT",
            StepType::SubProcess => "SUB_PROCESS",
            StepType::List => "LIST",
            StepType::Parallel => "PARALLEL",
            StepType::Foreach => "FOREACH",
            StepType::Switch => "SWITCH",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    #[default]
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
    Terminated,
    Reviewed,
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessStatus::Running)
    }

    /// Statuses a process can be resumed or marked reviewed from
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Failed | ProcessStatus::Terminated | ProcessStatus::TimedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Running => "RUNNING",
            ProcessStatus::Completed => "COMPLETED",
            ProcessStatus::Failed => "FAILED",
            ProcessStatus::TimedOut => "TIMED_OUT",
            ProcessStatus::Cancelled => "CANCELLED",
            ProcessStatus::Terminated => "TERMINATED",
            ProcessStatus::Reviewed => "REVIEWED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => Some(ProcessStatus::Running),
            "COMPLETED" => Some(ProcessStatus::Completed),
            "FAILED" => Some(ProcessStatus::Failed),
            "TIMED_OUT" => Some(ProcessStatus::TimedOut),
            "CANCELLED" => Some(ProcessStatus::Cancelled),
            "TERMINATED" => Some(ProcessStatus::Terminated),
            "REVIEWED" => Some(ProcessStatus::Reviewed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    #[default]
    Pending,
    Scheduled,
    Running,
    Paused,
    Completed,
    Failed,
    TimedOut,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiCallType {
    #[default]
    Sync,
    Async,
    Stream,
}

impl ApiCallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiCallType::Sync => "SYNC",
            ApiCallType::Async => "ASYNC",
            ApiCallType::Stream => "STREAM",
        }
    }
}

/// A single step inside a process definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct StepDefinition {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "ref")]
    pub step_ref: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub description: Option<String>,
    pub input: JsonMap,
    pub optional: bool,
}

impl StepDefinition {
    /// New step whose ref equals its name
    pub fn new(name: impl Into<String>, step_type: StepType) -> Self {
        let name = name.into();
        Self {
            step_ref: name.clone(),
            name,
            namespace: "default".to_string(),
            step_type,
            ..Default::default()
        }
    }

    pub fn with_ref(mut self, step_ref: impl Into<String>) -> Self {
        self.step_ref = step_ref.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Named, versioned orchestration made of ordered steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessDefinition {
    pub namespace: String,
    pub name: String,
    pub version: Option<u32>,
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    pub description: Option<String>,
    pub steps: Vec<StepDefinition>,
}

impl ProcessDefinition {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_type(mut self, process_type: ProcessType) -> Self {
        self.process_type = process_type;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn find_step(&self, step_ref: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.step_ref == step_ref)
    }
}

/// Request to start a process execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessRequestData {
    pub namespace: String,
    pub name: String,
    pub version: Option<u32>,
    pub request_id: Option<String>,
    pub correlation_id: Option<String>,
    pub input: JsonMap,
}

impl ProcessRequestData {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }
}

/// Lightweight step reference listed on every process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct StepId {
    pub id: u64,
    pub process_id: u64,
    #[serde(rename = "ref")]
    pub step_ref: String,
    pub status: StepStatus,
}

/// Full record of one step execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct StepData {
    pub id: u64,
    pub process_id: u64,
    #[serde(rename = "ref")]
    pub step_ref: String,
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub status: StepStatus,
    pub input: JsonMap,
    pub output: JsonMap,
    pub schedule: i64,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessData {
    pub process_id: u64,
    pub namespace: String,
    pub name: String,
    pub version: u32,
    pub request_id: Option<String>,
    pub correlation_id: Option<String>,
    pub status: ProcessStatus,
    pub input: JsonMap,
    pub output: JsonMap,
    pub steps: Vec<StepId>,
    pub step_records: Vec<StepData>,
    pub created: i64,
    pub updated: i64,
}

/// Filters for searching process executions
///
/// Sent as query parameters; list filters are comma-joined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessSearchRequest {
    pub start_time_epoch: Option<i64>,
    pub end_time_epoch: Option<i64>,
    pub namespace: Option<String>,
    pub names: Vec<String>,
    pub process_ids: Vec<u64>,
    pub correlation_ids: Vec<String>,
    pub request_ids: Vec<String>,
    pub statuses: Vec<ProcessStatus>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ProcessSearchRequest {
    fn default() -> Self {
        Self {
            start_time_epoch: None,
            end_time_epoch: None,
            namespace: None,
            names: Vec::new(),
            process_ids: Vec::new(),
            correlation_ids: Vec::new(),
            request_ids: Vec::new(),
            statuses: Vec::new(),
            limit: 10,
            offset: 0,
        }
    }
}

impl ProcessSearchRequest {
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(start) = self.start_time_epoch {
            pairs.push(("startTimeEpoch", start.to_string()));
        }
        if let Some(end) = self.end_time_epoch {
            pairs.push(("endTimeEpoch", end.to_string()));
        }
        if let Some(namespace) = &self.namespace {
            pairs.push(("namespace", namespace.clone()));
        }
        push_joined(&mut pairs, "names", self.names.iter());
        push_joined(&mut pairs, "processIds", self.process_ids.iter());
        push_joined(&mut pairs, "correlationIds", self.correlation_ids.iter());
        push_joined(&mut pairs, "requestIds", self.request_ids.iter());
        push_joined(&mut pairs, "statuses", self.statuses.iter().map(|s| s.as_str()));
        pairs.push(("limit", self.limit.to_string()));
        pairs.push(("offset", self.offset.to_string()));
        pairs
    }
}

fn push_joined<I, T>(pairs: &mut Vec<(&'static str, String)>, key: &'static str, values: I)
where
    I: Iterator<Item = T>,
    T: ToString,
{
    let joined: Vec<String> = values.map(|v| v.to_string()).collect();
    if !joined.is_empty() {
        pairs.push((key, joined.join(",")));
    }
}

/// Per-process outcome of a bulk action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessActionDetail {
    pub id: u64,
    pub message: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessActionResponse {
    pub count: usize,
    pub details: Vec<ProcessActionDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteProcessDefinitionsResponse {
    pub deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_definition_uses_wire_names() {
        let step = StepDefinition::new("noop2", StepType::Noop)
            .with_description("Test noop 2")
            .with_input("key1", "val1");

        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["ref"], json!("noop2"));
        assert_eq!(value["type"], json!("NOOP"));
        assert_eq!(value["input"]["key1"], json!("val1"));
    }

    #[test]
    fn process_definition_defaults_missing_fields() {
        let def: ProcessDefinition = serde_json::from_value(json!({
            "namespace": "default",
            "name": "test-process",
            "type": "API_ORCHESTRATION"
        }))
        .unwrap();

        assert_eq!(def.process_type, ProcessType::ApiOrchestration);
        assert!(def.steps.is_empty());
        assert_eq!(def.version, None);
    }

    #[test]
    fn search_request_joins_lists() {
        let request = ProcessSearchRequest {
            namespace: Some("default".to_string()),
            names: vec!["a".to_string(), "b".to_string()],
            statuses: vec![ProcessStatus::Failed, ProcessStatus::TimedOut],
            limit: 20,
            ..Default::default()
        };

        let pairs = request.to_query_pairs();
        assert!(pairs.contains(&("names", "a,b".to_string())));
        assert!(pairs.contains(&("statuses", "FAILED,TIMED_OUT".to_string())));
        assert!(pairs.contains(&("limit", "20".to_string())));
        assert!(!pairs.iter().any(|(k, _)| *k == "processIds"));
    }

    #[test]
    fn status_helpers() {
        assert!(!ProcessStatus::Running.is_terminal());
        assert!(ProcessStatus::Terminated.is_failure());
        assert!(!ProcessStatus::Completed.is_failure());
        assert_eq!(ProcessStatus::parse("timed_out"), Some(ProcessStatus::TimedOut));
    }
}
