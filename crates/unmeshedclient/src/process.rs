//! Process definition and process execution calls.

use crate::http::HttpClient;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use unmeshedcore::{
    ApiCallType, DeleteProcessDefinitionsResponse, JsonMap, ProcessActionResponse, ProcessData,
    ProcessDefinition, ProcessRequestData, ProcessSearchRequest, Result, StepData,
};

const DEFINITIONS: &str = "processDefinitions";

/// Bulk actions applied to many process executions at once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Terminate,
    Resume,
    Reviewed,
}

impl BulkAction {
    fn route(&self) -> &'static str {
        match self {
            BulkAction::Terminate => "bulkTerminate",
            BulkAction::Resume => "bulkResume",
            BulkAction::Reviewed => "bulkReviewed",
        }
    }
}

/// Stateless client for process definitions and executions
#[derive(Clone)]
pub struct ProcessClient {
    http: Arc<HttpClient>,
}

impl ProcessClient {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn create_definition(&self, definition: &ProcessDefinition) -> Result<ProcessDefinition> {
        tracing::debug!("Creating process definition {}/{}", definition.namespace, definition.name);
        self.http.post(&["api", DEFINITIONS], &[], definition).await
    }

    pub async fn update_definition(&self, definition: &ProcessDefinition) -> Result<ProcessDefinition> {
        tracing::debug!("Updating process definition {}/{}", definition.namespace, definition.name);
        self.http.put(&["api", DEFINITIONS], &[], definition).await
    }

    /// Latest definition, or a specific version when one is given
    pub async fn latest_or_version(
        &self,
        namespace: &str,
        name: &str,
        version: Option<u32>,
    ) -> Result<ProcessDefinition> {
        let query: Vec<(&str, String)> = version
            .map(|v| vec![("version", v.to_string())])
            .unwrap_or_default();
        self.http
            .get(&["api", DEFINITIONS, "latest-or-version", namespace, name], &query)
            .await
    }

    pub async fn versions(&self, namespace: &str, name: &str) -> Result<Vec<u32>> {
        self.http
            .get(&["api", DEFINITIONS, "versions", namespace, name], &[])
            .await
    }

    pub async fn all_definitions(&self) -> Result<Vec<ProcessDefinition>> {
        self.http.get(&["api", DEFINITIONS], &[]).await
    }

    /// Delete definitions; with `version_only` only the listed versions go
    pub async fn delete_definitions(
        &self,
        definitions: &[ProcessDefinition],
        version_only: bool,
    ) -> Result<DeleteProcessDefinitionsResponse> {
        self.http
            .delete(
                &["api", DEFINITIONS],
                &[("versionOnly", version_only.to_string())],
                definitions,
            )
            .await
    }

    pub async fn run_sync(&self, request: &ProcessRequestData) -> Result<ProcessData> {
        self.run("runSync", request).await
    }

    pub async fn run_async(&self, request: &ProcessRequestData) -> Result<ProcessData> {
        self.run("runAsync", request).await
    }

    async fn run(&self, route: &str, request: &ProcessRequestData) -> Result<ProcessData> {
        tracing::debug!("{} {}/{}", route, request.namespace, request.name);
        self.http
            .post(
                &["api", "process", route],
                &[("clientId", self.http.client_id().to_string())],
                request,
            )
            .await
    }

    pub async fn process_data(&self, process_id: u64, include_steps: bool) -> Result<ProcessData> {
        self.http
            .get(
                &["api", "process", "context", &process_id.to_string()],
                &[("includeSteps", include_steps.to_string())],
            )
            .await
    }

    pub async fn step_data(&self, step_id: u64) -> Result<StepData> {
        self.http
            .get(&["api", "process", "stepContext", &step_id.to_string()], &[])
            .await
    }

    pub async fn search(&self, request: &ProcessSearchRequest) -> Result<Vec<ProcessData>> {
        self.http
            .get(&["api", "stats", "process", "search"], &request.to_query_pairs())
            .await
    }

    pub async fn rerun(&self, process_id: u64, version: Option<u32>) -> Result<ProcessData> {
        let mut query = vec![
            ("processId", process_id.to_string()),
            ("clientId", self.http.client_id().to_string()),
        ];
        if let Some(version) = version {
            query.push(("version", version.to_string()));
        }
        let request = self
            .http
            .request(reqwest::Method::POST, &["api", "process", "rerun"])
            .query(&query);
        self.http.send_json(request).await
    }

    pub async fn bulk(
        &self,
        action: BulkAction,
        process_ids: &[u64],
        reason: Option<&str>,
    ) -> Result<ProcessActionResponse> {
        let query: Vec<(&str, String)> = reason
            .map(|r| vec![("reason", r.to_string())])
            .unwrap_or_default();
        tracing::debug!("{} for {} processes", action.route(), process_ids.len());
        self.http
            .post(&["api", "process", action.route()], &query, process_ids)
            .await
    }

    pub async fn invoke_api_mapping_get(
        &self,
        endpoint: &str,
        id: &str,
        correlation_id: &str,
        call_type: ApiCallType,
    ) -> Result<JsonValue> {
        let query = mapping_query(id, correlation_id, call_type);
        self.http.get(&["api", "call", endpoint], &query).await
    }

    pub async fn invoke_api_mapping_post(
        &self,
        endpoint: &str,
        id: &str,
        correlation_id: &str,
        call_type: ApiCallType,
        input: &JsonMap,
    ) -> Result<JsonValue> {
        let query = mapping_query(id, correlation_id, call_type);
        self.http.post(&["api", "call", endpoint], &query, input).await
    }
}

fn mapping_query(id: &str, correlation_id: &str, call_type: ApiCallType) -> Vec<(&'static str, String)> {
    vec![
        ("id", id.to_string()),
        ("correlationId", correlation_id.to_string()),
        ("apiCallType", call_type.as_str().to_string()),
    ]
}
