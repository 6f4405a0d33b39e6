use crate::report;
use anyhow::Result;
use serde_json::json;
use std::path::Path;
use unmeshedclient::{
    ApiCallType, ClientConfig, JsonMap, ProcessDefinition, ProcessRequestData,
    ProcessSearchRequest, StepDefinition, StepTemplates, StepType, UnmeshedClient,
};

const NAMESPACE: &str = "default";
const PROCESS_NAME: &str = "test_process";
const ENDPOINT: &str = "test_process_endpoint";

/// Make sure the definitions the walkthrough runs exist
async fn ensure_definitions(client: &UnmeshedClient) {
    for name in [PROCESS_NAME, ENDPOINT] {
        let definition = ProcessDefinition::new(NAMESPACE, name)
            .with_description("Runs the sample hello world worker")
            .with_step(StepTemplates::default_step_definition(StepType::Noop, NAMESPACE))
            .with_step(StepDefinition::new("worker3", StepType::Worker).with_ref("hello"));
        match client.create_new_process_definition(&definition).await {
            Ok(_) => tracing::info!("Created process definition {}", name),
            Err(e) if e.is_status(409) => tracing::debug!("Process definition {} already exists", name),
            Err(e) => tracing::error!("Creating process definition {} failed: {}", name, e),
        }
    }
}

/// Serve the sample workers and exercise the process API against them
pub async fn run(config: ClientConfig, manifests: &Path) -> Result<()> {
    let mut client = UnmeshedClient::new(config)?;

    for registration in unmeshedworkers::registrations() {
        client.register_worker(registration)?;
    }
    client.register_decorated_workers(manifests, &unmeshedworkers::catalog())?;
    client.start().await?;

    ensure_definitions(&client).await;

    let request = ProcessRequestData::new(NAMESPACE, PROCESS_NAME)
        .with_version(1)
        .with_request_id("req001")
        .with_correlation_id("corr001")
        .with_input("test1", "value")
        .with_input("test2", 100)
        .with_input("test3", 100.0);

    let finished = report("Sync execution", client.run_process_sync(&request).await);
    report("Async execution", client.run_process_async(&request).await);

    if let Some(finished) = finished {
        let pid = finished.process_id;

        if let Some(data) = report("Process without steps", client.get_process_data(pid, false).await) {
            tracing::info!("Steps were not requested, {} returned", data.step_records.len());
        }
        if let Some(data) = report("Process with steps", client.get_process_data(pid, true).await) {
            tracing::info!("Steps were requested, {} returned", data.step_records.len());
            if let Some(first) = data.steps.first() {
                report("Step data", client.get_step_data(first.id).await);
            }
        }

        let search = ProcessSearchRequest {
            namespace: Some(NAMESPACE.to_string()),
            names: vec![PROCESS_NAME.to_string()],
            limit: 20,
            ..Default::default()
        };
        if let Some(found) = report("Search", client.search_process_executions(&search).await) {
            tracing::info!("Search returned {} processes", found.len());
        }

        report("Rerun", client.rerun(pid, Some(1)).await);

        let ids = [pid, 1, 2];
        report("Bulk terminate", client.bulk_terminate(&ids, None).await);
        report("Bulk resume", client.bulk_resume(&ids).await);
        report("Bulk review", client.bulk_reviewed(&ids, None).await);
    }

    report(
        "API mapped GET",
        client
            .invoke_api_mapping_get(ENDPOINT, "req_id--1", "correl_id--1", ApiCallType::Sync)
            .await,
    );
    let mut input = JsonMap::new();
    input.insert("test".to_string(), json!("value"));
    report(
        "API mapped POST",
        client
            .invoke_api_mapping_post(ENDPOINT, "req_id--1", "correl_id--1", ApiCallType::Sync, &input)
            .await,
    );

    client.shutdown().await;
    Ok(())
}
