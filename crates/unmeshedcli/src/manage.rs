use crate::report;
use anyhow::Result;
use unmeshedclient::{
    ClientConfig, ProcessDefinition, ProcessType, StepDefinition, StepTemplates, StepType,
    UnmeshedClient,
};

const NAMESPACE: &str = "default";
const PROCESS_NAME: &str = "test-process";

fn definition(version: u32, steps: Vec<StepDefinition>) -> ProcessDefinition {
    steps.into_iter().fold(
        ProcessDefinition::new(NAMESPACE, PROCESS_NAME)
            .with_version(version)
            .with_type(ProcessType::ApiOrchestration)
            .with_description("Testing Process"),
        ProcessDefinition::with_step,
    )
}

fn noop(name: &str, description: &str) -> StepDefinition {
    StepDefinition::new(name, StepType::Noop)
        .with_description(description)
        .with_input("key1", "val1")
}

/// Definition lifecycle: create, add a version, fetch, list and delete
pub async fn run(config: ClientConfig) -> Result<()> {
    // This flow never serves work
    let client = UnmeshedClient::new(config.with_enable_results_submission(false))?;

    let noop1 = StepTemplates::default_step_definition(StepType::Noop, NAMESPACE);
    let noop2 = noop("noop2", "Test noop 2");
    let noop3 = noop("noop3", "Test noop 3");

    report(
        "Created process definition",
        client
            .create_new_process_definition(&definition(1, vec![noop1.clone(), noop2.clone()]))
            .await,
    );
    report(
        "Updated process definition",
        client
            .update_process_definition(&definition(2, vec![noop1, noop2, noop3]))
            .await,
    );
    report(
        "Latest test-process definition",
        client
            .get_process_definition_latest_or_version(NAMESPACE, PROCESS_NAME, None)
            .await,
    );
    report(
        "Fetched process definition versions",
        client
            .get_process_definition_versions(NAMESPACE, PROCESS_NAME)
            .await,
    );

    let all = report(
        "Fetched all process definitions",
        client.get_all_process_definitions().await,
    )
    .unwrap_or_default();
    let ours: Vec<ProcessDefinition> = all
        .into_iter()
        .filter(|d| d.name == PROCESS_NAME && d.namespace == NAMESPACE)
        .collect();

    if ours.is_empty() {
        tracing::info!("No {} definitions found to delete", PROCESS_NAME);
    } else {
        report(
            "Deleted process definitions",
            client.delete_process_definitions(&ours, false).await,
        );
    }

    Ok(())
}
