use serde_json::json;
use unmeshedclient::{WorkerRegistry, WorkerScanner};
use unmeshedcore::{JsonMap, StepOutcome, WorkContext, WorkRequest};
use unmeshedworkers::{catalog, manifests_dir, register_all, CUSTOM_ERROR_CODE};

fn context(input: serde_json::Value) -> WorkContext {
    let input_param = match input {
        serde_json::Value::Object(map) => map,
        _ => JsonMap::new(),
    };
    WorkContext::new(WorkRequest {
        process_id: 1,
        step_id: 2,
        input_param,
        ..Default::default()
    })
}

#[test]
fn manifests_and_explicit_workers_register_together() {
    let registrations = WorkerScanner::scan(manifests_dir(), &catalog()).unwrap();
    assert_eq!(registrations.len(), 5);

    let mut registry = WorkerRegistry::new();
    register_all(&mut registry).unwrap();
    for registration in registrations {
        registry.register(registration).unwrap();
    }
    assert_eq!(registry.len(), 9);

    let alt = registry.resolve("default", "worker3_alt").unwrap();
    assert_eq!(alt.max_in_progress, 500);

    let lists = registry.resolve("testns3", "res_list2").unwrap();
    assert_eq!(lists.name, "list_no_test");
    assert!(registry.resolve("testns3", "list_no_test").is_none());

    let annotated = registry
        .resolve("default", "sample_annotated_worker_name2")
        .unwrap();
    assert_eq!(annotated.name, "sample_annotated_worker");

    assert_eq!(registry.resolve("testns3", "class_worker").unwrap().max_in_progress, 5);
    assert_eq!(registry.resolve("testns3", "exception_step").unwrap().max_in_progress, 100);
    assert_eq!(registry.resolve("default", "waiting_worker").unwrap().max_in_progress, 10000);
}

#[tokio::test]
async fn every_sample_worker_answers_with_an_object() {
    let catalog = catalog();
    let input = json!({"test1": "value", "test2": 100, "test3": 100.0});

    for name in catalog.names() {
        if name == "exception_step" {
            continue;
        }
        let worker = catalog.get(&name).unwrap();
        let outcome = worker
            .execute(context(input.clone()))
            .await
            .unwrap_or_else(|e| panic!("{} failed: {}", name, e));
        assert!(
            matches!(outcome, StepOutcome::Completed(_)),
            "{} did not complete",
            name
        );
        assert!(!outcome.to_output().is_empty(), "{} returned an empty output", name);
    }
}

#[tokio::test]
async fn exception_step_always_fails_the_same_way() {
    let worker = catalog().get("exception_step").unwrap();
    for input in [json!({}), json!({"step": 1}), json!({"nested": {"a": [1, 2]}})] {
        let err = worker.execute(context(input)).await.unwrap_err();
        assert_eq!(err.message, "Intentional exception from exception_step");
        assert_eq!(err.code.as_deref(), Some(CUSTOM_ERROR_CODE));
        assert_eq!(err.data, Some(json!({"step": 2, "status": "failed"})));
    }
}
