use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};
use unmeshedserver::{configure, AppState};

fn token() -> String {
    format!("Bearer client.sdk.test-client.{}", "0".repeat(64))
}

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new()))
                .configure(configure),
        )
        .await
    };
}

#[actix_web::test]
async fn health_needs_no_token() {
    let app = app!();
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn api_rejects_missing_token() {
    let app = app!();
    let req = test::TestRequest::get()
        .uri("/api/processDefinitions")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("token"));
}

#[actix_web::test]
async fn definition_lifecycle() {
    let app = app!();
    let definition = json!({
        "namespace": "default",
        "name": "test-process",
        "type": "API_ORCHESTRATION",
        "steps": [{"name": "noop1", "ref": "noop1", "type": "NOOP", "input": {"key1": "val1"}}]
    });

    let req = test::TestRequest::post()
        .uri("/api/processDefinitions")
        .insert_header(("Authorization", token()))
        .set_json(&definition)
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(created["version"], 1);

    let req = test::TestRequest::put()
        .uri("/api/processDefinitions")
        .insert_header(("Authorization", token()))
        .set_json(&definition)
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["version"], 2);

    let req = test::TestRequest::get()
        .uri("/api/processDefinitions/versions/default/test-process")
        .insert_header(("Authorization", token()))
        .to_request();
    let versions: Vec<u32> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(versions, vec![1, 2]);

    let req = test::TestRequest::get()
        .uri("/api/processDefinitions/latest-or-version/default/test-process?version=1")
        .insert_header(("Authorization", token()))
        .to_request();
    let v1: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v1["version"], 1);

    let req = test::TestRequest::delete()
        .uri("/api/processDefinitions?versionOnly=false")
        .insert_header(("Authorization", token()))
        .set_json(json!([definition]))
        .to_request();
    let deleted: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(deleted["deleted"], 2);

    let req = test::TestRequest::get()
        .uri("/api/processDefinitions/latest-or-version/default/test-process")
        .insert_header(("Authorization", token()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn noop_process_runs_synchronously() {
    let app = app!();
    let definition = json!({
        "namespace": "default",
        "name": "test_process_endpoint",
        "steps": [{"name": "noop1", "ref": "noop1", "type": "NOOP"}]
    });
    let req = test::TestRequest::post()
        .uri("/api/processDefinitions")
        .insert_header(("Authorization", token()))
        .set_json(&definition)
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/call/test_process_endpoint?id=req_id--1&correlationId=correl_id--1&apiCallType=SYNC")
        .insert_header(("Authorization", token()))
        .set_json(json!({"test": "value"}))
        .to_request();
    let process: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(process["status"], "COMPLETED");
    assert_eq!(process["output"]["test"], "value");
    assert_eq!(process["correlationId"], "correl_id--1");

    let req = test::TestRequest::get()
        .uri("/api/stats/process/search?names=test_process_endpoint&limit=5")
        .insert_header(("Authorization", token()))
        .to_request();
    let found: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(found.len(), 1);
}

#[actix_web::test]
async fn worker_protocol_round_trip() {
    let app = app!();
    let definition = json!({
        "namespace": "default",
        "name": "worker_process",
        "steps": [{"name": "worker3", "ref": "w", "type": "WORKER"}]
    });
    let req = test::TestRequest::post()
        .uri("/api/processDefinitions")
        .insert_header(("Authorization", token()))
        .set_json(&definition)
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/process/runAsync?clientId=test-client")
        .insert_header(("Authorization", token()))
        .set_json(json!({"namespace": "default", "name": "worker_process", "input": {"a": 1}}))
        .to_request();
    let started: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(started["status"], "RUNNING");
    let process_id = started["processId"].as_u64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/clients/poll")
        .insert_header(("Authorization", token()))
        .set_json(json!([{"stepQueueNameData": {"orgId": 0, "namespace": "default", "stepType": "WORKER", "name": "worker3"}, "size": 5}]))
        .to_request();
    let work: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(work.len(), 1);
    assert_eq!(work[0]["inputParam"]["a"], 1);

    let req = test::TestRequest::post()
        .uri("/api/clients/bulkResults")
        .insert_header(("Authorization", token()))
        .set_json(json!([{
            "processId": process_id,
            "stepId": work[0]["stepId"],
            "stepExecutionId": work[0]["stepExecutionId"],
            "runCount": 1,
            "output": {"done": true},
            "status": "COMPLETED",
            "startedAt": 0
        }]))
        .to_request();
    let accepted: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(accepted["accepted"], 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/process/context/{}?includeSteps=true", process_id))
        .insert_header(("Authorization", token()))
        .to_request();
    let process: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(process["status"], "COMPLETED");
    assert_eq!(process["output"]["done"], true);
    assert_eq!(process["stepRecords"].as_array().unwrap().len(), 1);
}
