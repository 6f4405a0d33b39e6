use crate::auth::SdkClient;
use crate::error::ApiError;
use crate::AppState;
use actix_web::{post, put, web, HttpResponse};
use unmeshedcore::{StepQueueNameData, StepSize, WorkResponse};

#[put("/api/clients/register")]
pub async fn register(
    client: SdkClient,
    data: web::Data<AppState>,
    queues: web::Json<Vec<StepQueueNameData>>,
) -> Result<HttpResponse, ApiError> {
    tracing::info!("Client {} registered {} queues", client.client_id, queues.len());
    let mut engine = data.engine();
    engine.register_queues(&queues);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "registered": queues.len(),
        "total": engine.registered_queues(),
    })))
}

#[post("/api/clients/poll")]
pub async fn poll(
    _client: SdkClient,
    data: web::Data<AppState>,
    sizes: web::Json<Vec<StepSize>>,
) -> Result<HttpResponse, ApiError> {
    let work = data.engine().poll(&sizes);
    Ok(HttpResponse::Ok().json(work))
}

#[post("/api/clients/bulkResults")]
pub async fn bulk_results(
    _client: SdkClient,
    data: web::Data<AppState>,
    results: web::Json<Vec<WorkResponse>>,
) -> Result<HttpResponse, ApiError> {
    let accepted = data.engine().submit_results(results.into_inner());
    data.notify();
    Ok(HttpResponse::Ok().json(serde_json::json!({ "accepted": accepted })))
}
