use actix_web::{get, web, HttpResponse, Responder};

mod clients;
mod definitions;
mod files;
mod processes;

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "unmeshed-dev-engine"
    }))
}

/// Register every route of the engine
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(definitions::create_definition)
        .service(definitions::update_definition)
        .service(definitions::all_definitions)
        .service(definitions::delete_definitions)
        .service(definitions::latest_or_version)
        .service(definitions::versions)
        .service(processes::run_sync)
        .service(processes::run_async)
        .service(processes::process_context)
        .service(processes::step_context)
        .service(processes::search)
        .service(processes::rerun)
        .service(processes::bulk_terminate)
        .service(processes::bulk_resume)
        .service(processes::bulk_reviewed)
        .service(processes::api_call_get)
        .service(processes::api_call_post)
        .service(clients::register)
        .service(clients::poll)
        .service(clients::bulk_results)
        .service(files::list)
        .service(files::upload)
        .service(files::download)
        .service(files::download_base64)
        .service(files::delete);
}
