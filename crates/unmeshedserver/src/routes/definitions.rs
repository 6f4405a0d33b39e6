use crate::auth::SdkClient;
use crate::error::ApiError;
use crate::AppState;
use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;
use unmeshedcore::{DeleteProcessDefinitionsResponse, ProcessDefinition};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionQuery {
    version: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    #[serde(default)]
    version_only: bool,
}

#[post("/api/processDefinitions")]
pub async fn create_definition(
    _client: SdkClient,
    data: web::Data<AppState>,
    definition: web::Json<ProcessDefinition>,
) -> Result<HttpResponse, ApiError> {
    let created = data.engine().create_definition(definition.into_inner())?;
    Ok(HttpResponse::Created().json(created))
}

#[put("/api/processDefinitions")]
pub async fn update_definition(
    _client: SdkClient,
    data: web::Data<AppState>,
    definition: web::Json<ProcessDefinition>,
) -> Result<HttpResponse, ApiError> {
    let updated = data.engine().update_definition(definition.into_inner())?;
    Ok(HttpResponse::Ok().json(updated))
}

#[get("/api/processDefinitions")]
pub async fn all_definitions(
    _client: SdkClient,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.engine().all_definitions()))
}

#[delete("/api/processDefinitions")]
pub async fn delete_definitions(
    _client: SdkClient,
    data: web::Data<AppState>,
    query: web::Query<DeleteQuery>,
    definitions: web::Json<Vec<ProcessDefinition>>,
) -> Result<HttpResponse, ApiError> {
    let deleted = data
        .engine()
        .delete_definitions(&definitions, query.version_only);
    Ok(HttpResponse::Ok().json(DeleteProcessDefinitionsResponse { deleted }))
}

#[get("/api/processDefinitions/latest-or-version/{namespace}/{name}")]
pub async fn latest_or_version(
    _client: SdkClient,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<VersionQuery>,
) -> Result<HttpResponse, ApiError> {
    let (namespace, name) = path.into_inner();
    let definition = data.engine().definition(&namespace, &name, query.version)?;
    Ok(HttpResponse::Ok().json(definition))
}

#[get("/api/processDefinitions/versions/{namespace}/{name}")]
pub async fn versions(
    _client: SdkClient,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (namespace, name) = path.into_inner();
    Ok(HttpResponse::Ok().json(data.engine().versions(&namespace, &name)?))
}
