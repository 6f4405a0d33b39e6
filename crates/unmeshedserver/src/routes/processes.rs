use crate::auth::SdkClient;
use crate::error::ApiError;
use crate::AppState;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use std::str::FromStr;
use unmeshedcore::{
    ApiCallType, JsonMap, ProcessRequestData, ProcessSearchRequest, ProcessStatus,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextQuery {
    #[serde(default)]
    include_steps: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerunQuery {
    process_id: u64,
    version: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonQuery {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallQuery {
    id: Option<String>,
    correlation_id: Option<String>,
    #[serde(default)]
    api_call_type: ApiCallType,
}

/// Search filters as sent on the query string; lists are comma separated
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchQuery {
    start_time_epoch: Option<i64>,
    end_time_epoch: Option<i64>,
    namespace: Option<String>,
    names: Option<String>,
    process_ids: Option<String>,
    correlation_ids: Option<String>,
    request_ids: Option<String>,
    statuses: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

fn split(list: &Option<String>) -> impl Iterator<Item = &str> {
    list.as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

impl SearchQuery {
    fn into_request(self) -> Result<ProcessSearchRequest, ApiError> {
        let process_ids = split(&self.process_ids)
            .map(|id| {
                u64::from_str(id)
                    .map_err(|_| ApiError::BadRequest(format!("Invalid process id '{}'", id)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let statuses = split(&self.statuses)
            .map(|s| {
                ProcessStatus::parse(s)
                    .ok_or_else(|| ApiError::BadRequest(format!("Invalid status '{}'", s)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let defaults = ProcessSearchRequest::default();
        Ok(ProcessSearchRequest {
            start_time_epoch: self.start_time_epoch,
            end_time_epoch: self.end_time_epoch,
            names: split(&self.names).map(String::from).collect(),
            correlation_ids: split(&self.correlation_ids).map(String::from).collect(),
            request_ids: split(&self.request_ids).map(String::from).collect(),
            namespace: self.namespace.filter(|ns| !ns.is_empty()),
            process_ids,
            statuses,
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        })
    }
}

async fn start(
    data: &AppState,
    request: ProcessRequestData,
    wait: bool,
) -> Result<HttpResponse, ApiError> {
    let process_id = data.engine().start_process(request)?;
    data.notify();
    let process = if wait {
        data.wait_for_terminal(process_id).await?
    } else {
        data.engine().process(process_id, false)?
    };
    Ok(HttpResponse::Ok().json(process))
}

#[post("/api/process/runSync")]
pub async fn run_sync(
    _client: SdkClient,
    data: web::Data<AppState>,
    request: web::Json<ProcessRequestData>,
) -> Result<HttpResponse, ApiError> {
    start(&data, request.into_inner(), true).await
}

#[post("/api/process/runAsync")]
pub async fn run_async(
    _client: SdkClient,
    data: web::Data<AppState>,
    request: web::Json<ProcessRequestData>,
) -> Result<HttpResponse, ApiError> {
    start(&data, request.into_inner(), false).await
}

#[get("/api/process/context/{process_id}")]
pub async fn process_context(
    _client: SdkClient,
    data: web::Data<AppState>,
    path: web::Path<u64>,
    query: web::Query<ContextQuery>,
) -> Result<HttpResponse, ApiError> {
    let process = data
        .engine()
        .process(path.into_inner(), query.include_steps)?;
    Ok(HttpResponse::Ok().json(process))
}

#[get("/api/process/stepContext/{step_id}")]
pub async fn step_context(
    _client: SdkClient,
    data: web::Data<AppState>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.engine().step(path.into_inner())?))
}

#[get("/api/stats/process/search")]
pub async fn search(
    _client: SdkClient,
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, ApiError> {
    let request = query.into_inner().into_request()?;
    Ok(HttpResponse::Ok().json(data.engine().search(&request)))
}

#[post("/api/process/rerun")]
pub async fn rerun(
    _client: SdkClient,
    data: web::Data<AppState>,
    query: web::Query<RerunQuery>,
) -> Result<HttpResponse, ApiError> {
    let process = data.engine().rerun(query.process_id, query.version)?;
    data.notify();
    Ok(HttpResponse::Ok().json(process))
}

#[post("/api/process/bulkTerminate")]
pub async fn bulk_terminate(
    _client: SdkClient,
    data: web::Data<AppState>,
    query: web::Query<ReasonQuery>,
    ids: web::Json<Vec<u64>>,
) -> Result<HttpResponse, ApiError> {
    let response = data.engine().terminate(&ids, query.reason.as_deref());
    data.notify();
    Ok(HttpResponse::Ok().json(response))
}

#[post("/api/process/bulkResume")]
pub async fn bulk_resume(
    _client: SdkClient,
    data: web::Data<AppState>,
    ids: web::Json<Vec<u64>>,
) -> Result<HttpResponse, ApiError> {
    let response = data.engine().resume(&ids);
    data.notify();
    Ok(HttpResponse::Ok().json(response))
}

#[post("/api/process/bulkReviewed")]
pub async fn bulk_reviewed(
    _client: SdkClient,
    data: web::Data<AppState>,
    query: web::Query<ReasonQuery>,
    ids: web::Json<Vec<u64>>,
) -> Result<HttpResponse, ApiError> {
    let response = data.engine().review(&ids, query.reason.as_deref());
    data.notify();
    Ok(HttpResponse::Ok().json(response))
}

/// Run the `default` process named after an API mapping endpoint
async fn call_mapping(
    data: &AppState,
    endpoint: String,
    query: ApiCallQuery,
    input: JsonMap,
) -> Result<HttpResponse, ApiError> {
    tracing::info!("API mapping call {} ({})", endpoint, query.api_call_type.as_str());
    let request = ProcessRequestData {
        namespace: "default".to_string(),
        name: endpoint,
        version: None,
        request_id: query.id,
        correlation_id: query.correlation_id,
        input,
    };
    let wait = query.api_call_type != ApiCallType::Async;
    start(data, request, wait).await
}

#[get("/api/call/{endpoint}")]
pub async fn api_call_get(
    _client: SdkClient,
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ApiCallQuery>,
) -> Result<HttpResponse, ApiError> {
    call_mapping(&data, path.into_inner(), query.into_inner(), JsonMap::new()).await
}

#[post("/api/call/{endpoint}")]
pub async fn api_call_post(
    _client: SdkClient,
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ApiCallQuery>,
    input: web::Json<JsonMap>,
) -> Result<HttpResponse, ApiError> {
    call_mapping(&data, path.into_inner(), query.into_inner(), input.into_inner()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_splits_lists() {
        let query = SearchQuery {
            names: Some("a, b,,c".to_string()),
            process_ids: Some("1,2".to_string()),
            statuses: Some("running,FAILED".to_string()),
            limit: Some(20),
            ..Default::default()
        };
        let request = query.into_request().unwrap();
        assert_eq!(request.names, vec!["a", "b", "c"]);
        assert_eq!(request.process_ids, vec![1, 2]);
        assert_eq!(request.statuses, vec![ProcessStatus::Running, ProcessStatus::Failed]);
        assert_eq!(request.limit, 20);
        assert_eq!(request.offset, 0);
    }

    #[test]
    fn search_query_rejects_bad_ids() {
        let query = SearchQuery {
            process_ids: Some("1,x".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.into_request(), Err(ApiError::BadRequest(_))));
    }
}
