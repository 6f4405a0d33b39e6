use crate::files::FileClient;
use crate::http::HttpClient;
use crate::poller::{Poller, PollerSettings};
use crate::process::{BulkAction, ProcessClient};
use crate::registry::{WorkerRegistration, WorkerRegistry};
use crate::scanner::{HandlerCatalog, WorkerScanner};
use crate::submit::ResultSubmitter;
use crate::work::{HttpWorkApi, WorkApi};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use unmeshedcore::{
    ApiCallType, ClientConfig, ClientEvent, DeleteFileRequest, DeleteFileResponse,
    DeleteProcessDefinitionsResponse, DownloadFileBase64Response, DownloadFileRequest, EventBus,
    JsonMap, ListFilesRequest, ListFilesResponse, ProcessActionResponse, ProcessData,
    ProcessDefinition, ProcessRequestData, ProcessSearchRequest, RegistryError, Result, StepData,
    UploadFileResponse,
};

/// How long shutdown waits for in-flight steps before giving up on them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Handles of a started poll-execute-submit loop
struct RunningLoop {
    registry: Arc<WorkerRegistry>,
    poll_shutdown: CancellationToken,
    submit_shutdown: CancellationToken,
    poller: JoinHandle<()>,
    submitter: JoinHandle<()>,
}

/// Entry point of the SDK
///
/// Owns the worker registry and the poll-execute-submit loop, and exposes the
/// process, definition and file calls of the engine.
pub struct UnmeshedClient {
    config: ClientConfig,
    processes: ProcessClient,
    files: FileClient,
    work_api: Arc<dyn WorkApi>,
    registry: WorkerRegistry,
    events: EventBus,
    running: Option<RunningLoop>,
}

impl UnmeshedClient {
    /// Validate the configuration and build a client; nothing is contacted yet
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = Arc::new(HttpClient::new(&config)?);
        tracing::info!(
            "Unmeshed client {} targeting {}",
            config.client_id,
            http.base_url()
        );

        Ok(Self {
            processes: ProcessClient::new(http.clone()),
            files: FileClient::new(http.clone()),
            work_api: Arc::new(HttpWorkApi::new(http)),
            registry: WorkerRegistry::new(),
            events: EventBus::default(),
            running: None,
            config,
        })
    }

    /// Replace the transport used by the poll-execute-submit loop
    pub fn with_work_api(mut self, work_api: Arc<dyn WorkApi>) -> Self {
        self.work_api = work_api;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Register one worker; only allowed before `start`
    pub fn register_worker(&mut self, registration: WorkerRegistration) -> Result<()> {
        if self.running.is_some() {
            return Err(RegistryError::AlreadyStarted.into());
        }
        self.registry.register(registration)?;
        Ok(())
    }

    /// Register every worker described by the manifests under `dir`
    pub fn register_decorated_workers(
        &mut self,
        dir: impl AsRef<Path>,
        catalog: &HandlerCatalog,
    ) -> Result<usize> {
        let registrations = WorkerScanner::scan(dir, catalog)?;
        let count = registrations.len();
        for registration in registrations {
            self.register_worker(registration)?;
        }
        tracing::info!("Registered {} workers from manifests", count);
        Ok(count)
    }

    /// Announce the registered queues and start polling
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(RegistryError::AlreadyStarted.into());
        }
        if !self.config.enable_results_submission {
            tracing::warn!("Results submission is disabled, not polling for work");
            return Ok(());
        }
        if self.registry.is_empty() {
            tracing::warn!("No workers registered, not polling for work");
            return Ok(());
        }

        let queues = self.registry.queue_names();
        self.work_api.register_queues(&queues).await?;
        tracing::info!("Registered {} queues with the engine", queues.len());

        let registry = Arc::new(self.registry.clone());
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let poll_shutdown = CancellationToken::new();
        let submit_shutdown = CancellationToken::new();

        let submitter = ResultSubmitter::new(
            self.work_api.clone(),
            self.config.response_submit_batch_size,
            self.config.submit_retry.clone(),
            self.events.clone(),
            results_rx,
            submit_shutdown.clone(),
        );
        let poller = Poller::new(
            self.work_api.clone(),
            registry.clone(),
            PollerSettings::from(&self.config),
            results_tx,
            self.events.clone(),
            poll_shutdown.clone(),
        );

        self.running = Some(RunningLoop {
            registry,
            poll_shutdown,
            submit_shutdown,
            submitter: tokio::spawn(submitter.run()),
            poller: tokio::spawn(poller.run()),
        });
        Ok(())
    }

    /// Stop polling, let in-flight steps finish and flush their results
    pub async fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        tracing::info!("Shutting down Unmeshed client");

        running.poll_shutdown.cancel();
        if let Err(e) = running.poller.await {
            tracing::error!("Poller task failed: {}", e);
        }

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            for worker in running.registry.workers() {
                let _ = worker
                    .permits()
                    .acquire_many(worker.max_in_progress as u32)
                    .await;
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                "Steps still running after {:?}, their results may be lost",
                SHUTDOWN_GRACE
            );
        }

        running.submit_shutdown.cancel();
        if let Err(e) = running.submitter.await {
            tracing::error!("Result submitter task failed: {}", e);
        }
        tracing::info!("Unmeshed client stopped");
    }

    // Process definitions

    pub async fn create_new_process_definition(
        &self,
        definition: &ProcessDefinition,
    ) -> Result<ProcessDefinition> {
        self.processes.create_definition(definition).await
    }

    pub async fn update_process_definition(
        &self,
        definition: &ProcessDefinition,
    ) -> Result<ProcessDefinition> {
        self.processes.update_definition(definition).await
    }

    pub async fn get_process_definition_latest_or_version(
        &self,
        namespace: &str,
        name: &str,
        version: Option<u32>,
    ) -> Result<ProcessDefinition> {
        self.processes.latest_or_version(namespace, name, version).await
    }

    pub async fn get_process_definition_versions(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<u32>> {
        self.processes.versions(namespace, name).await
    }

    pub async fn get_all_process_definitions(&self) -> Result<Vec<ProcessDefinition>> {
        self.processes.all_definitions().await
    }

    pub async fn delete_process_definitions(
        &self,
        definitions: &[ProcessDefinition],
        version_only: bool,
    ) -> Result<DeleteProcessDefinitionsResponse> {
        self.processes.delete_definitions(definitions, version_only).await
    }

    // Process executions

    pub async fn run_process_sync(&self, request: &ProcessRequestData) -> Result<ProcessData> {
        self.processes.run_sync(request).await
    }

    pub async fn run_process_async(&self, request: &ProcessRequestData) -> Result<ProcessData> {
        self.processes.run_async(request).await
    }

    pub async fn get_process_data(&self, process_id: u64, include_steps: bool) -> Result<ProcessData> {
        self.processes.process_data(process_id, include_steps).await
    }

    pub async fn get_step_data(&self, step_id: u64) -> Result<StepData> {
        self.processes.step_data(step_id).await
    }

    pub async fn search_process_executions(
        &self,
        request: &ProcessSearchRequest,
    ) -> Result<Vec<ProcessData>> {
        self.processes.search(request).await
    }

    pub async fn rerun(&self, process_id: u64, version: Option<u32>) -> Result<ProcessData> {
        self.processes.rerun(process_id, version).await
    }

    pub async fn bulk_terminate(
        &self,
        process_ids: &[u64],
        reason: Option<&str>,
    ) -> Result<ProcessActionResponse> {
        self.processes.bulk(BulkAction::Terminate, process_ids, reason).await
    }

    pub async fn bulk_resume(&self, process_ids: &[u64]) -> Result<ProcessActionResponse> {
        self.processes.bulk(BulkAction::Resume, process_ids, None).await
    }

    pub async fn bulk_reviewed(
        &self,
        process_ids: &[u64],
        reason: Option<&str>,
    ) -> Result<ProcessActionResponse> {
        self.processes.bulk(BulkAction::Reviewed, process_ids, reason).await
    }

    pub async fn invoke_api_mapping_get(
        &self,
        endpoint: &str,
        id: &str,
        correlation_id: &str,
        call_type: ApiCallType,
    ) -> Result<JsonValue> {
        self.processes
            .invoke_api_mapping_get(endpoint, id, correlation_id, call_type)
            .await
    }

    pub async fn invoke_api_mapping_post(
        &self,
        endpoint: &str,
        id: &str,
        correlation_id: &str,
        call_type: ApiCallType,
        input: &JsonMap,
    ) -> Result<JsonValue> {
        self.processes
            .invoke_api_mapping_post(endpoint, id, correlation_id, call_type, input)
            .await
    }

    // Files

    pub async fn view_files(&self, request: &ListFilesRequest) -> Result<ListFilesResponse> {
        self.files.list(request).await
    }

    pub async fn upload_file(
        &self,
        file_path: impl AsRef<Path>,
        folder_path: &str,
        custom_file_name: Option<&str>,
    ) -> Result<UploadFileResponse> {
        self.files.upload(file_path, folder_path, custom_file_name).await
    }

    pub async fn download_file(
        &self,
        request: &DownloadFileRequest,
        read_timeout: Option<Duration>,
    ) -> Result<Vec<u8>> {
        self.files.download(request, read_timeout).await
    }

    pub async fn download_file_base64(
        &self,
        request: &DownloadFileRequest,
    ) -> Result<DownloadFileBase64Response> {
        self.files.download_base64(request).await
    }

    pub async fn delete_file(&self, request: &DeleteFileRequest) -> Result<DeleteFileResponse> {
        self.files.delete(request).await
    }
}

impl Drop for UnmeshedClient {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.poll_shutdown.cancel();
            running.submit_shutdown.cancel();
        }
    }
}
