//! Core abstractions for the Unmeshed client SDK
//! 
//! This crate provides the wire types, client configuration, error types and
//! the `Worker` trait that the client, the sample workers and the development
//! engine all share. It performs no I/O beyond reading configuration files.

mod config;
mod error;
mod events;
mod files;
mod process;
mod work;
mod worker;

pub use config::{ClientConfig, RetryPolicy};
pub use error::{ConfigError, RegistryError, StepError, UnmeshedError};
pub use events::{ClientEvent, EventBus};
pub use files::{
    DeleteFileRequest, DeleteFileResponse, DownloadFileBase64Response, DownloadFileRequest,
    FileEntry, ListFilesRequest, ListFilesResponse, UploadFileResponse,
};
pub use process::{
    ApiCallType, DeleteProcessDefinitionsResponse, ProcessActionDetail, ProcessActionResponse,
    ProcessData, ProcessDefinition, ProcessRequestData, ProcessSearchRequest, ProcessStatus,
    ProcessType, StepData, StepDefinition, StepId, StepStatus, StepType,
};
pub use work::{StepQueueNameData, StepSize, WorkRequest, WorkResponse};
pub use worker::{AsyncFnWorker, FnWorker, StepOutcome, WorkContext, Worker};

/// JSON object used for step and process inputs/outputs
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, UnmeshedError>;
