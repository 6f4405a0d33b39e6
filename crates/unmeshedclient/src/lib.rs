//! Client SDK for the Unmeshed orchestration engine
//! 
//! This crate talks to the engine over HTTP: it registers workers, runs the
//! poll-execute-submit loop that feeds them, and exposes the process,
//! definition and file calls.

mod client;
mod files;
mod http;
mod poller;
mod process;
mod registry;
mod scanner;
mod steps;
mod submit;
mod work;

pub use client::UnmeshedClient;
pub use files::FileClient;
pub use http::{bearer_token, HttpClient};
pub use poller::{into_response, Poller, PollerSettings};
pub use process::{BulkAction, ProcessClient};
pub use registry::{
    RegisteredWorker, WorkerRegistration, WorkerRegistry, DEFAULT_MAX_IN_PROGRESS,
    DEFAULT_NAMESPACE,
};
pub use scanner::{HandlerCatalog, WorkerManifest, WorkerScanner};
pub use steps::StepTemplates;
pub use submit::ResultSubmitter;
pub use work::{HttpWorkApi, WorkApi};

pub use unmeshedcore::*;
