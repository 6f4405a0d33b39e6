//! Sample worker library
//! 
//! The workers the demo flows serve, the catalog that manifests bind
//! against, and the manifests themselves under `manifests/`.

mod annotated;
mod failing;
mod hello;
mod lists;
mod waiting;

pub use annotated::{sample_annotated_worker, task_second_worker, ClassWorker, SampleResponse};
pub use failing::{exception_step, CUSTOM_ERROR_CODE};
pub use hello::{sample_async_function, sample_function, task_hello_world1, task_hello_world2};
pub use lists::list_no_test;
pub use waiting::{async_waiting_function, waiting_function};

use std::path::PathBuf;
use unmeshedclient::{HandlerCatalog, WorkerRegistration, WorkerRegistry};
use unmeshedcore::{AsyncFnWorker, FnWorker, RegistryError};

/// Every sample handler, by the name manifests use for it
pub fn catalog() -> HandlerCatalog {
    let mut catalog = HandlerCatalog::new();
    catalog.insert("task_hello_world1", FnWorker::new(task_hello_world1));
    catalog.insert("sample_function", FnWorker::new(sample_function));
    catalog.insert("sample_async_function", AsyncFnWorker::new(sample_async_function));
    catalog.insert("task_hello_world2", AsyncFnWorker::new(task_hello_world2));
    catalog.insert("waiting_function", FnWorker::new(waiting_function));
    catalog.insert("async_waiting_function", AsyncFnWorker::new(async_waiting_function));
    catalog.insert("list_no_test", FnWorker::new(list_no_test));
    catalog.insert("sample_annotated_worker", FnWorker::typed(sample_annotated_worker));
    catalog.insert("task_second_worker", FnWorker::typed(task_second_worker));
    catalog.insert("class_worker", ClassWorker);
    catalog.insert("exception_step", FnWorker::new(exception_step));
    catalog
}

/// Points discovery at manifests outside the source tree
pub const MANIFESTS_DIR_ENV: &str = "UNMESHED_MANIFESTS_DIR";

/// Manifests for the workers registered by discovery
pub fn manifests_dir() -> PathBuf {
    manifests_dir_or(std::env::var_os(MANIFESTS_DIR_ENV).map(PathBuf::from))
}

/// The given directory, or the manifests shipped with this crate
pub fn manifests_dir_or(dir: Option<PathBuf>) -> PathBuf {
    dir.filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("manifests"))
}

/// Workers registered explicitly by the sample flow
pub fn registrations() -> Vec<WorkerRegistration> {
    vec![
        WorkerRegistration::new("worker3", AsyncFnWorker::new(task_hello_world2))
            .with_max_in_progress(3000),
        WorkerRegistration::new("worker4", AsyncFnWorker::new(task_hello_world2))
            .with_max_in_progress(1000),
        WorkerRegistration::new("waiting_worker", AsyncFnWorker::new(async_waiting_function))
            .with_max_in_progress(10000),
        WorkerRegistration::new("exception_step", FnWorker::new(exception_step))
            .with_namespace("testns3")
            .with_max_in_progress(100),
    ]
}

/// Register the explicit sample workers with a registry
pub fn register_all(registry: &mut WorkerRegistry) -> Result<(), RegistryError> {
    for registration in registrations() {
        registry.register(registration)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifests_dir_can_be_overridden() {
        assert_eq!(manifests_dir_or(Some(PathBuf::from("/srv/manifests"))), PathBuf::from("/srv/manifests"));
        let bundled = manifests_dir_or(None);
        assert!(bundled.ends_with("manifests"));
        assert!(bundled.is_dir());
        assert_eq!(manifests_dir_or(Some(PathBuf::new())), bundled);
    }
}
