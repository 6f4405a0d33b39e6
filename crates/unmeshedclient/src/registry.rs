use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use unmeshedcore::{RegistryError, StepQueueNameData, Worker};

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_MAX_IN_PROGRESS: usize = 10;

/// Everything needed to register one worker
#[derive(Clone)]
pub struct WorkerRegistration {
    pub name: String,
    pub namespace: String,
    /// Queues (step names) served; empty means just `name`
    pub worker_queue_names: Vec<String>,
    pub max_in_progress: usize,
    pub handler: Arc<dyn Worker>,
}

impl WorkerRegistration {
    pub fn new(name: impl Into<String>, handler: impl Worker + 'static) -> Self {
        Self::from_handler(name, Arc::new(handler))
    }

    pub fn from_handler(name: impl Into<String>, handler: Arc<dyn Worker>) -> Self {
        Self {
            name: name.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            worker_queue_names: Vec::new(),
            max_in_progress: DEFAULT_MAX_IN_PROGRESS,
            handler,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_queue_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.worker_queue_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_in_progress(mut self, max_in_progress: usize) -> Self {
        self.max_in_progress = max_in_progress;
        self
    }

    /// Queue names actually served
    pub fn queue_names(&self) -> Vec<String> {
        if self.worker_queue_names.is_empty() {
            vec![self.name.clone()]
        } else {
            self.worker_queue_names.clone()
        }
    }
}

impl std::fmt::Debug for WorkerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistration")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("worker_queue_names", &self.worker_queue_names)
            .field("max_in_progress", &self.max_in_progress)
            .finish()
    }
}

/// A registered worker and its concurrency budget
pub struct RegisteredWorker {
    pub name: String,
    pub namespace: String,
    pub queue_names: Vec<String>,
    pub max_in_progress: usize,
    handler: Arc<dyn Worker>,
    permits: Arc<Semaphore>,
}

impl RegisteredWorker {
    pub fn handler(&self) -> Arc<dyn Worker> {
        self.handler.clone()
    }

    /// One permit per step allowed in progress
    pub fn permits(&self) -> Arc<Semaphore> {
        self.permits.clone()
    }

    pub fn in_progress(&self) -> usize {
        self.max_in_progress
            .saturating_sub(self.permits.available_permits())
    }
}

impl std::fmt::Debug for RegisteredWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredWorker")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("queue_names", &self.queue_names)
            .field("max_in_progress", &self.max_in_progress)
            .field("in_progress", &self.in_progress())
            .finish()
    }
}

/// Registry of workers keyed by the queues they serve
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: Vec<Arc<RegisteredWorker>>,
    by_queue: HashMap<(String, String), usize>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker; every (namespace, queue) pair must be free
    pub fn register(
        &mut self,
        registration: WorkerRegistration,
    ) -> Result<Arc<RegisteredWorker>, RegistryError> {
        if registration.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if registration.max_in_progress == 0 {
            return Err(RegistryError::ZeroCapacity(registration.name));
        }

        let queue_names = registration.queue_names();
        for queue in &queue_names {
            let key = (registration.namespace.clone(), queue.clone());
            if let Some(&owner) = self.by_queue.get(&key) {
                return Err(RegistryError::DuplicateQueue {
                    namespace: key.0,
                    queue: key.1,
                    owner: self.workers[owner].name.clone(),
                });
            }
        }

        tracing::info!(
            "Registering worker {}/{} on queues {:?} (max in progress {})",
            registration.namespace,
            registration.name,
            queue_names,
            registration.max_in_progress
        );

        let index = self.workers.len();
        for queue in &queue_names {
            self.by_queue
                .insert((registration.namespace.clone(), queue.clone()), index);
        }

        let worker = Arc::new(RegisteredWorker {
            permits: Arc::new(Semaphore::new(registration.max_in_progress)),
            name: registration.name,
            namespace: registration.namespace,
            queue_names,
            max_in_progress: registration.max_in_progress,
            handler: registration.handler,
        });
        self.workers.push(worker.clone());
        Ok(worker)
    }

    /// Worker serving a queue
    pub fn resolve(&self, namespace: &str, queue: &str) -> Option<&Arc<RegisteredWorker>> {
        self.position(namespace, queue).map(|index| &self.workers[index])
    }

    /// Registration index of the worker serving a queue
    pub fn position(&self, namespace: &str, queue: &str) -> Option<usize> {
        self.by_queue
            .get(&(namespace.to_string(), queue.to_string()))
            .copied()
    }

    pub fn workers(&self) -> &[Arc<RegisteredWorker>] {
        &self.workers
    }

    /// Every queue served, in registration order
    pub fn queue_names(&self) -> Vec<StepQueueNameData> {
        self.workers
            .iter()
            .flat_map(|w| {
                w.queue_names
                    .iter()
                    .map(|q| StepQueueNameData::worker(w.namespace.clone(), q.clone()))
            })
            .collect()
    }

    /// `namespace/name` of every registered worker
    pub fn list(&self) -> Vec<String> {
        self.workers
            .iter()
            .map(|w| format!("{}/{}", w.namespace, w.name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use unmeshedcore::FnWorker;

    fn echo() -> FnWorker {
        FnWorker::new(|input| Ok(json!(input)))
    }

    #[test]
    fn queue_names_default_to_worker_name() {
        let mut registry = WorkerRegistry::new();
        registry
            .register(WorkerRegistration::new("worker3", echo()))
            .unwrap();

        assert!(registry.resolve("default", "worker3").is_some());
        assert_eq!(
            registry.queue_names(),
            vec![StepQueueNameData::worker("default", "worker3")]
        );
    }

    #[test]
    fn worker_serves_all_listed_queues() {
        let mut registry = WorkerRegistry::new();
        registry
            .register(
                WorkerRegistration::new("list_no_test", echo())
                    .with_namespace("testns3")
                    .with_queue_names(["res_list", "res_list2"])
                    .with_max_in_progress(100),
            )
            .unwrap();

        let a = registry.resolve("testns3", "res_list").unwrap();
        let b = registry.resolve("testns3", "res_list2").unwrap();
        assert!(Arc::ptr_eq(a, b));
        assert!(registry.resolve("default", "res_list").is_none());
        assert!(registry.resolve("testns3", "list_no_test").is_none());
        assert_eq!(a.permits().available_permits(), 100);
    }

    #[test]
    fn duplicate_queue_is_rejected() {
        let mut registry = WorkerRegistry::new();
        registry
            .register(WorkerRegistration::new("worker3", echo()))
            .unwrap();

        let err = registry
            .register(WorkerRegistration::new("other", echo()).with_queue_names(["worker3"]))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateQueue {
                namespace: "default".to_string(),
                queue: "worker3".to_string(),
                owner: "worker3".to_string(),
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_queue_in_other_namespace_is_allowed() {
        let mut registry = WorkerRegistry::new();
        registry
            .register(WorkerRegistration::new("worker3", echo()))
            .unwrap();
        registry
            .register(WorkerRegistration::new("worker3", echo()).with_namespace("testns3"))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn invalid_registrations() {
        let mut registry = WorkerRegistry::new();
        assert_eq!(
            registry
                .register(WorkerRegistration::new(" ", echo()))
                .unwrap_err(),
            RegistryError::EmptyName
        );
        assert_eq!(
            registry
                .register(WorkerRegistration::new("w", echo()).with_max_in_progress(0))
                .unwrap_err(),
            RegistryError::ZeroCapacity("w".to_string())
        );
    }
}
