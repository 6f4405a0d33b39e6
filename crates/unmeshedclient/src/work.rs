use crate::http::HttpClient;
use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;
use unmeshedcore::{Result, StepQueueNameData, StepSize, WorkRequest, WorkResponse};

/// Engine calls used by the poll-execute-submit loop
#[async_trait]
pub trait WorkApi: Send + Sync {
    /// Announce the queues this client serves
    async fn register_queues(&self, queues: &[StepQueueNameData]) -> Result<()>;

    /// Fetch up to `size` pending items per queue
    async fn poll(&self, sizes: &[StepSize]) -> Result<Vec<WorkRequest>>;

    /// Report a batch of step results
    async fn submit_results(&self, results: &[WorkResponse]) -> Result<()>;
}

/// `WorkApi` over HTTP
pub struct HttpWorkApi {
    http: Arc<HttpClient>,
}

impl HttpWorkApi {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl WorkApi for HttpWorkApi {
    async fn register_queues(&self, queues: &[StepQueueNameData]) -> Result<()> {
        let request = self
            .http
            .request(Method::PUT, &["api", "clients", "register"])
            .json(queues);
        self.http.send_empty(request).await
    }

    async fn poll(&self, sizes: &[StepSize]) -> Result<Vec<WorkRequest>> {
        self.http.post(&["api", "clients", "poll"], &[], sizes).await
    }

    async fn submit_results(&self, results: &[WorkResponse]) -> Result<()> {
        let request = self
            .http
            .request(Method::POST, &["api", "clients", "bulkResults"])
            .json(results);
        self.http.send_empty(request).await
    }
}

/// In-memory `WorkApi` used by unit tests
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use unmeshedcore::UnmeshedError;

    #[derive(Default)]
    pub struct MemoryWorkApi {
        pending: Mutex<VecDeque<WorkRequest>>,
        registered: Mutex<Vec<StepQueueNameData>>,
        polled: Mutex<Vec<Vec<StepSize>>>,
        submitted: Mutex<Vec<Vec<WorkResponse>>>,
        failing_submits: AtomicUsize,
        over_deliver: bool,
    }

    impl MemoryWorkApi {
        pub fn new() -> Self {
            Self::default()
        }

        /// Hand out every pending item regardless of the requested sizes
        pub fn over_delivering(mut self) -> Self {
            self.over_deliver = true;
            self
        }

        /// Fail the next `n` submissions with a 503
        pub fn fail_next_submits(&self, n: usize) {
            self.failing_submits.store(n, Ordering::SeqCst);
        }

        pub fn enqueue(&self, request: WorkRequest) {
            self.pending.lock().unwrap().push_back(request);
        }

        pub fn registered(&self) -> Vec<StepQueueNameData> {
            self.registered.lock().unwrap().clone()
        }

        pub fn polled_sizes(&self) -> Vec<Vec<StepSize>> {
            self.polled.lock().unwrap().clone()
        }

        pub fn submitted_batches(&self) -> Vec<Vec<WorkResponse>> {
            self.submitted.lock().unwrap().clone()
        }

        pub fn submitted(&self) -> Vec<WorkResponse> {
            self.submitted_batches().into_iter().flatten().collect()
        }
    }

    #[async_trait]
    impl WorkApi for MemoryWorkApi {
        async fn register_queues(&self, queues: &[StepQueueNameData]) -> Result<()> {
            self.registered.lock().unwrap().extend_from_slice(queues);
            Ok(())
        }

        async fn poll(&self, sizes: &[StepSize]) -> Result<Vec<WorkRequest>> {
            self.polled.lock().unwrap().push(sizes.to_vec());
            let mut pending = self.pending.lock().unwrap();
            if self.over_deliver {
                return Ok(pending.drain(..).collect());
            }

            let mut out = Vec::new();
            for size in sizes {
                let queue = &size.step_queue_name_data;
                let mut taken = 0;
                let mut rest = VecDeque::new();
                while let Some(request) = pending.pop_front() {
                    if taken < size.size
                        && request.step_namespace == queue.namespace
                        && request.step_name == queue.name
                    {
                        taken += 1;
                        out.push(request);
                    } else {
                        rest.push_back(request);
                    }
                }
                *pending = rest;
            }
            Ok(out)
        }

        async fn submit_results(&self, results: &[WorkResponse]) -> Result<()> {
            let failing = self.failing_submits.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_submits.store(failing - 1, Ordering::SeqCst);
                return Err(UnmeshedError::Api {
                    status: 503,
                    message: "engine unavailable".to_string(),
                });
            }
            self.submitted.lock().unwrap().push(results.to_vec());
            Ok(())
        }
    }
}
