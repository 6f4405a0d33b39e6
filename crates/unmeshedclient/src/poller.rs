//! Poll-execute-submit loop.
//!
//! Every tick the poller asks the engine for as many items as the registered
//! workers have free capacity, runs each item in its own task under the
//! worker's semaphore, and hands the outcome to the result submitter.

use crate::registry::{RegisteredWorker, WorkerRegistry};
use crate::work::WorkApi;
use chrono::Utc;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use unmeshedcore::{
    ClientConfig, ClientEvent, EventBus, JsonMap, Result, StepError, StepOutcome, StepQueueNameData,
    StepSize, StepStatus, WorkContext, WorkRequest, WorkResponse,
};

/// Poller tuning taken from the client configuration
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    pub work_request_batch_size: u32,
    pub step_timeout: Duration,
    pub max_threads_count: usize,
}

impl From<&ClientConfig> for PollerSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            initial_delay: config.initial_delay(),
            poll_interval: config.poll_interval(),
            work_request_batch_size: config.work_request_batch_size,
            step_timeout: config.step_timeout(),
            max_threads_count: config.max_threads_count,
        }
    }
}

pub struct Poller {
    api: Arc<dyn WorkApi>,
    registry: Arc<WorkerRegistry>,
    settings: PollerSettings,
    results: mpsc::UnboundedSender<WorkResponse>,
    events: EventBus,
    blocking_slots: Arc<Semaphore>,
    shutdown: CancellationToken,
    /// Items received while their worker had no free permit, by worker position
    backlog: HashMap<usize, VecDeque<WorkRequest>>,
}

impl Poller {
    pub fn new(
        api: Arc<dyn WorkApi>,
        registry: Arc<WorkerRegistry>,
        settings: PollerSettings,
        results: mpsc::UnboundedSender<WorkResponse>,
        events: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        let blocking_slots = Arc::new(Semaphore::new(settings.max_threads_count.max(1)));
        Self {
            api,
            registry,
            settings,
            results,
            events,
            blocking_slots,
            shutdown,
            backlog: HashMap::new(),
        }
    }

    /// Poll until the shutdown token is cancelled
    pub async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep(self.settings.initial_delay) => {}
        }

        let queues = self.registry.queue_names().len();
        tracing::info!("Poller started for {} queues", queues);
        self.events.emit(ClientEvent::PollerStarted {
            queues,
            timestamp: Utc::now(),
        });

        // interval() panics on a zero period
        let mut ticker = interval(self.settings.poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("Poller shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!("Poll failed: {}", e);
                    }
                }
            }
        }

        let handed_back = self.release_backlog();
        if handed_back > 0 {
            tracing::info!("Handed {} backlogged work items back to the engine", handed_back);
        }
        self.events.emit(ClientEvent::PollerStopped {
            timestamp: Utc::now(),
        });
    }

    /// One poll round; returns the number of items received
    pub async fn poll_once(&mut self) -> Result<usize> {
        self.drain_backlog();

        let sizes = self.poll_sizes();
        if sizes.is_empty() {
            return Ok(0);
        }

        let work = self.api.poll(&sizes).await?;
        let count = work.len();
        if count > 0 {
            tracing::debug!("Received {} work items", count);
            self.events.emit(ClientEvent::WorkReceived {
                count,
                timestamp: Utc::now(),
            });
        }

        for request in work {
            self.dispatch(request);
        }
        Ok(count)
    }

    /// Requested sizes per queue, bounded by each worker's free permits
    pub fn poll_sizes(&self) -> Vec<StepSize> {
        let batch = self.settings.work_request_batch_size as usize;
        let mut sizes = Vec::new();

        for (index, worker) in self.registry.workers().iter().enumerate() {
            let backlogged = self.backlog.get(&index).map(VecDeque::len).unwrap_or(0);
            let mut free = worker
                .permits()
                .available_permits()
                .saturating_sub(backlogged);

            let queue_count = worker.queue_names.len();
            for (i, queue) in worker.queue_names.iter().enumerate() {
                if free == 0 {
                    break;
                }
                let remaining_queues = queue_count - i;
                let share = free.div_ceil(remaining_queues).min(batch);
                free -= share;
                sizes.push(StepSize {
                    step_queue_name_data: StepQueueNameData::worker(
                        worker.namespace.clone(),
                        queue.clone(),
                    ),
                    size: share as u32,
                });
            }
        }

        sizes
    }

    /// Answer every backlogged item as still running so the engine requeues it
    pub fn release_backlog(&mut self) -> usize {
        let now = Utc::now().timestamp_millis();
        let mut released = 0;
        for (_, queue) in self.backlog.drain() {
            for request in queue {
                let outcome = StepOutcome::KeepRunning {
                    output: JsonMap::new(),
                    reschedule_after_seconds: 0,
                };
                report(&self.results, into_response(&request, now, Ok(outcome)));
                released += 1;
            }
        }
        released
    }

    fn drain_backlog(&mut self) {
        let registry = self.registry.clone();
        let mut ready = Vec::new();

        for (index, queue) in self.backlog.iter_mut() {
            let worker = &registry.workers()[*index];
            while !queue.is_empty() {
                let Ok(permit) = worker.permits().try_acquire_owned() else {
                    break;
                };
                if let Some(request) = queue.pop_front() {
                    ready.push((worker.clone(), request, permit));
                }
            }
        }
        self.backlog.retain(|_, queue| !queue.is_empty());

        for (worker, request, permit) in ready {
            self.spawn_execution(worker, request, permit);
        }
    }

    fn dispatch(&mut self, request: WorkRequest) {
        let Some(index) = self
            .registry
            .position(&request.step_namespace, &request.step_name)
        else {
            tracing::warn!(
                "No worker registered for {}/{}",
                request.step_namespace,
                request.step_name
            );
            let error = StepError::new(format!(
                "No worker registered for {}/{}",
                request.step_namespace, request.step_name
            ));
            let response = into_response(&request, Utc::now().timestamp_millis(), Err(error));
            report(&self.results, response);
            return;
        };

        let worker = self.registry.workers()[index].clone();
        match worker.permits().try_acquire_owned() {
            Ok(permit) => self.spawn_execution(worker, request, permit),
            Err(_) => {
                tracing::debug!(
                    "Worker {} is at capacity, backlogging step {}",
                    worker.name,
                    request.step_id
                );
                self.backlog.entry(index).or_default().push_back(request);
            }
        }
    }

    fn spawn_execution(
        &self,
        worker: Arc<RegisteredWorker>,
        request: WorkRequest,
        permit: OwnedSemaphorePermit,
    ) {
        let ctx = WorkContext::new(request.clone())
            .with_blocking_slots(self.blocking_slots.clone())
            .with_cancellation(self.shutdown.child_token());
        let step_cancel = ctx.cancellation.clone();
        let handler = worker.handler();
        let step_timeout = self.settings.step_timeout;
        let results = self.results.clone();
        let events = self.events.clone();
        let worker_name = worker.name.clone();

        events.emit(ClientEvent::StepStarted {
            process_id: request.process_id,
            step_id: request.step_id,
            worker: worker_name.clone(),
            timestamp: Utc::now(),
        });

        tokio::spawn(async move {
            let _permit = permit;
            let started_at = Utc::now().timestamp_millis();
            let start = Instant::now();

            let execution = AssertUnwindSafe(handler.execute(ctx)).catch_unwind();
            let result = match timeout(step_timeout, execution).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(StepError::new("Worker panicked")),
                Err(_) => {
                    step_cancel.cancel();
                    Err(StepError::new(format!(
                        "step timed out after {}ms",
                        step_timeout.as_millis()
                    )))
                }
            };

            let duration_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(_) => {
                    tracing::debug!("Step {} on {} completed in {}ms", request.step_id, worker_name, duration_ms);
                    events.emit(ClientEvent::StepCompleted {
                        process_id: request.process_id,
                        step_id: request.step_id,
                        worker: worker_name,
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    tracing::warn!("Step {} on {} failed: {}", request.step_id, worker_name, e);
                    events.emit(ClientEvent::StepFailed {
                        process_id: request.process_id,
                        step_id: request.step_id,
                        worker: worker_name,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }

            report(&results, into_response(&request, started_at, result));
        });
    }
}

/// Queue a response for the submitter
fn report(results: &mpsc::UnboundedSender<WorkResponse>, response: WorkResponse) {
    let step_id = response.step_id;
    if results.send(response).is_err() {
        tracing::warn!("Result for step {} dropped: submitter stopped", step_id);
    }
}

/// Map a worker result onto the wire response
pub fn into_response(
    request: &WorkRequest,
    started_at: i64,
    result: std::result::Result<StepOutcome, StepError>,
) -> WorkResponse {
    let mut response = WorkResponse::for_request(request, started_at);
    match result {
        Ok(outcome) => {
            response.output = outcome.to_output();
            match outcome {
                StepOutcome::Completed(_) => response.status = StepStatus::Completed,
                StepOutcome::KeepRunning {
                    reschedule_after_seconds,
                    ..
                } => {
                    response.status = StepStatus::Running;
                    response.reschedule_after_seconds = Some(reschedule_after_seconds);
                }
            }
        }
        Err(error) => {
            response.status = StepStatus::Failed;
            response.output = error.to_output();
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WorkerRegistration;
    use crate::work::memory::MemoryWorkApi;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use unmeshedcore::{AsyncFnWorker, FnWorker, JsonMap, Worker};

    fn settings() -> PollerSettings {
        PollerSettings {
            initial_delay: Duration::from_millis(0),
            poll_interval: Duration::from_millis(5),
            work_request_batch_size: 200,
            step_timeout: Duration::from_secs(5),
            max_threads_count: 4,
        }
    }

    fn work(namespace: &str, name: &str, step_id: u64) -> WorkRequest {
        let mut input_param = JsonMap::new();
        input_param.insert("n".to_string(), json!(step_id));
        WorkRequest {
            process_id: 1,
            step_id,
            step_execution_id: step_id,
            step_name: name.to_string(),
            step_namespace: namespace.to_string(),
            input_param,
            ..Default::default()
        }
    }

    fn poller_with(
        api: Arc<MemoryWorkApi>,
        registry: WorkerRegistry,
        settings: PollerSettings,
    ) -> (Poller, mpsc::UnboundedReceiver<WorkResponse>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let poller = Poller::new(
            api,
            Arc::new(registry),
            settings,
            tx,
            EventBus::default(),
            token.clone(),
        );
        (poller, rx, token)
    }

    async fn collect(rx: &mut mpsc::UnboundedReceiver<WorkResponse>, n: usize) -> Vec<WorkResponse> {
        let mut out = Vec::new();
        while out.len() < n {
            let next = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for results")
                .expect("channel closed");
            out.push(next);
        }
        out
    }

    /// Tracks how many executions overlap
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    struct SlowWorker {
        gauge: Arc<Gauge>,
    }

    #[async_trait]
    impl Worker for SlowWorker {
        async fn execute(&self, _ctx: WorkContext) -> std::result::Result<StepOutcome, StepError> {
            let now = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.gauge.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(30)).await;
            self.gauge.current.fetch_sub(1, Ordering::SeqCst);
            Ok(StepOutcome::Completed(json!({"ok": true})))
        }
    }

    #[tokio::test]
    async fn completed_step_is_reported() {
        let api = Arc::new(MemoryWorkApi::new());
        api.enqueue(work("default", "echo", 7));

        let mut registry = WorkerRegistry::new();
        registry
            .register(WorkerRegistration::new(
                "echo",
                FnWorker::new(|input| Ok(json!({ "echo": input }))),
            ))
            .unwrap();

        let (mut poller, mut rx, _token) = poller_with(api.clone(), registry, settings());
        assert_eq!(poller.poll_once().await.unwrap(), 1);

        let results = collect(&mut rx, 1).await;
        assert_eq!(results[0].step_id, 7);
        assert_eq!(results[0].status, StepStatus::Completed);
        assert_eq!(results[0].output.get("echo"), Some(&json!({"n": 7})));
    }

    #[tokio::test]
    async fn unknown_queue_fails_immediately() {
        let api = Arc::new(MemoryWorkApi::new().over_delivering());
        api.enqueue(work("default", "nobody", 3));

        let mut registry = WorkerRegistry::new();
        registry
            .register(WorkerRegistration::new("echo", FnWorker::new(|i| Ok(json!(i)))))
            .unwrap();

        let (mut poller, mut rx, _token) = poller_with(api, registry, settings());
        poller.poll_once().await.unwrap();

        let results = collect(&mut rx, 1).await;
        assert_eq!(results[0].status, StepStatus::Failed);
        assert_eq!(
            results[0].output.get("error"),
            Some(&json!("No worker registered for default/nobody"))
        );
    }

    #[tokio::test]
    async fn poll_sizes_respect_capacity_and_batch() {
        let api = Arc::new(MemoryWorkApi::new());
        let mut registry = WorkerRegistry::new();
        registry
            .register(
                WorkerRegistration::new("lists", FnWorker::new(|i| Ok(json!(i))))
                    .with_queue_names(["a", "b", "c"])
                    .with_max_in_progress(5),
            )
            .unwrap();
        registry
            .register(
                WorkerRegistration::new("big", FnWorker::new(|i| Ok(json!(i))))
                    .with_max_in_progress(1000),
            )
            .unwrap();

        let (poller, _rx, _token) = poller_with(api, registry, settings());
        let sizes: Vec<(String, u32)> = poller
            .poll_sizes()
            .into_iter()
            .map(|s| (s.step_queue_name_data.name, s.size))
            .collect();

        assert_eq!(
            sizes,
            vec![
                ("a".to_string(), 2),
                ("b".to_string(), 2),
                ("c".to_string(), 1),
                ("big".to_string(), 200),
            ]
        );
    }

    #[tokio::test]
    async fn max_in_progress_is_never_exceeded() {
        let api = Arc::new(MemoryWorkApi::new());
        for id in 0..6 {
            api.enqueue(work("default", "slow", id));
        }

        let gauge = Arc::new(Gauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut registry = WorkerRegistry::new();
        registry
            .register(
                WorkerRegistration::new("slow", SlowWorker { gauge: gauge.clone() })
                    .with_max_in_progress(2),
            )
            .unwrap();

        let (poller, mut rx, token) = poller_with(api.clone(), registry, settings());
        let handle = tokio::spawn(poller.run());

        let results = collect(&mut rx, 6).await;
        token.cancel();
        handle.await.unwrap();

        assert!(results.iter().all(|r| r.status == StepStatus::Completed));
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
        assert!(api.polled_sizes().iter().flatten().all(|s| s.size <= 2));
    }

    #[tokio::test]
    async fn over_delivered_work_waits_in_backlog() {
        let api = Arc::new(MemoryWorkApi::new().over_delivering());
        for id in 0..5 {
            api.enqueue(work("default", "slow", id));
        }

        let gauge = Arc::new(Gauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut registry = WorkerRegistry::new();
        registry
            .register(
                WorkerRegistration::new("slow", SlowWorker { gauge: gauge.clone() })
                    .with_max_in_progress(1),
            )
            .unwrap();

        let (poller, mut rx, token) = poller_with(api, registry, settings());
        let handle = tokio::spawn(poller.run());

        let results = collect(&mut rx, 5).await;
        token.cancel();
        handle.await.unwrap();

        let mut ids: Vec<u64> = results.iter().map(|r| r.step_id).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backlog_is_handed_back_as_running() {
        let api = Arc::new(MemoryWorkApi::new().over_delivering());
        for id in 0..3 {
            api.enqueue(work("default", "slow", id));
        }

        let gauge = Arc::new(Gauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut registry = WorkerRegistry::new();
        registry
            .register(
                WorkerRegistration::new("slow", SlowWorker { gauge })
                    .with_max_in_progress(1),
            )
            .unwrap();

        let (mut poller, mut rx, _token) = poller_with(api, registry, settings());
        assert_eq!(poller.poll_once().await.unwrap(), 3);
        assert_eq!(poller.release_backlog(), 2);
        assert_eq!(poller.release_backlog(), 0);

        let results = collect(&mut rx, 3).await;
        let handed_back: Vec<&WorkResponse> = results
            .iter()
            .filter(|r| r.status == StepStatus::Running)
            .collect();
        assert_eq!(handed_back.len(), 2);
        assert!(handed_back.iter().all(|r| r.reschedule_after_seconds == Some(0)));
        assert_eq!(
            results.iter().filter(|r| r.status == StepStatus::Completed).count(),
            1
        );
    }

    #[tokio::test]
    async fn zero_poll_interval_does_not_stop_the_poller() {
        let api = Arc::new(MemoryWorkApi::new());
        api.enqueue(work("default", "echo", 1));

        let mut registry = WorkerRegistry::new();
        registry
            .register(WorkerRegistration::new("echo", FnWorker::new(|i| Ok(json!(i)))))
            .unwrap();

        let mut zero = settings();
        zero.poll_interval = Duration::ZERO;
        let (poller, mut rx, token) = poller_with(api, registry, zero);
        let handle = tokio::spawn(poller.run());

        let results = collect(&mut rx, 1).await;
        token.cancel();
        handle.await.unwrap();
        assert_eq!(results[0].status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn slow_step_times_out() {
        let api = Arc::new(MemoryWorkApi::new());
        api.enqueue(work("default", "sleepy", 1));

        let mut registry = WorkerRegistry::new();
        registry
            .register(WorkerRegistration::new(
                "sleepy",
                AsyncFnWorker::new(|_| async {
                    sleep(Duration::from_secs(10)).await;
                    Ok(json!({}))
                }),
            ))
            .unwrap();

        let mut settings = settings();
        settings.step_timeout = Duration::from_millis(20);
        let (mut poller, mut rx, _token) = poller_with(api, registry, settings);
        poller.poll_once().await.unwrap();

        let results = collect(&mut rx, 1).await;
        assert_eq!(results[0].status, StepStatus::Failed);
        assert_eq!(
            results[0].output.get("error"),
            Some(&json!("step timed out after 20ms"))
        );
    }

    #[tokio::test]
    async fn panicking_worker_is_reported_as_failed() {
        let api = Arc::new(MemoryWorkApi::new());
        api.enqueue(work("default", "boom", 1));

        let mut registry = WorkerRegistry::new();
        registry
            .register(WorkerRegistration::new(
                "boom",
                AsyncFnWorker::new(|_| async {
                    if true {
                        panic!("worker bug");
                    }
                    Ok(json!({}))
                }),
            ))
            .unwrap();

        let (mut poller, mut rx, _token) = poller_with(api, registry, settings());
        poller.poll_once().await.unwrap();

        let results = collect(&mut rx, 1).await;
        assert_eq!(results[0].status, StepStatus::Failed);
        assert_eq!(results[0].output.get("error"), Some(&json!("Worker panicked")));
    }

    #[test]
    fn response_mapping() {
        let request = work("default", "w", 9);

        let completed = into_response(&request, 10, Ok(StepOutcome::Completed(json!([1, 2]))));
        assert_eq!(completed.status, StepStatus::Completed);
        assert_eq!(completed.output.get("result"), Some(&json!([1, 2])));
        assert_eq!(completed.started_at, 10);
        assert_eq!(completed.step_id, 9);

        let running = into_response(
            &request,
            10,
            Ok(StepOutcome::KeepRunning {
                output: JsonMap::new(),
                reschedule_after_seconds: 30,
            }),
        );
        assert_eq!(running.status, StepStatus::Running);
        assert_eq!(running.reschedule_after_seconds, Some(30));

        let failed = into_response(
            &request,
            10,
            Err(StepError::new("bad").with_code("CODE").with_data(json!({"x": 1}))),
        );
        assert_eq!(failed.status, StepStatus::Failed);
        assert_eq!(failed.output.get("errorCode"), Some(&json!("CODE")));
        assert_eq!(failed.output.get("errorData"), Some(&json!({"x": 1})));
    }
}
