use crate::work::WorkApi;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use unmeshedcore::{ClientEvent, EventBus, RetryPolicy, WorkResponse};

/// Sends step results back to the engine in batches
///
/// Results arrive over a channel from the executions. Each batch is retried
/// with backoff; a batch that still fails after the last attempt is logged
/// and dropped. On shutdown everything already queued is flushed.
pub struct ResultSubmitter {
    api: Arc<dyn WorkApi>,
    batch_size: usize,
    retry: RetryPolicy,
    events: EventBus,
    results: mpsc::UnboundedReceiver<WorkResponse>,
    shutdown: CancellationToken,
}

impl ResultSubmitter {
    pub fn new(
        api: Arc<dyn WorkApi>,
        batch_size: usize,
        retry: RetryPolicy,
        events: EventBus,
        results: mpsc::UnboundedReceiver<WorkResponse>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            api,
            batch_size: batch_size.max(1),
            retry,
            events,
            results,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        loop {
            let first = tokio::select! {
                biased;
                next = self.results.recv() => match next {
                    Some(response) => response,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            };

            let mut batch = vec![first];
            self.fill(&mut batch);
            self.submit(batch).await;
        }

        self.results.close();
        loop {
            let mut batch = Vec::new();
            self.fill(&mut batch);
            if batch.is_empty() {
                break;
            }
            self.submit(batch).await;
        }
        tracing::info!("Result submitter stopped");
    }

    /// Top up a batch with whatever is already queued
    fn fill(&mut self, batch: &mut Vec<WorkResponse>) {
        while batch.len() < self.batch_size {
            match self.results.try_recv() {
                Ok(response) => batch.push(response),
                Err(_) => break,
            }
        }
    }

    async fn submit(&self, batch: Vec<WorkResponse>) {
        let count = batch.len();
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.api.submit_results(&batch).await {
                Ok(()) => {
                    tracing::debug!("Submitted {} step results", count);
                    self.events.emit(ClientEvent::ResultsSubmitted {
                        count,
                        timestamp: Utc::now(),
                    });
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= attempts {
                        tracing::error!(
                            "Giving up on {} step results after {} attempts: {}",
                            count,
                            attempts,
                            e
                        );
                        self.events.emit(ClientEvent::SubmitFailed {
                            count,
                            error: e.to_string(),
                            timestamp: Utc::now(),
                        });
                        return;
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Submitting {} step results failed (attempt {}/{}), retrying in {:?}: {}",
                        count,
                        attempt,
                        attempts,
                        delay,
                        e
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
