use crate::{JsonMap, StepError, WorkRequest};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

const DEFAULT_BLOCKING_SLOTS: usize = 10;

/// Core trait that every worker implements
#[async_trait]
pub trait Worker: Send + Sync {
    /// Execute one work item
    async fn execute(&self, ctx: WorkContext) -> Result<StepOutcome, StepError>;
}

/// What a worker reports for a finished execution
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Step finished; objects become the step output, other values are wrapped as `result`
    Completed(JsonValue),
    /// Step is still in progress and should be handed out again later
    KeepRunning {
        output: JsonMap,
        reschedule_after_seconds: u64,
    },
}

impl StepOutcome {
    /// Serialize any value into a completed outcome
    pub fn completed<T: Serialize>(value: T) -> Result<Self, StepError> {
        serde_json::to_value(value)
            .map(StepOutcome::Completed)
            .map_err(|e| StepError::new(format!("Failed to serialize step output: {}", e)))
    }

    /// Output map sent to the engine
    pub fn to_output(&self) -> JsonMap {
        match self {
            StepOutcome::Completed(JsonValue::Object(map)) => map.clone(),
            StepOutcome::Completed(other) => {
                let mut map = JsonMap::new();
                map.insert("result".to_string(), other.clone());
                map
            }
            StepOutcome::KeepRunning { output, .. } => output.clone(),
        }
    }
}

/// Execution context passed to each worker
#[derive(Clone)]
pub struct WorkContext {
    /// The work item as received from the engine
    pub request: WorkRequest,

    /// Cancelled when the client shuts down or the step times out
    pub cancellation: CancellationToken,

    blocking_slots: Arc<Semaphore>,
}

impl WorkContext {
    pub fn new(request: WorkRequest) -> Self {
        Self {
            request,
            cancellation: CancellationToken::new(),
            blocking_slots: Arc::new(Semaphore::new(DEFAULT_BLOCKING_SLOTS)),
        }
    }

    pub fn with_blocking_slots(mut self, slots: Arc<Semaphore>) -> Self {
        self.blocking_slots = slots;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn input(&self) -> &JsonMap {
        &self.request.input_param
    }

    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&JsonValue, StepError> {
        self.request
            .input_param
            .get(name)
            .ok_or_else(|| StepError::new(format!("Missing required input: {}", name)))
    }

    /// Deserialize the whole input map into a typed value
    pub fn input_as<T: DeserializeOwned>(&self) -> Result<T, StepError> {
        decode_input(self.request.input_param.clone())
    }

    /// Run blocking code on the bounded blocking pool
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, StepError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .blocking_slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StepError::new("Blocking pool is closed"))?;

        tokio::task::spawn_blocking(f).await.map_err(|e| {
            if e.is_panic() {
                StepError::new("Worker panicked")
            } else {
                StepError::new(format!("Blocking task failed: {}", e))
            }
        })
    }
}

fn decode_input<T: DeserializeOwned>(input: JsonMap) -> Result<T, StepError> {
    serde_json::from_value(JsonValue::Object(input))
        .map_err(|e| StepError::new(format!("Invalid step input: {}", e)))
}

fn encode_output<T: Serialize>(value: T) -> Result<JsonValue, StepError> {
    serde_json::to_value(value)
        .map_err(|e| StepError::new(format!("Failed to serialize step output: {}", e)))
}

type SyncHandler = Arc<dyn Fn(JsonMap) -> Result<JsonValue, StepError> + Send + Sync>;

/// Worker backed by a blocking function
///
/// Calls run on the blocking pool, so sleeping or doing file I/O inside the
/// function does not stall the poller.
#[derive(Clone)]
pub struct FnWorker {
    handler: SyncHandler,
}

impl FnWorker {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(JsonMap) -> Result<JsonValue, StepError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(f),
        }
    }

    /// Wrap a function over serde types
    pub fn typed<I, O, F>(f: F) -> Self
    where
        I: DeserializeOwned,
        O: Serialize,
        F: Fn(I) -> Result<O, StepError> + Send + Sync + 'static,
    {
        Self::new(move |input| {
            let typed = decode_input::<I>(input)?;
            encode_output(f(typed)?)
        })
    }
}

#[async_trait]
impl Worker for FnWorker {
    async fn execute(&self, ctx: WorkContext) -> Result<StepOutcome, StepError> {
        let handler = self.handler.clone();
        let input = ctx.request.input_param.clone();
        let value = ctx.run_blocking(move || handler(input)).await??;
        Ok(StepOutcome::Completed(value))
    }
}

type StepFuture = Pin<Box<dyn Future<Output = Result<JsonValue, StepError>> + Send>>;
type AsyncHandler = Arc<dyn Fn(JsonMap) -> StepFuture + Send + Sync>;

/// Worker backed by an async function
#[derive(Clone)]
pub struct AsyncFnWorker {
    handler: AsyncHandler,
}

impl AsyncFnWorker {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(JsonMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue, StepError>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |input| -> StepFuture { Box::pin(f(input)) }),
        }
    }

    /// Wrap an async function over serde types
    pub fn typed<I, O, F, Fut>(f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self {
            handler: Arc::new(move |input| -> StepFuture {
                let f = f.clone();
                Box::pin(async move {
                    let typed = decode_input::<I>(input)?;
                    encode_output(f(typed).await?)
                })
            }),
        }
    }
}

#[async_trait]
impl Worker for AsyncFnWorker {
    async fn execute(&self, ctx: WorkContext) -> Result<StepOutcome, StepError> {
        let value = (self.handler)(ctx.request.input_param.clone()).await?;
        Ok(StepOutcome::Completed(value))
    }
}
