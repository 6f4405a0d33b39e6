//! In-memory Unmeshed engine for local development
//! 
//! Serves the same HTTP API as the real engine closely enough for the SDK to
//! register workers, run processes and move files against it. All state is
//! kept in memory and lost on restart.

mod auth;
mod engine;
mod error;
mod files;
mod routes;

pub use auth::SdkClient;
pub use engine::Engine;
pub use error::{ApiError, ErrorResponse};
pub use files::FileStore;
pub use routes::configure;

use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use unmeshedcore::ProcessData;

const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across handlers
pub struct AppState {
    engine: Mutex<Engine>,
    files: Mutex<FileStore>,
    /// Bumped after every engine change so sync runs can wait on it
    changes: watch::Sender<u64>,
    sync_timeout: Duration,
}

impl AppState {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            engine: Mutex::new(Engine::new()),
            files: Mutex::new(FileStore::new()),
            changes,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }

    /// Longest a synchronous run waits for its process to finish
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn files(&self) -> MutexGuard<'_, FileStore> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake everything waiting on process progress
    pub fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    /// Wait until a process is no longer running, or the sync timeout passes
    pub async fn wait_for_terminal(&self, process_id: u64) -> Result<ProcessData, ApiError> {
        let mut changes = self.changes.subscribe();
        let deadline = tokio::time::Instant::now() + self.sync_timeout;
        loop {
            let data = self.engine().process(process_id, false)?;
            if data.status.is_terminal() {
                return Ok(data);
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                _ => {
                    tracing::warn!("Process {} still running after {:?}", process_id, self.sync_timeout);
                    return Ok(data);
                }
            }
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the HTTP server on an already bound listener
pub fn serve(listener: TcpListener, state: web::Data<AppState>) -> std::io::Result<Server> {
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(16 * 1024 * 1024))
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(configure)
    })
    .listen(listener)?
    .run();
    Ok(server)
}
