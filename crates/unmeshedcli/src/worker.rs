use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use unmeshedclient::{ClientConfig, ClientEvent, UnmeshedClient, WorkerRegistration, WorkerScanner};

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::PollerStarted { queues, .. } => {
            println!("▶️  Polling {} queues", queues);
        }
        ClientEvent::WorkReceived { count, .. } => {
            println!("📥 Received {} work items", count);
        }
        ClientEvent::StepStarted { process_id, step_id, worker, .. } => {
            println!("  ⚡ {} started step {} of process {}", worker, step_id, process_id);
        }
        ClientEvent::StepCompleted { step_id, worker, duration_ms, .. } => {
            println!("  ✅ {} completed step {} in {}ms", worker, step_id, duration_ms);
        }
        ClientEvent::StepFailed { step_id, worker, error, .. } => {
            println!("  ❌ {} failed step {}: {}", worker, step_id, error);
        }
        ClientEvent::ResultsSubmitted { count, .. } => {
            println!("📤 Submitted {} results", count);
        }
        ClientEvent::SubmitFailed { count, error, .. } => {
            println!("💥 Dropped {} results: {}", count, error);
        }
        ClientEvent::PollerStopped { .. } => {
            println!("⏹️  Polling stopped");
        }
    }
}

/// Serve the sample workers until Ctrl-C
pub async fn run(config: ClientConfig, manifests: &Path, scan_dir: Option<PathBuf>) -> Result<()> {
    let mut client = UnmeshedClient::new(config)?;

    for registration in unmeshedworkers::registrations() {
        client.register_worker(registration)?;
    }
    client
        .register_decorated_workers(manifests, &unmeshedworkers::catalog())
        .with_context(|| format!("Failed to register workers from {}", manifests.display()))?;
    if let Some(dir) = scan_dir {
        client
            .register_decorated_workers(&dir, &unmeshedworkers::catalog())
            .with_context(|| format!("Failed to register workers from {}", dir.display()))?;
    }

    println!("🚀 Serving {} workers", client.registry().len());
    for worker in client.registry().list() {
        println!("  • {}", worker);
    }

    let mut events = client.subscribe_events();
    client.start().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Shutting down, waiting for running steps");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => tracing::warn!("Skipped {} client events", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown().await;
    Ok(())
}

fn describe(registration: &WorkerRegistration) {
    println!(
        "  • {}/{} (max in progress {})",
        registration.namespace, registration.name, registration.max_in_progress
    );
    let queues = registration.queue_names();
    if queues != [registration.name.clone()] {
        println!("    queues: {}", queues.join(", "));
    }
}

/// Print the sample handlers and how they are registered
pub fn list(manifests: &Path) {
    let catalog = unmeshedworkers::catalog();

    println!("📦 Sample handlers:");
    for name in catalog.names() {
        println!("  • {}", name);
    }

    println!();
    println!("Registered explicitly:");
    for registration in unmeshedworkers::registrations() {
        describe(&registration);
    }

    println!();
    println!("Registered from manifests:");
    match WorkerScanner::scan(manifests, &catalog) {
        Ok(registrations) => registrations.iter().for_each(describe),
        Err(e) => println!("  ❌ {}", e),
    }
}
