use actix_web::web;
use std::net::TcpListener;
use tracing_subscriber::EnvFilter;
use unmeshedserver::{serve, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = TcpListener::bind(&bind_address)?;

    tracing::info!("Starting Unmeshed development engine on http://{}", bind_address);

    serve(listener, web::Data::new(AppState::new()))?.await?;
    Ok(())
}
