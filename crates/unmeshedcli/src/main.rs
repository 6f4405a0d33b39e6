use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use unmeshedclient::ClientConfig;

mod files;
mod manage;
mod sample;
mod worker;

#[derive(Parser)]
#[command(name = "unmeshed")]
#[command(about = "Unmeshed SDK demos and worker runner", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker manifests to register instead of the bundled ones
    #[arg(long, global = true, env = "UNMESHED_MANIFESTS_DIR")]
    manifests_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the engine is and how to authenticate against it
#[derive(Args, Debug, Clone, Default)]
struct ConnectionArgs {
    /// Engine base URL
    #[arg(long, global = true, env = "UNMESHED_URL")]
    url: Option<String>,

    /// Engine port, appended to the URL when set
    #[arg(long, global = true, env = "UNMESHED_PORT")]
    port: Option<u16>,

    #[arg(long, global = true, env = "UNMESHED_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, global = true, env = "UNMESHED_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// JSON client configuration file, used instead of the environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

impl ConnectionArgs {
    /// Client configuration with command line values taking precedence
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ClientConfig::from_env(),
        };
        if let Some(url) = &self.url {
            config.base_url = url.clone();
        }
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(client_id) = &self.client_id {
            config.client_id = client_id.clone();
        }
        if let Some(token) = &self.auth_token {
            config.auth_token = token.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create, version, fetch and delete a demo process definition
    ManageProcess,

    /// Serve the sample workers and walk through the process APIs
    Sample,

    /// Upload, list, download and delete a demo file
    Files,

    /// Serve the sample workers until interrupted
    Worker {
        /// Extra directory of worker manifests to register
        #[arg(long)]
        scan_dir: Option<PathBuf>,
    },

    /// List the sample workers
    Workers,
}

/// Log the outcome of one demo call and keep going
pub(crate) fn report<T: Serialize>(what: &str, result: unmeshedclient::Result<T>) -> Option<T> {
    match result {
        Ok(value) => {
            let rendered = serde_json::to_string(&value).unwrap_or_else(|e| format!("<{}>", e));
            tracing::info!("{}: {}", what, rendered);
            Some(value)
        }
        Err(e) => {
            tracing::error!("{} failed: {}", what, e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let manifests = unmeshedworkers::manifests_dir_or(cli.manifests_dir.clone());
    match cli.command {
        Commands::ManageProcess => manage::run(cli.connection.client_config()?).await?,
        Commands::Sample => sample::run(cli.connection.client_config()?, &manifests).await?,
        Commands::Files => files::run(cli.connection.client_config()?).await?,
        Commands::Worker { scan_dir } => {
            worker::run(cli.connection.client_config()?, &manifests, scan_dir).await?
        }
        Commands::Workers => worker::list(&manifests),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(
            &path,
            r#"{"baseUrl": "http://file-host", "port": 9000, "clientId": "from-file", "authToken": "t", "maxThreadsCount": 4}"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "unmeshed",
            "--config",
            path.to_str().unwrap(),
            "--client-id",
            "from-flag",
            "--port",
            "8080",
            "workers",
        ])
        .unwrap();
        let config = cli.connection.client_config().unwrap();

        assert_eq!(config.base_url, "http://file-host");
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.client_id, "from-flag");
        assert_eq!(config.auth_token, "t");
        assert_eq!(config.max_threads_count, 4);
    }

    #[test]
    fn worker_accepts_a_scan_dir() {
        let cli = Cli::try_parse_from(["unmeshed", "worker", "--scan-dir", "/tmp/manifests", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Worker { scan_dir } => assert_eq!(scan_dir, Some(PathBuf::from("/tmp/manifests"))),
            _ => panic!("expected worker command"),
        }
    }

    #[test]
    fn manifests_dir_flag_replaces_the_bundled_manifests() {
        let cli = Cli::try_parse_from(["unmeshed", "sample", "--manifests-dir", "/srv/manifests"]).unwrap();
        assert_eq!(cli.manifests_dir, Some(PathBuf::from("/srv/manifests")));
        assert_eq!(
            unmeshedworkers::manifests_dir_or(cli.manifests_dir),
            PathBuf::from("/srv/manifests")
        );
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = ConnectionArgs {
            config: Some(PathBuf::from("/definitely/not/here.json")),
            ..Default::default()
        };
        let err = args.client_config().unwrap_err();
        assert!(err.to_string().contains("Failed to load"));
    }
}
