//! Usage reporting agent.
//!
//! Loads the configuration, connects the coordination and blob stores, and
//! runs the reporter until the process is asked to stop.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use beacon_config::{
    BlobBackend, ConfigLoad, ConfigLoader, CoordinationBackend,
    loader::{CONFIG_PATH_VAR, DISABLED_VAR, ROLE_VAR},
};
use beacon_core::{
    BlobStore, CoordinationStore, Reporter, Role,
    store::{
        CacacheBlobStore, MemoryBlobStore, MemoryCoordinationStore, RedisCoordinationStore,
        cacache::SeedCacheRoot,
    },
    transmitter::HttpTransmitter,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "beacon-agent")]
#[command(about = "Anonymous cluster-wide usage reporter")]
struct Cli {
    /// Configuration file (TOML or JSON). Overrides $BEACON_CONFIG_PATH.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reporting role of this process. Overrides $USAGE_REPORT_ROLE.
    #[arg(long)]
    role: Option<Role>,

    /// Turn usage reporting off. Overrides $USAGE_REPORT_DISABLED.
    #[arg(long)]
    disabled: bool,

    /// Validate the configuration and exit.
    #[arg(long)]
    check_config: bool,
}

impl Cli {
    /// Command-line flags take the place of the variables they override.
    fn env_override(&self, name: &str) -> Option<String> {
        match name {
            CONFIG_PATH_VAR => self.config.as_ref().map(|p| p.display().to_string()),
            ROLE_VAR => self.role.map(|role| role.to_string()),
            DISABLED_VAR if self.disabled => Some("true".to_string()),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = env_file {
        info!(path = %path.display(), "loaded .env file");
    }

    let cli = Cli::parse();
    let base_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let ConfigLoad { config, .. } = ConfigLoader::new(
        |name: &str| cli.env_override(name).or_else(|| std::env::var(name).ok()),
        base_dir,
    )
    .load()
    .context("failed to load configuration")?;

    if cli.check_config {
        info!("configuration is valid");
        return Ok(());
    }
    if config.is_disabled() {
        info!("usage reporting disabled, nothing to do");
        return Ok(());
    }

    let coordination = connect_coordination(&config.coordination).await?;
    let blobs = open_blobs(&config.blob);
    let endpoint = config
        .transmitter
        .endpoint
        .clone()
        .context("transmitter.endpoint is not configured")?;
    let transmitter = Arc::new(
        HttpTransmitter::new(
            endpoint,
            config.usage_report.report_interval,
            config.transmitter.timeout,
        )
        .context("failed to build report transmitter")?,
    );

    let Some(mut reporter) =
        Reporter::new(config.usage_report, coordination, blobs, transmitter)
            .context("failed to build usage reporter")?
    else {
        return Ok(());
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    match reporter.run(&cancel).await {
        Err(err) if err.is_cancelled() => {
            info!("usage reporter shut down");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "usage reporter stopped");
            Err(err).context("usage reporter failed")
        }
        Ok(()) => Ok(()),
    }
}

async fn connect_coordination(
    backend: &CoordinationBackend,
) -> anyhow::Result<Arc<dyn CoordinationStore>> {
    match backend {
        CoordinationBackend::Memory => Ok(Arc::new(MemoryCoordinationStore::new())),
        CoordinationBackend::Redis { url } => {
            let store = RedisCoordinationStore::connect(url)
                .await
                .context("failed to connect to the coordination store")?;
            info!("connected to redis coordination store");
            Ok(Arc::new(store))
        }
    }
}

fn open_blobs(backend: &BlobBackend) -> Arc<dyn BlobStore> {
    match backend {
        BlobBackend::Memory => Arc::new(MemoryBlobStore::new()),
        BlobBackend::Cacache { root } => {
            info!(root = %root.display(), "using cacache seed store");
            Arc::new(CacacheBlobStore::new(SeedCacheRoot::new(root.clone())))
        }
    }
}

async fn cancel_on_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    cancel.cancel();
}
