//! Serve command implementation.

use anyhow::{bail, Result};
use tokio::signal;

use yshare_core::config::{Config, StorageBackend};
use yshare_core::web::WebServer;

use super::ServeArgs;
use crate::ui::{self, parse_duration};

/// Run the serve command.
pub async fn run(args: ServeArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?.with_env_overrides()?;
    let config = apply_args(config, &args)?;
    config.validate()?;

    let server = WebServer::new(config.clone())?;
    ui::print_banner(&config);

    server.run(shutdown_signal()).await?;
    Ok(())
}

/// Command-line flags win over the environment and the config file.
fn apply_args(mut config: Config, args: &ServeArgs) -> Result<Config> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.localhost_only {
        config.server.localhost_only = true;
    }
    if let Some(ttl) = &args.ttl {
        let Some(ttl) = parse_duration(ttl) else {
            bail!("invalid --ttl '{ttl}', expected something like 30s, 10m or 1h");
        };
        config.session.ttl = ttl;
    }
    if let Some(url) = &args.storage_url {
        config.storage.backend = StorageBackend::Http;
        config.storage.base_url = Some(url.clone());
    }
    if args.memory {
        config.storage.backend = StorageBackend::Memory;
    }
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
