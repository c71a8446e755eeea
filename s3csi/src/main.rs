mod cli;
mod config;
mod tls;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use libs3csi::{CsiServer, S3Backend};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cli::{Cli, Commands};
use config::{LogFormat, load_config};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            listen,
            node_id,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(listen) = listen {
                cfg.listen = listen;
            }
            if node_id.is_some() {
                cfg.node_id = node_id;
            }
            init_tracing(cfg.log_format);

            let options = cfg.node_options()?;
            let tls_config = tls::server_tls_config(cfg.tls.as_ref(), &options.node_id)?;
            info!(
                node_id = %options.node_id,
                plugin = %options.plugin_name,
                "starting S3 CSI node plugin",
            );

            let backend = Arc::new(S3Backend::new(options));
            let server = CsiServer::new(cfg.listen, tls_config, backend)
                .context("Failed to start CSI server")?;

            tokio::select! {
                res = server.serve() => res.context("CSI server stopped")?,
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    server.endpoint().close(0u32.into(), b"shutdown");
                }
            }
        }
    }

    Ok(())
}
