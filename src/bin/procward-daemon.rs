use anyhow::Context;
use clap::Parser;
use procward::config::{default_config_path, ConfigSet};
use procward::ipc::{Controller, IpcServer};
use procward::process::Manager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// procward daemon - supervise the processes listed in a config file
#[derive(Parser, Debug)]
#[command(name = "procward-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file (TOML or JSON); defaults to <executable>.json
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = run(Args::parse()).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = ConfigSet::from_file(&path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    let endpoint = config.endpoint()?;

    let span = tracing::info_span!("procward");
    let manager = Arc::new(Manager::from_config_set(&config, span));

    let server = IpcServer::bind(&endpoint, Controller::new(Arc::clone(&manager)))
        .await
        .with_context(|| format!("failed to listen on {}", endpoint))?;
    let server_shutdown = CancellationToken::new();
    let server_task = tokio::spawn(server.run(server_shutdown.clone()));

    tracing::info!("start: procward");
    manager.start_all();

    wait_for_shutdown_signal().await?;

    server_shutdown.cancel();
    match server_task.await {
        Ok(Err(e)) => tracing::warn!("control server: {}", e),
        Err(e) => tracing::warn!("control server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    manager.stop_all().await;
    tracing::info!("stop: procward");

    Ok(())
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to set up SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to set up SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }

    Ok(())
}
