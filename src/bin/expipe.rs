use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use expipe::expipe::config;
use expipe::expipe::engine::{Engine, Outcome};

#[derive(Parser)]
#[command(name = "expipe")]
#[command(about = "Ships expvar-style metrics to document indices")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let bootstrap = match config::from_file(&cli.config) {
        Ok(bootstrap) => bootstrap,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            process::exit(1);
        }
    };
    env_logger::Builder::new()
        .filter_level(bootstrap.log_level)
        .parse_default_env()
        .init();

    let parent = CancellationToken::new();
    {
        let parent = parent.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            parent.cancel();
        });
    }

    let engine = match Engine::new(
        parent.clone(),
        bootstrap.readers,
        bootstrap.recorders,
        bootstrap.routes,
    ) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            process::exit(1);
        }
    };

    match engine.start().await {
        Outcome::SinkExhausted => {
            error!("no recorder left to ship to");
            process::exit(2);
        }
        outcome => info!("shutdown complete: {}", outcome),
    }
}

/// Resolves when SIGINT or SIGTERM arrives.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("received Ctrl+C, shutting down");
}
