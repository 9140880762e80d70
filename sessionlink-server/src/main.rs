use std::sync::Arc;

use clap::Parser;
use sessionlink_core::{SessionBackend, SessionLinkConfig};
use tracing_subscriber::{fmt, EnvFilter};

use sessionlink_server::http::{self, HttpState};
use sessionlink_server::run::RunOrchestrator;
use sessionlink_server::runner::ChatRunner;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "sessionlink.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = match SessionLinkConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Resolved once; a missing backend must stop us before we bind.
    let backend = match SessionBackend::from_config(&config.session) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    match config.session.service_url.as_deref() {
        Some(url) if backend.is_remote() => {
            tracing::info!(url = %url, "Using remote session service")
        }
        _ => tracing::info!("Using in-memory session (SESSION_USE_MEMORY). Suitable for local dev only."),
    }

    let runner = ChatRunner::new(&config.llm, &config.agent, backend.clone())?;
    let llm_info = runner.llm_info();
    tracing::info!(llm = %llm_info, "LLM");

    let orchestrator = RunOrchestrator::new(backend.clone(), Arc::new(runner), config.agent.app_name.clone());
    tracing::info!(runner = orchestrator.runner_name(), backend = backend.name(), "Run loop ready");

    let state = Arc::new(HttpState {
        orchestrator,
        backend,
        app_name: config.agent.app_name.clone(),
        llm_info,
    });

    http::start_http_server(state, &config.server, shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await
        }
    }
}
