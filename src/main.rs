use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loqa_narrate::{
    create_router, AppState, Config, SessionCallbacks, SessionController, SessionDeps,
    SessionOutcome, StopReason,
};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "loqa-narrate", about = "Segmented narration capture with resilient upload")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/loqa-narrate")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP control API
    Serve,
    /// Record one session until the time limit or Ctrl-C
    Record {
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Loqa Narrate v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let deps = SessionDeps::from_config(&cfg)?;

    match cli.command {
        Command::Serve => serve(cfg, deps).await,
        Command::Record { seconds } => record(cfg, deps, seconds).await,
    }
}

async fn serve(cfg: Config, deps: SessionDeps) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let app = create_router(AppState::new(deps, cfg.session.clone()));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}

async fn record(cfg: Config, deps: SessionDeps, seconds: Option<u64>) -> Result<()> {
    let callbacks = SessionCallbacks::new()
        .on_complete(|completion| {
            info!(
                "Session {} saved {} segments",
                completion.session_id,
                completion.segment_locations.len()
            );
        })
        .on_cancel(|| warn!("Session cancelled"));

    let handle = SessionController::start(cfg.session.clone(), deps, callbacks).await?;
    info!("Recording session {} (Ctrl-C to stop)", handle.session_id());

    let limit = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending::<()>().await,
        }
    };

    let outcome = tokio::select! {
        _ = limit => SessionOutcome::from_result(handle.stop(StopReason::User).await),
        _ = tokio::signal::ctrl_c() => SessionOutcome::from_result(handle.stop(StopReason::User).await),
        outcome = handle.wait() => outcome,
    };

    let completion = outcome.into_result()?;
    println!("{}", serde_json::to_string_pretty(&completion)?);

    Ok(())
}
