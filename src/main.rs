use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use meetup::{AppState, app, config::Configuration, initialize_state, telemetry};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Time given to queued mails once the server stopped.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path of the `config.yaml` file.
    #[arg(long, short, env = "CONFIG_PATH", default_value = "config.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server and the reminder sweep.
    Serve,
    /// Give the admin role to an existing account.
    GrantAdmin { email: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Configuration::default().path(cli.config).read() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("cannot read configuration: {err}");
            return ExitCode::FAILURE;
        },
    };
    let provider = telemetry::init_tracing(config.telemetry.otlp_endpoint.as_deref());

    let state = match initialize_state(config).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "failed to initialize state");
            return ExitCode::FAILURE;
        },
    };

    let code = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::GrantAdmin { email } => match state.users.grant_admin(&email).await {
            Ok(id) => {
                tracing::info!(user_id = id, %email, "admin role granted");
                ExitCode::SUCCESS
            },
            Err(err) => {
                tracing::error!(error = %err, %email, "cannot grant admin role");
                ExitCode::FAILURE
            },
        },
    };

    if let Some(provider) = provider {
        if let Err(err) = provider.shutdown() {
            eprintln!("tracer provider shutdown failed: {err}");
        }
    }

    code
}

async fn serve(state: AppState) -> ExitCode {
    let (stop, shutdown) = watch::channel(false);
    let interval = Duration::from_secs(state.config.reminder.interval_secs);
    let sweep = tokio::spawn(state.reminders.clone().run(interval, shutdown));

    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "cannot bind listener");
            return ExitCode::FAILURE;
        },
    };
    tracing::info!(%addr, "server started");

    let mail = state.mail.clone();
    let result = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    stop.send_replace(true);
    if let Err(err) = sweep.await {
        tracing::error!(error = %err, "reminder sweep panicked");
    }
    if tokio::time::timeout(DRAIN_TIMEOUT, mail.drain()).await.is_err() {
        tracing::warn!("mail queue not drained before exit");
    }

    match result {
        Ok(()) => {
            tracing::info!("server stopped");
            ExitCode::SUCCESS
        },
        Err(err) => {
            tracing::error!(error = %err, "server failed");
            ExitCode::FAILURE
        },
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
