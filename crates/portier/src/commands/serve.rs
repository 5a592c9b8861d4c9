//! Serve command - runs a demo app behind the configured authenticator.

use std::net::SocketAddr;

use anyhow::{Context as _, Result};
use axum::{Extension, Json, Router, middleware, routing::get};
use clap::Args;
use portier_auth::{SharedAuthenticator, UserInfo, authenticate};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::Context;

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    if ctx.verbose {
        if ctx.loaded.files.is_empty() {
            info!("No config files found, using defaults + CLI args");
        }
        for file in &ctx.loaded.files {
            info!(layer = %file.layer, path = %file.path.display(), "Loaded config");
        }
    }

    let config = &ctx.loaded.config;
    let mut server = config.server();
    if let Some(port) = args.port {
        server.port = port;
    }
    if let Some(bind) = args.bind {
        server.bind = bind;
    }
    let addr: SocketAddr = format!("{}:{}", server.bind, server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", server.bind, server.port))?;

    let authenticator = crate::authenticator::build(config)?;
    let app = router(authenticator.clone(), server.request_logging);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, mechanism = %config.mechanism(), "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    authenticator.shutdown();
    info!("Server stopped");
    Ok(())
}

/// Demo routes guarded by `authenticator`.
///
/// Engine routes (login, callback, logout) are answered by the middleware
/// itself, so they need no handler here.
pub fn router(authenticator: SharedAuthenticator, request_logging: bool) -> Router {
    let router = Router::new()
        .route("/", get(hello))
        .route("/whoami", get(whoami))
        .layer(middleware::from_fn_with_state(authenticator, authenticate));

    if request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

async fn hello(Extension(user): Extension<UserInfo>) -> String {
    format!("Hello, {}!", user.display_name().unwrap_or("stranger"))
}

async fn whoami(Extension(user): Extension<UserInfo>) -> Json<UserInfo> {
    Json(user)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Graceful shutdown initiated");
}
