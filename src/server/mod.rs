use crate::config::Config;
use crate::fanout::ProgressFanout;
use crate::state::JobRegistry;
use crate::transcode::TranscodeManager;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod routes_api;
pub mod routes_rpc;
pub mod routes_sse;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub registry: Arc<JobRegistry>,
    pub manager: Arc<TranscodeManager>,
    pub fanout: ProgressFanout,
    /// Cancelled when shutdown begins; ends open status streams.
    pub shutdown: CancellationToken,
}

impl AppContext {
    /// Build the registry, manager, and fan-out for `config`.
    pub fn new(config: Config) -> Self {
        let registry = JobRegistry::new(Duration::from_secs(config.jobs.retention_secs));
        let manager = Arc::new(TranscodeManager::new(&config, Arc::clone(&registry)));
        let fanout = ProgressFanout::new(Arc::clone(&registry));
        Self {
            config: Arc::new(config),
            registry,
            manager,
            fanout,
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    let api = routes_api::api_routes(ctx.config.storage.max_upload_bytes)
        .merge(routes_sse::sse_routes());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .nest("/rpc", routes_rpc::rpc_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check(
    axum::extract::State(ctx): axum::extract::State<AppContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_jobs": ctx.registry.active_count(),
    }))
}

pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Starting server on {}", addr);

    serve_with_shutdown(listener, AppContext::new(config), shutdown_signal()).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Serve until `signal` resolves, then shut down.
///
/// On the signal, open status streams are closed and in-flight transcodes get
/// `jobs.shutdown_grace_secs` to finish before they are aborted. Both happen
/// while the listener is still draining connections.
pub async fn serve_with_shutdown<F>(listener: TcpListener, ctx: AppContext, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let grace = Duration::from_secs(ctx.config.jobs.shutdown_grace_secs);
    let registry = Arc::clone(&ctx.registry);
    let token = ctx.shutdown.clone();
    let app = create_router(ctx);

    let trigger = token.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        signal.await;
        trigger.cancel();
    });

    let drain = async {
        token.cancelled().await;
        registry.drain(grace).await;
    };

    let serve = async {
        let served = server.await;
        token.cancel();
        served
    };

    let (served, ()) = tokio::join!(serve, drain);
    served.context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
