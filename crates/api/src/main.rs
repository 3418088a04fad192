use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strand_api::config::ServerConfig;
use strand_api::router::build_app_router;
use strand_api::state::AppState;
use strand_compute::{ComputeConfig, ReqwestTransport};
use strand_events::EventBus;
use strand_orchestrator::{JobOrchestrator, OrchestratorDeps, RcsbFetcher};
use strand_store::{ResultStore, UploadRegistry};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let (plain_layer, json_layer) = if json_logs {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "strand_api=debug,strand_orchestrator=debug,strand_compute=info,tower_http=info"
                    .into()
            }),
        )
        .with(plain_layer)
        .with(json_layer)
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let compute = Arc::new(ComputeConfig::from_env());
    if compute.api_key.is_none() {
        tracing::warn!("STRAND_API_KEY is not set; jobs will fail with an auth error");
    }

    // --- Storage ---
    for dir in [&config.results_root, &config.uploads_root] {
        tokio::fs::create_dir_all(dir)
            .await
            .unwrap_or_else(|e| panic!("Failed to create {}: {e}", dir.display()));
    }
    let store = ResultStore::new(&config.results_root);
    let uploads = UploadRegistry::new(&config.uploads_root);
    tracing::info!(
        results_root = %config.results_root.display(),
        uploads_root = %config.uploads_root.display(),
        "Result store ready",
    );

    // --- Orchestrator ---
    let fetcher = Arc::new(RcsbFetcher::new(
        config.structure_fetch_url.clone(),
        compute.http_timeout,
    ));
    let orchestrator = JobOrchestrator::new(OrchestratorDeps {
        store,
        uploads,
        transport: Arc::new(ReqwestTransport::new()),
        compute,
        fetcher: Some(fetcher),
        bus: Arc::new(EventBus::default()),
        shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
    });
    tracing::info!("Job orchestrator created");

    if config.migrate_legacy_on_start {
        match orchestrator.migrate_legacy().await {
            Ok(moved) => tracing::info!(moved, "Legacy result migration finished"),
            Err(e) => tracing::error!(error = %e, "Legacy result migration failed"),
        }
    }

    // --- App state ---
    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Active jobs are cancelled and persisted so their status survives.
    orchestrator.shutdown().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
