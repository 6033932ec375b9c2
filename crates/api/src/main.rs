use std::net::SocketAddr;
use std::sync::Arc;

use comfybridge_api::config::ServerConfig;
use comfybridge_api::routes;
use comfybridge_api::state::AppState;
use comfybridge_api::supervisor::Supervisor;
use comfybridge_comfyui::api::ComfyApi;
use comfybridge_comfyui::client::ComfyClient;
use comfybridge_orchestrator::JobOrchestrator;
use comfybridge_storage::select_sink;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comfybridge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().expect("invalid configuration");

    let http = reqwest::Client::new();
    let api = ComfyApi::with_client(http.clone(), config.api_url());
    let connector = ComfyClient::new(config.ws_url());
    let sink = select_sink(&config.storage, http).await;

    let orchestrator = Arc::new(JobOrchestrator::new(
        api.clone(),
        connector,
        sink,
        config.orchestrator(),
    ));
    let supervisor = Supervisor::start(
        api.clone(),
        config.launch_cmd.clone(),
        config.readiness_max_attempts,
        config.readiness_interval,
    );

    let app = routes::router(
        AppState {
            api,
            orchestrator,
            supervisor,
        },
        config.request_timeout,
    );

    let addr = SocketAddr::new(config.host.parse().expect("invalid HOST"), config.port);
    tracing::info!(%addr, comfy = %config.comfy_host, "starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
