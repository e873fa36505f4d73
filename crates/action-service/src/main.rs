use action_service::{
    api, config::ActionServiceConfig, recognition::labels::LabelTable,
    recognition::model_store::ModelStore, ActionServiceState,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use telemetry::LogConfig;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ActionServiceConfig::from_env()?;

    // Keep the guard alive so file logs are flushed on exit
    let _log_guard = telemetry::init_structured_logging(
        LogConfig::new("action-service")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_node_id(&config.node_id),
    );

    info!("Starting Action Recognition Service...");
    info!(
        "Action service configuration: bind={}, node_id={}, models_dir={}",
        config.bind_addr,
        config.node_id,
        config.models_dir.display()
    );

    let labels = LabelTable::from_file(&config.class_names_path).with_context(|| {
        format!(
            "Failed to load class names from {}",
            config.class_names_path.display()
        )
    })?;
    info!("Loaded {} action classes", labels.len());

    match &config.model_hub_url {
        Some(hub) => info!("Missing models will be downloaded from {}", hub),
        None => info!("No model hub configured; models must already exist locally"),
    }
    let store = Arc::new(ModelStore::new(&config.models_dir, config.model_hub_url.clone()));

    let state = ActionServiceState::new(
        config.node_id.clone(),
        labels,
        store,
        config.default_params.clone(),
    );

    // Not fatal: sessions retry the load on their first frame
    if let Err(e) = state.warm_up().await {
        warn!("Default model unavailable at startup: {}", e);
    }

    let app = api::router(state.clone());

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Action service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: ActionServiceState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
    state.shutdown().await;
}
