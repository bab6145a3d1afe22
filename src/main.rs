use std::path::PathBuf;
use std::sync::Arc;

use api_rest::{AppState, build_router};
use bloodbank_core::config::{
    page_size_from_env_value, required_env_value, session_ttl_from_env_value,
    store_timeout_from_env_value,
};
use bloodbank_core::constants::DEFAULT_UPLOAD_DIR;
use bloodbank_core::{CoreConfig, RecordStore, RetryPolicy, SupabaseStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the blood bank service
///
/// Resolves configuration once, connects the record store and serves the REST API
/// (with Swagger UI at `/swagger-ui`) until Ctrl-C.
///
/// # Environment Variables
/// - `BLOODBANK_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `SUPABASE_URL`, `SUPABASE_API_KEY`: record store endpoint and key (required)
/// - `BLOODBANK_UPLOAD_DIR`: profile photo directory, must exist (default: "uploads")
/// - `BLOODBANK_PAGE_SIZE`: default rows per page (default: 15)
/// - `BLOODBANK_SESSION_TTL_MINUTES`: login session lifetime (default: 480)
/// - `BLOODBANK_STORE_TIMEOUT_SECS`: per-request store timeout (default: 30)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - any configuration value is missing or invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bloodbank=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr =
        std::env::var("BLOODBANK_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let upload_dir = std::env::var("BLOODBANK_UPLOAD_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.into());
    let cfg = Arc::new(CoreConfig::new(
        PathBuf::from(upload_dir),
        page_size_from_env_value(std::env::var("BLOODBANK_PAGE_SIZE").ok())?,
        session_ttl_from_env_value(std::env::var("BLOODBANK_SESSION_TTL_MINUTES").ok())?,
        store_timeout_from_env_value(std::env::var("BLOODBANK_STORE_TIMEOUT_SECS").ok())?,
    )?);

    let supabase_url = required_env_value("SUPABASE_URL", std::env::var("SUPABASE_URL").ok())?;
    let supabase_key =
        required_env_value("SUPABASE_API_KEY", std::env::var("SUPABASE_API_KEY").ok())?;
    let store: Arc<dyn RecordStore> = Arc::new(SupabaseStore::new(
        &supabase_url,
        &supabase_key,
        cfg.store_timeout(),
        RetryPolicy::default(),
    )?);

    tracing::info!("++ Starting blood bank REST on {}", rest_addr);
    tracing::info!(
        upload_dir = %cfg.upload_dir().display(),
        page_size = cfg.page_size().get(),
        "configuration resolved"
    );

    let app = build_router(AppState::new(cfg, store));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("-- Blood bank REST stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
}
