use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_api::config::Config;
use parley_api::llm::OpenAiClient;
use parley_api::routes::router;
use parley_api::session::SessionIssuer;
use parley_api::state::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(&config.log_level).into()),
        )
        .init();

    info!("Starting parley: {}", config);
    for issue in config.validate() {
        warn!("Configuration issue: {}", issue);
    }

    // Init database
    let db = parley_db::Database::open(&config.database_path)?;

    // Shared state
    let sessions = SessionIssuer::new(&config.jwt_secret, config.token_ttl);
    let model = OpenAiClient::new(config.llm.clone())?;
    let state = AppStateInner::new(db, sessions, Box::new(model));

    let app = router(state)
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http());

    let listener = bind(&config.host, config.port).await?;
    info!("Parley server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Accepts hostnames as well as IPv4 and IPv6 literals.
async fn bind(host: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((host, port)).await
}

/// Filter used when RUST_LOG is unset: the configured level for our crates
/// and the HTTP trace layer.
fn default_filter(level: &str) -> String {
    let level = match level {
        "warning" => "warn",
        "critical" => "error",
        other => other,
    };
    format!("parley={level},parley_api={level},parley_db={level},tower_http={level}")
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    if origins.iter().any(|o| o == "*") {
        return Ok(CorsLayer::permissive());
    }

    let origins = origins
        .iter()
        .map(|o| o.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}
