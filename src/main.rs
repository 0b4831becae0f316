use std::sync::Arc;

use axum::{http::{header, HeaderValue, Method}, Router};
use dewallads::{auth, config::Config, http, store::SqliteStore, AppResult, AppState};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> AppResult<()> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.public_url.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_idle_minutes)));

    let store = SqliteStore::connect(&config.database_url).await?;

    let client_secret = std::fs::read_to_string(&config.client_secret_path)?;
    let clients = auth::Clients::from_json(serde_json::from_str(&client_secret)?, &config.public_url)?;
    let app_state = AppState {
        store: Arc::new(store),
        clients,
    };

    let app = Router::new()
        .merge(auth::router())
        .merge(http::router())

        .with_state(app_state)
        .layer(session_layer)
        .layer(cors(&config)?)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dewallads=info,tower_http=info"));

    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Credentialed CORS for the frontend origin; same-origin only without one.
fn cors(config: &Config) -> AppResult<CorsLayer> {
    let Some(origin) = &config.allowed_origin else {
        return Ok(CorsLayer::new());
    };
    let origin = HeaderValue::from_str(origin).map_err(|e| format!("ALLOWED_ORIGIN: {e}"))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true))
}
