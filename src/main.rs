use nuvei_payments::api::{self, AppState};
use nuvei_payments::config::Config;
use nuvei_payments::payments::providers::NuveiClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting Nuvei callback service");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!(
        "Gateway: {} (staging: {})",
        config.gateway.merchant.server_host,
        config.gateway.merchant.is_staging()
    );
    if config.gateway.urls.public_base_url.is_none() {
        tracing::warn!("CALLBACK_BASE_URL not set; challenge and notification callbacks cannot be routed here");
    }

    let client = Arc::new(NuveiClient::new(&config.gateway.merchant)?);
    let state = AppState::new(
        config.gateway.clone(),
        config.server.environment.clone(),
        client,
    );
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
