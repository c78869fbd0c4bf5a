use std::net::SocketAddr;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_api::config::Config;
use chat_api::AppState;

#[tokio::main]
async fn main() {
    // Env vars may also be set externally.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    tracing::info!(
        keepalive_secs = config.keepalive_interval.as_secs(),
        stale_after_secs = config.stale_connection_after.as_secs(),
        "chat-api configured"
    );

    let state = AppState::in_memory(config);

    if state.config.dev_seed {
        match chat_api::db::seed::dev_fixtures(&state).await {
            Ok(seed) => {
                for (name, token) in &seed.tokens {
                    tracing::info!(chat_id = %seed.chat_id, user = %name, %token, "dev session");
                }
            }
            Err(err) => tracing::error!(?err, "dev seed failed"),
        }
    }

    chat_api::gateway::spawn_sweepers(&state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(chat_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
