use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod constants;
mod handlers;
mod mime;
mod models;
mod sanitize;
mod security_headers;
mod store;
mod templates;
mod tls;

use auth::{require_session, SharedSecretGate};
use config::Config;
use handlers::AppState;
use security_headers::SecurityHeaders;
use store::ImageStore;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the application router
///
/// GET on the form endpoints is an ordinary file request, so it is
/// registered after the session layer and falls through to file serving.
pub fn build_app(state: AppState, hsts: bool) -> Router {
    let body_limit = state.store.max_bytes().saturating_add(MULTIPART_OVERHEAD);
    let session = middleware::from_fn_with_state(state.gate.clone(), require_session);

    Router::new()
        .route("/", get(handlers::index_handler))
        .route(
            "/login",
            post(handlers::login_handler).get(handlers::serve_file_handler),
        )
        .route(
            "/logout",
            post(handlers::logout_handler).get(handlers::serve_file_handler),
        )
        .route(
            "/upload",
            post(handlers::upload_handler)
                .layer(DefaultBodyLimit::max(body_limit))
                .route_layer(session.clone())
                .get(handlers::serve_file_handler),
        )
        .route(
            "/delete",
            post(handlers::delete_handler)
                .route_layer(session)
                .get(handlers::serve_file_handler),
        )
        .fallback(get(handlers::serve_file_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(middleware::from_fn_with_state(
                    SecurityHeaders { hsts },
                    security_headers::add_security_headers,
                )),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapshelf=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    tracing::info!(
        "{} Starting {}...",
        constants::EMOJI_PREFIX,
        constants::APP_NAME
    );

    let state = AppState {
        store: ImageStore::new(config.image_dir.canonicalize()?, config.max_upload_bytes),
        gate: Arc::new(SharedSecretGate::new(config.password.clone())),
    };
    tracing::info!("Image directory: {:?}", state.store.root());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|err| anyhow::anyhow!("Invalid listen address {}:{}: {}", config.host, config.port, err))?;

    match tls::server_tls(&config).await? {
        Some(tls_config) => {
            let app = build_app(state, true);
            tracing::info!("Listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let app = build_app(state, false);
            tracing::info!("Listening on http://{}", addr);
            axum_server::bind(addr)
                .serve(app.into_make_service())
                .await?;
        }
    }

    Ok(())
}
