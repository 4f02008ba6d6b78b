//! Medanna - conversational core for an AI healthcare assistant
//!
//! A verified practitioner converses with a hosted Gemini backend; a
//! license-verification gate precedes any discussion of controlled
//! substances. Responses stream in as partial results and are folded into
//! the transcript by the core reducer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod routes;

use crate::core::ChatEngine;
use config::Config;
use providers::gemini::{GeminiBackend, GeminiConfig};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medanna=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; model calls will fail");
    }

    let backend = Arc::new(GeminiBackend::new(GeminiConfig {
        base_url: config.gemini_base_url.clone(),
        api_key: config.gemini_api_key.clone().unwrap_or_default(),
        ..GeminiConfig::default()
    }));

    let engine = Arc::new(ChatEngine::new(config, backend));

    let state = AppState { engine };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Medanna API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
