//! # Emotion Backend - Main Application Entry Point
//!
//! HTTP and WebSocket server for voice emotion detection. Clients upload an
//! audio file or stream raw PCM chunks and receive a predicted emotion label
//! with per-class probabilities.
//!
//! ## Application Architecture:
//! - **config**: configuration loading (TOML file + environment variables)
//! - **state**: shared application state and request metrics
//! - **audio**: decoding, preprocessing, and streaming session tracking
//! - **features**: MFCC/spectral/chroma feature extraction
//! - **inference**: scaler, classifier (real or stub), output decoding
//! - **handlers**: file upload and configuration endpoints
//! - **websocket**: the real-time streaming actor
//! - **health / middleware / error**: ambient service plumbing

mod audio;
mod config;
mod error;
mod features;
mod handlers;
mod health;
mod inference;
mod middleware;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use audio::session::SessionManager;
use config::AppConfig;
use inference::PredictionService;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown flag set by the signal handlers.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting emotion-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}",
        config.server.host, config.server.port
    );

    // Load model, scaler, and feature parameters once; the service degrades
    // to stub/identity/defaults per artifact rather than refusing to start
    let predictor = Arc::new(PredictionService::initialize(&config));
    let sessions = Arc::new(SessionManager::new(
        config.limits.max_streaming_connections,
    ));

    let app_state = AppState::new(config.clone(), predictor, sessions);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::RequestMetrics)
            .route("/", web::get().to(handlers::index))
            .route("/health", web::get().to(health::health_check))
            .route("/predict/file", web::post().to(handlers::predict_file))
            .route(
                "/ws/realtime/{client_id}",
                web::get().to(websocket::emotion_stream),
            )
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Console logging via tracing, configured by RUST_LOG.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "emotion_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and set the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag without busy-waiting.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
