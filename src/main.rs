//! # Voice Emotion Backend - Main Application Entry Point
//!
//! An Actix-web HTTP service that labels a spoken recording as angry, calm,
//! happy or neutral from short-term energy and zero-crossing statistics.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: The HTTP layer is asynchronous; CPU-heavy analysis runs on a blocking pool
//! - **modules**: Code is organized into separate modules (mod statements)
//! - **Result<T, E>**: Error handling using Rust's Result type
//! - **Arc & RwLock**: Thread-safe shared state management
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **state**: Shared application state, the live pipeline and metrics
//! - **health**: Health and metrics endpoints
//! - **middleware**: Per-endpoint metrics collection
//! - **handlers**: Analysis and configuration endpoints
//! - **error**: HTTP error type and JSON error responses
//! - **audio**: Decoding uploads into a canonical waveform
//! - **analysis**: Framing, feature extraction and emotion classification

mod analysis;    // Emotion pipeline (analysis/ directory)
mod audio;       // Audio decoding and normalization (audio/ directory)
mod config;      // Configuration management (config.rs)
mod error;       // Error handling types (error.rs)
mod handlers;    // HTTP request handlers (handlers/ directory)
mod health;      // Health check endpoints (health.rs)
mod middleware;  // Custom middleware (middleware/ directory)
mod state;       // Application state management (state.rs)

use actix_cors::Cors;
use actix_web::{middleware::from_fn, middleware::Logger, web, App, HttpRequest, HttpServer};
use anyhow::Result;
use config::AppConfig;
use error::AppError;
use state::AppState;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging** for debugging and monitoring
/// 3. **Creates shared application state** (config, pipeline, metrics)
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** on Ctrl+C or SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!(
        frame_duration_secs = config.analysis.frame_duration_secs,
        hop_duration_secs = config.analysis.hop_duration_secs,
        trailing_frame = ?config.analysis.trailing_frame,
        feature_set = ?config.analysis.feature_set,
        max_concurrent_analyses = config.performance.max_concurrent_analyses,
        "Configuration loaded: {}:{}",
        config.server.host,
        config.server.port
    );

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware execute in reverse order of registration for requests
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(from_fn(middleware::track_metrics))
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/analyze", web::post().to(handlers::analyze_audio))
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config)),
            )
            // Root-level aliases for existing clients
            .route("/analyze", web::post().to(handlers::analyze_audio))
            .route("/health", web::get().to(health::health_check))
            .default_service(web::to(not_found))
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

async fn not_found(req: HttpRequest) -> Result<actix_web::HttpResponse, AppError> {
    Err(AppError::NotFound(format!("No route for {} {}", req.method(), req.path())))
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "voice_emotion_backend=trace")
/// - If not set, defaults to "voice_emotion_backend=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_emotion_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolve when the process receives Ctrl+C or, on Unix, SIGTERM.
///
/// If a handler cannot be installed we log it and wait on the other one, so
/// a missing signal source never shuts the server down by itself.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received SIGINT");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
