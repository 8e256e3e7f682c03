use std::sync::{Arc, Mutex};

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use bookable::config::AppConfig;
use bookable::db;
use bookable::handlers;
use bookable::services::notify::LogNotifier;
use bookable::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        notifier: Box::new(LogNotifier),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/slots", get(handlers::slots::get_slots))
        .route("/bookings", post(handlers::bookings::create_booking))
        .route(
            "/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/bookings/:id/reschedule",
            post(handlers::bookings::reschedule_booking),
        )
        .route(
            "/api/admin/calendars",
            post(handlers::calendars::create_calendar).get(handlers::calendars::list_calendars),
        )
        .route(
            "/api/admin/calendars/:id",
            patch(handlers::calendars::update_calendar),
        )
        .route(
            "/api/admin/services",
            post(handlers::calendars::create_service),
        )
        .route("/api/admin/staff", post(handlers::calendars::create_staff))
        .route(
            "/api/admin/staff/:id/services",
            post(handlers::calendars::assign_service),
        )
        .route(
            "/api/admin/staff/:id/working-hours",
            post(handlers::calendars::add_working_hours),
        )
        .route(
            "/api/admin/staff/:id/busy-blocks",
            post(handlers::calendars::add_busy_block),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
