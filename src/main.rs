//! Library Server - Library Management System
//!
//! REST API server for the book catalog, members and loans.

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_server::{
    api, config::AppConfig, repository::Repository, services::Services, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config);

    tracing::info!("Starting Library Server v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let repository = Repository::new(pool.clone());
    let services = Services::new(repository, config.auth.clone(), config.loans.clone());

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
        pool,
    };

    if let Some(secs) = state.config.loans.overdue_sweep_interval_secs {
        spawn_overdue_sweeper(state.clone(), Duration::from_secs(secs.max(1)));
    }

    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("library_server={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Periodic overdue sweep; failures are logged and retried on the next tick
fn spawn_overdue_sweeper(state: AppState, period: Duration) {
    tracing::info!("Overdue sweep scheduled every {}s", period.as_secs());

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match state.services.loans.sweep_overdue().await {
                Ok(report) if report.marked > 0 => {
                    tracing::info!("Scheduled sweep marked {} loan(s) overdue", report.marked)
                }
                Ok(_) => tracing::debug!("Scheduled sweep found no late loans"),
                Err(e) => tracing::error!("Scheduled overdue sweep failed: {}", e),
            }
        }
    });
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authentication
        .route("/auth/register", post(api::auth::register))
        .route("/auth/login", post(api::auth::login))
        .route("/auth/refresh", post(api::auth::refresh))
        .route("/auth/me", get(api::auth::me))
        .route("/auth/password", put(api::auth::change_password))
        // Books (catalog)
        .route("/books", get(api::books::list_books).post(api::books::create_book))
        .route("/books/categories", get(api::books::list_categories))
        .route("/books/popular", get(api::books::popular_books))
        .route("/books/out-of-stock", get(api::books::out_of_stock))
        .route("/books/by-year", get(api::books::books_by_year))
        .route("/books/statistics", get(api::books::book_stats))
        .route("/books/isbn/:isbn", get(api::books::get_book_by_isbn))
        .route(
            "/books/:id",
            get(api::books::get_book)
                .put(api::books::update_book)
                .delete(api::books::delete_book),
        )
        .route("/books/:id/availability", get(api::books::availability))
        // Users
        .route("/users", get(api::users::list_users))
        .route(
            "/users/profile",
            get(api::users::get_my_profile).put(api::users::update_my_profile),
        )
        .route("/users/statistics", get(api::users::user_stats))
        .route(
            "/users/:id",
            get(api::users::get_user)
                .put(api::users::update_user)
                .delete(api::users::delete_user),
        )
        .route("/users/:id/deactivate", put(api::users::deactivate_user))
        .route("/users/:id/role", put(api::users::update_role))
        .route("/users/:id/loans", get(api::users::get_user_loans))
        .route("/users/:id/loans/history", get(api::users::get_user_history))
        .route("/users/:id/can-borrow", get(api::users::can_borrow))
        // Loans
        .route("/loans", get(api::loans::list_loans).post(api::loans::create_loan))
        .route("/loans/active", get(api::loans::active_loans))
        .route("/loans/overdue", get(api::loans::overdue_loans))
        .route("/loans/due-soon", get(api::loans::due_soon))
        .route("/loans/mine", get(api::loans::my_loans))
        .route("/loans/statistics", get(api::loans::loan_stats))
        .route("/loans/sweep-overdue", post(api::loans::sweep_overdue))
        .route("/loans/bulk-return", post(api::loans::bulk_return))
        .route("/loans/:id", get(api::loans::get_loan))
        .route("/loans/:id/return", post(api::loans::return_loan))
        .route("/loans/:id/renew", post(api::loans::renew_loan))
        .route("/loans/:id/pay-fine", post(api::loans::pay_fine))
        .with_state(state);

    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
