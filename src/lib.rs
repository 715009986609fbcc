//! Library Management System
//!
//! REST JSON API for a lending library: the book catalog, member accounts, and the
//! loan ledger that issues and returns books, renews loans, and charges overdue fines.

use std::sync::Arc;

use sqlx::{Pool, Postgres};

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    pub pool: Pool<Postgres>,
}
