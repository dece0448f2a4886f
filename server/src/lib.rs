//! Curator Server - administrative HTTP surface over a blog content store.
//!
//! Keeps the content id space tidy: allocation under a configurable policy,
//! contiguous renumbering, JSON snapshots and resumable restores. The store
//! is MySQL, PostgreSQL or SQLite, chosen from `DATABASE_URL` at startup.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::{StorageDriver, Tables};
use crate::handlers::{BackupStore, JobStore, PolicyStore};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<dyn StorageDriver>,
    pub config: Arc<Config>,
    pub tables: Tables,
    pub backups: BackupStore,
    pub jobs: JobStore,
    pub policy: PolicyStore,
}

impl AppState {
    pub fn new(driver: Arc<dyn StorageDriver>, config: Config) -> Self {
        Self {
            driver,
            tables: Tables::new(&config.table_prefix),
            backups: BackupStore::new(&config.backup_dir, &config.backup_prefix),
            jobs: JobStore::new(&config.state_dir),
            policy: PolicyStore::new(&config.state_dir),
            config: Arc::new(config),
        }
    }
}

/// Router with every route and request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
