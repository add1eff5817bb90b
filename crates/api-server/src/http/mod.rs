use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Router, middleware};
use shared::llm::{ChainSettings, LlmGateway, PromptTemplates};
use shared::sessions::{FileSessionStore, SessionLocks};
use shared::sqldb::SqlDatabase;

mod chat;
mod cookies;
mod errors;
mod health;
mod observability;
mod views;

pub use cookies::SESSION_COOKIE_NAME;

use views::Views;

#[derive(Clone)]
pub struct AppState {
    pub database: SqlDatabase,
    pub sessions: FileSessionStore,
    pub session_locks: SessionLocks,
    pub llm_gateway: Arc<dyn LlmGateway>,
    pub chain_settings: ChainSettings,
    pub cookie_secure: bool,
    prompts: Arc<PromptTemplates>,
    views: Arc<Views>,
}

impl AppState {
    pub fn new(
        database: SqlDatabase,
        sessions: FileSessionStore,
        llm_gateway: Arc<dyn LlmGateway>,
        chain_settings: ChainSettings,
        cookie_secure: bool,
    ) -> Result<Self, minijinja::Error> {
        Ok(Self {
            database,
            sessions,
            session_locks: SessionLocks::new(),
            llm_gateway,
            chain_settings,
            cookie_secure,
            prompts: Arc::new(PromptTemplates::new()?),
            views: Arc::new(Views::new()?),
        })
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(chat::index))
        .route("/query", post(chat::query))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .layer(middleware::from_fn(
            observability::request_observability_middleware,
        ))
        .with_state(app_state)
}
