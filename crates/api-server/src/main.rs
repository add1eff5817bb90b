use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_server::{http, session_purge};
use shared::config::{AppConfig, load_dotenv};
use shared::llm::{ChainSettings, ChatCompletionsConfig, ChatCompletionsGateway};
use shared::sessions::FileSessionStore;
use shared::sqldb::SqlDatabase;
use tokio::signal;
use tracing::{error, info};

const DEFAULT_LOG_FILTER: &str = "api_server=info,shared=info,axum=info";

#[tokio::main]
async fn main() {
    let dotenv_result = load_dotenv();
    init_tracing();
    if let Err(err) = dotenv_result {
        error!("failed to load .env file: {err}");
        std::process::exit(1);
    }

    let config = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };

    let database = match SqlDatabase::connect(&config.database).await {
        Ok(database) => database,
        Err(err) => {
            error!("failed to connect to database: {err}");
            std::process::exit(1);
        }
    };

    let sessions = match FileSessionStore::open(
        config.sessions.dir.clone(),
        config.sessions.ttl_seconds,
    )
    .await
    {
        Ok(sessions) => sessions,
        Err(err) => {
            error!("failed to open session store: {err}");
            std::process::exit(1);
        }
    };

    let llm_gateway = match ChatCompletionsGateway::new(ChatCompletionsConfig::from(&config.llm)) {
        Ok(gateway) => gateway,
        Err(err) => {
            error!("failed to build llm gateway: {err}");
            std::process::exit(1);
        }
    };

    info!(
        backend = database.backend_name(),
        model = llm_gateway.model(),
        statement_policy = %config.database.statement_policy,
        session_dir = %config.sessions.dir.display(),
        "sql chat configured"
    );

    let purge_task = session_purge::spawn(
        sessions.clone(),
        Duration::from_secs(config.sessions.purge_interval_seconds),
    );

    let app_state = match http::AppState::new(
        database.clone(),
        sessions,
        Arc::new(llm_gateway),
        ChainSettings::from(&config.llm),
        config.sessions.cookie_secure,
    ) {
        Ok(app_state) => app_state,
        Err(err) => {
            error!("failed to load templates: {err}");
            std::process::exit(1);
        }
    };
    let app = http::build_router(app_state);

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("invalid bind address {}: {err}", config.bind_addr);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!(
        "api server listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server failed: {err}");
    }

    purge_task.abort();
    database.close().await;
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => error!("failed to listen for shutdown signal: {err}"),
    }
}
