use std::sync::Arc;

use api_server::http::{AppState, SESSION_COOKIE_NAME, build_router};
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use chrono::Utc;
use shared::config::DatabaseConfig;
use shared::llm::{ChainSettings, ChatCompletionsConfig, ChatCompletionsGateway};
use shared::models::Conversation;
use shared::sessions::FileSessionStore;
use shared::sqldb::{DatabaseAdapter, SqlDatabase, StatementPolicy};
use tower::ServiceExt;
use uuid::Uuid;

use super::TempDir;
use super::mock_llm::{MockLlm, MockReply};

const ARTISTS: &[&str] = &[
    "AC/DC",
    "Accept",
    "Aerosmith",
    "Alanis Morissette",
    "Alice In Chains",
    "Antônio Carlos Jobim",
    "Apocalyptica",
    "Audioslave",
    "BackBeat",
    "Billy Cobham",
    "Black Label Society",
    "Black Sabbath",
];

/// The router wired to a seeded SQLite database, a temp session dir and a mock LLM.
pub struct SqlChatApp {
    pub router: axum::Router,
    pub sessions: FileSessionStore,
    pub database: SqlDatabase,
    pub llm: MockLlm,
    _dir: TempDir,
}

impl SqlChatApp {
    pub async fn start(replies: Vec<MockReply>) -> Self {
        Self::start_with_policy(replies, StatementPolicy::AllowAll).await
    }

    pub async fn start_with_policy(replies: Vec<MockReply>, policy: StatementPolicy) -> Self {
        let dir = TempDir::new("sql-chat-it");
        let database = SqlDatabase::connect(&DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("chinook.db").display()),
            max_connections: 2,
            statement_timeout_ms: 5_000,
            schema_sample_rows: 3,
            statement_policy: StatementPolicy::AllowAll,
        })
        .await
        .expect("sqlite database should open");
        seed_chinook_subset(&database).await;
        database.close().await;

        let database = SqlDatabase::connect(&DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("chinook.db").display()),
            max_connections: 2,
            statement_timeout_ms: 5_000,
            schema_sample_rows: 3,
            statement_policy: policy,
        })
        .await
        .expect("sqlite database should reopen");

        let sessions = FileSessionStore::open(dir.path().join("sessions"), 3_600)
            .await
            .expect("session store should open");

        let llm = MockLlm::start(replies).await;
        let gateway = ChatCompletionsGateway::new(ChatCompletionsConfig {
            chat_completions_url: llm.url.clone(),
            api_key: "test-api-key".to_string(),
            model: "test-model".to_string(),
            timeout_ms: 5_000,
        })
        .expect("gateway should build");

        let state = AppState::new(
            database.clone(),
            sessions.clone(),
            Arc::new(gateway),
            ChainSettings::default(),
            false,
        )
        .expect("app state should build");

        Self {
            router: build_router(state),
            sessions,
            database,
            llm,
            _dir: dir,
        }
    }

    pub async fn conversation(&self, session_id: Uuid) -> Conversation {
        self.sessions
            .load(session_id, Utc::now())
            .await
            .expect("session should load")
            .expect("session should exist")
            .conversation
    }

    pub async fn artist_names(&self) -> String {
        let mut session = self.database.checkout().await.expect("checkout should succeed");
        session
            .execute("SELECT Name FROM Artist ORDER BY ArtistId")
            .await
            .expect("artist names should load")
    }
}

async fn seed_chinook_subset(database: &SqlDatabase) {
    let values = ARTISTS
        .iter()
        .enumerate()
        .map(|(index, name)| format!("({}, '{}')", index + 1, name.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ");
    let fixture = format!(
        "CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY, Name TEXT);
         INSERT INTO Artist (ArtistId, Name) VALUES {values};"
    );

    let mut session = database.checkout().await.expect("checkout should succeed");
    session.execute(&fixture).await.expect("fixture should load");
}

pub struct HtmlResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HtmlResponse {
    pub fn session_id(&self) -> Option<Uuid> {
        let value = self.headers.get(header::SET_COOKIE)?.to_str().ok()?;
        let (pair, _) = value.split_once(';')?;
        let (name, id) = pair.split_once('=')?;
        (name == SESSION_COOKIE_NAME)
            .then(|| Uuid::parse_str(id).ok())
            .flatten()
    }
}

pub async fn send(app: &axum::Router, request: Request<Body>) -> HtmlResponse {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should succeed");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should read");

    HtmlResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    }
}

pub fn get_index(session_id: Option<Uuid>) -> Request<Body> {
    request(Method::GET, "/", session_id, None)
}

pub fn post_query(session_id: Option<Uuid>, question: &str) -> Request<Body> {
    let body = format!("user_query={}", form_encode(question));
    request(Method::POST, "/query", session_id, Some(body))
}

pub fn request(
    method: Method,
    path: &str,
    session_id: Option<Uuid>,
    form_body: Option<String>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);

    if let Some(session_id) = session_id {
        builder = builder.header(
            header::COOKIE,
            format!("{SESSION_COOKIE_NAME}={session_id}"),
        );
    }
    if form_body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    }

    builder
        .body(Body::from(form_body.unwrap_or_default()))
        .expect("integration request should build")
}

fn form_encode(value: &str) -> String {
    value
        .bytes()
        .map(|byte| match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => {
                (byte as char).to_string()
            }
            b' ' => "+".to_string(),
            other => format!("%{other:02X}"),
        })
        .collect()
}
