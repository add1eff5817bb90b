use axum::Form;
use axum::extract::{Extension, State};
use axum::http::header::{HeaderMap, SET_COOKIE};
use axum::response::{Html, IntoResponse, Response};
use chrono::Utc;
use shared::llm::{ChainInput, SqlChain};
use shared::models::{QueryForm, Turn};
use shared::sessions::{SessionGuard, SessionRecord, SessionStoreError};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::AppState;
use super::cookies::{session_cookie, session_id_from_headers};
use super::errors::{blank_query_response, internal_error_response};
use super::observability::RequestContext;

/// A session resolved for one request, locked until this value drops.
struct ActiveSession {
    record: SessionRecord,
    _guard: SessionGuard,
}

pub(super) async fn index(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    headers: HeaderMap,
) -> Response {
    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(err) => {
            error!(request_id = %context.request_id, "failed to load session: {err}");
            return internal_error_response(&state.views);
        }
    };

    render_conversation(&state, &session.record)
}

pub(super) async fn query(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    headers: HeaderMap,
    Form(form): Form<QueryForm>,
) -> Response {
    let request_id = context.request_id.as_str();
    if form.user_query.trim().is_empty() {
        return blank_query_response(&state.views);
    }
    let question = form.user_query;

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(err) => {
            error!(request_id, "failed to load session: {err}");
            return internal_error_response(&state.views);
        }
    };
    let session_id = session.record.session_id;
    let history = session.record.conversation.turns().to_vec();

    if let Err(err) = state
        .sessions
        .append(session_id, Turn::user(question.as_str()), Utc::now())
        .await
    {
        error!(request_id, %session_id, "failed to persist user turn: {err}");
        return with_session_cookie(&state, session_id, internal_error_response(&state.views));
    }

    let mut database = match state.database.checkout().await {
        Ok(database) => database,
        Err(err) => {
            error!(request_id, %session_id, stage = "checkout_connection", "sql chat failed: {err}");
            return with_session_cookie(&state, session_id, internal_error_response(&state.views));
        }
    };

    let requester_id = session_id.to_string();
    let chain = SqlChain::new(
        state.llm_gateway.as_ref(),
        state.prompts.as_ref(),
        state.chain_settings,
    );
    let outcome = chain
        .run(
            &mut database,
            ChainInput {
                history: &history,
                question: &question,
                request_id: Some(request_id),
                requester_id: Some(&requester_id),
            },
        )
        .await;
    drop(database);

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(request_id, %session_id, stage = err.stage(), "sql chat failed: {err}");
            return with_session_cookie(&state, session_id, internal_error_response(&state.views));
        }
    };
    info!(
        request_id,
        %session_id,
        result_bytes = outcome.result.len(),
        answer_bytes = outcome.answer.len(),
        "sql chat answered"
    );

    let record = match state
        .sessions
        .append(session_id, Turn::assistant(outcome.answer), Utc::now())
        .await
    {
        Ok(record) => record,
        Err(err) => {
            error!(request_id, %session_id, "failed to persist assistant turn: {err}");
            return with_session_cookie(&state, session_id, internal_error_response(&state.views));
        }
    };

    render_conversation(&state, &record)
}

/// Resolves the cookie's session, or starts a new one when the cookie is absent, malformed,
/// expired, or unknown. The returned session stays locked for the rest of the request.
async fn open_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<ActiveSession, SessionStoreError> {
    if let Some(session_id) = session_id_from_headers(headers) {
        let guard = state.session_locks.acquire(session_id).await;
        match state.sessions.load(session_id, Utc::now()).await {
            Ok(Some(record)) => {
                return Ok(ActiveSession {
                    record,
                    _guard: guard,
                });
            }
            Ok(None) => {}
            Err(SessionStoreError::InvalidData(reason)) => {
                warn!(%session_id, "discarding unreadable session: {reason}");
            }
            Err(err) => return Err(err),
        }
    }

    let session_id = Uuid::new_v4();
    let guard = state.session_locks.acquire(session_id).await;
    let record = state.sessions.get_or_create(session_id, Utc::now()).await?;
    Ok(ActiveSession {
        record,
        _guard: guard,
    })
}

fn render_conversation(state: &AppState, record: &SessionRecord) -> Response {
    match state.views.conversation(record.conversation.turns()) {
        Ok(body) => with_session_cookie(state, record.session_id, Html(body).into_response()),
        Err(err) => {
            error!(session_id = %record.session_id, "failed to render conversation: {err}");
            internal_error_response(&state.views)
        }
    }
}

fn with_session_cookie(state: &AppState, session_id: Uuid, mut response: Response) -> Response {
    response.headers_mut().insert(
        SET_COOKIE,
        session_cookie(session_id, state.sessions.ttl_seconds(), state.cookie_secure),
    );
    response
}
