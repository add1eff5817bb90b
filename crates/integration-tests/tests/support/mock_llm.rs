use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: StatusCode,
    pub body: Value,
    pub delay: Option<Duration>,
}

impl MockReply {
    pub fn text(content: &str) -> Self {
        Self {
            status: StatusCode::OK,
            body: json!({
                "id": "req-mock",
                "model": "mock-model",
                "choices": [
                    { "message": { "role": "assistant", "content": content } }
                ],
                "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
            }),
            delay: None,
        }
    }

    pub fn provider_error(status: StatusCode, code: &str) -> Self {
        Self {
            status,
            body: json!({ "error": { "code": code } }),
            delay: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// One chat-completions call as the mock saw it.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub prompt: String,
    pub temperature: f64,
    pub user: Option<String>,
}

#[derive(Clone)]
struct MockState {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

/// An OpenAI-compatible chat-completions endpoint replaying queued replies.
pub struct MockLlm {
    pub url: String,
    state: MockState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_task: Option<JoinHandle<()>>,
}

impl MockLlm {
    pub async fn start(replies: Vec<MockReply>) -> Self {
        let state = MockState {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(chat_completions_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let local_addr = listener
            .local_addr()
            .expect("listener address should resolve");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server_task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

            server.await.expect("mock llm server should run");
        });

        Self {
            url: format!("http://{local_addr}/v1/chat/completions"),
            state,
            shutdown_tx: Some(shutdown_tx),
            server_task: Some(server_task),
        }
    }

    pub async fn seen(&self) -> Vec<SeenRequest> {
        self.state.seen.lock().await.clone()
    }

    pub async fn remaining_replies(&self) -> usize {
        self.state.replies.lock().await.len()
    }

    pub async fn shutdown(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(server_task) = self.server_task.take() {
            server_task.await.expect("mock llm server should join");
        }
    }
}

async fn chat_completions_handler(
    State(state): State<MockState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let prompt = payload["messages"][0]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    state.seen.lock().await.push(SeenRequest {
        prompt,
        temperature: payload["temperature"].as_f64().unwrap_or(f64::NAN),
        user: payload["user"].as_str().map(str::to_string),
    });

    let reply = state.replies.lock().await.pop_front().unwrap_or_else(|| {
        MockReply::provider_error(StatusCode::INTERNAL_SERVER_ERROR, "exhausted_test_replies")
    });
    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }

    (reply.status, Json(reply.body))
}
