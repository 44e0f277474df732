//! Shared harness: spawns the full app on an ephemeral port against the
//! in-memory repository and a deterministic stub executor, so no Docker or
//! isolate binary is needed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use common::JobResult;
use common::language::Language;
use common::repository::Repository;
use executor::pool::JobExecutor;

use server::config::AppConfig;
use server::repository::MemoryRepository;
use server::rooms::GlobalRooms;
use server::state::AppState;
use server::{build_router, seed};

/// Stands in for the execution pool: fails when the code contains "raise",
/// succeeds otherwise.
struct StubExecutor;

#[async_trait]
impl JobExecutor for StubExecutor {
    async fn execute(&self, _language: Language, code: String, _stdin: Option<String>) -> JobResult {
        if code.contains("raise") {
            JobResult::failed("Traceback: boom\n".to_string(), "exited with code 1", 3)
        } else {
            JobResult::succeeded("ok\n".to_string(), 3)
        }
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
}

pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let repo = Arc::new(MemoryRepository::new());
        seed::seed_dev_data(&repo);
        let repo: Arc<dyn Repository> = repo;

        let rooms = Arc::new(GlobalRooms::new(repo.clone(), Arc::new(StubExecutor)));
        let config = AppConfig::load().expect("config defaults should load");

        let state = AppState {
            repo,
            rooms,
            config,
        };
        let app = build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("listener has an address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server crashed");
        });

        Self {
            addr,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> ApiResponse {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("request failed");
        Self::into_api_response(response).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> ApiResponse {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("request failed");
        Self::into_api_response(response).await
    }

    pub async fn delete(&self, path: &str) -> ApiResponse {
        let response = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("request failed");
        Self::into_api_response(response).await
    }

    async fn into_api_response(response: reqwest::Response) -> ApiResponse {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        ApiResponse { status, body }
    }

    /// Opens the SSE stream for (room, player) and waits for the join
    /// handshake to be visible server-side.
    pub async fn open_events(&self, room_id: i64, player_id: i64) -> EventStream {
        let response = self
            .client
            .get(self.url(&format!("/events?room_id={room_id}&player_id={player_id}")))
            .send()
            .await
            .expect("SSE request failed");

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );

        EventStream {
            response,
            buffer: String::new(),
        }
    }

    /// Polls `check` until it passes or two seconds elapse.
    pub async fn wait_until<F, Fut>(&self, mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        timeout(Duration::from_secs(2), async {
            loop {
                if check().await {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("condition not reached in time")
    }
}

/// Incremental reader over one client's SSE stream.
pub struct EventStream {
    response: reqwest::Response,
    buffer: String,
}

impl EventStream {
    /// Reads frames until `needle` shows up in the accumulated stream text.
    /// Panics after two seconds without it.
    pub async fn wait_for(&mut self, needle: &str) -> String {
        let outcome = timeout(Duration::from_secs(2), async {
            while !self.buffer.contains(needle) {
                match self.response.chunk().await.expect("SSE read failed") {
                    Some(chunk) => self.buffer.push_str(&String::from_utf8_lossy(&chunk)),
                    None => panic!("SSE stream ended while waiting for {needle:?}"),
                }
            }
        })
        .await;

        if outcome.is_err() {
            panic!("timed out waiting for {needle:?}; saw: {}", self.buffer);
        }
        self.buffer.clone()
    }

    /// Whether the stream has shown `needle` so far.
    pub fn saw(&self, needle: &str) -> bool {
        self.buffer.contains(needle)
    }
}
