//! # Mock easybackend
//!
//! In-process axum server speaking the easybackend REST API and the
//! identity provider's password grant. Tokens can be expired or rejected on
//! demand to drive the renewal path.

use axum::extract::{Form, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use eb_01_easybackend::EasyBackendSettings;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::error;

pub const REALM: &str = "easybackend";
pub const INITIAL_TAG: &str = "_round0";

struct Item {
    scope: String,
    receiver: String,
    body: Value,
}

struct User {
    password: String,
    identity: String,
}

#[derive(Default)]
struct MockState {
    users: Mutex<HashMap<String, User>>,
    tokens: Mutex<HashMap<String, String>>,
    items: Mutex<BTreeMap<u64, Item>>,
    initial_sent: Mutex<HashSet<(String, String)>>,
    next_id: AtomicU64,
    next_token: AtomicU64,
    reject_next: AtomicUsize,
    token_requests: AtomicUsize,
}

impl MockState {
    fn store(&self, scope: String, receiver: String, content: String) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let body = json!({ "id": id, "content": content });
        self.items.lock().insert(
            id,
            Item {
                scope,
                receiver,
                body,
            },
        );
        id
    }

    /// Identity behind the request's bearer token.
    fn authorize(&self, headers: &HeaderMap) -> Result<String, StatusCode> {
        if self
            .reject_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;
        self.tokens
            .lock()
            .get(token)
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }

    fn items_for(&self, identity: &str, accept: impl Fn(&str) -> bool) -> Vec<Value> {
        self.items
            .lock()
            .values()
            .filter(|item| item.receiver == identity && accept(&item.scope))
            .map(|item| item.body.clone())
            .collect()
    }
}

type Shared = State<Arc<MockState>>;

async fn token(
    State(state): Shared,
    Path(realm): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_requests.fetch_add(1, Ordering::SeqCst);
    if realm != REALM {
        return StatusCode::NOT_FOUND.into_response();
    }
    if form.get("grant_type").map(String::as_str) != Some("password")
        || !form.contains_key("client_id")
    {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_request" })))
            .into_response();
    }

    let username = form.get("username").cloned().unwrap_or_default();
    let password = form.get("password").cloned().unwrap_or_default();
    let identity = match state.users.lock().get(&username) {
        Some(user) if user.password == password => user.identity.clone(),
        _ => {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_grant" })))
                .into_response()
        }
    };

    let token = format!("token-{}", state.next_token.fetch_add(1, Ordering::SeqCst) + 1);
    state.tokens.lock().insert(token.clone(), identity);
    Json(json!({ "access_token": token, "token_type": "Bearer" })).into_response()
}

async fn receive(State(state): Shared, headers: HeaderMap, Path(scope): Path<String>) -> Response {
    match state.authorize(&headers) {
        Ok(identity) => Json(state.items_for(&identity, |s| s == scope)).into_response(),
        Err(status) => status.into_response(),
    }
}

async fn list_initial(State(state): Shared, headers: HeaderMap) -> Response {
    match state.authorize(&headers) {
        Ok(identity) => {
            Json(state.items_for(&identity, |s| s.contains(INITIAL_TAG))).into_response()
        }
        Err(status) => status.into_response(),
    }
}

async fn send(
    State(state): Shared,
    headers: HeaderMap,
    Path((scope, receiver)): Path<(String, String)>,
    body: String,
) -> Response {
    if let Err(status) = state.authorize(&headers) {
        return status.into_response();
    }
    if scope.contains(INITIAL_TAG)
        && !state
            .initial_sent
            .lock()
            .insert((scope.clone(), receiver.clone()))
    {
        return (StatusCode::IM_A_TEAPOT, "initial message already sent").into_response();
    }
    state.store(scope, receiver, body);
    StatusCode::OK.into_response()
}

async fn delete_one(State(state): Shared, headers: HeaderMap, Path(id): Path<u64>) -> Response {
    let identity = match state.authorize(&headers) {
        Ok(identity) => identity,
        Err(status) => return status.into_response(),
    };
    let mut items = state.items.lock();
    match items.get(&id) {
        Some(item) if item.receiver == identity => {
            items.remove(&id);
            StatusCode::OK.into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_all(State(state): Shared, headers: HeaderMap) -> Response {
    match state.authorize(&headers) {
        Ok(identity) => {
            state.items.lock().retain(|_, item| item.receiver != identity);
            StatusCode::OK.into_response()
        }
        Err(status) => status.into_response(),
    }
}

/// Running mock server; stops when dropped.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockBackend {
    /// Bind to an ephemeral local port and serve in the background.
    ///
    /// # Errors
    ///
    /// I/O error if no local port can be bound.
    pub async fn start() -> std::io::Result<Self> {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route(
                "/auth/realms/:realm/protocol/openid-connect/token",
                post(token),
            )
            .route("/api/easybackend/receive/:scope", get(receive))
            .route("/api/easybackend/send/:scope/:receiver", post(send))
            .route("/api/easybackend/message/:id", delete(delete_one))
            .route("/api/easybackend/message", delete(delete_all))
            .route("/api/easybackend/list/_round0", get(list_initial))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "Mock backend stopped");
            }
        });

        Ok(Self { addr, state, task })
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Register an account whose messages are addressed to `identity`.
    pub fn add_user(&self, username: &str, password: &str, identity: &str) {
        self.state.users.lock().insert(
            username.to_string(),
            User {
                password: password.to_string(),
                identity: identity.to_string(),
            },
        );
    }

    /// Client settings for an account on this server.
    #[must_use]
    pub fn settings(&self, username: &str, password: &str) -> EasyBackendSettings {
        EasyBackendSettings {
            allow_insecure_http: true,
            request_timeout_ms: 5_000,
            check_interval_ms: 20,
            ..EasyBackendSettings::new(self.url(), username, password)
        }
    }

    /// Invalidate every issued token.
    pub fn expire_tokens(&self) {
        self.state.tokens.lock().clear();
    }

    /// Answer the next `n` API calls with 401 regardless of the token.
    pub fn reject_next(&self, n: usize) {
        self.state.reject_next.store(n, Ordering::SeqCst);
    }

    #[must_use]
    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    /// Store a raw JSON item for `receiver` within `scope`.
    pub fn inject_item(&self, scope: &str, receiver: &str, body: Value) {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.items.lock().insert(
            id,
            Item {
                scope: scope.to_string(),
                receiver: receiver.to_string(),
                body,
            },
        );
    }

    /// Number of stored items.
    #[must_use]
    pub fn stored(&self) -> usize {
        self.state.items.lock().len()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}
