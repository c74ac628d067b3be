//! Integration tests for the Destiny client.
//!
//! The tests run the real `ApiClient` over HTTP against [`FakeBackend`], an
//! in-process axum server bound to an ephemeral port. Nothing external is
//! needed:
//!
//! ```bash
//! cargo test -p destiny-integration-tests
//! ```
//!
//! # Fake backend routes
//!
//! ```text
//! POST /auth/v1/otp/send                    - Always accepted
//! POST /auth/v1/otp/verify                  - Code 000000 is rejected; the
//!                                             notoken@ address gets no token
//! POST /auth/v1/oauth/{provider}/callback   - Issues a token
//! GET  /public/plans                        - Unauthenticated plan list
//! GET  /user_profile/v1                     - Requires the issued token
//! PUT  /user_profile/v1/update_user_profile - Requires the issued token;
//!                                             birthCity is normalized
//! POST /user/order/v1                       - Plan "retired" is not found
//! GET  /user/order/v1/{orderId}             - Scripted statuses; "missing" is not found
//! GET  /user/payment/v1/{transactionId}/status - Scripted results
//! GET  /user/garbage                        - 200 with a non-JSON body
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

use destiny_client::credentials::keys;
use destiny_client::{ApiClient, ClientConfig, Credentials, MemoryStore};

/// Token the fake backend issues on sign-in and accepts afterwards.
pub const TEST_TOKEN: &str = "test-session-token";

/// OTP code the fake backend always rejects.
pub const REJECTED_CODE: &str = "000000";

/// Email for which verification succeeds without issuing a token.
pub const TOKENLESS_EMAIL: &str = "notoken@example.com";

/// What the fake backend saw for one request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub request_id: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Default)]
struct BackendState {
    requests: Mutex<Vec<RecordedRequest>>,
    order_statuses: Mutex<VecDeque<String>>,
    transaction_results: Mutex<VecDeque<Value>>,
}

/// In-process stand-in for the Destiny backend.
///
/// The server task stops when the backend is dropped.
pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
    server: JoinHandle<()>,
}

impl FakeBackend {
    /// Bind to `127.0.0.1:0` and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());
        let app = routes()
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                record_request,
            ))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake backend");
        let addr = listener.local_addr().expect("Fake backend has no address");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Base URL of the running server.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration pointing at this backend.
    ///
    /// # Panics
    ///
    /// Panics if the base URL is rejected, which would be a bug in the test
    /// setup.
    #[must_use]
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(&self.base_url()).expect("Fake backend URL is valid")
    }

    /// A client with an empty in-memory credential store.
    #[must_use]
    pub fn client(&self) -> (ApiClient, Credentials) {
        self.client_with_store(MemoryStore::new())
    }

    /// A client whose store already holds the token this backend accepts.
    #[must_use]
    pub fn signed_in_client(&self) -> (ApiClient, Credentials) {
        self.client_with_store(MemoryStore::with_entries([(keys::AUTH_TOKEN, TEST_TOKEN)]))
    }

    fn client_with_store(&self, store: MemoryStore) -> (ApiClient, Credentials) {
        let credentials = Credentials::new(Arc::new(store));
        let api = ApiClient::new(&self.config(), credentials.clone())
            .expect("Failed to build API client");
        (api, credentials)
    }

    /// Every request received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state.requests).clone()
    }

    /// Requests received for exactly `path`.
    #[must_use]
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Statuses returned by the order endpoint, in order. The last one repeats.
    pub fn script_order_statuses(&self, statuses: &[&str]) {
        *lock(&self.state.order_statuses) = statuses.iter().map(ToString::to_string).collect();
    }

    /// Bodies returned by the transaction endpoint, in order. The last one repeats.
    pub fn script_transaction_results(&self, results: Vec<Value>) {
        *lock(&self.state.transaction_results) = results.into();
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A base URL nothing listens on, for connection-refused scenarios.
///
/// # Panics
///
/// Panics if no ephemeral port can be reserved.
#[must_use]
pub fn unreachable_base_url() -> String {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to reserve a port");
    let addr = listener.local_addr().expect("Reserved port has no address");
    drop(listener);
    format!("http://{addr}")
}

/// The profile the fake backend returns for the signed-in user.
#[must_use]
pub fn test_profile() -> Value {
    json!({
        "id": "u-1",
        "username": "stargazer",
        "email": "star@example.com",
        "firstName": "Luna",
        "lastName": "Vega",
        "gender": "FEMALE",
        "birthDate": "1990-04-12",
        "birthTime": "06:30",
        "birthCity": "Lisbon",
        "birthCountry": "Portugal",
        "enabled": true,
        "roles": ["USER"]
    })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn next_scripted<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut queue = lock(queue);
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn routes() -> Router<Arc<BackendState>> {
    Router::new()
        .route("/auth/v1/otp/send", post(send_otp))
        .route("/auth/v1/otp/verify", post(verify_otp))
        .route("/auth/v1/oauth/{provider}/callback", post(oauth_callback))
        .route("/public/plans", get(plans))
        .route("/user_profile/v1", get(profile))
        .route("/user_profile/v1/update_user_profile", put(update_profile))
        .route("/user/order/v1", post(create_order))
        .route("/user/order/v1/{order_id}", get(order_status))
        .route(
            "/user/payment/v1/{transaction_id}/status",
            get(transaction_status),
        )
        .route("/user/garbage", get(garbage))
}

async fn record_request(
    State(state): State<Arc<BackendState>>,
    request: Request,
    next: Next,
) -> Response {
    // The borrow of `request` must end before the await below.
    let recorded = {
        let header_value = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        RecordedRequest {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            authorization: header_value(header::AUTHORIZATION.as_str()),
            request_id: header_value("x-request-id"),
            user_agent: header_value(header::USER_AGENT.as_str()),
        }
    };
    lock(&state.requests).push(recorded);

    next.run(request).await
}

fn is_authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TEST_TOKEN}"))
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "code": code, "message": message, "severity": "WARNING" })),
    )
        .into_response()
}

fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "TOKEN_INVALID", "invalid token")
}

fn signed_in(body: Value) -> Response {
    (
        [(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))],
        Json(body),
    )
        .into_response()
}

async fn send_otp() -> Json<Value> {
    Json(json!({}))
}

#[derive(Deserialize)]
struct VerifyOtp {
    email: String,
    code: String,
}

async fn verify_otp(Json(body): Json<VerifyOtp>) -> Response {
    if body.code == REJECTED_CODE {
        return error_response(StatusCode::BAD_REQUEST, "INVALID_OTP", "wrong code");
    }
    if body.email == TOKENLESS_EMAIL {
        return Json(test_profile()).into_response();
    }
    signed_in(test_profile())
}

async fn oauth_callback(Path(provider): Path<String>, Json(body): Json<Value>) -> Response {
    if provider != "google" || body.get("redirectUri").is_none() {
        return error_response(StatusCode::BAD_REQUEST, "OAUTH_FAILED", "bad callback");
    }
    signed_in(test_profile())
}

async fn plans() -> Json<Value> {
    Json(json!([{ "id": "annual" }, { "id": "monthly" }]))
}

async fn profile(headers: HeaderMap) -> Response {
    if !is_authorized(&headers) {
        return unauthorized();
    }
    Json(test_profile()).into_response()
}

async fn update_profile(headers: HeaderMap, Json(update): Json<Value>) -> Response {
    if !is_authorized(&headers) {
        return unauthorized();
    }
    let mut profile = test_profile();
    if let (Some(target), Some(fields)) = (profile.as_object_mut(), update.as_object()) {
        for (key, value) in fields {
            let value = match (key.as_str(), value.as_str()) {
                ("birthCity", Some(city)) => Value::String(title_case(city)),
                _ => value.clone(),
            };
            target.insert(key.clone(), value);
        }
    }
    Json(profile).into_response()
}

/// The backend stores city names trimmed and capitalized.
fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrder {
    plan_id: String,
}

async fn create_order(headers: HeaderMap, Json(body): Json<CreateOrder>) -> Response {
    if !is_authorized(&headers) {
        return unauthorized();
    }
    if body.plan_id == "retired" {
        return error_response(StatusCode::NOT_FOUND, "PLAN_NOT_FOUND", "no such plan");
    }
    Json(json!({
        "orderId": "o1",
        "checkoutUrl": "https://checkout.example/o1"
    }))
    .into_response()
}

async fn order_status(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response {
    if !is_authorized(&headers) {
        return unauthorized();
    }
    if order_id == "missing" {
        return error_response(StatusCode::NOT_FOUND, "ORDER_NOT_FOUND", "no such order");
    }
    let status = next_scripted(&state.order_statuses).unwrap_or_else(|| "PAID".to_string());
    Json(json!({ "orderId": order_id, "status": status })).into_response()
}

async fn transaction_status(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(_transaction_id): Path<String>,
) -> Response {
    if !is_authorized(&headers) {
        return unauthorized();
    }
    let result =
        next_scripted(&state.transaction_results).unwrap_or_else(|| json!({ "result": "SUCCESS" }));
    Json(result).into_response()
}

async fn garbage() -> &'static str {
    "<html>definitely not json</html>"
}
