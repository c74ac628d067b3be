//! Backend HTTP client.
//!
//! One `reqwest::Client` shared by every endpoint wrapper. Requests to
//! authenticated endpoints carry the persisted bearer token; successful auth
//! responses hand a fresh token back through the `Authorization` header,
//! which is persisted before the body is returned.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Span, debug, error, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::credentials::{AuthToken, Credentials};

use super::error::ApiError;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Endpoints under these prefixes never receive the bearer token.
const UNAUTHENTICATED_PREFIXES: &[&str] = &["/auth", "/public"];

/// Auth endpoints: successful responses may carry a new token.
const AUTH_PREFIX: &str = "/auth";

/// Backend API client.
///
/// Cheap to clone; clones share the connection pool and the credential store.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Transport` if the HTTP client cannot be built
    /// (e.g., the TLS backend fails to initialize).
    pub fn new(config: &ClientConfig, credentials: Credentials) -> Result<Self, ApiError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.base_url.clone(),
                credentials,
            }),
        })
    }

    /// The credential store this client reads tokens from.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    /// The backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Send a request and decode the JSON response.
    ///
    /// Empty success bodies decode as JSON `null`, so `()` and `Option<T>`
    /// work for endpoints that return nothing.
    ///
    /// # Errors
    ///
    /// - `ApiError::Transport` if no response was received
    /// - `ApiError::Rejected` for non-success statuses
    /// - `ApiError::Decode` if a success body does not match `T`
    /// - `ApiError::InvalidEndpoint` if `endpoint` cannot be joined onto the base URL
    pub async fn request<B, T>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.exchange(method, endpoint, body)
            .await
            .map(|(value, _)| value)
    }

    /// [`ApiClient::request`], also returning the token this response
    /// issued, if any.
    ///
    /// Only auth endpoints issue tokens. The token is returned only once it
    /// has been persisted.
    #[instrument(
        skip(self, body),
        fields(method = %method, endpoint = %endpoint, request_id = tracing::field::Empty)
    )]
    pub(crate) async fn exchange<B, T>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<(T, Option<AuthToken>), ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url_for(endpoint)?;
        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", request_id.as_str());

        let mut builder = self
            .inner
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, &request_id);

        if requires_auth(endpoint) {
            if let Some(token) = self.inner.credentials.token() {
                builder = builder.bearer_auth(token.expose());
            } else {
                debug!("No auth token stored; sending request unauthenticated");
            }
        }

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.inspect_err(|e| {
            warn!(error = %e, "Request failed before a response arrived");
        })?;

        let status = response.status();
        let issued_token = (is_auth_endpoint(endpoint) && status.is_success())
            .then(|| {
                response
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(AuthToken::from_bearer_header)
            })
            .flatten();

        let text = response.text().await?;

        if !status.is_success() {
            let err = ApiError::from_response(status.as_u16(), &text);
            warn!(
                status = %status,
                code = err.code().unwrap_or_default(),
                "Backend rejected request"
            );
            return Err(err);
        }

        let body = if text.trim().is_empty() { "null" } else { &text };
        let value = serde_json::from_str(body).map_err(|e| {
            error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to decode backend response"
            );
            ApiError::Decode(e.to_string())
        })?;

        let issued_token = issued_token.filter(|token| {
            self.inner
                .credentials
                .store_token(token)
                .inspect_err(|e| error!(error = %e, "Failed to persist auth token"))
                .is_ok()
        });

        Ok((value, issued_token))
    }

    /// `GET` an endpoint.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request::<(), T>(Method::GET, endpoint, None).await
    }

    /// `POST` a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    /// `PUT` a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn put<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.request(Method::PUT, endpoint, Some(body)).await
    }

    fn url_for(&self, endpoint: &str) -> Result<Url, ApiError> {
        self.inner
            .base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|source| ApiError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                source,
            })
    }
}

/// Whether `endpoint` sits under `prefix` as a whole path segment.
fn under_prefix(endpoint: &str, prefix: &str) -> bool {
    let path = format!("/{}", endpoint.trim_start_matches('/'));
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?']))
}

fn requires_auth(endpoint: &str) -> bool {
    !UNAUTHENTICATED_PREFIXES
        .iter()
        .any(|prefix| under_prefix(endpoint, prefix))
}

fn is_auth_endpoint(endpoint: &str) -> bool {
    under_prefix(endpoint, AUTH_PREFIX)
}
