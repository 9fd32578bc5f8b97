use reqwest::{
    Client, Method, Response, StatusCode, Url,
    cookie::{CookieStore, Jar},
};
use std::sync::Arc;
use thiserror::Error;

/// Path of the re-authentication entry point. A 401 arising from a request to
/// this path never triggers the redirect callback, which is what breaks the
/// potential redirect loop when the login request itself is rejected.
const LOGIN_PATH: &str = "/login";

/// The marker header distinguishing programmatic requests from full page
/// navigations, so the server signals auth failures with a status instead of
/// a redirect.
const REQUESTED_WITH: &str = "XMLHttpRequest";

/// Callback fired when a response comes back 401. In a browser-style embedding
/// this navigates to the login view; because that navigation tears the process
/// down, the callback must be infallible and safe to invoke redundantly from
/// concurrent in-flight requests.
pub type OnUnauthenticated = Arc<dyn Fn() + Send + Sync>;

/// ApiError
///
/// The rejected outcome an [`ApiClient`] call resolves to. Error responses are
/// surfaced with their payload attached, so calling code can still distinguish
/// and render them; the interceptor never swallows an error.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered 401. The login redirect has already been triggered
    /// (unless the request targeted the login path itself).
    #[error("unauthenticated")]
    Unauthenticated { body: String },

    /// Any other error status. No side effect was taken.
    #[error("request failed with status {status}")]
    Status { status: StatusCode, body: String },

    /// The transport failed before a response arrived: network failure,
    /// timeout, aborted request. No status exists to inspect, so no
    /// auth-specific action is taken.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("invalid request URL")]
    InvalidUrl,
}

/// ApiClient
///
/// The portal's HTTP client: a `reqwest::Client` with a cookie jar, wrapped by
/// the single choke point every response passes through before reaching
/// calling code. The wrapper applies the cross-cutting session-expiry rule
/// exactly once per response, so no call site has to duplicate it.
///
/// Request defaults, applied to every outgoing request:
/// - `X-Requested-With: XMLHttpRequest` (the programmatic-request marker);
/// - `X-XSRF-TOKEN`, echoing the `XSRF-TOKEN` cookie the server set at login.
pub struct ApiClient {
    http: Client,
    base: Url,
    jar: Arc<Jar>,
    on_unauthenticated: OnUnauthenticated,
}

impl ApiClient {
    /// Builds a client rooted at `base_url`. `on_unauthenticated` is the
    /// re-authentication entry point, injected explicitly rather than looked
    /// up from any global.
    pub fn new(base_url: &str, on_unauthenticated: OnUnauthenticated) -> Result<Self, ApiError> {
        let base = Url::parse(base_url).map_err(|_| ApiError::InvalidUrl)?;
        let jar = Arc::new(Jar::default());
        let http = Client::builder().cookie_provider(jar.clone()).build()?;
        Ok(Self {
            http,
            base,
            jar,
            on_unauthenticated,
        })
    }

    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Response, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &serde_json::Value) -> Result<Response, ApiError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, ApiError> {
        self.request(Method::DELETE, path, None).await
    }

    /// request
    ///
    /// The choke point. Applies the request defaults, sends, and then inspects
    /// the response exactly once:
    /// - success status: the response passes through unchanged;
    /// - 401: fire `on_unauthenticated` (skipped for the login path), then
    ///   reject with the response payload;
    /// - other error status: reject with the payload, no side effect;
    /// - no response at all: reject with the transport error untouched.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, ApiError> {
        let url = self.base.join(path).map_err(|_| ApiError::InvalidUrl)?;
        let mut request = self
            .http
            .request(method, url.clone())
            .header("X-Requested-With", REQUESTED_WITH);
        if let Some(token) = self.csrf_token() {
            request = request.header("X-XSRF-TOKEN", token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        // A request that never produced a response carries no status, so the
        // `?` here is the whole cancellation/timeout story.
        let response = request.send().await?;

        let status = response.status();
        if !status.is_client_error() && !status.is_server_error() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            if url.path().trim_end_matches('/') != LOGIN_PATH {
                (self.on_unauthenticated)();
            }
            return Err(ApiError::Unauthenticated { body });
        }
        Err(ApiError::Status { status, body })
    }

    /// Reads the CSRF token the server planted in the `XSRF-TOKEN` cookie.
    /// None before the first login response has been observed.
    fn csrf_token(&self) -> Option<String> {
        let cookies = self.jar.cookies(&self.base)?;
        let cookies = cookies.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == crate::session::XSRF_COOKIE).then(|| value.to_string())
        })
    }
}
