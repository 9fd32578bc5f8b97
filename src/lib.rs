use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, Method, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};
use uuid::Uuid;

// --- Module Structure ---

// Core application services and components.
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod session;

// Module for routing segregation (public vs. verified).
pub mod routes;

use error::AppError;
use guard::{GuardOutcome, RequestContext, RouteTable};
use session::{SESSION_COOKIE, Session, cookie_value};

// --- Public Re-exports ---

// Makes core state types easily accessible to the binary entry point and tests.
pub use client::{ApiClient, ApiError};
pub use config::AppConfig;
pub use repository::{InMemoryRepository, Repository, RepositoryState};
pub use session::{InMemorySessionStore, SessionState, SessionStore};

/// Upper bound on buffered request bodies. The portal only ever receives small
/// JSON payloads; anything larger is malformed by definition.
const BODY_LIMIT: usize = 1 << 20;

/// AppState
///
/// The single, thread-safe container holding all application services and
/// configuration, shared across all incoming requests and passed explicitly to
/// every handler via the RequestContext. Nothing in the portal reads ambient
/// globals.
#[derive(Clone)]
pub struct AppState {
    /// Session layer: the server-side principals consulted by the route guard.
    pub sessions: SessionState,
    /// Repository layer: users, categories, products and per-user entries.
    pub repo: RepositoryState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

/// create_router
///
/// Assembles the application: builds the ordered route table once, installs
/// the dispatcher as the sole entry point, and applies the observability and
/// CORS layers. All routing decisions happen inside the guard table, not in
/// axum's own router, so the protection model stays an explicit, testable
/// function.
pub fn create_router(state: AppState) -> Router {
    let table = Arc::new(routes::route_table());

    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .fallback({
            move |State(state): State<AppState>, request: Request| {
                let table = table.clone();
                async move { dispatch(table, state, request).await }
            }
        })
        .with_state(state);

    // Observability and correlation layers, outermost first: every request
    // gets a UUID, a tracing span carrying it, and the id echoed back to the
    // client.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// dispatch
///
/// Runs one request through the guard table and renders the outcome.
///
/// Order of operations: resolve the session snapshot from the `session`
/// cookie, evaluate the table (a pure decision), then either render the
/// capability failure or buffer the body and invoke the matched handler with
/// an explicit RequestContext. The session is read exactly once, so the whole
/// evaluation observes one consistent snapshot even if a concurrent request
/// mutates the store.
async fn dispatch(table: Arc<RouteTable>, state: AppState, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);

    let session = resolve_session(&state, &parts.headers).await;
    let xhr = is_xhr(&parts.headers);

    match table.evaluate(&method, &path, session.as_ref()) {
        GuardOutcome::NotFound => {
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "message": "Not Found." })),
            )
                .into_response()
        }
        GuardOutcome::Unauthenticated => {
            tracing::debug!(%method, %path, "unauthenticated request challenged");
            if xhr {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({ "message": "Unauthenticated." })),
                )
                    .into_response()
            } else {
                Redirect::to("/login").into_response()
            }
        }
        GuardOutcome::Unverified => {
            tracing::debug!(%method, %path, "unverified session redirected");
            if xhr {
                (
                    StatusCode::FORBIDDEN,
                    Json(serde_json::json!({ "message": "Your email address is not verified." })),
                )
                    .into_response()
            } else {
                Redirect::to("/email/verify").into_response()
            }
        }
        GuardOutcome::Dispatch { handler, params } => {
            // CSRF check: mutating requests riding a session must echo the
            // token from the XSRF-TOKEN cookie. Anonymous mutations (login,
            // register, password reset) have no token to echo yet.
            if let Some(session) = &session {
                if mutates(&method) && !csrf_matches(&parts.headers, session) {
                    return AppError::CsrfMismatch.into_response();
                }
            }

            let body = match axum::body::to_bytes(body, BODY_LIMIT).await {
                Ok(bytes) => bytes,
                Err(_) => return AppError::MalformedPayload.into_response(),
            };

            let ctx = RequestContext {
                state,
                session,
                params,
                method,
                headers: parts.headers,
                query,
                body,
            };
            match handler(ctx).await {
                Ok(response) => response,
                Err(error) => error.into_response(),
            }
        }
    }
}

/// Resolves the session snapshot for this request, if the cookie names a live
/// one. A malformed or stale cookie reads the same as no cookie at all.
async fn resolve_session(state: &AppState, headers: &HeaderMap) -> Option<Session> {
    let id: Uuid = cookie_value(headers, SESSION_COOKIE)?.parse().ok()?;
    state.sessions.get(id).await
}

fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
}

fn mutates(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn csrf_matches(headers: &HeaderMap, session: &Session) -> bool {
    headers
        .get("x-xsrf-token")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|token| token == session.csrf_token.to_string())
}

/// trace_span_logger
///
/// Helper used by `TraceLayer` to customize span creation: the generated
/// `x-request-id` is included alongside the method and URI so every log line
/// for a single request is correlated by a unique id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
