use axum::{
    body::Bytes,
    http::{HeaderMap, Method},
    response::Response,
};
use serde::de::DeserializeOwned;
use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use crate::{AppState, error::AppError, session::Session};

/// Capability
///
/// A named precondition a request must satisfy before its handler runs. The
/// capability set on a route entry is the whole protection model: there is no
/// framework middleware chain hiding behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// A valid session must be present.
    Authenticated,
    /// The session's principal must have completed email verification.
    /// Verification presupposes identity, so this implies `Authenticated`.
    Verified,
}

/// Path parameters extracted from a matched pattern, keyed by placeholder name.
pub type PathParams = HashMap<String, String>;

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param(String),
}

/// PathPattern
///
/// A URL template with optional named parameters, e.g. `/products/{id}`.
/// Matching is exact per segment; a `{name}` segment captures whatever single
/// segment appears in its position. Trailing slashes are insignificant.
#[derive(Debug, Clone)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(template: &str) -> Self {
        let segments = template
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Self { segments }
    }

    /// Returns the captured parameters when `path` matches, None otherwise.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = PathParams::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

// --- Handlers and their invocation context ---

/// RequestContext
///
/// Everything a controller action may need, resolved once by the dispatcher and
/// passed in explicitly: the shared application state, the session snapshot for
/// this request, captured path parameters, and the raw request surface. This is
/// the dependency-injection seam — handlers never reach into globals.
#[derive(Clone)]
pub struct RequestContext {
    pub state: AppState,
    pub session: Option<Session>,
    pub params: PathParams,
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Option<String>,
    pub body: Bytes,
}

impl RequestContext {
    /// Returns a captured path parameter by placeholder name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Deserializes the buffered request body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_slice(&self.body).map_err(|_| AppError::MalformedPayload)
    }

    /// Returns a request header as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// True when the request carries the programmatic-client marker header.
    /// Navigations lack it, which is how the server picks between a JSON error
    /// body and a redirect when signalling capability failures.
    pub fn is_xhr(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
    }

    /// The session, for handlers behind `Authenticated` where the guard has
    /// already established it exists.
    pub fn session(&self) -> Result<&Session, AppError> {
        self.session
            .as_ref()
            .ok_or_else(|| AppError::Internal("handler reached without a session".into()))
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>>;

/// A type-erased controller action. Cloned cheaply per dispatch.
pub type BoxedHandler = Arc<dyn Fn(RequestContext) -> HandlerFuture + Send + Sync>;

/// Wraps a plain `async fn(RequestContext) -> Result<Response, AppError>` into
/// the boxed handler form stored on route entries.
pub fn handler<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, AppError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

// --- The route table itself ---

/// RouteEntry
///
/// A registered (method, pattern, required capabilities, handler) row.
/// Immutable once registered. The capability set is normalized at construction:
/// requiring `Verified` always also requires `Authenticated`.
pub struct RouteEntry {
    method: Method,
    pattern: PathPattern,
    requires_authenticated: bool,
    requires_verified: bool,
    handler: BoxedHandler,
}

impl RouteEntry {
    pub fn new(
        method: Method,
        template: &str,
        capabilities: &[Capability],
        handler: BoxedHandler,
    ) -> Self {
        let requires_verified = capabilities.contains(&Capability::Verified);
        Self {
            method,
            pattern: PathPattern::parse(template),
            requires_authenticated: requires_verified
                || capabilities.contains(&Capability::Authenticated),
            requires_verified,
            handler,
        }
    }
}

/// GuardOutcome
///
/// The guard's terminal decision for one request. Either the handler is
/// dispatched with its captured parameters, or the request ends with one of
/// the three failure responses. The guard never recovers locally.
pub enum GuardOutcome {
    Dispatch {
        handler: BoxedHandler,
        params: PathParams,
    },
    NotFound,
    Unauthenticated,
    Unverified,
}

/// The seven conventional actions registered by [`RouteTable::resource`].
pub struct ResourceActions {
    pub index: BoxedHandler,
    pub create: BoxedHandler,
    pub store: BoxedHandler,
    pub show: BoxedHandler,
    pub edit: BoxedHandler,
    pub update: BoxedHandler,
    pub destroy: BoxedHandler,
}

/// RouteTable
///
/// An ordered sequence of route entries, evaluated first-match-wins by
/// registration order. Registration order therefore governs precedence between
/// overlapping patterns: a literal path must be registered before a
/// parameterized one that would otherwise shadow it.
#[derive(Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry. Builder-style so route modules read as a table.
    pub fn route(
        mut self,
        method: Method,
        template: &str,
        capabilities: &[Capability],
        handler: BoxedHandler,
    ) -> Self {
        self.entries
            .push(RouteEntry::new(method, template, capabilities, handler));
        self
    }

    /// Registers the full resource set for `base`: index, create, store, show,
    /// edit, update, destroy. The literal `/create` entry is registered before
    /// `/{id}` so first-match-wins resolves it correctly.
    pub fn resource(
        self,
        base: &str,
        capabilities: &[Capability],
        actions: ResourceActions,
    ) -> Self {
        let id = format!("{}/{{id}}", base);
        let id_edit = format!("{}/{{id}}/edit", base);
        let create = format!("{}/create", base);
        self.route(Method::GET, base, capabilities, actions.index)
            .route(Method::GET, &create, capabilities, actions.create)
            .route(Method::POST, base, capabilities, actions.store)
            .route(Method::GET, &id, capabilities, actions.show)
            .route(Method::GET, &id_edit, capabilities, actions.edit)
            .route(Method::PUT, &id, capabilities, actions.update)
            .route(Method::DELETE, &id, capabilities, actions.destroy)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// evaluate
    ///
    /// The pure decision function at the heart of the route-protection model.
    /// Scans entries in registration order; the first entry matching both
    /// method and path wins. Capability predicates are then checked as an
    /// explicit ordered list: authenticated before verified, so an anonymous
    /// request to a verified-only route reads as Unauthenticated, never
    /// Unverified. No side effects, no session writes.
    pub fn evaluate(&self, method: &Method, path: &str, session: Option<&Session>) -> GuardOutcome {
        for entry in &self.entries {
            if entry.method != *method {
                continue;
            }
            let Some(params) = entry.pattern.matches(path) else {
                continue;
            };
            if entry.requires_authenticated {
                let Some(session) = session else {
                    return GuardOutcome::Unauthenticated;
                };
                if entry.requires_verified && !session.verified {
                    return GuardOutcome::Unverified;
                }
            }
            return GuardOutcome::Dispatch {
                handler: entry.handler.clone(),
                params,
            };
        }
        GuardOutcome::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_captures_named_params() {
        let pattern = PathPattern::parse("/categories/{category}");
        let params = pattern.matches("/categories/groceries").unwrap();
        assert_eq!(params.get("category").unwrap(), "groceries");
        assert!(pattern.matches("/categories").is_none());
        assert!(pattern.matches("/categories/a/b").is_none());
    }

    #[test]
    fn pattern_ignores_trailing_slash() {
        let pattern = PathPattern::parse("/home");
        assert!(pattern.matches("/home/").is_some());
        assert!(pattern.matches("/home").is_some());
        assert!(pattern.matches("/homes").is_none());
    }

    #[test]
    fn root_pattern_matches_only_root() {
        let pattern = PathPattern::parse("/");
        assert!(pattern.matches("/").is_some());
        assert!(pattern.matches("/home").is_none());
    }
}
