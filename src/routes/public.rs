use crate::{
    guard::{Capability, RouteTable, handler},
    handlers,
};
use axum::http::Method;

/// Public Router Module
///
/// Registers the routes that carry no capability set (landing page, credential
/// and verification scaffolding, logout, language switch) plus the two
/// authenticated-but-not-verified entries of the email verification flow.
///
/// Note that `/logout` and `/set-language/{locale}` are intentionally
/// capability-free: logout must work for a half-expired session, and the
/// language switch is independent of authentication state entirely.
pub fn register(table: RouteTable) -> RouteTable {
    table
        // GET /
        // The public landing page.
        .route(Method::GET, "/", &[], handler(handlers::welcome))
        // --- Credential flow ---
        // GET /login serves the form (authenticated visitors are bounced to
        // /home); POST /login performs the credential check and mints the
        // session + CSRF cookies.
        .route(Method::GET, "/login", &[], handler(handlers::login_form))
        .route(Method::POST, "/login", &[], handler(handlers::login))
        // POST /register
        // Creates an unverified account and signs it in. The verification
        // token is issued here.
        .route(Method::POST, "/register", &[], handler(handlers::register))
        // GET /logout
        // Destroys the session and returns to the landing page.
        .route(Method::GET, "/logout", &[], handler(handlers::logout))
        // --- Password reset flow ---
        .route(
            Method::POST,
            "/password/email",
            &[],
            handler(handlers::forgot_password),
        )
        .route(
            Method::POST,
            "/password/reset",
            &[],
            handler(handlers::reset_password),
        )
        // --- Email verification flow (authenticated, not yet verified) ---
        // GET /email/verify is the pending-verification view that the guard
        // redirects unverified sessions to; the literal route is registered
        // before /email/verify/{token}, though here the patterns cannot
        // actually overlap (different segment counts).
        .route(
            Method::GET,
            "/email/verify",
            &[Capability::Authenticated],
            handler(handlers::verify_notice),
        )
        .route(
            Method::GET,
            "/email/verify/{token}",
            &[Capability::Authenticated],
            handler(handlers::verify_email),
        )
        .route(
            Method::POST,
            "/email/resend",
            &[Capability::Authenticated],
            handler(handlers::resend_verification),
        )
        // GET /set-language/{locale}
        // Locale switch for sessions and anonymous visitors alike.
        .route(
            Method::GET,
            "/set-language/{locale}",
            &[],
            handler(handlers::set_language),
        )
}
