use axum::{
    Json,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::Env,
    error::AppError,
    guard::RequestContext,
    models::{
        ForgotPasswordRequest, LoginRequest, Product, ProductRequest, ProductUser,
        ProductUserRequest, RegisterRequest, ResetPasswordRequest, User, UserProfile,
    },
    repository::{digest_password, verify_password},
    session::{SESSION_COOKIE, XSRF_COOKIE, build_cookie, cookie_value, expire_cookie},
};

// --- Shared helpers ---

/// Resolves the effective locale for this request: session preference first,
/// then the anonymous `locale` cookie, then the configured default.
fn resolve_locale(ctx: &RequestContext) -> String {
    if let Some(session) = &ctx.session {
        return session.locale.clone();
    }
    cookie_value(&ctx.headers, "locale")
        .unwrap_or_else(|| ctx.state.config.default_locale.clone())
}

/// Attaches the session and CSRF cookies to a login/registration response.
/// The CSRF cookie is deliberately readable by the client, which echoes it
/// back as `X-XSRF-TOKEN` on mutating requests.
fn attach_session_cookies(response: &mut Response, ctx: &RequestContext, session: &crate::session::Session) {
    let secure = ctx.state.config.env == Env::Production;
    for cookie in [
        build_cookie(SESSION_COOKIE, &session.id.to_string(), true, secure),
        build_cookie(XSRF_COOKIE, &session.csrf_token.to_string(), false, secure),
    ] {
        if let Ok(value) = header::HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
}

/// The page the browser came from, for redirect-back flows. Falls back to the
/// landing page when the header is missing or not valid UTF-8.
fn referer(ctx: &RequestContext) -> String {
    ctx.header("referer").unwrap_or("/").to_string()
}

// --- Public: landing and auth scaffolding ---

/// welcome
///
/// [Public] The landing page. Reachable by anyone, session or not.
pub async fn welcome(ctx: RequestContext) -> Result<Response, AppError> {
    let locale = resolve_locale(&ctx);
    Ok(Html(format!(
        "<!doctype html><html lang=\"{}\"><body><h1>Shop portal</h1></body></html>",
        locale
    ))
    .into_response())
}

/// login_form
///
/// [Public] Serves the login view. An already-authenticated visitor is sent
/// straight to the dashboard instead.
pub async fn login_form(ctx: RequestContext) -> Result<Response, AppError> {
    if ctx.session.is_some() {
        return Ok(Redirect::to("/home").into_response());
    }
    Ok(Html("<!doctype html><html><body><form method=\"post\" action=\"/login\"></form></body></html>".to_string()).into_response())
}

/// login
///
/// [Public] Credential check. On success a fresh session is created and both
/// the session and CSRF cookies are set; the profile is returned so
/// programmatic callers can update their UI without a second round trip.
pub async fn login(ctx: RequestContext) -> Result<Response, AppError> {
    let payload: LoginRequest = ctx.json()?;
    let user = ctx
        .state
        .repo
        .find_user_by_email(&payload.email)
        .await
        .ok_or(AppError::InvalidCredentials)?;
    if !verify_password(&payload.password, &user.password_digest) {
        return Err(AppError::InvalidCredentials);
    }

    let locale = resolve_locale(&ctx);
    let session = ctx.state.sessions.create(&user, locale).await;
    tracing::info!(user_id = %user.id, "login succeeded");

    let mut response = Json(UserProfile::from(&user)).into_response();
    attach_session_cookies(&mut response, &ctx, &session);
    Ok(response)
}

/// register
///
/// [Public] Creates an unverified account, issues the email-verification token
/// and signs the new user in. Until the token is consumed, every route that
/// requires the `Verified` capability will bounce this session to the
/// pending-verification view.
pub async fn register(ctx: RequestContext) -> Result<Response, AppError> {
    let payload: RegisterRequest = ctx.json()?;
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(AppError::MalformedPayload);
    }

    let salt = Uuid::new_v4().to_string();
    let verification_token = Uuid::new_v4();
    let user = User {
        id: Uuid::new_v4(),
        name: payload.name,
        email: payload.email,
        password_digest: digest_password(&payload.password, &salt),
        verified: false,
        verification_token: Some(verification_token),
        password_reset_token: None,
        created_at: Utc::now(),
    };
    let user = ctx
        .state
        .repo
        .create_user(user)
        .await
        .ok_or(AppError::EmailTaken)?;

    // Mail delivery is outside this portal; the token is surfaced in the log
    // the same way a local mail driver would.
    tracing::info!(user_id = %user.id, %verification_token, "verification token issued");

    let locale = resolve_locale(&ctx);
    let session = ctx.state.sessions.create(&user, locale).await;

    let mut response =
        (StatusCode::CREATED, Json(UserProfile::from(&user))).into_response();
    attach_session_cookies(&mut response, &ctx, &session);
    Ok(response)
}

/// logout
///
/// [Public] Destroys the session, clears both cookies and redirects to the
/// landing page. Registered without capabilities: logging out an anonymous
/// visitor is a harmless no-op that still lands on `/`.
pub async fn logout(ctx: RequestContext) -> Result<Response, AppError> {
    if let Some(session) = &ctx.session {
        ctx.state.sessions.destroy(session.id).await;
        tracing::info!(user_id = %session.user_id, "session destroyed");
    }
    let mut response = Redirect::to("/").into_response();
    for cookie in [expire_cookie(SESSION_COOKIE), expire_cookie(XSRF_COOKIE)] {
        if let Ok(value) = header::HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    Ok(response)
}

/// forgot_password
///
/// [Public] Issues a password-reset token. The response is identical whether
/// or not the email exists, so the endpoint cannot be used to enumerate
/// accounts.
pub async fn forgot_password(ctx: RequestContext) -> Result<Response, AppError> {
    let payload: ForgotPasswordRequest = ctx.json()?;
    let token = Uuid::new_v4();
    if ctx
        .state
        .repo
        .set_password_reset_token(&payload.email, token)
        .await
    {
        tracing::info!(email = %payload.email, %token, "password reset token issued");
    }
    Ok(Json(serde_json::json!({
        "message": "If that account exists, a reset link has been sent."
    }))
    .into_response())
}

/// reset_password
///
/// [Public] Consumes a reset token and installs the new password digest.
pub async fn reset_password(ctx: RequestContext) -> Result<Response, AppError> {
    let payload: ResetPasswordRequest = ctx.json()?;
    let salt = Uuid::new_v4().to_string();
    let digest = digest_password(&payload.password, &salt);
    if !ctx
        .state
        .repo
        .reset_password(&payload.email, payload.token, digest)
        .await
    {
        return Err(AppError::InvalidToken);
    }
    Ok(Json(serde_json::json!({ "message": "Your password has been reset." })).into_response())
}

/// set_language
///
/// [Public] Mutates the locale preference and redirects back to the referring
/// page. Works the same for anonymous visitors (cookie) and signed-in users
/// (session attribute), independent of authentication state.
pub async fn set_language(ctx: RequestContext) -> Result<Response, AppError> {
    let locale = ctx.param("locale").ok_or(AppError::UnsupportedLocale)?;
    if !ctx
        .state
        .config
        .supported_locales
        .iter()
        .any(|l| l == locale)
    {
        return Err(AppError::UnsupportedLocale);
    }

    let mut response = Redirect::to(&referer(&ctx)).into_response();
    match &ctx.session {
        Some(session) => {
            ctx.state
                .sessions
                .set_locale(session.id, locale.to_string())
                .await;
        }
        None => {
            let secure = ctx.state.config.env == Env::Production;
            let cookie = build_cookie("locale", locale, false, secure);
            if let Ok(value) = header::HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
    }
    Ok(response)
}

// --- Authenticated: email verification flow ---

/// verify_notice
///
/// [Authenticated] The pending-verification view that unverified sessions are
/// redirected to when they hit a `Verified` route.
pub async fn verify_notice(ctx: RequestContext) -> Result<Response, AppError> {
    let session = ctx.session()?;
    if session.verified {
        return Ok(Redirect::to("/home").into_response());
    }
    if ctx.is_xhr() {
        return Ok(Json(serde_json::json!({
            "message": "Your email address is not verified."
        }))
        .into_response());
    }
    Ok(Html(
        "<!doctype html><html><body><p>Please confirm your email address to continue.</p></body></html>"
            .to_string(),
    )
    .into_response())
}

/// verify_email
///
/// [Authenticated] Consumes the verification token from the emailed link,
/// flips the user and the live session to verified, and lands on the
/// dashboard.
pub async fn verify_email(ctx: RequestContext) -> Result<Response, AppError> {
    let session = ctx.session()?.clone();
    let token: Uuid = ctx
        .param("token")
        .and_then(|t| t.parse().ok())
        .ok_or(AppError::InvalidToken)?;

    if !ctx.state.repo.verify_user(session.user_id, token).await {
        return Err(AppError::InvalidToken);
    }
    ctx.state.sessions.set_verified(session.id).await;
    tracing::info!(user_id = %session.user_id, "email verified");
    Ok(Redirect::to("/home").into_response())
}

/// resend_verification
///
/// [Authenticated] Re-issues the verification token on explicit user action.
pub async fn resend_verification(ctx: RequestContext) -> Result<Response, AppError> {
    let session = ctx.session()?;
    let token = Uuid::new_v4();
    if !ctx
        .state
        .repo
        .set_verification_token(session.user_id, token)
        .await
    {
        // Already verified: nothing to resend.
        return Ok(Redirect::to("/home").into_response());
    }
    tracing::info!(user_id = %session.user_id, %token, "verification token re-issued");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "message": "A fresh verification link has been sent." })),
    )
        .into_response())
}

// --- Verified: dashboard and categories ---

/// home
///
/// [Verified] The dashboard: the signed-in profile plus the category listing.
pub async fn home(ctx: RequestContext) -> Result<Response, AppError> {
    let session = ctx.session()?;
    let user = ctx
        .state
        .repo
        .get_user(session.user_id)
        .await
        .ok_or(AppError::NotFound("User"))?;
    let categories = ctx.state.repo.list_categories().await;
    Ok(Json(serde_json::json!({
        "user": UserProfile::from(&user),
        "categories": categories,
        "locale": session.locale,
    }))
    .into_response())
}

/// category_index
///
/// [Verified] Lists the products belonging to the category addressed by slug.
pub async fn category_index(ctx: RequestContext) -> Result<Response, AppError> {
    let slug = ctx.param("category").ok_or(AppError::NotFound("Category"))?;
    let category = ctx
        .state
        .repo
        .find_category_by_slug(slug)
        .await
        .ok_or(AppError::NotFound("Category"))?;
    let products = ctx.state.repo.products_in_category(category.id).await;
    Ok(Json(serde_json::json!({ "category": category, "products": products })).into_response())
}

// --- Verified: /products resource ---

/// product_index
///
/// [Verified] GET /products — the full product listing.
pub async fn product_index(ctx: RequestContext) -> Result<Response, AppError> {
    Ok(Json(ctx.state.repo.list_products().await).into_response())
}

/// product_create
///
/// [Verified] GET /products/create — the creation form view. Registered before
/// `/products/{id}` so the literal segment is not captured as an id.
pub async fn product_create(ctx: RequestContext) -> Result<Response, AppError> {
    let categories = ctx.state.repo.list_categories().await;
    Ok(Json(serde_json::json!({ "categories": categories })).into_response())
}

/// product_store
///
/// [Verified] POST /products — creates a product. The category must exist.
pub async fn product_store(ctx: RequestContext) -> Result<Response, AppError> {
    let payload: ProductRequest = ctx.json()?;
    let (Some(category_id), Some(name), Some(price_cents)) =
        (payload.category_id, payload.name.clone(), payload.price_cents)
    else {
        return Err(AppError::MalformedPayload);
    };
    if !ctx
        .state
        .repo
        .list_categories()
        .await
        .iter()
        .any(|c| c.id == category_id)
    {
        return Err(AppError::NotFound("Category"));
    }

    let now = Utc::now();
    let product = ctx
        .state
        .repo
        .create_product(Product {
            id: Uuid::new_v4(),
            category_id,
            name,
            description: payload.description,
            price_cents,
            created_at: now,
            updated_at: now,
        })
        .await;
    Ok((StatusCode::CREATED, Json(product)).into_response())
}

/// product_show
///
/// [Verified] GET /products/{id}.
pub async fn product_show(ctx: RequestContext) -> Result<Response, AppError> {
    let id = parse_id(&ctx)?;
    let product = ctx
        .state
        .repo
        .get_product(id)
        .await
        .ok_or(AppError::NotFound("Product"))?;
    Ok(Json(product).into_response())
}

/// product_edit
///
/// [Verified] GET /products/{id}/edit — the edit form view.
pub async fn product_edit(ctx: RequestContext) -> Result<Response, AppError> {
    let id = parse_id(&ctx)?;
    let product = ctx
        .state
        .repo
        .get_product(id)
        .await
        .ok_or(AppError::NotFound("Product"))?;
    let categories = ctx.state.repo.list_categories().await;
    Ok(Json(serde_json::json!({ "product": product, "categories": categories })).into_response())
}

/// product_update
///
/// [Verified] PUT /products/{id} — partial update, absent fields unchanged.
pub async fn product_update(ctx: RequestContext) -> Result<Response, AppError> {
    let id = parse_id(&ctx)?;
    let payload: ProductRequest = ctx.json()?;
    let product = ctx
        .state
        .repo
        .update_product(id, payload)
        .await
        .ok_or(AppError::NotFound("Product"))?;
    Ok(Json(product).into_response())
}

/// product_destroy
///
/// [Verified] DELETE /products/{id}.
pub async fn product_destroy(ctx: RequestContext) -> Result<Response, AppError> {
    let id = parse_id(&ctx)?;
    if !ctx.state.repo.delete_product(id).await {
        return Err(AppError::NotFound("Product"));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

// --- Verified: /product-users resource ---

/// product_user_index
///
/// [Verified] GET /product-users — the caller's own entries only.
pub async fn product_user_index(ctx: RequestContext) -> Result<Response, AppError> {
    let session = ctx.session()?;
    Ok(Json(ctx.state.repo.list_product_users(session.user_id).await).into_response())
}

/// product_user_create
///
/// [Verified] GET /product-users/create — form view listing pickable products.
pub async fn product_user_create(ctx: RequestContext) -> Result<Response, AppError> {
    let products = ctx.state.repo.list_products().await;
    Ok(Json(serde_json::json!({ "products": products })).into_response())
}

/// product_user_store
///
/// [Verified] POST /product-users — adds a product to the caller's list.
pub async fn product_user_store(ctx: RequestContext) -> Result<Response, AppError> {
    let session = ctx.session()?;
    let payload: ProductUserRequest = ctx.json()?;
    let product_id = payload.product_id.ok_or(AppError::MalformedPayload)?;
    ctx.state
        .repo
        .get_product(product_id)
        .await
        .ok_or(AppError::NotFound("Product"))?;

    let now = Utc::now();
    let entry = ctx
        .state
        .repo
        .create_product_user(ProductUser {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            product_id,
            quantity: payload.quantity.unwrap_or(1),
            created_at: now,
            updated_at: now,
        })
        .await;
    Ok((StatusCode::CREATED, Json(entry)).into_response())
}

/// product_user_show
///
/// [Verified] GET /product-users/{id} — owner-only.
pub async fn product_user_show(ctx: RequestContext) -> Result<Response, AppError> {
    let session = ctx.session()?;
    let id = parse_id(&ctx)?;
    let entry = ctx
        .state
        .repo
        .get_product_user(id, session.user_id)
        .await
        .ok_or(AppError::NotFound("Entry"))?;
    Ok(Json(entry).into_response())
}

/// product_user_edit
///
/// [Verified] GET /product-users/{id}/edit — owner-only form view.
pub async fn product_user_edit(ctx: RequestContext) -> Result<Response, AppError> {
    let session = ctx.session()?;
    let id = parse_id(&ctx)?;
    let entry = ctx
        .state
        .repo
        .get_product_user(id, session.user_id)
        .await
        .ok_or(AppError::NotFound("Entry"))?;
    Ok(Json(entry).into_response())
}

/// product_user_update
///
/// [Verified] PUT /product-users/{id} — owner-only partial update.
pub async fn product_user_update(ctx: RequestContext) -> Result<Response, AppError> {
    let session = ctx.session()?;
    let id = parse_id(&ctx)?;
    let payload: ProductUserRequest = ctx.json()?;
    let entry = ctx
        .state
        .repo
        .update_product_user(id, session.user_id, payload)
        .await
        .ok_or(AppError::NotFound("Entry"))?;
    Ok(Json(entry).into_response())
}

/// product_user_destroy
///
/// [Verified] DELETE /product-users/{id} — owner-only.
pub async fn product_user_destroy(ctx: RequestContext) -> Result<Response, AppError> {
    let session = ctx.session()?;
    let id = parse_id(&ctx)?;
    if !ctx
        .state
        .repo
        .delete_product_user(id, session.user_id)
        .await
    {
        return Err(AppError::NotFound("Entry"));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Parses the `{id}` path parameter as a UUID. A syntactically invalid id is
/// indistinguishable from an unknown one.
fn parse_id(ctx: &RequestContext) -> Result<Uuid, AppError> {
    ctx.param("id")
        .and_then(|id| id.parse().ok())
        .ok_or(AppError::NotFound("Resource"))
}
