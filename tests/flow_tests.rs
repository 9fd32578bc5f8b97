use reqwest::{StatusCode, redirect::Policy};
use shop_portal::{
    ApiClient, ApiError, AppConfig, AppState, InMemoryRepository, InMemorySessionStore,
    RepositoryState, SessionState, create_router,
};
use std::sync::Arc;
use tokio::net::TcpListener;

struct TestApp {
    address: String,
    repo: RepositoryState,
}

async fn spawn_app() -> TestApp {
    let repo: RepositoryState = Arc::new(InMemoryRepository::with_demo_data().await);
    let sessions: SessionState = Arc::new(InMemorySessionStore::new(120));
    let config = AppConfig::default();

    let state = AppState {
        sessions,
        repo: repo.clone(),
        config,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        repo,
    }
}

/// A browser-style client: keeps cookies, never follows redirects, so tests
/// can observe the Location header the guard produces.
fn browser() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .cookie_store(true)
        .build()
        .unwrap()
}

async fn register(client: &reqwest::Client, address: &str, email: &str) {
    let response = client
        .post(format!("{}/register", address))
        .json(&serde_json::json!({
            "name": "Test User",
            "email": email,
            "password": "secret-password"
        }))
        .send()
        .await
        .expect("register failed");
    assert_eq!(response.status(), StatusCode::CREATED);
}

// --- The /home gating progression ---

#[tokio::test]
async fn home_progression_anonymous_unverified_verified() {
    let app = spawn_app().await;
    let client = browser();

    // Anonymous XHR: terminal 401, no dispatch.
    let response = client
        .get(format!("{}/home", app.address))
        .header("X-Requested-With", "XMLHttpRequest")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Authenticated but unverified: terminal 403 for XHR.
    register(&client, &app.address, "progress@example.com").await;
    let response = client
        .get(format!("{}/home", app.address))
        .header("X-Requested-With", "XMLHttpRequest")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Consume the verification token the way the emailed link would.
    let token = app
        .repo
        .find_user_by_email("progress@example.com")
        .await
        .unwrap()
        .verification_token
        .unwrap();
    let response = client
        .get(format!("{}/email/verify/{}", app.address, token))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_redirection());

    // Fully capable: the handler's response comes back verbatim.
    let response = client
        .get(format!("{}/home", app.address))
        .header("X-Requested-With", "XMLHttpRequest")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["user"]["email"], "progress@example.com");
    assert_eq!(body["user"]["verified"], true);
}

#[tokio::test]
async fn navigations_are_redirected_instead_of_receiving_statuses() {
    let app = spawn_app().await;
    let client = browser();

    // No marker header: the guard answers with a redirect to the login view.
    let response = client.get(format!("{}/home", app.address)).send().await.unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()["location"], "/login");

    // Unverified navigation lands on the pending-verification view.
    register(&client, &app.address, "nav@example.com").await;
    let response = client.get(format!("{}/home", app.address)).send().await.unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()["location"], "/email/verify");
}

// --- The language switch is authentication-independent ---

#[tokio::test]
async fn set_language_works_for_anonymous_visitors() {
    let app = spawn_app().await;
    let client = browser();

    let referer = format!("{}/somewhere", app.address);
    let response = client
        .get(format!("{}/set-language/fr", app.address))
        .header("Referer", &referer)
        .send()
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(response.headers()["location"], referer.as_str());
    let set_cookie = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    assert!(set_cookie.contains("locale=fr"));
}

#[tokio::test]
async fn unsupported_locale_is_rejected() {
    let app = spawn_app().await;
    let client = browser();

    let response = client
        .get(format!("{}/set-language/xx", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- Logout destroys the session ---

#[tokio::test]
async fn logout_destroys_the_session_and_later_requests_are_challenged() {
    let app = spawn_app().await;
    let client = browser();

    register(&client, &app.address, "leaver@example.com").await;
    let token = app
        .repo
        .find_user_by_email("leaver@example.com")
        .await
        .unwrap()
        .verification_token
        .unwrap();
    client
        .get(format!("{}/email/verify/{}", app.address, token))
        .send()
        .await
        .unwrap();

    let response = client
        .get(format!("{}/home", app.address))
        .header("X-Requested-With", "XMLHttpRequest")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Logout redirects to the public landing page.
    let response = client.get(format!("{}/logout", app.address)).send().await.unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()["location"], "/");

    // The same client context is anonymous again.
    let response = client
        .get(format!("{}/home", app.address))
        .header("X-Requested-With", "XMLHttpRequest")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// --- CSRF enforcement on session-bearing mutations ---

#[tokio::test]
async fn mutations_without_the_csrf_header_are_rejected() {
    let app = spawn_app().await;
    let client = browser();

    register(&client, &app.address, "csrf@example.com").await;
    let token = app
        .repo
        .find_user_by_email("csrf@example.com")
        .await
        .unwrap()
        .verification_token
        .unwrap();
    client
        .get(format!("{}/email/verify/{}", app.address, token))
        .send()
        .await
        .unwrap();

    // The session cookie rides along, but no X-XSRF-TOKEN header is echoed.
    let response = client
        .post(format!("{}/products", app.address))
        .json(&serde_json::json!({ "name": "Contraband", "price_cents": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 419);
}

// --- The shipped client against the real portal ---

#[tokio::test]
async fn product_crud_through_the_api_client() {
    let app = spawn_app().await;
    let api = ApiClient::new(&app.address, Arc::new(|| {})).unwrap();

    // Register and verify through the real flows; the client's jar picks up
    // the session and CSRF cookies from the register response.
    let response = api
        .post(
            "/register",
            &serde_json::json!({
                "name": "Crud Tester",
                "email": "crud@example.com",
                "password": "secret-password"
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let token = app
        .repo
        .find_user_by_email("crud@example.com")
        .await
        .unwrap()
        .verification_token
        .unwrap();
    api.get(&format!("/email/verify/{}", token)).await.unwrap();

    let category_id = app.repo.list_categories().await[0].id;

    // Create.
    let response = api
        .post(
            "/products",
            &serde_json::json!({
                "category_id": category_id,
                "name": "Test jar",
                "price_cents": 995
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let product: serde_json::Value = response.json().await.unwrap();
    let product_id = product["id"].as_str().unwrap().to_string();

    // Update keeps unspecified fields.
    let response = api
        .put(
            &format!("/products/{}", product_id),
            &serde_json::json!({ "name": "Renamed jar" }),
        )
        .await
        .unwrap();
    let updated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(updated["name"], "Renamed jar");
    assert_eq!(updated["price_cents"], 995);

    // Destroy, then the id is gone.
    let response = api.delete(&format!("/products/{}", product_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let error = api
        .get(&format!("/products/{}", product_id))
        .await
        .expect_err("deleted product must 404");
    match error {
        ApiError::Status { status, .. } => assert_eq!(status, StatusCode::NOT_FOUND),
        other => panic!("expected a 404 rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn product_user_entries_are_scoped_to_their_owner() {
    let app = spawn_app().await;
    let api = ApiClient::new(&app.address, Arc::new(|| {})).unwrap();

    api.post(
        "/register",
        &serde_json::json!({
            "name": "Owner",
            "email": "owner@example.com",
            "password": "secret-password"
        }),
    )
    .await
    .unwrap();
    let token = app
        .repo
        .find_user_by_email("owner@example.com")
        .await
        .unwrap()
        .verification_token
        .unwrap();
    api.get(&format!("/email/verify/{}", token)).await.unwrap();

    let response = api.get("/products").await.unwrap();
    let products: serde_json::Value = response.json().await.unwrap();
    let product_id = products[0]["id"].as_str().unwrap();

    let response = api
        .post(
            "/product-users",
            &serde_json::json!({ "product_id": product_id, "quantity": 3 }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = api.get("/product-users").await.unwrap();
    let entries: serde_json::Value = response.json().await.unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["quantity"], 3);

    // A different account sees an empty list.
    let other = ApiClient::new(&app.address, Arc::new(|| {})).unwrap();
    other
        .post(
            "/register",
            &serde_json::json!({
                "name": "Other",
                "email": "other@example.com",
                "password": "secret-password"
            }),
        )
        .await
        .unwrap();
    let token = app
        .repo
        .find_user_by_email("other@example.com")
        .await
        .unwrap()
        .verification_token
        .unwrap();
    other.get(&format!("/email/verify/{}", token)).await.unwrap();

    let response = other.get("/product-users").await.unwrap();
    let entries: serde_json::Value = response.json().await.unwrap();
    assert!(entries.as_array().unwrap().is_empty());
}

// --- Credential round trips ---

#[tokio::test]
async fn login_with_wrong_password_is_rejected_and_session_free() {
    let app = spawn_app().await;
    let client = browser();
    register(&client, &app.address, "badpass@example.com").await;

    let anonymous = browser();
    let response = anonymous
        .post(format!("{}/login", app.address))
        .json(&serde_json::json!({
            "email": "badpass@example.com",
            "password": "wrong"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.headers().get("set-cookie").is_none());
}

#[tokio::test]
async fn password_reset_flow_allows_login_with_the_new_password() {
    let app = spawn_app().await;
    let client = browser();
    register(&client, &app.address, "reset@example.com").await;

    let response = client
        .post(format!("{}/password/email", app.address))
        .json(&serde_json::json!({ "email": "reset@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let token = app
        .repo
        .find_user_by_email("reset@example.com")
        .await
        .unwrap()
        .password_reset_token
        .unwrap();
    let response = client
        .post(format!("{}/password/reset", app.address))
        .json(&serde_json::json!({
            "email": "reset@example.com",
            "token": token,
            "password": "brand-new-password"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let fresh = browser();
    let response = fresh
        .post(format!("{}/login", app.address))
        .json(&serde_json::json!({
            "email": "reset@example.com",
            "password": "brand-new-password"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
