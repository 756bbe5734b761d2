//! HTTP routes driven through the full router.

#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode, header};
use chrono::Utc;
use tower::ServiceExt;

use masjid_core::{AdminRole, SecurityEventKind};
use masjid_integration_tests::{TestSite, test_config};
use masjid_site::state::AppState;
use masjid_site::supabase::SupabaseError;

const BODY_LIMIT: usize = 1024 * 1024;

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, cookie: Option<&str>, form: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::USER_AGENT, "integration-test");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(form.to_owned())).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Open the login page and return the visitor's session cookie.
async fn visit(app: &Router) -> String {
    let response = send(app, get("/auth/login", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap();
    assert!(set_cookie.starts_with("masjid_session="));
    set_cookie.split(';').next().unwrap().to_owned()
}

#[tokio::test]
async fn test_health() {
    let site = TestSite::new();
    let app = masjid_site::app(site.state.clone());

    let response = send(&app, get("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "no-store, max-age=0"
    );
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_anonymous_dashboard_redirects_to_login() {
    let site = TestSite::new();
    let app = masjid_site::app(site.state.clone());

    let response = send(&app, get("/dashboard", None)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login");
}

#[tokio::test]
async fn test_login_page_renders_register_mode() {
    let site = TestSite::new();
    let app = masjid_site::app(site.state.clone());

    let response = send(&app, get("/auth/login?mode=register", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(r#"name="mode" value="register""#));
}

#[tokio::test]
async fn test_admin_signs_in_and_sees_dashboard() {
    let site = TestSite::new();
    let admin = site.accounts.add_user("admin@example.com", "correct-horse");
    site.directory.grant(&admin, AdminRole::Admin, true);
    let app = masjid_site::app(site.state.clone());

    let cookie = visit(&app).await;
    let response = send(
        &app,
        post_form(
            "/auth/login",
            Some(&cookie),
            "mode=login&email=admin%40example.com&password=correct-horse",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    let response = send(&app, get("/dashboard", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("admin@example.com"));

    let logged = site.log.of_kind(SecurityEventKind::AdminLoginSuccess);
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].user_agent.as_deref(), Some("integration-test"));
}

async fn sign_in_admin(site: &TestSite, app: &Router) -> String {
    let admin = site.accounts.add_user("admin@example.com", "correct-horse");
    site.directory.grant(&admin, AdminRole::Admin, true);

    let cookie = visit(app).await;
    let response = send(
        app,
        post_form(
            "/auth/login",
            Some(&cookie),
            "mode=login&email=admin%40example.com&password=correct-horse",
        ),
    )
    .await;
    assert_eq!(location(&response), "/dashboard");
    cookie
}

#[tokio::test]
async fn test_dashboard_lists_submissions() {
    let site = TestSite::new();
    site.submissions
        .add_contact("Yusuf", "yusuf@example.com", "Orari del venerdì?");
    let app = masjid_site::app(site.state.clone());
    let cookie = sign_in_admin(&site, &app).await;

    let response = send(&app, get("/dashboard", Some(&cookie))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("yusuf@example.com"));
    assert!(html.contains("No book requests yet."));
    assert!(html.contains("No lesson registrations yet."));
}

#[tokio::test]
async fn test_dashboard_survives_submissions_outage() {
    let site = TestSite::new();
    site.submissions.set_failing(true);
    let app = masjid_site::app(site.state.clone());
    let cookie = sign_in_admin(&site, &app).await;

    let response = send(&app, get("/dashboard", Some(&cookie))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("admin@example.com"));
    assert!(html.contains("Contact messages are unavailable"));
}

#[tokio::test]
async fn test_state_requires_service_role_key() {
    let mut config = test_config();
    assert!(AppState::new(config.clone()).is_ok());

    config.supabase.service_role_key = None;
    assert!(matches!(
        AppState::new(config),
        Err(SupabaseError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_non_admin_is_sent_back_with_unauthorized() {
    let site = TestSite::new();
    site.accounts.add_user("nobody@example.com", "hunter22");
    let app = masjid_site::app(site.state.clone());

    let cookie = visit(&app).await;
    let response = send(
        &app,
        post_form(
            "/auth/login",
            Some(&cookie),
            "mode=login&email=nobody%40example.com&password=hunter22",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login?mode=login");

    let response = send(&app, get("/auth/login?mode=login", Some(&cookie))).await;
    let html = body_text(response).await;
    assert!(html.contains("Unauthorized."));

    let response = send(&app, get("/dashboard", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_logout_ends_admin_session() {
    let site = TestSite::new();
    let admin = site.accounts.add_user("admin@example.com", "correct-horse");
    site.directory.grant(&admin, AdminRole::Admin, true);
    let app = masjid_site::app(site.state.clone());

    let cookie = visit(&app).await;
    send(
        &app,
        post_form(
            "/auth/login",
            Some(&cookie),
            "mode=login&email=admin%40example.com&password=correct-horse",
        ),
    )
    .await;

    let response = send(&app, post_form("/auth/logout", Some(&cookie), "")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login?mode=login");
    assert_eq!(site.state.sessions().active().await, 0);

    let response = send(&app, get("/dashboard", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login");
}

#[tokio::test]
async fn test_prayer_times_for_today() {
    let site = TestSite::new();
    let today = site.state.prayer_times().today_at(Utc::now());
    site.prayer_times.set_current(today);
    let app = masjid_site::app(site.state.clone());

    let response = send(&app, get("/api/prayer-times", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["date"], today.to_string());
    assert_eq!(json["prayers"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_stale_prayer_times_are_not_found() {
    let site = TestSite::new();
    let today = site.state.prayer_times().today_at(Utc::now());
    site.prayer_times
        .set_current(today - chrono::Duration::days(2));
    let app = masjid_site::app(site.state.clone());

    let response = send(&app, get("/api/prayer-times", None)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
