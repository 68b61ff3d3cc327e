mod common;

use axum::http::StatusCode;
use common::{body_text, session_set_cookie_line, spawn_app};
use serde_json::json;

fn callback_path(url: &str) -> String {
    // the issued URL is absolute; the router only sees the path + query
    let token = url.split("token=").nth(1).unwrap();
    format!("/auth/callback?token={}", token)
}

#[tokio::test]
async fn magic_link_flow_end_to_end() {
    let app = spawn_app().await;
    app.licenses.grant("alice@x.com", "academic");

    let response = app
        .post_json(
            "/auth/start",
            json!({"email": "alice@x.com", "host": "lab.example.com", "method": "link"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    let url = sent[0].secret.clone();
    assert!(url.starts_with("https://events.example.com/auth/callback?token="));

    let response = app.get(&callback_path(&url), &[]).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response
            .headers()
            .get(axum::http::header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("https://lab.example.com")
    );

    let set_cookie = session_set_cookie_line(&response).expect("session cookie set");
    assert!(set_cookie.contains("HttpOnly"));

    // the minted session is pinned to the host that started login
    let token = common::session_cookie_value(&response).unwrap();
    let claims = app
        .state
        .sessions
        .verify(&token, Some("lab.example.com"))
        .await
        .unwrap();
    assert_eq!(claims.sub, "alice@x.com");
    assert_eq!(claims.host.as_deref(), Some("lab.example.com"));
}

#[tokio::test]
async fn magic_link_is_consumable_exactly_once() {
    let app = spawn_app().await;
    app.licenses.grant("alice@x.com", "individual");

    app.post_json(
        "/auth/start",
        json!({"email": "alice@x.com", "method": "link"}),
    )
    .await;
    let url = app.mailer.sent()[0].secret.clone();
    let path = callback_path(&url);

    let response = app.get(&path, &[]).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    // second consumption is indistinguishable from a link that never existed
    let response = app.get(&path, &[]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "Invalid or expired link");
}

#[tokio::test]
async fn unknown_token_is_rejected_with_plain_text() {
    let app = spawn_app().await;

    let response = app.get("/auth/callback?token=never-issued", &[]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "Invalid or expired link");
}

#[tokio::test]
async fn callback_without_a_stored_host_redirects_to_the_base_url() {
    let app = spawn_app().await;
    app.licenses.grant("alice@x.com", "individual");

    app.post_json(
        "/auth/start",
        json!({"email": "alice@x.com", "method": "link"}),
    )
    .await;
    let url = app.mailer.sent()[0].secret.clone();

    let response = app.get(&callback_path(&url), &[]).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response
            .headers()
            .get(axum::http::header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("https://events.example.com")
    );
}
