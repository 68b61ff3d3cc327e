//! Test helpers for auth-gateway integration tests.
//!
//! Builds the full router over in-memory collaborators so suites run
//! without Redis, Postgres, or Mailgun.

#![allow(dead_code)]

use auth_gateway::{
    build_router,
    config::{
        DatabaseConfig, EntitlementConfig, Environment, GatewayConfig, LoginConfig,
        MailgunConfig, RedisConfig, SecurityConfig, SessionConfig, SwaggerConfig, SwaggerMode,
    },
    services::{EntitlementPolicy, MemoryStore, MockLicenseDirectory, MockMailer},
    AppState,
};
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use secrecy::SecretString;
use std::sync::Arc;
use tower::util::ServiceExt;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<MockMailer>,
    pub licenses: Arc<MockLicenseDirectory>,
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        common: service_core::config::Config {
            port: 8080,
            shutdown_grace_seconds: 0,
        },
        environment: Environment::Dev,
        service_name: "auth-gateway-tests".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
        },
        session: SessionConfig {
            signing_secret: SecretString::new(
                "integration-test-secret-0123456789abcdef".to_string(),
            ),
            session_ttl_min: 60,
            cookie_domain: Some(".example.com".to_string()),
        },
        login: LoginConfig {
            otp_ttl_min: 10,
            otp_attempt_max: 5,
            magic_ttl_min: 15,
            auth_base_url: "https://events.example.com".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["https://book.example.com".to_string()],
        },
        entitlements: EntitlementConfig {
            book_domain: None,
            lab_domain: None,
            app_domain: None,
            grants: EntitlementPolicy::default_grants(),
            fail_open_unknown_hosts: true,
        },
        mailgun: MailgunConfig {
            api_base: "https://api.mailgun.net/v3".to_string(),
            domain: "mg.example.com".to_string(),
            api_key: SecretString::new("test-key".to_string()),
            from: "Sign-in <no-reply@mg.example.com>".to_string(),
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: GatewayConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(MockMailer::new());
    let licenses = Arc::new(MockLicenseDirectory::new());

    let state = AppState::new(config, store.clone(), licenses.clone(), mailer.clone());
    let app = build_router(state.clone()).await.expect("Failed to build router");

    TestApp {
        app,
        state,
        store,
        mailer,
        licenses,
    }
}

impl TestApp {
    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> Response<Body> {
        self.app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn get(&self, path: &str, headers: &[(&str, &str)]) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn post(&self, path: &str, headers: &[(&str, &str)]) -> Response<Body> {
        let mut builder = Request::builder().method("POST").uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Pull the `session` cookie value out of a Set-Cookie header.
pub fn session_cookie_value(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|raw| raw.starts_with("session="))
        .map(|raw| {
            raw.trim_start_matches("session=")
                .split(';')
                .next()
                .unwrap_or_default()
                .to_string()
        })
}

/// The raw Set-Cookie line for the session cookie, attributes included.
pub fn session_set_cookie_line(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|raw| raw.starts_with("session="))
        .map(str::to_string)
}
