use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{self, dto::WelcomeResponse};
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .route("/", get(welcome))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

async fn welcome() -> Json<WelcomeResponse> {
    let endpoints = BTreeMap::from([
        ("signup", "/signup"),
        ("login", "/login"),
        ("token", "/token"),
        ("token_refresh", "/token/refresh"),
        ("me", "/me"),
        ("health", "/health"),
    ]);
    Json(WelcomeResponse {
        message: "Welcome to the Agil accounts API".into(),
        endpoints,
    })
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8000".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        call_with_auth(app, method, uri, body, None).await
    }

    async fn call_with_auth(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn app_with_user(email: &str, password: &str) -> Router {
        let app = build_app(AppState::fake());
        let (status, _) = call(
            &app,
            "POST",
            "/signup",
            Some(json!({
                "username": "someone",
                "email": email,
                "password": password,
                "phone": "+1 555-123-4567",
                "full_name": "Some One",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        app
    }

    #[tokio::test]
    async fn welcome_lists_endpoints() {
        let app = build_app(AppState::fake());
        let (status, body) = call(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());
        assert_eq!(body["endpoints"]["login"], "/login");
        assert_eq!(body["endpoints"]["signup"], "/signup");
    }

    #[tokio::test]
    async fn signup_reports_field_errors() {
        let app = build_app(AppState::fake());
        let (status, body) = call(
            &app,
            "POST",
            "/signup",
            Some(json!({
                "email": "not-an-email",
                "password": "short",
                "phone": "123",
                "full_name": "X",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Registration failed");
        for field in ["email", "password", "phone"] {
            assert!(body["errors"][field].is_array(), "missing error for {field}");
        }
        assert!(body["errors"].get("full_name").is_none());
    }

    #[tokio::test]
    async fn signup_rejects_duplicate_email_in_other_case() {
        let app = app_with_user("A@Example.com", "secret123").await;
        let (status, body) = call(
            &app,
            "POST",
            "/signup",
            Some(json!({
                "username": "other",
                "email": "a@example.com",
                "password": "secret123",
                "full_name": "Other",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["email"].is_array());
    }

    #[tokio::test]
    async fn login_is_case_insensitive_on_email() {
        let app = app_with_user("A@Example.com", "secret123").await;
        let (status, body) = call(
            &app,
            "POST",
            "/login",
            Some(json!({ "email": "a@example.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(body["refresh"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(body["user_id"].is_string());
        assert_eq!(body["email"], "A@example.com");
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let app = app_with_user("a@example.com", "secret123").await;

        let wrong_pw = call(
            &app,
            "POST",
            "/login",
            Some(json!({ "email": "a@example.com", "password": "wrong-password" })),
        )
        .await;
        let unknown = call(
            &app,
            "POST",
            "/login",
            Some(json!({ "email": "nobody@example.com", "password": "secret123" })),
        )
        .await;

        assert_eq!(wrong_pw.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_pw, unknown);
        assert_eq!(wrong_pw.1, json!({ "error": "Invalid credentials" }));
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let app = build_app(AppState::fake());
        let (status, body) = call(&app, "POST", "/login", Some(json!({ "email": "a@b.co" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn token_obtain_by_username_or_email() {
        let app = app_with_user("jane@example.com", "secret123").await;

        for ident in [json!({ "username": "someone" }), json!({ "email": "JANE@example.com" })] {
            let mut body = ident;
            body["password"] = json!("secret123");
            let (status, res) = call(&app, "POST", "/token", Some(body)).await;
            assert_eq!(status, StatusCode::OK);
            assert!(res["message"].is_string());
            assert!(res["access"].is_string());
            assert!(res["refresh"].is_string());
        }

        let (status, res) = call(
            &app,
            "POST",
            "/token",
            Some(json!({ "username": "someone", "password": "nope-nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(res["message"].is_string());
    }

    #[tokio::test]
    async fn access_token_opens_me_and_refresh_mints_access() {
        let app = app_with_user("jane@example.com", "secret123").await;
        let (_, tokens) = call(
            &app,
            "POST",
            "/login",
            Some(json!({ "email": "jane@example.com", "password": "secret123" })),
        )
        .await;
        let access = tokens["access"].as_str().unwrap();
        let refresh = tokens["refresh"].as_str().unwrap();

        let (status, me) = call_with_auth(&app, "GET", "/me", None, Some(access)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "jane@example.com");
        assert_eq!(me["username"], "someone");
        assert!(me.get("password_hash").is_none());

        // A refresh token is not an access token.
        let (status, _) = call_with_auth(&app, "GET", "/me", None, Some(refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(&app, "POST", "/token/refresh", Some(json!({ "refresh": refresh }))).await;
        assert_eq!(status, StatusCode::OK);
        let new_access = body["access"].as_str().unwrap();
        let (status, _) = call_with_auth(&app, "GET", "/me", None, Some(new_access)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, "POST", "/token/refresh", Some(json!({ "refresh": access }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "token_not_valid");
    }

    #[tokio::test]
    async fn me_requires_bearer() {
        let app = build_app(AppState::fake());
        let (status, _) = call(&app, "GET", "/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call_with_auth(&app, "GET", "/me", None, Some("garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
