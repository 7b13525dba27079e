use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
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

pub async fn serve(app: Router, config: &crate::config::AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtKeys;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    // All requests here are rejected before any query runs, so the lazily
    // connecting test pool never needs a live database.
    fn test_app() -> Router {
        build_app(AppState::for_tests("test-secret", Duration::days(7)))
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn json_request(method: Method, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let res = test_app().oneshot(request(Method::GET, "/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_methods_get_405() {
        for (method, uri) in [
            (Method::GET, "/auth/register"),
            (Method::PUT, "/auth/register"),
            (Method::GET, "/auth/login"),
            (Method::POST, "/profile"),
            (Method::DELETE, "/profile"),
        ] {
            let res = test_app().oneshot(request(method.clone(), uri)).await.unwrap();
            assert_eq!(
                res.status(),
                StatusCode::METHOD_NOT_ALLOWED,
                "{method} {uri}"
            );
        }
    }

    #[tokio::test]
    async fn profile_without_header_is_401() {
        let res = test_app().oneshot(request(Method::GET, "/profile")).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_with_malformed_header_is_401() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/profile")
            .header(header::AUTHORIZATION, "Token abc")
            .body(Body::empty())
            .unwrap();
        let res = test_app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_with_expired_token_is_401() {
        let expired = JwtKeys::new("test-secret", Duration::seconds(-30))
            .unwrap()
            .sign(Uuid::new_v4(), "old@example.com")
            .unwrap();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/profile")
            .header(header::AUTHORIZATION, format!("Bearer {expired}"))
            .body(Body::empty())
            .unwrap();
        let res = test_app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_with_tampered_token_is_401() {
        let foreign = JwtKeys::new("other-secret", Duration::days(7))
            .unwrap()
            .sign(Uuid::new_v4(), "a@example.com")
            .unwrap();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/profile")
            .header(header::AUTHORIZATION, format!("Bearer {foreign}"))
            .body(Body::empty())
            .unwrap();
        let res = test_app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_validation_failure_is_400_with_field_map() {
        let res = test_app()
            .oneshot(json_request(
                Method::POST,
                "/auth/register",
                r#"{"name":"","email":"nope","password":"123"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["details"]["name"][0], "Name is required");
        assert_eq!(json["details"]["email"][0], "Invalid email");
        assert_eq!(
            json["details"]["password"][0],
            "Password must be at least 6 characters"
        );
    }

    #[tokio::test]
    async fn register_missing_fields_is_400() {
        let res = test_app()
            .oneshot(json_request(Method::POST, "/auth/register", "{}"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_validation_failure_is_400() {
        let res = test_app()
            .oneshot(json_request(
                Method::POST,
                "/auth/login",
                r#"{"email":"not-an-email","password":""}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
