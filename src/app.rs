use std::net::SocketAddr;

use axum::{middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, error, places, rate_limit::limit_by_ip, state::AppState, users};

pub fn api_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(places::router())
        .layer(middleware::from_fn_with_state(state.clone(), limit_by_ip))
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_router(&state))
        .route("/health", get(|| async { "ok" }))
        .fallback(error::fallback)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let ms = latency.as_millis();
                        if status.is_server_error() {
                            tracing::error!(%status, ms, "response");
                        } else {
                            tracing::info!(%status, ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::{Request, StatusCode}};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{auth::store::memory::MemoryCredentialStore, mailer::fakes::RecordingMailer};

    fn app() -> Router {
        build_app(AppState::for_tests(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(RecordingMailer::default()),
        ))
    }

    async fn body(resp: axum::response::Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_outside_the_api() {
        let resp = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("ratelimit-limit").is_none());
    }

    #[tokio::test]
    async fn unknown_route_is_404_with_message() {
        let resp = app()
            .oneshot(Request::get("/api/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body(resp).await,
            json!({ "status": "fail", "message": "can't find /api/nowhere on this server!" })
        );
    }

    #[tokio::test]
    async fn api_routes_carry_rate_limit_headers() {
        let resp = app()
            .oneshot(
                Request::get("/api/users/me")
                    .header("x-forwarded-for", "198.51.100.4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()["ratelimit-limit"], "100");
        assert_eq!(resp.headers()["ratelimit-remaining"], "99");
    }

    #[tokio::test]
    async fn over_budget_is_429() {
        let router = app();
        for _ in 0..100 {
            let resp = router
                .clone()
                .oneshot(
                    Request::post("/api/users/logout")
                        .header("x-forwarded-for", "203.0.113.9")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
        let resp = router
            .oneshot(
                Request::post("/api/users/logout")
                    .header("x-forwarded-for", "203.0.113.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            body(resp).await["message"],
            "Too many requests from this IP, please try again in an hour"
        );
    }
}
