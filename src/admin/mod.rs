//! Read-only operator API over the backend pool.
//!
//! Served on its own listener (`admin.bind_address`) so it never shares a
//! port with proxied traffic. Every route requires a bearer token.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::dispatcher::Dispatcher;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub dispatcher: Arc<Dispatcher>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(dispatcher: Arc<Dispatcher>, api_key: &str) -> Self {
        Self {
            dispatcher,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(get_backends))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutConfig;
    use crate::load_balancer::backend::test_support::{pool_of, trip};
    use crate::load_balancer::round_robin::RoundRobin;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router() -> (Router, Arc<Dispatcher>) {
        let pool = Arc::new(pool_of(&["http://127.0.0.1:9001", "http://127.0.0.1:9002"]));
        let dispatcher = Arc::new(Dispatcher::new(
            pool,
            Box::new(RoundRobin::new()),
            &TimeoutConfig::default(),
        ));
        let state = AdminState::new(dispatcher.clone(), "secret");
        (setup_admin_router(state), dispatcher)
    }

    fn get(path: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let (app, _) = router();

        let missing = app.clone().oneshot(get("/admin/status", None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .clone()
            .oneshot(get("/admin/backends", Some("nope")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = app.oneshot(get("/admin/status", Some("secret"))).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_counts_eligible() {
        let (app, dispatcher) = router();
        trip(&dispatcher.pool().backends()[1]);

        let response = app.oneshot(get("/admin/status", Some("secret"))).await.unwrap();
        let body = json(response).await;
        assert_eq!(body["strategy"], "round-robin");
        assert_eq!(body["backends"], 2);
        assert_eq!(body["eligible"], 1);
        assert_eq!(body["total_weight"], 1.0);
        assert_eq!(body["status"], "degraded");
    }

    #[tokio::test]
    async fn test_backends_lists_snapshots() {
        let (app, dispatcher) = router();
        let _guard = dispatcher.pool().backends()[0].acquire();

        let response = app
            .oneshot(get("/admin/backends", Some("secret")))
            .await
            .unwrap();
        let body = json(response).await;
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["address"], "http://127.0.0.1:9001");
        assert_eq!(list[0]["connections"], 1);
        assert_eq!(list[0]["breaker"], "closed");
        assert_eq!(list[1]["connections"], 0);
    }
}
