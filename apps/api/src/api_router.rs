use std::time::Duration;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

pub fn build_router(app_state: AppState, request_timeout: Duration) -> Router {
    let protected_routes = Router::new()
        .route(
            "/api/v1/clusters",
            get(handlers::clusters::list_clusters_handler)
                .post(handlers::clusters::create_cluster_handler),
        )
        .route(
            "/api/v1/clusters/{cluster_id}",
            get(handlers::clusters::get_cluster_handler)
                .put(handlers::clusters::update_cluster_handler)
                .delete(handlers::clusters::delete_cluster_handler),
        )
        .route(
            "/api/v1/users/role",
            post(handlers::users::assign_role_handler),
        )
        .route("/api/v1/access", get(handlers::access::list_access_handler))
        .route(
            "/api/v1/access/grant",
            post(handlers::access::grant_access_handler),
        )
        .route(
            "/api/v1/access/revoke",
            post(handlers::access::revoke_access_handler),
        )
        .route(
            "/api/v1/access/approve",
            post(handlers::access::approve_access_handler),
        )
        .route(
            "/api/v1/access/deny",
            post(handlers::access::deny_access_handler),
        )
        .route(
            "/api/v1/access/status",
            get(handlers::access::access_status_handler),
        )
        .route(
            "/api/v1/access/kubeconfig",
            get(handlers::access::kubeconfig_handler),
        )
        .route(
            "/api/v1/access/cleanup",
            post(handlers::access::cleanup_handler),
        )
        .route(
            "/api/v1/access/{access_id}",
            delete(handlers::access::delete_access_handler),
        )
        .route_layer(from_fn(middleware::require_caller));

    Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route("/ready", get(handlers::health::ready_handler))
        .route(
            "/slack/commands",
            post(handlers::slack::slack_command_handler),
        )
        .merge(protected_routes)
        .layer(from_fn_with_state(
            request_timeout,
            middleware::enforce_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::chat::{SIGNATURE_HEADER, TIMESTAMP_HEADER, sign};
    use crate::middleware::CALLER_ID_HEADER;
    use crate::test_support::{ADMIN, REQUESTER, SIGNING_SECRET, test_state};

    async fn router() -> Router {
        build_router(test_state().await, Duration::from_secs(5))
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router
            .oneshot(request)
            .await
            .unwrap_or_else(|_| unreachable!());
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap_or_default();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get_as(uri: &str, caller: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(caller) = caller {
            builder = builder.header(CALLER_ID_HEADER, caller);
        }
        builder
            .body(Body::empty())
            .unwrap_or_else(|_| unreachable!())
    }

    fn post_json(uri: &str, caller: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CALLER_ID_HEADER, caller)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|_| unreachable!())
    }

    #[tokio::test]
    async fn health_and_ready_need_no_identity() {
        let (status, body) = send(router().await, get_as("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(router().await, get_as("/ready", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["storage"]["status"], "ok");
    }

    #[tokio::test]
    async fn api_requires_caller_header() {
        let (status, body) = send(router().await, get_as("/api/v1/clusters", None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].as_str().unwrap_or_default().contains("caller identity"));
    }

    #[tokio::test]
    async fn grant_then_status_round_trip() {
        let router = router().await;

        let (status, created) = send(
            router.clone(),
            post_json(
                "/api/v1/access/grant",
                REQUESTER,
                serde_json::json!({
                    "cluster": "dev-east-1",
                    "reason": "debugging ticket 4217",
                    "duration": "2h",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["phase"], "Pending");
        assert_eq!(created["duration"], "2h");
        let access_id = created["access_id"].as_str().unwrap_or_default().to_owned();

        let uri = format!("/api/v1/access/status?id={access_id}");
        let (status, fetched) = send(router.clone(), get_as(&uri, Some(REQUESTER))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["cluster"], "dev-east-1");

        let uri = format!("/api/v1/access/kubeconfig?id={access_id}");
        let (status, _) = send(router, get_as(&uri, Some(REQUESTER))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn policy_and_role_failures_map_to_statuses() {
        let router = router().await;

        let (status, _) = send(
            router.clone(),
            post_json(
                "/api/v1/access/grant",
                REQUESTER,
                serde_json::json!({
                    "cluster": "dev-east-1",
                    "reason": "debugging ticket 4217",
                    "permissions": ["cluster-admin"],
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let cluster = serde_json::json!({
            "name": "stage-west-2",
            "account": "123456789012",
            "region": "us-west-2",
            "environment": "staging",
        });
        let (status, _) = send(
            router.clone(),
            post_json("/api/v1/clusters", REQUESTER, cluster.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, created) =
            send(router.clone(), post_json("/api/v1/clusters", ADMIN, cluster)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            created["arn"],
            "arn:aws:eks:us-west-2:123456789012:cluster/stage-west-2"
        );

        let (status, _) = send(
            router,
            post_json(
                "/api/v1/access/revoke",
                ADMIN,
                serde_json::json!({ "access_id": "missing" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn slack_commands_require_valid_signature() {
        let body = "command=%2Fjit&text=list&user_id=U0000000001&user_name=dana";
        let now = chrono::Utc::now().timestamp().to_string();

        let forged = Request::builder()
            .method("POST")
            .uri("/slack/commands")
            .header(TIMESTAMP_HEADER, now.as_str())
            .header(SIGNATURE_HEADER, sign("wrong-secret", &now, body.as_bytes()))
            .body(Body::from(body))
            .unwrap_or_else(|_| unreachable!());
        let (status, _) = send(router().await, forged).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let signed = Request::builder()
            .method("POST")
            .uri("/slack/commands")
            .header(TIMESTAMP_HEADER, now.as_str())
            .header(SIGNATURE_HEADER, sign(SIGNING_SECRET, &now, body.as_bytes()))
            .body(Body::from(body))
            .unwrap_or_else(|_| unreachable!());
        let (status, reply) = send(router().await, signed).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["response_type"], "ephemeral");
        assert!(reply["text"].as_str().unwrap_or_default().contains("dev-east-1"));
    }
}
