//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    bulk_retry, create_from_products, health, job_progress, next_slot, process_pending, ready,
    retry_job, run_pipeline, run_sweep,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs/progress", get(job_progress))
        .route("/jobs/retry", post(bulk_retry))
        .route("/jobs/from-product", post(create_from_products))
        .route("/jobs/:job_id/pipeline", post(run_pipeline))
        .route("/jobs/:job_id/retry", post(retry_job));

    let pipeline_routes = Router::new()
        .route("/pipelines/process-pending", post(process_pending))
        .route("/pipelines/sweep", post(run_sweep))
        .route("/schedule/next-slot", get(next_slot));

    let api_routes = Router::new()
        .merge(job_routes)
        .merge(pipeline_routes)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = match metrics_handle {
        Some(handle) => Router::new().route("/metrics", get(move || async move { handle.render() })),
        None => Router::new(),
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use tokpipe_media::{MediaError, MediaResult, ProgressSink, VideoRenderer};
    use tokpipe_models::{
        Account, ComposedVideo, Job, ManualClock, PipelineConfig, Product, ProductId,
        VideoCompositionRequest,
    };
    use tokpipe_storage::LocalArtifactStore;
    use tokpipe_store::{AccountStore, JobStore, MemoryStore, ProductStore};
    use tokpipe_tiktok::{
        PostInfo, PublishSettings, PublishStatus, Publisher, QuotaTracker, TikTokApi, TikTokError,
        TikTokResult, TokenGrant, TokenManager,
    };
    use tokpipe_worker::{NotificationHub, Orchestrator, PipelineDeps, WorkerConfig};

    use crate::config::ApiConfig;
    use crate::rate_limit::GovernorLimiter;

    struct FailingRenderer;

    #[async_trait]
    impl VideoRenderer for FailingRenderer {
        async fn compose(
            &self,
            _request: &VideoCompositionRequest,
            _progress: &dyn ProgressSink,
        ) -> MediaResult<ComposedVideo> {
            Err(MediaError::encode_failed("renderer offline", None, Some(1)))
        }
    }

    struct OfflineTikTok;

    #[async_trait]
    impl TikTokApi for OfflineTikTok {
        async fn refresh_access_token(&self, _refresh_token: &str) -> TikTokResult<TokenGrant> {
            Err(TikTokError::config("offline"))
        }

        async fn init_pull_upload(&self, _: &str, _: &PostInfo, _: &str) -> TikTokResult<String> {
            Err(TikTokError::config("offline"))
        }

        async fn upload_file(&self, _: &str, _: &PostInfo, _: &Path) -> TikTokResult<String> {
            Err(TikTokError::config("offline"))
        }

        async fn fetch_publish_status(&self, _: &str, _: &str) -> TikTokResult<PublishStatus> {
            Err(TikTokError::config("offline"))
        }
    }

    struct TestApp {
        _dir: TempDir,
        store: Arc<MemoryStore>,
        router: Router,
    }

    async fn app_with(config: ApiConfig) -> TestApp {
        let dir = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(MemoryStore::new());
        store
            .save_account(&Account::new("acc-1", "tok", "ref", now + chrono::Duration::days(30), now))
            .await
            .unwrap();

        let api = Arc::new(OfflineTikTok);
        let pipeline = Arc::new(PipelineConfig::default());
        let tokens = Arc::new(TokenManager::new(api.clone(), store.clone(), clock.clone()));
        let quota = Arc::new(QuotaTracker::new(store.clone(), clock.clone(), pipeline.max_posts_per_day));
        let publisher = Arc::new(Publisher::new(
            api,
            tokens,
            quota,
            clock.clone(),
            PublishSettings {
                privacy_level: "SELF_ONLY".into(),
                poll_interval: std::time::Duration::from_secs(5),
                max_polls: 2,
            },
        ));

        let deps = PipelineDeps {
            store: store.clone(),
            renderer: Arc::new(FailingRenderer),
            hooks: None,
            artifacts: Arc::new(LocalArtifactStore::new(dir.path(), "https://cdn.test")),
            publisher,
            notifier: NotificationHub::disabled(),
            clock,
        };
        let orchestrator =
            Arc::new(Orchestrator::new(deps, pipeline, &WorkerConfig::default()).unwrap());
        let limiter = Arc::new(GovernorLimiter::new(config.rate_limit_rps, config.rate_limit_burst));
        let state = AppState::new(config, orchestrator, limiter);

        TestApp {
            _dir: dir,
            store,
            router: create_router(state, None),
        }
    }

    async fn app() -> TestApp {
        app_with(ApiConfig {
            rate_limit_rps: 1_000,
            rate_limit_burst: 1_000,
            ..Default::default()
        })
        .await
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_sets_security_and_request_id_headers() {
        let app = app().await;
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("X-Request-ID", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["X-Request-ID"], "req-42");
        assert_eq!(response.headers()["X-Content-Type-Options"], "nosniff");
    }

    #[tokio::test]
    async fn test_ready_with_memory_store() {
        let app = app().await;
        let (status, body) = send(&app.router, get_req("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn test_next_slot_on_empty_schedule() {
        let app = app().await;
        let (status, body) = send(&app.router, get_req("/api/schedule/next-slot?accountId=acc-1")).await;
        assert_eq!(status, StatusCode::OK);
        let slot = body["slot"].as_str().unwrap();
        assert!(slot.starts_with("2026-03-10T09:"), "{}", slot);
        assert!(slot.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_progress_reports_known_jobs_only() {
        let app = app().await;
        let job = Job::new(ProductId::from("p-1"), "Desk Lamp", Utc::now());
        app.store.create_job(&job).await.unwrap();

        let uri = format!("/api/jobs/progress?ids={},missing-job", job.id);
        let (status, body) = send(&app.router, get_req(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], job.id.to_string());
        assert_eq!(items[0]["status"], "PENDING");
        assert_eq!(items[0]["progress"], 0);
    }

    #[tokio::test]
    async fn test_progress_rejects_bad_ids() {
        let app = app().await;
        let (status, _) = send(&app.router, get_req("/api/jobs/progress?ids=")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app.router, get_req("/api/jobs/progress?ids=a%20b")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_pipeline_unknown_job_is_404() {
        let app = app().await;
        let (status, body) = send(&app.router, post_json("/api/jobs/nope/pipeline", json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_pipeline_render_failure_is_reported_in_result() {
        let app = app().await;
        let mut job = Job::new(ProductId::from("p-1"), "Desk Lamp", Utc::now());
        job.image_url = Some("https://img/hero.jpg".into());
        job.hooks = vec!["One".into()];
        app.store.create_job(&job).await.unwrap();

        let uri = format!("/api/jobs/{}/pipeline", job.id);
        let (status, body) = send(&app.router, post_json(&uri, json!({"generateHooks": false}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["stage"], "video");
        assert!(body["error"].as_str().unwrap().contains("renderer offline"));
    }

    #[tokio::test]
    async fn test_process_pending_validates_limit() {
        let app = app().await;
        let (status, body) =
            send(&app.router, post_json("/api/pipelines/process-pending", json!({"limit": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation");

        let (status, body) =
            send(&app.router, post_json("/api/pipelines/process-pending", json!({"limit": 5}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"processed": 0, "success": 0, "failed": 0}));
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_due() {
        let app = app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/pipelines/sweep")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["due"], 0);
    }

    #[tokio::test]
    async fn test_retry_of_pending_job_is_refused() {
        let app = app().await;
        let job = Job::new(ProductId::from("p-1"), "Desk Lamp", Utc::now());
        app.store.create_job(&job).await.unwrap();

        let uri = format!("/api/jobs/{}/retry", job.id);
        let (status, body) = send(&app.router, post_json(&uri, json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Only failed jobs can be retried");
    }

    #[tokio::test]
    async fn test_bulk_retry_counts_each_job() {
        let app = app().await;
        let (status, body) = send(
            &app.router,
            post_json("/api/jobs/retry", json!({"jobIds": ["missing-1", "missing-2"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"processed": 2, "success": 0, "failed": 2}));

        let (status, _) = send(&app.router, post_json("/api/jobs/retry", json!({"jobIds": []}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_jobs_from_products() {
        let app = app().await;
        app.store
            .save_product(&Product::new("p-1", "Standing Desk").with_image("https://img/desk.jpg"))
            .await
            .unwrap();

        let (status, body) = send(
            &app.router,
            post_json("/api/jobs/from-product", json!({"productIds": ["p-1", "p-404"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["processed"], 2);
        assert_eq!(body["success"], 1);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["jobIds"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_sets_remaining_and_rejects() {
        let app = app_with(ApiConfig {
            rate_limit_rps: 1,
            rate_limit_burst: 2,
            ..Default::default()
        })
        .await;

        let request = || {
            Request::builder()
                .uri("/api/schedule/next-slot")
                .header("X-Forwarded-For", "203.0.113.9")
                .body(Body::empty())
                .unwrap()
        };

        let first = app.router.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["X-RateLimit-Remaining"], "1");

        let second = app.router.clone().oneshot(request()).await.unwrap();
        assert_eq!(second.headers()["X-RateLimit-Remaining"], "0");

        let third = app.router.clone().oneshot(request()).await.unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(third.headers()["Retry-After"], "1");

        // Probes are not limited
        let health = app.router.clone().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }
}
