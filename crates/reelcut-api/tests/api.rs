//! API integration tests.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use reelcut_api::{create_router, ApiConfig, AppState};
use reelcut_media::{
    CancelSignal, MediaTool, SceneRequest, ToolContext, ToolError, ToolResult, TrimRequest, VideoInfo,
};
use reelcut_models::Scene;
use reelcut_storage::LocalStorage;
use reelcut_worker::{ClipEngine, WorkerConfig};

/// Tool that trims by writing a marker file.
struct QuickTool;

#[async_trait]
impl MediaTool for QuickTool {
    async fn probe(&self, _input: &Path, cancel: &CancelSignal) -> ToolResult<VideoInfo> {
        if cancel.is_canceled() {
            return Err(ToolError::Canceled);
        }
        Ok(VideoInfo {
            duration: 10.0,
            width: 640,
            height: 360,
            fps: 25.0,
            codec: "h264".to_string(),
            size: 10,
        })
    }

    async fn run_trim(&self, request: &TrimRequest, ctx: &ToolContext) -> ToolResult<PathBuf> {
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output, b"clip").await?;
        ctx.progress.finish();
        Ok(request.output.clone())
    }

    async fn run_scene_detect(&self, request: &SceneRequest, ctx: &ToolContext) -> ToolResult<Vec<Scene>> {
        ctx.progress.finish();
        Ok(vec![Scene {
            start: 0.0,
            end: request.duration,
        }])
    }
}

struct TestApp {
    dir: TempDir,
    router: Router,
    _engine: ClipEngine,
}

impl TestApp {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let worker_config = WorkerConfig {
            work_dir: dir.path().join("work"),
            snapshot_path: None,
            watchdog_interval: Duration::from_millis(50),
            ..WorkerConfig::default()
        };
        let api_config = ApiConfig {
            output_dir: dir.path().join("out"),
            ..ApiConfig::default()
        };
        let storage = Arc::new(LocalStorage::new(&api_config.output_dir));
        let engine = ClipEngine::start(worker_config, Arc::new(QuickTool), storage.clone())
            .await
            .unwrap();
        let state = AppState::new(api_config, engine.dispatcher(), storage);

        Self {
            dir,
            router: create_router(state, None),
            _engine: engine,
        }
    }

    fn input_path(&self) -> PathBuf {
        let path = self.dir.path().join("input.mp4");
        std::fs::write(&path, b"0123456789").unwrap();
        path
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn wait_for_state(&self, job_id: &str, state: &str) -> Value {
        for _ in 0..200 {
            let (_, body) = self.get(&format!("/api/jobs/{job_id}")).await;
            if body["state"] == state {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached {state}");
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::start().await;
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.get("/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"]["status"], "ok");
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let app = TestApp::start().await;
    let (status, body) = app.get("/api/jobs/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = app.delete("/api/jobs/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_empty_range_is_rejected() {
    let app = TestApp::start().await;
    let path = app.input_path();
    let (status, body) = app
        .post(
            "/api/jobs",
            json!({
                "kind": "manual-clip",
                "input": {"path": path, "size_bytes": 10, "mime_type": "video/mp4"},
                "start": 5,
                "end": "00:00:05",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");

    let (_, jobs) = app.get("/api/jobs").await;
    assert_eq!(jobs.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_upload_then_clip_then_acknowledge() {
    let app = TestApp::start().await;
    let path = app.input_path();

    let (status, input) = app
        .post(
            "/api/uploads",
            json!({"path": path, "mime_type": "video/mp4", "size_bytes": 10}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            "/api/jobs",
            json!({"kind": "manual-clip", "input": input, "start": "00:00:01", "end": 4.5}),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let done = app.wait_for_state(&job_id, "done").await;
    assert_eq!(done["progress"], 1.0);
    assert!(done["output"].is_object());

    // Terminal jobs cannot be canceled.
    let (status, _) = app.delete(&format!("/api/jobs/{job_id}")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, jobs) = app.get("/api/jobs?state=done").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().map(Vec::len), Some(1));

    let (status, acked) = app.post(&format!("/api/jobs/{job_id}/ack"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acked["state"], "done");

    let (status, _) = app.get(&format!("/api/jobs/{job_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_upload_type() {
    let app = TestApp::start().await;
    let path = app.input_path();
    let (status, _) = app
        .post(
            "/api/uploads",
            json!({"path": path, "mime_type": "text/plain", "size_bytes": 10}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
