//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempDir;

use reelcut_media::{
    CancelSignal, MediaTool, SceneRequest, ToolContext, ToolError, ToolResult, TrimRequest, VideoInfo,
};
use reelcut_models::{InputRef, Job, JobId, Scene};
use reelcut_storage::LocalStorage;
use reelcut_worker::{ClipEngine, Dispatcher, WorkerConfig};

/// Scripted media tool. Counts invocations and never spawns a process.
pub struct FakeTool {
    pub duration: f64,
    pub scenes: Vec<Scene>,
    pub trim_delay: Duration,
    /// Trims wait for cancellation without reporting progress.
    pub block: AtomicBool,
    pub fail_trim: Option<String>,
    pub panic_on_trim: bool,
    /// Cancel the job through this dispatcher just as its trim succeeds.
    pub cancel_on_finish: OnceLock<Dispatcher>,
    pub probes: AtomicUsize,
    pub trims: AtomicUsize,
    pub detects: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl Default for FakeTool {
    fn default() -> Self {
        Self {
            duration: 10.0,
            scenes: Vec::new(),
            trim_delay: Duration::from_millis(20),
            block: AtomicBool::new(false),
            fail_trim: None,
            panic_on_trim: false,
            cancel_on_finish: OnceLock::new(),
            probes: AtomicUsize::new(0),
            trims: AtomicUsize::new(0),
            detects: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }
}

impl FakeTool {
    pub fn invocations(&self) -> usize {
        self.probes.load(Ordering::SeqCst) + self.trims.load(Ordering::SeqCst) + self.detects.load(Ordering::SeqCst)
    }

    pub fn unblock(&self) {
        self.block.store(false, Ordering::SeqCst);
    }

    fn enter(&self) -> RunningGuard<'_> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        RunningGuard(&self.running)
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaTool for FakeTool {
    async fn probe(&self, _input: &Path, cancel: &CancelSignal) -> ToolResult<VideoInfo> {
        if cancel.is_canceled() {
            return Err(ToolError::Canceled);
        }
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(VideoInfo {
            duration: self.duration,
            width: 1280,
            height: 720,
            fps: 25.0,
            codec: "h264".to_string(),
            size: 10,
        })
    }

    async fn run_trim(&self, request: &TrimRequest, ctx: &ToolContext) -> ToolResult<PathBuf> {
        if ctx.cancel.is_canceled() {
            return Err(ToolError::Canceled);
        }
        self.trims.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter();

        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Partial output exists while the tool runs.
        tokio::fs::write(&request.output, b"partial").await?;

        if self.panic_on_trim {
            panic!("fake tool crashed");
        }
        if self.block.load(Ordering::SeqCst) {
            let mut cancel = ctx.cancel.clone();
            cancel.canceled().await;
            return Err(ToolError::Canceled);
        }

        for step in 1..=4 {
            tokio::time::sleep(self.trim_delay / 4).await;
            if ctx.cancel.is_canceled() {
                return Err(ToolError::Canceled);
            }
            ctx.progress.report(step as f64 / 4.0);
        }

        if let Some(message) = &self.fail_trim {
            return Err(ToolError::execution_failed(
                "ffmpeg exited with status 1",
                Some(message.clone()),
                Some(1),
            ));
        }

        tokio::fs::write(&request.output, b"clip").await?;
        ctx.progress.finish();
        if let Some(dispatcher) = self.cancel_on_finish.get() {
            let job_dir = request.output.parent().and_then(Path::file_name);
            if let Some(name) = job_dir.and_then(|n| n.to_str()) {
                let _ = dispatcher.cancel(&JobId::from_string(name));
            }
        }
        Ok(request.output.clone())
    }

    async fn run_scene_detect(&self, request: &SceneRequest, ctx: &ToolContext) -> ToolResult<Vec<Scene>> {
        if ctx.cancel.is_canceled() {
            return Err(ToolError::Canceled);
        }
        self.detects.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter();
        ctx.progress.report(0.5);
        tokio::time::sleep(self.trim_delay / 2).await;

        let scenes = if self.scenes.is_empty() {
            vec![Scene {
                start: 0.0,
                end: request.duration,
            }]
        } else {
            self.scenes.clone()
        };
        ctx.progress.finish();
        Ok(scenes)
    }
}

/// Temp directories plus a running engine.
pub struct Harness {
    pub dir: TempDir,
    pub tool: Arc<FakeTool>,
    pub engine: ClipEngine,
}

impl Harness {
    pub async fn start(tool: FakeTool, configure: impl FnOnce(&mut WorkerConfig)) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let mut config = test_config(dir.path());
        configure(&mut config);
        Self::start_in(dir, tool, config).await
    }

    pub async fn start_in(dir: TempDir, tool: FakeTool, config: WorkerConfig) -> Self {
        let tool = Arc::new(tool);
        let storage = Arc::new(LocalStorage::new(dir.path().join("out")));
        let engine = ClipEngine::start(config, tool.clone(), storage)
            .await
            .expect("engine start");
        Self { dir, tool, engine }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.engine.dispatcher()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// A small input file accepted by the dispatcher.
    pub fn input(&self) -> InputRef {
        write_input(self.dir.path())
    }

    pub fn work_dir_entries(&self) -> usize {
        std::fs::read_dir(self.work_dir()).map(|d| d.count()).unwrap_or(0)
    }
}

pub fn test_config(root: &Path) -> WorkerConfig {
    WorkerConfig {
        max_concurrent_jobs: 2,
        work_dir: root.join("work"),
        watchdog_interval: Duration::from_millis(50),
        cleanup_retry_delay: Duration::from_millis(1),
        shutdown_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn write_input(root: &Path) -> InputRef {
    let path = root.join("input.mp4");
    std::fs::write(&path, b"fake video").expect("write input");
    InputRef {
        path,
        size_bytes: 10,
        mime_type: "video/mp4".to_string(),
    }
}

/// Poll until `pred` holds for the job or `timeout` elapses.
pub async fn wait_for(
    dispatcher: &Dispatcher,
    id: &JobId,
    timeout: Duration,
    pred: impl Fn(&Job) -> bool,
) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = dispatcher.status(id).expect("job exists");
        if pred(&job) {
            return job;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for job {}; last state {:?}", id, job.status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_terminal(dispatcher: &Dispatcher, id: &JobId) -> Job {
    wait_for(dispatcher, id, Duration::from_secs(5), |j| j.is_terminal()).await
}
