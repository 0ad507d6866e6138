//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use reelcut_media::TimeoutPolicy;
use reelcut_models::{EncodingConfig, SceneOptions, DEFAULT_ACCEPTED_MIME_TYPES};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of worker slots (concurrent jobs)
    pub max_concurrent_jobs: usize,
    /// Work directory for temporary files
    pub work_dir: PathBuf,
    /// Tool timeout as a multiple of the media duration processed
    pub tool_timeout_multiplier: f64,
    /// Lower bound for any tool timeout
    pub tool_timeout_floor: Duration,
    /// Running jobs without progress for this long are force-failed
    pub stall_timeout: Duration,
    /// How often the watchdog runs
    pub watchdog_interval: Duration,
    /// Terminal jobs are evicted this long after finishing
    pub retention: Duration,
    /// Retries for a failed artifact deletion
    pub cleanup_retries: u32,
    /// Base backoff between cleanup retries
    pub cleanup_retry_delay: Duration,
    /// Job store snapshot file, if persistence is enabled
    pub snapshot_path: Option<PathBuf>,
    /// Accepted input MIME types
    pub accepted_mime_types: Vec<String>,
    /// Re-encode settings for produced clips
    pub encoding: EncodingConfig,
    /// Scene options applied where a request leaves them unset
    pub scene_defaults: SceneOptions,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            work_dir: PathBuf::from("/tmp/reelcut"),
            tool_timeout_multiplier: 10.0,
            tool_timeout_floor: Duration::from_secs(60),
            stall_timeout: Duration::from_secs(600),
            watchdog_interval: Duration::from_secs(15),
            retention: Duration::from_secs(24 * 3600),
            cleanup_retries: 3,
            cleanup_retry_delay: Duration::from_millis(100),
            snapshot_path: None,
            accepted_mime_types: DEFAULT_ACCEPTED_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
            encoding: EncodingConfig::default(),
            scene_defaults: SceneOptions::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_parse::<u64>(key).map(Duration::from_secs).unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut encoding = defaults.encoding.clone();
        if let Some(crf) = env_parse::<u8>("WORKER_CRF") {
            encoding = encoding.with_crf(crf);
        }
        if let Ok(preset) = std::env::var("WORKER_PRESET") {
            encoding = encoding.with_preset(preset);
        }

        let scene_defaults = SceneOptions {
            sensitivity: env_parse::<f64>("WORKER_SCENE_SENSITIVITY")
                .filter(|s| *s > 0.0 && *s < 1.0)
                .unwrap_or(defaults.scene_defaults.sensitivity),
            min_scene_len: env_parse::<f64>("WORKER_MIN_SCENE_LEN")
                .filter(|l| l.is_finite() && *l >= 0.0)
                .unwrap_or(defaults.scene_defaults.min_scene_len),
            max_scenes: env_parse::<usize>("WORKER_MAX_SCENES")
                .filter(|k| *k > 0)
                .or(defaults.scene_defaults.max_scenes),
        };

        Self {
            max_concurrent_jobs: env_parse::<usize>("WORKER_MAX_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            tool_timeout_multiplier: env_parse::<f64>("WORKER_TOOL_TIMEOUT_MULTIPLIER")
                .filter(|m| m.is_finite() && *m > 0.0)
                .unwrap_or(defaults.tool_timeout_multiplier),
            tool_timeout_floor: env_secs("WORKER_TOOL_TIMEOUT_FLOOR_SECS", defaults.tool_timeout_floor),
            stall_timeout: env_secs("WORKER_STALL_TIMEOUT_SECS", defaults.stall_timeout),
            watchdog_interval: env_secs("WORKER_WATCHDOG_INTERVAL_SECS", defaults.watchdog_interval),
            retention: env_secs("WORKER_RETENTION_SECS", defaults.retention),
            cleanup_retries: env_parse("WORKER_CLEANUP_RETRIES").unwrap_or(defaults.cleanup_retries),
            cleanup_retry_delay: env_parse::<u64>("WORKER_CLEANUP_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cleanup_retry_delay),
            snapshot_path: std::env::var("WORKER_SNAPSHOT_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            accepted_mime_types: std::env::var("WORKER_ACCEPTED_MIME_TYPES")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|m| m.trim().to_ascii_lowercase())
                        .filter(|m| !m.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|list| !list.is_empty())
                .unwrap_or(defaults.accepted_mime_types),
            encoding,
            scene_defaults,
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT", defaults.shutdown_timeout),
        }
    }

    /// Timeout policy handed to the media tool.
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            multiplier: self.tool_timeout_multiplier,
            floor: self.tool_timeout_floor,
        }
    }

    /// Per-job scratch directory.
    pub fn job_dir(&self, job_id: &reelcut_models::JobId) -> PathBuf {
        self.work_dir.join(job_id.as_str())
    }
}
