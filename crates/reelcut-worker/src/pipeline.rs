//! Per-kind processing steps run inside a worker slot.
//!
//! Each step goes through the media tool with the job's cancellation signal
//! and a progress sender scoped to its share of the job.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use reelcut_media::{SceneRequest, ToolContext, ToolError, TrimRequest, VideoInfo};
use reelcut_models::{select_longest, ClipOutput, Job, JobId, JobKind, JobOutput, Scene};

use crate::cleanup::ArtifactScope;
use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Share of a scene-clip job's progress spent on detection.
const DETECT_SHARE: f64 = 0.2;

/// Run the pipeline for `job`'s kind.
pub(crate) async fn run(
    ctx: &ProcessingContext,
    job: &Job,
    scope: &ArtifactScope,
    tool_ctx: &ToolContext,
) -> WorkerResult<JobOutput> {
    match job.kind {
        JobKind::ManualClip => manual_clip(ctx, job, scope, tool_ctx).await,
        JobKind::SceneDetect => scene_detect(ctx, job, tool_ctx).await,
        JobKind::SceneClip => scene_clip(ctx, job, scope, tool_ctx).await,
    }
}

async fn manual_clip(
    ctx: &ProcessingContext,
    job: &Job,
    scope: &ArtifactScope,
    tool_ctx: &ToolContext,
) -> WorkerResult<JobOutput> {
    let range = job
        .range
        .ok_or_else(|| WorkerError::invariant(format!("manual-clip job {} has no range", job.id)))?;
    let info = probe(ctx, job, tool_ctx).await?;

    // Half a frame of slack for timestamps taken from a player UI.
    let tolerance = info.frame_duration() / 2.0;
    if range.end > info.duration + tolerance {
        return Err(WorkerError::invalid_range(format!(
            "end {:.3}s is beyond source duration {:.3}s",
            range.end, info.duration
        )));
    }
    let end = range.end.min(info.duration);
    if range.start >= info.duration || end <= range.start {
        return Err(WorkerError::invalid_range(format!(
            "range {:.3}s..{:.3}s does not fit source duration {:.3}s",
            range.start, range.end, info.duration
        )));
    }

    let job_dir = prepare_job_dir(ctx, job, scope).await?;
    let file_name = format!("clip.{}", ctx.config.encoding.container);
    let clip = trim_and_persist(ctx, job, scope, tool_ctx, range.start, end, &job_dir, &file_name).await?;

    Ok(JobOutput::single_clip(ClipOutput {
        scene_index: None,
        start: range.start,
        end,
        location: clip,
    }))
}

async fn scene_detect(ctx: &ProcessingContext, job: &Job, tool_ctx: &ToolContext) -> WorkerResult<JobOutput> {
    let info = probe(ctx, job, tool_ctx).await?;
    let scenes = detect(ctx, job, &info, tool_ctx).await?;
    Ok(JobOutput::scenes(scenes))
}

async fn scene_clip(
    ctx: &ProcessingContext,
    job: &Job,
    scope: &ArtifactScope,
    tool_ctx: &ToolContext,
) -> WorkerResult<JobOutput> {
    let info = probe(ctx, job, tool_ctx).await?;
    let scenes = detect(ctx, job, &info, &tool_ctx.scoped(0.0, DETECT_SHARE)).await?;

    let selected: Vec<(usize, Scene)> = match job.scene_options.max_scenes {
        Some(k) => select_longest(&scenes, k),
        None => scenes.iter().copied().enumerate().collect(),
    };
    info!(
        job_id = %job.id,
        detected = scenes.len(),
        selected = selected.len(),
        "Clipping scenes"
    );

    let job_dir = prepare_job_dir(ctx, job, scope).await?;
    let total: f64 = selected.iter().map(|(_, s)| s.duration()).sum();
    let clip_share = 1.0 - DETECT_SHARE;
    let mut done = 0.0;
    let mut clips = Vec::with_capacity(selected.len());

    for (position, (index, scene)) in selected.iter().enumerate() {
        if tool_ctx.cancel.is_canceled() {
            discard_clips(ctx, &job.id, &clips).await;
            return Err(ToolError::Canceled.into());
        }
        let weight = if total > 0.0 {
            scene.duration() / total
        } else {
            1.0 / selected.len() as f64
        };
        let step = tool_ctx.scoped(DETECT_SHARE + clip_share * done, clip_share * weight);
        let file_name = format!("scene-{:03}.{}", index, ctx.config.encoding.container);
        debug!(job_id = %job.id, scene = index, position, "Clipping scene");

        let location =
            match trim_and_persist(ctx, job, scope, &step, scene.start, scene.end, &job_dir, &file_name).await {
                Ok(location) => location,
                Err(e) => {
                    discard_clips(ctx, &job.id, &clips).await;
                    return Err(e);
                }
            };
        clips.push(ClipOutput {
            scene_index: Some(*index),
            start: scene.start,
            end: scene.end,
            location,
        });
        done += weight;
    }

    Ok(JobOutput { clips, scenes })
}

/// Remove clips already in storage for a job that will not complete.
pub(crate) async fn discard_clips(ctx: &ProcessingContext, id: &JobId, clips: &[ClipOutput]) {
    for clip in clips {
        match ctx.storage.delete(&clip.location).await {
            Ok(()) => debug!(job_id = %id, key = %clip.location.key, "Discarded clip"),
            Err(e) => warn!(job_id = %id, key = %clip.location.key, "Failed to discard clip: {}", e),
        }
    }
}

async fn probe(ctx: &ProcessingContext, job: &Job, tool_ctx: &ToolContext) -> WorkerResult<VideoInfo> {
    let started = Instant::now();
    let info = ctx.tool.probe(&job.input.path, &tool_ctx.cancel).await?;
    metrics::record_tool_duration("probe", started.elapsed().as_secs_f64());
    debug!(
        job_id = %job.id,
        duration = info.duration,
        width = info.width,
        height = info.height,
        codec = %info.codec,
        "Probed source"
    );

    let duration = info.duration;
    ctx.store.update(&job.id, |record| {
        record.source_duration = Some(duration);
        Ok::<(), WorkerError>(())
    })?;
    Ok(info)
}

async fn detect(
    ctx: &ProcessingContext,
    job: &Job,
    info: &VideoInfo,
    tool_ctx: &ToolContext,
) -> WorkerResult<Vec<Scene>> {
    let request = SceneRequest {
        input: job.input.path.clone(),
        duration: info.duration,
        options: job.scene_options,
    };
    let started = Instant::now();
    let scenes = ctx.tool.run_scene_detect(&request, tool_ctx).await?;
    metrics::record_tool_duration("scene_detect", started.elapsed().as_secs_f64());
    Ok(scenes)
}

async fn prepare_job_dir(ctx: &ProcessingContext, job: &Job, scope: &ArtifactScope) -> WorkerResult<PathBuf> {
    let dir = ctx.config.job_dir(&job.id);
    scope.track(dir.clone());
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

/// Trim `[start, end)` into the job dir and hand the result to storage.
#[allow(clippy::too_many_arguments)]
async fn trim_and_persist(
    ctx: &ProcessingContext,
    job: &Job,
    scope: &ArtifactScope,
    tool_ctx: &ToolContext,
    start: f64,
    end: f64,
    job_dir: &Path,
    file_name: &str,
) -> WorkerResult<reelcut_models::StorageRef> {
    let output = job_dir.join(file_name);
    scope.track(output.clone());

    let request = TrimRequest {
        input: job.input.path.clone(),
        start,
        end,
        output,
    };
    let started = Instant::now();
    let produced = ctx.tool.run_trim(&request, tool_ctx).await?;
    metrics::record_tool_duration("trim", started.elapsed().as_secs_f64());
    if produced != request.output {
        scope.track(produced.clone());
    }

    let key = format!("{}/{}", job.output_prefix, file_name);
    let location = ctx.storage.persist(&produced, &key).await?;
    scope.hand_off(&produced);
    debug!(job_id = %job.id, key = %location.key, "Persisted clip");
    Ok(location)
}
