//! WebSocket status streaming.
//!
//! `GET /ws/jobs/:id` pushes a [`StatusReport`] on every committed change of
//! the job and closes after the terminal report.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info};

use reelcut_models::{Job, JobId, StatusReport};

use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Upgrade to a status stream. Unknown jobs get a 404 before the upgrade.
pub async fn ws_job_status(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let job_id = JobId::from_string(job_id);
    let rx = state.dispatcher.subscribe(&job_id)?;

    Ok(ws
        .on_upgrade(move |socket| async move {
            let _open = ConnectionGuard::open();
            stream_status(socket, job_id, rx).await;
        })
        .into_response())
}

/// Counts an upgraded connection in the active gauge until dropped.
struct ConnectionGuard;

impl ConnectionGuard {
    fn open() -> Self {
        let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_ws_active_connections(count);
        metrics::record_ws_connection();
        Self
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    }
}

fn status_message(job: &Job) -> Option<Message> {
    serde_json::to_string(&StatusReport::from(job)).ok().map(Message::Text)
}

async fn stream_status(socket: WebSocket, job_id: JobId, mut rx: watch::Receiver<Job>) {
    let (mut sender, mut receiver) = socket.split();
    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut last_seq = None;

    info!(job_id = %job_id, "Status stream opened");

    loop {
        // Snapshot the latest committed state; intermediate values may be
        // coalesced but event_seq only moves forward.
        let job = rx.borrow_and_update().clone();
        if last_seq != Some(job.event_seq) {
            last_seq = Some(job.event_seq);
            let Some(msg) = status_message(&job) else { break };
            if sender.send(msg).await.is_err() {
                debug!(job_id = %job_id, "Client went away");
                return;
            }
            metrics::record_ws_message_sent(job.status.as_str());
        }
        if job.status.is_terminal() {
            break;
        }

        tokio::select! {
            changed = rx.changed() => {
                // Sender dropped: the record was removed.
                if changed.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    return;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        debug!(job_id = %job_id, "Client closed status stream");
                        return;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    info!(job_id = %job_id, "Status stream closed");
}
