use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::error::{ProfileError, Result};
use crate::profiler::PerfStatus;
use crate::AppState;

/// Body pushed on every SSE tick.
#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub results: Vec<PerfStatus>,
}

impl StatusSnapshot {
    fn capture(state: &AppState) -> Self {
        Self {
            running: state.sweep_running.load(Ordering::Relaxed),
            results: state.board.snapshot(),
        }
    }
}

// ─── GET /api/status ─────────────────────────────────────────────
/// Every trial status published so far, oldest first.

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<Vec<PerfStatus>> {
    Json(state.board.snapshot())
}

// ─── GET /api/status/latest ──────────────────────────────────────

pub async fn get_latest(State(state): State<Arc<AppState>>) -> Result<Json<PerfStatus>> {
    state
        .board
        .latest()
        .map(Json)
        .ok_or(ProfileError::NoMeasurements)
}

// ─── GET /api/status/stream ──────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a `StatusSnapshot` as JSON every 500 ms.

pub async fn status_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = std::result::Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = StatusSnapshot::capture(&state);
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::{summarize_windows, StatusBoard, TimestampRecord, WindowCapture};

    fn status(concurrency: usize) -> PerfStatus {
        let capture = WindowCapture {
            window: (0, 1_000_000_000),
            timestamps: vec![TimestampRecord::new(10, 1_010)],
            sent_requests: 1,
            worker_count: concurrency,
            ..Default::default()
        };
        summarize_windows(concurrency, &[capture], None).unwrap()
    }

    #[tokio::test]
    async fn latest_is_not_found_before_any_window() {
        let state = Arc::new(AppState::new(Arc::new(StatusBoard::new())));
        let err = get_latest(State(state)).await.unwrap_err();
        assert!(matches!(err, ProfileError::NoMeasurements));
    }

    #[tokio::test]
    async fn handlers_read_the_board() {
        let board = Arc::new(StatusBoard::new());
        board.publish(status(1));
        board.publish(status(2));
        let state = Arc::new(AppState::new(board));

        let Json(all) = get_status(State(state.clone())).await;
        assert_eq!(all.len(), 2);

        let Json(latest) = get_latest(State(state.clone())).await.unwrap();
        assert_eq!(latest.concurrency, 2);

        let snapshot = StatusSnapshot::capture(&state);
        assert!(!snapshot.running);
        assert_eq!(snapshot.results.len(), 2);
    }
}
