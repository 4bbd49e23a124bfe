use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod load_generator;
pub mod metrics;
pub mod profiler;
pub mod server;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Every trial status published so far; the profiler writes, handlers read.
    pub board: Arc<profiler::StatusBoard>,

    /// True while a sweep is in progress.
    pub sweep_running: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(board: Arc<profiler::StatusBoard>) -> Self {
        Self {
            board,
            sweep_running: Arc::new(AtomicBool::new(false)),
        }
    }
}
