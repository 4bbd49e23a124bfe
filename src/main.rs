use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rust_infer_bench::config::ProfilerConfig;
use rust_infer_bench::load_generator::{SimulatedBackend, SimulationParams};
use rust_infer_bench::metrics::report::{render_status, render_sweep_summary};
use rust_infer_bench::profiler::{Profiler, StatusBoard};
use rust_infer_bench::{server, AppState};

/// Sweep concurrency against an inference backend until throughput and
/// latency settle, then report what each level sustained.
#[derive(Debug, Parser)]
#[command(name = "rust-infer-bench", version)]
struct Args {
    /// JSON profiler config; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Concurrency levels as start[:end[:step]]
    #[arg(long)]
    concurrency_range: Option<String>,

    /// Measurement window length (ms)
    #[arg(long)]
    measurement_interval: Option<u64>,

    /// Allowed spread inside the stability window, in percent
    #[arg(long)]
    stability_percentage: Option<f64>,

    /// Windows to try per level before giving up
    #[arg(long)]
    max_trials: Option<usize>,

    /// Stop the sweep once the stabilizing latency exceeds this (ms); 0 disables
    #[arg(long)]
    latency_threshold: Option<u64>,

    /// Stabilize on this latency percentile instead of the mean
    #[arg(long)]
    percentile: Option<u8>,

    /// Serve live status over HTTP on this address, e.g. 0.0.0.0:3000
    #[arg(long)]
    serve: Option<SocketAddr>,

    /// Service time of one request on the simulated server (ms)
    #[arg(long, default_value_t = 10)]
    base_latency_ms: u64,

    /// Concurrency at which the simulated server saturates
    #[arg(long, default_value_t = 8)]
    saturation: usize,

    /// GPUs reported by the simulated server
    #[arg(long, default_value_t = 2)]
    gpus: usize,
}

impl Args {
    fn profiler_config(&self) -> anyhow::Result<ProfilerConfig> {
        let mut config = match &self.config {
            Some(path) => ProfilerConfig::from_json_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => ProfilerConfig::default(),
        };

        if let Some(range) = &self.concurrency_range {
            config.set_concurrency_range(range)?;
        }
        if let Some(ms) = self.measurement_interval {
            config.measurement_window_ms = ms;
        }
        if let Some(pct) = self.stability_percentage {
            config.stability_threshold = pct / 100.0;
        }
        if let Some(n) = self.max_trials {
            config.max_trials = n;
        }
        if let Some(ms) = self.latency_threshold {
            config.latency_threshold_ms = Some(ms);
        }
        if self.percentile.is_some() {
            config.percentile = self.percentile;
        }

        config.validate()?;
        Ok(config)
    }

    fn simulation_params(&self) -> SimulationParams {
        SimulationParams {
            base_latency: Duration::from_millis(self.base_latency_ms),
            saturation_concurrency: self.saturation,
            gpu_count: self.gpus,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.profiler_config()?;

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🔬  INFERENCE LOAD PROFILER                    ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();
    println!(
        "Measurement window {} ms, stability ±{}% over {} windows, up to {} trials per level",
        config.measurement_window_ms,
        config.stability_threshold * 100.0,
        config.stability_window,
        config.max_trials,
    );
    println!();

    // ── 1. Shared state ──────────────────────────────────────────
    let board = Arc::new(StatusBoard::new());
    let state = Arc::new(AppState::new(board.clone()));

    // ── 2. Optional status server ────────────────────────────────
    if let Some(addr) = args.serve {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        let app = server::create_router(state.clone());

        println!("Status JSON     → http://{addr}/api/status");
        println!("Status SSE      → http://{addr}/api/status/stream");
        println!();

        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(%err, "status server exited");
            }
        });
    }

    // ── 3. Sweep ─────────────────────────────────────────────────
    let mut backend = SimulatedBackend::new(args.simulation_params(), config.metrics_interval());
    let profiler = Profiler::new(config)?.with_board(board);

    state.sweep_running.store(true, Ordering::SeqCst);
    let outcome = profiler.sweep(&mut backend).await;
    state.sweep_running.store(false, Ordering::SeqCst);
    backend.shutdown().await;
    let results = outcome?;

    // ── 4. Report ────────────────────────────────────────────────
    println!();
    for result in &results {
        print!("{}", render_status(&result.status));
        if !result.stable {
            println!("  Failed to obtain stable measurement after {} trials", result.trials);
        }
        println!();
    }
    print!("{}", render_sweep_summary(&results));

    if args.serve.is_some() {
        info!("sweep finished, serving results until ctrl-c");
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
