use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{ProfileError, Result};
use crate::metrics::collector::{spawn_sampler, GpuMetricsSource, MetricsCollector};
use crate::metrics::Metrics;
use crate::profiler::{LoadDriver, TimestampRecord, WindowCapture};

// ─── Configuration ───────────────────────────────────────────────

/// Requests per sequence; the last one carries the sequence-end flag.
const SEQUENCE_LENGTH: u64 = 4;

const GIB: u64 = 1 << 30;

/// Shape of the synthetic inference server.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    /// Service time of one request on an idle server.
    pub base_latency: Duration,
    /// Concurrency at which the server is fully busy; above it requests queue.
    pub saturation_concurrency: usize,
    /// Uniform ± jitter applied to every service time, as a fraction.
    pub jitter: f64,
    pub gpu_count: usize,
    pub gpu_memory_total_bytes: u64,
    pub seed: u64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            base_latency: Duration::from_millis(10),
            saturation_concurrency: 8,
            jitter: 0.05,
            gpu_count: 2,
            gpu_memory_total_bytes: 16 * GIB,
            seed: 1000,
        }
    }
}

impl SimulationParams {
    /// Service time at `concurrency`: flat until saturation, then linear.
    fn latency_at(&self, concurrency: usize, rng: &mut StdRng) -> Duration {
        let queueing = concurrency.max(1) as f64 / self.saturation_concurrency.max(1) as f64;
        let jitter = if self.jitter > 0.0 {
            rng.gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        let nanos = self.base_latency.as_nanos() as f64 * queueing.max(1.0) * (1.0 + jitter);
        Duration::from_nanos(nanos.round() as u64)
    }
}

// ─── Shared worker state ─────────────────────────────────────────

struct Shared {
    /// Clock every timestamp is measured against.
    anchor: Instant,
    log: Mutex<Vec<TimestampRecord>>,
    sent: AtomicUsize,
    idle_ns: AtomicU64,
    /// Read by the GPU monitor to shape utilization.
    concurrency: AtomicUsize,
}

impl Shared {
    fn nanos_since_anchor(&self, at: Instant) -> u64 {
        at.duration_since(self.anchor).as_nanos() as u64
    }
}

// ─── Simulated backend ───────────────────────────────────────────

/// A [`LoadDriver`] backed by Tokio tasks that pretend to be inference
/// requests, so the profiler can run end to end without a server.
pub struct SimulatedBackend {
    params: SimulationParams,
    shared: Arc<Shared>,
    collector: Arc<MetricsCollector>,
    metrics_interval: Duration,

    /// Flag checked by every worker on each iteration.
    workers_running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,

    sampler_running: Arc<AtomicBool>,
    sampler: Option<JoinHandle<()>>,
}

impl SimulatedBackend {
    pub fn new(params: SimulationParams, metrics_interval: Duration) -> Self {
        Self {
            params,
            shared: Arc::new(Shared {
                anchor: Instant::now(),
                log: Mutex::new(Vec::with_capacity(4096)),
                sent: AtomicUsize::new(0),
                idle_ns: AtomicU64::new(0),
                concurrency: AtomicUsize::new(0),
            }),
            collector: Arc::new(MetricsCollector::new()),
            metrics_interval,
            workers_running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            sampler_running: Arc::new(AtomicBool::new(false)),
            sampler: None,
        }
    }

    /// Stop every worker and the telemetry sampler, waiting for them to exit.
    pub async fn shutdown(&mut self) {
        self.stop_workers().await;

        self.sampler_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.sampler.take() {
            // Ignore JoinError, the task may have already finished
            let _ = handle.await;
        }
    }

    async fn stop_workers(&mut self) {
        self.workers_running.store(false, Ordering::SeqCst);
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
    }

    fn ensure_sampler(&mut self) {
        if self.sampler.is_some() {
            return;
        }
        self.sampler_running.store(true, Ordering::SeqCst);
        let monitor = SimulatedGpuMonitor::new(&self.params, self.shared.clone());
        self.sampler = Some(spawn_sampler(
            monitor,
            self.collector.clone(),
            self.metrics_interval,
            self.sampler_running.clone(),
        ));
    }
}

#[async_trait]
impl LoadDriver for SimulatedBackend {
    async fn set_concurrency(&mut self, concurrency: usize) -> Result<()> {
        if concurrency == 0 {
            return Err(ProfileError::Driver("concurrency must be at least 1".into()));
        }

        self.stop_workers().await;
        self.ensure_sampler();

        self.shared.concurrency.store(concurrency, Ordering::SeqCst);
        // A fresh flag, so a stopped worker can never observe the new run
        self.workers_running = Arc::new(AtomicBool::new(true));

        for worker_id in 0..concurrency {
            let running = self.workers_running.clone();
            let shared = self.shared.clone();
            let params = self.params.clone();

            self.workers.push(tokio::spawn(async move {
                worker(worker_id as u64, running, shared, params, concurrency).await;
            }));
        }

        info!(concurrency, "simulated load running");
        Ok(())
    }

    async fn measure(&mut self, window: Duration) -> Result<WindowCapture> {
        if self.workers.is_empty() {
            return Err(ProfileError::Driver("measure called before set_concurrency".into()));
        }

        // Start the window from a clean slate
        self.shared.log.lock().clear();
        self.shared.sent.store(0, Ordering::SeqCst);
        self.shared.idle_ns.store(0, Ordering::SeqCst);
        self.collector.reset();

        let start_ns = self.shared.nanos_since_anchor(Instant::now());
        tokio::time::sleep(window).await;
        let end_ns = self.shared.nanos_since_anchor(Instant::now());

        let timestamps = std::mem::take(&mut *self.shared.log.lock());
        let capture = WindowCapture {
            window: (start_ns, end_ns),
            timestamps,
            sent_requests: self.shared.sent.swap(0, Ordering::SeqCst),
            idle_ns: self.shared.idle_ns.swap(0, Ordering::SeqCst),
            worker_count: self.workers.len(),
            gpu_snapshots: self.collector.take(),
        };

        debug!(
            records = capture.timestamps.len(),
            sent = capture.sent_requests,
            snapshots = capture.gpu_snapshots.len(),
            "window captured"
        );
        Ok(capture)
    }
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u64,
    running: Arc<AtomicBool>,
    shared: Arc<Shared>,
    params: SimulationParams,
    concurrency: usize,
) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(params.seed + id);
    let mut issued: u64 = 0;

    while running.load(Ordering::Relaxed) {
        let latency = params.latency_at(concurrency, &mut rng);

        let sent_at = Instant::now();
        shared.sent.fetch_add(1, Ordering::Relaxed);

        // ── Awaiting the response ───────────────────────────────
        tokio::time::sleep(latency).await;
        let done_at = Instant::now();
        // ────────────────────────────────────────────────────────

        let waited_ns = done_at.duration_since(sent_at).as_nanos() as u64;
        shared.idle_ns.fetch_add(waited_ns, Ordering::Relaxed);

        issued += 1;
        let sequence_id = if issued % SEQUENCE_LENGTH == 0 {
            (id + 1) as u32
        } else {
            0
        };

        shared.log.lock().push(TimestampRecord {
            start_ns: shared.nanos_since_anchor(sent_at),
            end_ns: shared.nanos_since_anchor(done_at),
            sequence_id,
            delayed: false,
        });
    }
}

// ─── Simulated GPU telemetry ─────────────────────────────────────

/// Per-GPU readings that track the simulated load. Roughly one reading in
/// twenty leaves a GPU out of one map, the way real exporters occasionally
/// do.
pub struct SimulatedGpuMonitor {
    gpu_count: usize,
    memory_total: u64,
    saturation: usize,
    shared: Arc<Shared>,
    rng: StdRng,
}

impl SimulatedGpuMonitor {
    fn new(params: &SimulationParams, shared: Arc<Shared>) -> Self {
        Self {
            gpu_count: params.gpu_count,
            memory_total: params.gpu_memory_total_bytes,
            saturation: params.saturation_concurrency.max(1),
            shared,
            rng: StdRng::seed_from_u64(params.seed ^ 0x6770_7573),
        }
    }
}

impl GpuMetricsSource for SimulatedGpuMonitor {
    fn snapshot(&mut self) -> Metrics {
        let concurrency = self.shared.concurrency.load(Ordering::Relaxed);
        let load = (concurrency as f64 / self.saturation as f64).min(1.0);
        let mut m = Metrics::default();

        for idx in 0..self.gpu_count {
            let key = format!("gpu{idx}");
            let utilization = (load + self.rng.gen_range(-0.02..=0.02)).clamp(0.0, 1.0);
            let power = 60.0 + 240.0 * utilization;
            let used = (self.memory_total as f64 * (0.25 + 0.5 * utilization)) as u64;

            if !self.rng.gen_bool(0.05) {
                m.gpu_utilization_per_gpu.insert(key.clone(), utilization);
            }
            m.gpu_power_usage_per_gpu.insert(key.clone(), power);
            m.gpu_memory_used_bytes_per_gpu.insert(key.clone(), used);
            m.gpu_memory_total_bytes_per_gpu.insert(key, self.memory_total);
        }
        m
    }
}
