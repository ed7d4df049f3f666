use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    MapsFetch,
    Enhance,
    PropertyUpdate,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::MapsFetch, Stage::Enhance, Stage::PropertyUpdate];

    fn index(self) -> usize {
        match self {
            Stage::MapsFetch => 0,
            Stage::Enhance => 1,
            Stage::PropertyUpdate => 2,
        }
    }
}

#[derive(Default)]
struct StageCounters {
    calls: AtomicUsize,
    failures: AtomicUsize,
    total_time_us: AtomicU64,
}

#[derive(Default)]
pub struct Metrics {
    // Process requests that reached the pipeline
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,
    // 400s
    rejected_requests: AtomicUsize,

    stages: [StageCounters; 3],
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stage(&self, stage: Stage, duration: Duration, success: bool) {
        let counters = &self.stages[stage.index()];
        counters.calls.fetch_add(1, Ordering::Relaxed);
        counters
            .total_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if !success {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            stages: Stage::ALL
                .iter()
                .map(|&stage| {
                    let counters = &self.stages[stage.index()];
                    let calls = counters.calls.load(Ordering::Relaxed);
                    StageSnapshot {
                        stage,
                        calls,
                        failures: counters.failures.load(Ordering::Relaxed),
                        avg_time_ms: avg_time_ms(&counters.total_time_us, calls),
                    }
                })
                .collect(),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: usize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    if count > 0 {
        total / count as f64 / 1000.0
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub rejected_requests: usize,
    pub stages: Vec<StageSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct StageSnapshot {
    pub stage: Stage,
    pub calls: usize,
    pub failures: usize,
    pub avg_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
