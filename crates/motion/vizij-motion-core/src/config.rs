//! Core configuration for vizij-motion-core.

use serde::{Deserialize, Serialize};

/// Configuration for database partitioning and blend start-up.
/// Keep this minimal; per-state tuning lives in the state feature structs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound of frames one search job scans before another partition is opened.
    pub max_frames_per_job: usize,

    /// Worker threads for search jobs. `None` uses hardware threads minus one
    /// (the caller's thread is reserved), never less than one.
    pub worker_threads: Option<usize>,

    /// Weight a freshly created blend input starts from.
    pub min_start_weight: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frames_per_job: 512,
            worker_threads: None,
            min_start_weight: 0.001,
        }
    }
}

impl Config {
    /// Resolved number of search workers (and therefore the partition cap).
    pub fn worker_threads(&self) -> usize {
        match self.worker_threads {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1),
        }
    }

    /// Same config with an explicit worker count. Handy for deterministic tests.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_threads = Some(workers);
        self
    }

    pub fn with_max_frames_per_job(mut self, frames: usize) -> Self {
        self.max_frames_per_job = frames;
        self
    }
}
