//! Process memory monitoring
//!
//! Samples resident memory at run checkpoints and reports the peak together
//! with wall-clock time.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use sysinfo::{Pid, System};
use tracing::debug;

/// Resources consumed by one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub peak_memory_mb: f64,
    pub processing_time_seconds: f64,
    /// Most chunk buffers resident at once during training
    pub peak_resident_chunks: usize,
}

/// Tracks process resident memory across checkpoints
pub struct MemoryMonitor {
    system: System,
    pid: Pid,
    started: Instant,
    initial_memory_mb: f64,
    peak_memory_mb: f64,
    history: Vec<(String, f64)>,
}

impl MemoryMonitor {
    pub fn start() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());
        let initial = Self::sample(&mut system, pid);
        debug!(checkpoint = "start", memory_mb = initial, "Memory checkpoint");
        Self {
            system,
            pid,
            started: Instant::now(),
            initial_memory_mb: initial,
            peak_memory_mb: initial,
            history: vec![("start".to_string(), initial)],
        }
    }

    fn sample(system: &mut System, pid: Pid) -> f64 {
        system.refresh_process(pid);
        system
            .process(pid)
            .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0)
    }

    /// Record current resident memory under `label` and return it in MB
    pub fn checkpoint(&mut self, label: &str) -> f64 {
        let current = Self::sample(&mut self.system, self.pid);
        self.peak_memory_mb = self.peak_memory_mb.max(current);
        self.history.push((label.to_string(), current));
        debug!(checkpoint = label, memory_mb = current, "Memory checkpoint");
        current
    }

    /// Change since `start` in MB
    pub fn delta_mb(&self) -> f64 {
        self.history
            .last()
            .map_or(0.0, |(_, mb)| mb - self.initial_memory_mb)
    }

    pub fn history(&self) -> &[(String, f64)] {
        &self.history
    }

    /// Close the run and summarize
    pub fn finish(mut self, peak_resident_chunks: usize) -> ResourceUsage {
        self.checkpoint("done");
        ResourceUsage {
            peak_memory_mb: self.peak_memory_mb,
            processing_time_seconds: self.started.elapsed().as_secs_f64(),
            peak_resident_chunks,
        }
    }
}
