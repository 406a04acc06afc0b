use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Per-invocation measurements, in the in-process naming convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub execution_time_ms: f64,
    pub memory_usage_bytes: u64,
    pub input_size_bytes: u64,
    pub output_size_bytes: u64,
}

impl Metrics {
    pub fn measure(started: Instant, memory_usage_bytes: u64, input: usize, output: usize) -> Self {
        Self {
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            memory_usage_bytes,
            input_size_bytes: input as u64,
            output_size_bytes: output as u64,
        }
    }
}

/// Timing reported by the native service, in its own naming convention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendMetrics {
    pub execution_time_ms: f64,
    pub memory_usage_kb: u64,
    pub memory_usage_str: String,
}

impl BackendMetrics {
    pub fn new(execution_time_ms: f64, memory_usage_bytes: u64) -> Self {
        Self {
            execution_time_ms,
            memory_usage_kb: memory_usage_bytes / 1024,
            memory_usage_str: format_memory(memory_usage_bytes),
        }
    }
}

pub fn format_memory(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let bytes = bytes as f64;
    if bytes >= MB {
        format!("{:.2} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Resident memory of the current process, sampled through sysinfo.
pub struct MemoryProbe {
    system: System,
    pid: Option<Pid>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    pub fn sample(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest metrics plus a bounded window of recent ones.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    current: Option<Metrics>,
    recent: VecDeque<Metrics>,
    capacity: usize,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            current: None,
            recent: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, metrics: Metrics) {
        self.current = Some(metrics);
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(metrics);
    }

    pub fn current(&self) -> Option<Metrics> {
        self.current
    }

    pub fn recent(&self) -> impl Iterator<Item = &Metrics> {
        self.recent.iter()
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    /// Mean over the retained window.
    pub fn average(&self) -> Option<Metrics> {
        if self.recent.is_empty() {
            return None;
        }
        let n = self.recent.len() as f64;
        let sum = self.recent.iter().fold((0.0, 0u64, 0u64, 0u64), |acc, m| {
            (
                acc.0 + m.execution_time_ms,
                acc.1 + m.memory_usage_bytes,
                acc.2 + m.input_size_bytes,
                acc.3 + m.output_size_bytes,
            )
        });
        Some(Metrics {
            execution_time_ms: sum.0 / n,
            memory_usage_bytes: (sum.1 as f64 / n) as u64,
            input_size_bytes: (sum.2 as f64 / n) as u64,
            output_size_bytes: (sum.3 as f64 / n) as u64,
        })
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(10)
    }
}
