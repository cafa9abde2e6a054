#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, System};

#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub peak_memory_mb: u64,
    pub elapsed_time: Duration,
}

/// 以 sysinfo 量測本行程在各階段前後的資源用量
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    probe: Option<(Mutex<System>, Pid)>,
    start_time: Instant,
    peak_memory: Mutex<u64>,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let probe = if enabled {
            match sysinfo::get_current_pid() {
                Ok(pid) => {
                    let mut system = System::new();
                    system.refresh_all();
                    Some((Mutex::new(system), pid))
                }
                Err(e) => {
                    tracing::warn!("System monitoring disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            probe,
            start_time: Instant::now(),
            peak_memory: Mutex::new(0),
        }
    }

    pub fn get_stats(&self) -> Option<SystemStats> {
        let (system, pid) = self.probe.as_ref()?;
        let mut system = system.lock().ok()?;
        system.refresh_all();

        let process = system.process(*pid)?;
        let memory_mb = process.memory() / 1024 / 1024;

        let mut peak = self.peak_memory.lock().ok()?;
        *peak = (*peak).max(memory_mb);

        Some(SystemStats {
            cpu_usage: process.cpu_usage(),
            memory_usage_mb: memory_mb,
            peak_memory_mb: *peak,
            elapsed_time: self.start_time.elapsed(),
        })
    }

    pub fn log_stage(&self, stage: &str, phase: &str) {
        if let Some(stats) = self.get_stats() {
            tracing::info!(
                "📊 {} [{}] - CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Time: {:?}",
                stage,
                phase,
                stats.cpu_usage,
                stats.memory_usage_mb,
                stats.peak_memory_mb,
                stats.elapsed_time
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.probe.is_some()
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// 非 CLI 建置沒有 sysinfo
#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn log_stage(&self, _stage: &str, _phase: &str) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}
