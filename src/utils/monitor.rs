//! Resource tracking around the load / train / export phases.
//!
//! Each `log_stats` call closes a phase: the wall time since the previous
//! call and the process RSS at that point are kept so the final summary can
//! show where training spent its time.

#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessesToUpdate, System};

/// 單一階段的量測結果
#[cfg(feature = "cli")]
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSample {
    pub phase: String,
    pub duration: Duration,
    pub memory_mb: u64,
}

#[cfg(feature = "cli")]
#[derive(Debug, Default)]
struct PhaseLog {
    last_mark: Option<Instant>,
    samples: Vec<PhaseSample>,
    peak_memory_mb: u64,
}

#[cfg(feature = "cli")]
impl PhaseLog {
    fn record(&mut self, phase: &str, now: Instant, memory_mb: u64) -> &PhaseSample {
        let duration = self
            .last_mark
            .map(|mark| now.saturating_duration_since(mark))
            .unwrap_or_default();
        self.last_mark = Some(now);
        self.peak_memory_mb = self.peak_memory_mb.max(memory_mb);
        self.samples.push(PhaseSample {
            phase: phase.to_string(),
            duration,
            memory_mb,
        });
        &self.samples[self.samples.len() - 1]
    }

    /// 最耗時的階段
    fn slowest(&self) -> Option<&PhaseSample> {
        self.samples.iter().max_by_key(|s| s.duration)
    }
}

#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    start_time: Instant,
    log: Mutex<PhaseLog>,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let mut system = System::new();
        if enabled {
            system.refresh_memory();
            tracing::info!(
                "🧵 Training threads: {}, total memory: {}MB",
                rayon::current_num_threads(),
                system.total_memory() / 1024 / 1024
            );
        }

        Self {
            system: Mutex::new(system),
            pid: sysinfo::get_current_pid().ok(),
            start_time: Instant::now(),
            log: Mutex::new(PhaseLog::default()),
            enabled,
        }
    }

    fn memory_mb(&self) -> u64 {
        let (Some(pid), Ok(mut system)) = (self.pid, self.system.lock()) else {
            return 0;
        };
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system
            .process(pid)
            .map(|p| p.memory() / 1024 / 1024)
            .unwrap_or(0)
    }

    /// 結束一個階段並記錄其耗時與記憶體
    pub fn log_stats(&self, phase: &str) {
        if !self.enabled {
            return;
        }
        let memory_mb = self.memory_mb();
        let Ok(mut log) = self.log.lock() else {
            return;
        };
        let sample = log.record(phase, Instant::now(), memory_mb);
        tracing::info!(
            "📊 {} - {:.2?}, Memory: {}MB",
            sample.phase,
            sample.duration,
            sample.memory_mb
        );
    }

    pub fn log_final_stats(&self) {
        let Some(samples) = self.phases() else {
            return;
        };
        let total = self.start_time.elapsed();
        for sample in &samples {
            let share = if total.is_zero() {
                0.0
            } else {
                sample.duration.as_secs_f64() / total.as_secs_f64() * 100.0
            };
            tracing::info!(
                "   {:<18} {:>10.2?} ({:>5.1}%)",
                sample.phase,
                sample.duration,
                share
            );
        }
        if let Ok(log) = self.log.lock() {
            if let Some(slowest) = log.slowest() {
                tracing::info!("   Slowest phase: {}", slowest.phase);
            }
            tracing::info!(
                "📊 Final Stats - Total Time: {:.2?}, Peak Memory: {}MB",
                total,
                log.peak_memory_mb
            );
        }
    }

    /// 已記錄的階段，停用時為 None
    pub fn phases(&self) -> Option<Vec<PhaseSample>> {
        if !self.enabled {
            return None;
        }
        self.log.lock().ok().map(|log| log.samples.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// 非 CLI 建置時提供空實現
#[cfg(not(feature = "cli"))]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn log_stats(&self, _phase: &str) {}

    pub fn log_final_stats(&self) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_monitor_reports_nothing() {
        let monitor = SystemMonitor::new(false);
        monitor.log_stats("Start");
        assert!(!monitor.is_enabled());
        assert!(monitor.phases().is_none());
    }

    #[test]
    fn test_phase_durations_measured_from_previous_mark() {
        let start = Instant::now();
        let mut log = PhaseLog::default();
        log.record("Start", start, 10);
        log.record("Load features", start + Duration::from_millis(40), 30);
        log.record("Train & evaluate", start + Duration::from_millis(540), 20);

        let durations: Vec<_> = log.samples.iter().map(|s| s.duration).collect();
        assert_eq!(
            durations,
            vec![
                Duration::ZERO,
                Duration::from_millis(40),
                Duration::from_millis(500)
            ]
        );
        assert_eq!(log.peak_memory_mb, 30);
        assert_eq!(log.slowest().unwrap().phase, "Train & evaluate");
    }

    #[test]
    fn test_enabled_monitor_keeps_phase_order() {
        let monitor = SystemMonitor::new(true);
        monitor.log_stats("Start");
        monitor.log_stats("Export");
        monitor.log_final_stats();

        let phases: Vec<_> = monitor
            .phases()
            .unwrap()
            .into_iter()
            .map(|s| s.phase)
            .collect();
        assert_eq!(phases, vec!["Start", "Export"]);
    }
}
