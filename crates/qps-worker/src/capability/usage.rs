//! Wall-clock and CPU time accounting for stats snapshots.

use std::time::Instant;

/// Times in seconds since a [`UsageTimer`] started.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageSample {
    pub wall: f64,
    pub user: f64,
    pub system: f64,
}

/// Measures elapsed wall time and process CPU time from a starting point.
#[derive(Debug, Clone, Copy)]
pub struct UsageTimer {
    started: Instant,
    start_cpu: CpuTimes,
}

#[derive(Debug, Clone, Copy, Default)]
struct CpuTimes {
    user: f64,
    system: f64,
}

impl UsageTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            start_cpu: cpu_times(),
        }
    }

    pub fn sample(&self) -> UsageSample {
        let now = cpu_times();
        UsageSample {
            wall: self.started.elapsed().as_secs_f64(),
            user: (now.user - self.start_cpu.user).max(0.0),
            system: (now.system - self.start_cpu.system).max(0.0),
        }
    }
}

#[cfg(unix)]
fn cpu_times() -> CpuTimes {
    fn seconds(tv: libc::timeval) -> f64 {
        tv.tv_sec as f64 + tv.tv_usec as f64 * 1e-6
    }

    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if result != 0 {
        return CpuTimes::default();
    }
    CpuTimes {
        user: seconds(usage.ru_utime),
        system: seconds(usage.ru_stime),
    }
}

#[cfg(not(unix))]
fn cpu_times() -> CpuTimes {
    CpuTimes::default()
}
