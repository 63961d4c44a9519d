//! Host CPU utilization probes.
//!
//! Two implementations behind one trait: a bare-host probe built on sysinfo
//! and a container-aware probe reading cgroup v1/v2 accounting so the value
//! is relative to the container's CPU limit rather than the host total. The
//! mode flag comes from configuration; a probe read failure costs one tick's
//! resource record, never more.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// How the reporter should read host utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceMode {
    /// Bare host: utilization over all host cores.
    Native,
    /// Containerized (Docker/K8s): utilization relative to cgroup limits.
    Containerized,
}

#[async_trait]
pub trait UtilizationProbe: Send + Sync {
    /// CPU utilization as a percentage (0.0-100.0).
    async fn cpu_percent(&self) -> Result<f64>;
}

/// Pick the probe for the configured mode. A container probe that cannot see
/// a cgroup filesystem falls back to the native probe.
pub fn probe_for(mode: ResourceMode) -> Box<dyn UtilizationProbe> {
    match mode {
        ResourceMode::Containerized => match CgroupProbe::new() {
            Ok(probe) => {
                info!("using cgroup-aware CPU utilization probe");
                Box::new(probe)
            }
            Err(e) => {
                warn!(error = %e, "containerized mode requested but cgroup probe unavailable, falling back to native");
                Box::new(NativeProbe::new())
            }
        },
        ResourceMode::Native => {
            info!("using native CPU utilization probe (sysinfo)");
            Box::new(NativeProbe::new())
        }
    }
}

/// Bare-host probe using sysinfo.
pub struct NativeProbe {
    system: Mutex<System>,
}

impl NativeProbe {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()),
        );
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for NativeProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UtilizationProbe for NativeProbe {
    async fn cpu_percent(&self) -> Result<f64> {
        let mut system = self.system.lock().await;

        // Two refreshes with a short gap; sysinfo derives usage from the delta
        system.refresh_cpu_all();
        tokio::time::sleep(Duration::from_millis(200)).await;
        system.refresh_cpu_all();

        let cpus = system.cpus();
        if cpus.is_empty() {
            anyhow::bail!("no CPUs visible to sysinfo");
        }
        let total: f64 = cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum();
        Ok(total / cpus.len() as f64)
    }
}

#[derive(Debug, Clone, Copy)]
enum CgroupVersion {
    V1,
    V2,
}

/// Container probe reading cgroup CPU accounting.
pub struct CgroupProbe {
    version: CgroupVersion,
}

impl CgroupProbe {
    pub fn new() -> Result<Self> {
        let version = detect_cgroup_version()?;
        Ok(Self { version })
    }

    /// Cumulative CPU time consumed by the cgroup, in microseconds.
    fn usage_usec(&self) -> Result<u64> {
        match self.version {
            CgroupVersion::V2 => {
                let stat = std::fs::read_to_string("/sys/fs/cgroup/cpu.stat")
                    .context("reading cgroup v2 cpu.stat")?;
                for line in stat.lines() {
                    if let Some(raw) = line.strip_prefix("usage_usec ") {
                        return raw
                            .trim()
                            .parse::<u64>()
                            .context("parsing usage_usec value");
                    }
                }
                anyhow::bail!("usage_usec not present in cpu.stat")
            }
            CgroupVersion::V1 => {
                // cpuacct reports nanoseconds
                let raw = std::fs::read_to_string("/sys/fs/cgroup/cpuacct/cpuacct.usage")
                    .or_else(|_| {
                        std::fs::read_to_string("/sys/fs/cgroup/cpu,cpuacct/cpuacct.usage")
                    })
                    .context("reading cgroup v1 cpuacct.usage")?;
                Ok(raw.trim().parse::<u64>().context("parsing cpuacct.usage")? / 1_000)
            }
        }
    }

    /// CPUs available to the cgroup: the quota when one is set, otherwise the
    /// parallelism visible to the process.
    fn effective_cpus(&self) -> f64 {
        if let CgroupVersion::V2 = self.version {
            if let Ok(max) = std::fs::read_to_string("/sys/fs/cgroup/cpu.max") {
                let mut parts = max.split_whitespace();
                if let (Some(quota), Some(period)) = (parts.next(), parts.next()) {
                    if let (Ok(quota), Ok(period)) = (quota.parse::<f64>(), period.parse::<f64>()) {
                        if period > 0.0 {
                            return quota / period;
                        }
                    }
                }
            }
        }
        std::thread::available_parallelism()
            .map(|n| n.get() as f64)
            .unwrap_or(1.0)
    }
}

#[async_trait]
impl UtilizationProbe for CgroupProbe {
    async fn cpu_percent(&self) -> Result<f64> {
        let before = self.usage_usec()?;
        let window = Duration::from_millis(100);
        tokio::time::sleep(window).await;
        let after = self.usage_usec()?;

        let busy_usec = after.saturating_sub(before) as f64;
        let wall_usec = window.as_micros() as f64 * self.effective_cpus();
        if wall_usec <= 0.0 {
            anyhow::bail!("zero effective CPU window");
        }
        Ok((busy_usec / wall_usec * 100.0).min(100.0))
    }
}

fn detect_cgroup_version() -> Result<CgroupVersion> {
    if Path::new("/sys/fs/cgroup/cgroup.controllers").exists() {
        return Ok(CgroupVersion::V2);
    }
    if Path::new("/sys/fs/cgroup/cpuacct").exists()
        || Path::new("/sys/fs/cgroup/cpu,cpuacct").exists()
    {
        return Ok(CgroupVersion::V1);
    }
    anyhow::bail!("no cgroup filesystem detected")
}
