//! Periodic host resource sampling.
//!
//! Each round samples five categories independently and logs one line per
//! category as a tuple literal, so log analysis can pick them up by prefix:
//!
//! ```text
//! CPU: (12.5, 10.25, 9.75)              load averages, % of all cores
//! MEMORY: (5368709120, 16777216000)     available, total bytes
//! NETWORK: (102400, 2048000)            sent, received bytes
//! DISK: (100000, 900000, 1000000)       used, free, total bytes
//! RECORDING: (12, 3456789)              files, bytes under the recording root
//! ```
//!
//! A failing category is logged as a warning and does not affect the others.

// Standard library imports
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// External crate imports
use sysinfo::{Disks, Networks, System};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Lowest accepted sampling interval
pub const MIN_MONITOR_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Cpu,
    Memory,
    Network,
    Disk,
    Recording,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::Cpu,
        Self::Memory,
        Self::Network,
        Self::Disk,
        Self::Recording,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "CPU",
            Self::Memory => "MEMORY",
            Self::Network => "NETWORK",
            Self::Disk => "DISK",
            Self::Recording => "RECORDING",
        })
    }
}

/// Paths the monitor reports on.
#[derive(Debug, Clone)]
pub struct MonitorTargets {
    /// Directory whose filesystem is reported under `DISK`
    pub session_dir: PathBuf,
    /// Recording root; `RECORDING` fails while it is unset or missing
    pub recording_dir: Option<PathBuf>,
}

/// Sample one category and format its tuple.
pub fn sample(category: Category, targets: &MonitorTargets) -> Result<String, String> {
    match category {
        Category::Cpu => sample_cpu(),
        Category::Memory => sample_memory(),
        Category::Network => sample_network(),
        Category::Disk => sample_disk(&targets.session_dir),
        Category::Recording => match &targets.recording_dir {
            Some(dir) => recording_usage(dir).map(|(files, bytes)| format!("({files}, {bytes})")),
            None => Err("recording disabled".to_string()),
        },
    }
}

/// Sample every category. Never fails as a whole.
pub fn sample_round(targets: &MonitorTargets) -> Vec<(Category, Result<String, String>)> {
    Category::ALL
        .iter()
        .map(|&category| (category, sample(category, targets)))
        .collect()
}

fn sample_cpu() -> Result<String, String> {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get() as f64)
        .unwrap_or(1.0);
    let load = System::load_average();
    let pct = |v: f64| (v / cpus * 10_000.0).round() / 100.0;
    Ok(format!(
        "({}, {}, {})",
        pct(load.one),
        pct(load.five),
        pct(load.fifteen)
    ))
}

fn sample_memory() -> Result<String, String> {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        return Err("memory statistics unavailable".to_string());
    }
    Ok(format!("({}, {})", sys.available_memory(), total))
}

fn sample_network() -> Result<String, String> {
    let networks = Networks::new_with_refreshed_list();
    let (sent, received) = networks.iter().fold((0u64, 0u64), |(s, r), (_, data)| {
        (s + data.total_transmitted(), r + data.total_received())
    });
    Ok(format!("({sent}, {received})"))
}

fn sample_disk(path: &Path) -> Result<String, String> {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .ok_or_else(|| format!("no filesystem found for {}", path.display()))?;
    let total = disk.total_space();
    let free = disk.available_space();
    Ok(format!("({}, {}, {})", total.saturating_sub(free), free, total))
}

/// File count and total size under `dir`.
pub fn recording_usage(dir: &Path) -> Result<(u64, u64), String> {
    if !dir.is_dir() {
        return Err(format!("{} is not a directory", dir.display()));
    }
    let mut files = 0u64;
    let mut bytes = 0u64;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| e.to_string())?;
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata().map_err(|e| e.to_string())?.len();
        }
    }
    Ok((files, bytes))
}

/// Resource monitor worker.
#[derive(Debug)]
pub struct ResourceMonitor {
    targets: MonitorTargets,
    interval: Duration,
}

impl ResourceMonitor {
    /// Intervals below [`MIN_MONITOR_INTERVAL`] are raised to it.
    pub fn new(targets: MonitorTargets, interval: Duration) -> Self {
        if interval < MIN_MONITOR_INTERVAL {
            warn!(
                requested = ?interval,
                "monitor interval below floor, using {:?}",
                MIN_MONITOR_INTERVAL
            );
        }
        Self {
            targets,
            interval: interval.max(MIN_MONITOR_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let targets = self.targets.clone();
            let round = tokio::select! {
                _ = token.cancelled() => break,
                round = tokio::task::spawn_blocking(move || sample_round(&targets)) => round,
            };
            match round {
                Ok(samples) => log_samples(&samples),
                Err(e) => warn!(error = %e, "resource sampling task failed"),
            }
        }
    }
}

fn log_samples(samples: &[(Category, Result<String, String>)]) {
    for (category, result) in samples {
        match result {
            Ok(line) => info!("{category}: {line}"),
            Err(reason) => warn!(%category, "sampling failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_interval_floor() {
        let targets = MonitorTargets {
            session_dir: PathBuf::from("/"),
            recording_dir: None,
        };
        assert_eq!(
            ResourceMonitor::new(targets.clone(), Duration::from_secs(1)).interval(),
            MIN_MONITOR_INTERVAL
        );
        assert_eq!(
            ResourceMonitor::new(targets, Duration::from_secs(30)).interval(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_recording_usage_counts_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("camA")).unwrap();
        fs::write(dir.path().join("camA/seg_00000.mp4"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("seg_00001.mp4"), vec![0u8; 50]).unwrap();
        assert_eq!(recording_usage(dir.path()).unwrap(), (2, 150));
    }

    #[test]
    fn test_failing_category_does_not_stop_others() {
        let targets = MonitorTargets {
            session_dir: std::env::temp_dir(),
            recording_dir: Some(PathBuf::from("/definitely/missing/rec")),
        };
        let round = sample_round(&targets);
        assert_eq!(round.len(), 5);
        assert!(round[0].1.is_ok());
        assert!(round[2].1.is_ok());
        assert!(matches!(round[4], (Category::Recording, Err(_))));
    }

    #[test]
    fn test_cpu_line_is_a_triple() {
        let line = sample(
            Category::Cpu,
            &MonitorTargets {
                session_dir: PathBuf::from("/"),
                recording_dir: None,
            },
        )
        .unwrap();
        assert!(line.starts_with('(') && line.ends_with(')'));
        assert_eq!(line.matches(", ").count(), 2);
    }
}
