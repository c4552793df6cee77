use crate::collectors::SystemSnapshot;
use prometheus::core::Collector;
use prometheus::{opts, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("ошибка prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("не удалось записать файл метрик {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Gauges for one snapshot, rendered in the textfile-collector format.
pub struct SnapshotMetrics {
    registry: Registry,
    pub uptime_seconds: Gauge,
    pub logged_in_users: Gauge,
    pub load_average: GaugeVec,
    pub cpu_logical_cores: Gauge,
    pub cpu_frequency_mhz: Gauge,
    pub cpu_usage_percent: Gauge,
    pub cpu_core_usage_percent: GaugeVec,
    pub memory_total_bytes: Gauge,
    pub memory_used_bytes: Gauge,
    pub memory_usage_percent: Gauge,
    pub processes_active: Gauge,
    pub files_total: Gauge,
    pub files_demo_values: Gauge,
    pub files_count: GaugeVec,
    pub files_size_mib: GaugeVec,
    pub snapshot_timestamp_seconds: Gauge,
}

impl SnapshotMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let uptime_seconds = Gauge::with_opts(opts!(
            "healthsnap_uptime_seconds",
            "Seconds since the host booted"
        ))?;
        let logged_in_users = Gauge::with_opts(opts!(
            "healthsnap_logged_in_users",
            "Distinct users with an open login session"
        ))?;
        let load_average = GaugeVec::new(
            opts!(
                "healthsnap_load_average",
                "System load average by window (absent when unsupported)"
            ),
            &["window"],
        )?;
        let cpu_logical_cores = Gauge::with_opts(opts!(
            "healthsnap_cpu_logical_cores",
            "Number of logical CPUs"
        ))?;
        let cpu_frequency_mhz = Gauge::with_opts(opts!(
            "healthsnap_cpu_frequency_mhz",
            "Current CPU frequency in MHz (0 if unavailable)"
        ))?;
        let cpu_usage_percent = Gauge::with_opts(opts!(
            "healthsnap_cpu_usage_percent",
            "Overall CPU utilization over the sampling window"
        ))?;
        let cpu_core_usage_percent = GaugeVec::new(
            opts!(
                "healthsnap_cpu_core_usage_percent",
                "Per-core CPU utilization over the sampling window"
            ),
            &["core"],
        )?;
        let memory_total_bytes = Gauge::with_opts(opts!(
            "healthsnap_memory_total_bytes",
            "Total physical memory in bytes"
        ))?;
        let memory_used_bytes = Gauge::with_opts(opts!(
            "healthsnap_memory_used_bytes",
            "Used physical memory in bytes"
        ))?;
        let memory_usage_percent = Gauge::with_opts(opts!(
            "healthsnap_memory_usage_percent",
            "Physical memory in use in percent"
        ))?;
        let processes_active = Gauge::with_opts(opts!(
            "healthsnap_processes_active",
            "Processes with non-zero CPU or memory usage"
        ))?;
        let files_total = Gauge::with_opts(opts!(
            "healthsnap_files_total",
            "Files with a tracked extension under the analyzed folder"
        ))?;
        let files_demo_values = Gauge::with_opts(opts!(
            "healthsnap_files_demo_values",
            "1 when the file breakdown shows demonstration values"
        ))?;
        let files_count = GaugeVec::new(
            opts!(
                "healthsnap_files_count",
                "Files by tracked extension"
            ),
            &["extension"],
        )?;
        let files_size_mib = GaugeVec::new(
            opts!(
                "healthsnap_files_size_mib",
                "Total size of files by tracked extension in MiB"
            ),
            &["extension"],
        )?;
        let snapshot_timestamp_seconds = Gauge::with_opts(opts!(
            "healthsnap_snapshot_timestamp_seconds",
            "Unix time the snapshot was taken"
        ))?;

        register(&registry, &uptime_seconds)?;
        register(&registry, &logged_in_users)?;
        register(&registry, &load_average)?;
        register(&registry, &cpu_logical_cores)?;
        register(&registry, &cpu_frequency_mhz)?;
        register(&registry, &cpu_usage_percent)?;
        register(&registry, &cpu_core_usage_percent)?;
        register(&registry, &memory_total_bytes)?;
        register(&registry, &memory_used_bytes)?;
        register(&registry, &memory_usage_percent)?;
        register(&registry, &processes_active)?;
        register(&registry, &files_total)?;
        register(&registry, &files_demo_values)?;
        register(&registry, &files_count)?;
        register(&registry, &files_size_mib)?;
        register(&registry, &snapshot_timestamp_seconds)?;

        Ok(Self {
            registry,
            uptime_seconds,
            logged_in_users,
            load_average,
            cpu_logical_cores,
            cpu_frequency_mhz,
            cpu_usage_percent,
            cpu_core_usage_percent,
            memory_total_bytes,
            memory_used_bytes,
            memory_usage_percent,
            processes_active,
            files_total,
            files_demo_values,
            files_count,
            files_size_mib,
            snapshot_timestamp_seconds,
        })
    }

    pub fn update_from_snapshot(&self, snapshot: &SystemSnapshot) {
        self.uptime_seconds.set(snapshot.host.uptime_seconds as f64);
        self.logged_in_users.set(snapshot.host.user_count as f64);

        self.load_average.reset();
        for (window, value) in [
            ("1m", snapshot.load.one),
            ("5m", snapshot.load.five),
            ("15m", snapshot.load.fifteen),
        ] {
            if let Some(value) = value {
                self.load_average.with_label_values(&[window]).set(value);
            }
        }

        self.cpu_logical_cores.set(snapshot.cpu.logical_cores as f64);
        self.cpu_frequency_mhz.set(snapshot.cpu.frequency_mhz);
        self.cpu_usage_percent.set(snapshot.cpu.usage_percent);
        self.cpu_core_usage_percent.reset();
        if let Some(per_core) = &snapshot.cpu.per_core_percent {
            for (core, usage) in per_core.iter().enumerate() {
                self.cpu_core_usage_percent
                    .with_label_values(&[&core.to_string()])
                    .set(*usage);
            }
        }

        self.memory_total_bytes.set(snapshot.memory.total_bytes as f64);
        self.memory_used_bytes.set(snapshot.memory.used_bytes as f64);
        self.memory_usage_percent.set(snapshot.memory.usage_percent);

        self.processes_active.set(snapshot.processes.total() as f64);

        self.files_total.set(snapshot.files.total_files as f64);
        self.files_demo_values
            .set(if snapshot.files.demo_values { 1.0 } else { 0.0 });
        self.files_count.reset();
        self.files_size_mib.reset();
        for stat in &snapshot.files.extensions {
            self.files_count
                .with_label_values(&[stat.key()])
                .set(stat.count as f64);
            self.files_size_mib
                .with_label_values(&[stat.key()])
                .set(stat.size_mib);
        }

        self.snapshot_timestamp_seconds
            .set(snapshot.taken_at.timestamp() as f64);
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }

    /// Writes through a sibling temp file so a scraper never sees a partial file.
    pub fn write_textfile(&self, path: &Path) -> Result<(), MetricsError> {
        let body = self.encode_metrics()?;
        let tmp = temp_sibling(path);
        let write_err = |source: std::io::Error| MetricsError::Write {
            path: path.display().to_string(),
            source,
        };
        fs::write(&tmp, body).map_err(write_err)?;
        fs::rename(&tmp, path).map_err(write_err)?;
        info!(path = %path.display(), "файл метрик записан");
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::collect_snapshot;
    use crate::config::Config;
    use crate::provider::fake::{sample, FakeProvider};
    use std::time::Duration;
    use tempfile::tempdir;

    fn snapshot(scan_dir: &Path, provider: &mut FakeProvider) -> SystemSnapshot {
        let cfg = Config {
            scan_dir: Some(scan_dir.to_path_buf()),
            cpu_sample_interval: Duration::ZERO,
            process_settle_interval: Duration::ZERO,
            ..Config::default()
        };
        collect_snapshot(provider, &cfg)
    }

    #[test]
    fn snapshot_is_exported_as_gauges() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.pdf"), vec![0_u8; 1024 * 1024]).unwrap();
        let mut provider = FakeProvider {
            processes: vec![Ok(sample("a", 1.0, 0.0)), Ok(sample("b", 0.0, 2.0))],
            ..FakeProvider::default()
        };
        let snap = snapshot(dir.path(), &mut provider);

        let metrics = SnapshotMetrics::new().unwrap();
        metrics.update_from_snapshot(&snap);
        let text = String::from_utf8(metrics.encode_metrics().unwrap()).unwrap();

        assert!(text.contains("healthsnap_cpu_logical_cores 4"));
        assert!(text.contains("healthsnap_processes_active 2"));
        assert!(text.contains("healthsnap_load_average{window=\"1m\"} 0.5"));
        assert!(text.contains("healthsnap_files_count{extension=\"pdf\"} 1"));
        assert!(text.contains("healthsnap_files_size_mib{extension=\"pdf\"} 1"));
        assert!(text.contains("healthsnap_files_demo_values 0"));
    }

    #[test]
    fn unsupported_load_is_left_out() {
        let dir = tempdir().unwrap();
        let mut provider = FakeProvider {
            load: None,
            ..FakeProvider::default()
        };
        let snap = snapshot(dir.path(), &mut provider);

        let metrics = SnapshotMetrics::new().unwrap();
        metrics.update_from_snapshot(&snap);
        let text = String::from_utf8(metrics.encode_metrics().unwrap()).unwrap();
        assert!(!text.contains("healthsnap_load_average{"));
        assert!(text.contains("healthsnap_files_demo_values 1"));
    }

    #[test]
    fn textfile_is_written_atomically() {
        let dir = tempdir().unwrap();
        let mut provider = FakeProvider::default();
        let snap = snapshot(dir.path(), &mut provider);
        let metrics = SnapshotMetrics::new().unwrap();
        metrics.update_from_snapshot(&snap);

        let out = dir.path().join("healthsnap.prom");
        metrics.write_textfile(&out).unwrap();
        let body = fs::read_to_string(&out).unwrap();
        assert!(body.contains("# TYPE healthsnap_uptime_seconds gauge"));
        assert!(!dir.path().join("healthsnap.prom.tmp").exists());
    }
}
