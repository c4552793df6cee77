pub mod files;
pub mod load;
pub mod network;
pub mod platform;
pub mod processes;
pub mod resources;

use crate::config::Config;
use crate::format::{format_decimal, TIMESTAMP_FORMAT};
use crate::provider::MetricsProvider;
use chrono::{DateTime, Local};
use files::FileBreakdown;
use load::LoadInfo;
use network::NetworkInfo;
use platform::HostInfo;
use processes::ProcessRanking;
use resources::{CpuInfo, MemoryInfo};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    pub taken_at: DateTime<Local>,
    pub host: HostInfo,
    pub load: LoadInfo,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub network: NetworkInfo,
    pub processes: ProcessRanking,
    pub files: FileBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Value,
    /// Pre-rendered HTML; goes into the page but never into the JSON dump.
    Markup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: String,
    pub value: String,
    pub kind: FieldKind,
}

impl Field {
    fn value(key: impl Into<String>, value: impl ToString) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
            kind: FieldKind::Value,
        }
    }

    fn markup(key: &str, value: String) -> Self {
        Self {
            key: key.to_string(),
            value,
            kind: FieldKind::Markup,
        }
    }
}

/// Runs every sampler once, in a fixed order, and blocks for the configured
/// sampling windows along the way.
pub fn collect_snapshot(provider: &mut dyn MetricsProvider, cfg: &Config) -> SystemSnapshot {
    let taken_at = Local::now();

    info!("сбор информации о системе");
    let host = platform::probe_platform(provider, &cfg.os_release_path, taken_at.timestamp());

    info!("сбор средней загрузки");
    let load = load::sample_load(provider);

    info!("сбор информации о CPU");
    let cpu = resources::sample_cpu(provider, cfg.cpu_sample_interval, cfg.per_core);

    info!("сбор информации о памяти");
    let memory = resources::sample_memory(provider);

    info!("определение IP-адреса");
    let network = network::resolve_network(provider, cfg.probe_target);

    info!("сбор информации о процессах");
    let processes = processes::rank_processes(provider, cfg.process_settle_interval);

    info!("анализ файлов");
    let files = files::classify_files(&cfg.scan_root(), Path::new("."));

    SystemSnapshot {
        taken_at,
        host,
        load,
        cpu,
        memory,
        network,
        processes,
        files,
    }
}

impl SystemSnapshot {
    pub fn timestamp(&self) -> String {
        self.taken_at.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Flat, ordered view consumed by the template and the JSON dump.
    pub fn fields(&self) -> Vec<Field> {
        let mut out = vec![
            Field::value("timestamp", self.timestamp()),
            Field::value("hostname", &self.host.hostname),
            Field::value("os_name", &self.host.os_name),
            Field::value("boot_time", self.host.boot_time()),
            Field::value("uptime", self.host.uptime()),
            Field::value("user_count", self.host.user_count),
            Field::value("load_1min", LoadInfo::render(self.load.one)),
            Field::value("load_5min", LoadInfo::render(self.load.five)),
            Field::value("load_15min", LoadInfo::render(self.load.fifteen)),
            Field::value("cpu_cores", self.cpu.logical_cores),
            Field::value("cpu_freq", self.cpu.frequency()),
            Field::value("cpu_percent", format_decimal(self.cpu.usage_percent)),
            Field::markup("cpu_cores_html", self.cpu.cores_html()),
            Field::value("ram_total", format_decimal(self.memory.total_gib)),
            Field::value("ram_used", format_decimal(self.memory.used_gib)),
            Field::value("ram_percent", format_decimal(self.memory.usage_percent)),
            Field::value("ip_address", self.network.ip_address),
            Field::markup("top_processes", self.processes.top_rows_html()),
            Field::markup("all_processes", self.processes.rest_rows_html()),
            Field::value("total_processes", self.processes.total()),
            Field::value("analyzed_folder", self.files.analyzed_folder.display()),
        ];

        for stat in &self.files.extensions {
            let key = stat.key();
            out.push(Field::value(format!("{key}_count"), stat.count));
            out.push(Field::value(
                format!("{key}_size"),
                format_decimal(stat.size_mib),
            ));
            out.push(Field::value(
                format!("{key}_percent"),
                format_decimal(stat.percent),
            ));
        }
        out.push(Field::value("total_files", self.files.total_files));
        out
    }
}
