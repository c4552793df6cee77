use crate::format::{bytes_to_gib, format_decimal, percent_of, round_to};
use crate::provider::MetricsProvider;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct CpuInfo {
    pub logical_cores: usize,
    pub frequency_mhz: f64,
    pub usage_percent: f64,
    pub per_core_percent: Option<Vec<f64>>,
}

impl CpuInfo {
    pub fn frequency(&self) -> String {
        if self.frequency_mhz == 0.0 {
            "0".to_string()
        } else {
            format_decimal(self.frequency_mhz)
        }
    }

    pub fn cores_html(&self) -> String {
        let Some(per_core) = &self.per_core_percent else {
            return String::new();
        };
        per_core
            .iter()
            .enumerate()
            .map(|(i, p)| format!("<div>Core {i}: {}%</div>", format_decimal(*p)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub total_gib: f64,
    pub used_gib: f64,
    pub usage_percent: f64,
}

/// Blocks for one `window` for the overall reading and, with `per_core`,
/// for a second window of its own.
pub fn sample_cpu(
    provider: &mut dyn MetricsProvider,
    window: Duration,
    per_core: bool,
) -> CpuInfo {
    let logical_cores = provider.logical_cpu_count();
    let frequency_mhz = match provider.cpu_frequency_mhz() {
        Some(mhz) => round_to(mhz, 2),
        None => {
            warn!("частота CPU недоступна, используется 0");
            0.0
        }
    };

    debug!(window_ms = window.as_millis() as u64, "измерение загрузки CPU");
    let usage_percent = round_to(provider.sample_cpu_usage(window).global, 1);

    let per_core_percent = per_core.then(|| {
        provider
            .sample_cpu_usage(window)
            .per_core
            .into_iter()
            .map(|p| round_to(p, 1))
            .collect()
    });

    CpuInfo {
        logical_cores,
        frequency_mhz,
        usage_percent,
        per_core_percent,
    }
}

pub fn sample_memory(provider: &mut dyn MetricsProvider) -> MemoryInfo {
    let counters = provider.memory();
    if counters.total == 0 {
        warn!("объём памяти не определён, проценты будут нулевыми");
    }
    let in_use = counters.total.saturating_sub(counters.available);
    MemoryInfo {
        total_bytes: counters.total,
        used_bytes: counters.used,
        total_gib: bytes_to_gib(counters.total),
        used_gib: bytes_to_gib(counters.used),
        usage_percent: percent_of(in_use as f64, counters.total as f64),
    }
}
