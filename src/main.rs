mod collectors;
mod config;
mod format;
mod metrics;
mod provider;
mod report;

use clap::Parser;
use collectors::{collect_snapshot, SystemSnapshot};
use config::Config;
use metrics::{MetricsError, SnapshotMetrics};
use provider::SysinfoProvider;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "./healthsnap.yaml";

#[derive(Parser, Debug)]
#[command(name = "healthsnap")]
#[command(version)]
struct Cli {
    /// Path to the YAML config; defaults are used if ./healthsnap.yaml is absent.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let loaded = match &cli.config {
        Some(path) => Config::load_from_file(path),
        None => Config::load_or_default(DEFAULT_CONFIG_PATH),
    };
    let cfg = match loaded {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };

    info!(
        cpu_window = %humantime::format_duration(cfg.cpu_sample_interval),
        settle_window = %humantime::format_duration(cfg.process_settle_interval),
        "запуск healthsnap"
    );

    let mut provider = SysinfoProvider::new();
    let snapshot = collect_snapshot(&mut provider, &cfg);
    let fields = snapshot.fields();

    if let Err(err) = report::write_json(&cfg.output.json_path, &fields) {
        error!(error = %err, "не удалось сохранить JSON");
    }

    if let Some(path) = &cfg.output.metrics_path {
        if let Err(err) = export_metrics(&snapshot, path) {
            error!(error = %err, "не удалось записать метрики");
        }
    }

    if let Err(err) = report::render_report(
        &cfg.output.template_path,
        &cfg.output.html_path,
        &fields,
        cfg.output.placeholder_syntax,
    ) {
        error!(error = %err, "HTML-отчёт не сформирован");
    }

    info!("сбор данных завершён");
}

fn export_metrics(snapshot: &SystemSnapshot, path: &Path) -> Result<(), MetricsError> {
    let metrics = SnapshotMetrics::new()?;
    metrics.update_from_snapshot(snapshot);
    metrics.write_textfile(path)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
