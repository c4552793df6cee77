use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const MAX_SAMPLING_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Directory to classify; `~/Documents` when unset.
    #[serde(default)]
    pub scan_dir: Option<PathBuf>,
    #[serde(default = "default_os_release_path")]
    pub os_release_path: PathBuf,
    #[serde(default = "default_probe_target")]
    pub probe_target: SocketAddr,
    #[serde(default = "default_cpu_sample_interval", with = "duration_text")]
    pub cpu_sample_interval: Duration,
    #[serde(default = "default_process_settle_interval", with = "duration_text")]
    pub process_settle_interval: Duration,
    #[serde(default = "default_per_core")]
    pub per_core: bool,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,
    #[serde(default = "default_html_path")]
    pub html_path: PathBuf,
    #[serde(default = "default_json_path")]
    pub json_path: PathBuf,
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
    #[serde(default)]
    pub placeholder_syntax: PlaceholderSyntax,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderSyntax {
    /// Only `{{ key }}`.
    #[default]
    Double,
    /// `{{ key }}` and bare `{key}`.
    Both,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_dir: None,
            os_release_path: default_os_release_path(),
            probe_target: default_probe_target(),
            cpu_sample_interval: default_cpu_sample_interval(),
            process_settle_interval: default_process_settle_interval(),
            per_core: default_per_core(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            template_path: default_template_path(),
            html_path: default_html_path(),
            json_path: default_json_path(),
            metrics_path: None,
            placeholder_syntax: PlaceholderSyntax::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// A missing file means defaults; anything else wrong with it is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            info!(
                path = %path_ref.display(),
                "файл конфигурации не найден, используются значения по умолчанию"
            );
            return Ok(Self::default());
        }
        Self::load_from_file(path_ref)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_target.port() == 0 {
            return Err(ConfigError::Validation(
                "probe_target должен содержать порт 1..65535".to_string(),
            ));
        }
        if self.cpu_sample_interval > MAX_SAMPLING_WINDOW {
            return Err(ConfigError::Validation(
                "cpu_sample_interval должно быть <= 60s".to_string(),
            ));
        }
        if self.process_settle_interval > MAX_SAMPLING_WINDOW {
            return Err(ConfigError::Validation(
                "process_settle_interval должно быть <= 60s".to_string(),
            ));
        }
        if self.os_release_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "os_release_path не должен быть пустым".to_string(),
            ));
        }

        validate_output(&self.output)?;

        Ok(())
    }

    pub fn scan_root(&self) -> PathBuf {
        if let Some(dir) = &self.scan_dir {
            return dir.clone();
        }
        match dirs::home_dir() {
            Some(home) if home.join("Documents").exists() => home.join("Documents"),
            _ => {
                info!("каталог Documents не найден, анализируется текущий каталог");
                PathBuf::from(".")
            }
        }
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../healthsnap.yaml.example")
    }
}

fn validate_output(cfg: &OutputConfig) -> Result<(), ConfigError> {
    for (name, path) in [
        ("output.template_path", &cfg.template_path),
        ("output.html_path", &cfg.html_path),
        ("output.json_path", &cfg.json_path),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{name} не должен быть пустым"
            )));
        }
    }
    if cfg.html_path == cfg.json_path {
        return Err(ConfigError::Validation(
            "output.html_path и output.json_path должны различаться".to_string(),
        ));
    }
    if cfg.html_path == cfg.template_path {
        return Err(ConfigError::Validation(
            "output.html_path не должен перезаписывать шаблон".to_string(),
        ));
    }
    if let Some(metrics) = &cfg.metrics_path {
        if metrics.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "output.metrics_path не должен быть пустым".to_string(),
            ));
        }
    }
    Ok(())
}

mod duration_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom)
    }
}

fn default_os_release_path() -> PathBuf {
    PathBuf::from("/etc/os-release")
}

fn default_probe_target() -> SocketAddr {
    SocketAddr::from(([8, 8, 8, 8], 80))
}

const fn default_cpu_sample_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_process_settle_interval() -> Duration {
    Duration::from_secs(2)
}

const fn default_per_core() -> bool {
    true
}

fn default_template_path() -> PathBuf {
    PathBuf::from("template.html")
}

fn default_html_path() -> PathBuf {
    PathBuf::from("index.html")
}

fn default_json_path() -> PathBuf {
    PathBuf::from("system_data.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.cpu_sample_interval, Duration::from_secs(1));
        assert_eq!(cfg.process_settle_interval, Duration::from_secs(2));
        assert_eq!(cfg.probe_target.to_string(), "8.8.8.8:80");
        assert_eq!(cfg.output.json_path, PathBuf::from("system_data.json"));
        assert_eq!(cfg.output.placeholder_syntax, PlaceholderSyntax::Double);
        cfg.validate().expect("значения по умолчанию должны быть валидны");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "cpu_sample_interval: 250ms\nprocess_settle_interval: 0s\noutput:\n  placeholder_syntax: both\n",
        )
        .unwrap();
        assert_eq!(cfg.cpu_sample_interval, Duration::from_millis(250));
        assert_eq!(cfg.process_settle_interval, Duration::ZERO);
        assert_eq!(cfg.output.placeholder_syntax, PlaceholderSyntax::Both);
        assert_eq!(cfg.output.html_path, PathBuf::from("index.html"));
        assert!(cfg.per_core);
    }

    #[test]
    fn example_config_parses() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).unwrap();
        cfg.validate().unwrap();
    }

    #[test]
    fn bad_duration_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("healthsnap.yaml");
        fs::write(&path, "cpu_sample_interval: soon\n").unwrap();
        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn oversized_window_fails_validation() {
        let cfg = Config {
            process_settle_interval: Duration::from_secs(600),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn html_and_json_must_differ() {
        let mut cfg = Config::default();
        cfg.output.html_path = cfg.output.json_path.clone();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = Config::load_or_default("/nonexistent/healthsnap.yaml").unwrap();
        assert!(cfg.scan_dir.is_none());
    }

    #[test]
    fn explicit_scan_dir_wins() {
        let cfg = Config {
            scan_dir: Some(PathBuf::from("/srv/share")),
            ..Config::default()
        };
        assert_eq!(cfg.scan_root(), PathBuf::from("/srv/share"));
    }
}
