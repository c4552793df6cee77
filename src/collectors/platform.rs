use crate::format::{format_unix_local, format_uptime};
use crate::provider::MetricsProvider;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const UNKNOWN_HOST: &str = "unknown";
const PRETTY_NAME_KEY: &str = "PRETTY_NAME";

#[derive(Debug, Clone, PartialEq)]
pub struct HostInfo {
    pub hostname: String,
    pub os_name: String,
    pub boot_time_unix: u64,
    pub uptime_seconds: u64,
    pub user_count: usize,
}

impl HostInfo {
    pub fn boot_time(&self) -> String {
        format_unix_local(self.boot_time_unix as i64)
    }

    pub fn uptime(&self) -> String {
        format_uptime(self.uptime_seconds)
    }
}

pub fn probe_platform(
    provider: &mut dyn MetricsProvider,
    os_release_path: &Path,
    now_unix: i64,
) -> HostInfo {
    let hostname = provider.host_name().unwrap_or_else(|| {
        warn!("не удалось определить имя хоста, используется заглушка");
        UNKNOWN_HOST.to_string()
    });

    let fallback = fallback_os_descriptor(provider.kernel_release());
    let os_name = read_pretty_name(os_release_path).unwrap_or(fallback);

    let boot_time_unix = provider.boot_time();
    let uptime_seconds = (now_unix - boot_time_unix as i64).max(0) as u64;

    let sessions = provider.login_sessions();
    let user_count = distinct_users(&sessions);
    debug!(
        sessions = sessions.len(),
        users = user_count,
        "подсчитаны пользователи в системе"
    );

    HostInfo {
        hostname,
        os_name,
        boot_time_unix,
        uptime_seconds,
        user_count,
    }
}

fn fallback_os_descriptor(release: Option<String>) -> String {
    let family = match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        other => other,
    };
    match release {
        Some(release) if !release.trim().is_empty() => format!("{family} {}", release.trim()),
        _ => family.to_string(),
    }
}

fn read_pretty_name(path: &Path) -> Option<String> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "файл описания дистрибутива недоступен");
            return None;
        }
    };
    let parsed = parse_pretty_name(&text);
    if parsed.is_none() {
        debug!(path = %path.display(), "в файле описания дистрибутива нет PRETTY_NAME");
    }
    parsed
}

pub fn parse_pretty_name(text: &str) -> Option<String> {
    let line = text.lines().find(|l| l.starts_with(PRETTY_NAME_KEY))?;
    let value = line.split('=').nth(1)?;
    let value = value.trim().replace('"', "");
    (!value.is_empty()).then_some(value)
}

pub fn distinct_users(sessions: &[String]) -> usize {
    sessions.iter().collect::<HashSet<_>>().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::FakeProvider;
    use tempfile::tempdir;

    #[test]
    fn pretty_name_overrides_kernel_descriptor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("os-release");
        fs::write(
            &path,
            "NAME=\"Debian GNU/Linux\"\nPRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\nID=debian\n",
        )
        .unwrap();

        let mut provider = FakeProvider::default();
        let info = probe_platform(&mut provider, &path, 1_700_003_600);
        assert_eq!(info.os_name, "Debian GNU/Linux 12 (bookworm)");
        assert_eq!(info.hostname, "test-host");
        assert_eq!(info.uptime(), "1 hours, 0 minutes");
    }

    #[test]
    fn missing_descriptor_keeps_kernel_fallback() {
        let mut provider = FakeProvider::default();
        let info = probe_platform(
            &mut provider,
            Path::new("/nonexistent/os-release"),
            1_700_000_000,
        );
        assert!(info.os_name.ends_with(" 6.1.0"), "{}", info.os_name);
    }

    #[test]
    fn malformed_descriptor_keeps_kernel_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("os-release");
        fs::write(&path, "PRETTY_NAME\nID=arch\n").unwrap();

        let mut provider = FakeProvider::default();
        let info = probe_platform(&mut provider, &path, 1_700_000_000);
        assert!(info.os_name.ends_with(" 6.1.0"));
    }

    #[test]
    fn parse_pretty_name_unquoted() {
        assert_eq!(
            parse_pretty_name("PRETTY_NAME=Alpine Linux v3.19\n"),
            Some("Alpine Linux v3.19".to_string())
        );
        assert_eq!(parse_pretty_name("NAME=x\n"), None);
    }

    #[test]
    fn missing_hostname_uses_placeholder() {
        let mut provider = FakeProvider {
            host_name: None,
            ..FakeProvider::default()
        };
        let info = probe_platform(&mut provider, Path::new("/nonexistent"), 0);
        assert_eq!(info.hostname, "unknown");
    }

    #[test]
    fn user_count_deduplicates_sessions() {
        let sessions: Vec<String> = ["alice", "bob", "alice", "alice"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut provider = FakeProvider {
            sessions: sessions.clone(),
            ..FakeProvider::default()
        };
        let info = probe_platform(&mut provider, Path::new("/nonexistent"), 0);
        assert_eq!(info.user_count, 2);
        assert!(info.user_count <= sessions.len());
    }

    #[test]
    fn boot_time_in_future_clamps_uptime() {
        let mut provider = FakeProvider::default();
        let info = probe_platform(&mut provider, Path::new("/nonexistent"), 10);
        assert_eq!(info.uptime_seconds, 0);
        assert_eq!(info.boot_time().len(), 19);
    }
}
