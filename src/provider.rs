use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
#[cfg(unix)]
use std::process::Command;
use std::thread;
use std::time::Duration;
use sysinfo::{CpuExt, PidExt, ProcessExt, ProcessStatus, System, SystemExt};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuUsage {
    pub global: f64,
    pub per_core: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCounters {
    pub total: u64,
    pub used: u64,
    pub available: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl ProcessSample {
    pub fn score(&self) -> f64 {
        self.cpu_percent + self.memory_percent
    }

    pub fn is_active(&self) -> bool {
        self.cpu_percent > 0.0 || self.memory_percent > 0.0
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProcessReadError {
    #[error("процесс {pid} завершился между проходами")]
    Vanished { pid: u32 },
    #[error("процесс {pid} ({name}) в состоянии zombie")]
    Zombie { pid: u32, name: String },
}

/// Read access to process-wide OS state.
///
/// Every sampler goes through this trait so the pipeline can run against
/// a deterministic fake. Methods that take a `window` block the caller for
/// that long; it is the interval the OS counters integrate over.
pub trait MetricsProvider {
    fn host_name(&mut self) -> Option<String>;
    fn kernel_release(&mut self) -> Option<String>;
    /// Boot time as unix seconds.
    fn boot_time(&mut self) -> u64;
    /// One username per login session, duplicates included.
    fn login_sessions(&mut self) -> Vec<String>;
    /// `None` when the platform has no load average.
    fn load_average(&mut self) -> Option<LoadAverage>;
    fn logical_cpu_count(&mut self) -> usize;
    fn cpu_frequency_mhz(&mut self) -> Option<f64>;
    fn sample_cpu_usage(&mut self, window: Duration) -> CpuUsage;
    fn memory(&mut self) -> MemoryCounters;
    /// Seeds per-process CPU reference points; returns how many processes were seen.
    fn prime_processes(&mut self) -> usize;
    fn measure_processes(&mut self) -> Vec<Result<ProcessSample, ProcessReadError>>;
    fn outbound_local_addr(&mut self, target: SocketAddr) -> io::Result<IpAddr>;
}

pub struct SysinfoProvider {
    system: System,
    primed: HashSet<u32>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system,
            primed: HashSet::new(),
        }
    }
}

impl MetricsProvider for SysinfoProvider {
    fn host_name(&mut self) -> Option<String> {
        self.system.host_name().filter(|h| !h.trim().is_empty())
    }

    fn kernel_release(&mut self) -> Option<String> {
        self.system.kernel_version()
    }

    fn boot_time(&mut self) -> u64 {
        self.system.boot_time()
    }

    fn login_sessions(&mut self) -> Vec<String> {
        collect_login_sessions()
    }

    fn load_average(&mut self) -> Option<LoadAverage> {
        if cfg!(target_os = "windows") {
            return None;
        }
        let load = self.system.load_average();
        Some(LoadAverage {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
        })
    }

    fn logical_cpu_count(&mut self) -> usize {
        self.system.cpus().len()
    }

    fn cpu_frequency_mhz(&mut self) -> Option<f64> {
        self.system.refresh_cpu();
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return None;
        }
        let sum: u64 = cpus.iter().map(|c| c.frequency()).sum();
        let avg = sum as f64 / cpus.len() as f64;
        (avg > 0.0).then_some(avg)
    }

    fn sample_cpu_usage(&mut self, window: Duration) -> CpuUsage {
        self.system.refresh_cpu();
        thread::sleep(window);
        self.system.refresh_cpu();
        CpuUsage {
            global: self.system.global_cpu_info().cpu_usage() as f64,
            per_core: self
                .system
                .cpus()
                .iter()
                .map(|c| c.cpu_usage() as f64)
                .collect(),
        }
    }

    fn memory(&mut self) -> MemoryCounters {
        self.system.refresh_memory();
        MemoryCounters {
            total: self.system.total_memory(),
            used: self.system.used_memory(),
            available: self.system.available_memory(),
        }
    }

    fn prime_processes(&mut self) -> usize {
        self.system.refresh_processes();
        self.primed = self
            .system
            .processes()
            .keys()
            .map(|pid| pid.as_u32())
            .collect();
        self.primed.len()
    }

    fn measure_processes(&mut self) -> Vec<Result<ProcessSample, ProcessReadError>> {
        self.system.refresh_memory();
        self.system.refresh_processes();
        let total_memory = self.system.total_memory();

        let mut processes: Vec<_> = self.system.processes().iter().collect();
        processes.sort_by_key(|(pid, _)| pid.as_u32());

        let mut out = Vec::with_capacity(processes.len());
        let mut seen = HashSet::with_capacity(processes.len());
        for (pid, process) in processes {
            let pid = pid.as_u32();
            seen.insert(pid);
            if process.status() == ProcessStatus::Zombie {
                out.push(Err(ProcessReadError::Zombie {
                    pid,
                    name: process.name().to_string(),
                }));
                continue;
            }
            let memory_percent = if total_memory > 0 {
                process.memory() as f64 / total_memory as f64 * 100.0
            } else {
                0.0
            };
            out.push(Ok(ProcessSample {
                name: process.name().to_string(),
                cpu_percent: process.cpu_usage().max(0.0) as f64,
                memory_percent,
            }));
        }

        let mut vanished: Vec<u32> = self.primed.difference(&seen).copied().collect();
        vanished.sort_unstable();
        out.extend(
            vanished
                .into_iter()
                .map(|pid| Err(ProcessReadError::Vanished { pid })),
        );
        out
    }

    fn outbound_local_addr(&mut self, target: SocketAddr) -> io::Result<IpAddr> {
        udp_route_local_addr(target)
    }
}

/// Local address the OS routes `target` through. `connect` on a UDP socket
/// only selects a route; no datagram leaves the host.
pub fn udp_route_local_addr(target: SocketAddr) -> io::Result<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.connect(target)?;
    let local = socket.local_addr()?;
    Ok(local.ip())
}

#[cfg(unix)]
fn collect_login_sessions() -> Vec<String> {
    let Ok(output) = Command::new("who").output() else {
        return Vec::new();
    };
    if !output.status.success() {
        return Vec::new();
    }
    parse_who_output(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(not(unix))]
fn collect_login_sessions() -> Vec<String> {
    Vec::new()
}

pub fn parse_who_output(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted provider; every reading is a plain field.
    #[derive(Debug, Clone)]
    pub struct FakeProvider {
        pub host_name: Option<String>,
        pub kernel_release: Option<String>,
        pub boot_time: u64,
        pub sessions: Vec<String>,
        pub load: Option<LoadAverage>,
        pub cpu_count: usize,
        pub cpu_frequency: Option<f64>,
        pub cpu_usages: VecDeque<CpuUsage>,
        pub memory: MemoryCounters,
        pub processes: Vec<Result<ProcessSample, ProcessReadError>>,
        pub route: Result<IpAddr, io::ErrorKind>,
        pub cpu_windows: Vec<Duration>,
        pub primed: bool,
    }

    impl Default for FakeProvider {
        fn default() -> Self {
            Self {
                host_name: Some("test-host".to_string()),
                kernel_release: Some("6.1.0".to_string()),
                boot_time: 1_700_000_000,
                sessions: vec!["alice".to_string()],
                load: Some(LoadAverage {
                    one: 0.5,
                    five: 0.25,
                    fifteen: 0.125,
                }),
                cpu_count: 4,
                cpu_frequency: Some(2400.0),
                cpu_usages: VecDeque::new(),
                memory: MemoryCounters {
                    total: 16 * 1024 * 1024 * 1024,
                    used: 4 * 1024 * 1024 * 1024,
                    available: 12 * 1024 * 1024 * 1024,
                },
                processes: Vec::new(),
                route: Ok(IpAddr::from([192, 168, 1, 20])),
                cpu_windows: Vec::new(),
                primed: false,
            }
        }
    }

    pub fn sample(name: &str, cpu: f64, mem: f64) -> ProcessSample {
        ProcessSample {
            name: name.to_string(),
            cpu_percent: cpu,
            memory_percent: mem,
        }
    }

    impl MetricsProvider for FakeProvider {
        fn host_name(&mut self) -> Option<String> {
            self.host_name.clone()
        }

        fn kernel_release(&mut self) -> Option<String> {
            self.kernel_release.clone()
        }

        fn boot_time(&mut self) -> u64 {
            self.boot_time
        }

        fn login_sessions(&mut self) -> Vec<String> {
            self.sessions.clone()
        }

        fn load_average(&mut self) -> Option<LoadAverage> {
            self.load
        }

        fn logical_cpu_count(&mut self) -> usize {
            self.cpu_count
        }

        fn cpu_frequency_mhz(&mut self) -> Option<f64> {
            self.cpu_frequency
        }

        fn sample_cpu_usage(&mut self, window: Duration) -> CpuUsage {
            self.cpu_windows.push(window);
            self.cpu_usages.pop_front().unwrap_or(CpuUsage {
                global: 0.0,
                per_core: vec![0.0; self.cpu_count],
            })
        }

        fn memory(&mut self) -> MemoryCounters {
            self.memory
        }

        fn prime_processes(&mut self) -> usize {
            self.primed = true;
            self.processes.len()
        }

        fn measure_processes(&mut self) -> Vec<Result<ProcessSample, ProcessReadError>> {
            self.processes.clone()
        }

        fn outbound_local_addr(&mut self, _target: SocketAddr) -> io::Result<IpAddr> {
            self.route.map_err(io::Error::from)
        }
    }
}
