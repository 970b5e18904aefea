//! Host information for the basic-info section

use serde::Serialize;

use crate::platform::Platform;

/// Host facts read from the OS
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub os_name: String,
    pub kernel: String,
    pub arch: String,
    pub cpu_model: String,
    pub cpu_count: usize,
    pub physical_cores: usize,
    /// Total memory (MB), when the OS reports it
    pub total_memory_mb: Option<u64>,
    /// Uptime in seconds, when the OS reports it
    pub uptime_secs: Option<u64>,
    pub platform: String,
}

impl SystemInfo {
    pub fn collect(platform: &Platform) -> Self {
        Self {
            hostname: hostname(),
            os_name: os_name(),
            kernel: kernel_release(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_model: cpu_model().unwrap_or_else(|| std::env::consts::ARCH.to_string()),
            cpu_count: num_cpus::get(),
            physical_cores: num_cpus::get_physical(),
            total_memory_mb: total_memory_mb(),
            uptime_secs: uptime_secs(),
            platform: platform.to_string(),
        }
    }

    /// Aligned `key : value` report
    pub fn render(&self) -> String {
        let mut rows: Vec<(&str, String)> = vec![
            ("Hostname", self.hostname.clone()),
            ("OS Release", self.os_name.clone()),
            ("Kernel", self.kernel.clone()),
            ("Arch", self.arch.clone()),
            ("CPU Model", self.cpu_model.clone()),
            (
                "CPU Cores",
                format!("{} logical / {} physical", self.cpu_count, self.physical_cores),
            ),
        ];
        if let Some(mb) = self.total_memory_mb {
            rows.push(("Total Memory", format!("{:.2} GiB", mb as f64 / 1024.0)));
        }
        if let Some(secs) = self.uptime_secs {
            rows.push(("Uptime", format_uptime(secs)));
        }
        rows.push(("Platform", self.platform.clone()));

        rows.iter()
            .map(|(key, value)| format!("{:<22}: {}\n", key, value))
            .collect()
    }
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;
    format!("{} days {} hours {} minutes", days, hours, minutes)
}

fn hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn read_proc(path: &str) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// `MemTotal` from /proc/meminfo
fn total_memory_mb() -> Option<u64> {
    let content = read_proc("/proc/meminfo")?;
    content
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb / 1024)
}

fn uptime_secs() -> Option<u64> {
    let content = read_proc("/proc/uptime")?;
    let first = content.split_whitespace().next()?;
    first.parse::<f64>().ok().map(|s| s as u64)
}

fn kernel_release() -> String {
    read_proc("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| std::env::consts::OS.to_string())
}

fn cpu_model() -> Option<String> {
    let content = read_proc("/proc/cpuinfo")?;
    content
        .lines()
        .find(|l| l.starts_with("model name") || l.starts_with("Hardware") || l.starts_with("Processor"))
        .and_then(|l| l.split_once(':'))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn os_name() -> String {
    #[cfg(target_os = "linux")]
    {
        read_proc("/etc/os-release")
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("PRETTY_NAME="))
                    .map(|l| l.trim_start_matches("PRETTY_NAME=").trim_matches('"').to_string())
            })
            .unwrap_or_else(|| "Linux".to_string())
    }

    #[cfg(target_os = "android")]
    {
        "Android".to_string()
    }

    #[cfg(target_os = "macos")]
    {
        "macOS".to_string()
    }

    #[cfg(target_os = "windows")]
    {
        "Windows".to_string()
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "windows"
    )))]
    {
        std::env::consts::OS.to_string()
    }
}
