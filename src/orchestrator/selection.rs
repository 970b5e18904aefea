//! Test selection and per-run configuration.
//!
//! Both are plain values built by the caller before a run and never
//! mutated once the run has started.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::StackType;

/// Output language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Zh,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// TestKind
// ─────────────────────────────────────────────────────────────────

/// One probe. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Basic,
    Cpu,
    Memory,
    Disk,
    Comm,
    Unlock,
    Security,
    Email,
    Backtrace,
    #[serde(alias = "threeCarrierRoute", alias = "route")]
    Nt3,
    Ping,
    Speed,
}

impl TestKind {
    /// Every test in display order
    pub const ALL: [TestKind; 12] = [
        TestKind::Basic,
        TestKind::Cpu,
        TestKind::Memory,
        TestKind::Disk,
        TestKind::Comm,
        TestKind::Unlock,
        TestKind::Security,
        TestKind::Email,
        TestKind::Backtrace,
        TestKind::Nt3,
        TestKind::Ping,
        TestKind::Speed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TestKind::Basic => "basic",
            TestKind::Cpu => "cpu",
            TestKind::Memory => "memory",
            TestKind::Disk => "disk",
            TestKind::Comm => "comm",
            TestKind::Unlock => "unlock",
            TestKind::Security => "security",
            TestKind::Email => "email",
            TestKind::Backtrace => "backtrace",
            TestKind::Nt3 => "nt3",
            TestKind::Ping => "ping",
            TestKind::Speed => "speed",
        }
    }

    /// Language-independent progress label
    pub fn label(&self) -> &'static str {
        match self {
            TestKind::Basic => "Basic Info",
            TestKind::Cpu => "CPU",
            TestKind::Memory => "Memory",
            TestKind::Disk => "Disk",
            TestKind::Comm => "Common Streaming",
            TestKind::Unlock => "Cross-Border Unlock",
            TestKind::Security => "IP Quality",
            TestKind::Email => "Email Ports",
            TestKind::Backtrace => "Backtrace",
            TestKind::Nt3 => "Three-Carrier Route",
            TestKind::Ping => "Ping",
            TestKind::Speed => "Speed Test",
        }
    }

    /// Section title shown in the transcript
    pub fn title(&self, language: Language, method: Option<&str>) -> String {
        let method = method.unwrap_or("auto");
        match (self, language) {
            (TestKind::Basic, Language::En) => "System-Basic-Information".to_string(),
            (TestKind::Basic, Language::Zh) => "系统基础信息".to_string(),
            (TestKind::Cpu, Language::En) => format!("CPU-Test--{}-Method", method),
            (TestKind::Cpu, Language::Zh) => format!("CPU测试-通过{}测试", method),
            (TestKind::Memory, Language::En) => format!("Memory-Test--{}-Method", method),
            (TestKind::Memory, Language::Zh) => format!("内存测试-通过{}测试", method),
            (TestKind::Disk, Language::En) => format!("Disk-Test--{}-Method", method),
            (TestKind::Disk, Language::Zh) => format!("硬盘测试-通过{}测试", method),
            (TestKind::Comm, Language::En) => "Common-Streaming-Media-Unlock".to_string(),
            (TestKind::Comm, Language::Zh) => "御三家流媒体解锁".to_string(),
            (TestKind::Unlock, Language::En) => "Cross-Border-Streaming-Media-Unlock".to_string(),
            (TestKind::Unlock, Language::Zh) => "跨国流媒体解锁".to_string(),
            (TestKind::Security, Language::En) => "IP-Quality-Check".to_string(),
            (TestKind::Security, Language::Zh) => "IP质量检测".to_string(),
            (TestKind::Email, Language::En) => "Email-Port-Check".to_string(),
            (TestKind::Email, Language::Zh) => "邮件端口检测".to_string(),
            (TestKind::Backtrace, Language::En) => "Upstream-and-Return-Route-Check".to_string(),
            (TestKind::Backtrace, Language::Zh) => "上游及回程线路检测".to_string(),
            (TestKind::Nt3, Language::En) => "Three-Network-Return-Route-Check".to_string(),
            (TestKind::Nt3, Language::Zh) => "三网回程路由检测".to_string(),
            (TestKind::Ping, Language::En) => "Three-Network-ICMP-Ping-Check".to_string(),
            (TestKind::Ping, Language::Zh) => "三网ICMP的PING值检测".to_string(),
            (TestKind::Speed, Language::En) => "Speed-Test".to_string(),
            (TestKind::Speed, Language::Zh) => "就近节点测速".to_string(),
        }
    }

    /// Skipped silently when the network precheck fails
    pub fn needs_network(&self) -> bool {
        !matches!(
            self,
            TestKind::Basic | TestKind::Cpu | TestKind::Memory | TestKind::Disk
        )
    }

    /// Launched in the background, displayed at its own slot
    pub fn is_concurrent(&self) -> bool {
        matches!(self, TestKind::Unlock | TestKind::Email | TestKind::Ping)
    }

    /// Route tracing is not available on Windows
    pub fn runs_on_windows(&self) -> bool {
        !matches!(self, TestKind::Backtrace | TestKind::Nt3)
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        TestKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == lowered)
            .or(match lowered.as_str() {
                "threecarrierroute" | "route" => Some(TestKind::Nt3),
                "ipquality" => Some(TestKind::Security),
                _ => None,
            })
            .ok_or_else(|| {
                Error::config_field_invalid(
                    "selection.tests",
                    format!(
                        "unknown test '{}'; expected one of: {}",
                        s,
                        TestKind::ALL.map(|k| k.name()).join(", ")
                    ),
                )
            })
    }
}

// ─────────────────────────────────────────────────────────────────
// TestSelection
// ─────────────────────────────────────────────────────────────────

/// Which tests are enabled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestSelection {
    enabled: BTreeSet<TestKind>,
}

impl TestSelection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        TestKind::ALL.into_iter().collect()
    }

    /// A selection with exactly one test
    pub fn only(kind: TestKind) -> Self {
        std::iter::once(kind).collect()
    }

    /// Parse a comma separated list (`cpu,memory,nt3`)
    pub fn parse_list(list: &str) -> Result<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(TestKind::from_str)
            .collect()
    }

    pub fn with(mut self, kind: TestKind) -> Self {
        self.enabled.insert(kind);
        self
    }

    pub fn without(mut self, kind: TestKind) -> Self {
        self.enabled.remove(&kind);
        self
    }

    pub fn is_enabled(&self, kind: TestKind) -> bool {
        self.enabled.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    pub fn count(&self) -> usize {
        self.enabled.len()
    }

    /// Enabled tests in display order
    pub fn iter(&self) -> impl Iterator<Item = TestKind> + '_ {
        self.enabled.iter().copied()
    }
}

impl FromIterator<TestKind> for TestSelection {
    fn from_iter<I: IntoIterator<Item = TestKind>>(iter: I) -> Self {
        Self {
            enabled: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for TestSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|k| k.name()).collect();
        f.write_str(&names.join(","))
    }
}

// ─────────────────────────────────────────────────────────────────
// RunConfig
// ─────────────────────────────────────────────────────────────────

macro_rules! option_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? } default $default:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                #[value(name = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

option_enum!(
    /// CPU benchmark tool
    CpuMethod { Sysbench => "sysbench", Geekbench => "geekbench", Winsat => "winsat" } default Sysbench
);
option_enum!(
    /// CPU thread mode
    ThreadMode { Single => "single", Multi => "multi" } default Multi
);
option_enum!(
    /// Memory benchmark tool
    MemoryMethod { Auto => "auto", Stream => "stream", Sysbench => "sysbench", Dd => "dd", Winsat => "winsat" } default Auto
);
option_enum!(
    /// Disk benchmark tool
    DiskMethod { Auto => "auto", Fio => "fio", Dd => "dd", Winsat => "winsat" } default Auto
);
option_enum!(
    /// Route-trace origin
    Nt3Location { Gz => "GZ", Sh => "SH", Bj => "BJ", Cd => "CD", All => "ALL" } default Gz
);
option_enum!(
    /// Route-trace address family
    Nt3Type { Ipv4 => "ipv4", Ipv6 => "ipv6", Both => "both" } default Ipv4
);

/// Per-test options, captured at run start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub language: Language,
    pub cpu_method: CpuMethod,
    pub thread_mode: ThreadMode,
    pub memory_method: MemoryMethod,
    pub disk_method: DiskMethod,
    /// Directory to benchmark (helper default when unset)
    pub disk_path: Option<String>,
    /// Test every mounted disk
    pub disk_multi_check: bool,
    pub nt3_location: Nt3Location,
    pub nt3_type: Nt3Type,
    /// Speed-test nodes per carrier
    pub speed_nodes: u32,
    /// Ask the helper to write its own log file
    pub helper_log: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            language: Language::En,
            cpu_method: CpuMethod::default(),
            thread_mode: ThreadMode::default(),
            memory_method: MemoryMethod::default(),
            disk_method: DiskMethod::default(),
            disk_path: None,
            disk_multi_check: false,
            nt3_location: Nt3Location::default(),
            nt3_type: Nt3Type::default(),
            speed_nodes: 2,
            helper_log: false,
        }
    }
}

impl RunConfig {
    /// Narrow the route type to the address family that actually works
    pub fn constrained_to(&self, stack: StackType) -> Self {
        let mut config = self.clone();
        match stack {
            StackType::Ipv4 => config.nt3_type = Nt3Type::Ipv4,
            StackType::Ipv6 => config.nt3_type = Nt3Type::Ipv6,
            StackType::DualStack | StackType::None => {}
        }
        config
    }

    /// Method shown in a section title, for tests that have one
    pub fn method_for(&self, kind: TestKind) -> Option<&'static str> {
        match kind {
            TestKind::Cpu => Some(self.cpu_method.as_str()),
            TestKind::Memory => Some(self.memory_method.as_str()),
            TestKind::Disk => Some(self.disk_method.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_iterates_in_display_order() {
        let sel: TestSelection = [TestKind::Speed, TestKind::Basic, TestKind::Email]
            .into_iter()
            .collect();
        let order: Vec<_> = sel.iter().collect();
        assert_eq!(order, vec![TestKind::Basic, TestKind::Email, TestKind::Speed]);
    }

    #[test]
    fn test_parse_list() {
        let sel = TestSelection::parse_list("cpu, threeCarrierRoute,unlock").unwrap();
        assert!(sel.is_enabled(TestKind::Cpu));
        assert!(sel.is_enabled(TestKind::Nt3));
        assert!(sel.is_enabled(TestKind::Unlock));
        assert_eq!(sel.count(), 3);
        assert_eq!(sel.to_string(), "cpu,unlock,nt3");
    }

    #[test]
    fn test_parse_list_rejects_unknown() {
        let err = TestSelection::parse_list("cpu,gpu").unwrap_err();
        assert!(err.to_string().contains("gpu"));
    }

    #[test]
    fn test_concurrent_group() {
        let group: Vec<_> = TestKind::ALL.iter().filter(|k| k.is_concurrent()).collect();
        assert_eq!(group, vec![&TestKind::Unlock, &TestKind::Email, &TestKind::Ping]);
    }

    #[test]
    fn test_titles_localized() {
        assert_eq!(TestKind::Cpu.title(Language::En, Some("sysbench")), "CPU-Test--sysbench-Method");
        assert_eq!(TestKind::Email.title(Language::Zh, None), "邮件端口检测");
    }

    #[test]
    fn test_route_type_follows_stack() {
        let config = RunConfig {
            nt3_type: Nt3Type::Both,
            ..Default::default()
        };
        assert_eq!(config.constrained_to(StackType::Ipv6).nt3_type, Nt3Type::Ipv6);
        assert_eq!(config.constrained_to(StackType::Ipv4).nt3_type, Nt3Type::Ipv4);
        assert_eq!(config.constrained_to(StackType::DualStack).nt3_type, Nt3Type::Both);
    }

    #[test]
    fn test_run_config_toml() {
        let config: RunConfig = toml::from_str(
            r#"
language = "zh"
cpu_method = "geekbench"
nt3_location = "ALL"
speed_nodes = 5
"#,
        )
        .unwrap();
        assert_eq!(config.language, Language::Zh);
        assert_eq!(config.cpu_method, CpuMethod::Geekbench);
        assert_eq!(config.nt3_location, Nt3Location::All);
        assert_eq!(config.speed_nodes, 5);
        assert_eq!(config.thread_mode, ThreadMode::Multi);
    }
}
