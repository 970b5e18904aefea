//! Built-in probe library for in-process runs
//!
//! Covers the hardware sections (basic info, CPU, memory, disk). Network
//! sections need the helper program and only print a notice here.
//!
//! Method handling: each section has a preference list of methods it can
//! run itself. A configured method that is not in the list falls back to
//! the first supported one, announced in the output. A supported method
//! that yields nothing is reported as an empty result and is not retried
//! with another method.

mod benchmark;
mod info;

use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::orchestrator::{
    CpuMethod, DiskMethod, Language, MemoryMethod, RunConfig, TestKind, ThreadMode,
};
use crate::platform::Platform;
use crate::strategy::{ProbeLibrary, SectionOutcome, SkipReason};

use benchmark::ProbeBudget;
use benchmark::{cpu_hash, disk_throughput, memory_bandwidth};
use info::SystemInfo;

/// Whether a configured method can run in-process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodChoice<M> {
    Native(M),
    /// Requested method is not built in; run `M` instead
    Fallback { requested: M, using: M },
}

impl<M: Copy> MethodChoice<M> {
    pub fn method(&self) -> M {
        match *self {
            MethodChoice::Native(m) => m,
            MethodChoice::Fallback { using, .. } => using,
        }
    }
}

/// Pick the method to run from a preference list of supported methods
pub fn resolve_method<M: Copy + PartialEq>(requested: M, supported: &[M], auto: Option<M>) -> MethodChoice<M> {
    if Some(requested) == auto {
        return MethodChoice::Native(supported[0]);
    }
    if supported.contains(&requested) {
        MethodChoice::Native(requested)
    } else {
        MethodChoice::Fallback {
            requested,
            using: supported[0],
        }
    }
}

const CPU_METHODS: [CpuMethod; 1] = [CpuMethod::Sysbench];
const MEMORY_METHODS: [MemoryMethod; 2] = [MemoryMethod::Stream, MemoryMethod::Dd];
const DISK_METHODS: [DiskMethod; 1] = [DiskMethod::Dd];

fn tr(language: Language, en: &str, zh: &str) -> String {
    match language {
        Language::En => en.to_string(),
        Language::Zh => zh.to_string(),
    }
}

/// Linked implementation of the hardware probes
pub struct BuiltinProbes {
    platform: Platform,
    budget: ProbeBudget,
}

impl BuiltinProbes {
    pub fn new(platform: Platform) -> Self {
        Self::with_budget(platform, ProbeBudget::default())
    }

    pub fn with_budget(platform: Platform, budget: ProbeBudget) -> Self {
        Self { platform, budget }
    }

    /// Build the text and status for one section
    pub fn report(&self, kind: TestKind, config: &RunConfig) -> (String, SectionOutcome) {
        let lang = config.language;
        match kind {
            TestKind::Basic => (SystemInfo::collect(&self.platform).render(), SectionOutcome::Completed),
            TestKind::Memory | TestKind::Disk if self.platform.sandboxed => (
                tr(
                    lang,
                    "This test is not supported on this platform in in-process mode\n",
                    "该平台的进程内模式不支持此测试\n",
                ),
                SectionOutcome::Skipped(SkipReason::UnsupportedPlatform),
            ),
            TestKind::Cpu => self.cpu(config),
            TestKind::Memory => self.memory(config),
            TestKind::Disk => self.disk(config),
            _ => (
                format!(
                    "{}: {}\n",
                    kind.label(),
                    tr(
                        lang,
                        "requires the helper program (run with --mode process)",
                        "需要辅助程序 (请使用 --mode process 运行)",
                    )
                ),
                SectionOutcome::Skipped(SkipReason::RequiresHelper),
            ),
        }
    }

    fn fallback_line<M: std::fmt::Display>(lang: Language, requested: M, using: M) -> String {
        match lang {
            Language::En => format!("{} is not built in, using {}\n", requested, using),
            Language::Zh => format!("{} 不可用, 改用 {}\n", requested, using),
        }
    }

    fn empty(lang: Language, method: &str) -> (String, SectionOutcome) {
        (
            tr(lang, "No result was produced\n", "没有产生结果\n"),
            SectionOutcome::Failed(format!("{} produced an empty result", method)),
        )
    }

    fn cpu(&self, config: &RunConfig) -> (String, SectionOutcome) {
        let lang = config.language;
        let mut out = String::new();
        let choice = resolve_method(config.cpu_method, &CPU_METHODS, None);
        if let MethodChoice::Fallback { requested, using } = choice {
            out.push_str(&Self::fallback_line(lang, requested, using));
        }

        let mut passes = vec![1];
        let cpus = num_cpus::get();
        if config.thread_mode == ThreadMode::Multi && cpus > 1 {
            passes.push(cpus);
        }

        for threads in passes {
            let result = cpu_hash(threads, self.budget.cpu_time);
            if result.score() == 0 {
                return Self::empty(lang, choice.method().as_str());
            }
            let label = format!("{} Thread(s) Test", threads);
            let unit = tr(lang, "Scores", "分");
            out.push_str(&format!("{:<22}: {} {}\n", label, result.score(), unit));
        }
        (out, SectionOutcome::Completed)
    }

    fn memory(&self, config: &RunConfig) -> (String, SectionOutcome) {
        let lang = config.language;
        let mut out = String::new();
        let choice = resolve_method(config.memory_method, &MEMORY_METHODS, Some(MemoryMethod::Auto));
        if let MethodChoice::Fallback { requested, using } = choice {
            out.push_str(&Self::fallback_line(lang, requested, using));
        }

        let with_copy = choice.method() == MemoryMethod::Stream;
        let result = memory_bandwidth(self.budget.memory_bytes, with_copy);
        if result.is_empty() {
            return Self::empty(lang, choice.method().as_str());
        }

        let rows = [
            (tr(lang, "Single Seq Write Speed", "单线程写"), Some(result.write_mbps)),
            (tr(lang, "Single Seq Read Speed", "单线程读"), Some(result.read_mbps)),
            (tr(lang, "Single Seq Copy Speed", "单线程复制"), result.copy_mbps),
        ];
        for (label, value) in rows {
            if let Some(mbps) = value {
                out.push_str(&format!("{:<22}: {:.2} MB/s\n", label, mbps));
            }
        }
        (out, SectionOutcome::Completed)
    }

    fn disk(&self, config: &RunConfig) -> (String, SectionOutcome) {
        let lang = config.language;
        let mut out = String::new();
        let choice = resolve_method(config.disk_method, &DISK_METHODS, Some(DiskMethod::Auto));
        if let MethodChoice::Fallback { requested, using } = choice {
            out.push_str(&Self::fallback_line(lang, requested, using));
        }
        if config.disk_multi_check {
            debug!("Multi-disk check requested; built-in disk probe only measures one path");
        }

        let dir = config
            .disk_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        match disk_throughput(&dir, self.budget.disk_bytes) {
            Ok(result) if result.is_empty() => Self::empty(lang, choice.method().as_str()),
            Ok(result) => {
                out.push_str(&format!(
                    "{:<22}: {} ({} x {} KiB)\n",
                    tr(lang, "Test Path", "测试路径"),
                    result.path.display(),
                    result.bytes / result.block,
                    result.block / 1024
                ));
                out.push_str(&format!("{:<22}: {:.2} MB/s\n", tr(lang, "Write Speed", "写入"), result.write_mbps));
                out.push_str(&format!("{:<22}: {:.2} MB/s\n", tr(lang, "Read Speed", "读取"), result.read_mbps));
                (out, SectionOutcome::Completed)
            }
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Disk probe failed");
                out.push_str(&format!("{}\n", e));
                (out, SectionOutcome::Failed(e.to_string()))
            }
        }
    }
}

impl ProbeLibrary for BuiltinProbes {
    fn run_probe(&self, kind: TestKind, config: &RunConfig) -> SectionOutcome {
        let (text, outcome) = self.report(kind, config);
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
        outcome
    }
}
