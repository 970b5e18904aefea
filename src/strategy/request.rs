//! Helper command line
//!
//! Maps a selection plus its options onto the helper's boolean-gated flags.
//! A request is built once and only read afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::orchestrator::{RunConfig, TestKind, TestSelection};
use crate::sandbox::SandboxBridge;

/// Resolved program, argv and environment for one helper invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl ExecutionRequest {
    /// Run the helper directly
    pub fn build(helper: &Path, selection: &TestSelection, config: &RunConfig) -> Self {
        Self {
            program: helper.to_path_buf(),
            args: helper_args(selection, config),
            env: BTreeMap::new(),
        }
    }

    /// Run the helper through the sandbox bridge
    pub fn sandboxed(
        bridge: &SandboxBridge,
        helper: &Path,
        selection: &TestSelection,
        config: &RunConfig,
    ) -> Self {
        let (program, args) = bridge.wrap(helper, &helper_args(selection, config));
        Self {
            program,
            args,
            env: bridge.environment().clone(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// One-line shell rendering, for `--dry-run` and logs
    pub fn preview(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, quote(v)))
            .collect();
        parts.push(quote(&self.program.to_string_lossy()));
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:,+@".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Helper flags for a selection, in the helper's own order
pub fn helper_args(selection: &TestSelection, config: &RunConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-menu=false".into(),
        "-l".into(),
        config.language.as_str().into(),
    ];
    let on = |kind| selection.is_enabled(kind);

    if !on(TestKind::Basic) {
        args.push("-basic=false".into());
    }

    if on(TestKind::Cpu) {
        args.extend([
            "-cpum".into(),
            config.cpu_method.as_str().into(),
            "-cput".into(),
            config.thread_mode.as_str().into(),
        ]);
    } else {
        args.push("-cpu=false".into());
    }

    if on(TestKind::Memory) {
        args.extend(["-memorym".into(), config.memory_method.as_str().into()]);
    } else {
        args.push("-memory=false".into());
    }

    if on(TestKind::Disk) {
        args.extend(["-diskm".into(), config.disk_method.as_str().into()]);
        if let Some(path) = config.disk_path.as_deref().filter(|p| !p.is_empty()) {
            args.extend(["-diskp".into(), path.to_string()]);
        }
        args.push(format!("-diskmc={}", config.disk_multi_check));
    } else {
        args.push("-disk=false".into());
    }

    for (kind, flag) in [
        (TestKind::Comm, "-comm=false"),
        (TestKind::Unlock, "-ut=false"),
        (TestKind::Security, "-security=false"),
        (TestKind::Email, "-email=false"),
        (TestKind::Backtrace, "-backtrace=false"),
    ] {
        if !on(kind) {
            args.push(flag.into());
        }
    }

    if on(TestKind::Nt3) {
        args.extend([
            "-nt3loc".into(),
            config.nt3_location.as_str().into(),
            "-nt3t".into(),
            config.nt3_type.as_str().into(),
        ]);
    } else {
        args.push("-nt3=false".into());
    }

    if on(TestKind::Speed) {
        args.extend(["-spnum".into(), config.speed_nodes.to_string()]);
    } else {
        args.push("-speed=false".into());
    }

    if !on(TestKind::Ping) {
        args.push("-ping=false".into());
    }

    if config.helper_log {
        args.push("-log".into());
    }
    args
}
