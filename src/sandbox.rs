//! Sandbox bridge for platforms that refuse to exec foreign binaries.
//!
//! The helper is run under a proot shim shipped as a native library:
//!
//! ```text
//! <shim> -0 -r / -w / --link2symlink <helper> <helper args...>
//! ```
//!
//! A missing shim is not fatal. The bridge falls back to running the helper
//! directly and says so in the transcript before doing it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::locator::{SearchContext, SearchResult};
use crate::platform::Arch;

/// Fixed flags placed ahead of the target: fake root identity, bind `/`
/// read-write as both root and cwd, turn hard links into symlinks.
pub const SHIM_FLAGS: [&str; 6] = ["-0", "-r", "/", "-w", "/", "--link2symlink"];

/// PATH exported to the helper under the shim
pub const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/local/sbin:/usr/sbin:/sbin";

/// Last-resort HOME when neither `$HOME` nor the package data dir exists
const FALLBACK_HOME: &str = "/data/local/tmp";

/// Sandbox failures. Never fatal to a run.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("sandbox shim for {arch} not found ({} paths checked)", .checked.len())]
    ShimUnavailable { arch: Arch, checked: Vec<PathBuf> },
}

/// Shim file name for an architecture
pub fn shim_name(arch: Arch) -> &'static str {
    match arch {
        Arch::X86_64 => "libproot_x86_64.so",
        Arch::X86 => "libproot_x86.so",
        Arch::Arm64 | Arch::Arm | Arch::Other => "libproot.so",
    }
}

/// Find the shim with the same search the helper uses
pub fn locate_shim(ctx: &SearchContext, arch: Arch) -> Result<PathBuf, SandboxError> {
    match crate::locator::search::search(ctx, arch, &[shim_name(arch)]) {
        SearchResult::Found { path, .. } => {
            if let Err(e) = crate::locator::bundle::make_executable(&path) {
                warn!(path = %path.display(), error = %e, "chmod on shim failed");
            }
            Ok(path)
        }
        SearchResult::Exhausted(attempts) => Err(SandboxError::ShimUnavailable {
            arch,
            checked: attempts.into_iter().flat_map(|a| a.checked).collect(),
        }),
    }
}

/// Wrap `target args...` in a shim invocation
pub fn build_invocation(shim: &Path, target: &Path, args: &[String]) -> (PathBuf, Vec<String>) {
    let mut argv: Vec<String> = SHIM_FLAGS.iter().map(|s| s.to_string()).collect();
    argv.push(target.to_string_lossy().into_owned());
    argv.extend(args.iter().cloned());
    (shim.to_path_buf(), argv)
}

/// HOME/TMPDIR/PATH for the sandboxed helper; creates TMPDIR.
pub fn prepare_environment(ctx: &SearchContext) -> BTreeMap<String, String> {
    let home = std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from);
    environment_for(home, ctx.package_data_dir())
}

fn environment_for(home: Option<PathBuf>, package_dir: Option<PathBuf>) -> BTreeMap<String, String> {
    let home = home
        .or(package_dir)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_HOME));
    let tmp = home.join("tmp");
    if let Err(e) = fs::create_dir_all(&tmp) {
        warn!(path = %tmp.display(), error = %e, "Could not create sandbox TMPDIR");
    }

    let mut env = BTreeMap::new();
    env.insert("HOME".to_string(), home.to_string_lossy().into_owned());
    env.insert("TMPDIR".to_string(), tmp.to_string_lossy().into_owned());
    env.insert("PATH".to_string(), SANDBOX_PATH.to_string());
    env
}

/// Prepared bridge for one run. Read-only once built.
#[derive(Debug, Clone)]
pub struct SandboxBridge {
    shim: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl SandboxBridge {
    /// Locate the shim and prepare the environment.
    ///
    /// Returns the announcement line for the transcript: a success line, or
    /// the degraded-mode warning when the shim is missing.
    pub fn prepare(ctx: &SearchContext, arch: Arch) -> (Self, String) {
        Self::with_environment(ctx, arch, prepare_environment(ctx))
    }

    fn with_environment(ctx: &SearchContext, arch: Arch, env: BTreeMap<String, String>) -> (Self, String) {
        match locate_shim(ctx, arch) {
            Ok(shim) => {
                info!(shim = %shim.display(), "Sandbox shim located");
                let bridge = Self {
                    shim: Some(shim),
                    env,
                };
                (bridge, "✓ using proot to run the helper\n\n".to_string())
            }
            Err(e) => {
                warn!(error = %e, "Sandbox shim unavailable, running helper directly");
                let bridge = Self { shim: None, env };
                (
                    bridge,
                    format!("⚠️  warning: {}, trying direct run\n\n", e),
                )
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.shim.is_none()
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Program and argv for running `target args...` in the sandbox
    pub fn wrap(&self, target: &Path, args: &[String]) -> (PathBuf, Vec<String>) {
        match &self.shim {
            Some(shim) => build_invocation(shim, target, args),
            None => (target.to_path_buf(), args.to_vec()),
        }
    }
}
