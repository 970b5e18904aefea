//! Build metadata embedded by `build.rs`

use std::fmt;

/// Program name shown in transcripts and `--version`
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information embedded at compile time
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    /// Git commit hash (short)
    pub git_hash: &'static str,
    git_dirty_str: &'static str,
    pub build_timestamp: &'static str,
    /// Target triple the binary was built for
    pub target: &'static str,
    /// debug / release
    pub profile: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: env!("HOSTPROBE_GIT_HASH"),
            git_dirty_str: env!("HOSTPROBE_GIT_DIRTY"),
            build_timestamp: env!("HOSTPROBE_BUILD_TIMESTAMP"),
            target: env!("HOSTPROBE_TARGET"),
            profile: env!("HOSTPROBE_PROFILE"),
            rustc_version: env!("HOSTPROBE_RUSTC_VERSION"),
        }
    }

    pub fn git_dirty(&self) -> bool {
        self.git_dirty_str == "true"
    }

    /// Version plus commit, e.g. "0.1.0-abc1234"
    pub fn full_version(&self) -> String {
        if self.git_dirty() {
            format!("{}-{}-dirty", self.version, self.git_hash)
        } else {
            format!("{}-{}", self.version, self.git_hash)
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", NAME, self.full_version())?;
        writeln!(f)?;
        writeln!(f, "  Git Hash:   {}{}", self.git_hash, if self.git_dirty() { " (dirty)" } else { "" })?;
        writeln!(f, "  Built:      {}", self.build_timestamp)?;
        writeln!(f, "  Profile:    {}", self.profile)?;
        writeln!(f, "  Target:     {}", self.target)?;
        writeln!(f, "  Compiler:   {}", self.rustc_version)?;
        writeln!(f, "  Platform:   {}", crate::platform::Platform::detect())?;
        Ok(())
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo::current()
}

pub fn print_version() {
    print!("{}", build_info());
}
