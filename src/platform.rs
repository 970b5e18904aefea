//! Runtime platform capability probe
//!
//! Decides at startup whether we are on a sandboxed mobile OS (Android) or a
//! regular desktop/server OS, and which CPU architecture and native-library
//! directory spellings apply. Nothing here is chosen by `cfg` switches: the
//! same binary behaves correctly when run under Termux or inside an app.

use std::fmt;
use std::path::Path;

use serde::Serialize;

/// Operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Android,
    MacOs,
    Windows,
    FreeBsd,
    Other,
}

impl OsFamily {
    fn from_consts(os: &str) -> Self {
        match os {
            "linux" => OsFamily::Linux,
            "android" => OsFamily::Android,
            "macos" => OsFamily::MacOs,
            "windows" => OsFamily::Windows,
            "freebsd" => OsFamily::FreeBsd,
            _ => OsFamily::Other,
        }
    }

    /// Name used in bundled payload file names (`goecs-<os>-<arch>`)
    pub fn payload_name(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Android => "android",
            OsFamily::MacOs => "darwin",
            OsFamily::Windows => "windows",
            OsFamily::FreeBsd => "freebsd",
            OsFamily::Other => "unknown",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload_name())
    }
}

/// CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86_64,
    X86,
    Arm64,
    Arm,
    Other,
}

impl Arch {
    /// Architecture of the running binary
    pub fn current() -> Self {
        Self::from_consts(std::env::consts::ARCH)
    }

    pub fn from_consts(arch: &str) -> Self {
        match arch {
            "x86_64" => Arch::X86_64,
            "x86" => Arch::X86,
            "aarch64" => Arch::Arm64,
            "arm" => Arch::Arm,
            _ => Arch::Other,
        }
    }

    /// Accepted native-library subdirectory spellings, most specific first.
    ///
    /// Several spellings exist for the same ABI because packaging tools
    /// never agreed on one.
    pub fn abi_dirs(&self) -> &'static [&'static str] {
        match self {
            Arch::Arm64 => &["arm64-v8a", "arm64"],
            Arch::Arm => &["armeabi-v7a", "armeabi", "arm"],
            Arch::X86_64 => &["x86_64", "x86-64"],
            Arch::X86 => &["x86"],
            Arch::Other => &[],
        }
    }

    /// ABI directory to recommend when nothing was found
    pub fn recommended_abi(&self) -> &'static str {
        match self {
            Arch::Arm64 | Arch::Other => "arm64-v8a",
            Arch::Arm => "armeabi-v7a",
            Arch::X86_64 => "x86_64",
            Arch::X86 => "x86",
        }
    }

    /// Name used in bundled payload file names (`goecs-<os>-<arch>`)
    pub fn payload_name(&self) -> &'static str {
        match self {
            Arch::X86_64 => "amd64",
            Arch::X86 => "386",
            Arch::Arm64 => "arm64",
            Arch::Arm => "arm",
            Arch::Other => "unknown",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload_name())
    }
}

/// Result of the startup capability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub os: OsFamily,
    pub arch: Arch,
    /// Direct execution of foreign binaries is forbidden
    pub sandboxed: bool,
}

impl Platform {
    /// Probe the running system
    pub fn detect() -> Self {
        let markers = std::env::var_os("ANDROID_ROOT").is_some()
            && std::env::var_os("ANDROID_DATA").is_some();
        let build_prop = Path::new("/system/build.prop").exists();
        Self::from_parts(
            std::env::consts::OS,
            std::env::consts::ARCH,
            markers || build_prop,
        )
    }

    /// Build a platform from raw `std::env::consts` values and the result of
    /// the Android marker probe.
    pub fn from_parts(os: &str, arch: &str, android_markers: bool) -> Self {
        let mut family = OsFamily::from_consts(os);
        if family == OsFamily::Linux && android_markers {
            family = OsFamily::Android;
        }
        Self {
            os: family,
            arch: Arch::from_consts(arch),
            sandboxed: family == OsFamily::Android,
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os == OsFamily::Windows
    }

    /// Executable suffix for this OS
    pub fn exe_suffix(&self) -> &'static str {
        if self.is_windows() {
            ".exe"
        } else {
            ""
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)?;
        if self.sandboxed {
            write!(f, " (sandboxed)")?;
        }
        Ok(())
    }
}
