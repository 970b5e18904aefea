//! Helper binary discovery
//!
//! `BinaryLocator::locate` returns a [`BinaryHandle`] for the helper program:
//! - sandboxed platforms: the helper ships as a native library
//!   (`libgoecs.so`) installed by the OS, found with the multi-strategy
//!   search in [`search`]. The OS owns the file.
//! - everything else: the bundled payload is extracted to a private temp
//!   directory. The handle owns it and removes it on cleanup.
//!
//! When nothing is found, the error lists every path that was checked.

pub mod bundle;
mod error;
pub mod search;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

pub use bundle::BundleSource;
pub use error::{LocatorError, Strategy, StrategyAttempt};
pub use search::{SearchContext, SearchResult};

use crate::config::HelperSettings;
use crate::platform::{Arch, Platform};

/// Helper file name inside native-library directories
pub const HELPER_LIBRARY_NAME: &str = "libgoecs.so";

// ─────────────────────────────────────────────────────────────────
// BinaryHandle
// ─────────────────────────────────────────────────────────────────

/// Resolved helper path plus lifecycle ownership.
///
/// Cleanup is idempotent: it runs at most once, whether called explicitly,
/// on drop, or both.
#[derive(Debug)]
pub struct BinaryHandle {
    path: PathBuf,
    owns_lifecycle: bool,
    /// Directory to remove on cleanup (owned handles only)
    owned_dir: Option<PathBuf>,
    found_by: Strategy,
    cleaned: AtomicBool,
}

impl BinaryHandle {
    /// A file whose lifetime is managed elsewhere
    pub fn borrowed(path: PathBuf, found_by: Strategy) -> Self {
        Self {
            path,
            owns_lifecycle: false,
            owned_dir: None,
            found_by,
            cleaned: AtomicBool::new(false),
        }
    }

    /// A file this process created inside `dir`
    pub fn owned(path: PathBuf, dir: PathBuf) -> Self {
        Self {
            path,
            owns_lifecycle: true,
            owned_dir: Some(dir),
            found_by: Strategy::BundledPayload,
            cleaned: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owns_lifecycle(&self) -> bool {
        self.owns_lifecycle
    }

    pub fn found_by(&self) -> Strategy {
        self.found_by
    }

    /// Best-effort removal of anything this process created
    pub fn cleanup(&self) {
        if !self.owns_lifecycle || self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }
        let target = self.owned_dir.as_deref().unwrap_or(&self.path);
        let result = if target.is_dir() {
            std::fs::remove_dir_all(target)
        } else {
            std::fs::remove_file(target)
        };
        match result {
            Ok(()) => debug!(path = %target.display(), "Helper artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %target.display(), error = %e, "Failed to remove helper artifact"),
        }
    }
}

impl Drop for BinaryHandle {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ─────────────────────────────────────────────────────────────────
// BinaryLocator
// ─────────────────────────────────────────────────────────────────

/// Finds or materializes the helper executable
#[derive(Debug, Clone)]
pub struct BinaryLocator {
    explicit_path: Option<PathBuf>,
    search: SearchContext,
    bundle: BundleSource,
}

impl BinaryLocator {
    pub fn new(explicit_path: Option<PathBuf>, search: SearchContext, bundle: BundleSource) -> Self {
        Self {
            explicit_path,
            search,
            bundle,
        }
    }

    /// Locator for the live system, configured from `[helper]`
    pub fn from_settings(settings: &HelperSettings) -> Self {
        let mut bundle = BundleSource::default();
        if let Some(dir) = &settings.bundle_dir {
            bundle.dirs.insert(0, PathBuf::from(dir));
        }
        bundle.verify_checksum = settings.verify_checksum;

        Self::new(
            settings.path.as_ref().map(PathBuf::from),
            SearchContext::system(&settings.package_id),
            bundle,
        )
    }

    pub fn search_context(&self) -> &SearchContext {
        &self.search
    }

    /// Resolve the helper for `platform`
    pub fn locate(&self, platform: &Platform) -> Result<BinaryHandle, LocatorError> {
        self.locate_with_report(platform).map(|(handle, _)| handle)
    }

    /// Like [`locate`](Self::locate), also returning the attempts made
    /// before the hit.
    pub fn locate_with_report(
        &self,
        platform: &Platform,
    ) -> Result<(BinaryHandle, Vec<StrategyAttempt>), LocatorError> {
        let mut attempts = Vec::new();

        if let Some(path) = &self.explicit_path {
            let mut attempt = StrategyAttempt::new(Strategy::ExplicitPath);
            attempt.checked.push(path.clone());
            if path.is_file() {
                info!(path = %path.display(), "Using explicit helper path");
                attempts.push(attempt);
                return Ok((BinaryHandle::borrowed(path.clone(), Strategy::ExplicitPath), attempts));
            }
            attempts.push(attempt.with_note("file does not exist"));
        }

        if platform.sandboxed {
            self.locate_installed(platform.arch, attempts)
        } else {
            self.extract_bundled(platform, attempts)
        }
    }

    fn locate_installed(
        &self,
        arch: Arch,
        mut attempts: Vec<StrategyAttempt>,
    ) -> Result<(BinaryHandle, Vec<StrategyAttempt>), LocatorError> {
        match search::search(&self.search, arch, &[HELPER_LIBRARY_NAME]) {
            SearchResult::Found {
                path,
                strategy,
                attempts: tried,
            } => {
                // Installed libraries are usually executable already
                if let Err(e) = bundle::make_executable(&path) {
                    debug!(path = %path.display(), error = %e, "chmod on installed helper failed");
                }
                info!(path = %path.display(), strategy = %strategy, "Helper located");
                attempts.extend(tried);
                Ok((BinaryHandle::borrowed(path, strategy), attempts))
            }
            SearchResult::Exhausted(tried) => {
                attempts.extend(tried);
                Err(LocatorError::NotFound {
                    arch,
                    attempts,
                    hint: remediation_hint(arch, HELPER_LIBRARY_NAME),
                })
            }
        }
    }

    fn extract_bundled(
        &self,
        platform: &Platform,
        mut attempts: Vec<StrategyAttempt>,
    ) -> Result<(BinaryHandle, Vec<StrategyAttempt>), LocatorError> {
        let mut attempt = bundle::attempt();
        let Some(payload) = self.bundle.find(platform, &mut attempt) else {
            attempts.push(BundleSource::missing(attempt, platform));
            return Err(LocatorError::NotFound {
                arch: platform.arch,
                attempts,
                hint: format!(
                    "Place {} in one of the directories above, or set HOSTPROBE_HELPER.",
                    BundleSource::payload_name(platform)
                ),
            });
        };
        attempts.push(attempt);

        let (path, dir) = self.bundle.extract(&payload, platform)?;
        Ok((BinaryHandle::owned(path, dir), attempts))
    }
}

/// Architecture-specific advice appended to `NotFound`
pub fn remediation_hint(arch: Arch, file_name: &str) -> String {
    format!(
        "Package {file} as jniLibs/{abi}/{file} (recommended ABI for {arch}: {abi}; \
         arm64-v8a or x86_64 cover most devices).",
        file = file_name,
        abi = arch.recommended_abi(),
        arch = arch,
    )
}

// ─────────────────────────────────────────────────────────────────
// Diagnostics report (`hostprobe locate`)
// ─────────────────────────────────────────────────────────────────

/// Serializable summary of a locate attempt
#[derive(Debug, Serialize)]
pub struct LocateReport {
    pub platform: Platform,
    pub helper: Option<PathBuf>,
    pub owns_lifecycle: bool,
    pub found_by: Option<Strategy>,
    pub error: Option<String>,
    pub attempts: Vec<StrategyAttempt>,
    pub shim: Option<PathBuf>,
}

impl LocateReport {
    /// Run the locator without keeping the helper around
    pub fn collect(locator: &BinaryLocator, platform: &Platform) -> Self {
        let mut report = Self {
            platform: *platform,
            helper: None,
            owns_lifecycle: false,
            found_by: None,
            error: None,
            attempts: Vec::new(),
            shim: None,
        };

        match locator.locate_with_report(platform) {
            Ok((handle, attempts)) => {
                report.helper = Some(handle.path().to_path_buf());
                report.owns_lifecycle = handle.owns_lifecycle();
                report.found_by = Some(handle.found_by());
                report.attempts = attempts;
                handle.cleanup();
            }
            Err(LocatorError::NotFound { attempts, hint, .. }) => {
                report.error = Some(hint);
                report.attempts = attempts;
            }
            Err(e) => report.error = Some(e.to_string()),
        }

        if platform.sandboxed {
            report.shim = crate::sandbox::locate_shim(locator.search_context(), platform.arch).ok();
        }
        report
    }
}
