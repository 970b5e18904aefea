//! Bundled helper payload extraction for non-sandboxed platforms.
//!
//! The distributable ships `goecs-<os>-<arch>[.exe]` next to the binary
//! (optionally with a `.sha256` sidecar). At run start it is copied into a
//! private temp directory that the run owns and removes afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::error::{LocatorError, Strategy, StrategyAttempt};
use crate::platform::Platform;

/// Name of the extracted helper inside the private directory
pub const EXTRACTED_NAME: &str = "goecs";

/// Where to look for the payload and where to put it
#[derive(Debug, Clone)]
pub struct BundleSource {
    pub dirs: Vec<PathBuf>,
    pub verify_checksum: bool,
    pub temp_root: PathBuf,
}

impl BundleSource {
    /// Payload file name for a platform (`goecs-linux-amd64`)
    pub fn payload_name(platform: &Platform) -> String {
        format!(
            "goecs-{}-{}{}",
            platform.os.payload_name(),
            platform.arch.payload_name(),
            platform.exe_suffix()
        )
    }

    /// Find the payload; records every path checked into `attempt`
    pub fn find(&self, platform: &Platform, attempt: &mut StrategyAttempt) -> Option<PathBuf> {
        let name = Self::payload_name(platform);
        for dir in &self.dirs {
            let candidate = dir.join(&name);
            attempt.checked.push(candidate.clone());
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Copy the payload into `<temp_root>/hostprobe-<uuid>/` with mode 0755.
    ///
    /// Returns the extracted file and the directory that owns it.
    pub fn extract(&self, payload: &Path, platform: &Platform) -> Result<(PathBuf, PathBuf), LocatorError> {
        let bytes = fs::read(payload).map_err(|source| LocatorError::ExtractFailed {
            path: payload.to_path_buf(),
            source,
        })?;

        if self.verify_checksum {
            verify_sidecar(payload, &bytes)?;
        }

        let dir = self
            .temp_root
            .join(format!("hostprobe-{}", uuid::Uuid::new_v4().simple()));
        let target = dir.join(format!("{}{}", EXTRACTED_NAME, platform.exe_suffix()));

        let write = || -> std::io::Result<()> {
            fs::create_dir_all(&dir)?;
            fs::write(&target, &bytes)?;
            make_executable(&target)
        };
        if let Err(source) = write() {
            let _ = fs::remove_dir_all(&dir);
            return Err(LocatorError::ExtractFailed {
                path: target,
                source,
            });
        }

        info!(
            payload = %payload.display(),
            target = %target.display(),
            bytes = bytes.len(),
            "Helper extracted"
        );
        Ok((target, dir))
    }

    /// Attempt record for a missing payload
    pub fn missing(attempt: StrategyAttempt, platform: &Platform) -> StrategyAttempt {
        attempt.with_note(format!("{} not found", Self::payload_name(platform)))
    }
}

impl Default for BundleSource {
    fn default() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        let dirs = exe_dir
            .map(|d| vec![d.join("helpers"), d])
            .unwrap_or_default();
        Self {
            dirs,
            verify_checksum: false,
            temp_root: std::env::temp_dir(),
        }
    }
}

/// Strategy record for the bundled payload
pub fn attempt() -> StrategyAttempt {
    StrategyAttempt::new(Strategy::BundledPayload)
}

fn verify_sidecar(payload: &Path, bytes: &[u8]) -> Result<(), LocatorError> {
    let mut sidecar = payload.as_os_str().to_owned();
    sidecar.push(".sha256");
    let sidecar = PathBuf::from(sidecar);

    let expected = fs::read_to_string(&sidecar).map_err(|source| LocatorError::ExtractFailed {
        path: sidecar.clone(),
        source,
    })?;
    // sha256sum format: "<hex>  <file>"
    let expected = expected
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();
    let actual = hex::encode(Sha256::digest(bytes));

    if expected != actual {
        return Err(LocatorError::ChecksumMismatch {
            path: payload.to_path_buf(),
            expected,
            actual,
        });
    }
    debug!(payload = %payload.display(), "Payload checksum verified");
    Ok(())
}

/// Set mode 0755 where the OS has permission bits
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn linux() -> Platform {
        Platform::from_parts("linux", "x86_64", false)
    }

    fn source(tmp: &TempDir, verify: bool) -> BundleSource {
        BundleSource {
            dirs: vec![tmp.path().join("missing"), tmp.path().join("bundle")],
            verify_checksum: verify,
            temp_root: tmp.path().join("tmp"),
        }
    }

    fn write_payload(tmp: &TempDir, content: &[u8]) -> PathBuf {
        let dir = tmp.path().join("bundle");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(BundleSource::payload_name(&linux()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_payload_name() {
        assert_eq!(BundleSource::payload_name(&linux()), "goecs-linux-amd64");
        let win = Platform::from_parts("windows", "aarch64", false);
        assert_eq!(BundleSource::payload_name(&win), "goecs-windows-arm64.exe");
    }

    #[test]
    fn test_find_records_checked_paths() {
        let tmp = TempDir::new().unwrap();
        let payload = write_payload(&tmp, b"binary");
        let src = source(&tmp, false);

        let mut attempt = attempt();
        let found = src.find(&linux(), &mut attempt).unwrap();
        assert_eq!(found, payload);
        assert_eq!(attempt.checked.len(), 2);
    }

    #[test]
    fn test_extract_into_private_dir() {
        let tmp = TempDir::new().unwrap();
        let payload = write_payload(&tmp, b"binary");
        let src = source(&tmp, false);

        let (target, dir) = src.extract(&payload, &linux()).unwrap();
        assert!(target.starts_with(&dir));
        assert!(dir.starts_with(tmp.path().join("tmp")));
        assert_eq!(fs::read(&target).unwrap(), b"binary");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&target).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_checksum_verified() {
        let tmp = TempDir::new().unwrap();
        let payload = write_payload(&tmp, b"binary");
        let digest = hex::encode(Sha256::digest(b"binary"));
        fs::write(
            format!("{}.sha256", payload.display()),
            format!("{}  goecs-linux-amd64\n", digest),
        )
        .unwrap();

        let src = source(&tmp, true);
        assert!(src.extract(&payload, &linux()).is_ok());
    }

    #[test]
    fn test_checksum_mismatch() {
        let tmp = TempDir::new().unwrap();
        let payload = write_payload(&tmp, b"binary");
        fs::write(format!("{}.sha256", payload.display()), "00ff").unwrap();

        let src = source(&tmp, true);
        let err = src.extract(&payload, &linux()).unwrap_err();
        assert!(matches!(err, LocatorError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_unwritable_temp_root() {
        let tmp = TempDir::new().unwrap();
        let payload = write_payload(&tmp, b"binary");
        // A regular file where the temp root should be
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, b"").unwrap();

        let mut src = source(&tmp, false);
        src.temp_root = blocker;
        let err = src.extract(&payload, &linux()).unwrap_err();
        assert!(matches!(err, LocatorError::ExtractFailed { .. }));
    }
}
