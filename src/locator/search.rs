//! Native-library directory search used on sandboxed platforms.
//!
//! The same five strategies find both the helper and the sandbox shim; only
//! the file names differ. Each strategy yields candidate `lib` directories,
//! and every candidate is probed under each accepted ABI spelling before the
//! bare directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::error::{Strategy, StrategyAttempt};
use crate::platform::Arch;

/// How far to climb from the executable looking for a `lib` directory
pub const MAX_ASCEND_DEPTH: usize = 10;

/// How far to climb from a mapped module towards its `lib` root
const MAX_MODULE_ASCENT: usize = 3;

/// Filesystem roots consulted by the search.
///
/// Everything is injectable so the search can run against a temp dir.
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub lib_dir_override: Option<PathBuf>,
    pub exe_path: Option<PathBuf>,
    pub package_id: String,
    /// Per-app private data root (`/data/data`)
    pub data_root: PathBuf,
    /// Installed app root (`/data/app`)
    pub app_root: PathBuf,
    /// Loaded-module table (`/proc/self/maps`)
    pub maps_path: PathBuf,
    /// Only modules under this prefix are considered
    pub private_prefix: PathBuf,
    /// World-writable last-resort location
    pub fallback_dir: PathBuf,
}

impl SearchContext {
    /// Context for the live system
    pub fn system(package_id: &str) -> Self {
        Self {
            lib_dir_override: std::env::var_os("HOSTPROBE_LIB_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            exe_path: std::env::current_exe().ok(),
            package_id: package_id.to_string(),
            data_root: PathBuf::from("/data/data"),
            app_root: PathBuf::from("/data/app"),
            maps_path: PathBuf::from("/proc/self/maps"),
            private_prefix: PathBuf::from("/data/"),
            fallback_dir: PathBuf::from("/data/local/tmp"),
        }
    }

    /// Private data directory of the package, if it exists
    pub fn package_data_dir(&self) -> Option<PathBuf> {
        let dir = self.data_root.join(&self.package_id);
        dir.is_dir().then_some(dir)
    }
}

/// Outcome of a search
pub enum SearchResult {
    Found {
        path: PathBuf,
        strategy: Strategy,
        attempts: Vec<StrategyAttempt>,
    },
    Exhausted(Vec<StrategyAttempt>),
}

/// Run all strategies in order; first existing file wins.
pub fn search(ctx: &SearchContext, arch: Arch, names: &[&str]) -> SearchResult {
    let strategies: [(Strategy, fn(&SearchContext, &[&str]) -> Candidates); 5] = [
        (Strategy::LibDirOverride, lib_dir_override),
        (Strategy::ExecutableAncestors, executable_ancestors),
        (Strategy::KnownPaths, known_paths),
        (Strategy::AppRootScan, app_root_scan),
        (Strategy::LoadedModules, loaded_modules),
    ];

    let mut attempts = Vec::with_capacity(strategies.len());
    let mut seen = HashSet::new();

    for (strategy, candidates_fn) in strategies {
        let candidates = candidates_fn(ctx, names);
        let mut attempt = StrategyAttempt::new(strategy);
        attempt.note = candidates.note;

        for dir in &candidates.dirs {
            if !seen.insert(dir.clone()) {
                continue;
            }
            if let Some(found) = probe_dir(dir, arch, names, &mut attempt.checked) {
                debug!(strategy = %strategy, path = %found.display(), "Native artifact found");
                attempts.push(attempt);
                return SearchResult::Found {
                    path: found,
                    strategy,
                    attempts,
                };
            }
        }

        for file in &candidates.files {
            attempt.checked.push(file.clone());
            if file.is_file() {
                attempts.push(attempt);
                return SearchResult::Found {
                    path: file.clone(),
                    strategy,
                    attempts,
                };
            }
        }

        trace!(strategy = %strategy, checked = attempt.checked.len(), "Strategy exhausted");
        attempts.push(attempt);
    }

    SearchResult::Exhausted(attempts)
}

/// Probe `<dir>/<abi>/<name>` for each ABI spelling, then `<dir>/<name>`.
fn probe_dir(dir: &Path, arch: Arch, names: &[&str], checked: &mut Vec<PathBuf>) -> Option<PathBuf> {
    let subdirs = arch
        .abi_dirs()
        .iter()
        .map(|abi| dir.join(abi))
        .chain(std::iter::once(dir.to_path_buf()));

    for base in subdirs {
        for name in names {
            let candidate = base.join(name);
            checked.push(candidate.clone());
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

// ─────────────────────────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Candidates {
    dirs: Vec<PathBuf>,
    /// Exact file paths, probed after `dirs`
    files: Vec<PathBuf>,
    note: Option<String>,
}

impl Candidates {
    fn note(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Default::default()
        }
    }
}

fn lib_dir_override(ctx: &SearchContext, _names: &[&str]) -> Candidates {
    match &ctx.lib_dir_override {
        Some(dir) if dir.is_dir() => Candidates {
            dirs: vec![dir.clone()],
            ..Default::default()
        },
        Some(dir) => Candidates::note(format!("HOSTPROBE_LIB_DIR={} is not a directory", dir.display())),
        None => Candidates::note("HOSTPROBE_LIB_DIR not set"),
    }
}

fn executable_ancestors(ctx: &SearchContext, _names: &[&str]) -> Candidates {
    let Some(exe) = &ctx.exe_path else {
        return Candidates::note("executable path unknown");
    };

    let mut out = Candidates::default();
    for ancestor in exe.ancestors().skip(1).take(MAX_ASCEND_DEPTH) {
        if ancestor.parent().is_none() {
            break;
        }
        let lib = ancestor.join("lib");
        if is_non_empty_dir(&lib) {
            out.dirs.push(lib);
        }
    }
    if out.dirs.is_empty() {
        out.note = Some(format!("no non-empty lib directory above {}", exe.display()));
    }
    out
}

fn known_paths(ctx: &SearchContext, _names: &[&str]) -> Candidates {
    let pkg = &ctx.package_id;
    let mut dirs = vec![
        ctx.data_root.join(pkg).join("lib"),
        ctx.app_root.join(pkg).join("lib"),
    ];
    // Installers before Android 8 suffixed the package dir with -1 or -2
    for suffix in ["-1", "-2"] {
        dirs.push(ctx.app_root.join(format!("{}{}", pkg, suffix)).join("lib"));
    }
    Candidates {
        dirs,
        files: Vec::new(),
        note: None,
    }
}

fn app_root_scan(ctx: &SearchContext, _names: &[&str]) -> Candidates {
    let mut out = Candidates::default();
    let Ok(entries) = fs::read_dir(&ctx.app_root) else {
        out.note = Some(format!("cannot list {}", ctx.app_root.display()));
        return out;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.contains(&ctx.package_id) {
            out.dirs.push(path.join("lib"));
        } else if name.starts_with("~~") {
            // Android 11+ nests package dirs under a random ~~ prefix
            if let Ok(nested) = fs::read_dir(&path) {
                for inner in nested.flatten() {
                    if inner.file_name().to_string_lossy().contains(&ctx.package_id) {
                        out.dirs.push(inner.path().join("lib"));
                    }
                }
            }
        }
    }
    out.dirs.sort();
    if out.dirs.is_empty() {
        out.note = Some(format!("no entry matching {} in {}", ctx.package_id, ctx.app_root.display()));
    }
    out
}

fn loaded_modules(ctx: &SearchContext, names: &[&str]) -> Candidates {
    let mut out = Candidates::default();
    match fs::read_to_string(&ctx.maps_path) {
        Ok(maps) => out.dirs = lib_roots_from_maps(&maps, &ctx.private_prefix),
        Err(_) => out.note = Some(format!("cannot read {}", ctx.maps_path.display())),
    }
    out.files = names.iter().map(|n| ctx.fallback_dir.join(n)).collect();
    out
}

/// Extract `lib` roots from a `/proc/<pid>/maps` dump
pub fn lib_roots_from_maps(maps: &str, private_prefix: &Path) -> Vec<PathBuf> {
    let prefix = private_prefix.to_string_lossy();
    let mut roots = Vec::new();

    for line in maps.lines() {
        if !line.contains(".so") || !line.contains(prefix.as_ref()) {
            continue;
        }
        let Some(module) = line.split_whitespace().nth(5) else {
            continue;
        };
        let mut dir = Path::new(module).parent();
        for _ in 0..MAX_MODULE_ASCENT {
            match dir {
                Some(d) if d.file_name().map_or(false, |n| n == "lib") => {
                    let root = d.to_path_buf();
                    if !roots.contains(&root) {
                        roots.push(root);
                    }
                    break;
                }
                Some(d) => dir = d.parent(),
                None => break,
            }
        }
    }
    roots
}

fn is_non_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PKG: &str = "com.example.probe";

    fn fake_ctx(root: &Path) -> SearchContext {
        SearchContext {
            lib_dir_override: None,
            exe_path: Some(root.join("bin").join("hostprobe")),
            package_id: PKG.to_string(),
            data_root: root.join("data"),
            app_root: root.join("app"),
            maps_path: root.join("maps"),
            private_prefix: root.to_path_buf(),
            fallback_dir: root.join("tmp"),
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"\x7fELF").unwrap();
    }

    #[test]
    fn test_abi_subdir_preferred_over_bare_root() {
        let tmp = TempDir::new().unwrap();
        let lib = tmp.path().join("lib");
        touch(&lib.join("libgoecs.so"));
        touch(&lib.join("arm64").join("libgoecs.so"));

        let mut checked = Vec::new();
        let found = probe_dir(&lib, Arch::Arm64, &["libgoecs.so"], &mut checked).unwrap();
        assert_eq!(found, lib.join("arm64").join("libgoecs.so"));
        assert_eq!(checked[0], lib.join("arm64-v8a").join("libgoecs.so"));
    }

    #[test]
    fn test_override_wins() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("custom");
        touch(&dir.join("x86_64").join("libgoecs.so"));

        let mut ctx = fake_ctx(tmp.path());
        ctx.lib_dir_override = Some(dir.clone());

        match search(&ctx, Arch::X86_64, &["libgoecs.so"]) {
            SearchResult::Found { path, strategy, .. } => {
                assert_eq!(strategy, Strategy::LibDirOverride);
                assert_eq!(path, dir.join("x86_64").join("libgoecs.so"));
            }
            SearchResult::Exhausted(_) => panic!("expected override hit"),
        }
    }

    #[test]
    fn test_hashed_install_dir_found_by_scan() {
        let tmp = TempDir::new().unwrap();
        let lib = tmp
            .path()
            .join("app")
            .join("~~AbC==")
            .join(format!("{}-XyZ==", PKG))
            .join("lib");
        touch(&lib.join("arm64").join("libgoecs.so"));

        let ctx = fake_ctx(tmp.path());
        match search(&ctx, Arch::Arm64, &["libgoecs.so"]) {
            SearchResult::Found { strategy, path, .. } => {
                assert_eq!(strategy, Strategy::AppRootScan);
                assert!(path.starts_with(&lib));
            }
            SearchResult::Exhausted(_) => panic!("expected scan hit"),
        }
    }

    #[test]
    fn test_maps_walks_up_to_lib() {
        let maps = "\
7f00-7f01 r-xp 00000000 fd:00 123 /data/app/pkg-1/lib/arm64/libfoo.so
7f02-7f03 r--p 00000000 fd:00 124 /system/lib64/libc.so
7f04-7f05 r-xp 00000000 fd:00 125 /data/app/pkg-1/lib/arm64/libbar.so
";
        let roots = lib_roots_from_maps(maps, Path::new("/data/"));
        assert_eq!(roots, vec![PathBuf::from("/data/app/pkg-1/lib")]);
    }

    #[test]
    fn test_maps_ignores_short_lines() {
        let roots = lib_roots_from_maps("garbage .so /data/\n", Path::new("/data/"));
        assert!(roots.is_empty());
    }

    #[test]
    fn test_exhausted_records_every_strategy() {
        let tmp = TempDir::new().unwrap();
        let ctx = fake_ctx(tmp.path());

        match search(&ctx, Arch::Arm64, &["libgoecs.so"]) {
            SearchResult::Exhausted(attempts) => {
                assert_eq!(attempts.len(), 5);
                let known = attempts
                    .iter()
                    .find(|a| a.strategy == Strategy::KnownPaths)
                    .unwrap();
                assert!(known
                    .checked
                    .contains(&tmp.path().join("data").join(PKG).join("lib").join("arm64-v8a").join("libgoecs.so")));
                let last = attempts.last().unwrap();
                assert_eq!(last.checked.last().unwrap(), &ctx.fallback_dir.join("libgoecs.so"));
            }
            SearchResult::Found { path, .. } => panic!("unexpected hit at {}", path.display()),
        }
    }
}
