//! Built-in CPU, memory and disk measurements
//!
//! Small stand-ins for the helper's tools, good enough to compare hosts.
//! Each function measures once and returns raw figures; rendering is done
//! by the caller.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};

/// Work limits for one run of the built-in probes
#[derive(Debug, Clone)]
pub struct ProbeBudget {
    /// Wall time per CPU measurement
    pub cpu_time: Duration,
    /// Buffer size for the memory pass
    pub memory_bytes: usize,
    /// File size for the disk pass
    pub disk_bytes: usize,
}

impl Default for ProbeBudget {
    fn default() -> Self {
        Self {
            cpu_time: Duration::from_secs(5),
            memory_bytes: 256 * 1024 * 1024,
            disk_bytes: 128 * 1024 * 1024,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// CPU
// ─────────────────────────────────────────────────────────────────

/// SHA-256 throughput over 4 KiB blocks
#[derive(Debug, Clone, Serialize)]
pub struct CpuResult {
    pub threads: usize,
    pub hashes: u64,
    pub elapsed: Duration,
}

impl CpuResult {
    /// Blocks hashed per second, all threads combined
    pub fn score(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (self.hashes as f64 / secs) as u64
    }
}

/// Hash on `threads` threads until `budget` elapses
pub fn cpu_hash(threads: usize, budget: Duration) -> CpuResult {
    let threads = threads.max(1);
    let start = Instant::now();

    let hashes: u64 = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(move || {
                    let block = [0x5au8; 4096];
                    let mut count: u64 = 0;
                    let deadline = Instant::now() + budget;
                    while Instant::now() < deadline {
                        for _ in 0..64 {
                            let mut hasher = Sha256::new();
                            hasher.update(block);
                            hasher.update(count.to_le_bytes());
                            std::hint::black_box(hasher.finalize());
                            count += 1;
                        }
                    }
                    count
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap_or(0)).sum()
    });

    let result = CpuResult {
        threads,
        hashes,
        elapsed: start.elapsed(),
    };
    debug!(threads, hashes, score = result.score(), "CPU pass finished");
    result
}

// ─────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────

/// Sequential bandwidth over one buffer
#[derive(Debug, Clone, Serialize)]
pub struct MemoryResult {
    pub bytes: usize,
    pub write_mbps: f64,
    pub read_mbps: f64,
    pub copy_mbps: Option<f64>,
}

impl MemoryResult {
    /// No usable figure came out of the pass
    pub fn is_empty(&self) -> bool {
        !(usable(self.write_mbps) || usable(self.read_mbps))
    }
}

fn usable(mbps: f64) -> bool {
    mbps.is_finite() && mbps > 0.0
}

fn mbps(bytes: usize, elapsed: Duration) -> f64 {
    bytes as f64 / (1024.0 * 1024.0) / elapsed.as_secs_f64()
}

/// Fill, sum and optionally copy a buffer of `bytes`
pub fn memory_bandwidth(bytes: usize, with_copy: bool) -> MemoryResult {
    let mut buffer: Vec<u8> = vec![0; bytes];

    let start = Instant::now();
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = (i & 0xFF) as u8;
    }
    let write_mbps = mbps(bytes, start.elapsed());

    let start = Instant::now();
    let mut checksum: u64 = 0;
    for byte in buffer.iter() {
        checksum = checksum.wrapping_add(*byte as u64);
    }
    std::hint::black_box(checksum);
    let read_mbps = mbps(bytes, start.elapsed());

    let copy_mbps = with_copy.then(|| {
        let mut target = vec![0u8; bytes];
        let start = Instant::now();
        target.copy_from_slice(&buffer);
        std::hint::black_box(&target);
        mbps(bytes, start.elapsed())
    });

    MemoryResult {
        bytes,
        write_mbps,
        read_mbps,
        copy_mbps,
    }
}

// ─────────────────────────────────────────────────────────────────
// Disk
// ─────────────────────────────────────────────────────────────────

/// Sequential file throughput
#[derive(Debug, Clone, Serialize)]
pub struct DiskResult {
    pub path: PathBuf,
    pub bytes: usize,
    pub block: usize,
    pub write_mbps: f64,
    pub read_mbps: f64,
}

impl DiskResult {
    pub fn is_empty(&self) -> bool {
        !(usable(self.write_mbps) || usable(self.read_mbps))
    }
}

/// Block size for the disk pass
pub const DISK_BLOCK: usize = 1024 * 1024;

/// Write then read back a scratch file of `bytes` in `dir`.
///
/// The scratch file is removed on every path.
pub fn disk_throughput(dir: &Path, bytes: usize) -> Result<DiskResult> {
    let path = dir.join(format!(".hostprobe-disk-{}", uuid::Uuid::new_v4().simple()));
    let result = measure_file(&path, bytes);
    let _ = fs::remove_file(&path);
    result
}

fn measure_file(path: &Path, bytes: usize) -> Result<DiskResult> {
    let blocks = bytes.div_ceil(DISK_BLOCK).max(1);
    let chunk = vec![0xA5u8; DISK_BLOCK];
    let write_err = |source| Error::IoWrite {
        path: path.to_path_buf(),
        source,
    };

    let start = Instant::now();
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(write_err)?;
    for _ in 0..blocks {
        file.write_all(&chunk).map_err(write_err)?;
    }
    file.sync_all().map_err(write_err)?;
    let write_mbps = mbps(blocks * DISK_BLOCK, start.elapsed());
    drop(file);

    let start = Instant::now();
    let mut file = File::open(path).map_err(|source| Error::IoRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut buf = vec![0u8; DISK_BLOCK];
    let mut total = 0usize;
    loop {
        let n = file.read(&mut buf).map_err(|source| Error::IoRead {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        total += n;
    }
    let read_mbps = mbps(total, start.elapsed());

    Ok(DiskResult {
        path: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        bytes: blocks * DISK_BLOCK,
        block: DISK_BLOCK,
        write_mbps,
        read_mbps,
    })
}
