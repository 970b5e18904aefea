//! Numbered selection presets
//!
//! `hostprobe run --preset N` picks one of these instead of an explicit
//! `--tests` list. A preset may also adjust run options.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::orchestrator::{Nt3Location, RunConfig, TestKind, TestSelection};

use TestKind::*;

/// A named selection
#[derive(Debug, Clone, Serialize)]
pub struct Preset {
    pub number: u8,
    pub name: &'static str,
    pub tests: &'static [TestKind],
    /// Route test from every location instead of the configured one
    pub all_route_locations: bool,
}

impl Preset {
    pub fn selection(&self) -> TestSelection {
        self.tests.iter().copied().collect()
    }

    /// Apply the preset's own option overrides
    pub fn adjust(&self, config: &mut RunConfig) {
        if self.all_route_locations {
            config.nt3_location = Nt3Location::All;
        }
    }
}

const fn preset(number: u8, name: &'static str, tests: &'static [TestKind]) -> Preset {
    Preset {
        number,
        name,
        tests,
        all_route_locations: false,
    }
}

pub const PRESETS: [Preset; 10] = [
    preset(
        1,
        "full",
        &[Basic, Cpu, Memory, Disk, Comm, Unlock, Security, Email, Backtrace, Nt3, Speed],
    ),
    preset(2, "minimal", &[Basic, Cpu, Memory, Disk, Speed]),
    preset(3, "standard", &[Basic, Cpu, Memory, Disk, Unlock, Nt3, Speed]),
    preset(4, "network-focused", &[Basic, Cpu, Memory, Disk, Backtrace, Nt3, Speed]),
    preset(5, "unlock-focused", &[Basic, Cpu, Memory, Disk, Comm, Unlock, Speed]),
    preset(6, "network-only", &[Security, Speed, Backtrace, Nt3, Ping]),
    preset(7, "unlock-only", &[Comm, Unlock]),
    preset(8, "hardware-only", &[Basic, Cpu, Memory, Disk]),
    preset(9, "ip-quality", &[Security, Email]),
    Preset {
        number: 10,
        name: "route",
        tests: &[Backtrace, Nt3, Ping],
        all_route_locations: true,
    },
];

/// Look up a preset by number
pub fn find(number: u8) -> Result<&'static Preset> {
    PRESETS.iter().find(|p| p.number == number).ok_or_else(|| {
        Error::config_field_invalid(
            "selection.preset",
            format!("no preset {}; run 'hostprobe presets' to list them", number),
        )
    })
}

/// Selection used when neither a preset nor a list is given
pub fn default_selection() -> TestSelection {
    [Basic, Cpu, Memory, Disk].into_iter().collect()
}
