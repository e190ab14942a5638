//! Declarative run configuration for the CLI harness, loaded from TOML.
//!
//! Not part of the kernel proper — `Engine`/`Design` take explicit
//! constructor arguments and know nothing about this type. It exists purely
//! so the harness binary has something other than hardcoded constants to
//! read.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

fn default_steps() -> u32 {
    100
}

fn default_width() -> u32 {
    1
}

/// Top-level harness configuration: the toy design to build and how long to
/// run it for.
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    /// Number of `Engine::advance()` calls to drive before stopping, even if
    /// the simulation is still live.
    #[serde(default = "default_steps")]
    pub steps: u32,
    /// Path to write a VCD trace to. If absent, no trace sink is attached.
    pub vcd: Option<String>,
    #[serde(default)]
    pub signals: Vec<SignalConfig>,
    #[serde(default)]
    pub memories: Vec<MemoryConfig>,
    #[serde(default)]
    pub clocks: Vec<ClockConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    pub name: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default)]
    pub init: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    pub name: String,
    #[serde(default = "default_width")]
    pub width: u32,
    pub depth: usize,
    #[serde(default)]
    pub init: Vec<u64>,
}

/// A clock driving one of the signals declared under `[[signals]]`, named by
/// signal name rather than `SignalId` since the config is built before the
/// `Design` exists.
#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    pub signal: String,
    pub period: u64,
    #[serde(default)]
    pub phase: u64,
    #[serde(default)]
    pub passive: bool,
}

impl Default for HarnessConfig {
    /// The toy design the CLI harness falls back to when no `--config` is
    /// given: a single free-running clock signal and a four-word scratch
    /// memory, enough to exercise advance/commit/trace end to end.
    fn default() -> Self {
        Self {
            steps: default_steps(),
            vcd: None,
            signals: vec![SignalConfig { name: "clk".to_string(), width: 1, init: 0 }],
            memories: vec![MemoryConfig { name: "scratch".to_string(), width: 8, depth: 4, init: Vec::new() }],
            clocks: vec![ClockConfig { signal: "clk".to_string(), period: 10, phase: 0, passive: false }],
        }
    }
}

impl HarnessConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading harness config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing harness config {}", path.display()))
    }
}
