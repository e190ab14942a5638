// deltasim — CLI harness for the delta-cycle simulation kernel
//
// Builds a toy design (or loads one from a TOML harness config), drives it
// for a number of steps, optionally writes a VCD trace, and prints a
// one-line summary. Exists purely to exercise the kernel end to end by hand;
// the kernel's own correctness is covered by the crate's test suite.

use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use deltasim::{CountingSink, Design, Engine, HarnessConfig, MemoryDescriptor, SignalDescriptor, VcdTraceSink};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deltasim", version, about = "Delta-cycle simulation kernel harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v, -vv). Overridden by RUST_LOG if set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a design and drive the kernel forward.
    Run {
        /// Path to a TOML harness config. Falls back to a small built-in toy design.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the number of advance() calls to run.
        #[arg(long)]
        steps: Option<u32>,
        /// Override the VCD output path.
        #[arg(long)]
        vcd: Option<PathBuf>,
    },
}

fn install_logging(verbose: u8) {
    let default_directive = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build the toy `Design` a [`HarnessConfig`] describes, returning the
/// design plus the `SignalId` each configured clock should drive.
fn build_design(config: &HarnessConfig) -> anyhow::Result<(Design, Vec<(deltasim::SignalId, u64, u64, bool)>)> {
    let mut design = Design::new();
    let mut signal_ids = std::collections::HashMap::new();

    for sig in &config.signals {
        let id = design.add_signal(SignalDescriptor { name: sig.name.clone(), width: sig.width, init: sig.init });
        signal_ids.insert(sig.name.clone(), id);
    }
    for mem in &config.memories {
        design.add_memory(MemoryDescriptor {
            name: mem.name.clone(),
            width: mem.width,
            depth: mem.depth,
            init: mem.init.clone(),
        });
    }

    let mut clocks = Vec::new();
    for clock in &config.clocks {
        let id = *signal_ids
            .get(&clock.signal)
            .with_context(|| format!("clock references undeclared signal '{}'", clock.signal))?;
        clocks.push((id, clock.phase, clock.period, clock.passive));
    }

    Ok((design, clocks))
}

fn run(config: Option<PathBuf>, steps_override: Option<u32>, vcd_override: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => HarnessConfig::load(&path)?,
        None => HarnessConfig::default(),
    };
    let steps = steps_override.unwrap_or(config.steps);
    let vcd_path = vcd_override.or_else(|| config.vcd.clone().map(PathBuf::from));

    let (design, clocks) = build_design(&config)?;
    let mut engine = Engine::new(&design);
    for (signal, phase, period, passive) in clocks {
        engine.add_clock_process(signal, phase, period, passive);
    }
    engine.reset();

    let counts = Arc::new(Mutex::new(CountingSink::default()));
    engine.attach_sink(Box::new(counts.clone()));

    let mut advances = 0u32;
    let mut vcd_guard = match &vcd_path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating VCD output {}", path.display()))?;
            let sink = VcdTraceSink::new(&design, file, &design_signal_ids(&design), &design_memory_ids(&design))
                .with_context(|| format!("building VCD sink for {}", path.display()))?;
            Some(engine.attach_scoped(Box::new(sink)))
        }
        None => None,
    };
    let engine_ref: &mut Engine = match &mut vcd_guard {
        Some(guard) => &mut *guard,
        None => &mut engine,
    };

    for _ in 0..steps {
        advances += 1;
        if !engine_ref.advance() {
            info!(now = engine_ref.now(), advances, "simulation went idle, stopping early");
            break;
        }
    }
    drop(vcd_guard);

    let counts = *counts.lock().expect("counting sink mutex poisoned");
    info!(
        now = engine.now(),
        advances,
        signal_changes = counts.signal_updates,
        memory_changes = counts.memory_updates,
        "run complete"
    );
    println!(
        "now={} advances={} signal_changes={} memory_changes={}",
        engine.now(),
        advances,
        counts.signal_updates,
        counts.memory_updates
    );

    Ok(())
}

fn design_signal_ids(design: &Design) -> Vec<deltasim::SignalId> {
    design.signals().map(|(id, _)| id).collect()
}

fn design_memory_ids(design: &Design) -> Vec<deltasim::MemoryId> {
    design.memories().map(|(id, _)| id).collect()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    install_logging(cli.verbose);

    match cli.command {
        Commands::Run { config, steps, vcd } => run(config, steps, vcd),
    }
}
