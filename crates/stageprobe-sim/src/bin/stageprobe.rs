//! Staging-path index collision probe.
//!
//! Usage: cargo run --release --package stageprobe-sim --bin stageprobe -- [--preset sm120-reduce]
//!
//! Exit status: 0 when neither offset space has a collision, 1 when at least
//! one collision was found, 2 when the probe itself failed.

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use stageprobe_core::{
    analyze, write_report, KernelPreset, PartitionScheme, ProbeConfig, TiledPartition, Verdict,
    DEFAULT_CAPACITY, DEFAULT_MAX_EXAMPLES,
};
use stageprobe_sim::{simulate_cpu, Simulation};
use tracing::{info, warn};

const FATAL_EXIT_CODE: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Simulate lanes as rayon tasks
    Cpu,
    /// Simulate lanes on a CUDA device (requires the `cuda` feature)
    Cuda,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Staging-path index collision probe")]
struct Args {
    /// Kernel binding whose staging path is replayed
    #[arg(long, default_value_t = KernelPreset::Sm120Reduce)]
    preset: KernelPreset,

    /// Maximum access records kept per lane
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Example accesses printed per colliding offset
    #[arg(long, default_value_t = DEFAULT_MAX_EXAMPLES)]
    max_examples: usize,

    /// Where lanes are simulated
    #[arg(long, value_enum, default_value_t = Backend::Cpu)]
    backend: Backend,

    /// CUDA device ordinal
    #[arg(long, default_value_t = 0)]
    device: usize,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(&args) {
        Ok(verdict) => ExitCode::from(verdict.exit_code()),
        Err(err) => {
            eprintln!("fatal: {:#}", err);
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<Verdict> {
    let config = ProbeConfig {
        preset: args.preset,
        capacity: args.capacity,
        max_examples: args.max_examples,
    };
    let geometry = config
        .geometry()
        .context("invalid probe configuration")?;
    let partition = geometry
        .partition()
        .context("failed to resolve lane partition")?;

    info!(
        preset = %config.preset,
        backend = ?args.backend,
        lanes = partition.launch_lanes(),
        active = partition.active_lanes(),
        elements_per_lane = partition.lane_elements(0),
        capacity = config.capacity,
        "starting partition simulation"
    );

    let simulation = simulate(args, &partition, config.capacity)?;
    let timing = simulation.timing;
    info!(
        h2d_ms = timing.h2d_ns as f64 / 1_000_000.0,
        kernel_ms = timing.kernel_ns as f64 / 1_000_000.0,
        d2h_ms = timing.d2h_ns as f64 / 1_000_000.0,
        total_ms = timing.total_ns as f64 / 1_000_000.0,
        "simulation complete"
    );

    let report = analyze(&simulation.buffers, geometry.lanes_per_warp)
        .context("collision analysis failed")?;
    if report.truncated {
        warn!(
            lanes = report.truncated_lanes.len(),
            capacity = config.capacity,
            "per-lane capacity exceeded, report is incomplete"
        );
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let verdict = write_report(&report, &config.report_options(), &mut out)
        .context("failed to write collision report")?;
    out.flush().context("failed to flush collision report")?;
    Ok(verdict)
}

fn simulate(args: &Args, partition: &TiledPartition<'_>, capacity: usize) -> Result<Simulation> {
    match args.backend {
        Backend::Cpu => simulate_cpu(partition, capacity).context("CPU lane launch failed"),
        Backend::Cuda => simulate_cuda(args.device, partition, capacity),
    }
}

#[cfg(feature = "cuda")]
fn simulate_cuda(
    device: usize,
    partition: &TiledPartition<'_>,
    capacity: usize,
) -> Result<Simulation> {
    let simulator = stageprobe_sim::GpuSimulator::new(device)
        .with_context(|| format!("failed to initialise CUDA device {}", device))?;
    simulator
        .simulate(partition, capacity)
        .context("CUDA partition simulation failed")
}

#[cfg(not(feature = "cuda"))]
fn simulate_cuda(
    _device: usize,
    _partition: &TiledPartition<'_>,
    _capacity: usize,
) -> Result<Simulation> {
    anyhow::bail!("the cuda backend needs stageprobe-sim built with `--features cuda`")
}
