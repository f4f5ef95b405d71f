//! Partition simulator for the staging-path race probe.
//!
//! Replays, lane by lane, the address computation a kernel's staging copy
//! performs and records every visited slot into `LaneBuffers` for host-side
//! collision analysis.
//!
//! # Backends
//!
//! - `simulate_cpu` launches every lane as a rayon task and is always built.
//! - `GpuSimulator` (feature `cuda`) runs the same partition on the device
//!   from PTX compiled by build.rs, one CUDA thread per lane.

#[cfg(feature = "cuda")]
pub extern crate cudarc;

pub mod error;
pub mod gpu;
pub mod simulator;

pub use error::SimError;
#[cfg(feature = "cuda")]
pub use gpu::GpuSimulator;
pub use gpu::{CoordinateTables, ProbeGeometryGpu};
pub use simulator::{simulate_cpu, SimTiming, Simulation};
