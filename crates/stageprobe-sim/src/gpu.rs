//! CUDA lane launcher for the partition simulation.
//!
//! The host resolves the tiled copy's thread and value coordinate tables once;
//! the kernel in `cuda/partition_sim.cu` then evaluates the same partition and
//! visitation rules as `simulate_cpu`, one CUDA thread per lane.

use stageprobe_core::{TiledPartition, Visitation, COORD_COMPONENTS};

use crate::error::SimError;

#[cfg(feature = "cuda")]
use crate::simulator::{SimTiming, Simulation};
#[cfg(feature = "cuda")]
use cudarc::driver::{CudaDevice, CudaFunction, LaunchAsync, LaunchConfig};
#[cfg(feature = "cuda")]
use stageprobe_core::{LaneBuffers, PartitionScheme};
#[cfg(feature = "cuda")]
use std::sync::Arc;

/// Highest tile rank the kernel's fixed-size arrays hold.
pub const MAX_RANK: usize = 4;

/// Lanes per CUDA block.
pub const BLOCK_LANES: usize = 128;

#[cfg(feature = "cuda")]
const MODULE_NAME: &str = "partition_sim";
#[cfg(feature = "cuda")]
const KERNEL_NAME: &str = "partition_sim_kernel";

const VISIT_SEQUENTIAL: i32 = 0;
const VISIT_WARP_STRIDED: i32 = 1;

/// Geometry block uploaded to the device.
/// Matches `struct ProbeGeometry` in partition_sim.cu.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProbeGeometryGpu {
    pub rank: i32,
    pub lanes_per_warp: i32,
    pub launch_lanes: i32,
    pub active_lanes: i32,
    pub visitation: i32,
    pub capacity: i32,
    pub values_per_thread: i32,
    pub _pad: i32,
    pub src_base: i64,
    pub dst_base: i64,
    pub tile_extent: [i32; MAX_RANK],
    pub val_shape: [i32; MAX_RANK],
    pub rest_shape: [i32; MAX_RANK],
    pub src_stride: [i64; MAX_RANK],
    pub dst_stride: [i64; MAX_RANK],
}

fn to_i32(field: &'static str, value: usize) -> Result<i32, SimError> {
    i32::try_from(value).map_err(|_| SimError::ValueOutOfRange {
        field,
        value: value as i128,
    })
}

fn fill_i32(field: &'static str, values: &[usize]) -> Result<[i32; MAX_RANK], SimError> {
    let mut out = [0i32; MAX_RANK];
    for (slot, &v) in out.iter_mut().zip(values) {
        *slot = to_i32(field, v)?;
    }
    Ok(out)
}

fn fill_i64(values: &[i64]) -> [i64; MAX_RANK] {
    let mut out = [0i64; MAX_RANK];
    for (slot, &v) in out.iter_mut().zip(values) {
        *slot = v;
    }
    out
}

impl ProbeGeometryGpu {
    pub fn from_partition(partition: &TiledPartition<'_>, capacity: usize) -> Result<Self, SimError> {
        let geometry = partition.geometry();
        let rank = geometry.tile_shape.len();
        if rank > MAX_RANK {
            return Err(SimError::RankTooLarge {
                rank,
                max: MAX_RANK,
            });
        }
        let slots = geometry.launch_lanes() as u128 * capacity as u128;
        if slots * COORD_COMPONENTS as u128 > i32::MAX as u128 {
            return Err(SimError::ValueOutOfRange {
                field: "lanes * capacity",
                value: slots as i128,
            });
        }

        Ok(Self {
            rank: rank as i32,
            lanes_per_warp: to_i32("lanes_per_warp", geometry.lanes_per_warp)?,
            launch_lanes: to_i32("launch_lanes", geometry.launch_lanes())?,
            active_lanes: to_i32("active_lanes", partition.thread_coords().len())?,
            visitation: match geometry.visitation {
                Visitation::Sequential => VISIT_SEQUENTIAL,
                Visitation::WarpStrided => VISIT_WARP_STRIDED,
            },
            capacity: to_i32("capacity", capacity)?,
            values_per_thread: to_i32("values_per_thread", partition.value_coords().len())?,
            _pad: 0,
            src_base: geometry.src_base,
            dst_base: geometry.dst_base,
            tile_extent: fill_i32("tile_extent", partition.tile_extent())?,
            val_shape: fill_i32("val_shape", geometry.tiled_copy.val_layout().shape())?,
            rest_shape: fill_i32("rest_shape", partition.rest_shape())?,
            src_stride: fill_i64(geometry.src_layout.stride()),
            dst_stride: fill_i64(geometry.dst_layout.stride()),
        })
    }
}

/// Coordinate tables flattened to `MAX_RANK` entries per row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinateTables {
    pub thread: Vec<i32>,
    pub value: Vec<i32>,
}

impl CoordinateTables {
    pub fn from_partition(partition: &TiledPartition<'_>) -> Result<Self, SimError> {
        let flatten = |field, rows: &[Vec<usize>]| -> Result<Vec<i32>, SimError> {
            let mut out = Vec::with_capacity(rows.len() * MAX_RANK);
            for row in rows {
                out.extend_from_slice(&fill_i32(field, row)?);
            }
            Ok(out)
        };
        Ok(Self {
            thread: flatten("thread_coords", partition.thread_coords())?,
            value: flatten("value_coords", partition.value_coords())?,
        })
    }
}

/// Owns the CUDA device and the loaded simulation kernel.
#[cfg(feature = "cuda")]
pub struct GpuSimulator {
    pub device: Arc<CudaDevice>,
    kernel: CudaFunction,
}

#[cfg(feature = "cuda")]
impl GpuSimulator {
    /// Open device `device_ord` and load the PTX compiled by build.rs.
    pub fn new(device_ord: usize) -> Result<Self, SimError> {
        let device = CudaDevice::new(device_ord)?;

        let ptx_path = concat!(env!("OUT_DIR"), "/partition_sim.ptx");
        let ptx = std::fs::read_to_string(ptx_path)
            .map_err(|e| SimError::KernelUnavailable(format!("{}: {}", ptx_path, e)))?;
        device.load_ptx(ptx.into(), MODULE_NAME, &[KERNEL_NAME])?;
        let kernel = device
            .get_func(MODULE_NAME, KERNEL_NAME)
            .ok_or_else(|| SimError::KernelUnavailable(format!("{} not in module", KERNEL_NAME)))?;

        Ok(Self { device, kernel })
    }

    /// Launch one CUDA thread per lane and copy the lane buffers back.
    pub fn simulate(
        &self,
        partition: &TiledPartition<'_>,
        capacity: usize,
    ) -> Result<Simulation, SimError> {
        if capacity == 0 {
            return Err(SimError::InvalidCapacity { capacity });
        }
        let total_start = std::time::Instant::now();
        let geometry = ProbeGeometryGpu::from_partition(partition, capacity)?;
        let tables = CoordinateTables::from_partition(partition)?;
        let lanes = partition.launch_lanes();
        let slots = lanes * capacity;

        let h2d_start = std::time::Instant::now();
        let geometry_buf = self.device.htod_sync_copy(bytemuck::bytes_of(&geometry))?;
        let thread_buf = self.device.htod_sync_copy(&tables.thread)?;
        let value_buf = self.device.htod_sync_copy(&tables.value)?;
        // Every slot starts absent; the kernel only touches what it visits.
        let mut counts_buf = self.device.htod_sync_copy(&vec![-1i32; lanes])?;
        let mut valid_buf = self.device.alloc_zeros::<u8>(slots)?;
        let mut src_buf = self.device.htod_sync_copy(&vec![-1i64; slots])?;
        let mut dst_buf = self.device.htod_sync_copy(&vec![-1i64; slots])?;
        let mut coords_buf = self
            .device
            .htod_sync_copy(&vec![-1i32; slots * COORD_COMPONENTS])?;
        let h2d_ns = h2d_start.elapsed().as_nanos() as u64;

        let cfg = LaunchConfig {
            grid_dim: (lanes.div_ceil(BLOCK_LANES) as u32, 1, 1),
            block_dim: (BLOCK_LANES as u32, 1, 1),
            shared_mem_bytes: 0,
        };
        let params = (
            &geometry_buf,
            &thread_buf,
            &value_buf,
            &mut counts_buf,
            &mut valid_buf,
            &mut src_buf,
            &mut dst_buf,
            &mut coords_buf,
        );
        let kernel_start = std::time::Instant::now();
        // SAFETY: argument order and element types match partition_sim_kernel,
        // and every output buffer holds lanes * capacity slots.
        unsafe { self.kernel.clone().launch(cfg, params) }?;
        self.device.synchronize()?;
        let kernel_ns = kernel_start.elapsed().as_nanos() as u64;

        let d2h_start = std::time::Instant::now();
        let counts = self.device.dtoh_sync_copy(&counts_buf)?;
        let valid = self.device.dtoh_sync_copy(&valid_buf)?;
        let src = self.device.dtoh_sync_copy(&src_buf)?;
        let dst = self.device.dtoh_sync_copy(&dst_buf)?;
        let coords = self.device.dtoh_sync_copy(&coords_buf)?;
        let d2h_ns = d2h_start.elapsed().as_nanos() as u64;

        let buffers =
            LaneBuffers::from_device_arrays(capacity, &counts, &valid, &src, &dst, &coords)?;
        let total_ns = total_start.elapsed().as_nanos() as u64;
        tracing::debug!(lanes, capacity, h2d_ns, kernel_ns, d2h_ns, "cuda lane launch finished");

        Ok(Simulation {
            buffers,
            timing: SimTiming {
                h2d_ns,
                kernel_ns,
                d2h_ns,
                total_ns,
            },
        })
    }
}
