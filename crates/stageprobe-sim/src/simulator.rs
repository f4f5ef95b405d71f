//! CPU lane launcher for the partition simulation.
//!
//! Every lane runs as an independent rayon task and writes only into its own
//! `LaneSlot`, which `LaneBuffers::lane_slots_mut` carves out before the launch.
//! The parallel iterator returning is the join point; nothing is read before.

use rayon::prelude::*;
use stageprobe_core::{GeometryError, LaneBuffers, LaneId, LaneSlot, PartitionScheme};

use crate::error::SimError;

/// Wall-clock breakdown of one simulation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimTiming {
    pub h2d_ns: u64,
    pub kernel_ns: u64,
    pub d2h_ns: u64,
    pub total_ns: u64,
}

/// Output of one simulation pass.
#[derive(Clone, Debug)]
pub struct Simulation {
    pub buffers: LaneBuffers,
    pub timing: SimTiming,
}

/// Run every lane of `scheme` in parallel and record up to `capacity`
/// accesses per lane.
pub fn simulate_cpu<P>(scheme: &P, capacity: usize) -> Result<Simulation, SimError>
where
    P: PartitionScheme + ?Sized,
{
    if capacity == 0 {
        return Err(SimError::InvalidCapacity { capacity });
    }
    check_lanes(scheme)?;

    let start = std::time::Instant::now();
    let mut buffers = LaneBuffers::new(scheme.launch_lanes(), capacity);
    let slots: Vec<LaneSlot<'_>> = buffers.lane_slots_mut().collect();
    slots
        .into_par_iter()
        .for_each(|slot| run_lane(scheme, slot));

    let kernel_ns = start.elapsed().as_nanos() as u64;
    tracing::debug!(
        lanes = scheme.launch_lanes(),
        active = scheme.active_lanes(),
        capacity,
        kernel_ns,
        "cpu lane launch finished"
    );

    Ok(Simulation {
        buffers,
        timing: SimTiming {
            kernel_ns,
            total_ns: kernel_ns,
            ..SimTiming::default()
        },
    })
}

/// Lane-count preconditions a scheme must meet before any lane runs.
fn check_lanes<P>(scheme: &P) -> Result<(), GeometryError>
where
    P: PartitionScheme + ?Sized,
{
    if scheme.lanes_per_warp() == 0 {
        return Err(GeometryError::ZeroLanes);
    }
    if scheme.active_lanes() > scheme.launch_lanes() {
        return Err(GeometryError::TooManyActiveLanes {
            active: scheme.active_lanes(),
            launched: scheme.launch_lanes(),
        });
    }
    Ok(())
}

/// Body of one simulated lane.
fn run_lane<P>(scheme: &P, mut slot: LaneSlot<'_>)
where
    P: PartitionScheme + ?Sized,
{
    let lane = slot.lane();
    if lane >= scheme.active_lanes() {
        return;
    }

    let elements = scheme.lane_elements(lane);
    slot.set_count(elements);

    let lanes_per_warp = scheme.lanes_per_warp();
    let lane_id = LaneId::from_flat(lane, lanes_per_warp);

    for i in scheme
        .visitation()
        .indices(lane_id, lanes_per_warp, elements, slot.capacity())
    {
        slot.record(i, scheme.element(lane, i));
    }
}
