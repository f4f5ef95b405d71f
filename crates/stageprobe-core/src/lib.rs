//! Geometry, collision analysis and reporting for the staging-path race probe.
//!
//! The probe replays how a kernel's staging copy assigns shared-memory and
//! private-buffer slots to lanes, then reports any slot that two lanes touch.
//! This crate holds everything that runs on the host; the lane launch itself
//! lives in `stageprobe-sim`.

mod collision;
mod config;
mod geometry;
mod layout;
mod record;
mod report;

pub use collision::{analyze, CollisionReport, HitDescriptor, HitMap};
pub use config::{ConfigError, KernelPreset, ProbeConfig, DEFAULT_CAPACITY, LANES_PER_WARP};
pub use geometry::{
    ElementAddress, GeometryError, PartitionScheme, StagingGeometry, TiledCopy, TiledPartition,
    Visitation,
};
pub use layout::{idx2crd, Layout, LayoutError};
pub use record::{
    pack_coord, AccessRecord, LaneBuffers, LaneId, LaneSlot, TransferError, COORD_COMPONENTS,
    COORD_PAD,
};
pub use report::{
    verdict, write_report, ReportOptions, Verdict, COLLISION_MARKER, DEFAULT_MAX_EXAMPLES,
};
