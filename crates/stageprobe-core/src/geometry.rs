//! Staging-path geometry and the per-lane partition it induces.
//!
//! A `StagingGeometry` describes one shared tile, the tiled copy that splits
//! it across lanes, and the two layouts (staging region and private buffer)
//! the copy reads from and writes to. `TiledPartition` evaluates the same
//! lane -> sub-tile assignment the staging kernel uses.

use crate::layout::{Layout, LayoutError};
use crate::record::{pack_coord, LaneId, COORD_COMPONENTS};

/// Error types for geometry validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    Layout {
        which: &'static str,
        source: LayoutError,
    },
    RankMismatch {
        which: &'static str,
        expected: usize,
        actual: usize,
    },
    TileNotDivisible {
        mode: usize,
        tile: usize,
        extent: usize,
    },
    ShapeMismatch {
        which: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    ZeroLanes,
    TooManyActiveLanes { active: usize, launched: usize },
}

impl std::fmt::Display for GeometryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Layout { which, source } => write!(f, "invalid {} layout: {}", which, source),
            Self::RankMismatch {
                which,
                expected,
                actual,
            } => write!(
                f,
                "{} has rank {}, expected rank {}",
                which, actual, expected
            ),
            Self::TileNotDivisible { mode, tile, extent } => write!(
                f,
                "tile mode {} (extent {}) is not divisible by the copy tile extent {}",
                mode, tile, extent
            ),
            Self::ShapeMismatch {
                which,
                expected,
                actual,
            } => write!(
                f,
                "{} layout has shape {:?}, expected tile shape {:?}",
                which, actual, expected
            ),
            Self::ZeroLanes => write!(f, "reduction warps and lanes per warp must be > 0"),
            Self::TooManyActiveLanes { active, launched } => write!(
                f,
                "tiled copy needs {} lanes but only {} are launched",
                active, launched
            ),
        }
    }
}

impl std::error::Error for GeometryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Layout { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Order in which a lane walks its sub-tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visitation {
    /// Every local index, in order.
    Sequential,
    /// The reduction stage: each lane's sub-tile is split again across the
    /// lanes of its warp. With `per_warp = elements / lanes_per_warp`, lane `l`
    /// of warp `w` visits `[w * per_warp + l, (w + 1) * per_warp)` with a
    /// stride of `lanes_per_warp`.
    WarpStrided,
}

impl Visitation {
    /// Local indices visited by `lane`, bounded by `elements` and `capacity`.
    pub fn indices(
        self,
        lane: LaneId,
        lanes_per_warp: usize,
        elements: usize,
        capacity: usize,
    ) -> impl Iterator<Item = usize> {
        let (start, end, step) = match self {
            Self::Sequential => (0, elements, 1),
            // no lanes to stride across, nothing to visit
            Self::WarpStrided if lanes_per_warp == 0 => (0, 0, 1),
            Self::WarpStrided => {
                let per_warp = elements / lanes_per_warp;
                let start = lane.warp * per_warp + lane.lane;
                let end = ((lane.warp + 1) * per_warp).min(elements);
                (start, end, lanes_per_warp)
            }
        };
        (start..end.max(start))
            .step_by(step)
            .take_while(move |&i| i < capacity)
    }
}

/// Thread/value decomposition of a tile copy.
///
/// `thr_layout` maps a thread coordinate to a thread id and `val_layout` maps a
/// value coordinate to the per-thread value index. Thread `(t_0, .., t_k)` owns
/// the val-shaped block starting at `t_k * val_shape_k` in every mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TiledCopy {
    thr_layout: Layout,
    val_layout: Layout,
}

impl TiledCopy {
    pub fn new(thr_layout: Layout, val_layout: Layout) -> Result<Self, GeometryError> {
        if thr_layout.rank() != val_layout.rank() {
            return Err(GeometryError::RankMismatch {
                which: "value layout",
                expected: thr_layout.rank(),
                actual: val_layout.rank(),
            });
        }
        thr_layout
            .coordinate_table()
            .map_err(|source| GeometryError::Layout {
                which: "thread",
                source,
            })?;
        val_layout
            .coordinate_table()
            .map_err(|source| GeometryError::Layout {
                which: "value",
                source,
            })?;
        Ok(Self {
            thr_layout,
            val_layout,
        })
    }

    pub fn thr_layout(&self) -> &Layout {
        &self.thr_layout
    }

    pub fn val_layout(&self) -> &Layout {
        &self.val_layout
    }

    pub fn rank(&self) -> usize {
        self.thr_layout.rank()
    }

    pub fn thread_count(&self) -> usize {
        self.thr_layout.size()
    }

    pub fn values_per_thread(&self) -> usize {
        self.val_layout.size()
    }

    /// Extent of one copy tile per mode.
    pub fn tile_extent(&self) -> Vec<usize> {
        self.thr_layout
            .shape()
            .iter()
            .zip(self.val_layout.shape())
            .map(|(t, v)| t * v)
            .collect()
    }
}

/// Address and logical coordinate of one element of a lane's sub-tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementAddress {
    pub src_offset: i64,
    pub dst_offset: i64,
    pub coord: [i64; COORD_COMPONENTS],
}

/// Lane -> sub-tile assignment consumed by the simulator.
pub trait PartitionScheme: Sync {
    /// Lanes launched (reduction warps x lanes per warp).
    fn launch_lanes(&self) -> usize;
    /// Lanes that take part in the copy; the rest do nothing.
    fn active_lanes(&self) -> usize;
    fn lanes_per_warp(&self) -> usize;
    fn visitation(&self) -> Visitation;
    /// Size of the sub-tile assigned to an active lane.
    fn lane_elements(&self, lane: usize) -> usize;
    /// Address of local element `index` of `lane`'s sub-tile.
    fn element(&self, lane: usize, index: usize) -> ElementAddress;
}

/// Full description of one staging path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingGeometry {
    pub tile_shape: Vec<usize>,
    pub tiled_copy: TiledCopy,
    /// Layout of the tile in the shared staging region.
    pub src_layout: Layout,
    pub src_base: i64,
    /// Layout of the tile in the private-buffer address space.
    pub dst_layout: Layout,
    pub dst_base: i64,
    pub reduction_warps: usize,
    pub lanes_per_warp: usize,
    pub visitation: Visitation,
}

impl StagingGeometry {
    pub fn launch_lanes(&self) -> usize {
        self.reduction_warps * self.lanes_per_warp
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        let rank = self.tiled_copy.rank();
        if self.tile_shape.len() != rank {
            return Err(GeometryError::RankMismatch {
                which: "tile shape",
                expected: rank,
                actual: self.tile_shape.len(),
            });
        }
        for (mode, (&tile, extent)) in self
            .tile_shape
            .iter()
            .zip(self.tiled_copy.tile_extent())
            .enumerate()
        {
            if tile == 0 || tile % extent != 0 {
                return Err(GeometryError::TileNotDivisible { mode, tile, extent });
            }
        }
        for (which, layout) in [("source", &self.src_layout), ("destination", &self.dst_layout)] {
            if layout.shape() != self.tile_shape.as_slice() {
                return Err(GeometryError::ShapeMismatch {
                    which,
                    expected: self.tile_shape.clone(),
                    actual: layout.shape().to_vec(),
                });
            }
        }
        if self.reduction_warps == 0 || self.lanes_per_warp == 0 {
            return Err(GeometryError::ZeroLanes);
        }
        let active = self.tiled_copy.thread_count();
        if active > self.launch_lanes() {
            return Err(GeometryError::TooManyActiveLanes {
                active,
                launched: self.launch_lanes(),
            });
        }
        Ok(())
    }

    /// Validate and precompute the per-lane partition.
    pub fn partition(&self) -> Result<TiledPartition<'_>, GeometryError> {
        self.validate()?;
        let layout_err =
            |which: &'static str| move |source: LayoutError| GeometryError::Layout { which, source };
        let thread_coords = self
            .tiled_copy
            .thr_layout()
            .coordinate_table()
            .map_err(layout_err("thread"))?;
        let value_coords = self
            .tiled_copy
            .val_layout()
            .coordinate_table()
            .map_err(layout_err("value"))?;
        let tile_extent = self.tiled_copy.tile_extent();
        let rest_shape = self
            .tile_shape
            .iter()
            .zip(&tile_extent)
            .map(|(tile, extent)| tile / extent)
            .collect::<Vec<_>>();
        tracing::debug!(
            ?tile_extent,
            ?rest_shape,
            threads = self.tiled_copy.thread_count(),
            values = self.tiled_copy.values_per_thread(),
            "resolved lane partition"
        );
        Ok(TiledPartition {
            geometry: self,
            thread_coords,
            value_coords,
            tile_extent,
            rest_shape,
        })
    }
}

/// `StagingGeometry` with its thread and value coordinate tables resolved.
///
/// Lane `t`'s sub-tile has shape `(V, rest_0, .., rest_{R-1})`. A local index
/// decomposes colexicographically into `(v, r_0, .., r_{R-1})` and lands on
/// tile coordinate `r_k * extent_k + thread_k * val_shape_k + value_k(v)`.
#[derive(Debug)]
pub struct TiledPartition<'a> {
    geometry: &'a StagingGeometry,
    thread_coords: Vec<Vec<usize>>,
    value_coords: Vec<Vec<usize>>,
    tile_extent: Vec<usize>,
    rest_shape: Vec<usize>,
}

impl<'a> TiledPartition<'a> {
    pub fn geometry(&self) -> &'a StagingGeometry {
        self.geometry
    }

    /// Thread coordinate of every active lane, indexed by lane.
    pub fn thread_coords(&self) -> &[Vec<usize>] {
        &self.thread_coords
    }

    /// Value coordinate of every per-thread value index.
    pub fn value_coords(&self) -> &[Vec<usize>] {
        &self.value_coords
    }

    pub fn tile_extent(&self) -> &[usize] {
        &self.tile_extent
    }

    pub fn rest_shape(&self) -> &[usize] {
        &self.rest_shape
    }

    /// Tile coordinate of local element `index` of `lane`'s sub-tile.
    pub fn tile_coord(&self, lane: usize, index: usize) -> Vec<usize> {
        let values = self.value_coords.len();
        let value = &self.value_coords[index % values];
        let rest = crate::layout::idx2crd(index / values, &self.rest_shape);
        let thread = &self.thread_coords[lane];
        let val_shape = self.geometry.tiled_copy.val_layout().shape();

        (0..self.rest_shape.len())
            .map(|k| rest[k] * self.tile_extent[k] + thread[k] * val_shape[k] + value[k])
            .collect()
    }
}

impl PartitionScheme for TiledPartition<'_> {
    fn launch_lanes(&self) -> usize {
        self.geometry.launch_lanes()
    }

    fn active_lanes(&self) -> usize {
        self.thread_coords.len()
    }

    fn lanes_per_warp(&self) -> usize {
        self.geometry.lanes_per_warp
    }

    fn visitation(&self) -> Visitation {
        self.geometry.visitation
    }

    fn lane_elements(&self, lane: usize) -> usize {
        if lane >= self.active_lanes() {
            return 0;
        }
        self.value_coords.len() * self.rest_shape.iter().product::<usize>()
    }

    fn element(&self, lane: usize, index: usize) -> ElementAddress {
        let coord = self.tile_coord(lane, index);
        ElementAddress {
            src_offset: self.geometry.src_base + self.geometry.src_layout.crd2idx(&coord),
            dst_offset: self.geometry.dst_base + self.geometry.dst_layout.crd2idx(&coord),
            coord: pack_coord(&coord),
        }
    }
}
