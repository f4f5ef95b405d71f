use crate::geometry::{GeometryError, StagingGeometry, TiledCopy, Visitation};
use crate::layout::{Layout, LayoutError};
use crate::report::{ReportOptions, DEFAULT_MAX_EXAMPLES};

pub const LANES_PER_WARP: usize = 32;
pub const DEFAULT_CAPACITY: usize = 256;

/// Tensor-memory addresses keep the lane in the upper half-word and the
/// column in the lower one.
const TMEM_LANE_STRIDE: i64 = 1 << 16;
const SMEM_STAGING_BASE: i64 = 0x4000;

/// Kernel bindings the probe knows how to replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KernelPreset {
    /// SM120 reduction stage: 4 reduction warps stage a 128 x 128 accumulator
    /// tile from shared memory into tensor memory, walking it warp-strided.
    #[default]
    Sm120Reduce,
    /// Same staging path, every lane walks its full sub-tile.
    Sm120Sequential,
    /// Same staging path with the lane bits dropped from the tensor-memory
    /// address, so lanes sharing a column alias.
    Sm120ColumnOnly,
}

impl KernelPreset {
    pub const ALL: [KernelPreset; 3] = [
        KernelPreset::Sm120Reduce,
        KernelPreset::Sm120Sequential,
        KernelPreset::Sm120ColumnOnly,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            KernelPreset::Sm120Reduce => "sm120-reduce",
            KernelPreset::Sm120Sequential => "sm120-sequential",
            KernelPreset::Sm120ColumnOnly => "sm120-column-only",
        }
    }

    pub fn geometry(&self) -> Result<StagingGeometry, GeometryError> {
        let reduction_warps = 4;
        let tile_shape = vec![128, 128];
        let layout_err = |which: &'static str| {
            move |source: LayoutError| GeometryError::Layout { which, source }
        };

        // thread t -> (row t % 32, column block t / 32); each thread owns a
        // 1 x 32 run of columns
        let thr = Layout::new(vec![32, 4], vec![1, 32]).map_err(layout_err("thread"))?;
        let val = Layout::col_major(vec![1, 32]).map_err(layout_err("value"))?;
        let tiled_copy = TiledCopy::new(thr, val)?;

        let src_layout = Layout::row_major(tile_shape.clone()).map_err(layout_err("source"))?;
        let dst_stride = match self {
            KernelPreset::Sm120ColumnOnly => vec![0, 1],
            _ => vec![TMEM_LANE_STRIDE, 1],
        };
        let dst_layout =
            Layout::new(tile_shape.clone(), dst_stride).map_err(layout_err("destination"))?;
        let visitation = match self {
            KernelPreset::Sm120Reduce => Visitation::WarpStrided,
            _ => Visitation::Sequential,
        };

        Ok(StagingGeometry {
            tile_shape,
            tiled_copy,
            src_layout,
            src_base: SMEM_STAGING_BASE,
            dst_layout,
            dst_base: 0,
            reduction_warps,
            lanes_per_warp: LANES_PER_WARP,
            visitation,
        })
    }
}

impl std::fmt::Display for KernelPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for KernelPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| ConfigError::UnknownPreset(s.to_string()))
    }
}

#[derive(Clone, Debug)]
pub struct ProbeConfig {
    pub preset: KernelPreset,
    /// Maximum access records kept per lane.
    pub capacity: usize,
    pub max_examples: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownPreset(String),
    ZeroCapacity,
    Geometry(GeometryError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::UnknownPreset(name) => {
                let known: Vec<_> = KernelPreset::ALL.iter().map(|p| p.name()).collect();
                write!(
                    f,
                    "unknown kernel preset `{}` (expected one of: {})",
                    name,
                    known.join(", ")
                )
            }
            ConfigError::ZeroCapacity => write!(f, "capacity must be > 0"),
            ConfigError::Geometry(err) => write!(f, "invalid staging geometry: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Geometry(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GeometryError> for ConfigError {
    fn from(err: GeometryError) -> Self {
        ConfigError::Geometry(err)
    }
}

impl ProbeConfig {
    pub fn for_preset(preset: KernelPreset) -> Self {
        Self {
            preset,
            capacity: DEFAULT_CAPACITY,
            max_examples: DEFAULT_MAX_EXAMPLES,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry().map(|_| ())
    }

    /// Validated geometry for the selected preset.
    pub fn geometry(&self) -> Result<StagingGeometry, ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let geometry = self.preset.geometry()?;
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            max_examples: self.max_examples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PartitionScheme;

    #[test]
    fn presets_are_valid() {
        for preset in KernelPreset::ALL {
            let config = ProbeConfig::for_preset(preset);
            assert!(
                config.validate().is_ok(),
                "{} config should be valid",
                preset
            );
        }
    }

    #[test]
    fn preset_names_round_trip() {
        for preset in KernelPreset::ALL {
            assert_eq!(preset.name().parse::<KernelPreset>(), Ok(preset));
        }
        assert!(matches!(
            "sm90".parse::<KernelPreset>(),
            Err(ConfigError::UnknownPreset(_))
        ));
    }

    #[test]
    fn sm120_geometry_uses_four_reduction_warps() {
        let geometry = KernelPreset::Sm120Reduce.geometry().unwrap();
        let partition = geometry.partition().unwrap();
        assert_eq!(partition.launch_lanes(), 128);
        assert_eq!(partition.active_lanes(), 128);
        // rest (4, 1) x 32 values
        assert_eq!(partition.lane_elements(0), 128);
        assert_eq!(partition.visitation(), Visitation::WarpStrided);
    }

    #[test]
    fn geometry_matches_preset() {
        let config = ProbeConfig::for_preset(KernelPreset::Sm120ColumnOnly);
        assert_eq!(
            config.geometry(),
            KernelPreset::Sm120ColumnOnly.geometry().map_err(ConfigError::from)
        );
        let zero = ProbeConfig {
            capacity: 0,
            ..config
        };
        assert_eq!(zero.geometry(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let config = ProbeConfig {
            capacity: 0,
            ..ProbeConfig::for_preset(KernelPreset::Sm120Reduce)
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }
}
