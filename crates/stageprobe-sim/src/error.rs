use stageprobe_core::{GeometryError, TransferError};

#[cfg(feature = "cuda")]
use cudarc::driver::DriverError;

/// Error types for simulation launches.
#[derive(Debug)]
pub enum SimError {
    InvalidCapacity { capacity: usize },
    Geometry(GeometryError),
    RankTooLarge { rank: usize, max: usize },
    ValueOutOfRange { field: &'static str, value: i128 },
    Transfer(TransferError),
    KernelUnavailable(String),
    #[cfg(feature = "cuda")]
    Driver(DriverError),
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCapacity { capacity } => {
                write!(f, "invalid per-lane capacity {}", capacity)
            }
            Self::Geometry(err) => write!(f, "invalid geometry: {}", err),
            Self::RankTooLarge { rank, max } => {
                write!(f, "tile rank {} exceeds device limit {}", rank, max)
            }
            Self::ValueOutOfRange { field, value } => {
                write!(f, "{} = {} does not fit the device geometry", field, value)
            }
            Self::Transfer(err) => write!(f, "device transfer failed: {}", err),
            Self::KernelUnavailable(reason) => {
                write!(f, "partition simulation kernel unavailable: {}", reason)
            }
            #[cfg(feature = "cuda")]
            Self::Driver(err) => write!(f, "CUDA driver error: {}", err),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Geometry(err) => Some(err),
            Self::Transfer(err) => Some(err),
            #[cfg(feature = "cuda")]
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GeometryError> for SimError {
    fn from(err: GeometryError) -> Self {
        Self::Geometry(err)
    }
}

impl From<TransferError> for SimError {
    fn from(err: TransferError) -> Self {
        Self::Transfer(err)
    }
}

#[cfg(feature = "cuda")]
impl From<DriverError> for SimError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}
