//! Error types for planning and running a sweep

use thiserror::Error;

/// Conditions that stop a sweep
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid frequency range: lower {lower} Hz must be below upper {upper} Hz")]
    InvalidRange { lower: i64, upper: i64 },

    #[error("invalid bin size: {0} Hz")]
    InvalidBinSize(i64),

    #[error("crop value {0} outside of 0 to 1")]
    InvalidCrop(f64),

    #[error("FFT size 2^{requested} is above the 2^{limit} maximum")]
    InvalidBinCount { requested: u32, limit: u32 },

    #[error("downsample factor must be at least 1")]
    InvalidDownsample,

    #[error("unsupported bandwidth: bw_used={bandwidth} Hz, downsample={downsample}")]
    UnsupportedBandwidth { bandwidth: i64, downsample: i64 },

    #[error("bandwidth too wide: {hops} hops exceeds the limit of {limit}")]
    TooManyHops { hops: usize, limit: usize },

    #[error("failed to allocate {0} elements for hop buffers")]
    Allocation(usize),

    #[error("FFT of {requested} points exceeds the {table} point sine table")]
    FftLength { requested: usize, table: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
