pub mod accumulate;
pub mod complex;
pub mod decimate;
pub mod device;
pub mod error;
pub mod exfil;
pub mod fft;
pub mod monitoring;
pub mod plan;
pub mod scan;
pub mod window;

pub use error::{Result, ScanError};

/// Samples (complex) in the smallest buffer we read per hop
pub const DEFAULT_BUF_LENGTH: usize = 16384;
/// Fastest the tuner is asked to sample
pub const MAXIMUM_RATE: i64 = 2_800_000;
/// Slowest the tuner can sample, narrower spans get decimated
pub const MINIMUM_RATE: i64 = 1_000_000;
// 10000 is enough for 10GHz b/w worst case
pub const MAX_TUNES: usize = 10_000;
/// Largest FFT is 2^21 points
pub const MAX_BIN_LOG2: u32 = 21;
