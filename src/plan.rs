//! Splitting a requested span into tuner hops
//!
//! We want the fewest hops, each as close to [`MAXIMUM_RATE`] as possible. Spans
//! narrower than [`MINIMUM_RATE`] are captured in one hop at a higher rate and
//! decimated down. Bins at or above [`MINIMUM_RATE`] skip the FFT and log one
//! time-domain power value per hop.

use std::fmt;

use tracing::info;

use crate::{
    accumulate::PowerAccumulator,
    decimate::Decimation,
    error::{Result, ScanError},
    DEFAULT_BUF_LENGTH, MAXIMUM_RATE, MAX_BIN_LOG2, MAX_TUNES, MINIMUM_RATE,
};

/// A `lower:upper:max_bin_size` request, all in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyRange {
    pub lower: i64,
    pub upper: i64,
    pub max_bin_size: i64,
}

impl FrequencyRange {
    pub fn new(lower: i64, upper: i64, max_bin_size: i64) -> Self {
        Self {
            lower,
            upper,
            max_bin_size,
        }
    }

    pub fn span(&self) -> i64 {
        self.upper - self.lower
    }
}

impl fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.lower, self.upper, self.max_bin_size)
    }
}

/// Zeroed vector that reports allocation failure instead of aborting
fn zeroed<T: Default + Clone>(len: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| ScanError::Allocation(len))?;
    v.resize(len, T::default());
    Ok(v)
}

/// One tuning step of the sweep. Each hop owns its sample buffer and bins.
#[derive(Debug, Clone)]
pub struct Hop {
    /// Tuner target
    pub center_frequency_hz: i64,
    /// Sample rate to capture this hop with
    pub hop_bandwidth_hz: i64,
    /// log2 of the FFT length, 0 for a single time-domain power bin
    pub bin_count_log2: u32,
    /// Total decimation from the capture rate
    pub downsample_factor: usize,
    /// Halving stages for recursive decimation, 0 for boxcar
    pub downsample_passes: u32,
    /// Fraction of bins dropped across both edges
    pub crop_fraction: f64,
    raw_buffer: Vec<i16>,
    accumulator: PowerAccumulator,
}

impl Hop {
    pub fn new(
        center_frequency_hz: i64,
        hop_bandwidth_hz: i64,
        bin_count_log2: u32,
        downsample_factor: usize,
        downsample_passes: u32,
        crop_fraction: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&crop_fraction) {
            return Err(ScanError::InvalidCrop(crop_fraction));
        }
        if bin_count_log2 > MAX_BIN_LOG2 {
            return Err(ScanError::InvalidBinCount {
                requested: bin_count_log2,
                limit: MAX_BIN_LOG2,
            });
        }
        if downsample_factor == 0 {
            return Err(ScanError::InvalidDownsample);
        }
        let bins = 1usize << bin_count_log2;
        let buf_len = (2 * bins * downsample_factor).max(2 * DEFAULT_BUF_LENGTH);
        Ok(Self {
            center_frequency_hz,
            hop_bandwidth_hz,
            bin_count_log2,
            downsample_factor,
            downsample_passes,
            crop_fraction,
            raw_buffer: zeroed(buf_len)?,
            accumulator: PowerAccumulator::from_bins(zeroed(bins)?),
        })
    }

    pub fn bin_count(&self) -> usize {
        1 << self.bin_count_log2
    }

    /// Width of one emitted bin
    pub fn bin_size_hz(&self) -> f64 {
        self.hop_bandwidth_hz as f64 / (self.bin_count() * self.downsample_factor) as f64
    }

    /// Lowest frequency this hop captures
    pub fn low_edge_hz(&self) -> i64 {
        self.center_frequency_hz - self.hop_bandwidth_hz / 2
    }

    /// One past the highest frequency this hop captures
    pub fn high_edge_hz(&self) -> i64 {
        self.low_edge_hz() + self.hop_bandwidth_hz
    }

    /// Complex samples requested per read
    pub fn buffer_samples(&self) -> usize {
        self.raw_buffer.len() / 2
    }

    pub fn raw_buffer(&self) -> &[i16] {
        &self.raw_buffer
    }

    pub fn raw_buffer_mut(&mut self) -> &mut [i16] {
        &mut self.raw_buffer
    }

    pub fn accumulator(&self) -> &PowerAccumulator {
        &self.accumulator
    }

    pub fn accumulator_mut(&mut self) -> &mut PowerAccumulator {
        &mut self.accumulator
    }

    /// Buffer and bins together, for processing a block into its own hop
    pub(crate) fn split_mut(&mut self) -> (&mut [i16], &mut PowerAccumulator) {
        (&mut self.raw_buffer, &mut self.accumulator)
    }
}

/// The hop table plus the numbers worth reporting about it
#[derive(Debug, Clone)]
pub struct HopPlan {
    pub hops: Vec<Hop>,
    pub bin_size_hz: f64,
}

impl HopPlan {
    pub fn log_summary(&self) {
        let Some(first) = self.hops.first() else {
            return;
        };
        let total_bins = self.hops.len() * first.bin_count();
        let buf_len = first.raw_buffer.len();
        info!("Number of frequency hops: {}", self.hops.len());
        info!("Dongle bandwidth: {}Hz", first.hop_bandwidth_hz);
        info!("Downsampling by: {}x", first.downsample_factor);
        info!("Cropping by: {:.2}%", first.crop_fraction * 100.0);
        info!("Total FFT bins: {}", total_bins);
        info!(
            "Logged FFT bins: {}",
            (total_bins as f64 * (1.0 - first.crop_fraction)) as usize
        );
        info!("FFT bin size: {:.2}Hz", self.bin_size_hz);
        info!(
            "Buffer size: {} bytes ({:.2}ms)",
            buf_len * std::mem::size_of::<i16>(),
            1000.0 * 0.5 * buf_len as f64 / first.hop_bandwidth_hz as f64
        );
    }
}

fn integer_log2(x: i64) -> u32 {
    63 - x.leading_zeros()
}

/// Build the hop table for `range`
pub fn plan(range: FrequencyRange, crop: f64, decimation: Decimation) -> Result<HopPlan> {
    let FrequencyRange {
        lower,
        upper,
        max_bin_size,
    } = range;
    if lower >= upper {
        return Err(ScanError::InvalidRange { lower, upper });
    }
    if max_bin_size <= 0 {
        return Err(ScanError::InvalidBinSize(max_bin_size));
    }
    if !(0.0..=1.0).contains(&crop) {
        return Err(ScanError::InvalidCrop(crop));
    }
    let span = range.span();

    // Giant bins, one time-domain power value per hop
    if max_bin_size >= MINIMUM_RATE {
        let bw = max_bin_size.min(MAXIMUM_RATE);
        let count = (span + bw - 1) / bw;
        let hops = build(lower, count, bw, bw, 0, 1, 0, 0.0)?;
        return Ok(HopPlan {
            hops,
            bin_size_hz: bw as f64,
        });
    }

    // Evenly sized hops, as close to the maximum rate as possible
    let mut found = None;
    for count in 1..=MAX_TUNES as i64 {
        let bw_seen = (span + count - 1) / count;
        let bw_used = (bw_seen as f64 / (1.0 - crop)) as i64;
        if bw_used <= MAXIMUM_RATE {
            found = Some((count, bw_seen, bw_used));
            break;
        }
    }
    let (mut count, bw_seen, mut bw_used) = found.ok_or(ScanError::TooManyHops {
        hops: MAX_TUNES + 1,
        limit: MAX_TUNES,
    })?;

    // Unless it's narrow, then take it in one and decimate
    let mut downsample = 1i64;
    let mut passes = 0u32;
    let narrow_bw = bw_used;
    if bw_used < MINIMUM_RATE {
        count = 1;
        downsample = if bw_used > 0 { MAXIMUM_RATE / bw_used } else { 0 };
        if downsample <= 0 {
            return Err(ScanError::UnsupportedBandwidth {
                bandwidth: bw_used,
                downsample,
            });
        }
        bw_used *= downsample;
    }
    // The recursive filter only halves, so round down to a power of two
    if matches!(decimation, Decimation::Recursive { .. }) && downsample > 1 {
        passes = integer_log2(downsample);
        downsample = 1 << passes;
        bw_used = narrow_bw * downsample;
    }

    // Power of two bins, under the size limit if we can get there
    let mut bin_log2 = MAX_BIN_LOG2;
    let mut bin_size = 0.0;
    for i in 1..=MAX_BIN_LOG2 {
        bin_log2 = i;
        bin_size = bw_used as f64 / ((1i64 << i) * downsample) as f64;
        if bin_size <= max_bin_size as f64 {
            break;
        }
    }

    let hops = build(
        lower,
        count,
        bw_seen,
        bw_used,
        bin_log2,
        downsample as usize,
        passes,
        crop,
    )?;
    Ok(HopPlan {
        hops,
        bin_size_hz: bin_size,
    })
}

#[allow(clippy::too_many_arguments)]
fn build(
    lower: i64,
    count: i64,
    step: i64,
    rate: i64,
    bin_log2: u32,
    downsample: usize,
    passes: u32,
    crop: f64,
) -> Result<Vec<Hop>> {
    let count = count as usize;
    if count > MAX_TUNES {
        return Err(ScanError::TooManyHops {
            hops: count,
            limit: MAX_TUNES,
        });
    }
    let mut hops = Vec::new();
    hops.try_reserve_exact(count)
        .map_err(|_| ScanError::Allocation(count))?;
    for i in 0..count as i64 {
        let center = lower + i * step + step / 2;
        hops.push(Hop::new(center, rate, bin_log2, downsample, passes, crop)?);
    }
    Ok(hops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn covers(plan: &HopPlan, range: FrequencyRange) -> bool {
        let mut edge = range.lower;
        for hop in &plan.hops {
            if hop.low_edge_hz() > edge {
                return false;
            }
            edge = edge.max(hop.high_edge_hz());
        }
        edge >= range.upper
    }

    #[test]
    fn test_fm_band() {
        let range = FrequencyRange::new(88_000_000, 108_000_000, 125_000);
        let plan = plan(range, 0.0, Decimation::Boxcar).unwrap();
        assert_eq!(plan.hops.len(), 8);
        let hop = &plan.hops[0];
        assert_eq!(hop.hop_bandwidth_hz, 2_500_000);
        assert_eq!(hop.center_frequency_hz, 89_250_000);
        assert_eq!(hop.bin_count_log2, 5);
        assert_eq!(hop.downsample_factor, 1);
        assert!(hop.bin_size_hz() <= 125_000.0);
        assert_eq!(hop.raw_buffer().len(), 2 * DEFAULT_BUF_LENGTH);
        assert!(covers(&plan, range));
    }

    #[test]
    fn test_crop_inflates_rate() {
        let range = FrequencyRange::new(88_000_000, 108_000_000, 125_000);
        let plan = plan(range, 0.5, Decimation::Boxcar).unwrap();
        // 20 MHz / 15 = 1.34 MHz seen, 2.67 MHz captured
        assert_eq!(plan.hops.len(), 15);
        assert!(plan.hops.iter().all(|h| h.hop_bandwidth_hz <= MAXIMUM_RATE));
        assert!(covers(&plan, range));
    }

    #[test]
    fn test_narrow_span_boxcar() {
        let range = FrequencyRange::new(100_000_000, 100_200_000, 100);
        let plan = plan(range, 0.0, Decimation::Boxcar).unwrap();
        assert_eq!(plan.hops.len(), 1);
        let hop = &plan.hops[0];
        assert_eq!(hop.downsample_factor, 14);
        assert_eq!(hop.hop_bandwidth_hz, 2_800_000);
        assert_eq!(hop.downsample_passes, 0);
        assert!(hop.bin_size_hz() <= 100.0);
        assert_eq!(hop.raw_buffer().len(), 2 * hop.bin_count() * 14);
    }

    #[test]
    fn test_narrow_span_recursive() {
        let range = FrequencyRange::new(100_000_000, 100_200_000, 100);
        let plan = plan(range, 0.0, Decimation::Recursive { compensate: true }).unwrap();
        let hop = &plan.hops[0];
        assert_eq!(hop.downsample_factor, 8);
        assert_eq!(hop.downsample_passes, 3);
        assert_eq!(hop.hop_bandwidth_hz, 1_600_000);
        assert!(hop.bin_size_hz() <= 100.0);
    }

    #[test]
    fn test_giant_bins() {
        let range = FrequencyRange::new(100_000_000, 110_000_000, 2_000_000);
        let plan = plan(range, 0.3, Decimation::Boxcar).unwrap();
        assert_eq!(plan.hops.len(), 5);
        for hop in &plan.hops {
            assert_eq!(hop.bin_count_log2, 0);
            assert_eq!(hop.crop_fraction, 0.0);
            assert_eq!(hop.accumulator().bins().len(), 1);
        }
        assert!(covers(&plan, range));
    }

    #[test]
    fn test_giant_bins_clamped_to_rate() {
        let range = FrequencyRange::new(100_000_000, 101_000_000, 5_000_000);
        let plan = plan(range, 0.0, Decimation::Boxcar).unwrap();
        assert_eq!(plan.hops.len(), 1);
        assert_eq!(plan.hops[0].hop_bandwidth_hz, MAXIMUM_RATE);
    }

    #[test]
    fn test_fatal_requests() {
        let ok = FrequencyRange::new(1_000_000, 2_000_000, 1000);
        assert!(matches!(
            plan(FrequencyRange::new(5, 5, 1), 0.0, Decimation::Boxcar),
            Err(ScanError::InvalidRange { .. })
        ));
        assert!(matches!(
            plan(ok, 1.5, Decimation::Boxcar),
            Err(ScanError::InvalidCrop(_))
        ));
        assert!(matches!(
            plan(FrequencyRange::new(0, 50_000_000_000, 1000), 0.0, Decimation::Boxcar),
            Err(ScanError::TooManyHops { .. })
        ));
        assert!(matches!(
            plan(FrequencyRange::new(0, 50_000_000_000, 2_000_000), 0.0, Decimation::Boxcar),
            Err(ScanError::TooManyHops { .. })
        ));
        assert!(matches!(
            plan(ok, 1.0, Decimation::Boxcar),
            Err(ScanError::TooManyHops { .. })
        ));
        assert!(matches!(
            plan(ok, 0.0, Decimation::Boxcar),
            Ok(HopPlan { .. })
        ));
    }

    #[test]
    fn test_hop_rejects_bad_shape() {
        assert!(matches!(
            Hop::new(100_000_000, 2_000_000, MAX_BIN_LOG2 + 1, 1, 0, 0.0),
            Err(ScanError::InvalidBinCount { requested: 22, .. })
        ));
        assert!(matches!(
            Hop::new(100_000_000, 2_000_000, 10, 0, 0, 0.0),
            Err(ScanError::InvalidDownsample)
        ));
        assert!(matches!(
            Hop::new(100_000_000, 2_000_000, 10, 1, 0, -0.1),
            Err(ScanError::InvalidCrop(_))
        ));
        assert!(Hop::new(100_000_000, 2_000_000, MAX_BIN_LOG2, 1, 0, 0.0).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_hops_cover_span(
            lower in 1_000_000i64..2_000_000_000,
            width in 1_000i64..200_000_000,
            bin in 1_000i64..3_000_000,
            crop in 0.0f64..0.8,
            recursive in any::<bool>(),
        ) {
            let range = FrequencyRange::new(lower, lower + width, bin);
            let decimation = if recursive {
                Decimation::Recursive { compensate: false }
            } else {
                Decimation::Boxcar
            };
            let plan = plan(range, crop, decimation).unwrap();
            prop_assert!(!plan.hops.is_empty());
            prop_assert!(plan.hops.len() <= MAX_TUNES);
            prop_assert!(covers(&plan, range), "gap in {:?}", range);
            for hop in &plan.hops {
                prop_assert!(hop.hop_bandwidth_hz <= MAXIMUM_RATE);
                prop_assert_eq!(hop.accumulator().bins().len(), hop.bin_count());
                prop_assert!(hop.raw_buffer().len() >= 2 * DEFAULT_BUF_LENGTH);
                // Resolution only falls short once we run out of FFT size
                if hop.bin_count_log2 < MAX_BIN_LOG2 {
                    prop_assert!(hop.bin_size_hz() <= bin as f64 + 1.0);
                }
            }
        }
    }
}
