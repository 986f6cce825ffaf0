//! Integration of per-bin power across repeated acquisitions

use crate::complex::iq_samples;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccumulateMode {
    /// Sum power, divided out by the sample count at emission
    #[default]
    Average,
    /// Keep the largest power seen in each bin
    PeakHold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerAccumulator {
    bins: Vec<i64>,
    samples: u64,
}

impl PowerAccumulator {
    pub(crate) fn from_bins(bins: Vec<i64>) -> Self {
        Self { bins, samples: 0 }
    }

    pub fn new(len: usize) -> Self {
        Self::from_bins(vec![0; len])
    }

    pub fn bins(&self) -> &[i64] {
        &self.bins
    }

    pub(crate) fn bins_mut(&mut self) -> &mut [i64] {
        &mut self.bins
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    fn fold(&mut self, k: usize, power: i64, mode: AccumulateMode) {
        let bin = &mut self.bins[k];
        match mode {
            AccumulateMode::Average => *bin += power,
            AccumulateMode::PeakHold => *bin = (*bin).max(power),
        }
    }

    /// Fold one transformed frame (interleaved, one complex value per bin) into the
    /// bins. `weight` is the decimation factor the frame was produced with.
    pub fn add_spectrum(&mut self, frame: &[i16], mode: AccumulateMode, weight: u64) {
        assert_eq!(frame.len(), 2 * self.bins.len());
        for (k, s) in iq_samples(frame).enumerate() {
            self.fold(k, s.norm_sqr(), mode);
        }
        self.samples += weight;
    }

    /// Single bin of time domain power for hops without an FFT. The square of the
    /// DC offset is taken back out of the sum of squares.
    pub fn add_rms(&mut self, raw: &[i16], mode: AccumulateMode) {
        let (sum, sum_sq) = raw.iter().fold((0i64, 0i64), |(t, p), &s| {
            let s = s as i64;
            (t + s, p + s * s)
        });
        let len = raw.len() as f64;
        let dc = sum as f64 / len;
        let err = sum as f64 * 2.0 * dc - dc * dc * len;
        let power = sum_sq - err.round() as i64;
        self.fold(0, power, mode);
        self.samples += 1;
    }

    pub fn reset(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = 0);
        self.samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Vec<i16> {
        (0..16).flat_map(|i| [i as i16 * 3 - 20, 7 - i as i16]).collect()
    }

    #[test]
    fn test_average_is_linear() {
        let f = frame();
        let mut once = PowerAccumulator::new(16);
        once.add_spectrum(&f, AccumulateMode::Average, 4);
        let mut many = PowerAccumulator::new(16);
        for _ in 0..37 {
            many.add_spectrum(&f, AccumulateMode::Average, 4);
        }
        for (a, b) in once.bins().iter().zip(many.bins()) {
            assert_eq!(37 * a, *b);
        }
        assert_eq!(many.sample_count(), 37 * 4);
    }

    #[test]
    fn test_peak_hold_is_idempotent() {
        let f = frame();
        let mut acc = PowerAccumulator::new(16);
        acc.add_spectrum(&f, AccumulateMode::PeakHold, 1);
        let first = acc.bins().to_vec();
        for _ in 0..5 {
            acc.add_spectrum(&f, AccumulateMode::PeakHold, 1);
        }
        assert_eq!(first, acc.bins());
    }

    #[test]
    fn test_peak_hold_keeps_max() {
        let mut acc = PowerAccumulator::new(2);
        acc.add_spectrum(&[3, 4, 0, 1], AccumulateMode::PeakHold, 1);
        acc.add_spectrum(&[1, 0, 2, 2], AccumulateMode::PeakHold, 1);
        assert_eq!(acc.bins(), &[25, 8]);
    }

    #[test]
    fn test_rms_ignores_dc() {
        let mut acc = PowerAccumulator::new(1);
        acc.add_rms(&[500i16; 1024], AccumulateMode::Average);
        assert_eq!(acc.bins()[0], 0);
        assert_eq!(acc.sample_count(), 1);

        acc.reset();
        let raw: Vec<i16> = (0..1024).map(|i| if i % 2 == 0 { 110 } else { 90 }).collect();
        acc.add_rms(&raw, AccumulateMode::Average);
        assert_eq!(acc.bins()[0], 100 * 1024);
    }

    #[test]
    fn test_reset() {
        let mut acc = PowerAccumulator::new(16);
        acc.add_spectrum(&frame(), AccumulateMode::Average, 2);
        acc.reset();
        assert!(acc.bins().iter().all(|&b| b == 0));
        assert_eq!(acc.sample_count(), 0);
    }
}
