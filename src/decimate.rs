//! Downsampling of interleaved I/Q blocks
//!
//! Two strategies are available. Boxcar sums every `D` samples into one, which is
//! cheap but leaks near the new band edge. The recursive path halves the rate
//! `log2(D)` times with a fifth order smoothing filter, optionally followed by a
//! 9 tap FIR that flattens the droop of the cascade.

use crate::complex::{saturate, saturate_wide};

/// Largest pass count with compensation coefficients
pub const CIC_TABLE_MAX: u32 = 10;

/// Symmetric 9 tap compensation filters indexed by `passes - 1`, scaled by 2^15.
/// Only the first five taps are stored, the rest mirror them.
const CIC_COMPENSATION: [[i32; 5]; CIC_TABLE_MAX as usize] = [
    [-156, -97, 2798, -15489, 61019],
    [-128, -568, 5593, -24125, 74126],
    [-129, -639, 6187, -26281, 77511],
    [-122, -612, 6082, -26353, 77818],
    [-120, -602, 6015, -26269, 77757],
    [-120, -582, 5951, -26128, 77542],
    [-119, -580, 5931, -26094, 77505],
    [-119, -578, 5921, -26077, 77484],
    [-119, -577, 5917, -26067, 77473],
    [-199, -362, 5303, -25505, 77489],
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decimation {
    /// Sum-and-dump
    Boxcar,
    /// Cascaded halving stages, power of two ratios only
    Recursive { compensate: bool },
}

impl Default for Decimation {
    fn default() -> Self {
        Decimation::Boxcar
    }
}

/// Compensation taps for `passes` halving stages, if there are any
pub fn cic_compensation(passes: u32) -> Option<&'static [i32; 5]> {
    if passes == 0 {
        return None;
    }
    CIC_COMPENSATION.get(passes as usize - 1)
}

/// Sum every `factor` complex samples into one, in place. Consumed slots are zeroed.
/// Returns the number of `i16` values holding complete output samples.
pub fn boxcar(iq: &mut [i16], factor: usize) -> usize {
    assert!(factor >= 1);
    let samples = iq.len() / 2;
    if factor == 1 {
        return 2 * samples;
    }
    let mut out = 0;
    let mut start = 0;
    while start < samples {
        let end = (start + factor).min(samples);
        // Factors reach 10^5, so a group can outgrow an i32
        let (mut re, mut im) = (0i64, 0i64);
        for s in start..end {
            re += iq[2 * s] as i64;
            im += iq[2 * s + 1] as i64;
            iq[2 * s] = 0;
            iq[2 * s + 1] = 0;
        }
        iq[2 * out] = saturate_wide(re);
        iq[2 * out + 1] = saturate_wide(im);
        out += 1;
        start = end;
    }
    2 * (samples / factor)
}

/// One halving stage over a single lane (0 = I, 1 = Q) of `data`
fn fifth_order(data: &mut [i16], lane: usize) {
    let length = data.len() - lane;
    if length < 12 {
        return;
    }
    let at = |i: usize| lane + i;
    let mut a = data[at(0)] as i32;
    let mut b = data[at(2)] as i32;
    let mut c = data[at(4)] as i32;
    let mut d = data[at(6)] as i32;
    let mut e = data[at(8)] as i32;
    let mut f = data[at(10)] as i32;
    // Don't fully shift back down, the lower rate earns some resolution.
    // Ease in rather than carrying state between blocks.
    data[at(0)] = saturate(((a + b) * 10 + (c + d) * 5 + d + f) >> 4);
    data[at(2)] = saturate(((b + c) * 10 + (a + d) * 5 + e + f) >> 4);
    data[at(4)] = saturate((a + (b + e) * 5 + (c + d) * 10 + f) >> 4);
    let mut i = 12;
    while i < length {
        a = c;
        b = d;
        c = e;
        d = f;
        e = data[at(i - 2)] as i32;
        f = data[at(i)] as i32;
        data[at(i / 2)] = saturate((a + (b + e) * 5 + (c + d) * 10 + f) >> 4);
        i += 4;
    }
}

/// Halve the rate of an interleaved block, output lands in the first half
pub fn downsample_iq(iq: &mut [i16]) {
    fifth_order(iq, 0);
    fifth_order(iq, 1);
}

/// Symmetric 9 tap FIR over one lane. The first nine samples pass unfiltered.
fn compensate_lane(data: &mut [i16], lane: usize, taps: &[i32; 5]) {
    let length = data.len() - lane;
    if length < 18 {
        return;
    }
    let mut hist = [0i64; 9];
    for (k, h) in hist.iter_mut().enumerate() {
        *h = data[lane + 2 * k] as i64;
    }
    let taps = taps.map(|t| t as i64);
    let mut d = 18;
    while d < length {
        let temp = data[lane + d] as i64;
        let sum = (hist[0] + hist[8]) * taps[0]
            + (hist[1] + hist[7]) * taps[1]
            + (hist[2] + hist[6]) * taps[2]
            + (hist[3] + hist[5]) * taps[3]
            + hist[4] * taps[4];
        data[lane + d] = (sum >> 15).clamp(i16::MIN as i64, i16::MAX as i64) as i16;
        hist.rotate_left(1);
        hist[8] = temp;
        d += 2;
    }
}

/// Run the droop compensation filter over both lanes
pub fn compensate(iq: &mut [i16], taps: &[i32; 5]) {
    compensate_lane(iq, 0, taps);
    compensate_lane(iq, 1, taps);
}

/// Apply `passes` halving stages to `iq`, then droop compensation if requested and
/// available. Returns the number of `i16` values that hold the decimated block.
pub fn recursive(iq: &mut [i16], passes: u32, compensation: bool) -> usize {
    let len = iq.len();
    for p in 0..passes {
        downsample_iq(&mut iq[..len >> p]);
    }
    let active = len >> passes;
    if compensation {
        match cic_compensation(passes) {
            Some(taps) => compensate(&mut iq[..active], taps),
            None => tracing::trace!(passes, "no droop compensation for this many passes"),
        }
    }
    active
}

/// Subtract the mean of each lane. A zero mean leaves the lane untouched.
pub fn remove_dc(iq: &mut [i16]) {
    let samples = iq.len() / 2;
    if samples == 0 {
        return;
    }
    for lane in 0..2 {
        let sum: i64 = iq[lane..].iter().step_by(2).take(samples).map(|&s| s as i64).sum();
        let mean = (sum / samples as i64) as i32;
        if mean == 0 {
            continue;
        }
        for s in iq[lane..].iter_mut().step_by(2).take(samples) {
            *s = saturate(*s as i32 - mean);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxcar_sums() {
        let mut iq: Vec<i16> = (0..8).flat_map(|i| [i as i16, -(i as i16)]).collect();
        let active = boxcar(&mut iq, 4);
        assert_eq!(active, 4);
        assert_eq!(&iq[..4], &[6, -6, 22, -22]);
        assert!(iq[4..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_boxcar_partial_group() {
        let mut iq = vec![1i16; 10];
        let active = boxcar(&mut iq, 2);
        assert_eq!(active, 4);
        // The leftover sample is summed into its own slot but not counted
        assert_eq!(&iq[..6], &[2, 2, 2, 2, 1, 1]);
    }

    #[test]
    fn test_boxcar_dc_removed() {
        let mut iq = vec![300i16; 2 * 1024];
        let active = boxcar(&mut iq, 8);
        remove_dc(&mut iq[..active]);
        assert!(iq[..active].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_boxcar_saturates() {
        let mut iq = vec![i16::MAX; 8];
        boxcar(&mut iq, 4);
        assert_eq!(iq[0], i16::MAX);
    }

    #[test]
    fn test_boxcar_huge_factor_saturates() {
        // 100000 full scale samples sum well past i32::MAX
        let mut iq: Vec<i16> = (0..200_000)
            .map(|i| if i % 2 == 0 { 30000 } else { -30000 })
            .collect();
        let active = boxcar(&mut iq, 100_000);
        assert_eq!(active, 2);
        assert_eq!(&iq[..2], &[i16::MAX, i16::MIN]);
        assert!(iq[2..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_remove_dc_lanes_independent() {
        let mut iq: Vec<i16> = (0..16).flat_map(|i| [100 + (i % 2) as i16 * 2, -50]).collect();
        remove_dc(&mut iq);
        let re: i32 = iq.iter().step_by(2).map(|&s| s as i32).sum();
        let im: i32 = iq.iter().skip(1).step_by(2).map(|&s| s as i32).sum();
        assert_eq!(re, 0);
        assert_eq!(im, 0);
    }

    #[test]
    fn test_fifth_order_constant() {
        // Weights sum to 32, so a constant doubles after the >> 4
        let mut iq = vec![100i16; 64];
        downsample_iq(&mut iq);
        assert!(iq[..32].iter().all(|&s| s == 200), "{:?}", &iq[..32]);
    }

    #[test]
    fn test_fifth_order_short_block_untouched() {
        let mut iq = vec![7i16; 10];
        downsample_iq(&mut iq);
        assert!(iq.iter().all(|&s| s == 7));
    }

    #[test]
    fn test_recursive_active_length() {
        let mut iq = vec![10i16; 4096];
        assert_eq!(recursive(&mut iq, 3, false), 512);
        assert_eq!(recursive(&mut vec![0i16; 4096], 3, true), 512);
    }

    #[test]
    fn test_compensation_table_bounds() {
        assert!(cic_compensation(0).is_none());
        assert_eq!(cic_compensation(1).unwrap()[4], 61019);
        assert_eq!(cic_compensation(10).unwrap()[0], -199);
        assert!(cic_compensation(11).is_none());
    }

    #[test]
    fn test_compensation_passes_head() {
        let mut iq: Vec<i16> = (0..64).map(|i| i as i16).collect();
        let orig = iq.clone();
        compensate(&mut iq, cic_compensation(3).unwrap());
        assert_eq!(&iq[..18], &orig[..18]);
    }
}
