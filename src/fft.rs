//! In-place radix-2 FFT over interleaved 16 bit I/Q
//!
//! Everything stays in 16 bit fixed point where -32768..32767 maps onto -1.0..1.0.
//! Each butterfly stage halves its inputs, so the transform is scaled by 1/N and
//! can't overflow.

use std::f64::consts::PI;

use crate::error::{Result, ScanError};

/// Fixed point multiply, `a * b` scaled back down with a rounding bit
pub fn fix_mpy(a: i16, b: i16) -> i16 {
    let c = (a as i32 * b as i32) >> 14;
    let round = c & 0x01;
    ((c >> 1) + round) as i16
}

#[derive(Debug, Clone)]
pub struct FixedFft {
    log2_size: u32,
    // Three quarters of a sine period, the cosine is read a quarter ahead
    sine: Vec<i16>,
}

impl FixedFft {
    /// Build the sine table for transforms of up to `2^log2_size` points
    pub fn new(log2_size: u32) -> Self {
        let n_wave = 1usize << log2_size;
        let sine = (0..n_wave * 3 / 4)
            .map(|i| {
                let d = i as f64 * 2.0 * PI / n_wave as f64;
                (32767.0 * d.sin()).round() as i16
            })
            .collect();
        Self { log2_size, sine }
    }

    pub fn log2_size(&self) -> u32 {
        self.log2_size
    }

    pub fn max_points(&self) -> usize {
        1 << self.log2_size
    }

    /// Transform `iq` in place. Its length must be twice a power of two no larger
    /// than the table.
    pub fn process(&self, iq: &mut [i16]) -> Result<()> {
        let n = iq.len() / 2;
        if iq.len() % 2 != 0 || !n.is_power_of_two() || n > self.max_points() {
            return Err(ScanError::FftLength {
                requested: n,
                table: self.max_points(),
            });
        }
        bit_reverse(iq, n);

        let n_wave = self.max_points();
        let mut l = 1;
        let mut k = self.log2_size as i32 - 1;
        while l < n {
            let istep = l << 1;
            for m in 0..l {
                let j = m << k;
                let wr = self.sine[j + n_wave / 4] >> 1;
                let wi = -self.sine[j] >> 1;
                let mut i = m;
                while i < n {
                    let j = i + l;
                    let tr = fix_mpy(wr, iq[2 * j]).wrapping_sub(fix_mpy(wi, iq[2 * j + 1]));
                    let ti = fix_mpy(wr, iq[2 * j + 1]).wrapping_add(fix_mpy(wi, iq[2 * j]));
                    let qr = iq[2 * i] >> 1;
                    let qi = iq[2 * i + 1] >> 1;
                    iq[2 * j] = qr.wrapping_sub(tr);
                    iq[2 * j + 1] = qi.wrapping_sub(ti);
                    iq[2 * i] = qr.wrapping_add(tr);
                    iq[2 * i + 1] = qi.wrapping_add(ti);
                    i += istep;
                }
            }
            k -= 1;
            l = istep;
        }
        Ok(())
    }
}

/// Decimation in time reordering
fn bit_reverse(iq: &mut [i16], n: usize) {
    let nn = n - 1;
    let mut mr = 0;
    for m in 1..=nn {
        let mut l = n;
        loop {
            l >>= 1;
            if mr + l <= nn {
                break;
            }
        }
        mr = (mr & (l - 1)) + l;
        if mr <= m {
            continue;
        }
        iq.swap(2 * m, 2 * mr);
        iq.swap(2 * m + 1, 2 * mr + 1);
    }
}
