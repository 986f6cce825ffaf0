//! This module is responsible for exfilling integrated spectra as CSV
//!
//! One row per hop per integration tick:
//! `date, time, Hz low, Hz high, Hz step, samples, dBm, dBm, ...`

use std::io::Write;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::{error::Result, plan::Hop};

/// Date and time columns of a row
pub fn csv_timestamp(time: &NaiveDateTime) -> String {
    time.format("%Y-%m-%d, %H:%M:%S").to_string()
}

/// Put the bins in low to high frequency order. Bin 0 soaks up DC leakage, so it
/// borrows its neighbour's value before the halves are swapped.
pub fn fix_fft_order(bins: &mut [i64]) {
    if bins.len() < 2 {
        return;
    }
    bins[0] = bins[1];
    let half = bins.len() / 2;
    bins.rotate_left(half);
}

/// Index range of the bins that survive cropping
pub fn retained_bins(len: usize, crop: f64) -> std::ops::Range<usize> {
    let trim = (len as f64 * crop * 0.5) as usize;
    trim..len.saturating_sub(trim).max(trim)
}

fn dbm(power: i64, rate: i64, samples: u64) -> f64 {
    10.0 * (power as f64 / rate as f64 / samples as f64).log10()
}

/// Format one hop's row. The bins are reordered in place.
pub fn format_row(hop: &mut Hop, stamp: &str) -> String {
    let len = hop.bin_count();
    let ds = hop.downsample_factor;
    let rate = hop.hop_bandwidth_hz;
    let crop = hop.crop_fraction;
    let center = hop.center_frequency_hz;
    let acc = hop.accumulator_mut();
    let samples = acc.sample_count();
    if len > 1 {
        fix_fft_order(acc.bins_mut());
    }

    let bin_count = (len as f64 * (1.0 - crop)) as i64;
    let bw2 = ((rate as f64 * bin_count as f64) / (len * 2 * ds) as f64) as i64;
    let step = rate as f64 / (len * ds) as f64;

    let mut row = format!(
        "{}, {}, {}, {:.2}, {}",
        stamp,
        center - bw2,
        center + bw2,
        step,
        samples
    );
    for &power in &acc.bins()[retained_bins(len, crop)] {
        row.push_str(&format!(", {:.2}", dbm(power, rate, samples)));
    }
    row.push('\n');
    row
}

/// Write a row for every hop that has collected samples, then clear them.
/// Returns the number of rows written.
pub fn emit<W: Write>(hops: &mut [Hop], time: &NaiveDateTime, out: &mut W) -> Result<usize> {
    let stamp = csv_timestamp(time);
    let mut rows = 0;
    for hop in hops.iter_mut() {
        if hop.accumulator().sample_count() == 0 {
            warn!(
                freq = hop.center_frequency_hz,
                "No samples collected this interval, skipping row"
            );
            continue;
        }
        let row = format_row(hop, &stamp);
        out.write_all(row.as_bytes())?;
        hop.accumulator_mut().reset();
        rows += 1;
    }
    Ok(rows)
}
