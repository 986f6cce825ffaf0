//! This module drives the sweep
//!
//! A pass walks the hop table once: retune when needed, pull one buffer, and fold
//! it into that hop's bins. [`ScanContext::run`] repeats passes and writes a CSV
//! row per hop every integration interval.

use std::{
    io::Write,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use chrono::Local;
use tracing::{debug, error, info, trace, warn};

use crate::{
    accumulate::AccumulateMode,
    decimate::{self, Decimation},
    device::Device,
    error::Result,
    exfil,
    fft::FixedFft,
    monitoring::ScanStats,
    plan::{Hop, HopPlan},
    window::{WindowFunction, WindowTable},
    DEFAULT_BUF_LENGTH,
};

/// Cooperative cancellation, raised once per interrupt.
/// Level 1 finishes the pass in flight, 2 or more abandons it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicUsize>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        let level = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        if level == 1 {
            warn!("Signal caught, finishing scan pass.");
        } else {
            warn!("Signal caught, aborting immediately.");
        }
    }

    pub fn level(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn finish_requested(&self) -> bool {
        self.level() >= 1
    }

    pub fn abort_requested(&self) -> bool {
        self.level() >= 2
    }
}

/// What to do with a hop when the radio never settles after a retune
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetunePolicy {
    /// Read anyway, possibly with stale tuning
    #[default]
    Proceed,
    /// Leave the hop out of this pass
    SkipHop,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub window: WindowFunction,
    pub decimation: Decimation,
    pub mode: AccumulateMode,
    pub channel: usize,
    /// Sleep after a retune before flushing
    pub settle: Duration,
    /// Flush reads attempted after a retune
    pub retune_retries: u32,
    pub retune_policy: RetunePolicy,
    pub read_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window: WindowFunction::Rectangle,
            decimation: Decimation::Boxcar,
            mode: AccumulateMode::Average,
            channel: 0,
            settle: Duration::from_micros(5000),
            retune_retries: 3,
            retune_policy: RetunePolicy::Proceed,
            read_timeout: Duration::from_millis(1),
        }
    }
}

/// When rows get written and when the run ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub single_shot: bool,
    pub exit_after: Option<Duration>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            single_shot: false,
            exit_after: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed,
    Aborted,
}

/// Everything a running sweep owns
pub struct ScanContext {
    config: ScanConfig,
    hops: Vec<Hop>,
    fft: FixedFft,
    window: WindowTable,
    scratch: Vec<i16>,
    // Flush target after a retune
    dump: Vec<i16>,
    sample_rate: Option<i64>,
    cancel: CancelToken,
    stats: ScanStats,
}

impl ScanContext {
    pub fn new(config: ScanConfig, plan: HopPlan, cancel: CancelToken) -> Self {
        let bin_log2 = plan
            .hops
            .iter()
            .map(|h| h.bin_count_log2)
            .max()
            .unwrap_or(0);
        let scratch_len = plan
            .hops
            .iter()
            .map(|h| h.raw_buffer().len())
            .max()
            .unwrap_or(0);
        Self {
            fft: FixedFft::new(bin_log2),
            window: WindowTable::new(config.window, 1 << bin_log2),
            scratch: vec![0; scratch_len],
            dump: vec![0; 2 * DEFAULT_BUF_LENGTH],
            sample_rate: None,
            hops: plan.hops,
            config,
            cancel,
            stats: ScanStats::default(),
        }
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Tune to `freq`, wait for it to settle, and throw away one buffer.
    /// Returns false if the radio never produced a good read.
    fn retune<D: Device>(&mut self, device: &mut D, freq: i64) -> bool {
        let channel = self.config.channel;
        self.stats.retunes += 1;
        if let Err(e) = device.set_frequency(channel, freq) {
            error!("Failed to set frequency {} Hz: {}", freq, e);
            self.stats.failed_retunes += 1;
            return false;
        }
        thread::sleep(self.config.settle);
        if self.config.retune_retries == 0 {
            return true;
        }

        let samples = self.dump.len() / 2;
        let mut last_err = None;
        for attempt in 1..=self.config.retune_retries {
            match device.read_block(channel, &mut self.dump, samples, self.config.read_timeout) {
                Ok(_) => {
                    trace!("Retune succeeded attempt #{} at {} Hz", attempt, freq);
                    return true;
                }
                Err(e) => last_err = Some(e),
            }
        }
        self.stats.failed_retunes += 1;
        if let Some(e) = last_err {
            error!(
                "Bad retune at {} Hz after {} attempts: {} (try increasing settle time or retries)",
                freq, self.config.retune_retries, e
            );
        }
        false
    }

    /// One pass over the hop table. Cancellation is only looked at between hops.
    pub fn scan_pass<D: Device>(&mut self, device: &mut D) -> Result<PassOutcome> {
        let channel = self.config.channel;
        for idx in 0..self.hops.len() {
            if self.cancel.abort_requested() {
                return Ok(PassOutcome::Aborted);
            }
            let (freq, rate) = {
                let hop = &self.hops[idx];
                (hop.center_frequency_hz, hop.hop_bandwidth_hz)
            };
            if self.sample_rate != Some(rate) {
                match device.set_sample_rate(channel, rate) {
                    Ok(()) => self.sample_rate = Some(rate),
                    Err(e) => warn!("Failed to set sample rate {} Hz: {}", rate, e),
                }
            }
            if device.frequency(channel) != freq
                && !self.retune(device, freq)
                && self.config.retune_policy == RetunePolicy::SkipHop
            {
                self.stats.skipped_hops += 1;
                continue;
            }

            let hop = &mut self.hops[idx];
            let wanted = hop.buffer_samples();
            let read = match device.read_block(
                channel,
                hop.raw_buffer_mut(),
                wanted,
                self.config.read_timeout,
            ) {
                Ok(n) if n < wanted => {
                    debug!("Dropped samples at {} Hz ({} of {})", freq, n, wanted);
                    self.stats.short_reads += 1;
                    n
                }
                Ok(_) => wanted,
                Err(e) => {
                    warn!("Error reading stream at {} Hz: {}", freq, e);
                    self.stats.failed_reads += 1;
                    continue;
                }
            };
            // Anything past the read is left over from the last pass
            if read == 0 {
                continue;
            }

            if hop.bin_count_log2 == 0 {
                let mode = self.config.mode;
                let (raw, acc) = hop.split_mut();
                acc.add_rms(&raw[..2 * read], mode);
                continue;
            }
            process_block(
                hop,
                2 * read,
                &mut self.scratch,
                &self.fft,
                &mut self.window,
                &self.config,
            )?;
        }
        self.stats.passes += 1;
        Ok(PassOutcome::Completed)
    }

    /// Sweep until cancelled, writing rows to `out` on every integration tick
    pub fn run<D: Device, W: Write>(
        &mut self,
        device: &mut D,
        out: &mut W,
        schedule: &Schedule,
    ) -> Result<()> {
        let start = Instant::now();
        let mut next_tick = start + schedule.interval;
        let exit_at = schedule.exit_after.map(|d| start + d);
        info!("Reporting every {:?}", schedule.interval);

        while !self.cancel.finish_requested() {
            if self.scan_pass(device)? == PassOutcome::Aborted {
                break;
            }
            let now = Instant::now();
            if now < next_tick {
                continue;
            }
            let stamp = Local::now().naive_local();
            let rows = exfil::emit(&mut self.hops, &stamp, out)?;
            out.flush()?;
            self.stats.rows += rows as u64;
            debug!("Wrote {} rows", rows);

            if schedule.interval.is_zero() {
                next_tick = now;
            } else {
                while Instant::now() >= next_tick {
                    next_tick += schedule.interval;
                }
            }
            if schedule.single_shot {
                break;
            }
            if exit_at.map_or(false, |t| Instant::now() >= t) {
                break;
            }
        }
        if self.cancel.finish_requested() {
            info!("User cancel, exiting...");
        }
        self.stats.log();
        Ok(())
    }
}

/// Decimate, window, transform and accumulate the first `len` values of one
/// hop's buffer. Frames that don't fit whole are dropped.
fn process_block(
    hop: &mut Hop,
    len: usize,
    scratch: &mut [i16],
    fft: &FixedFft,
    window: &mut WindowTable,
    config: &ScanConfig,
) -> Result<()> {
    let bins = hop.bin_count();
    let ds = hop.downsample_factor;
    let passes = hop.downsample_passes;
    let (raw, acc) = hop.split_mut();
    let buf = &mut scratch[..len];
    buf.copy_from_slice(&raw[..len]);

    let active = match config.decimation {
        Decimation::Boxcar if ds > 1 => decimate::boxcar(buf, ds),
        Decimation::Recursive { compensate } if passes > 0 => {
            decimate::recursive(buf, passes, compensate)
        }
        _ => buf.len(),
    };
    let block = &mut buf[..active];
    decimate::remove_dc(block);

    window.ensure_length(bins);
    for frame in block.chunks_exact_mut(2 * bins) {
        window.apply(frame);
        fft.process(frame)?;
        acc.add_spectrum(frame, config.mode, ds as u64);
    }
    Ok(())
}
