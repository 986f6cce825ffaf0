//! Argument parsing for running from the command line

use std::{fs::File, io::BufReader, path::PathBuf, time::Duration};

use clap::Parser;
use clap_verbosity_flag::InfoLevel;
use sweep_power::{
    accumulate::AccumulateMode,
    decimate::Decimation,
    device::{Device, FileDevice, ToneDevice},
    plan::FrequencyRange,
    scan::{RetunePolicy, ScanConfig, Schedule},
    window::WindowFunction,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Frequency range as lower:upper:bin_size in Hz (k, M and G suffixes work).
    /// Bin size is a maximum, smaller more convenient bins will be used.
    #[clap(short, long, value_parser = valid_frequency_range)]
    pub frequency: FrequencyRange,
    /// Integration interval in seconds (s, m and h suffixes work)
    #[clap(short, long, default_value = "10", value_parser = valid_duration)]
    pub interval: Duration,
    /// Exit after a single integration interval
    #[clap(short = '1', long)]
    pub single_shot: bool,
    /// Stop after this long (s, m and h suffixes work)
    #[clap(short, long, value_parser = valid_duration)]
    pub exit_timer: Option<Duration>,
    /// Device channel to read from
    #[clap(short = 'C', long, default_value_t = 0)]
    pub channel: usize,
    /// Window function (rectangle, hamming, blackman, blackman-harris, hann-poisson, youssef, kaiser, bartlett)
    #[clap(short, long, default_value = "rectangle", value_parser = valid_window)]
    pub window: WindowFunction,
    /// Fraction of each hop to discard at the edges (0 to 1, or a percentage like 30%)
    #[clap(short, long, default_value = "0", value_parser = valid_crop)]
    pub crop: f64,
    /// Use the low-leakage recursive downsampler; 9 adds droop compensation, 0 doesn't
    #[clap(short = 'F', long, value_parser = valid_fir_size)]
    pub fir_size: Option<u32>,
    /// Keep the peak power of each bin instead of the average
    #[clap(short = 'P', long)]
    pub peak_hold: bool,
    /// Microseconds to let the tuner settle after a retune
    #[clap(short = 'S', long, default_value_t = 5000)]
    pub tuner_sleep_usec: u64,
    /// Flush reads to attempt after a retune
    #[clap(short = 'R', long, default_value_t = 3)]
    pub tuner_retry_max: u32,
    /// Leave a hop out of the pass when its retune never settles
    #[clap(long)]
    pub skip_failed_retune: bool,
    /// Sample source: file:<path> (raw CS16), tone:<hz>[:<amplitude>] or silence
    #[clap(short, long, value_parser = valid_source)]
    pub source: Source,
    /// Output file, '-' or nothing writes to stdout
    #[clap(value_parser)]
    pub filename: Option<PathBuf>,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<InfoLevel>,
}

impl Args {
    pub fn decimation(&self) -> Decimation {
        match self.fir_size {
            None => Decimation::Boxcar,
            Some(size) => Decimation::Recursive {
                compensate: size == 9,
            },
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            window: self.window,
            decimation: self.decimation(),
            mode: if self.peak_hold {
                AccumulateMode::PeakHold
            } else {
                AccumulateMode::Average
            },
            channel: self.channel,
            settle: Duration::from_micros(self.tuner_sleep_usec),
            retune_retries: self.tuner_retry_max,
            retune_policy: if self.skip_failed_retune {
                RetunePolicy::SkipHop
            } else {
                RetunePolicy::Proceed
            },
            ..Default::default()
        }
    }

    pub fn schedule(&self) -> Schedule {
        Schedule {
            interval: self.interval.max(Duration::from_secs(1)),
            single_shot: self.single_shot,
            exit_after: self.exit_timer.filter(|d| !d.is_zero()),
        }
    }

    /// None means stdout
    pub fn output(&self) -> Option<&PathBuf> {
        self.filename.as_ref().filter(|p| p.as_os_str() != "-")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    File(PathBuf),
    Tone { hz: i64, amplitude: f64 },
    Silence,
}

impl Source {
    pub fn open(&self) -> std::io::Result<Box<dyn Device>> {
        Ok(match self {
            Source::File(path) => Box::new(FileDevice::new(BufReader::new(File::open(path)?))),
            Source::Tone { hz, amplitude } => Box::new(ToneDevice::new(*hz, *amplitude)),
            Source::Silence => Box::new(ToneDevice::silent()),
        })
    }
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}

/// Split a trailing suffix character off `s` if it's one of `suffixes`
fn split_suffix<'a>(s: &'a str, suffixes: &str) -> (&'a str, Option<char>) {
    match s.chars().last() {
        Some(c) if suffixes.contains(c) => (&s[..s.len() - c.len_utf8()], Some(c)),
        _ => (s, None),
    }
}

fn parse_number(s: &str) -> Result<f64, String> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid number '{}'", s))
}

/// Hz with k/M/G suffixes
fn valid_frequency(s: &str) -> Result<i64, String> {
    let (num, suffix) = split_suffix(s, "kKmMgG");
    let scale = match suffix {
        Some('k' | 'K') => 1e3,
        Some('m' | 'M') => 1e6,
        Some('g' | 'G') => 1e9,
        _ => 1.0,
    };
    Ok((parse_number(num)? * scale).round() as i64)
}

fn valid_frequency_range(s: &str) -> Result<FrequencyRange, String> {
    let parts: Vec<_> = s.split(':').collect();
    if parts.len() != 3 {
        return Err("Expected lower:upper:bin_size".to_string());
    }
    Ok(FrequencyRange::new(
        valid_frequency(parts[0])?,
        valid_frequency(parts[1])?,
        valid_frequency(parts[2])?,
    ))
}

/// Seconds with s/m/h suffixes
fn valid_duration(s: &str) -> Result<Duration, String> {
    let (num, suffix) = split_suffix(s, "sSmMhH");
    let scale = match suffix {
        Some('m' | 'M') => 60.0,
        Some('h' | 'H') => 3600.0,
        _ => 1.0,
    };
    let secs = (parse_number(num)? * scale).round();
    if secs < 0.0 {
        return Err("Duration can't be negative".to_string());
    }
    Ok(Duration::from_secs(secs as u64))
}

fn valid_crop(s: &str) -> Result<f64, String> {
    let crop = match split_suffix(s, "%") {
        (num, Some(_)) => parse_number(num)? / 100.0,
        (num, None) => parse_number(num)?,
    };
    if !(0.0..=1.0).contains(&crop) {
        return Err("Crop value outside of 0 to 1".to_string());
    }
    Ok(crop)
}

fn valid_fir_size(s: &str) -> Result<u32, String> {
    match s {
        "0" => Ok(0),
        "9" => Ok(9),
        _ => Err("FIR size can be 0 or 9".to_string()),
    }
}

fn valid_window(s: &str) -> Result<WindowFunction, String> {
    s.parse()
}

fn valid_source(s: &str) -> Result<Source, String> {
    if s == "silence" {
        return Ok(Source::Silence);
    }
    if let Some(path) = s.strip_prefix("file:") {
        return Ok(Source::File(PathBuf::from(path)));
    }
    if let Some(tone) = s.strip_prefix("tone:") {
        let mut parts = tone.splitn(2, ':');
        let hz = valid_frequency(parts.next().unwrap_or_default())?;
        let amplitude = match parts.next() {
            Some(a) => parse_number(a)?,
            None => 8192.0,
        };
        return Ok(Source::Tone { hz, amplitude });
    }
    Err("Expected file:<path>, tone:<hz>[:<amplitude>] or silence".to_string())
}
