//! The radio as the sweep sees it
//!
//! Discovery, gain and the rest of driver setup happen elsewhere. The sweep only
//! needs to retune, set the rate, and pull blocks of interleaved CS16 samples.

use std::{
    f64::consts::PI,
    io::{Read, Seek, SeekFrom},
    time::Duration,
};

use byte_slice_cast::AsMutByteSlice;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("sample overflow")]
    Overflow,

    #[error("failed to tune to {0} Hz")]
    Tuning(i64),

    #[error("stream error {0}")]
    Stream(i32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Device {
    fn set_frequency(&mut self, channel: usize, hz: i64) -> Result<(), DeviceError>;

    fn set_sample_rate(&mut self, channel: usize, hz: i64) -> Result<(), DeviceError>;

    /// Read up to `max_samples` complex samples into `buffer` (interleaved, so it
    /// must hold `2 * max_samples` values). Returns the number of samples read.
    fn read_block(
        &mut self,
        channel: usize,
        buffer: &mut [i16],
        max_samples: usize,
        timeout: Duration,
    ) -> Result<usize, DeviceError>;

    fn frequency(&self, channel: usize) -> i64;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn set_frequency(&mut self, channel: usize, hz: i64) -> Result<(), DeviceError> {
        (**self).set_frequency(channel, hz)
    }

    fn set_sample_rate(&mut self, channel: usize, hz: i64) -> Result<(), DeviceError> {
        (**self).set_sample_rate(channel, hz)
    }

    fn read_block(
        &mut self,
        channel: usize,
        buffer: &mut [i16],
        max_samples: usize,
        timeout: Duration,
    ) -> Result<usize, DeviceError> {
        (**self).read_block(channel, buffer, max_samples, timeout)
    }

    fn frequency(&self, channel: usize) -> i64 {
        (**self).frequency(channel)
    }
}

/// Replays a raw CS16 little-endian capture, rewinding at the end
pub struct FileDevice<R> {
    reader: R,
    frequency: i64,
    sample_rate: i64,
}

impl<R: Read + Seek> FileDevice<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            frequency: 0,
            sample_rate: 0,
        }
    }

    pub fn sample_rate(&self) -> i64 {
        self.sample_rate
    }

    fn fill(&mut self, bytes: &mut [u8]) -> Result<usize, DeviceError> {
        let mut filled = 0;
        let mut rewound = false;
        while filled < bytes.len() {
            match self.reader.read(&mut bytes[filled..])? {
                0 if rewound => break,
                0 => {
                    self.reader.seek(SeekFrom::Start(0))?;
                    rewound = true;
                }
                n => {
                    filled += n;
                    rewound = false;
                }
            }
        }
        Ok(filled)
    }
}

impl<R: Read + Seek> Device for FileDevice<R> {
    fn set_frequency(&mut self, _channel: usize, hz: i64) -> Result<(), DeviceError> {
        self.frequency = hz;
        Ok(())
    }

    fn set_sample_rate(&mut self, _channel: usize, hz: i64) -> Result<(), DeviceError> {
        self.sample_rate = hz;
        Ok(())
    }

    fn read_block(
        &mut self,
        _channel: usize,
        buffer: &mut [i16],
        max_samples: usize,
        _timeout: Duration,
    ) -> Result<usize, DeviceError> {
        let block = &mut buffer[..2 * max_samples];
        let filled = self.fill(block.as_mut_byte_slice())?;
        // Whole complex samples only
        let values = filled / 4 * 2;
        for s in &mut block[..values] {
            *s = i16::from_le(*s);
        }
        if values == 0 && max_samples > 0 {
            return Err(DeviceError::Stream(-1));
        }
        Ok(values / 2)
    }

    fn frequency(&self, _channel: usize) -> i64 {
        self.frequency
    }
}

/// A single complex tone at a fixed RF frequency. Tuned anywhere that puts the
/// tone outside the captured band it reads zeros.
#[derive(Debug, Clone)]
pub struct ToneDevice {
    tone_hz: i64,
    amplitude: f64,
    frequency: i64,
    sample_rate: i64,
    phase: f64,
}

impl ToneDevice {
    pub fn new(tone_hz: i64, amplitude: f64) -> Self {
        Self {
            tone_hz,
            amplitude,
            frequency: 0,
            sample_rate: 0,
            phase: 0.0,
        }
    }

    /// A device that only ever reads zeros
    pub fn silent() -> Self {
        Self::new(0, 0.0)
    }
}

impl Device for ToneDevice {
    fn set_frequency(&mut self, _channel: usize, hz: i64) -> Result<(), DeviceError> {
        self.frequency = hz;
        Ok(())
    }

    fn set_sample_rate(&mut self, _channel: usize, hz: i64) -> Result<(), DeviceError> {
        self.sample_rate = hz;
        Ok(())
    }

    fn read_block(
        &mut self,
        _channel: usize,
        buffer: &mut [i16],
        max_samples: usize,
        _timeout: Duration,
    ) -> Result<usize, DeviceError> {
        let block = &mut buffer[..2 * max_samples];
        let offset = (self.tone_hz - self.frequency) as f64;
        let rate = self.sample_rate as f64;
        if self.amplitude == 0.0 || rate <= 0.0 || offset.abs() >= rate / 2.0 {
            block.iter_mut().for_each(|s| *s = 0);
            return Ok(max_samples);
        }
        let step = 2.0 * PI * offset / rate;
        for pair in block.chunks_exact_mut(2) {
            pair[0] = (self.amplitude * self.phase.cos()).round() as i16;
            pair[1] = (self.amplitude * self.phase.sin()).round() as i16;
            self.phase = (self.phase + step) % (2.0 * PI);
        }
        Ok(max_samples)
    }

    fn frequency(&self, _channel: usize) -> i64 {
        self.frequency
    }
}
