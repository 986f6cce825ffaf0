//! Window functions applied to each FFT frame before the transform

use std::{f64::consts::PI, fmt, str::FromStr};

/// Scale of the integer coefficient table (8 bits)
pub const WINDOW_SCALE: f64 = 256.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WindowFunction {
    #[default]
    Rectangle,
    Hamming,
    Blackman,
    BlackmanHarris,
    HannPoisson,
    Youssef,
    /// Placeholder, evaluates as a rectangle
    Kaiser,
    Bartlett,
}

impl WindowFunction {
    pub const ALL: [WindowFunction; 8] = [
        WindowFunction::Rectangle,
        WindowFunction::Hamming,
        WindowFunction::Blackman,
        WindowFunction::BlackmanHarris,
        WindowFunction::HannPoisson,
        WindowFunction::Youssef,
        WindowFunction::Kaiser,
        WindowFunction::Bartlett,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WindowFunction::Rectangle => "rectangle",
            WindowFunction::Hamming => "hamming",
            WindowFunction::Blackman => "blackman",
            WindowFunction::BlackmanHarris => "blackman-harris",
            WindowFunction::HannPoisson => "hann-poisson",
            WindowFunction::Youssef => "youssef",
            WindowFunction::Kaiser => "kaiser",
            WindowFunction::Bartlett => "bartlett",
        }
    }

    /// Weight of sample `i` in a frame of `length` samples
    pub fn evaluate(self, i: usize, length: usize) -> f64 {
        let n1 = length as f64 - 1.0;
        let x = i as f64;
        match self {
            WindowFunction::Rectangle | WindowFunction::Kaiser => 1.0,
            WindowFunction::Hamming => {
                let a = 25.0 / 46.0;
                let b = 21.0 / 46.0;
                a - b * (2.0 * x * PI / n1).cos()
            }
            WindowFunction::Blackman => {
                let a0 = 7938.0 / 18608.0;
                let a1 = 9240.0 / 18608.0;
                let a2 = 1430.0 / 18608.0;
                a0 - a1 * (2.0 * x * PI / n1).cos() + a2 * (4.0 * x * PI / n1).cos()
            }
            WindowFunction::BlackmanHarris => blackman_harris(x, n1),
            WindowFunction::HannPoisson => {
                let a = 2.0;
                0.5 * (1.0 - (2.0 * PI * x / n1).cos()) * poisson(a, i, n1)
            }
            // Blackman-Harris-Poisson
            WindowFunction::Youssef => blackman_harris(x, n1) * poisson(0.0025, i, n1),
            WindowFunction::Bartlett => {
                let l = length as f64;
                1.0 - ((x - n1 / 2.0) / (l / 2.0)).abs()
            }
        }
    }

    /// Integer coefficients for a frame of `length`, scaled by [`WINDOW_SCALE`]
    pub fn coefficients(self, length: usize) -> Vec<i32> {
        (0..length)
            .map(|i| (WINDOW_SCALE * self.evaluate(i, length)) as i32)
            .collect()
    }
}

fn blackman_harris(x: f64, n1: f64) -> f64 {
    let a0 = 0.35875;
    let a1 = 0.48829;
    let a2 = 0.14128;
    let a3 = 0.01168;
    a0 - a1 * (2.0 * x * PI / n1).cos() + a2 * (4.0 * x * PI / n1).cos()
        - a3 * (6.0 * x * PI / n1).cos()
}

fn poisson(a: f64, i: usize, n1: f64) -> f64 {
    // Distance from the centre, measured in whole samples
    let d = (n1 as i64 - 1 - 2 * i as i64).abs() as f64;
    (-a * d / n1).exp()
}

impl fmt::Display for WindowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WindowFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WindowFunction::ALL
            .into_iter()
            .find(|w| w.name() == s)
            .ok_or_else(|| format!("unknown window function '{}'", s))
    }
}

/// Integer window table, rebuilt only when the frame length changes
#[derive(Debug, Clone)]
pub struct WindowTable {
    function: WindowFunction,
    coefs: Vec<i32>,
}

impl WindowTable {
    pub fn new(function: WindowFunction, length: usize) -> Self {
        Self {
            function,
            coefs: function.coefficients(length),
        }
    }

    pub fn ensure_length(&mut self, length: usize) {
        if self.coefs.len() != length {
            self.coefs = self.function.coefficients(length);
        }
    }

    pub fn coefs(&self) -> &[i32] {
        &self.coefs
    }

    /// Weight an interleaved frame in place, same coefficient on I and Q
    pub fn apply(&self, frame: &mut [i16]) {
        assert_eq!(frame.len(), 2 * self.coefs.len());
        for (pair, &c) in frame.chunks_exact_mut(2).zip(&self.coefs) {
            for s in pair {
                *s = crate::complex::saturate((*s as i32 * c) >> 8);
            }
        }
    }
}
