#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

/// The type of raw samples out of the radio (CS16)
pub type ComplexShort = Complex<i16>;

impl ComplexShort {
    /// real(n * conj(n)), widened so sums over many blocks don't overflow
    pub fn norm_sqr(self) -> i64 {
        self.re as i64 * self.re as i64 + self.im as i64 * self.im as i64
    }
}

/// View an interleaved [I Q I Q ...] buffer as complex samples
pub fn iq_samples(iq: &[i16]) -> impl Iterator<Item = ComplexShort> + '_ {
    iq.chunks_exact(2).map(|pair| Complex::new(pair[0], pair[1]))
}

/// Clamp a widened intermediate back into the sample range
pub fn saturate(x: i32) -> i16 {
    x.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// [`saturate`] for sums too long to fit an `i32`
pub fn saturate_wide(x: i64) -> i16 {
    x.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}
