//! Iterative radix-2 Cooley–Tukey FFT
//!
//! Twiddle factors and the bit-reversal table are computed once at
//! construction so `process` does no allocation.

use crate::error::{Error, Result};
use std::f32::consts::PI;
use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Complex {
    pub re: f32,
    pub im: f32,
}

impl Complex {
    pub const ZERO: Complex = Complex { re: 0.0, im: 0.0 };

    pub fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }

    pub fn norm(&self) -> f32 {
        (self.re * self.re + self.im * self.im).sqrt()
    }
}

impl Add for Complex {
    type Output = Complex;
    fn add(self, rhs: Complex) -> Complex {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Complex;
    fn sub(self, rhs: Complex) -> Complex {
        Complex::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Complex;
    fn mul(self, rhs: Complex) -> Complex {
        Complex::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

/// Precomputed in-place FFT of a fixed power-of-two size
pub struct Fft {
    size: usize,
    /// exp(-2πik/N) for k in 0..N/2
    twiddles: Vec<Complex>,
    /// Bit-reversed index for each position
    bit_reversed: Vec<usize>,
}

impl Fft {
    pub fn new(size: usize) -> Result<Self> {
        if size < 2 || !size.is_power_of_two() {
            return Err(Error::InvalidFftSize(size));
        }

        let twiddles = (0..size / 2)
            .map(|k| {
                let angle = -2.0 * PI * k as f32 / size as f32;
                Complex::new(angle.cos(), angle.sin())
            })
            .collect();

        let bits = size.trailing_zeros();
        let bit_reversed = (0..size)
            .map(|i| i.reverse_bits() >> (usize::BITS - bits))
            .collect();

        Ok(Self {
            size,
            twiddles,
            bit_reversed,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward transform in place; `buffer.len()` must equal `size()`
    pub fn process(&self, buffer: &mut [Complex]) {
        debug_assert_eq!(buffer.len(), self.size);
        let n = self.size;

        for i in 0..n {
            let j = self.bit_reversed[i];
            if j > i {
                buffer.swap(i, j);
            }
        }

        // log2(N) butterfly stages, span doubling each pass
        let mut span = 2;
        while span <= n {
            let half = span / 2;
            let stride = n / span;
            for start in (0..n).step_by(span) {
                for k in 0..half {
                    let w = self.twiddles[k * stride];
                    let even = buffer[start + k];
                    let odd = buffer[start + k + half] * w;
                    buffer[start + k] = even + odd;
                    buffer[start + k + half] = even - odd;
                }
            }
            span *= 2;
        }
    }
}
