// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Precomputed lookup tables for the probability machinery. The phred tables
//! are fixed-size lazy statics; the depth-dependent tables live in [`Lut`],
//! which the driver builds once before the calling loop and shares read-only.

use num_complex::Complex64;
use statrs::function::gamma::ln_gamma;

/// Convenience table size. The driver passes its configured maximum read
/// depth instead; this default only backs `Lut::default()`.
pub const DEFAULT_MAX_READ_DEPTH: usize = 5000;

lazy_static! {
    static ref PHRED_TO_PROB: [f64; 256] = {
        let mut table = [0.0; 256];
        for (q, entry) in table.iter_mut().enumerate() {
            *entry = 10f64.powf(q as f64 / -10.0);
        }
        table
    };
    static ref PHRED_TO_PROB_RECIPROCAL: [f64; 256] = {
        let mut table = [0.0; 256];
        for (q, entry) in table.iter_mut().enumerate() {
            *entry = 1.0 / PHRED_TO_PROB[q];
        }
        table
    };
}

/// Error probability 10^(-q/10) of a phred-scaled base quality.
#[inline]
pub fn phred_to_prob(q: u8) -> f64 {
    PHRED_TO_PROB[q as usize]
}

/// Reciprocal of [`phred_to_prob`], used for harmonic means.
#[inline]
pub fn phred_to_prob_reciprocal(q: u8) -> f64 {
    PHRED_TO_PROB_RECIPROCAL[q as usize]
}

/// Depth-dependent lookup tables: ln-gamma over [1, max_read_depth] and the
/// principal roots of unity e^(2πi/n) for n in [2, max_read_depth].
pub struct Lut {
    lgamma: Vec<f64>,
    roots_of_unity: Vec<Complex64>,
}

impl Lut {
    /// Build the tables for read depths up to `max_read_depth`.
    pub fn new(max_read_depth: usize) -> Self {
        let mut lgamma = vec![0.0; max_read_depth + 1];
        for (x, entry) in lgamma.iter_mut().enumerate().skip(1) {
            *entry = ln_gamma(x as f64);
        }

        let mut roots_of_unity = vec![Complex64::new(1.0, 0.0); max_read_depth + 1];
        for (n, entry) in roots_of_unity.iter_mut().enumerate().skip(2) {
            *entry = (Complex64::i() * (2.0 * std::f64::consts::PI / n as f64)).exp();
        }

        Lut {
            lgamma,
            roots_of_unity,
        }
    }

    /// ln Γ(x): table lookup in range, library call beyond.
    #[inline]
    pub fn ln_gamma(&self, x: usize) -> f64 {
        debug_assert!(x > 0);
        if x < self.lgamma.len() {
            self.lgamma[x]
        } else {
            ln_gamma(x as f64)
        }
    }

    /// The principal n-th root of unity. Unused by the calling model itself;
    /// kept for Fourier-based convolution of more than two bins.
    #[inline]
    pub fn root_of_unity(&self, n: usize) -> Complex64 {
        self.roots_of_unity[n]
    }
}

impl Default for Lut {
    fn default() -> Self {
        Lut::new(DEFAULT_MAX_READ_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phred_tables() {
        for q in 0..=255u8 {
            let expected = 10f64.powf(q as f64 / -10.0);
            assert_eq!(phred_to_prob(q), expected);
            assert_eq!(phred_to_prob_reciprocal(q), 1.0 / expected);
        }
    }

    #[test]
    fn test_ln_gamma_lookup() {
        let lut = Lut::new(256);
        for x in 1..256 {
            assert_eq!(lut.ln_gamma(x), ln_gamma(x as f64));
        }
        // beyond the table falls back to the library function
        assert_eq!(lut.ln_gamma(1000), ln_gamma(1000.0));
    }

    #[test]
    fn test_roots_of_unity() {
        let lut = Lut::new(100);
        assert_eq!(lut.root_of_unity(1), Complex64::new(1.0, 0.0));
        for n in 2..=100 {
            let expected = (Complex64::i() * (2.0 * std::f64::consts::PI / n as f64)).exp();
            assert_eq!(lut.root_of_unity(n), expected, "at n={}", n);
        }
    }
}
