// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Binomial probability mass functions evaluated in log space over the
//! ln-gamma lookup table.

use std::cmp;

use crate::stats::Lut;

/// P(X = k) for X ~ Binomial(n, p).
///
/// Evaluates exp(ln C(n,k) + k ln p + (n-k) ln(1-p)). The combinatorial term
/// vanishes for k = 0 and k = n, and terms with a zero coefficient are
/// omitted so that p ∈ {0, 1} never produces 0 · −∞.
pub fn pmf(lut: &Lut, p: f64, n: u32, k: u32) -> f64 {
    debug_assert!(k <= n);
    let log_binc = if k == 0 || k == n {
        0.0
    } else {
        lut.ln_gamma(n as usize + 1)
            - lut.ln_gamma(k as usize + 1)
            - lut.ln_gamma((n - k) as usize + 1)
    };

    let mut log_value = log_binc;
    if k > 0 {
        log_value += p.ln() * k as f64;
    }
    if n > k {
        log_value += (-p).ln_1p() * (n - k) as f64;
    }
    log_value.exp()
}

/// P(X + Y = k) for independent X ~ Binomial(n1, p1), Y ~ Binomial(n2, p2).
///
/// Sums pmf(p1, n1, i) · pmf(p2, n2, k - i) over the feasible i in log
/// space with a shared log(n1! · n2!) factor.
pub fn convolve2_pmf(lut: &Lut, p1: f64, p2: f64, n1: u32, n2: u32, k: u32) -> f64 {
    debug_assert!(k <= n1 + n2);

    // A degenerate component is a point mass; collapse to a shifted single
    // binomial so the log-space loop never sees ln(0).
    if p1 <= 0.0 {
        return if k <= n2 { pmf(lut, p2, n2, k) } else { 0.0 };
    }
    if p1 >= 1.0 {
        return if k >= n1 { pmf(lut, p2, n2, k - n1) } else { 0.0 };
    }
    if p2 <= 0.0 {
        return if k <= n1 { pmf(lut, p1, n1, k) } else { 0.0 };
    }
    if p2 >= 1.0 {
        return if k >= n2 { pmf(lut, p1, n1, k - n2) } else { 0.0 };
    }

    let lp1 = p1.ln();
    let lq1 = (-p1).ln_1p();
    let lp2 = p2.ln();
    let lq2 = (-p2).ln_1p();

    let begin = k.saturating_sub(n2);
    let limit = cmp::min(k, n1);

    // log(n1! * n2!)
    let bc_top = lut.ln_gamma(n1 as usize + 1) + lut.ln_gamma(n2 as usize + 1);

    let mut rv = 0.0;
    for i in begin..=limit {
        let j = k - i;
        debug_assert!(i <= n1 && j <= n2);

        // log(C(n1, i) * C(n2, j))
        let bc = bc_top
            - lut.ln_gamma(i as usize + 1)
            - lut.ln_gamma((n1 - i) as usize + 1)
            - lut.ln_gamma(j as usize + 1)
            - lut.ln_gamma((n2 - j) as usize + 1);

        let log_value =
            bc + i as f64 * lp1 + (n1 - i) as f64 * lq1 + j as f64 * lp2 + (n2 - j) as f64 * lq2;

        rv += log_value.exp();
    }

    rv
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_convolve2_pmf_worked_example() {
        // X ~ Binom(3, 1/2), Y ~ Binom(5, 1/4):
        // P(X+Y=3) = (1/8)(90/1024) + (3/8)(270/1024) + (3/8)(405/1024)
        //          + (1/8)(243/1024) = 2358/8192
        let lut = Lut::default();
        let p = convolve2_pmf(&lut, 0.5, 0.25, 3, 5, 3);
        assert_relative_eq!(p, 2358.0 / 8192.0, epsilon = 1e-14);
    }

    #[test]
    fn test_convolve2_pmf_against_r() {
        // dbinom convolutions computed with R
        let params: &[(f64, f64, u32, u32, u32, f64)] = &[
            (0.4019479589, 0.839249833, 5, 8, 6, 5.310741e-02),
            (0.5782658223, 0.356853656, 20, 20, 20, 1.177496e-01),
            (0.2780696503, 0.696222218, 16, 15, 15, 1.570055e-01),
            (0.0005520571, 0.541839660, 13, 11, 12, 8.688104e-06),
            (0.9164467736, 0.412507781, 7, 2, 4, 5.618983e-03),
            (0.2702691413, 0.841355638, 16, 4, 10, 9.696953e-02),
            (0.1065676345, 0.992481831, 11, 7, 9, 2.189948e-01),
            (0.0768027040, 0.205165485, 13, 10, 11, 3.639990e-05),
            (0.6778377453, 0.581781673, 15, 11, 13, 5.574166e-02),
            (0.7582510132, 0.001995862, 14, 13, 13, 9.526076e-02),
        ];
        let lut = Lut::default();
        for &(p1, p2, n1, n2, k, expected) in params {
            let result = convolve2_pmf(&lut, p1, p2, n1, n2, k);
            assert!(
                (result - expected).abs() < 1e-7,
                "p1={}; p2={}; n1={}; n2={}; k={}: {} vs {}",
                p1,
                p2,
                n1,
                n2,
                k,
                result,
                expected
            );
        }
    }

    #[test]
    fn test_pmf_in_range_and_sums_to_one() {
        let lut = Lut::default();
        for &p in &[0.0, 1e-9, 0.25, 0.5, 0.75, 1.0 - 1e-9, 1.0] {
            for &n in &[1u32, 7, 40, 100] {
                let mut total = 0.0;
                for k in 0..=n {
                    let v = pmf(&lut, p, n, k);
                    assert!((0.0..=1.0).contains(&v), "pmf({}, {}, {}) = {}", p, n, k, v);
                    total += v;
                }
                assert_relative_eq!(total, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_convolve2_pmf_sums_to_one() {
        let lut = Lut::default();
        for &(p1, p2, n1, n2) in &[(0.3, 0.7, 12, 20), (0.01, 0.99, 25, 15), (0.5, 0.5, 20, 20)] {
            let total: f64 = (0..=n1 + n2).map(|k| convolve2_pmf(&lut, p1, p2, n1, n2, k)).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_convolve2_pmf_matches_direct_sum() {
        let lut = Lut::default();
        let (p1, p2, n1, n2) = (0.13, 0.82, 9, 14);
        for k in 0..=n1 + n2 {
            let direct: f64 = (0..=n1)
                .filter(|&i| k >= i && k - i <= n2)
                .map(|i| pmf(&lut, p1, n1, i) * pmf(&lut, p2, n2, k - i))
                .sum();
            assert_relative_eq!(convolve2_pmf(&lut, p1, p2, n1, n2, k), direct, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_convolve2_pmf_degenerate_components() {
        let lut = Lut::default();
        // p1 = 0 fixes X at 0, p1 = 1 fixes X at n1
        for k in 0..=8u32 {
            assert_relative_eq!(
                convolve2_pmf(&lut, 0.0, 0.3, 3, 5, k),
                if k <= 5 { pmf(&lut, 0.3, 5, k) } else { 0.0 }
            );
            assert_relative_eq!(
                convolve2_pmf(&lut, 1.0, 0.3, 3, 5, k),
                if k >= 3 { pmf(&lut, 0.3, 5, k - 3) } else { 0.0 }
            );
        }
    }
}
