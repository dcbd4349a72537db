// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Adaptive binning of per-base qualities. Reads at a position rarely share
//! one error rate; grouping them into few bins with a summary error rate
//! keeps the likelihood tractable (one binomial per bin, convolved).

use std::cmp;
use std::collections::BTreeMap;

use crate::stats::lut;

/// One contiguous bin of a sorted quality vector: its size and the harmonic
/// mean of the corresponding base error probabilities.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QualityBin {
    pub size: u32,
    pub harmonic_mean: f64,
}

impl QualityBin {
    pub fn from_qualities(qualities: &[u8]) -> Self {
        let mut harmonic_mean = 0.0;
        if !qualities.is_empty() {
            let denominator: f64 = qualities
                .iter()
                .map(|&q| lut::phred_to_prob_reciprocal(q))
                .sum();
            harmonic_mean = qualities.len() as f64 / denominator;
        }
        QualityBin {
            size: qualities.len() as u32,
            harmonic_mean,
        }
    }
}

/// Fast path for two bins: split at the single largest adjacent gap.
/// All-equal qualities yield one bin.
fn bin_qualities2(sorted: &[u8]) -> Vec<QualityBin> {
    let mut max_gap = 0u8;
    let mut max_idx = 0usize;
    for i in 1..sorted.len() {
        let gap = sorted[i] - sorted[i - 1];
        if gap > max_gap {
            max_gap = gap;
            max_idx = i;
        }
    }

    if max_gap == 0 {
        vec![QualityBin::from_qualities(sorted)]
    } else {
        vec![
            QualityBin::from_qualities(&sorted[..max_idx]),
            QualityBin::from_qualities(&sorted[max_idx..]),
        ]
    }
}

/// Partition an ascending quality vector into at most `max_bins` contiguous,
/// non-empty bins, splitting at the largest adjacent gaps. Larger gaps win;
/// within one gap class, smaller indices win.
pub fn bin_qualities(sorted: &[u8], max_bins: u32) -> Vec<QualityBin> {
    debug_assert!(!sorted.is_empty());
    debug_assert!(sorted.windows(2).all(|w| w[0] <= w[1]));

    if max_bins == 2 {
        return bin_qualities2(sorted);
    }

    let mut gap_classes: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for i in 1..sorted.len() {
        let gap = sorted[i] - sorted[i - 1];
        if gap > 0 {
            gap_classes.entry(gap).or_insert_with(Vec::new).push(i);
        }
    }

    let n_splittable: usize = gap_classes.values().map(|v| v.len()).sum();
    let n_bins = cmp::max(1, cmp::min(max_bins as usize, n_splittable + 1));
    if n_bins == 1 {
        return vec![QualityBin::from_qualities(sorted)];
    }

    let mut demarcations: Vec<usize> = gap_classes
        .iter()
        .rev()
        .flat_map(|(_, indices)| indices.iter().cloned())
        .take(n_bins - 1)
        .collect();
    demarcations.sort_unstable();

    let mut bins = Vec::with_capacity(n_bins);
    let mut last = 0usize;
    for &idx in &demarcations {
        bins.push(QualityBin::from_qualities(&sorted[last..idx]));
        last = idx;
    }
    bins.push(QualityBin::from_qualities(&sorted[last..]));
    bins
}
