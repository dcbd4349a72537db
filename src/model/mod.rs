// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The joint genotype model over a tumor-normal pair. For one position, the
//! sixteen ordered combinations of diploid genotypes over {VAR, REF} are
//! weighted by prior · likelihood(normal) · likelihood(tumor); the somatic,
//! LOH and uninteresting events are marginal sums over that table.

pub mod bins;
pub mod sample;

pub use self::sample::Sample;

use anyhow::Result;

use crate::errors::Error;
use crate::model::bins::QualityBin;
use crate::stats::{binomial, Lut};

/// One allele of a diploid genotype, collapsed to "the reference base" or
/// "any of the three non-reference bases".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AlleleType {
    Var = 0,
    Ref = 1,
}

const V: AlleleType = AlleleType::Var;
const R: AlleleType = AlleleType::Ref;

/// An ordered diploid genotype; order encodes the parental haplotype.
pub type Genotype = [AlleleType; 2];

/// Population rates parameterizing the genotype prior.
#[derive(Clone, Copy, Debug)]
pub struct Priors {
    pub normal_het_rate: f64,
    pub normal_hom_rate: f64,
    pub tumor_bg_rate: f64,
}

impl Priors {
    /// Per-haplotype transition probability ψ of the tumor allele given the
    /// normal allele. A normal VAR haplotype mutates into one of three
    /// distinct non-reference bases, hence the division.
    pub fn psi(&self, normal: AlleleType, tumor: AlleleType) -> f64 {
        let mut p = self.tumor_bg_rate;
        if normal == V {
            p /= 3.0;
        }
        if normal == tumor {
            p = 1.0 - p;
        }
        p
    }

    /// Joint prior of a (normal, tumor) genotype pair: the normal marginal
    /// times ψ per haplotype.
    pub fn genotype_prior(&self, normal: Genotype, tumor: Genotype) -> f64 {
        let marginal = if normal[0] == normal[1] {
            if normal[0] == R {
                1.0 - self.normal_het_rate - self.normal_hom_rate
            } else {
                self.normal_hom_rate
            }
        } else {
            self.normal_het_rate / 2.0
        };

        marginal * self.psi(normal[0], tumor[0]) * self.psi(normal[1], tumor[1])
    }
}

/// Probability that a read of `sample` shows the reference base under the
/// given genotype hypothesis, for one error bin. Both the sample's own
/// genotype and the contaminating peer genotype contribute variant alleles,
/// weighted by the purity mixture.
fn prob_observe_ref(sample: &Sample, own: Genotype, peer: Genotype, err: f64) -> f64 {
    let nvar_own = (2 - own[0] as u32 - own[1] as u32) as f64;
    let nvar_peer = (2 - peer[0] as u32 - peer[1] as u32) as f64;
    let p_own = nvar_own * sample.adjusted_purity;
    let p_peer = nvar_peer * sample.adjusted_purity_complement;

    1.0 - (1.0 - 4.0 / 3.0 * err) * (p_own + p_peer) / 2.0 - err
}

/// P(observed reads | genotypes) for one sample: a binomial over the
/// supporting-read count for a single bin, the convolution of two binomials
/// for two bins. More bins are not supported.
pub fn likelihood(lut: &Lut, sample: &Sample, own: Genotype, peer: Genotype) -> Result<f64> {
    let p_ref = |bin: &QualityBin| -> Result<f64> {
        let p = prob_observe_ref(sample, own, peer, bin.harmonic_mean);
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::InvalidProbability { value: p }.into());
        }
        Ok(p)
    };

    let bins = sample.bins();
    let rv = match bins.len() {
        1 => binomial::pmf(
            lut,
            p_ref(&bins[0])?,
            sample.total_reads,
            sample.supporting_reads,
        ),
        2 => binomial::convolve2_pmf(
            lut,
            p_ref(&bins[0])?,
            p_ref(&bins[1])?,
            bins[0].size,
            bins[1].size,
            sample.supporting_reads,
        ),
        n => return Err(Error::UnsupportedBinCount { n }.into()),
    };

    if !(0.0..=1.0).contains(&rv) {
        return Err(Error::InvalidProbability { value: rv }.into());
    }
    Ok(rv)
}

/// The computed joint genotype table of one position.
pub struct PairModel {
    table: [f64; 16],
    inv_prob_data: f64,
}

impl PairModel {
    /// Fill the table. Eight combinations are their own mirror image; the
    /// four heterozygous pairs are computed once, mirrored into the
    /// symmetric index and counted twice.
    pub fn new(lut: &Lut, normal: &Sample, tumor: &Sample, priors: &Priors) -> Result<Self> {
        let mut model = PairModel {
            table: [0.0; 16],
            inv_prob_data: 0.0,
        };
        let mut prob_data = 0.0;

        for &(n, t) in &[
            ([R, R], [R, R]),
            ([R, R], [V, V]),
            ([R, V], [R, R]),
            ([V, R], [R, R]),
            ([V, V], [R, R]),
            ([V, V], [R, V]),
            ([V, V], [V, R]),
            ([V, V], [V, V]),
        ] {
            prob_data += model.store(lut, normal, tumor, priors, n, t)?;
        }

        for &((n, t), (n_mirror, t_mirror)) in &[
            (([R, V], [R, V]), ([V, R], [V, R])),
            (([R, V], [V, R]), ([V, R], [R, V])),
            (([R, R], [R, V]), ([R, R], [V, R])),
            (([R, V], [V, V]), ([V, R], [V, V])),
        ] {
            let joint = model.store(lut, normal, tumor, priors, n, t)?;
            model.table[Self::index(n_mirror, t_mirror)] = joint;
            prob_data += 2.0 * joint;
        }

        if prob_data != 0.0 {
            let mut inv = 1.0 / prob_data;
            // prob_data can be so small that its reciprocal overflows
            if inv.is_infinite() {
                inv = std::f64::MAX;
            }
            model.inv_prob_data = inv;
        }

        Ok(model)
    }

    #[inline]
    fn index(normal: Genotype, tumor: Genotype) -> usize {
        (normal[0] as usize) << 3
            | (normal[1] as usize) << 2
            | (tumor[0] as usize) << 1
            | tumor[1] as usize
    }

    fn store(
        &mut self,
        lut: &Lut,
        normal: &Sample,
        tumor: &Sample,
        priors: &Priors,
        n: Genotype,
        t: Genotype,
    ) -> Result<f64> {
        let prior = priors.genotype_prior(n, t);
        let prob_normal = likelihood(lut, normal, n, t)?;
        let prob_tumor = likelihood(lut, tumor, t, n)?;

        let joint = prior * prob_normal * prob_tumor;
        self.table[Self::index(n, t)] = joint;
        Ok(joint)
    }

    pub fn prob_homozygous_variant(&self) -> f64 {
        self.inv_prob_data * self.table[Self::index([R, R], [V, V])]
    }

    pub fn prob_heterozygous_variant(&self) -> f64 {
        self.inv_prob_data
            * (self.table[Self::index([R, R], [V, R])] + self.table[Self::index([R, R], [R, V])])
    }

    pub fn prob_somatic(&self) -> f64 {
        self.prob_homozygous_variant() + self.prob_heterozygous_variant()
    }

    pub fn prob_loh(&self) -> f64 {
        self.inv_prob_data
            * (self.table[Self::index([R, V], [R, R])] + self.table[Self::index([V, R], [R, R])])
    }

    pub fn prob_uninteresting(&self) -> f64 {
        self.inv_prob_data
            * (self.table[Self::index([R, R], [R, R])]
                + self.table[Self::index([V, R], [V, R])]
                + self.table[Self::index([V, R], [R, V])]
                + self.table[Self::index([V, R], [V, V])]
                + self.table[Self::index([R, V], [V, R])]
                + self.table[Self::index([R, V], [R, V])]
                + self.table[Self::index([R, V], [V, V])]
                + self.table[Self::index([V, V], [R, R])]
                + self.table[Self::index([V, V], [V, R])]
                + self.table[Self::index([V, V], [R, V])]
                + self.table[Self::index([V, V], [V, V])])
    }
}
