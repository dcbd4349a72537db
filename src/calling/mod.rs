// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The calling driver: wires the two alignment streams, the reference and
//! the output together, runs the pileup intersector and evaluates the joint
//! genotype model at every jointly covered position.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use derive_builder::Builder;
use itertools::Itertools;

use crate::errors::Error;
use crate::io::intersect::PileupIntersector;
use crate::io::pileup::{variant_allele, Pileup};
use crate::io::reader::{AlignmentRead, BamReader, ReadFilter, RegionLimitedBamReader};
use crate::model::{PairModel, Priors, Sample};
use crate::reference;
use crate::stats::Lut;
use crate::utils;

/// Variant allele frequency prior, identical for both samples.
const VARIANT_FREQUENCY: f64 = 0.5;

#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Caller {
    #[builder(private)]
    normal: Box<dyn AlignmentRead>,
    #[builder(private)]
    tumor: Box<dyn AlignmentRead>,
    #[builder(private)]
    reference: reference::Buffer,
    #[builder(private)]
    writer: ResultWriter,
    #[builder(private)]
    target_names: Vec<String>,
    normal_purity: f64,
    tumor_purity: f64,
    tumor_mass_fraction: f64,
    priors: Priors,
    min_base_qual: u8,
    min_somatic_pvalue: f64,
    max_bins: u32,
    max_depth: usize,
}

impl CallerBuilder {
    /// Open the normal and tumor alignment streams, region-limited if a
    /// region is given, and install the record filter on both.
    pub fn alignments<P: AsRef<Path>>(
        mut self,
        normal: P,
        tumor: P,
        region: Option<&str>,
        filter: ReadFilter,
    ) -> Result<Self> {
        let (mut normal, mut tumor): (Box<dyn AlignmentRead>, Box<dyn AlignmentRead>) =
            match region {
                Some(region) => (
                    Box::new(RegionLimitedBamReader::from_path(normal, region)?),
                    Box::new(RegionLimitedBamReader::from_path(tumor, region)?),
                ),
                None => (
                    Box::new(BamReader::from_path(normal)?),
                    Box::new(BamReader::from_path(tumor)?),
                ),
            };
        normal.set_filter(filter);
        tumor.set_filter(filter);

        self = self.target_names(normal.target_names().to_vec());
        Ok(self.normal(normal).tumor(tumor))
    }

    /// Open the indexed reference FASTA.
    pub fn fasta<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        Ok(self.reference(reference::Buffer::from_path(path)?))
    }

    /// Write results to the given path; empty or `-` means standard output.
    pub fn output(self, path: &str, fixed_point: bool, precision: usize) -> Result<Self> {
        Ok(self.writer(ResultWriter::from_path(path, fixed_point, precision)?))
    }
}

impl Caller {
    /// Run the calling loop over every position covered by both streams.
    pub fn call(&mut self) -> Result<()> {
        let lut = Lut::new(self.max_depth);
        let started = Instant::now();

        let normal_purity = self.normal_purity;
        let tumor_purity = self.tumor_purity;
        let tumor_mass_fraction = self.tumor_mass_fraction;
        let priors = self.priors;
        let min_base_qual = self.min_base_qual;
        let min_somatic_pvalue = self.min_somatic_pvalue;
        let max_bins = self.max_bins;

        let Caller {
            normal,
            tumor,
            reference,
            writer,
            target_names,
            ..
        } = self;

        let mut cb = |pos: i64, normal_pileup: &Pileup, tumor_pileup: &Pileup| -> Result<()> {
            let tid = match normal_pileup.tid() {
                Some(tid) => tid,
                None => return Ok(()),
            };
            let sequence_name = &target_names[tid as usize];

            let ref_base = match reference.base_at(sequence_name, (pos + 1) as u64) {
                Ok(base) => utils::nt16_code(base),
                Err(Error::ReferenceOutOfRange { .. }) => {
                    warn!(
                        "pileup at {}:{} lies beyond the end of the reference sequence, \
                         probably due to alignments hanging off the end; skipping",
                        sequence_name, pos
                    );
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            let normal_supporting = normal_pileup.reads_matching(ref_base, min_base_qual);
            let tumor_supporting = tumor_pileup.reads_matching(ref_base, min_base_qual);
            if normal_supporting == normal_pileup.len() as u32
                && tumor_supporting == tumor_pileup.len() as u32
            {
                // no read deviates from the reference, nothing to call
                return Ok(());
            }

            let normal_counts = normal_pileup.base_counts();
            let tumor_counts = tumor_pileup.base_counts();
            let normal_variant = variant_allele(ref_base, &normal_counts);
            let tumor_variant = variant_allele(ref_base, &tumor_counts);

            let normal_quals = normal_pileup.base_qualities(min_base_qual);
            let tumor_quals = tumor_pileup.base_qualities(min_base_qual);
            if normal_quals.is_empty() || tumor_quals.is_empty() {
                return Ok(());
            }

            let normal_sample = Sample::new(
                normal_supporting,
                VARIANT_FREQUENCY,
                normal_purity,
                tumor_mass_fraction * (1.0 - normal_purity),
                &normal_quals,
                max_bins,
            );
            let tumor_sample = Sample::new(
                tumor_supporting,
                VARIANT_FREQUENCY,
                tumor_mass_fraction * tumor_purity,
                1.0 - tumor_purity,
                &tumor_quals,
                max_bins,
            );

            let model = PairModel::new(&lut, &normal_sample, &tumor_sample, &priors)?;
            if model.prob_somatic() < min_somatic_pvalue {
                return Ok(());
            }

            writer.write_call(&Call {
                sequence_name,
                pos,
                ref_base,
                normal_variant,
                tumor_variant,
                normal_counts,
                tumor_counts,
                normal: &normal_sample,
                tumor: &tumor_sample,
                model: &model,
            })
        };

        let mut intersector = PileupIntersector::new(normal.as_mut(), tumor.as_mut());
        intersector.run(&mut cb)?;

        writer.flush()?;
        info!("main loop took {:.2}s", started.elapsed().as_secs_f64());
        Ok(())
    }
}

/// One accepted position, ready for serialization.
pub struct Call<'a> {
    pub sequence_name: &'a str,
    pub pos: i64,
    pub ref_base: u8,
    pub normal_variant: u8,
    pub tumor_variant: u8,
    pub normal_counts: [u32; 4],
    pub tumor_counts: [u32; 4],
    pub normal: &'a Sample,
    pub tumor: &'a Sample,
    pub model: &'a PairModel,
}

/// Serializes accepted calls as tab-separated records.
pub struct ResultWriter {
    out: Box<dyn Write>,
    fixed_point: bool,
    precision: usize,
}

impl ResultWriter {
    pub fn from_path(path: &str, fixed_point: bool, precision: usize) -> Result<Self> {
        let out: Box<dyn Write> = if path.is_empty() || path == "-" {
            Box::new(io::BufWriter::new(io::stdout()))
        } else {
            Box::new(io::BufWriter::new(File::create(path).with_context(
                || format!("failed to open output file {}", path),
            )?))
        };
        Ok(ResultWriter::new(out, fixed_point, precision))
    }

    pub fn new(out: Box<dyn Write>, fixed_point: bool, precision: usize) -> Self {
        ResultWriter {
            out,
            fixed_point,
            precision,
        }
    }

    fn prob(&self, value: f64) -> String {
        if self.fixed_point {
            format!("{:.*}", self.precision, value)
        } else {
            format!("{:.*e}", self.precision, value)
        }
    }

    pub fn write_call(&mut self, call: &Call) -> Result<()> {
        let base_char = |code: u8| {
            if code != 0 {
                utils::nt16_char(code)
            } else {
                '.'
            }
        };
        writeln!(
            self.out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            call.sequence_name,
            call.pos,
            call.pos + 1,
            utils::nt16_char(call.ref_base),
            base_char(call.normal_variant),
            base_char(call.tumor_variant),
            call.normal_counts.iter().join(","),
            call.tumor_counts.iter().join(","),
            call.normal.total_reads,
            call.normal.supporting_reads,
            call.tumor.total_reads,
            call.tumor.supporting_reads,
            self.prob(call.model.prob_homozygous_variant()),
            self.prob(call.model.prob_heterozygous_variant()),
            self.prob(call.model.prob_somatic()),
            self.prob(call.model.prob_loh()),
            self.prob(call.model.prob_uninteresting()),
        )
        .context("failed to write result record")
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("failed to flush output")
    }

    /// Human-readable description of the output columns.
    pub fn describe_format() -> String {
        let fields = [
            "Sequence name (chromosome)",
            "Start position (0-based)",
            "End position (0-based)",
            "Reference allele",
            "Normal variant allele",
            "Tumor variant allele",
            "Normal base occurrence counts (A,C,G,T)",
            "Tumor base occurrence counts (A,C,G,T)",
            "Normal read count at this position",
            "Normal reads supporting reference at this position",
            "Tumor read count at this position",
            "Tumor reads supporting reference at this position",
            "Probability of homozygous variant",
            "Probability of heterozygous variant",
            "Probability of somatic variant",
            "Probability of loss of heterozygosity event",
            "Probability of 'uninteresting' event",
        ];

        let mut description = String::from("\nOutput format (all fields are tab separated):\n\n");
        for (i, field) in fields.iter().enumerate() {
            description.push_str(&format!("\t{}) {}\n", i + 1, field));
        }
        description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bins::QualityBin;

    fn sample(total: u32, supporting: u32, purity: f64) -> Sample {
        Sample::with_bins(
            total,
            supporting,
            VARIANT_FREQUENCY,
            purity,
            1.0 - purity,
            vec![QualityBin {
                size: total,
                harmonic_mean: 1e-3,
            }],
        )
    }

    #[test]
    fn test_write_call_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.tsv");

        let lut = Lut::default();
        let priors = Priors {
            normal_het_rate: 0.001,
            normal_hom_rate: 0.0005,
            tumor_bg_rate: 2e-6,
        };
        let normal = sample(30, 30, 1.0);
        let tumor = sample(25, 10, 0.9);
        let model = PairModel::new(&lut, &normal, &tumor, &priors).unwrap();

        {
            let mut writer =
                ResultWriter::from_path(path.to_str().unwrap(), false, 6).unwrap();
            writer
                .write_call(&Call {
                    sequence_name: "21",
                    pos: 41,
                    ref_base: 1,
                    normal_variant: 0,
                    tumor_variant: 4,
                    normal_counts: [30, 0, 0, 0],
                    tumor_counts: [10, 0, 15, 0],
                    normal: &normal,
                    tumor: &tumor,
                    model: &model,
                })
                .unwrap();
            writer.flush().unwrap();
        }

        let line = std::fs::read_to_string(&path).unwrap();
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        assert_eq!(fields.len(), 17);
        assert_eq!(&fields[..8], &["21", "41", "42", "A", ".", "G", "30,0,0,0", "10,0,15,0"]);
        assert_eq!(&fields[8..12], &["30", "30", "25", "10"]);
        for prob in &fields[12..] {
            let value: f64 = prob.parse().unwrap();
            assert!((0.0..=1.0).contains(&value), "{}", prob);
        }
    }

    #[test]
    fn test_describe_format() {
        let description = ResultWriter::describe_format();
        assert!(description.contains("17) Probability of 'uninteresting' event"));
    }
}
