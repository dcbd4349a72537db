// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::path::PathBuf;

use anyhow::Result;
use structopt::StructOpt;

use crate::calling::{CallerBuilder, ResultWriter};
use crate::errors;
use crate::io::reader::{ReadFilter, DEFAULT_FLAG_MASK};
use crate::model::Priors;

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "somavar",
    about = "A caller for somatic SNVs in tumor-normal sample pairs.",
    setting = structopt::clap::AppSettings::ColoredHelp,
)]
pub struct Somavar {
    #[structopt(
        parse(from_os_str),
        required_unless = "help-format",
        help = "FASTA file with the reference genome. Has to be indexed with samtools faidx."
    )]
    pub reference: Option<PathBuf>,
    #[structopt(
        parse(from_os_str),
        required_unless = "help-format",
        help = "Position-sorted BAM file with reads from the normal sample."
    )]
    pub normal: Option<PathBuf>,
    #[structopt(
        parse(from_os_str),
        required_unless = "help-format",
        help = "Position-sorted BAM file with reads from the tumor sample."
    )]
    pub tumor: Option<PathBuf>,
    #[structopt(
        long = "normal-purity",
        required_unless = "help-format",
        help = "Purity of the normal sample."
    )]
    pub normal_purity: Option<f64>,
    #[structopt(
        long = "tumor-purity",
        required_unless = "help-format",
        help = "Purity of the tumor sample."
    )]
    pub tumor_purity: Option<f64>,
    #[structopt(
        long = "tumor-mass-fraction",
        short = "u",
        default_value = "1.0",
        help = "Fraction of the tumor mass sampled into the tumor library."
    )]
    pub tumor_mass_fraction: f64,
    #[structopt(
        long = "region",
        short = "R",
        help = "Region to call variants in (e.g. 20:15000000-20000000, 1-based inclusive). \
                Requires indexed BAM files."
    )]
    pub region: Option<String>,
    #[structopt(
        long = "output-file",
        short = "o",
        default_value = "",
        help = "Output file (empty or - means STDOUT)."
    )]
    pub output: String,
    #[structopt(
        long = "bins",
        short = "b",
        default_value = "2",
        help = "Maximum number of base quality bins per sample."
    )]
    pub max_bins: u32,
    #[structopt(
        long = "min-mapqual",
        short = "q",
        default_value = "0",
        help = "Minimum mapping quality for reads to be considered."
    )]
    pub min_map_qual: u8,
    #[structopt(
        long = "min-basequal",
        short = "Q",
        default_value = "0",
        help = "Minimum base quality for bases to be considered."
    )]
    pub min_base_qual: u8,
    #[structopt(
        long = "min-somatic-pvalue",
        short = "s",
        default_value = "0.0",
        help = "Minimum somatic probability for a position to be reported."
    )]
    pub min_somatic_pvalue: f64,
    #[structopt(
        long = "normal-het-rate",
        default_value = "0.001",
        help = "Normal heterozygous variant rate."
    )]
    pub normal_het_rate: f64,
    #[structopt(
        long = "normal-hom-rate",
        default_value = "0.0005",
        help = "Normal homozygous variant rate."
    )]
    pub normal_hom_rate: f64,
    #[structopt(
        long = "tumor-bg-rate",
        default_value = "2e-6",
        help = "Tumor background mutation rate."
    )]
    pub tumor_bg_rate: f64,
    #[structopt(
        long = "precision",
        short = "p",
        default_value = "6",
        help = "Floating point precision of reported probabilities."
    )]
    pub precision: usize,
    #[structopt(
        long = "fixed",
        short = "x",
        help = "Use fixed point notation (default is scientific)."
    )]
    pub fixed: bool,
    #[structopt(
        long = "max-depth",
        short = "m",
        default_value = "1000000",
        help = "Maximum expected read depth at any position (sizes the lookup tables)."
    )]
    pub max_depth: usize,
    #[structopt(long = "help-format", help = "Describe the output format and exit.")]
    pub help_format: bool,
}

pub fn run(opt: Somavar) -> Result<()> {
    if opt.help_format {
        println!("{}", ResultWriter::describe_format());
        return Ok(());
    }

    let missing = |name: &str| errors::Error::MissingArgument {
        name: name.to_owned(),
    };
    let reference = opt.reference.ok_or_else(|| missing("FASTA"))?;
    let normal = opt.normal.ok_or_else(|| missing("NORMAL"))?;
    let tumor = opt.tumor.ok_or_else(|| missing("TUMOR"))?;
    let normal_purity = opt.normal_purity.ok_or_else(|| missing("--normal-purity"))?;
    let tumor_purity = opt.tumor_purity.ok_or_else(|| missing("--tumor-purity"))?;

    for &(name, value) in &[
        ("--normal-purity", normal_purity),
        ("--tumor-purity", tumor_purity),
        ("--tumor-mass-fraction", opt.tumor_mass_fraction),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(errors::Error::InvalidFraction {
                name: name.to_owned(),
                value,
            }
            .into());
        }
    }

    let filter = ReadFilter::new(DEFAULT_FLAG_MASK, opt.min_map_qual);

    let mut caller = CallerBuilder::default()
        .alignments(&normal, &tumor, opt.region.as_deref(), filter)?
        .fasta(&reference)?
        .output(&opt.output, opt.fixed, opt.precision)?
        .normal_purity(normal_purity)
        .tumor_purity(tumor_purity)
        .tumor_mass_fraction(opt.tumor_mass_fraction)
        .priors(Priors {
            normal_het_rate: opt.normal_het_rate,
            normal_hom_rate: opt.normal_hom_rate,
            tumor_bg_rate: opt.tumor_bg_rate,
        })
        .min_base_qual(opt.min_base_qual)
        .min_somatic_pvalue(opt.min_somatic_pvalue)
        .max_bins(opt.max_bins)
        .max_depth(opt.max_depth)
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;

    caller.call()
}
