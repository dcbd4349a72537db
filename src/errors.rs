// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid region '{region}': expected SEQ[:BEG-END] with 1-based inclusive coordinates")]
    InvalidRegion { region: String },
    #[error("sequence {name} cannot be found in the alignment header")]
    UnknownSequence { name: String },
    #[error("no value for required argument: {name}")]
    MissingArgument { name: String },
    #[error("{name} must be between 0.0 and 1.0, got {value}")]
    InvalidFraction { name: String, value: f64 },
    #[error("contig {contig} not found in the reference")]
    ReferenceContigNotFound { contig: String },
    #[error("failed to read reference contig {contig}: {msg}")]
    ReferenceRead { contig: String, msg: String },
    #[error("position {pos} is beyond the end of reference contig {contig}")]
    ReferenceOutOfRange { contig: String, pos: u64 },
    #[error("probability value {value} is invalid")]
    InvalidProbability { value: f64 },
    #[error("unsupported number of quality bins ({n})")]
    UnsupportedBinCount { n: usize },
    #[error("alignments on target #{found} although the region limit is on target #{expected}")]
    RegionTargetMismatch { expected: i32, found: i32 },
}
