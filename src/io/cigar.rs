// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use rust_htslib::bam::record::Cigar;

/// Whether the operation consumes bases of the read sequence.
pub fn consumes_query(op: &Cigar) -> bool {
    match op {
        Cigar::Match(_) | Cigar::Equal(_) | Cigar::Diff(_) | Cigar::Ins(_) | Cigar::SoftClip(_) => {
            true
        }
        _ => false,
    }
}

/// Whether the operation consumes positions of the reference.
pub fn consumes_reference(op: &Cigar) -> bool {
    match op {
        Cigar::Match(_) | Cigar::Equal(_) | Cigar::Diff(_) | Cigar::Del(_) | Cigar::RefSkip(_) => {
            true
        }
        _ => false,
    }
}

/// Whether the operation aligns a read base against the reference and thus
/// contributes pileup evidence.
pub fn is_match(op: &Cigar) -> bool {
    match op {
        Cigar::Match(_) | Cigar::Equal(_) | Cigar::Diff(_) => true,
        _ => false,
    }
}

/// Number of reference positions covered by the alignment.
pub fn reference_len(cigar: &[Cigar]) -> i64 {
    cigar
        .iter()
        .filter(|op| consumes_reference(op))
        .map(|op| i64::from(op.len()))
        .sum()
}

/// Monotone cursor through one alignment's CIGAR, mapping offsets along the
/// consumed reference to offsets into the read sequence.
///
/// Queries must be non-decreasing; a repeated query returns the same result
/// because the cursor only advances past operations that end before the
/// queried offset.
#[derive(Debug, Default)]
pub struct CigarResolver {
    read_pos: u32,
    ref_pos: u32,
    idx: usize,
    started: bool,
}

impl CigarResolver {
    pub fn new() -> Self {
        Default::default()
    }

    fn advance(&mut self, cigar: &[Cigar]) {
        let op = &cigar[self.idx];
        if consumes_reference(op) {
            self.ref_pos += op.len();
        }
        if consumes_query(op) {
            self.read_pos += op.len();
        }
        self.idx += 1;
    }

    fn advance_to_reference_op(&mut self, cigar: &[Cigar]) {
        while self.idx < cigar.len() && !consumes_reference(&cigar[self.idx]) {
            self.advance(cigar);
        }
    }

    /// The read offset carrying base evidence for reference offset `pos`
    /// (0-based, relative to the alignment start), or None if the position
    /// falls into a deletion or reference skip, or past the alignment end.
    pub fn read_offset(&mut self, cigar: &[Cigar], pos: u32) -> Option<u32> {
        if !self.started {
            // skip leading soft clips and insertions
            self.advance_to_reference_op(cigar);
            self.started = true;
        }

        while self.idx < cigar.len() && pos >= self.ref_pos + cigar[self.idx].len() {
            self.advance(cigar);
            self.advance_to_reference_op(cigar);
        }

        if self.idx >= cigar.len() || !is_match(&cigar[self.idx]) {
            return None;
        }
        Some(self.read_pos + (pos - self.ref_pos))
    }
}
