// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Alignment stream access. Two concrete readers (whole file and
//! region-limited) expose the same capability set through [`AlignmentRead`];
//! the driver is polymorphic over either.

use std::path::Path;

use anyhow::{Context, Result};
use rust_htslib::bam::record::CigarString;
use rust_htslib::bam::{self, Read};

use crate::errors::Error;
use crate::io::cigar::{reference_len, CigarResolver};
use crate::io::pileup::PileupEntry;
use crate::utils;

/// Flags excluding a record from calling by default: unmapped, secondary,
/// QC fail, duplicate, supplementary.
pub const DEFAULT_FLAG_MASK: u16 = 0x4 | 0x100 | 0x200 | 0x400 | 0x800;

/// Record filter applied by the readers before a record becomes visible
/// through `peek`/`take`.
#[derive(Clone, Copy, Debug)]
pub struct ReadFilter {
    mask: u16,
    min_map_qual: u8,
}

impl ReadFilter {
    pub fn new(mask: u16, min_map_qual: u8) -> Self {
        ReadFilter { mask, min_map_qual }
    }

    pub fn accept(&self, record: &bam::Record) -> bool {
        record.flags() & self.mask == 0 && record.mapq() >= self.min_map_qual
    }
}

impl Default for ReadFilter {
    /// Accept everything; the driver installs its mask explicitly.
    fn default() -> Self {
        ReadFilter::new(0, 0)
    }
}

/// Relation between two reference intervals, ordered across targets by
/// target id and within a target by half-open interval.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PosCmp {
    Before,
    Overlap,
    After,
}

/// One alignment taken from a stream: the decoded record, its precomputed
/// exclusive reference end, and a monotone CIGAR cursor for pileup
/// extraction.
#[derive(Debug)]
pub struct AlignedRead {
    record: bam::Record,
    cigar: CigarString,
    end: i64,
    resolver: CigarResolver,
}

impl AlignedRead {
    pub fn new(record: bam::Record) -> Self {
        let cigar = record.cigar().take();
        let end = record.pos() + reference_len(&cigar);
        AlignedRead {
            record,
            cigar,
            end,
            resolver: CigarResolver::new(),
        }
    }

    pub fn tid(&self) -> i32 {
        self.record.tid()
    }

    pub fn start(&self) -> i64 {
        self.record.pos()
    }

    /// Exclusive end on the reference, start + CIGAR-consumed length.
    pub fn end(&self) -> i64 {
        self.end
    }

    /// 4-bit base code at a read offset.
    pub fn base(&self, offset: usize) -> u8 {
        utils::encoded_base(self.record.seq().encoded, offset)
    }

    pub fn base_quality(&self, offset: usize) -> u8 {
        self.record.qual()[offset]
    }

    pub fn cmp(&self, other: &AlignedRead) -> PosCmp {
        if self.tid() < other.tid() {
            return PosCmp::Before;
        }
        if other.tid() < self.tid() {
            return PosCmp::After;
        }

        if self.end() <= other.start() {
            return PosCmp::Before;
        }
        if other.end() <= self.start() {
            return PosCmp::After;
        }

        PosCmp::Overlap
    }

    /// This read's base evidence at reference position `pos`, None if the
    /// position maps into a deletion or skip. Positions must be queried in
    /// non-decreasing order.
    pub fn pileup_at(&mut self, pos: i64) -> Option<PileupEntry> {
        debug_assert!(pos >= self.start() && pos < self.end());
        let offset = self
            .resolver
            .read_offset(&self.cigar, (pos - self.start()) as u32)?;
        Some(PileupEntry {
            tid: self.tid(),
            base: self.base(offset as usize),
            qual: self.base_quality(offset as usize),
        })
    }
}

/// Half-open 0-based interval on one target, parsed from 1-based inclusive
/// `seq[:beg-end]` syntax.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Region {
    pub tid: i32,
    pub beg: i64,
    pub end: i64,
}

impl Region {
    pub fn parse(region_str: &str, header: &bam::HeaderView) -> Result<Self> {
        let invalid = || Error::InvalidRegion {
            region: region_str.to_owned(),
        };

        let (name, range) = match region_str.find(':') {
            Some(i) => (&region_str[..i], Some(&region_str[i + 1..])),
            None => (region_str, None),
        };

        let tid = header
            .tid(name.as_bytes())
            .ok_or_else(|| Error::UnknownSequence {
                name: name.to_owned(),
            })?;
        let target_len = header.target_len(tid).unwrap_or(0) as i64;

        let (beg, end) = match range {
            None => (0, target_len),
            Some(range) => {
                let mut bounds = range.splitn(2, '-');
                let beg: i64 = bounds
                    .next()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(invalid)?
                    .parse()
                    .map_err(|_| invalid())?;
                let end: i64 = match bounds.next() {
                    Some(s) => s.parse().map_err(|_| invalid())?,
                    None => target_len,
                };
                if beg < 1 || end < beg {
                    return Err(invalid().into());
                }
                (beg - 1, end)
            }
        };

        Ok(Region {
            tid: tid as i32,
            beg,
            end,
        })
    }
}

/// Capability set shared by the alignment stream readers.
pub trait AlignmentRead {
    /// Next accepted record, transferring ownership to the caller.
    fn take(&mut self) -> Result<Option<AlignedRead>>;

    /// Next accepted record without consuming it. May read from the
    /// underlying stream, hence fallible.
    fn peek(&mut self) -> Result<Option<&AlignedRead>>;

    /// Target names indexed by target id.
    fn target_names(&self) -> &[String];

    /// The region this reader is limited to, if any.
    fn region(&self) -> Option<&Region> {
        None
    }

    fn set_filter(&mut self, filter: ReadFilter);
}

fn target_names(header: &bam::HeaderView) -> Vec<String> {
    header
        .target_names()
        .iter()
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect()
}

/// Whole-file reader over a position-sorted SAM/BAM/CRAM file.
pub struct BamReader {
    reader: bam::Reader,
    target_names: Vec<String>,
    filter: ReadFilter,
    peeked: Option<AlignedRead>,
}

impl BamReader {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = bam::Reader::from_path(&path).with_context(|| {
            format!(
                "failed to open alignment file {}",
                path.as_ref().display()
            )
        })?;
        let target_names = target_names(reader.header());
        Ok(BamReader {
            reader,
            target_names,
            filter: ReadFilter::default(),
            peeked: None,
        })
    }

    fn read_accepted(&mut self) -> Result<Option<AlignedRead>> {
        read_accepted(&mut self.reader, &self.filter)
    }
}

fn read_accepted<R: bam::Read>(reader: &mut R, filter: &ReadFilter) -> Result<Option<AlignedRead>> {
    let mut record = bam::Record::new();
    loop {
        match reader.read(&mut record) {
            None => return Ok(None),
            Some(Err(e)) => return Err(e).context("failed to read alignment record"),
            Some(Ok(())) => {
                if filter.accept(&record) {
                    return Ok(Some(AlignedRead::new(record)));
                }
            }
        }
    }
}

impl AlignmentRead for BamReader {
    fn take(&mut self) -> Result<Option<AlignedRead>> {
        if let Some(read) = self.peeked.take() {
            return Ok(Some(read));
        }
        self.read_accepted()
    }

    fn peek(&mut self) -> Result<Option<&AlignedRead>> {
        if self.peeked.is_none() {
            self.peeked = self.read_accepted()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn target_names(&self) -> &[String] {
        &self.target_names
    }

    fn set_filter(&mut self, filter: ReadFilter) {
        self.filter = filter;
    }
}

/// Indexed reader restricted to one region; the intersector still clamps the
/// emitted positions, because the index returns every overlapping read.
pub struct RegionLimitedBamReader {
    reader: bam::IndexedReader,
    region: Region,
    target_names: Vec<String>,
    filter: ReadFilter,
    peeked: Option<AlignedRead>,
}

impl RegionLimitedBamReader {
    pub fn from_path<P: AsRef<Path>>(path: P, region_str: &str) -> Result<Self> {
        let mut reader = bam::IndexedReader::from_path(&path).with_context(|| {
            format!(
                "failed to open indexed alignment file {}",
                path.as_ref().display()
            )
        })?;
        let region = Region::parse(region_str, reader.header()).with_context(|| {
            format!(
                "failed to parse region '{}' for {}",
                region_str,
                path.as_ref().display()
            )
        })?;
        let target_names = target_names(reader.header());
        reader
            .fetch((region.tid, region.beg, region.end))
            .with_context(|| format!("failed to fetch region '{}'", region_str))?;

        Ok(RegionLimitedBamReader {
            reader,
            region,
            target_names,
            filter: ReadFilter::default(),
            peeked: None,
        })
    }

    fn read_accepted(&mut self) -> Result<Option<AlignedRead>> {
        read_accepted(&mut self.reader, &self.filter)
    }
}

impl AlignmentRead for RegionLimitedBamReader {
    fn take(&mut self) -> Result<Option<AlignedRead>> {
        if let Some(read) = self.peeked.take() {
            return Ok(Some(read));
        }
        self.read_accepted()
    }

    fn peek(&mut self) -> Result<Option<&AlignedRead>> {
        if self.peeked.is_none() {
            self.peeked = self.read_accepted()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn target_names(&self) -> &[String] {
        &self.target_names
    }

    fn region(&self) -> Option<&Region> {
        Some(&self.region)
    }

    fn set_filter(&mut self, filter: ReadFilter) {
        self.filter = filter;
    }
}

/// Convert an hts-readable alignment file into a coordinate BAM with a
/// `.bai` index next to it.
pub fn sam_to_indexed_bam<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<()> {
    let mut reader = bam::Reader::from_path(&input)
        .with_context(|| format!("failed to open {}", input.as_ref().display()))?;
    let header = bam::Header::from_template(reader.header());

    {
        let mut writer = bam::Writer::from_path(&output, &header, bam::Format::BAM)
            .with_context(|| format!("failed to open {} for writing", output.as_ref().display()))?;
        let mut record = bam::Record::new();
        loop {
            match reader.read(&mut record) {
                None => break,
                Some(result) => {
                    result.context("failed to read alignment record")?;
                    writer.write(&record).with_context(|| {
                        format!("failed to write record to {}", output.as_ref().display())
                    })?;
                }
            }
        }
    }

    bam::index::build(&output, None, bam::index::Type::BAI, 1)
        .with_context(|| format!("failed to index {}", output.as_ref().display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sam_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".sam")
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const SAM: &str = "@SQ\tSN:1\tLN:247249719\n\
        READ1\t0\t1\t1\t60\t4M\t*\t0\t0\tACGT\tIIII\n\
        READ2\t4\t1\t3\t60\t4M\t*\t0\t0\tACGT\tIIII\n\
        READ3\t0\t1\t5\t0\t4M\t*\t0\t0\tACGT\tIIII\n";

    #[test]
    fn test_take_and_peek() {
        let sam = sam_file(SAM);
        let mut reader = BamReader::from_path(sam.path()).unwrap();
        assert_eq!(reader.target_names(), ["1".to_owned()]);

        let first_start = reader.peek().unwrap().unwrap().start();
        assert_eq!(first_start, 0);
        // peek must not consume
        let read = reader.take().unwrap().unwrap();
        assert_eq!(read.start(), 0);
        assert_eq!(read.end(), 4);

        assert_eq!(reader.take().unwrap().unwrap().start(), 2);
        assert_eq!(reader.take().unwrap().unwrap().start(), 4);
        assert!(reader.take().unwrap().is_none());
    }

    #[test]
    fn test_filter() {
        let sam = sam_file(SAM);
        let mut reader = BamReader::from_path(sam.path()).unwrap();
        // mask drops the unmapped READ2, the quality bound drops READ3
        reader.set_filter(ReadFilter::new(DEFAULT_FLAG_MASK, 10));
        assert_eq!(reader.take().unwrap().unwrap().start(), 0);
        assert!(reader.take().unwrap().is_none());
    }

    #[test]
    fn test_aligned_read_cmp() {
        let sam = sam_file(
            "@SQ\tSN:1\tLN:1000\n\
             @SQ\tSN:2\tLN:1000\n\
             READ1\t0\t1\t10\t60\t4M\t*\t0\t0\tACGT\tIIII\n\
             READ2\t0\t1\t13\t60\t4M\t*\t0\t0\tACGT\tIIII\n\
             READ3\t0\t1\t14\t60\t4M\t*\t0\t0\tACGT\tIIII\n\
             READ4\t0\t2\t10\t60\t4M\t*\t0\t0\tACGT\tIIII\n",
        );
        let mut reader = BamReader::from_path(sam.path()).unwrap();
        let a = reader.take().unwrap().unwrap();
        let b = reader.take().unwrap().unwrap();
        let c = reader.take().unwrap().unwrap();
        let d = reader.take().unwrap().unwrap();

        assert_eq!(a.cmp(&b), PosCmp::Overlap);
        assert_eq!(a.cmp(&c), PosCmp::Before);
        assert_eq!(c.cmp(&a), PosCmp::After);
        assert_eq!(a.cmp(&d), PosCmp::Before);
        assert_eq!(d.cmp(&a), PosCmp::After);
    }

    #[test]
    fn test_region_parse() {
        let sam = sam_file(SAM);
        let sam_reader = bam::Reader::from_path(sam.path()).unwrap();
        let header = sam_reader.header();

        let region = Region::parse("1:9-11", header).unwrap();
        assert_eq!(
            region,
            Region {
                tid: 0,
                beg: 8,
                end: 11
            }
        );

        let region = Region::parse("1", header).unwrap();
        assert_eq!(
            region,
            Region {
                tid: 0,
                beg: 0,
                end: 247249719
            }
        );

        assert!(Region::parse("17:1-10", header).is_err());
        assert!(Region::parse("1:0-10", header).is_err());
        assert!(Region::parse("1:10-2", header).is_err());
        assert!(Region::parse("1:x-2", header).is_err());
    }
}
