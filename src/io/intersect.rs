// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The two-stream pileup intersection engine: advances a normal and a tumor
//! alignment stream in lockstep through one overlap buffer each, finds the
//! reference intervals covered by both, and emits synchronized per-position
//! pileups in strictly increasing (target, position) order.

use std::cmp;

use anyhow::{Context, Result};

use crate::errors::Error;
use crate::io::buffer::{BufferCmp, PileupBuffer};
use crate::io::pileup::Pileup;
use crate::io::reader::{AlignmentRead, PosCmp, Region};

/// Callback invoked with every jointly covered position and its two
/// non-empty pileups.
pub type PositionCallback<'a> = &'a mut dyn FnMut(i64, &Pileup, &Pileup) -> Result<()>;

pub struct PileupIntersector<'a> {
    normal: &'a mut dyn AlignmentRead,
    tumor: &'a mut dyn AlignmentRead,
    buf_normal: PileupBuffer,
    buf_tumor: PileupBuffer,
    tid: i32,
    pos: i64,
    region: Option<Region>,
}

impl<'a> PileupIntersector<'a> {
    pub fn new(normal: &'a mut dyn AlignmentRead, tumor: &'a mut dyn AlignmentRead) -> Self {
        let region = normal.region().cloned();
        PileupIntersector {
            normal,
            tumor,
            buf_normal: PileupBuffer::new(),
            buf_tumor: PileupBuffer::new(),
            tid: 0,
            pos: 0,
            region,
        }
    }

    /// Drive both streams to exhaustion. Each position is emitted at most
    /// once; positions are strictly increasing within a target and the
    /// cursor resets on target changes.
    pub fn run(&mut self, cb: PositionCallback) -> Result<()> {
        if let Err(e) = self.run_inner(cb) {
            return Err(e.context(format!(
                "normal buffer at #{}, {} -> {}; tumor buffer at #{}, {} -> {}",
                self.buf_normal.tid(),
                self.buf_normal.start(),
                self.buf_normal.end(),
                self.buf_tumor.tid(),
                self.buf_tumor.start(),
                self.buf_tumor.end()
            )));
        }
        Ok(())
    }

    fn run_inner(&mut self, cb: PositionCallback) -> Result<()> {
        if let Some(read) = self.normal.take()? {
            self.buf_normal.push(read);
        }
        if let Some(read) = self.tumor.take()? {
            self.buf_tumor.push(read);
        }

        loop {
            let cmp = match (self.buf_normal.front(), self.buf_tumor.front()) {
                (Some(normal), Some(tumor)) => normal.cmp(tumor),
                _ => break,
            };

            match cmp {
                PosCmp::Before => {
                    let (tid, start) = (self.buf_tumor.tid(), self.buf_tumor.start());
                    self.buf_normal.clear_before(tid, start);
                }
                PosCmp::After => {
                    let (tid, start) = (self.buf_normal.tid(), self.buf_normal.start());
                    self.buf_tumor.clear_before(tid, start);
                }
                PosCmp::Overlap => self.pileup_overlap(cb)?,
            }

            if self.buf_normal.is_empty() {
                if let Some(read) = self.normal.take()? {
                    self.buf_normal.push(read);
                }
            }
            if self.buf_tumor.is_empty() {
                if let Some(read) = self.tumor.take()? {
                    self.buf_tumor.push(read);
                }
            }
        }

        Ok(())
    }

    /// Both frontiers overlap: greedily refill the buffers, clamp the emit
    /// window and produce per-position pileup pairs.
    fn pileup_overlap(&mut self, cb: PositionCallback) -> Result<()> {
        refill(&mut *self.normal, &mut self.buf_normal)?;
        refill(&mut *self.tumor, &mut self.buf_tumor)?;

        if self.tid != self.buf_normal.tid() {
            // new target, restart the position cursor
            self.pos = 0;
        }
        self.tid = self.buf_normal.tid();

        if let Some(region) = &self.region {
            if self.tid != region.tid {
                return Err(Error::RegionTargetMismatch {
                    expected: region.tid,
                    found: self.tid,
                }
                .into());
            }
        }

        match self.buf_normal.cmp(&self.buf_tumor) {
            BufferCmp::Before => self.buf_normal.clear(),
            BufferCmp::After => self.buf_tumor.clear(),
            BufferCmp::Overlap { begin, end } => {
                self.pos = cmp::max(begin, self.pos);
                let mut end = match self.buf_normal.front() {
                    Some(front) => cmp::min(end, front.end()),
                    None => end,
                };
                if let Some(region) = &self.region {
                    self.pos = cmp::max(region.beg, self.pos);
                    end = cmp::min(region.end, end);
                }

                while self.pos < end {
                    let normal = self.buf_normal.pileup(self.pos);
                    let tumor = self.buf_tumor.pileup(self.pos);
                    if !normal.is_empty() && !tumor.is_empty() {
                        cb(self.pos, &normal, &tumor)
                            .with_context(|| format!("failed to process position {}", self.pos))?;
                    }
                    self.pos += 1;
                }

                let (tid, pos) = (self.tid, self.pos);
                self.buf_normal.clear_before(tid, pos);
                self.buf_tumor.clear_before(tid, pos);
            }
        }

        Ok(())
    }
}

fn refill(reader: &mut dyn AlignmentRead, buffer: &mut PileupBuffer) -> Result<()> {
    loop {
        let accept = match reader.peek()? {
            Some(read) => buffer.accepts(read),
            None => return Ok(()),
        };
        if !accept {
            return Ok(());
        }
        if let Some(read) = reader.take()? {
            buffer.push(read);
        }
    }
}
