// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp;
use std::collections::VecDeque;

use crate::io::pileup::Pileup;
use crate::io::reader::{AlignedRead, PosCmp};

/// Relation between the frontiers of two overlap buffers; `Overlap` carries
/// the intersection of the two frontier intervals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferCmp {
    Before,
    Overlap { begin: i64, end: i64 },
    After,
}

/// Per-stream queue of alignments covering the current reference frontier,
/// in stream order. The input being position-sorted, the front record's
/// start bounds every later record's start.
///
/// `end` tracks the *front* record's end: the buffer guarantees coverage of
/// `[start, end)` by at least the front record; later records may extend
/// further but are not yet coordinated with the peer stream.
#[derive(Debug, Default)]
pub struct PileupBuffer {
    buf: VecDeque<AlignedRead>,
    end: i64,
}

impl PileupBuffer {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn front(&self) -> Option<&AlignedRead> {
        self.buf.front()
    }

    /// Target id of the buffered records, -1 if empty.
    pub fn tid(&self) -> i32 {
        self.buf.front().map_or(-1, |read| read.tid())
    }

    pub fn start(&self) -> i64 {
        self.buf.front().map_or(0, |read| read.start())
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// Whether `push` accepts this record: any record into an empty buffer,
    /// otherwise only records overlapping the front record's interval.
    pub fn accepts(&self, read: &AlignedRead) -> bool {
        match self.buf.front() {
            None => true,
            Some(front) => front.cmp(read) == PosCmp::Overlap,
        }
    }

    /// Append a record. The caller must have checked `accepts` and keeps
    /// rejected records for a later attempt.
    pub fn push(&mut self, read: AlignedRead) {
        debug_assert!(self.accepts(&read));
        if self.buf.is_empty() {
            self.end = read.end();
        }
        self.buf.push_back(read);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.end = 0;
    }

    /// Drop records on earlier targets and records on `tid` that end at or
    /// before `pos`; `end` follows the new front.
    pub fn clear_before(&mut self, tid: i32, pos: i64) {
        while let Some(front) = self.buf.front() {
            if front.tid() > tid || (front.tid() == tid && front.end() > pos) {
                break;
            }
            self.buf.pop_front();
        }
        self.end = self.buf.front().map_or(0, |read| read.end());
    }

    /// Base evidence of all records covering `pos`, in stream order.
    pub fn pileup(&mut self, pos: i64) -> Pileup {
        let mut entries = Vec::with_capacity(self.buf.len());
        for read in self.buf.iter_mut() {
            if read.start() > pos {
                break;
            }
            if read.end() > pos {
                if let Some(entry) = read.pileup_at(pos) {
                    entries.push(entry);
                }
            }
        }
        Pileup::new(entries)
    }

    /// Compare the frontier intervals of two buffers; on overlap, also
    /// return the intersection `(max of starts, min of ends)`.
    pub fn cmp(&self, other: &PileupBuffer) -> BufferCmp {
        if self.tid() < other.tid() {
            return BufferCmp::Before;
        }
        if other.tid() < self.tid() {
            return BufferCmp::After;
        }

        if self.end() <= other.start() {
            return BufferCmp::Before;
        }
        if other.end() <= self.start() {
            return BufferCmp::After;
        }

        BufferCmp::Overlap {
            begin: cmp::max(self.start(), other.start()),
            end: cmp::min(self.end(), other.end()),
        }
    }
}
