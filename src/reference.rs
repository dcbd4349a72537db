// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bio::io::fasta;

use crate::errors::Error;

/// Random access to the reference genome, buffering one contig at a time.
pub struct Buffer {
    reader: fasta::IndexedReader<fs::File>,
    contig: Option<String>,
    sequence: Vec<u8>,
}

impl Buffer {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = fasta::IndexedReader::from_file(&path.as_ref()).with_context(|| {
            format!(
                "failed to open reference FASTA {} (a .fai index is required)",
                path.as_ref().display()
            )
        })?;
        Ok(Buffer {
            reader,
            contig: None,
            sequence: Vec::new(),
        })
    }

    /// The reference base at a 1-based position of the given contig.
    /// An unknown contig is fatal; a position beyond the contig end yields
    /// `Error::ReferenceOutOfRange`, which the caller may tolerate.
    pub fn base_at(&mut self, contig: &str, pos: u64) -> Result<u8, Error> {
        debug_assert!(pos >= 1);
        if self.contig.as_deref() != Some(contig) {
            self.reader
                .fetch_all(contig)
                .map_err(|_| Error::ReferenceContigNotFound {
                    contig: contig.to_owned(),
                })?;
            self.reader
                .read(&mut self.sequence)
                .map_err(|e| Error::ReferenceRead {
                    contig: contig.to_owned(),
                    msg: e.to_string(),
                })?;
            self.contig = Some(contig.to_owned());
        }

        self.sequence
            .get(pos as usize - 1)
            .copied()
            .ok_or_else(|| Error::ReferenceOutOfRange {
                contig: contig.to_owned(),
                pos,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fasta_fixture(dir: &tempfile::TempDir, name: &str, seq: &str) -> std::path::PathBuf {
        let path = dir.path().join("ref.fa");
        let mut fasta = fs::File::create(&path).unwrap();
        write!(fasta, ">{}\n{}\n", name, seq).unwrap();

        let mut fai = fs::File::create(dir.path().join("ref.fa.fai")).unwrap();
        write!(
            fai,
            "{}\t{}\t{}\t{}\t{}\n",
            name,
            seq.len(),
            name.len() + 2,
            seq.len(),
            seq.len() + 1
        )
        .unwrap();
        path
    }

    #[test]
    fn test_base_at() {
        let dir = tempfile::tempdir().unwrap();
        let path = fasta_fixture(&dir, "1", "ACGTN");
        let mut buffer = Buffer::from_path(&path).unwrap();

        assert_eq!(buffer.base_at("1", 1).unwrap(), b'A');
        assert_eq!(buffer.base_at("1", 4).unwrap(), b'T');
        assert_eq!(buffer.base_at("1", 5).unwrap(), b'N');

        match buffer.base_at("1", 6) {
            Err(Error::ReferenceOutOfRange { pos: 6, .. }) => {}
            other => panic!("expected out-of-range error, got {:?}", other.map(char::from)),
        }

        assert!(matches!(
            buffer.base_at("17", 1),
            Err(Error::ReferenceContigNotFound { .. })
        ));
    }
}
