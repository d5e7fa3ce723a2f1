//! Transcript alignment table parsing
//!
//! Reads the tab-separated alignment table (transcript id, chromosome,
//! genomic start position, CIGAR) and builds one immutable `CigarIndex`
//! per transcript. Supports both plain and BGZF-compressed input.

use crate::cigar::CigarError;
use crate::index::CigarIndex;
use log::info;
use noodles::bgzf;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Error as IoError, Read, Seek, SeekFrom};
use std::num::ParseIntError;

#[derive(Debug)]
pub enum ParseErr {
    NotEnoughFields(u64),
    IoError(IoError),
    InvalidField(ParseIntError),
    DuplicateTranscript(String),
    InvalidCigar {
        transcript: String,
        source: CigarError,
    },
}

impl fmt::Display for ParseErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErr::NotEnoughFields(line) => {
                write!(f, "Not enough fields in alignment record at line {}", line)
            }
            ParseErr::IoError(e) => write!(f, "IO error: {}", e),
            ParseErr::InvalidField(e) => write!(f, "Invalid field: {}", e),
            ParseErr::DuplicateTranscript(transcript) => {
                write!(f, "Duplicate transcript encountered: {}", transcript)
            }
            ParseErr::InvalidCigar { transcript, source } => {
                write!(f, "Transcript {}: {}", transcript, source)
            }
        }
    }
}

impl std::error::Error for ParseErr {}

/// One alignment of a transcript onto a chromosome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub chrom: String,
    pub index: CigarIndex,
}

/// All transcript alignments, keyed by transcript id.
///
/// Built once from the alignment table and never mutated; lookups are
/// read-only and safe to share across query workers.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TranscriptIndex {
    records: FxHashMap<String, TranscriptRecord>,
}

struct RawRecord {
    transcript: String,
    chrom: String,
    genomic_start_pos: i64,
    cigar: String,
}

impl TranscriptIndex {
    /// Parse the alignment table and build all indexes.
    ///
    /// Rows are read and checked for duplicate transcript ids first; index
    /// construction then fans out per transcript, since each row is
    /// independent of every other.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ParseErr> {
        let mut raw_records = Vec::new();
        let mut seen: FxHashSet<String> = FxHashSet::default();

        for (line_number, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(ParseErr::IoError)?;
            if line.is_empty() {
                continue;
            }
            let record = parse_alignment_line(&line, line_number as u64 + 1)?;
            if !seen.insert(record.transcript.clone()) {
                return Err(ParseErr::DuplicateTranscript(record.transcript));
            }
            raw_records.push(record);
        }

        info!("Indexing CIGARs for {} transcripts", raw_records.len());

        let records = raw_records
            .into_par_iter()
            .map(|raw| {
                let index =
                    CigarIndex::build(raw.genomic_start_pos, &raw.cigar).map_err(|source| {
                        ParseErr::InvalidCigar {
                            transcript: raw.transcript.clone(),
                            source,
                        }
                    })?;
                Ok((
                    raw.transcript,
                    TranscriptRecord {
                        chrom: raw.chrom,
                        index,
                    },
                ))
            })
            .collect::<Result<FxHashMap<_, _>, ParseErr>>()?;

        Ok(Self { records })
    }

    pub fn get(&self, transcript: &str) -> Option<&TranscriptRecord> {
        self.records.get(transcript)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TranscriptRecord)> {
        self.records.iter()
    }
}

fn parse_alignment_line(line: &str, line_number: u64) -> Result<RawRecord, ParseErr> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 4 {
        return Err(ParseErr::NotEnoughFields(line_number));
    }

    let genomic_start_pos = fields[2].parse::<i64>().map_err(ParseErr::InvalidField)?;

    Ok(RawRecord {
        transcript: fields[0].to_string(),
        chrom: fields[1].to_string(),
        genomic_start_pos,
        cigar: fields[3].to_string(),
    })
}

const BGZF_HEADER_SIZE: usize = 18;

/// Check whether a file starts with a valid BGZF header.
/// Returns `Ok(false)` for regular gzip, too-small files, or plain text.
fn is_bgzf<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    let mut header = [0u8; BGZF_HEADER_SIZE];
    let ok = match reader.read_exact(&mut header) {
        Ok(()) => {
            header[0..4] == [0x1f, 0x8b, 0x08, 0x04] // gzip magic, DEFLATE, FEXTRA
                && header[10..16] == [0x06, 0x00, b'B', b'C', 0x02, 0x00] // XLEN=6, BC subfield, SLEN=2
        }
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e),
    };
    reader.seek(SeekFrom::Start(0))?;
    Ok(ok)
}

/// Open a tab-separated input file, transparently decoding BGZF when the
/// path ends in `.gz`/`.bgz`.
pub fn open_text_input(path: &str) -> io::Result<Box<dyn BufRead>> {
    let mut file = File::open(path)?;
    if [".gz", ".bgz"].iter().any(|e| path.ends_with(e)) {
        if !is_bgzf(&mut file)? {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "'{}' is regular gzip, not BGZF. Convert with: zcat '{}' | bgzip > output.bgz",
                    path, path
                ),
            ));
        }
        Ok(Box::new(BufReader::new(bgzf::io::Reader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
