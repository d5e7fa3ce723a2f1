//! Query resolution driver
//!
//! Reads the tab-separated query table (transcript id, 0-based transcript
//! position), resolves every query against the transcript dictionary and
//! writes the translated positions back out in input order.

use crate::index::{GenomePosition, QueryError};
use crate::transcripts::TranscriptIndex;
use log::info;
use rayon::prelude::*;
use std::fmt;
use std::io::{self, BufRead, Error as IoError, Write};
use std::num::ParseIntError;

#[derive(Debug)]
pub enum TranslateErr {
    NotEnoughFields(u64),
    IoError(IoError),
    InvalidField(ParseIntError),
    UnknownTranscript(String),
    Query {
        transcript: String,
        transcript_pos: i64,
        source: QueryError,
    },
}

impl fmt::Display for TranslateErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateErr::NotEnoughFields(line) => {
                write!(f, "Not enough fields in query record at line {}", line)
            }
            TranslateErr::IoError(e) => write!(f, "IO error: {}", e),
            TranslateErr::InvalidField(e) => write!(f, "Invalid field: {}", e),
            TranslateErr::UnknownTranscript(transcript) => {
                write!(f, "Query for unknown transcript: {}", transcript)
            }
            TranslateErr::Query {
                transcript,
                transcript_pos,
                source,
            } => write!(f, "{}\t{}: {}", transcript, transcript_pos, source),
        }
    }
}

impl std::error::Error for TranslateErr {}

/// One resolved query line, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedQuery {
    pub transcript: String,
    pub transcript_pos: i64,
    pub chrom: String,
    pub position: GenomePosition,
}

/// Resolve every query line against the transcript dictionary.
///
/// Queries are independent of each other, so resolution fans out across
/// the thread pool; collection preserves input order for the output file.
pub fn translate_queries<R: BufRead>(
    reader: R,
    transcripts: &TranscriptIndex,
) -> Result<Vec<TranslatedQuery>, TranslateErr> {
    let mut queries = Vec::new();
    for (line_number, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(TranslateErr::IoError)?;
        if line.is_empty() {
            continue;
        }
        queries.push(parse_query_line(&line, line_number as u64 + 1)?);
    }

    info!("Translating {} transcript positions", queries.len());

    queries
        .into_par_iter()
        .map(|(transcript, transcript_pos)| {
            let record = transcripts
                .get(&transcript)
                .ok_or_else(|| TranslateErr::UnknownTranscript(transcript.clone()))?;
            let position =
                record
                    .index
                    .translate(transcript_pos)
                    .map_err(|source| TranslateErr::Query {
                        transcript: transcript.clone(),
                        transcript_pos,
                        source,
                    })?;
            Ok(TranslatedQuery {
                transcript,
                transcript_pos,
                chrom: record.chrom.clone(),
                position,
            })
        })
        .collect()
}

fn parse_query_line(line: &str, line_number: u64) -> Result<(String, i64), TranslateErr> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 2 {
        return Err(TranslateErr::NotEnoughFields(line_number));
    }
    let transcript_pos = fields[1]
        .parse::<i64>()
        .map_err(TranslateErr::InvalidField)?;
    Ok((fields[0].to_string(), transcript_pos))
}

/// Write results as `transcript  position  chromosome  genome position`.
pub fn write_results<W: Write>(writer: &mut W, results: &[TranslatedQuery]) -> io::Result<()> {
    for result in results {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            result.transcript, result.transcript_pos, result.chrom, result.position
        )?;
    }
    Ok(())
}
