//! Transcript-to-genome interval index
//!
//! A `CigarIndex` maps positions along an aligned transcript to positions
//! on the reference genome. It is built once per transcript by walking the
//! CIGAR left to right and is immutable afterward, so it can be queried
//! concurrently from any number of threads.
//!
//! Intervals come out of construction already sorted, disjoint and
//! contiguous over `[0, transcript_len)`, so point lookup is a binary
//! search over the `begin` boundaries instead of an interval tree.

use crate::cigar::{parse_cigar, CigarError};
use serde::{Deserialize, Serialize};
use std::cmp::max;
use std::fmt;

/// Half-open range `[begin, end)` of transcript positions covered by one
/// CIGAR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptInterval {
    pub begin: i64,
    pub end: i64,
    /// Added to a transcript position inside the range to get the genome
    /// position. Negative when insertions precede the first match block.
    pub genomic_offset: i64,
    /// Transcript-only bases (I/S blocks); no single genome position exists
    /// for these.
    pub is_insertion: bool,
}

impl TranscriptInterval {
    fn contains(&self, transcript_pos: i64) -> bool {
        self.begin <= transcript_pos && transcript_pos < self.end
    }
}

/// The covering interval for one queried transcript position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryHit {
    pub interval_begin: i64,
    pub genomic_offset: i64,
    pub is_insertion: bool,
}

#[derive(Debug, PartialEq)]
pub enum QueryError {
    /// The position is not covered by any interval.
    OutOfBounds(i64),
    /// The position is covered by more than one interval. Construction
    /// guarantees disjointness, so this means the index is corrupt.
    OverlappingIntervals(i64),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::OutOfBounds(pos) => {
                write!(f, "Transcript position {} is out of bounds", pos)
            }
            QueryError::OverlappingIntervals(pos) => {
                write!(
                    f,
                    "Invalid index: transcript position {} lies in two interval blocks",
                    pos
                )
            }
        }
    }
}

impl std::error::Error for QueryError {}

/// Genome-side form of one transcript position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenomePosition {
    /// Ordinary base with a one-to-one genome coordinate.
    At(i64),
    /// Base inside an inserted run. `anchor` is the genome position
    /// immediately left of the run (floored at 0), `span` the 1-based
    /// distance into it.
    Insertion { anchor: i64, span: i64 },
}

impl fmt::Display for GenomePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenomePosition::At(pos) => write!(f, "{}", pos),
            GenomePosition::Insertion { anchor, span } => write!(f, "I{}+{}", anchor, span),
        }
    }
}

/// Immutable interval index over one transcript alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CigarIndex {
    intervals: Vec<TranscriptInterval>,
    transcript_len: i64,
}

impl CigarIndex {
    /// Build the index for a transcript anchored at `genomic_start_pos`.
    ///
    /// Match blocks (M/X/=) emit an interval translating with the running
    /// offset. Deletion blocks (D/N) consume genome only and push the
    /// offset forward. Insertion blocks (I/S) emit an insertion interval,
    /// then pull the offset back by the block length: inserted bases grow
    /// the transcript without consuming genome, and later match blocks
    /// must still translate as `pos + offset`.
    pub fn build(genomic_start_pos: i64, cigar: &str) -> Result<Self, CigarError> {
        let ops = parse_cigar(cigar)?;

        let mut intervals = Vec::with_capacity(ops.len());
        let mut begin: i64 = 0;
        let mut end: i64 = 0;
        let mut offset: i64 = genomic_start_pos;

        for op in &ops {
            let len = i64::from(op.len());
            if op.consumes_transcript() {
                end += len;
                intervals.push(TranscriptInterval {
                    begin,
                    end,
                    genomic_offset: offset,
                    is_insertion: op.is_insertion(),
                });
                begin = end;
                if op.is_insertion() {
                    offset -= len;
                }
            } else {
                offset += len;
            }
        }

        Ok(Self {
            intervals,
            transcript_len: end,
        })
    }

    pub fn intervals(&self) -> &[TranscriptInterval] {
        &self.intervals
    }

    /// Total transcript-consuming length of the alignment.
    pub fn transcript_len(&self) -> i64 {
        self.transcript_len
    }

    /// Find the unique interval covering `transcript_pos`.
    pub fn query(&self, transcript_pos: i64) -> Result<QueryHit, QueryError> {
        // Everything left of the partition point starts at or before the
        // position; of those, covering intervals are the trailing ones
        // whose end lies past it.
        let upper = self
            .intervals
            .partition_point(|interval| interval.begin <= transcript_pos);
        let mut covering = self.intervals[..upper]
            .iter()
            .rev()
            .take_while(|interval| interval.contains(transcript_pos));

        let hit = covering
            .next()
            .ok_or(QueryError::OutOfBounds(transcript_pos))?;
        if covering.next().is_some() {
            return Err(QueryError::OverlappingIntervals(transcript_pos));
        }

        Ok(QueryHit {
            interval_begin: hit.begin,
            genomic_offset: hit.genomic_offset,
            is_insertion: hit.is_insertion,
        })
    }

    /// Translate a transcript position to its genome-side form.
    pub fn translate(&self, transcript_pos: i64) -> Result<GenomePosition, QueryError> {
        let hit = self.query(transcript_pos)?;
        Ok(if hit.is_insertion {
            GenomePosition::Insertion {
                anchor: max(0, hit.interval_begin + hit.genomic_offset - 1),
                span: transcript_pos - hit.interval_begin + 1,
            }
        } else {
            GenomePosition::At(transcript_pos + hit.genomic_offset)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(begin: i64, end: i64, genomic_offset: i64, is_insertion: bool) -> TranscriptInterval {
        TranscriptInterval {
            begin,
            end,
            genomic_offset,
            is_insertion,
        }
    }

    #[test]
    fn test_single_match_block() {
        // Genome: GGACGTACGT...
        //           0123456789
        // Transcript aligned at genome position 2 with a single match run
        let index = CigarIndex::build(2, "8M").unwrap();
        assert_eq!(index.intervals(), &[interval(0, 8, 2, false)]);
        assert_eq!(index.transcript_len(), 8);
        for pos in 0..8 {
            let hit = index.query(pos).unwrap();
            assert_eq!(hit.genomic_offset, 2);
            assert!(!hit.is_insertion);
            assert_eq!(index.translate(pos), Ok(GenomePosition::At(pos + 2)));
        }
    }

    #[test]
    fn test_interval_table_with_insertion() {
        //         0123456        789 11
        // Genome: ---ACGT--------ACGTG
        // Trans:     ACGTGGGGGGGGACGTG
        //            0123456789      16
        let index = CigarIndex::build(3, "4M8I5M").unwrap();
        assert_eq!(
            index.intervals(),
            &[
                interval(0, 4, 3, false),
                interval(4, 12, 3, true),
                interval(12, 17, -5, false),
            ]
        );
        assert_eq!(index.transcript_len(), 17);
    }

    #[test]
    fn test_insertion_anchor_and_span() {
        let index = CigarIndex::build(3, "4M8I5M").unwrap();
        let hit = index.query(5).unwrap();
        assert_eq!(
            hit,
            QueryHit {
                interval_begin: 4,
                genomic_offset: 3,
                is_insertion: true
            }
        );
        // anchor = max(0, 4 + 3 - 1) = 6, span = 5 - 4 + 1 = 2
        assert_eq!(
            index.translate(5),
            Ok(GenomePosition::Insertion { anchor: 6, span: 2 })
        );
        assert_eq!(index.translate(5).unwrap().to_string(), "I6+2");
    }

    #[test]
    fn test_transcript_ahead_of_genome() {
        // Transcript longer than the genomic span at this locus; odd but
        // accepted, and the offset math still holds
        let index = CigarIndex::build(3, "4M8I5M").unwrap();
        assert_eq!(index.translate(16), Ok(GenomePosition::At(11)));
    }

    #[test]
    fn test_leading_insertion_and_trailing_deletion() {
        //           0123456
        // Genome: --GTGACGT--
        // Trans:  AC---ACGT--
        //         01   2345
        let index = CigarIndex::build(0, "2I3D4M1D").unwrap();
        assert_eq!(
            index.intervals(),
            &[interval(0, 2, 0, true), interval(2, 6, 1, false)]
        );
        assert_eq!(index.translate(0).unwrap().to_string(), "I0+1");
        assert_eq!(index.translate(1).unwrap().to_string(), "I0+2");
        assert_eq!(index.translate(2), Ok(GenomePosition::At(3)));
        assert_eq!(index.translate(5), Ok(GenomePosition::At(6)));
    }

    // Two insertion blocks in a row exercise the offset decrement twice
    #[test]
    fn test_all_insertion_offsets() {
        //         012  345
        // Genome: GTG--ACG---
        // Trans:  ---GG---ACGT
        //            01   2345
        let index = CigarIndex::build(0, "3D2I3D4I").unwrap();
        assert_eq!(
            index.intervals(),
            &[interval(0, 2, 3, true), interval(2, 6, 4, true)]
        );
        assert_eq!(index.translate(1).unwrap().to_string(), "I2+2");
        assert_eq!(index.translate(5).unwrap().to_string(), "I5+4");
    }

    #[test]
    fn test_standard_alignments() {
        //         01234567  89
        // Genome: ACGGGGTC--CA
        // Trans:  AC----TCGGCA
        //         01    234567
        let index = CigarIndex::build(0, "2M4D2M2I2M").unwrap();
        assert_eq!(index.translate(7), Ok(GenomePosition::At(9)));
        assert_eq!(index.translate(3), Ok(GenomePosition::At(7)));

        //         012345678910
        // Genome:  ACGTTTTACT
        // Trans:   ACG----ACT
        //          012    345
        let index = CigarIndex::build(1, "3M4D3M").unwrap();
        assert_eq!(index.translate(5), Ok(GenomePosition::At(10)));
        assert_eq!(index.translate(3), Ok(GenomePosition::At(8)));
        assert_eq!(index.translate(2), Ok(GenomePosition::At(3)));
        assert_eq!(index.translate(0), Ok(GenomePosition::At(1)));
    }

    #[test]
    fn test_unsupported_operation_yields_no_index() {
        assert_eq!(
            CigarIndex::build(3, "10M20S30M40P"),
            Err(CigarError::UnsupportedOperation('P'))
        );
    }

    #[test]
    fn test_out_of_bounds() {
        let index = CigarIndex::build(0, "4M").unwrap();
        assert_eq!(index.query(-1), Err(QueryError::OutOfBounds(-1)));
        assert_eq!(index.query(4), Err(QueryError::OutOfBounds(4)));
        assert_eq!(index.query(100), Err(QueryError::OutOfBounds(100)));
    }

    #[test]
    fn test_deletion_only_alignment_covers_nothing() {
        let index = CigarIndex::build(10, "5D").unwrap();
        assert!(index.intervals().is_empty());
        assert_eq!(index.transcript_len(), 0);
        assert_eq!(index.query(0), Err(QueryError::OutOfBounds(0)));
    }

    #[test]
    fn test_overlapping_intervals_detected() {
        // Hand-corrupted index; build can never produce this
        let index = CigarIndex {
            intervals: vec![interval(0, 6, 0, false), interval(2, 8, 10, false)],
            transcript_len: 8,
        };
        assert_eq!(index.query(3), Err(QueryError::OverlappingIntervals(3)));
        // Positions covered once still resolve
        assert_eq!(index.query(1), Ok(QueryHit { interval_begin: 0, genomic_offset: 0, is_insertion: false }));
        assert_eq!(index.query(7), Ok(QueryHit { interval_begin: 2, genomic_offset: 10, is_insertion: false }));
    }

    #[test]
    fn test_intervals_contiguous_and_disjoint() {
        let index = CigarIndex::build(3, "10S20M30M40D20I40M50D100X10M100N50M").unwrap();
        let intervals = index.intervals();
        assert!(!intervals.is_empty());
        assert_eq!(intervals[0].begin, 0);
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].end, pair[1].begin);
        }
        assert_eq!(intervals.last().unwrap().end, index.transcript_len());
        // Every in-range position resolves to exactly one interval
        for pos in 0..index.transcript_len() {
            assert!(index.query(pos).is_ok());
        }
    }

    #[test]
    fn test_match_offset_constant_within_interval() {
        let index = CigarIndex::build(7, "5M3D5M").unwrap();
        for pos in 5..10 {
            assert_eq!(index.translate(pos), Ok(GenomePosition::At(pos + 10)));
        }
    }
}
