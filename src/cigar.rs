//! CIGAR tokenization
//!
//! Turns a CIGAR string into an ordered sequence of (length, operation)
//! pairs. Only the operations meaningful for transcript-to-genome
//! translation are accepted: M, X, = (consume both sequences), D, N
//! (consume genome only) and I, S (consume transcript only). P and H have
//! no transcript-side representation and are rejected.

use std::fmt;

#[derive(Debug, PartialEq)]
pub enum CigarError {
    /// No `<digits><letter>` token anywhere in the string.
    Unparsable(String),
    /// A token named an operation outside {M, X, =, D, N, I, S}.
    UnsupportedOperation(char),
}

impl fmt::Display for CigarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CigarError::Unparsable(cigar) => {
                write!(f, "Could not parse CIGAR '{}': expected <digits><operation> tokens", cigar)
            }
            CigarError::UnsupportedOperation(op) => {
                write!(f, "Unsupported CIGAR operation '{}': only M, X, =, D, N, I and S are supported", op)
            }
        }
    }
}

impl std::error::Error for CigarError {}

/// A single CIGAR operation, packed with the operation in the three most
/// significant bits and the length in the remaining 29.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    val: u32,
}

impl CigarOp {
    pub fn new(len: u32, op: char) -> Result<Self, CigarError> {
        let val = match op {
            'M' => 0,
            'X' => 1,
            '=' => 2,
            'D' => 3,
            'N' => 4,
            'I' => 5,
            'S' => 6,
            _ => return Err(CigarError::UnsupportedOperation(op)),
        };
        Ok(Self {
            val: (val << 29) | len,
        })
    }

    pub fn op(&self) -> char {
        // three most significant bits in the val tell us the op
        match self.val >> 29 {
            0 => 'M',
            1 => 'X',
            2 => '=',
            3 => 'D',
            4 => 'N',
            5 => 'I',
            6 => 'S',
            _ => unreachable!("invalid packed CIGAR operation: {}", self.val >> 29),
        }
    }

    pub fn len(&self) -> u32 {
        self.val & ((1 << 29) - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// M, X, =, I and S all advance the transcript coordinate.
    pub fn consumes_transcript(&self) -> bool {
        !matches!(self.op(), 'D' | 'N')
    }

    /// M, X, =, D and N all advance the genome coordinate.
    pub fn consumes_genome(&self) -> bool {
        !matches!(self.op(), 'I' | 'S')
    }

    /// Transcript-only blocks: bases with no genome counterpart.
    pub fn is_insertion(&self) -> bool {
        matches!(self.op(), 'I' | 'S')
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len(), self.op())
    }
}

/// Tokenize a CIGAR string.
///
/// Scans for runs of ASCII digits immediately followed by an operation
/// character. Anything else between tokens (whitespace, stray punctuation,
/// a digit run with no trailing letter) is skipped rather than rejected.
/// Fails when the whole string yields no token, or when a token names an
/// unsupported operation.
pub fn parse_cigar(cigar: &str) -> Result<Vec<CigarOp>, CigarError> {
    let mut ops = Vec::new();
    let bytes = cigar.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let mut len: u32 = 0;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            len = len * 10 + u32::from(bytes[i] - b'0');
            i += 1;
        }
        if i < bytes.len() && (bytes[i].is_ascii_alphabetic() || bytes[i] == b'=') {
            ops.push(CigarOp::new(len, bytes[i] as char)?);
            i += 1;
        }
    }

    if ops.is_empty() {
        return Err(CigarError::Unparsable(cigar.to_string()));
    }
    Ok(ops)
}
