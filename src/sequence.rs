//! Plain string transforms over nucleotide sequences.
//!
//! Coordinates are signed so window arithmetic can go below zero before it
//! is resolved; [`py_slice`] resolves them with the same wrap-then-clamp
//! rules Python slicing uses.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

impl Strand {
    pub fn symbol(&self) -> char {
        match self {
            Self::Plus => '+',
            Self::Minus => '-',
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Complement of a single letter. `U`, `N` and anything unknown map to themselves.
#[inline(always)]
pub fn complement_letter(letter: u8) -> u8 {
    match letter {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' => b'a',
        other => other,
    }
}

pub fn reverse_complement(seq: &str) -> String {
    seq.bytes()
        .rev()
        .map(|b| complement_letter(b) as char)
        .collect()
}

/// `seq[start:end]` with Python semantics: negative indices count from the
/// end, out-of-range indices clamp, an inverted range is empty.
pub fn py_slice(seq: &str, start: isize, end: isize) -> &str {
    let len = seq.len() as isize;
    let resolve = |i: isize| -> usize {
        let i = if i < 0 { i + len } else { i };
        i.clamp(0, len) as usize
    };
    let (from, to) = (resolve(start), resolve(end));
    if from >= to {
        return "";
    }
    seq.get(from..to).unwrap_or("")
}

pub fn transcribe(seq: &str) -> String {
    seq.replace('T', "U").replace('t', "u")
}

pub fn back_transcribe(seq: &str) -> String {
    seq.replace('U', "T").replace('u', "t")
}

#[inline(always)]
pub fn is_dna(seq: &str) -> bool {
    seq.bytes().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T'))
}
