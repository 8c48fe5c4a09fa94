//! The requested edit and every coordinate rule that depends on its kind.
//!
//! Each rule is a small pure function of the edit, the strand and a few
//! window coordinates. Coordinates are 0-based offsets into the 121 nt
//! wild-type window; `alt` is the offset where the edit begins, `start`/`end`
//! the half-open PAM span and `nick` the nicking position.

use crate::error::DesignError;
use crate::sequence::{Strand, py_slice};
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Range, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditKind {
    #[serde(rename = "sub", alias = "substitution")]
    Substitution,
    #[serde(rename = "ins", alias = "insertion")]
    Insertion,
    #[serde(rename = "del", alias = "deletion")]
    Deletion,
}

impl EditKind {
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Substitution => "sub",
            Self::Insertion => "ins",
            Self::Deletion => "del",
        }
    }
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl FromStr for EditKind {
    type Err = DesignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sub" | "substitution" => Ok(Self::Substitution),
            "ins" | "insertion" => Ok(Self::Insertion),
            "del" | "deletion" => Ok(Self::Deletion),
            other => Err(DesignError::invalid_input(format!(
                "Unknown edit type '{other}'. Available edit types: sub, ins, del"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edit {
    Substitution(usize),
    Insertion(usize),
    Deletion(usize),
}

impl Edit {
    pub fn new(kind: EditKind, length: usize) -> Self {
        match kind {
            EditKind::Substitution => Self::Substitution(length),
            EditKind::Insertion => Self::Insertion(length),
            EditKind::Deletion => Self::Deletion(length),
        }
    }

    pub fn kind(&self) -> EditKind {
        match self {
            Self::Substitution(_) => EditKind::Substitution,
            Self::Insertion(_) => EditKind::Insertion,
            Self::Deletion(_) => EditKind::Deletion,
        }
    }

    pub fn length(&self) -> usize {
        match self {
            Self::Substitution(n) | Self::Insertion(n) | Self::Deletion(n) => *n,
        }
    }

    #[inline(always)]
    fn n(&self) -> isize {
        self.length() as isize
    }

    /// Kind and length as one token, eg `sub1`.
    pub fn key(&self) -> String {
        format!("{}{}", self.kind().short_name(), self.length())
    }

    /// `WT>ED` bases at the edit site.
    pub fn notation(&self, wt: &str, edited: &str, alt: isize) -> String {
        let n = self.n();
        let (from, to) = match self {
            Self::Substitution(_) => (
                py_slice(wt, alt, alt + n),
                py_slice(edited, alt, alt + n),
            ),
            Self::Deletion(_) => (
                py_slice(wt, alt, alt + n + 1),
                py_slice(edited, alt, alt + 1),
            ),
            Self::Insertion(_) => (
                py_slice(wt, alt, alt + 1),
                py_slice(edited, alt, alt + n + 1),
            ),
        };
        format!("{from}>{to}")
    }

    /// Distance between the edit and the nick ("alt position window").
    pub fn alt_position_window(&self, strand: Strand, alt: isize, start: isize, end: isize) -> isize {
        let n = self.n();
        match (strand, self) {
            (Strand::Plus, _) => (alt + 1) - (start - 3),
            (Strand::Minus, Self::Substitution(_)) => end - alt + 3 - (n - 1),
            (Strand::Minus, Self::Deletion(_)) => end - alt + 3 - n,
            (Strand::Minus, Self::Insertion(_)) => end - alt + 3 + n,
        }
    }

    /// (upstream, downstream) reach a PAM may have around the edit.
    pub fn position_window(&self, max_rtt: isize) -> (isize, isize) {
        let n = self.n();
        match self {
            Self::Substitution(_) => (max_rtt - n - 3, 6),
            Self::Insertion(_) => (max_rtt - n - 1 - 3, 6),
            Self::Deletion(_) => (max_rtt - 1 - 3, 6),
        }
    }

    /// True if the PAM span `[start, end)` lies inside the position window.
    pub fn accepts_pam_span(
        &self,
        strand: Strand,
        alt: isize,
        start: isize,
        end: isize,
        max_rtt: isize,
    ) -> bool {
        let (up, down) = self.position_window(max_rtt);
        let (min, max) = match strand {
            Strand::Plus => (alt - up + 1, alt + down + 1),
            Strand::Minus => (alt - down, alt + up + 1),
        };
        start >= min && end <= max
    }

    /// Shift applied on the minus strand to the nick when anchoring PBS and
    /// RTT in the edited window, which is longer or shorter by the edit.
    pub fn edited_nick_shift(&self) -> isize {
        match self {
            Self::Substitution(_) => 0,
            Self::Insertion(n) => *n as isize,
            Self::Deletion(n) => -(*n as isize),
        }
    }

    /// Length correction from edited-window RTT length back to wild-type span.
    pub fn replaced_length_adjustment(&self) -> isize {
        -self.edited_nick_shift()
    }

    /// Candidate RTT end positions (plus strand) or start positions (minus strand).
    pub fn rtt_positions(&self, strand: Strand, alt: isize, nick: isize, max_rtt: isize) -> Range<isize> {
        let n = self.n();
        match (strand, self) {
            (Strand::Plus, Self::Deletion(_)) => (alt + 1)..(nick + max_rtt + 1),
            (Strand::Plus, _) => (alt + n + 1)..(nick + max_rtt + 1),
            (Strand::Minus, Self::Substitution(_)) => (nick - 1 - max_rtt)..alt,
            (Strand::Minus, _) => (nick - 3 - max_rtt)..(alt + n - 1),
        }
    }

    /// Shortest RTT that still reaches from the nick across the edit, if any.
    pub fn min_rtt_span(&self, strand: Strand, alt: isize, nick: isize) -> Option<usize> {
        let n = self.n();
        match (strand, self) {
            (Strand::Plus, Self::Substitution(_)) => Some((alt - nick).unsigned_abs()),
            (Strand::Plus, _) => None,
            (Strand::Minus, _) => Some((alt - nick + n - 1).unsigned_abs()),
        }
    }

    /// Edit position counted from the nick within the 74 nt context.
    pub fn edit_position(&self, strand: Strand, alt: isize, nick: isize) -> isize {
        match (strand, self) {
            (Strand::Plus, _) => alt + 1 - nick,
            (Strand::Minus, Self::Insertion(_)) => nick - alt + 1,
            (Strand::Minus, _) => nick - alt - self.n() + 1,
        }
    }

    /// Right homology arm: template left over after the edit.
    pub fn rha_length(&self, rtt_len: usize, edit_pos: isize) -> isize {
        let rtt_len = rtt_len as isize;
        match self {
            Self::Deletion(_) => rtt_len - edit_pos + 1,
            _ => rtt_len - edit_pos - self.n() + 1,
        }
    }
}
