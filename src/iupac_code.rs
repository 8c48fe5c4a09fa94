const BIT_A: u8 = 1;
const BIT_C: u8 = 2;
const BIT_G: u8 = 4;
const BIT_T: u8 = 8;

/// IUPAC letters and the bases they stand for.
const CODES: [(u8, u8); 15] = [
    (b'A', BIT_A),
    (b'C', BIT_C),
    (b'G', BIT_G),
    (b'T', BIT_T),
    (b'W', BIT_A | BIT_T),
    (b'S', BIT_C | BIT_G),
    (b'M', BIT_A | BIT_C),
    (b'K', BIT_G | BIT_T),
    (b'R', BIT_A | BIT_G),
    (b'Y', BIT_C | BIT_T),
    (b'B', BIT_C | BIT_G | BIT_T),
    (b'D', BIT_A | BIT_G | BIT_T),
    (b'H', BIT_A | BIT_C | BIT_T),
    (b'V', BIT_A | BIT_C | BIT_G),
    (b'N', BIT_A | BIT_C | BIT_G | BIT_T),
];

/// Set of DNA bases encoded as a bitmask, eg `R` = A|G.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IupacCode(u8);

impl IupacCode {
    pub fn new(bitmask: u8) -> Self {
        Self(bitmask)
    }

    /// Unknown letters give the empty set.
    pub fn from_letter(letter: u8) -> Self {
        let letter = letter.to_ascii_uppercase();
        CODES
            .iter()
            .find(|(l, _)| *l == letter)
            .map_or(Self(0), |(_, bits)| Self(*bits))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Intersection of both sets.
    pub fn subset(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Only upper-case A, C, G and T are concrete bases; anything else in a
    /// window never matches.
    #[inline(always)]
    pub fn matches_base(self, letter: u8) -> bool {
        matches!(letter, b'A' | b'C' | b'G' | b'T') && !self.subset(Self::from_letter(letter)).is_empty()
    }

    pub fn motif(pattern: &str) -> Vec<Self> {
        pattern.bytes().map(Self::from_letter).collect()
    }

    #[inline(always)]
    pub fn motif_matches(motif: &[Self], window: &[u8]) -> bool {
        motif.len() == window.len()
            && motif
                .iter()
                .zip(window)
                .all(|(code, &base)| code.matches_base(base))
    }
}
