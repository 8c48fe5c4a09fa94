use crate::edit::Edit;
use crate::error::DesignError;
use crate::iupac_code::IupacCode;
use crate::sequence::{Strand, py_slice, reverse_complement};
use lazy_static::lazy_static;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};

pub const PAM_MOTIF_LENGTH: usize = 4;
pub const PROTOSPACER_LENGTH: isize = 20;
pub const NICK_OFFSET: isize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PamFamily {
    #[default]
    #[serde(rename = "NGG")]
    Ngg,
    #[serde(rename = "NRCH")]
    Nrch,
    #[serde(rename = "NAG")]
    Nag,
    #[serde(rename = "NGA")]
    Nga,
}

impl PamFamily {
    pub fn all() -> [PamFamily; 4] {
        [Self::Ngg, Self::Nrch, Self::Nag, Self::Nga]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ngg => "NGG",
            Self::Nrch => "NRCH",
            Self::Nag => "NAG",
            Self::Nga => "NGA",
        }
    }

    /// 4-mer motifs scanned along the top strand for each strand's PAMs.
    /// A window matches when any one of the alternatives matches.
    pub fn motif_patterns(&self, strand: Strand) -> &'static [&'static str] {
        match (self, strand) {
            (Self::Ngg, Strand::Plus) => &["NGGN"],
            (Self::Ngg, Strand::Minus) => &["NCCN"],
            (Self::Nag, Strand::Plus) => &["NAGN"],
            (Self::Nag, Strand::Minus) => &["NCTN"],
            (Self::Nga, Strand::Plus) => &["NGAN"],
            (Self::Nga, Strand::Minus) => &["NTCN"],
            (Self::Nrch, Strand::Plus) => &["NNGN", "NSAN", "NRCC", "NATG"],
            (Self::Nrch, Strand::Minus) => {
                &["NCNN", "NTSN", "GKTN", "ATTN", "CATN", "GGCN", "GTAN"]
            }
        }
    }
}

impl fmt::Display for PamFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PamFamily {
    type Err = DesignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::all()
            .into_iter()
            .find(|family| family.name() == wanted)
            .ok_or_else(|| {
                DesignError::invalid_input(format!(
                    "Unknown PAM '{s}'. Available PAM: NGG, NGA, NAG, NRCH"
                ))
            })
    }
}

lazy_static! {
    static ref MOTIFS: HashMap<(PamFamily, Strand), Vec<Vec<IupacCode>>> = {
        let mut ret = HashMap::new();
        for family in PamFamily::all() {
            for strand in [Strand::Plus, Strand::Minus] {
                let motifs = family
                    .motif_patterns(strand)
                    .iter()
                    .map(|pattern| IupacCode::motif(pattern))
                    .collect();
                ret.insert((family, strand), motifs);
            }
        }
        ret
    };
}

/// A PAM that passed both distance filters for the requested edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PamSite {
    pub strand: Strand,
    /// Half-open PAM span in wild-type window coordinates.
    pub start: isize,
    pub end: isize,
    pub nick: isize,
    pub alt_window: isize,
    /// PAM read 5'->3' on its own strand.
    pub pam: String,
    /// Protospacer plus PAM, 5'->3' on the PAM strand.
    pub guide: String,
}

impl PamSite {
    /// Grouping key: edit, notation, strand, nick, distance, PAM and guide.
    pub fn key(&self, edit: &Edit, notation: &str) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            edit.key(),
            notation,
            self.strand,
            self.nick,
            self.alt_window,
            self.pam,
            self.guide
        )
    }
}

/// Offsets of every 4-mer window matching the family's motifs for `strand`.
/// Windows overlap; every offset is tested.
pub fn motif_offsets(wt: &str, family: PamFamily, strand: Strand) -> Vec<usize> {
    let motifs = match MOTIFS.get(&(family, strand)) {
        Some(motifs) => motifs,
        None => return vec![],
    };
    wt.as_bytes()
        .windows(PAM_MOTIF_LENGTH)
        .enumerate()
        .filter(|(_, window)| {
            motifs
                .iter()
                .any(|motif| IupacCode::motif_matches(motif, window))
        })
        .map(|(offset, _)| offset)
        .collect()
}

fn site_from_offset(wt: &str, strand: Strand, offset: usize) -> PamSite {
    let m = offset as isize;
    let (start, end) = match strand {
        Strand::Plus => (m, m + NICK_OFFSET),
        Strand::Minus => (m + 1, m + PAM_MOTIF_LENGTH as isize),
    };
    let (pam, guide, nick) = match strand {
        Strand::Plus => (
            py_slice(wt, start, end).to_string(),
            py_slice(wt, start - PROTOSPACER_LENGTH, end).to_string(),
            start - NICK_OFFSET,
        ),
        Strand::Minus => (
            reverse_complement(py_slice(wt, start, end)),
            reverse_complement(py_slice(wt, start, end + PROTOSPACER_LENGTH)),
            end + NICK_OFFSET,
        ),
    };
    PamSite {
        strand,
        start,
        end,
        nick,
        alt_window: 0,
        pam,
        guide,
    }
}

/// Scans both strands (plus first, each left to right) and keeps the PAMs
/// close enough to the edit at `alt` to support an RTT of at most `max_rtt`.
pub fn scan_pam_sites(
    wt: &str,
    edit: &Edit,
    family: PamFamily,
    alt: isize,
    max_rtt: usize,
) -> Vec<PamSite> {
    let max_rtt = max_rtt as isize;
    let max_alt_window = max_rtt + NICK_OFFSET;
    let mut ret = vec![];
    for strand in [Strand::Plus, Strand::Minus] {
        for offset in motif_offsets(wt, family, strand) {
            let mut site = site_from_offset(wt, strand, offset);
            site.alt_window = edit.alt_position_window(strand, alt, site.start, site.end);
            if site.alt_window <= 0 || site.alt_window > max_alt_window {
                continue;
            }
            if !edit.accepts_pam_span(strand, alt, site.start, site.end, max_rtt) {
                continue;
            }
            ret.push(site);
        }
    }
    debug!(
        "{} {} PAM sites within reach of {}",
        ret.len(),
        family,
        edit.key()
    );
    ret
}
