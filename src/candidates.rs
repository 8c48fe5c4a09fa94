//! PBS and RTT enumeration for one PAM site.
//!
//! Sequences come from the edited window: the PBS and RTT prime and copy
//! against the strand that already carries the edit.

use crate::design::DesignParameters;
use crate::edit::Edit;
use crate::pam::PamSite;
use crate::sequence::{Strand, py_slice, reverse_complement};
use itertools::iproduct;
use log::debug;
use serde::{Deserialize, Serialize};

/// Sequences keyed by their length, kept in first-insertion order.
/// Inserting a sequence whose length is already present replaces the stored
/// sequence but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthKeyed {
    entries: Vec<(usize, String)>,
}

impl LengthKeyed {
    pub fn insert(&mut self, sequence: String) {
        let len = sequence.len();
        match self.entries.iter_mut().find(|(key, _)| *key == len) {
            Some(entry) => entry.1 = sequence,
            None => self.entries.push((len, sequence)),
        }
    }

    pub fn get(&self, len: usize) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| *key == len)
            .map(|(_, seq)| seq.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lengths(&self) -> impl Iterator<Item = usize> + Clone + '_ {
        self.entries.iter().map(|(len, _)| *len)
    }

    pub fn sequences(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.entries.iter().map(|(_, seq)| seq.as_str())
    }
}

/// One PBS paired with one RTT, both 5'->3' on the PAM strand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combination {
    pub rtt: String,
    pub pbs: String,
}

impl Combination {
    pub fn key(&self) -> String {
        format!("{},{}", self.rtt, self.pbs)
    }

    /// PBS followed by RTT, as laid out on the PAM strand.
    pub fn pbs_rtt(&self) -> String {
        format!("{}{}", self.pbs, self.rtt)
    }

    /// The pegRNA 3' extension, RTT then PBS in pegRNA orientation.
    pub fn rt_pbs(&self) -> String {
        reverse_complement(&self.pbs_rtt())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateWindow {
    pub site: PamSite,
    pub pbs: LengthKeyed,
    pub rtt: LengthKeyed,
}

impl CandidateWindow {
    /// Every RTT with every PBS; RTTs in the outer loop.
    pub fn combinations(&self) -> Vec<Combination> {
        iproduct!(self.rtt.sequences(), self.pbs.sequences())
            .map(|(rtt, pbs)| Combination {
                rtt: rtt.to_string(),
                pbs: pbs.to_string(),
            })
            .collect()
    }

    pub fn combination_count(&self) -> usize {
        self.rtt.len() * self.pbs.len()
    }
}

pub fn pbs_sequences(
    site: &PamSite,
    edit: &Edit,
    edited: &str,
    params: &DesignParameters,
) -> LengthKeyed {
    let mut ret = LengthKeyed::default();
    for pbs_len in params.pbs_min..=params.pbs_max {
        if params.fixed_pbs_len.is_some_and(|fixed| fixed != pbs_len) {
            continue;
        }
        let p = pbs_len as isize;
        let seq = match site.strand {
            Strand::Plus => py_slice(edited, site.nick - p, site.nick).to_string(),
            Strand::Minus => {
                let start = site.nick + edit.edited_nick_shift();
                reverse_complement(py_slice(edited, start, start + p))
            }
        };
        ret.insert(seq);
    }
    ret
}

pub fn rtt_sequences(
    site: &PamSite,
    edit: &Edit,
    edited: &str,
    alt: isize,
    params: &DesignParameters,
) -> LengthKeyed {
    let mut ret = LengthKeyed::default();
    let max_rtt = params.rtt_max as isize;
    let min_span = edit.min_rtt_span(site.strand, alt, site.nick);
    for pos in edit.rtt_positions(site.strand, alt, site.nick, max_rtt) {
        let seq = match site.strand {
            Strand::Plus => py_slice(edited, site.nick, pos).to_string(),
            Strand::Minus => reverse_complement(py_slice(
                edited,
                pos,
                site.nick + edit.edited_nick_shift(),
            )),
        };
        let len = seq.len();
        if len == 0 {
            continue;
        }
        if params.fixed_rtt_len.is_some_and(|fixed| fixed != len) {
            continue;
        }
        if len > params.rtt_max {
            continue;
        }
        if min_span.is_some_and(|min| len < min) {
            continue;
        }
        if matches!(edit, Edit::Insertion(_)) && (len as isize) < site.alt_window + 1 {
            continue;
        }
        ret.insert(seq);
    }
    ret
}

/// Builds the candidate window for `site`, or `None` when it yields no PBS
/// or no RTT.
pub fn build_window(
    site: PamSite,
    edit: &Edit,
    edited: &str,
    alt: isize,
    params: &DesignParameters,
) -> Option<CandidateWindow> {
    let pbs = pbs_sequences(&site, edit, edited, params);
    let rtt = rtt_sequences(&site, edit, edited, alt, params);
    if pbs.is_empty() || rtt.is_empty() {
        debug!(
            "Dropping {} PAM at nick {}: {} PBS, {} RTT",
            site.strand,
            site.nick,
            pbs.len(),
            rtt.len()
        );
        return None;
    }
    Some(CandidateWindow { site, pbs, rtt })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pam::scan_pam_sites;

    const ALT: isize = 60;

    fn background() -> Vec<u8> {
        (0..121).map(|i| if i % 2 == 0 { b'A' } else { b'T' }).collect()
    }

    fn plus_site_windows() -> (String, String) {
        let mut wt = background();
        wt[51..53].copy_from_slice(b"GG");
        let mut ed = wt.clone();
        ed[60] = b'C';
        (
            String::from_utf8(wt).unwrap(),
            String::from_utf8(ed).unwrap(),
        )
    }

    fn only_site(wt: &str, edit: &Edit, params: &DesignParameters) -> PamSite {
        let mut sites = scan_pam_sites(wt, edit, params.pam, ALT, params.rtt_max);
        assert_eq!(sites.len(), 1);
        sites.remove(0)
    }

    #[test]
    fn test_length_keyed_overwrite_keeps_position() {
        let mut keyed = LengthKeyed::default();
        keyed.insert("AAA".to_string());
        keyed.insert("CC".to_string());
        keyed.insert("GGG".to_string());
        assert_eq!(keyed.len(), 2);
        assert_eq!(keyed.lengths().collect::<Vec<_>>(), vec![3, 2]);
        assert_eq!(keyed.get(3), Some("GGG"));
        assert_eq!(keyed.sequences().collect::<Vec<_>>(), vec!["GGG", "CC"]);
    }

    #[test]
    fn test_plus_strand_pbs() {
        let (wt, ed) = plus_site_windows();
        let params = DesignParameters::default();
        let edit = Edit::Substitution(1);
        let site = only_site(&wt, &edit, &params);
        let pbs = pbs_sequences(&site, &edit, &ed, &params);
        assert_eq!(pbs.lengths().collect::<Vec<_>>(), (7..=15).collect::<Vec<_>>());
        assert_eq!(pbs.get(7), Some(&ed[40..47]));
        assert_eq!(pbs.get(15), Some(&ed[32..47]));
    }

    #[test]
    fn test_plus_strand_rtt() {
        let (wt, ed) = plus_site_windows();
        let params = DesignParameters::default();
        let edit = Edit::Substitution(1);
        let site = only_site(&wt, &edit, &params);
        let rtt = rtt_sequences(&site, &edit, &ed, ALT, &params);
        // nick 47: ends 62..=87 give lengths 15..=40
        assert_eq!(rtt.lengths().collect::<Vec<_>>(), (15..=40).collect::<Vec<_>>());
        assert_eq!(rtt.get(15), Some(&ed[47..62]));
        for seq in rtt.sequences() {
            assert_eq!(seq.as_bytes()[13], b'C');
        }
    }

    #[test]
    fn test_fixed_lengths() {
        let (wt, ed) = plus_site_windows();
        let params = DesignParameters {
            fixed_pbs_len: Some(13),
            fixed_rtt_len: Some(20),
            ..DesignParameters::default()
        };
        let edit = Edit::Substitution(1);
        let site = only_site(&wt, &edit, &params);
        let window = build_window(site, &edit, &ed, ALT, &params).unwrap();
        assert_eq!(window.pbs.lengths().collect::<Vec<_>>(), vec![13]);
        assert_eq!(window.rtt.lengths().collect::<Vec<_>>(), vec![20]);
        assert_eq!(window.combinations().len(), 1);
    }

    #[test]
    fn test_minus_strand_deletion() {
        let mut wt = background();
        wt[69..71].copy_from_slice(b"CC");
        let wt = String::from_utf8(wt).unwrap();
        // delete wt[61]
        let ed = format!("{}{}A", &wt[..61], &wt[62..]);
        let params = DesignParameters::default();
        let edit = Edit::Deletion(1);
        let site = only_site(&wt, &edit, &params);
        assert_eq!(site.nick, 75);
        let pbs = pbs_sequences(&site, &edit, &ed, &params);
        assert_eq!(pbs.get(7), Some(reverse_complement(&ed[74..81]).as_str()));
        let rtt = rtt_sequences(&site, &edit, &ed, ALT, &params);
        for (len, seq) in rtt.lengths().zip(rtt.sequences()) {
            assert_eq!(len, seq.len());
            assert!(len <= params.rtt_max);
            assert!(len >= 15);
        }
        assert_eq!(rtt.get(15), Some(reverse_complement(&ed[59..74]).as_str()));
    }

    #[test]
    fn test_insertion_reaches_past_edit() {
        let (wt, _) = plus_site_windows();
        let ed = format!("{}GG{}", &wt[..61], &wt[61..119]);
        let params = DesignParameters::default();
        let edit = Edit::Insertion(2);
        let site = only_site(&wt, &edit, &params);
        let rtt = rtt_sequences(&site, &edit, &ed, ALT, &params);
        assert!(!rtt.is_empty());
        for len in rtt.lengths() {
            assert!(len as isize >= site.alt_window + 1);
        }
    }

    #[test]
    fn test_combination_order() {
        let mut pbs = LengthKeyed::default();
        pbs.insert("AC".to_string());
        pbs.insert("GAC".to_string());
        let mut rtt = LengthKeyed::default();
        rtt.insert("TTTT".to_string());
        rtt.insert("TTTTT".to_string());
        let window = CandidateWindow {
            site: PamSite {
                strand: Strand::Plus,
                start: 50,
                end: 53,
                nick: 47,
                alt_window: 14,
                pam: "AGG".to_string(),
                guide: String::new(),
            },
            pbs,
            rtt,
        };
        let keys: Vec<String> = window.combinations().iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec!["TTTT,AC", "TTTT,GAC", "TTTTT,AC", "TTTTT,GAC"]);
        assert_eq!(window.combination_count(), 4);
        assert_eq!(window.combinations()[1].rt_pbs(), "AAAAGTC");
    }

    #[test]
    fn test_sequences_restart() {
        let mut keyed = LengthKeyed::default();
        keyed.insert("AC".to_string());
        keyed.insert("GAC".to_string());
        let seqs = keyed.sequences();
        assert_eq!(seqs.clone().collect::<Vec<_>>(), vec!["AC", "GAC"]);
        assert_eq!(seqs.count(), 2);
        assert_eq!(keyed.lengths().clone().max(), Some(3));
    }
}
