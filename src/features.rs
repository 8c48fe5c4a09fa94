//! Per-candidate thermodynamic, GC and folding features.

use crate::candidates::{CandidateWindow, Combination};
use crate::edit::Edit;
use crate::error::DesignError;
use crate::gc_contents::GcContents;
use crate::pam::PamSite;
use crate::rna_structure::FoldOracle;
use crate::sequence::{Strand, py_slice, reverse_complement};
use crate::thermo::{NnTable, TmOracle};
use log::trace;
use serde::{Deserialize, Serialize};

pub const POLY_T_TERMINATOR: &str = "TTTTTT";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "Tm1_PBS")]
    pub tm1_pbs: f64,
    #[serde(rename = "Tm2_RTT_cTarget_sameLength")]
    pub tm2_rtt_same_length: f64,
    #[serde(rename = "Tm3_RTT_cTarget_replaced")]
    pub tm3_rtt_replaced: f64,
    #[serde(rename = "Tm4_cDNA_PAM-oppositeTarget")]
    pub tm4_pairwise: f64,
    #[serde(rename = "Tm5_RTT_cDNA")]
    pub tm5_rtt_cdna: f64,
    #[serde(rename = "deltaTm_Tm4-Tm2")]
    pub delta_tm: f64,
    #[serde(rename = "GC_count_PBS")]
    pub gc_count_pbs: usize,
    #[serde(rename = "GC_count_RTT")]
    pub gc_count_rtt: usize,
    #[serde(rename = "GC_count_RT-PBS")]
    pub gc_count_rt_pbs: usize,
    #[serde(rename = "GC_contents_PBS")]
    pub gc_contents_pbs: f64,
    #[serde(rename = "GC_contents_RTT")]
    pub gc_contents_rtt: f64,
    #[serde(rename = "GC_contents_RT-PBS")]
    pub gc_contents_rt_pbs: f64,
    #[serde(rename = "MFE_RT-PBS-polyT")]
    pub mfe_rt_pbs_polyt: f64,
    #[serde(rename = "MFE_Spacer")]
    pub mfe_spacer: f64,
}

impl FeatureVector {
    pub fn set_gc(&mut self, pbs: &str, rtt: &str, rt_pbs: &str) {
        let (p, r, c) = (
            GcContents::new_from_sequence(pbs.as_bytes()),
            GcContents::new_from_sequence(rtt.as_bytes()),
            GcContents::new_from_sequence(rt_pbs.as_bytes()),
        );
        self.gc_count_pbs = p.count();
        self.gc_count_rtt = r.count();
        self.gc_count_rt_pbs = c.count();
        self.gc_contents_pbs = p.percent();
        self.gc_contents_rtt = r.percent();
        self.gc_contents_rt_pbs = c.percent();
    }
}

/// What a per-position Tm failure does to the pairwise value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairwiseFailure {
    /// Skip the position; the last successful value stands.
    KeepLast,
    /// The position's value becomes 0.
    Zero,
}

/// Walks `seq` and `partner` base by base and returns the Tm of the last
/// position evaluated, 0.0 if none was. Only as many positions as the
/// shorter string has are visited.
pub fn pairwise_tm(
    oracle: &dyn TmOracle,
    seq: &str,
    partner: &str,
    table: NnTable,
    on_failure: PairwiseFailure,
) -> f64 {
    let mut ret = 0.0;
    for (i, (a, b)) in seq.chars().zip(partner.chars()).enumerate() {
        match oracle.melting_temp(&a.to_string(), Some(&b.to_string()), table) {
            Ok(tm) => ret = tm,
            Err(e) => {
                trace!("Tm skipped at position {i} ({a}/{b}): {e}");
                if on_failure == PairwiseFailure::Zero {
                    ret = 0.0;
                }
            }
        }
    }
    ret
}

/// Sequences the Tm features are computed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmQueries {
    pub pbs_hybrid: String,
    pub same_length: String,
    pub replaced: String,
    pub pairwise: (String, String),
    pub rtt_hybrid: String,
}

impl TmQueries {
    pub fn for_candidate(site: &PamSite, edit: &Edit, wt: &str, combo: &Combination) -> Self {
        let nick = site.nick;
        let l = combo.rtt.len() as isize;
        let adj = edit.replaced_length_adjustment();
        let (same_length, replaced, anti) = match site.strand {
            Strand::Plus => (
                py_slice(wt, nick, nick + l).to_string(),
                py_slice(wt, nick, nick + l + adj).to_string(),
                reverse_complement(py_slice(wt, nick, nick + l + adj)),
            ),
            Strand::Minus => (
                reverse_complement(py_slice(wt, nick - l, nick)),
                reverse_complement(py_slice(wt, nick - l - adj, nick)),
                py_slice(wt, nick - l - adj, nick).to_string(),
            ),
        };
        Self {
            pbs_hybrid: reverse_complement(&combo.pbs.replace('A', "U")),
            same_length,
            replaced,
            pairwise: (combo.rtt.clone(), anti),
            rtt_hybrid: reverse_complement(&combo.rtt.replace('A', "U")),
        }
    }

    /// Fills the six Tm fields of `features`.
    pub fn apply(&self, oracle: &dyn TmOracle, features: &mut FeatureVector) -> Result<(), DesignError> {
        let tm = |seq: &str, table: NnTable| {
            oracle
                .melting_temp(seq, None, table)
                .map_err(|e| DesignError::oracle(format!("Tm of '{seq}': {e}")))
        };
        features.tm1_pbs = tm(&self.pbs_hybrid, NnTable::RDnaNn1)?;
        features.tm2_rtt_same_length = tm(&self.same_length, NnTable::DnaNn3)?;
        features.tm3_rtt_replaced = tm(&self.replaced, NnTable::DnaNn3)?;
        features.tm4_pairwise = pairwise_tm(
            oracle,
            &self.pairwise.0,
            &self.pairwise.1,
            NnTable::DnaNn3,
            PairwiseFailure::KeepLast,
        );
        features.tm5_rtt_cdna = tm(&self.rtt_hybrid, NnTable::RDnaNn1)?;
        features.delta_tm = features.tm4_pairwise - features.tm2_rtt_same_length;
        Ok(())
    }
}

/// The 3' extension product with its terminator: revcomp(PBS+RTT) + poly-T.
pub fn extension_fold_input(combo: &Combination) -> String {
    format!("{}{}", combo.rt_pbs(), POLY_T_TERMINATOR)
}

/// Spacer proxy with a canonical leading G: `G + guide[1:-3]`.
pub fn spacer_fold_input(guide: &str) -> String {
    format!("G{}", py_slice(guide, 1, -3))
}

/// Rounds to one decimal like Python's `round(x, 1)`: on the exact binary
/// value, ties to even.
pub fn round_one_decimal(x: f64) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    let bits = x.to_bits();
    let negative = bits >> 63 == 1;
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    let fraction = (bits & ((1u64 << 52) - 1)) as i128;
    let (mantissa, exp) = if exponent == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1i128 << 52), exponent - 1075)
    };
    let scaled = mantissa * 10;
    let magnitude = if exp >= 0 {
        // |x| >= 2^52: already integral
        return x;
    } else if exp < -120 {
        0
    } else {
        let shift = (-exp) as u32;
        let quotient = scaled >> shift;
        let remainder = scaled - (quotient << shift);
        let half = 1i128 << (shift - 1);
        if remainder > half || (remainder == half && quotient & 1 == 1) {
            quotient + 1
        } else {
            quotient
        }
    };
    let value = magnitude as f64 / 10.0;
    if negative { -value } else { value }
}

/// Features for every combination of one window, in combination order.
/// Folding queries for the whole window go to the oracle as one batch.
pub fn featurize_window(
    window: &CandidateWindow,
    edit: &Edit,
    wt: &str,
    tm: &dyn TmOracle,
    fold: &dyn FoldOracle,
) -> Result<Vec<(Combination, FeatureVector)>, DesignError> {
    let combos = window.combinations();
    let mut fold_inputs = Vec::with_capacity(combos.len() + 1);
    fold_inputs.push(spacer_fold_input(&window.site.guide));
    fold_inputs.extend(combos.iter().map(extension_fold_input));
    let folds = fold
        .fold_many(&fold_inputs)
        .map_err(|e| DesignError::oracle(e.to_string()))?;
    if folds.len() != fold_inputs.len() {
        return Err(DesignError::oracle(format!(
            "fold oracle returned {} results for {} sequences",
            folds.len(),
            fold_inputs.len()
        )));
    }
    let mfe_spacer = round_one_decimal(folds[0].energy);

    let mut ret = Vec::with_capacity(combos.len());
    for (combo, extension) in combos.into_iter().zip(folds.iter().skip(1)) {
        let mut features = FeatureVector::default();
        TmQueries::for_candidate(&window.site, edit, wt, &combo).apply(tm, &mut features)?;
        features.set_gc(&combo.pbs, &combo.rtt, &combo.pbs_rtt());
        features.mfe_rt_pbs_polyt = round_one_decimal(extension.energy);
        features.mfe_spacer = mfe_spacer;
        ret.push((combo, features));
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::LengthKeyed;
    use crate::rna_structure::{Fold, RnaStructureError};
    use crate::thermo::TmError;

    /// Tm of a sequence is its length; single bases fail when unpaired.
    struct LengthTm;

    impl TmOracle for LengthTm {
        fn melting_temp(&self, seq: &str, complement: Option<&str>, _: NnTable) -> Result<f64, TmError> {
            match complement {
                Some(c) if seq.len() == 1 && crate::sequence::complement_letter(seq.as_bytes()[0]) != c.as_bytes()[0] => {
                    Err(TmError::MissingNeighbors {
                        neighbors: format!("{seq}/{c}"),
                    })
                }
                Some(_) => Ok(seq.as_bytes()[0] as f64),
                None => Ok(seq.len() as f64),
            }
        }
    }

    /// Energy is minus the number of G bases, less 0.12.
    struct CountingFold;

    impl FoldOracle for CountingFold {
        fn fold(&self, sequence: &str) -> Result<Fold, RnaStructureError> {
            Ok(Fold {
                structure: ".".repeat(sequence.len()),
                energy: -(sequence.matches('G').count() as f64) - 0.12,
            })
        }
    }

    #[test]
    fn test_pairwise_keeps_last_success() {
        // A/T and C/G pair; the final G/A fails and is skipped
        let tm = pairwise_tm(&LengthTm, "ACG", "TGA", NnTable::DnaNn3, PairwiseFailure::KeepLast);
        assert_eq!(tm, b'C' as f64);
        let tm = pairwise_tm(&LengthTm, "ACG", "TGA", NnTable::DnaNn3, PairwiseFailure::Zero);
        assert_eq!(tm, 0.0);
        let tm = pairwise_tm(&LengthTm, "AAG", "TTC", NnTable::DnaNn3, PairwiseFailure::KeepLast);
        assert_eq!(tm, b'G' as f64);
    }

    #[test]
    fn test_pairwise_defaults_to_zero() {
        assert_eq!(pairwise_tm(&LengthTm, "AC", "CA", NnTable::DnaNn3, PairwiseFailure::KeepLast), 0.0);
        assert_eq!(pairwise_tm(&LengthTm, "", "ACGT", NnTable::DnaNn3, PairwiseFailure::KeepLast), 0.0);
    }

    #[test]
    fn test_pairwise_truncates_to_shorter() {
        let tm = pairwise_tm(&LengthTm, "ACGT", "TG", NnTable::DnaNn3, PairwiseFailure::KeepLast);
        assert_eq!(tm, b'C' as f64);
    }

    #[test]
    fn test_round_one_decimal() {
        assert_eq!(round_one_decimal(-3.14), -3.1);
        assert_eq!(round_one_decimal(-3.15), -3.1); // -3.15 is stored below the tie
        assert_eq!(round_one_decimal(-3.25), -3.2); // exact tie, to even
        assert_eq!(round_one_decimal(-3.35), -3.4); // -3.35 is stored above the tie
        assert_eq!(round_one_decimal(0.05), 0.1);
        assert_eq!(round_one_decimal(0.25), 0.2);
        assert_eq!(round_one_decimal(0.75), 0.8);
        assert_eq!(round_one_decimal(-0.04), -0.0);
        assert_eq!(round_one_decimal(f64::from(-12.7f32)), -12.7);
        assert_eq!(round_one_decimal(0.0), 0.0);
    }

    #[test]
    fn test_fold_inputs() {
        let combo = Combination {
            rtt: "TTGA".to_string(),
            pbs: "CCA".to_string(),
        };
        assert_eq!(extension_fold_input(&combo), "TCAATGGTTTTTT");
        assert_eq!(spacer_fold_input("ACGTACGTACGTACGTACGTAGG"), "GCGTACGTACGTACGTACGT");
    }

    fn site(strand: Strand, nick: isize) -> PamSite {
        PamSite {
            strand,
            start: 0,
            end: 0,
            nick,
            alt_window: 1,
            pam: "AGG".to_string(),
            guide: "ACGTACGTACGTACGTACGTAGG".to_string(),
        }
    }

    #[test]
    fn test_tm_queries_plus_strand() {
        let wt: String = "ACGT".repeat(31)[..121].to_string();
        let combo = Combination {
            rtt: "AAAAAA".to_string(),
            pbs: "CAT".to_string(),
        };
        let q = TmQueries::for_candidate(&site(Strand::Plus, 47), &Edit::Deletion(2), &wt, &combo);
        assert_eq!(q.same_length, &wt[47..53]);
        assert_eq!(q.replaced, &wt[47..55]);
        assert_eq!(q.pairwise.1, reverse_complement(&wt[47..55]));
        assert_eq!(q.pbs_hybrid, "AUG");
        assert_eq!(q.rtt_hybrid, "UUUUUU");
        let q = TmQueries::for_candidate(&site(Strand::Plus, 47), &Edit::Insertion(2), &wt, &combo);
        assert_eq!(q.replaced, &wt[47..51]);
    }

    #[test]
    fn test_tm_queries_minus_strand() {
        let wt: String = "ACGT".repeat(31)[..121].to_string();
        let combo = Combination {
            rtt: "ACGTA".to_string(),
            pbs: "GG".to_string(),
        };
        let q = TmQueries::for_candidate(&site(Strand::Minus, 75), &Edit::Deletion(1), &wt, &combo);
        assert_eq!(q.same_length, reverse_complement(&wt[70..75]));
        assert_eq!(q.replaced, reverse_complement(&wt[69..75]));
        assert_eq!(q.pairwise.1, &wt[69..75]);
        let q = TmQueries::for_candidate(&site(Strand::Minus, 75), &Edit::Substitution(1), &wt, &combo);
        assert_eq!(q.replaced, q.same_length);
    }

    #[test]
    fn test_featurize_window() {
        let wt: String = "ACGT".repeat(31)[..121].to_string();
        let mut pbs = LengthKeyed::default();
        pbs.insert("GCA".to_string());
        pbs.insert("TGCA".to_string());
        let mut rtt = LengthKeyed::default();
        rtt.insert("GGAT".to_string());
        let window = CandidateWindow {
            site: site(Strand::Plus, 47),
            pbs,
            rtt,
        };
        let rows = featurize_window(&window, &Edit::Substitution(1), &wt, &LengthTm, &CountingFold).unwrap();
        assert_eq!(rows.len(), 2);
        let (combo, f) = &rows[1];
        assert_eq!(combo.key(), "GGAT,TGCA");
        assert_eq!(f.tm1_pbs, 4.0);
        assert_eq!(f.tm2_rtt_same_length, 4.0);
        assert_eq!(f.tm5_rtt_cdna, 4.0);
        assert_eq!(f.delta_tm, f.tm4_pairwise - f.tm2_rtt_same_length);
        assert_eq!(f.gc_count_pbs, 2);
        assert_eq!(f.gc_count_rtt, 2);
        assert_eq!(f.gc_count_rt_pbs, 4);
        assert_eq!(f.gc_contents_rt_pbs, 50.0);
        // revcomp("TGCAGGAT") + TTTTTT = ATCCTGCATTTTTT, one G
        assert_eq!(f.mfe_rt_pbs_polyt, -1.1);
        // "G" + guide[1..20] has six G
        assert_eq!(f.mfe_spacer, -6.1);
    }
}
