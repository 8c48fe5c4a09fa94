//! Output rows and the table handed to the scoring model.

use crate::candidates::{CandidateWindow, Combination};
use crate::edit::Edit;
use crate::error::{DesignError, ErrorCode};
use crate::features::FeatureVector;
use crate::pam::PamSite;
use crate::sequence::{Strand, py_slice, reverse_complement};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Write, path::Path};

/// Nucleotides of context kept 5' of the nick.
pub const CONTEXT_UPSTREAM: isize = 21;
/// Nucleotides of context kept 3' of the nick.
pub const CONTEXT_DOWNSTREAM: isize = 53;
pub const CONTEXT_LENGTH: usize = (CONTEXT_UPSTREAM + CONTEXT_DOWNSTREAM) as usize;
pub const MASK_CHAR: char = 'x';

pub const NUCLEASE_SCORE_COLUMN: &str = "DeepSpCas9_score";

pub const COLUMNS: [&str; 28] = [
    "ID",
    "Spacer",
    "RT-PBS",
    "PBS_len",
    "RTT_len",
    "RT-PBS_len",
    "Edit_pos",
    "Edit_len",
    "RHA_len",
    "Target",
    "Masked_EditSeq",
    "type_sub",
    "type_ins",
    "type_del",
    "Tm1_PBS",
    "Tm2_RTT_cTarget_sameLength",
    "Tm3_RTT_cTarget_replaced",
    "Tm4_cDNA_PAM-oppositeTarget",
    "Tm5_RTT_cDNA",
    "deltaTm_Tm4-Tm2",
    "GC_count_PBS",
    "GC_count_RTT",
    "GC_count_RT-PBS",
    "GC_contents_PBS",
    "GC_contents_RTT",
    "GC_contents_RT-PBS",
    "MFE_RT-PBS-polyT",
    "MFE_Spacer",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PegRnaRow {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Spacer")]
    pub spacer: String,
    #[serde(rename = "RT-PBS")]
    pub rt_pbs: String,
    #[serde(rename = "PBS_len")]
    pub pbs_len: usize,
    #[serde(rename = "RTT_len")]
    pub rtt_len: usize,
    #[serde(rename = "RT-PBS_len")]
    pub rt_pbs_len: usize,
    #[serde(rename = "Edit_pos")]
    pub edit_pos: isize,
    #[serde(rename = "Edit_len")]
    pub edit_len: usize,
    #[serde(rename = "RHA_len")]
    pub rha_len: isize,
    #[serde(rename = "Target")]
    pub target: String,
    #[serde(rename = "Masked_EditSeq")]
    pub masked_edit_seq: String,
    pub type_sub: u8,
    pub type_ins: u8,
    pub type_del: u8,
    #[serde(flatten)]
    pub features: FeatureVector,
    #[serde(
        rename = "DeepSpCas9_score",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub nuclease_score: Option<f64>,
}

fn format_float(value: f64) -> String {
    format!("{value:?}")
}

impl PegRnaRow {
    /// Field values in [`COLUMNS`] order, plus the score when present.
    pub fn record(&self) -> Vec<String> {
        let f = &self.features;
        let mut ret = vec![
            self.id.clone(),
            self.spacer.clone(),
            self.rt_pbs.clone(),
            self.pbs_len.to_string(),
            self.rtt_len.to_string(),
            self.rt_pbs_len.to_string(),
            self.edit_pos.to_string(),
            self.edit_len.to_string(),
            self.rha_len.to_string(),
            self.target.clone(),
            self.masked_edit_seq.clone(),
            self.type_sub.to_string(),
            self.type_ins.to_string(),
            self.type_del.to_string(),
            format_float(f.tm1_pbs),
            format_float(f.tm2_rtt_same_length),
            format_float(f.tm3_rtt_replaced),
            format_float(f.tm4_pairwise),
            format_float(f.tm5_rtt_cdna),
            format_float(f.delta_tm),
            f.gc_count_pbs.to_string(),
            f.gc_count_rtt.to_string(),
            f.gc_count_rt_pbs.to_string(),
            format_float(f.gc_contents_pbs),
            format_float(f.gc_contents_rtt),
            format_float(f.gc_contents_rt_pbs),
            format_float(f.mfe_rt_pbs_polyt),
            format_float(f.mfe_spacer),
        ];
        if let Some(score) = self.nuclease_score {
            ret.push(format_float(score));
        }
        ret
    }

    /// First 30 nt of the target context, the nuclease model's input.
    pub fn nuclease_seed(&self) -> &str {
        py_slice(&self.target, 0, 30)
    }
}

/// 74 nt wild-type context around the nick, read on the PAM strand.
pub fn target_context(site: &PamSite, wt: &str) -> String {
    let nick = site.nick;
    match site.strand {
        Strand::Plus => py_slice(wt, nick - CONTEXT_UPSTREAM, nick + CONTEXT_DOWNSTREAM).to_string(),
        Strand::Minus => {
            reverse_complement(py_slice(wt, nick - CONTEXT_DOWNSTREAM, nick + CONTEXT_UPSTREAM))
        }
    }
}

/// PBS+RTT placed so the PBS ends at offset 21, everything else masked.
pub fn masked_context(pbs_rtt: &str, pbs_len: usize, rtt_len: usize) -> String {
    let left = (CONTEXT_UPSTREAM as usize).saturating_sub(pbs_len);
    let right = (CONTEXT_DOWNSTREAM as usize).saturating_sub(rtt_len);
    format!(
        "{}{}{}",
        MASK_CHAR.to_string().repeat(left),
        pbs_rtt,
        MASK_CHAR.to_string().repeat(right)
    )
}

pub fn type_flags(edit: &Edit) -> (u8, u8, u8) {
    match edit {
        Edit::Substitution(_) => (1, 0, 0),
        Edit::Insertion(_) => (0, 1, 0),
        Edit::Deletion(_) => (0, 0, 1),
    }
}

/// Rows for one featurized window, in combination order.
pub fn assemble_rows(
    id: &str,
    window: &CandidateWindow,
    edit: &Edit,
    wt: &str,
    alt: isize,
    featurized: Vec<(Combination, FeatureVector)>,
) -> Vec<PegRnaRow> {
    let site = &window.site;
    let target = target_context(site, wt);
    let spacer = py_slice(&target, 4, 24).to_string();
    let edit_pos = edit.edit_position(site.strand, alt, site.nick);
    let (type_sub, type_ins, type_del) = type_flags(edit);
    featurized
        .into_iter()
        .map(|(combo, features)| {
            let (pbs_len, rtt_len) = (combo.pbs.len(), combo.rtt.len());
            PegRnaRow {
                id: id.to_string(),
                spacer: spacer.clone(),
                rt_pbs: combo.rt_pbs(),
                pbs_len,
                rtt_len,
                rt_pbs_len: pbs_len + rtt_len,
                edit_pos,
                edit_len: edit.length(),
                rha_len: edit.rha_length(rtt_len, edit_pos),
                target: target.clone(),
                masked_edit_seq: masked_context(&combo.pbs_rtt(), pbs_len, rtt_len),
                type_sub,
                type_ins,
                type_del,
                features,
                nuclease_score: None,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTable {
    pub rows: Vec<PegRnaRow>,
}

impl OutputTable {
    pub fn new(rows: Vec<PegRnaRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_scored(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|row| row.nuclease_score.is_some())
    }

    pub fn columns(&self) -> Vec<&'static str> {
        let mut ret = COLUMNS.to_vec();
        if self.is_scored() {
            ret.push(NUCLEASE_SCORE_COLUMN);
        }
        ret
    }

    /// Returns a copy with `scores` attached, one per row in order.
    pub fn with_nuclease_scores(&self, scores: &[f64]) -> Result<Self, DesignError> {
        if scores.len() != self.rows.len() {
            return Err(DesignError::oracle(format!(
                "nuclease scorer returned {} scores for {} rows",
                scores.len(),
                self.rows.len()
            )));
        }
        let rows = self
            .rows
            .iter()
            .zip(scores)
            .map(|(row, score)| PegRnaRow {
                nuclease_score: Some(*score),
                ..row.clone()
            })
            .collect();
        Ok(Self { rows })
    }

    /// Concatenates tables in order; all of them should agree on scoring.
    pub fn concat(tables: Vec<OutputTable>) -> Self {
        Self {
            rows: tables.into_iter().flat_map(|t| t.rows).collect(),
        }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), DesignError> {
        let mut wtr = csv::Writer::from_writer(writer);
        let columns = self.columns();
        wtr.write_record(&columns)?;
        for row in &self.rows {
            let mut record = row.record();
            record.truncate(columns.len());
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, DesignError> {
        let mut buffer = vec![];
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| DesignError {
            code: ErrorCode::Internal,
            message: format!("CSV output is not UTF-8: {e}"),
        })
    }

    pub fn save_csv(&self, path: &Path) -> Result<(), DesignError> {
        let file = File::create(path).map_err(|e| DesignError {
            code: ErrorCode::Io,
            message: format!("Could not create '{}': {e}", path.display()),
        })?;
        self.write_csv(file)
    }

    pub fn to_json_string(&self) -> Result<String, DesignError> {
        serde_json::to_string_pretty(&self.rows).map_err(|e| DesignError {
            code: ErrorCode::Internal,
            message: format!("Could not serialize table: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::LengthKeyed;

    fn wt() -> String {
        "ACGTTGCA".repeat(16)[..121].to_string()
    }

    fn site(strand: Strand, nick: isize) -> PamSite {
        PamSite {
            strand,
            start: 0,
            end: 0,
            nick,
            alt_window: 1,
            pam: "AGG".to_string(),
            guide: String::new(),
        }
    }

    fn sample_row() -> PegRnaRow {
        let window = CandidateWindow {
            site: site(Strand::Plus, 47),
            pbs: LengthKeyed::default(),
            rtt: LengthKeyed::default(),
        };
        let combo = Combination {
            rtt: "ACGTACGTACGTACGT".to_string(),
            pbs: "GGCCAAT".to_string(),
        };
        let mut rows = assemble_rows(
            "site1",
            &window,
            &Edit::Insertion(2),
            &wt(),
            60,
            vec![(combo, FeatureVector::default())],
        );
        rows.remove(0)
    }

    #[test]
    fn test_target_context() {
        let wt = wt();
        let plus = target_context(&site(Strand::Plus, 47), &wt);
        assert_eq!(plus, &wt[26..100]);
        let minus = target_context(&site(Strand::Minus, 75), &wt);
        assert_eq!(minus, reverse_complement(&wt[22..96]));
        assert_eq!(minus.len(), CONTEXT_LENGTH);
    }

    #[test]
    fn test_masked_context() {
        let masked = masked_context("GGGCCCAAATTT", 5, 7);
        assert_eq!(masked.len(), 74);
        assert_eq!(&masked[..16], "x".repeat(16));
        assert_eq!(&masked[16..28], "GGGCCCAAATTT");
        assert_eq!(&masked[28..], "x".repeat(46));
    }

    #[test]
    fn test_assembled_row() {
        let row = sample_row();
        assert_eq!(row.spacer, &row.target[4..24]);
        assert_eq!(row.rt_pbs, reverse_complement("GGCCAATACGTACGTACGTACGT"));
        assert_eq!(row.pbs_len + row.rtt_len, row.rt_pbs_len);
        assert_eq!(row.edit_pos, 14);
        assert_eq!(row.rha_len, 16 - 14 - 2 + 1);
        assert_eq!((row.type_sub, row.type_ins, row.type_del), (0, 1, 0));
        assert_eq!(row.masked_edit_seq.len(), 74);
        assert_eq!(row.nuclease_seed(), &row.target[..30]);
    }

    #[test]
    fn test_csv_header_and_rows() {
        let table = OutputTable::new(vec![sample_row(), sample_row()]);
        let csv = table.to_csv_string().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), COLUMNS.join(","));
        assert_eq!(lines.count(), 2);
        let fields = sample_row().record();
        assert_eq!(fields.len(), COLUMNS.len());
        assert_eq!(fields[14], "0.0");
    }

    #[test]
    fn test_scores_add_column() {
        let table = OutputTable::new(vec![sample_row()]);
        assert!(table.with_nuclease_scores(&[]).is_err());
        let scored = table.with_nuclease_scores(&[42.5]).unwrap();
        assert_eq!(scored.columns().len(), 29);
        assert_eq!(scored.columns()[28], NUCLEASE_SCORE_COLUMN);
        let csv = scored.to_csv_string().unwrap();
        assert!(csv.lines().nth(1).unwrap().ends_with(",42.5"));
        assert!(table.rows[0].nuclease_score.is_none());
    }

    #[test]
    fn test_json_uses_column_names() {
        let scored = OutputTable::new(vec![sample_row()])
            .with_nuclease_scores(&[1.5])
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&scored.to_json_string().unwrap()).unwrap();
        let row = &json[0];
        for column in scored.columns() {
            assert!(row.get(column).is_some(), "missing {column}");
        }
    }

    #[test]
    fn test_save_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        OutputTable::new(vec![sample_row()]).save_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
