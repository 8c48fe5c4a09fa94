//! Everything on the model side of the output table: the nuclease score
//! column, the encoded model input and ensemble post-processing. The models
//! themselves are supplied by the caller.

use crate::error::{DesignError, ErrorCode};
use crate::table::{CONTEXT_LENGTH, NUCLEASE_SCORE_COLUMN, OutputTable, PegRnaRow};
use log::debug;
use std::{collections::HashMap, fs::File, io::Read, path::Path};

pub const NUCLEASE_SEED_LENGTH: usize = 30;

pub const MODEL_FEATURE_COLUMNS: [&str; 24] = [
    "PBS_len",
    "RTT_len",
    "RT-PBS_len",
    "Edit_pos",
    "Edit_len",
    "RHA_len",
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
    NUCLEASE_SCORE_COLUMN,
];

pub type FeatureRow = [f64; 24];

/// Scores 30 nt target seeds (4 nt + protospacer + PAM + 3 nt).
pub trait NucleaseScorer: Send + Sync {
    fn score(&self, seeds: &[String]) -> Result<Vec<f64>, DesignError>;
}

pub fn nuclease_seeds(table: &OutputTable) -> Vec<String> {
    table
        .rows
        .iter()
        .map(|row| row.nuclease_seed().to_string())
        .collect()
}

/// Returns a copy of `table` carrying one nuclease score per row.
pub fn append_nuclease_scores(
    table: &OutputTable,
    scorer: &dyn NucleaseScorer,
) -> Result<OutputTable, DesignError> {
    if table.is_empty() {
        return Ok(table.clone());
    }
    let seeds = nuclease_seeds(table);
    if let Some(seed) = seeds.iter().find(|s| s.len() != NUCLEASE_SEED_LENGTH) {
        return Err(DesignError::invalid_input(format!(
            "Nuclease seed '{seed}' is not {NUCLEASE_SEED_LENGTH} nt"
        )));
    }
    let scores = scorer.score(&seeds)?;
    table.with_nuclease_scores(&scores)
}

/// Model features of one row in [`MODEL_FEATURE_COLUMNS`] order.
pub fn model_features(row: &PegRnaRow) -> Result<FeatureRow, DesignError> {
    let score = row.nuclease_score.ok_or_else(|| {
        DesignError::invalid_input(format!("Row '{}' has no {NUCLEASE_SCORE_COLUMN}", row.id))
    })?;
    let f = &row.features;
    Ok([
        row.pbs_len as f64,
        row.rtt_len as f64,
        row.rt_pbs_len as f64,
        row.edit_pos as f64,
        row.edit_len as f64,
        row.rha_len as f64,
        f64::from(row.type_sub),
        f64::from(row.type_ins),
        f64::from(row.type_del),
        f.tm1_pbs,
        f.tm2_rtt_same_length,
        f.tm3_rtt_replaced,
        f.tm4_pairwise,
        f.tm5_rtt_cdna,
        f.delta_tm,
        f.gc_count_pbs as f64,
        f.gc_count_rtt as f64,
        f.gc_count_rt_pbs as f64,
        f.gc_contents_pbs,
        f.gc_contents_rtt,
        f.gc_contents_rt_pbs,
        f.mfe_rt_pbs_polyt,
        f.mfe_spacer,
        score,
    ])
}

/// Per-column mean and standard deviation used to standardise features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureNormalization {
    pub mean: FeatureRow,
    pub std: FeatureRow,
}

fn read_named_values<R: Read>(reader: R, what: &str) -> Result<FeatureRow, DesignError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut values = HashMap::new();
    for record in rdr.records() {
        let record = record?;
        let (Some(name), Some(value)) = (record.get(0), record.get(1)) else {
            continue;
        };
        let value: f64 = value.trim().parse().map_err(|e| {
            DesignError::invalid_input(format!("Bad {what} value for '{}': {e}", name.trim()))
        })?;
        values.insert(name.trim().to_string(), value);
    }
    let mut ret = [0.0; 24];
    for (slot, column) in ret.iter_mut().zip(MODEL_FEATURE_COLUMNS) {
        *slot = *values.get(column).ok_or_else(|| DesignError {
            code: ErrorCode::NotFound,
            message: format!("No {what} value for column '{column}'"),
        })?;
    }
    Ok(ret)
}

impl FeatureNormalization {
    /// Reads two header-less `name,value` tables. Column order in the files
    /// does not matter; extra names are ignored.
    pub fn from_readers<R1: Read, R2: Read>(mean: R1, std: R2) -> Result<Self, DesignError> {
        Ok(Self {
            mean: read_named_values(mean, "mean")?,
            std: read_named_values(std, "std")?,
        })
    }

    pub fn from_paths(mean: &Path, std: &Path) -> Result<Self, DesignError> {
        let open = |path: &Path| {
            File::open(path).map_err(|e| DesignError {
                code: ErrorCode::Io,
                message: format!("Could not open '{}': {e}", path.display()),
            })
        };
        Self::from_readers(open(mean)?, open(std)?)
    }

    pub fn standardize(&self, row: &FeatureRow) -> FeatureRow {
        let mut ret = [0.0; 24];
        for (i, slot) in ret.iter_mut().enumerate() {
            *slot = (row[i] - self.mean[i]) / self.std[i];
        }
        ret
    }
}

/// One-hot encodes `seq` in A, C, G, T order. The mask character and any
/// other letter encode as all zeros.
pub fn one_hot(seq: &str) -> Vec<[f64; 4]> {
    seq.bytes()
        .map(|b| match b.to_ascii_uppercase() {
            b'A' => [1.0, 0.0, 0.0, 0.0],
            b'C' => [0.0, 1.0, 0.0, 0.0],
            b'G' => [0.0, 0.0, 1.0, 0.0],
            b'T' => [0.0, 0.0, 0.0, 1.0],
            _ => [0.0; 4],
        })
        .collect()
}

/// Wild-type and masked edited context, each 74 x 4, mapped onto {-1, 1}.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPair {
    pub target: Vec<[f64; 4]>,
    pub edited: Vec<[f64; 4]>,
}

impl WindowPair {
    pub fn encode(target: &str, masked: &str) -> Result<Self, DesignError> {
        for seq in [target, masked] {
            if seq.len() != CONTEXT_LENGTH {
                return Err(DesignError::invalid_input(format!(
                    "Context '{seq}' is not {CONTEXT_LENGTH} nt"
                )));
            }
        }
        let signed = |seq: &str| -> Vec<[f64; 4]> {
            one_hot(seq)
                .into_iter()
                .map(|row| row.map(|g| 2.0 * g - 1.0))
                .collect()
        };
        Ok(Self {
            target: signed(target),
            edited: signed(masked),
        })
    }

    pub fn is_masked(&self, position: usize) -> bool {
        self.edited
            .get(position)
            .is_some_and(|row| row.iter().all(|&g| g == -1.0))
    }
}

/// Everything an activity model consumes, one entry per table row.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub windows: Vec<WindowPair>,
    pub features: Vec<FeatureRow>,
}

impl ModelInput {
    pub fn from_table(
        table: &OutputTable,
        normalization: &FeatureNormalization,
    ) -> Result<Self, DesignError> {
        let mut windows = Vec::with_capacity(table.len());
        let mut features = Vec::with_capacity(table.len());
        for row in &table.rows {
            windows.push(WindowPair::encode(&row.target, &row.masked_edit_seq)?);
            features.push(normalization.standardize(&model_features(row)?));
        }
        Ok(Self { windows, features })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// One trained replica; returns a log-domain prediction per row.
pub trait ActivityModel: Send + Sync {
    fn predict(&self, input: &ModelInput) -> Result<Vec<f64>, DesignError>;
}

/// Averages the replicas row by row and back-transforms with `exp(x) - 1`.
pub fn ensemble_predict(
    models: &[&dyn ActivityModel],
    input: &ModelInput,
) -> Result<Vec<f64>, DesignError> {
    if models.is_empty() {
        return Err(DesignError::invalid_input("No activity models given"));
    }
    let mut sums = vec![0.0; input.len()];
    for (i, model) in models.iter().enumerate() {
        let preds = model.predict(input)?;
        if preds.len() != sums.len() {
            return Err(DesignError::oracle(format!(
                "Model {i} returned {} predictions for {} rows",
                preds.len(),
                sums.len()
            )));
        }
        for (sum, pred) in sums.iter_mut().zip(preds) {
            *sum += pred;
        }
    }
    debug!("Averaged {} models over {} rows", models.len(), sums.len());
    let n = models.len() as f64;
    Ok(sums.into_iter().map(|sum| (sum / n).exp() - 1.0).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;
    use crate::table::masked_context;

    fn row() -> PegRnaRow {
        PegRnaRow {
            id: "r".to_string(),
            spacer: "A".repeat(20),
            rt_pbs: "ACGT".to_string(),
            pbs_len: 7,
            rtt_len: 15,
            rt_pbs_len: 22,
            edit_pos: 14,
            edit_len: 1,
            rha_len: 1,
            target: "ACGT".repeat(19)[..74].to_string(),
            masked_edit_seq: masked_context(&"G".repeat(22), 7, 15),
            type_sub: 1,
            type_ins: 0,
            type_del: 0,
            features: FeatureVector {
                mfe_spacer: -2.5,
                ..FeatureVector::default()
            },
            nuclease_score: None,
        }
    }

    struct ConstScorer(f64);

    impl NucleaseScorer for ConstScorer {
        fn score(&self, seeds: &[String]) -> Result<Vec<f64>, DesignError> {
            Ok(vec![self.0; seeds.len()])
        }
    }

    struct ConstModel(f64);

    impl ActivityModel for ConstModel {
        fn predict(&self, input: &ModelInput) -> Result<Vec<f64>, DesignError> {
            Ok(vec![self.0; input.len()])
        }
    }

    fn normalization_csv(value: impl Fn(usize) -> f64) -> String {
        MODEL_FEATURE_COLUMNS
            .iter()
            .enumerate()
            .rev()
            .map(|(i, name)| format!("{name},{}\n", value(i)))
            .collect()
    }

    #[test]
    fn test_seeds_and_scores() {
        let table = OutputTable::new(vec![row(), row()]);
        let seeds = nuclease_seeds(&table);
        assert_eq!(seeds[0], &row().target[..30]);
        let scored = append_nuclease_scores(&table, &ConstScorer(55.0)).unwrap();
        assert!(scored.rows.iter().all(|r| r.nuclease_score == Some(55.0)));
        let empty = append_nuclease_scores(&OutputTable::default(), &ConstScorer(1.0)).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_model_features_need_score() {
        assert!(model_features(&row()).is_err());
        let mut r = row();
        r.nuclease_score = Some(3.0);
        let features = model_features(&r).unwrap();
        assert_eq!(features[0], 7.0);
        assert_eq!(features[3], 14.0);
        assert_eq!(features[6], 1.0);
        assert_eq!(features[22], -2.5);
        assert_eq!(features[23], 3.0);
    }

    #[test]
    fn test_normalization_aligns_by_name() {
        let mean = normalization_csv(|i| i as f64);
        let std = normalization_csv(|_| 2.0);
        let norm = FeatureNormalization::from_readers(mean.as_bytes(), std.as_bytes()).unwrap();
        assert_eq!(norm.mean[0], 0.0);
        assert_eq!(norm.mean[23], 23.0);
        let standardized = norm.standardize(&[10.0; 24]);
        assert_eq!(standardized[0], 5.0);
        assert_eq!(standardized[10], 0.0);
    }

    #[test]
    fn test_normalization_missing_column() {
        let mean = "PBS_len,1.0\n";
        let err = FeatureNormalization::from_readers(mean.as_bytes(), mean.as_bytes()).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_normalization_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let mean = dir.path().join("mean.csv");
        let std = dir.path().join("std.csv");
        std::fs::write(&mean, normalization_csv(|_| 1.0)).unwrap();
        std::fs::write(&std, normalization_csv(|_| 4.0)).unwrap();
        let norm = FeatureNormalization::from_paths(&mean, &std).unwrap();
        assert_eq!(norm.std, [4.0; 24]);
        assert!(FeatureNormalization::from_paths(&dir.path().join("none.csv"), &std).is_err());
    }

    #[test]
    fn test_one_hot() {
        assert_eq!(
            one_hot("ACGTx"),
            vec![
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
                [0.0; 4],
            ]
        );
    }

    #[test]
    fn test_window_pair_masks() {
        let r = row();
        let pair = WindowPair::encode(&r.target, &r.masked_edit_seq).unwrap();
        assert_eq!(pair.target.len(), 74);
        assert_eq!(pair.target[0], [1.0, -1.0, -1.0, -1.0]);
        assert!(pair.is_masked(0));
        assert!(!pair.is_masked(14));
        assert_eq!(pair.edited[14], [-1.0, -1.0, 1.0, -1.0]);
        assert!(pair.is_masked(36));
        assert!(WindowPair::encode("ACGT", &r.masked_edit_seq).is_err());
    }

    #[test]
    fn test_ensemble_average_and_back_transform() {
        let mut r = row();
        r.nuclease_score = Some(1.0);
        let norm = FeatureNormalization {
            mean: [0.0; 24],
            std: [1.0; 24],
        };
        let input = ModelInput::from_table(&OutputTable::new(vec![r.clone(), r]), &norm).unwrap();
        assert_eq!(input.len(), 2);
        let (a, b) = (ConstModel(1.0), ConstModel(3.0));
        let preds = ensemble_predict(&[&a, &b], &input).unwrap();
        assert_eq!(preds.len(), 2);
        assert!((preds[0] - (2.0f64.exp() - 1.0)).abs() < 1e-12);
        assert!(ensemble_predict(&[], &input).is_err());
    }
}
