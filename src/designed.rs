//! Features for a pegRNA that was designed elsewhere.

use crate::design::{MAX_EDIT_LENGTH, Oracles};
use crate::edit::{Edit, EditKind};
use crate::error::DesignError;
use crate::features::{FeatureVector, PairwiseFailure, pairwise_tm, POLY_T_TERMINATOR};
use crate::rna_structure::FoldOracle;
use crate::scoring::append_nuclease_scores;
use crate::sequence::{back_transcribe, is_dna, py_slice, reverse_complement, transcribe};
use crate::table::{CONTEXT_DOWNSTREAM, CONTEXT_LENGTH, CONTEXT_UPSTREAM, OutputTable, PegRnaRow, masked_context, type_flags};
use crate::thermo::NnTable;
use serde::{Deserialize, Serialize};

/// An existing pegRNA against its 74 nt target context. PBS and RTT are in
/// pegRNA orientation and may use RNA letters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignedPegRna {
    pub id: String,
    pub target: String,
    pub pbs: String,
    pub rtt: String,
    pub edit_len: usize,
    pub edit_pos: isize,
    pub edit_type: EditKind,
}

impl DesignedPegRna {
    fn normalized(&self) -> Self {
        Self {
            target: self.target.to_uppercase(),
            pbs: back_transcribe(&self.pbs.to_uppercase()),
            rtt: back_transcribe(&self.rtt.to_uppercase()),
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<(), DesignError> {
        if self.target.len() != CONTEXT_LENGTH {
            return Err(DesignError::invalid_input(format!(
                "Target has length {}, expected {CONTEXT_LENGTH}",
                self.target.len()
            )));
        }
        if self.pbs.is_empty() || self.pbs.len() > CONTEXT_UPSTREAM as usize {
            return Err(DesignError::invalid_input(format!(
                "PBS length {} outside 1..={CONTEXT_UPSTREAM}",
                self.pbs.len()
            )));
        }
        if self.rtt.is_empty() || self.rtt.len() > CONTEXT_DOWNSTREAM as usize {
            return Err(DesignError::invalid_input(format!(
                "RTT length {} outside 1..={CONTEXT_DOWNSTREAM}",
                self.rtt.len()
            )));
        }
        if !(1..=MAX_EDIT_LENGTH).contains(&self.edit_len) {
            return Err(DesignError::invalid_input(format!(
                "Edit length {} outside 1..={MAX_EDIT_LENGTH}",
                self.edit_len
            )));
        }
        for (name, seq) in [("Target", &self.target), ("PBS", &self.pbs), ("RTT", &self.rtt)] {
            if !is_dna(seq) {
                return Err(DesignError::invalid_input(format!(
                    "{name} '{seq}' contains letters other than A, C, G, T"
                )));
            }
        }
        Ok(())
    }
}

fn fold_energy(fold: &dyn FoldOracle, seq: &str) -> Result<f64, DesignError> {
    fold.fold(seq)
        .map(|f| f.energy)
        .map_err(|e| DesignError::oracle(format!("Folding '{seq}': {e}")))
}

/// One output row for `pegrna`. Folding energies are kept unrounded.
pub fn features_for_designed(pegrna: &DesignedPegRna, oracles: &Oracles) -> Result<PegRnaRow, DesignError> {
    let p = pegrna.normalized();
    p.validate()?;
    let edit = Edit::new(p.edit_type, p.edit_len);
    let target = p.target.as_str();
    let spacer = py_slice(target, 4, 24).to_string();
    let rt_pbs = format!("{}{}", p.rtt, p.pbs);
    let rtt_len = p.rtt.len() as isize;
    let start = CONTEXT_UPSTREAM;
    let replaced = py_slice(target, start, start + rtt_len + edit.replaced_length_adjustment());

    let tm = |seq: &str, table: NnTable| {
        oracles
            .tm
            .melting_temp(seq, None, table)
            .map_err(|e| DesignError::oracle(format!("Tm of '{seq}': {e}")))
    };
    let mut features = FeatureVector {
        tm1_pbs: tm(&transcribe(&p.pbs), NnTable::RDnaNn1)?,
        tm2_rtt_same_length: tm(py_slice(target, start, start + rtt_len), NnTable::DnaNn3)?,
        tm3_rtt_replaced: tm(replaced, NnTable::DnaNn3)?,
        tm4_pairwise: pairwise_tm(
            oracles.tm,
            &reverse_complement(&p.rtt),
            &reverse_complement(replaced),
            NnTable::DnaNn3,
            PairwiseFailure::Zero,
        ),
        tm5_rtt_cdna: tm(&transcribe(&p.rtt), NnTable::RDnaNn1)?,
        ..FeatureVector::default()
    };
    features.delta_tm = features.tm4_pairwise - features.tm2_rtt_same_length;
    features.set_gc(&p.pbs, &p.rtt, &rt_pbs);
    features.mfe_rt_pbs_polyt = fold_energy(oracles.fold, &format!("{rt_pbs}{POLY_T_TERMINATOR}"))?;
    features.mfe_spacer = fold_energy(oracles.fold, &format!("G{}", py_slice(&spacer, 1, 20)))?;

    let (type_sub, type_ins, type_del) = type_flags(&edit);
    let row = PegRnaRow {
        id: p.id.clone(),
        spacer,
        rt_pbs: rt_pbs.clone(),
        pbs_len: p.pbs.len(),
        rtt_len: p.rtt.len(),
        rt_pbs_len: rt_pbs.len(),
        edit_pos: p.edit_pos,
        edit_len: p.edit_len,
        rha_len: edit.rha_length(p.rtt.len(), p.edit_pos),
        target: p.target.clone(),
        masked_edit_seq: masked_context(&reverse_complement(&rt_pbs), p.pbs.len(), p.rtt.len()),
        type_sub,
        type_ins,
        type_del,
        features,
        nuclease_score: None,
    };
    match oracles.nuclease {
        Some(scorer) => {
            let scored = append_nuclease_scores(&OutputTable::new(vec![row]), scorer)?;
            scored
                .rows
                .into_iter()
                .next()
                .ok_or_else(|| DesignError::oracle("Nuclease scorer dropped the row"))
        }
        None => Ok(row),
    }
}
