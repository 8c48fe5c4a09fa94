use crate::candidates::build_window;
use crate::edit::{Edit, EditKind};
use crate::error::DesignError;
use crate::features::featurize_window;
use crate::pam::{PamFamily, scan_pam_sites};
use crate::rna_structure::FoldOracle;
use crate::scoring::{NucleaseScorer, append_nuclease_scores};
use crate::sequence::is_dna;
use crate::table::{OutputTable, assemble_rows};
use crate::thermo::TmOracle;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const WINDOW_LENGTH: usize = 121;
pub const ALT_INDEX: isize = 60;
pub const MAX_EDIT_LENGTH: usize = 3;
pub const MAX_PBS_LENGTH: usize = 17;
pub const MAX_RTT_LENGTH: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSpecification {
    pub id: String,
    pub wt_window: String,
    pub edited_window: String,
    pub edit_type: EditKind,
    pub edit_len: usize,
}

impl EditSpecification {
    pub fn new(
        id: &str,
        wt_window: &str,
        edited_window: &str,
        edit_type: EditKind,
        edit_len: usize,
    ) -> Self {
        Self {
            id: id.to_string(),
            wt_window: wt_window.to_uppercase(),
            edited_window: edited_window.to_uppercase(),
            edit_type,
            edit_len,
        }
    }

    /// Copy with both windows upper-cased.
    pub fn normalized(&self) -> Self {
        Self::new(
            &self.id,
            &self.wt_window,
            &self.edited_window,
            self.edit_type,
            self.edit_len,
        )
    }

    pub fn edit(&self) -> Edit {
        Edit::new(self.edit_type, self.edit_len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignParameters {
    pub pam: PamFamily,
    pub pbs_min: usize,
    pub pbs_max: usize,
    pub rtt_max: usize,
    pub fixed_pbs_len: Option<usize>,
    pub fixed_rtt_len: Option<usize>,
}

impl Default for DesignParameters {
    fn default() -> Self {
        Self {
            pam: PamFamily::Ngg,
            pbs_min: 7,
            pbs_max: 15,
            rtt_max: MAX_RTT_LENGTH,
            fixed_pbs_len: None,
            fixed_rtt_len: None,
        }
    }
}

/// One request as read from JSON: the edit fields at top level, parameters
/// nested and optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignRequest {
    #[serde(flatten)]
    pub spec: EditSpecification,
    #[serde(default)]
    pub parameters: DesignParameters,
}

impl DesignRequest {
    /// Upper-cases both windows, as [`EditSpecification::new`] does.
    pub fn normalized(self) -> Self {
        Self {
            spec: self.spec.normalized(),
            ..self
        }
    }
}

/// External collaborators shared by every request.
#[derive(Clone, Copy)]
pub struct Oracles<'a> {
    pub tm: &'a dyn TmOracle,
    pub fold: &'a dyn FoldOracle,
    pub nuclease: Option<&'a dyn NucleaseScorer>,
}

impl<'a> Oracles<'a> {
    pub fn new(tm: &'a dyn TmOracle, fold: &'a dyn FoldOracle) -> Self {
        Self {
            tm,
            fold,
            nuclease: None,
        }
    }

    pub fn with_nuclease(self, scorer: &'a dyn NucleaseScorer) -> Self {
        Self {
            nuclease: Some(scorer),
            ..self
        }
    }
}

fn validate_window(name: &str, window: &str) -> Result<(), DesignError> {
    if window.len() != WINDOW_LENGTH {
        return Err(DesignError::invalid_input(format!(
            "{name} window has length {}, expected {WINDOW_LENGTH}",
            window.len()
        )));
    }
    if !is_dna(window) {
        return Err(DesignError::invalid_input(format!(
            "{name} window contains letters other than A, C, G, T"
        )));
    }
    Ok(())
}

pub fn validate(spec: &EditSpecification, params: &DesignParameters) -> Result<(), DesignError> {
    validate_window("Wild-type", &spec.wt_window)?;
    validate_window("Edited", &spec.edited_window)?;
    if !(1..=MAX_EDIT_LENGTH).contains(&spec.edit_len) {
        return Err(DesignError::invalid_input(format!(
            "Edit length {} outside 1..={MAX_EDIT_LENGTH}",
            spec.edit_len
        )));
    }
    if params.pbs_min < 1 || params.pbs_max > MAX_PBS_LENGTH || params.pbs_min > params.pbs_max {
        return Err(DesignError::invalid_input(format!(
            "PBS bounds {}..={} must lie within 1..={MAX_PBS_LENGTH}",
            params.pbs_min, params.pbs_max
        )));
    }
    if !(1..=MAX_RTT_LENGTH).contains(&params.rtt_max) {
        return Err(DesignError::invalid_input(format!(
            "Maximum RTT length {} outside 1..={MAX_RTT_LENGTH}",
            params.rtt_max
        )));
    }
    if let Some(len) = params.fixed_pbs_len {
        if !(params.pbs_min..=params.pbs_max).contains(&len) {
            return Err(DesignError::invalid_input(format!(
                "Fixed PBS length {len} outside {}..={}",
                params.pbs_min, params.pbs_max
            )));
        }
    }
    if let Some(len) = params.fixed_rtt_len {
        if !(1..=params.rtt_max).contains(&len) {
            return Err(DesignError::invalid_input(format!(
                "Fixed RTT length {len} outside 1..={}",
                params.rtt_max
            )));
        }
    }
    Ok(())
}

/// Scans, enumerates and featurizes every pegRNA for one edit. Windows are
/// upper-cased first. An empty table means no PAM site could support the edit.
pub fn design_pegrnas(
    spec: &EditSpecification,
    params: &DesignParameters,
    oracles: &Oracles,
) -> Result<OutputTable, DesignError> {
    let spec = &spec.normalized();
    validate(spec, params)?;
    let edit = spec.edit();
    let wt = spec.wt_window.as_str();
    let edited = spec.edited_window.as_str();
    let notation = edit.notation(wt, edited, ALT_INDEX);

    let sites = scan_pam_sites(wt, &edit, params.pam, ALT_INDEX, params.rtt_max);
    let site_count = sites.len();
    let windows: Vec<_> = sites
        .into_iter()
        .filter_map(|site| build_window(site, &edit, edited, ALT_INDEX, params))
        .collect();

    let mut rows = vec![];
    for window in &windows {
        debug!(
            "{}: {} combinations",
            window.site.key(&edit, &notation),
            window.combination_count()
        );
        let featurized = featurize_window(window, &edit, wt, oracles.tm, oracles.fold)?;
        rows.extend(assemble_rows(&spec.id, window, &edit, wt, ALT_INDEX, featurized));
    }
    let mut table = OutputTable::new(rows);
    if let Some(scorer) = oracles.nuclease {
        table = append_nuclease_scores(&table, scorer)?;
    }
    info!(
        "{} ({} {notation}): {} PAM sites, {} usable, {} pegRNAs",
        spec.id,
        edit.key(),
        site_count,
        windows.len(),
        table.len()
    );
    Ok(table)
}

/// Designs independent requests in parallel. Results keep input order; one
/// failing request does not affect the others.
pub fn design_batch(
    requests: &[DesignRequest],
    oracles: &Oracles,
) -> Vec<Result<OutputTable, DesignError>> {
    requests
        .par_iter()
        .map(|request| design_pegrnas(&request.spec, &request.parameters, oracles))
        .collect()
}
