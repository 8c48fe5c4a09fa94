//! Nearest-neighbour melting temperatures.
//!
//! [`NearestNeighborTm`] follows the two-state nearest-neighbour model with
//! terminal initiation penalties and the entropy salt correction of
//! Owczarzy et al. (2004). Only Watson-Crick stacks are tabulated: a
//! neighbour pair missing from the table is an error, which callers
//! computing per-position temperatures treat as "skip this position".

use serde::{Deserialize, Serialize};
use std::fmt;

const GAS_CONSTANT: f64 = 1.987;
const ABSOLUTE_ZERO: f64 = 273.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NnTable {
    /// DNA/DNA, Allawi & SantaLucia (1997).
    DnaNn3,
    /// RNA/DNA hybrid, Sugimoto et al. (1995).
    RDnaNn1,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TmError {
    EmptySequence,
    LengthMismatch { seq: usize, complement: usize },
    MissingNeighbors { neighbors: String },
    InvalidConditions { message: String },
}

impl fmt::Display for TmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySequence => write!(f, "Tm sequence is empty"),
            Self::LengthMismatch { seq, complement } => write!(
                f,
                "Tm sequence length {seq} does not match complement length {complement}"
            ),
            Self::MissingNeighbors { neighbors } => {
                write!(f, "no thermodynamic data for neighbors '{neighbors}'")
            }
            Self::InvalidConditions { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for TmError {}

pub trait TmOracle: Send + Sync {
    /// Melting temperature in degrees Celsius of `seq` against `complement`
    /// (3'->5', aligned base by base) or, if absent, its perfect complement.
    fn melting_temp(&self, seq: &str, complement: Option<&str>, table: NnTable) -> Result<f64, TmError>;
}

type Thermo = (f64, f64);

struct NnParams {
    init: Thermo,
    init_a_t: Thermo,
    init_g_c: Thermo,
    init_one_g_c: Thermo,
    init_all_a_t: Thermo,
    init_5t_a: Thermo,
    stacks: &'static [(&'static str, Thermo)],
}

impl NnParams {
    fn stack(&self, neighbors: &str) -> Option<Thermo> {
        self.stacks
            .iter()
            .find(|(key, _)| *key == neighbors)
            .map(|(_, v)| *v)
    }
}

const DNA_NN3: NnParams = NnParams {
    init: (0.0, 0.0),
    init_a_t: (2.3, 4.1),
    init_g_c: (0.1, -2.8),
    init_one_g_c: (0.0, 0.0),
    init_all_a_t: (0.0, 0.0),
    init_5t_a: (0.0, 0.0),
    stacks: &[
        ("AA/TT", (-7.9, -22.2)),
        ("AT/TA", (-7.2, -20.4)),
        ("TA/AT", (-7.2, -21.3)),
        ("CA/GT", (-8.5, -22.7)),
        ("GT/CA", (-8.4, -22.4)),
        ("CT/GA", (-7.8, -21.0)),
        ("GA/CT", (-8.2, -22.2)),
        ("CG/GC", (-10.6, -27.2)),
        ("GC/CG", (-9.8, -24.4)),
        ("GG/CC", (-8.0, -19.9)),
    ],
};

const R_DNA_NN1: NnParams = NnParams {
    init: (1.9, -3.9),
    init_a_t: (0.0, 0.0),
    init_g_c: (0.0, 0.0),
    init_one_g_c: (0.0, 0.0),
    init_all_a_t: (0.0, 0.0),
    init_5t_a: (0.0, 0.0),
    stacks: &[
        ("AA/TT", (-11.5, -36.4)),
        ("AC/TG", (-7.8, -21.6)),
        ("AG/TC", (-7.0, -19.7)),
        ("AT/TA", (-8.3, -23.9)),
        ("CA/GT", (-10.4, -28.4)),
        ("CC/GG", (-12.8, -31.9)),
        ("CG/GC", (-16.3, -47.1)),
        ("CT/GA", (-9.1, -23.5)),
        ("GA/CT", (-8.6, -22.9)),
        ("GC/CG", (-8.0, -17.1)),
        ("GG/CC", (-9.3, -23.2)),
        ("GT/CA", (-5.9, -12.3)),
        ("TA/AT", (-7.8, -23.2)),
        ("TC/AG", (-5.5, -13.5)),
        ("TG/AC", (-9.0, -26.1)),
        ("TT/AA", (-7.8, -21.9)),
    ],
};

fn params(table: NnTable) -> &'static NnParams {
    match table {
        NnTable::DnaNn3 => &DNA_NN3,
        NnTable::RDnaNn1 => &R_DNA_NN1,
    }
}

/// Upper-cases, back-transcribes and drops anything other than A, C, G, T
/// and inosine.
fn normalize(seq: &str) -> String {
    seq.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c.to_ascii_uppercase() {
            'U' => 'T',
            other => other,
        })
        .filter(|c| "ACGTI".contains(*c))
        .collect()
}

fn dna_complement(seq: &str) -> String {
    seq.chars()
        .map(|c| match c {
            'A' => 'T',
            'T' => 'A',
            'C' => 'G',
            'G' => 'C',
            other => other,
        })
        .collect()
}

/// Duplex conditions; concentrations in nM (strands) and mM (ions).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NearestNeighborTm {
    pub dnac1: f64,
    pub dnac2: f64,
    pub na: f64,
    pub k: f64,
    pub tris: f64,
}

impl Default for NearestNeighborTm {
    fn default() -> Self {
        Self {
            dnac1: 25.0,
            dnac2: 25.0,
            na: 50.0,
            k: 0.0,
            tris: 0.0,
        }
    }
}

impl NearestNeighborTm {
    fn salt_correction(&self, seq_len: usize) -> Result<f64, TmError> {
        let mon = (self.na + self.k + self.tris / 2.0) * 1e-3;
        if mon <= 0.0 {
            return Err(TmError::InvalidConditions {
                message: "total monovalent ion concentration must be positive".to_string(),
            });
        }
        Ok(0.368 * (seq_len as f64 - 1.0) * mon.ln())
    }
}

impl TmOracle for NearestNeighborTm {
    fn melting_temp(&self, seq: &str, complement: Option<&str>, table: NnTable) -> Result<f64, TmError> {
        let seq = normalize(seq);
        let c_seq = match complement {
            Some(c) => normalize(c),
            None => dna_complement(&seq),
        };
        if seq.is_empty() {
            return Err(TmError::EmptySequence);
        }
        if seq.len() != c_seq.len() {
            return Err(TmError::LengthMismatch {
                seq: seq.len(),
                complement: c_seq.len(),
            });
        }
        let nn = params(table);
        let bytes = seq.as_bytes();
        let (mut dh, mut ds) = (0.0, 0.0);

        dh += nn.init.0;
        ds += nn.init.1;

        let has_gc = bytes.iter().any(|b| matches!(b, b'G' | b'C' | b'S'));
        let (h, s) = if has_gc { nn.init_one_g_c } else { nn.init_all_a_t };
        dh += h;
        ds += s;

        if bytes[0] == b'T' {
            dh += nn.init_5t_a.0;
            ds += nn.init_5t_a.1;
        }
        if bytes[bytes.len() - 1] == b'A' {
            dh += nn.init_5t_a.0;
            ds += nn.init_5t_a.1;
        }

        let ends = [bytes[0], bytes[bytes.len() - 1]];
        let at = ends.iter().filter(|b| matches!(b, b'A' | b'T')).count() as f64;
        let gc = ends.iter().filter(|b| matches!(b, b'G' | b'C')).count() as f64;
        dh += nn.init_a_t.0 * at;
        ds += nn.init_a_t.1 * at;
        dh += nn.init_g_c.0 * gc;
        ds += nn.init_g_c.1 * gc;

        for i in 0..bytes.len() - 1 {
            let neighbors = format!("{}/{}", &seq[i..i + 2], &c_seq[i..i + 2]);
            let reversed: String = neighbors.chars().rev().collect();
            let (h, s) = nn
                .stack(&neighbors)
                .or_else(|| nn.stack(&reversed))
                .ok_or(TmError::MissingNeighbors { neighbors })?;
            dh += h;
            ds += s;
        }

        let k = (self.dnac1 - (self.dnac2 / 2.0)) * 1e-9;
        if k <= 0.0 {
            return Err(TmError::InvalidConditions {
                message: "strand concentrations give a non-positive k".to_string(),
            });
        }
        ds += self.salt_correction(seq.len())?;
        Ok((1000.0 * dh) / (ds + (GAS_CONSTANT * k.ln())) - ABSOLUTE_ZERO)
    }
}
