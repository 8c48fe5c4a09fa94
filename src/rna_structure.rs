use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io::{ErrorKind, Write},
    process::{Command, Output, Stdio},
};

const DEFAULT_RNAFOLD_BIN: &str = "RNAfold";
const RNAFOLD_ENV_BIN: &str = "PEGRNA_RNAFOLD_BIN";

lazy_static! {
    static ref STRUCTURE_LINE: Regex =
        Regex::new(r"^([.()\[\]{}<>]+)\s+\(\s*(-?\d+(?:\.\d+)?)\s*\)\s*$")
            .expect("RNAfold structure line pattern");
}

/// Minimum free energy structure in dot-bracket notation, energy in kcal/mol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fold {
    pub structure: String,
    pub energy: f64,
}

#[derive(Debug, Clone)]
pub enum RnaStructureError {
    EmptySequence,
    ToolNotFound {
        executable: String,
    },
    ToolFailed {
        executable: String,
        args: Vec<String>,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    UnexpectedOutput {
        expected: usize,
        found: usize,
        stdout: String,
    },
    Io {
        message: String,
    },
}

impl fmt::Display for RnaStructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySequence => write!(f, "RNA sequence is empty"),
            Self::ToolNotFound { executable } => write!(
                f,
                "Could not find RNAfold executable '{}'. Install ViennaRNA or set {}",
                executable, RNAFOLD_ENV_BIN
            ),
            Self::ToolFailed {
                executable,
                args,
                status,
                stdout,
                stderr,
            } => write!(
                f,
                "RNAfold command failed: {} {} (status={:?}, stdout='{}', stderr='{}')",
                executable,
                args.join(" "),
                status,
                stdout.trim(),
                stderr.trim()
            ),
            Self::UnexpectedOutput {
                expected,
                found,
                stdout,
            } => write!(
                f,
                "RNAfold returned {found} structures for {expected} sequences: '{}'",
                stdout.trim()
            ),
            Self::Io { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RnaStructureError {}

pub trait FoldOracle: Send + Sync {
    fn fold(&self, sequence: &str) -> Result<Fold, RnaStructureError>;

    /// Folds several sequences; results are in input order.
    fn fold_many(&self, sequences: &[String]) -> Result<Vec<Fold>, RnaStructureError> {
        sequences.iter().map(|seq| self.fold(seq)).collect()
    }
}

/// Runs ViennaRNA's `RNAfold` once per batch, feeding sequences on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RnaFold {
    executable: String,
    args: Vec<String>,
}

impl Default for RnaFold {
    fn default() -> Self {
        Self::new(&rnafold_executable())
    }
}

impl RnaFold {
    pub fn new(executable: &str) -> Self {
        Self {
            executable: executable.to_string(),
            args: vec!["--noPS".to_string()],
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    fn run(&self, input: &str) -> Result<Output, RnaStructureError> {
        let mut child = Command::new(&self.executable)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    RnaStructureError::ToolNotFound {
                        executable: self.executable.clone(),
                    }
                } else {
                    RnaStructureError::Io {
                        message: format!(
                            "Could not run RNAfold executable '{}' with args [{}]: {}",
                            self.executable,
                            self.args.join(" "),
                            e
                        ),
                    }
                }
            })?;
        // Written from a separate thread so a full stdout pipe cannot stall us.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = input.to_string();
            std::thread::spawn(move || stdin.write_all(input.as_bytes()))
        });
        let output = child.wait_with_output().map_err(|e| RnaStructureError::Io {
            message: format!("Could not read RNAfold output: {e}"),
        })?;
        // A failing tool closes stdin early; its exit status is reported instead.
        if let Some(writer) = writer.filter(|_| output.status.success()) {
            match writer.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(RnaStructureError::Io {
                        message: format!("Could not write sequences to RNAfold: {e}"),
                    });
                }
                Err(_) => {
                    return Err(RnaStructureError::Io {
                        message: "RNAfold input writer panicked".to_string(),
                    });
                }
            }
        }
        Ok(output)
    }
}

impl FoldOracle for RnaFold {
    fn fold(&self, sequence: &str) -> Result<Fold, RnaStructureError> {
        self.fold_many(&[sequence.to_string()])?
            .pop()
            .ok_or(RnaStructureError::EmptySequence)
    }

    fn fold_many(&self, sequences: &[String]) -> Result<Vec<Fold>, RnaStructureError> {
        if sequences.is_empty() {
            return Ok(vec![]);
        }
        if sequences.iter().any(|s| s.trim().is_empty()) {
            return Err(RnaStructureError::EmptySequence);
        }
        let mut input = sequences.join("\n");
        input.push('\n');
        let output = self.run(&input)?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(RnaStructureError::ToolFailed {
                executable: self.executable.clone(),
                args: self.args.clone(),
                status: output.status.code(),
                stdout,
                stderr,
            });
        }

        let folds = parse_rnafold_output(&stdout);
        if folds.len() != sequences.len() {
            return Err(RnaStructureError::UnexpectedOutput {
                expected: sequences.len(),
                found: folds.len(),
                stdout,
            });
        }
        debug!("RNAfold folded {} sequences", folds.len());
        Ok(folds)
    }
}

pub fn rnafold_executable() -> String {
    std::env::var(RNAFOLD_ENV_BIN)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_RNAFOLD_BIN.to_string())
}

/// Extracts every `structure ( energy)` line. The energy is read at single
/// precision, as ViennaRNA computes it, then widened.
pub fn parse_rnafold_output(stdout: &str) -> Vec<Fold> {
    stdout
        .lines()
        .filter_map(|line| {
            let caps = STRUCTURE_LINE.captures(line.trim_end())?;
            let energy: f32 = caps.get(2)?.as_str().parse().ok()?;
            Some(Fold {
                structure: caps.get(1)?.as_str().to_string(),
                energy: f64::from(energy),
            })
        })
        .collect()
}
