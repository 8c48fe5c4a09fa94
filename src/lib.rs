pub mod candidates;
pub mod design;
pub mod designed;
pub mod edit;
pub mod error;
pub mod fasta_windows;
pub mod features;
pub mod gc_contents;
pub mod iupac_code;
pub mod pam;
pub mod rna_structure;
pub mod scoring;
pub mod sequence;
pub mod table;
pub mod thermo;

pub use design::{DesignParameters, DesignRequest, EditSpecification, Oracles, design_batch, design_pegrnas};
pub use error::{DesignError, ErrorCode};
pub use table::{OutputTable, PegRnaRow};
