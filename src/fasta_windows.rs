//! Edit windows read from FASTA. Records come in pairs: the wild-type window
//! first, its description naming the edit (`sub1`, `ins2`, `del3`), then the
//! edited window. The wild-type record's id becomes the request id.

use crate::design::{DesignParameters, DesignRequest, EditSpecification};
use crate::edit::{Edit, EditKind};
use anyhow::{Result, anyhow, bail};
use bio::io::fasta;
use lazy_static::lazy_static;
use regex::Regex;
use std::{fs::File, io::Read};

lazy_static! {
    static ref EDIT_KEY: Regex =
        Regex::new(r"^(?i)(sub|ins|del)([0-9]+)$").expect("edit key pattern");
}

/// Parses an edit key such as `sub1` or `DEL3`.
pub fn parse_edit_key(key: &str) -> Result<Edit> {
    let caps = EDIT_KEY
        .captures(key.trim())
        .ok_or_else(|| anyhow!("'{key}' is not an edit key like sub1, ins2 or del3"))?;
    let kind: EditKind = caps[1].parse()?;
    let length: usize = caps[2].parse()?;
    Ok(Edit::new(kind, length))
}

fn request_from_pair(
    wt: &fasta::Record,
    edited: &fasta::Record,
    params: &DesignParameters,
) -> Result<DesignRequest> {
    let key = wt
        .desc()
        .and_then(|desc| desc.split_whitespace().next())
        .ok_or_else(|| anyhow!("Record '{}' has no edit key in its description", wt.id()))?;
    let edit = parse_edit_key(key)?;
    let spec = EditSpecification::new(
        wt.id(),
        std::str::from_utf8(wt.seq())?,
        std::str::from_utf8(edited.seq())?,
        edit.kind(),
        edit.length(),
    );
    Ok(DesignRequest {
        spec,
        parameters: *params,
    })
}

pub fn read_window_pairs<R: Read>(reader: R, params: &DesignParameters) -> Result<Vec<DesignRequest>> {
    let records = fasta::Reader::new(reader)
        .records()
        .collect::<Result<Vec<_>, _>>()?;
    if records.len() % 2 != 0 {
        bail!(
            "Expected wild-type/edited record pairs, found {} records",
            records.len()
        );
    }
    records
        .chunks(2)
        .map(|pair| request_from_pair(&pair[0], &pair[1], params))
        .collect()
}

pub fn read_window_pairs_file(filename: &str, params: &DesignParameters) -> Result<Vec<DesignRequest>> {
    let file = File::open(filename)?;
    read_window_pairs(file, params)
}
