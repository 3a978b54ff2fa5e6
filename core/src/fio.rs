//! # File IO
//!
//! Reading DIMACS (W)CNF instances. Three dialects are supported:
//!
//! - old weighted format: header `p wcnf <vars> <clauses> [<top>]`, every
//!   clause line starts with its weight, weights at or above `top` are hard
//! - plain CNF: header `p cnf <vars> <clauses>`, every clause is hard
//! - the header-less format of recent MaxSAT evaluations: hard clauses start
//!   with `h`, soft clauses with their weight
//!
//! Clauses are zero-terminated and may span lines. Weights may be floating
//! point; the store flags non-integral weights. Files with a `.gz` extension
//! are read through gzip transparently.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use flate2::read::GzDecoder;
use thiserror::Error;

use crate::{
    types::{Lit, TypeError, Weight},
    wcnf::{Wcnf, WcnfError},
};

/// Errors while parsing a DIMACS instance
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed or repeated `p` line
    #[error("invalid DIMACS header: {0:?}")]
    InvalidHeader(String),
    /// Token where a literal was expected
    #[error("invalid literal: {0:?}")]
    InvalidLiteral(String),
    /// Token where a clause weight was expected
    #[error("invalid clause weight: {0:?}")]
    InvalidWeight(String),
    /// The input ended inside a clause
    #[error("clause without terminating 0")]
    MissingTerminator,
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Wcnf(#[from] WcnfError),
}

/// Opens a file for buffered reading, decompressing gzip based on the file
/// extension
///
/// # Errors
///
/// If the file cannot be opened.
pub fn open_compressed_reader(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Unknown,
    Cnf,
    Wcnf,
    /// Header-less format with `h`-prefixed hard clauses
    New,
}

/// Parses a DIMACS instance into the given store
///
/// # Errors
///
/// [`ParseError`] on malformed input.
pub fn parse_dimacs<R: BufRead>(reader: R, wcnf: &mut Wcnf) -> Result<(), ParseError> {
    let mut format = Format::Unknown;
    // weight of the clause being collected; `None` marks a hard clause
    let mut pending: Option<(Option<Weight>, Vec<Lit>)> = None;
    let mut n_cls = 0usize;

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('c') {
            continue;
        }
        if trimmed.starts_with('p') {
            if format != Format::Unknown {
                return Err(ParseError::InvalidHeader(line.clone()));
            }
            format = parse_header(trimmed, wcnf)?;
            continue;
        }
        for tok in trimmed.split_whitespace() {
            if pending.is_some() {
                if tok == "0" {
                    let (weight, lits) = pending.take().unwrap();
                    match weight {
                        Some(w) if format == Format::Wcnf => wcnf.add_dimacs_clause(lits, w)?,
                        Some(w) => wcnf.add_soft_clause(lits, w)?,
                        None => wcnf.add_hard_clause(lits),
                    }
                    n_cls += 1;
                } else {
                    let val: i32 = tok
                        .parse()
                        .map_err(|_| ParseError::InvalidLiteral(tok.to_owned()))?;
                    pending.as_mut().unwrap().1.push(Lit::from_dimacs(val)?);
                }
                continue;
            }
            // first token of a clause
            if format == Format::Unknown {
                format = Format::New;
            }
            match format {
                Format::Cnf => {
                    if tok == "0" {
                        wcnf.add_hard_clause(Vec::new());
                        n_cls += 1;
                    } else {
                        let val: i32 = tok
                            .parse()
                            .map_err(|_| ParseError::InvalidLiteral(tok.to_owned()))?;
                        pending = Some((None, vec![Lit::from_dimacs(val)?]));
                    }
                }
                Format::Wcnf | Format::New => {
                    if format == Format::New && tok == "h" {
                        pending = Some((None, Vec::new()));
                    } else {
                        let weight: Weight = tok
                            .parse()
                            .map_err(|_| ParseError::InvalidWeight(tok.to_owned()))?;
                        pending = Some((Some(weight), Vec::new()));
                    }
                }
                Format::Unknown => unreachable!(),
            }
        }
    }
    if pending.is_some() {
        return Err(ParseError::MissingTerminator);
    }
    if format == Format::New {
        wcnf.set_dimacs_params(wcnf.n_orig_vars, n_cls, Weight::INFINITY);
    }
    Ok(())
}

fn parse_header(line: &str, wcnf: &mut Wcnf) -> Result<Format, ParseError> {
    let invalid = || ParseError::InvalidHeader(line.to_owned());
    let mut toks = line.split_whitespace();
    toks.next(); // "p"
    let fmt = toks.next().ok_or_else(invalid)?;
    let nvars: u32 = toks
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(invalid)?;
    let nclauses: usize = toks
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(invalid)?;
    match fmt {
        "cnf" => {
            wcnf.set_dimacs_params(nvars, nclauses, Weight::INFINITY);
            Ok(Format::Cnf)
        }
        "wcnf" => {
            let top = match toks.next() {
                // old wms instances have no top: every clause is soft
                None => Weight::INFINITY,
                Some(t) => t.parse().map_err(|_| invalid())?,
            };
            wcnf.set_dimacs_params(nvars, nclauses, top);
            Ok(Format::Wcnf)
        }
        _ => Err(invalid()),
    }
}
