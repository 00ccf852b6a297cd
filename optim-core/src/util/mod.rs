//! Plain-text import and export for the dense containers.
//!
//! The format is line-oriented: a `# rows: R` header (and `# columns: C`
//! for matrices) followed by whitespace-separated values, one matrix row
//! per line. Readers skip blank lines and treat any other line starting
//! with `#` as a comment, so exported files can be annotated by hand.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::linalg::{Matrix, Vector};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("parse error at line {line}: {token:?}")]
    Parse { line: usize, token: String },

    #[error("bad shape: {0}")]
    Shape(String),
}

/// Write a vector with its `# rows:` header.
pub fn write_vector<W: Write>(out: &mut W, v: &Vector) -> Result<(), ExportError> {
    writeln!(out, "# rows: {}", v.len())?;
    for x in v.iter() {
        writeln!(out, "{x}")?;
    }
    Ok(())
}

/// Write a matrix, one row per line.
pub fn write_matrix<W: Write>(out: &mut W, m: &Matrix) -> Result<(), ExportError> {
    writeln!(out, "# rows: {}", m.rows())?;
    writeln!(out, "# columns: {}", m.cols())?;
    for i in 0..m.rows() {
        let row = m.row(i);
        for (j, x) in row.iter().enumerate() {
            if j > 0 {
                write!(out, " ")?;
            }
            write!(out, "{x}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn header_value(line: &str, key: &str) -> Option<Result<usize, ()>> {
    let rest = line.strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix(key)?.trim_start();
    let rest = rest.strip_prefix(':')?.trim();
    Some(rest.parse::<usize>().map_err(|_| ()))
}

/// Read a vector written by [`write_vector`].
pub fn read_vector<R: BufRead>(input: R) -> Result<Vector, ExportError> {
    let mut declared: Option<usize> = None;
    let mut values = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        let lineno = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') {
            if let Some(parsed) = header_value(trimmed, "rows") {
                declared = Some(parsed.map_err(|_| ExportError::Parse {
                    line: lineno,
                    token: trimmed.to_string(),
                })?);
            }
            continue;
        }
        for token in trimmed.split_whitespace() {
            let x: f32 = token.parse().map_err(|_| ExportError::Parse {
                line: lineno,
                token: token.to_string(),
            })?;
            values.push(x);
        }
    }
    if let Some(n) = declared {
        if n != values.len() {
            return Err(ExportError::Shape(format!(
                "header declared {n} rows, found {} values",
                values.len()
            )));
        }
    }
    Ok(Vector::from_vec(values))
}

/// Read a matrix written by [`write_matrix`].
pub fn read_matrix<R: BufRead>(input: R) -> Result<Matrix, ExportError> {
    let mut rows: Option<usize> = None;
    let mut cols: Option<usize> = None;
    let mut values = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        let lineno = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') {
            for (key, slot) in [("rows", &mut rows), ("columns", &mut cols)] {
                if let Some(parsed) = header_value(trimmed, key) {
                    *slot = Some(parsed.map_err(|_| ExportError::Parse {
                        line: lineno,
                        token: trimmed.to_string(),
                    })?);
                }
            }
            continue;
        }
        for token in trimmed.split_whitespace() {
            let x: f32 = token.parse().map_err(|_| ExportError::Parse {
                line: lineno,
                token: token.to_string(),
            })?;
            values.push(x);
        }
    }
    let (r, c) = match (rows, cols) {
        (Some(r), Some(c)) => (r, c),
        _ => return Err(ExportError::Shape("missing rows/columns header".to_string())),
    };
    Matrix::from_vec(r, c, values)
        .map_err(|_| ExportError::Shape(format!("expected {r}×{c} values")))
}

/// Write a vector to a file.
pub fn save_vector<P: AsRef<Path>>(path: P, v: &Vector) -> Result<(), ExportError> {
    let mut out = BufWriter::new(File::create(path)?);
    write_vector(&mut out, v)
}

/// Read a vector from a file.
pub fn load_vector<P: AsRef<Path>>(path: P) -> Result<Vector, ExportError> {
    read_vector(BufReader::new(File::open(path)?))
}

/// Write a matrix to a file.
pub fn save_matrix<P: AsRef<Path>>(path: P, m: &Matrix) -> Result<(), ExportError> {
    let mut out = BufWriter::new(File::create(path)?);
    write_matrix(&mut out, m)
}

/// Read a matrix from a file.
pub fn load_matrix<P: AsRef<Path>>(path: P) -> Result<Matrix, ExportError> {
    read_matrix(BufReader::new(File::open(path)?))
}
