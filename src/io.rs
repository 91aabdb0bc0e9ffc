// io.rs
//
// Line readers for the reference panel and target files. Compression is chosen
// from the file extension.

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use log::debug;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::error::{ImpRefError, Result};

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Opens `path` for line-oriented reading, decompressing `.gz`/`.bgz` and `.bz2` files.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| ImpRefError::io(path, e))?;
    let lower = path.to_string_lossy().to_ascii_lowercase();
    if lower.ends_with(".gz") || lower.ends_with(".bgz") {
        debug!("Opening {} as gzip.", path.display());
        Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER_BYTES,
            MultiGzDecoder::new(file),
        )))
    } else if lower.ends_with(".bz2") {
        debug!("Opening {} as bzip2.", path.display());
        Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER_BYTES,
            MultiBzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, file)))
    }
}

/// Reads one integer class label per non-blank line, in reference sample order.
pub fn read_labels(path: &Path) -> Result<Vec<usize>> {
    let reader = open_text(path)?;
    let mut labels = Vec::new();
    for (line_idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ImpRefError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let label = trimmed.parse::<usize>().map_err(|e| {
            ImpRefError::parse(
                path,
                line_idx + 1,
                format!("class label '{}' is not a non-negative integer: {}", trimmed, e),
            )
        })?;
        labels.push(label);
    }
    if labels.is_empty() {
        return Err(ImpRefError::EmptyInput {
            what: "reference class labels",
        });
    }
    Ok(labels)
}

/// Reads one population name per non-blank line; line order defines the label index.
pub fn read_names(path: &Path) -> Result<Vec<String>> {
    let reader = open_text(path)?;
    let mut names = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| ImpRefError::io(path, e))?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            names.push(trimmed.to_string());
        }
    }
    Ok(names)
}
