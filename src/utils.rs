use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::DatasetError;
use crate::Result;

/// Reads a newline-delimited list, trimming each line and skipping blank ones.
pub(crate) fn file_to_vec(filename: &Path) -> Result<Vec<String>> {
    let file_in = fs::File::open(filename).map_err(|e| DatasetError::io(filename, e))?;
    let file_reader = BufReader::new(file_in);
    let mut lines = Vec::new();
    for line in file_reader.lines() {
        let line = line.map_err(|e| DatasetError::io(filename, e))?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    Ok(lines)
}

pub(crate) fn trace(l_type: &str, l_step: &str, start: Instant, prev_elapsed: Duration) -> Duration {
    log::trace!("{} | Total={:.2?} | {}={:.2?}", l_type, start.elapsed(), l_step, start.elapsed() - prev_elapsed);
    start.elapsed()
}
