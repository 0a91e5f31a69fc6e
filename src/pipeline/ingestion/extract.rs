use std::fs;
use std::path::Path;

use crate::constants::FIELD_DELIMITER;
use crate::error::{PipelineError, Result};

/// Raw records of one extract, in file order. Empty fields become `None`.
pub type RawRecords = Vec<Vec<Option<String>>>;

/// Reads a comma-delimited extract with a header row.
///
/// The header is skipped (only its width is checked) and every other
/// non-blank line is split on the delimiter with no quoting, trimming or type
/// coercion. A line whose width differs from `expected_columns` makes the
/// whole extract malformed.
pub fn read_delimited(path: &Path, expected_columns: usize) -> Result<RawRecords> {
    let content = fs::read_to_string(path)?;
    parse_delimited(&content, expected_columns).map_err(|message| PipelineError::MalformedSource {
        path: path.display().to_string(),
        message,
    })
}

fn parse_delimited(content: &str, expected_columns: usize) -> std::result::Result<RawRecords, String> {
    let mut lines = content.lines().enumerate();

    let header = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => break line.trim_start_matches('\u{feff}'),
            None => return Err("missing header row".to_string()),
        }
    };
    let header_width = header.split(FIELD_DELIMITER).count();
    if header_width != expected_columns {
        return Err(format!(
            "header has {} columns, expected {}",
            header_width, expected_columns
        ));
    }

    let mut records = Vec::new();
    for (idx, line) in lines {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<Option<String>> = line
            .split(FIELD_DELIMITER)
            .map(|f| if f.is_empty() { None } else { Some(f.to_string()) })
            .collect();
        if fields.len() != expected_columns {
            return Err(format!(
                "line {} has {} fields, expected {}",
                idx + 1,
                fields.len(),
                expected_columns
            ));
        }
        records.push(fields);
    }
    Ok(records)
}
