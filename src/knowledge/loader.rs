use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::debug;

/// Reads two named columns of a CSV file as `(key, value)` pairs.
///
/// Header names match case-insensitively. Rows with an empty key or value are
/// dropped; a file missing either column is an error.
pub fn read_pairs(path: &Path, key_column: &str, value_column: &str) -> Result<Vec<(String, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow!("{} has no '{}' column", path.display(), name))
    };
    let key_idx = column(key_column)?;
    let value_idx = column(value_column)?;

    let mut pairs = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        match (record.get(key_idx), record.get(value_idx)) {
            (Some(key), Some(value)) if !key.is_empty() && !value.is_empty() => {
                pairs.push((key.to_string(), value.to_string()));
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!("Skipped {} incomplete rows in {}", skipped, path.display());
    }
    Ok(pairs)
}

/// Question/answer corpus rows.
pub fn read_corpus(path: &Path) -> Result<Vec<(String, String)>> {
    read_pairs(path, "Question", "Answer")
}

/// Utterance/intent rows of an exact intent lookup table.
pub fn read_intent_table(path: &Path) -> Result<Vec<(String, String)>> {
    read_pairs(path, "text", "intent")
}
