//! Decoding of submission batches.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::ValidationError;
use crate::measurement::RawSubmission;

/// One entry of a decoded batch: the submission, or why it could not be read.
pub type ParsedSubmission = Result<RawSubmission, ValidationError>;

/// Decodes a batch of raw submissions from bytes.
///
/// Accepts either a JSON array of submission objects or JSON Lines (one
/// object per line, blank lines ignored). An entry that is not a JSON object,
/// or a JSON-lines line that is not valid JSON, yields a
/// [`ValidationError::Malformed`] in its slot so the rest of the batch is
/// still ingested.
///
/// # Errors
///
/// Fails as a whole only when the bytes are not UTF-8 or an array document is
/// not valid JSON.
pub fn parse_submissions(bytes: &[u8]) -> Result<Vec<ParsedSubmission>> {
    let text = std::str::from_utf8(bytes).context("submissions are not UTF-8")?;

    if text.trim_start().starts_with('[') {
        let items: Vec<Value> =
            serde_json::from_str(text).context("invalid JSON array of submissions")?;
        return Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item)
                    .map_err(|e| ValidationError::Malformed(format!("item {i}: {e}")))
            })
            .collect());
    }

    Ok(text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| ValidationError::Malformed(format!("line {}: {e}", i + 1)))
        })
        .collect())
}
