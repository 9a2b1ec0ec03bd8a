//! Extraction of system responses from response-only lines.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{FlattenError, Result};
use crate::{END_OF_SENTENCE, START_OF_RESPONSE};

/// A line split at its first `<SOR>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub context: String,
    pub response: String,
}

/// A generated response lined up with its reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponsePair {
    pub context: String,
    pub predicted: String,
    pub target: String,
}

/// Split a line into its context and response.
///
/// The response loses a trailing `<EOS>` and surrounding whitespace. A line
/// without `<SOR>` is all context with an empty response.
pub fn parse_response(line: &str) -> ResponseLine {
    let (context, response) = line.split_once(START_OF_RESPONSE).unwrap_or((line, ""));
    let response = response.trim();
    let response = response.strip_suffix(END_OF_SENTENCE).unwrap_or(response);
    ResponseLine {
        context: context.trim_matches('\n').to_string(),
        response: response.trim().to_string(),
    }
}

pub fn parse_responses_from_file(path: &Path) -> Result<Vec<ResponseLine>> {
    let text = fs::read_to_string(path).map_err(|e| FlattenError::io(path, e))?;
    Ok(text.lines().map(parse_response).collect())
}

/// Pair predicted and target lines positionally.
///
/// Both sides must share the same context on every line; pairing stops at
/// the shorter input.
pub fn pair_responses(predicted: &[ResponseLine], target: &[ResponseLine]) -> Result<Vec<ResponsePair>> {
    predicted
        .iter()
        .zip(target)
        .enumerate()
        .map(|(idx, (pred, gold))| {
            if pred.context != gold.context {
                return Err(FlattenError::ContextMismatch { line: idx + 1 });
            }
            Ok(ResponsePair {
                context: gold.context.clone(),
                predicted: pred.response.clone(),
                target: gold.response.clone(),
            })
        })
        .collect()
}
