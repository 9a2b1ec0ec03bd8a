//! Recovery of belief states from flattened lines.
//!
//! Lines may come from a model and be arbitrarily malformed, so nothing here
//! fails loudly: a line whose belief section cannot be located decodes to no
//! frames, and ids that are not integers are dropped.
//!
//! A belief section is a sequence of frames of the form
//!
//! ```text
//! ACT [ name = value, name = ['a', 'b'] ] (req, req) < 1, 2 > | 3, 4 |
//! ```
//!
//! Section boundaries are found by a hand-written scanner; the contents of
//! each section are tokenized with small regexes.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{FlattenError, Result};
use crate::{END_OF_BELIEF, START_BELIEF_STATE};

static REQUEST_SLOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_.:/\-]+").unwrap());
static OBJECT_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+").unwrap());

/// One decoded frame; the record handed to downstream scorers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFrame {
    pub act: String,
    /// `[name, value]` pairs; list values are kept as their raw text.
    pub slots: Vec<(String, String)>,
    pub request_slots: Vec<String>,
    pub objects: Vec<i64>,
    pub disambiguation_candidates: Vec<i64>,
}

/// Why a line yielded no frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseMiss {
    #[error("line has no single '{}' marker", START_BELIEF_STATE)]
    MissingBeliefMarker,
    #[error("belief section has no single '{}' marker", END_OF_BELIEF)]
    MissingEndOfBelief,
    #[error("belief section contains no dialog act frame")]
    NoFrames,
}

/// Raw section spans of one frame, borrowed from the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawFrame<'a> {
    act: &'a str,
    slots: &'a str,
    request_slots: &'a str,
    objects: &'a str,
    disambiguation_candidates: &'a str,
}

fn is_act_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '?' | '.')
}

/// Split a slot section on commas outside bracketed values.
///
/// With `honour_quotes`, quotes inside brackets shield commas and brackets;
/// a quote still open at the end of the section makes the split fail.
fn split_outside_brackets(text: &str, honour_quotes: bool) -> Option<Vec<&str>> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut piece_start = 0;

    for (idx, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' if honour_quotes && depth > 0 => quote = Some(c),
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                pieces.push(&text[piece_start..idx]);
                piece_start = idx + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return None;
    }
    pieces.push(&text[piece_start..]);
    Some(pieces)
}

/// Split a slot section into `name = value` pieces.
///
/// Generated values may carry stray apostrophes (`['men's shirt']`) or be cut
/// off mid-item; those fall back to bracket depth alone.
fn split_top_level_commas(text: &str) -> Vec<&str> {
    split_outside_brackets(text, true)
        .or_else(|| split_outside_brackets(text, false))
        .unwrap_or_default()
}

/// Left-to-right scanner yielding non-overlapping frames.
struct FrameScanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> FrameScanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// Skip spaces from `pos`, then expect `open` and return the span up to
    /// the next `close` together with the offset just past it.
    fn delimited(&self, pos: usize, open: char, close: char) -> Option<(&'a str, usize)> {
        let rest = &self.text[pos..];
        let skipped = rest.len() - rest.trim_start_matches(' ').len();
        let open_at = pos + skipped;
        if !self.text[open_at..].starts_with(open) {
            return None;
        }
        let body_start = open_at + open.len_utf8();
        let close_at = body_start + self.text[body_start..].find(close)?;
        Some((&self.text[body_start..close_at], close_at + close.len_utf8()))
    }

    /// Try to read a whole frame whose slot section opens at `open`.
    fn frame_at(&self, open: usize) -> Option<(RawFrame<'a>, usize)> {
        let before = &self.text[self.pos..open];
        let act_end = before.trim_end_matches(' ').len();
        let act_start = before[..act_end]
            .char_indices()
            .rev()
            .take_while(|&(_, c)| is_act_char(c))
            .last()
            .map_or(act_end, |(idx, _)| idx);

        let act = &before[act_start..act_end];

        // The slot section closes at the first `]` after which the request,
        // object and candidate sections all complete.
        let body_start = open + 1;
        self.text[body_start..]
            .match_indices(']')
            .find_map(|(idx, _)| {
                let slots_close = body_start + idx;
                let (request_slots, next) = self.delimited(slots_close + 1, '(', ')')?;
                let (objects, next) = self.delimited(next, '<', '>')?;
                let (disambiguation_candidates, end) = self.delimited(next, '|', '|')?;
                Some((
                    RawFrame {
                        act,
                        slots: &self.text[body_start..slots_close],
                        request_slots,
                        objects,
                        disambiguation_candidates,
                    },
                    end,
                ))
            })
    }
}

impl<'a> Iterator for FrameScanner<'a> {
    type Item = RawFrame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.text.len() {
            let open = self.pos + self.text[self.pos..].find('[')?;
            match self.frame_at(open) {
                Some((frame, end)) => {
                    self.pos = end;
                    return Some(frame);
                }
                None => self.pos = open + 1,
            }
        }
        None
    }
}

fn parse_slots(section: &str) -> Vec<(String, String)> {
    split_top_level_commas(section)
        .into_iter()
        .filter_map(|piece| {
            let (name, value) = piece.split_once('=')?;
            let name = name.split_whitespace().last().unwrap_or("");
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn parse_ids(section: &str) -> Vec<i64> {
    OBJECT_ID_RE
        .find_iter(section)
        .filter_map(|m| m.as_str().parse::<i64>().ok())
        .collect()
}

impl From<RawFrame<'_>> for ParsedFrame {
    fn from(raw: RawFrame<'_>) -> Self {
        Self {
            act: raw.act.to_string(),
            slots: parse_slots(raw.slots),
            request_slots: REQUEST_SLOT_RE
                .find_iter(raw.request_slots)
                .map(|m| m.as_str().to_string())
                .collect(),
            objects: parse_ids(raw.objects),
            disambiguation_candidates: parse_ids(raw.disambiguation_candidates),
        }
    }
}

/// Locate the text between the belief-state marker and `<EOB>`.
fn belief_section(line: &str) -> std::result::Result<&str, ParseMiss> {
    let parts: Vec<&str> = line.trim().split(START_BELIEF_STATE).collect();
    let [_, rest] = parts.as_slice() else {
        return Err(ParseMiss::MissingBeliefMarker);
    };
    let parts: Vec<&str> = rest.trim().split(END_OF_BELIEF).collect();
    let [section, _] = parts.as_slice() else {
        return Err(ParseMiss::MissingEndOfBelief);
    };
    Ok(section.trim())
}

/// Decode a line, reporting why nothing was recovered.
///
/// Every matched frame is returned, including ones with all sections empty.
pub fn try_parse_flattened_result(line: &str) -> std::result::Result<Vec<ParsedFrame>, ParseMiss> {
    let section = belief_section(line)?;
    let frames: Vec<ParsedFrame> = FrameScanner::new(section).map(ParsedFrame::from).collect();
    if frames.is_empty() {
        return Err(ParseMiss::NoFrames);
    }
    Ok(frames)
}

/// Decode the belief state of a flattened line.
///
/// Returns an empty list when the line has no well-formed belief section.
pub fn parse_flattened_result(line: &str) -> Vec<ParsedFrame> {
    match try_parse_flattened_result(line) {
        Ok(frames) => frames,
        Err(miss) => {
            log::trace!("no belief state recovered: {}", miss);
            Vec::new()
        }
    }
}

/// Decode many lines in parallel, keeping line order.
pub fn parse_flattened_results<S>(lines: &[S]) -> Vec<Vec<ParsedFrame>>
where
    S: AsRef<str> + Sync,
{
    lines
        .par_iter()
        .map(|line| parse_flattened_result(line.as_ref()))
        .collect()
}

/// Decode every line of a flattened file.
pub fn parse_flattened_results_from_file(path: &Path) -> Result<Vec<Vec<ParsedFrame>>> {
    let text = fs::read_to_string(path).map_err(|e| FlattenError::io(path, e))?;
    let lines: Vec<&str> = text.lines().collect();
    let results = parse_flattened_results(&lines);

    let recovered = results.iter().filter(|frames| !frames.is_empty()).count();
    log::info!(
        "Parsed {} lines from {:?}, {} with a belief state",
        results.len(),
        path,
        recovered
    );
    Ok(results)
}
