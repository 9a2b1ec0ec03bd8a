//! Special-token vocabulary and out-of-vocabulary collection.

use std::fs;
use std::path::Path;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::corpus::read_json;
use crate::error::{FlattenError, Result};
use crate::{
    END_OF_BELIEF, END_OF_MULTIMODAL_CONTEXTS, END_OF_SENTENCE, START_OF_MULTIMODAL_CONTEXTS,
    START_OF_RESPONSE,
};

/// Tokenizer special-token file: `{eos_token, additional_special_tokens}`.
///
/// Any other keys in a loaded file are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialTokens {
    pub eos_token: String,
    #[serde(default)]
    pub additional_special_tokens: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SpecialTokens {
    /// Base tokens for a pass that did not load a special-token file.
    pub fn defaults(use_belief_states: bool, use_multimodal_contexts: bool) -> Self {
        let mut additional = Vec::new();
        if use_belief_states {
            additional.push(END_OF_BELIEF.to_string());
        } else {
            additional.push(START_OF_RESPONSE.to_string());
        }
        if use_multimodal_contexts {
            additional.push(START_OF_MULTIMODAL_CONTEXTS.to_string());
            additional.push(END_OF_MULTIMODAL_CONTEXTS.to_string());
        }
        Self {
            eos_token: END_OF_SENTENCE.to_string(),
            additional_special_tokens: additional,
            extra: Map::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }

    /// Append collected OOV tokens after the base tokens.
    pub fn extend_with(&mut self, oov: OovSet) {
        self.additional_special_tokens.extend(oov.into_tokens());
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self).map_err(|e| FlattenError::json(path, e))?;
        fs::write(path, json).map_err(|e| FlattenError::io(path, e))
    }
}

/// Insertion-ordered, deduplicated set of act and slot-name tokens.
///
/// Every token seen is recorded whether or not a base vocabulary already has
/// it; filtering is left to whoever extends the tokenizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OovSet(IndexSet<String>);

impl OovSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token. Returns `true` if it was not seen before.
    pub fn insert(&mut self, token: &str) -> bool {
        if self.0.contains(token) {
            return false;
        }
        self.0.insert(token.to_string())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tokens in first-seen order.
    pub fn tokens(&self) -> Vec<&str> {
        self.0.iter().map(String::as_str).collect()
    }

    pub fn into_tokens(self) -> Vec<String> {
        self.0.into_iter().collect()
    }
}
