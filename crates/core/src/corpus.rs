//! Corpus and retrieval-candidate JSON models.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::belief::BeliefFrame;
use crate::error::{FlattenError, Result};

/// Opaque dialogue identifier; corpora use either integers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DialogueId {
    Int(i64),
    Str(String),
}

impl fmt::Display for DialogueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogueId::Int(i) => write!(f, "{}", i),
            DialogueId::Str(s) => f.write_str(s),
        }
    }
}

/// A single user/assistant exchange.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DialogueTurn {
    #[serde(default)]
    pub transcript: String,
    /// Absent on the final turn of held-out splits.
    #[serde(default)]
    pub system_transcript: Option<String>,
    /// User-side belief state.
    #[serde(default)]
    pub transcript_annotated: Option<BeliefFrame>,
    /// System-side annotation; its objects feed the next turn's context.
    #[serde(default)]
    pub system_transcript_annotated: Option<BeliefFrame>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Dialogue {
    pub dialogue_idx: DialogueId,
    pub domain: String,
    pub dialogue: Vec<DialogueTurn>,
}

/// Top-level corpus file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Corpus {
    pub dialogue_data: Vec<Dialogue>,
}

impl Corpus {
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }

    pub fn num_turns(&self) -> usize {
        self.dialogue_data.iter().map(|d| d.dialogue.len()).sum()
    }
}

/// Candidate indices for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TurnCandidates {
    pub turn_id: usize,
    pub retrieval_candidates: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DialogueCandidates {
    pub dialogue_idx: DialogueId,
    pub retrieval_candidates: Vec<TurnCandidates>,
}

/// Retrieval-candidate file: per-domain response pools plus per-turn indices.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetrievalCandidates {
    pub system_transcript_pool: HashMap<String, Vec<String>>,
    pub retrieval_candidates: Vec<DialogueCandidates>,
}

impl RetrievalCandidates {
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

/// Read and deserialize a JSON file, attaching the path to any failure.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| FlattenError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| FlattenError::json(path, e))
}
