//! Dialogue-history windowing.
//!
//! Each turn contributes one fragment, `System : ... User : ...`, and the
//! context for a turn is the space-joined tail of the fragment history. The
//! history is threaded through a dialogue as a plain value so no turn can see
//! state it was not handed.

use crate::corpus::Dialogue;
use crate::error::{FlattenError, Result};
use crate::helpers::{clean_utterance, comma_join};
use crate::{END_OF_MULTIMODAL_CONTEXTS, START_OF_MULTIMODAL_CONTEXTS};

/// Format object ids as a multimodal reference: `<SOM> 1, 2 <EOM>`.
pub fn represent_visual_objects(object_ids: &[i64]) -> String {
    format!(
        "{} {} {}",
        START_OF_MULTIMODAL_CONTEXTS,
        comma_join(object_ids),
        END_OF_MULTIMODAL_CONTEXTS
    )
}

/// Build the fragment a single turn adds to the history.
///
/// The system half is dropped when there is no (or an empty) previous
/// assistant utterance; `prev_objects` is only rendered alongside it.
pub fn turn_fragment(
    prev_assistant: Option<&str>,
    prev_objects: Option<&[i64]>,
    user_utterance: &str,
) -> String {
    let mut fragment = String::new();
    if let Some(prev) = prev_assistant.filter(|p| !p.is_empty()) {
        fragment.push_str(&format!("System : {} ", prev));
        if let Some(objects) = prev_objects {
            fragment.push_str(&represent_visual_objects(objects));
            fragment.push(' ');
        }
    }
    fragment.push_str(&format!("User : {}", user_utterance));
    fragment
}

/// Ordered fragments seen so far in one dialogue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextHistory {
    fragments: Vec<String>,
}

impl ContextHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the history extended by `fragment`.
    pub fn advance(mut self, fragment: String) -> Self {
        self.fragments.push(fragment);
        self
    }

    /// Space-join the last `len_context` fragments, oldest first.
    pub fn window(&self, len_context: usize) -> String {
        let start = self.fragments.len().saturating_sub(len_context);
        self.fragments[start..].join(" ")
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Compute the context string of every turn in a dialogue, in turn order.
///
/// With `use_multimodal_contexts` the objects of the previous turn's
/// system-side annotation are inserted after its assistant utterance; a
/// previous turn without that annotation is a corpus error.
pub fn dialogue_contexts(
    dialog: &Dialogue,
    len_context: usize,
    use_multimodal_contexts: bool,
) -> Result<Vec<String>> {
    let mut contexts = Vec::with_capacity(dialog.dialogue.len());
    let mut history = ContextHistory::new();

    for (turn_id, turn) in dialog.dialogue.iter().enumerate() {
        let user = clean_utterance(&turn.transcript);
        let prev = turn_id.checked_sub(1).map(|i| &dialog.dialogue[i]);
        let prev_assistant = prev.map(|p| clean_utterance(p.system_transcript.as_deref().unwrap_or("")));

        let prev_objects = match prev {
            Some(p) if use_multimodal_contexts && prev_assistant.as_deref().is_some_and(|a| !a.is_empty()) => {
                let annotation = p.system_transcript_annotated.as_ref().ok_or_else(|| {
                    FlattenError::MissingSystemAnnotation {
                        dialogue_idx: dialog.dialogue_idx.to_string(),
                        turn_id: turn_id - 1,
                    }
                })?;
                Some(annotation.objects.as_slice())
            }
            _ => None,
        };

        history = history.advance(turn_fragment(prev_assistant.as_deref(), prev_objects, &user));
        contexts.push(history.window(len_context));
    }

    Ok(contexts)
}
