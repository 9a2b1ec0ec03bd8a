//! Flattening of a turn into predict/target lines.

use crate::belief::BeliefFrame;
use crate::helpers::comma_join;
use crate::tokens::OovSet;
use crate::{END_OF_BELIEF, END_OF_SENTENCE, START_BELIEF_STATE, START_OF_RESPONSE};

/// Which line grammar a pass emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlattenMode {
    /// `... => Belief State : <frame> <EOB> <response> <EOS>`
    BeliefState,
    /// `... <SOR> <response> <EOS>`
    ResponseOnly,
}

impl FlattenMode {
    pub fn from_use_belief_states(use_belief_states: bool) -> Self {
        if use_belief_states {
            FlattenMode::BeliefState
        } else {
            FlattenMode::ResponseOnly
        }
    }
}

/// The lines produced for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedRecord {
    pub predict: String,
    pub target: Option<String>,
    /// One target per retrieval candidate, when retrieval is being encoded.
    pub retrieval: Option<Vec<String>>,
}

/// Serialize one frame:
/// `act [ k = v, ... ] (req, ...) < obj, ... > | cand, ... |`.
///
/// Empty sections keep their delimiters.
pub fn belief_state_string(frame: &BeliefFrame) -> String {
    let slot_values: Vec<String> = frame
        .slot_values
        .iter()
        .map(|(name, value)| format!("{} = {}", name.trim(), value.literal().trim()))
        .collect();

    format!(
        "{} [ {} ] ({}) < {} > | {} |",
        frame.act.trim(),
        slot_values.join(", "),
        frame.request_slots.join(", "),
        comma_join(&frame.objects),
        comma_join(&frame.disambiguation_candidates),
    )
}

/// Input line for the model.
pub fn predict_line(mode: FlattenMode, context: &str) -> String {
    match mode {
        FlattenMode::BeliefState => format!("{} {} ", context, START_BELIEF_STATE),
        FlattenMode::ResponseOnly => format!("{} {} ", context, START_OF_RESPONSE),
    }
}

/// Target line with a belief state followed by the response.
pub fn belief_target_line(context: &str, frame: &BeliefFrame, response: &str) -> String {
    format!(
        "{} {} {} {} {} {}",
        context,
        START_BELIEF_STATE,
        belief_state_string(frame),
        END_OF_BELIEF,
        response,
        END_OF_SENTENCE
    )
}

/// Target line carrying only the response.
pub fn response_target_line(context: &str, response: &str) -> String {
    format!("{} {} {} {}", context, START_OF_RESPONSE, response, END_OF_SENTENCE)
}

/// Record the act and every slot name of `frame`.
///
/// Strings are recorded as annotated, before any trimming.
pub fn collect_oov(frame: &BeliefFrame, oov: &mut OovSet) {
    oov.insert(&frame.act);
    for name in frame.slot_names() {
        oov.insert(name);
    }
}

/// Flatten one turn.
///
/// `frame` is ignored in [`FlattenMode::ResponseOnly`]; a missing frame in
/// belief mode flattens as an empty one. No target is produced when
/// `response` is `None`.
pub fn encode_turn(
    mode: FlattenMode,
    context: &str,
    frame: Option<&BeliefFrame>,
    response: Option<&str>,
) -> FlattenedRecord {
    let target = response.map(|response| match mode {
        FlattenMode::BeliefState => {
            let empty = BeliefFrame::default();
            belief_target_line(context, frame.unwrap_or(&empty), response)
        }
        FlattenMode::ResponseOnly => response_target_line(context, response),
    });

    FlattenedRecord {
        predict: predict_line(mode, context),
        target,
        retrieval: None,
    }
}
