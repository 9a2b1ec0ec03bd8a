//! Core flattening logic for belief-state annotated dialogue data.
//!
//! Each dialogue turn is written as a single line: a bounded window of
//! dialogue history, optionally followed by the user belief state and the
//! system response, e.g.
//!
//! ```text
//! User : Do you have this in L? => Belief State : INFORM:GET [ size = L ] () < 86 > |  | <EOB> We do. <EOS>
//! ```
//!
//! [`pipeline::convert_json_to_flattened`] produces these lines from a corpus
//! file, and [`parser::parse_flattened_result`] recovers the belief state from
//! a (possibly model-generated) line.

mod belief;
mod context;
mod corpus;
mod encoder;
mod error;
mod helpers;
pub mod parser;
pub mod pipeline;
pub mod response;
pub mod retrieval;
mod tokens;

pub use belief::{BeliefFrame, SlotValue};
pub use context::{dialogue_contexts, represent_visual_objects, turn_fragment, ContextHistory};
pub use corpus::{
    read_json, Corpus, Dialogue, DialogueCandidates, DialogueId, DialogueTurn, RetrievalCandidates,
    TurnCandidates,
};
pub use encoder::{
    belief_state_string, belief_target_line, collect_oov, encode_turn, predict_line,
    response_target_line, FlattenMode, FlattenedRecord,
};
pub use error::{FlattenError, Result};
pub use helpers::{clean_utterance, python_list_literal, python_repr_str};
pub use parser::{
    parse_flattened_result, parse_flattened_results, parse_flattened_results_from_file,
    try_parse_flattened_result, ParseMiss, ParsedFrame,
};
pub use pipeline::{
    convert_json_to_flattened, flatten_corpus, flatten_dialogue, write_lines, ConvertConfig,
    ConvertPaths, ConvertSummary, FlattenedCorpus,
};
pub use response::{pair_responses, parse_response, parse_responses_from_file, ResponseLine, ResponsePair};
pub use retrieval::{
    expand_retrieval_targets, format_retrieval_scores, read_scores, DialogueScores, RetrievalIndex,
    TurnScores, NUM_RETRIEVAL_CANDIDATES,
};
pub use tokens::{OovSet, SpecialTokens};

/// Opens the multimodal object references in a context.
pub const START_OF_MULTIMODAL_CONTEXTS: &str = "<SOM>";
/// Closes the multimodal object references in a context.
pub const END_OF_MULTIMODAL_CONTEXTS: &str = "<EOM>";
/// Separates the context from the belief state.
pub const START_BELIEF_STATE: &str = "=> Belief State :";
/// Separates the context from the response when belief states are disabled.
pub const START_OF_RESPONSE: &str = "<SOR>";
/// Ends the belief state.
pub const END_OF_BELIEF: &str = "<EOB>";
/// Ends a target line.
pub const END_OF_SENTENCE: &str = "<EOS>";

/// Default number of turns included as dialogue context.
pub const DEFAULT_LEN_CONTEXT: usize = 2;
