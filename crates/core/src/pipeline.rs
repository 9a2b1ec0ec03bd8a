//! Pipeline for flattening a dialogue corpus into parallel text files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::context::dialogue_contexts;
use crate::corpus::{Corpus, Dialogue, RetrievalCandidates};
use crate::encoder::{collect_oov, encode_turn, FlattenMode, FlattenedRecord};
use crate::error::{FlattenError, Result};
use crate::helpers::clean_utterance;
use crate::retrieval::{RetrievalIndex, NUM_RETRIEVAL_CANDIDATES};
use crate::tokens::{OovSet, SpecialTokens};
use crate::DEFAULT_LEN_CONTEXT;

/// Configuration for a conversion pass.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Number of turn fragments in each context window.
    pub len_context: usize,
    pub use_multimodal_contexts: bool,
    pub use_belief_states: bool,
    pub output_target: bool,
    pub num_retrieval_candidates: usize,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            len_context: DEFAULT_LEN_CONTEXT,
            use_multimodal_contexts: true,
            use_belief_states: true,
            output_target: true,
            num_retrieval_candidates: NUM_RETRIEVAL_CANDIDATES,
        }
    }
}

impl ConvertConfig {
    pub fn validate(&self) -> Result<()> {
        if self.len_context == 0 {
            return Err(FlattenError::Config("len_context must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn mode(&self) -> FlattenMode {
        FlattenMode::from_use_belief_states(self.use_belief_states)
    }
}

/// Input and output locations for a conversion pass.
#[derive(Debug, Clone, Default)]
pub struct ConvertPaths {
    pub input_json: PathBuf,
    pub output_predict: PathBuf,
    /// Required when targets are produced.
    pub output_target: Option<PathBuf>,
    pub input_special_tokens: Option<PathBuf>,
    /// When set, act and slot-name tokens are collected and written here.
    pub output_special_tokens: Option<PathBuf>,
    pub input_retrieval: Option<PathBuf>,
    /// Required when `input_retrieval` is set.
    pub output_retrieval: Option<PathBuf>,
}

/// All lines produced by one pass, in corpus order.
#[derive(Debug, Clone, Default)]
pub struct FlattenedCorpus {
    pub predicts: Vec<String>,
    pub targets: Vec<String>,
    pub retrieval_targets: Vec<String>,
    /// Present when OOV tracking was requested.
    pub oov: Option<OovSet>,
    pub num_dialogues: usize,
}

impl FlattenedCorpus {
    fn new(track_oov: bool) -> Self {
        Self {
            oov: track_oov.then(OovSet::new),
            ..Default::default()
        }
    }

    fn push(&mut self, record: FlattenedRecord) {
        self.predicts.push(record.predict);
        if let Some(target) = record.target {
            self.targets.push(target);
        }
        if let Some(retrieval) = record.retrieval {
            self.retrieval_targets.extend(retrieval);
        }
    }
}

/// Counts reported at the end of a pass.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertSummary {
    pub total_dialogues: usize,
    pub total_turns: usize,
    pub predict_lines: usize,
    pub target_lines: usize,
    pub retrieval_lines: usize,
    pub oov_tokens: usize,
}

/// Flatten every turn of one dialogue.
///
/// Turns are processed in order since each context depends on the turns
/// before it.
pub fn flatten_dialogue(
    dialog: &Dialogue,
    config: &ConvertConfig,
    retrieval: Option<&RetrievalIndex<'_>>,
    mut oov: Option<&mut OovSet>,
) -> Result<Vec<FlattenedRecord>> {
    let mode = config.mode();
    let contexts = dialogue_contexts(dialog, config.len_context, config.use_multimodal_contexts)?;

    dialog
        .dialogue
        .iter()
        .zip(contexts)
        .enumerate()
        .map(|(turn_id, (turn, context))| -> Result<FlattenedRecord> {
            let response = if config.output_target {
                let raw = turn.system_transcript.as_deref().ok_or_else(|| {
                    FlattenError::MissingResponse {
                        dialogue_idx: dialog.dialogue_idx.to_string(),
                        turn_id,
                    }
                })?;
                Some(clean_utterance(raw))
            } else {
                None
            };

            let frame = turn.transcript_annotated.as_ref();
            if mode == FlattenMode::BeliefState {
                if let Some(oov) = oov.as_deref_mut() {
                    collect_oov(frame.unwrap_or(&Default::default()), oov);
                }
            }

            let mut record = encode_turn(mode, &context, frame, response.as_deref());
            if let (FlattenMode::ResponseOnly, Some(index)) = (mode, retrieval) {
                record.retrieval = Some(index.expand(dialog, turn_id, &context)?);
            }
            Ok(record)
        })
        .collect()
}

/// Flatten a whole corpus, dialogue by dialogue, in file order.
pub fn flatten_corpus(
    corpus: &Corpus,
    config: &ConvertConfig,
    retrieval: Option<&RetrievalIndex<'_>>,
    track_oov: bool,
) -> Result<FlattenedCorpus> {
    config.validate()?;

    if retrieval.is_some() && config.mode() == FlattenMode::BeliefState {
        log::warn!("Retrieval candidates are only encoded without belief states; skipping them");
    }

    corpus
        .dialogue_data
        .iter()
        .try_fold(FlattenedCorpus::new(track_oov), |mut flattened, dialog| -> Result<_> {
            let records = flatten_dialogue(dialog, config, retrieval, flattened.oov.as_mut())?;
            log::debug!(
                "Flattened dialogue {} ({} turns)",
                dialog.dialogue_idx,
                records.len()
            );
            records.into_iter().for_each(|record| flattened.push(record));
            flattened.num_dialogues += 1;
            Ok(flattened)
        })
}

/// Write lines joined by newlines, creating the parent directory if needed.
pub fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    ensure_parent_dir(path)?;
    fs::write(path, lines.join("\n")).map_err(|e| FlattenError::io(path, e))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| FlattenError::io(dir, e))
        }
        _ => Ok(()),
    }
}

/// Read a corpus, flatten it and write predict/target/retrieval files plus
/// the special-token vocabulary.
pub fn convert_json_to_flattened(paths: &ConvertPaths, config: &ConvertConfig) -> Result<ConvertSummary> {
    config.validate()?;
    if config.output_target && paths.output_target.is_none() {
        return Err(FlattenError::Config(
            "an output target path is required when targets are produced".to_string(),
        ));
    }
    if paths.input_retrieval.is_some() && paths.output_retrieval.is_none() {
        return Err(FlattenError::Config(
            "an output retrieval path is required with retrieval candidates".to_string(),
        ));
    }

    log::info!("Reading dialogues from {:?}", paths.input_json);
    let corpus = Corpus::load(&paths.input_json)?;

    let candidates = paths
        .input_retrieval
        .as_deref()
        .map(|path| {
            log::info!("Reading retrieval candidates from {:?}", path);
            RetrievalCandidates::load(path)
        })
        .transpose()?;
    let index = candidates
        .as_ref()
        .map(|c| RetrievalIndex::new(c, config.num_retrieval_candidates));

    let mut special_tokens = match &paths.input_special_tokens {
        Some(path) => SpecialTokens::load(path)?,
        None => SpecialTokens::defaults(config.use_belief_states, config.use_multimodal_contexts),
    };

    let track_oov = paths.output_special_tokens.is_some();
    let flattened = flatten_corpus(&corpus, config, index.as_ref(), track_oov)?;

    write_lines(&paths.output_predict, &flattened.predicts)?;
    if config.output_target {
        if let Some(path) = &paths.output_target {
            write_lines(path, &flattened.targets)?;
        }
    }
    if let Some(path) = &paths.output_retrieval {
        if index.is_some() {
            write_lines(path, &flattened.retrieval_targets)?;
        }
    }

    let oov_tokens = flattened.oov.as_ref().map_or(0, OovSet::len);
    if let Some(path) = &paths.output_special_tokens {
        if let Some(oov) = flattened.oov {
            special_tokens.extend_with(oov);
        }
        ensure_parent_dir(path)?;
        special_tokens.write(path)?;
        log::info!(
            "Wrote {} special tokens to {:?}",
            special_tokens.additional_special_tokens.len(),
            path
        );
    }

    let summary = ConvertSummary {
        total_dialogues: flattened.num_dialogues,
        total_turns: corpus.num_turns(),
        predict_lines: flattened.predicts.len(),
        target_lines: flattened.targets.len(),
        retrieval_lines: flattened.retrieval_targets.len(),
        oov_tokens,
    };
    log::info!(
        "Flattened {} turns from {} dialogues",
        summary.total_turns,
        summary.total_dialogues
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::DialogueId;
    use crate::parser::parse_flattened_result;
    use tempfile::TempDir;

    const CORPUS: &str = r#"{
        "dialogue_data": [
            {
                "dialogue_idx": 11,
                "domain": "fashion",
                "dialogue": [
                    {
                        "transcript": "Do you have this in\nlarge?",
                        "system_transcript": "Yes, in two colors.",
                        "transcript_annotated": {
                            "act": "REQUEST:GET",
                            "act_attributes": {
                                "slot_values": {"availableSizes": ["L"]},
                                "request_slots": ["color"],
                                "objects": [86]
                            },
                            "disambiguation_candidates": []
                        },
                        "system_transcript_annotated": {
                            "act": "INFORM:GET",
                            "act_attributes": {"objects": [86, 57]}
                        }
                    },
                    {
                        "transcript": "Add the red one.",
                        "system_transcript": "Added.",
                        "transcript_annotated": {
                            "act": "REQUEST:ADD_TO_CART",
                            "act_attributes": {"slot_values": {"color": "red"}, "objects": [57]}
                        },
                        "system_transcript_annotated": {
                            "act": "CONFIRM:ADD_TO_CART",
                            "act_attributes": {"objects": [57]}
                        }
                    }
                ]
            },
            {
                "dialogue_idx": 12,
                "domain": "fashion",
                "dialogue": [
                    {
                        "transcript": "Any jackets?",
                        "system_transcript": "Here is one.",
                        "transcript_annotated": {"act": "REQUEST:GET", "act_attributes": {"slot_values": {"type": "jacket"}}},
                        "system_transcript_annotated": {"act": "INFORM:GET", "act_attributes": {"objects": [3]}}
                    }
                ]
            }
        ]
    }"#;

    fn corpus() -> Corpus {
        serde_json::from_str(CORPUS).unwrap()
    }

    fn retrieval_candidates() -> RetrievalCandidates {
        serde_json::from_value(serde_json::json!({
            "system_transcript_pool": {"fashion": ["Sure.", "No.", "Maybe."]},
            "retrieval_candidates": [
                {"dialogue_idx": 11, "retrieval_candidates": [
                    {"turn_id": 0, "retrieval_candidates": [2, 0]},
                    {"turn_id": 1, "retrieval_candidates": [1, 2]}
                ]},
                {"dialogue_idx": 12, "retrieval_candidates": [
                    {"turn_id": 0, "retrieval_candidates": [0, 1]}
                ]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_flatten_corpus_belief_mode() {
        let flattened = flatten_corpus(&corpus(), &ConvertConfig::default(), None, true).unwrap();

        assert_eq!(flattened.num_dialogues, 2);
        assert_eq!(flattened.predicts.len(), 3);
        assert_eq!(flattened.targets.len(), 3);
        assert!(flattened.retrieval_targets.is_empty());

        assert_eq!(
            flattened.predicts[1],
            "User : Do you have this in large? System : Yes, in two colors. <SOM> 86, 57 <EOM> \
             User : Add the red one. => Belief State : "
        );
        assert_eq!(
            flattened.targets[0],
            "User : Do you have this in large? => Belief State : REQUEST:GET [ availableSizes = ['L'] ] \
             (color) < 86 > |  | <EOB> Yes, in two colors. <EOS>"
        );
        assert_eq!(
            flattened.oov.unwrap().tokens(),
            &["REQUEST:GET", "availableSizes", "REQUEST:ADD_TO_CART", "color", "type"]
        );
    }

    #[test]
    fn test_predict_and_target_lines_correspond() {
        let flattened = flatten_corpus(&corpus(), &ConvertConfig::default(), None, false).unwrap();
        assert!(flattened.oov.is_none());
        for (predict, target) in flattened.predicts.iter().zip(&flattened.targets) {
            assert!(target.starts_with(predict.as_str()));
            assert_eq!(parse_flattened_result(target).len(), 1);
        }
    }

    #[test]
    fn test_flatten_corpus_with_retrieval() {
        let candidates = retrieval_candidates();
        let index = RetrievalIndex::new(&candidates, 2);
        let config = ConvertConfig {
            use_belief_states: false,
            use_multimodal_contexts: false,
            ..Default::default()
        };

        let flattened = flatten_corpus(&corpus(), &config, Some(&index), true).unwrap();
        assert_eq!(flattened.predicts[0], "User : Do you have this in large? <SOR> ");
        assert_eq!(flattened.retrieval_targets.len(), 6);
        assert_eq!(
            flattened.retrieval_targets[0],
            "User : Do you have this in large? <SOR> Maybe. <EOS>"
        );
        assert_eq!(
            flattened.retrieval_targets[1],
            "User : Do you have this in large? <SOR> Sure. <EOS>"
        );
        assert_eq!(flattened.oov.unwrap().len(), 0);
    }

    #[test]
    fn test_missing_response_with_targets() {
        let mut corpus = corpus();
        corpus.dialogue_data[1].dialogue[0].system_transcript = None;

        let err = flatten_corpus(&corpus, &ConvertConfig::default(), None, false).unwrap_err();
        assert!(matches!(err, FlattenError::MissingResponse { turn_id: 0, .. }));

        let config = ConvertConfig {
            output_target: false,
            ..Default::default()
        };
        let flattened = flatten_corpus(&corpus, &config, None, false).unwrap();
        assert_eq!(flattened.predicts.len(), 3);
        assert!(flattened.targets.is_empty());
    }

    #[test]
    fn test_zero_len_context_is_rejected() {
        let config = ConvertConfig {
            len_context: 0,
            ..Default::default()
        };
        assert!(matches!(
            flatten_corpus(&corpus(), &config, None, false),
            Err(FlattenError::Config(_))
        ));
    }

    #[test]
    fn test_flatten_dialogue_without_annotation() {
        let dialog = Dialogue {
            dialogue_idx: DialogueId::Str("d".to_string()),
            domain: "furniture".to_string(),
            dialogue: vec![crate::corpus::DialogueTurn {
                transcript: "hello".to_string(),
                system_transcript: Some("hi".to_string()),
                ..Default::default()
            }],
        };
        let mut oov = OovSet::new();
        let records = flatten_dialogue(&dialog, &ConvertConfig::default(), None, Some(&mut oov)).unwrap();
        assert_eq!(
            records[0].target.as_deref(),
            Some("User : hello => Belief State :  [  ] () <  > |  | <EOB> hi <EOS>")
        );
        assert_eq!(oov.tokens(), &[""]);
    }

    #[test]
    fn test_convert_json_to_flattened_writes_files() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("dials.json");
        let retrieval = temp.path().join("retrieval.json");
        fs::write(&input, CORPUS).unwrap();
        fs::write(&retrieval, serde_json::to_string(&serde_json::json!({
            "system_transcript_pool": {"fashion": ["Sure.", "No.", "Maybe."]},
            "retrieval_candidates": [
                {"dialogue_idx": 11, "retrieval_candidates": [
                    {"turn_id": 0, "retrieval_candidates": [2, 0]},
                    {"turn_id": 1, "retrieval_candidates": [1, 2]}
                ]},
                {"dialogue_idx": 12, "retrieval_candidates": [
                    {"turn_id": 0, "retrieval_candidates": [0, 1]}
                ]}
            ]
        })).unwrap())
        .unwrap();

        let out = temp.path().join("out/nested");
        let paths = ConvertPaths {
            input_json: input,
            output_predict: out.join("predict.txt"),
            output_target: Some(out.join("target.txt")),
            input_special_tokens: None,
            output_special_tokens: Some(out.join("special_tokens.json")),
            input_retrieval: Some(retrieval),
            output_retrieval: Some(out.join("retrieval.txt")),
        };
        let config = ConvertConfig {
            use_belief_states: false,
            num_retrieval_candidates: 2,
            ..Default::default()
        };

        let summary = convert_json_to_flattened(&paths, &config).unwrap();
        assert_eq!(summary.total_dialogues, 2);
        assert_eq!(summary.total_turns, 3);
        assert_eq!(summary.retrieval_lines, 6);

        let predict = fs::read_to_string(out.join("predict.txt")).unwrap();
        let target = fs::read_to_string(out.join("target.txt")).unwrap();
        assert_eq!(predict.lines().count(), 3);
        assert_eq!(target.lines().count(), 3);
        assert!(!predict.ends_with('\n'));

        let retrieval_out = fs::read_to_string(out.join("retrieval.txt")).unwrap();
        assert_eq!(retrieval_out.lines().count(), 6);

        let tokens: SpecialTokens =
            serde_json::from_str(&fs::read_to_string(out.join("special_tokens.json")).unwrap()).unwrap();
        assert_eq!(tokens.eos_token, "<EOS>");
        assert_eq!(tokens.additional_special_tokens, vec!["<SOR>", "<SOM>", "<EOM>"]);
    }

    #[test]
    fn test_convert_requires_output_paths() {
        let paths = ConvertPaths {
            input_json: PathBuf::from("unused.json"),
            output_predict: PathBuf::from("predict.txt"),
            ..Default::default()
        };
        assert!(matches!(
            convert_json_to_flattened(&paths, &ConvertConfig::default()),
            Err(FlattenError::Config(_))
        ));
    }

    #[test]
    fn test_convert_missing_input_file() {
        let temp = TempDir::new().unwrap();
        let paths = ConvertPaths {
            input_json: temp.path().join("missing.json"),
            output_predict: temp.path().join("predict.txt"),
            output_target: Some(temp.path().join("target.txt")),
            ..Default::default()
        };
        assert!(matches!(
            convert_json_to_flattened(&paths, &ConvertConfig::default()),
            Err(FlattenError::Io { .. })
        ));
    }
}
