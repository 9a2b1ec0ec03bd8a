//! Retrieval evaluation: candidate target expansion and score formatting.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::corpus::{Corpus, Dialogue, DialogueCandidates, DialogueId, RetrievalCandidates};
use crate::encoder::response_target_line;
use crate::error::{FlattenError, Result};

/// Number of candidate responses scored per turn.
pub const NUM_RETRIEVAL_CANDIDATES: usize = 100;

/// Expand one turn into a response-only target per candidate index.
///
/// Lines follow the order of `candidate_indices`.
pub fn expand_retrieval_targets(
    context: &str,
    domain: &str,
    pool: &[String],
    candidate_indices: &[usize],
) -> Result<Vec<String>> {
    candidate_indices
        .iter()
        .map(|&index| {
            let response = pool.get(index).ok_or_else(|| FlattenError::CandidateOutOfRange {
                domain: domain.to_string(),
                index,
                pool_size: pool.len(),
            })?;
            Ok(response_target_line(context, response))
        })
        .collect()
}

/// Lookup over a loaded retrieval-candidate file.
#[derive(Debug)]
pub struct RetrievalIndex<'a> {
    pools: &'a HashMap<String, Vec<String>>,
    dialogues: HashMap<&'a DialogueId, &'a DialogueCandidates>,
    num_candidates: usize,
}

impl<'a> RetrievalIndex<'a> {
    pub fn new(candidates: &'a RetrievalCandidates, num_candidates: usize) -> Self {
        let dialogues = candidates
            .retrieval_candidates
            .iter()
            .map(|d| (&d.dialogue_idx, d))
            .collect();
        Self {
            pools: &candidates.system_transcript_pool,
            dialogues,
            num_candidates,
        }
    }

    /// Candidate indices for a turn, checked against the expected count.
    pub fn turn_candidates(&self, dialogue_idx: &DialogueId, turn_id: usize) -> Result<&'a [usize]> {
        let missing = || FlattenError::MissingRetrievalCandidates {
            dialogue_idx: dialogue_idx.to_string(),
            turn_id,
        };
        let turn = self
            .dialogues
            .get(dialogue_idx)
            .copied()
            .ok_or_else(missing)?
            .retrieval_candidates
            .iter()
            .find(|t| t.turn_id == turn_id)
            .ok_or_else(missing)?;

        if turn.retrieval_candidates.len() != self.num_candidates {
            return Err(FlattenError::CandidateCountMismatch {
                dialogue_idx: dialogue_idx.to_string(),
                turn_id,
                expected: self.num_candidates,
                actual: turn.retrieval_candidates.len(),
            });
        }
        Ok(&turn.retrieval_candidates)
    }

    /// Retrieval targets for `turn_id` of `dialog` given its context.
    pub fn expand(&self, dialog: &Dialogue, turn_id: usize, context: &str) -> Result<Vec<String>> {
        let pool = self
            .pools
            .get(&dialog.domain)
            .ok_or_else(|| FlattenError::MissingRetrievalPool(dialog.domain.clone()))?;
        let indices = self.turn_candidates(&dialog.dialogue_idx, turn_id)?;
        expand_retrieval_targets(context, &dialog.domain, pool, indices)
    }
}

/// Scores for the candidates of one turn, higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnScores {
    pub turn_id: usize,
    pub scores: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueScores {
    pub dialog_id: DialogueId,
    pub candidate_scores: Vec<TurnScores>,
}

/// Read one negative log-likelihood per line. Blank lines are skipped.
pub fn read_scores(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).map_err(|e| FlattenError::io(path, e))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            line.trim().parse::<f64>().map_err(|_| FlattenError::InvalidScore {
                line: idx + 1,
                value: line.to_string(),
            })
        })
        .collect()
}

/// Group flat per-candidate NLL scores by dialogue and turn.
///
/// Scores are negated so that higher means better. The number of scores must
/// be exactly `num_candidates` per turn of the corpus.
pub fn format_retrieval_scores(
    corpus: &Corpus,
    nll_scores: &[f64],
    num_candidates: usize,
) -> Result<Vec<DialogueScores>> {
    let expected = num_candidates * corpus.num_turns();
    if nll_scores.len() != expected {
        return Err(FlattenError::ScoreCountMismatch {
            expected,
            actual: nll_scores.len(),
        });
    }

    let mut chunks = nll_scores.chunks(num_candidates.max(1));
    let formatted = corpus
        .dialogue_data
        .iter()
        .map(|dialog| DialogueScores {
            dialog_id: dialog.dialogue_idx.clone(),
            candidate_scores: (0..dialog.dialogue.len())
                .map(|turn_id| TurnScores {
                    turn_id,
                    scores: chunks
                        .next()
                        .map(|chunk| chunk.iter().map(|s| -s).collect())
                        .unwrap_or_default(),
                })
                .collect(),
        })
        .collect();

    Ok(formatted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{DialogueTurn, TurnCandidates};

    fn pool(size: usize) -> Vec<String> {
        (0..size).map(|i| format!("response {}", i)).collect()
    }

    fn candidates(num: usize) -> RetrievalCandidates {
        RetrievalCandidates {
            system_transcript_pool: HashMap::from([("fashion".to_string(), pool(150))]),
            retrieval_candidates: vec![DialogueCandidates {
                dialogue_idx: DialogueId::Int(4),
                retrieval_candidates: vec![TurnCandidates {
                    turn_id: 0,
                    retrieval_candidates: (0..num).rev().collect(),
                }],
            }],
        }
    }

    fn dialog() -> Dialogue {
        Dialogue {
            dialogue_idx: DialogueId::Int(4),
            domain: "fashion".to_string(),
            dialogue: vec![DialogueTurn::default()],
        }
    }

    #[test]
    fn test_expand_follows_candidate_order() {
        let lines = expand_retrieval_targets("User : hi", "fashion", &pool(5), &[3, 0]).unwrap();
        assert_eq!(
            lines,
            vec!["User : hi <SOR> response 3 <EOS>", "User : hi <SOR> response 0 <EOS>"]
        );
    }

    #[test]
    fn test_expand_rejects_out_of_range_index() {
        let err = expand_retrieval_targets("c", "fashion", &pool(2), &[2]).unwrap_err();
        assert!(matches!(err, FlattenError::CandidateOutOfRange { index: 2, pool_size: 2, .. }));
    }

    #[test]
    fn test_index_expands_full_candidate_list() {
        let candidates = candidates(NUM_RETRIEVAL_CANDIDATES);
        let index = RetrievalIndex::new(&candidates, NUM_RETRIEVAL_CANDIDATES);

        let lines = index.expand(&dialog(), 0, "User : hi").unwrap();
        assert_eq!(lines.len(), 100);
        assert_eq!(lines[0], "User : hi <SOR> response 99 <EOS>");
        assert_eq!(lines[99], "User : hi <SOR> response 0 <EOS>");
    }

    #[test]
    fn test_index_rejects_wrong_candidate_count() {
        let candidates = candidates(99);
        let index = RetrievalIndex::new(&candidates, NUM_RETRIEVAL_CANDIDATES);
        assert!(matches!(
            index.expand(&dialog(), 0, "c"),
            Err(FlattenError::CandidateCountMismatch { expected: 100, actual: 99, .. })
        ));
    }

    #[test]
    fn test_index_missing_turn_and_domain() {
        let candidates = candidates(3);
        let index = RetrievalIndex::new(&candidates, 3);
        assert!(matches!(
            index.expand(&dialog(), 1, "c"),
            Err(FlattenError::MissingRetrievalCandidates { turn_id: 1, .. })
        ));

        let mut other = dialog();
        other.domain = "furniture".to_string();
        assert!(matches!(
            index.expand(&other, 0, "c"),
            Err(FlattenError::MissingRetrievalPool(_))
        ));
    }

    #[test]
    fn test_format_retrieval_scores() {
        let corpus = Corpus {
            dialogue_data: vec![
                Dialogue {
                    dialogue_idx: DialogueId::Int(1),
                    domain: "fashion".to_string(),
                    dialogue: vec![DialogueTurn::default(), DialogueTurn::default()],
                },
                Dialogue {
                    dialogue_idx: DialogueId::Int(2),
                    domain: "fashion".to_string(),
                    dialogue: vec![DialogueTurn::default()],
                },
            ],
        };
        let scores = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        let formatted = format_retrieval_scores(&corpus, &scores, 2).unwrap();
        assert_eq!(formatted.len(), 2);
        assert_eq!(formatted[0].candidate_scores[1].turn_id, 1);
        assert_eq!(formatted[0].candidate_scores[1].scores, vec![-3.0, -4.0]);
        assert_eq!(formatted[1].dialog_id, DialogueId::Int(2));
        assert_eq!(formatted[1].candidate_scores[0].scores, vec![-5.0, -6.0]);

        assert!(matches!(
            format_retrieval_scores(&corpus, &scores[..5], 2),
            Err(FlattenError::ScoreCountMismatch { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_read_scores() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scores.txt");
        std::fs::write(&path, "1.5\n-2\n\n").unwrap();
        assert_eq!(read_scores(&path).unwrap(), vec![1.5, -2.0]);

        std::fs::write(&path, "1.5\nabc\n").unwrap();
        assert!(matches!(
            read_scores(&path),
            Err(FlattenError::InvalidScore { line: 2, .. })
        ));
    }
}
