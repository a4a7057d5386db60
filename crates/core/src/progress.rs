//! Study-progress state machine.
//!
//! `StudyProgress` holds one user's learning list, finished list and best
//! scores. All changes go through [`StudyProgress::apply`], which keeps the two
//! lists disjoint and scores monotone.

use serde::{Deserialize, Serialize};

use crate::model::{
    DrugId, Score, ScoreMap, ScoreSource, StudyData, calculate_study_data,
};

//
// ─── ACTIONS ───────────────────────────────────────────────────────────────────
//

/// Which of the two study lists an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyList {
    Learning,
    Finished,
}

impl StudyList {
    #[must_use]
    pub fn from_finished_flag(from_finished: bool) -> Self {
        if from_finished {
            Self::Finished
        } else {
            Self::Learning
        }
    }
}

/// Every way study progress can change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressAction {
    AddToLearning(DrugId),
    MarkFinished(DrugId),
    MoveToLearning(DrugId),
    Remove { drug_id: DrugId, list: StudyList },
    RecordScore { drug_id: DrugId, score: Score },
    Reset,
}

/// What an applied action actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressChange {
    /// Idempotent no-op: the state already satisfied the action.
    Unchanged,
    /// One or both lists changed; scores untouched.
    ListsChanged,
    /// A new best score replaced the previous one (or filled an empty slot).
    ScoreRaised {
        drug_id: DrugId,
        previous: Option<Score>,
        current: Score,
    },
    /// A drug left a list together with its score.
    Removed {
        drug_id: DrugId,
        list: StudyList,
        was_listed: bool,
        cleared_score: Option<Score>,
    },
    Reset,
}

impl ProgressChange {
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    /// Whether the learning/finished lists need to be persisted.
    #[must_use]
    pub fn touches_lists(&self) -> bool {
        matches!(
            self,
            Self::ListsChanged | Self::Removed { .. } | Self::Reset
        )
    }

    /// Whether the score map needs to be persisted.
    #[must_use]
    pub fn touches_scores(&self) -> bool {
        match self {
            Self::ScoreRaised { .. } | Self::Reset => true,
            Self::Removed { cleared_score, .. } => cleared_score.is_some(),
            Self::Unchanged | Self::ListsChanged => false,
        }
    }
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// One user's study progress.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StudyProgress {
    learning: Vec<DrugId>,
    finished: Vec<DrugId>,
    scores: ScoreMap,
}

impl StudyProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild progress from persisted collections.
    ///
    /// Duplicates are dropped and a drug present in both lists is kept in the
    /// finished list only, so the disjointness invariant holds whatever was on
    /// disk.
    #[must_use]
    pub fn from_persisted(learning: Vec<DrugId>, finished: Vec<DrugId>, scores: ScoreMap) -> Self {
        let mut progress = Self {
            scores,
            ..Self::default()
        };
        for id in finished {
            if !progress.finished.contains(&id) {
                progress.finished.push(id);
            }
        }
        for id in learning {
            if !progress.finished.contains(&id) && !progress.learning.contains(&id) {
                progress.learning.push(id);
            }
        }
        progress
    }

    #[must_use]
    pub fn learning(&self) -> &[DrugId] {
        &self.learning
    }

    #[must_use]
    pub fn finished(&self) -> &[DrugId] {
        &self.finished
    }

    #[must_use]
    pub fn scores(&self) -> &ScoreMap {
        &self.scores
    }

    #[must_use]
    pub fn score(&self, drug_id: &DrugId) -> Option<Score> {
        self.scores.get(drug_id).copied()
    }

    #[must_use]
    pub fn is_learning(&self, drug_id: &DrugId) -> bool {
        self.learning.contains(drug_id)
    }

    #[must_use]
    pub fn is_finished(&self, drug_id: &DrugId) -> bool {
        self.finished.contains(drug_id)
    }

    /// Aggregate counts and total score for the backend.
    #[must_use]
    pub fn study_data(&self) -> StudyData {
        calculate_study_data(
            &ScoreSource::from(&self.scores),
            &self.learning,
            &self.finished,
        )
    }

    /// Apply an action and report what changed.
    pub fn apply(&mut self, action: ProgressAction) -> ProgressChange {
        match action {
            ProgressAction::AddToLearning(drug_id) => {
                if self.is_learning(&drug_id) || self.is_finished(&drug_id) {
                    return ProgressChange::Unchanged;
                }
                self.learning.push(drug_id);
                ProgressChange::ListsChanged
            }
            ProgressAction::MarkFinished(drug_id) => {
                if self.is_finished(&drug_id) {
                    return ProgressChange::Unchanged;
                }
                self.learning.retain(|id| id != &drug_id);
                self.finished.push(drug_id);
                ProgressChange::ListsChanged
            }
            ProgressAction::MoveToLearning(drug_id) => {
                if self.is_learning(&drug_id) {
                    return ProgressChange::Unchanged;
                }
                self.finished.retain(|id| id != &drug_id);
                self.learning.push(drug_id);
                ProgressChange::ListsChanged
            }
            ProgressAction::Remove { drug_id, list } => {
                let target = match list {
                    StudyList::Learning => &mut self.learning,
                    StudyList::Finished => &mut self.finished,
                };
                let before = target.len();
                target.retain(|id| id != &drug_id);
                let was_listed = target.len() != before;
                let cleared_score = self.scores.remove(&drug_id);
                ProgressChange::Removed {
                    drug_id,
                    list,
                    was_listed,
                    cleared_score,
                }
            }
            ProgressAction::RecordScore { drug_id, score } => {
                let previous = self.score(&drug_id);
                if previous.is_some_and(|best| score <= best) {
                    return ProgressChange::Unchanged;
                }
                self.scores.insert(drug_id.clone(), score);
                ProgressChange::ScoreRaised {
                    drug_id,
                    previous,
                    current: score,
                }
            }
            ProgressAction::Reset => {
                *self = Self::default();
                ProgressChange::Reset
            }
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
