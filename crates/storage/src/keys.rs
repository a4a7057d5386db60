use std::fmt;

use speak_core::model::{DrugId, UserId};

/// Key of a value in local device storage.
///
/// Per-user collections are namespaced as `{kind}_{userId}` (and
/// `{kind}_{userId}_{drugId}` for per-drug data) so that switching accounts
/// never reads another user's state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    LearningList(UserId),
    FinishedList(UserId),
    Scores(UserId),
    Recordings(UserId, DrugId),
    SessionToken,
    SessionUser,
}

impl StorageKey {
    const LEARNING: &'static str = "user_learning_list";
    const FINISHED: &'static str = "user_finished_list";
    const SCORES: &'static str = "drug_scores";
    const RECORDINGS: &'static str = "recordings";
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LearningList(user) => write!(f, "{}_{user}", Self::LEARNING),
            Self::FinishedList(user) => write!(f, "{}_{user}", Self::FINISHED),
            Self::Scores(user) => write!(f, "{}_{user}", Self::SCORES),
            Self::Recordings(user, drug) => write!(f, "{}_{user}_{drug}", Self::RECORDINGS),
            Self::SessionToken => f.write_str("token"),
            Self::SessionUser => f.write_str("user"),
        }
    }
}
