use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::score::Score;

/// A locally stored pronunciation attempt.
///
/// Lives only on the device; the backend only ever sees the best score of a
/// drug, folded into the user's aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub uri: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub score: Option<Score>,
}

impl Recording {
    #[must_use]
    pub fn new(uri: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            uri: uri.into(),
            timestamp,
            score: None,
        }
    }

    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.score.is_some()
    }

    /// Highest score across a recording history, if any attempt was scored.
    #[must_use]
    pub fn best_score(history: &[Recording]) -> Option<Score> {
        history.iter().filter_map(|r| r.score).max()
    }
}
