use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ids::DrugId;

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

/// Pronunciation score for a single attempt or the best attempt on a drug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(u32);

impl Score {
    #[must_use]
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Best-ever score per drug for one user.
pub type ScoreMap = BTreeMap<DrugId, Score>;

/// Normalize a loosely-typed JSON number into a non-negative integer total.
///
/// Finite positive values are rounded to the nearest integer; anything else
/// (negative, NaN, infinite) counts as zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn normalize_score(raw: f64) -> u64 {
    if raw.is_finite() && raw > 0.0 {
        raw.round() as u64
    } else {
        0
    }
}

//
// ─── SCORE SOURCE ──────────────────────────────────────────────────────────────
//

/// Scores in one of the shapes the app has persisted over time.
///
/// Older builds stored scores as a list of numbers, a list of `{score}`
/// records, or a single running total. The shape is resolved once, when data
/// enters the system, so aggregation never has to guess again.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScoreSource {
    /// Current shape: best score keyed by drug.
    Map(ScoreMap),
    /// Legacy list of scores, already normalized.
    Values(Vec<u64>),
    /// Legacy running total.
    Total(u64),
    #[default]
    Empty,
}

impl ScoreSource {
    /// Resolve an arbitrary JSON document into a score source.
    ///
    /// Never fails: objects and arrays contribute their numeric entries,
    /// `{score}` records contribute their `score` field, a bare number is taken
    /// as the total, and every other shape is `Empty`.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                Self::Values(map.values().map(|v| numeric(v).unwrap_or(0)).collect())
            }
            Value::Array(items) => Self::Values(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(record) => {
                            record.get("score").and_then(numeric).unwrap_or(0)
                        }
                        other => numeric(other).unwrap_or(0),
                    })
                    .collect(),
            ),
            Value::Number(_) => Self::Total(numeric(value).unwrap_or(0)),
            _ => Self::Empty,
        }
    }

    /// Sum of all scores in this source, saturating at `u64::MAX`.
    #[must_use]
    pub fn total(&self) -> u64 {
        match self {
            Self::Map(scores) => scores
                .values()
                .map(|s| u64::from(s.value()))
                .fold(0, u64::saturating_add),
            Self::Values(values) => values.iter().copied().fold(0, u64::saturating_add),
            Self::Total(total) => *total,
            Self::Empty => 0,
        }
    }
}

impl From<ScoreMap> for ScoreSource {
    fn from(scores: ScoreMap) -> Self {
        Self::Map(scores)
    }
}

impl From<&ScoreMap> for ScoreSource {
    fn from(scores: &ScoreMap) -> Self {
        Self::Map(scores.clone())
    }
}

fn numeric(value: &Value) -> Option<u64> {
    value.as_f64().map(normalize_score)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
