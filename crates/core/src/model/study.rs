use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::model::ids::{DrugId, UserId};
use crate::model::score::{ScoreSource, normalize_score};
use crate::model::user::Gender;

//
// ─── STUDY DATA ────────────────────────────────────────────────────────────────
//

/// Aggregate study metrics derived from a user's local progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyData {
    pub total_score: u64,
    pub current_learning: u64,
    pub finished_learning: u64,
}

impl StudyData {
    /// The record pushed for a freshly created account.
    #[must_use]
    pub fn zeroed() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn into_record(self, user_id: UserId) -> StudyRecord {
        StudyRecord {
            user_id,
            current_learning: self.current_learning,
            finished_learning: self.finished_learning,
            total_score: self.total_score,
        }
    }
}

/// Project scores and both lists into the aggregate the backend stores.
///
/// Pure and total: any score shape is accepted and an unknown shape simply
/// contributes a zero total.
#[must_use]
pub fn calculate_study_data(
    scores: &ScoreSource,
    learning: &[DrugId],
    finished: &[DrugId],
) -> StudyData {
    StudyData {
        total_score: scores.total(),
        current_learning: learning.len() as u64,
        finished_learning: finished.len() as u64,
    }
}

//
// ─── BACKEND RECORDS ───────────────────────────────────────────────────────────
//

/// Per-user aggregate as stored by the backend (`/study-record`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyRecord {
    pub user_id: UserId,
    #[serde(default, deserialize_with = "lenient_count")]
    pub current_learning: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub finished_learning: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_score: u64,
}

impl StudyRecord {
    #[must_use]
    pub fn data(&self) -> StudyData {
        StudyData {
            total_score: self.total_score,
            current_learning: self.current_learning,
            finished_learning: self.finished_learning,
        }
    }
}

/// Public profile fields the backend embeds in ranking rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RankedUser {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
}

/// One row of `GET /study-record`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    #[serde(flatten)]
    pub record: StudyRecord,
    #[serde(default)]
    pub user: Option<RankedUser>,
}

impl RankingEntry {
    #[must_use]
    pub fn username(&self) -> &str {
        self.user
            .as_ref()
            .and_then(|u| u.username.as_deref())
            .unwrap_or("-")
    }
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64().map_or(0, normalize_score))
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::score::{Score, ScoreMap};
    use serde_json::json;

    fn ids(names: &[&str]) -> Vec<DrugId> {
        names.iter().map(|n| DrugId::new(*n)).collect()
    }

    #[test]
    fn calculates_counts_and_total() {
        let source = ScoreSource::from_json(&json!({"a": 10, "b": 20}));
        let data = calculate_study_data(&source, &[], &[]);
        assert_eq!(
            data,
            StudyData {
                total_score: 30,
                current_learning: 0,
                finished_learning: 0
            }
        );

        let mut scores = ScoreMap::new();
        scores.insert(DrugId::new("a"), Score::new(55));
        let data = calculate_study_data(&scores.into(), &ids(&["a", "b"]), &ids(&["c"]));
        assert_eq!(data.total_score, 55);
        assert_eq!(data.current_learning, 2);
        assert_eq!(data.finished_learning, 1);
    }

    #[test]
    fn missing_scores_total_zero() {
        let data = calculate_study_data(&ScoreSource::Empty, &ids(&["a"]), &[]);
        assert_eq!(data.total_score, 0);
        assert_eq!(data.current_learning, 1);
    }

    #[test]
    fn oversized_legacy_scores_do_not_panic() {
        let source = ScoreSource::from_json(&json!([1e300, 1e300]));
        let data = calculate_study_data(&source, &ids(&["a"]), &[]);
        assert_eq!(data.total_score, u64::MAX);
        assert_eq!(data.current_learning, 1);
    }

    #[test]
    fn record_serializes_with_backend_field_names() {
        let record = StudyData {
            total_score: 140,
            current_learning: 3,
            finished_learning: 1,
        }
        .into_record(UserId::new(9));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"userId": 9, "currentLearning": 3, "finishedLearning": 1, "totalScore": 140})
        );
    }

    #[test]
    fn ranking_entry_tolerates_partial_rows() {
        let row: RankingEntry = serde_json::from_value(json!({
            "userId": 4,
            "totalScore": 88.0,
            "currentLearning": null,
            "user": {"username": "ana", "gender": "female"}
        }))
        .unwrap();
        assert_eq!(row.record.total_score, 88);
        assert_eq!(row.record.current_learning, 0);
        assert_eq!(row.record.finished_learning, 0);
        assert_eq!(row.username(), "ana");

        let bare: RankingEntry = serde_json::from_value(json!({"userId": 5})).unwrap();
        assert_eq!(bare.username(), "-");
    }
}
