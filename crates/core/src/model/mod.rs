mod forms;
mod ids;
mod recording;
mod score;
mod study;
mod user;

pub use forms::{
    FormError, LoginRequest, ProfileForm, ProfileUpdate, SignInForm, SignUpForm, SignUpRequest,
};
pub use ids::{DrugId, ParseIdError, UserId};
pub use recording::Recording;
pub use score::{Score, ScoreMap, ScoreSource, normalize_score};
pub use study::{RankedUser, RankingEntry, StudyData, StudyRecord, calculate_study_data};
pub use user::{AuthContext, AuthToken, Gender, Session, User};
