//! Backend API seams.
//!
//! Services depend on these traits so tests can swap the HTTP client for
//! scripted fakes.

mod client;

use async_trait::async_trait;
use serde::Deserialize;

use speak_core::model::{
    AuthToken, Gender, LoginRequest, ProfileUpdate, RankingEntry, SignUpRequest, StudyRecord, User,
    UserId,
};

use crate::error::ApiError;

pub use client::BackendClient;

/// Body returned by `POST /auth/login` and `POST /users`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: AuthToken,
    pub user: User,
}

/// Fields the backend echoes back after a profile update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
}

impl UserPatch {
    /// Overlay the patch onto `user`.
    pub fn apply_to(self, user: &mut User) {
        if let Some(username) = self.username {
            user.username = username;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(gender) = self.gender {
            user.gender = gender;
        }
    }
}

/// Body returned by `PATCH /users/update`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub id: Option<UserId>,
    #[serde(default)]
    pub user: Option<UserPatch>,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure or a non-success status.
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` on transport failure or a non-success status.
    async fn sign_up(&self, request: &SignUpRequest) -> Result<AuthResponse, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` on transport failure or a non-success status.
    async fn update_profile(
        &self,
        token: &AuthToken,
        update: &ProfileUpdate,
    ) -> Result<ProfileResponse, ApiError>;
}

#[async_trait]
pub trait StudyRecordApi: Send + Sync {
    /// Create or update the caller's study record.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure or a non-success status.
    async fn upsert_study_record(
        &self,
        token: &AuthToken,
        record: &StudyRecord,
    ) -> Result<(), ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` on transport failure, a non-success status or a
    /// malformed body.
    async fn get_study_record(&self, user_id: UserId) -> Result<StudyRecord, ApiError>;

    /// All study records joined with their users, in backend order.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure, a non-success status or a
    /// malformed body.
    async fn list_study_records(&self) -> Result<Vec<RankingEntry>, ApiError>;
}
