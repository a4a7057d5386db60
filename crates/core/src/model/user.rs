use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ids::UserId;

/// Gender as stored on the user's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
    #[serde(other)]
    Other,
}

impl Gender {
    /// Parse a free-form gender value; anything unrecognized maps to `Other`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "male" => Self::Male,
            "female" => Self::Female,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }
}

/// Identity record of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub gender: Gender,
}

/// Bearer credential issued by the backend.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// What a backend call needs to act on behalf of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: UserId,
    pub token: AuthToken,
}

impl AuthContext {
    #[must_use]
    pub fn new(user_id: UserId, token: AuthToken) -> Self {
        Self { user_id, token }
    }
}

/// A signed-in user together with their token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub token: AuthToken,
}

impl Session {
    #[must_use]
    pub fn new(user: User, token: AuthToken) -> Self {
        Self { user, token }
    }

    #[must_use]
    pub fn auth(&self) -> AuthContext {
        AuthContext::new(self.user.id, self.token.clone())
    }
}
