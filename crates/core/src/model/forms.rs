use serde::Serialize;
use thiserror::Error;

use crate::model::user::Gender;

/// Blocking validation problems raised before any request is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FormError {
    #[error("Please fill in all fields")]
    MissingFields,
    #[error("Name is required")]
    NameRequired,
    #[error("Passwords do not match")]
    PasswordMismatch,
}

/// Sign-in form as typed by the user.
#[derive(Clone, Debug, Default)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

/// Validated login payload for `POST /auth/login`.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl SignInForm {
    /// Validate the form into a login request.
    ///
    /// # Errors
    ///
    /// Returns `FormError::MissingFields` if either field is blank.
    pub fn validate(self) -> Result<LoginRequest, FormError> {
        let email = self.email.trim().to_owned();
        if email.is_empty() || self.password.is_empty() {
            return Err(FormError::MissingFields);
        }
        Ok(LoginRequest {
            email,
            password: self.password,
        })
    }
}

/// Sign-up form as typed by the user.
#[derive(Clone, Debug, Default)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub gender: Gender,
}

/// Validated account creation payload for `POST /users`.
#[derive(Clone, Serialize)]
pub struct SignUpRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub gender: Gender,
}

impl SignUpForm {
    /// Validate the form into a sign-up request.
    ///
    /// # Errors
    ///
    /// Returns `FormError::MissingFields` if username, email or password is blank.
    pub fn validate(self) -> Result<SignUpRequest, FormError> {
        let username = self.username.trim().to_owned();
        let email = self.email.trim().to_owned();
        if username.is_empty() || email.is_empty() || self.password.is_empty() {
            return Err(FormError::MissingFields);
        }
        Ok(SignUpRequest {
            username,
            email,
            password: self.password,
            gender: self.gender,
        })
    }
}

/// Profile edit form. An empty password keeps the current one.
#[derive(Clone, Debug, Default)]
pub struct ProfileForm {
    pub name: String,
    pub password: String,
    pub confirm_password: String,
}

/// Validated body for `PATCH /users/update`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProfileForm {
    /// Validate the form into a profile update.
    ///
    /// # Errors
    ///
    /// Returns `FormError::NameRequired` for a blank name and
    /// `FormError::PasswordMismatch` if a new password does not match its
    /// confirmation.
    pub fn validate(self) -> Result<ProfileUpdate, FormError> {
        let username = self.name.trim().to_owned();
        if username.is_empty() {
            return Err(FormError::NameRequired);
        }
        if !self.password.is_empty() && self.password != self.confirm_password {
            return Err(FormError::PasswordMismatch);
        }
        Ok(ProfileUpdate {
            username,
            password: (!self.password.is_empty()).then_some(self.password),
        })
    }
}
