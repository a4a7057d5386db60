//! Scripted fakes shared by the unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use speak_core::model::{
    AuthContext, AuthToken, Gender, LoginRequest, ProfileUpdate, RankingEntry, Score, Session,
    SignUpRequest, StudyData, StudyRecord, User, UserId,
};

use crate::api::{AuthApi, AuthResponse, ProfileResponse, StudyRecordApi};
use crate::error::{ApiError, EvaluationError};
use crate::evaluation::Evaluator;
use crate::sync::StudySync;

pub fn user(id: u64) -> User {
    User {
        id: UserId::new(id),
        username: format!("user{id}"),
        email: format!("user{id}@example.com"),
        gender: Gender::Female,
    }
}

pub fn session(id: u64) -> Session {
    Session::new(user(id), AuthToken::new(format!("token-{id}")))
}

pub fn auth(id: u64) -> AuthContext {
    session(id).auth()
}

/// Canned reply for an auth endpoint.
#[derive(Clone)]
pub enum Scripted {
    Ok(AuthResponse),
    Status(u16, Option<&'static str>),
    InvalidBody,
}

impl Scripted {
    pub fn session(id: u64) -> Self {
        let session = session(id);
        Self::Ok(AuthResponse {
            token: session.token,
            user: session.user,
        })
    }

    fn reply(self) -> Result<AuthResponse, ApiError> {
        match self {
            Self::Ok(response) => Ok(response),
            Self::Status(code, message) => Err(status(code, message)),
            Self::InvalidBody => Err(ApiError::InvalidBody("expected value".into())),
        }
    }
}

pub fn status(code: u16, message: Option<&str>) -> ApiError {
    ApiError::Status {
        status: StatusCode::from_u16(code).unwrap(),
        message: message.map(str::to_owned),
    }
}

/// In-process stand-in for the backend.
#[derive(Default)]
pub struct FakeBackend {
    upserts: Mutex<Vec<StudyRecord>>,
    fail_upserts: AtomicBool,
    records: Mutex<Vec<RankingEntry>>,
    login: Mutex<Option<Scripted>>,
    sign_up: Mutex<Option<Scripted>>,
    profile: Mutex<Option<ProfileResponse>>,
    auth_delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    pub fn upserts(&self) -> Vec<StudyRecord> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_records(&self, records: Vec<RankingEntry>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn script_login(&self, reply: Scripted) {
        *self.login.lock().unwrap() = Some(reply);
    }

    pub fn script_sign_up(&self, reply: Scripted) {
        *self.sign_up.lock().unwrap() = Some(reply);
    }

    pub fn script_profile(&self, reply: ProfileResponse) {
        *self.profile.lock().unwrap() = Some(reply);
    }

    pub fn delay_auth(&self, delay: Duration) {
        *self.auth_delay.lock().unwrap() = Some(delay);
    }

    async fn auth_reply(&self, slot: &Mutex<Option<Scripted>>) -> Result<AuthResponse, ApiError> {
        let delay = *self.auth_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = slot.lock().unwrap().clone();
        reply
            .unwrap_or(Scripted::Status(500, Some("not scripted")))
            .reply()
    }
}

#[async_trait]
impl AuthApi for FakeBackend {
    async fn login(&self, _request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        self.auth_reply(&self.login).await
    }

    async fn sign_up(&self, _request: &SignUpRequest) -> Result<AuthResponse, ApiError> {
        self.auth_reply(&self.sign_up).await
    }

    async fn update_profile(
        &self,
        _token: &AuthToken,
        _update: &ProfileUpdate,
    ) -> Result<ProfileResponse, ApiError> {
        self.profile
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| status(400, Some("Update failed")))
    }
}

#[async_trait]
impl StudyRecordApi for FakeBackend {
    async fn upsert_study_record(
        &self,
        _token: &AuthToken,
        record: &StudyRecord,
    ) -> Result<(), ApiError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(status(503, None));
        }
        self.upserts.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn get_study_record(&self, user_id: UserId) -> Result<StudyRecord, ApiError> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|entry| entry.record.user_id == user_id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| status(404, Some("Study record not found")))
    }

    async fn list_study_records(&self) -> Result<Vec<RankingEntry>, ApiError> {
        Ok(self.records.lock().unwrap().clone())
    }
}

/// `StudySync` that records every push.
#[derive(Default)]
pub struct RecordingSync {
    pushed: Mutex<Vec<(Option<UserId>, StudyData)>>,
    fail: AtomicBool,
}

impl RecordingSync {
    pub fn pushed(&self) -> Vec<(Option<UserId>, StudyData)> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StudySync for RecordingSync {
    async fn sync_immediate(&self, auth: Option<&AuthContext>, data: StudyData) -> bool {
        self.pushed
            .lock()
            .unwrap()
            .push((auth.map(|auth| auth.user_id), data));
        !self.fail.load(Ordering::SeqCst)
    }

    async fn create_initial(&self, auth: &AuthContext) -> bool {
        self.sync_immediate(Some(auth), StudyData::zeroed()).await
    }
}

/// Evaluator returning a fixed score, or failing when `None`.
pub struct FixedEvaluator(pub Option<u32>);

#[async_trait]
impl Evaluator for FixedEvaluator {
    async fn evaluate(&self, _audio_uri: &str, _drug_name: &str) -> Result<Score, EvaluationError> {
        self.0
            .map(Score::new)
            .ok_or_else(|| EvaluationError::Unavailable("offline".into()))
    }
}

/// Evaluator that answers `score` after `delay`.
pub struct DelayedEvaluator {
    pub score: u32,
    pub delay: Duration,
}

#[async_trait]
impl Evaluator for DelayedEvaluator {
    async fn evaluate(&self, _audio_uri: &str, _drug_name: &str) -> Result<Score, EvaluationError> {
        tokio::time::sleep(self.delay).await;
        Ok(Score::new(self.score))
    }
}
