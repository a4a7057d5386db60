use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use speak_core::Clock;
use speak_core::model::{
    AuthToken, LoginRequest, ProfileUpdate, RankingEntry, SignUpRequest, StudyRecord, UserId,
};

use super::{AuthApi, AuthResponse, ProfileResponse, StudyRecordApi};
use crate::config::ApiConfig;
use crate::error::ApiError;

/// HTTP client for the drugspeak backend.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    config: ApiConfig,
    clock: Clock,
}

impl BackendClient {
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the TLS backend cannot be initialised.
    pub fn new(config: ApiConfig, clock: Clock) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            config,
            clock,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    // `_=<millis>` defeats intermediary caches on the study-record endpoints.
    fn cache_busted(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.query(&[("_", self.clock.now_millis())])
    }

    async fn send(builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_owned()));
        Err(ApiError::Status { status, message })
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
        let body = Self::send(builder).await?.text().await?;
        serde_json::from_str(&body).map_err(|err| ApiError::InvalidBody(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl AuthApi for BackendClient {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let url = self.config.endpoint("auth/login");
        Self::send_json(self.client.post(url).json(request)).await
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<AuthResponse, ApiError> {
        let url = self.config.endpoint("users");
        Self::send_json(self.client.post(url).json(request)).await
    }

    async fn update_profile(
        &self,
        token: &AuthToken,
        update: &ProfileUpdate,
    ) -> Result<ProfileResponse, ApiError> {
        let url = self.config.endpoint("users/update");
        let builder = self
            .client
            .patch(url)
            .bearer_auth(token.expose())
            .json(update);
        Self::send_json(builder).await
    }
}

#[async_trait]
impl StudyRecordApi for BackendClient {
    async fn upsert_study_record(
        &self,
        token: &AuthToken,
        record: &StudyRecord,
    ) -> Result<(), ApiError> {
        let url = self.config.endpoint("study-record");
        let builder = self
            .client
            .post(url)
            .bearer_auth(token.expose())
            .json(record);
        Self::send(self.cache_busted(builder)).await?;
        Ok(())
    }

    async fn get_study_record(&self, user_id: UserId) -> Result<StudyRecord, ApiError> {
        let url = self.config.endpoint(&format!("study-record/{user_id}"));
        Self::send_json(self.client.get(url)).await
    }

    async fn list_study_records(&self) -> Result<Vec<RankingEntry>, ApiError> {
        let url = self.config.endpoint("study-record");
        Self::send_json(self.cache_busted(self.client.get(url))).await
    }
}
