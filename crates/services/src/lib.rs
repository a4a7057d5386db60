#![forbid(unsafe_code)]

pub mod api;
pub mod app_services;
pub mod auth_service;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod progress_store;
pub mod ranking_service;
pub mod recording_service;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use speak_core::Clock;

pub use api::{AuthApi, AuthResponse, BackendClient, ProfileResponse, StudyRecordApi, UserPatch};
pub use app_services::AppServices;
pub use auth_service::{AuthService, AuthStatus};
pub use config::{ApiConfig, AppConfig};
pub use error::{
    ApiError, AppServicesError, AuthError, ConfigError, EvaluationError, ProgressError,
    RankingError, RecordingError,
};
pub use evaluation::{Evaluator, MockEvaluator};
pub use progress_store::{ProgressEvent, ProgressObserver, ProgressStore};
pub use ranking_service::{RankingRow, RankingService};
pub use recording_service::{EvaluationOutcome, RecordingService};
pub use sync::{DebouncedSync, StudyRecordSync, StudySync};
