use crate::db::error::DbError;
use crate::models::types::{InstanceId, ItemKey};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

pub type AppResult<T> = Result<T, DomainError>;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// Item id is not present in the catalog
    #[error("unknown item: {0}")]
    UnknownItem(ItemKey),

    #[error("item is not consumable: {0}")]
    NotConsumable(ItemKey),

    /// Instance does not exist or is not owned by the caller
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// Insufficient quantity to perform action
    #[error("insufficient quantity of {item_id}: have {have}, need {need}")]
    InsufficientQuantity { item_id: ItemKey, have: u64, need: u64 },

    #[error("max count exceeded for {item_id}: have {have}, adding {adding}, max {max}")]
    MaxCountExceeded {
        item_id: ItemKey,
        have: u64,
        adding: u64,
        max: u64,
    },

    /// The whole operation ran past its deadline
    #[error("operation timed out")]
    Timeout,

    #[error("reward roll failed for {reward_ref}: {message}")]
    Reward { reward_ref: String, message: String },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Error kinds surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Unavailable,
    DeadlineExceeded,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::FailedPrecondition => "FAILED_PRECONDITION",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    /// gRPC status code, as understood by most game server runtimes
    pub fn grpc_code(&self) -> u32 {
        match self {
            ErrorCode::InvalidArgument => 3,
            ErrorCode::DeadlineExceeded => 4,
            ErrorCode::NotFound => 5,
            ErrorCode::FailedPrecondition => 9,
            ErrorCode::Internal => 13,
            ErrorCode::Unavailable => 14,
        }
    }

    /// Caller may retry the whole call unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::Unavailable | ErrorCode::DeadlineExceeded)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DomainError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DomainError::Validation { .. }
            | DomainError::UnknownItem(_)
            | DomainError::NotConsumable(_)
            | DomainError::Json(_) => ErrorCode::InvalidArgument,
            DomainError::InstanceNotFound(_) => ErrorCode::NotFound,
            DomainError::InsufficientQuantity { .. } | DomainError::MaxCountExceeded { .. } => {
                ErrorCode::FailedPrecondition
            }
            DomainError::Timeout => ErrorCode::DeadlineExceeded,
            DomainError::Db(DbError::Timeout) => ErrorCode::DeadlineExceeded,
            DomainError::Db(e) if e.is_unavailable() => ErrorCode::Unavailable,
            DomainError::Db(_)
            | DomainError::Reward { .. }
            | DomainError::Infra(_)
            | DomainError::InvalidData(_)
            | DomainError::InternalError(_) => ErrorCode::Internal,
        }
    }

    /// Structured detail for clients, enough to show which item failed and why
    pub fn details(&self) -> Value {
        match self {
            DomainError::Validation { field, .. } => json!({ "field": field }),
            DomainError::UnknownItem(item_id) | DomainError::NotConsumable(item_id) => {
                json!({ "item_id": item_id })
            }
            DomainError::InstanceNotFound(instance_id) => json!({ "instance_id": instance_id }),
            DomainError::InsufficientQuantity { item_id, have, need } => json!({
                "item_id": item_id,
                "required": need,
                "available": have,
            }),
            DomainError::MaxCountExceeded {
                item_id,
                have,
                adding,
                max,
            } => json!({
                "item_id": item_id,
                "available": have,
                "requested": adding,
                "max_count": max,
            }),
            _ => json!({}),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigErrorKind {
    #[error("failed to read file: {0}")]
    Read(std::io::Error),

    #[error("failed to parse file: {0}")]
    Parse(toml::de::Error),

    #[error("failed to parse catalog: {0}")]
    Catalog(serde_yaml::Error),

    #[error("invalid environment variable {0}: {1}")]
    InvalidEnv(String, String),
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: std::path::PathBuf,
        #[source]
        source: ConfigErrorKind,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
