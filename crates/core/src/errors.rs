use thiserror::Error;

use crate::flows::FlowTransitionError;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("{collection} record `{id}` was not found")]
    NotFound { collection: String, id: String },
    #[error(transparent)]
    InvalidTransition(#[from] FlowTransitionError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("concurrent modification: {0}")]
    Conflict(String),
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),
}

impl WorkflowError {
    pub fn not_found(collection: &str, id: impl ToString) -> Self {
        Self::NotFound { collection: collection.to_owned(), id: id.to_string() }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { collection, id } => Self::NotFound { collection, id: id.0 },
            error @ (StoreError::AlreadyExists { .. } | StoreError::PreconditionFailed { .. }) => {
                Self::Conflict(error.to_string())
            }
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
            StoreError::Decode(message) => Self::DataIntegrity(message),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record no longer exists.",
            Self::Conflict { .. } => {
                "The record was changed by someone else. Refresh and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl WorkflowError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self {
            Self::Validation(_) | Self::InvalidTransition(_) => {
                InterfaceError::BadRequest { message, correlation_id }
            }
            Self::NotFound { .. } => InterfaceError::NotFound { message, correlation_id },
            Self::Conflict(_) => InterfaceError::Conflict { message, correlation_id },
            Self::StoreUnavailable(_) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::DataIntegrity(_) => InterfaceError::Internal { message, correlation_id },
        }
    }
}
