//! Error types for the provisioning module

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// What kind of identity-system object a lookup was looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    User,
    Group,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::User => f.write_str("User"),
            Resource::Group => f.write_str("Group"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP Code: {}. Response: {body}", .status.as_u16())]
    Upstream { status: StatusCode, body: String },

    #[error("{0} '{1}' not found")]
    NotFound(Resource, String),

    #[error("Failed to generate unique username after {attempts} attempts")]
    AllocationExhausted { attempts: usize },

    #[error("No username is stored for service {service_id}")]
    MissingLocalState { service_id: u64 },

    #[error("Malformed response from identity API: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Local state error: {0}")]
    Store(#[source] anyhow::Error),
}

impl Error {
    /// Upstream status code, if the identity API answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Upstream { status, .. } => Some(*status),
            Error::Network(e) => e.status(),
            _ => None,
        }
    }
}

/// The step of a lifecycle operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidConfig,
    AllocationFailed,
    CreateFailed,
    PersistFailed,
    StoreFailed,
    GroupLookupFailed,
    GroupNotFound,
    LinkFailed,
    UsernameMissing,
    AccountLookupFailed,
    AccountNotFound,
    UpdateFailed,
    DeleteFailed,
}

impl FailureKind {
    fn describe(&self) -> &'static str {
        match self {
            FailureKind::InvalidConfig => "Invalid module configuration",
            FailureKind::AllocationFailed => "Failed to allocate username",
            FailureKind::CreateFailed => "Failed to create user",
            FailureKind::PersistFailed => "Failed to store username",
            FailureKind::StoreFailed => "Failed to read local state",
            FailureKind::GroupLookupFailed => "Failed to find group",
            FailureKind::GroupNotFound => "Group lookup returned no match",
            FailureKind::LinkFailed => "Failed to add user to group",
            FailureKind::UsernameMissing => "Username missing",
            FailureKind::AccountLookupFailed => "Failed to find user",
            FailureKind::AccountNotFound => "User lookup returned no match",
            FailureKind::UpdateFailed => "Failed to update user",
            FailureKind::DeleteFailed => "Failed to delete user",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A failed lifecycle operation: which step failed and why
#[derive(Error, Debug)]
#[error("{kind}. {cause}")]
pub struct SyncFailure {
    pub kind: FailureKind,
    #[source]
    pub cause: Error,
}

impl SyncFailure {
    pub fn new(kind: FailureKind, cause: Error) -> Self {
        Self { kind, cause }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn cause(&self) -> &Error {
        &self.cause
    }

    /// Upstream HTTP status and response body, when the failure came from the identity API
    pub fn detail(&self) -> Option<(StatusCode, &str)> {
        match &self.cause {
            Error::Upstream { status, body } => Some((*status, body.as_str())),
            _ => None,
        }
    }
}

/// Attach a failure kind to a lower-level result
pub trait FailWith<T> {
    fn fail_with(self, kind: FailureKind) -> std::result::Result<T, SyncFailure>;
}

impl<T> FailWith<T> for Result<T> {
    fn fail_with(self, kind: FailureKind) -> std::result::Result<T, SyncFailure> {
        self.map_err(|cause| SyncFailure::new(kind, cause))
    }
}
