//! The remote control plane seam and its error classification
//!
//! Adapters (AWS SDK clients, in-memory fakes) implement [`ControlPlane`].
//! Errors carry the collaborator-supplied code and are classified by code
//! instead of string matching on Debug output.

use crate::fields::Fields;
use crate::kind::ResourceKind;
use crate::resource::{RemoteSnapshot, ResourceHandle};
use async_trait::async_trait;
use thiserror::Error;

/// A remote, eventually-consistent control plane
///
/// Implementations must be safe for concurrent use by many in-flight
/// operations on distinct handles.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Submit creation of a new object and return its handle.
    async fn create(
        &self,
        kind: ResourceKind,
        fields: &Fields,
    ) -> Result<ResourceHandle, RemoteError>;

    /// Describe an object. Fails with a `NotFound` class when it is gone.
    async fn read(&self, handle: &ResourceHandle) -> Result<RemoteSnapshot, RemoteError>;

    /// Apply a change to the given fields only.
    async fn update(&self, handle: &ResourceHandle, changed: &Fields) -> Result<(), RemoteError>;

    /// Submit deletion of an object.
    async fn delete(&self, handle: &ResourceHandle) -> Result<(), RemoteError>;
}

/// Remote error categories for retry and not-found handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RemoteErrorClass {
    /// Object does not exist
    NotFound,
    /// Rate limit exceeded (retryable with backoff)
    Throttled,
    /// Transient service or network failure (retryable)
    Unavailable,
    /// Conflicting state, duplicate or in-use object
    Conflict,
    /// Request refused: bad reference, validation, quota or permissions
    Invalid,
    /// Anything the classifier does not recognise
    Other,
}

/// An error returned by a control plane call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{class}: {message}")]
pub struct RemoteError {
    pub class: RemoteErrorClass,
    pub code: Option<String>,
    pub message: String,
}

impl RemoteError {
    pub fn new(class: RemoteErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorClass::NotFound, message)
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorClass::Throttled, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorClass::Unavailable, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorClass::Conflict, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorClass::Invalid, message)
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        self.class == RemoteErrorClass::NotFound
    }

    /// Check if this error is worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self.class,
            RemoteErrorClass::Throttled | RemoteErrorClass::Unavailable
        )
    }

    /// Get a user-friendly suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        self.code.as_deref().and_then(suggestion_for_code)
    }
}

/// Known error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFoundException",
    "ResourceNotFound",
    "DBSnapshotNotFound",
    "DBSnapshotNotFoundFault",
    "DBInstanceNotFound",
    "DBInstanceNotFoundFault",
    "NoSuchEntity",
];

/// Known error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
];

/// Known error codes for transient service failures
const UNAVAILABLE_CODES: &[&str] = &[
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "InternalFailure",
    "InternalServerException",
    "InternalServiceError",
    "ServerException",
    "RequestTimeout",
    "RequestTimeoutException",
];

/// Known error codes for conflicting state
const CONFLICT_CODES: &[&str] = &[
    "ConflictException",
    "ResourceInUseException",
    "DBSnapshotAlreadyExists",
    "DBSnapshotAlreadyExistsFault",
    "InvalidDBSnapshotState",
    "InvalidDBSnapshotStateFault",
    "InvalidDBInstanceState",
];

/// Known error codes for refused requests
const INVALID_CODES: &[&str] = &[
    "ValidationException",
    "InvalidParameterValue",
    "InvalidParameterCombination",
    "InvalidParameterException",
    "ClientException",
    "AccessDeniedException",
    "ServiceQuotaExceededException",
    "SnapshotQuotaExceeded",
    "SharedSnapshotQuotaExceeded",
];

/// Classify a control plane error using its error code.
///
/// Falls back to scanning the message for a known code when the
/// collaborator did not supply one.
pub fn classify_remote_error(code: Option<&str>, message: Option<&str>) -> RemoteError {
    let message = message.unwrap_or("Unknown error").to_string();
    let code = code
        .map(str::to_string)
        .or_else(|| extract_error_code(&message));

    let class = match code.as_deref() {
        Some(c) if NOT_FOUND_CODES.contains(&c) => RemoteErrorClass::NotFound,
        Some(c) if THROTTLING_CODES.contains(&c) => RemoteErrorClass::Throttled,
        Some(c) if UNAVAILABLE_CODES.contains(&c) => RemoteErrorClass::Unavailable,
        Some(c) if CONFLICT_CODES.contains(&c) => RemoteErrorClass::Conflict,
        Some(c) if INVALID_CODES.contains(&c) => RemoteErrorClass::Invalid,
        _ => RemoteErrorClass::Other,
    };

    RemoteError {
        class,
        code,
        message,
    }
}

/// Extract a known error code from free-form text
fn extract_error_code(text: &str) -> Option<String> {
    NOT_FOUND_CODES
        .iter()
        .chain(THROTTLING_CODES)
        .chain(UNAVAILABLE_CODES)
        .chain(CONFLICT_CODES)
        .chain(INVALID_CODES)
        .filter(|code| text.contains(*code))
        // Prefer the most specific match ("ThrottlingException" over "Throttling")
        .max_by_key(|code| code.len())
        .map(|code| (*code).to_string())
}

/// Suggestions keyed by error code
const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "AccessDeniedException",
        "Check that the credentials in use carry the required IAM permissions",
    ),
    (
        "ServiceQuotaExceededException",
        "Request a quota increase or delete unused resources",
    ),
    (
        "SnapshotQuotaExceeded",
        "Delete old manual DB snapshots or request a higher snapshot quota",
    ),
    (
        "InvalidDBInstanceState",
        "The source DB instance must be available before it can be snapshotted",
    ),
    (
        "ConflictException",
        "Another operation is in progress on this resource; retry once it settles",
    ),
];

fn suggestion_for_code(code: &str) -> Option<&'static str> {
    SUGGESTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| *s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_not_found() {
        let err = classify_remote_error(Some("DBSnapshotNotFound"), Some("gone"));
        assert!(err.is_not_found());
        assert_eq!(err.code.as_deref(), Some("DBSnapshotNotFound"));
        assert_eq!(err.message, "gone");
    }

    #[test]
    fn classify_transient() {
        assert!(classify_remote_error(Some("ThrottlingException"), None).is_transient());
        assert!(classify_remote_error(Some("InternalServerException"), None).is_transient());
        assert!(!classify_remote_error(Some("ValidationException"), None).is_transient());
    }

    #[test]
    fn classify_permanent() {
        assert_eq!(
            classify_remote_error(Some("ConflictException"), None).class,
            RemoteErrorClass::Conflict
        );
        assert_eq!(
            classify_remote_error(Some("ValidationException"), None).class,
            RemoteErrorClass::Invalid
        );
        assert_eq!(
            classify_remote_error(Some("SomethingNew"), None).class,
            RemoteErrorClass::Other
        );
    }

    #[test]
    fn classify_from_message_when_code_missing() {
        let err =
            classify_remote_error(None, Some("service error: ThrottlingException: slow down"));
        assert_eq!(err.class, RemoteErrorClass::Throttled);
        assert_eq!(err.code.as_deref(), Some("ThrottlingException"));

        let err = classify_remote_error(None, Some("connection refused"));
        assert_eq!(err.class, RemoteErrorClass::Other);
        assert!(err.code.is_none());
    }

    #[test]
    fn suggestions_for_known_codes() {
        for (code, _) in SUGGESTIONS {
            assert!(
                suggestion_for_code(code).is_some(),
                "No suggestion for code: {code}"
            );
        }
        assert!(suggestion_for_code("SomeUnknownCode").is_none());
        assert!(RemoteError::invalid("x").suggestion().is_none());
    }

    #[test]
    fn display_includes_class() {
        assert_eq!(
            RemoteError::throttled("slow down").to_string(),
            "throttled: slow down"
        );
    }
}
