//! Error kinds for RPC calls.
//!
//! Every failed call resolves to exactly one [`ErrorKind`]. Scenarios decide
//! which failures are benign by passing an explicit whitelist of kinds, never
//! by inspecting error messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of failure classes a call can report.
///
/// # Categories
///
/// | Category | Variants | Description |
/// |----------|----------|-------------|
/// | Transport | `NoBackends`, `TransportUnavailable`, `ProtocolError` | Backend unreachable or connection lost |
/// | Client | `ClientClosed`, `Timeout` | Local client state |
/// | Not Found | `BucketNotFound`, `ObjectNotFound` | Entity doesn't exist |
/// | Validation | `InvalidBucketName`, `InvalidBucketConfig`, `InvalidQuery` | Bad input |
/// | State | `BucketExists`, `EtagConflict` | Conflicting state |
/// | System | `Internal` | Server-side bug |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    // ==================== Transport ====================
    /// No connected backend: the address did not resolve or refused connections.
    NoBackends,
    /// The connection dropped while the request was outstanding.
    TransportUnavailable,
    /// A frame could not be decoded or arrived out of sequence.
    ProtocolError,

    // ==================== Client ====================
    /// The client was closed before the request was issued.
    ClientClosed,
    /// The request did not complete within its deadline.
    Timeout,

    // ==================== Not Found ====================
    /// Bucket does not exist.
    BucketNotFound,
    /// Object does not exist in the bucket.
    ObjectNotFound,

    // ==================== Validation ====================
    /// Bucket name is malformed.
    InvalidBucketName,
    /// Bucket index definition is malformed.
    InvalidBucketConfig,
    /// Filter or raw query could not be executed.
    InvalidQuery,

    // ==================== State ====================
    /// Bucket already exists.
    BucketExists,
    /// Conditional write saw a different etag.
    EtagConflict,

    // ==================== System ====================
    /// Server-side invariant violation.
    Internal,
}

impl ErrorKind {
    /// Kinds a call may report when the backend goes away underneath it.
    pub const TRANSPORT: &'static [ErrorKind] = &[
        ErrorKind::NoBackends,
        ErrorKind::TransportUnavailable,
        ErrorKind::ProtocolError,
    ];

    /// Stable name used in logs and JSON.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::NoBackends => "NoBackendsError",
            ErrorKind::TransportUnavailable => "TransportUnavailableError",
            ErrorKind::ProtocolError => "ProtocolError",
            ErrorKind::ClientClosed => "ClientClosedError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::BucketNotFound => "BucketNotFoundError",
            ErrorKind::ObjectNotFound => "ObjectNotFoundError",
            ErrorKind::InvalidBucketName => "InvalidBucketNameError",
            ErrorKind::InvalidBucketConfig => "InvalidBucketConfigError",
            ErrorKind::InvalidQuery => "InvalidQueryError",
            ErrorKind::BucketExists => "BucketExistsError",
            ErrorKind::EtagConflict => "EtagConflictError",
            ErrorKind::Internal => "InternalError",
        }
    }

    /// True for the kinds in [`ErrorKind::TRANSPORT`].
    pub fn is_transport(self) -> bool {
        Self::TRANSPORT.contains(&self)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed RPC call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RpcError {
    /// Failure class.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl RpcError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for `NoBackends`.
    pub fn no_backends(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoBackends, message)
    }

    /// Shorthand for `TransportUnavailable`.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportUnavailable, message)
    }

    /// Shorthand for `ProtocolError`.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolError, message)
    }

    /// Shorthand for `BucketNotFound`.
    pub fn bucket_not_found(bucket: &str) -> Self {
        Self::new(ErrorKind::BucketNotFound, format!("{} does not exist", bucket))
    }

    /// Shorthand for `ObjectNotFound`.
    pub fn object_not_found(bucket: &str, key: &str) -> Self {
        Self::new(
            ErrorKind::ObjectNotFound,
            format!("{}::{} does not exist", bucket, key),
        )
    }

    /// Shorthand for `InvalidQuery`.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidQuery, message)
    }

    /// True if this error's kind appears in `allowed`.
    pub fn is_one_of(&self, allowed: &[ErrorKind]) -> bool {
        allowed.contains(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_class_is_exactly_three_kinds() {
        assert_eq!(ErrorKind::TRANSPORT.len(), 3);
        assert!(ErrorKind::NoBackends.is_transport());
        assert!(ErrorKind::TransportUnavailable.is_transport());
        assert!(ErrorKind::ProtocolError.is_transport());
        assert!(!ErrorKind::BucketNotFound.is_transport());
        assert!(!ErrorKind::Timeout.is_transport());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = RpcError::bucket_not_found("missing");
        let msg = err.to_string();
        assert!(msg.contains("BucketNotFoundError"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn whitelist_membership() {
        let err = RpcError::transport("reset by peer");
        assert!(err.is_one_of(ErrorKind::TRANSPORT));
        assert!(!err.is_one_of(&[ErrorKind::ObjectNotFound]));
    }

    #[test]
    fn error_round_trips_through_json() {
        let err = RpcError::object_not_found("b", "k");
        let json = serde_json::to_string(&err).unwrap();
        let back: RpcError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
