//! Error types and translation for reconciliation operations.
//!
//! Every failure is classified into one of a closed set of [`ErrorKind`]s.
//! The kind decides whether a caller may retry and what advice to show,
//! while the server-provided message and details are carried through
//! untouched. [`ErrorDescriptor`] is the serializable form handed back to
//! callers inside a reconciliation outcome.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Result type alias for scmkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Uniqueness violations reported by the API as plain 400s.
const UNIQUENESS_CODES: &[&str] = &["E006"];
const UNIQUENESS_MARKERS: &[&str] = &["not unique", "already exists", "duplicate"];

/// Closed set of failure kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network failure, timeout, or an overloaded upstream (retryable).
    Transport,
    /// Credentials rejected by the identity endpoint or the API.
    AuthRejected,
    /// No container (folder, snippet, device) was supplied.
    MissingContainer,
    /// More than one container was supplied.
    AmbiguousContainer,
    /// The addressed resource does not exist.
    NotFound,
    /// Server-side uniqueness violation.
    Conflict,
    /// The remote store returned data that breaks its own contract.
    DataIntegrity,
    /// The server rejected the request body.
    Validation,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Whether an outer caller may retry the whole operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }

    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::AuthRejected => "auth_rejected",
            Self::MissingContainer => "missing_container",
            Self::AmbiguousContainer => "ambiguous_container",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::DataIntegrity => "data_integrity",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        }
    }

    /// User-facing description of the kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transport => "Network connectivity issue",
            Self::AuthRejected => "Authentication rejected",
            Self::MissingContainer => "No container specified",
            Self::AmbiguousContainer => "More than one container specified",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Resource conflict",
            Self::DataIntegrity => "Inconsistent data returned by the API",
            Self::Validation => "Request rejected by the API",
            Self::Unknown => "Unexpected error",
        }
    }

    /// Actionable advice for resolving this kind of error.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transport => "Check connectivity to the API and try again",
            Self::AuthRejected => "Verify the client id, client secret and tenant id",
            Self::MissingContainer => "Set exactly one of folder, snippet or device",
            Self::AmbiguousContainer => "Set only one of folder, snippet or device",
            Self::NotFound => "Verify the resource name or id and its container",
            Self::Conflict => "An object with the same name already exists in this container",
            Self::DataIntegrity => "Remove the duplicate objects in the management console",
            Self::Validation => "Check the field values against the resource schema",
            Self::Unknown => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while authenticating, locating or mutating resources.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Connection, DNS, TLS or timeout failure, or a gateway/rate-limit status.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Server-provided details, if any.
        details: Map<String, Value>,
    },

    /// Credentials were rejected.
    #[error("authentication rejected: {message}")]
    AuthRejected {
        /// Error message.
        message: String,
        /// Server-provided details.
        details: Map<String, Value>,
    },

    /// No container was supplied.
    #[error("no container specified: set exactly one of folder, snippet or device")]
    MissingContainer,

    /// More than one container was supplied.
    #[error("ambiguous container: {} supplied, set exactly one", .supplied.join(", "))]
    AmbiguousContainer {
        /// Names of the supplied container members.
        supplied: Vec<&'static str>,
    },

    /// Resource not found.
    #[error("not found: {message}")]
    NotFound {
        /// Error message.
        message: String,
        /// Server-provided details.
        details: Map<String, Value>,
    },

    /// Uniqueness violation.
    #[error("conflict: {message}")]
    Conflict {
        /// Error message.
        message: String,
        /// Server-provided details.
        details: Map<String, Value>,
    },

    /// The remote store broke one of its own invariants.
    #[error("data integrity violation: {message}")]
    DataIntegrity {
        /// Error message.
        message: String,
        /// Supporting details (for example the ids of duplicates).
        details: Map<String, Value>,
    },

    /// Request rejected as invalid.
    #[error("validation failed: {message}")]
    Validation {
        /// Error message.
        message: String,
        /// Server-provided details.
        details: Map<String, Value>,
    },

    /// Catch-all.
    #[error("{message}")]
    Unknown {
        /// Error message.
        message: String,
        /// Server-provided details.
        details: Map<String, Value>,
    },
}

impl Error {
    /// Create a transport error without details.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Create a validation error without details.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Create a data-integrity error.
    pub fn data_integrity(message: impl Into<String>, details: Map<String, Value>) -> Self {
        Self::DataIntegrity {
            message: message.into(),
            details,
        }
    }

    /// Create a catch-all error without details.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Translate a non-2xx response from the resource API.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = ApiErrorBody::parse(status, body);
        let ApiErrorBody {
            message,
            details,
            uniqueness,
        } = parsed;

        match status {
            401 | 403 => Self::AuthRejected { message, details },
            404 => Self::NotFound { message, details },
            409 => Self::Conflict { message, details },
            400 if uniqueness => Self::Conflict { message, details },
            400 | 422 => Self::Validation { message, details },
            429 | 502 | 503 | 504 => Self::Transport { message, details },
            _ => Self::Unknown { message, details },
        }
    }

    /// Translate a non-2xx response from the identity endpoint.
    ///
    /// Any 4xx means the exchange itself was refused.
    pub fn from_token_response(status: u16, body: &str) -> Self {
        if (400..500).contains(&status) {
            let ApiErrorBody {
                message, details, ..
            } = ApiErrorBody::parse(status, body);
            return Self::AuthRejected { message, details };
        }
        Self::from_response(status, body)
    }

    /// Get the error kind.
    #[must_use]
    pub fn category(&self) -> ErrorKind {
        match self {
            Error::Transport { .. } => ErrorKind::Transport,
            Error::AuthRejected { .. } => ErrorKind::AuthRejected,
            Error::MissingContainer => ErrorKind::MissingContainer,
            Error::AmbiguousContainer { .. } => ErrorKind::AmbiguousContainer,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::DataIntegrity { .. } => ErrorKind::DataIntegrity,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Details attached to the error.
    #[must_use]
    pub fn details(&self) -> Map<String, Value> {
        match self {
            Error::Transport { details, .. }
            | Error::AuthRejected { details, .. }
            | Error::NotFound { details, .. }
            | Error::Conflict { details, .. }
            | Error::DataIntegrity { details, .. }
            | Error::Validation { details, .. }
            | Error::Unknown { details, .. } => details.clone(),
            Error::MissingContainer => Map::new(),
            Error::AmbiguousContainer { supplied } => {
                let mut details = Map::new();
                details.insert(
                    "supplied".to_string(),
                    Value::from(supplied.iter().map(|s| Value::from(*s)).collect::<Vec<_>>()),
                );
                details
            }
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::from_response(code, ""),
            other => Self::transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::unknown(format!("invalid API response: {err}"))
    }
}

// =============================================================================
// Error bodies
// =============================================================================

/// Normalized view of an error body from either endpoint.
struct ApiErrorBody {
    message: String,
    details: Map<String, Value>,
    uniqueness: bool,
}

impl ApiErrorBody {
    /// Parse `{"_errors": [...], "_request_id": ...}` or `{error, error_description}`.
    fn parse(status: u16, body: &str) -> Self {
        let mut details = Map::new();
        details.insert("status".to_string(), Value::from(status));

        let fallback = format!("HTTP {status}");
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Self {
                message: fallback,
                details,
                uniqueness: false,
            };
        }

        let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(trimmed) else {
            details.insert("body".to_string(), Value::from(trimmed));
            return Self {
                message: format!("{fallback}: {trimmed}"),
                details,
                uniqueness: false,
            };
        };

        if let Some(request_id) = doc.get("_request_id") {
            details.insert("request_id".to_string(), request_id.clone());
        }

        // Resource API: list of coded errors
        if let Some(Value::Array(errors)) = doc.get("_errors") {
            let messages: Vec<String> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            let codes: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("code").and_then(Value::as_str))
                .collect();
            if let Some(code) = codes.first() {
                details.insert("code".to_string(), Value::from(*code));
            }
            let uniqueness = codes.iter().any(|c| UNIQUENESS_CODES.contains(c))
                || has_uniqueness_marker(&Value::Array(errors.clone()));
            details.insert("errors".to_string(), Value::Array(errors.clone()));

            let message = if messages.is_empty() {
                fallback
            } else {
                messages.join("; ")
            };
            return Self {
                message,
                details,
                uniqueness,
            };
        }

        // Identity endpoint: OAuth2 error body
        if let Some(error) = doc.get("error").and_then(Value::as_str) {
            details.insert("error".to_string(), Value::from(error));
            let description = doc.get("error_description").and_then(Value::as_str);
            if let Some(description) = description {
                details.insert("error_description".to_string(), Value::from(description));
            }
            let message = match description {
                Some(d) => format!("{error}: {d}"),
                None => error.to_string(),
            };
            return Self {
                message,
                details,
                uniqueness: false,
            };
        }

        let message = doc
            .get("message")
            .and_then(Value::as_str)
            .map_or(fallback, str::to_string);
        let uniqueness = has_uniqueness_marker(&Value::Object(doc.clone()));
        details.insert("body".to_string(), Value::Object(doc));
        Self {
            message,
            details,
            uniqueness,
        }
    }
}

fn has_uniqueness_marker(value: &Value) -> bool {
    let text = value.to_string().to_lowercase();
    UNIQUENESS_MARKERS.iter().any(|m| text.contains(m))
}

// =============================================================================
// Descriptor
// =============================================================================

/// Serializable, caller-facing description of a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Failure kind.
    pub kind: ErrorKind,
    /// Human-readable message, including the server's own message.
    pub message: String,
    /// Whether an outer caller may retry.
    pub retryable: bool,
    /// Server-provided details, preserved verbatim.
    pub details: Map<String, Value>,
}

impl ErrorDescriptor {
    /// Advice for the descriptor's kind.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        self.kind.advice()
    }
}

impl From<&Error> for ErrorDescriptor {
    fn from(err: &Error) -> Self {
        let kind = err.category();
        Self {
            kind,
            message: err.to_string(),
            retryable: kind.is_retryable(),
            details: err.details(),
        }
    }
}

impl From<Error> for ErrorDescriptor {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}
