//! Core types for scmkit.

use crate::error::{Error, ErrorDescriptor, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://auth.apps.paloaltonetworks.com/am/oauth2/access_token";

/// Default resource API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.strata.paloaltonetworks.com";

// =============================================================================
// Credentials and tokens
// =============================================================================

/// Long-lived client credentials exchanged for bearer tokens.
///
/// The secret never appears in `Debug` output and the type is deliberately
/// not serializable.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
    tenant_scope_id: String,
}

impl Credentials {
    /// Create credentials from their three parts.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_scope_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tenant_scope_id: tenant_scope_id.into(),
        }
    }

    /// OAuth2 client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Tenant scope id as configured.
    #[must_use]
    pub fn tenant_scope_id(&self) -> &str {
        &self.tenant_scope_id
    }

    /// Scope string sent with the token request.
    ///
    /// A bare tenant id becomes `tsg_id:<id>`; anything already containing a
    /// `:` is passed through.
    #[must_use]
    pub fn scope(&self) -> String {
        if self.tenant_scope_id.contains(':') {
            self.tenant_scope_id.clone()
        } else {
            format!("tsg_id:{}", self.tenant_scope_id)
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"********")
            .field("tenant_scope_id", &self.tenant_scope_id)
            .finish()
    }
}

/// Short-lived bearer token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Opaque access token.
    pub access_token: String,
    /// Token type, normally `Bearer`.
    pub token_type: String,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
    /// Granted scope, if the server echoed one.
    #[serde(default)]
    pub scope: Option<String>,
}

impl Token {
    /// Value for the `Authorization` header.
    #[must_use]
    pub fn authorization(&self) -> String {
        let token_type = if self.token_type.is_empty() || self.token_type.eq_ignore_ascii_case("bearer")
        {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{token_type} {}", self.access_token)
    }

    /// Whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left until expiry at `now` (zero once expired).
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"********")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

// =============================================================================
// Resource identity and state
// =============================================================================

/// How a resource is identified within its container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKey {
    /// Exact, case-sensitive resource name.
    Name(String),
    /// Server-assigned identifier.
    Id(String),
}

impl ResourceKey {
    /// Key by name.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Key by server id.
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "'{name}'"),
            Self::Id(id) => write!(f, "id {id}"),
        }
    }
}

/// Desired lifecycle state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// The resource should exist and match the desired fields.
    #[default]
    Present,
    /// The resource should not exist.
    Absent,
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => f.write_str("present"),
            Self::Absent => f.write_str("absent"),
        }
    }
}

impl FromStr for DesiredState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(Error::validation(format!(
                "invalid state '{other}' (expected present or absent)"
            ))),
        }
    }
}

/// A resource instance as returned by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingResource {
    /// Server-assigned identifier.
    pub id: String,
    /// All fields, including `id`.
    pub fields: Map<String, Value>,
}

impl ExistingResource {
    /// Build from an API document, requiring a string `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Self::from_map(fields),
            other => Err(Error::data_integrity(
                format!("expected a resource object, got {}", json_type(&other)),
                Map::new(),
            )),
        }
    }

    /// Build from an API object, requiring a string `id`.
    pub fn from_map(fields: Map<String, Value>) -> Result<Self> {
        let id = fields
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        match id {
            Some(id) => Ok(Self { id, fields }),
            None => {
                let mut details = Map::new();
                if let Some(name) = fields.get("name") {
                    details.insert("name".to_string(), name.clone());
                }
                Err(Error::data_integrity(
                    "resource returned without an id",
                    details,
                ))
            }
        }
    }

    /// Resource name, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    /// Convert into the JSON document.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Action decided by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Nothing to do.
    #[serde(rename = "none")]
    Noop,
    /// Create the resource.
    Create,
    /// Replace the resource's declared fields.
    Update,
    /// Delete the resource.
    Delete,
}

impl Action {
    /// Whether this action mutates remote state.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Noop)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noop => f.write_str("none"),
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Result of one reconciliation, the only artifact returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    /// True iff a mutating call succeeded (or would be issued, in dry-run).
    pub changed: bool,
    /// Action taken or, in dry-run, the action that would be taken.
    pub action: Action,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Resulting resource document, `None` when absent.
    pub resource: Option<Value>,
    /// Populated on failure; `changed` is then false and `resource` `None`.
    pub error: Option<ErrorDescriptor>,
}

impl ReconciliationOutcome {
    /// Successful outcome.
    #[must_use]
    pub fn success(action: Action, resource: Option<Value>, dry_run: bool) -> Self {
        Self {
            changed: action.is_mutation(),
            action,
            dry_run,
            resource,
            error: None,
        }
    }

    /// Failed outcome.
    #[must_use]
    pub fn failure(error: &Error, dry_run: bool) -> Self {
        Self {
            changed: false,
            action: Action::Noop,
            dry_run,
            resource: None,
            error: Some(ErrorDescriptor::from(error)),
        }
    }

    /// Whether the reconciliation completed without error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// =============================================================================
// Listing
// =============================================================================

/// Parameters for one list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Server-side name filter.
    pub name: Option<String>,
    /// Offset of the first entry.
    pub offset: u64,
    /// Maximum entries per page.
    pub limit: u64,
    /// Opaque continuation cursor, when the server uses cursors.
    pub cursor: Option<String>,
}

impl ListQuery {
    /// First page with the given page size.
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self {
            name: None,
            offset: 0,
            limit,
            cursor: None,
        }
    }

    /// Filter by exact name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// One page of a list response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Entries on this page.
    pub items: Vec<Value>,
    /// Size of the whole scoped set, when reported.
    pub total: Option<u64>,
    /// Offset echoed by the server.
    pub offset: u64,
    /// Limit echoed by the server (zero when not reported).
    pub limit: u64,
    /// Cursor for the next page, when the server uses cursors.
    pub cursor: Option<String>,
}

// =============================================================================
// Configuration
// =============================================================================

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// OAuth2 token endpoint.
    pub token_url: String,
    /// Resource API base URL.
    pub api_base: String,
    /// Global timeout per HTTP request.
    pub timeout: Duration,
    /// Refresh the token when it expires within this margin.
    pub token_margin: Duration,
    /// Page size for list requests.
    pub page_limit: u64,
    /// Upper bound on pages walked by a single lookup.
    pub max_pages: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            token_margin: Duration::from_secs(300),
            page_limit: 200,
            max_pages: 1000,
        }
    }
}

impl ClientConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token endpoint.
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Set the API base URL.
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the token refresh margin.
    pub fn token_margin(mut self, margin: Duration) -> Self {
        self.token_margin = margin;
        self
    }

    /// Set the list page size (at least 1).
    pub fn page_limit(mut self, limit: u64) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Set the page ceiling for a single lookup (at least 1).
    pub fn max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages.max(1);
        self
    }
}

/// Configuration for retry behavior.
///
/// Used only by callers that opt in to [`crate::retry`]; the core never
/// retries on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}
