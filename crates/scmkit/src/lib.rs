//! # scmkit
//!
//! Idempotent lifecycle management for container-scoped network-policy
//! objects behind a cloud management API.
//!
//! This crate provides:
//! - Bearer token lifecycle (client-credentials exchange, refresh before
//!   expiry)
//! - Container validation (exactly one of folder, snippet or device)
//! - Lookup by name or id with transparent pagination
//! - Partial-update change detection with unordered-list semantics
//! - A resource-agnostic reconcile step returning a single outcome
//! - A closed error taxonomy with retryability
//!
//! ## Example
//!
//! ```no_run
//! use scmkit::resource::ADDRESS;
//! use scmkit::{Client, ClientConfig, ContainerSelection, Credentials, DesiredSpec, DesiredState, ResourceKey};
//!
//! let credentials = Credentials::new("svc@1234567890.iam.panserviceaccount.com", "secret", "1234567890");
//! let mut client = Client::new(credentials, ClientConfig::default());
//!
//! let desired = DesiredSpec::new().with("ip_netmask", "10.1.1.0/24");
//! let outcome = client.reconcile(
//!     &ADDRESS,
//!     &ContainerSelection::folder("Network-Objects"),
//!     &ResourceKey::name("web-server"),
//!     &desired,
//!     DesiredState::Present,
//!     false,
//! );
//!
//! println!("changed: {}", outcome.changed);
//! ```
//!
//! ## Failure model
//!
//! Reconciliation never panics and never retries on its own. Failures come
//! back inside the outcome as an [`ErrorDescriptor`] whose `retryable` flag
//! tells the caller whether repeating the call may help; see [`retry`] for
//! an opt-in policy.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod backend;
pub mod container;
pub mod desired;
pub mod diff;
pub mod error;
pub mod locator;
pub mod reconcile;
pub mod resource;
pub mod retry;
pub mod types;

pub use container::{Container, ContainerSelection};
pub use desired::{DesiredSpec, FieldValue};
pub use error::{Error, ErrorDescriptor, ErrorKind, Result};
pub use resource::ResourceType;
pub use types::{
    Action, ClientConfig, Credentials, DesiredState, ExistingResource, ListQuery, Page,
    ReconciliationOutcome, ResourceKey, RetryConfig, Token,
};

use auth::{Clock, TokenAuthenticator, TokenEndpoint};
use backend::Backend;
pub use backend::MockBackend;
use backend::http::{HttpBackend, HttpTokenEndpoint};
use reconcile::{ReconcileRequest, Reconciler};

/// High-level client owning the token state for one automation run.
///
/// # Example
///
/// ```
/// use scmkit::auth::MockTokenEndpoint;
/// use scmkit::resource::ADDRESS;
/// use scmkit::{Client, ClientConfig, ContainerSelection, Credentials, DesiredSpec, DesiredState, MockBackend, ResourceKey};
///
/// let backend = MockBackend::new();
/// let mut client = Client::with_backend(
///     Credentials::new("id", "secret", "1234567890"),
///     ClientConfig::default(),
///     Box::new(backend.clone()),
///     Box::new(MockTokenEndpoint::new()),
/// );
///
/// let desired = DesiredSpec::new().with("ip_netmask", "10.1.1.0/24");
/// let folder = ContainerSelection::folder("Network-Objects");
/// let key = ResourceKey::name("web-server");
///
/// let first = client.reconcile(&ADDRESS, &folder, &key, &desired, DesiredState::Present, false);
/// let second = client.reconcile(&ADDRESS, &folder, &key, &desired, DesiredState::Present, false);
/// assert!(first.changed);
/// assert!(!second.changed);
/// ```
pub struct Client {
    backend: Box<dyn Backend>,
    authenticator: TokenAuthenticator,
    credentials: Credentials,
    config: ClientConfig,
}

impl Client {
    /// Create a client talking HTTP to the configured endpoints.
    #[must_use]
    pub fn new(credentials: Credentials, config: ClientConfig) -> Self {
        let backend = HttpBackend::new(config.api_base.clone(), config.timeout);
        let endpoint = HttpTokenEndpoint::new(config.token_url.clone(), config.timeout);
        Self::with_backend(credentials, config, Box::new(backend), Box::new(endpoint))
    }

    /// Create a client with custom backends (useful for testing).
    #[must_use]
    pub fn with_backend(
        credentials: Credentials,
        config: ClientConfig,
        backend: Box<dyn Backend>,
        endpoint: Box<dyn TokenEndpoint>,
    ) -> Self {
        let authenticator = TokenAuthenticator::new(endpoint, config.token_margin);
        Self {
            backend,
            authenticator,
            credentials,
            config,
        }
    }

    /// Replace the clock used for token expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.authenticator = self.authenticator.with_clock(clock);
        self
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Converge one resource toward its desired state.
    ///
    /// Never returns an error directly: failures are reported in
    /// [`ReconciliationOutcome::error`] with `changed == false`.
    pub fn reconcile(
        &mut self,
        resource: &ResourceType,
        container: &ContainerSelection,
        key: &ResourceKey,
        desired: &DesiredSpec,
        state: DesiredState,
        dry_run: bool,
    ) -> ReconciliationOutcome {
        let request = ReconcileRequest {
            resource,
            container,
            key,
            desired,
            state,
            dry_run,
        };
        self.reconcile_request(&request)
    }

    /// [`Client::reconcile`] taking a prepared request.
    pub fn reconcile_request(&mut self, request: &ReconcileRequest<'_>) -> ReconciliationOutcome {
        self.reconciler().run(request)
    }

    /// Look up a resource without changing anything.
    pub fn locate(
        &mut self,
        resource: &ResourceType,
        container: &ContainerSelection,
        key: &ResourceKey,
    ) -> Result<Option<ExistingResource>> {
        let container = container::validate(container)?;
        self.reconciler().locate(resource, &container, key)
    }

    fn reconciler(&mut self) -> Reconciler<'_> {
        Reconciler::new(
            self.backend.as_ref(),
            &mut self.authenticator,
            &self.credentials,
            &self.config,
        )
    }

    // =========================================================================
    // Token
    // =========================================================================

    /// Return a valid token, exchanging credentials if needed.
    pub fn ensure_valid_token(&mut self) -> Result<Token> {
        self.authenticator.ensure_valid_token(&self.credentials)
    }

    /// Install a token cached by the caller.
    pub fn seed_token(&mut self, token: Token) {
        self.authenticator.seed(token);
    }

    /// Currently held token, if any.
    #[must_use]
    pub fn token(&self) -> Option<&Token> {
        self.authenticator.store().token()
    }

    /// Number of credential exchanges performed by this client.
    #[must_use]
    pub fn token_refreshes(&self) -> usize {
        self.authenticator.refresh_count()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("credentials", &self.credentials)
            .field("config", &self.config)
            .field("authenticator", &self.authenticator)
            .finish_non_exhaustive()
    }
}
