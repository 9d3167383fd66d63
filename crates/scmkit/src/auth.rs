//! Bearer token lifecycle.
//!
//! [`TokenAuthenticator`] owns the single piece of state that outlives a
//! reconciliation: the current access token. Before every network call the
//! reconciler asks it for a valid token, and it performs a synchronous
//! client-credentials exchange when none is held or the held one is inside
//! the safety margin.
//!
//! # Testing
//!
//! [`MockTokenEndpoint`] counts exchanges and [`ManualClock`] moves time by
//! hand, which makes the refresh boundary deterministic:
//!
//! ```
//! use scmkit::auth::{ManualClock, MockTokenEndpoint, TokenAuthenticator};
//! use scmkit::Credentials;
//! use std::time::Duration;
//!
//! let endpoint = MockTokenEndpoint::new().with_expires_in(900);
//! let clock = ManualClock::default();
//! let mut auth = TokenAuthenticator::new(Box::new(endpoint.clone()), Duration::from_secs(300))
//!     .with_clock(Box::new(clock.clone()));
//! let creds = Credentials::new("id", "secret", "1234567890");
//!
//! auth.ensure_valid_token(&creds).unwrap();
//! clock.advance(Duration::from_secs(60));
//! auth.ensure_valid_token(&creds).unwrap();
//! assert_eq!(endpoint.exchanges(), 1);
//! ```

use crate::error::{Error, Result};
use crate::types::{Credentials, Token};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Clock
// =============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Clock frozen at `at`.
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(at)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
    }

    /// Jump to an instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc.timestamp_opt(1_767_225_600, 0).single().unwrap_or_default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// =============================================================================
// Token endpoint
// =============================================================================

/// Successful response of the identity endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// Opaque access token.
    pub access_token: String,
    /// Token type.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds from issue.
    pub expires_in: u64,
    /// Granted scope.
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    /// Convert into a [`Token`] issued at `issued_at`.
    #[must_use]
    pub fn into_token(self, issued_at: DateTime<Utc>) -> Token {
        let lifetime = i64::try_from(self.expires_in)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Token {
            access_token: self.access_token,
            token_type: self.token_type,
            expires_at: issued_at
                .checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            scope: self.scope,
        }
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"********")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Identity endpoint performing the client-credentials exchange.
pub trait TokenEndpoint: Send + Sync {
    /// Exchange credentials for an access token.
    ///
    /// # Errors
    ///
    /// Returns `Error::AuthRejected` when the endpoint refuses the
    /// credentials and `Error::Transport` when it cannot be reached.
    fn exchange(&self, credentials: &Credentials) -> Result<TokenResponse>;
}

#[derive(Debug)]
struct MockTokenState {
    exchanges: usize,
    expires_in: u64,
    failure: Option<Error>,
    last_scope: Option<String>,
}

/// In-memory identity endpoint for tests. Clones share state.
#[derive(Debug, Clone)]
pub struct MockTokenEndpoint {
    state: Arc<Mutex<MockTokenState>>,
}

impl MockTokenEndpoint {
    /// Endpoint issuing 15-minute tokens.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockTokenState {
                exchanges: 0,
                expires_in: 900,
                failure: None,
                last_scope: None,
            })),
        }
    }

    /// Set the lifetime of issued tokens.
    #[must_use]
    pub fn with_expires_in(self, seconds: u64) -> Self {
        self.state.lock().unwrap().expires_in = seconds;
        self
    }

    /// Number of exchanges attempted, including failed ones.
    #[must_use]
    pub fn exchanges(&self) -> usize {
        self.state.lock().unwrap().exchanges
    }

    /// Fail every exchange with `err` until cleared.
    pub fn fail_with(&self, err: Error) {
        self.state.lock().unwrap().failure = Some(err);
    }

    /// Stop failing.
    pub fn clear_failure(&self) {
        self.state.lock().unwrap().failure = None;
    }

    /// Scope sent with the most recent exchange.
    #[must_use]
    pub fn last_scope(&self) -> Option<String> {
        self.state.lock().unwrap().last_scope.clone()
    }
}

impl Default for MockTokenEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEndpoint for MockTokenEndpoint {
    fn exchange(&self, credentials: &Credentials) -> Result<TokenResponse> {
        let mut state = self.state.lock().unwrap();
        state.exchanges += 1;
        state.last_scope = Some(credentials.scope());
        if let Some(err) = &state.failure {
            return Err(err.clone());
        }
        Ok(TokenResponse {
            access_token: format!("mock-token-{}", state.exchanges),
            token_type: default_token_type(),
            expires_in: state.expires_in,
            scope: Some(credentials.scope()),
        })
    }
}

// =============================================================================
// Token store
// =============================================================================

/// Holder of the current token.
#[derive(Debug, Clone)]
pub struct TokenStore {
    token: Option<Token>,
    safety_margin: Duration,
    lifetime: Option<Duration>,
}

impl TokenStore {
    /// Empty store refreshing `safety_margin` before expiry.
    #[must_use]
    pub fn new(safety_margin: Duration) -> Self {
        Self {
            token: None,
            safety_margin,
            lifetime: None,
        }
    }

    /// Whether a new token is needed at `now`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        let Some(token) = &self.token else {
            return true;
        };
        let margin = TimeDelta::from_std(self.effective_margin()).unwrap_or(TimeDelta::MAX);
        match token.expires_at.checked_sub_signed(margin) {
            Some(deadline) => now >= deadline,
            None => true,
        }
    }

    /// Current token, valid or not.
    #[must_use]
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// `Authorization` header value for the current token.
    #[must_use]
    pub fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(Token::authorization)
    }

    /// Install a token obtained elsewhere, such as a caller-side cache.
    pub fn seed(&mut self, token: Token) {
        self.token = Some(token);
        self.lifetime = None;
    }

    /// Install a token just issued for `lifetime`.
    pub fn install(&mut self, token: Token, lifetime: Duration) {
        self.token = Some(token);
        self.lifetime = Some(lifetime);
    }

    /// Forget the current token.
    pub fn clear(&mut self) {
        self.token = None;
        self.lifetime = None;
    }

    /// Margin applied to the current token.
    ///
    /// Capped at half the lifetime of a token issued by this store, so a
    /// short-lived token is still reused for a while.
    #[must_use]
    pub fn effective_margin(&self) -> Duration {
        match self.lifetime {
            Some(lifetime) => self.safety_margin.min(lifetime / 2),
            None => self.safety_margin,
        }
    }

    /// Configured safety margin.
    #[must_use]
    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }
}

// =============================================================================
// Authenticator
// =============================================================================

/// Keeps a valid bearer token, refreshing through a [`TokenEndpoint`].
pub struct TokenAuthenticator {
    endpoint: Box<dyn TokenEndpoint>,
    clock: Box<dyn Clock>,
    store: TokenStore,
    refreshes: usize,
}

impl TokenAuthenticator {
    /// Authenticator on the system clock.
    #[must_use]
    pub fn new(endpoint: Box<dyn TokenEndpoint>, safety_margin: Duration) -> Self {
        Self {
            endpoint,
            clock: Box::new(SystemClock),
            store: TokenStore::new(safety_margin),
            refreshes: 0,
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Return a token valid beyond the safety margin, refreshing if needed.
    pub fn ensure_valid_token(&mut self, credentials: &Credentials) -> Result<Token> {
        let now = self.clock.now();
        if !self.store.needs_refresh(now)
            && let Some(token) = self.store.token()
        {
            log::trace!("reusing access token, {}s left", token.remaining(now).as_secs());
            return Ok(token.clone());
        }
        self.refresh(credentials)
    }

    /// Exchange credentials for a new token unconditionally.
    ///
    /// On failure the previously held token, if any, is kept.
    pub fn refresh(&mut self, credentials: &Credentials) -> Result<Token> {
        log::debug!(
            "requesting access token for client {} (scope {})",
            credentials.client_id(),
            credentials.scope()
        );
        let response = self.endpoint.exchange(credentials)?;
        if response.access_token.is_empty() {
            return Err(Error::unknown("identity endpoint returned an empty access_token"));
        }

        let lifetime = Duration::from_secs(response.expires_in);
        if lifetime <= self.store.safety_margin() {
            log::warn!(
                "access token lifetime {}s is within the {}s refresh margin, refreshing at half its lifetime instead",
                lifetime.as_secs(),
                self.store.safety_margin().as_secs()
            );
        }

        let token = response.into_token(self.clock.now());
        log::debug!("access token valid until {}", token.expires_at);
        self.store.install(token.clone(), lifetime);
        self.refreshes += 1;
        Ok(token)
    }

    /// Number of successful exchanges made by this authenticator.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.refreshes
    }

    /// Token store, for inspection.
    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Install a previously cached token.
    pub fn seed(&mut self, token: Token) {
        self.store.seed(token);
    }

    /// Current time according to this authenticator's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("store", &self.store)
            .field("refreshes", &self.refreshes)
            .finish_non_exhaustive()
    }
}
