//! HTTP implementations of [`Backend`] and [`TokenEndpoint`].
//!
//! Both use a blocking `ureq` agent configured so that non-2xx statuses are
//! returned as responses instead of errors; the body is then handed to the
//! error translator, which keeps the server's own message and codes.

use crate::auth::{TokenEndpoint, TokenResponse};
use crate::backend::Backend;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::resource::ResourceType;
use crate::types::{Credentials, ListQuery, Page};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

const USER_AGENT: &str = concat!("scmkit/", env!("CARGO_PKG_VERSION"));

type Response = ureq::http::Response<ureq::Body>;

/// Build an agent with a global timeout that leaves status handling to us.
fn agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(config)
}

/// Read the body of any response, returning the status alongside.
fn read_body(mut response: Response) -> Result<(u16, String)> {
    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string()?;
    Ok((status, body))
}

/// Parse a 2xx body as JSON, or translate the failure.
fn json_or_error(response: Response) -> Result<Value> {
    let (status, body) = read_body(response)?;
    if !(200..300).contains(&status) {
        return Err(Error::from_response(status, &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| malformed(status, &body, &e))
}

fn malformed(status: u16, body: &str, err: &serde_json::Error) -> Error {
    let mut details = Map::new();
    details.insert("status".to_string(), Value::from(status));
    details.insert("body".to_string(), Value::from(body));
    Error::Unknown {
        message: format!("invalid API response: {err}"),
        details,
    }
}

// =============================================================================
// Resource API
// =============================================================================

/// Resource API backend.
///
/// # Example
///
/// ```no_run
/// use scmkit::backend::http::HttpBackend;
/// use scmkit::backend::Backend;
/// use scmkit::resource::ADDRESS;
/// use std::time::Duration;
///
/// let backend = HttpBackend::new("https://api.strata.paloaltonetworks.com", Duration::from_secs(30));
/// let address = backend.get("Bearer <token>", &ADDRESS, "b7b8d8b0-0000-0000-0000-000000000000");
/// ```
pub struct HttpBackend {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// API base URL without trailing slash.
    api_base: String,
}

impl HttpBackend {
    /// Create a backend for `api_base`.
    #[must_use]
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: agent(timeout),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the current API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn collection_url(&self, resource: &ResourceType) -> String {
        format!("{}{}", self.api_base, resource.path)
    }

    fn item_url(&self, resource: &ResourceType, id: &str) -> String {
        format!("{}{}/{}", self.api_base, resource.path, id)
    }
}

impl Backend for HttpBackend {
    fn get(&self, auth: &str, resource: &ResourceType, id: &str) -> Result<Value> {
        let url = self.item_url(resource, id);
        log::trace!("GET {url}");

        let response = self
            .agent
            .get(&url)
            .header("Authorization", auth)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .call()?;

        json_or_error(response)
    }

    fn list(
        &self,
        auth: &str,
        resource: &ResourceType,
        container: &Container,
        query: &ListQuery,
    ) -> Result<Page> {
        let url = self.collection_url(resource);
        let (kind, name) = container.query_param();
        log::trace!("GET {url}?{kind}={name} offset={} limit={}", query.offset, query.limit);

        let mut request = self
            .agent
            .get(&url)
            .header("Authorization", auth)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .query(kind, name)
            .query("offset", query.offset.to_string())
            .query("limit", query.limit.to_string());
        if let Some(name) = &query.name {
            request = request.query("name", name);
        }
        if let Some(cursor) = &query.cursor {
            request = request.query("cursor", cursor);
        }

        let body = json_or_error(request.call()?)?;
        let list: ListResponse = serde_json::from_value(body)?;
        Ok(list.into_page(query))
    }

    fn create(
        &self,
        auth: &str,
        resource: &ResourceType,
        body: &Map<String, Value>,
    ) -> Result<Value> {
        let url = self.collection_url(resource);
        log::trace!("POST {url}");

        let response = self
            .agent
            .post(&url)
            .header("Authorization", auth)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send_json(body)?;

        json_or_error(response)
    }

    fn update(
        &self,
        auth: &str,
        resource: &ResourceType,
        id: &str,
        body: &Map<String, Value>,
    ) -> Result<Value> {
        let url = self.item_url(resource, id);
        log::trace!("PUT {url}");

        let response = self
            .agent
            .put(&url)
            .header("Authorization", auth)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send_json(body)?;

        json_or_error(response)
    }

    fn delete(&self, auth: &str, resource: &ResourceType, id: &str) -> Result<()> {
        let url = self.item_url(resource, id);
        log::trace!("DELETE {url}");

        let response = self
            .agent
            .delete(&url)
            .header("Authorization", auth)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .call()?;

        json_or_error(response).map(|_| ())
    }
}

// =============================================================================
// Identity endpoint
// =============================================================================

/// OAuth2 client-credentials endpoint.
pub struct HttpTokenEndpoint {
    agent: ureq::Agent,
    token_url: String,
}

impl HttpTokenEndpoint {
    /// Create an endpoint for `token_url`.
    #[must_use]
    pub fn new(token_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: agent(timeout),
            token_url: token_url.into(),
        }
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn exchange(&self, credentials: &Credentials) -> Result<TokenResponse> {
        let scope = credentials.scope();
        let response = self
            .agent
            .post(&self.token_url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send_form([
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id()),
                ("client_secret", credentials.client_secret()),
                ("scope", scope.as_str()),
            ])?;

        let (status, body) = read_body(response)?;
        if !(200..300).contains(&status) {
            return Err(Error::from_token_response(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| malformed(status, &body, &e))
    }
}

// =============================================================================
// API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    offset: Option<u64>,
    #[serde(default)]
    limit: Option<u64>,
    #[serde(default)]
    cursor: Option<String>,
}

impl ListResponse {
    fn into_page(self, query: &ListQuery) -> Page {
        Page {
            items: self.data,
            total: self.total,
            offset: self.offset.unwrap_or(query.offset),
            limit: self.limit.unwrap_or(0),
            cursor: self.cursor.filter(|c| !c.is_empty()),
        }
    }
}
