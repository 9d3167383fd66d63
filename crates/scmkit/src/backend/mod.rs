//! Backend traits and implementations for the resource API.
//!
//! The reconciler never talks HTTP directly. It drives a [`Backend`], which
//! exposes the five capabilities every resource collection shares. The
//! production implementation is [`http::HttpBackend`].
//!
//! # Testing
//!
//! Use [`MockBackend`] for testing without network access:
//!
//! ```
//! use scmkit::backend::{Backend, MockBackend, Operation};
//! use scmkit::resource::ADDRESS;
//! use scmkit::{Container, ListQuery};
//! use serde_json::json;
//!
//! let mock = MockBackend::new();
//! mock.insert(&ADDRESS, json!({"name": "web", "folder": "Texas"}));
//!
//! let container = Container::Folder("Texas".to_string());
//! let page = mock
//!     .list("Bearer t", &ADDRESS, &container, &ListQuery::new(200).name("web"))
//!     .unwrap();
//! assert_eq!(page.items.len(), 1);
//! assert_eq!(mock.calls(Operation::List), 1);
//! ```

pub mod http;

use crate::container::{CONTAINER_FIELDS, Container};
use crate::error::{Error, Result};
use crate::resource::ResourceType;
use crate::types::{ListQuery, Page};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Capabilities of a resource collection.
///
/// Every call receives the `Authorization` header value so that the caller,
/// not the backend, owns the token lifecycle.
pub trait Backend: Send + Sync {
    /// Fetch one resource by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no resource has this id.
    fn get(&self, auth: &str, resource: &ResourceType, id: &str) -> Result<Value>;

    /// Fetch one page of the resources scoped to `container`.
    fn list(
        &self,
        auth: &str,
        resource: &ResourceType,
        container: &Container,
        query: &ListQuery,
    ) -> Result<Page>;

    /// Create a resource and return the stored document.
    fn create(&self, auth: &str, resource: &ResourceType, body: &Map<String, Value>)
    -> Result<Value>;

    /// Replace a resource and return the stored document.
    fn update(
        &self,
        auth: &str,
        resource: &ResourceType,
        id: &str,
        body: &Map<String, Value>,
    ) -> Result<Value>;

    /// Delete a resource.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no resource has this id.
    fn delete(&self, auth: &str, resource: &ResourceType, id: &str) -> Result<()>;
}

/// Backend capability, used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`Backend::get`]
    Get,
    /// [`Backend::list`]
    List,
    /// [`Backend::create`]
    Create,
    /// [`Backend::update`]
    Update,
    /// [`Backend::delete`]
    Delete,
}

impl Operation {
    /// Whether the operation mutates remote state.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Mock backend
// =============================================================================

#[derive(Debug, Default)]
struct MockState {
    objects: HashMap<&'static str, Vec<Map<String, Value>>>,
    next_id: u64,
    calls: HashMap<Operation, usize>,
    failures: HashMap<Operation, Error>,
    page_size: Option<u64>,
    ignore_name_filter: bool,
    cursors: bool,
    inherited_folder: Option<String>,
    last_auth: Option<String>,
}

impl MockState {
    fn record(&mut self, op: Operation, auth: &str) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        self.last_auth = Some(auth.to_string());
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn collection(&mut self, resource: &ResourceType) -> &mut Vec<Map<String, Value>> {
        self.objects.entry(resource.path).or_default()
    }

    fn visible_in(&self, document: &Map<String, Value>, container: &Container) -> bool {
        let (kind, name) = container.query_param();
        let field = |f: &str| document.get(f).and_then(Value::as_str);
        if field(kind) == Some(name) {
            return true;
        }
        matches!(
            (container, &self.inherited_folder, field("folder")),
            (Container::Folder(_), Some(parent), Some(folder)) if parent == folder
        )
    }
}

/// In-memory backend for testing without network access.
///
/// Clones share state, so a test can keep a handle while a
/// [`crate::Client`] owns another and then inspect call counters.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document directly, assigning an id if it has none.
    ///
    /// Returns the document's id. Does not count as a call.
    pub fn insert(&self, resource: &ResourceType, document: Value) -> String {
        let mut state = self.state.lock().unwrap();
        let mut fields = match document {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let id = match fields.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                state.next_id += 1;
                let id = mock_id(state.next_id);
                fields.insert("id".to_string(), Value::from(id.clone()));
                id
            }
        };
        state.collection(resource).push(fields);
        id
    }

    /// Snapshot of every stored document of a type.
    #[must_use]
    pub fn objects(&self, resource: &ResourceType) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(resource.path)
            .map(|docs| docs.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Number of calls made for an operation, including failed ones.
    #[must_use]
    pub fn calls(&self, op: Operation) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of calls made across all operations.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.values().sum()
    }

    /// Number of create, update and delete calls.
    #[must_use]
    pub fn mutation_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .calls
            .iter()
            .filter(|(op, _)| op.is_mutation())
            .map(|(_, n)| n)
            .sum()
    }

    /// Reset call counters.
    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Make every call of `op` fail with `err` until cleared.
    pub fn fail_on(&self, op: Operation, err: Error) {
        self.state.lock().unwrap().failures.insert(op, err);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Cap the page size below whatever the caller asks for.
    pub fn set_page_size(&self, size: u64) {
        self.state.lock().unwrap().page_size = Some(size.max(1));
    }

    /// Ignore the `name` list filter, like an API that filters loosely.
    pub fn ignore_name_filter(&self) {
        self.state.lock().unwrap().ignore_name_filter = true;
    }

    /// Paginate with opaque cursors instead of offset/total.
    pub fn use_cursors(&self) {
        self.state.lock().unwrap().cursors = true;
    }

    /// Also list documents of `folder` when listing any folder.
    pub fn inherit_from(&self, folder: impl Into<String>) {
        self.state.lock().unwrap().inherited_folder = Some(folder.into());
    }

    /// `Authorization` value of the most recent call.
    #[must_use]
    pub fn last_authorization(&self) -> Option<String> {
        self.state.lock().unwrap().last_auth.clone()
    }
}

fn mock_id(n: u64) -> String {
    format!("00000000-0000-4000-8000-{n:012}")
}

fn not_found(id: &str) -> Error {
    let body = serde_json::json!({
        "_errors": [{
            "code": "E005",
            "message": "Object Not Present",
            "details": {"errorType": "Object Not Present", "id": id}
        }],
        "_request_id": "mock"
    });
    Error::from_response(404, &body.to_string())
}

fn name_not_unique(name: &str) -> Error {
    let body = serde_json::json!({
        "_errors": [{
            "code": "E006",
            "message": "Name Not Unique",
            "details": {"errorType": "Object Already Exists", "name": name}
        }],
        "_request_id": "mock"
    });
    Error::from_response(400, &body.to_string())
}

impl Backend for MockBackend {
    fn get(&self, auth: &str, resource: &ResourceType, id: &str) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.record(Operation::Get, auth)?;
        state
            .collection(resource)
            .iter()
            .find(|doc| doc.get("id").and_then(Value::as_str) == Some(id))
            .cloned()
            .map(Value::Object)
            .ok_or_else(|| not_found(id))
    }

    fn list(
        &self,
        auth: &str,
        resource: &ResourceType,
        container: &Container,
        query: &ListQuery,
    ) -> Result<Page> {
        let mut state = self.state.lock().unwrap();
        state.record(Operation::List, auth)?;

        let filter_name = if state.ignore_name_filter {
            None
        } else {
            query.name.as_deref()
        };
        let docs = state.objects.get(resource.path).cloned().unwrap_or_default();
        let scoped: Vec<Value> = docs
            .into_iter()
            .filter(|doc| state.visible_in(doc, container))
            .filter(|doc| {
                filter_name.is_none_or(|name| doc.get("name").and_then(Value::as_str) == Some(name))
            })
            .map(Value::Object)
            .collect();

        let limit = state.page_size.map_or(query.limit, |cap| cap.min(query.limit)).max(1);
        let start = match (&query.cursor, state.cursors) {
            (Some(cursor), true) => cursor.parse::<u64>().unwrap_or(0),
            _ => query.offset,
        };
        let len = scoped.len() as u64;
        let end = (start + limit).min(len);
        let items = if start < len {
            scoped[start as usize..end as usize].to_vec()
        } else {
            Vec::new()
        };

        if state.cursors {
            Ok(Page {
                items,
                total: None,
                offset: start,
                limit,
                cursor: (end < len).then(|| end.to_string()),
            })
        } else {
            Ok(Page {
                items,
                total: Some(len),
                offset: start,
                limit,
                cursor: None,
            })
        }
    }

    fn create(
        &self,
        auth: &str,
        resource: &ResourceType,
        body: &Map<String, Value>,
    ) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.record(Operation::Create, auth)?;

        let name = body.get("name").and_then(Value::as_str).unwrap_or_default();
        let same_container = |doc: &Map<String, Value>| {
            CONTAINER_FIELDS
                .iter()
                .all(|field| doc.get(*field) == body.get(*field))
        };
        let duplicate = state.collection(resource).iter().any(|doc| {
            doc.get("name").and_then(Value::as_str) == Some(name) && same_container(doc)
        });
        if duplicate {
            return Err(name_not_unique(name));
        }

        state.next_id += 1;
        let mut stored = body.clone();
        stored.insert("id".to_string(), Value::from(mock_id(state.next_id)));
        state.collection(resource).push(stored.clone());
        Ok(Value::Object(stored))
    }

    fn update(
        &self,
        auth: &str,
        resource: &ResourceType,
        id: &str,
        body: &Map<String, Value>,
    ) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.record(Operation::Update, auth)?;

        let doc = state
            .collection(resource)
            .iter_mut()
            .find(|doc| doc.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| not_found(id))?;
        let mut stored = body.clone();
        stored.insert("id".to_string(), Value::from(id));
        for field in CONTAINER_FIELDS {
            if let Some(value) = doc.get(field) {
                stored.entry(field).or_insert_with(|| value.clone());
            }
        }
        *doc = stored.clone();
        Ok(Value::Object(stored))
    }

    fn delete(&self, auth: &str, resource: &ResourceType, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(Operation::Delete, auth)?;

        let docs = state.collection(resource);
        let before = docs.len();
        docs.retain(|doc| doc.get("id").and_then(Value::as_str) != Some(id));
        if docs.len() == before {
            return Err(not_found(id));
        }
        Ok(())
    }
}
