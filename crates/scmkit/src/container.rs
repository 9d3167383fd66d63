//! Container selection.
//!
//! Every resource lives in exactly one container: a folder, a snippet or a
//! device. Callers hand in a [`ContainerSelection`] with optional members;
//! [`validate`] turns it into a [`Container`] before any request is made.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field names used for containers, in both filters and documents.
pub const CONTAINER_FIELDS: [&str; 3] = ["folder", "snippet", "device"];

/// Raw, unvalidated container input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSelection {
    /// Folder name.
    #[serde(default)]
    pub folder: Option<String>,
    /// Snippet name.
    #[serde(default)]
    pub snippet: Option<String>,
    /// Device name.
    #[serde(default)]
    pub device: Option<String>,
}

impl ContainerSelection {
    /// Selection naming only a folder.
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            folder: Some(name.into()),
            ..Self::default()
        }
    }

    /// Selection naming only a snippet.
    pub fn snippet(name: impl Into<String>) -> Self {
        Self {
            snippet: Some(name.into()),
            ..Self::default()
        }
    }

    /// Selection naming only a device.
    pub fn device(name: impl Into<String>) -> Self {
        Self {
            device: Some(name.into()),
            ..Self::default()
        }
    }
}

/// A validated container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// Folder scope.
    Folder(String),
    /// Snippet scope.
    Snippet(String),
    /// Device scope.
    Device(String),
}

impl Container {
    /// Container kind, which is also the field name used by the API.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Folder(_) => "folder",
            Self::Snippet(_) => "snippet",
            Self::Device(_) => "device",
        }
    }

    /// Container name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Folder(name) | Self::Snippet(name) | Self::Device(name) => name,
        }
    }

    /// Key/value pair used as list filter and as the create payload field.
    #[must_use]
    pub fn query_param(&self) -> (&'static str, &str) {
        (self.kind(), self.name())
    }

    /// Whether a listed document belongs to this container.
    ///
    /// Documents that carry no container field are accepted as scoped by the
    /// server. Documents naming another container (objects inherited from a
    /// parent folder, or from another kind of container) are not.
    #[must_use]
    pub fn owns(&self, document: &Map<String, Value>) -> bool {
        let mut declared = CONTAINER_FIELDS
            .iter()
            .filter_map(|field| document.get(*field).and_then(Value::as_str).map(|v| (*field, v)))
            .peekable();

        if declared.peek().is_none() {
            return true;
        }
        declared.any(|(field, value)| field == self.kind() && value == self.name())
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.name())
    }
}

/// Validate that exactly one container member is supplied.
///
/// Empty or whitespace-only members count as not supplied. This check is
/// pure and must run before any network call.
pub fn validate(selection: &ContainerSelection) -> Result<Container> {
    let supplied: Vec<(&'static str, &str)> = [
        ("folder", selection.folder.as_deref()),
        ("snippet", selection.snippet.as_deref()),
        ("device", selection.device.as_deref()),
    ]
    .into_iter()
    .filter_map(|(kind, value)| {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| (kind, v))
    })
    .collect();

    match supplied.as_slice() {
        [] => Err(Error::MissingContainer),
        [("folder", name)] => Ok(Container::Folder((*name).to_string())),
        [("snippet", name)] => Ok(Container::Snippet((*name).to_string())),
        [(_, name)] => Ok(Container::Device((*name).to_string())),
        many => Err(Error::AmbiguousContainer {
            supplied: many.iter().map(|(kind, _)| *kind).collect(),
        }),
    }
}
