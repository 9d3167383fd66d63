//! Finding the single resource addressed by a container and a key.

use crate::backend::Backend;
use crate::container::Container;
use crate::error::{Error, ErrorKind, Result};
use crate::resource::ResourceType;
use crate::types::{ExistingResource, ListQuery, Page, ResourceKey};
use serde_json::{Map, Value};

/// Read-side lookup over a [`Backend`].
pub struct Locator<'a> {
    backend: &'a dyn Backend,
    page_limit: u64,
    max_pages: usize,
}

impl<'a> Locator<'a> {
    /// Locator requesting `page_limit` entries per page and walking at most
    /// `max_pages` pages.
    pub fn new(backend: &'a dyn Backend, page_limit: u64, max_pages: usize) -> Self {
        Self {
            backend,
            page_limit: page_limit.max(1),
            max_pages: max_pages.max(1),
        }
    }

    /// Find the resource identified by `key` inside `container`.
    ///
    /// Returns `Ok(None)` when it does not exist there.
    pub fn find(
        &self,
        auth: &str,
        resource: &ResourceType,
        container: &Container,
        key: &ResourceKey,
    ) -> Result<Option<ExistingResource>> {
        match key {
            ResourceKey::Id(id) => self.find_by_id(auth, resource, container, id),
            ResourceKey::Name(name) => self.find_by_name(auth, resource, container, name),
        }
    }

    fn find_by_id(
        &self,
        auth: &str,
        resource: &ResourceType,
        container: &Container,
        id: &str,
    ) -> Result<Option<ExistingResource>> {
        log::debug!("looking up {resource} id {id} in {container}");
        let document = match self.backend.get(auth, resource, id) {
            Ok(document) => document,
            Err(err) if err.category() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        let existing = ExistingResource::from_value(document)?;
        if !container.owns(&existing.fields) {
            log::warn!("{resource} id {id} exists outside {container}, treating as absent");
            return Ok(None);
        }
        Ok(Some(existing))
    }

    fn find_by_name(
        &self,
        auth: &str,
        resource: &ResourceType,
        container: &Container,
        name: &str,
    ) -> Result<Option<ExistingResource>> {
        log::debug!("looking up {resource} '{name}' in {container}");
        let mut query = ListQuery::new(self.page_limit).name(name);
        let mut matches: Vec<ExistingResource> = Vec::new();

        for page_number in 1..=self.max_pages {
            let page = self.backend.list(auth, resource, container, &query)?;
            log::trace!(
                "page {page_number}: {} entries (offset {}, total {:?})",
                page.items.len(),
                page.offset,
                page.total
            );

            for item in &page.items {
                let Value::Object(fields) = item else {
                    return Err(Error::data_integrity(
                        format!("{resource} list returned a non-object entry"),
                        Map::new(),
                    ));
                };
                if fields.get("name").and_then(Value::as_str) != Some(name) {
                    continue;
                }
                if !container.owns(fields) {
                    log::warn!(
                        "skipping {resource} '{name}' inherited from outside {container}"
                    );
                    continue;
                }
                matches.push(ExistingResource::from_map(fields.clone())?);
            }

            // keep walking after a hit so a duplicate on a later page is seen
            match next_query(&query, &page) {
                Some(next) => query = next,
                None if matches.is_empty() => return Ok(None),
                None => return single_match(resource, container, name, matches),
            }
        }

        if !matches.is_empty() {
            log::warn!(
                "stopped after {} pages looking for {resource} '{name}', more entries may follow",
                self.max_pages
            );
            return single_match(resource, container, name, matches);
        }

        let mut details = Map::new();
        details.insert("max_pages".to_string(), Value::from(self.max_pages));
        details.insert("name".to_string(), Value::from(name));
        Err(Error::Unknown {
            message: format!(
                "gave up looking for {resource} '{name}' in {container} after {} pages",
                self.max_pages
            ),
            details,
        })
    }
}

fn single_match(
    resource: &ResourceType,
    container: &Container,
    name: &str,
    mut matches: Vec<ExistingResource>,
) -> Result<Option<ExistingResource>> {
    if matches.len() == 1 {
        return Ok(matches.pop());
    }

    let ids: Vec<Value> = matches.iter().map(|m| Value::from(m.id.clone())).collect();
    let mut details = Map::new();
    details.insert("name".to_string(), Value::from(name));
    details.insert(container.kind().to_string(), Value::from(container.name()));
    details.insert("ids".to_string(), Value::Array(ids));
    Err(Error::data_integrity(
        format!(
            "{} {resource} objects named '{name}' in {container}",
            matches.len()
        ),
        details,
    ))
}

/// Query for the page after `page`, or `None` once the set is exhausted.
fn next_query(query: &ListQuery, page: &Page) -> Option<ListQuery> {
    if let Some(cursor) = &page.cursor {
        if query.cursor.as_ref() == Some(cursor) {
            return None;
        }
        let mut next = query.clone();
        next.cursor = Some(cursor.clone());
        return Some(next);
    }
    if query.cursor.is_some() {
        return None;
    }

    let received = page.items.len() as u64;
    if received == 0 {
        return None;
    }
    let next_offset = page.offset.max(query.offset) + received;
    match page.total {
        Some(total) if next_offset >= total => return None,
        None if received < query.limit.min(effective_limit(page, query)) => return None,
        _ => {}
    }

    let mut next = query.clone();
    next.offset = next_offset;
    Some(next)
}

/// Page size the server actually applied.
fn effective_limit(page: &Page, query: &ListQuery) -> u64 {
    if page.limit == 0 {
        query.limit
    } else {
        page.limit
    }
}
