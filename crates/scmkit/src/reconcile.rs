//! The idempotent reconciliation algorithm.
//!
//! One call converges one resource toward its desired state:
//!
//! 1. validate the container (no I/O)
//! 2. make sure a valid token is held
//! 3. locate the existing resource
//! 4. [`plan`] the action from (existing, desired state, diff)
//! 5. in dry-run, stop and report what would happen
//! 6. confirm the token again and issue the single mutating call
//!
//! Nothing is retried here. Callers wanting retries wrap the whole call with
//! [`crate::retry::reconcile_with_retry`]; re-running is safe because every
//! call re-locates.

use crate::auth::TokenAuthenticator;
use crate::backend::Backend;
use crate::container::{self, Container, ContainerSelection};
use crate::desired::DesiredSpec;
use crate::diff;
use crate::error::{Error, ErrorKind, Result};
use crate::locator::Locator;
use crate::resource::ResourceType;
use crate::types::{
    Action, ClientConfig, Credentials, DesiredState, ExistingResource, ReconciliationOutcome,
    ResourceKey,
};
use serde_json::{Map, Value};

/// Inputs of one reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileRequest<'a> {
    /// Resource collection.
    pub resource: &'a ResourceType,
    /// Raw container selection, validated first.
    pub container: &'a ContainerSelection,
    /// Name or id of the resource.
    pub key: &'a ResourceKey,
    /// Fields the caller asserts.
    pub desired: &'a DesiredSpec,
    /// Whether the resource should exist.
    pub state: DesiredState,
    /// Report the verdict without mutating anything.
    pub dry_run: bool,
}

/// Action decided from the current and desired state.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Absent, should be present.
    Create,
    /// Present with differences.
    Update(ExistingResource),
    /// Present, should be absent.
    Delete(ExistingResource),
    /// Already converged; carries the existing resource, if any.
    Keep(Option<ExistingResource>),
}

impl Plan {
    /// Outcome action of this plan.
    #[must_use]
    pub fn action(&self) -> Action {
        match self {
            Self::Create => Action::Create,
            Self::Update(_) => Action::Update,
            Self::Delete(_) => Action::Delete,
            Self::Keep(_) => Action::Noop,
        }
    }
}

/// Decide what to do. Pure.
#[must_use]
pub fn plan(existing: Option<ExistingResource>, desired: &DesiredSpec, state: DesiredState) -> Plan {
    match (existing, state) {
        (None, DesiredState::Present) => Plan::Create,
        (None, DesiredState::Absent) => Plan::Keep(None),
        (Some(existing), DesiredState::Absent) => Plan::Delete(existing),
        (Some(existing), DesiredState::Present) => {
            if diff::diff(&existing.fields, desired) {
                Plan::Update(existing)
            } else {
                Plan::Keep(Some(existing))
            }
        }
    }
}

/// Drives one reconciliation against a backend.
pub struct Reconciler<'a> {
    backend: &'a dyn Backend,
    authenticator: &'a mut TokenAuthenticator,
    credentials: &'a Credentials,
    config: &'a ClientConfig,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler borrowing the client's parts.
    pub fn new(
        backend: &'a dyn Backend,
        authenticator: &'a mut TokenAuthenticator,
        credentials: &'a Credentials,
        config: &'a ClientConfig,
    ) -> Self {
        Self {
            backend,
            authenticator,
            credentials,
            config,
        }
    }

    /// Run a reconciliation, folding any error into the outcome.
    pub fn run(&mut self, request: &ReconcileRequest<'_>) -> ReconciliationOutcome {
        match self.reconcile(request) {
            Ok(outcome) => outcome,
            Err(err) => {
                log::debug!("{} reconciliation failed: {err}", request.resource);
                ReconciliationOutcome::failure(&err, request.dry_run)
            }
        }
    }

    /// Run a reconciliation, returning errors as `Err`.
    pub fn reconcile(&mut self, request: &ReconcileRequest<'_>) -> Result<ReconciliationOutcome> {
        let container = container::validate(request.container)?;
        check_key(request.key, request.desired)?;

        let existing = self.locate(request.resource, &container, request.key)?;
        let plan = plan(existing, request.desired, request.state);
        log::debug!(
            "{} {} in {container}: {}",
            request.resource,
            request.key,
            plan.action()
        );

        match plan {
            Plan::Keep(existing) => Ok(ReconciliationOutcome::success(
                Action::Noop,
                existing.map(ExistingResource::into_value),
                request.dry_run,
            )),
            Plan::Create => self.create(request, &container),
            Plan::Update(existing) => self.update(request, existing),
            Plan::Delete(existing) => self.delete(request, &existing),
        }
    }

    /// Look up the resource without planning anything.
    pub fn locate(
        &mut self,
        resource: &ResourceType,
        container: &Container,
        key: &ResourceKey,
    ) -> Result<Option<ExistingResource>> {
        let auth = self.authorization()?;
        Locator::new(self.backend, self.config.page_limit, self.config.max_pages)
            .find(&auth, resource, container, key)
    }

    fn authorization(&mut self) -> Result<String> {
        let token = self.authenticator.ensure_valid_token(self.credentials)?;
        Ok(token.authorization())
    }

    fn create(
        &mut self,
        request: &ReconcileRequest<'_>,
        container: &Container,
    ) -> Result<ReconciliationOutcome> {
        let payload = create_payload(request, container)?;
        if request.dry_run {
            log::info!("would create {} {} in {container}", request.resource, request.key);
            return Ok(ReconciliationOutcome::success(
                Action::Create,
                Some(Value::Object(payload)),
                true,
            ));
        }

        let auth = self.authorization()?;
        let created = self.backend.create(&auth, request.resource, &payload)?;
        log::info!("created {} {} in {container}", request.resource, request.key);
        Ok(ReconciliationOutcome::success(
            Action::Create,
            Some(created),
            false,
        ))
    }

    fn update(
        &mut self,
        request: &ReconcileRequest<'_>,
        existing: ExistingResource,
    ) -> Result<ReconciliationOutcome> {
        let changed = diff::changed_fields(&existing.fields, request.desired);
        let id = existing.id.clone();
        let mut payload = existing.fields;
        request.desired.merge_into(&mut payload);

        if request.dry_run {
            log::info!(
                "would update {} {} ({})",
                request.resource,
                request.key,
                changed.join(", ")
            );
            return Ok(ReconciliationOutcome::success(
                Action::Update,
                Some(Value::Object(payload)),
                true,
            ));
        }

        let auth = self.authorization()?;
        let updated = self.backend.update(&auth, request.resource, &id, &payload)?;
        log::info!(
            "updated {} {} ({})",
            request.resource,
            request.key,
            changed.join(", ")
        );
        Ok(ReconciliationOutcome::success(
            Action::Update,
            Some(updated),
            false,
        ))
    }

    fn delete(
        &mut self,
        request: &ReconcileRequest<'_>,
        existing: &ExistingResource,
    ) -> Result<ReconciliationOutcome> {
        if request.dry_run {
            log::info!("would delete {} {}", request.resource, request.key);
            return Ok(ReconciliationOutcome::success(Action::Delete, None, true));
        }

        let auth = self.authorization()?;
        match self.backend.delete(&auth, request.resource, &existing.id) {
            Ok(()) => {
                log::info!("deleted {} {}", request.resource, request.key);
                Ok(ReconciliationOutcome::success(Action::Delete, None, false))
            }
            Err(err) if err.category() == ErrorKind::NotFound => {
                log::debug!("{} {} already gone", request.resource, request.key);
                Ok(ReconciliationOutcome::success(Action::Noop, None, false))
            }
            Err(err) => Err(err),
        }
    }
}

/// Reject a desired name that contradicts the name key.
fn check_key(key: &ResourceKey, desired: &DesiredSpec) -> Result<()> {
    if let (ResourceKey::Name(name), Some(desired_name)) = (key, desired.name())
        && name != desired_name
    {
        return Err(Error::validation(format!(
            "desired name '{desired_name}' does not match the resource name '{name}'"
        )));
    }
    Ok(())
}

/// Request body for a create: desired fields, the name and the container.
fn create_payload(
    request: &ReconcileRequest<'_>,
    container: &Container,
) -> Result<Map<String, Value>> {
    let mut payload = request.desired.to_payload();

    match request.key {
        ResourceKey::Name(name) => {
            payload
                .entry("name")
                .or_insert_with(|| Value::from(name.as_str()));
        }
        ResourceKey::Id(id) => {
            let mut details = Map::new();
            details.insert("id".to_string(), Value::from(id.as_str()));
            return Err(Error::NotFound {
                message: format!(
                    "{} id {id} does not exist in {container} and ids cannot be chosen on create",
                    request.resource
                ),
                details,
            });
        }
    }

    let (kind, name) = container.query_param();
    payload.insert(kind.to_string(), Value::from(name));
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ManualClock, MockTokenEndpoint};
    use crate::backend::{MockBackend, Operation};
    use crate::desired::FieldValue;
    use crate::resource::ADDRESS;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        mock: MockBackend,
        endpoint: MockTokenEndpoint,
        authenticator: TokenAuthenticator,
        credentials: Credentials,
        config: ClientConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let endpoint = MockTokenEndpoint::new();
            let authenticator =
                TokenAuthenticator::new(Box::new(endpoint.clone()), Duration::from_secs(300))
                    .with_clock(Box::new(ManualClock::default()));
            Self {
                mock: MockBackend::new(),
                endpoint,
                authenticator,
                credentials: Credentials::new("id", "secret", "1234567890"),
                config: ClientConfig::new(),
            }
        }

        fn run(
            &mut self,
            key: &ResourceKey,
            desired: &DesiredSpec,
            state: DesiredState,
            dry_run: bool,
        ) -> ReconciliationOutcome {
            let container = ContainerSelection::folder("Texas");
            let request = ReconcileRequest {
                resource: &ADDRESS,
                container: &container,
                key,
                desired,
                state,
                dry_run,
            };
            Reconciler::new(
                &self.mock,
                &mut self.authenticator,
                &self.credentials,
                &self.config,
            )
            .run(&request)
        }
    }

    fn existing(value: Value) -> ExistingResource {
        ExistingResource::from_value(value).unwrap()
    }

    #[test]
    fn test_plan_state_machine() {
        let desired = DesiredSpec::new().with("ip_netmask", "10.0.0.0/8");
        let same = existing(json!({"id": "1", "name": "a", "ip_netmask": "10.0.0.0/8"}));
        let other = existing(json!({"id": "1", "name": "a", "ip_netmask": "10.0.0.0/16"}));

        assert_eq!(plan(None, &desired, DesiredState::Present), Plan::Create);
        assert_eq!(plan(None, &desired, DesiredState::Absent), Plan::Keep(None));
        assert_eq!(
            plan(Some(same.clone()), &desired, DesiredState::Present),
            Plan::Keep(Some(same.clone()))
        );
        assert_eq!(
            plan(Some(other.clone()), &desired, DesiredState::Present),
            Plan::Update(other)
        );
        assert_eq!(
            plan(Some(same.clone()), &desired, DesiredState::Absent),
            Plan::Delete(same)
        );
    }

    #[test]
    fn test_create_payload_includes_name_and_container() {
        let mut fx = Fixture::new();
        let desired = DesiredSpec::new()
            .with("ip_netmask", "10.1.1.0/24")
            .with("description", FieldValue::Unset);

        let outcome = fx.run(
            &ResourceKey::name("web"),
            &desired,
            DesiredState::Present,
            false,
        );
        assert!(outcome.changed);
        assert_eq!(outcome.action, Action::Create);

        let stored = fx.mock.objects(&ADDRESS);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["name"], "web");
        assert_eq!(stored[0]["folder"], "Texas");
        assert!(stored[0].get("description").is_none());
    }

    #[test]
    fn test_update_merges_existing_fields() {
        let mut fx = Fixture::new();
        fx.mock.insert(
            &ADDRESS,
            json!({"name": "web", "folder": "Texas", "ip_netmask": "10.1.1.0/24", "tag": ["prod"]}),
        );
        let desired = DesiredSpec::new().with("ip_netmask", "10.1.2.0/24");

        let outcome = fx.run(
            &ResourceKey::name("web"),
            &desired,
            DesiredState::Present,
            false,
        );
        assert!(outcome.changed);
        assert_eq!(outcome.action, Action::Update);
        let resource = outcome.resource.unwrap();
        assert_eq!(resource["ip_netmask"], "10.1.2.0/24");
        assert_eq!(resource["tag"], json!(["prod"]));
        assert_eq!(fx.mock.calls(Operation::Update), 1);
    }

    #[test]
    fn test_name_mismatch_rejected_before_io() {
        let mut fx = Fixture::new();
        let desired = DesiredSpec::new().with("name", "other");

        let outcome = fx.run(
            &ResourceKey::name("web"),
            &desired,
            DesiredState::Present,
            false,
        );
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::Validation);
        assert_eq!(fx.mock.total_calls(), 0);
        assert_eq!(fx.endpoint.exchanges(), 0);
    }

    #[test]
    fn test_missing_container_rejected_before_io() {
        let mut fx = Fixture::new();
        let container = ContainerSelection::default();
        let desired = DesiredSpec::new();
        let key = ResourceKey::name("web");
        let request = ReconcileRequest {
            resource: &ADDRESS,
            container: &container,
            key: &key,
            desired: &desired,
            state: DesiredState::Present,
            dry_run: false,
        };

        let outcome =
            Reconciler::new(&fx.mock, &mut fx.authenticator, &fx.credentials, &fx.config)
                .run(&request);
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::MissingContainer);
        assert_eq!(fx.mock.total_calls(), 0);
        assert_eq!(fx.endpoint.exchanges(), 0);
    }

    #[test]
    fn test_create_by_unknown_id_is_not_found() {
        let mut fx = Fixture::new();
        let desired = DesiredSpec::new().with("name", "web");

        let outcome = fx.run(
            &ResourceKey::id("0000"),
            &desired,
            DesiredState::Present,
            false,
        );
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::NotFound);
        assert_eq!(fx.mock.mutation_calls(), 0);

        let absent = fx.run(
            &ResourceKey::id("0000"),
            &DesiredSpec::new(),
            DesiredState::Absent,
            false,
        );
        assert!(absent.is_success());
        assert!(!absent.changed);
    }

    #[test]
    fn test_rename_by_id() {
        let mut fx = Fixture::new();
        let id = fx
            .mock
            .insert(&ADDRESS, json!({"name": "web", "folder": "Texas", "fqdn": "a.example"}));
        let desired = DesiredSpec::new().with("name", "web-renamed");

        let outcome = fx.run(&ResourceKey::id(&id), &desired, DesiredState::Present, false);
        assert!(outcome.changed);
        assert_eq!(outcome.resource.unwrap()["name"], "web-renamed");
    }

    #[test]
    fn test_delete_vanished_between_locate_and_delete() {
        let mut fx = Fixture::new();
        fx.mock.insert(&ADDRESS, json!({"name": "web", "folder": "Texas"}));
        fx.mock.fail_on(Operation::Delete, Error::from_response(404, ""));

        let outcome = fx.run(
            &ResourceKey::name("web"),
            &DesiredSpec::new(),
            DesiredState::Absent,
            false,
        );
        assert!(outcome.is_success());
        assert!(!outcome.changed);
        assert_eq!(outcome.action, Action::Noop);
    }

    #[test]
    fn test_dry_run_update_preview() {
        let mut fx = Fixture::new();
        fx.mock.insert(
            &ADDRESS,
            json!({"name": "web", "folder": "Texas", "ip_netmask": "10.1.1.0/24"}),
        );
        let desired = DesiredSpec::new().with("ip_netmask", "10.1.2.0/24");

        let outcome = fx.run(
            &ResourceKey::name("web"),
            &desired,
            DesiredState::Present,
            true,
        );
        assert!(outcome.changed);
        assert!(outcome.dry_run);
        assert_eq!(outcome.resource.unwrap()["ip_netmask"], "10.1.2.0/24");
        assert_eq!(fx.mock.mutation_calls(), 0);
        assert_eq!(fx.mock.objects(&ADDRESS)[0]["ip_netmask"], "10.1.1.0/24");
    }

    #[test]
    fn test_token_sent_with_every_call() {
        let mut fx = Fixture::new();
        fx.run(
            &ResourceKey::name("web"),
            &DesiredSpec::new().with("ip_netmask", "10.1.1.0/24"),
            DesiredState::Present,
            false,
        );
        assert_eq!(
            fx.mock.last_authorization().as_deref(),
            Some("Bearer mock-token-1")
        );
        assert_eq!(fx.endpoint.exchanges(), 1);
    }
}
