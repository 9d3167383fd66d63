//! End-to-end reconciliation through `Client` against the in-memory backend.

use scmkit::auth::{ManualClock, MockTokenEndpoint};
use scmkit::backend::Operation;
use scmkit::resource::{ADDRESS, ADDRESS_GROUP, IKE_CRYPTO_PROFILE};
use scmkit::{
    Action, Client, ClientConfig, ContainerSelection, Credentials, DesiredSpec, DesiredState,
    Error, ErrorKind, FieldValue, MockBackend, ResourceKey,
};
use serde_json::json;
use std::time::Duration;

/// Client plus handles on its shared mock state.
struct Harness {
    client: Client,
    backend: MockBackend,
    endpoint: MockTokenEndpoint,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    fn with_config(config: ClientConfig) -> Self {
        let backend = MockBackend::new();
        let endpoint = MockTokenEndpoint::new().with_expires_in(900);
        let clock = ManualClock::default();
        let client = Client::with_backend(
            Credentials::new(
                "automation@1234567890.iam.panserviceaccount.com",
                "s3cr3t",
                "1234567890",
            ),
            config,
            Box::new(backend.clone()),
            Box::new(endpoint.clone()),
        )
        .with_clock(Box::new(clock.clone()));
        Self {
            client,
            backend,
            endpoint,
            clock,
        }
    }
}

fn network_objects() -> ContainerSelection {
    ContainerSelection::folder("Network-Objects")
}

fn web_server() -> DesiredSpec {
    DesiredSpec::new()
        .with("name", "web-server")
        .with("value", "10.1.1.0/24")
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_web_server_lifecycle() {
    let mut h = Harness::new();
    let key = ResourceKey::name("web-server");

    let created = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &key,
        &web_server(),
        DesiredState::Present,
        false,
    );
    assert!(created.is_success(), "{:?}", created.error);
    assert!(created.changed);
    assert_eq!(created.action, Action::Create);
    let resource = created.resource.clone().unwrap();
    assert_eq!(resource["name"], "web-server");
    assert_eq!(resource["value"], "10.1.1.0/24");
    assert!(resource["id"].as_str().is_some_and(|id| !id.is_empty()));

    let unchanged = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &key,
        &web_server(),
        DesiredState::Present,
        false,
    );
    assert!(!unchanged.changed);
    assert_eq!(unchanged.action, Action::Noop);
    assert_eq!(unchanged.resource, created.resource);

    let deleted = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &key,
        &DesiredSpec::new(),
        DesiredState::Absent,
        false,
    );
    assert!(deleted.changed);
    assert_eq!(deleted.resource, None);

    let gone = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &key,
        &DesiredSpec::new(),
        DesiredState::Absent,
        false,
    );
    assert!(gone.is_success());
    assert!(!gone.changed);
    assert_eq!(gone.resource, None);
    assert!(h.backend.objects(&ADDRESS).is_empty());
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_idempotence() {
    let mut h = Harness::new();
    let key = ResourceKey::name("dns-servers");
    let desired = DesiredSpec::new()
        .with("static", FieldValue::set(["dns-1", "dns-2"]))
        .with("description", "resolvers")
        .with("tag", FieldValue::set(["infra"]));

    let first = h.client.reconcile(
        &ADDRESS_GROUP,
        &network_objects(),
        &key,
        &desired,
        DesiredState::Present,
        false,
    );
    let second = h.client.reconcile(
        &ADDRESS_GROUP,
        &network_objects(),
        &key,
        &desired,
        DesiredState::Present,
        false,
    );
    assert!(first.changed);
    assert!(!second.changed);
    assert_eq!(h.backend.mutation_calls(), 1);
}

#[test]
fn test_container_validated_before_any_call() {
    let mut h = Harness::new();
    let key = ResourceKey::name("web-server");

    let none = ContainerSelection::default();
    let two = ContainerSelection {
        folder: Some("Network-Objects".to_string()),
        snippet: Some("baseline".to_string()),
        device: None,
    };
    let three = ContainerSelection {
        folder: Some("a".to_string()),
        snippet: Some("b".to_string()),
        device: Some("c".to_string()),
    };

    for (selection, kind) in [
        (none, ErrorKind::MissingContainer),
        (two, ErrorKind::AmbiguousContainer),
        (three, ErrorKind::AmbiguousContainer),
    ] {
        let outcome = h.client.reconcile(
            &ADDRESS,
            &selection,
            &key,
            &web_server(),
            DesiredState::Present,
            false,
        );
        let error = outcome.error.unwrap();
        assert_eq!(error.kind, kind);
        assert!(!error.retryable);
        assert!(!outcome.changed);
        assert_eq!(outcome.resource, None);
    }

    assert_eq!(h.backend.total_calls(), 0);
    assert_eq!(h.endpoint.exchanges(), 0);
}

#[test]
fn test_unordered_list_reorder_is_not_a_change() {
    let mut h = Harness::new();
    h.backend.insert(
        &ADDRESS,
        json!({"name": "web-server", "folder": "Network-Objects", "ip_netmask": "10.1.1.0/24", "tag": ["a", "b"]}),
    );
    let key = ResourceKey::name("web-server");

    let reordered = DesiredSpec::new().with("tag", FieldValue::set(["b", "a"]));
    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &key,
        &reordered,
        DesiredState::Present,
        false,
    );
    assert!(!outcome.changed);

    let shrunk = DesiredSpec::new().with("tag", FieldValue::set(["a"]));
    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &key,
        &shrunk,
        DesiredState::Present,
        false,
    );
    assert!(outcome.changed);
    assert_eq!(outcome.resource.unwrap()["tag"], json!(["a"]));
}

#[test]
fn test_ordered_proposals_detect_reorder() {
    let mut h = Harness::new();
    h.backend.insert(
        &IKE_CRYPTO_PROFILE,
        json!({
            "name": "ike-default",
            "folder": "Network-Objects",
            "encryption": ["aes-256-cbc", "aes-128-cbc"],
            "hash": ["sha256"],
            "dh_group": ["group14"]
        }),
    );
    let desired = IKE_CRYPTO_PROFILE
        .desired_from_json(&json!({"encryption": ["aes-128-cbc", "aes-256-cbc"]}))
        .unwrap();

    let outcome = h.client.reconcile(
        &IKE_CRYPTO_PROFILE,
        &network_objects(),
        &ResourceKey::name("ike-default"),
        &desired,
        DesiredState::Present,
        true,
    );
    assert!(outcome.changed);
    assert_eq!(outcome.action, Action::Update);
}

#[test]
fn test_unset_fields_are_transparent() {
    let mut h = Harness::new();
    h.backend.insert(
        &ADDRESS,
        json!({"name": "x", "folder": "Network-Objects", "extra": "y"}),
    );

    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &ResourceKey::name("x"),
        &DesiredSpec::new().with("name", "x").with("extra", FieldValue::Unset),
        DesiredState::Present,
        false,
    );
    assert!(!outcome.changed);
    assert_eq!(outcome.resource.unwrap()["extra"], "y");
    assert_eq!(h.backend.mutation_calls(), 0);
}

#[test]
fn test_explicit_null_clears_field() {
    let mut h = Harness::new();
    h.backend.insert(
        &ADDRESS,
        json!({"name": "x", "folder": "Network-Objects", "description": "old"}),
    );

    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &ResourceKey::name("x"),
        &DesiredSpec::new().with("description", FieldValue::Null),
        DesiredState::Present,
        false,
    );
    assert!(outcome.changed);
    assert!(outcome.resource.unwrap()["description"].is_null());
}

#[test]
fn test_absent_and_absent_issues_no_mutation() {
    let mut h = Harness::new();

    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &ResourceKey::name("never-existed"),
        &DesiredSpec::new(),
        DesiredState::Absent,
        false,
    );
    assert!(outcome.is_success());
    assert!(!outcome.changed);
    assert_eq!(h.backend.mutation_calls(), 0);
}

#[test]
fn test_token_refresh_boundary() {
    let mut h = Harness::new();
    let key = ResourceKey::name("web-server");
    let reconcile = |h: &mut Harness| {
        h.client.reconcile(
            &ADDRESS,
            &network_objects(),
            &key,
            &web_server(),
            DesiredState::Present,
            false,
        )
    };

    reconcile(&mut h);
    assert_eq!(h.endpoint.exchanges(), 1);

    // well within validity
    h.clock.advance(Duration::from_secs(120));
    reconcile(&mut h);
    assert_eq!(h.endpoint.exchanges(), 1);

    // 240s left, inside the 300s margin
    h.clock.advance(Duration::from_secs(540));
    reconcile(&mut h);
    assert_eq!(h.endpoint.exchanges(), 2);
    assert_eq!(
        h.backend.last_authorization().as_deref(),
        Some("Bearer mock-token-2")
    );
}

#[test]
fn test_rejected_credentials_surface_without_api_calls() {
    let mut h = Harness::new();
    h.endpoint.fail_with(Error::from_token_response(
        401,
        r#"{"error":"invalid_client","error_description":"Client authentication failed"}"#,
    ));

    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &ResourceKey::name("web-server"),
        &web_server(),
        DesiredState::Present,
        false,
    );
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, ErrorKind::AuthRejected);
    assert_eq!(error.details["error"], "invalid_client");
    assert_eq!(h.backend.total_calls(), 0);
}

// =============================================================================
// Lookup
// =============================================================================

#[test]
fn test_match_beyond_first_page() {
    let mut h = Harness::with_config(ClientConfig::default().page_limit(3));
    h.backend.ignore_name_filter();
    for i in 0..7 {
        h.backend.insert(
            &ADDRESS,
            json!({"name": format!("host-{i}"), "folder": "Network-Objects", "value": "10.0.0.1"}),
        );
    }
    h.backend.insert(
        &ADDRESS,
        json!({"name": "web-server", "folder": "Network-Objects", "value": "10.1.1.0/24"}),
    );

    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &ResourceKey::name("web-server"),
        &web_server(),
        DesiredState::Present,
        false,
    );
    assert!(!outcome.changed, "{:?}", outcome.error);
    assert_eq!(h.backend.calls(Operation::List), 3);
    assert_eq!(h.backend.mutation_calls(), 0);
}

#[test]
fn test_duplicate_names_are_reported() {
    let mut h = Harness::new();
    h.backend
        .insert(&ADDRESS, json!({"name": "web-server", "folder": "Network-Objects"}));
    h.backend
        .insert(&ADDRESS, json!({"name": "web-server", "folder": "Network-Objects"}));

    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &ResourceKey::name("web-server"),
        &web_server(),
        DesiredState::Present,
        false,
    );
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, ErrorKind::DataIntegrity);
    assert_eq!(error.details["ids"].as_array().map(Vec::len), Some(2));
    assert_eq!(h.backend.mutation_calls(), 0);
}

#[test]
fn test_inherited_object_is_not_matched() {
    let mut h = Harness::new();
    h.backend.inherit_from("Shared");
    h.backend
        .insert(&ADDRESS, json!({"name": "web-server", "folder": "Shared", "value": "10.1.1.0/24"}));

    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &ResourceKey::name("web-server"),
        &web_server(),
        DesiredState::Present,
        false,
    );
    assert!(outcome.changed);
    assert_eq!(outcome.action, Action::Create);
    assert_eq!(outcome.resource.unwrap()["folder"], "Network-Objects");
}

#[test]
fn test_locate_only() {
    let mut h = Harness::new();
    let id = h
        .backend
        .insert(&ADDRESS, json!({"name": "web-server", "folder": "Network-Objects"}));

    let found = h
        .client
        .locate(&ADDRESS, &network_objects(), &ResourceKey::id(&id))
        .unwrap()
        .unwrap();
    assert_eq!(found.name(), Some("web-server"));

    let err = h
        .client
        .locate(&ADDRESS, &ContainerSelection::default(), &ResourceKey::id(&id))
        .unwrap_err();
    assert_eq!(err.category(), ErrorKind::MissingContainer);
}

// =============================================================================
// Dry run and failures
// =============================================================================

#[test]
fn test_dry_run_matches_real_verdict() {
    let mut h = Harness::new();
    let key = ResourceKey::name("web-server");

    let preview = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &key,
        &web_server(),
        DesiredState::Present,
        true,
    );
    assert!(preview.changed);
    assert!(preview.dry_run);
    assert_eq!(preview.action, Action::Create);
    assert_eq!(preview.resource.clone().unwrap()["folder"], "Network-Objects");
    assert_eq!(h.backend.mutation_calls(), 0);

    let real = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &key,
        &web_server(),
        DesiredState::Present,
        false,
    );
    assert_eq!(real.changed, preview.changed);
    assert_eq!(real.action, preview.action);

    let delete_preview = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &key,
        &DesiredSpec::new(),
        DesiredState::Absent,
        true,
    );
    assert!(delete_preview.changed);
    assert_eq!(delete_preview.resource, None);
    assert_eq!(h.backend.objects(&ADDRESS).len(), 1);
}

#[test]
fn test_failed_mutation_is_not_retried() {
    let mut h = Harness::new();
    h.backend
        .fail_on(Operation::Create, Error::from_response(503, "Service Unavailable"));

    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &ResourceKey::name("web-server"),
        &web_server(),
        DesiredState::Present,
        false,
    );
    assert!(!outcome.changed);
    assert_eq!(outcome.resource, None);
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Transport);
    assert!(error.retryable);
    assert_eq!(h.backend.calls(Operation::Create), 1);
}

#[test]
fn test_server_conflict_is_reported() {
    let mut h = Harness::new();
    h.backend.fail_on(
        Operation::Create,
        Error::from_response(
            400,
            r#"{"_errors":[{"code":"E006","message":"Name Not Unique","details":{"errorType":"Object Already Exists"}}],"_request_id":"f7d2"}"#,
        ),
    );

    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &ResourceKey::name("web-server"),
        &web_server(),
        DesiredState::Present,
        false,
    );
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Conflict);
    assert_eq!(error.details["request_id"], "f7d2");
    assert!(error.message.contains("Name Not Unique"));
}

#[test]
fn test_outcome_serializes_for_callers() {
    let mut h = Harness::new();
    let outcome = h.client.reconcile(
        &ADDRESS,
        &network_objects(),
        &ResourceKey::name("web-server"),
        &web_server(),
        DesiredState::Present,
        false,
    );

    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["changed"], true);
    assert_eq!(value["action"], "create");
    assert!(value["error"].is_null());
}
