use super::*;
use crate::audit::MemoryAuditLog;
use crate::notify::OutboxNotifier;
use crate::state::{FileStore, MemoryStore};
use mockito::{Matcher, Server};
use reqwest::StatusCode;

const GROUP_PK: &str = "5f0c2a52-9b4e-4bd1-a6d3-6f1d8e0c1a77";

fn request_for(server: &Server) -> ProvisioningRequest {
    ProvisioningRequest {
        config: ServerConfig::new(&server.url(), "test-token")
            .unwrap()
            .with_group("stash"),
        service_id: 77,
        client_id: Some(12),
        email: "jane@example.com".to_string(),
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        stored_username: None,
    }
}

fn mock_username_free(server: &mut Server) -> mockito::Mock {
    server
        .mock("GET", "/api/v3/core/users/")
        .match_query(Matcher::Regex("username=".to_string()))
        .with_status(200)
        .with_body(r#"{"results":[]}"#)
        .create()
}

fn mock_create_user(server: &mut Server, status: usize) -> mockito::Mock {
    let body = if status == 201 {
        r#"{"pk":101,"username":"created","is_active":true}"#
    } else {
        r#"{"username":["This field must be unique."]}"#
    };
    server
        .mock("POST", "/api/v3/core/users/")
        .match_body(Matcher::PartialJson(json!({"is_active": true})))
        .with_status(status)
        .with_body(body)
        .create()
}

fn mock_group(server: &mut Server, results: &str) -> mockito::Mock {
    server
        .mock("GET", "/api/v3/core/groups/")
        .match_query(Matcher::UrlEncoded("name".into(), "stash".into()))
        .with_status(200)
        .with_body(format!(r#"{{"results":{}}}"#, results))
        .create()
}

fn mock_lookup(server: &mut Server, username: &str, body: &str) -> mockito::Mock {
    server
        .mock("GET", "/api/v3/core/users/")
        .match_query(Matcher::UrlEncoded("username".into(), username.into()))
        .with_status(200)
        .with_body(body)
        .create()
}

#[test]
fn activate_creates_links_persists_and_notifies() {
    let mut server = Server::new();
    let lookup = mock_username_free(&mut server);
    let create = mock_create_user(&mut server, 201);
    let group = mock_group(
        &mut server,
        &format!(r#"[{{"pk":"{}","name":"stash"}}]"#, GROUP_PK),
    );
    let link = server
        .mock("POST", format!("/api/v3/core/groups/{}/add_user/", GROUP_PK).as_str())
        .match_body(Matcher::Json(json!({"pk": 101})))
        .with_status(204)
        .create();

    let store = MemoryStore::new();
    let outbox = OutboxNotifier::new();
    let audit = Arc::new(MemoryAuditLog::new());
    let sync = Synchronizer::new(&store, &outbox, audit.clone());

    let activated = sync.activate(&request_for(&server)).unwrap();

    lookup.assert();
    create.assert();
    group.assert();
    link.assert();

    assert_eq!(activated.user_pk, 101);
    assert_eq!(activated.group_pk, GROUP_PK);
    assert!(username::is_valid_username(&activated.username));
    assert_eq!(
        store.username(77).unwrap().as_deref(),
        Some(activated.username.as_str())
    );

    let notices = outbox.drain();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].template, ACCOUNT_CREATED_TEMPLATE);
    assert_eq!(notices[0].client_id, Some(12));
    assert_eq!(notices[0].client_name, "Jane Doe");
    assert_eq!(notices[0].username, activated.username);
    assert_eq!(notices[0].password.len(), password::PASSWORD_LENGTH);
    assert_eq!(notices[0].authentik_url, server.url());

    assert_eq!(
        audit.actions(),
        vec!["GetUser", "CreateUser", "LookupGroup", "AddToGroup"]
    );
}

#[test]
fn activate_accepts_responses_carrying_only_a_pk() {
    let mut server = Server::new();
    mock_username_free(&mut server);
    server
        .mock("POST", "/api/v3/core/users/")
        .with_status(201)
        .with_body(r#"{"pk":101}"#)
        .create();
    mock_group(&mut server, r#"[{"pk":"g1"}]"#);
    let link = server
        .mock("POST", "/api/v3/core/groups/g1/add_user/")
        .match_body(Matcher::Json(json!({"pk": 101})))
        .with_status(204)
        .create();

    let store = MemoryStore::new();
    let outbox = OutboxNotifier::new();
    let sync = Synchronizer::new(&store, &outbox, Arc::new(MemoryAuditLog::new()));

    let activated = sync.activate(&request_for(&server)).unwrap();

    link.assert();
    assert_eq!(activated.user_pk, 101);
    assert_eq!(activated.group_pk, "g1");
    assert_eq!(
        store.username(77).unwrap().as_deref(),
        Some(activated.username.as_str())
    );
}

#[test]
fn activate_without_matching_group_does_not_link() {
    let mut server = Server::new();
    mock_username_free(&mut server);
    mock_create_user(&mut server, 201);
    mock_group(&mut server, "[]");
    let link = server
        .mock("POST", Matcher::Regex("add_user".to_string()))
        .expect(0)
        .create();

    let store = MemoryStore::new();
    let outbox = OutboxNotifier::new();
    let sync = Synchronizer::new(&store, &outbox, Arc::new(MemoryAuditLog::new()));

    let failure = sync.activate(&request_for(&server)).unwrap_err();

    link.assert();
    assert_eq!(failure.kind(), FailureKind::GroupNotFound);
    assert!(matches!(failure.cause(), Error::NotFound(..)));
    assert!(outbox.drain().is_empty());
    // The account exists now, so its username stays on record
    assert!(store.username(77).unwrap().is_some());
}

#[test]
fn activate_reports_create_failure_with_upstream_detail() {
    let mut server = Server::new();
    mock_username_free(&mut server);
    mock_create_user(&mut server, 400);
    let group = server
        .mock("GET", "/api/v3/core/groups/")
        .match_query(Matcher::Any)
        .expect(0)
        .create();

    let store = MemoryStore::new();
    let outbox = OutboxNotifier::new();
    let audit = Arc::new(MemoryAuditLog::new());
    let sync = Synchronizer::new(&store, &outbox, audit.clone());

    let failure = sync.activate(&request_for(&server)).unwrap_err();

    group.assert();
    assert_eq!(failure.kind(), FailureKind::CreateFailed);
    let (status, body) = failure.detail().unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("must be unique"));
    assert_eq!(store.username(77).unwrap(), None);
    assert!(
        audit
            .actions()
            .contains(&"CreateAccount_Error".to_string())
    );
}

#[test]
fn activate_reports_link_failure() {
    let mut server = Server::new();
    mock_username_free(&mut server);
    mock_create_user(&mut server, 201);
    mock_group(&mut server, r#"[{"pk":"g1","name":"stash"}]"#);
    server
        .mock("POST", "/api/v3/core/groups/g1/add_user/")
        .with_status(500)
        .with_body("boom")
        .create();

    let store = MemoryStore::new();
    let outbox = OutboxNotifier::new();
    let sync = Synchronizer::new(&store, &outbox, Arc::new(MemoryAuditLog::new()));

    let failure = sync.activate(&request_for(&server)).unwrap_err();

    assert_eq!(failure.kind(), FailureKind::LinkFailed);
    assert_eq!(
        failure.to_string(),
        "Failed to add user to group. HTTP Code: 500. Response: boom"
    );
    assert!(outbox.drain().is_empty());
}

#[test]
fn activate_succeeds_when_notice_cannot_be_sent() {
    struct BrokenNotifier;

    impl Notifier for BrokenNotifier {
        fn send_credentials(&self, _notice: &CredentialNotice) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("mail server unreachable"))
        }
    }

    let mut server = Server::new();
    mock_username_free(&mut server);
    mock_create_user(&mut server, 201);
    mock_group(&mut server, r#"[{"pk":3,"name":"stash"}]"#);
    server
        .mock("POST", "/api/v3/core/groups/3/add_user/")
        .with_status(200)
        .create();

    let store = MemoryStore::new();
    let sync = Synchronizer::new(&store, &BrokenNotifier, Arc::new(MemoryAuditLog::new()));

    let activated = sync.activate(&request_for(&server)).unwrap();
    assert_eq!(activated.group_pk, "3");
}

#[test]
fn suspend_without_username_makes_no_call() {
    let mut server = Server::new();
    let any = server
        .mock("GET", Matcher::Any)
        .match_query(Matcher::Any)
        .expect(0)
        .create();

    let store = MemoryStore::new();
    let outbox = OutboxNotifier::new();
    let audit = Arc::new(MemoryAuditLog::new());
    let sync = Synchronizer::new(&store, &outbox, audit.clone());

    let failure = sync.suspend(&request_for(&server)).unwrap_err();

    any.assert();
    assert_eq!(failure.kind(), FailureKind::UsernameMissing);
    assert!(matches!(
        failure.cause(),
        Error::MissingLocalState { service_id: 77 }
    ));
    assert_eq!(audit.actions(), vec!["SuspendAccount_Error"]);
}

#[test]
fn unreadable_state_is_not_reported_as_missing_username() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("services.json");
    std::fs::write(&path, "{ not json").unwrap();
    let store = FileStore::new(&path);

    let mut server = Server::new();
    let any = server
        .mock("GET", Matcher::Any)
        .match_query(Matcher::Any)
        .expect(0)
        .create();
    let outbox = OutboxNotifier::new();
    let sync = Synchronizer::new(&store, &outbox, Arc::new(MemoryAuditLog::new()));

    let failure = sync.suspend(&request_for(&server)).unwrap_err();

    any.assert();
    assert_eq!(failure.kind(), FailureKind::StoreFailed);
    assert!(matches!(failure.cause(), Error::Store(_)));
}

#[test]
fn suspend_deactivates_the_stored_account() {
    let mut server = Server::new();
    mock_lookup(
        &mut server,
        "jadenode1234",
        r#"{"results":[{"pk":55,"username":"jadenode1234","is_active":true}]}"#,
    );
    let patch = server
        .mock("PATCH", "/api/v3/core/users/55/")
        .match_body(Matcher::Json(json!({"is_active": false})))
        .with_status(200)
        .with_body(r#"{"pk":55,"username":"jadenode1234","is_active":false}"#)
        .create();

    let store = MemoryStore::new().with_username(77, "jadenode1234");
    let outbox = OutboxNotifier::new();
    let sync = Synchronizer::new(&store, &outbox, Arc::new(MemoryAuditLog::new()));

    sync.suspend(&request_for(&server)).unwrap();
    patch.assert();
}

#[test]
fn unsuspend_falls_back_to_host_username() {
    let mut server = Server::new();
    mock_lookup(
        &mut server,
        "coralgate90210",
        r#"{"results":[{"pk":8,"username":"coralgate90210","is_active":false}]}"#,
    );
    let patch = server
        .mock("PATCH", "/api/v3/core/users/8/")
        .match_body(Matcher::Json(json!({"is_active": true})))
        .with_status(200)
        .with_body("{}")
        .create();

    let store = MemoryStore::new();
    let outbox = OutboxNotifier::new();
    let sync = Synchronizer::new(&store, &outbox, Arc::new(MemoryAuditLog::new()));
    let mut request = request_for(&server);
    request.stored_username = Some("coralgate90210".to_string());

    sync.unsuspend(&request).unwrap();
    patch.assert();
}

#[test]
fn suspend_reports_lookup_and_update_failures() {
    let mut server = Server::new();
    server
        .mock("GET", "/api/v3/core/users/")
        .match_query(Matcher::UrlEncoded("username".into(), "brokenlink1234".into()))
        .with_status(502)
        .with_body("bad gateway")
        .create();
    mock_lookup(
        &mut server,
        "lockedbox4321",
        r#"{"results":[{"pk":4,"username":"lockedbox4321"}]}"#,
    );
    server
        .mock("PATCH", "/api/v3/core/users/4/")
        .with_status(403)
        .with_body("denied")
        .create();

    let outbox = OutboxNotifier::new();
    let audit = Arc::new(MemoryAuditLog::new());

    let store = MemoryStore::new().with_username(77, "brokenlink1234");
    let sync = Synchronizer::new(&store, &outbox, audit.clone());
    let failure = sync.suspend(&request_for(&server)).unwrap_err();
    assert_eq!(failure.kind(), FailureKind::AccountLookupFailed);

    let store = MemoryStore::new().with_username(77, "lockedbox4321");
    let sync = Synchronizer::new(&store, &outbox, audit.clone());
    let failure = sync.suspend(&request_for(&server)).unwrap_err();
    assert_eq!(failure.kind(), FailureKind::UpdateFailed);
    assert_eq!(failure.detail().map(|(s, _)| s), Some(StatusCode::FORBIDDEN));
}

#[test]
fn terminate_unknown_account_does_not_delete() {
    let mut server = Server::new();
    mock_lookup(&mut server, "ghostnode1111", r#"{"results":[]}"#);
    let delete = server
        .mock("DELETE", Matcher::Any)
        .expect(0)
        .create();

    let store = MemoryStore::new().with_username(77, "ghostnode1111");
    let outbox = OutboxNotifier::new();
    let sync = Synchronizer::new(&store, &outbox, Arc::new(MemoryAuditLog::new()));

    let failure = sync.terminate(&request_for(&server)).unwrap_err();

    delete.assert();
    assert_eq!(failure.kind(), FailureKind::AccountNotFound);
    assert!(matches!(failure.cause(), Error::NotFound(..)));
}

#[test]
fn terminate_deletes_the_account() {
    let mut server = Server::new();
    mock_lookup(
        &mut server,
        "tealwave48210",
        r#"{"results":[{"pk":900,"username":"tealwave48210"}]}"#,
    );
    let delete = server
        .mock("DELETE", "/api/v3/core/users/900/")
        .with_status(204)
        .create();

    let store = MemoryStore::new().with_username(77, "tealwave48210");
    let outbox = OutboxNotifier::new();
    let sync = Synchronizer::new(&store, &outbox, Arc::new(MemoryAuditLog::new()));

    sync.terminate(&request_for(&server)).unwrap();
    delete.assert();
}

#[test]
fn terminate_reports_delete_failure() {
    let mut server = Server::new();
    mock_lookup(
        &mut server,
        "tealwave48210",
        r#"{"results":[{"pk":900,"username":"tealwave48210"}]}"#,
    );
    server
        .mock("DELETE", "/api/v3/core/users/900/")
        .with_status(404)
        .with_body(r#"{"detail":"Not found."}"#)
        .create();

    let store = MemoryStore::new().with_username(77, "tealwave48210");
    let outbox = OutboxNotifier::new();
    let sync = Synchronizer::new(&store, &outbox, Arc::new(MemoryAuditLog::new()));

    let failure = sync.terminate(&request_for(&server)).unwrap_err();
    assert_eq!(failure.kind(), FailureKind::DeleteFailed);
}
