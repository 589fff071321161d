mod common;

use chrono::Utc;
use common::{direct_config, localhost, Harness, API_KEY};
use delivery_client::mock::MockReply;
use plainflow::{PlainflowConfig, PlainflowError};
use plainflow_storage::StorageKeys;
use serde_json::json;

fn with_servers(servers: &[&str]) -> PlainflowConfig {
    let mut config = direct_config();
    config.cross_domain_id_servers = Some(servers.iter().map(|s| s.to_string()).collect());
    config
}

fn default_servers() -> PlainflowConfig {
    with_servers(&["userdata.example1.com", "xid.domain2.com", "localhost"])
}

fn identify_traits(harness: &Harness) -> Vec<serde_json::Value> {
    harness
        .posts()
        .into_iter()
        .filter(|p| p.url.path().ends_with("/i"))
        .map(|p| p.body.unwrap()["traits"].clone())
        .collect()
}

#[tokio::test]
async fn test_not_enabled_without_servers() {
    let harness = Harness::new();
    let plainflow = harness.build(direct_config(), localhost());

    let err = plainflow.retrieve_cross_domain_id().await.unwrap_err();
    assert!(matches!(err, PlainflowError::Resolve(_)));
    assert_eq!(err.to_string(), "crossDomainId not enabled");
    assert_eq!(harness.transport.request_count(), 0);
}

#[tokio::test]
async fn test_single_current_host_generates_locally() {
    let harness = Harness::new();
    let plainflow = harness.build(with_servers(&["localhost"]), localhost());

    let resolved = plainflow.retrieve_cross_domain_id().await.unwrap();
    assert_eq!(resolved.from_domain, "localhost");
    assert!(harness.gets().is_empty());

    let traits = identify_traits(&harness);
    assert_eq!(traits.len(), 1);
    assert_eq!(traits[0]["crossDomainId"], json!(resolved.cross_domain_id));
}

#[tokio::test]
async fn test_obtains_remote_id_and_persists_it() {
    let harness = Harness::new();
    harness.transport.route(
        format!("xid.domain2.com/v1/id/{API_KEY}"),
        MockReply::json(json!({ "id": "xdomain-id-1" })),
    );
    harness.transport.route(
        "userdata.example1.com",
        MockReply::json(json!({ "id": null })),
    );
    let plainflow = harness.build(default_servers(), localhost());

    let resolved = plainflow.retrieve_cross_domain_id().await.unwrap();
    assert_eq!(resolved.cross_domain_id, "xdomain-id-1");
    assert_eq!(resolved.from_domain, "xid.domain2.com");
    assert_eq!(harness.gets().len(), 2);

    assert_eq!(identify_traits(&harness)[0]["crossDomainId"], "xdomain-id-1");
    assert_eq!(
        harness.storage.get(StorageKeys::CROSS_DOMAIN_ID).unwrap().as_deref(),
        Some("xdomain-id-1")
    );
    assert_eq!(
        harness.storage.get(StorageKeys::CROSS_DOMAIN_ID_DOMAIN).unwrap().as_deref(),
        Some("xid.domain2.com")
    );
    let stamp: i64 = harness
        .storage
        .get(StorageKeys::CROSS_DOMAIN_ID_TIMESTAMP)
        .unwrap()
        .unwrap()
        .parse()
        .unwrap();
    assert!((Utc::now().timestamp_millis() - stamp).abs() < 60_000);
    assert_eq!(plainflow.cross_domain_id().unwrap(), Some(resolved));
}

#[tokio::test]
async fn test_generates_when_no_server_has_id() {
    let harness = Harness::new();
    harness.transport.route("v1/id", MockReply::json(json!({ "id": null })));
    let plainflow = harness.build(default_servers(), localhost());

    let resolved = plainflow.retrieve_cross_domain_id().await.unwrap();
    assert_eq!(resolved.from_domain, "localhost");
    assert_eq!(identify_traits(&harness)[0]["crossDomainId"], json!(resolved.cross_domain_id));
}

#[tokio::test]
async fn test_bails_when_all_servers_error() {
    let harness = Harness::new();
    harness.transport.route("v1/id", MockReply::status(500));
    let plainflow = harness.build(default_servers(), localhost());

    let err = plainflow.retrieve_cross_domain_id().await.unwrap_err();
    assert_eq!(err.to_string(), "Internal Server Error");
    assert!(identify_traits(&harness).is_empty());
    assert!(!harness.storage.has(StorageKeys::CROSS_DOMAIN_ID).unwrap());
}

#[tokio::test]
async fn test_succeeds_when_one_server_fails() {
    let harness = Harness::new();
    harness.transport.route("xid.domain2.com", MockReply::status(500));
    harness.transport.route(
        "userdata.example1.com",
        MockReply::json(json!({ "id": "xidxid" })),
    );
    let plainflow = harness.build(default_servers(), localhost());

    let resolved = plainflow.retrieve_cross_domain_id().await.unwrap();
    assert_eq!(resolved.cross_domain_id, "xidxid");
    assert_eq!(resolved.from_domain, "userdata.example1.com");
    assert_eq!(identify_traits(&harness)[0]["crossDomainId"], "xidxid");
}

#[tokio::test]
async fn test_reset_clears_persisted_state() {
    let harness = Harness::new();
    let plainflow = harness.build(with_servers(&["localhost"]), localhost());
    plainflow.retrieve_cross_domain_id().await.unwrap();
    harness.storage.set(StorageKeys::AMP_ID, "amp").unwrap();
    harness
        .storage
        .set(StorageKeys::REFERRER, r#"{"id":"x","type":"millennial-media"}"#)
        .unwrap();

    plainflow.reset().unwrap();

    for key in [
        StorageKeys::REFERRER,
        StorageKeys::AMP_ID,
        StorageKeys::CROSS_DOMAIN_ID,
        StorageKeys::CROSS_DOMAIN_ID_DOMAIN,
        StorageKeys::CROSS_DOMAIN_ID_TIMESTAMP,
    ] {
        assert!(!harness.storage.has(key).unwrap(), "{key} should be cleared");
    }
    assert_eq!(plainflow.cross_domain_id().unwrap(), None);
}
