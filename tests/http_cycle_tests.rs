//! End-to-end cycle tests against a mock Remote Config server.

use mockito::Matcher;
use remote_config_sync::sync::StaticToken;
use remote_config_sync::{ConfigSyncCycle, HttpBackend, PatchSpec, SyncError, WriteMode};
use serde_json::json;

const PATH: &str = "/v1/projects/demo/remoteConfig";

fn cycle(server: &mockito::ServerGuard) -> ConfigSyncCycle<HttpBackend, StaticToken> {
    let backend = HttpBackend::new(&server.url(), "demo").unwrap();
    ConfigSyncCycle::new(backend, StaticToken::new("test-token"))
}

#[test]
fn test_fetch_patch_write_scenario() {
    let mut server = mockito::Server::new();
    let get = server
        .mock("GET", PATH)
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("etag", "etag-1")
        .with_body(r#"{"parameters":{"test":{"defaultValue":{"value":"old"}}}}"#)
        .create();
    let put = server
        .mock("PUT", PATH)
        .match_header("authorization", "Bearer test-token")
        .match_header("content-type", "application/json")
        .match_header("if-match", "etag-1")
        .match_body(Matcher::Json(
            json!({"parameters": {"test": {"defaultValue": {"value": "prod3"}}}}),
        ))
        .with_status(200)
        .with_header("etag", "etag-2")
        .with_body(r#"{"parameters":{"test":{"defaultValue":{"value":"prod3"}}},"version":{"versionNumber":"22"}}"#)
        .create();

    let spec = PatchSpec::set("parameters.test.defaultValue.value", json!("prod3")).unwrap();
    let outcome = cycle(&server).run(&spec, WriteMode::Guarded).unwrap();

    get.assert();
    put.assert();
    assert_eq!(outcome.result.etag.unwrap().as_str(), "etag-2");
    assert_eq!(outcome.result.version_number.as_deref(), Some("22"));
}

#[test]
fn test_missing_etag_header_never_writes() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", PATH)
        .with_status(200)
        .with_body(r#"{"parameters":{"test":{"defaultValue":{"value":"old"}}}}"#)
        .create();
    let put = server.mock("PUT", Matcher::Any).expect(0).create();

    let spec = PatchSpec::set("parameters.test.defaultValue.value", json!("prod3")).unwrap();
    let err = cycle(&server).run(&spec, WriteMode::Guarded).unwrap_err();

    assert!(matches!(err, SyncError::Fetch { .. }));
    put.assert();
}

#[test]
fn test_conflict_surfaces_status_and_body() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", PATH)
        .with_status(200)
        .with_header("etag", "etag-1")
        .with_body(r#"{"parameters":{"test":{"defaultValue":{"value":"old"}}}}"#)
        .create();
    let put = server
        .mock("PUT", PATH)
        .with_status(412)
        .with_body(r#"{"error":{"status":"FAILED_PRECONDITION"}}"#)
        .expect(1)
        .create();

    let spec = PatchSpec::set("parameters.test.defaultValue.value", json!("prod3")).unwrap();
    let err = cycle(&server).run(&spec, WriteMode::Guarded).unwrap_err();

    put.assert();
    assert!(err.is_conflict());
    let message = err.to_string();
    assert!(message.contains("412"));
    assert!(message.contains("FAILED_PRECONDITION"));
}

#[test]
fn test_rollback_scenario() {
    let mut server = mockito::Server::new();
    let post = server
        .mock("POST", format!("{}:rollback", PATH).as_str())
        .match_body(Matcher::Json(json!({"versionNumber": "21"})))
        .with_status(200)
        .with_header("etag", "etag-3")
        .with_body("{}")
        .create();

    let result = cycle(&server).rollback("21").unwrap();

    post.assert();
    assert_eq!(result.etag.unwrap().as_str(), "etag-3");
}
