//! End-to-end tests for the login and fetch flow.
//!
//! Every endpoint is served by a local wiremock server; the client is pointed
//! at it through `ServiceConfig::with_hosts`.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fs2::FileExt;
use mifit_fetch::summary::DaySummary;
use mifit_fetch::{
    exit_code_for, run, Credentials, DownloadOutcome, Event, FetchError, FetchMode, FetchRequest,
    HuamiClient, ServiceConfig, Session,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EMAIL: &str = "user@example.com";
const REGISTRATION_PATH: &str = "/registrations/user%40example.com/tokens";
const LOGIN_PATH: &str = "/v2/client/login";
const MANIFEST_PATH: &str = "/market/watchface/123";

// =============================================================================
// Helpers
// =============================================================================

fn client_for(server: &MockServer) -> HuamiClient {
    let config = ServiceConfig::with_hosts(server.uri(), format!("{}{}", server.uri(), LOGIN_PATH));
    HuamiClient::with_config(config).unwrap()
}

fn request_for(server: &MockServer, output_dir: &Path, mode: FetchMode) -> FetchRequest {
    FetchRequest {
        credentials: Credentials::new(EMAIL, "hunter2"),
        url: format!("{}{}", server.uri(), MANIFEST_PATH),
        output_dir: output_dir.to_path_buf(),
        mode,
    }
}

fn redirect(query: &str) -> ResponseTemplate {
    ResponseTemplate::new(303).insert_header(
        "Location",
        format!(
            "https://s3-us-west-2.amazonws.com/hm-registration/successsignin.html?{}",
            query
        )
        .as_str(),
    )
}

async fn mount_registration(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(REGISTRATION_PATH))
        .and(body_string_contains("state=REDIRECTION"))
        .and(body_string_contains("client_id=HuaMi"))
        .and(body_string_contains("token=access"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .and(body_string_contains("grant_type=access_token"))
        .and(body_string_contains("code=A1"))
        .and(body_string_contains("country_code=US"))
        .and(body_string_contains("app_name=com.xiaomi.hm.health"))
        .and(body_string_contains("device_id=02%3A00%3A00%3A00%3A00%3A00"))
        .and(body_string_contains("device_model=android_phone"))
        .and(body_string_contains("app_version=4.0.9"))
        .and(body_string_contains("allow_registration=false"))
        .and(body_string_contains("third_name=huami"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_info": {
                "login_token": "LT",
                "app_token": "AT",
                "user_id": "1000123"
            },
            "result": "ok"
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_login_never_called(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;
}

async fn mount_manifest(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(MANIFEST_PATH))
        .and(query_param("device_type", "android_phone"))
        .and(query_param("userid", "1000123"))
        .and(header("apptoken", "AT"))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

fn files_in(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

// =============================================================================
// Download flow
// =============================================================================

#[tokio::test]
async fn test_downloads_zip_named_after_last_segment() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_registration(&server, redirect("access=A1&country_code=US&expiration=1")).await;
    mount_login(&server).await;
    mount_manifest(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({ "url": format!("{}/faces/123.zip", server.uri()) })),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/faces/123.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04face".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Download);
    let mut events = Vec::new();
    let report = run(&client, &request, |e| events.push(e.clone())).await.unwrap();

    let written = std::fs::read(out.path().join("123.zip")).unwrap();
    assert_eq!(written, b"PK\x03\x04face");
    assert_eq!(report.status, 200);
    assert_eq!(report.saved_count(), 1);
    assert_eq!(report.session.user_id, "1000123");
    assert_eq!(report.session.app_token, "AT");

    assert_eq!(
        events.first(),
        Some(&Event::LoggingIn {
            email: EMAIL.to_string()
        })
    );
    assert!(events.contains(&Event::ObtainedAccessToken));
    assert!(matches!(
        events.last(),
        Some(Event::Download(DownloadOutcome::Saved { bytes: 8, .. }))
    ));
}

#[tokio::test]
async fn test_non_zip_manifest_downloads_nothing() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_registration(&server, redirect("access=A1&country_code=US")).await;
    mount_login(&server).await;
    mount_manifest(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({ "url": format!("{}/faces/123.bin", server.uri()) })),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/faces/123.bin"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Download);
    let report = run(&client, &request, |_| {}).await.unwrap();

    assert_eq!(report.saved_count(), 0);
    assert!(matches!(
        report.downloads.as_slice(),
        [DownloadOutcome::NotAnArchive { .. }]
    ));
    assert!(files_in(out.path()).is_empty());
}

#[tokio::test]
async fn test_zip_404_is_reported_and_skipped() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_registration(&server, redirect("access=A1&country_code=US")).await;
    mount_login(&server).await;
    mount_manifest(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({ "url": format!("{}/faces/123.zip", server.uri()) })),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/faces/123.zip"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Download);
    let report = run(&client, &request, |_| {}).await.unwrap();

    assert!(matches!(
        report.downloads.as_slice(),
        [DownloadOutcome::Failed { status: 404, .. }]
    ));
    assert!(files_in(out.path()).is_empty());
}

#[tokio::test]
async fn test_manifest_non_200_is_silent() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_registration(&server, redirect("access=A1&country_code=US")).await;
    mount_login(&server).await;
    mount_manifest(&server, ResponseTemplate::new(401).set_body_string("denied")).await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Download);
    let report = run(&client, &request, |_| {}).await.unwrap();

    assert_eq!(report.status, 401);
    assert!(report.downloads.is_empty());
    assert!(files_in(out.path()).is_empty());
}

#[tokio::test]
async fn test_manifest_without_url_is_an_error() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_registration(&server, redirect("access=A1&country_code=US")).await;
    mount_login(&server).await;
    mount_manifest(&server, ResponseTemplate::new(200).set_body_json(json!({ "id": 123 }))).await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Download);
    let err = run(&client, &request, |_| {}).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<FetchError>(),
        Some(FetchError::MalformedManifest(_))
    ));
    assert_eq!(exit_code_for(&err), 65);
}

// =============================================================================
// Credential exchange failures
// =============================================================================

#[tokio::test]
async fn test_missing_access_stops_before_login() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_registration(&server, redirect("country_code=US")).await;
    mount_login_never_called(&server).await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Download);
    let mut events = Vec::new();
    let err = run(&client, &request, |e| events.push(e.clone())).await.unwrap_err();

    assert!(format!("{:#}", err).contains("No access token"));
    assert_eq!(exit_code_for(&err), 1);
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_missing_country_code_stops_before_login() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_registration(&server, redirect("access=A1")).await;
    mount_login_never_called(&server).await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Download);
    let err = run(&client, &request, |_| {}).await.unwrap_err();

    assert!(format!("{:#}", err).contains("No country_code"));
    assert_eq!(exit_code_for(&err), 1);
}

#[tokio::test]
async fn test_missing_location_header_means_no_access_token() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_registration(&server, ResponseTemplate::new(200)).await;
    mount_login_never_called(&server).await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Download);
    let err = run(&client, &request, |_| {}).await.unwrap_err();

    assert_eq!(err.downcast_ref::<FetchError>(), Some(&FetchError::MissingAccessToken));
}

#[tokio::test]
async fn test_registration_http_error_is_fatal() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_registration(&server, ResponseTemplate::new(401)).await;
    mount_login_never_called(&server).await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Download);
    let err = run(&client, &request, |_| {}).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<FetchError>(),
        Some(FetchError::HttpStatus { status: 401, .. })
    ));
    assert_ne!(exit_code_for(&err), 0);
}

#[tokio::test]
async fn test_email_is_percent_encoded_in_path() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/registrations/first.last%2Btag%40example.com/tokens"))
        .respond_with(redirect("access=A1&country_code=US"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let grant = client
        .exchange_credentials(&Credentials::new("first.last+tag@example.com", "pw"))
        .await
        .unwrap();
    assert_eq!(grant.access_code, "A1");
    assert_eq!(grant.country_code, "US");
}

// =============================================================================
// Session login
// =============================================================================

#[tokio::test]
async fn test_login_error_body_is_reported() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_registration(&server, redirect("access=A1&country_code=US")).await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error_code": "0106", "result": "error" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Download);
    let err = run(&client, &request, |_| {}).await.unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.contains("error_code=0106"), "unexpected message: {}", message);
    assert_eq!(exit_code_for(&err), 65);
}

// =============================================================================
// Activity summaries
// =============================================================================

#[tokio::test]
async fn test_summary_mode_decodes_days() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    let summary = STANDARD.encode(json!({ "stp": { "ttl": 1234, "cal": 50, "dis": 900 } }).to_string());
    mount_registration(&server, redirect("access=A1&country_code=US")).await;
    mount_login(&server).await;
    mount_manifest(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "date_time": "2024-03-01", "summary": summary }]
        })),
    )
    .await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Summary);
    let report = run(&client, &request, |_| {}).await.unwrap();

    assert!(report.downloads.is_empty());
    assert_eq!(report.days.len(), 1);
    let DaySummary::Decoded(day) = &report.days[0] else {
        panic!("expected decoded day, got {:?}", report.days[0]);
    };
    assert_eq!(day.date, "2024-03-01");
    assert!(files_in(out.path()).is_empty());
}

#[tokio::test]
async fn test_summary_mode_non_200_is_silent() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_registration(&server, redirect("access=A1&country_code=US")).await;
    mount_login(&server).await;
    mount_manifest(&server, ResponseTemplate::new(403)).await;

    let client = client_for(&server);
    let request = request_for(&server, out.path(), FetchMode::Summary);
    let mut events = Vec::new();
    let report = run(&client, &request, |e| events.push(e.clone())).await.unwrap();

    assert_eq!(report.status, 403);
    assert!(report.days.is_empty());
    assert_eq!(events.last(), Some(&Event::Response { status: 403 }));
}

// =============================================================================
// Client operations
// =============================================================================

fn session() -> Session {
    Session {
        user_id: "1000123".to_string(),
        app_token: "AT".to_string(),
        login_token: None,
    }
}

#[tokio::test]
async fn test_fetch_manifest_directly() {
    let server = MockServer::start().await;
    mount_manifest(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "url": "https://cdn.example.com/faces/123.zip" })),
    )
    .await;

    let client = client_for(&server);
    let (status, manifest) = client
        .fetch_manifest(&session(), &format!("{}{}", server.uri(), MANIFEST_PATH))
        .await
        .unwrap();
    assert_eq!(status.as_u16(), 200);
    assert_eq!(manifest.unwrap().url, "https://cdn.example.com/faces/123.zip");
}

#[tokio::test]
async fn test_fetch_manifest_non_200_has_no_manifest() {
    let server = MockServer::start().await;
    mount_manifest(&server, ResponseTemplate::new(404).set_body_string("not json")).await;

    let client = client_for(&server);
    let (status, manifest) = client
        .fetch_manifest(&session(), &format!("{}{}", server.uri(), MANIFEST_PATH))
        .await
        .unwrap();
    assert_eq!(status.as_u16(), 404);
    assert!(manifest.is_none());
}

#[tokio::test]
async fn test_download_overwrites_longer_file() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let dest = out.path().join("123.zip");
    std::fs::write(&dest, b"an older and much longer archive").unwrap();

    Mock::given(method("GET"))
        .and(path("/faces/123.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let outcome = client
        .download_archive(&format!("{}/faces/123.zip", server.uri()), &dest)
        .await
        .unwrap();

    assert!(outcome.is_saved());
    assert_eq!(std::fs::read(&dest).unwrap(), b"PK\x03\x04");
}

#[tokio::test]
async fn test_download_into_locked_file_keeps_contents() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let dest = out.path().join("123.zip");
    std::fs::write(&dest, b"being written elsewhere").unwrap();

    let holder = std::fs::OpenOptions::new().write(true).open(&dest).unwrap();
    holder.try_lock_exclusive().unwrap();

    Mock::given(method("GET"))
        .and(path("/faces/123.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .download_archive(&format!("{}/faces/123.zip", server.uri()), &dest)
        .await
        .unwrap_err();

    assert!(matches!(err.downcast_ref::<FetchError>(), Some(FetchError::Io(_))));
    assert_eq!(exit_code_for(&err), 74);
    assert_eq!(std::fs::read(&dest).unwrap(), b"being written elsewhere");

    holder.unlock().unwrap();
}
