use mediabatch::config::RemoteConfig;
use mediabatch::remote::{AuphonicClient, ProcessingOptions, RemoteApi, RemoteApiError};
use serde_json::json;
use wiremock::matchers::{basic_auth, body_partial_json, body_string_contains, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(base_url: &str) -> AuphonicClient {
    let config = RemoteConfig {
        base_url: base_url.to_string(),
        username: "alice".to_string(),
        password: "secret".to_string(),
        request_timeout_secs: 5,
        connect_timeout_secs: 2,
        ..RemoteConfig::default()
    };
    AuphonicClient::new(&config).unwrap()
}

fn envelope(data: serde_json::Value) -> serde_json::Value {
    json!({ "status_code": 200, "error_code": null, "error_message": "", "data": data })
}

#[tokio::test]
async fn create_job_returns_production_uuid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/productions.json"))
        .and(basic_auth("alice", "secret"))
        .and(body_partial_json(json!({
            "metadata": { "title": "ep01.wav" },
            "algorithms": { "denoise": true, "loudnesstarget": -16 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({ "uuid": "prod-123" }))))
        .expect(1)
        .mount(&server)
        .await;

    let options = ProcessingOptions {
        loudness_target: -16,
        noise_reduction: true,
    };
    let id = client_for(&server.uri()).create_job(&options, "ep01.wav").await.unwrap();
    assert_eq!(id, "prod-123");
}

#[tokio::test]
async fn envelope_failure_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/production/prod-1/start.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 400,
            "error_code": "no_input",
            "error_message": "No input file uploaded",
            "data": null
        })))
        .mount(&server)
        .await;

    let err = client_for(&server.uri()).start_job("prod-1").await.unwrap_err();
    match err {
        RemoteApiError::Protocol { status, ref message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "No input file uploaded");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
    assert!(!err.is_transport());
}

#[tokio::test]
async fn http_error_status_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/production/prod-1.json"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Authentication credentials were not provided."))
        .mount(&server)
        .await;

    let err = client_for(&server.uri()).fetch_status("prod-1").await.unwrap_err();
    assert!(err.is_protocol());
    assert!(matches!(err, RemoteApiError::Protocol { status: 401, .. }));
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/production/prod-1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server.uri()).fetch_status("prod-1").await.unwrap_err();
    assert!(matches!(err, RemoteApiError::Decode(_)));
    assert!(err.is_protocol());
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    // Bind then drop a listener so the port is known to refuse connections.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = client_for(&format!("http://127.0.0.1:{port}"))
        .delete_job("prod-1")
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(!err.is_protocol());
}

#[tokio::test]
async fn fetch_status_reads_code_text_and_download_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/production/prod-1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "uuid": "prod-1",
            "status": 3,
            "status_string": "Done",
            "output_files": [
                { "format": "aac", "ending": "m4a", "download_url": "https://auphonic.com/api/download/audio-result/prod-1/ep01.m4a" }
            ]
        }))))
        .mount(&server)
        .await;

    let status = client_for(&server.uri()).fetch_status("prod-1").await.unwrap();
    assert_eq!(status.status_code, 3);
    assert_eq!(status.status_text, "Done");
    assert_eq!(
        status.result_url.as_deref(),
        Some("https://auphonic.com/api/download/audio-result/prod-1/ep01.m4a")
    );
}

#[tokio::test]
async fn in_progress_status_has_no_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/production/prod-1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "uuid": "prod-1",
            "status": 4,
            "status_string": "Audio Processing",
            "output_files": []
        }))))
        .mount(&server)
        .await;

    let status = client_for(&server.uri()).fetch_status("prod-1").await.unwrap();
    assert_eq!(status.status_code, 4);
    assert!(status.result_url.is_none());
}

#[tokio::test]
async fn upload_streams_multipart_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("ep01.wav");
    std::fs::write(&source, b"RIFF fake wave data").unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/production/prod-1/upload.json"))
        .and(basic_auth("alice", "secret"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .and(body_string_contains("name=\"input_file\""))
        .and(body_string_contains("RIFF fake wave data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({ "uuid": "prod-1" }))))
        .expect(1)
        .mount(&server)
        .await;

    let file = tokio::fs::File::open(&source).await.unwrap();
    let id = client_for(&server.uri())
        .upload_payload("prod-1", file, "ep01.wav")
        .await
        .unwrap();
    assert_eq!(id, "prod-1");
}

#[tokio::test]
async fn delete_job_echoes_id() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/production/prod-1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!(null))))
        .expect(1)
        .mount(&server)
        .await;

    let id = client_for(&server.uri()).delete_job("prod-1").await.unwrap();
    assert_eq!(id, "prod-1");
}

#[tokio::test]
async fn download_writes_artifact_without_leftovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/ep01.m4a"))
        .and(basic_auth("alice", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"processed audio".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("ep01-auphonic.m4a");
    let url = format!("{}/download/ep01.m4a", server.uri());

    let written = client_for(&server.uri())
        .download_artifact(&url, &destination)
        .await
        .unwrap();

    assert_eq!(written, destination);
    assert_eq!(std::fs::read(&destination).unwrap(), b"processed audio");
    assert!(!dir.path().join("ep01-auphonic.m4a.part").exists());
}

#[tokio::test]
async fn failed_download_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/missing.m4a"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("missing.m4a");
    let url = format!("{}/download/missing.m4a", server.uri());

    let err = client_for(&server.uri())
        .download_artifact(&url, &destination)
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteApiError::Protocol { status: 404, .. }));
    assert!(!destination.exists());
    assert!(!dir.path().join("missing.m4a.part").exists());
}
