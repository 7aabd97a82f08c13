//! Tests for the `stage` and `pipeline` subcommands, using a mock source and a
//! mock Cloud Storage endpoint.

use cli_test_dir::*;
use wiremock::{
    matchers::{body_bytes, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use super::*;

/// Point every HTTP endpoint at `server`.
fn mock_config(server: &MockServer) -> String {
    format!(
        "bucket = \"test-bucket\"\nsource_url = \"{uri}/get_latest_addresses\"\nstorage_endpoint = \"{uri}/\"\n",
        uri = server.uri(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn stage_extract_raw_addresses_uploads_to_storage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get_latest_addresses"))
        .respond_with(ResponseTemplate::new(200).set_body_string("id,addr\n1,100 Main St"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/test-bucket/o"))
        .and(query_param("name", "addresses_2021-10-22.csv"))
        .and(body_bytes(b"id,addr\n1,100 Main St".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"bucket": "test-bucket", "name": "addresses_2021-10-22.csv", "size": "21"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let testdir = TestDir::new("geopipe", "stage_extract_raw_addresses_uploads_to_storage");
    write_config(&testdir, &mock_config(&server));
    geopipe_cmd(&testdir)
        .args(["stage", "extract_raw_addresses", "--date", "2021-10-22"])
        .tee_output()
        .expect_success();

    server.verify().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stage_fails_on_error_responses_unless_asked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get_latest_addresses"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream broke"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/test-bucket/o"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"bucket": "test-bucket", "name": "addresses_2021-10-22.csv", "size": "14"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let testdir = TestDir::new("geopipe", "stage_fails_on_error_responses_unless_asked");
    write_config(&testdir, &mock_config(&server));
    let output = geopipe_cmd(&testdir)
        .args(["stage", "extract_raw_addresses", "--date", "2021-10-22"])
        .expect_failure();
    assert!(output.stderr_str().contains("upstream broke"));

    geopipe_cmd(&testdir)
        .args([
            "stage",
            "extract_raw_addresses",
            "--date",
            "2021-10-22",
            "--accept-error-responses",
        ])
        .expect_success();

    server.verify().await;
}

#[test]
fn load_stage_requires_a_database() {
    let testdir = TestDir::new("geopipe", "load_stage_requires_a_database");
    write_config(
        &testdir,
        "bucket = \"test-bucket\"\nstorage_endpoint = \"http://127.0.0.1:9/\"\n",
    );
    let output = geopipe_cmd(&testdir)
        .args(["stage", "load_address_data", "--date", "2021-10-22"])
        .expect_failure();
    assert!(output.stderr_str().contains("no database configured"));
}

#[test]
fn pipeline_requires_a_bucket() {
    let testdir = TestDir::new("geopipe", "pipeline_requires_a_bucket");
    let output = geopipe_cmd(&testdir)
        .args(["pipeline", "--date", "2021-10-22"])
        .expect_failure();
    assert!(output.stderr_str().contains("no bucket configured"));
}
