//! Tests for the three pipeline operations, using in-memory stores and a mock
//! HTTP server.

use geopipe::{
    database::StoredTable,
    delimited::{Column, ColumnType, ParseOptions},
    ops::{http_to_store, store_to_local_file, store_to_table},
    store::is_blob_not_found,
    BlobName, BlobStore, ColumnNames, FetchRequest, Fetcher, MemoryDatabase, MemoryStore,
    StatusPolicy, TableName, TemporaryFiles,
};
use pretty_assertions::assert_eq;
use std::fs;
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn blob(name: &str) -> BlobName {
    BlobName::new("test-bucket", name).unwrap()
}

async fn serve(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path("/latest"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn latest_url(server: &MockServer) -> Url {
    format!("{}/latest", server.uri()).parse().unwrap()
}

#[tokio::test]
async fn http_to_store_saves_the_exact_response_body() {
    let server = MockServer::start().await;
    serve(&server, 200, "id,addr\n1,100 Main St").await;

    let store = MemoryStore::new();
    let fetcher = Fetcher::new(StatusPolicy::RequireSuccess, None).unwrap();
    let request = FetchRequest::get(latest_url(&server)).unwrap();
    let dest = blob("addresses.csv");
    let len = http_to_store(&fetcher, &request, &store, &dest, &TemporaryFiles::default())
        .await
        .unwrap();

    assert_eq!(len, 21);
    assert_eq!(store.get(&dest).unwrap().as_ref(), b"id,addr\n1,100 Main St");
}

#[tokio::test]
async fn http_to_store_cleans_up_its_local_copy() {
    let server = MockServer::start().await;
    let body = "id,addr\n".to_owned() + &"1,100 Main St\n".repeat(10_000);
    serve(&server, 200, &body).await;

    let dir = tempfile::tempdir().unwrap();
    let temporaries = TemporaryFiles::new(Some(dir.path().to_owned()));
    let store = MemoryStore::new();
    let fetcher = Fetcher::new(StatusPolicy::RequireSuccess, None).unwrap();
    let request = FetchRequest::get(latest_url(&server)).unwrap();
    let dest = blob("addresses.csv");
    http_to_store(&fetcher, &request, &store, &dest, &temporaries)
        .await
        .unwrap();

    assert_eq!(store.get(&dest).unwrap().as_ref(), body.as_bytes());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn http_to_store_rejects_error_statuses_by_default() {
    let server = MockServer::start().await;
    serve(&server, 503, "try again later").await;

    let store = MemoryStore::new();
    let fetcher = Fetcher::new(StatusPolicy::default(), None).unwrap();
    let request = FetchRequest::get(latest_url(&server)).unwrap();
    let err = http_to_store(
        &fetcher,
        &request,
        &store,
        &blob("addresses.csv"),
        &TemporaryFiles::default(),
    )
    .await
    .unwrap_err();

    let msg = format!("{:?}", err);
    assert!(msg.contains("503"), "unexpected error: {}", msg);
    assert!(msg.contains("try again later"), "unexpected error: {}", msg);
    assert!(store.blob_names().is_empty());
}

#[tokio::test]
async fn http_to_store_can_keep_error_bodies() {
    let server = MockServer::start().await;
    serve(&server, 500, "<html>Internal Server Error</html>").await;

    let store = MemoryStore::new();
    let fetcher = Fetcher::new(StatusPolicy::StoreAnyResponse, None).unwrap();
    let request = FetchRequest::get(latest_url(&server)).unwrap();
    let dest = blob("addresses.csv");
    http_to_store(&fetcher, &request, &store, &dest, &TemporaryFiles::default())
        .await
        .unwrap();

    assert_eq!(
        store.get(&dest).unwrap().as_ref(),
        b"<html>Internal Server Error</html>"
    );
}

#[tokio::test]
async fn http_to_store_reports_unreachable_hosts() {
    // Nothing listens on port 9 (discard) on test machines.
    let url = "http://127.0.0.1:9/latest".parse::<Url>().unwrap();
    let store = MemoryStore::new();
    let fetcher = Fetcher::new(StatusPolicy::default(), None).unwrap();
    let request = FetchRequest::get(url).unwrap();
    let result = http_to_store(
        &fetcher,
        &request,
        &store,
        &blob("addresses.csv"),
        &TemporaryFiles::default(),
    )
    .await;
    assert!(result.is_err());
    assert!(store.blob_names().is_empty());
}

#[tokio::test]
async fn store_to_local_file_round_trips_bytes() {
    let store = MemoryStore::new();
    let src = blob("data/raw.bin");
    let data = (0..=255u8).collect::<Vec<_>>();
    store.upload(&src, data.clone().into()).await.unwrap();

    let temporaries = TemporaryFiles::default();
    let path = store_to_local_file(&store, &src, None, &temporaries)
        .await
        .unwrap();
    assert_eq!(fs::read(&path).unwrap(), data);
    fs::remove_file(&path).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("chosen.bin");
    let path = store_to_local_file(&store, &src, Some(&target), &temporaries)
        .await
        .unwrap();
    assert_eq!(path, target);
    assert_eq!(fs::read(&target).unwrap(), data);
}

#[tokio::test]
async fn store_to_local_file_fails_on_missing_blobs() {
    let store = MemoryStore::new();
    let err = store_to_local_file(
        &store,
        &blob("missing.csv"),
        None,
        &TemporaryFiles::default(),
    )
    .await
    .unwrap_err();
    assert!(is_blob_not_found(&err));
}

#[tokio::test]
async fn store_to_table_replaces_existing_tables() {
    let store = MemoryStore::new();
    let src = blob("geocoded.csv");
    store
        .upload(
            &src,
            "1,100 Main St,Match\n2,200 Oak Ave,No_Match\n3,300 Elm St,Tie\n".into(),
        )
        .await
        .unwrap();

    let db = MemoryDatabase::new();
    let table_name = "geo.addresses".parse::<TableName>().unwrap();
    db.insert_table(
        table_name.clone(),
        StoredTable {
            columns: vec![Column {
                name: "old".to_owned(),
                data_type: ColumnType::Text,
            }],
            rows: vec![vec![Some("stale".to_owned())]; 10],
        },
    );

    let opt = ParseOptions::with_column_names(ColumnNames::explicit(["id", "addr", "status"]));
    let rows = store_to_table(
        &store,
        &src,
        &db,
        &table_name,
        &opt,
        &TemporaryFiles::default(),
    )
    .await
    .unwrap();
    assert_eq!(rows, 3);

    let table = db.table(&table_name).unwrap();
    let names = table.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["id", "addr", "status"]);
    assert_eq!(table.columns[0].data_type, ColumnType::Int64);
    assert_eq!(table.rows.len(), 3);
    assert!(table.rows.iter().all(|row| row.len() == 3));
    assert_eq!(table.rows[1][2].as_deref(), Some("No_Match"));
}

#[tokio::test]
async fn store_to_table_infers_headers() {
    let store = MemoryStore::new();
    let src = blob("with_header.csv");
    store
        .upload(&src, "id,addr\n1,100 Main St\n".into())
        .await
        .unwrap();

    let db = MemoryDatabase::new();
    let table_name = "addresses".parse::<TableName>().unwrap();
    store_to_table(
        &store,
        &src,
        &db,
        &table_name,
        &ParseOptions::default(),
        &TemporaryFiles::default(),
    )
    .await
    .unwrap();

    let table = db.table(&table_name).unwrap();
    assert_eq!(table.columns[1].name, "addr");
    assert_eq!(table.rows, vec![vec![Some("1".to_owned()), Some("100 Main St".to_owned())]]);
}

#[tokio::test]
async fn store_to_table_leaves_the_table_alone_on_parse_errors() {
    let store = MemoryStore::new();
    let src = blob("ragged.csv");
    store
        .upload(&src, "1,2\n1,2,3,4\n".into())
        .await
        .unwrap();

    let db = MemoryDatabase::new();
    let table_name = "addresses".parse::<TableName>().unwrap();
    let opt = ParseOptions::with_column_names(ColumnNames::explicit(["a", "b"]));
    let result = store_to_table(
        &store,
        &src,
        &db,
        &table_name,
        &opt,
        &TemporaryFiles::default(),
    )
    .await;
    assert!(result.is_err());
    assert!(db.table(&table_name).is_none());
}
