//! Integration tests for the PostgREST client against a local fake store

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use confreg_common::registration::{StoreId, StoredRegistration};
use confreg_common::store::{PostgrestClient, StoreError, StoreSettings};
use confreg_common::{Gender, RegistrationRecord};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct FakeStore {
    rows: Arc<Mutex<Vec<Value>>>,
    seen_keys: Arc<Mutex<Vec<String>>>,
}

async fn insert_rows(
    State(store): State<FakeStore>,
    headers: HeaderMap,
    Json(rows): Json<Vec<Value>>,
) -> (StatusCode, Json<Value>) {
    if let Some(key) = headers.get("apikey").and_then(|v| v.to_str().ok()) {
        store.seen_keys.lock().unwrap().push(key.to_string());
    }
    if headers.get("prefer").and_then(|v| v.to_str().ok()) != Some("return=representation") {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "missing Prefer"})));
    }

    let mut stored = store.rows.lock().unwrap();
    let mut echoed = Vec::new();
    for mut row in rows {
        row["id"] = json!(stored.len() as i64 + 1);
        stored.push(row.clone());
        echoed.push(row);
    }
    (StatusCode::CREATED, Json(Value::Array(echoed)))
}

async fn select_rows(
    State(store): State<FakeStore>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let wanted = params.get("id").cloned().unwrap_or_default();
    let rows: Vec<Value> = store
        .rows
        .lock()
        .unwrap()
        .iter()
        .filter(|row| format!("eq.{}", row["id"]) == wanted)
        .cloned()
        .collect();
    Json(Value::Array(rows))
}

async fn spawn_fake_store(store: FakeStore) -> String {
    let app = Router::new()
        .route("/rest/v1/", get(|| async { StatusCode::NOT_FOUND }))
        .route("/rest/v1/registrations", post(insert_rows).get(select_rows))
        .route(
            "/functions/v1/broken",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client_for(base_url: &str) -> PostgrestClient {
    PostgrestClient::new(&StoreSettings {
        base_url: format!("{}/", base_url),
        api_key: "anon-key".to_string(),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn sample_record() -> RegistrationRecord {
    RegistrationRecord {
        first_name: "Ravi".to_string(),
        last_name: "Iyer".to_string(),
        phone: None,
        email: "ravi@example.com".to_string(),
        age: 41,
        gender: Gender::Male,
        state: "India".to_string(),
        purpose: "Investor".to_string(),
    }
}

#[tokio::test]
async fn test_ping_reports_status_without_judging_it() {
    let base = spawn_fake_store(FakeStore::default()).await;
    let client = client_for(&base);

    let status = client.ping(Duration::from_secs(2)).await.unwrap();
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_insert_returns_echoed_rows_with_ids() {
    let store = FakeStore::default();
    let base = spawn_fake_store(store.clone()).await;
    let client = client_for(&base);

    let rows: Vec<StoredRegistration> = client
        .insert("registrations", &[sample_record()])
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, StoreId::Int(1));
    assert_eq!(rows[0].record, sample_record());
    assert_eq!(store.seen_keys.lock().unwrap().as_slice(), ["anon-key"]);
}

#[tokio::test]
async fn test_select_by_id_finds_inserted_row() {
    let base = spawn_fake_store(FakeStore::default()).await;
    let client = client_for(&base);

    let _: Vec<StoredRegistration> = client
        .insert("registrations", &[sample_record()])
        .await
        .unwrap();

    let found: Option<StoredRegistration> =
        client.select_by_id("registrations", "1").await.unwrap();
    assert_eq!(found.map(|r| r.record.email), Some("ravi@example.com".to_string()));

    let missing: Option<StoredRegistration> =
        client.select_by_id("registrations", "99").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_function_error_surfaces_status_and_body() {
    let base = spawn_fake_store(FakeStore::default()).await;
    let client = client_for(&base);

    let err = client
        .invoke_function("broken", &json!({"registration_id": "1"}))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::Api {
            status: 500,
            body: "boom".to_string()
        }
    );
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(&format!("http://{}", addr));
    let err = client.ping(Duration::from_secs(2)).await.unwrap_err();
    assert!(matches!(err, StoreError::Network(_)), "got {:?}", err);
}
