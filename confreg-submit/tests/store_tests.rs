//! Primary store and confirmation trigger against a local fake PostgREST

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use confreg_common::registration::StoreId;
use confreg_common::store::{PostgrestClient, StoreSettings};
use confreg_common::{Gender, RegistrationRecord};
use confreg_submit::error::DeliveryError;
use confreg_submit::fallback::FallbackChain;
use confreg_submit::notifier::{EdgeFunctionNotifier, Notifier, DEFAULT_FUNCTION_NAME};
use confreg_submit::orchestrator::{DeliveryOutcome, RegistrationPipeline};
use confreg_submit::primary::{
    ConnectivityProbe, PrimaryStore, PrimarySubmitter, RestPrimaryStore, RetryPolicy,
    TokioSleeper,
};
use confreg_submit::queue_store::{MemoryQueueStore, QueueStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the fake answers an accepted insert
#[derive(Clone, Copy)]
enum Echo {
    /// Row exactly as the model expects it
    Typed,
    /// `timestamp` column without offset, as a drifted schema returns it
    Drifted,
    /// 201 with no body at all
    Empty,
}

#[derive(Clone)]
struct FakeStore {
    ping_status: Arc<AtomicU16>,
    echo: Echo,
    inserts: Arc<Mutex<Vec<Value>>>,
    insert_headers: Arc<Mutex<Vec<HeaderMap>>>,
    invocations: Arc<Mutex<Vec<(Value, Option<String>)>>>,
    function_status: StatusCode,
}

impl FakeStore {
    fn new(echo: Echo) -> Self {
        Self {
            ping_status: Arc::new(AtomicU16::new(404)),
            echo,
            inserts: Arc::new(Mutex::new(Vec::new())),
            insert_headers: Arc::new(Mutex::new(Vec::new())),
            invocations: Arc::new(Mutex::new(Vec::new())),
            function_status: StatusCode::OK,
        }
    }

    fn insert_count(&self) -> usize {
        self.inserts.lock().unwrap().len()
    }
}

async fn ping(State(store): State<FakeStore>) -> StatusCode {
    StatusCode::from_u16(store.ping_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn insert_rows(
    State(store): State<FakeStore>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> axum::response::Response {
    store.inserts.lock().unwrap().push(body.clone());
    store.insert_headers.lock().unwrap().push(headers);

    let mut row = body[0].clone();
    row["id"] = json!(7);
    match store.echo {
        Echo::Typed => {
            row["created_at"] = json!("2025-01-01T00:00:00Z");
            (StatusCode::CREATED, Json(json!([row]))).into_response()
        }
        Echo::Drifted => {
            row["created_at"] = json!("2025-01-01T00:00:00.123456");
            (StatusCode::CREATED, Json(json!([row]))).into_response()
        }
        Echo::Empty => StatusCode::CREATED.into_response(),
    }
}

async fn invoke(
    State(store): State<FakeStore>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let key = headers
        .get("apikey")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    store.invocations.lock().unwrap().push((body, key));
    (store.function_status, Json(json!({ "success": true })))
}

async fn spawn_fake_store(store: FakeStore) -> String {
    let app = Router::new()
        .route("/rest/v1/", get(ping))
        .route("/rest/v1/registrations", post(insert_rows))
        .route(
            &format!("/functions/v1/{}", DEFAULT_FUNCTION_NAME),
            post(invoke),
        )
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn settings(base_url: &str) -> StoreSettings {
    StoreSettings {
        base_url: base_url.to_string(),
        api_key: "anon-key".to_string(),
        request_timeout: Duration::from_secs(2),
    }
}

fn rest_store(base_url: &str) -> Arc<RestPrimaryStore> {
    Arc::new(RestPrimaryStore::new(&settings(base_url), "registrations").unwrap())
}

fn record() -> RegistrationRecord {
    RegistrationRecord {
        first_name: "Kofi".to_string(),
        last_name: "Mensah".to_string(),
        phone: Some("+233 201234567".to_string()),
        email: "kofi@example.com".to_string(),
        age: 38,
        gender: Gender::Male,
        state: "Ghana".to_string(),
        purpose: "Trader".to_string(),
    }
}

fn pipeline(base_url: &str) -> RegistrationPipeline {
    let store: Arc<dyn PrimaryStore> = rest_store(base_url);
    let submitter = PrimarySubmitter::new(
        store.clone(),
        ConnectivityProbe::new(store.clone(), Duration::from_secs(2)),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        },
        Arc::new(TokioSleeper),
    );
    let client = PostgrestClient::new(&settings(base_url)).unwrap();
    let queue: Arc<dyn QueueStore> = Arc::new(MemoryQueueStore::new());

    RegistrationPipeline::new(
        submitter,
        store,
        FallbackChain::new(vec![]),
        queue,
        Arc::new(EdgeFunctionNotifier::new(client, DEFAULT_FUNCTION_NAME)),
    )
}

// ============================================================================
// RestPrimaryStore
// ============================================================================

#[tokio::test]
async fn test_insert_posts_single_row_array() {
    let fake = FakeStore::new(Echo::Typed);
    let base = spawn_fake_store(fake.clone()).await;

    let rows = rest_store(&base).insert(&record()).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, StoreId::Int(7));
    assert!(rows[0].created_at.is_some());

    let inserts = fake.inserts.lock().unwrap();
    let body = inserts[0].as_array().unwrap();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0]["email"], "kofi@example.com");
    assert_eq!(body[0]["first_name"], "Kofi");

    let headers = fake.insert_headers.lock().unwrap()[0].clone();
    assert_eq!(headers["apikey"], "anon-key");
    assert_eq!(headers["authorization"], "Bearer anon-key");
    assert_eq!(headers["prefer"], "return=representation");
}

#[tokio::test]
async fn test_ping_status_drives_probe() {
    let fake = FakeStore::new(Echo::Typed);
    let base = spawn_fake_store(fake.clone()).await;
    let store: Arc<dyn PrimaryStore> = rest_store(&base);
    let probe = ConnectivityProbe::new(store, Duration::from_secs(2));

    let report = probe.check().await;
    assert!(report.reachable);
    assert_eq!(report.detail, "HTTP 404");

    fake.ping_status.store(401, Ordering::SeqCst);
    let report = probe.check().await;
    assert!(!report.reachable);
    assert_eq!(report.detail, "HTTP 401");
}

#[tokio::test]
async fn test_bad_key_skips_write_attempts() {
    let fake = FakeStore::new(Echo::Typed);
    fake.ping_status.store(401, Ordering::SeqCst);
    let base = spawn_fake_store(fake.clone()).await;

    let outcome = pipeline(&base).submit(record()).await;

    assert!(matches!(outcome, DeliveryOutcome::QueuedLocal { .. }));
    assert_eq!(fake.insert_count(), 0);
}

#[tokio::test]
async fn test_accepted_insert_with_drifted_row_is_delivered_once() {
    let fake = FakeStore::new(Echo::Drifted);
    let base = spawn_fake_store(fake.clone()).await;
    let pipeline = pipeline(&base);

    let outcome = pipeline.submit(record()).await;

    match &outcome {
        DeliveryOutcome::DeliveredPrimary { records } => {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].id, StoreId::Int(7));
            assert_eq!(records[0].record, record());
        }
        other => panic!("expected primary delivery, got {:?}", other),
    }
    assert_eq!(fake.insert_count(), 1);
    assert!(pipeline.queue().list_pending().await.is_empty());

    // The salvaged id still triggers the confirmation email
    assert!(pipeline.wait_for_notifications(Duration::from_secs(2)).await);
    let invocations = fake.invocations.lock().unwrap();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].0, json!({ "registration_id": "7" }));
}

#[tokio::test]
async fn test_accepted_insert_without_body_is_not_retried() {
    let fake = FakeStore::new(Echo::Empty);
    let base = spawn_fake_store(fake.clone()).await;
    let pipeline = pipeline(&base);

    let outcome = pipeline.submit(record()).await;

    assert_eq!(
        outcome,
        DeliveryOutcome::DeliveredPrimary { records: vec![] }
    );
    assert_eq!(fake.insert_count(), 1);
    assert!(pipeline.wait_for_notifications(Duration::from_millis(10)).await);
    assert!(fake.invocations.lock().unwrap().is_empty());
}

// ============================================================================
// EdgeFunctionNotifier
// ============================================================================

#[tokio::test]
async fn test_notifier_posts_registration_id_with_api_key() {
    let fake = FakeStore::new(Echo::Typed);
    let base = spawn_fake_store(fake.clone()).await;
    let client = PostgrestClient::new(&settings(&base)).unwrap();
    let notifier = EdgeFunctionNotifier::new(client, DEFAULT_FUNCTION_NAME);

    notifier.notify("42").await.unwrap();

    let invocations = fake.invocations.lock().unwrap();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].0, json!({ "registration_id": "42" }));
    assert_eq!(invocations[0].1.as_deref(), Some("anon-key"));
}

#[tokio::test]
async fn test_notifier_reports_function_error() {
    let fake = FakeStore {
        function_status: StatusCode::INTERNAL_SERVER_ERROR,
        ..FakeStore::new(Echo::Typed)
    };
    let base = spawn_fake_store(fake.clone()).await;
    let client = PostgrestClient::new(&settings(&base)).unwrap();
    let notifier = EdgeFunctionNotifier::new(client, "missing-function");

    // Unknown function answers 404 from the router
    let err = notifier.notify("42").await.unwrap_err();
    assert!(matches!(err, DeliveryError::NotifierFailure(_)));

    let notifier = EdgeFunctionNotifier::new(
        PostgrestClient::new(&settings(&base)).unwrap(),
        DEFAULT_FUNCTION_NAME,
    );
    let err = notifier.notify("42").await.unwrap_err();
    match err {
        DeliveryError::NotifierFailure(msg) => assert!(msg.contains("500")),
        other => panic!("expected notifier failure, got {:?}", other),
    }
}
