//! Integration tests for the incremental writer against a wiremock Firestore.
//!
//! The client runs in emulator mode so no token exchange is involved; the
//! service-account path is covered in `auth.rs`.

use glucosync_core::Measurement;
use glucosync_firestore::{write_new_measurements, FirestoreClient, FirestoreError};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MIN: i64 = 60_000;
const BASE_TS: i64 = 1_705_276_800_000;

fn test_client(server: &MockServer) -> FirestoreClient {
    FirestoreClient::emulator("unused:0", "demo", 5)
        .expect("client construction should not fail")
        .with_api_root(&format!("{}/v1", server.uri()))
}

fn every_five_minutes(n: i64) -> Vec<Measurement> {
    (0..n)
        .map(|i| Measurement::new(BASE_TS + i * 5 * MIN, 100 + i % 50))
        .collect()
}

fn query_rows(timestamps: &[i64]) -> Value {
    let mut rows: Vec<Value> = timestamps
        .iter()
        .map(|ts| {
            json!({
                "document": {
                    "name": "projects/demo/databases/(default)/documents/glucose/existing",
                    "fields": {
                        "timestamp": {"integerValue": ts.to_string()},
                        "value": {"integerValue": "100"},
                        "isHi": {"booleanValue": false}
                    }
                },
                "readTime": "2024-01-15T00:00:00Z"
            })
        })
        .collect();
    if rows.is_empty() {
        rows.push(json!({"readTime": "2024-01-15T00:00:00Z"}));
    }
    Value::Array(rows)
}

async fn commit_sizes(server: &MockServer) -> Vec<usize> {
    server
        .received_requests()
        .await
        .expect("request recording enabled")
        .iter()
        .filter(|r| r.url.path().ends_with(":commit"))
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["writes"].as_array().unwrap().len()
        })
        .collect()
}

#[tokio::test]
async fn thousand_new_records_commit_in_three_capped_batches() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"/documents:runQuery$"))
        .and(header("authorization", "Bearer owner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_rows(&[])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/documents:commit$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"writeResults": []})))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let summary = write_new_measurements(&client, "glucose", &every_five_minutes(1000), 450)
        .await
        .unwrap();

    assert_eq!(summary.written, 1000);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.batches, 3);
    assert_eq!(commit_sizes(&server).await, vec![450, 450, 100]);
}

#[tokio::test]
async fn query_covers_whole_minutes_of_input() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"/documents:runQuery$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_rows(&[])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/documents:commit$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = test_client(&server);
    write_new_measurements(&client, "glucose", &every_five_minutes(3), 450)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let query: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let filters = &query["structuredQuery"]["where"]["compositeFilter"]["filters"];
    assert_eq!(query["structuredQuery"]["from"][0]["collectionId"], "glucose");
    assert_eq!(filters[0]["fieldFilter"]["op"], "GREATER_THAN_OR_EQUAL");
    assert_eq!(
        filters[0]["fieldFilter"]["value"]["integerValue"],
        BASE_TS.to_string()
    );
    assert_eq!(filters[1]["fieldFilter"]["op"], "LESS_THAN_OR_EQUAL");
    assert_eq!(
        filters[1]["fieldFilter"]["value"]["integerValue"],
        (BASE_TS + 10 * MIN + 59_999).to_string()
    );
}

#[tokio::test]
async fn stored_reading_earlier_in_first_minute_blocks_rewrite() {
    let server = MockServer::start().await;

    // Only a query widened to the start of minute 0 sees the stored reading.
    Mock::given(method("POST"))
        .and(path_regex(r"/documents:runQuery$"))
        .and(body_string_contains(r#"{"integerValue":"0"}"#))
        .and(body_string_contains(r#"{"integerValue":"359999"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_rows(&[10_000])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/documents:commit$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let fresh = [Measurement::new(40_000, 110), Measurement::new(300_000, 120)];
    let summary = write_new_measurements(&client, "glucose", &fresh, 450)
        .await
        .unwrap();

    assert_eq!(summary.written, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(commit_sizes(&server).await, vec![1]);
}

#[tokio::test]
async fn stored_minutes_are_skipped() {
    let server = MockServer::start().await;
    let measurements = every_five_minutes(4);

    // Same minutes as records 0 and 2, different seconds.
    let stored = [BASE_TS + 12_000, BASE_TS + 10 * MIN + 45_000];
    Mock::given(method("POST"))
        .and(path_regex(r"/documents:runQuery$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_rows(&stored)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/documents:commit$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let summary = write_new_measurements(&client, "glucose", &measurements, 450)
        .await
        .unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.skipped, 2);

    let requests = server.received_requests().await.unwrap();
    let commit: Value = serde_json::from_slice(&requests[1].body).unwrap();
    let written: Vec<&str> = commit["writes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["update"]["fields"]["timestamp"]["integerValue"].as_str().unwrap())
        .collect();
    assert_eq!(
        written,
        vec![
            (BASE_TS + 5 * MIN).to_string().as_str(),
            (BASE_TS + 15 * MIN).to_string().as_str()
        ]
    );
}

#[tokio::test]
async fn second_run_over_same_data_writes_nothing() {
    let server = MockServer::start().await;
    let measurements = every_five_minutes(20);
    let stored: Vec<i64> = measurements.iter().map(|m| m.timestamp_ms).collect();

    Mock::given(method("POST"))
        .and(path_regex(r"/documents:runQuery$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_rows(&[])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/documents:runQuery$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_rows(&stored)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/documents:commit$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let first = write_new_measurements(&client, "glucose", &measurements, 450)
        .await
        .unwrap();
    let second = write_new_measurements(&client, "glucose", &measurements, 450)
        .await
        .unwrap();

    assert_eq!(first.written, 20);
    assert_eq!(second.written, 0);
    assert_eq!(second.skipped, 20);
    assert_eq!(second.batches, 0);
}

#[tokio::test]
async fn empty_input_makes_no_requests() {
    let server = MockServer::start().await;
    let client = test_client(&server);

    let summary = write_new_measurements(&client, "glucose", &[], 450)
        .await
        .unwrap();

    assert_eq!(summary.written, 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_commit_propagates_after_earlier_batches() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"/documents:runQuery$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_rows(&[])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/documents:commit$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/documents:commit$"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = write_new_measurements(&client, "glucose", &every_five_minutes(10), 4)
        .await
        .unwrap_err();

    assert!(
        matches!(err, FirestoreError::UnexpectedStatus { status: 503, .. }),
        "got: {err:?}"
    );
    assert_eq!(commit_sizes(&server).await, vec![4, 4]);
}

#[tokio::test]
async fn oversized_batch_is_rejected() {
    let server = MockServer::start().await;
    let client = test_client(&server);
    let err = write_new_measurements(&client, "glucose", &every_five_minutes(1), 501)
        .await
        .unwrap_err();
    assert!(matches!(err, FirestoreError::InvalidBatchSize(501)));
}
