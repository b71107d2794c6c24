use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use searchsync_core::{
    Document, EngineConfig, IndexBackend, IndexClient, IndexSettings, QueryBuilder, SyncError,
    TaskStatus, WaitConfig,
};
use searchsync_http::MeiliBackend;

fn client_for(server: &MockServer) -> IndexClient {
    let mut config = EngineConfig::new(server.uri());
    config.api_key = Some("masterKey".into());
    let backend: Arc<dyn IndexBackend> = Arc::new(MeiliBackend::new(&config).unwrap());
    IndexClient::new(
        backend,
        WaitConfig {
            timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        },
    )
}

fn summarized(uid: u64, kind: &str) -> serde_json::Value {
    json!({
        "taskUid": uid,
        "indexUid": "reports-v3",
        "status": "enqueued",
        "type": kind,
        "enqueuedAt": "2024-05-01T10:00:00Z"
    })
}

fn task(uid: u64, status: &str) -> serde_json::Value {
    json!({
        "uid": uid,
        "indexUid": "reports-v3",
        "status": status,
        "type": "documentAdditionOrUpdate",
        "canceledBy": null,
        "error": null,
        "enqueuedAt": "2024-05-01T10:00:00Z",
        "finishedAt": null
    })
}

#[tokio::test]
async fn create_index_only_when_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/reports-v3"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Index `reports-v3` not found.",
            "code": "index_not_found",
            "type": "invalid_request",
            "link": "https://docs.meilisearch.com/errors#index_not_found"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(header("authorization", "Bearer masterKey"))
        .and(body_json(json!({ "uid": "reports-v3", "primaryKey": "id" })))
        .respond_with(ResponseTemplate::new(202).set_body_json(summarized(1, "indexCreation")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let handle = client
        .create_index_if_absent("reports-v3", "id")
        .await
        .unwrap()
        .expect("index should be created");
    assert_eq!(handle.uid, Some(1));
    assert_eq!(handle.status, TaskStatus::Enqueued);
}

#[tokio::test]
async fn existing_index_is_left_alone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/reports-v3"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "uid": "reports-v3", "primaryKey": "id" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(202).set_body_json(summarized(1, "indexCreation")))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.create_index_if_absent("reports-v3", "id").await.unwrap().is_none());
}

#[tokio::test]
async fn other_index_errors_surface_as_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/reports-v3"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "The provided API key is invalid.",
            "code": "invalid_api_key",
            "type": "auth"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create_index_if_absent("reports-v3", "id")
        .await
        .unwrap_err();
    match err {
        SyncError::Backend(msg) => assert!(msg.contains("invalid_api_key"), "{msg}"),
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn settings_are_patched() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/indexes/reports-v3/settings"))
        .and(body_partial_json(json!({
            "displayedAttributes": ["*"],
            "pagination": { "maxTotalHits": 1000 }
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(summarized(2, "settingsUpdate")))
        .expect(1)
        .mount(&server)
        .await;

    let handle = client_for(&server)
        .apply_settings("reports-v3", &IndexSettings::default())
        .await
        .unwrap();
    assert_eq!(handle.kind, "settingsUpdate");
}

#[tokio::test]
async fn upsert_then_wait_polls_until_succeeded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/reports-v3/documents"))
        .and(query_param("primaryKey", "id"))
        .and(body_json(json!([{ "id": 4, "name": "Report 4", "tags": ["a", "b"] }])))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(summarized(7, "documentAdditionOrUpdate")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tasks/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task(7, "processing")))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tasks/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task(7, "succeeded")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let doc = Document::from_json(
        json!({ "id": 4, "name": "Report 4", "tags": ["a", "a", "b", ""], "notes": null }),
        "id",
    )
    .unwrap();
    let handle = client.upsert_document("reports-v3", &doc).await.unwrap();
    let done = client.wait(&handle).await.unwrap();
    assert_eq!(done.uid, 7);
    assert_eq!(done.status, TaskStatus::Succeeded);
}

#[tokio::test]
async fn failed_task_carries_engine_message() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/indexes/reports-v3/documents/9"))
        .respond_with(ResponseTemplate::new(202).set_body_json(summarized(8, "documentDeletion")))
        .mount(&server)
        .await;
    let mut failed = task(8, "failed");
    failed["error"] = json!({
        "message": "Index `reports-v3` not found.",
        "code": "index_not_found",
        "type": "invalid_request",
        "link": "https://docs.meilisearch.com/errors#index_not_found"
    });
    Mock::given(method("GET"))
        .and(path("/tasks/8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(failed))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let handle = client.delete_document("reports-v3", 9).await.unwrap();
    match client.wait(&handle).await.unwrap_err() {
        SyncError::TaskFailed { task_uid, message, .. } => {
            assert_eq!(task_uid, 8);
            assert!(message.contains("not found"));
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn canceled_task_reports_canceler() {
    let server = MockServer::start().await;
    let mut canceled = task(8, "canceled");
    canceled["canceledBy"] = json!(12);
    Mock::given(method("GET"))
        .and(path("/tasks/8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(canceled))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let handle = serde_json::from_value(summarized(8, "documentDeletion")).unwrap();
    match client.wait(&handle).await.unwrap_err() {
        SyncError::TaskCanceled { canceled_by, .. } => assert_eq!(canceled_by, Some(12)),
        other => panic!("expected TaskCanceled, got {other:?}"),
    }
}

#[tokio::test]
async fn flush_tasks_sends_status_list() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/tasks"))
        .and(query_param("statuses", "succeeded,failed,canceled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskUid": 30,
            "indexUid": null,
            "status": "enqueued",
            "type": "taskDeletion",
            "enqueuedAt": "2024-05-01T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = client_for(&server)
        .flush_tasks(&[TaskStatus::Succeeded, TaskStatus::Failed, TaskStatus::Canceled])
        .await
        .unwrap();
    assert_eq!(handle.uid, Some(30));
}

#[tokio::test]
async fn scan_ids_walks_document_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/reports-v3/documents"))
        .and(query_param("offset", "0"))
        .and(query_param("fields", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": 1 }, { "id": 2 }],
            "offset": 0, "limit": 2, "total": 3
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/reports-v3/documents"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": "3" }],
            "offset": 2, "limit": 2, "total": 3
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let pages: Vec<_> = client.scan_ids("reports-v3", 2).try_collect().await.unwrap();
    let ids: Vec<u64> = pages.iter().flat_map(|p| p.ids.clone()).collect();
    assert_eq!(pages.len(), 2);
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(pages[0].total, Some(3));
}

#[tokio::test]
async fn scan_ids_reads_the_configured_primary_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/reports-v3/documents"))
        .and(query_param("fields", "uid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "uid": 1 }, { "uid": 2 }],
            "offset": 0, "limit": 10, "total": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).with_primary_key("uid");
    let pages: Vec<_> = client.scan_ids("reports-v3", 10).try_collect().await.unwrap();
    let ids: Vec<u64> = pages.iter().flat_map(|p| p.ids.clone()).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn search_renders_filter_expression() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/reports-v3/search"))
        .and(body_partial_json(json!({
            "filter": "country = \"DE\"",
            "sort": ["id:asc"],
            "offset": 0,
            "limit": 10,
            "facets": ["country"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{ "id": 1 }],
            "offset": 0,
            "limit": 10,
            "estimatedTotalHits": 25,
            "facetDistribution": { "country": { "DE": 25 } },
            "processingTimeMs": 1,
            "query": ""
        })))
        .mount(&server)
        .await;

    let mut builder = QueryBuilder::new();
    builder
        .add_and_filters([("country", "DE")])
        .set_facets(["country"], Default::default());
    let resp = client_for(&server)
        .search("reports-v3", &builder.build(true, None))
        .await
        .unwrap();
    assert_eq!(resp.total_hits, 25);
    assert!(resp.has_next_page());
    assert_eq!(resp.facets["country"]["DE"], 25);
}
