use std::sync::Arc;

use futures::TryStreamExt;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use searchsync_core::query::FacetSort;
use searchsync_core::{
    Document, EngineConfig, IndexBackend, IndexClient, QueryBuilder, TaskStatus, WaitConfig,
};
use searchsync_http::SolrBackend;

fn client_for(server: &MockServer) -> IndexClient {
    let backend: Arc<dyn IndexBackend> =
        Arc::new(SolrBackend::new(&EngineConfig::new(server.uri())).unwrap());
    IndexClient::new(backend, WaitConfig::default())
}

#[tokio::test]
async fn missing_core_is_created() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/cores"))
        .and(query_param("action", "STATUS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseHeader": { "status": 0 },
            "status": { "reports-v3": {} }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/cores"))
        .and(query_param("action", "CREATE"))
        .and(query_param("name", "reports-v3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseHeader": { "status": 0 },
            "core": "reports-v3"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = client_for(&server)
        .create_index_if_absent("reports-v3", "id")
        .await
        .unwrap()
        .expect("core should be created");
    assert!(handle.is_settled());
}

#[tokio::test]
async fn upsert_commits_and_returns_settled_handle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports-v3/update"))
        .and(query_param("commit", "true"))
        .and(body_json(json!([{ "id": 2, "name": "Report 2" }])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseHeader": { "status": 0, "QTime": 3 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let doc = Document::from_json(json!({ "id": 2, "name": "Report 2" }), "id").unwrap();
    let handle = client.upsert_document("reports-v3", &doc).await.unwrap();
    assert!(handle.is_settled());

    // Settled handles resolve without touching the task API.
    let task = client.wait(&handle).await.unwrap();
    assert_eq!(task.status, TaskStatus::Succeeded);
}

#[tokio::test]
async fn delete_posts_delete_command() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports-v3/update"))
        .and(body_json(json!({ "delete": { "id": "5" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseHeader": { "status": 0 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = client_for(&server).delete_document("reports-v3", 5).await.unwrap();
    assert_eq!(handle.kind, "documentDeletion");
}

#[tokio::test]
async fn update_errors_carry_solr_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports-v3/update"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "msg": "ERROR: [doc=2] unknown field 'bogus'", "code": 400 }
        })))
        .mount(&server)
        .await;

    let doc = Document::from_json(json!({ "id": 2, "bogus": 1 }), "id").unwrap();
    let err = client_for(&server)
        .upsert_document("reports-v3", &doc)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown field"), "{err}");
}

#[tokio::test]
async fn scan_follows_cursor_marks_until_repeated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reports-v3/select"))
        .and(query_param("cursorMark", "*"))
        .and(query_param("sort", "id asc"))
        .and(query_param("fl", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "numFound": 3, "start": 0, "docs": [{ "id": "1" }, { "id": "2" }] },
            "nextCursorMark": "AoEC"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/reports-v3/select"))
        .and(query_param("cursorMark", "AoEC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "numFound": 3, "start": 0, "docs": [{ "id": "3" }] },
            "nextCursorMark": "AoED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/reports-v3/select"))
        .and(query_param("cursorMark", "AoED"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "numFound": 3, "start": 0, "docs": [] },
            "nextCursorMark": "AoED"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let pages: Vec<_> = client.scan_ids("reports-v3", 2).try_collect().await.unwrap();
    let ids: Vec<u64> = pages.iter().flat_map(|p| p.ids.clone()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn cursor_scan_sorts_and_reads_the_configured_primary_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reports-v3/select"))
        .and(query_param("sort", "uid asc"))
        .and(query_param("fl", "uid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "numFound": 2, "start": 0, "docs": [{ "uid": 5 }, { "uid": "6" }] },
            "nextCursorMark": "*"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).with_primary_key("uid");
    let pages: Vec<_> = client.scan_ids("reports-v3", 10).try_collect().await.unwrap();
    let ids: Vec<u64> = pages.iter().flat_map(|p| p.ids.clone()).collect();
    assert_eq!(ids, vec![5, 6]);
}

#[tokio::test]
async fn search_sends_faceted_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reports-v3/select"))
        .and(query_param("q", "*:*"))
        .and(query_param("fq", "country:\"DE\""))
        .and(query_param("sort", "name desc, score desc, id asc"))
        .and(query_param("facet", "on"))
        .and(query_param("facet.field", "country"))
        .and(query_param("start", "20"))
        .and(query_param("rows", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "numFound": 25, "start": 20, "docs": [{ "id": "7" }] },
            "facet_counts": { "facet_fields": { "country": ["DE", 25] } }
        })))
        .mount(&server)
        .await;

    let mut builder = QueryBuilder::new();
    builder
        .set_free_text("  ")
        .add_and_filters([("country", "DE")])
        .set_ordering("-name")
        .set_facets(["country"], FacetSort::Count)
        .set_pagination(20, 10);
    let resp = client_for(&server)
        .search("reports-v3", &builder.build(true, None))
        .await
        .unwrap();
    assert_eq!(resp.total_hits, 25);
    assert!(!resp.has_next_page());
    assert_eq!(resp.facets["country"]["DE"], 25);
}
