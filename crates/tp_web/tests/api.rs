use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tp_core::query::ArticleQuery;
use tp_core::{
    Article, ArticleId, ArticleStorage, CategoryAssignment, CategoryVocabulary, Error, NewArticle,
    Pipeline, Result, Storage, Topic, TopicId, TopicPayload, TopicRecord, TopicStorage,
    TopicSummary,
};
use tp_pipeline::prelude::{DummyPipeline, HttpPipeline};
use tp_storage::InMemoryStorage;
use tp_web::{create_app, AppState};

/// Fails every call the way a locked or corrupted database would.
struct BrokenStorage;

fn broken<T>() -> Result<T> {
    Err(Error::Storage("disk I/O error".to_string()))
}

#[async_trait]
impl ArticleStorage for BrokenStorage {
    async fn store_article(&self, _article: &NewArticle) -> Result<ArticleId> {
        broken()
    }

    async fn get_article(&self, _id: ArticleId) -> Result<Option<Article>> {
        broken()
    }

    async fn query_articles(&self, _query: &ArticleQuery) -> Result<Vec<Article>> {
        broken()
    }

    async fn delete_articles(&self, _ids: &[ArticleId]) -> Result<u64> {
        broken()
    }

    async fn labels(&self) -> Result<Vec<String>> {
        broken()
    }
}

#[async_trait]
impl TopicStorage for BrokenStorage {
    async fn list_topics(&self, _search: Option<&str>) -> Result<Vec<TopicSummary>> {
        broken()
    }

    async fn get_topic(&self, _id: TopicId) -> Result<Option<TopicRecord>> {
        broken()
    }

    async fn create_topic(&self, _payload: &TopicPayload) -> Result<Topic> {
        broken()
    }

    async fn update_topic(&self, _id: TopicId, _payload: &TopicPayload) -> Result<Topic> {
        broken()
    }

    async fn delete_topic(&self, _id: TopicId) -> Result<bool> {
        broken()
    }

    async fn update_member_category(
        &self,
        _topic_id: TopicId,
        _article_id: ArticleId,
        _assignment: &CategoryAssignment,
    ) -> Result<()> {
        broken()
    }

    async fn set_monthly_summary(&self, _topic_id: TopicId, _summary: &str) -> Result<Topic> {
        broken()
    }
}

fn app_on(storage: Arc<dyn Storage>, pipeline: Arc<dyn Pipeline>) -> Router {
    create_app(AppState::new(
        storage,
        pipeline,
        Arc::new(CategoryVocabulary::default()),
    ))
}

fn app_with(pipeline: Arc<dyn Pipeline>) -> Router {
    app_on(Arc::new(InMemoryStorage::new()), pipeline)
}

fn app() -> Router {
    app_with(Arc::new(DummyPipeline::new()))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn add_article(app: &Router, n: u32, labels: &[&str]) -> i64 {
    let (status, body) = call(
        app,
        "POST",
        "/api/articles",
        Some(json!({
            "title": format!("記事 {}", n),
            "url": format!("https://example.com/{}", n),
            "source": "EE Times Japan",
            "labels": labels,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = call(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_article_endpoints() {
    let app = app();
    let first = add_article(&app, 1, &["AI"]).await;
    let second = add_article(&app, 2, &["メモリ", "AI"]).await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/articles",
        Some(json!({"title": "dup", "url": "https://example.com/1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("example.com/1"));

    let (status, _) = call(&app, "POST", "/api/articles", Some(json!({"title": "no url"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, page) = call(&app, "GET", "/api/articles?labels=%E3%83%A1%E3%83%A2%E3%83%AA&limit=abc", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["limit"], 50);
    assert_eq!(page["items"][0]["id"], second);

    let (status, body) = call(&app, "GET", "/api/articles?dateFrom=2025-13-01", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (_, labels) = call(&app, "GET", "/api/articles/labels", None).await;
    assert_eq!(labels, json!(["AI", "メモリ"]));

    let (status, article) = call(&app, "GET", &format!("/api/articles/{}", first), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(article["source"], "EE Times Japan");

    let (status, _) = call(&app, "DELETE", "/api/articles", Some(json!({"ids": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, "DELETE", "/api/articles", Some(json!({"ids": [first]}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "DELETE", &format!("/api/articles/{}", first), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "GET", &format!("/api/articles/{}", first), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_topic_lifecycle() {
    let app = app();
    let a = add_article(&app, 1, &[]).await;
    let b = add_article(&app, 2, &[]).await;

    let (status, _) = call(
        &app,
        "POST",
        "/api/topics",
        Some(json!({"title": "", "articles": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        "/api/topics",
        Some(json!({"title": "5月号", "articles": [
            {"article_id": 999, "display_order": 0, "category_main": "未分類"}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, topic) = call(
        &app,
        "POST",
        "/api/topics",
        Some(json!({"title": "2025年5月 半導体TOPICS", "articles": [
            {"article_id": b, "display_order": 4, "category_main": "材料", "category_sub": ["AI"]},
            {"article_id": a, "display_order": 1, "category_main": "未分類", "category_sub": null}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = topic["id"].as_i64().unwrap();

    let (status, record) = call(&app, "GET", &format!("/api/topics/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["articles"][0]["id"], a);
    assert_eq!(record["articles"][0]["displayOrder"], 0);
    assert!(record["articles"][0]["categoryMajor"].is_null());
    assert_eq!(record["articles"][1]["categoryMajor"], "材料");
    assert_eq!(record["articles"][1]["categoryMinor"], json!(["AI"]));

    let (status, body) = call(
        &app,
        "PATCH",
        &format!("/api/topics/{}/article/{}/category", id, a),
        Some(json!({"main": "市場動向", "sub": ["決算"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category_main"], "市場動向");

    let (status, _) = call(
        &app,
        "PATCH",
        &format!("/api/topics/{}/article/{}/category", id, a),
        Some(json!({"category_main": "スポーツ"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "PATCH",
        &format!("/api/topics/{}/article/{}/category", id, 12345),
        Some(json!({"category_main": "市場動向"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, list) = call(&app, "GET", "/api/topics?q=topics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    let (_, list) = call(&app, "GET", "/api/topics?q=6%E6%9C%88", None).await;
    assert!(list.as_array().unwrap().is_empty());

    let (status, updated) = call(
        &app,
        "PUT",
        &format!("/api/topics/{}", id),
        Some(json!({"title": "5月号 改", "monthly_summary": "まとめ", "articles": [
            {"article_id": b, "display_order": 0, "category_main": "設計"}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "5月号 改");

    let (status, _) = call(
        &app,
        "PUT",
        "/api/topics/777",
        Some(json!({"title": "ghost", "articles": []})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, export) = call(&app, "POST", &format!("/api/topics/{}/export", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let html = export["html"].as_str().unwrap();
    assert!(html.contains("<h1>5月号 改</h1>"));
    assert!(html.contains("<h3>設計</h3>"));

    let (status, _) = call(&app, "DELETE", &format!("/api/topics/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &format!("/api/topics/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pipeline_backed_endpoints_use_dummy_values() {
    let app = app();
    let a = add_article(&app, 1, &[]).await;
    let (_, topic) = call(
        &app,
        "POST",
        "/api/topics",
        Some(json!({"title": "5月号", "articles": [
            {"article_id": a, "display_order": 0, "category_main": "材料"}
        ]})),
    )
    .await;
    let id = topic["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/topics/{}/article/{}/categorize", id, a),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category_main"], "未分類");
    let (_, record) = call(&app, "GET", &format!("/api/topics/{}", id), None).await;
    assert!(record["articles"][0]["categoryMajor"].is_null());

    let (status, body) = call(&app, "POST", &format!("/api/topics/{}/summary", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["monthly_summary"], "これはダミー月次まとめです");

    let (status, _) = call(&app, "POST", "/api/topics/404/summary", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "POST", "/api/crawl", Some(json!({"sources": ["x"]}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = call(
        &app,
        "POST",
        "/api/crawl",
        Some(json!({"start_date": "2025-05-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["end_date"], "2025-05-01");

    let (status, body) = call(&app, "POST", "/api/summarize", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], 20);
}

#[tokio::test]
async fn test_unreachable_pipeline_is_bad_gateway() {
    let pipeline = HttpPipeline::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let app = app_with(Arc::new(pipeline));
    let (status, body) = call(&app, "POST", "/api/summarize", Some(json!({"limit": 5}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_failed_listing_still_returns_a_page() {
    let app = app_on(Arc::new(BrokenStorage), Arc::new(DummyPipeline::new()));
    let (status, page) = call(&app, "GET", "/api/articles?page=2&limit=10", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(page["items"], json!([]));
    assert_eq!(page["total"], 0);
    assert_eq!(page["page"], 2);
    assert_eq!(page["limit"], 10);
    assert!(page["error"].as_str().unwrap().contains("disk I/O error"));

    let (status, body) = call(&app, "GET", "/api/articles/labels", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}
