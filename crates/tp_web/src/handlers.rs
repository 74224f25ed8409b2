use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tp_core::export::render_topic_html;
use tp_core::models::{CategorizeRequest, CrawlRequest, MonthlySummaryRequest};
use tp_core::query::{ArticlePage, ArticleQuery, RawArticleQuery};
use tp_core::{
    ArticleId, ArticleStorage, CategoryAssignment, Error, NewArticle, TopicId, TopicPayload,
    TopicRecord, TopicStorage,
};
use tracing::{info, warn};

use crate::error::ApiResult;
use crate::AppState;

const DEFAULT_SUMMARIZE_LIMIT: u32 = 20;

type SharedState = State<Arc<AppState>>;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// Articles

pub async fn list_articles(
    State(state): SharedState,
    Query(raw): Query<RawArticleQuery>,
) -> ApiResult<impl IntoResponse> {
    let query = ArticleQuery::from_raw(raw)?;
    tracing::debug!(?query, "listing articles");
    match state.storage.query_articles(&query).await {
        Ok(items) => Ok((StatusCode::OK, Json(ArticlePage::from_items(&query, items)))),
        Err(e) => {
            tracing::error!("article query failed: {}", e);
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ArticlePage::failed(&query, e.to_string())),
            ))
        }
    }
}

pub async fn create_article(
    State(state): SharedState,
    body: Result<Json<NewArticle>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(mut article) = body?;
    if article.title.trim().is_empty() || article.url.trim().is_empty() {
        return Err(Error::validation("title と url は必須です").into());
    }
    article.created_at = None;
    let id = state.storage.store_article(&article).await?;
    info!("Stored article {} ({})", id, article.url);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "message": "記事を追加しました" })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct DeleteArticles {
    #[serde(default)]
    pub ids: Vec<ArticleId>,
}

pub async fn delete_articles(
    State(state): SharedState,
    body: Result<Json<DeleteArticles>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(body) = body?;
    if body.ids.is_empty() {
        return Err(Error::validation("ids must not be empty").into());
    }
    let removed = state.storage.delete_articles(&body.ids).await?;
    info!("Deleted {} of {} requested articles", removed, body.ids.len());
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_labels(State(state): SharedState) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.storage.labels().await?))
}

pub async fn get_article(
    State(state): SharedState,
    Path(id): Path<ArticleId>,
) -> ApiResult<impl IntoResponse> {
    match state.storage.get_article(id).await? {
        Some(article) => Ok(Json(article)),
        None => Err(Error::not_found(format!("article {}", id)).into()),
    }
}

pub async fn delete_article(
    State(state): SharedState,
    Path(id): Path<ArticleId>,
) -> ApiResult<StatusCode> {
    if state.storage.delete_articles(&[id]).await? == 0 {
        return Err(Error::not_found(format!("article {}", id)).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

// Topics

#[derive(Debug, Deserialize)]
pub struct TopicSearch {
    pub q: Option<String>,
}

pub async fn list_topics(
    State(state): SharedState,
    Query(search): Query<TopicSearch>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.storage.list_topics(search.q.as_deref()).await?))
}

async fn load_topic(state: &AppState, id: TopicId) -> ApiResult<TopicRecord> {
    state
        .storage
        .get_topic(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("topic {}", id)).into())
}

/// Validates the body and checks that every member article exists.
async fn checked_payload(state: &AppState, payload: TopicPayload) -> ApiResult<TopicPayload> {
    let payload = payload.validated(&state.vocabulary)?;
    for row in &payload.articles {
        if state.storage.get_article(row.article_id).await?.is_none() {
            return Err(Error::validation(format!("article {} does not exist", row.article_id)).into());
        }
    }
    Ok(payload)
}

pub async fn create_topic(
    State(state): SharedState,
    body: Result<Json<TopicPayload>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(payload) = body?;
    let payload = checked_payload(&state, payload).await?;
    let topic = state.storage.create_topic(&payload).await?;
    info!("Created topic {} with {} articles", topic.id, payload.articles.len());
    Ok((StatusCode::CREATED, Json(topic)))
}

pub async fn get_topic(
    State(state): SharedState,
    Path(id): Path<TopicId>,
) -> ApiResult<Json<TopicRecord>> {
    Ok(Json(load_topic(&state, id).await?))
}

pub async fn update_topic(
    State(state): SharedState,
    Path(id): Path<TopicId>,
    body: Result<Json<TopicPayload>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(payload) = body?;
    let payload = checked_payload(&state, payload).await?;
    let topic = state.storage.update_topic(id, &payload).await?;
    info!("Updated topic {} with {} articles", id, payload.articles.len());
    Ok(Json(topic))
}

pub async fn delete_topic(
    State(state): SharedState,
    Path(id): Path<TopicId>,
) -> ApiResult<StatusCode> {
    if !state.storage.delete_topic(id).await? {
        return Err(Error::not_found(format!("topic {}", id)).into());
    }
    info!("Deleted topic {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_category(
    State(state): SharedState,
    Path((topic_id, article_id)): Path<(TopicId, ArticleId)>,
    body: Result<Json<CategoryAssignment>, JsonRejection>,
) -> ApiResult<Json<CategoryAssignment>> {
    let Json(assignment) = body?;
    let assignment = state
        .vocabulary
        .validate(assignment.major.as_deref(), &assignment.minor)?;
    state
        .storage
        .update_member_category(topic_id, article_id, &assignment)
        .await?;
    Ok(Json(assignment))
}

pub async fn categorize_article(
    State(state): SharedState,
    Path((topic_id, article_id)): Path<(TopicId, ArticleId)>,
) -> ApiResult<Json<CategoryAssignment>> {
    let record = load_topic(&state, topic_id).await?;
    let member = record
        .articles
        .iter()
        .find(|m| m.id() == article_id)
        .ok_or_else(|| {
            Error::not_found(format!("article {} is not in topic {}", article_id, topic_id))
        })?;

    let raw = state
        .pipeline
        .categorize(&CategorizeRequest::from(&member.article))
        .await?;
    let assignment = state.vocabulary.sanitize(raw.clone());
    if assignment != raw {
        warn!(
            "Dropped categories outside the vocabulary for article {}: {:?}",
            article_id, raw
        );
    }
    state
        .storage
        .update_member_category(topic_id, article_id, &assignment)
        .await?;
    info!(
        "Categorized article {} in topic {} via {}",
        article_id,
        topic_id,
        state.pipeline.name()
    );
    Ok(Json(assignment))
}

pub async fn generate_summary(
    State(state): SharedState,
    Path(id): Path<TopicId>,
) -> ApiResult<impl IntoResponse> {
    let record = load_topic(&state, id).await?;
    let summary = state
        .pipeline
        .monthly_summary(&MonthlySummaryRequest::from(&record))
        .await?;
    let topic = state.storage.set_monthly_summary(id, &summary).await?;
    info!("Generated monthly summary for topic {}", id);
    Ok(Json(json!({ "monthly_summary": topic.monthly_summary })))
}

pub async fn export_topic(
    State(state): SharedState,
    Path(id): Path<TopicId>,
) -> ApiResult<impl IntoResponse> {
    let record = load_topic(&state, id).await?;
    let html = render_topic_html(&record, Utc::now().date_naive());
    Ok(Json(json!({ "html": html })))
}

// Pipeline pass-through

pub async fn crawl(
    State(state): SharedState,
    body: Result<Json<CrawlRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;
    if let Some(end_date) = request.end_date {
        if end_date < request.start_date {
            return Err(Error::validation("end_date must not precede start_date").into());
        }
    }
    Ok(Json(state.pipeline.crawl(&request).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct SummarizeBatch {
    pub limit: Option<u32>,
}

pub async fn summarize(
    State(state): SharedState,
    body: Option<Json<SummarizeBatch>>,
) -> ApiResult<Json<Value>> {
    let limit = body
        .and_then(|Json(body)| body.limit)
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_SUMMARIZE_LIMIT);
    Ok(Json(state.pipeline.summarize_batch(limit).await?))
}
