use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{Article, ArticleId, CategoryAssignment, TopicId, TopicRecord};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizeRequest {
    pub article_id: ArticleId,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
}

impl From<&Article> for CategorizeRequest {
    fn from(article: &Article) -> Self {
        Self {
            article_id: article.id,
            title: article.title.clone(),
            summary: article.summary.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryArticle {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummaryRequest {
    pub topic_id: TopicId,
    pub title: String,
    pub articles: Vec<SummaryArticle>,
}

impl From<&TopicRecord> for MonthlySummaryRequest {
    fn from(record: &TopicRecord) -> Self {
        Self {
            topic_id: record.topic.id,
            title: record.topic.title.clone(),
            articles: record
                .articles
                .iter()
                .map(|member| SummaryArticle {
                    title: member.article.title.clone(),
                    url: member.article.url.clone(),
                    summary: member.article.summary.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// The external crawling/LLM service. Batch results are opaque JSON.
#[async_trait]
pub trait Pipeline: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Classify one article into the two-level taxonomy.
    async fn categorize(&self, request: &CategorizeRequest) -> Result<CategoryAssignment>;

    /// Write the monthly summary of a topic.
    async fn monthly_summary(&self, request: &MonthlySummaryRequest) -> Result<String>;

    async fn crawl(&self, request: &CrawlRequest) -> Result<serde_json::Value>;

    /// Summarize and label up to `limit` unsummarized articles.
    async fn summarize_batch(&self, limit: u32) -> Result<serde_json::Value>;
}
