use async_trait::async_trait;

use crate::query::ArticleQuery;
use crate::types::{
    Article, ArticleId, CategoryAssignment, NewArticle, Topic, TopicId, TopicPayload, TopicRecord,
    TopicSummary,
};
use crate::Result;

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Insert an article. A duplicate url is a `Conflict`.
    async fn store_article(&self, article: &NewArticle) -> Result<ArticleId>;

    /// Insert a crawled batch, skipping urls already present.
    async fn store_articles(&self, articles: &[NewArticle]) -> Result<StoreOutcome> {
        let mut outcome = StoreOutcome::default();
        for article in articles {
            match self.store_article(article).await {
                Ok(_) => outcome.inserted += 1,
                Err(crate::Error::Conflict(_)) => outcome.skipped += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    async fn get_article(&self, id: ArticleId) -> Result<Option<Article>>;

    /// One page of articles matching the query, newest first.
    async fn query_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>>;

    /// Delete articles and their topic memberships; returns the number removed.
    async fn delete_articles(&self, ids: &[ArticleId]) -> Result<u64>;

    /// Every distinct non-empty label, sorted.
    async fn labels(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait TopicStorage: Send + Sync {
    /// Topics ordered by last update, optionally filtered by a title substring.
    async fn list_topics(&self, search: Option<&str>) -> Result<Vec<TopicSummary>>;

    async fn get_topic(&self, id: TopicId) -> Result<Option<TopicRecord>>;

    /// Create the header and its member rows in one transaction.
    async fn create_topic(&self, payload: &TopicPayload) -> Result<Topic>;

    /// Update the header and replace every member row in one transaction.
    async fn update_topic(&self, id: TopicId, payload: &TopicPayload) -> Result<Topic>;

    async fn delete_topic(&self, id: TopicId) -> Result<bool>;

    /// Patch one member's categories. `NotFound` when the article is not a member.
    async fn update_member_category(
        &self,
        topic_id: TopicId,
        article_id: ArticleId,
        assignment: &CategoryAssignment,
    ) -> Result<()>;

    async fn set_monthly_summary(&self, topic_id: TopicId, summary: &str) -> Result<Topic>;
}

/// Everything the HTTP layer needs from a backend.
pub trait Storage: ArticleStorage + TopicStorage {}

impl<T: ArticleStorage + TopicStorage> Storage for T {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoreOutcome {
    pub inserted: usize,
    pub skipped: usize,
}
