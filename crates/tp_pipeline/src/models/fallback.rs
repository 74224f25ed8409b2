use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tp_core::models::{CategorizeRequest, CrawlRequest, MonthlySummaryRequest, Pipeline};
use tp_core::{CategoryAssignment, Result};
use tracing::warn;

use super::dummy::DummyPipeline;

/// Wraps a primary pipeline and answers categorize and monthly summary from
/// [`DummyPipeline`] when the primary fails. Batch calls are passed through.
pub struct FallbackPipeline {
    primary: Arc<dyn Pipeline>,
    fallback: DummyPipeline,
}

impl FallbackPipeline {
    pub fn new(primary: Arc<dyn Pipeline>) -> Self {
        Self {
            primary,
            fallback: DummyPipeline::new(),
        }
    }
}

impl fmt::Debug for FallbackPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackPipeline")
            .field("primary", &self.primary)
            .finish()
    }
}

#[async_trait]
impl Pipeline for FallbackPipeline {
    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn categorize(&self, request: &CategorizeRequest) -> Result<CategoryAssignment> {
        match self.primary.categorize(request).await {
            Ok(assignment) => Ok(assignment),
            Err(e) => {
                warn!(
                    "Pipeline categorize failed for article {}, using dummy result: {}",
                    request.article_id, e
                );
                self.fallback.categorize(request).await
            }
        }
    }

    async fn monthly_summary(&self, request: &MonthlySummaryRequest) -> Result<String> {
        match self.primary.monthly_summary(request).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!(
                    "Pipeline monthly summary failed for topic {}, using dummy text: {}",
                    request.topic_id, e
                );
                self.fallback.monthly_summary(request).await
            }
        }
    }

    async fn crawl(&self, request: &CrawlRequest) -> Result<serde_json::Value> {
        self.primary.crawl(request).await
    }

    async fn summarize_batch(&self, limit: u32) -> Result<serde_json::Value> {
        self.primary.summarize_batch(limit).await
    }
}
