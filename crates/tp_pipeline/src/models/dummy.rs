use std::fmt;
use tp_core::models::{CategorizeRequest, CrawlRequest, MonthlySummaryRequest, Pipeline};
use tp_core::{CategoryAssignment, Result};

pub const DUMMY_MONTHLY_SUMMARY: &str = "これはダミー月次まとめです";

/// Deterministic stand-in used when no pipeline service is configured, and as
/// the substitute for degraded calls.
pub struct DummyPipeline;

impl fmt::Debug for DummyPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyPipeline").finish()
    }
}

impl DummyPipeline {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DummyPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Pipeline for DummyPipeline {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn categorize(&self, _request: &CategorizeRequest) -> Result<CategoryAssignment> {
        Ok(CategoryAssignment::uncategorized())
    }

    async fn monthly_summary(&self, _request: &MonthlySummaryRequest) -> Result<String> {
        Ok(DUMMY_MONTHLY_SUMMARY.to_string())
    }

    async fn crawl(&self, request: &CrawlRequest) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "status": "ok",
            "start_date": request.start_date.to_string(),
            "end_date": request.end_date.unwrap_or(request.start_date).to_string(),
            "inserted": 0,
            "skipped": 0,
        }))
    }

    async fn summarize_batch(&self, limit: u32) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "status": "ok", "limit": limit, "summarized": 0 }))
    }
}
