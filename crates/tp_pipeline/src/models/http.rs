use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tp_core::models::{CategorizeRequest, CrawlRequest, MonthlySummaryRequest, Pipeline};
use tp_core::{CategoryAssignment, Error, Result};
use url::Url;

#[derive(Deserialize)]
struct MonthlySummaryResponse {
    monthly_summary: String,
}

#[derive(Serialize)]
struct SummarizeBatchRequest {
    limit: u32,
}

/// Client for the pipeline service's JSON endpoints.
pub struct HttpPipeline {
    client: Client,
    base_url: Url,
}

impl HttpPipeline {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("pipeline.url is not a valid url: {}", e)))?;
        // `Url::join` replaces the last path segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build pipeline client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid pipeline endpoint {}: {}", path, e)))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request.send().await.map_err(|e| {
            Error::Transport(format!("pipeline /{} unreachable: {}", path, e))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "pipeline /{} returned {}: {}",
                path,
                status,
                body.trim()
            )));
        }
        response.json::<T>().await.map_err(|e| {
            Error::Upstream(format!("pipeline /{} sent an unreadable body: {}", path, e))
        })
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        tracing::debug!(%url, "calling pipeline");
        self.send(path, self.client.post(url).json(body)).await
    }
}

/// Batch endpoints answer 200 with `{"status": "error"}` when the job failed.
fn check_batch_status(path: &str, value: serde_json::Value) -> Result<serde_json::Value> {
    if value.get("status").and_then(|s| s.as_str()) == Some("error") {
        let message = value
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unknown error");
        return Err(Error::Upstream(format!("pipeline /{} failed: {}", path, message)));
    }
    Ok(value)
}

impl fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("client", &"<reqwest::Client>")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

#[async_trait]
impl Pipeline for HttpPipeline {
    fn name(&self) -> &str {
        "http"
    }

    async fn categorize(&self, request: &CategorizeRequest) -> Result<CategoryAssignment> {
        let raw: CategoryAssignment = self.post_json("categorize", request).await?;
        Ok(CategoryAssignment::new(raw.major.as_deref(), raw.minor))
    }

    async fn monthly_summary(&self, request: &MonthlySummaryRequest) -> Result<String> {
        let response: MonthlySummaryResponse = self.post_json("monthly_summary", request).await?;
        Ok(response.monthly_summary)
    }

    async fn crawl(&self, request: &CrawlRequest) -> Result<serde_json::Value> {
        let url = self.endpoint("crawl")?;
        let mut query = vec![("start_date", request.start_date.to_string())];
        if let Some(end_date) = request.end_date {
            query.push(("end_date", end_date.to_string()));
        }
        query.extend(request.sources.iter().map(|s| ("sources", s.clone())));
        tracing::info!(start_date = %request.start_date, sources = request.sources.len(), "requesting crawl");
        let value = self.send("crawl", self.client.post(url).query(&query)).await?;
        check_batch_status("crawl", value)
    }

    async fn summarize_batch(&self, limit: u32) -> Result<serde_json::Value> {
        let value = self
            .post_json("summarize", &SummarizeBatchRequest { limit })
            .await?;
        check_batch_status("summarize", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_keep_base_path() {
        let pipeline = HttpPipeline::new("http://pipeline:8000/v1", Duration::from_secs(1)).unwrap();
        assert_eq!(
            pipeline.endpoint("categorize").unwrap().as_str(),
            "http://pipeline:8000/v1/categorize"
        );
        let pipeline = HttpPipeline::new("http://pipeline:8000", Duration::from_secs(1)).unwrap();
        assert_eq!(
            pipeline.endpoint("crawl").unwrap().as_str(),
            "http://pipeline:8000/crawl"
        );
    }

    #[test]
    fn test_batch_error_status_is_upstream() {
        let err = check_batch_status(
            "summarize",
            serde_json::json!({"status": "error", "error": "db down"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        assert!(check_batch_status("summarize", serde_json::json!({"status": "ok", "count": 3})).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_pipeline_is_transport_error() {
        let pipeline = HttpPipeline::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = pipeline.summarize_batch(5).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.is_retryable());
    }
}
