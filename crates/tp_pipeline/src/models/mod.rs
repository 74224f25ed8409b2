use std::sync::Arc;
use std::time::Duration;
use tp_core::config::PipelineConfig;
use tp_core::models::Pipeline;
use tp_core::Result;

pub mod dummy;
pub mod fallback;
pub mod http;

pub use dummy::DummyPipeline;
pub use fallback::FallbackPipeline;
pub use http::HttpPipeline;

/// Builds the pipeline described by `[pipeline]`: the dummy when no url is
/// set, otherwise the HTTP client, wrapped in [`FallbackPipeline`] unless
/// `fallback = false`.
pub fn create_pipeline(config: &PipelineConfig) -> Result<Arc<dyn Pipeline>> {
    let Some(url) = config.url.as_deref() else {
        tracing::info!("No pipeline url configured, using the dummy pipeline");
        return Ok(Arc::new(DummyPipeline::new()));
    };
    let client: Arc<dyn Pipeline> = Arc::new(HttpPipeline::new(
        url,
        Duration::from_secs(config.timeout_secs),
    )?);
    tracing::info!(url, fallback = config.fallback, "Using pipeline service");
    if config.fallback {
        Ok(Arc::new(FallbackPipeline::new(client)))
    } else {
        Ok(client)
    }
}
