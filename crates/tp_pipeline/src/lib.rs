pub mod models;

pub use models::create_pipeline;

pub mod prelude {
    pub use super::models::{create_pipeline, DummyPipeline, FallbackPipeline, HttpPipeline};
    pub use tp_core::models::{CategorizeRequest, CrawlRequest, MonthlySummaryRequest, Pipeline};
    pub use tp_core::{Error, Result};
}

#[cfg(test)]
mod tests {
    use super::create_pipeline;
    use tp_core::config::PipelineConfig;

    #[test]
    fn test_pipeline_selection() {
        let dummy = create_pipeline(&PipelineConfig::default()).unwrap();
        assert_eq!(dummy.name(), "dummy");

        let config = PipelineConfig {
            url: Some("http://pipeline:8000".to_string()),
            ..PipelineConfig::default()
        };
        assert_eq!(create_pipeline(&config).unwrap().name(), "http");

        let config = PipelineConfig {
            url: Some("::".to_string()),
            ..PipelineConfig::default()
        };
        assert!(create_pipeline(&config).is_err());
    }
}
