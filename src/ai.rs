//! External enrichment: page scraping and OpenAI-compatible completions.
//!
//! Both clients are blocking; they are only ever called from enrichment
//! worker threads, never from the write path.

mod client;
mod scraper;
mod suggestion;

pub use client::{
    AiClient, AiClientBuilder, DEFAULT_ENDPOINT, DEFAULT_MODEL, EnrichmentError,
    MAX_RESPONSE_BYTES,
};
pub use scraper::{MAX_PAGE_BYTES, PageMetadata, PageScraper, extract_metadata};
pub use suggestion::{AiSuggestion, parse_suggestion};

use crate::config::Config;

/// The two remote calls an enrichment task makes.
///
/// Implementations must be shareable across worker threads.
pub trait EnrichmentClient: Send + Sync {
    /// Fetches title and description hints for `url`.
    fn scrape_metadata(&self, url: &str) -> Result<PageMetadata, EnrichmentError>;

    /// Asks the model for a title, description and tags.
    fn complete(&self, prompt: &str) -> Result<AiSuggestion, EnrichmentError>;
}

/// [`EnrichmentClient`] backed by [`PageScraper`] and [`AiClient`].
#[derive(Debug)]
pub struct HttpEnrichmentClient {
    ai: AiClient,
    scraper: PageScraper,
}

impl HttpEnrichmentClient {
    pub fn new(ai: AiClient, scraper: PageScraper) -> Self {
        Self { ai, scraper }
    }

    /// Builds both clients from configuration.
    ///
    /// # Errors
    ///
    /// [`EnrichmentError::Disabled`] when AI is switched off or has no key.
    pub fn from_config(config: &Config) -> Result<Self, EnrichmentError> {
        if !config.ai_enabled || config.ai_api_key.is_empty() {
            return Err(EnrichmentError::Disabled);
        }
        let ai = AiClientBuilder::new()
            .api_key(config.ai_api_key.clone())
            .endpoint(config.ai_endpoint.clone())
            .model(config.ai_model.clone())
            .build()?;
        Ok(Self::new(ai, PageScraper::new()?))
    }
}

impl EnrichmentClient for HttpEnrichmentClient {
    fn scrape_metadata(&self, url: &str) -> Result<PageMetadata, EnrichmentError> {
        self.scraper.scrape(url)
    }

    fn complete(&self, prompt: &str) -> Result<AiSuggestion, EnrichmentError> {
        self.ai.complete(prompt)
    }
}

/// Runs a blocking client call off the async test runtime that hosts the mock server.
#[cfg(test)]
pub(crate) async fn run_blocking<T, F>(call: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .expect("blocking client call panicked")
}
