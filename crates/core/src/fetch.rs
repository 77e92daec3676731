//! Client for the external readability-parser service.
//!
//! Extraction itself happens out of process: the service takes a page URL
//! and returns the article content plus whatever metadata it could find.
//! This module only speaks that narrow contract.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{Result, SatchelError};

/// Configuration for the parser-service client.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Parser service endpoint, e.g. `https://parser.example.org/parser`.
    pub endpoint: String,
    /// API token passed alongside each request.
    pub token: String,
    /// Request timeout in seconds.
    pub timeout: u64,
    /// User-Agent sent with requests.
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: String::new(),
            timeout: 30,
            user_agent: "Mozilla/5.0 (compatible; Satchel/1.0; +https://github.com/stormlightlabs/satchel)".to_string(),
        }
    }
}

/// One parsed page as returned by the service.
///
/// Decoded as a typed record: a field the service omitted is an ordinary
/// `None`, not a lookup failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParsedPage {
    /// Extracted article HTML.
    pub content: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Publication timestamp as `YYYY-MM-DD HH:MM:SS`, when known.
    pub date_published: Option<String>,
}

/// Fetches readability-extracted article content.
#[derive(Debug, Clone)]
pub struct ContentSource {
    config: SourceConfig,
    client: Client,
}

impl ContentSource {
    pub fn new(config: SourceConfig) -> Result<ContentSource> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(&config.user_agent)
            .build()?;
        Ok(ContentSource { config, client })
    }

    /// Fetch the parsed form of `url`.
    pub async fn fetch(&self, url: &str) -> Result<ParsedPage> {
        let mut endpoint = Url::parse(&self.config.endpoint)
            .map_err(|e| SatchelError::Config(format!("bad parser endpoint {:?}: {e}", self.config.endpoint)))?;
        endpoint
            .query_pairs_mut()
            .append_pair("url", url)
            .append_pair("token", &self.config.token);

        let response = self.client.get(endpoint).send().await?;
        if !response.status().is_success() {
            return Err(SatchelError::Parser(format!("{} fetching {url}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|e| SatchelError::Parser(format!("undecodable response for {url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_config_default() {
        let config = SourceConfig::default();
        assert_eq!(config.timeout, 30);
        assert!(config.user_agent.contains("Satchel"));
    }

    #[test]
    fn test_parsed_page_absent_fields_are_none() {
        let page: ParsedPage = serde_json::from_str(r#"{"content": "<p>x</p>"}"#).unwrap();
        assert_eq!(page.content.as_deref(), Some("<p>x</p>"));
        assert!(page.title.is_none());
        assert!(page.author.is_none());
        assert!(page.date_published.is_none());
    }

    #[test]
    fn test_parsed_page_ignores_unknown_fields() {
        let page: ParsedPage =
            serde_json::from_str(r#"{"title": "T", "word_count": 12, "lead_image_url": "x"}"#).unwrap();
        assert_eq!(page.title.as_deref(), Some("T"));
    }

    #[test]
    fn test_bad_endpoint_is_config_error() {
        let source = ContentSource::new(SourceConfig { endpoint: "not a url".to_string(), ..Default::default() }).unwrap();
        let result = std::thread::spawn(move || {
            tokio::runtime::Runtime::new()
                .unwrap()
                .block_on(source.fetch("http://example.com/"))
        })
        .join()
        .unwrap();
        assert!(matches!(result, Err(SatchelError::Config(_))));
    }
}
