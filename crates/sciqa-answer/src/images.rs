//! Optional image enrichment from answer keywords.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use sciqa_core::config::ImageSettings;
use sciqa_core::{Error, Result};
use serde::Deserialize;
use tracing::{debug, warn};

/// Keywords searched per answer.
pub const MAX_KEYWORDS: usize = 2;
/// Images requested per keyword.
pub const IMAGES_PER_KEYWORD: usize = 2;

#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// Up to `limit` image URLs for `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>>;
}

/// Image search disabled.
pub struct NoImageSearch;

#[async_trait]
impl ImageSearch for NoImageSearch {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

const SERPAPI_URL: &str = "https://serpapi.com/search.json";
const PROVIDER: &str = "serpapi";

#[derive(Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    images_results: Vec<SerpApiImage>,
}

#[derive(Deserialize)]
struct SerpApiImage {
    original: Option<String>,
}

/// Google Images through SerpApi.
pub struct SerpApiImageSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl SerpApiImageSearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::llm(PROVIDER, e))?;
        Ok(Self { client, api_key: api_key.into(), endpoint: SERPAPI_URL.into() })
    }
}

#[async_trait]
impl ImageSearch for SerpApiImageSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let num = limit.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", "google_images"),
                ("q", query),
                ("api_key", self.api_key.as_str()),
                ("num", num.as_str()),
                ("safe", "active"),
                ("gl", "us"),
                ("hl", "en"),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::llm(PROVIDER, e))?;
        let body: SerpApiResponse = response.json().await.map_err(|e| Error::llm(PROVIDER, e))?;
        Ok(body.images_results.into_iter().filter_map(|i| i.original).take(limit).collect())
    }
}

/// SerpApi when a key is configured, otherwise [`NoImageSearch`].
pub fn image_search_from_settings(settings: &ImageSettings) -> Result<Box<dyn ImageSearch>> {
    if settings.serpapi_key.trim().is_empty() {
        debug!("no serpapi key, image search disabled");
        return Ok(Box::new(NoImageSearch));
    }
    Ok(Box::new(SerpApiImageSearch::new(settings.serpapi_key.trim())?))
}

/// Search the first keywords one at a time and collect up to `max_images`
/// distinct URLs. Failures are logged and skipped.
pub async fn enrich(search: &dyn ImageSearch, keywords: &[String], max_images: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for keyword in keywords.iter().filter(|k| !k.trim().is_empty()).take(MAX_KEYWORDS) {
        if urls.len() >= max_images {
            break;
        }
        match search.search(keyword.trim(), IMAGES_PER_KEYWORD).await {
            Ok(found) => {
                for url in found {
                    if urls.len() >= max_images {
                        break;
                    }
                    if seen.insert(url.clone()) {
                        urls.push(url);
                    }
                }
            }
            Err(e) => warn!(keyword = %keyword, error = %e, "image search failed"),
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorded {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageSearch for Recorded {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
            self.queries.lock().unwrap().push(query.to_string());
            if query == "broken" {
                return Err(Error::llm(PROVIDER, "429"));
            }
            Ok((0..limit).map(|i| format!("https://img/{}.jpg", i)).collect())
        }
    }

    #[tokio::test]
    async fn uses_first_two_keywords_and_dedupes() {
        let search = Recorded { queries: Mutex::new(Vec::new()) };
        let keywords: Vec<String> = ["broken", "bone", "muscle"].iter().map(|s| s.to_string()).collect();
        let urls = enrich(&search, &keywords, 3).await;
        assert_eq!(urls, vec!["https://img/0.jpg", "https://img/1.jpg"]);
        assert_eq!(*search.queries.lock().unwrap(), vec!["broken", "bone"]);
    }

    #[tokio::test]
    async fn disabled_search_returns_nothing() {
        let search = image_search_from_settings(&ImageSettings::default()).unwrap();
        assert!(enrich(search.as_ref(), &["x".to_string()], 2).await.is_empty());
    }
}
