//! Wikimedia Commons API client.
//!
//! Wikimedia asks API clients to:
//! - send a descriptive User-Agent with contact information
//! - make requests serially (an optional minimum delay is supported)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::types::{CategoryInfo, FileInfo, MemberPage, PageContent};
use super::wire;
use super::{CommonsApi, CommonsError};
use crate::config::CommonsConfig;

/// Commons API client.
pub struct CommonsClient {
    client: Client,
    api_url: String,
    last_request: Arc<Mutex<Option<Instant>>>,
    rate_limit: Duration,
}

impl CommonsClient {
    /// Create a new Commons client.
    pub fn new(config: &CommonsConfig) -> Result<Self, CommonsError> {
        if config.user_agent.trim().is_empty() {
            return Err(CommonsError::NotConfigured(
                "user_agent must be set".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            last_request: Arc::new(Mutex::new(None)),
            rate_limit: Duration::from_millis(config.rate_limit_ms),
        })
    }

    /// Wait for rate limit if needed.
    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.rate_limit {
                let wait_time = self.rate_limit - elapsed;
                debug!("Commons rate limit: waiting {:?}", wait_time);
                sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }

    /// Issue an `action=query` GET and return the raw body.
    async fn query(&self, params: &[(&str, &str)]) -> Result<String, CommonsError> {
        self.wait_for_rate_limit().await;

        let response = self
            .client
            .get(&self.api_url)
            .query(&[("action", "query"), ("format", "json")])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Commons API returned {}", status);
            return Err(CommonsError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl CommonsApi for CommonsClient {
    async fn list_category_members(
        &self,
        category: &str,
        continuation: Option<&str>,
        limit: u32,
    ) -> Result<MemberPage, CommonsError> {
        debug!(
            "Commons list members: category='{}', continuation={:?}, limit={}",
            category, continuation, limit
        );

        let limit = limit.to_string();
        let mut params = vec![
            ("list", "categorymembers"),
            ("cmtype", "file"),
            ("cmtitle", category),
            ("cmlimit", limit.as_str()),
            ("continue", ""),
        ];
        if let Some(token) = continuation {
            params.push(("cmcontinue", token));
        }

        let body = self.query(&params).await?;
        wire::parse_member_page(&body)
    }

    async fn file_info(&self, page_id: u64) -> Result<FileInfo, CommonsError> {
        debug!("Commons file info: pageid={}", page_id);

        let page_id = page_id.to_string();
        let body = self
            .query(&[
                ("prop", "imageinfo"),
                ("iiprop", "url"),
                ("pageids", page_id.as_str()),
            ])
            .await?;
        wire::parse_file_info(&body)
    }

    async fn category_info(&self, category: &str) -> Result<CategoryInfo, CommonsError> {
        debug!("Commons category info: category='{}'", category);

        let body = self
            .query(&[("prop", "categoryinfo"), ("titles", category)])
            .await?;
        wire::parse_category_info(&body)
    }

    async fn page_content(&self, page_id: u64) -> Result<PageContent, CommonsError> {
        debug!("Commons page content: pageid={}", page_id);

        let page_id = page_id.to_string();
        let body = self
            .query(&[
                ("prop", "revisions"),
                ("rvprop", "content"),
                ("rvslots", "main"),
                ("pageids", page_id.as_str()),
            ])
            .await?;
        wire::parse_page_content(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_user_agent() {
        let config = CommonsConfig {
            user_agent: String::new(),
            ..CommonsConfig::default()
        };
        assert!(matches!(
            CommonsClient::new(&config),
            Err(CommonsError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_new_with_defaults() {
        let client = CommonsClient::new(&CommonsConfig::default()).unwrap();
        assert_eq!(client.api_url, "https://commons.wikimedia.org/w/api.php");
        assert_eq!(client.rate_limit, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_rate_limit_spaces_requests() {
        let config = CommonsConfig {
            rate_limit_ms: 50,
            ..CommonsConfig::default()
        };
        let client = CommonsClient::new(&config).unwrap();

        let start = Instant::now();
        client.wait_for_rate_limit().await;
        client.wait_for_rate_limit().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
