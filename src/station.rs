use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use url::Url;

use crate::data::{Story, StoryQuery, StoryService, StoryThread};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub http_client: Option<HttpClient>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: format!("hn-station/{}", crate::VERSION),
            timeout: Duration::from_secs(20),
            http_client: None,
        }
    }
}

/// Client for the HN Station story API.
pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("station client user agent required");
        }
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .with_context(|| format!("station: invalid base url {}", config.base_url))?;

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout)
                .build()
                .context("station: build http client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn stories_url(&self, query: &StoryQuery, offset: usize, limit: usize) -> Result<Url> {
        let mut url = self
            .base_url
            .join("/api/stories")
            .context("station: build stories url")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("limit", &limit.to_string())
                .append_pair("offset", &offset.to_string())
                .append_pair("sort", query.sort.as_str());
            for topic in query.topics.iter().filter(|t| !t.trim().is_empty()) {
                pairs.append_pair("topic", topic.trim());
            }
        }
        Ok(url)
    }

    pub fn thread_url(&self, story_id: i64) -> Result<Url> {
        self.base_url
            .join(&format!("/api/stories/{story_id}"))
            .context("station: build story url")
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        tracing::debug!(%url, "GET");
        let response = self
            .http
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .with_context(|| format!("station: request {url}"))?
            .error_for_status()
            .with_context(|| format!("station: status for {url}"))?;
        response
            .json()
            .with_context(|| format!("station: decode {url}"))
    }
}

impl StoryService for Client {
    fn stories(&self, query: &StoryQuery, offset: usize, limit: usize) -> Result<Vec<Story>> {
        let url = self.stories_url(query, offset, limit)?;
        let stories: Option<Vec<Story>> = self.get_json(url)?;
        Ok(stories.unwrap_or_default())
    }

    fn thread(&self, story_id: i64) -> Result<StoryThread> {
        let url = self.thread_url(story_id)?;
        self.get_json(url)
    }
}
