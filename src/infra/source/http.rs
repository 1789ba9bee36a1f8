//! HTTP clients for the site directory and per-site event sources.
//!
//! Both endpoints answer `GET` with a JSON array:
//!
//! - directory: `[{"id": "...", "url": "https://..."}]`
//! - events: `[{"hook": "...", "timestamp": 1700000000, "args": [], "instance": "..."}]`
//!
//! `args` defaults to an empty array and `instance` is optional. A transport
//! failure or a non-success status is classified as
//! [`RunnerError::SourceUnreachable`]; a body that does not decode is
//! [`RunnerError::SourceError`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::SourceConfig;
use crate::core::error::RunnerError;
use crate::core::event::{PendingEvent, Site};
use crate::core::source::{EventSource, SiteDirectory};

/// One due event as listed by a site.
#[derive(Debug, Deserialize)]
struct EventRecord {
    #[serde(alias = "action")]
    hook: String,
    timestamp: i64,
    #[serde(default = "empty_args")]
    args: serde_json::Value,
    #[serde(default)]
    instance: Option<String>,
}

fn empty_args() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

fn build_client(timeout: Duration) -> Result<Client, RunnerError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RunnerError::InvalidConfig(format!("failed to build HTTP client: {e}")))
}

async fn fetch_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    auth_token: Option<&str>,
) -> Result<T, RunnerError> {
    let mut request = client.get(url);
    if let Some(token) = auth_token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| RunnerError::SourceUnreachable(format!("GET {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RunnerError::SourceUnreachable(format!(
            "GET {url} returned status {status}"
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| RunnerError::SourceUnreachable(format!("GET {url}: reading body: {e}")))?;

    serde_json::from_slice(&body)
        .map_err(|e| RunnerError::SourceError(format!("GET {url}: undecodable body: {e}")))
}

/// Site directory served over HTTP.
#[derive(Clone)]
pub struct HttpSiteDirectory {
    client: Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpSiteDirectory {
    /// Create a directory client.
    ///
    /// # Errors
    ///
    /// [`RunnerError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(config: &SourceConfig, timeout: Duration) -> Result<Self, RunnerError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: config.directory_url.trim().to_owned(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// Directory address.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SiteDirectory for HttpSiteDirectory {
    async fn list_sites(&self) -> Result<Vec<Site>, RunnerError> {
        fetch_json(&self.client, &self.url, self.auth_token.as_deref()).await
    }
}

/// Per-site due-event listing served over HTTP.
#[derive(Clone)]
pub struct HttpEventSource {
    client: Client,
    events_path: String,
    auth_token: Option<String>,
}

impl HttpEventSource {
    /// Create an event source client.
    ///
    /// # Errors
    ///
    /// [`RunnerError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(config: &SourceConfig, timeout: Duration) -> Result<Self, RunnerError> {
        Ok(Self {
            client: build_client(timeout)?,
            events_path: config.events_path.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// Address of `site`'s due-event listing.
    #[must_use]
    pub fn events_url(&self, site: &Site) -> String {
        format!("{}{}", site.url.trim_end_matches('/'), self.events_path)
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn list_due_events(&self, site: &Arc<Site>) -> Result<Vec<PendingEvent>, RunnerError> {
        let url = self.events_url(site);
        let records: Vec<EventRecord> =
            fetch_json(&self.client, &url, self.auth_token.as_deref()).await?;

        Ok(records
            .into_iter()
            .map(|r| PendingEvent::new(Arc::clone(site), r.hook, r.timestamp, r.args, r.instance))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SourceConfig {
        SourceConfig {
            directory_url: " https://directory.example/sites ".into(),
            ..SourceConfig::default()
        }
    }

    #[test]
    fn test_events_url_joins_without_double_slash() {
        let source = HttpEventSource::new(&config(), Duration::from_secs(1)).unwrap();
        let site = Site::new("a", "https://a.example/");
        assert_eq!(
            source.events_url(&site),
            "https://a.example/wp-json/cron-control/v1/events"
        );
    }

    #[test]
    fn test_directory_url_is_trimmed() {
        let directory = HttpSiteDirectory::new(&config(), Duration::from_secs(1)).unwrap();
        assert_eq!(directory.url(), "https://directory.example/sites");
    }

    #[test]
    fn test_event_record_defaults() {
        let record: EventRecord =
            serde_json::from_str(r#"{"action": "publish_future_post", "timestamp": 5}"#).unwrap();
        assert_eq!(record.hook, "publish_future_post");
        assert_eq!(record.args, serde_json::json!([]));
        assert!(record.instance.is_none());
    }
}
