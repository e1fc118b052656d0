pub mod page;
pub mod youtube;

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::links::{FetchStatus, Provider};

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub provider: Provider,
    pub fetch_status: FetchStatus,
}

impl PageMetadata {
    pub fn failed(provider: Provider) -> Self {
        Self {
            title: None,
            description: None,
            image_url: None,
            provider,
            fetch_status: FetchStatus::Failed,
        }
    }

    /// `ok` if anything was found, `partial` otherwise.
    pub fn from_fields(
        provider: Provider,
        title: Option<String>,
        description: Option<String>,
        image_url: Option<String>,
    ) -> Self {
        let fetch_status = if title.is_some() || description.is_some() || image_url.is_some() {
            FetchStatus::Ok
        } else {
            FetchStatus::Partial
        };

        Self {
            title,
            description,
            image_url,
            provider,
            fetch_status,
        }
    }
}

/// Resolves page metadata for a url. Never fails: problems are reported
/// through `fetch_status`.
pub trait MetadataFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> PageMetadata;
}

pub fn detect_provider(url: &str) -> Provider {
    let host = match url::Url::parse(url) {
        Ok(parsed) => parsed.host_str().unwrap_or_default().to_lowercase(),
        Err(_) => return Provider::Generic,
    };

    let is = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

    if is("youtube.com") || is("youtu.be") {
        Provider::Youtube
    } else if is("twitter.com") || is("x.com") {
        Provider::X
    } else if is("instagram.com") {
        Provider::Instagram
    } else {
        Provider::Generic
    }
}

pub struct HttpMetadataFetcher {
    client: Client,
}

impl HttpMetadataFetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

impl MetadataFetcher for HttpMetadataFetcher {
    fn fetch(&self, url: &str) -> PageMetadata {
        let provider = detect_provider(url);

        if provider == Provider::Youtube {
            match youtube::fetch_oembed(&self.client, url) {
                Ok(Some(meta)) => return meta,
                Ok(None) => log::debug!("{url}: oembed returned nothing, scanning page"),
                Err(err) => log::debug!("{url}: oembed failed: {err}"),
            }
        }

        match page::fetch_page(&self.client, url, provider) {
            Ok(meta) => meta,
            Err(err) => {
                log::warn!("{url}: metadata fetch failed: {err}");
                PageMetadata::failed(provider)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_provider() {
        assert_eq!(detect_provider("https://www.youtube.com/watch?v=x"), Provider::Youtube);
        assert_eq!(detect_provider("https://youtu.be/abc"), Provider::Youtube);
        assert_eq!(detect_provider("https://x.com/someone/status/1"), Provider::X);
        assert_eq!(detect_provider("https://mobile.twitter.com/a"), Provider::X);
        assert_eq!(detect_provider("https://www.instagram.com/p/1"), Provider::Instagram);
        assert_eq!(detect_provider("https://notyoutube.com/"), Provider::Generic);
        assert_eq!(detect_provider("garbage"), Provider::Generic);
    }

    #[test]
    fn test_from_fields_status() {
        let meta = PageMetadata::from_fields(Provider::Generic, None, None, None);
        assert_eq!(meta.fetch_status, FetchStatus::Partial);

        let meta = PageMetadata::from_fields(Provider::Generic, Some("t".into()), None, None);
        assert_eq!(meta.fetch_status, FetchStatus::Ok);
    }
}
