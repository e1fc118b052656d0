use reqwest::blocking::Client;
use serde::Deserialize;

use super::PageMetadata;
use crate::links::Provider;

const OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";

#[derive(Debug, Deserialize)]
struct OembedResponse {
    title: Option<String>,
    author_name: Option<String>,
    thumbnail_url: Option<String>,
}

impl OembedResponse {
    fn into_metadata(self) -> Option<PageMetadata> {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let title = non_empty(self.title);
        let image_url = non_empty(self.thumbnail_url);
        let description = non_empty(self.author_name).map(|author| format!("by {author}"));

        if title.is_none() && image_url.is_none() {
            return None;
        }

        Some(PageMetadata::from_fields(
            Provider::Youtube,
            title,
            description,
            image_url,
        ))
    }
}

/// Asks YouTube's oEmbed endpoint about a video url.
///
/// `Ok(None)` means the endpoint answered but had nothing useful.
pub fn fetch_oembed(client: &Client, url: &str) -> anyhow::Result<Option<PageMetadata>> {
    let resp = client
        .get(OEMBED_ENDPOINT)
        .query(&[("url", url), ("format", "json")])
        .send()?;

    if !resp.status().is_success() {
        log::debug!("{url}: oembed returned {}", resp.status());
        return Ok(None);
    }

    Ok(resp.json::<OembedResponse>()?.into_metadata())
}
