use std::collections::HashMap;

use anyhow::bail;
use once_cell::sync::Lazy;
use reqwest::{blocking::Client, header};
use scraper::{Html, Selector};
use url::Url;

use super::PageMetadata;
use crate::links::Provider;

static META_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta").expect("Failed to compile meta selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("Failed to compile title selector"));

const TITLE_KEYS: [&str; 2] = ["og:title", "twitter:title"];
const DESCRIPTION_KEYS: [&str; 3] = ["og:description", "description", "twitter:description"];
const IMAGE_KEYS: [&str; 3] = ["og:image", "twitter:image", "twitter:image:src"];

pub fn fetch_page(client: &Client, url: &str, provider: Provider) -> anyhow::Result<PageMetadata> {
    let parsed = Url::parse(url)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("unsupported scheme {}", parsed.scheme());
    }

    let resp = client
        .get(parsed.clone())
        .header(header::ACCEPT, "text/html,application/xhtml+xml")
        .send()?;

    let status = resp.status();
    if !status.is_success() {
        bail!("http {status}");
    }

    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();
    if !content_type.contains("text/html") {
        bail!("not an html page: {content_type:?}");
    }

    // redirects may have moved us, relative images resolve against the final url
    let final_url = resp.url().clone();
    let html = resp.text()?;

    Ok(parse_page(&html, &final_url, provider))
}

/// Picks title, description and image out of `<meta>` tags, falling back to
/// `<title>` for the title. The first non-empty value per key wins.
pub fn parse_page(html: &str, base: &Url, provider: Provider) -> PageMetadata {
    let document = Html::parse_document(html);

    let mut meta: HashMap<String, String> = HashMap::new();
    for element in document.select(&META_SELECTOR) {
        let key = element
            .attr("property")
            .or_else(|| element.attr("name"))
            .map(|k| k.trim().to_lowercase());
        let content = element.attr("content").map(str::trim);

        if let (Some(key), Some(content)) = (key, content) {
            if !key.is_empty() && !content.is_empty() {
                meta.entry(key).or_insert_with(|| content.to_string());
            }
        }
    }

    let pick = |keys: &[&str]| keys.iter().find_map(|k| meta.get(*k).cloned());

    let title = pick(&TITLE_KEYS).or_else(|| {
        document
            .select(&TITLE_SELECTOR)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });
    let description = pick(&DESCRIPTION_KEYS);
    let image_url = pick(&IMAGE_KEYS).and_then(|src| match base.join(&src) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(err) => {
            log::debug!("dropping unresolvable image {src:?}: {err}");
            None
        }
    });

    PageMetadata::from_fields(provider, title, description, image_url)
}
