use url::Url;

const TRACKING_PARAMS: [&str; 8] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
];

/// Normalize a URL into its dedup key.
///
/// - Lowercases the hostname
/// - Strips known tracking query parameters and drops an empty query
/// - Removes trailing slashes from the path (preserves root `/`)
///
/// Returns the original string if the URL cannot be parsed.
pub fn normalize_url(url: &str) -> String {
    let mut parsed = match Url::parse(url.trim()) {
        Ok(u) => u,
        Err(_) => return url.to_string(),
    };

    if let Some(host) = parsed.host_str() {
        let lowercased = host.to_lowercase();
        if lowercased != host && parsed.set_host(Some(&lowercased)).is_err() {
            return url.to_string();
        }
    }

    if parsed.query().is_some() {
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let kept: Vec<&(String, String)> = pairs
            .iter()
            .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_str()))
            .collect();

        if kept.is_empty() {
            parsed.set_query(None);
        } else if kept.len() != pairs.len() {
            parsed
                .query_pairs_mut()
                .clear()
                .extend_pairs(kept.into_iter());
        }
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    parsed.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryName {
    pub name: String,
    /// Case-insensitive uniqueness key.
    pub name_lower: String,
}

/// Trims and collapses whitespace runs into single spaces.
pub fn normalize_category_name(raw: &str) -> CategoryName {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let name_lower = name.to_lowercase();

    CategoryName { name, name_lower }
}
