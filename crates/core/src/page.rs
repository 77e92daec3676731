//! Page identity and metadata shared by the pipeline, store, and frontends.

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use url::Url;

/// Metadata for one archived page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    /// Content-hash page id: the hex digest of the page URL.
    pub id: String,
    /// The URL the page was archived from.
    pub original_url: String,
    pub title: String,
    /// Unix timestamp of when the page was added.
    pub time_added: i64,
    /// Access token carried by archive/kindle links for this page.
    pub token: String,
}

impl PageInfo {
    /// Build the identity record for a page URL. The title is filled in once
    /// the page has been fetched.
    pub fn new(url: &str, username: &str, password: &str) -> PageInfo {
        PageInfo {
            id: sha256_hex(url),
            original_url: url.to_string(),
            title: String::new(),
            time_added: OffsetDateTime::now_utc().unix_timestamp(),
            token: page_token(username, password, url),
        }
    }
}

/// Lowercase hex SHA-256 digest of `input`.
pub fn sha256_hex(input: &str) -> String {
    Sha256::digest(input.as_bytes()).iter().map(|b| format!("{b:02x}")).collect()
}

/// Per-page access token tied to the configured credentials.
pub fn page_token(username: &str, password: &str, url: &str) -> String {
    sha256_hex(&format!("{username}|{password}|{url}"))
}

/// Host component of a URL, or the empty string when it cannot be parsed.
pub fn get_host(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}
