//! Service configuration loaded from a JSON file.
//!
//! One file configures every component, but each component receives only the
//! narrow slice it consults (see [`Config::rewrite_options`]); nothing holds
//! the whole struct beyond construction.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::{Result, SatchelError};
use crate::rewrite::RewriteOptions;

/// Top-level configuration, decoded from `~/.satchel.json` by default.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Base URL the site is served under, e.g. `https://example.org/satchel`.
    pub base_url: String,
    /// Address the server binds, e.g. `127.0.0.1:8014`.
    pub listen_address: String,
    /// Readability-parser service endpoint.
    pub parser_url: String,
    /// API token for the parser service.
    pub parser_token: String,
    /// Directory holding the frontend's static assets.
    pub static_dir: PathBuf,
    /// Directory pages are archived under, one subdirectory per page id.
    pub page_dir: PathBuf,
    /// SQLite database path.
    pub database: PathBuf,
    /// JSON array of `[regex, replacement]` pairs applied to incoming URLs.
    pub url_patterns_file: Option<PathBuf>,
    /// JSON array of `[url-regex, needle]` pairs naming known-bad content.
    pub bad_content_file: Option<PathBuf>,
    /// JSON object mapping host patterns to hidden-tag selectors.
    pub hidden_tags_file: Option<PathBuf>,
    /// Path to the e-reader document converter executable.
    pub kindlegen_path: PathBuf,
    /// SMTP relay as `host:port`.
    pub mail_server: String,
    /// Address converted documents are mailed to.
    pub recipient: String,
    /// Sender address for outbound mail.
    pub sender: String,
    /// Frontend authentication username.
    pub username: String,
    /// Frontend authentication password.
    pub password: String,
    /// Download each page's images and rewrite references to local copies.
    pub download_images: bool,
    /// Also save each page's site favicon.
    pub download_favicons: bool,
    pub max_image_width: u32,
    pub max_image_height: u32,
    /// Downloaded images still larger than this after cleaning are deleted.
    pub max_image_bytes: u64,
    pub jpeg_quality: u8,
    /// Maximum concurrent image downloads per page.
    pub max_image_procs: usize,
    /// Maximum number of pages shown by the list frontend.
    pub max_list_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8014".to_string(),
            listen_address: "127.0.0.1:8014".to_string(),
            parser_url: String::new(),
            parser_token: String::new(),
            static_dir: PathBuf::from("static"),
            page_dir: PathBuf::from("/tmp"),
            database: PathBuf::from("satchel.db"),
            url_patterns_file: None,
            bad_content_file: None,
            hidden_tags_file: None,
            kindlegen_path: PathBuf::from("kindlegen"),
            mail_server: "localhost:25".to_string(),
            recipient: String::new(),
            sender: String::new(),
            username: String::new(),
            password: String::new(),
            download_images: true,
            download_favicons: false,
            max_image_width: 1024,
            max_image_height: 768,
            max_image_bytes: 1024 * 1024,
            jpeg_quality: 85,
            max_image_procs: 3,
            max_list_size: 50,
        }
    }
}

impl Config {
    /// Default config file location (`~/.satchel.json`).
    pub fn default_path() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".satchel.json")
    }

    /// Read and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Config> {
        let data = fs::read_to_string(path)
            .map_err(|e| SatchelError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut cfg: Config = serde_json::from_str(&data)?;

        while cfg.base_url.ends_with('/') {
            cfg.base_url.pop();
        }
        Url::parse(&cfg.base_url)
            .map_err(|e| SatchelError::Config(format!("unable to parse base URL {:?}: {e}", cfg.base_url)))?;
        Ok(cfg)
    }

    /// Path component of the base URL, without a trailing slash. Empty when
    /// the site is served at the root.
    pub fn base_path(&self) -> String {
        Url::parse(&self.base_url)
            .map(|u| u.path().trim_end_matches('/').to_string())
            .unwrap_or_default()
    }

    /// The slice of configuration the content rewriter consults.
    pub fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            download_images: self.download_images,
            hidden_tags_file: self.hidden_tags_file.clone(),
        }
    }
}
