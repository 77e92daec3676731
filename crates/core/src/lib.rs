pub mod config;
pub mod db;
pub mod doc;
pub mod error;
pub mod fetch;
pub mod images;
pub mod mail;
pub mod page;
pub mod processor;
pub mod rewrite;
pub mod rules;

pub use config::Config;
pub use db::Database;
pub use doc::{DOC_FILE, INDEX_FILE, build_doc};
pub use error::{Result, SatchelError};
pub use fetch::{ContentSource, ParsedPage, SourceConfig};
pub use images::{ImageCleaner, ImageFetcher, fix_image_url, local_image_filename};
pub use mail::Mailer;
pub use page::{PageInfo, get_host, page_token, sha256_hex};
pub use processor::Processor;
pub use rewrite::{RewriteOptions, RewrittenPage, Rewriter, escape_html};
pub use rules::{HiddenRules, Selector};
