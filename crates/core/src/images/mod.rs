//! Image filename derivation and the download/clean pipeline.
//!
//! Rewritten pages reference images by deterministic content-hash filenames;
//! this module derives those names, repairs a known class of mangled image
//! URLs, and downloads/normalizes the files the rewriter reported.

pub mod cleaner;
pub mod fetcher;

pub use cleaner::ImageCleaner;
pub use fetcher::ImageFetcher;

use std::path::Path;

use regex::Regex;

use crate::page::sha256_hex;

/// Extension used when a URL's path carries no recognized image extension.
/// The document converter refuses files whose extensions it does not know.
const DEFAULT_IMAGE_EXT: &str = ".jpg";

/// Extensions the document converter is known to decode.
const SUPPORTED_IMAGE_EXTS: [&str; 6] = [".bmp", ".gif", ".jpeg", ".jpg", ".png", ".svg"];

/// Repair an image URL mangled by upstream extraction.
///
/// Some extractors collapse a responsive-source descriptor into the `src`
/// value, leaving a URL-encoded size suffix such as `photo.jpg%20640w,`.
/// When that trailing pattern is present the URL is truncated at the first
/// `%20`; otherwise it is returned unchanged. Best-effort only: there is no
/// ground truth for the original URL at this layer.
pub fn fix_image_url(url: &str) -> String {
    let residue = Regex::new(r"%20\d+[wx](,|$)").unwrap();
    if residue.is_match(url)
        && let Some(pos) = url.find("%20")
    {
        return url[..pos].to_string();
    }
    url.to_string()
}

/// Derive the deterministic local filename for a remote image URL.
///
/// The name is the hex SHA-256 of the URL plus the URL's path extension when
/// supported, normalized to lowercase; unrecognized or missing extensions
/// fall back to [`DEFAULT_IMAGE_EXT`]. The same URL always maps to the same
/// filename; distinct URLs hashing to the same name silently collide (last
/// write wins in the image map).
pub fn local_image_filename(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    let ext = Path::new(path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .filter(|e| SUPPORTED_IMAGE_EXTS.contains(&e.as_str()))
        .unwrap_or_else(|| DEFAULT_IMAGE_EXT.to_string());
    format!("{}{}", sha256_hex(url), ext)
}
