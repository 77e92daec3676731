//! The page-processing pipeline: fetch, rewrite, store to disk, convert,
//! deliver.
//!
//! The processor owns no persistent state; the caller stores the returned
//! [`PageInfo`] in the database after a successful run.

use std::fs;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::doc::{DOC_FILE, INDEX_FILE, build_doc};
use crate::error::{Result, SatchelError};
use crate::fetch::{ContentSource, ParsedPage, SourceConfig};
use crate::images::{ImageCleaner, ImageFetcher, local_image_filename};
use crate::mail::Mailer;
use crate::page::{PageInfo, get_host};
use crate::rewrite::{Rewriter, escape_html};

/// Stylesheets copied into every page directory.
const PAGE_CSS_FILES: [&str; 2] = ["common.css", "page.css"];

/// Drives a URL through fetch, rewrite, and storage.
pub struct Processor {
    cfg: Arc<Config>,
    source: ContentSource,
    rewriter: Rewriter,
    fetcher: ImageFetcher,
    mailer: Mailer,
}

impl Processor {
    pub fn new(cfg: Arc<Config>) -> Result<Processor> {
        let source = ContentSource::new(SourceConfig {
            endpoint: cfg.parser_url.clone(),
            token: cfg.parser_token.clone(),
            ..Default::default()
        })?;
        let cleaner = ImageCleaner {
            max_width: cfg.max_image_width,
            max_height: cfg.max_image_height,
            max_bytes: cfg.max_image_bytes,
            jpeg_quality: cfg.jpeg_quality,
        };
        let fetcher = ImageFetcher::new(cleaner, cfg.max_image_procs)?;
        let rewriter = Rewriter::new(cfg.rewrite_options());
        let mailer = Mailer::new(cfg.mail_server.clone(), cfg.sender.clone(), cfg.recipient.clone());
        Ok(Processor { cfg, source, rewriter, fetcher, mailer })
    }

    /// Fetch, rewrite, and store one page. Returns the page's identity
    /// record; the caller persists it.
    pub async fn process_url(&self, url: &str) -> Result<PageInfo> {
        let url = self.rewrite_url(url)?;
        let mut pi = PageInfo::new(&url, &self.cfg.username, &self.cfg.password);

        let out_dir = self.cfg.page_dir.join(&pi.id);
        info!(%url, dir = %out_dir.display(), "processing page");
        if out_dir.exists() {
            debug!(dir = %out_dir.display(), "deleting existing page directory");
            fs::remove_dir_all(&out_dir)?;
        }
        fs::create_dir_all(&out_dir)?;

        let parsed = self.source.fetch(&url).await?;
        let content = parsed
            .content
            .as_deref()
            .ok_or_else(|| SatchelError::MissingContent(url.clone()))?;
        self.check_content(&url, content)?;

        let content = absolutize_urls(content, &url);
        let page = self.rewriter.rewrite_content(&content, &url)?;

        pi.title = parsed
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| url.clone());

        let mut images = page.images;
        let mut favicon = String::new();
        if self.cfg.download_favicons
            && let Some(favicon_url) = favicon_url(&url)
        {
            favicon = local_image_filename(&favicon_url);
            images.insert(favicon.clone(), favicon_url);
        }

        if self.cfg.download_images && !images.is_empty() {
            let total = self.fetcher.download_all(&images, &out_dir).await;
            info!(count = images.len(), bytes = total, "downloaded images");
        }
        if !favicon.is_empty() && !out_dir.join(&favicon).exists() {
            favicon.clear();
        }

        for file in PAGE_CSS_FILES {
            fs::copy(self.cfg.static_dir.join(file), out_dir.join(file))?;
        }

        let html = render_page(&self.cfg, &pi, &parsed, &page.html, &favicon);
        fs::write(out_dir.join(INDEX_FILE), html)?;
        Ok(pi)
    }

    /// Convert a stored page and mail it to the configured device.
    pub async fn send_to_kindle(&self, id: &str) -> Result<()> {
        if !Regex::new("^[a-f0-9]+$").unwrap().is_match(id) {
            return Err(SatchelError::InvalidPageId(id.to_string()));
        }
        let dir = self.cfg.page_dir.join(id);
        if !dir.exists() {
            return Err(SatchelError::PageNotFound(id.to_string()));
        }

        build_doc(&self.cfg.kindlegen_path, &dir).await?;
        if self.cfg.recipient.is_empty() || self.cfg.sender.is_empty() {
            // Leave the document in place when mailing is unconfigured.
            info!("empty recipient or sender; not sending mail");
            return Ok(());
        }

        let doc_path = dir.join(DOC_FILE);
        self.mailer.send_doc(&doc_path).await?;
        fs::remove_file(&doc_path)?;
        Ok(())
    }

    /// Apply the configured `[pattern, replacement]` pairs to `url`.
    fn rewrite_url(&self, url: &str) -> Result<String> {
        let Some(path) = &self.cfg.url_patterns_file else {
            return Ok(url.to_string());
        };
        let patterns: Vec<(String, String)> = serde_json::from_str(&fs::read_to_string(path)?)?;

        let mut url = url.to_string();
        for (pattern, replacement) in &patterns {
            let re = Regex::new(pattern)
                .map_err(|e| SatchelError::Config(format!("bad URL pattern {pattern:?}: {e}")))?;
            url = re.replace_all(&url, replacement.as_str()).into_owned();
        }
        Ok(url)
    }

    /// Reject content matching a configured `[url-regex, needle]` pair.
    fn check_content(&self, url: &str, content: &str) -> Result<()> {
        let Some(path) = &self.cfg.bad_content_file else {
            return Ok(());
        };
        let patterns: Vec<(String, String)> = serde_json::from_str(&fs::read_to_string(path)?)?;

        for (url_pattern, needle) in &patterns {
            let re = Regex::new(url_pattern)
                .map_err(|e| SatchelError::Config(format!("bad content pattern {url_pattern:?}: {e}")))?;
            if re.is_match(url) && content.contains(needle) {
                return Err(SatchelError::BadContent { url: url.to_string(), pattern: needle.clone() });
            }
        }
        Ok(())
    }
}

/// Resolve relative link and image references against the page's origin so
/// image downloads and retained links keep working offline. The input is
/// returned untouched when it cannot be rewritten.
fn absolutize_urls(html: &str, origin: &str) -> String {
    let Ok(base) = Url::parse(origin) else {
        return html.to_string();
    };

    let mut output = String::with_capacity(html.len());
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![
                lol_html::element!("a[href]", |el| {
                    if let Some(href) = el.get_attribute("href")
                        && let Ok(absolute) = base.join(&href)
                    {
                        el.set_attribute("href", absolute.as_str()).ok();
                    }
                    Ok(())
                }),
                lol_html::element!("img[src]", |el| {
                    if let Some(src) = el.get_attribute("src")
                        && let Ok(absolute) = base.join(&src)
                    {
                        el.set_attribute("src", absolute.as_str()).ok();
                    }
                    Ok(())
                }),
            ],
            ..Default::default()
        },
        |c: &[u8]| output.push_str(&String::from_utf8_lossy(c)),
    );

    if rewriter.write(html.as_bytes()).is_err() {
        return html.to_string();
    }
    if rewriter.end().is_err() {
        return html.to_string();
    }
    if output.is_empty() { html.to_string() } else { output }
}

/// Site favicon location for a page URL.
fn favicon_url(page_url: &str) -> Option<String> {
    let mut u = Url::parse(page_url).ok()?;
    u.set_path("/favicon.ico");
    u.set_query(None);
    u.set_fragment(None);
    Some(u.to_string())
}

/// Reformat the parser's `YYYY-MM-DD HH:MM:SS` publication stamp for
/// display. Unparseable stamps are omitted rather than shown raw.
fn format_pub_date(raw: &str) -> Option<String> {
    let parse = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let display = time::macros::format_description!("[weekday repr:long], [month repr:long] [day padding:none], [year]");
    time::PrimitiveDateTime::parse(raw, &parse).ok()?.format(&display).ok()
}

/// Render the stored page document around the rewritten content.
fn render_page(cfg: &Config, pi: &PageInfo, parsed: &ParsedPage, content: &str, favicon: &str) -> String {
    let title = escape_html(&pi.title);
    let host = escape_html(&get_host(&pi.original_url));
    let original_url = escape_html(&pi.original_url);
    let base = cfg.base_path();
    let query = format!("?i={}&t={}", pi.id, pi.token);
    let list_path = if base.is_empty() { "/".to_string() } else { base.clone() };

    let mut head = String::from("<!DOCTYPE html>\n<html>\n  <head>\n");
    head.push_str("    <meta content=\"text/html; charset=utf-8\" http-equiv=\"Content-Type\"/>\n");
    head.push_str("    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\"/>\n");
    head.push_str(&format!("    <title>{title}</title>\n"));
    head.push_str(&format!("    <meta name=\"DCTERMS.title\" content=\"{title}\"/>\n"));
    if let Some(author) = parsed.author.as_deref().filter(|a| !a.is_empty()) {
        let author = escape_html(author);
        head.push_str(&format!("    <meta name=\"author\" content=\"{author}\"/>\n"));
        head.push_str(&format!("    <meta name=\"DCTERMS.creator\" content=\"{author}\"/>\n"));
    }
    for file in PAGE_CSS_FILES {
        head.push_str(&format!("    <link rel=\"stylesheet\" href=\"{file}\"/>\n"));
    }
    if !favicon.is_empty() {
        head.push_str(&format!("    <link rel=\"icon\" href=\"{favicon}\"/>\n"));
    }
    head.push_str("  </head>\n");

    let byline = parsed
        .author
        .as_deref()
        .filter(|a| !a.is_empty())
        .map(|a| format!("    <b>By {}</b><br/>\n", escape_html(a)))
        .unwrap_or_default();
    let pub_date = parsed
        .date_published
        .as_deref()
        .and_then(format_pub_date)
        .map(|d| format!("    <em>Published {d}</em><br/>\n"))
        .unwrap_or_default();

    format!(
        "{head}  <body>\n    <h1 id=\"title-header\">{title}</h1>\n    <a href=\"{original_url}\">{host}</a><br/>\n\
         {byline}{pub_date}    <span id=\"top-links\">\n      <a href=\"#end-paragraph\">Jump to bottom</a> -\n      \
         <a href=\"{base}/kindle{query}\">Send to Kindle</a>\n    </span>\n    <div class=\"content\">\n{content}\n    \
         </div>\n    <p id=\"end-paragraph\">\n      <a href=\"{base}/archive{query}\">Toggle archived</a> -\n      \
         <a href=\"#title-header\">Jump to top</a> -\n      <a href=\"{list_path}\">Back to list</a>\n    </p>\n  \
         </body>\n</html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn processor_with(update: impl FnOnce(&mut Config)) -> Processor {
        let mut cfg = Config::default();
        update(&mut cfg);
        Processor::new(Arc::new(cfg)).unwrap()
    }

    fn temp_json(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn test_rewrite_url_applies_patterns() {
        let patterns = temp_json(r#"[["^(https?://)m\\.", "$1"], ["\\?.*$", ""]]"#);
        let p = processor_with(|cfg| cfg.url_patterns_file = Some(PathBuf::from(patterns.path())));

        assert_eq!(
            p.rewrite_url("http://m.example.com/index.html?r=1").unwrap(),
            "http://example.com/index.html"
        );
        assert_eq!(
            p.rewrite_url("http://example.com/other.html").unwrap(),
            "http://example.com/other.html"
        );
    }

    #[test]
    fn test_rewrite_url_without_patterns_file() {
        let p = processor_with(|_| {});
        assert_eq!(p.rewrite_url("http://a.com/x").unwrap(), "http://a.com/x");
    }

    #[test]
    fn test_check_content_rejects_matching_pages() {
        let patterns = temp_json(r#"[["[./]example\\.com/", "Go away."], ["[./]example\\.net/", "Really go away."]]"#);
        let p = processor_with(|cfg| cfg.bad_content_file = Some(PathBuf::from(patterns.path())));

        assert!(p.check_content("http://www.example.com/good.html", "<h1>Hi!</h1>").is_ok());
        assert!(matches!(
            p.check_content("http://www.example.com/bad.html", "<h1>Go away.</h1>"),
            Err(SatchelError::BadContent { .. })
        ));
        // The needle only counts for URLs matching its pattern.
        assert!(p.check_content("http://www.example.net/bad.html", "<h1>Go away.</h1>").is_ok());
        assert!(
            p.check_content("http://www.example.net/bad.html", "<h1>Really go away.</h1>")
                .is_err()
        );
    }

    #[test]
    fn test_absolutize_urls() {
        let html = r#"<a href="/about">a</a><img src="images/pic.jpg"><img src="http://cdn.example.net/x.png">"#;
        let result = absolutize_urls(html, "http://example.com/blog/post.html");
        assert!(result.contains(r#"href="http://example.com/about""#));
        assert!(result.contains(r#"src="http://example.com/blog/images/pic.jpg""#));
        assert!(result.contains(r#"src="http://cdn.example.net/x.png""#));
    }

    #[test]
    fn test_absolutize_urls_bad_origin_is_identity() {
        let html = r#"<img src="images/pic.jpg">"#;
        assert_eq!(absolutize_urls(html, "not a url"), html);
    }

    #[test]
    fn test_favicon_url() {
        assert_eq!(
            favicon_url("http://www.example.com/articles/1?x=2#frag").unwrap(),
            "http://www.example.com/favicon.ico"
        );
    }

    #[test]
    fn test_format_pub_date() {
        assert_eq!(
            format_pub_date("2014-07-25 08:30:00").unwrap(),
            "Friday, July 25, 2014"
        );
        assert!(format_pub_date("last Tuesday").is_none());
    }

    #[test]
    fn test_render_page_escapes_metadata() {
        let cfg = Config::default();
        let pi = PageInfo {
            id: "abc".to_string(),
            original_url: "http://example.com/a?x=1&y=2".to_string(),
            title: "Ben & Jerry <3".to_string(),
            time_added: 0,
            token: "tok".to_string(),
        };
        let parsed = ParsedPage {
            author: Some("A. Author".to_string()),
            date_published: Some("2014-07-25 08:30:00".to_string()),
            ..Default::default()
        };

        let html = render_page(&cfg, &pi, &parsed, "<p>content</p>", "");
        assert!(html.contains("Ben &amp; Jerry &lt;3"));
        assert!(html.contains("<b>By A. Author</b>"));
        assert!(html.contains("Published Friday, July 25, 2014"));
        assert!(html.contains("<p>content</p>"));
        assert!(html.contains("/kindle?i=abc&t=tok"));
        assert!(html.contains("/archive?i=abc&t=tok"));
    }

    #[tokio::test]
    async fn test_send_to_kindle_validates_id() {
        let p = processor_with(|_| {});
        assert!(matches!(
            p.send_to_kindle("../../etc/passwd").await,
            Err(SatchelError::InvalidPageId(_))
        ));
        assert!(matches!(
            p.send_to_kindle("0123abc").await,
            Err(SatchelError::PageNotFound(_))
        ));
    }
}
