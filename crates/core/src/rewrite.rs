//! Streaming rewrite of readability-extracted article HTML.
//!
//! The rewriter makes one forward pass over the tokenizer's output: no DOM
//! is built, nothing is buffered beyond the growing output string, and
//! malformed markup passes through however the tokenizer segments it. The
//! loop has a single piece of state, the suppression depth, which skips
//! whole subtrees matched by per-site [`HiddenRules`]. Along the way image
//! references are rewritten to local content-hash filenames, heading levels
//! are flattened into a two-level scheme, and a few structural anomalies
//! (stray body tags, noscript wrappers, embedded iframes) are dropped.

use std::collections::HashMap;
use std::path::PathBuf;

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use tracing::debug;

use crate::error::Result;
use crate::images::{fix_image_url, local_image_filename};
use crate::rules::HiddenRules;

/// Elements that never have a closing tag.
const VOID_ELEMENTS: [&str; 16] = [
    "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen", "link", "meta", "param", "source",
    "track", "wbr",
];

/// The slice of configuration the rewriter actually consults.
#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    /// Replace image sources with local content-hash filenames and report
    /// the mapping so the caller can download them.
    pub download_images: bool,
    /// Path to the hidden-tag rule file, if any.
    pub hidden_tags_file: Option<PathBuf>,
}

/// Output of one rewrite call.
#[derive(Debug, Default)]
pub struct RewrittenPage {
    /// The rewritten HTML, serialized token by token in input order.
    pub html: String,
    /// Local image filename to the remote URL it was derived from. Keys are
    /// unique; colliding hashes silently overwrite (last write wins).
    pub images: HashMap<String, String>,
}

/// Token-stream content rewriter.
#[derive(Debug, Clone, Default)]
pub struct Rewriter {
    options: RewriteOptions,
}

impl Rewriter {
    pub fn new(options: RewriteOptions) -> Rewriter {
        Rewriter { options }
    }

    /// Rewrite one page's extracted HTML.
    ///
    /// `url` is the page's origin; it only selects which suppression rules
    /// apply. Rules are resolved fresh on every call since each call may see
    /// a different origin.
    pub fn rewrite_content(&self, html: &str, url: &str) -> Result<RewrittenPage> {
        let rules = HiddenRules::load(self.options.hidden_tags_file.as_deref(), url)?;
        Ok(self.rewrite_with_rules(html, &rules))
    }

    /// Rewrite with an already-resolved rule set.
    pub fn rewrite_with_rules(&self, html: &str, rules: &HiddenRules) -> RewrittenPage {
        let sink = RewriteSink {
            download_images: self.options.download_images,
            rules,
            page: RewrittenPage::default(),
            hide_depth: 0,
        };

        let mut input = BufferQueue::default();
        input.push_back(StrTendril::from_slice(html));
        let mut tokenizer = Tokenizer::new(sink, TokenizerOpts::default());
        let _ = tokenizer.feed(&mut input);
        tokenizer.end();
        tokenizer.sink.page
    }
}

/// The tokenizer sink holding the rewrite loop's state.
struct RewriteSink<'a> {
    download_images: bool,
    rules: &'a HiddenRules,
    page: RewrittenPage,
    /// Zero while emitting. Positive while inside a suppressed subtree, with
    /// the value counting the unclosed elements still to unwind; nothing is
    /// emitted until it returns to zero, and the closing tag that brings it
    /// there is dropped too.
    hide_depth: u32,
}

impl TokenSink for RewriteSink<'_> {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => self.process_tag(&tag),
            Token::CharacterTokens(text) => {
                if self.hide_depth == 0 {
                    escape_into(&text, &mut self.page.html);
                }
                TokenSinkResult::Continue
            }
            Token::CommentToken(text) => {
                if self.hide_depth == 0 {
                    self.page.html.push_str("<!--");
                    self.page.html.push_str(&text);
                    self.page.html.push_str("-->");
                }
                TokenSinkResult::Continue
            }
            Token::DoctypeToken(doctype) => {
                if self.hide_depth == 0
                    && let Some(name) = &doctype.name
                {
                    self.page.html.push_str("<!DOCTYPE ");
                    self.page.html.push_str(name);
                    self.page.html.push('>');
                }
                TokenSinkResult::Continue
            }
            // The tokenizer recovers from markup anomalies in place; only
            // rule loading and I/O can fail a rewrite.
            Token::NullCharacterToken | Token::EOFToken | Token::ParseError(_) => TokenSinkResult::Continue,
        }
    }
}

impl RewriteSink<'_> {
    fn process_tag(&mut self, tag: &Tag) -> TokenSinkResult<()> {
        let is_start = tag.kind == TagKind::StartTag;
        let name: &str = &tag.name;
        // Raw-text mode switching is the sink's call. This must be answered
        // even while suppressing, or markup-looking script bodies would
        // corrupt the depth counter.
        let next_state = if is_start { raw_kind(name) } else { None };

        // Nested within a hidden subtree: track depth, emit nothing.
        if self.hide_depth > 0 {
            if !is_start {
                self.hide_depth -= 1;
            } else if !is_void(name) && !tag.self_closing {
                self.hide_depth += 1;
            }
            return sink_result(next_state);
        }

        if self.rules.should_hide(name, attr_value(tag, "id"), attr_value(tag, "class")) {
            debug!(tag = name, class = attr_value(tag, "class"), "hiding token");
            if is_start {
                self.hide_depth = 1;
            }
            return sink_result(next_state);
        }

        match name {
            "img" if is_start => self.rewrite_img(tag),
            // Flatten author-inconsistent heading hierarchies: h2 for
            // section titles, h3 for everything deeper.
            "h1" => self.emit_tag(tag, "h2"),
            "h4" | "h5" | "h6" => self.emit_tag(tag, "h3"),
            // Embedded players have no offline equivalent.
            "iframe" => {}
            // Dropping the wrapper while its contents are tokenized as
            // ordinary markup unwraps no-script fallbacks such as
            // lazily-loaded image alternatives.
            "noscript" => {}
            // Extraction sometimes leaves stray body tags inside article
            // content; the page shell supplies its own.
            "body" => {}
            _ => self.emit_tag(tag, name),
        }
        sink_result(next_state)
    }

    /// Serialize a tag, possibly under a coerced name.
    fn emit_tag(&mut self, tag: &Tag, name: &str) {
        let out = &mut self.page.html;
        match tag.kind {
            TagKind::StartTag => {
                out.push('<');
                out.push_str(name);
                for attr in &tag.attrs {
                    push_attr(out, &attr.name.local, &attr.value);
                }
                out.push_str(if tag.self_closing { "/>" } else { ">" });
            }
            TagKind::EndTag => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }

    /// Rewrite one `<img>` start tag, rebuilding its attribute list in a
    /// single scan.
    ///
    /// A usable `src` may be replaced with a local content-hash filename;
    /// `srcset` is always dropped so the renderer cannot prefer a responsive
    /// source over the rewritten one; a non-empty `title` is kept and
    /// additionally rendered as a trailing caption block. An image that
    /// never had a usable source is dropped outright: the document converter
    /// cannot handle sourceless images.
    fn rewrite_img(&mut self, tag: &Tag) {
        let mut has_src = false;
        let mut caption = String::new();
        let mut attrs: Vec<(&str, String)> = Vec::with_capacity(tag.attrs.len());

        for attr in &tag.attrs {
            let key: &str = &attr.name.local;
            let value: &str = &attr.value;
            match key {
                "src" if !value.is_empty() => {
                    has_src = true;
                    if self.download_images {
                        let fixed = fix_image_url(value);
                        let filename = local_image_filename(&fixed);
                        self.page.images.insert(filename.clone(), fixed);
                        attrs.push((key, filename));
                    } else {
                        attrs.push((key, value.to_string()));
                    }
                }
                "srcset" => {}
                "title" if !value.is_empty() => {
                    caption = format!("\n<div class=\"img-title\">{}</div>\n", escape_html(value));
                    attrs.push((key, value.to_string()));
                }
                _ => attrs.push((key, value.to_string())),
            }
        }

        if !has_src {
            return;
        }

        let out = &mut self.page.html;
        out.push_str("<img");
        for (key, value) in &attrs {
            push_attr(out, key, value);
        }
        out.push_str(if tag.self_closing { "/>" } else { ">" });
        out.push_str(&caption);
    }
}

fn sink_result(kind: Option<RawKind>) -> TokenSinkResult<()> {
    match kind {
        Some(kind) => TokenSinkResult::RawData(kind),
        None => TokenSinkResult::Continue,
    }
}

/// Raw-text handling for elements whose content is not markup. `noscript`
/// and `iframe` are deliberately absent: their contents stay in markup mode
/// so later loop iterations still process them.
fn raw_kind(name: &str) -> Option<RawKind> {
    match name {
        "script" => Some(RawKind::ScriptData),
        "style" | "xmp" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        "title" | "textarea" => Some(RawKind::Rcdata),
        _ => None,
    }
}

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

fn attr_value<'t>(tag: &'t Tag, name: &str) -> &'t str {
    tag.attrs
        .iter()
        .find(|a| &*a.name.local == name)
        .map(|a| &*a.value)
        .unwrap_or("")
}

fn push_attr(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    escape_into(value, out);
    out.push('"');
}

/// HTML-escape `text` for element content or double-quoted attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_into(text, &mut out);
    out
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::sha256_hex;
    use std::io::Write;

    fn rewriter() -> Rewriter {
        Rewriter::new(RewriteOptions { download_images: true, hidden_tags_file: None })
    }

    fn rewrite(html: &str) -> RewrittenPage {
        rewriter().rewrite_with_rules(html, &HiddenRules::default())
    }

    fn rewrite_hidden(html: &str, rules_json: &str) -> RewrittenPage {
        let rules = HiddenRules::parse(rules_json, "http://www.example.com/test.html").unwrap();
        rewriter().rewrite_with_rules(html, &rules)
    }

    #[test]
    fn test_passthrough_preserves_markup() {
        let page = rewrite(r#"<p data-note="1">a &amp; b</p><br/><!--c-->"#);
        assert_eq!(page.html, r#"<p data-note="1">a &amp; b</p><br/><!--c-->"#);
        assert!(page.images.is_empty());
    }

    #[test]
    fn test_suppression_drops_subtree_and_both_tags() {
        let page = rewrite_hidden(
            r#"<div class="ads"><p>X</p></div><p>keep</p>"#,
            r#"{"*": ["div.ads"]}"#,
        );
        assert_eq!(page.html, "<p>keep</p>");
    }

    #[test]
    fn test_nested_suppression_does_not_resurface_early() {
        let page = rewrite_hidden(
            r#"<div class="ads"><div><div>X</div><p>Y</p></div></div><p>keep</p>"#,
            r#"{"*": ["div.ads"]}"#,
        );
        assert_eq!(page.html, "<p>keep</p>");
    }

    #[test]
    fn test_void_elements_inside_suppressed_subtree() {
        let page = rewrite_hidden(
            r#"<div class="ads"><img src="http://a.com/x.png"><br><p>X</p></div><p>keep</p>"#,
            r#"{"*": ["div.ads"]}"#,
        );
        assert_eq!(page.html, "<p>keep</p>");
        // Suppressed images are never downloaded.
        assert!(page.images.is_empty());
    }

    #[test]
    fn test_hidden_id_applies_per_host() {
        let page = rewrite_hidden(
            r#"<div id="comments"><p>X</p></div><p>keep</p>"#,
            r##"{"example.com": ["#comments"]}"##,
        );
        assert_eq!(page.html, "<p>keep</p>");
    }

    #[test]
    fn test_hidden_end_tag_dropped_without_depth_change() {
        let page = rewrite_hidden(r#"<p>a</p></aside><p>b</p>"#, r#"{"*": ["aside"]}"#);
        assert_eq!(page.html, "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_image_rewrite_populates_map() {
        let page = rewrite(r#"<img src="http://a.com/x.png">"#);
        let filename = format!("{}.png", sha256_hex("http://a.com/x.png"));
        assert_eq!(page.html, format!(r#"<img src="{filename}">"#));
        assert_eq!(page.images.len(), 1);
        assert_eq!(page.images.get(&filename).unwrap(), "http://a.com/x.png");
    }

    #[test]
    fn test_image_sources_kept_when_downloads_disabled() {
        let rewriter = Rewriter::new(RewriteOptions { download_images: false, hidden_tags_file: None });
        let page = rewriter.rewrite_with_rules(r#"<img src="http://a.com/x.png">"#, &HiddenRules::default());
        assert_eq!(page.html, r#"<img src="http://a.com/x.png">"#);
        assert!(page.images.is_empty());
    }

    #[test]
    fn test_mangled_image_url_repaired_before_hashing() {
        let page = rewrite(r#"<img src="http://a.com/photo.jpg%20640w,">"#);
        let filename = format!("{}.jpg", sha256_hex("http://a.com/photo.jpg"));
        assert_eq!(page.images.get(&filename).unwrap(), "http://a.com/photo.jpg");
    }

    #[test]
    fn test_sourceless_images_dropped() {
        assert_eq!(rewrite(r#"<p><img alt="x"></p>"#).html, "<p></p>");
        assert_eq!(rewrite(r#"<p><img src=""></p>"#).html, "<p></p>");
    }

    #[test]
    fn test_srcset_dropped_regardless_of_downloads() {
        for download_images in [true, false] {
            let rewriter = Rewriter::new(RewriteOptions { download_images, hidden_tags_file: None });
            let page = rewriter.rewrite_with_rules(
                r#"<img src="a.png" srcset="a.png 1x, b.png 2x">"#,
                &HiddenRules::default(),
            );
            assert!(!page.html.contains("srcset"), "srcset survived: {}", page.html);
        }
    }

    #[test]
    fn test_image_title_rendered_as_caption() {
        let page = rewrite(r#"<img src="http://a.com/x.png" title="A & B">"#);
        assert!(page.html.contains(r#" title="A &amp; B""#));
        assert!(
            page.html
                .ends_with("\n<div class=\"img-title\">A &amp; B</div>\n")
        );
    }

    #[test]
    fn test_heading_coercion() {
        assert_eq!(rewrite("<h1>Title</h1>").html, "<h2>Title</h2>");
        assert_eq!(rewrite("<h4>a</h4>").html, "<h3>a</h3>");
        assert_eq!(rewrite("<h5>b</h5>").html, "<h3>b</h3>");
        assert_eq!(rewrite("<h6>Tiny</h6>").html, "<h3>Tiny</h3>");
        assert_eq!(rewrite("<h2>kept</h2><h3>kept</h3>").html, "<h2>kept</h2><h3>kept</h3>");
    }

    #[test]
    fn test_iframe_dropped() {
        let page = rewrite(r#"<p>a</p><iframe src="http://v.example.com/embed/1"></iframe><p>b</p>"#);
        assert_eq!(page.html, "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_body_tags_dropped() {
        let page = rewrite("<body><p>x</p></body>");
        assert_eq!(page.html, "<p>x</p>");
    }

    #[test]
    fn test_noscript_unwrapped_and_contents_processed() {
        let page = rewrite(r#"<noscript><img src="http://a.com/lazy.gif"></noscript>"#);
        let filename = format!("{}.gif", sha256_hex("http://a.com/lazy.gif"));
        assert_eq!(page.html, format!(r#"<img src="{filename}">"#));
        assert_eq!(page.images.len(), 1);
    }

    #[test]
    fn test_script_bodies_stay_opaque_while_suppressing() {
        let page = rewrite_hidden(
            r#"<div class="ads"><script>if (a < b) { document.write("</div><p>fake"); }</script><p>X</p></div><p>keep</p>"#,
            r#"{"*": ["div.ads"]}"#,
        );
        assert_eq!(page.html, "<p>keep</p>");
    }

    #[test]
    fn test_duplicate_image_urls_share_one_filename() {
        let page = rewrite(r#"<img src="http://a.com/x.png"><img src="http://a.com/x.png">"#);
        assert_eq!(page.images.len(), 1);
    }

    #[test]
    fn test_malformed_rule_file_fails_the_call() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"*": ["a.b.c"]}}"#).unwrap();
        let rewriter = Rewriter::new(RewriteOptions {
            download_images: true,
            hidden_tags_file: Some(file.path().to_path_buf()),
        });
        assert!(rewriter.rewrite_content("<p>x</p>", "http://example.com/").is_err());
    }

    #[test]
    fn test_rule_file_resolved_per_origin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"example.com": ["div.ads"]}}"#).unwrap();
        let rewriter = Rewriter::new(RewriteOptions {
            download_images: true,
            hidden_tags_file: Some(file.path().to_path_buf()),
        });

        let hidden = rewriter
            .rewrite_content(r#"<div class="ads">X</div>"#, "http://news.example.com/a.html")
            .unwrap();
        assert_eq!(hidden.html, "");

        let kept = rewriter
            .rewrite_content(r#"<div class="ads">X</div>"#, "http://other.net/a.html")
            .unwrap();
        assert_eq!(kept.html, r#"<div class="ads">X</div>"#);
    }
}
