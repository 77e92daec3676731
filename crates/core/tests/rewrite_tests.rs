//! End-to-end golden test for the content rewriter.

use regex::Regex;
use satchel_core::{HiddenRules, RewriteOptions, Rewriter, local_image_filename};

const INPUT_URL: &str = "http://www.example.com/test.html";

/// Every remote image the fixture references, including one whose URL needs
/// the malformed-srcset-residue repair before hashing.
const EXPECTED_IMAGES: [&str; 3] = [
    "http://www.example.com/img.png",
    "http://assets.example.com/photo.jpg",
    "http://cdn.example.com/lazy",
];

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
}

#[test]
fn test_golden_rewrite() {
    let input = fixture("input.html");
    let rules = HiddenRules::parse(&fixture("hidden_tags.json"), INPUT_URL).unwrap();

    let rewriter = Rewriter::new(RewriteOptions { download_images: true, hidden_tags_file: None });
    let page = rewriter.rewrite_with_rules(&input, &rules);

    // Whitespace is a pain; collapse blank lines before comparing.
    let blank_lines = Regex::new(r"\n\s*\n").unwrap();
    let output = blank_lines.replace_all(&page.html, "\n").into_owned();

    assert_eq!(output, fixture("output.html"));

    assert_eq!(page.images.len(), EXPECTED_IMAGES.len());
    for url in EXPECTED_IMAGES {
        let filename = local_image_filename(url);
        assert_eq!(
            page.images.get(&filename).map(String::as_str),
            Some(url),
            "missing {url} under {filename}"
        );
    }
}

#[test]
fn test_rewrite_content_resolves_rules_from_file() {
    let rewriter = Rewriter::new(RewriteOptions {
        download_images: true,
        hidden_tags_file: Some("tests/fixtures/hidden_tags.json".into()),
    });

    let page = rewriter.rewrite_content(&fixture("input.html"), INPUT_URL).unwrap();
    assert!(!page.html.contains("sharing-links"));
    assert!(!page.html.contains("Footnotes"));
    assert!(page.html.contains("First paragraph."));

    // A host the rule file's specific entry does not cover keeps its
    // footnotes; the wildcard entries still apply.
    let page = rewriter
        .rewrite_content(&fixture("input.html"), "http://other.net/test.html")
        .unwrap();
    assert!(page.html.contains("Footnotes"));
    assert!(!page.html.contains("sharing-links"));
}
