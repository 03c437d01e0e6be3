//! Markdown → HTML rendering
//!
//! # Pipeline
//!
//! 1. Parse CommonMark with the GFM extensions (tables, strikethrough, task
//!    lists) using pulldown-cmark
//! 2. Turn bare `http(s)://` and `www.` URLs in text into links
//! 3. Replace fenced code blocks in a known language with highlighted markup
//! 4. Serialize to HTML; raw HTML in the source passes through untouched
//! 5. Sanitize the serialized HTML against the allow-list
//! 6. Optionally wrap the result in a standalone document
//!
//! Sanitizing is the last step that touches the body. Everything produced by
//! earlier steps, raw HTML and highlighter output included, goes through it.
//!
//! Markdown has no reject state, so rendering never fails.
//!
//! ```
//! use markdown_workbench::markdown::{markdown_to_html, HtmlOptions};
//!
//! let html = markdown_to_html("# Title\n\n- [x] done\n", &HtmlOptions::fragment());
//! assert!(html.contains("<h1>Title</h1>"));
//! assert!(html.contains("type=\"checkbox\""));
//! ```

use log::debug;
use pulldown_cmark::{
    CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream, html,
};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::highlight::{highlight_code, highlight_css};
use crate::sanitizer::HtmlSanitizer;

/// Title of the standalone document shell
pub const DOCUMENT_TITLE: &str = "Exported Markdown";

const DOCUMENT_STYLES: &str = r#"
body {
  font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Helvetica, Arial, sans-serif;
  max-width: 900px;
  margin: 40px auto;
  padding: 0 20px;
  line-height: 1.6;
  color: #24292f;
  background-color: #ffffff;
}
h1, h2, h3, h4, h5, h6 {
  margin-top: 24px;
  margin-bottom: 16px;
  font-weight: 600;
  line-height: 1.25;
}
h1 { font-size: 2em; border-bottom: 1px solid #d0d7de; padding-bottom: 0.3em; }
h2 { font-size: 1.5em; border-bottom: 1px solid #d0d7de; padding-bottom: 0.3em; }
pre {
  background: #f6f8fa;
  padding: 16px;
  border-radius: 6px;
  overflow-x: auto;
  border: 1px solid #d0d7de;
}
code {
  background: #f6f8fa;
  padding: 2px 6px;
  border-radius: 3px;
  font-family: 'SFMono-Regular', Consolas, 'Liberation Mono', Menlo, monospace;
  font-size: 85%;
}
pre code { background: none; padding: 0; }
table { border-collapse: collapse; width: 100%; margin: 16px 0; }
th, td { border: 1px solid #d0d7de; padding: 6px 13px; text-align: left; }
th { background: #f6f8fa; font-weight: 600; }
blockquote {
  border-left: 4px solid #d0d7de;
  padding-left: 16px;
  color: #656d76;
  margin: 16px 0;
}
a { color: #0969da; text-decoration: none; }
a:hover { text-decoration: underline; }
ul, ol { padding-left: 2em; }
li { margin-top: 0.25em; }
img { max-width: 100%; height: auto; }
input[type="checkbox"] { margin-right: 8px; }
"#;

/// Options for one HTML conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlOptions {
    /// Embed the stylesheet (only meaningful with `standalone`)
    #[serde(default = "default_true")]
    pub include_styles: bool,
    /// Wrap the body in a complete HTML document
    #[serde(default = "default_true")]
    pub standalone: bool,
}

impl HtmlOptions {
    /// Sanitized body only, no document shell
    pub fn fragment() -> Self {
        Self {
            include_styles: false,
            standalone: false,
        }
    }
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            include_styles: true,
            standalone: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Markdown renderer holding the sanitizer policy
pub struct MarkdownRenderer {
    sanitizer: HtmlSanitizer,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self {
            sanitizer: HtmlSanitizer::new(),
        }
    }

    pub fn with_sanitizer(sanitizer: HtmlSanitizer) -> Self {
        Self { sanitizer }
    }

    /// Render markdown according to `options`
    pub fn render(&self, markdown: &str, options: &HtmlOptions) -> String {
        let body = self.render_body(markdown);
        if options.standalone {
            standalone_document(&body, options.include_styles)
        } else {
            body
        }
    }

    /// Render markdown to a sanitized HTML fragment
    pub fn render_body(&self, markdown: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let parser = TextMergeStream::new(Parser::new_ext(markdown, options));
        let events = highlight_code_blocks(autolink(parser));

        let mut unsafe_html = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut unsafe_html, events.into_iter());

        let clean = self.sanitizer.sanitize(&unsafe_html);
        debug!(
            "Rendered {} bytes of markdown into {} bytes of HTML",
            markdown.len(),
            clean.len()
        );
        clean
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Render with the default sanitizer policy
pub fn markdown_to_html(markdown: &str, options: &HtmlOptions) -> String {
    MarkdownRenderer::new().render(markdown, options)
}

/// Wrap an already-sanitized body in a full HTML document
pub fn standalone_document(body: &str, include_styles: bool) -> String {
    let mut document = String::with_capacity(body.len() + 4096);
    document.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    document.push_str("<meta charset=\"UTF-8\">\n");
    document.push_str(
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    document.push_str("<title>");
    document.push_str(DOCUMENT_TITLE);
    document.push_str("</title>\n");
    if include_styles {
        document.push_str("<style>");
        document.push_str(DOCUMENT_STYLES);
        document.push_str(highlight_css());
        document.push_str("</style>\n");
    }
    document.push_str("</head>\n<body>\n");
    document.push_str(body);
    if !body.ends_with('\n') {
        document.push('\n');
    }
    document.push_str("</body>\n</html>\n");
    document
}

fn url_regex() -> Option<&'static Regex> {
    static URL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    URL_REGEX
        .get_or_init(|| {
            Regex::new(r#"\b(?:https?://|www\.)[^\s<>"]*[^\s<>".,:;!?'\)\]]"#).ok()
        })
        .as_ref()
}

/// Split text events so bare URLs become autolinks.
///
/// Text already inside a link, image or code block is left alone.
fn autolink<'a>(events: impl Iterator<Item = Event<'a>>) -> Vec<Event<'a>> {
    let mut output = Vec::new();
    let mut link_depth = 0usize;
    let mut in_code_block = false;

    for event in events {
        match &event {
            Event::Start(Tag::Link { .. } | Tag::Image { .. }) => link_depth += 1,
            Event::End(TagEnd::Link | TagEnd::Image) => link_depth = link_depth.saturating_sub(1),
            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => in_code_block = false,
            Event::Text(text) if link_depth == 0 && !in_code_block => {
                if let Some(regex) = url_regex()
                    && regex.is_match(text)
                {
                    split_urls(regex, text, &mut output);
                    continue;
                }
            }
            _ => {}
        }
        output.push(event);
    }

    output
}

fn split_urls<'a>(regex: &Regex, text: &str, output: &mut Vec<Event<'a>>) {
    let mut last = 0;
    for found in regex.find_iter(text) {
        if found.start() > last {
            output.push(Event::Text(CowStr::from(text[last..found.start()].to_string())));
        }

        let shown = found.as_str();
        let dest = if shown.starts_with("www.") {
            format!("http://{shown}")
        } else {
            shown.to_string()
        };

        output.push(Event::Start(Tag::Link {
            link_type: LinkType::Autolink,
            dest_url: CowStr::from(dest),
            title: CowStr::from(""),
            id: CowStr::from(""),
        }));
        output.push(Event::Text(CowStr::from(shown.to_string())));
        output.push(Event::End(TagEnd::Link));
        last = found.end();
    }
    if last < text.len() {
        output.push(Event::Text(CowStr::from(text[last..].to_string())));
    }
}

/// Replace fenced blocks in a highlightable language with pre-rendered markup
fn highlight_code_blocks(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut output = Vec::with_capacity(events.len());
    let mut pending: Option<(String, Vec<Event<'_>>)> = None;

    for event in events {
        if let Some((lang, buffered)) = pending.as_mut() {
            let at_end = matches!(event, Event::End(TagEnd::CodeBlock));
            buffered.push(event);
            if !at_end {
                continue;
            }

            let source: String = buffered
                .iter()
                .filter_map(|e| match e {
                    Event::Text(text) => Some(&**text),
                    _ => None,
                })
                .collect();

            match highlight_code(lang, &source) {
                Some(spans) => output.push(Event::Html(CowStr::from(format!(
                    "<pre><code class=\"language-{lang}\">{spans}</code></pre>\n"
                )))),
                None => output.append(buffered),
            }
            pending = None;
            continue;
        }

        if let Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) = &event
            && let Some(lang) = fence_language(info)
        {
            pending = Some((lang, vec![event]));
            continue;
        }

        output.push(event);
    }

    // An unterminated block cannot come out of the parser, but never lose text
    if let Some((_, buffered)) = pending {
        output.extend(buffered);
    }

    output
}

/// First word of the info string, if it is a plain language token
fn fence_language(info: &str) -> Option<String> {
    let lang = info.split([' ', '\t', ',', '{']).next()?.trim();
    let plain = !lang.is_empty()
        && lang
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '#' | '.'));
    plain.then(|| lang.to_string())
}
