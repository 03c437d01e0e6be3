//! Markdown → plain text
//!
//! A fixed sequence of regex substitutions, not a parse. Markers are removed
//! and the text they wrap is kept; images and horizontal rules disappear
//! entirely. Nested or escaped syntax (an asterisk inside inline code, say)
//! is handled on a best-effort basis.
//!
//! ```rust
//! use markdown_workbench::plain_text::strip_markdown;
//!
//! assert_eq!(
//!     strip_markdown("**bold** and *italic* [link](http://x)"),
//!     "bold and italic link"
//! );
//! ```

use regex::{Captures, Regex};
use std::sync::OnceLock;

#[derive(Clone, Copy)]
enum Replacement {
    /// Expand a `$1`-style template
    Template(&'static str),
    /// Keep the match with its backtick delimiters removed
    TrimBackticks,
}

struct Rule {
    regex: Regex,
    replacement: Replacement,
}

/// Applied in order. Horizontal rules go before emphasis and list markers,
/// images before links.
const RULES: &[(&str, Replacement)] = &[
    // Headings
    (r"(?m)^#{1,6}\s+", Replacement::Template("")),
    // Horizontal rules
    (r"(?m)^[ \t]*[-*_]{3,}[ \t]*$", Replacement::Template("")),
    // Images
    (r"!\[.*?\]\(.*?\)", Replacement::Template("")),
    // Bold, then italic
    (r"\*\*(.+?)\*\*", Replacement::Template("$1")),
    (r"\*(.+?)\*", Replacement::Template("$1")),
    (r"\b__(.+?)__\b", Replacement::Template("$1")),
    (r"\b_([^_\n]+?)_\b", Replacement::Template("$1")),
    // Strikethrough
    (r"~~(.+?)~~", Replacement::Template("$1")),
    // Links keep their text; a link left empty by the image rule vanishes
    (r"\[(.*?)\]\(.*?\)", Replacement::Template("$1")),
    // List markers
    (r"(?m)^([ \t]*)[-*+][ \t]+", Replacement::Template("$1")),
    (r"(?m)^([ \t]*)\d+\.[ \t]+", Replacement::Template("$1")),
    // Blockquotes
    (r"(?m)^[ \t]*>[ \t]?", Replacement::Template("")),
    // Code fences, then inline code
    (r"(?m)^[ \t]*(?:`{3,}|~{3,}).*$", Replacement::Template("")),
    (r"`{1,3}[^`\n]+`{1,3}", Replacement::TrimBackticks),
    // Outer table pipes
    (r"(?m)^[ \t]*\|(.*)\|[ \t]*$", Replacement::Template("$1")),
];

fn rules() -> &'static [Rule] {
    static COMPILED: OnceLock<Vec<Rule>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(pattern).ok().map(|regex| Rule {
                    regex,
                    replacement: *replacement,
                })
            })
            .collect()
    })
}

/// Strip markdown syntax, keeping readable text. The result is trimmed.
pub fn strip_markdown(markdown: &str) -> String {
    let mut text = markdown.replace("\r\n", "\n");

    for rule in rules() {
        let replaced = match rule.replacement {
            Replacement::Template(template) => rule.regex.replace_all(&text, template),
            Replacement::TrimBackticks => rule
                .regex
                .replace_all(&text, |caps: &Captures| caps[0].trim_matches('`').to_string()),
        };
        text = replaced.into_owned();
    }

    text.trim().to_string()
}
