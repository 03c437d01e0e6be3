//! Fenced code block highlighting
//!
//! Code is tokenized with syntect and emitted as `<span class="hl-…">` runs,
//! so colours come from a stylesheet rather than inline styles and survive
//! sanitizing. The stylesheet for those classes is [`highlight_css`].

use log::debug;
use std::sync::OnceLock;
use syntect::highlighting::ThemeSet;
use syntect::html::{ClassStyle, ClassedHTMLGenerator, css_for_theme_with_class_style};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

/// Prefix keeps highlighter classes apart from document classes
const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hl-" };

const THEME: &str = "InspiredGitHub";

static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();
static HIGHLIGHT_CSS: OnceLock<String> = OnceLock::new();

fn syntax_set() -> &'static SyntaxSet {
    SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

/// Map common fence tags onto syntect tokens
fn syntax_token(lang: &str) -> String {
    let lower = lang.to_ascii_lowercase();
    match lower.as_str() {
        "sh" | "shell" | "zsh" | "console" => "bash".to_string(),
        "yml" => "yaml".to_string(),
        "ts" | "typescript" | "jsx" | "tsx" => "js".to_string(),
        "html" | "xhtml" => "html".to_string(),
        _ => lower,
    }
}

/// Highlight `source` for the fence language `lang`.
///
/// Returns `None` when the language is unknown or tokenizing fails; the
/// caller then emits the code as escaped plain text.
pub fn highlight_code(lang: &str, source: &str) -> Option<String> {
    let syntaxes = syntax_set();
    let syntax = syntaxes.find_syntax_by_token(&syntax_token(lang))?;

    let mut generator = ClassedHTMLGenerator::new_with_class_style(syntax, syntaxes, CLASS_STYLE);
    for line in LinesWithEndings::from(source) {
        if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
            debug!("Highlighting '{}' failed: {}", lang, e);
            return None;
        }
    }
    Some(generator.finalize())
}

/// Stylesheet for the `hl-` classes (cached)
pub fn highlight_css() -> &'static str {
    HIGHLIGHT_CSS.get_or_init(|| {
        let themes = ThemeSet::load_defaults();
        themes
            .themes
            .get(THEME)
            .or_else(|| themes.themes.values().next())
            .and_then(|theme| css_for_theme_with_class_style(theme, CLASS_STYLE).ok())
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_language_is_highlighted() {
        let html = highlight_code("rust", "fn main() {}\n").expect("rust is bundled");
        assert!(html.contains("<span class=\"hl-"));
        assert!(html.contains("main"));
    }

    #[test]
    fn test_aliases_resolve() {
        assert!(highlight_code("sh", "echo hi\n").is_some());
        assert!(highlight_code("YML", "a: 1\n").is_some());
    }

    #[test]
    fn test_unknown_language_is_none() {
        assert!(highlight_code("definitely-not-a-language", "x").is_none());
    }

    #[test]
    fn test_markup_in_code_is_escaped() {
        let html = highlight_code("rust", "let s = \"<script>\";\n").expect("rust is bundled");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_css_targets_prefixed_classes() {
        let css = highlight_css();
        assert!(!css.is_empty());
        assert!(css.contains(".hl-"));
    }
}
