//! Allow-list policy for HTML produced from markdown
//!
//! Markdown may embed raw HTML, so rendered output is treated as untrusted
//! until it has been filtered against this policy. The policy is a whitelist:
//! anything not named here is either unwrapped (unknown element, children
//! kept) or dropped (attributes, dangerous elements with their content).
//!
//! # Defense Layers
//!
//! 1. **Element policy**: executable/embedding elements are removed with their
//!    content; unknown elements are unwrapped
//! 2. **Attribute policy**: per-element attribute whitelist; event handlers and
//!    `style` never survive
//! 3. **URL policy**: `href`/`src` must be relative or use http, https or mailto
//! 4. **Depth limit**: the HTML→markdown walk refuses documents nested deeper
//!    than the limit instead of overflowing the stack
//!
//! The tables are consumed by [`crate::sanitizer`] when rendering and by the
//! converter when importing. html5ever is an HTML5 parser, so external
//! entities and DTDs are never resolved on either path.

/// Maximum allowed nesting depth for HTML elements
///
/// The converter recurses once per element level, so this must fit on a
/// 2 MiB thread stack in an unoptimized build.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Elements removed together with everything inside them
const DANGEROUS_ELEMENTS: &[&str] = &[
    "script",   // JavaScript execution
    "style",    // CSS injection
    "noscript", // Alternative content
    "iframe",   // Can load external content
    "frame",
    "frameset",
    "object", // Can execute plugins
    "embed",  // Can execute plugins
    "applet", // Legacy Java applets
    "link",   // External stylesheets
    "base",   // Rebases every relative URL
    "meta",
    "template",
    "svg",
    "math",
];

/// Elements kept in sanitized output
const ALLOWED_ELEMENTS: &[&str] = &[
    "a",
    "abbr",
    "b",
    "blockquote",
    "br",
    "code",
    "dd",
    "del",
    "details",
    "div",
    "dl",
    "dt",
    "em",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "hr",
    "i",
    "img",
    "input",
    "ins",
    "kbd",
    "li",
    "mark",
    "ol",
    "p",
    "pre",
    "q",
    "s",
    "samp",
    "span",
    "strike",
    "strong",
    "sub",
    "summary",
    "sup",
    "table",
    "tbody",
    "td",
    "tfoot",
    "th",
    "thead",
    "tr",
    "u",
    "ul",
    "var",
];

/// Attributes allowed on every kept element
const GLOBAL_ATTRIBUTES: &[&str] = &["title", "lang", "dir"];

/// Per-element attribute whitelist
const ELEMENT_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href"]),
    ("img", &["src", "alt", "width", "height"]),
    ("input", &["type", "checked", "disabled"]),
    ("td", &["align", "colspan", "rowspan"]),
    ("th", &["align", "colspan", "rowspan"]),
    ("ol", &["start"]),
    ("li", &["value"]),
    ("details", &["open"]),
    ("code", &["class"]),
    ("pre", &["class"]),
    ("span", &["class"]),
];

/// URL schemes allowed in `href`/`src`
const ALLOWED_URL_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Class prefixes emitted by the markdown renderer
const ALLOWED_CLASS_PREFIXES: &[&str] = &["language-", "hl-"];

/// Event handler attribute prefix
const EVENT_HANDLER_PREFIX: &str = "on";

/// What to do with an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeAction {
    /// Keep the element (with filtered attributes)
    Allow,
    /// Remove the element and all its children
    Remove,
    /// Drop the tag but keep its children
    Unwrap,
}

/// Allow-list policy for rendered HTML
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    max_depth: usize,
}

impl SecurityValidator {
    pub fn new() -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    /// Create a validator with custom maximum depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Decide what happens to an element.
    ///
    /// ```
    /// use markdown_workbench::security::{SanitizeAction, SecurityValidator};
    ///
    /// let validator = SecurityValidator::new();
    /// assert_eq!(validator.check_element("script"), SanitizeAction::Remove);
    /// assert_eq!(validator.check_element("p"), SanitizeAction::Allow);
    /// assert_eq!(validator.check_element("font"), SanitizeAction::Unwrap);
    /// ```
    pub fn check_element(&self, tag_name: &str) -> SanitizeAction {
        if DANGEROUS_ELEMENTS.contains(&tag_name) {
            SanitizeAction::Remove
        } else if ALLOWED_ELEMENTS.contains(&tag_name) {
            SanitizeAction::Allow
        } else {
            SanitizeAction::Unwrap
        }
    }

    pub fn is_event_handler(&self, attr_name: &str) -> bool {
        attr_name.len() > EVENT_HANDLER_PREFIX.len()
            && attr_name
                .get(..EVENT_HANDLER_PREFIX.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(EVENT_HANDLER_PREFIX))
    }

    /// Filter one attribute of an allowed element.
    ///
    /// Returns the value to emit, or `None` when the attribute must be dropped.
    /// `class` values are reduced to renderer-generated tokens; checkbox inputs
    /// are the only inputs that survive.
    pub fn filter_attribute(&self, tag_name: &str, attr_name: &str, value: &str) -> Option<String> {
        if self.is_event_handler(attr_name) {
            return None;
        }

        let element_allowed = ELEMENT_ATTRIBUTES
            .iter()
            .find(|(tag, _)| *tag == tag_name)
            .is_some_and(|(_, attrs)| attrs.contains(&attr_name));
        if !element_allowed && !GLOBAL_ATTRIBUTES.contains(&attr_name) {
            return None;
        }

        match attr_name {
            "href" | "src" => self.sanitize_url(value).map(str::to_string),
            "class" => {
                let kept: Vec<&str> = value
                    .split_ascii_whitespace()
                    .filter(|token| is_safe_class(token))
                    .collect();
                if kept.is_empty() {
                    None
                } else {
                    Some(kept.join(" "))
                }
            }
            "type" if tag_name == "input" => {
                value.eq_ignore_ascii_case("checkbox").then(|| "checkbox".to_string())
            }
            _ => Some(value.to_string()),
        }
    }

    /// Check if a URL may be emitted.
    ///
    /// Control characters and whitespace are ignored when looking for the
    /// scheme, matching how browsers read `java\tscript:`.
    ///
    /// ```
    /// use markdown_workbench::security::SecurityValidator;
    ///
    /// let validator = SecurityValidator::new();
    /// assert!(validator.is_dangerous_url("javascript:alert('xss')"));
    /// assert!(validator.is_dangerous_url("data:text/html,<script>alert('xss')</script>"));
    /// assert!(!validator.is_dangerous_url("https://example.com"));
    /// assert!(!validator.is_dangerous_url("/relative/path"));
    /// ```
    pub fn is_dangerous_url(&self, url: &str) -> bool {
        let compact: String = url
            .chars()
            .filter(|c| !c.is_whitespace() && !c.is_control())
            .collect();

        let Some(colon) = compact.find(':') else {
            return false;
        };
        let before = &compact[..colon];
        // A colon after '/', '?' or '#' belongs to a relative path or query
        if before.contains(['/', '?', '#']) {
            return false;
        }

        let scheme = before.to_ascii_lowercase();
        !ALLOWED_URL_SCHEMES.contains(&scheme.as_str())
    }

    /// Returns `None` if the URL is dangerous, `Some(url)` if safe
    pub fn sanitize_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        if self.is_dangerous_url(url) {
            None
        } else {
            Some(url)
        }
    }

    /// Elements kept in sanitized output
    pub fn allowed_elements(&self) -> &'static [&'static str] {
        ALLOWED_ELEMENTS
    }

    /// Elements removed together with their content
    pub fn removed_elements(&self) -> &'static [&'static str] {
        DANGEROUS_ELEMENTS
    }

    /// Attributes allowed on every kept element
    pub fn global_attributes(&self) -> &'static [&'static str] {
        GLOBAL_ATTRIBUTES
    }

    /// Per-element attribute whitelist
    pub fn element_attributes(&self) -> &'static [(&'static str, &'static [&'static str])] {
        ELEMENT_ATTRIBUTES
    }

    pub fn url_schemes(&self) -> &'static [&'static str] {
        ALLOWED_URL_SCHEMES
    }

    /// Validate nesting depth to prevent stack overflow
    pub fn validate_depth(&self, depth: usize) -> Result<(), String> {
        if depth > self.max_depth {
            Err(format!(
                "HTML nesting depth {} exceeds maximum allowed depth {}",
                depth, self.max_depth
            ))
        } else {
            Ok(())
        }
    }
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn is_safe_class(token: &str) -> bool {
    ALLOWED_CLASS_PREFIXES.iter().any(|prefix| {
        token.len() > prefix.len()
            && token.starts_with(prefix)
            && token[prefix.len()..]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '#' | '.'))
    })
}
