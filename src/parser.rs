//! HTML5 parsing for imports
//!
//! Imported HTML is untrusted and may be in any legacy encoding, so bytes are
//! decoded first and then parsed with html5ever, which follows the WHATWG
//! algorithm and recovers from malformed markup the way browsers do.
//!
//! # Charset Detection
//!
//! 1. Byte order mark (UTF-8, UTF-16LE/BE)
//! 2. `<meta charset>` or `<meta http-equiv="Content-Type">` within the first
//!    1024 bytes
//! 3. UTF-8
//!
//! ```rust
//! use markdown_workbench::parser::{decode_html, parse_html};
//!
//! let text = decode_html(b"<meta charset=\"ISO-8859-1\"><p>Caf\xE9</p>").unwrap();
//! assert!(text.contains("Café"));
//!
//! let dom = parse_html("<h1>Hello");
//! # let _ = dom;
//! ```

use encoding_rs::{Encoding, UTF_8};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use log::debug;
use markup5ever_rcdom::RcDom;
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

use crate::error::ConversionError;

/// Maximum bytes to scan for meta charset tags
const META_SCAN_LIMIT: usize = 1024;

/// Parse an HTML string into a DOM tree. Never fails.
pub fn parse_html(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

/// Decode and parse raw HTML bytes
pub fn parse_html_bytes(html: &[u8]) -> Result<RcDom, ConversionError> {
    let text = decode_html(html)?;
    Ok(parse_html(&text))
}

/// Decode HTML bytes to UTF-8 using the detected charset
pub fn decode_html(html: &[u8]) -> Result<Cow<'_, str>, ConversionError> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(html) {
        debug!("HTML charset from BOM: {}", encoding.name());
        return decode_with(encoding, &html[bom_len..]);
    }

    match detect_meta_charset(html) {
        Some(label) => {
            let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                ConversionError::EncodingError(format!(
                    "Unsupported charset '{}' for HTML parsing",
                    label
                ))
            })?;
            debug!("HTML charset from meta tag: {}", encoding.name());
            decode_with(encoding, html)
        }
        None => decode_with(UTF_8, html),
    }
}

fn decode_with<'a>(
    encoding: &'static Encoding,
    html: &'a [u8],
) -> Result<Cow<'a, str>, ConversionError> {
    if encoding == UTF_8 {
        return std::str::from_utf8(html).map(Cow::Borrowed).map_err(|e| {
            ConversionError::EncodingError(format!(
                "Invalid UTF-8 at byte position {}: {}",
                e.valid_up_to(),
                e
            ))
        });
    }

    encoding
        .decode_without_bom_handling_and_without_replacement(html)
        .ok_or_else(|| {
            ConversionError::EncodingError(format!(
                "Invalid byte sequence for charset '{}'",
                encoding.name()
            ))
        })
}

/// Charset label declared by a meta tag near the start of the document
pub fn detect_meta_charset(html: &[u8]) -> Option<String> {
    let prefix = &html[..html.len().min(META_SCAN_LIMIT)];
    // Lossy is fine: meta tags are ASCII
    let prefix = String::from_utf8_lossy(prefix);

    static HTML5_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let html5 = HTML5_REGEX
        .get_or_init(|| Regex::new(r#"(?i)<meta\s+charset\s*=\s*["']?([^"';>\s]+)"#).ok())
        .as_ref()?;
    if let Some(found) = html5.captures(&prefix).and_then(|caps| caps.get(1)) {
        return Some(found.as_str().to_string());
    }

    static HTML4_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let html4 = HTML4_REGEX
        .get_or_init(|| {
            Regex::new(
                r#"(?i)<meta\s+http-equiv\s*=\s*["']?Content-Type["']?\s+content\s*=\s*["']?[^"'>]*charset\s*=\s*([^"';>\s]+)"#,
            )
            .ok()
        })
        .as_ref()?;
    html4
        .captures(&prefix)
        .and_then(|caps| caps.get(1))
        .map(|found| found.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_detect_html5_meta() {
        let html = b"<html><head><meta charset=\"UTF-8\"></head></html>";
        assert_eq!(detect_meta_charset(html), Some("UTF-8".to_string()));

        let html = b"<meta charset=windows-1252>";
        assert_eq!(detect_meta_charset(html), Some("windows-1252".to_string()));
    }

    #[test]
    fn test_detect_html4_meta() {
        let html =
            b"<meta http-equiv=\"Content-Type\" content=\"text/html; charset=ISO-8859-1\">";
        assert_eq!(detect_meta_charset(html), Some("ISO-8859-1".to_string()));
    }

    #[test]
    fn test_meta_beyond_scan_limit_ignored() {
        let mut html = vec![b' '; META_SCAN_LIMIT];
        html.extend_from_slice(b"<meta charset=\"ISO-8859-1\">");
        assert_eq!(detect_meta_charset(&html), None);
    }

    #[test]
    fn test_decode_defaults_to_utf8() {
        let text = decode_html("<p>\u{2713} ok</p>".as_bytes()).expect("valid UTF-8");
        assert!(matches!(text, Cow::Borrowed(_)));
        assert!(text.contains('\u{2713}'));
    }

    #[test]
    fn test_decode_invalid_utf8_is_error() {
        let result = decode_html(b"<p>\xFF\xFE\xFD</p>");
        assert!(matches!(result, Err(ConversionError::EncodingError(_))));
    }

    #[test]
    fn test_decode_meta_charset_transcodes() {
        let html = b"<html><head><meta charset=\"ISO-8859-1\"></head><body><p>Caf\xE9</p></body></html>";
        let text = decode_html(html).expect("latin-1 decodes");
        assert!(text.contains("Café"));
    }

    #[test]
    fn test_decode_windows_1252_euro() {
        let html = b"<meta charset=\"windows-1252\"><p>Price \x80 10</p>";
        let text = decode_html(html).expect("windows-1252 decodes");
        assert!(text.contains('€'));
    }

    #[test]
    fn test_decode_bom_wins_over_meta() {
        let mut html = vec![0xEF, 0xBB, 0xBF];
        html.extend_from_slice("<meta charset=\"ISO-8859-1\"><p>é</p>".as_bytes());
        let text = decode_html(&html).expect("BOM says UTF-8");
        assert!(text.contains("<p>é</p>"));
    }

    #[test]
    fn test_unknown_charset_is_error() {
        let result = decode_html(b"<meta charset=\"x-unknown-test\"><p>Hello</p>");
        match result {
            Err(ConversionError::EncodingError(message)) => {
                assert!(message.contains("Unsupported charset"));
            }
            other => panic!("Expected EncodingError, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_bytes_roundtrip_into_dom() {
        let dom = parse_html_bytes(b"<html><body><h1>Hello</h1></body></html>");
        assert!(dom.is_ok());
    }

    proptest! {
        /// Parsing arbitrary malformed markup never panics
        #[test]
        fn prop_malformed_html_no_crash(
            tag in prop::sample::select(vec!["div", "p", "span", "h1", "ul", "li", "table", "tr", "td"]),
            content in "[a-zA-Z0-9 ]{0,100}",
            close_tag in prop::bool::ANY,
            add_invalid_nesting in prop::bool::ANY,
        ) {
            let mut html = format!("<{tag}>{content}");
            if close_tag {
                html.push_str(&format!("</{tag}>"));
            }
            if add_invalid_nesting {
                html.push_str("<p><div>Invalid nesting</div></p>");
            }
            let _dom = parse_html(&html);
        }

        /// Arbitrary bytes either decode or report an encoding error
        #[test]
        fn prop_decode_is_total(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            match decode_html(&bytes) {
                Ok(_) | Err(ConversionError::EncodingError(_)) => {}
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }
}
