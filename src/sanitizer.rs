//! Allow-list HTML sanitizer
//!
//! An [`ammonia::Builder`] configured from the [`SecurityValidator`] tables.
//! ammonia parses with html5ever, so the sanitizer sees the same tree a
//! browser would build, and re-serializes it; nothing from the input reaches
//! the output without passing the policy.

use ammonia::{Builder, UrlRelative};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use crate::security::SecurityValidator;

/// Re-serializes HTML keeping only allowed elements and attributes
pub struct HtmlSanitizer {
    builder: Builder<'static>,
}

impl HtmlSanitizer {
    pub fn new() -> Self {
        Self::with_validator(SecurityValidator::new())
    }

    pub fn with_validator(validator: SecurityValidator) -> Self {
        let tags: HashSet<&'static str> = validator.allowed_elements().iter().copied().collect();
        let removed: HashSet<&'static str> =
            validator.removed_elements().iter().copied().collect();
        let generic: HashSet<&'static str> =
            validator.global_attributes().iter().copied().collect();
        let per_tag: HashMap<&'static str, HashSet<&'static str>> = validator
            .element_attributes()
            .iter()
            .map(|(tag, attrs)| (*tag, attrs.iter().copied().collect()))
            .collect();
        let schemes: HashSet<&'static str> = validator.url_schemes().iter().copied().collect();

        let mut builder = Builder::empty();
        builder
            .tags(tags)
            .clean_content_tags(removed)
            .generic_attributes(generic)
            .tag_attributes(per_tag)
            .url_schemes(schemes)
            .url_relative(UrlRelative::PassThrough)
            .link_rel(None)
            .strip_comments(true)
            .attribute_filter(move |element, attribute, value| {
                validator
                    .filter_attribute(element, attribute, value)
                    .map(Cow::Owned)
            });

        Self { builder }
    }

    /// Sanitize an HTML fragment.
    ///
    /// ```
    /// use markdown_workbench::sanitizer::HtmlSanitizer;
    ///
    /// let clean = HtmlSanitizer::new().sanitize("<p onclick=\"x()\">Hi<script>alert(1)</script></p>");
    /// assert_eq!(clean, "<p>Hi</p>");
    /// ```
    pub fn sanitize(&self, html: &str) -> String {
        self.builder.clean(html).to_string()
    }
}

impl Default for HtmlSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Sanitize with the default policy
pub fn sanitize_html(html: &str) -> String {
    HtmlSanitizer::new().sanitize(html)
}
