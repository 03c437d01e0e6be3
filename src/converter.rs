//! HTML → Markdown converter
//!
//! Walks an html5ever DOM depth-first and emits markdown: ATX headings,
//! fenced code blocks, `-` bullets, GFM tables, `~~strikethrough~~` and
//! `[x]`/`[ ]` task markers.
//!
//! # Conversion Strategy
//!
//! 1. **Semantic Preservation**: headings, paragraphs, lists, quotes, tables
//!    and code keep their structure
//! 2. **Content Extraction**: non-content elements (`head`, scripts, styles,
//!    embedded objects) are dropped together with their children
//! 3. **Deterministic Output**: identical HTML always produces identical
//!    markdown (LF line endings, single blank lines, one trailing newline)
//! 4. **Graceful Degradation**: malformed markup is handled by the HTML5
//!    parser; the converter itself only fails on timeout or runaway nesting
//!
//! The input is untrusted, but nothing is rendered or executed: the output
//! is text, so safety here is structural. Dangerous URLs (`javascript:`,
//! `data:` ...) are still dropped from links and images so they do not come
//! back to life when the markdown is rendered again.
//!
//! # Example
//!
//! Input HTML:
//! ```html
//! <h1>Plan</h1>
//! <ul>
//!   <li><input type="checkbox" checked> ship it</li>
//!   <li><del>argue</del></li>
//! </ul>
//! ```
//!
//! Output Markdown:
//! ```markdown
//! # Plan
//!
//! - [x] ship it
//! - ~~argue~~
//! ```

use crate::error::ConversionError;
use crate::parser::parse_html;
use crate::security::{SanitizeAction, SecurityValidator};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::time::{Duration, Instant};

/// Default budget for converting one document
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Table column alignment (GFM)
#[derive(Debug, Clone, Copy)]
enum TableAlignment {
    Left,
    Center,
    Right,
}

/// Conversion options
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Marker for unordered list items
    pub bullet_marker: char,
    /// Maximum conversion time (`Duration::ZERO` disables the check)
    pub timeout: Duration,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            bullet_marker: '-',
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Cooperative timeout tracking for one conversion
///
/// The timeout is checked every 100 DOM nodes and once more after output
/// normalization. No thread is spawned; a conversion only notices the
/// deadline when it reaches a checkpoint.
///
/// ```rust
/// use std::time::Duration;
/// use markdown_workbench::converter::ConversionContext;
///
/// let ctx = ConversionContext::new(Duration::from_millis(100));
/// std::thread::sleep(Duration::from_millis(150));
/// assert!(ctx.check_timeout().is_err());
/// ```
#[derive(Debug)]
pub struct ConversionContext {
    start_time: Instant,
    timeout: Duration,
    node_count: u32,
}

impl ConversionContext {
    /// Create a context; `Duration::ZERO` means no timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            timeout,
            node_count: 0,
        }
    }

    /// Check if timeout has been exceeded
    pub fn check_timeout(&self) -> Result<(), ConversionError> {
        if self.timeout.is_zero() {
            return Ok(());
        }

        if self.start_time.elapsed() > self.timeout {
            return Err(ConversionError::Timeout);
        }

        Ok(())
    }

    /// Count one node, checking the deadline every 100 nodes
    pub fn increment_and_check(&mut self) -> Result<(), ConversionError> {
        self.node_count += 1;

        if self.node_count % 100 == 0 {
            self.check_timeout()?;
        }

        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }
}

/// DOM → Markdown converter
///
/// Stateless between calls; one converter can be reused for any number of
/// documents.
///
/// ```rust
/// use markdown_workbench::converter::MarkdownConverter;
/// use markdown_workbench::parser::parse_html;
///
/// let dom = parse_html("<h1>Hello World</h1><p>This is a <s>test</s>.</p>");
/// let markdown = MarkdownConverter::new().convert(&dom).expect("Conversion failed");
/// assert_eq!(markdown, "# Hello World\n\nThis is a ~~test~~.\n");
/// ```
pub struct MarkdownConverter {
    options: ConversionOptions,
    security_validator: SecurityValidator,
}

impl MarkdownConverter {
    pub fn new() -> Self {
        Self::with_options(ConversionOptions::default())
    }

    pub fn with_options(options: ConversionOptions) -> Self {
        Self {
            options,
            security_validator: SecurityValidator::new(),
        }
    }

    /// Convert a DOM tree using the configured timeout
    pub fn convert(&self, dom: &RcDom) -> Result<String, ConversionError> {
        let mut ctx = ConversionContext::new(self.options.timeout);
        self.convert_with_context(dom, &mut ctx)
    }

    /// Convert a DOM tree with an explicit timeout context
    ///
    /// # Errors
    ///
    /// - `ConversionError::Timeout` when the context deadline passes
    /// - `ConversionError::InvalidInput` when nesting exceeds the depth limit
    pub fn convert_with_context(
        &self,
        dom: &RcDom,
        ctx: &mut ConversionContext,
    ) -> Result<String, ConversionError> {
        let mut output = String::with_capacity(1024);

        self.traverse_node(&dom.document, &mut output, 0, ctx)?;
        ctx.check_timeout()?;

        let markdown = self.normalize_output(output);
        ctx.check_timeout()?;

        Ok(markdown)
    }

    /// Depth-first traversal dispatching on node type
    fn traverse_node(
        &self,
        node: &Handle,
        output: &mut String,
        depth: usize,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        ctx.increment_and_check()?;

        match node.data {
            NodeData::Document => {
                self.traverse_children(node, output, depth, ctx)?;
            }
            NodeData::Element { ref name, .. } => {
                let tag_name = name.local.as_ref();
                self.handle_element(node, tag_name, output, depth, ctx)?;
            }
            NodeData::Text { ref contents } => {
                let text = contents.borrow();
                let normalized = self.normalize_text(&text);
                if normalized.is_empty() {
                    // Whitespace between inline elements still separates words
                    if !text.is_empty() && !output.is_empty() && !output.ends_with(char::is_whitespace)
                    {
                        output.push(' ');
                    }
                } else {
                    // Keep one separating space from the preceding inline content
                    if text.starts_with(char::is_whitespace)
                        && !output.is_empty()
                        && !output.ends_with(char::is_whitespace)
                    {
                        output.push(' ');
                    }
                    output.push_str(&normalized);
                    if text.ends_with(char::is_whitespace) {
                        output.push(' ');
                    }
                }
            }
            // Comments, doctypes and processing instructions have no markdown form
            NodeData::Comment { .. }
            | NodeData::Doctype { .. }
            | NodeData::ProcessingInstruction { .. } => {}
        }

        Ok(())
    }

    fn traverse_children(
        &self,
        node: &Handle,
        output: &mut String,
        depth: usize,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        for child in node.children.borrow().iter() {
            self.traverse_node(child, output, depth + 1, ctx)?;
        }
        Ok(())
    }

    fn handle_element(
        &self,
        node: &Handle,
        tag_name: &str,
        output: &mut String,
        depth: usize,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        if self.security_validator.check_element(tag_name) == SanitizeAction::Remove {
            return Ok(());
        }

        self.security_validator
            .validate_depth(depth)
            .map_err(ConversionError::InvalidInput)?;

        match tag_name {
            "h1" => self.handle_heading(node, 1, output, depth, ctx)?,
            "h2" => self.handle_heading(node, 2, output, depth, ctx)?,
            "h3" => self.handle_heading(node, 3, output, depth, ctx)?,
            "h4" => self.handle_heading(node, 4, output, depth, ctx)?,
            "h5" => self.handle_heading(node, 5, output, depth, ctx)?,
            "h6" => self.handle_heading(node, 6, output, depth, ctx)?,

            "p" => self.handle_paragraph(node, output, depth, ctx)?,
            "blockquote" => self.handle_blockquote(node, output, depth, ctx)?,
            "hr" => self.handle_rule(output),
            "br" => output.push_str("\\\n"),

            "a" => self.handle_link(node, output)?,
            "img" => self.handle_image(node, output),
            "input" => self.handle_checkbox(node, output),

            "ul" => self.handle_list(node, output, "", false, depth, ctx)?,
            "ol" => self.handle_list(node, output, "", true, depth, ctx)?,
            "li" => {
                let marker = format!("{} ", self.options.bullet_marker);
                self.handle_list_item(node, output, "", &marker, depth, ctx)?
            }

            "pre" => self.handle_code_block(node, output)?,
            "code" => self.handle_inline_code(node, output)?,

            "strong" | "b" => self.handle_wrapped(node, "**", output, depth, ctx)?,
            "em" | "i" => self.handle_wrapped(node, "*", output, depth, ctx)?,
            "del" | "s" | "strike" => self.handle_wrapped(node, "~~", output, depth, ctx)?,

            "table" => self.handle_table(node, output, depth, ctx)?,

            // Document metadata is not content
            "head" | "title" => {}

            _ => self.traverse_children(node, output, depth, ctx)?,
        }

        Ok(())
    }

    /// Make sure the next block starts after a blank line
    fn start_block(&self, output: &mut String) {
        if !output.is_empty() && !output.ends_with("\n\n") {
            if output.ends_with('\n') {
                output.push('\n');
            } else {
                output.push_str("\n\n");
            }
        }
    }

    /// Headings become ATX style (`#` to `######`) on a single line
    fn handle_heading(
        &self,
        node: &Handle,
        level: usize,
        output: &mut String,
        depth: usize,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        self.start_block(output);

        let mut content = String::new();
        self.traverse_children(node, &mut content, depth, ctx)?;
        let content = content.replace("\\\n", " ");

        output.push_str(&"#".repeat(level));
        output.push(' ');
        output.push_str(&self.normalize_text(&content));
        output.push_str("\n\n");

        Ok(())
    }

    fn handle_paragraph(
        &self,
        node: &Handle,
        output: &mut String,
        depth: usize,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        self.start_block(output);

        let start_len = output.len();
        self.traverse_children(node, output, depth, ctx)?;

        if output.len() > start_len {
            output.push_str("\n\n");
        }

        Ok(())
    }

    /// Blockquotes are rendered separately and every line prefixed with `> `
    fn handle_blockquote(
        &self,
        node: &Handle,
        output: &mut String,
        depth: usize,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        let mut inner = String::new();
        self.traverse_children(node, &mut inner, depth, ctx)?;
        let inner = inner.trim();
        if inner.is_empty() {
            return Ok(());
        }

        self.start_block(output);
        for line in inner.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                output.push_str(">\n");
            } else {
                output.push_str("> ");
                output.push_str(line);
                output.push('\n');
            }
        }
        output.push('\n');

        Ok(())
    }

    fn handle_rule(&self, output: &mut String) {
        self.start_block(output);
        output.push_str("---\n\n");
    }

    /// Links keep their text; unsafe or missing targets degrade to plain text
    fn handle_link(&self, node: &Handle, output: &mut String) -> Result<(), ConversionError> {
        let href = attribute(node, "href");

        let mut link_text = String::new();
        for child in node.children.borrow().iter() {
            self.extract_text(child, &mut link_text)?;
        }
        let text = self.normalize_text(&link_text);
        if text.is_empty() {
            return Ok(());
        }

        match href
            .as_deref()
            .and_then(|url| self.security_validator.sanitize_url(url))
        {
            Some(url) => {
                output.push('[');
                output.push_str(&text);
                output.push_str("](");
                output.push_str(url);
                output.push(')');
            }
            None => output.push_str(&text),
        }

        Ok(())
    }

    /// Images with a missing or unsafe `src` are dropped
    fn handle_image(&self, node: &Handle, output: &mut String) {
        let Some(src) = attribute(node, "src") else {
            return;
        };
        let Some(url) = self.security_validator.sanitize_url(&src) else {
            return;
        };
        let alt = attribute(node, "alt").unwrap_or_default();

        output.push_str("![");
        output.push_str(&self.normalize_text(&alt));
        output.push_str("](");
        output.push_str(url);
        output.push(')');
    }

    /// Checkbox inputs become task markers; other inputs have no text form
    fn handle_checkbox(&self, node: &Handle, output: &mut String) {
        let is_checkbox = attribute(node, "type")
            .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("checkbox"));
        if !is_checkbox {
            return;
        }

        if attribute(node, "checked").is_some() {
            output.push_str("[x] ");
        } else {
            output.push_str("[ ] ");
        }
    }

    /// Ordered lists count up from `start` (default 1)
    fn handle_list(
        &self,
        node: &Handle,
        output: &mut String,
        indent: &str,
        ordered: bool,
        depth: usize,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        // Top-level lists are separate blocks; nested ones follow their parent line
        if indent.is_empty() {
            self.start_block(output);
        }

        let mut number: u64 = attribute(node, "start")
            .and_then(|start| start.trim().parse().ok())
            .unwrap_or(1);

        for child in node.children.borrow().iter() {
            if let NodeData::Element { ref name, .. } = child.data
                && name.local.as_ref() == "li"
            {
                let marker = if ordered {
                    let marker = format!("{number}. ");
                    number = number.saturating_add(1);
                    marker
                } else {
                    format!("{} ", self.options.bullet_marker)
                };
                self.handle_list_item(child, output, indent, &marker, depth + 1, ctx)?;
            }
        }

        if indent.is_empty() && !output.ends_with("\n\n") {
            output.push('\n');
        }

        Ok(())
    }

    /// One list item; nested lists are indented to the item's content column
    fn handle_list_item(
        &self,
        node: &Handle,
        output: &mut String,
        indent: &str,
        marker: &str,
        depth: usize,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(indent);
        output.push_str(marker);

        let child_indent = format!("{indent}{}", " ".repeat(marker.len()));
        let start_len = output.len();

        for child in node.children.borrow().iter() {
            match child.data {
                NodeData::Element { ref name, .. } => match name.local.as_ref() {
                    tag @ ("ul" | "ol") => {
                        if !output.ends_with('\n') {
                            output.push('\n');
                        }
                        self.handle_list(child, output, &child_indent, tag == "ol", depth, ctx)?;
                    }
                    // Paragraphs in loose lists stay on the item line
                    "p" => {
                        if output.len() > start_len && !output.ends_with(char::is_whitespace) {
                            output.push(' ');
                        }
                        self.traverse_children(child, output, depth, ctx)?;
                    }
                    "pre" | "blockquote" | "table" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                        let mut block = String::new();
                        self.traverse_node(child, &mut block, depth + 1, ctx)?;
                        self.push_item_block(output, block.trim_end(), start_len, &child_indent);
                    }
                    _ => self.traverse_node(child, output, depth + 1, ctx)?,
                },
                _ => self.traverse_node(child, output, depth + 1, ctx)?,
            }
        }

        if !output.ends_with('\n') {
            output.push('\n');
        }

        Ok(())
    }

    /// Block content inside a list item, indented to the item's content
    /// column so it stays part of the item. A block that opens the item
    /// starts on the marker line.
    fn push_item_block(&self, output: &mut String, block: &str, item_start: usize, indent: &str) {
        if block.is_empty() {
            return;
        }

        let mut at_marker = output.len() == item_start;
        if !at_marker {
            let kept = output.trim_end().len().max(item_start);
            output.truncate(kept);
            at_marker = output.len() == item_start;
            if !at_marker {
                output.push_str("\n\n");
            }
        }

        for (index, line) in block.lines().enumerate() {
            if index > 0 {
                output.push('\n');
            }
            if !(index == 0 && at_marker) && !line.is_empty() {
                output.push_str(indent);
            }
            output.push_str(line);
        }
        output.push('\n');
    }

    /// Fenced code block; the fence is longer than any backtick run inside
    fn handle_code_block(&self, node: &Handle, output: &mut String) -> Result<(), ConversionError> {
        self.start_block(output);

        let language = self.code_language(node);

        let mut code = String::new();
        self.extract_code_content(node, &mut code)?;
        let fence = "`".repeat(longest_backtick_run(&code).max(2) + 1);

        output.push_str(&fence);
        if let Some(language) = language {
            output.push_str(&language);
        }
        output.push('\n');
        output.push_str(&code);
        if !code.is_empty() && !code.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&fence);
        output.push_str("\n\n");

        Ok(())
    }

    /// Language from a `language-*`/`lang-*` class on the `pre` or its `code`
    fn code_language(&self, node: &Handle) -> Option<String> {
        let from_classes = |handle: &Handle| {
            attribute(handle, "class").and_then(|classes| {
                classes.split_whitespace().find_map(|class| {
                    class
                        .strip_prefix("language-")
                        .or_else(|| class.strip_prefix("lang-"))
                        .filter(|lang| !lang.is_empty())
                        .map(str::to_string)
                })
            })
        };

        from_classes(node).or_else(|| {
            node.children.borrow().iter().find_map(|child| match child.data {
                NodeData::Element { ref name, .. } if name.local.as_ref() == "code" => {
                    from_classes(child)
                }
                _ => None,
            })
        })
    }

    /// Inline code; backticks inside widen the delimiter
    fn handle_inline_code(&self, node: &Handle, output: &mut String) -> Result<(), ConversionError> {
        let mut code = String::new();
        self.extract_code_content(node, &mut code)?;
        let code = code.replace('\n', " ");

        let run = longest_backtick_run(&code);
        if run == 0 {
            output.push('`');
            output.push_str(&code);
            output.push('`');
        } else {
            let delimiter = "`".repeat(run + 1);
            output.push_str(&delimiter);
            output.push(' ');
            output.push_str(&code);
            output.push(' ');
            output.push_str(&delimiter);
        }

        Ok(())
    }

    /// Inline formatting: `**bold**`, `*italic*`, `~~strikethrough~~`
    fn handle_wrapped(
        &self,
        node: &Handle,
        marker: &str,
        output: &mut String,
        depth: usize,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        let mut content = String::new();
        self.traverse_children(node, &mut content, depth, ctx)?;

        // Markers must hug the text, so surrounding spaces move outside
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let mut raw = String::new();
        self.extract_text(node, &mut raw)?;
        if raw.starts_with(char::is_whitespace)
            && !output.is_empty()
            && !output.ends_with(char::is_whitespace)
        {
            output.push(' ');
        }
        output.push_str(marker);
        output.push_str(trimmed);
        output.push_str(marker);
        if content.ends_with(char::is_whitespace) {
            output.push(' ');
        }

        Ok(())
    }

    /// GFM table
    ///
    /// The header row comes from `thead`, otherwise the first row is
    /// promoted. Alignment is read from `align` or an inline `text-align`.
    ///
    /// ```markdown
    /// | Header 1 | Header 2 |
    /// | --- | :---: |
    /// | Cell 1 | Cell 2 |
    /// ```
    fn handle_table(
        &self,
        node: &Handle,
        output: &mut String,
        depth: usize,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        let mut rows: Vec<Handle> = Vec::new();
        let mut header_row: Option<Handle> = None;

        for child in node.children.borrow().iter() {
            match element_name(child).as_deref() {
                Some("thead") => {
                    if header_row.is_none() {
                        header_row = child_elements(child, "tr").into_iter().next();
                    }
                }
                Some("tbody") | Some("tfoot") => rows.extend(child_elements(child, "tr")),
                Some("tr") => rows.push(child.clone()),
                _ => {}
            }
        }

        let header_row = match header_row {
            Some(row) => row,
            None if rows.is_empty() => return Ok(()),
            None => rows.remove(0),
        };

        let mut headers = Vec::new();
        let mut alignments = Vec::new();
        for cell in table_cells(&header_row) {
            headers.push(self.table_cell_text(&cell, depth, ctx)?);
            alignments.push(self.extract_alignment(&cell));
        }
        if headers.is_empty() {
            return Ok(());
        }

        let mut body = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut cells = Vec::new();
            for cell in table_cells(row) {
                cells.push(self.table_cell_text(&cell, depth, ctx)?);
            }
            body.push(cells);
        }

        self.start_block(output);
        self.write_gfm_table(output, &headers, &alignments, &body);
        output.push('\n');

        Ok(())
    }

    /// Inline content of one cell on a single line, pipes escaped
    fn table_cell_text(
        &self,
        cell: &Handle,
        depth: usize,
        ctx: &mut ConversionContext,
    ) -> Result<String, ConversionError> {
        let mut content = String::new();
        self.traverse_children(cell, &mut content, depth, ctx)?;
        let single_line = content.replace("\\\n", " ").replace('\n', " ");
        Ok(self.normalize_text(&single_line).replace('|', "\\|"))
    }

    fn extract_alignment(&self, cell: &Handle) -> TableAlignment {
        if let Some(align) = attribute(cell, "align") {
            return match align.trim().to_ascii_lowercase().as_str() {
                "center" => TableAlignment::Center,
                "right" => TableAlignment::Right,
                _ => TableAlignment::Left,
            };
        }

        if let Some(style) = attribute(cell, "style") {
            let style = style.to_ascii_lowercase();
            if style.contains("text-align") {
                if style.contains("center") {
                    return TableAlignment::Center;
                } else if style.contains("right") {
                    return TableAlignment::Right;
                }
            }
        }

        TableAlignment::Left
    }

    fn write_gfm_table(
        &self,
        output: &mut String,
        headers: &[String],
        alignments: &[TableAlignment],
        rows: &[Vec<String>],
    ) {
        output.push('|');
        for header in headers {
            output.push(' ');
            output.push_str(header);
            output.push_str(" |");
        }
        output.push('\n');

        output.push('|');
        for alignment in alignments {
            output.push_str(match alignment {
                TableAlignment::Left => " --- |",
                TableAlignment::Center => " :---: |",
                TableAlignment::Right => " ---: |",
            });
        }
        output.push('\n');

        // Rows are padded or cut to the header width
        for row in rows {
            output.push('|');
            for index in 0..headers.len() {
                output.push(' ');
                if let Some(cell) = row.get(index) {
                    output.push_str(cell);
                }
                output.push_str(" |");
            }
            output.push('\n');
        }
    }

    /// Raw text of a subtree with whitespace preserved exactly
    fn extract_code_content(&self, node: &Handle, output: &mut String) -> Result<(), ConversionError> {
        self.collect_text(node, output, false)
    }

    fn extract_text(&self, node: &Handle, output: &mut String) -> Result<(), ConversionError> {
        self.collect_text(node, output, true)
    }

    /// Document-order text of a subtree, walked on an explicit stack so
    /// arbitrarily deep markup inside a link or code block cannot exhaust
    /// the thread stack.
    fn collect_text(
        &self,
        node: &Handle,
        output: &mut String,
        skip_removed: bool,
    ) -> Result<(), ConversionError> {
        let mut pending = vec![node.clone()];

        while let Some(current) = pending.pop() {
            match current.data {
                NodeData::Text { ref contents } => output.push_str(&contents.borrow()),
                NodeData::Element { ref name, .. } => {
                    if skip_removed
                        && self.security_validator.check_element(name.local.as_ref())
                            == SanitizeAction::Remove
                    {
                        continue;
                    }
                    pending.extend(current.children.borrow().iter().rev().cloned());
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Collapse runs of whitespace to single spaces and trim
    fn normalize_text(&self, text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Normalize final output
    ///
    /// 1. LF line endings only
    /// 2. Consecutive blank lines collapse to one (outside code blocks)
    /// 3. Trailing whitespace removed
    /// 4. Runs of spaces collapse inside prose lines
    /// 5. Exactly one trailing newline, or nothing for an empty document
    fn normalize_output(&self, output: String) -> String {
        let output = output.replace("\r\n", "\n");

        let mut result = String::with_capacity(output.len());
        let mut prev_blank = true;
        // Length of the open code fence, if any
        let mut open_fence: Option<usize> = None;

        for line in output.lines() {
            let trimmed = line.trim_end();
            let fence_len = trimmed.trim_start().chars().take_while(|&c| c == '`').count();

            match open_fence {
                Some(open) => {
                    result.push_str(trimmed);
                    result.push('\n');
                    prev_blank = false;
                    let closes = fence_len >= open && trimmed.trim_start().len() == fence_len;
                    if closes {
                        open_fence = None;
                    }
                    continue;
                }
                None => {
                    let opening = opening_fence_len(trimmed);
                    if opening >= 3 {
                        open_fence = Some(opening);
                    }
                }
            }

            if trimmed.is_empty() {
                if !prev_blank {
                    result.push('\n');
                    prev_blank = true;
                }
            } else {
                result.push_str(&self.normalize_line_whitespace(trimmed));
                result.push('\n');
                prev_blank = false;
            }
        }

        while result.ends_with("\n\n") {
            result.pop();
        }
        if result.trim().is_empty() {
            return String::new();
        }

        result
    }

    /// Collapse space runs, keeping leading indentation and inline code intact
    fn normalize_line_whitespace(&self, line: &str) -> String {
        let mut result = String::with_capacity(line.len());
        let mut prev_space = false;
        let mut at_start = true;
        let mut in_inline_code = false;

        for ch in line.chars() {
            if ch == '`' {
                in_inline_code = !in_inline_code;
                result.push(ch);
                prev_space = false;
                at_start = false;
            } else if ch == ' ' {
                if in_inline_code || at_start {
                    result.push(ch);
                } else if !prev_space {
                    result.push(ch);
                    prev_space = true;
                }
            } else {
                result.push(ch);
                prev_space = false;
                at_start = false;
            }
        }

        result
    }
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert an HTML string to markdown with default options.
///
/// Whitespace-only input (or input with no convertible content) yields an
/// empty string.
pub fn html_to_markdown(html: &str) -> Result<String, ConversionError> {
    if html.trim().is_empty() {
        return Ok(String::new());
    }
    MarkdownConverter::new().convert(&parse_html(html))
}

fn attribute(node: &Handle, name: &str) -> Option<String> {
    match node.data {
        NodeData::Element { ref attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| attr.name.local.as_ref() == name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

fn element_name(node: &Handle) -> Option<String> {
    match node.data {
        NodeData::Element { ref name, .. } => Some(name.local.as_ref().to_string()),
        _ => None,
    }
}

fn child_elements(node: &Handle, tag: &str) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|child| element_name(child).as_deref() == Some(tag))
        .cloned()
        .collect()
}

fn table_cells(row: &Handle) -> Vec<Handle> {
    row.children
        .borrow()
        .iter()
        .filter(|child| matches!(element_name(child).as_deref(), Some("td" | "th")))
        .cloned()
        .collect()
}

fn longest_backtick_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for ch in text.chars() {
        if ch == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Backticks opening a fence on this line, after any list marker
fn opening_fence_len(line: &str) -> usize {
    let body = line.trim_start();
    let body = strip_list_marker(body).unwrap_or(body);
    body.chars().take_while(|&c| c == '`').count()
}

fn strip_list_marker(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix(['-', '*', '+']) {
        return rest.strip_prefix(' ');
    }
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix(". ")
}
