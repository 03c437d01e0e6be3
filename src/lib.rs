//! Markdown Workbench - editor backend library
//!
//! Sandboxed file access plus the conversions a markdown editor needs:
//! markdown to HTML, HTML to markdown, markdown to plain text and markdown
//! to PDF.
//!
//! # Architecture
//!
//! The library is structured into several modules:
//! - `path_guard`: resolves caller paths against the allowed roots
//! - `store`: bounded reads and atomic, optionally backed-up writes
//! - `markdown`: GFM rendering with highlighting, sanitized last
//! - `sanitizer` / `security`: the HTML allow-list and URL policy
//! - `highlight`: syntect-based fenced code highlighting
//! - `parser` / `converter`: HTML5 parsing and DOM to markdown conversion
//! - `plain_text`: markdown syntax stripping
//! - `pdf`: print document and PDF engines
//! - `editor`: editor session state and document statistics
//! - `tools`: typed operations and the `(name, json)` dispatcher
//! - `config` / `error`: configuration loading and error types
//!
//! # Safety
//!
//! Every filesystem touch goes through [`PathGuard`]. Rendered HTML always
//! passes the sanitizer, whatever the markdown contained.

// Module declarations
pub mod config;
pub mod converter;
pub mod editor;
pub mod error;
pub mod highlight;
pub mod markdown;
pub mod parser;
pub mod path_guard;
pub mod pdf;
pub mod plain_text;
pub mod sanitizer;
pub mod security;
pub mod store;
pub mod tools;

// Re-export main types for convenience
pub use config::WorkbenchConfig;
pub use converter::{MarkdownConverter, html_to_markdown};
pub use error::{ConversionError, FileError, WorkbenchError};
pub use markdown::{HtmlOptions, markdown_to_html};
pub use parser::parse_html;
pub use path_guard::{AllowedRoots, PathGuard, ResolvedPath};
pub use pdf::{PageSize, PdfEngine, PdfOptions};
pub use plain_text::strip_markdown;
pub use store::{SecureFileStore, WriteOptions};
pub use tools::{ToolResult, Workbench};
