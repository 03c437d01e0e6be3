//! Operation layer
//!
//! Each editor operation takes a typed request and returns a typed outcome.
//! [`Workbench::dispatch`] adds the `(name, json arguments)` surface used by
//! tool-call clients: arguments are deserialized with their defaults, the
//! operation runs, and success or failure becomes a [`ToolResult`]. No error
//! escapes `dispatch`.

use log::{error, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::path::PathBuf;

use crate::config::WorkbenchConfig;
use crate::converter::{ConversionOptions, MarkdownConverter};
use crate::editor::{DocumentStats, EditorState};
use crate::error::{FileError, WorkbenchError};
use crate::markdown::{HtmlOptions, MarkdownRenderer};
use crate::parser::parse_html_bytes;
use crate::path_guard::{AllowedRoots, PathGuard};
use crate::pdf::{ChromiumEngine, PageSize, PdfEngine, PdfOptions, render_pdf};
use crate::plain_text::strip_markdown;
use crate::store::{SecureFileStore, WriteOptions};

/// Every operation name accepted by [`Workbench::dispatch`]
pub const TOOL_NAMES: &[&str] = &[
    "edit_markdown",
    "open_file",
    "save_file",
    "create_file",
    "export_html",
    "export_pdf",
    "export_text",
    "import_html",
    "import_rtf",
];

const RTF_UNSUPPORTED: &str = "RTF import is not yet implemented. Please convert your RTF file to HTML first, then use the HTML import feature.";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMarkdownRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenFileRequest {
    pub file_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFileRequest {
    pub file_path: String,
    pub content: String,
    #[serde(default = "default_true")]
    pub create_backup: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    pub file_path: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportHtmlRequest {
    pub content: String,
    pub output_path: String,
    #[serde(default = "default_true")]
    pub include_styles: bool,
    #[serde(default = "default_true")]
    pub standalone: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPdfRequest {
    pub content: String,
    pub output_path: String,
    #[serde(default)]
    pub page_size: PageSize,
    #[serde(default = "default_true")]
    pub include_styles: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTextRequest {
    pub content: String,
    pub output_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHtmlRequest {
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSession {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub state: EditorState,
    pub stats: DocumentStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedFile {
    pub content: String,
    pub file_path: PathBuf,
    pub file_name: String,
}

/// Outcome of save and create
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFile {
    pub success: bool,
    pub file_path: PathBuf,
}

/// Outcome of the exports
#[derive(Debug, Clone, Serialize)]
pub struct ExportedFile {
    pub success: bool,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedHtml {
    pub content: String,
    pub original_path: PathBuf,
}

/// What a tool-call client receives
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub text: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured: Option<Value>,
}

impl ToolResult {
    fn success<T: Serialize>(text: String, payload: &T) -> Self {
        Self {
            text,
            is_error: false,
            structured: serde_json::to_value(payload).ok(),
        }
    }

    fn failure(text: String) -> Self {
        Self {
            text,
            is_error: true,
            structured: None,
        }
    }
}

/// The editor backend: a sandboxed store, the converters and a PDF engine
pub struct Workbench {
    store: SecureFileStore,
    renderer: MarkdownRenderer,
    pdf_engine: Box<dyn PdfEngine>,
}

impl Workbench {
    pub fn new(store: SecureFileStore, pdf_engine: Box<dyn PdfEngine>) -> Self {
        Self {
            store,
            renderer: MarkdownRenderer::new(),
            pdf_engine,
        }
    }

    /// Build the allowed roots, store and Chromium engine from configuration
    pub fn from_config(config: &WorkbenchConfig) -> io::Result<Self> {
        let roots = AllowedRoots::new(&config.allowed_roots)?;
        let store = SecureFileStore::with_max_read_bytes(PathGuard::new(roots), config.max_read_bytes);
        Ok(Self::new(store, Box::new(ChromiumEngine::new(&config.pdf))))
    }

    pub fn store(&self) -> &SecureFileStore {
        &self.store
    }

    /// Open the editor on inline content or on a file
    pub fn edit_markdown(&self, request: &EditMarkdownRequest) -> Result<EditorSession, WorkbenchError> {
        let state = match &request.file_path {
            Some(raw) => {
                let (path, content) = self.store.read(raw)?;
                EditorState::from_file(path.into_path_buf(), content)
            }
            None => EditorState::with_content(request.content.clone().unwrap_or_default()),
        };

        Ok(EditorSession {
            content: state.content.clone(),
            file_path: request.file_path.clone(),
            title: request.title.clone(),
            stats: state.stats(),
            state,
        })
    }

    pub fn open_file(&self, request: &OpenFileRequest) -> Result<OpenedFile, WorkbenchError> {
        let (path, content) = self.store.read(&request.file_path)?;
        Ok(OpenedFile {
            content,
            file_name: path.file_name(),
            file_path: path.into_path_buf(),
        })
    }

    pub fn save_file(&self, request: &SaveFileRequest) -> Result<SavedFile, WorkbenchError> {
        let path = self.store.write(
            &request.file_path,
            &request.content,
            WriteOptions {
                create_backup: request.create_backup,
            },
        )?;
        Ok(SavedFile {
            success: true,
            file_path: path.into_path_buf(),
        })
    }

    pub fn create_file(&self, request: &CreateFileRequest) -> Result<SavedFile, WorkbenchError> {
        let path = self.store.create(&request.file_path, &request.content)?;
        Ok(SavedFile {
            success: true,
            file_path: path.into_path_buf(),
        })
    }

    pub fn export_html(&self, request: &ExportHtmlRequest) -> Result<ExportedFile, WorkbenchError> {
        let html = self.renderer.render(
            &request.content,
            &HtmlOptions {
                include_styles: request.include_styles,
                standalone: request.standalone,
            },
        );
        let path = self
            .store
            .write(&request.output_path, &html, WriteOptions::default())?;
        Ok(ExportedFile {
            success: true,
            path: path.into_path_buf(),
        })
    }

    pub fn export_pdf(&self, request: &ExportPdfRequest) -> Result<ExportedFile, WorkbenchError> {
        let path = render_pdf(
            self.pdf_engine.as_ref(),
            &self.store,
            &request.content,
            &request.output_path,
            &PdfOptions {
                page_size: request.page_size,
                include_styles: request.include_styles,
            },
        )?;
        Ok(ExportedFile {
            success: true,
            path: path.into_path_buf(),
        })
    }

    pub fn export_text(&self, request: &ExportTextRequest) -> Result<ExportedFile, WorkbenchError> {
        let text = strip_markdown(&request.content);
        let path = self
            .store
            .write(&request.output_path, &text, WriteOptions::default())?;
        Ok(ExportedFile {
            success: true,
            path: path.into_path_buf(),
        })
    }

    /// Read an HTML file in whatever charset it declares and convert it
    pub fn import_html(&self, request: &ImportHtmlRequest) -> Result<ImportedHtml, WorkbenchError> {
        let (path, bytes) = self.store.read_bytes(&request.file_path)?;
        let dom = parse_html_bytes(&bytes)?;
        let content = MarkdownConverter::with_options(ConversionOptions::default()).convert(&dom)?;
        info!("Imported {} bytes of HTML from {}", bytes.len(), path);
        Ok(ImportedHtml {
            content,
            original_path: path.into_path_buf(),
        })
    }

    /// Run the operation `name` with JSON `args`
    pub fn dispatch(&self, name: &str, args: Value) -> ToolResult {
        match name {
            "edit_markdown" => self.run(name, args, "Error opening file", Self::edit_markdown, |session| {
                let mut text = "Opening markdown editor".to_string();
                if let Some(path) = &session.file_path {
                    text.push_str(&format!(" with file: {path}"));
                }
                if let Some(title) = &session.title {
                    text.push_str(&format!(" - {title}"));
                }
                text
            }),
            "open_file" => self.run(name, args, "Error opening file", Self::open_file, |opened| {
                format!("Opened file: {}", opened.file_path.display())
            }),
            "save_file" => self.run(name, args, "Error saving file", Self::save_file, |saved| {
                format!("Saved to: {}", saved.file_path.display())
            }),
            "create_file" => self.run(name, args, "Error creating file", Self::create_file, |saved| {
                format!("Created file: {}", saved.file_path.display())
            }),
            "export_html" => self.run(name, args, "Error exporting HTML", Self::export_html, |out| {
                format!("Exported HTML to: {}", out.path.display())
            }),
            "export_pdf" => self.run(name, args, "Error exporting PDF", Self::export_pdf, |out| {
                format!("Exported PDF to: {}", out.path.display())
            }),
            "export_text" => self.run(name, args, "Error exporting text", Self::export_text, |out| {
                format!("Exported plain text to: {}", out.path.display())
            }),
            "import_html" => self.run(name, args, "Error importing HTML", Self::import_html, |imported| {
                format!("Imported HTML from: {}", imported.original_path.display())
            }),
            "import_rtf" => ToolResult::failure(RTF_UNSUPPORTED.to_string()),
            _ => {
                error!("Unknown tool requested: {}", name);
                ToolResult::failure(format!("Unknown tool: {name}"))
            }
        }
    }

    fn run<Req, Out, Op, Describe>(
        &self,
        name: &str,
        args: Value,
        error_prefix: &str,
        operation: Op,
        describe: Describe,
    ) -> ToolResult
    where
        Req: DeserializeOwned,
        Out: Serialize,
        Op: FnOnce(&Self, &Req) -> Result<Out, WorkbenchError>,
        Describe: FnOnce(&Out) -> String,
    {
        // A missing argument object means "all defaults"
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        let request: Req = match serde_json::from_value(args) {
            Ok(request) => request,
            Err(e) => {
                error!("{}: invalid arguments: {}", name, e);
                return ToolResult::failure(format!("{error_prefix}: Invalid arguments: {e}"));
            }
        };

        match operation(self, &request) {
            Ok(outcome) => ToolResult::success(describe(&outcome), &outcome),
            // A create collision reports just the collision, like a conflict
            Err(WorkbenchError::File(e @ FileError::AlreadyExists { .. })) => {
                error!("{} failed: {}", name, e);
                ToolResult::failure(e.to_string())
            }
            Err(e) => {
                error!("{} failed ({}): {}", name, e.kind(), e);
                ToolResult::failure(format!("{error_prefix}: {e}"))
            }
        }
    }
}
