//! Markdown → PDF
//!
//! The markdown is rendered to a standalone HTML document, a print
//! stylesheet is injected (`@page` size, 20mm margins, background colours
//! kept), and a [`PdfEngine`] paginates it. The finished bytes go through
//! [`SecureFileStore`], so the output lands atomically inside the sandbox.
//!
//! The production engine is headless Chromium, run once per render with its
//! own throwaway profile directory. Nothing is shared between renders and
//! the profile is removed when the render returns, on success or failure.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::config::PdfConfig;
use crate::error::{ConversionError, WorkbenchError};
use crate::markdown::{HtmlOptions, markdown_to_html};
use crate::path_guard::ResolvedPath;
use crate::store::{SecureFileStore, WriteOptions};

/// Margin applied on all four sides
pub const PAGE_MARGIN: &str = "20mm";

const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Paper size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    Letter,
    Legal,
}

impl PageSize {
    /// Value for the CSS `@page { size: … }` descriptor
    pub fn css_size(self) -> &'static str {
        match self {
            PageSize::A4 => "A4",
            PageSize::Letter => "letter",
            PageSize::Legal => "legal",
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageSize::A4 => "A4",
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
        };
        f.write_str(name)
    }
}

impl FromStr for PageSize {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(PageSize::A4),
            "letter" => Ok(PageSize::Letter),
            "legal" => Ok(PageSize::Legal),
            other => Err(ConversionError::InvalidInput(format!(
                "Unknown page size '{}' (expected A4, Letter or Legal)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfOptions {
    #[serde(default)]
    pub page_size: PageSize,
    #[serde(default = "default_true")]
    pub include_styles: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            include_styles: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Something that turns a complete HTML document into PDF bytes
pub trait PdfEngine: Send + Sync {
    fn print_to_pdf(&self, html: &str) -> Result<Vec<u8>, ConversionError>;
}

/// Standalone HTML prepared for printing
pub fn print_document(markdown: &str, options: &PdfOptions) -> String {
    let html = markdown_to_html(
        markdown,
        &HtmlOptions {
            include_styles: options.include_styles,
            standalone: true,
        },
    );

    let print_style = format!(
        "<style>@page {{ size: {}; margin: {}; }} \
         html {{ -webkit-print-color-adjust: exact; print-color-adjust: exact; }}</style>\n",
        options.page_size.css_size(),
        PAGE_MARGIN
    );
    html.replacen("</head>", &format!("{print_style}</head>"), 1)
}

/// Render `markdown` to a PDF at `output_path`.
///
/// The path is resolved before rendering so a rejected destination costs
/// nothing. The write replaces any existing file without a backup.
pub fn render_pdf(
    engine: &dyn PdfEngine,
    store: &SecureFileStore,
    markdown: &str,
    output_path: &str,
    options: &PdfOptions,
) -> Result<ResolvedPath, WorkbenchError> {
    store.resolve(output_path)?;

    let html = print_document(markdown, options);
    let pdf = engine.print_to_pdf(&html)?;
    debug!("Rendered {} byte PDF ({})", pdf.len(), options.page_size);

    let path = store.write_bytes(output_path, &pdf, WriteOptions::default())?;
    info!("Exported PDF to {}", path);
    Ok(path)
}

/// Headless Chromium driven through its command line
///
/// Readiness is Chromium's virtual-time budget: the page is printed once
/// the budget elapses or the page goes idle, whichever comes first.
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    browser: Option<PathBuf>,
    timeout: Duration,
    settle_budget: Duration,
}

impl ChromiumEngine {
    pub fn new(config: &PdfConfig) -> Self {
        Self {
            browser: config.browser.clone(),
            timeout: config.timeout(),
            settle_budget: config.settle_budget(),
        }
    }

    fn browser_path(&self) -> Result<PathBuf, ConversionError> {
        if let Some(browser) = &self.browser {
            return Ok(browser.clone());
        }
        find_browser().ok_or_else(|| {
            ConversionError::RenderError(
                "No Chromium or Chrome executable found on PATH (set pdf.browser)".to_string(),
            )
        })
    }
}

impl PdfEngine for ChromiumEngine {
    fn print_to_pdf(&self, html: &str) -> Result<Vec<u8>, ConversionError> {
        let browser = self.browser_path()?;

        // Profile, input and output all live here and go away on drop
        let workdir = TempDir::new().map_err(|e| {
            ConversionError::RenderError(format!("Cannot create browser profile directory: {e}"))
        })?;
        let profile = workdir.path().join("profile");
        let input = workdir.path().join("document.html");
        let output = workdir.path().join("document.pdf");

        fs::write(&input, html).map_err(|e| {
            ConversionError::RenderError(format!("Cannot stage HTML for printing: {e}"))
        })?;

        let mut command = Command::new(&browser);
        command
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-pdf-header-footer")
            .arg("--run-all-compositor-stages-before-draw")
            .arg(format!("--user-data-dir={}", profile.display()))
            .arg(format!(
                "--virtual-time-budget={}",
                self.settle_budget.as_millis()
            ))
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(file_url(&input))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        debug!("Launching {} for PDF render", browser.display());
        let mut child = command.spawn().map_err(|e| {
            ConversionError::RenderError(format!("Cannot launch {}: {e}", browser.display()))
        })?;

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    stop_child(&mut child);
                    return Err(ConversionError::RenderError(format!(
                        "Lost track of browser process: {e}"
                    )));
                }
            }
            if start.elapsed() > self.timeout {
                warn!(
                    "PDF render exceeded {}s, killing browser",
                    self.timeout.as_secs()
                );
                stop_child(&mut child);
                return Err(ConversionError::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            return Err(ConversionError::RenderError(format!(
                "Browser exited with {status}"
            )));
        }

        let pdf = fs::read(&output).map_err(|e| {
            ConversionError::RenderError(format!("Browser produced no PDF: {e}"))
        })?;
        if !pdf.starts_with(b"%PDF") {
            return Err(ConversionError::RenderError(
                "Browser output is not a PDF document".to_string(),
            ));
        }

        Ok(pdf)
    }
}

/// Kill the browser and reap it so no zombie is left behind
fn stop_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn file_url(path: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/");
    if path.starts_with('/') {
        format!("file://{path}")
    } else {
        format!("file:///{path}")
    }
}

/// First Chromium-family executable on PATH
pub fn find_browser() -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path).find_map(|dir| {
        BROWSER_CANDIDATES.iter().find_map(|name| {
            let candidate = dir.join(name);
            is_executable_file(&candidate).then_some(candidate)
        })
    })
}

fn is_executable_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        let Ok(meta) = fs::metadata(path) else {
            return false;
        };
        meta.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}
