//! PDF export orchestration with a stand-in engine
//!
//! The engine records the document it was asked to print, so these tests
//! check everything around the browser without needing one.

use markdown_workbench::error::{ConversionError, FileError, WorkbenchError};
use markdown_workbench::path_guard::{AllowedRoots, PathGuard};
use markdown_workbench::pdf::{PageSize, PdfEngine, PdfOptions, render_pdf};
use markdown_workbench::store::SecureFileStore;
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

const FAKE_PDF: &[u8] = b"%PDF-1.7\n% stand-in\n%%EOF\n";

#[derive(Default)]
struct RecordingEngine {
    printed: Mutex<Vec<String>>,
}

impl RecordingEngine {
    fn documents(&self) -> Vec<String> {
        self.printed.lock().map(|docs| docs.clone()).unwrap_or_default()
    }
}

impl PdfEngine for RecordingEngine {
    fn print_to_pdf(&self, html: &str) -> Result<Vec<u8>, ConversionError> {
        if let Ok(mut printed) = self.printed.lock() {
            printed.push(html.to_string());
        }
        Ok(FAKE_PDF.to_vec())
    }
}

struct FailingEngine;

impl PdfEngine for FailingEngine {
    fn print_to_pdf(&self, _html: &str) -> Result<Vec<u8>, ConversionError> {
        Err(ConversionError::RenderError("browser crashed".to_string()))
    }
}

fn sandbox() -> (TempDir, SecureFileStore) {
    let dir = TempDir::new().expect("temp dir");
    let roots = AllowedRoots::new([dir.path()]).expect("root exists");
    (dir, SecureFileStore::new(PathGuard::new(roots)))
}

#[test]
fn test_pdf_written_inside_root() {
    let (dir, store) = sandbox();
    let engine = RecordingEngine::default();
    let output = dir.path().join("exports/report.pdf");

    let path = render_pdf(
        &engine,
        &store,
        "# Report\n\n- [x] done\n",
        &output.to_string_lossy(),
        &PdfOptions::default(),
    )
    .expect("render succeeds");

    assert!(path.as_path().ends_with("exports/report.pdf"));
    assert_eq!(fs::read(path.as_path()).expect("read pdf"), FAKE_PDF);

    let documents = engine.documents();
    assert_eq!(documents.len(), 1);
    let html = &documents[0];
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<h1>Report</h1>"));
    assert!(html.contains("@page { size: A4; margin: 20mm; }"));
    assert!(html.contains("print-color-adjust: exact"));
}

#[test]
fn test_page_size_reaches_the_document() {
    let (dir, store) = sandbox();
    let engine = RecordingEngine::default();
    let output = dir.path().join("legal.pdf");

    render_pdf(
        &engine,
        &store,
        "text",
        &output.to_string_lossy(),
        &PdfOptions {
            page_size: PageSize::Legal,
            include_styles: false,
        },
    )
    .expect("render succeeds");

    let html = &engine.documents()[0];
    assert!(html.contains("size: legal;"));
    // The print rule is there even without the document stylesheet
    assert!(!html.contains("blockquote {"));
}

/// A rejected destination is refused before anything is rendered
#[test]
fn test_outside_root_rejected_before_render() {
    let (_dir, store) = sandbox();
    let engine = RecordingEngine::default();

    let result = render_pdf(
        &engine,
        &store,
        "# x",
        "/etc/markdown-workbench-test.pdf",
        &PdfOptions::default(),
    );

    assert!(matches!(
        result,
        Err(WorkbenchError::File(FileError::AccessDenied { .. }))
    ));
    assert!(engine.documents().is_empty());
}

/// An engine failure leaves no output file behind
#[test]
fn test_engine_failure_writes_nothing() {
    let (dir, store) = sandbox();
    let output = dir.path().join("broken.pdf");

    let result = render_pdf(
        &FailingEngine,
        &store,
        "# x",
        &output.to_string_lossy(),
        &PdfOptions::default(),
    );

    assert!(matches!(
        result,
        Err(WorkbenchError::Conversion(ConversionError::RenderError(_)))
    ));
    assert!(!output.exists());
}

/// Rendering replaces an existing PDF
#[test]
fn test_existing_pdf_is_replaced() {
    let (dir, store) = sandbox();
    let output = dir.path().join("again.pdf");
    fs::write(&output, b"old").expect("seed file");

    render_pdf(
        &RecordingEngine::default(),
        &store,
        "# x",
        &output.to_string_lossy(),
        &PdfOptions::default(),
    )
    .expect("render succeeds");

    assert_eq!(fs::read(&output).expect("read pdf"), FAKE_PDF);
}
