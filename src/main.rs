//! Markdown Workbench - command-line entry point
//!
//! Every subcommand is translated into an operation call on the
//! [`Workbench`]; the result is printed to stdout as JSON. Logs go to stderr
//! (`RUST_LOG` selects the level).

use clap::{Parser, Subcommand};
use log::{error, info};
use markdown_workbench::pdf::PageSize;
use markdown_workbench::{ToolResult, Workbench, WorkbenchConfig};
use serde_json::{Value, json};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "markdown-workbench", version, about = "Sandboxed markdown editor backend")]
struct Cli {
    /// Configuration file (default: markdown-workbench.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open the editor on a file or on inline content
    Edit {
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        title: Option<String>,
    },
    /// Print a file's content
    Open { path: String },
    /// Write content (from --content or stdin) to a file
    Save {
        path: String,
        #[arg(long)]
        content: Option<String>,
        /// Skip the `.backup` copy of an existing file
        #[arg(long)]
        no_backup: bool,
    },
    /// Create a new file; fails if it exists
    Create {
        path: String,
        #[arg(long, default_value = "")]
        content: String,
    },
    /// Render markdown (from --content or stdin) to an HTML file
    ExportHtml {
        output: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        no_styles: bool,
        /// Body only, without the document shell
        #[arg(long)]
        fragment: bool,
    },
    /// Render markdown (from --content or stdin) to a PDF file
    ExportPdf {
        output: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long, default_value = "A4")]
        page_size: PageSize,
        #[arg(long)]
        no_styles: bool,
    },
    /// Strip markdown (from --content or stdin) into a text file
    ExportText {
        output: String,
        #[arg(long)]
        content: Option<String>,
    },
    /// Convert an HTML file to markdown
    ImportHtml { path: String },
    /// Call an operation by name with JSON arguments
    Call {
        tool: String,
        #[arg(default_value = "{}")]
        args: String,
    },
}

fn content_or_stdin(content: Option<String>) -> io::Result<String> {
    match content {
        Some(content) => Ok(content),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

/// Translate a subcommand into an operation name and its arguments
fn to_call(command: Command) -> Result<(String, Value), String> {
    let stdin_error = |e: io::Error| format!("Cannot read content from stdin: {e}");

    let call = match command {
        Command::Edit {
            file,
            content,
            title,
        } => (
            "edit_markdown",
            json!({ "filePath": file, "content": content, "title": title }),
        ),
        Command::Open { path } => ("open_file", json!({ "filePath": path })),
        Command::Save {
            path,
            content,
            no_backup,
        } => (
            "save_file",
            json!({
                "filePath": path,
                "content": content_or_stdin(content).map_err(stdin_error)?,
                "createBackup": !no_backup,
            }),
        ),
        Command::Create { path, content } => (
            "create_file",
            json!({ "filePath": path, "content": content }),
        ),
        Command::ExportHtml {
            output,
            content,
            no_styles,
            fragment,
        } => (
            "export_html",
            json!({
                "content": content_or_stdin(content).map_err(stdin_error)?,
                "outputPath": output,
                "includeStyles": !no_styles,
                "standalone": !fragment,
            }),
        ),
        Command::ExportPdf {
            output,
            content,
            page_size,
            no_styles,
        } => (
            "export_pdf",
            json!({
                "content": content_or_stdin(content).map_err(stdin_error)?,
                "outputPath": output,
                "pageSize": page_size,
                "includeStyles": !no_styles,
            }),
        ),
        Command::ExportText { output, content } => (
            "export_text",
            json!({
                "content": content_or_stdin(content).map_err(stdin_error)?,
                "outputPath": output,
            }),
        ),
        Command::ImportHtml { path } => ("import_html", json!({ "filePath": path })),
        Command::Call { tool, args } => {
            let args: Value = serde_json::from_str(&args)
                .map_err(|e| format!("Arguments are not valid JSON: {e}"))?;
            return Ok((tool, args));
        }
    };

    Ok((call.0.to_string(), call.1))
}

fn print_result(result: &ToolResult) -> ExitCode {
    match serde_json::to_string_pretty(result) {
        Ok(text) => println!("{text}"),
        Err(e) => error!("Cannot serialize result: {}", e),
    }
    if result.is_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main() -> ExitCode {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    let cli = Cli::parse();

    let config = match WorkbenchConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let workbench = match Workbench::from_config(&config) {
        Ok(workbench) => workbench,
        Err(e) => {
            error!("Cannot set up allowed roots: {}", e);
            eprintln!("Cannot set up allowed roots: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (tool, args) = match to_call(cli.command) {
        Ok(call) => call,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    info!("Running {}", tool);
    print_result(&workbench.dispatch(&tool, args))
}
