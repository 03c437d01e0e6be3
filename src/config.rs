//! Startup configuration
//!
//! Loaded once when the process starts: serde defaults, then an optional
//! TOML file, then `MD_WORKBENCH_*` environment overrides.
//!
//! ```toml
//! allowed_roots = ["/home/alice/notes", "/tmp"]
//! max_read_bytes = 10485760
//!
//! [pdf]
//! browser = "/usr/bin/chromium"
//! timeout_secs = 30
//! settle_budget_ms = 5000
//! ```
//!
//! Environment examples: `MD_WORKBENCH_ALLOWED_ROOTS=/srv/docs,/tmp`,
//! `MD_WORKBENCH_PDF__TIMEOUT_SECS=60`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default read cap (10 MiB)
pub const DEFAULT_MAX_READ_BYTES: u64 = 10 * 1024 * 1024;

const DEFAULT_CONFIG_NAME: &str = "markdown-workbench";
const ENV_PREFIX: &str = "MD_WORKBENCH";

#[derive(Debug, Deserialize, Clone)]
pub struct WorkbenchConfig {
    /// Directories under which every file operation must resolve
    #[serde(default = "default_allowed_roots")]
    pub allowed_roots: Vec<PathBuf>,

    /// Maximum size of a file accepted by `read`
    #[serde(default = "default_max_read_bytes")]
    pub max_read_bytes: u64,

    #[serde(default)]
    pub pdf: PdfConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PdfConfig {
    /// Chromium/Chrome executable; discovered on PATH when unset
    #[serde(default)]
    pub browser: Option<PathBuf>,

    /// Upper bound for one whole render
    #[serde(default = "default_pdf_timeout_secs")]
    pub timeout_secs: u64,

    /// Virtual-time budget the browser waits for the page to settle
    #[serde(default = "default_settle_budget_ms")]
    pub settle_budget_ms: u64,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            browser: None,
            timeout_secs: default_pdf_timeout_secs(),
            settle_budget_ms: default_settle_budget_ms(),
        }
    }
}

impl PdfConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settle_budget(&self) -> Duration {
        Duration::from_millis(self.settle_budget_ms)
    }
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            allowed_roots: default_allowed_roots(),
            max_read_bytes: default_max_read_bytes(),
            pdf: PdfConfig::default(),
        }
    }
}

impl WorkbenchConfig {
    /// Load configuration.
    ///
    /// With `path`, that file must exist. Without it, `markdown-workbench.toml`
    /// in the working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file_source = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings = Config::builder()
            .add_source(file_source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("allowed_roots")
                    .try_parsing(true),
            )
            .build()?;

        let config: WorkbenchConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_roots.is_empty() {
            return Err(ConfigError::Message(
                "allowed_roots must name at least one directory".into(),
            ));
        }

        if let Some(relative) = self.allowed_roots.iter().find(|root| !root.is_absolute()) {
            return Err(ConfigError::Message(format!(
                "allowed root must be an absolute path: {}",
                relative.display()
            )));
        }

        if self.max_read_bytes == 0 {
            return Err(ConfigError::Message(
                "max_read_bytes must be greater than 0".into(),
            ));
        }

        if self.pdf.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "pdf.timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

/// Home directory and system temp directory (plus `/tmp` on unix)
pub fn default_allowed_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if let Some(home) = home_dir() {
        roots.push(home);
    }

    roots.push(std::env::temp_dir());

    #[cfg(unix)]
    roots.push(PathBuf::from("/tmp"));

    roots.dedup();
    roots
}

#[allow(deprecated)]
fn home_dir() -> Option<PathBuf> {
    std::env::home_dir().filter(|home| !home.as_os_str().is_empty())
}

fn default_max_read_bytes() -> u64 {
    DEFAULT_MAX_READ_BYTES
}

fn default_pdf_timeout_secs() -> u64 {
    30
}

fn default_settle_budget_ms() -> u64 {
    5000
}
