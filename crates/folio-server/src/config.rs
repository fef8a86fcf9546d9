//! Development server configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable that overrides the configured [`Mode`].
pub const MODE_ENV: &str = "FOLIO_ENV";

/// Build mode.
///
/// Development injects the live-update client and shows error details;
/// production does neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown mode `{}`", other)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory containing content pages
    pub pages_dir: PathBuf,

    /// Directory of static files served as-is
    pub public_dir: PathBuf,

    /// Build output directory, never watched
    pub output_dir: PathBuf,

    /// Custom layouts directory
    pub layouts_dir: Option<PathBuf>,

    /// Additional directories to watch
    pub watch: Vec<PathBuf>,

    /// Host to bind to
    pub host: String,

    /// Port to listen on (0 picks a free port)
    pub port: u16,

    /// Quiet period before a batch of changes is flushed
    pub debounce: Duration,

    /// Development or production behaviour
    pub mode: Mode,

    /// Open browser on start
    pub open: bool,

    /// Site title
    pub title: String,

    /// Public stylesheet paths linked from every page
    pub styles: Vec<String>,

    /// Locale for pages without a `lang` key
    pub default_locale: String,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            pages_dir: PathBuf::from("pages"),
            public_dir: PathBuf::from("public"),
            output_dir: PathBuf::from("dist"),
            layouts_dir: None,
            watch: Vec::new(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            debounce: Duration::from_millis(100),
            mode: Mode::Development,
            open: false,
            title: "Documentation".to_string(),
            styles: Vec::new(),
            default_locale: "en".to_string(),
        }
    }
}
