//! Configuration file (folio.toml).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use folio_server::{DevServerConfig, Mode};
use folio_static::BuildConfig;

/// Configuration file structure.
#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct FolioConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub dev: DevConfig,
    #[serde(default)]
    pub build: BuildSettings,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct SiteConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_pages")]
    pub pages: String,
    #[serde(default = "default_public")]
    pub public: String,
    #[serde(default = "default_output")]
    pub output: String,
    /// Custom layouts directory
    pub layouts: Option<String>,
    /// Paths to CSS stylesheets to include
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default = "default_locale")]
    pub default_locale: String,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct DevConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Extra directories to watch
    #[serde(default)]
    pub watch: Vec<String>,
    #[serde(default)]
    pub open: bool,
    pub mode: Option<Mode>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct BuildSettings {
    #[serde(default = "default_minify")]
    pub minify: bool,
}

fn default_title() -> String {
    "Documentation".to_string()
}
fn default_pages() -> String {
    "pages".to_string()
}
fn default_public() -> String {
    "public".to_string()
}
fn default_output() -> String {
    "dist".to_string()
}
fn default_locale() -> String {
    "en".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_minify() -> bool {
    true
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            pages: default_pages(),
            public: default_public(),
            output: default_output(),
            layouts: None,
            styles: Vec::new(),
            default_locale: default_locale(),
        }
    }
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debounce_ms: default_debounce_ms(),
            watch: Vec::new(),
            open: false,
            mode: None,
        }
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            minify: default_minify(),
        }
    }
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load(path: &Path) -> Result<FolioConfig> {
    if !path.exists() {
        tracing::debug!("No {}, using defaults", path.display());
        return Ok(FolioConfig::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: FolioConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

impl FolioConfig {
    /// Development server settings, before CLI overrides.
    pub fn dev_server(&self) -> DevServerConfig {
        DevServerConfig {
            pages_dir: PathBuf::from(&self.site.pages),
            public_dir: PathBuf::from(&self.site.public),
            output_dir: PathBuf::from(&self.site.output),
            layouts_dir: self.site.layouts.as_ref().map(PathBuf::from),
            watch: self.dev.watch.iter().map(PathBuf::from).collect(),
            host: self.dev.host.clone(),
            port: self.dev.port,
            debounce: Duration::from_millis(self.dev.debounce_ms),
            mode: self.dev.mode.unwrap_or_default(),
            open: self.dev.open,
            title: self.site.title.clone(),
            styles: self.site.styles.clone(),
            default_locale: self.site.default_locale.clone(),
        }
    }

    /// Static build settings, before CLI overrides.
    pub fn build(&self) -> BuildConfig {
        BuildConfig {
            pages_dir: PathBuf::from(&self.site.pages),
            public_dir: PathBuf::from(&self.site.public),
            output_dir: PathBuf::from(&self.site.output),
            layouts_dir: self.site.layouts.as_ref().map(PathBuf::from),
            minify: self.build.minify,
            title: self.site.title.clone(),
            styles: self.site.styles.clone(),
        }
    }
}
