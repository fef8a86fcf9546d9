//! Static site builder.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use walkdir::WalkDir;

use folio_content::{
    generate_routes_with, CancelToken, ContentParseError, ContentRecord, LocalizationIndex,
    Pipeline, RouteTable, RouterError,
};

use crate::assets::AssetPipeline;
use crate::layout::{LayoutEngine, RenderError, SiteInfo};

/// Configuration for building a static site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Pages root
    pub pages_dir: PathBuf,

    /// Public assets copied verbatim (stylesheets minified)
    pub public_dir: PathBuf,

    /// Output directory
    pub output_dir: PathBuf,

    /// Custom layouts directory
    pub layouts_dir: Option<PathBuf>,

    /// Minify stylesheets
    pub minify: bool,

    /// Site title
    pub title: String,

    /// Public stylesheet paths linked from every page
    pub styles: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            pages_dir: PathBuf::from("pages"),
            public_dir: PathBuf::from("public"),
            output_dir: PathBuf::from("dist"),
            layouts_dir: None,
            minify: true,
            title: "Documentation".to_string(),
            styles: vec![],
        }
    }
}

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of pages generated
    pub pages: usize,

    /// Number of public files copied
    pub assets: usize,

    /// Content files that were skipped
    pub skipped: Vec<ContentParseError>,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

/// Errors that can occur during build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Routes(#[from] RouterError),

    #[error("Failed to render {route}: {source}")]
    Render {
        route: String,
        #[source]
        source: RenderError,
    },

    #[error("Failed to write output: {0}")]
    WriteError(String),
}

/// Static site builder.
pub struct StaticBuilder<'a> {
    config: BuildConfig,
    pipeline: Pipeline,
    localization: Option<&'a dyn LocalizationIndex>,
}

impl<'a> StaticBuilder<'a> {
    /// Create a new static builder.
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            pipeline: Pipeline::new(),
            localization: None,
        }
    }

    /// Thread content through `pipeline` before rendering.
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Register every generated record with a localization extension.
    pub fn with_localization(mut self, index: &'a dyn LocalizationIndex) -> Self {
        self.localization = Some(index);
        self
    }

    /// Build the static site.
    pub async fn build(&self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();

        let layout = match &self.config.layouts_dir {
            Some(dir) => LayoutEngine::from_dir(dir).map_err(|source| BuildError::Render {
                route: "*".to_string(),
                source,
            })?,
            None => LayoutEngine::new(),
        };

        let generated = generate_routes_with(
            &self.config.pages_dir,
            &self.pipeline,
            self.localization,
            &CancelToken::new(),
        )
        .await?;

        fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| BuildError::WriteError(e.to_string()))?;

        let site = SiteInfo {
            title: self.config.title.clone(),
            styles: self.config.styles.clone(),
        };

        let table = &generated.table;
        let records: Vec<&ContentRecord> = table.records().collect();

        // Render and write pages in parallel
        records
            .par_iter()
            .map(|record| self.build_page(record, table, &layout, &site))
            .collect::<Result<Vec<()>, BuildError>>()?;

        let assets = self.copy_public()?;

        let duration = start.elapsed();

        Ok(BuildResult {
            pages: table.len(),
            assets,
            skipped: generated.failures,
            duration_ms: duration.as_millis() as u64,
            output_dir: self.config.output_dir.clone(),
        })
    }

    /// Output file for a route: `/` → `index.html`, `/blog` → `blog/index.html`.
    pub fn output_path(&self, route: &str) -> PathBuf {
        let relative = route.trim_start_matches('/');
        if relative.is_empty() {
            self.config.output_dir.join("index.html")
        } else {
            self.config.output_dir.join(relative).join("index.html")
        }
    }

    fn build_page(
        &self,
        record: &ContentRecord,
        table: &RouteTable,
        layout: &LayoutEngine,
        site: &SiteInfo,
    ) -> Result<(), BuildError> {
        let html = layout
            .render(record, table, site)
            .map_err(|source| BuildError::Render {
                route: record.route.clone(),
                source,
            })?;

        let output_path = self.output_path(&record.route);
        write_file(&output_path, html.as_bytes())
    }

    /// Copy the public directory into the output, minifying stylesheets.
    fn copy_public(&self) -> Result<usize, BuildError> {
        let public = &self.config.public_dir;
        if !public.is_dir() {
            tracing::debug!("No public directory at {}", public.display());
            return Ok(0);
        }

        let files: Vec<PathBuf> = WalkDir::new(public)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        files
            .par_iter()
            .map(|path| {
                let relative = path.strip_prefix(public).unwrap_or(path);
                let bytes = fs::read(path)
                    .map_err(|e| BuildError::WriteError(format!("{}: {}", path.display(), e)))?;
                let bytes = AssetPipeline::process(path, bytes, self.config.minify);
                write_file(&self.config.output_dir.join(relative), &bytes)
            })
            .collect::<Result<Vec<()>, BuildError>>()?;

        tracing::info!("Copied {} public files", files.len());
        Ok(files.len())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::WriteError(e.to_string()))?;
    }
    fs::write(path, bytes).map_err(|e| BuildError::WriteError(e.to_string()))
}
