//! Asset pipeline for public files.
//!
//! Stylesheets are minified with lightningcss in production builds; every
//! other file is copied through untouched.

use std::path::Path;

/// Errors from stylesheet processing.
///
/// lightningcss errors borrow the source text, so only their message is kept.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("CSS parse error: {0}")]
    Parse(String),

    #[error("CSS minify error: {0}")]
    Minify(String),
}

/// Asset pipeline utilities.
pub struct AssetPipeline;

impl AssetPipeline {
    /// Minify CSS using lightningcss.
    pub fn minify_css(css: &str) -> Result<String, AssetError> {
        use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};

        let stylesheet = StyleSheet::parse(css, ParserOptions::default())
            .map_err(|e| AssetError::Parse(e.to_string()))?;

        let minified = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                ..Default::default()
            })
            .map_err(|e| AssetError::Minify(e.to_string()))?;

        Ok(minified.code)
    }

    /// Process one public file for output.
    ///
    /// A stylesheet that fails to minify is emitted as-is with a warning.
    pub fn process(path: &Path, bytes: Vec<u8>, minify: bool) -> Vec<u8> {
        let is_css = path.extension().and_then(|e| e.to_str()) == Some("css");
        if !minify || !is_css {
            return bytes;
        }

        let css = match String::from_utf8(bytes) {
            Ok(css) => css,
            Err(e) => return e.into_bytes(),
        };

        match Self::minify_css(&css) {
            Ok(minified) => minified.into_bytes(),
            Err(e) => {
                tracing::warn!("Leaving {} unminified: {}", path.display(), e);
                css.into_bytes()
            }
        }
    }
}
