//! Per-file content processing.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::frontmatter::{split_front_matter, FrontMatter, FrontMatterError};
use crate::markdown::{self, Heading};
use crate::pipeline::{HookError, Pipeline};
use crate::route::route_for;

/// One processed content file.
///
/// A record is built fresh on every processing pass and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentRecord {
    /// Absolute path of the source file
    pub source_path: PathBuf,

    /// Canonical URL path
    pub route: String,

    /// Body after front matter removal and transform hooks
    pub raw_content: String,

    /// Front matter key/value mapping
    pub front_matter: FrontMatter,

    /// Rendered HTML
    pub rendered_markup: String,

    /// Headings in document order
    pub heading_index: Vec<Heading>,
}

impl ContentRecord {
    /// Page title from front matter.
    pub fn title(&self) -> Option<&str> {
        self.front_matter.title()
    }
}

/// Errors that can occur while processing a content file.
#[derive(Debug, thiserror::Error)]
pub enum ContentParseError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid front matter in {}: {source}", path.display())]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: FrontMatterError,
    },

    #[error("Transform failed for {}: {source}", path.display())]
    Hook {
        path: PathBuf,
        #[source]
        source: HookError,
    },

    #[error("{} maps to {route}, which is already claimed by {}", path.display(), existing.display())]
    DuplicateRoute {
        path: PathBuf,
        route: String,
        existing: PathBuf,
    },
}

impl ContentParseError {
    /// Source file the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. }
            | Self::FrontMatter { path, .. }
            | Self::Hook { path, .. }
            | Self::DuplicateRoute { path, .. } => path,
        }
    }
}

/// Process one file without transform hooks.
pub fn process_file(path: &Path, root: &Path) -> Result<ContentRecord, ContentParseError> {
    let source = std::fs::read_to_string(path).map_err(|source| ContentParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let (front_matter, body) = split(path, &source)?;

    Ok(assemble(path, root, front_matter, body.to_string()))
}

/// Process one file, threading its body through `pipeline` before rendering.
pub async fn process_file_with(
    path: &Path,
    root: &Path,
    pipeline: &Pipeline,
) -> Result<ContentRecord, ContentParseError> {
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ContentParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let (front_matter, body) = split(path, &source)?;

    let relative = path.strip_prefix(root).unwrap_or(path);
    let body = pipeline
        .run(relative, body.to_string())
        .await
        .map_err(|source| ContentParseError::Hook {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(assemble(path, root, front_matter, body))
}

fn split<'a>(path: &Path, source: &'a str) -> Result<(FrontMatter, &'a str), ContentParseError> {
    split_front_matter(source).map_err(|source| ContentParseError::FrontMatter {
        path: path.to_path_buf(),
        source,
    })
}

fn assemble(path: &Path, root: &Path, front_matter: FrontMatter, body: String) -> ContentRecord {
    let rendered = markdown::render(&body);

    ContentRecord {
        source_path: std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
        route: route_for(path, root),
        raw_content: body,
        front_matter,
        rendered_markup: rendered.html,
        heading_index: rendered.headings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn processes_a_file() {
        let temp = tempdir().unwrap();
        let blog = temp.path().join("blog");
        fs::create_dir_all(&blog).unwrap();
        let file = blog.join("post1.md");
        fs::write(
            &file,
            "---\ntitle: First Post\ntags: [rust]\n---\n# Hello\n\nSome *text*.\n",
        )
        .unwrap();

        let record = process_file(&file, temp.path()).unwrap();

        assert_eq!(record.route, "/blog/post1");
        assert_eq!(record.title(), Some("First Post"));
        assert_eq!(record.raw_content, "# Hello\n\nSome *text*.\n");
        assert!(record.rendered_markup.contains("<em>text</em>"));
        assert_eq!(record.heading_index.len(), 1);
        assert_eq!(record.heading_index[0].id, "hello");
        assert!(record.source_path.is_absolute());
    }

    #[test]
    fn processing_twice_is_identical() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("index.md");
        fs::write(&file, "---\ntitle: Home\n---\n# A\n## B\n## B\n").unwrap();

        let first = process_file(&file, temp.path()).unwrap();
        let second = process_file(&file, temp.path()).unwrap();

        assert_eq!(first.rendered_markup, second.rendered_markup);
        assert_eq!(first.front_matter, second.front_matter);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope.md");

        let err = process_file(&missing, temp.path()).unwrap_err();

        assert!(matches!(err, ContentParseError::Read { .. }));
        assert_eq!(err.path(), missing.as_path());
    }

    #[test]
    fn bad_front_matter_is_reported() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("bad.md");
        fs::write(&file, "---\ntitle: [oops\n---\nbody").unwrap();

        let err = process_file(&file, temp.path()).unwrap_err();

        assert!(matches!(err, ContentParseError::FrontMatter { .. }));
    }

    #[tokio::test]
    async fn hooks_transform_body_before_rendering() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("about.md");
        fs::write(&file, "---\ntitle: About\n---\nHello NAME\n").unwrap();

        let pipeline = Pipeline::new().then("name", |s| s.replace("NAME", "**World**"));
        let record = process_file_with(&file, temp.path(), &pipeline).await.unwrap();

        assert_eq!(record.raw_content, "Hello **World**\n");
        assert!(record.rendered_markup.contains("<strong>World</strong>"));
        assert_eq!(record.title(), Some("About"));
    }
}
