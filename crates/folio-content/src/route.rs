//! Route derivation from content file paths.
//!
//! Routes never end in a slash, except the root route `/`.

use std::path::{Component, Path};

/// File extensions recognised as content. Both denote the same content type.
pub const CONTENT_EXTENSIONS: [&str; 2] = ["md", "mdx"];

/// Check whether a path has a content extension.
pub fn is_content_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| CONTENT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Compute the route for a content file relative to the pages root.
///
/// - `index.md` → `/`
/// - `about.md` → `/about`
/// - `blog/index.mdx` → `/blog`
/// - `blog/post1.md` → `/blog/post1`
pub fn route_for(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);

    let mut segments: Vec<String> = relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !stem.is_empty() && stem != "index" {
        segments.push(stem);
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Normalise a request path to the canonical route form.
///
/// Collapses repeated slashes, drops a trailing slash and a trailing
/// `index` / `index.html` segment.
pub fn normalize_route(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or("");

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if matches!(segments.last(), Some(&"index") | Some(&"index.html")) {
        segments.pop();
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}
