//! Public file lookup and HTML script injection.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::protocol::CLIENT_SCRIPT_PATH;

/// Map a request path onto a file under `root`.
///
/// Directories resolve to their `index.html`. Paths escaping `root` never
/// resolve.
pub fn resolve_public(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let mut path = root.to_path_buf();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if path.is_file() {
        return Some(path);
    }

    let index = path.join("index.html");
    index.is_file().then_some(index)
}

/// Content type for a served file.
pub fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}

pub fn is_html(path: &Path) -> bool {
    content_type(path).starts_with("text/html")
}

fn closing_tag(tag: &str) -> &'static Regex {
    static HEAD: OnceLock<Regex> = OnceLock::new();
    static BODY: OnceLock<Regex> = OnceLock::new();

    let (cell, pattern) = match tag {
        "head" => (&HEAD, r"(?i)</head\s*>"),
        _ => (&BODY, r"(?i)</body\s*>"),
    };
    cell.get_or_init(|| Regex::new(pattern).expect("valid closing tag pattern"))
}

/// Insert `script` into an HTML document.
///
/// The tag goes before `</head>`, else before `</body>`, else at the end.
/// Documents that already reference the client script are left alone.
pub fn inject_script<'a>(html: &'a str, script: &str) -> Cow<'a, str> {
    if html.contains(CLIENT_SCRIPT_PATH) {
        return Cow::Borrowed(html);
    }

    let position = closing_tag("head")
        .find(html)
        .or_else(|| closing_tag("body").find_iter(html).last())
        .map(|m| m.start());

    let mut result = String::with_capacity(html.len() + script.len() + 1);
    match position {
        Some(pos) => {
            result.push_str(&html[..pos]);
            result.push_str(script);
            result.push('\n');
            result.push_str(&html[pos..]);
        }
        None => {
            result.push_str(html);
            result.push('\n');
            result.push_str(script);
        }
    }
    Cow::Owned(result)
}
