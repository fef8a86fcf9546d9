//! Route table generation.
//!
//! Walks the pages root, processes every content file and assembles an
//! immutable [`RouteTable`]. A file that fails to process is logged and
//! skipped; its siblings are still processed.

use std::collections::btree_map::{self, BTreeMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::locale::LocalizationIndex;
use crate::pipeline::Pipeline;
use crate::processor::{process_file, process_file_with, ContentParseError, ContentRecord};
use crate::route::{is_content_file, normalize_route};

/// Mapping from route to content record. Exactly one record per route.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    records: BTreeMap<String, ContentRecord>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record by request path. `/blog` and `/blog/` resolve alike.
    pub fn get(&self, path: &str) -> Option<&ContentRecord> {
        self.records.get(&normalize_route(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Find the record generated from `source_path`.
    pub fn find_by_source(&self, source_path: &Path) -> Option<&ContentRecord> {
        self.records.values().find(|r| r.source_path == source_path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Routes in sorted order.
    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Records in route order.
    pub fn records(&self) -> impl Iterator<Item = &ContentRecord> {
        self.records.values()
    }

    /// Insert unless the route is already claimed.
    fn claim(&mut self, record: ContentRecord) -> Result<&ContentRecord, ContentParseError> {
        match self.records.entry(record.route.clone()) {
            btree_map::Entry::Vacant(slot) => Ok(slot.insert(record)),
            btree_map::Entry::Occupied(existing) => Err(ContentParseError::DuplicateRoute {
                path: record.source_path,
                route: record.route,
                existing: existing.get().source_path.clone(),
            }),
        }
    }
}

/// Result of a generation pass.
#[derive(Debug, Default)]
pub struct GeneratedRoutes {
    /// The new table
    pub table: RouteTable,

    /// Files that were skipped
    pub failures: Vec<ContentParseError>,
}

/// Errors that abort a generation pass.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Pages directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Route generation was cancelled")]
    Cancelled,

    #[error("Directory walk failed: {0}")]
    Walk(String),
}

/// Shared flag used to abort an in-flight generation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Generate a route table without transform hooks.
pub fn generate_routes(root: &Path) -> Result<GeneratedRoutes, RouterError> {
    let root = resolve_root(root)?;
    let files = discover(&root, &CancelToken::new())?;

    let mut generated = GeneratedRoutes::default();
    for file in files {
        match process_file(&file, &root) {
            Ok(record) => accept(&mut generated, record, None),
            Err(e) => reject(&mut generated, e),
        }
    }

    log_summary(&root, &generated);
    Ok(generated)
}

/// Generate a route table, threading content through `pipeline` and
/// registering each record with the localization extension, if any.
///
/// The localization extension is a side channel: its failures are logged
/// and never change the table.
pub async fn generate_routes_with(
    root: &Path,
    pipeline: &Pipeline,
    localization: Option<&dyn LocalizationIndex>,
    cancel: &CancelToken,
) -> Result<GeneratedRoutes, RouterError> {
    let root = resolve_root(root)?;

    let walk_root = root.clone();
    let walk_cancel = cancel.clone();
    let files = tokio::task::spawn_blocking(move || discover(&walk_root, &walk_cancel))
        .await
        .map_err(|e| RouterError::Walk(e.to_string()))??;

    if let Some(index) = localization {
        index.reset();
    }

    let mut generated = GeneratedRoutes::default();
    for file in files {
        if cancel.is_cancelled() {
            return Err(RouterError::Cancelled);
        }
        match process_file_with(&file, &root, pipeline).await {
            Ok(record) => accept(&mut generated, record, localization),
            Err(e) => reject(&mut generated, e),
        }
    }

    log_summary(&root, &generated);
    Ok(generated)
}

fn resolve_root(root: &Path) -> Result<PathBuf, RouterError> {
    if !root.is_dir() {
        return Err(RouterError::RootNotFound(root.to_path_buf()));
    }
    Ok(root.canonicalize().unwrap_or_else(|_| root.to_path_buf()))
}

/// Enumerate content files under `root`, sorted by path.
fn discover(root: &Path, cancel: &CancelToken) -> Result<Vec<PathBuf>, RouterError> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker {
        if cancel.is_cancelled() {
            return Err(RouterError::Cancelled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if entry.file_type().is_file() && is_content_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

fn accept(
    generated: &mut GeneratedRoutes,
    record: ContentRecord,
    localization: Option<&dyn LocalizationIndex>,
) {
    let error = match generated.table.claim(record) {
        Ok(record) => {
            tracing::debug!("Route {} <- {}", record.route, record.source_path.display());
            if let Some(index) = localization {
                if let Err(e) = index.register(record) {
                    tracing::warn!("Localization index rejected {}: {}", record.route, e);
                }
            }
            return;
        }
        Err(e) => e,
    };
    reject(generated, error);
}

fn reject(generated: &mut GeneratedRoutes, error: ContentParseError) {
    tracing::warn!("Skipping {}", error);
    generated.failures.push(error);
}

fn log_summary(root: &Path, generated: &GeneratedRoutes) {
    tracing::info!(
        "Generated {} routes from {} ({} skipped)",
        generated.table.len(),
        root.display(),
        generated.failures.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::LocaleIndex;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn site(files: &[(&str, &str)]) -> TempDir {
        let temp = tempdir().unwrap();
        for (path, content) in files {
            let full = temp.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        temp
    }

    fn blog_site() -> TempDir {
        site(&[
            ("index.md", "---\ntitle: Home\n---\n# Home"),
            ("about.md", "---\ntitle: About\n---\n# About"),
            ("blog/index.md", "---\ntitle: Blog\n---\n# Blog"),
            ("blog/post1.md", "---\ntitle: Post 1\n---\nFirst TODO"),
            ("blog/post2.mdx", "---\ntitle: Post 2\n---\nSecond"),
        ])
    }

    #[test]
    fn builds_route_table_for_blog() {
        let temp = blog_site();

        let generated = generate_routes(temp.path()).unwrap();
        let table = &generated.table;

        assert!(generated.failures.is_empty());
        assert_eq!(
            table.routes().collect::<Vec<_>>(),
            vec!["/", "/about", "/blog", "/blog/post1", "/blog/post2"]
        );
        assert_eq!(table.get("/").unwrap().title(), Some("Home"));
        assert_eq!(table.get("/about").unwrap().title(), Some("About"));
        assert_eq!(table.get("/blog").unwrap().title(), Some("Blog"));
        assert_eq!(table.get("/blog/post1").unwrap().title(), Some("Post 1"));
        assert_eq!(table.get("/blog/post2").unwrap().title(), Some("Post 2"));
    }

    #[test]
    fn trailing_slash_resolves_both_ways() {
        let temp = blog_site();
        let table = generate_routes(temp.path()).unwrap().table;

        assert!(table.contains("/blog"));
        assert!(table.contains("/blog/"));
        assert!(table.contains("/about/"));
        assert_eq!(
            table.get("/blog/").unwrap().route,
            table.get("/blog").unwrap().route
        );
    }

    #[test]
    fn key_count_matches_content_file_count() {
        let temp = site(&[
            ("a.md", "a"),
            ("b.mdx", "b"),
            ("x/y/z.md", "z"),
            ("x/index.md", "x"),
            ("x/y/index.mdx", "y"),
        ]);

        let table = generate_routes(temp.path()).unwrap().table;

        assert_eq!(table.len(), 5);
        let mut routes: Vec<_> = table.routes().collect();
        routes.dedup();
        assert_eq!(routes.len(), 5);
    }

    #[test]
    fn ignores_non_content_hidden_and_empty_dirs() {
        let temp = site(&[
            ("index.md", "home"),
            ("style.css", "body {}"),
            ("notes.txt", "nope"),
            (".drafts/secret.md", "hidden"),
        ]);
        fs::create_dir_all(temp.path().join("empty/deeper")).unwrap();

        let table = generate_routes(temp.path()).unwrap().table;

        assert_eq!(table.routes().collect::<Vec<_>>(), vec!["/"]);
    }

    #[test]
    fn bad_file_does_not_abort_siblings() {
        let temp = site(&[
            ("good.md", "---\ntitle: Good\n---\nok"),
            ("bad.md", "---\ntitle: [broken\n---\nbad"),
            ("unclosed.md", "---\ntitle: x\nno end"),
        ]);

        let generated = generate_routes(temp.path()).unwrap();

        assert_eq!(generated.table.routes().collect::<Vec<_>>(), vec!["/good"]);
        assert_eq!(generated.failures.len(), 2);
    }

    #[test]
    fn duplicate_route_keeps_first_claimant() {
        let temp = site(&[
            ("about.md", "---\ntitle: Markdown\n---\n"),
            ("about.mdx", "---\ntitle: MDX\n---\n"),
        ]);

        let generated = generate_routes(temp.path()).unwrap();

        assert_eq!(generated.table.len(), 1);
        assert_eq!(generated.table.get("/about").unwrap().title(), Some("Markdown"));
        assert!(matches!(
            generated.failures.as_slice(),
            [ContentParseError::DuplicateRoute { route, .. }] if route == "/about"
        ));
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempdir().unwrap();

        let result = generate_routes(&temp.path().join("missing"));

        assert!(matches!(result, Err(RouterError::RootNotFound(_))));
    }

    #[test]
    fn finds_record_by_source() {
        let temp = blog_site();
        let table = generate_routes(temp.path()).unwrap().table;
        let source = temp.path().canonicalize().unwrap().join("blog/post1.md");

        assert_eq!(table.find_by_source(&source).unwrap().route, "/blog/post1");
    }

    #[tokio::test]
    async fn hook_output_only_reaches_touched_routes() {
        let temp = blog_site();
        let pipeline = Pipeline::new().then("todo", |s| s.replace("TODO", "<mark>todo</mark>"));

        let generated = generate_routes_with(temp.path(), &pipeline, None, &CancelToken::new())
            .await
            .unwrap();

        for record in generated.table.records() {
            let touched = record.rendered_markup.contains("<mark>todo</mark>");
            assert_eq!(touched, record.route == "/blog/post1", "{}", record.route);
        }
    }

    #[tokio::test]
    async fn async_variant_matches_sync_routes() {
        let temp = blog_site();

        let sync_table = generate_routes(temp.path()).unwrap().table;
        let async_table =
            generate_routes_with(temp.path(), &Pipeline::new(), None, &CancelToken::new())
                .await
                .unwrap()
                .table;

        assert_eq!(
            sync_table.routes().collect::<Vec<_>>(),
            async_table.routes().collect::<Vec<_>>()
        );
        for record in sync_table.records() {
            assert_eq!(Some(record), async_table.get(&record.route));
        }
    }

    #[tokio::test]
    async fn registers_records_with_localization_index() {
        let temp = site(&[
            ("index.md", "---\ntitle: Home\n---\n"),
            ("fr/index.md", "---\ntitle: Accueil\nlang: fr\n---\n"),
        ]);
        let index = LocaleIndex::new("en");

        let generated = generate_routes_with(
            temp.path(),
            &Pipeline::new(),
            Some(&index),
            &CancelToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(generated.table.len(), 2);
        assert_eq!(index.routes_for("en"), vec!["/".to_string()]);
        assert_eq!(index.routes_for("fr"), vec!["/fr".to_string()]);
    }

    #[tokio::test]
    async fn cancelled_generation_stops() {
        let temp = blog_site();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = generate_routes_with(temp.path(), &Pipeline::new(), None, &cancel).await;

        assert!(matches!(result, Err(RouterError::Cancelled)));
    }
}
