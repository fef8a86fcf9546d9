//! File watching for live updates.
//!
//! Raw notify events are filtered, collected into a [`PendingChangeSet`]
//! and flushed as one classified [`ChangeBatch`] once the debounce window
//! has been quiet.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use folio_content::{is_content_file, CancelToken};

/// Directory names never worth reacting to.
const METADATA_DIRS: &[&str] = &[".git", ".hg", ".svn", "node_modules", "target"];

/// Errors raised while setting up a watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchSetupError {
    #[error("Watch target {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("Failed to watch: {0}")]
    Notify(#[from] notify::Error),
}

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    /// Map a notify event kind, dropping noise such as metadata changes.
    pub fn from_event(kind: &EventKind) -> Option<Self> {
        use notify::event::ModifyKind;

        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Remove(_) => Some(Self::Removed),
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) => Some(Self::Modified),
            _ => None,
        }
    }
}

/// Bucket a changed file falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    /// Markdown pages
    Content,
    /// Stylesheets, swapped in place
    Style,
    /// Anything else forces a reload
    Other,
}

/// Classify a path by extension.
pub fn classify(path: &Path) -> ChangeClass {
    if is_content_file(path) {
        return ChangeClass::Content;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("css") => ChangeClass::Style,
        _ => ChangeClass::Other,
    }
}

/// Paths the watcher never reports.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    dirs: Vec<PathBuf>,
}

impl IgnoreRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore everything below `dir` (typically the build output).
    pub fn with_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        if let Ok(canonical) = dir.canonicalize() {
            if canonical != dir {
                self.dirs.push(canonical);
            }
        }
        self.dirs.push(normalize_path(dir));
        self
    }

    /// Whether `path` should be dropped.
    ///
    /// Hidden and metadata components are only checked below whichever
    /// root contains the path.
    pub fn is_ignored(&self, path: &Path, roots: &[PathBuf]) -> bool {
        if self.dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }

        let relative = roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);

        let in_metadata = relative.components().any(|c| match c {
            Component::Normal(name) => is_metadata_name(name),
            _ => false,
        });

        in_metadata || is_scratch_file(path)
    }
}

fn is_metadata_name(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name.starts_with('.') || METADATA_DIRS.contains(&&*name)
}

/// Source maps and editor temp files.
fn is_scratch_file(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    name.ends_with('~')
        || name.ends_with(".map")
        || name.ends_with(".swp")
        || name.ends_with(".swo")
        || name.ends_with(".tmp")
        || name.starts_with(".#")
}

/// Lexically resolve `.` and `..` components.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// A change waiting for the debounce window to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingChange {
    pub kind: ChangeKind,
    /// Milliseconds since the Unix epoch when the event was seen
    pub timestamp: u64,
}

/// Changes collected during one debounce window. Last write wins per path.
#[derive(Debug, Default)]
pub struct PendingChangeSet {
    changes: HashMap<PathBuf, PendingChange>,
    last_event: Option<Instant>,
}

impl PendingChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: PathBuf, kind: ChangeKind) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.changes.insert(path, PendingChange { kind, timestamp });
        self.last_event = Some(Instant::now());
    }

    pub fn get(&self, path: &Path) -> Option<&PendingChange> {
        self.changes.get(path)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// When the window closes, if anything is pending.
    pub fn deadline(&self, debounce: Duration) -> Option<Instant> {
        if self.changes.is_empty() {
            return None;
        }
        self.last_event.map(|t| t + debounce)
    }

    /// Drain the set, resetting the window.
    pub fn take(&mut self) -> HashMap<PathBuf, PendingChange> {
        self.last_event = None;
        std::mem::take(&mut self.changes)
    }
}

/// One changed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// A flushed window, partitioned by [`ChangeClass`]. Each bucket is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub content: Vec<Change>,
    pub styles: Vec<Change>,
    pub other: Vec<Change>,
}

impl ChangeBatch {
    pub fn from_changes(changes: HashMap<PathBuf, PendingChange>) -> Self {
        let mut batch = Self::default();

        for (path, pending) in changes {
            let bucket = match classify(&path) {
                ChangeClass::Content => &mut batch.content,
                ChangeClass::Style => &mut batch.styles,
                ChangeClass::Other => &mut batch.other,
            };
            bucket.push(Change {
                path,
                kind: pending.kind,
            });
        }

        for bucket in [&mut batch.content, &mut batch.styles, &mut batch.other] {
            bucket.sort_by(|a, b| a.path.cmp(&b.path));
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.content.len() + self.styles.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Watcher settings.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub targets: Vec<PathBuf>,
    pub ignore: IgnoreRules,
    pub debounce: Duration,
}

/// A running watch loop.
pub struct Watcher {
    targets: Vec<PathBuf>,
    cancel: CancelToken,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Start watching and call `on_flush` for every debounced batch.
    ///
    /// Missing targets are skipped with a warning. Flushes are serialised:
    /// the next window is not armed until `on_flush` completes.
    pub fn start<F, Fut>(
        config: WatchConfig,
        cancel: CancelToken,
        on_flush: F,
    ) -> Result<Self, WatchSetupError>
    where
        F: Fn(ChangeBatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        })?;

        let mut targets = Vec::new();
        for target in &config.targets {
            match watch_target(&mut watcher, target) {
                Ok(path) => {
                    tracing::debug!("Watching {}", path.display());
                    targets.push(path);
                }
                Err(e) => tracing::warn!("{}", e),
            }
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(watch_loop(
            events,
            shutdown_rx,
            watcher,
            targets.clone(),
            config.ignore,
            config.debounce,
            on_flush,
        ));

        Ok(Self {
            targets,
            cancel,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    /// Directories actually being watched.
    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Stop the loop and release the OS handles. Idempotent.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::error!("Watcher task failed: {}", e);
                }
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn watch_target(watcher: &mut RecommendedWatcher, target: &Path) -> Result<PathBuf, WatchSetupError> {
    if !target.exists() {
        return Err(WatchSetupError::Missing(target.to_path_buf()));
    }
    let path = target.canonicalize().unwrap_or_else(|_| normalize_path(target));
    watcher.watch(&path, RecursiveMode::Recursive)?;
    Ok(path)
}

async fn watch_loop<F, Fut>(
    mut events: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    mut shutdown: oneshot::Receiver<()>,
    watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
    ignore: IgnoreRules,
    debounce: Duration,
    on_flush: F,
) where
    F: Fn(ChangeBatch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    // Dropped when the loop exits, releasing the OS watches.
    let _watcher = watcher;
    let mut pending = PendingChangeSet::new();

    loop {
        let deadline = pending.deadline(debounce);

        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Some(Ok(event)) => record_event(&mut pending, &event, &roots, &ignore),
                Some(Err(e)) => tracing::warn!("Watch error: {}", e),
                None => break,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let batch = ChangeBatch::from_changes(pending.take());
                if !batch.is_empty() {
                    tracing::debug!(
                        "Flushing {} content, {} style, {} other changes",
                        batch.content.len(),
                        batch.styles.len(),
                        batch.other.len()
                    );
                    on_flush(batch).await;
                }
            }
        }
    }

    tracing::debug!("Watcher stopped");
}

fn record_event(
    pending: &mut PendingChangeSet,
    event: &notify::Event,
    roots: &[PathBuf],
    ignore: &IgnoreRules,
) {
    let Some(kind) = ChangeKind::from_event(&event.kind) else {
        return;
    };

    for path in &event.paths {
        let path = normalize_path(path);
        if ignore.is_ignored(&path, roots) {
            continue;
        }
        tracing::debug!("{:?}: {}", kind, path.display());
        pending.record(path, kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn changes(paths: &[&str]) -> HashMap<PathBuf, PendingChange> {
        paths
            .iter()
            .map(|p| {
                (
                    PathBuf::from(p),
                    PendingChange {
                        kind: ChangeKind::Modified,
                        timestamp: 0,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(classify(Path::new("pages/a.md")), ChangeClass::Content);
        assert_eq!(classify(Path::new("pages/a.mdx")), ChangeClass::Content);
        assert_eq!(classify(Path::new("public/site.css")), ChangeClass::Style);
        assert_eq!(classify(Path::new("public/app.js")), ChangeClass::Other);
        assert_eq!(classify(Path::new("layouts/page.html")), ChangeClass::Other);
    }

    #[test]
    fn ignores_noise() {
        let roots = vec![PathBuf::from("/site/.hidden-root")];
        let rules = IgnoreRules::new().with_dir("/site/.hidden-root/dist");
        let ignored = |p: &str| rules.is_ignored(Path::new(p), &roots);

        assert!(ignored("/site/.hidden-root/dist/index.html"));
        assert!(ignored("/site/.hidden-root/.git/HEAD"));
        assert!(ignored("/site/.hidden-root/node_modules/x/index.js"));
        assert!(ignored("/site/.hidden-root/pages/.draft.md"));
        assert!(ignored("/site/.hidden-root/public/app.js.map"));
        assert!(ignored("/site/.hidden-root/pages/a.md~"));
        assert!(ignored("/site/.hidden-root/pages/.a.md.swp"));
        assert!(ignored("/site/.hidden-root/pages/a.md.tmp"));

        assert!(!ignored("/site/.hidden-root/pages/a.md"));
        assert!(!ignored("/site/.hidden-root/public/site.css"));
        assert!(!ignored("/site/.hidden-root/distribution/a.md"));
    }

    #[test]
    fn ignores_metadata_change_events() {
        use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind};

        assert_eq!(
            ChangeKind::from_event(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            ChangeKind::from_event(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeKind::Removed)
        );
        assert_eq!(
            ChangeKind::from_event(&EventKind::Modify(ModifyKind::Any)),
            Some(ChangeKind::Modified)
        );
        assert_eq!(
            ChangeKind::from_event(&EventKind::Modify(ModifyKind::Metadata(
                MetadataKind::WriteTime
            ))),
            None
        );
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(
            normalize_path(Path::new("/a/./b/../c.md")),
            PathBuf::from("/a/c.md")
        );
    }

    #[test]
    fn last_write_wins() {
        let mut pending = PendingChangeSet::new();
        pending.record(PathBuf::from("a.md"), ChangeKind::Created);
        pending.record(PathBuf::from("a.md"), ChangeKind::Removed);

        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending.get(Path::new("a.md")).unwrap().kind,
            ChangeKind::Removed
        );
        assert!(pending.deadline(Duration::from_millis(100)).is_some());

        pending.take();
        assert!(pending.is_empty());
        assert!(pending.deadline(Duration::from_millis(100)).is_none());
    }

    #[test]
    fn partitions_batch() {
        let batch = ChangeBatch::from_changes(changes(&[
            "p/b.md",
            "p/a.md",
            "s/site.css",
            "l/page.html",
        ]));

        let content: Vec<_> = batch.content.iter().map(|c| c.path.clone()).collect();
        assert_eq!(content, vec![PathBuf::from("p/a.md"), PathBuf::from("p/b.md")]);
        assert_eq!(batch.styles.len(), 1);
        assert_eq!(batch.other.len(), 1);
        assert_eq!(batch.len(), 4);
    }

    fn start_collecting(
        root: &Path,
        debounce: Duration,
    ) -> (Watcher, mpsc::UnboundedReceiver<ChangeBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = WatchConfig {
            targets: vec![root.to_path_buf()],
            ignore: IgnoreRules::new(),
            debounce,
        };
        let watcher = Watcher::start(config, CancelToken::new(), move |batch| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(batch);
            }
        })
        .unwrap();
        (watcher, rx)
    }

    #[tokio::test]
    async fn flushes_debounced_batch() {
        let temp = tempdir().unwrap();
        let (mut watcher, mut rx) = start_collecting(temp.path(), Duration::from_millis(200));

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(temp.path().join("a.md"), "# A").unwrap();
        fs::write(temp.path().join("b.md"), "# B").unwrap();
        fs::write(temp.path().join("site.css"), "body{}").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for flush")
            .expect("channel closed");

        assert_eq!(batch.content.len(), 2);
        assert_eq!(batch.styles.len(), 1);

        watcher.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_silences_flushes() {
        let temp = tempdir().unwrap();
        let (mut watcher, mut rx) = start_collecting(temp.path(), Duration::from_millis(50));

        watcher.stop().await;
        watcher.stop().await;
        assert!(!watcher.is_running());

        fs::write(temp.path().join("late.md"), "# Late").unwrap();

        // the handler was dropped with the loop, so the channel ends
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(matches!(next, Ok(None)));
    }

    #[tokio::test]
    async fn skips_missing_targets() {
        let temp = tempdir().unwrap();
        let config = WatchConfig {
            targets: vec![temp.path().join("missing"), temp.path().to_path_buf()],
            ignore: IgnoreRules::new(),
            debounce: Duration::from_millis(50),
        };

        let mut watcher = Watcher::start(config, CancelToken::new(), |_| async {}).unwrap();

        assert_eq!(watcher.targets().len(), 1);
        watcher.stop().await;
    }
}
