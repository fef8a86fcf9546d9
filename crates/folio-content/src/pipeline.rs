//! Content transform pipeline.
//!
//! A pipeline is an ordered list of hooks. Each hook receives the full body
//! text and returns the full replacement. Hooks run one after another in
//! registration order, since a later hook may depend on an earlier one's
//! output.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

/// Error type returned by hook implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by a hook.
pub type HookFuture = Pin<Box<dyn Future<Output = Result<String, BoxError>> + Send>>;

type HookFn = Arc<dyn Fn(String) -> HookFuture + Send + Sync>;
type PathFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

#[derive(Clone)]
struct Hook {
    name: String,
    applies_to: Option<PathFilter>,
    run: HookFn,
}

/// A hook failed while transforming a file.
#[derive(Debug, thiserror::Error)]
#[error("Hook `{hook}` failed: {source}")]
pub struct HookError {
    pub hook: String,
    #[source]
    pub source: BoxError,
}

/// Ordered list of content transform hooks.
#[derive(Clone, Default)]
pub struct Pipeline {
    hooks: Vec<Hook>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a synchronous hook.
    pub fn then<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.push(
            name.into(),
            Arc::new(move |content| -> HookFuture {
                let out = f(content);
                Box::pin(async move { Ok::<_, BoxError>(out) })
            }),
        )
    }

    /// Append an asynchronous hook.
    pub fn then_async<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, BoxError>> + Send + 'static,
    {
        self.push(
            name.into(),
            Arc::new(move |content| -> HookFuture { Box::pin(f(content)) }),
        )
    }

    /// Restrict the most recently added hook to files whose path (relative
    /// to the pages root) satisfies `predicate`.
    pub fn only_for<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        if let Some(last) = self.hooks.last_mut() {
            last.applies_to = Some(Arc::new(predicate));
        }
        self
    }

    fn push(mut self, name: String, run: HookFn) -> Self {
        self.hooks.push(Hook {
            name,
            applies_to: None,
            run,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Hook names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(|h| h.name.as_str())
    }

    /// Run every applicable hook over `content`, in order.
    pub async fn run(&self, relative_path: &Path, content: String) -> Result<String, HookError> {
        let mut content = content;

        for hook in &self.hooks {
            if let Some(filter) = &hook.applies_to {
                if !filter(relative_path) {
                    continue;
                }
            }

            tracing::trace!(hook = %hook.name, path = %relative_path.display(), "running hook");

            content = (hook.run)(content).await.map_err(|source| HookError {
                hook: hook.name.clone(),
                source,
            })?;
        }

        Ok(content)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("hooks", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
