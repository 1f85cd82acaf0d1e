//! Expression resolution cache and per-extension evaluator lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::value::{ExpressionEvaluator, NameResolvingEvaluator};

/// Returns the evaluator for a file extension such as `.cs`, if any.
pub type EvaluatorProvider =
    Arc<dyn Fn(&str) -> Option<Arc<dyn ExpressionEvaluator>> + Send + Sync>;

/// Resolved expressions keyed by `"{expression} {location}"`.
///
/// Failed resolutions are cached as `None`. Entries live as long as the session.
#[derive(Default)]
pub(crate) struct ExpressionCache {
    entries: Mutex<HashMap<String, Option<String>>>,
}

impl ExpressionCache {
    /// Look up `key`, running `resolve` without the lock on a miss.
    ///
    /// When two threads race on the same key the first stored answer wins.
    pub(crate) fn get_or_resolve(
        &self,
        key: String,
        resolve: impl FnOnce() -> Option<String>,
    ) -> Option<String> {
        if let Some(hit) = self.entries.lock().get(&key) {
            return hit.clone();
        }
        let resolved = resolve();
        self.entries.lock().entry(key).or_insert(resolved).clone()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Evaluator lookup memoized per file extension, including misses.
pub(crate) struct EvaluatorRegistry {
    provider: RwLock<Option<EvaluatorProvider>>,
    by_extension: Mutex<HashMap<String, Option<Arc<dyn ExpressionEvaluator>>>>,
    fallback: Arc<dyn ExpressionEvaluator>,
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self {
            provider: RwLock::new(None),
            by_extension: Mutex::new(HashMap::new()),
            fallback: Arc::new(NameResolvingEvaluator),
        }
    }
}

impl EvaluatorRegistry {
    pub(crate) fn set_provider(&self, provider: Option<EvaluatorProvider>) {
        *self.provider.write() = provider;
        self.by_extension.lock().clear();
    }

    pub(crate) fn find(&self, extension: Option<&str>) -> Option<Arc<dyn ExpressionEvaluator>> {
        let provider = self.provider.read().clone()?;
        let extension = extension.filter(|ext| !ext.is_empty())?;
        if let Some(known) = self.by_extension.lock().get(extension) {
            return known.clone();
        }
        let found = provider(extension);
        self.by_extension
            .lock()
            .entry(extension.to_string())
            .or_insert(found)
            .clone()
    }

    pub(crate) fn evaluator(&self, extension: Option<&str>) -> Arc<dyn ExpressionEvaluator> {
        self.find(extension)
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}
