//! Registry of background refresh functions, keyed by exact key or wildcard
//! prefix pattern (`"customer:*"`).

use futures::future::BoxFuture;
use hashbrown::HashMap;
use riskgate_core::RiskError;
use std::sync::Arc;

/// Asynchronous loader invoked to refresh an aging entry. Receives the cache
/// key and produces a fresh value.
pub type RefreshFn<V> =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<V, RiskError>> + Send + Sync>;

pub(crate) struct RefreshRegistry<V> {
    exact: HashMap<String, RefreshFn<V>>,
    prefixes: Vec<(String, RefreshFn<V>)>,
}

impl<V> RefreshRegistry<V> {
    pub(crate) fn new() -> Self {
        Self {
            exact: HashMap::new(),
            prefixes: Vec::new(),
        }
    }

    /// Registers `f` for `pattern`. A trailing `*` makes the pattern a
    /// prefix match; anything else is an exact key. Re-registering a pattern
    /// replaces the previous function.
    pub(crate) fn register(&mut self, pattern: &str, f: RefreshFn<V>) {
        if let Some(prefix) = pattern.strip_suffix('*') {
            if let Some(existing) = self.prefixes.iter_mut().find(|(p, _)| p == prefix) {
                existing.1 = f;
            } else {
                self.prefixes.push((prefix.to_string(), f));
            }
        } else {
            self.exact.insert(pattern.to_string(), f);
        }
    }

    /// Finds the refresh function for `key` and the pattern it matched.
    /// Exact matches win over prefixes; among prefixes the longest wins.
    pub(crate) fn lookup(&self, key: &str) -> Option<(String, RefreshFn<V>)> {
        if let Some(f) = self.exact.get(key) {
            return Some((key.to_string(), Arc::clone(f)));
        }
        self.prefixes
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, f)| (format!("{prefix}*"), Arc::clone(f)))
    }
}
