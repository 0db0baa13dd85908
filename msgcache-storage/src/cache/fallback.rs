//! Fallback chain resolution.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use msgcache_core::{FallbackChain, LanguageCode};

use super::traits::FallbackGraph;

/// Resolves the languages probed for a requested language.
///
/// The graph is walked depth-first from the requested language, so a
/// fallback's own fallbacks come before the next sibling. A language reached
/// twice keeps its first position. Resolved chains are memoized until
/// [`clear`](Self::clear).
pub struct FallbackResolver {
    graph: Arc<dyn FallbackGraph>,
    content_language: LanguageCode,
    memo: RwLock<HashMap<LanguageCode, FallbackChain>>,
}

impl FallbackResolver {
    pub fn new(graph: Arc<dyn FallbackGraph>, content_language: LanguageCode) -> Self {
        Self {
            graph,
            content_language,
            memo: RwLock::new(HashMap::new()),
        }
    }

    pub fn content_language(&self) -> &LanguageCode {
        &self.content_language
    }

    /// Chain for `lang`: `lang` first, graph fallbacks next, content language last.
    pub fn chain_for(&self, lang: &LanguageCode) -> FallbackChain {
        if let Some(chain) = self.memo.read().ok().and_then(|memo| memo.get(lang).cloned()) {
            return chain;
        }

        let chain = FallbackChain::build(lang, self.expand(lang), &self.content_language);
        if let Ok(mut memo) = self.memo.write() {
            memo.insert(lang.clone(), chain.clone());
        }
        chain
    }

    /// Forget memoized chains, e.g. after the graph changed.
    pub fn clear(&self) {
        if let Ok(mut memo) = self.memo.write() {
            memo.clear();
        }
    }

    fn expand(&self, lang: &LanguageCode) -> Vec<LanguageCode> {
        let mut seen = HashSet::from([lang.clone()]);
        let mut order = Vec::new();
        let mut stack: Vec<LanguageCode> = self.graph.fallbacks_for(lang).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            stack.extend(self.graph.fallbacks_for(&next).into_iter().rev());
            order.push(next);
        }
        order
    }
}

impl std::fmt::Debug for FallbackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackResolver")
            .field("content_language", &self.content_language)
            .finish_non_exhaustive()
    }
}
