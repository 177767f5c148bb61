//! Memoised diagram rendering.
//!
//! Rendering a diagram definition to SVG is slow relative to a preview
//! refresh, and the same definition is rendered on every keystroke. The
//! cache keys rendered SVG by a hash of the definition, expires entries
//! after a fixed age, and bounds its size by evicting the oldest render.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use anyhow::{Context, Result};

/// Entries older than this are re-rendered.
pub const DEFAULT_MAX_AGE_MS: u64 = 5 * 60 * 1000;

/// Upper bound on cached renders.
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Turns a diagram definition into SVG.
pub trait DiagramRenderer {
    /// # Errors
    /// Returns an error if the definition cannot be parsed or laid out.
    fn render(&mut self, definition: &str) -> Result<String>;
}

impl<F> DiagramRenderer for F
where
    F: FnMut(&str) -> Result<String>,
{
    fn render(&mut self, definition: &str) -> Result<String> {
        self(definition)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    definition: String,
    svg: String,
    rendered_at: u64,
}

impl Entry {
    /// Served and kept while younger than `max_age_ms`.
    const fn is_fresh(&self, now_ms: u64, max_age_ms: u64) -> bool {
        now_ms.saturating_sub(self.rendered_at) < max_age_ms
    }
}

/// Snapshot of cache occupancy and effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently cached
    pub size: usize,
    /// Entry limit
    pub max_size: usize,
    /// Age after which an entry is re-rendered
    pub max_age_ms: u64,
    /// Renders served from the cache
    pub hits: u64,
    /// Renders that called the renderer
    pub misses: u64,
}

/// Render cache in front of a [`DiagramRenderer`].
pub struct DiagramCache<R> {
    renderer: R,
    entries: HashMap<u64, Entry>,
    max_age_ms: u64,
    max_entries: usize,
    hits: u64,
    misses: u64,
}

impl<R: DiagramRenderer> DiagramCache<R> {
    /// Create a cache with the default age and size limits.
    pub fn new(renderer: R) -> Self {
        Self::with_limits(renderer, DEFAULT_MAX_AGE_MS, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_limits(renderer: R, max_age_ms: u64, max_entries: usize) -> Self {
        Self {
            renderer,
            entries: HashMap::new(),
            max_age_ms,
            max_entries: max_entries.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// SVG for `definition`, rendering it if no fresh copy is cached.
    ///
    /// Failed renders are not cached.
    ///
    /// # Errors
    /// Returns the renderer's error.
    pub fn render(&mut self, definition: &str, now_ms: u64) -> Result<String> {
        let key = cache_key(definition);
        if let Some(entry) = self.entries.get(&key)
            && entry.definition == definition
            && entry.is_fresh(now_ms, self.max_age_ms)
        {
            self.hits += 1;
            return Ok(entry.svg.clone());
        }

        self.misses += 1;
        let _scope = crate::perf::scope("diagram.render");
        let svg = self
            .renderer
            .render(definition)
            .with_context(|| format!("failed to render diagram ({} bytes)", definition.len()))?;
        self.entries.insert(
            key,
            Entry {
                definition: definition.to_string(),
                svg: svg.clone(),
                rendered_at: now_ms,
            },
        );
        self.trim(now_ms);
        Ok(svg)
    }

    /// Drop expired entries, then the oldest until within the size bound.
    fn trim(&mut self, now_ms: u64) {
        let max_age_ms = self.max_age_ms;
        self.entries
            .retain(|_, entry| entry.is_fresh(now_ms, max_age_ms));

        while self.entries.len() > self.max_entries {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.rendered_at)
                .map(|(key, _)| *key)
            else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_entries,
            max_age_ms: self.max_age_ms,
            hits: self.hits,
            misses: self.misses,
        }
    }
}

fn cache_key(definition: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    definition.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counting_renderer(calls: &Rc<Cell<usize>>) -> impl FnMut(&str) -> Result<String> {
        let calls = Rc::clone(calls);
        move |definition: &str| {
            calls.set(calls.get() + 1);
            if definition.contains("syntax error") {
                bail!("parse error in diagram");
            }
            Ok(format!("<svg>{definition}</svg>"))
        }
    }

    #[test]
    fn test_repeat_render_hits_cache() {
        let calls = Rc::new(Cell::new(0));
        let mut cache = DiagramCache::new(counting_renderer(&calls));

        let first = cache.render("graph TD; A-->B", 0).unwrap();
        let second = cache.render("graph TD; A-->B", 1000).unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[test]
    fn test_expired_entry_is_rerendered() {
        let calls = Rc::new(Cell::new(0));
        let mut cache = DiagramCache::new(counting_renderer(&calls));

        cache.render("graph LR; X-->Y", 0).unwrap();
        cache.render("graph LR; X-->Y", DEFAULT_MAX_AGE_MS).unwrap();

        assert_eq!(calls.get(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_oldest_entry_evicted_beyond_limit() {
        let calls = Rc::new(Cell::new(0));
        let mut cache = DiagramCache::with_limits(counting_renderer(&calls), 60_000, 2);

        cache.render("a", 0).unwrap();
        cache.render("b", 10).unwrap();
        cache.render("c", 20).unwrap();
        assert_eq!(cache.len(), 2);

        // "a" was evicted, "c" is still cached
        cache.render("c", 30).unwrap();
        assert_eq!(calls.get(), 3);
        cache.render("a", 40).unwrap();
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_expired_entries_dropped_on_insert() {
        let calls = Rc::new(Cell::new(0));
        let mut cache = DiagramCache::with_limits(counting_renderer(&calls), 100, 10);
        cache.render("old", 0).unwrap();
        cache.render("new", 500).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_entry_at_age_limit_is_evicted_not_kept() {
        let calls = Rc::new(Cell::new(0));
        let mut cache = DiagramCache::with_limits(counting_renderer(&calls), 100, 10);
        cache.render("old", 0).unwrap();
        cache.render("new", 100).unwrap();
        assert_eq!(cache.len(), 1);

        cache.render("old", 100).unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_render_errors_propagate_and_are_not_cached() {
        let calls = Rc::new(Cell::new(0));
        let mut cache = DiagramCache::new(counting_renderer(&calls));

        let err = cache.render("syntax error here", 0).unwrap_err();
        assert!(format!("{err:#}").contains("parse error in diagram"));
        assert!(cache.is_empty());

        assert!(cache.render("syntax error here", 1).is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_clear_empties_cache() {
        let calls = Rc::new(Cell::new(0));
        let mut cache = DiagramCache::new(counting_renderer(&calls));
        cache.render("a", 0).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().max_size, DEFAULT_MAX_ENTRIES);
    }
}
