//! Per-document scroll ratios.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::surface::Pane;

const UNTITLED_PREFIX: &str = "untitled:";

/// Identity of an open document.
///
/// Saved documents are keyed by path; unsaved ones get a synthetic
/// `untitled:<n>` identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum DocumentId {
    /// A document saved at a path
    Path(PathBuf),
    /// An unsaved document, numbered per session
    Untitled(u32),
}

impl DocumentId {
    /// Identity for a document backed by `path`.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Untitled(n) => write!(f, "{UNTITLED_PREFIX}{n}"),
        }
    }
}

impl FromStr for DocumentId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.strip_prefix(UNTITLED_PREFIX)
            .and_then(|n| n.parse().ok())
            .map_or_else(|| Self::Path(PathBuf::from(s)), Self::Untitled))
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(id) => id,
            Err(never) => match never {},
        }
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.to_string()
    }
}

/// Last known normalized scroll position of both panes for one document.
///
/// Both fields are kept in `[0, 1]`, including values loaded from storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredRatio")]
pub struct ScrollRatio {
    editor_ratio: f64,
    preview_ratio: f64,
}

/// Unchecked on-disk shape of [`ScrollRatio`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRatio {
    #[serde(default)]
    editor_ratio: f64,
    #[serde(default)]
    preview_ratio: f64,
}

impl From<StoredRatio> for ScrollRatio {
    fn from(stored: StoredRatio) -> Self {
        Self::new(stored.editor_ratio, stored.preview_ratio)
    }
}

fn clamp_ratio(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl ScrollRatio {
    /// Create a ratio pair, clamping both values.
    pub fn new(editor_ratio: f64, preview_ratio: f64) -> Self {
        Self {
            editor_ratio: clamp_ratio(editor_ratio),
            preview_ratio: clamp_ratio(preview_ratio),
        }
    }

    /// Editor pane ratio.
    pub const fn editor(&self) -> f64 {
        self.editor_ratio
    }

    /// Preview pane ratio.
    pub const fn preview(&self) -> f64 {
        self.preview_ratio
    }

    /// Ratio for `pane`.
    pub const fn get(&self, pane: Pane) -> f64 {
        match pane {
            Pane::Editor => self.editor_ratio,
            Pane::Preview => self.preview_ratio,
        }
    }

    /// Set the ratio for `pane`, leaving the other untouched.
    pub fn set(&mut self, pane: Pane, value: f64) {
        let value = clamp_ratio(value);
        match pane {
            Pane::Editor => self.editor_ratio = value,
            Pane::Preview => self.preview_ratio = value,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    ratio: ScrollRatio,
    touched: u64,
}

/// Scroll ratios for every document seen this session.
///
/// Unbounded by default. With a capacity, the least recently touched
/// document is evicted when a new one would exceed it.
#[derive(Debug, Clone, Default)]
pub struct ScrollRatioStore {
    entries: HashMap<DocumentId, Entry>,
    capacity: Option<usize>,
    clock: u64,
}

impl ScrollRatioStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding at most `capacity` documents (minimum 1).
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    /// Stored ratios for `id`.
    pub fn get(&self, id: &DocumentId) -> Option<ScrollRatio> {
        self.entries.get(id).map(|entry| entry.ratio)
    }

    /// Record one pane's ratio, creating the entry if needed.
    pub fn record(&mut self, id: &DocumentId, pane: Pane, value: f64) {
        let touched = self.tick();
        if let Some(entry) = self.entries.get_mut(id) {
            entry.ratio.set(pane, value);
            entry.touched = touched;
            return;
        }
        let mut ratio = ScrollRatio::default();
        ratio.set(pane, value);
        self.insert_new(id.clone(), ratio, touched);
    }

    /// Replace both ratios for `id`.
    pub fn insert(&mut self, id: DocumentId, ratio: ScrollRatio) {
        let touched = self.tick();
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.ratio = ratio;
            entry.touched = touched;
            return;
        }
        self.insert_new(id, ratio, touched);
    }

    /// Forget `id`.
    pub fn remove(&mut self, id: &DocumentId) -> Option<ScrollRatio> {
        self.entries.remove(id).map(|entry| entry.ratio)
    }

    /// Number of documents stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate stored documents in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&DocumentId, ScrollRatio)> {
        self.entries.iter().map(|(id, entry)| (id, entry.ratio))
    }

    const fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn insert_new(&mut self, id: DocumentId, ratio: ScrollRatio, touched: u64) {
        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity {
                let Some(oldest) = self
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.touched)
                    .map(|(id, _)| id.clone())
                else {
                    break;
                };
                tracing::debug!(document = %oldest, "evicting scroll ratio");
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(id, Entry { ratio, touched });
    }
}

impl Extend<(DocumentId, ScrollRatio)> for ScrollRatioStore {
    fn extend<I: IntoIterator<Item = (DocumentId, ScrollRatio)>>(&mut self, iter: I) {
        for (id, ratio) in iter {
            self.insert(id, ratio);
        }
    }
}
