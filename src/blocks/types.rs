//! Block table types.

use std::ops::Range;
use std::sync::Arc;

/// One top-level structural unit of the source document.
///
/// `start..end` is a half-open byte range into the source text the table
/// was computed from; `index` is the span's position in its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockSpan {
    /// Byte offset of the first byte of the block
    pub start: usize,
    /// Byte offset one past the last byte of the block
    pub end: usize,
    /// Dense 0-based position in the table
    pub index: usize,
}

impl BlockSpan {
    /// The span as a byte range.
    pub const fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Length of the span in bytes.
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the span covers no bytes.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `offset` falls inside the span.
    pub const fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// An immutable, ordered table of block spans.
///
/// Tables are never edited: every source change produces a new table that
/// replaces the old one. Cloning is cheap (shared storage), so readers such
/// as the scroll synchronizer can hold their own copy until the next rebuild.
///
/// # Example
///
/// ```
/// use marksync::blocks::compute_blocks;
///
/// let table = compute_blocks("# Title\n\nBody text\n");
/// assert_eq!(table.len(), 2);
/// assert_eq!(table.nearest_to(12).map(|b| b.index), Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTable {
    spans: Arc<[BlockSpan]>,
}

impl BlockTable {
    /// Create an empty table.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Returns true if the table has no blocks.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Get a block by index.
    pub fn get(&self, index: usize) -> Option<&BlockSpan> {
        self.spans.get(index)
    }

    /// Iterate blocks in source order.
    pub fn iter(&self) -> std::slice::Iter<'_, BlockSpan> {
        self.spans.iter()
    }

    /// All spans as a slice.
    pub fn as_slice(&self) -> &[BlockSpan] {
        &self.spans
    }

    /// The block whose `start` is closest to `offset`.
    ///
    /// Ties go to the earlier block. Returns `None` for an empty table.
    pub fn nearest_to(&self, offset: usize) -> Option<&BlockSpan> {
        // First block starting after `offset`; the nearest is it or its predecessor.
        let after = self.spans.partition_point(|span| span.start <= offset);
        let before = after.checked_sub(1).and_then(|i| self.spans.get(i));
        let next = self.spans.get(after);
        match (before, next) {
            (Some(b), Some(n)) => {
                if offset - b.start <= n.start - offset {
                    Some(b)
                } else {
                    Some(n)
                }
            }
            (Some(b), None) => Some(b),
            (None, n) => n,
        }
    }

    /// The block containing `offset`, if any.
    pub fn block_at(&self, offset: usize) -> Option<&BlockSpan> {
        let after = self.spans.partition_point(|span| span.start <= offset);
        after
            .checked_sub(1)
            .and_then(|i| self.spans.get(i))
            .filter(|span| span.contains(offset))
    }

    /// Position of block `index` through the document, in `[0, 1]`.
    ///
    /// Computed as `index / max(1, len - 1)`, so the first block is 0 and the
    /// last is 1. A single-block table maps its only block to 0.
    pub fn fractional_position(&self, index: usize) -> f64 {
        let denominator = self.len().saturating_sub(1).max(1);
        (index.min(denominator) as f64 / denominator as f64).clamp(0.0, 1.0)
    }
}

impl From<Vec<BlockSpan>> for BlockTable {
    fn from(spans: Vec<BlockSpan>) -> Self {
        Self {
            spans: spans.into(),
        }
    }
}

impl<'a> IntoIterator for &'a BlockTable {
    type Item = &'a BlockSpan;
    type IntoIter = std::slice::Iter<'a, BlockSpan>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Kind tag reported by a structural parser.
///
/// The mapper never interprets it; it is carried for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Heading(u8),
    Paragraph,
    CodeBlock,
    List,
    BlockQuote,
    Html,
    ThematicBreak,
    Table,
    FootnoteDefinition,
    Other,
}

/// One top-level token from a structural parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What kind of block the parser saw
    pub kind: TokenKind,
    /// Literal source fragment, when the parser can report one
    pub raw: Option<String>,
}

impl Token {
    /// Create a token carrying a literal fragment.
    pub fn new(kind: TokenKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: Some(raw.into()),
        }
    }

    /// Create a token with no literal fragment.
    pub const fn without_raw(kind: TokenKind) -> Self {
        Self { kind, raw: None }
    }
}
