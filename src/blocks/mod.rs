//! Source-to-block mapping.
//!
//! This module handles:
//! - Splitting markdown source into top-level tokens (comrak by default)
//! - Locating each token's literal fragment in the source
//! - Producing an ordered [`BlockTable`] for scroll alignment
//!
//! The table is advisory: it only refines scroll positions, so mapping never
//! fails. A fragment that cannot be located is skipped.

mod parser;
mod types;

pub use parser::{ComrakParser, StructuralParser};
pub use types::{BlockSpan, BlockTable, Token, TokenKind};

/// Compute the block table for `source` using the default comrak parser.
///
/// # Example
///
/// ```
/// use marksync::blocks::compute_blocks;
///
/// let source = "# Hello\n\nWorld\n";
/// let table = compute_blocks(source);
/// let first = table.get(0).unwrap();
/// assert_eq!(&source[first.range()], "# Hello");
/// ```
pub fn compute_blocks(source: &str) -> BlockTable {
    compute_blocks_with(&ComrakParser, source)
}

/// Compute the block table for `source` using `parser`.
///
/// Each token's literal fragment is searched for starting at the end of the
/// previously located fragment, so spans come out in source order and repeated
/// identical blocks map to successive occurrences.
pub fn compute_blocks_with<P>(parser: &P, source: &str) -> BlockTable
where
    P: StructuralParser + ?Sized,
{
    let _scope = crate::perf::scope("blocks.compute");
    let tokens = parser.tokens(source);
    let mut spans = Vec::with_capacity(tokens.len());
    let mut cursor = 0;
    let mut skipped = 0usize;

    for token in &tokens {
        let Some(raw) = token.raw.as_deref().filter(|raw| !raw.is_empty()) else {
            continue;
        };
        let Some(found) = source.get(cursor..).and_then(|rest| rest.find(raw)) else {
            skipped += 1;
            tracing::trace!(kind = ?token.kind, cursor, "block fragment not found after cursor");
            continue;
        };
        let start = cursor + found;
        let end = start + raw.len();
        spans.push(BlockSpan {
            start,
            end,
            index: spans.len(),
        });
        cursor = end;
    }

    crate::perf::log_event(
        "blocks.compute",
        format!(
            "tokens={} spans={} skipped={skipped} bytes={}",
            tokens.len(),
            spans.len(),
            source.len()
        ),
    );
    BlockTable::from(spans)
}
