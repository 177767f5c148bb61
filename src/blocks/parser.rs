//! Top-level tokenization with comrak.

use comrak::nodes::{LineColumn, NodeValue, Sourcepos};
use comrak::{Arena, Options, parse_document};

use super::types::{Token, TokenKind};

/// Splits source text into top-level structural tokens.
///
/// Implementations only need to report each token's literal source
/// fragment; the block mapper locates the fragments itself.
pub trait StructuralParser {
    /// Tokenize `source` into top-level tokens in document order.
    fn tokens(&self, source: &str) -> Vec<Token>;
}

impl<F> StructuralParser for F
where
    F: Fn(&str) -> Vec<Token>,
{
    fn tokens(&self, source: &str) -> Vec<Token> {
        self(source)
    }
}

/// The default parser, backed by comrak with GFM extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComrakParser;

impl StructuralParser for ComrakParser {
    fn tokens(&self, source: &str) -> Vec<Token> {
        let arena = Arena::new();
        let options = create_options();
        let root = parse_document(&arena, source, &options);
        let lines = LineIndex::new(source);

        root.children()
            .map(|node| {
                let ast = node.data.borrow();
                let kind = token_kind(&ast.value);
                match lines.slice(source, ast.sourcepos) {
                    Some(raw) => Token::new(kind, raw),
                    None => Token::without_raw(kind),
                }
            })
            .collect()
    }
}

fn create_options() -> Options {
    let mut options = Options::default();

    // Enable GFM extensions so tables and footnotes parse as single blocks
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.extension.footnotes = true;
    options.extension.description_lists = true;

    options
}

fn token_kind(value: &NodeValue) -> TokenKind {
    match value {
        NodeValue::Heading(heading) => TokenKind::Heading(heading.level),
        NodeValue::Paragraph => TokenKind::Paragraph,
        NodeValue::CodeBlock(_) => TokenKind::CodeBlock,
        NodeValue::List(_) | NodeValue::DescriptionList => TokenKind::List,
        NodeValue::BlockQuote => TokenKind::BlockQuote,
        NodeValue::HtmlBlock(_) => TokenKind::Html,
        NodeValue::ThematicBreak => TokenKind::ThematicBreak,
        NodeValue::Table(_) => TokenKind::Table,
        NodeValue::FootnoteDefinition(_) => TokenKind::FootnoteDefinition,
        _ => TokenKind::Other,
    }
}

/// Byte offsets of line starts, for turning comrak positions into offsets.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// Byte offset of a 1-based line/column position.
    ///
    /// `inclusive_end` converts comrak's inclusive end column into an
    /// exclusive offset. Column 0 (comrak's "end of previous line") maps to
    /// the start of the line.
    fn offset(&self, source: &str, pos: LineColumn, inclusive_end: bool) -> Option<usize> {
        let line_start = *self.starts.get(pos.line.checked_sub(1)?)?;
        let line_end = source[line_start..]
            .find('\n')
            .map_or(source.len(), |i| line_start + i);
        let offset = match (pos.column, inclusive_end) {
            (0, _) => line_start,
            (column, true) => line_start + column,
            (column, false) => line_start + column - 1,
        };
        Some(offset.min(line_end))
    }

    fn slice<'s>(&self, source: &'s str, pos: Sourcepos) -> Option<&'s str> {
        let start = self.offset(source, pos.start, false)?;
        let end = self.offset(source, pos.end, true)?;
        if start >= end {
            return None;
        }
        source.get(start..end)
    }
}
