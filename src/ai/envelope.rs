//! Decoding of relayed stream events into text pieces.

use serde_json::Value;

/// Prefix every relayed data event carries.
pub const DATA_PREFIX: &str = "data:";

/// Terminal marker closing a stream.
pub const DONE_MARKER: &str = "[DONE]";

/// What one relayed event means to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text to append.
    Piece(String),
    /// The stream is complete.
    Done,
    /// Nothing displayable: control frames, blank payloads, malformed JSON.
    Skip,
}

/// The partial-completion shapes upstream providers send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// `choices[0].delta.content`
    OpenAiDelta { content: String },
    /// `delta.text`
    AnthropicDelta { text: String },
    /// `content_block.text`, else `content[0].text`
    ContentBlock { text: String },
}

impl Envelope {
    /// Recognise `value`, trying each shape in fixed priority order.
    ///
    /// The first shape whose field holds a string wins, even an empty one.
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(content) = str_at(value, "/choices/0/delta/content") {
            return Some(Self::OpenAiDelta { content });
        }
        if let Some(text) = str_at(value, "/delta/text") {
            return Some(Self::AnthropicDelta { text });
        }
        str_at(value, "/content_block/text")
            .filter(|text| !text.is_empty())
            .or_else(|| str_at(value, "/content/0/text"))
            .map(|text| Self::ContentBlock { text })
    }

    /// The carried text.
    pub fn piece(&self) -> &str {
        match self {
            Self::OpenAiDelta { content } => content,
            Self::AnthropicDelta { text } | Self::ContentBlock { text } => text,
        }
    }

    pub fn into_piece(self) -> String {
        match self {
            Self::OpenAiDelta { content } => content,
            Self::AnthropicDelta { text } | Self::ContentBlock { text } => text,
        }
    }
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

/// Classify one relayed event.
///
/// Anything that is not a `data:` event carrying a recognised, non-empty
/// piece is [`Frame::Skip`].
///
/// ```
/// use marksync::ai::{Frame, parse_frame};
///
/// let frame = parse_frame(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#);
/// assert_eq!(frame, Frame::Piece("Hi".to_string()));
/// assert_eq!(parse_frame("data: [DONE]"), Frame::Done);
/// assert_eq!(parse_frame("event: ping"), Frame::Skip);
/// ```
pub fn parse_frame(payload: &str) -> Frame {
    let Some(data) = payload.trim().strip_prefix(DATA_PREFIX) else {
        return Frame::Skip;
    };
    let data = data.trim();
    if data == DONE_MARKER {
        return Frame::Done;
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => {
            tracing::trace!(%err, "skipping unparsable stream frame");
            return Frame::Skip;
        }
    };
    match Envelope::from_value(&value) {
        Some(envelope) if !envelope.piece().is_empty() => Frame::Piece(envelope.into_piece()),
        _ => Frame::Skip,
    }
}
