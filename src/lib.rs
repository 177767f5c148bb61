// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. ai::AiError)
    clippy::module_name_repetitions
)]

//! # Marksync
//!
//! The interaction core of a split-pane markdown editor.
//!
//! Marksync keeps an editor and its rendered preview in step and streams AI
//! completions into the editor:
//! - Block mapping from markdown source to top-level structural blocks
//! - Scroll synchronization between editor and preview, free of feedback loops
//! - Streaming completion aggregation with throttled, ordered display updates
//! - A render cache for diagram previews
//!
//! ## Architecture
//!
//! Everything runs on the host's single UI event loop. Components never read
//! the clock or spawn threads; the host passes `now_ms` into every call and
//! polls each component's `next_deadline()` to know when to call back.
//!
//! ## Modules
//!
//! - [`blocks`]: Source-to-block mapping
//! - [`sync`]: Editor/preview scroll synchronization
//! - [`ai`]: Streaming AI completion
//! - [`diagram`]: Diagram render cache
//! - [`config`]: Flag-file configuration
//! - [`perf`]: Timing scopes and debug event log

pub mod ai;
pub mod blocks;
pub mod config;
pub mod diagram;
pub mod perf;
pub mod sync;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ai::{AiConfig, CompletionTransport, StreamAggregator, StreamConfig};
    pub use crate::blocks::{BlockTable, compute_blocks};
    pub use crate::sync::{DocumentId, Pane, ScrollSurface, ScrollSync, ScrollSyncConfig};
}
