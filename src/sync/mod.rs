//! Editor/preview scroll synchronization.
//!
//! This module implements:
//! - [`ScrollSync`]: mirrors scrolling between an editor and its preview
//! - [`SyncLock`]: token-checked re-entrancy lock against feedback loops
//! - [`ScrollRatioStore`]: per-document scroll positions across tab switches
//! - Alignment math: [`ratio_from_geometry`] and [`blend_target`]
//!
//! Time is supplied by the caller in milliseconds; nothing here reads a clock.

mod engine;
mod lock;
mod ratio;
mod surface;

pub use engine::{ScrollSync, ScrollSyncConfig, SyncHandle, SyncOutcome};
pub use lock::{ReleaseQueue, SyncLock};
pub use ratio::{DocumentId, ScrollRatio, ScrollRatioStore};
pub use surface::{
    Pane, ScrollSurface, SurfaceRef, apply_ratio, blend_target, ratio_from_geometry,
    scroll_ratio, surface_ref,
};
