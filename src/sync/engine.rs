//! The scroll synchronizer tying both panes, the lock and the ratio store together.

use std::cell::RefCell;
use std::rc::Rc;

use crate::blocks::BlockTable;

use super::lock::{ReleaseQueue, SyncLock};
use super::ratio::{DocumentId, ScrollRatio, ScrollRatioStore};
use super::surface::{Pane, ScrollSurface, SurfaceRef, apply_ratio, blend_target, scroll_ratio};

/// Tuning for [`ScrollSync`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSyncConfig {
    /// Whether scroll events are mirrored at all
    pub enabled: bool,
    /// How long the lock is held after a programmatic scroll
    pub release_ms: u64,
    /// Minimum spacing between performed syncs (0 disables)
    pub throttle_ms: u64,
    /// Weight of the block position in the target ratio, in `[0, 1]`
    pub blend_weight: f64,
    /// Bound on remembered documents (`None` keeps all)
    pub max_documents: Option<usize>,
}

impl Default for ScrollSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            release_ms: 50,
            throttle_ms: 16,
            blend_weight: 0.5,
            max_documents: None,
        }
    }
}

/// What a call to [`ScrollSync::on_scroll`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// Sync is turned off
    Disabled,
    /// A programmatic scroll is in flight; the event was ignored
    Locked,
    /// Too soon after the previous sync
    Throttled,
    /// No view attached, or a surface is gone or busy
    Detached,
    /// The source surface reported non-finite geometry
    InvalidGeometry,
    /// The other pane was moved to `top` (normalized `target`)
    Synced { target: f64, top: f64 },
}

/// Opaque handle for an attached editor/preview view.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the handle makes it impossible to detach the view"]
pub struct SyncHandle {
    id: u64,
}

struct Attachment {
    id: u64,
    document: DocumentId,
    editor: SurfaceRef,
    preview: SurfaceRef,
    blocks: BlockTable,
}

impl Attachment {
    fn surface(&self, pane: Pane) -> Option<Rc<RefCell<dyn ScrollSurface>>> {
        match pane {
            Pane::Editor => self.editor.upgrade(),
            Pane::Preview => self.preview.upgrade(),
        }
    }
}

/// Keeps an editor and its preview scrolled to matching positions.
///
/// One synchronizer serves one window. The UI attaches the active view with
/// [`attach`](Self::attach), forwards every scroll event to
/// [`on_scroll`](Self::on_scroll) and calls [`tick`](Self::tick) from its
/// event loop so lock releases fire.
///
/// Programmatic scrolls fire scroll events of their own; while the lock is
/// held those are ignored without touching any surface, which is what stops
/// editor → preview → editor ping-pong.
pub struct ScrollSync {
    config: ScrollSyncConfig,
    lock: SyncLock,
    releases: ReleaseQueue,
    ratios: ScrollRatioStore,
    attachment: Option<Attachment>,
    next_attachment: u64,
    last_sync_ms: Option<u64>,
}

impl ScrollSync {
    /// Create a synchronizer with `config`.
    pub fn new(config: ScrollSyncConfig) -> Self {
        let ratios = config
            .max_documents
            .map_or_else(ScrollRatioStore::new, ScrollRatioStore::with_capacity_limit);
        Self {
            config,
            lock: SyncLock::default(),
            releases: ReleaseQueue::default(),
            ratios,
            attachment: None,
            next_attachment: 0,
            last_sync_ms: None,
        }
    }

    /// Current configuration.
    pub const fn config(&self) -> &ScrollSyncConfig {
        &self.config
    }

    /// Turn mirroring on or off.
    pub const fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// Returns true while a programmatic scroll holds the lock.
    pub const fn is_syncing(&self) -> bool {
        self.lock.is_active()
    }

    /// The lock state, for diagnostics.
    pub const fn lock(&self) -> &SyncLock {
        &self.lock
    }

    /// Remembered per-document ratios.
    pub const fn ratios(&self) -> &ScrollRatioStore {
        &self.ratios
    }

    /// Mutable access to remembered ratios, e.g. to seed them from storage.
    pub const fn ratios_mut(&mut self) -> &mut ScrollRatioStore {
        &mut self.ratios
    }

    /// The document of the attached view.
    pub fn document(&self) -> Option<&DocumentId> {
        self.attachment.as_ref().map(|a| &a.document)
    }

    /// Attach a view, replacing any previous one.
    pub fn attach(
        &mut self,
        document: DocumentId,
        editor: SurfaceRef,
        preview: SurfaceRef,
        blocks: BlockTable,
    ) -> SyncHandle {
        self.next_attachment += 1;
        let id = self.next_attachment;
        tracing::debug!(%document, blocks = blocks.len(), "scroll sync attached");
        self.attachment = Some(Attachment {
            id,
            document,
            editor,
            preview,
            blocks,
        });
        SyncHandle { id }
    }

    /// Detach the view `handle` refers to.
    ///
    /// A handle from an earlier, already replaced view is ignored.
    pub fn detach(&mut self, handle: SyncHandle) {
        match self.attachment.take() {
            Some(attachment) if attachment.id == handle.id => {
                tracing::debug!(document = %attachment.document, "scroll sync detached");
            }
            other => self.attachment = other,
        }
    }

    /// Swap in the block table rebuilt after a source change.
    pub fn set_blocks(&mut self, blocks: BlockTable) {
        if let Some(attachment) = self.attachment.as_mut() {
            attachment.blocks = blocks;
        }
    }

    /// Handle a scroll event from `origin` and mirror it onto the other pane.
    pub fn on_scroll(&mut self, origin: Pane, now_ms: u64) -> SyncOutcome {
        // Guards come first: nothing below may run while locked.
        if !self.config.enabled {
            return SyncOutcome::Disabled;
        }
        if self.lock.is_active() {
            tracing::trace!(pane = origin.label(), "scroll ignored: sync in flight");
            return SyncOutcome::Locked;
        }
        if let Some(last) = self.last_sync_ms
            && now_ms.saturating_sub(last) < self.config.throttle_ms
        {
            return SyncOutcome::Throttled;
        }

        let Some(attachment) = self.attachment.as_ref() else {
            return SyncOutcome::Detached;
        };
        let (Some(source), Some(target)) = (
            attachment.surface(origin),
            attachment.surface(origin.other()),
        ) else {
            return SyncOutcome::Detached;
        };

        let (ratio, anchor) = {
            let Ok(source) = source.try_borrow() else {
                return SyncOutcome::Detached;
            };
            (scroll_ratio(&*source), source.anchor_offset())
        };
        let Some(ratio) = ratio else {
            return SyncOutcome::InvalidGeometry;
        };
        let Ok(mut target) = target.try_borrow_mut() else {
            return SyncOutcome::Detached;
        };

        self.ratios.record(&attachment.document, origin, ratio);
        let target_ratio = blend_target(ratio, &attachment.blocks, anchor, self.config.blend_weight);

        let token = self.lock.acquire();
        self.releases
            .schedule(token, now_ms.saturating_add(self.config.release_ms));
        let top = apply_ratio(&mut *target, target_ratio);
        self.last_sync_ms = Some(now_ms);

        crate::perf::log_event(
            "sync.write",
            format!(
                "from={} ratio={ratio:.4} target={target_ratio:.4} top={top:.1} token={token}",
                origin.label()
            ),
        );
        SyncOutcome::Synced {
            target: target_ratio,
            top,
        }
    }

    /// Capture both panes' positions for `document` before switching away.
    ///
    /// Returns false if no live view is attached.
    pub fn save_scroll_state(&mut self, document: &DocumentId) -> bool {
        let Some(attachment) = self.attachment.as_ref() else {
            return false;
        };
        let (Some(editor), Some(preview)) = (
            attachment.surface(Pane::Editor),
            attachment.surface(Pane::Preview),
        ) else {
            return false;
        };
        let (Ok(editor), Ok(preview)) = (editor.try_borrow(), preview.try_borrow()) else {
            return false;
        };
        let ratio = ScrollRatio::new(
            scroll_ratio(&*editor).unwrap_or(0.0),
            scroll_ratio(&*preview).unwrap_or(0.0),
        );
        tracing::debug!(
            %document,
            editor = ratio.editor(),
            preview = ratio.preview(),
            "scroll state saved"
        );
        self.ratios.insert(document.clone(), ratio);
        true
    }

    /// Apply the stored positions for `document` to both attached panes.
    ///
    /// Call after the document has been laid out. The lock is held while the
    /// panes move so their scroll events are not mirrored. Returns false if
    /// nothing is stored or no live view is attached.
    pub fn restore_scroll_state(&mut self, document: &DocumentId, now_ms: u64) -> bool {
        let Some(ratio) = self.ratios.get(document) else {
            return false;
        };
        let Some(attachment) = self.attachment.as_ref() else {
            return false;
        };
        let (Some(editor), Some(preview)) = (
            attachment.surface(Pane::Editor),
            attachment.surface(Pane::Preview),
        ) else {
            return false;
        };
        let (Ok(mut editor), Ok(mut preview)) = (editor.try_borrow_mut(), preview.try_borrow_mut())
        else {
            return false;
        };

        let token = self.lock.acquire();
        apply_ratio(&mut *editor, ratio.editor());
        apply_ratio(&mut *preview, ratio.preview());
        self.releases
            .schedule(token, now_ms.saturating_add(self.config.release_ms));
        tracing::debug!(%document, token, "scroll state restored");
        true
    }

    /// Fire every lock release due at `now_ms`.
    ///
    /// Returns true if the lock was cleared.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        let mut released = false;
        for token in self.releases.take_due(now_ms) {
            if self.lock.release(token) {
                released = true;
            } else {
                tracing::trace!(token, current = self.lock.token(), "stale lock release ignored");
            }
        }
        released
    }

    /// When [`tick`](Self::tick) next needs to run.
    pub fn next_deadline(&self) -> Option<u64> {
        self.releases.next_deadline()
    }
}

impl Default for ScrollSync {
    fn default() -> Self {
        Self::new(ScrollSyncConfig::default())
    }
}
