//! Scrollable surfaces and the math that aligns them.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::blocks::BlockTable;

/// Which side of the editor/preview pairing a surface is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pane {
    /// The editable source surface
    Editor,
    /// The rendered preview surface
    Preview,
}

impl Pane {
    /// The opposite pane.
    pub const fn other(self) -> Self {
        match self {
            Self::Editor => Self::Preview,
            Self::Preview => Self::Editor,
        }
    }

    /// Short name used in logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Editor => "editor",
            Self::Preview => "preview",
        }
    }
}

/// A vertically scrollable view the synchronizer can read and move.
///
/// Geometry follows the DOM convention: `scroll_top` is the current offset,
/// `scroll_height` the full content height and `client_height` the visible
/// height, all in the surface's own units.
pub trait ScrollSurface {
    /// Current scroll offset.
    fn scroll_top(&self) -> f64;

    /// Total content height.
    fn scroll_height(&self) -> f64;

    /// Visible height.
    fn client_height(&self) -> f64;

    /// Move the surface to `top`.
    fn set_scroll_top(&mut self, top: f64);

    /// Source-text byte offset this surface is anchored at.
    ///
    /// For the editor this is the cursor. A preview that knows which block
    /// sits at the top of its viewport can report that block's start.
    fn anchor_offset(&self) -> Option<usize> {
        None
    }

    /// Largest meaningful `scroll_top`.
    fn max_scroll(&self) -> f64 {
        let range = self.scroll_height() - self.client_height();
        if range.is_finite() { range.max(0.0) } else { 0.0 }
    }
}

/// A non-owning reference to a surface. A dropped surface counts as detached.
pub type SurfaceRef = Weak<RefCell<dyn ScrollSurface>>;

/// Make a [`SurfaceRef`] for a surface owned by the UI.
pub fn surface_ref<S>(surface: &Rc<RefCell<S>>) -> SurfaceRef
where
    S: ScrollSurface + 'static,
{
    let surface: Rc<RefCell<dyn ScrollSurface>> = surface.clone();
    Rc::downgrade(&surface)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Normalized scroll position for raw geometry.
///
/// `top / max(1, height - client)`, clamped to `[0, 1]`. Returns `None` when
/// the geometry is not finite (e.g. a surface mid-teardown reporting NaN).
pub fn ratio_from_geometry(scroll_top: f64, scroll_height: f64, client_height: f64) -> Option<f64> {
    let range = (scroll_height - client_height).max(1.0);
    let ratio = scroll_top / range;
    ratio.is_finite().then(|| ratio.clamp(0.0, 1.0))
}

/// Normalized scroll position of `surface`.
pub fn scroll_ratio(surface: &dyn ScrollSurface) -> Option<f64> {
    ratio_from_geometry(
        surface.scroll_top(),
        surface.scroll_height(),
        surface.client_height(),
    )
}

/// Move `surface` to normalized position `ratio`.
pub fn apply_ratio(surface: &mut dyn ScrollSurface, ratio: f64) -> f64 {
    let top = clamp_unit(ratio) * surface.max_scroll();
    surface.set_scroll_top(top);
    top
}

/// Refine a raw scroll ratio with the block table.
///
/// The block whose start is nearest to `anchor` gives a structural position
/// `index / max(1, len - 1)`; the result is `ratio * (1 - weight) +
/// position * weight`. Without blocks or an anchor, or if the blend is not
/// finite, the clamped `ratio` is returned unchanged.
pub fn blend_target(ratio: f64, blocks: &BlockTable, anchor: Option<usize>, weight: f64) -> f64 {
    let ratio = clamp_unit(ratio);
    let Some(block) = anchor.and_then(|offset| blocks.nearest_to(offset)) else {
        return ratio;
    };
    let position = blocks.fractional_position(block.index);
    let weight = clamp_unit(weight);
    let blended = ratio.mul_add(1.0 - weight, position * weight);
    if blended.is_finite() {
        blended.clamp(0.0, 1.0)
    } else {
        ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockSpan;

    fn blocks(n: usize) -> BlockTable {
        (0..n)
            .map(|index| BlockSpan {
                start: index * 10,
                end: index * 10 + 5,
                index,
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_ratio_at_top_is_zero() {
        assert_eq!(ratio_from_geometry(0.0, 1000.0, 200.0), Some(0.0));
    }

    #[test]
    fn test_ratio_at_bottom_is_one() {
        assert_eq!(ratio_from_geometry(800.0, 1000.0, 200.0), Some(1.0));
    }

    #[test]
    fn test_ratio_without_overflow_uses_floor_of_one() {
        assert_eq!(ratio_from_geometry(0.0, 100.0, 100.0), Some(0.0));
        assert_eq!(ratio_from_geometry(0.5, 100.0, 100.0), Some(0.5));
    }

    #[test]
    fn test_ratio_clamps_overscroll() {
        assert_eq!(ratio_from_geometry(900.0, 1000.0, 200.0), Some(1.0));
        assert_eq!(ratio_from_geometry(-5.0, 1000.0, 200.0), Some(0.0));
    }

    #[test]
    fn test_ratio_rejects_nan_geometry() {
        assert_eq!(ratio_from_geometry(f64::NAN, 1000.0, 200.0), None);
    }

    #[test]
    fn test_blend_without_blocks_returns_ratio() {
        let target = blend_target(0.3, &BlockTable::empty(), Some(10), 0.5);
        assert!((target - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_blend_without_anchor_returns_ratio() {
        let target = blend_target(0.3, &blocks(5), None, 0.5);
        assert!((target - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_blend_pulls_toward_block_position() {
        // Anchor on the last block: structural position is 1.0
        let target = blend_target(0.2, &blocks(5), Some(40), 0.5);
        assert!(target > 0.2);
        assert!(target <= 1.0);
    }

    #[test]
    fn test_blend_weight_zero_is_pure_ratio() {
        let target = blend_target(0.2, &blocks(5), Some(40), 0.0);
        assert!((target - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_apply_ratio_scales_to_scroll_range() {
        struct Fixed {
            top: f64,
        }
        impl ScrollSurface for Fixed {
            fn scroll_top(&self) -> f64 {
                self.top
            }
            fn scroll_height(&self) -> f64 {
                1200.0
            }
            fn client_height(&self) -> f64 {
                200.0
            }
            fn set_scroll_top(&mut self, top: f64) {
                self.top = top;
            }
        }
        let mut surface = Fixed { top: 0.0 };
        let top = apply_ratio(&mut surface, 0.25);
        assert!((top - 250.0).abs() < f64::EPSILON);
        assert!((surface.top - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pane_other_swaps() {
        assert_eq!(Pane::Editor.other(), Pane::Preview);
        assert_eq!(Pane::Preview.other(), Pane::Editor);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ratio_always_in_unit_interval(
                scroll_height in 0.0..100_000.0f64,
                client_fraction in 0.0..=1.0f64,
                top_fraction in 0.0..=1.0f64,
            ) {
                let client_height = scroll_height * client_fraction;
                let scroll_top = scroll_height * top_fraction;
                let ratio = ratio_from_geometry(scroll_top, scroll_height, client_height);
                prop_assert!(ratio.is_some());
                let ratio = ratio.unwrap();
                prop_assert!(ratio.is_finite());
                prop_assert!((0.0..=1.0).contains(&ratio));
            }

            #[test]
            fn blend_stays_in_unit_interval(
                ratio in -1.0..2.0f64,
                count in 0usize..50,
                anchor in 0usize..600,
                weight in 0.0..=1.0f64,
            ) {
                let target = blend_target(ratio, &blocks(count), Some(anchor), weight);
                prop_assert!((0.0..=1.0).contains(&target));
            }

            #[test]
            fn blend_is_monotonic_in_ratio(
                low in 0.0..=1.0f64,
                delta in 0.0..=1.0f64,
                anchor in 0usize..500,
            ) {
                let high = (low + delta).min(1.0);
                let table = blocks(20);
                let a = blend_target(low, &table, Some(anchor), 0.5);
                let b = blend_target(high, &table, Some(anchor), 0.5);
                prop_assert!(a <= b + 1e-12);
            }

            #[test]
            fn blend_is_monotonic_in_anchor(
                ratio in 0.0..=1.0f64,
                low in 0usize..500,
                delta in 0usize..500,
            ) {
                let table = blocks(20);
                let a = blend_target(ratio, &table, Some(low), 0.5);
                let b = blend_target(ratio, &table, Some(low + delta), 0.5);
                prop_assert!(a <= b + 1e-12);
            }
        }
    }
}
