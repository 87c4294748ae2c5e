//! Windowing for the row grid.
//!
//! Heights are in abstract units: terminal lines in the TUI, pixels for any
//! other surface. Only the rows inside the window are materialized; the
//! paddings stand in for everything above and below it.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Window {
    /// Materialized indices, `first..last + 1`. Empty when there are no rows.
    pub range: Range<usize>,
    pub top_padding: u64,
    pub bottom_padding: u64,
    /// Scroll offset after clamping.
    pub scroll_offset: u64,
}

impl Window {
    pub fn first(&self) -> Option<usize> {
        (!self.range.is_empty()).then_some(self.range.start)
    }

    pub fn last(&self) -> Option<usize> {
        (!self.range.is_empty()).then(|| self.range.end - 1)
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

fn effective_row_height(row_height: u64) -> u64 {
    row_height.max(1)
}

/// Largest offset that still fills the viewport, or 0 when everything fits.
pub fn clamp_scroll_offset(
    scroll_offset: u64,
    total: usize,
    viewport_height: u64,
    row_height: u64,
) -> u64 {
    let content = total as u64 * effective_row_height(row_height);
    scroll_offset.min(content.saturating_sub(viewport_height))
}

/// Keeps a focus index inside `0..total`; `None` when there are no rows.
pub fn clamp_index(index: Option<usize>, total: usize) -> Option<usize> {
    match (index, total) {
        (_, 0) | (None, _) => None,
        (Some(i), n) => Some(i.min(n - 1)),
    }
}

pub fn compute_window(
    total: usize,
    scroll_offset: u64,
    viewport_height: u64,
    row_height: u64,
    overscan: usize,
) -> Window {
    let row_height = effective_row_height(row_height);
    let scroll_offset = clamp_scroll_offset(scroll_offset, total, viewport_height, row_height);
    if total == 0 {
        return Window {
            scroll_offset,
            ..Default::default()
        };
    }

    let first_visible = (scroll_offset / row_height) as usize;
    // Any row with a pixel inside [offset, offset + viewport) is visible.
    let last_visible = ((scroll_offset + viewport_height.max(1) - 1) / row_height) as usize;
    let first = first_visible.saturating_sub(overscan).min(total - 1);
    let last = last_visible.saturating_add(overscan).min(total - 1);

    Window {
        range: first..last + 1,
        top_padding: first as u64 * row_height,
        bottom_padding: (total - 1 - last) as u64 * row_height,
        scroll_offset,
    }
}

/// Scroll position for one grid instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualScroller {
    scroll_offset: u64,
    viewport_height: u64,
    row_height: u64,
    overscan: usize,
    total: usize,
}

impl VirtualScroller {
    pub fn new(row_height: u64, overscan: usize) -> Self {
        Self {
            scroll_offset: 0,
            viewport_height: 0,
            row_height: effective_row_height(row_height),
            overscan,
            total: 0,
        }
    }

    pub fn scroll_offset(&self) -> u64 {
        self.scroll_offset
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn row_height(&self) -> u64 {
        self.row_height
    }

    /// Whole rows that fit in the viewport, at least one.
    pub fn rows_per_page(&self) -> usize {
        ((self.viewport_height / self.row_height) as usize).max(1)
    }

    fn clamp(&mut self) {
        self.scroll_offset = clamp_scroll_offset(
            self.scroll_offset,
            self.total,
            self.viewport_height,
            self.row_height,
        );
    }

    /// New row count, e.g. after filtering. The offset is re-clamped.
    pub fn set_total(&mut self, total: usize) {
        self.total = total;
        self.clamp();
    }

    pub fn set_viewport(&mut self, viewport_height: u64) {
        self.viewport_height = viewport_height;
        self.clamp();
    }

    pub fn scroll_to(&mut self, offset: u64) {
        self.scroll_offset = offset;
        self.clamp();
    }

    pub fn scroll_by(&mut self, delta: i64) {
        self.scroll_offset = self.scroll_offset.saturating_add_signed(delta);
        self.clamp();
    }

    /// Scrolls the minimum amount that brings row `index` fully into view.
    pub fn ensure_visible(&mut self, index: usize) {
        if self.total == 0 {
            return;
        }
        let index = index.min(self.total - 1) as u64;
        let top = index * self.row_height;
        let bottom = top + self.row_height;
        if top < self.scroll_offset {
            self.scroll_offset = top;
        } else if bottom > self.scroll_offset + self.viewport_height {
            self.scroll_offset = bottom.saturating_sub(self.viewport_height);
        }
        self.clamp();
    }

    /// Rows intersecting the viewport, without overscan.
    pub fn visible_range(&self) -> Range<usize> {
        compute_window(
            self.total,
            self.scroll_offset,
            self.viewport_height,
            self.row_height,
            0,
        )
        .range
    }

    pub fn window(&self) -> Window {
        compute_window(
            self.total,
            self.scroll_offset,
            self.viewport_height,
            self.row_height,
            self.overscan,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_empty_total() {
        let w = compute_window(0, 500, 100, 20, 5);
        assert!(w.is_empty());
        assert_eq!(w.first(), None);
        assert_eq!(w.last(), None);
        assert_eq!(w.top_padding + w.bottom_padding, 0);
        assert_eq!(w.scroll_offset, 0);
    }

    #[test]
    fn test_basic_window_with_overscan() {
        // 1000 rows of 20px, 200px viewport scrolled to row 50.
        let w = compute_window(1000, 1000, 200, 20, 3);
        assert_eq!(w.first(), Some(47));
        assert_eq!(w.last(), Some(62));
        assert_eq!(w.top_padding, 47 * 20);
        assert_eq!(w.bottom_padding, (1000 - 1 - 62) * 20);
    }

    #[test]
    fn test_partially_visible_rows_are_included() {
        // Offset 10 shows the bottom half of row 0 and the top half of row 5.
        let w = compute_window(100, 10, 100, 20, 0);
        assert_eq!(w.range, 0..6);
    }

    #[test]
    fn test_offset_clamped_when_total_shrinks() {
        let w = compute_window(10, 100_000, 100, 20, 2);
        assert_eq!(w.scroll_offset, 100);
        assert_eq!(w.last(), Some(9));
        assert_eq!(w.bottom_padding, 0);
    }

    #[test]
    fn test_zero_row_height_is_one() {
        let w = compute_window(10, 3, 4, 0, 0);
        assert_eq!(w.range, 3..7);
    }

    #[test]
    fn test_clamp_index() {
        assert_eq!(clamp_index(Some(50), 10), Some(9));
        assert_eq!(clamp_index(Some(3), 10), Some(3));
        assert_eq!(clamp_index(Some(3), 0), None);
        assert_eq!(clamp_index(None, 10), None);
    }

    #[test]
    fn test_window_properties_random() {
        let mut rng = StdRng::seed_from_u64(0x5eed_cafe);
        for _ in 0..5_000 {
            let total = rng.gen_range(0..=100_000usize);
            let row_height = rng.gen_range(1..=40u64);
            let viewport = rng.gen_range(0..=2_000u64);
            let overscan = rng.gen_range(0..=10usize);
            let scroll = rng.gen_range(0..=total as u64 * row_height);
            let w = compute_window(total, scroll, viewport, row_height, overscan);

            let rendered = w.len() as u64 * row_height;
            assert_eq!(
                w.top_padding + rendered + w.bottom_padding,
                total as u64 * row_height
            );
            if total == 0 {
                assert!(w.is_empty());
                continue;
            }
            assert!(w.range.end <= total);
            assert!(w.scroll_offset <= scroll);

            if viewport == 0 {
                continue;
            }
            // Every row with a unit inside the viewport is in the window, and
            // the window reaches at most `overscan` rows past them.
            let first_seen = (w.scroll_offset / row_height) as usize;
            let last_seen =
                (((w.scroll_offset + viewport - 1) / row_height) as usize).min(total - 1);
            for i in first_seen..=last_seen {
                assert!(w.range.contains(&i), "row {} outside {:?}", i, w.range);
            }
            assert!(w.range.start + overscan >= first_seen);
            assert!(w.range.end <= last_seen + overscan + 1);
        }
    }

    #[test]
    fn test_scroller_ensure_visible() {
        let mut s = VirtualScroller::new(1, 2);
        s.set_viewport(10);
        s.set_total(100);
        s.ensure_visible(25);
        assert_eq!(s.scroll_offset(), 16);
        assert_eq!(s.visible_range(), 16..26);
        s.ensure_visible(5);
        assert_eq!(s.scroll_offset(), 5);
        s.ensure_visible(8);
        assert_eq!(s.scroll_offset(), 5);
    }

    #[test]
    fn test_scroller_clamps_on_total_change() {
        let mut s = VirtualScroller::new(1, 0);
        s.set_viewport(10);
        s.set_total(100);
        s.scroll_by(85);
        assert_eq!(s.scroll_offset(), 85);
        s.set_total(20);
        assert_eq!(s.scroll_offset(), 10);
        s.scroll_by(-100);
        assert_eq!(s.scroll_offset(), 0);
        s.set_total(0);
        assert!(s.window().is_empty());
    }
}
