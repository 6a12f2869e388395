//! Per-drawable dirty region bookkeeping.
//!
//! Every surface and every screen drawable owns one [`DirtyRegionManager`].
//! Surfaces push their per-frame dirty rects in, the damage aggregator reads
//! the buffer-age-merged result back out once per frame.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::dirty::filter::FilterDirtyCollector;
use crate::geometry::Rect;
use crate::region::GraphicsOrigin;
use crate::scene::SurfaceKind;

/// Depth of the per-frame dirty history ring. A buffer older than this many
/// frames cannot be incrementally repaired and forces a full redraw.
pub const DIRTY_HISTORY_SIZE: usize = 10;

/// Advanced (multi-rect) dirty tracking degrades to the merged single rect
/// once a frame fragments beyond this many rects.
const ADVANCED_RECTS_LIMIT: usize = 12;

#[derive(Debug, Clone, Default)]
struct FrameDirty {
    rect: Rect,
    advanced: Vec<Rect>,
}

#[derive(Default)]
pub struct DirtyRegionManager {
    surface_rect: Rect,
    current_frame_dirty: Rect,
    current_advanced: Vec<Rect>,
    /// Merged history result, valid after `update_dirty`.
    dirty_region: Rect,
    advanced_dirty: Vec<Rect>,
    dirty_region_in_virtual: Rect,
    /// Newest frame first.
    history: VecDeque<FrameDirty>,
    buffer_age: usize,
    hwc_dirty: Rect,
    type_hwc_dirty: BTreeMap<SurfaceKind, Rect>,
    filters: FilterDirtyCollector,
    quick_reject_rects: Vec<Rect>,
    expand_accumulated: Vec<Rect>,
}

impl DirtyRegionManager {
    pub fn new(surface_rect: Rect) -> Self {
        Self { surface_rect, ..Default::default() }
    }

    pub fn surface_rect(&self) -> Rect {
        self.surface_rect
    }

    pub fn set_surface_rect(&mut self, rect: Rect) {
        self.surface_rect = rect;
    }

    pub fn current_frame_dirty(&self) -> Rect {
        self.current_frame_dirty
    }

    pub fn is_current_frame_dirty(&self) -> bool {
        !self.current_frame_dirty.is_empty()
    }

    pub fn advanced_dirty_region(&self) -> &[Rect] {
        &self.advanced_dirty
    }

    pub fn dirty_region(&self) -> Rect {
        self.dirty_region
    }

    pub fn dirty_region_in_virtual(&self) -> Rect {
        self.dirty_region_in_virtual
    }

    pub fn hwc_dirty_region(&self) -> Rect {
        self.hwc_dirty
    }

    pub fn type_hwc_dirty_region(&self) -> &BTreeMap<SurfaceKind, Rect> {
        &self.type_hwc_dirty
    }

    pub fn filters(&self) -> &FilterDirtyCollector {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterDirtyCollector {
        &mut self.filters
    }

    /// Folds one dirty rect into this frame's delta.
    pub fn merge_dirty_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        self.current_frame_dirty = self.current_frame_dirty.join(&rect);
        if self.current_advanced.len() < ADVANCED_RECTS_LIMIT {
            self.current_advanced.push(rect);
        } else {
            self.current_advanced = vec![self.current_frame_dirty];
        }
    }

    pub fn merge_hwc_dirty_rect(&mut self, rect: Rect) {
        self.hwc_dirty = self.hwc_dirty.join(&rect);
    }

    pub fn merge_type_hwc_dirty_rect(&mut self, kind: SurfaceKind, rect: Rect) {
        let entry = self.type_hwc_dirty.entry(kind).or_default();
        *entry = entry.join(&rect);
    }

    /// Clips the current frame's dirty to a known-valid bound, so stale
    /// off-screen content cannot pollute the history after a resize.
    pub fn intersect_dirty_rect(&mut self, bound: Rect) {
        self.current_frame_dirty = self.current_frame_dirty.intersect(&bound);
        self.current_advanced.retain_mut(|rect| {
            *rect = rect.intersect(&bound);
            !rect.is_empty()
        });
    }

    /// Records the age of the back buffer about to be drawn into. Returns
    /// false when the age is 0 or beyond the history depth; history cannot be
    /// trusted then and the next `update_dirty` yields a full-surface region.
    pub fn set_buffer_age(&mut self, age: usize) -> bool {
        if age == 0 || age > DIRTY_HISTORY_SIZE {
            self.buffer_age = 0;
            return false;
        }
        self.buffer_age = age;
        true
    }

    pub fn buffer_age(&self) -> usize {
        self.buffer_age
    }

    /// Pushes the current frame into history and recomputes the merged dirty
    /// region over the last `buffer_age` frames. With `align` set the merged
    /// rect is snapped outward to the `grid` lattice.
    pub fn update_dirty(&mut self, align: bool, grid: i32) {
        self.push_history();
        self.dirty_region = self.merge_history_rect(self.buffer_age);
        self.advanced_dirty = self.merge_history_advanced(self.buffer_age);
        if align && grid > 1 {
            self.dirty_region = align_rect(self.dirty_region, grid);
            for rect in &mut self.advanced_dirty {
                *rect = align_rect(*rect, grid);
            }
        }
    }

    /// Variant for virtual/mirror output: merges already-recorded history
    /// without pushing a new frame (the source screen's own pass did that).
    pub fn merge_dirty_history_in_virtual(&mut self, age: usize) {
        self.dirty_region_in_virtual = self.merge_history_rect(age);
    }

    /// Invalidates incremental tracking: the whole surface is dirty.
    pub fn reset_dirty_as_surface_size(&mut self) {
        self.current_frame_dirty = self.surface_rect;
        self.current_advanced = vec![self.surface_rect];
    }

    /// Converts a buffer-relative rect between top-left and bottom-left
    /// origin within this drawable's own surface.
    pub fn rect_flip_within_surface(&self, rect: Rect, origin: GraphicsOrigin) -> Rect {
        match origin {
            GraphicsOrigin::TopLeft => rect,
            GraphicsOrigin::BottomLeft => Rect::new(
                rect.left,
                self.surface_rect.height - rect.bottom(),
                rect.width,
                rect.height,
            ),
        }
    }

    pub fn set_quick_reject_rects(&mut self, rects: Vec<Rect>) {
        self.quick_reject_rects = rects;
    }

    pub fn quick_reject_rects(&self) -> &[Rect] {
        &self.quick_reject_rects
    }

    /// Accumulates dirty across frames a virtual expand screen chose to skip.
    pub fn accumulate_expand_dirty(&mut self, rect: Rect) {
        if !rect.is_empty() {
            self.expand_accumulated.push(rect);
        }
    }

    pub fn merge_expand_accumulated_dirty(&mut self) {
        let accumulated = std::mem::take(&mut self.expand_accumulated);
        for rect in &accumulated {
            self.merge_dirty_rect(*rect);
        }
        self.expand_accumulated = accumulated;
    }

    pub fn clear_expand_accumulated_dirty(&mut self) {
        self.expand_accumulated.clear();
    }

    /// Frame-end reset of the per-frame delta. History is kept.
    pub fn clear_current_frame(&mut self) {
        self.current_frame_dirty = Rect::ZERO;
        self.current_advanced.clear();
        self.hwc_dirty = Rect::ZERO;
        self.type_hwc_dirty.clear();
    }

    fn push_history(&mut self) {
        self.history.push_front(FrameDirty {
            rect: self.current_frame_dirty,
            advanced: self.current_advanced.clone(),
        });
        self.history.truncate(DIRTY_HISTORY_SIZE);
    }

    fn merge_history_rect(&self, age: usize) -> Rect {
        if age == 0 || age > self.history.len() {
            debug!(age, depth = self.history.len(), "dirty history not trusted, full surface");
            return self.surface_rect;
        }
        self.history
            .iter()
            .take(age)
            .fold(Rect::ZERO, |acc, frame| acc.join(&frame.rect))
    }

    fn merge_history_advanced(&self, age: usize) -> Vec<Rect> {
        if age == 0 || age > self.history.len() {
            return vec![self.surface_rect];
        }
        let rects: Vec<Rect> = self
            .history
            .iter()
            .take(age)
            .flat_map(|frame| frame.advanced.iter().copied())
            .collect();
        if rects.len() > ADVANCED_RECTS_LIMIT {
            vec![self.merge_history_rect(age)]
        } else {
            rects
        }
    }
}

fn align_rect(rect: Rect, grid: i32) -> Rect {
    if rect.is_empty() {
        return rect;
    }
    let left = rect.left.div_euclid(grid) * grid;
    let top = rect.top.div_euclid(grid) * grid;
    let right = rect.right().div_euclid(grid) * grid
        + if rect.right().rem_euclid(grid) != 0 { grid } else { 0 };
    let bottom = rect.bottom().div_euclid(grid) * grid
        + if rect.bottom().rem_euclid(grid) != 0 { grid } else { 0 };
    Rect::from_ltrb(left, top, right, bottom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> DirtyRegionManager {
        DirtyRegionManager::new(Rect::new(0, 0, 1080, 1920))
    }

    #[test]
    fn test_buffer_age_zero_is_rejected() {
        let mut m = manager();
        assert!(!m.set_buffer_age(0));
        m.update_dirty(false, 0);
        assert_eq!(m.dirty_region(), m.surface_rect());
    }

    #[test]
    fn test_buffer_age_beyond_history_depth_is_rejected() {
        let mut m = manager();
        assert!(!m.set_buffer_age(DIRTY_HISTORY_SIZE + 1));
        assert!(m.set_buffer_age(DIRTY_HISTORY_SIZE));
    }

    #[test]
    fn test_buffer_age_round_trip() {
        let mut m = manager();
        let frames = [
            Rect::new(0, 0, 10, 10),
            Rect::new(100, 100, 20, 20),
            Rect::new(50, 400, 30, 30),
        ];
        // Two older frames already presented.
        for rect in &frames[..2] {
            m.merge_dirty_rect(*rect);
            assert!(m.set_buffer_age(1));
            m.update_dirty(false, 0);
            m.clear_current_frame();
        }
        // Third frame drawn into a buffer that is 3 frames old.
        m.merge_dirty_rect(frames[2]);
        assert!(m.set_buffer_age(3));
        m.update_dirty(false, 0);
        let expected = frames.iter().fold(Rect::ZERO, |acc, r| acc.join(r));
        assert_eq!(m.dirty_region(), expected);
    }

    #[test]
    fn test_age_larger_than_recorded_history_forces_full_surface() {
        let mut m = manager();
        m.merge_dirty_rect(Rect::new(0, 0, 10, 10));
        assert!(m.set_buffer_age(4));
        // Only one frame of history exists.
        m.update_dirty(false, 0);
        assert_eq!(m.dirty_region(), m.surface_rect());
    }

    #[test]
    fn test_intersect_dirty_rect_clips_current() {
        let mut m = manager();
        m.merge_dirty_rect(Rect::new(-50, -50, 100, 100));
        m.intersect_dirty_rect(Rect::new(0, 0, 1080, 1920));
        assert_eq!(m.current_frame_dirty(), Rect::new(0, 0, 50, 50));
    }

    #[test]
    fn test_aligned_update_covers_unaligned() {
        let mut m = manager();
        m.merge_dirty_rect(Rect::new(3, 5, 61, 29));
        assert!(m.set_buffer_age(1));
        m.update_dirty(true, 128);
        assert!(m.dirty_region().contains_rect(&Rect::new(3, 5, 61, 29)));
        assert_eq!(m.dirty_region().left % 128, 0);
        assert_eq!(m.dirty_region().top % 128, 0);
    }

    #[test]
    fn test_merge_history_in_virtual_uses_recorded_frames() {
        let mut m = manager();
        m.merge_dirty_rect(Rect::new(0, 0, 10, 10));
        m.set_buffer_age(1);
        m.update_dirty(false, 0);
        m.clear_current_frame();
        m.merge_dirty_rect(Rect::new(500, 500, 10, 10));
        m.set_buffer_age(1);
        m.update_dirty(false, 0);

        m.merge_dirty_history_in_virtual(2);
        assert_eq!(
            m.dirty_region_in_virtual(),
            Rect::new(0, 0, 10, 10).join(&Rect::new(500, 500, 10, 10))
        );
    }

    #[test]
    fn test_rect_flip_within_surface() {
        let m = manager();
        let flipped =
            m.rect_flip_within_surface(Rect::new(10, 20, 100, 200), GraphicsOrigin::BottomLeft);
        assert_eq!(flipped, Rect::new(10, 1920 - 220, 100, 200));
        let unflipped =
            m.rect_flip_within_surface(Rect::new(10, 20, 100, 200), GraphicsOrigin::TopLeft);
        assert_eq!(unflipped, Rect::new(10, 20, 100, 200));
    }
}
