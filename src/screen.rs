//! Screen manager collaborator surface.
//!
//! The real screen manager lives outside this core; the compositor queries it
//! every frame for screen geometry, rotation correction, capture exclusion
//! lists, per-screen visible sub-rects and security mask images.

use std::collections::{BTreeSet, HashMap};

use crate::canvas::Image;
use crate::geometry::Rect;
use crate::scene::SurfaceKind;
use crate::{NodeId, ScreenId};

/// Screen rotation in quadrant steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl ScreenRotation {
    pub fn quadrants(self) -> i32 {
        match self {
            ScreenRotation::Rotation0 => 0,
            ScreenRotation::Rotation90 => 1,
            ScreenRotation::Rotation180 => 2,
            ScreenRotation::Rotation270 => 3,
        }
    }

    pub fn from_quadrants(q: i32) -> Self {
        match q.rem_euclid(4) {
            0 => ScreenRotation::Rotation0,
            1 => ScreenRotation::Rotation90,
            2 => ScreenRotation::Rotation180,
            _ => ScreenRotation::Rotation270,
        }
    }

    /// Subtracts the additional correction angle a physical screen reports.
    pub fn corrected_by(self, correction: ScreenRotation) -> Self {
        ScreenRotation::from_quadrants(self.quadrants() - correction.quadrants())
    }

    pub fn is_quarter(self) -> bool {
        matches!(self, ScreenRotation::Rotation90 | ScreenRotation::Rotation270)
    }

    pub fn degrees(self) -> f32 {
        self.quadrants() as f32 * 90.0
    }
}

/// Per-screen geometry and sampling state handed in by the screen manager.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub phy_width: u32,
    pub phy_height: u32,
    pub rotation: ScreenRotation,
    pub is_sampling_on: bool,
    pub sampling_scale: f32,
    pub sampling_translate_x: f32,
    pub sampling_translate_y: f32,
    /// Sampling kernel radius in target pixels; damage mapped into sampled
    /// space is outset by this much.
    pub sampling_distance: i32,
    pub white_list: BTreeSet<NodeId>,
}

impl ScreenInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            phy_width: width,
            phy_height: height,
            ..Default::default()
        }
    }

    /// Height of the screen in the codec's rotated coordinate space.
    pub fn rotated_height(&self) -> i32 {
        if self.rotation.is_quarter() {
            self.width as i32
        } else {
            self.height as i32
        }
    }

    pub fn rotated_width(&self) -> i32 {
        if self.rotation.is_quarter() {
            self.height as i32
        } else {
            self.width as i32
        }
    }
}

/// Registry view of the external screen manager.
#[derive(Default)]
pub struct ScreenManager {
    infos: HashMap<ScreenId, ScreenInfo>,
    corrections: HashMap<ScreenId, ScreenRotation>,
    black_lists: HashMap<ScreenId, BTreeSet<NodeId>>,
    type_black_lists: HashMap<ScreenId, BTreeSet<SurfaceKind>>,
    visible_rects: HashMap<ScreenId, Rect>,
    security_masks: HashMap<ScreenId, Image>,
}

impl ScreenManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_screen_info(&mut self, id: ScreenId, info: ScreenInfo) {
        self.infos.insert(id, info);
    }

    pub fn query_screen_info(&self, id: ScreenId) -> Option<&ScreenInfo> {
        self.infos.get(&id)
    }

    pub fn set_screen_correction(&mut self, id: ScreenId, correction: ScreenRotation) {
        self.corrections.insert(id, correction);
    }

    pub fn screen_correction(&self, id: ScreenId) -> ScreenRotation {
        self.corrections.get(&id).copied().unwrap_or_default()
    }

    pub fn set_virtual_screen_black_list(&mut self, id: ScreenId, list: BTreeSet<NodeId>) {
        self.black_lists.insert(id, list);
    }

    pub fn virtual_screen_black_list(&self, id: ScreenId) -> BTreeSet<NodeId> {
        self.black_lists.get(&id).cloned().unwrap_or_default()
    }

    pub fn set_virtual_screen_type_black_list(&mut self, id: ScreenId, list: BTreeSet<SurfaceKind>) {
        self.type_black_lists.insert(id, list);
    }

    pub fn virtual_screen_type_black_list(&self, id: ScreenId) -> BTreeSet<SurfaceKind> {
        self.type_black_lists.get(&id).cloned().unwrap_or_default()
    }

    /// Sub-rect of the mirrored source shown on this screen, when partial
    /// mirroring is active.
    pub fn set_visible_rect(&mut self, id: ScreenId, rect: Option<Rect>) {
        match rect {
            Some(rect) => {
                self.visible_rects.insert(id, rect);
            }
            None => {
                self.visible_rects.remove(&id);
            }
        }
    }

    pub fn visible_rect(&self, id: ScreenId) -> Option<Rect> {
        self.visible_rects.get(&id).copied().filter(|r| !r.is_empty())
    }

    pub fn set_screen_security_mask(&mut self, id: ScreenId, mask: Option<Image>) {
        match mask {
            Some(mask) => {
                self.security_masks.insert(id, mask);
            }
            None => {
                self.security_masks.remove(&id);
            }
        }
    }

    pub fn screen_security_mask(&self, id: ScreenId) -> Option<&Image> {
        self.security_masks.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_correction_wraps_quadrants() {
        assert_eq!(
            ScreenRotation::Rotation0.corrected_by(ScreenRotation::Rotation90),
            ScreenRotation::Rotation270
        );
        assert_eq!(
            ScreenRotation::Rotation270.corrected_by(ScreenRotation::Rotation270),
            ScreenRotation::Rotation0
        );
        assert_eq!(
            ScreenRotation::Rotation180.corrected_by(ScreenRotation::Rotation90),
            ScreenRotation::Rotation90
        );
    }

    #[test]
    fn test_rotated_height_swaps_on_quarter_turns() {
        let mut info = ScreenInfo::new(1080, 1920);
        assert_eq!(info.rotated_height(), 1920);
        info.rotation = ScreenRotation::Rotation90;
        assert_eq!(info.rotated_height(), 1080);
        assert_eq!(info.rotated_width(), 1920);
    }

    #[test]
    fn test_empty_visible_rect_reads_as_disabled() {
        let mut manager = ScreenManager::new();
        let id = ScreenId(7);
        manager.set_visible_rect(id, Some(Rect::ZERO));
        assert_eq!(manager.visible_rect(id), None);
        manager.set_visible_rect(id, Some(Rect::new(0, 0, 100, 100)));
        assert_eq!(manager.visible_rect(id), Some(Rect::new(0, 0, 100, 100)));
    }
}
