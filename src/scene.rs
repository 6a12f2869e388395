//! Drawable data model and registry.
//!
//! Screens own surfaces (1:N); a mirror display references exactly one source
//! display. All cross-drawable links are plain ids resolved through the
//! [`Scene`] maps each frame, so teardown order never matters: a dangling id
//! fails the lookup and the draw call backs out like any other transient-null
//! collaborator.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use bitflags::bitflags;

use crate::canvas::{ColorSpace, ColorType, Image};
use crate::dirty::manager::DirtyRegionManager;
use crate::display::LogicalDisplay;
use crate::geometry::Rect;
use crate::region::Region;
use crate::screen::ScreenInfo;
use crate::{DisplayId, NodeId, ScreenId};

bitflags! {
    /// Special-layer states of a surface or of a display subtree.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SpecialLayerFlags: u32 {
        /// Secure content that must not leak to untrusted capture targets.
        const SECURITY = 1 << 0;
        /// Excluded from capture/mirror output entirely.
        const SKIP = 1 << 1;
        /// DRM-protected content composed by trusted hardware paths.
        const PROTECTED = 1 << 2;
    }
}

/// Window-manager surface category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SurfaceKind {
    /// Container surface wrapping an app's windows.
    Leash,
    /// Primary content surface.
    Main,
    /// Self-drawing surface (video, camera preview) usually offloaded to HWC.
    SelfDrawing,
    Cursor,
}

impl SurfaceKind {
    pub fn is_leash_or_main(self) -> bool {
        matches!(self, SurfaceKind::Leash | SurfaceKind::Main)
    }
}

#[derive(Debug, Clone)]
pub struct SurfaceParams {
    pub kind: SurfaceKind,
    pub is_app_window: bool,
    /// On-screen destination; surfaces with an empty dst contribute nothing.
    pub dst_rect: Rect,
    pub visible_region: Region,
    pub visible_region_in_virtual: Region,
    pub special_layers: SpecialLayerFlags,
    pub occluded_by_filter_cache: bool,
    /// Cross-screen surface: its dirty counts only on the screen doing the
    /// first visit this frame.
    pub is_first_level_cross_node: bool,
    /// Last known on-screen rect, used to clip stale dirty after resizes.
    pub old_dirty_in_surface: Rect,
}

impl SurfaceParams {
    pub fn new(kind: SurfaceKind) -> Self {
        Self {
            kind,
            is_app_window: matches!(kind, SurfaceKind::Main),
            dst_rect: Rect::ZERO,
            visible_region: Region::new(),
            visible_region_in_virtual: Region::new(),
            special_layers: SpecialLayerFlags::empty(),
            occluded_by_filter_cache: false,
            is_first_level_cross_node: false,
            old_dirty_in_surface: Rect::ZERO,
        }
    }
}

pub struct SurfaceDrawable {
    pub id: NodeId,
    pub name: String,
    pub params: SurfaceParams,
    pub dirty: DirtyRegionManager,
}

impl SurfaceDrawable {
    pub fn new(id: NodeId, name: impl Into<String>, params: SurfaceParams) -> Self {
        let dirty = DirtyRegionManager::new(params.dst_rect);
        Self { id, name: name.into(), params, dirty }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenParams {
    pub screen_info: ScreenInfo,
    /// Main/leash surfaces in z-order, topmost first. Aggregation walks it
    /// back-to-front.
    pub surfaces: Vec<NodeId>,
    pub hdr_present: bool,
    pub hdr_brightness_ratio: f32,
    pub hdr_status_changed: bool,
    pub zoomed: bool,
    pub color_space: ColorSpace,
    pub pixel_format: ColorType,
    /// False while the producer's vsync period is irregular; buffer-age math
    /// cannot be trusted then.
    pub equal_vsync_period: bool,
    pub has_mirrored_screen_changed: bool,
    pub render_skip_if_screen_off: bool,
    pub main_and_leash_surface_dirty: bool,
    /// Region actually drawn this frame, in sampled space when sampling.
    pub drawn_region: Region,
    // Accumulated state for virtual expand screens that skip frames.
    pub accumulated_dirty: bool,
    pub accumulated_hdr_status_changed: bool,
    pub accumulated_special_layer_changed: bool,
}

impl ScreenParams {
    pub fn new(screen_info: ScreenInfo) -> Self {
        Self {
            screen_info,
            surfaces: Vec::new(),
            hdr_present: false,
            hdr_brightness_ratio: 1.0,
            hdr_status_changed: false,
            zoomed: false,
            color_space: ColorSpace::Srgb,
            pixel_format: ColorType::Rgba8888,
            equal_vsync_period: true,
            has_mirrored_screen_changed: false,
            render_skip_if_screen_off: false,
            main_and_leash_surface_dirty: false,
            drawn_region: Region::new(),
            accumulated_dirty: false,
            accumulated_hdr_status_changed: false,
            accumulated_special_layer_changed: false,
        }
    }
}

pub struct ScreenDrawable {
    pub id: ScreenId,
    pub params: ScreenParams,
    pub dirty: DirtyRegionManager,
    /// Snapshot of this screen's last composed frame, produced by its own
    /// draw pass and read-only for every mirror target within the frame.
    pub cache_image: Option<Image>,
    /// Dirty accumulated while mirror output skipped frames.
    pub accumulate_dirty_in_skip_frame: bool,
    /// Damage list last handed to the display layer (wired projection path).
    pub damage_region: Vec<Rect>,
}

impl ScreenDrawable {
    pub fn new(id: ScreenId, params: ScreenParams) -> Self {
        let info = &params.screen_info;
        let surface_rect = Rect::new(0, 0, info.width as i32, info.height as i32);
        Self {
            id,
            params,
            dirty: DirtyRegionManager::new(surface_rect),
            cache_image: None,
            accumulate_dirty_in_skip_frame: false,
            damage_region: Vec::new(),
        }
    }
}

/// Per-frame global parameters threaded through the draw call chain.
#[derive(Debug, Clone, Default)]
pub struct FrameParams {
    pub virtual_dirty_enabled: bool,
    /// Quick-reject culling of unchanged subtrees is active.
    pub op_dropped: bool,
    pub force_mirror_screen_dirty: bool,
    /// Sticky within the frame: some condition demanded a full virtual dirty.
    pub virtual_dirty_refresh: bool,
    pub color_filter_on: bool,
    pub high_contrast_on: bool,
    pub curtain_screen_on: bool,
    pub watermark: Option<Image>,
    /// This screen performs the frame's first visit of cross-screen surfaces.
    pub first_visit_cross_node_display: bool,
    pub filter_cache_valid_for_occlusion: BTreeSet<NodeId>,
}

#[derive(Default)]
pub struct Scene {
    pub screens: HashMap<ScreenId, ScreenDrawable>,
    pub surfaces: HashMap<NodeId, SurfaceDrawable>,
    pub displays: HashMap<DisplayId, LogicalDisplay>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_screen(&mut self, screen: ScreenDrawable) {
        self.screens.insert(screen.id, screen);
    }

    pub fn insert_surface(&mut self, surface: SurfaceDrawable) {
        self.surfaces.insert(surface.id, surface);
    }

    pub fn insert_display(&mut self, display: LogicalDisplay) {
        self.displays.insert(display.params.id, display);
    }
}

/// Mutable references to two distinct entries of one map. Passing the same
/// key twice yields the entry once, in the first slot.
pub(crate) fn pair_mut<'a, K, V>(
    map: &'a mut HashMap<K, V>,
    a: &K,
    b: &K,
) -> (Option<&'a mut V>, Option<&'a mut V>)
where
    K: Eq + Hash,
{
    if a == b {
        return (map.get_mut(a), None);
    }
    let mut first = None;
    let mut second = None;
    for (key, value) in map.iter_mut() {
        if key == a {
            first = Some(value);
        } else if key == b {
            second = Some(value);
        }
    }
    (first, second)
}
