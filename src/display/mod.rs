//! Logical display drawables.
//!
//! A [`LogicalDisplay`] is the per-output drawable: it carries the display
//! node's parameters, the cross-frame mirror session state, the lazily
//! created SLR scaler and the offscreen pass coordinator. The mirror drawing
//! state machine itself lives in [`mirror`].

pub mod mirror;
pub mod offscreen;
pub mod slr;

use std::collections::BTreeSet;

use crate::config::OffscreenConfig;
use crate::geometry::{Matrix, Rect};
use crate::scene::SurfaceKind;
use crate::screen::ScreenRotation;
use crate::{DisplayId, NodeId, ScreenId};

use offscreen::OffscreenRenderCoordinator;
use slr::SlrScaleFunction;

/// How this display's output is composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeType {
    /// Direct GPU composition onto a real (possibly wired) screen.
    UniRender,
    /// Mirror composition onto a virtual capture target.
    UniRenderMirror,
    /// Expand composition: a virtual screen with its own content.
    UniRenderExpand,
}

/// Per-frame parameters of a logical display, refreshed from the node tree.
#[derive(Debug, Clone)]
pub struct DisplayParams {
    pub id: DisplayId,
    pub screen_id: ScreenId,
    pub composite_type: CompositeType,
    /// Source display reproduced by this one, when mirroring. A plain id:
    /// the source may be torn down independently and the lookup just fails.
    pub mirror_source: Option<DisplayId>,
    /// This display is trusted with secure content.
    pub is_security_display: bool,
    pub virtual_screen_muted: bool,
    /// A security special layer is currently visible in this subtree.
    pub has_visible_security_surface: bool,
    pub has_protected_layer: bool,
    /// The set of special layers changed since last frame.
    pub special_layer_changed: bool,
    /// Capture of secure content has been explicitly exempted.
    pub security_exemption: bool,
    /// Rotation override for the mirrored source; falls back to the source
    /// screen's own rotation.
    pub mirror_source_rotation: Option<ScreenRotation>,
    /// Display node matrix in its parent space.
    pub matrix: Matrix,
    pub offset_x: f32,
    pub offset_y: f32,
    pub frame_rect: Rect,
}

impl DisplayParams {
    pub fn new(id: DisplayId, screen_id: ScreenId, composite_type: CompositeType) -> Self {
        Self {
            id,
            screen_id,
            composite_type,
            mirror_source: None,
            is_security_display: false,
            virtual_screen_muted: false,
            has_visible_security_surface: false,
            has_protected_layer: false,
            special_layer_changed: false,
            security_exemption: false,
            mirror_source_rotation: None,
            matrix: Matrix::identity(),
            offset_x: 0.0,
            offset_y: 0.0,
            frame_rect: Rect::ZERO,
        }
    }
}

/// Cross-frame state of one mirror target, compared against the current
/// frame's values to decide when cached content and incremental dirty history
/// are still valid. Mutated only by the owning display's own draw call.
#[derive(Debug, Clone)]
pub struct MirrorSession {
    pub last_canvas_matrix: Matrix,
    pub last_mirror_matrix: Matrix,
    pub last_black_list: BTreeSet<NodeId>,
    pub last_type_black_list: BTreeSet<SurfaceKind>,
    pub last_visible_rect: Option<Rect>,
    pub last_sec_exemption: bool,
    /// The cached-image path goes through the SLR scaler this frame.
    pub is_mirror_slr_copy: bool,
    /// Sticky: force a full-surface dirty reset on the next frame.
    pub virtual_dirty_need_refresh: bool,
}

impl Default for MirrorSession {
    fn default() -> Self {
        Self {
            last_canvas_matrix: Matrix::identity(),
            last_mirror_matrix: Matrix::identity(),
            last_black_list: BTreeSet::new(),
            last_type_black_list: BTreeSet::new(),
            last_visible_rect: None,
            last_sec_exemption: false,
            is_mirror_slr_copy: false,
            virtual_dirty_need_refresh: false,
        }
    }
}

pub struct LogicalDisplay {
    pub params: DisplayParams,
    pub session: MirrorSession,
    /// Created lazily on the first scaled mirror frame, revalidated on
    /// dimension or color-space changes.
    pub slr: Option<SlrScaleFunction>,
    pub offscreen: OffscreenRenderCoordinator,
}

impl LogicalDisplay {
    pub fn new(params: DisplayParams, offscreen_config: OffscreenConfig) -> Self {
        Self {
            params,
            session: MirrorSession::default(),
            slr: None,
            offscreen: OffscreenRenderCoordinator::new(offscreen_config),
        }
    }
}
