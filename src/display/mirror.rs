//! Mirror-screen drawing state machine.
//!
//! Every frame each mirror target decides between a full redraw of the
//! mirrored source scene, a cheap blit of the source screen's cached
//! snapshot, or skipping the draw entirely. The decision feeds off per-frame
//! screen state (HDR, mute, cache availability) and a security boundary: a
//! secure layer visible on the main screen while the mirror is untrusted
//! forces a fresh, filtered redraw over any cached blit that might leak it.
//!
//! All collaborator lookups resolve plain ids through the scene registry;
//! any missing drawable aborts that draw call with a log line and no side
//! effects, which is the normal shape of a teardown race.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, error};

use crate::canvas::{Canvas, Color, ColorSpace, ColorType, Image, Paint, Sampling};
use crate::config::CompositorConfig;
use crate::dirty::aggregate::{DamageAggregator, accumulate_dirty_state};
use crate::dirty::filter::{FilterCacheView, expand_filter_dirty};
use crate::display::offscreen::{BRIGHTNESS_RATIO_EPSILON, OffscreenRequest};
use crate::display::slr::SlrScaleFunction;
use crate::display::{CompositeType, LogicalDisplay};
use crate::geometry::{Matrix, Rect, RectF, concat, scale_translate};
use crate::processor::{RoiSink, VirtualScreenProcessor, canvas_clip_region_for_uniscale_mode};
use crate::region::screen_intersect_dirty_rects;
use crate::renderer::ContentRenderer;
use crate::scene::{FrameParams, Scene, ScreenDrawable, SurfaceDrawable, SurfaceKind, pair_mut};
use crate::screen::{ScreenInfo, ScreenManager, ScreenRotation};
use crate::{DisplayId, NodeId, ScreenId};

/// What a display's draw call did this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorDrawState {
    NotMirroring,
    /// Physically wired second display, composed directly.
    WiredProjection,
    /// Cached snapshot of the source screen blitted to the virtual target.
    VirtualMirrorCopy,
    /// Source scene re-walked into the virtual canvas.
    VirtualMirrorRedraw,
    /// Only the black/masked placeholder was drawn.
    SecurityMaskOnly,
}

/// Capture-exclusion state for one mirror draw. Built from the screen
/// manager at the start of the call chain, threaded by parameter, dropped at
/// the end; nothing here survives the frame.
#[derive(Debug, Clone, Default)]
pub struct MirrorDrawContext {
    pub black_list: BTreeSet<NodeId>,
    pub type_black_list: BTreeSet<SurfaceKind>,
    pub white_list: BTreeSet<NodeId>,
    /// Sub-rect of the source shown on this target, when partial mirroring
    /// is active.
    pub visible_rect: Option<Rect>,
    pub sec_exemption: bool,
}

impl MirrorDrawContext {
    pub fn build(manager: &ScreenManager, screen: ScreenId, sec_exemption: bool) -> Self {
        Self {
            black_list: manager.virtual_screen_black_list(screen),
            type_black_list: manager.virtual_screen_type_black_list(screen),
            white_list: manager
                .query_screen_info(screen)
                .map(|info| info.white_list.clone())
                .unwrap_or_default(),
            visible_rect: manager.visible_rect(screen),
            sec_exemption,
        }
    }
}

/// Inputs of the per-frame copy-vs-redraw decision for virtual mirrors.
#[derive(Debug, Clone, Copy)]
pub struct CopyDecisionInputs {
    pub has_cache_image: bool,
    pub color_filter_on: bool,
    pub source_hdr_present: bool,
    pub virtual_screen_muted: bool,
    pub render_skip_if_screen_off: bool,
    pub screen_hdr_present: bool,
    pub security_mismatch: bool,
}

/// The cached blit is only safe when nothing forces a fresh traversal.
pub fn decide_virtual_mirror_state(inputs: &CopyDecisionInputs) -> MirrorDrawState {
    if inputs.color_filter_on
        || inputs.source_hdr_present
        || !inputs.has_cache_image
        || inputs.virtual_screen_muted
        || inputs.render_skip_if_screen_off
        || inputs.screen_hdr_present
        || inputs.security_mismatch
    {
        MirrorDrawState::VirtualMirrorRedraw
    } else {
        MirrorDrawState::VirtualMirrorCopy
    }
}

/// Wired-projection redraw decision. The grouping is load-bearing: the
/// content triggers only apply when the ondraw path is enabled and no
/// sub-rect is in use.
#[allow(clippy::too_many_arguments)]
pub fn wired_needs_redraw(
    debug_force_redraw: bool,
    has_cache_image: bool,
    wired_ondraw_enabled: bool,
    has_visible_rect: bool,
    source_hdr_present: bool,
    has_security_layer_to_exclude: bool,
    has_black_list: bool,
    has_protected_layer: bool,
) -> bool {
    debug_force_redraw
        || !has_cache_image
        || (wired_ondraw_enabled
            && !has_visible_rect
            && (source_hdr_present
                || has_security_layer_to_exclude
                || has_black_list
                || has_protected_layer))
}

/// A visible special layer combined with differing security trust between
/// source and mirror invalidates any cached blit in either direction.
pub fn security_forces_redraw(
    source_security: bool,
    mirror_security: bool,
    special_layer_visible: bool,
) -> bool {
    special_layer_visible && source_security != mirror_security
}

/// Rotates the canvas so the source frame lands in the rotated target frame.
/// `width`/`height` are the unrotated source extents.
pub fn rotate_mirror_canvas(
    canvas: &mut dyn Canvas,
    rotation: ScreenRotation,
    width: f32,
    height: f32,
) {
    match rotation {
        ScreenRotation::Rotation0 => {}
        ScreenRotation::Rotation90 => canvas.rotate(90.0, height / 2.0, height / 2.0),
        ScreenRotation::Rotation180 => canvas.rotate(180.0, width / 2.0, height / 2.0),
        ScreenRotation::Rotation270 => canvas.rotate(270.0, width / 2.0, width / 2.0),
    }
}

/// Per-frame mirror compositor. Borrows the frame-global collaborators; all
/// drawable state lives in the scene and is resolved per call.
pub struct MirrorCompositor<'a> {
    pub screen_manager: &'a ScreenManager,
    pub config: &'a CompositorConfig,
    pub frame: &'a FrameParams,
}

impl MirrorCompositor<'_> {
    /// Draws one logical display for this frame and reports what happened.
    pub fn on_draw(
        &self,
        scene: &mut Scene,
        display_id: DisplayId,
        canvas: &mut dyn Canvas,
        processor: &mut VirtualScreenProcessor,
        renderer: &mut dyn ContentRenderer,
    ) -> MirrorDrawState {
        let Some(display) = scene.displays.get(&display_id) else {
            error!(display = display_id.0, "draw aborted: display drawable missing");
            return MirrorDrawState::NotMirroring;
        };
        match (display.params.composite_type, display.params.mirror_source) {
            (CompositeType::UniRender, Some(source)) => {
                self.draw_wired_mirror(scene, display_id, source, canvas, renderer)
            }
            (CompositeType::UniRenderMirror, Some(source)) => {
                self.draw_virtual_mirror(scene, display_id, source, canvas, processor, renderer)
            }
            (CompositeType::UniRenderMirror, None) => {
                error!(display = display_id.0, "mirror display has no mirror source");
                MirrorDrawState::NotMirroring
            }
            (CompositeType::UniRenderExpand, _) => {
                self.draw_expand_screen(scene, display_id, canvas, processor, renderer)
            }
            _ => MirrorDrawState::NotMirroring,
        }
    }

    fn draw_virtual_mirror(
        &self,
        scene: &mut Scene,
        display_id: DisplayId,
        source_id: DisplayId,
        canvas: &mut dyn Canvas,
        processor: &mut VirtualScreenProcessor,
        renderer: &mut dyn ContentRenderer,
    ) -> MirrorDrawState {
        let Scene { displays, screens, surfaces } = scene;
        let (display, source_display) = pair_mut(displays, &display_id, &source_id);
        let (Some(display), Some(source_display)) = (display, source_display) else {
            error!(
                display = display_id.0,
                source = source_id.0,
                "mirror draw aborted: display drawable pair missing"
            );
            return MirrorDrawState::NotMirroring;
        };
        let mirror_sid = display.params.screen_id;
        let source_sid = source_display.params.screen_id;
        let (mirror_screen, source_screen) = pair_mut(screens, &mirror_sid, &source_sid);
        let (Some(mirror_screen), Some(source_screen)) = (mirror_screen, source_screen) else {
            error!(
                screen = mirror_sid.0,
                source = source_sid.0,
                "mirror draw aborted: screen drawable missing"
            );
            return MirrorDrawState::NotMirroring;
        };

        let ctx = MirrorDrawContext::build(
            self.screen_manager,
            mirror_screen.id,
            display.params.security_exemption,
        );

        let security_mismatch = security_forces_redraw(
            source_display.params.is_security_display,
            display.params.is_security_display,
            source_display.params.has_visible_security_surface,
        );
        let cache_image = if self.config.mirror.cache_image_enabled {
            source_screen.cache_image.clone()
        } else {
            None
        };
        let inputs = CopyDecisionInputs {
            has_cache_image: cache_image.is_some(),
            color_filter_on: self.frame.color_filter_on,
            source_hdr_present: source_screen.params.hdr_present,
            virtual_screen_muted: display.params.virtual_screen_muted,
            render_skip_if_screen_off: source_screen.params.render_skip_if_screen_off,
            screen_hdr_present: mirror_screen.params.hdr_present,
            security_mismatch,
        };
        match decide_virtual_mirror_state(&inputs) {
            MirrorDrawState::VirtualMirrorCopy => {
                let Some(image) = cache_image else {
                    error!("mirror copy chosen without a cache image");
                    return MirrorDrawState::NotMirroring;
                };
                self.draw_mirror_copy(
                    display,
                    source_display.params.matrix,
                    mirror_screen,
                    source_screen,
                    surfaces,
                    canvas,
                    processor,
                    &ctx,
                    image,
                )
            }
            _ => {
                if source_display.params.has_visible_security_surface
                    && !display.params.is_security_display
                    && !ctx.sec_exemption
                {
                    debug!(
                        display = display_id.0,
                        "secure layer visible on untrusted mirror, masked output"
                    );
                    let mirror_info = mirror_screen.params.screen_info.clone();
                    self.draw_security_mask(canvas, &mirror_info, mirror_screen.id);
                    display.session.virtual_dirty_need_refresh = true;
                    self.finish_session(
                        display,
                        &ctx,
                        canvas.total_matrix(),
                        source_display.params.matrix,
                    );
                    return MirrorDrawState::SecurityMaskOnly;
                }
                self.draw_mirror_redraw(
                    display,
                    source_display.params.matrix,
                    mirror_screen,
                    source_screen,
                    surfaces,
                    canvas,
                    processor,
                    renderer,
                    &ctx,
                )
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_mirror_redraw(
        &self,
        display: &mut LogicalDisplay,
        mirror_matrix: Matrix,
        mirror_screen: &mut ScreenDrawable,
        source_screen: &mut ScreenDrawable,
        surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
        canvas: &mut dyn Canvas,
        processor: &mut VirtualScreenProcessor,
        renderer: &mut dyn ContentRenderer,
        ctx: &MirrorDrawContext,
    ) -> MirrorDrawState {
        let source_info = source_screen.params.screen_info.clone();
        let mirror_info = mirror_screen.params.screen_info.clone();
        let save = canvas.save();
        self.prepare_mirror_canvas(
            display,
            canvas,
            &source_info,
            &mirror_info,
            source_screen.id,
            mirror_screen.params.color_space,
            ctx,
            Some(&mut *processor),
        );
        let canvas_matrix = canvas.total_matrix();
        if self.frame.virtual_dirty_enabled {
            let rects = self.calculate_virtual_dirty(
                display,
                mirror_screen,
                source_screen,
                surfaces,
                processor.buffer_age(),
                ctx,
                canvas_matrix,
                mirror_matrix,
            );
            processor.set_roi_region(rects);
        }
        if processor.display_skip_in_mirror() {
            debug!("mirror redraw skipped after dirty computation");
            canvas.restore_to_count(0);
            self.finish_session(display, ctx, canvas_matrix, mirror_matrix);
            return MirrorDrawState::VirtualMirrorRedraw;
        }

        let wide_gamut = mirror_screen.params.color_space == ColorSpace::DisplayP3;
        // Half-float output only when the target's pixel format can hold it.
        let hdr_capable = mirror_screen.params.pixel_format == ColorType::RgbaF16;
        let ratio = source_screen.params.hdr_brightness_ratio;
        if source_screen.params.hdr_present || (ratio - 1.0).abs() > BRIGHTNESS_RATIO_EPSILON {
            // Tone mapping runs over the finished offscreen snapshot.
            let request = OffscreenRequest {
                width: mirror_info.width as i32,
                height: mirror_info.height as i32,
                use_fixed_size: false,
                rotation_in_flight: false,
                hdr: source_screen.params.hdr_present && hdr_capable,
                wide_gamut,
                offset: (display.params.offset_x, display.params.offset_y),
                brightness_ratio: ratio,
            };
            let mut pass = display.offscreen.prepare(&mut *canvas, &request);
            renderer.capture_content(&display.params, pass.canvas(), ctx);
            if self.frame.color_filter_on || self.frame.high_contrast_on {
                renderer.apply_color_filter(pass.canvas(), wide_gamut);
            }
            display.offscreen.finish(pass);
        } else {
            renderer.capture_content(&display.params, canvas, ctx);
            if self.frame.color_filter_on || self.frame.high_contrast_on {
                renderer.apply_color_filter(canvas, wide_gamut);
            }
        }
        if self.frame.curtain_screen_on {
            canvas.clear(Color::BLACK);
        }
        self.draw_watermark(canvas, &mirror_info);
        canvas.restore_to_count(save - 1);
        self.finish_session(display, ctx, canvas_matrix, mirror_matrix);
        MirrorDrawState::VirtualMirrorRedraw
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_mirror_copy(
        &self,
        display: &mut LogicalDisplay,
        mirror_matrix: Matrix,
        mirror_screen: &mut ScreenDrawable,
        source_screen: &mut ScreenDrawable,
        surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
        canvas: &mut dyn Canvas,
        processor: &mut VirtualScreenProcessor,
        ctx: &MirrorDrawContext,
        cache_image: Image,
    ) -> MirrorDrawState {
        let source_info = source_screen.params.screen_info.clone();
        let mirror_info = mirror_screen.params.screen_info.clone();
        let save = canvas.save();
        self.prepare_mirror_canvas(
            display,
            canvas,
            &source_info,
            &mirror_info,
            source_screen.id,
            mirror_screen.params.color_space,
            ctx,
            Some(&mut *processor),
        );
        let canvas_matrix = canvas.total_matrix();
        if self.frame.virtual_dirty_enabled {
            let rects = self.calculate_virtual_dirty(
                display,
                mirror_screen,
                source_screen,
                surfaces,
                processor.buffer_age(),
                ctx,
                canvas_matrix,
                mirror_matrix,
            );
            processor.set_roi_region(rects);
        }
        if processor.display_skip_in_mirror() {
            debug!("mirror copy skipped after dirty computation");
            canvas.restore_to_count(0);
            self.finish_session(display, ctx, canvas_matrix, mirror_matrix);
            return MirrorDrawState::VirtualMirrorCopy;
        }
        processor.set_mirror_copy(display.session.is_mirror_slr_copy);
        let sampling = match (&display.slr, display.session.is_mirror_slr_copy) {
            (Some(slr), true) => slr.sampling(),
            _ => Sampling::LINEAR,
        };
        processor.process_cache_image(canvas, &cache_image, sampling);
        canvas.restore_to_count(save - 1);
        self.finish_session(display, ctx, canvas_matrix, mirror_matrix);
        MirrorDrawState::VirtualMirrorCopy
    }

    fn draw_wired_mirror(
        &self,
        scene: &mut Scene,
        display_id: DisplayId,
        source_id: DisplayId,
        canvas: &mut dyn Canvas,
        renderer: &mut dyn ContentRenderer,
    ) -> MirrorDrawState {
        let Scene { displays, screens, surfaces } = scene;
        let (display, source_display) = pair_mut(displays, &display_id, &source_id);
        let (Some(display), Some(source_display)) = (display, source_display) else {
            error!(
                display = display_id.0,
                source = source_id.0,
                "wired mirror draw aborted: display drawable pair missing"
            );
            return MirrorDrawState::NotMirroring;
        };
        let wired_sid = display.params.screen_id;
        let source_sid = source_display.params.screen_id;
        let (wired_screen, source_screen) = pair_mut(screens, &wired_sid, &source_sid);
        let (Some(wired_screen), Some(source_screen)) = (wired_screen, source_screen) else {
            error!(
                screen = wired_sid.0,
                source = source_sid.0,
                "wired mirror draw aborted: screen drawable missing"
            );
            return MirrorDrawState::NotMirroring;
        };

        let ctx = MirrorDrawContext::build(
            self.screen_manager,
            wired_screen.id,
            display.params.security_exemption,
        );
        let cache_image = if self.config.mirror.cache_image_enabled {
            source_screen.cache_image.clone()
        } else {
            None
        };
        let has_security_layer_to_exclude = source_display.params.has_visible_security_surface
            && !self.config.mirror.external_screen_secure
            && !ctx.sec_exemption;
        let redraw = wired_needs_redraw(
            self.config.mirror.debug_force_redraw,
            cache_image.is_some(),
            self.config.mirror.wired_ondraw_enabled,
            ctx.visible_rect.is_some(),
            source_screen.params.hdr_present,
            has_security_layer_to_exclude,
            !ctx.black_list.is_empty(),
            source_display.params.has_protected_layer,
        );

        let source_info = source_screen.params.screen_info.clone();
        let wired_info = wired_screen.params.screen_info.clone();
        let save = canvas.save();
        self.prepare_mirror_canvas(
            display,
            canvas,
            &source_info,
            &wired_info,
            source_screen.id,
            wired_screen.params.color_space,
            &ctx,
            None,
        );
        let canvas_matrix = canvas.total_matrix();
        if self.frame.virtual_dirty_enabled {
            let age = wired_screen.dirty.buffer_age();
            let rects = self.calculate_virtual_dirty_for_wired(
                display,
                wired_screen,
                source_screen,
                surfaces,
                age,
                &ctx,
                canvas_matrix,
                source_display.params.matrix,
            );
            wired_screen.damage_region = rects;
        }
        if redraw {
            let filtered = has_security_layer_to_exclude
                || !ctx.black_list.is_empty()
                || !ctx.type_black_list.is_empty();
            if filtered {
                renderer.capture_content(&display.params, canvas, &ctx);
            } else {
                renderer.draw_content(&display.params, canvas);
            }
        } else if let Some(image) = &cache_image {
            let sampling = match (&display.slr, display.session.is_mirror_slr_copy) {
                (Some(slr), true) => slr.sampling(),
                _ => Sampling::LINEAR,
            };
            canvas.draw_image(image, 0.0, 0.0, sampling, &Paint {
                anti_alias: true,
                brightness: None,
            });
        }
        canvas.restore_to_count(save - 1);
        self.finish_session(display, &ctx, canvas_matrix, source_display.params.matrix);
        MirrorDrawState::WiredProjection
    }

    fn draw_expand_screen(
        &self,
        scene: &mut Scene,
        display_id: DisplayId,
        canvas: &mut dyn Canvas,
        processor: &mut VirtualScreenProcessor,
        renderer: &mut dyn ContentRenderer,
    ) -> MirrorDrawState {
        let Scene { displays, screens, surfaces } = scene;
        let Some(display) = displays.get_mut(&display_id) else {
            error!(display = display_id.0, "expand draw aborted: display drawable missing");
            return MirrorDrawState::NotMirroring;
        };
        let missing_screen_id = display.params.screen_id;
        let Some(screen) = screens.get_mut(&missing_screen_id) else {
            error!(
                screen = missing_screen_id.0,
                "expand draw aborted: screen drawable missing"
            );
            return MirrorDrawState::NotMirroring;
        };
        let ctx = MirrorDrawContext::build(
            self.screen_manager,
            screen.id,
            display.params.security_exemption,
        );
        let aggregator =
            DamageAggregator::new(&self.config.dirty_region, self.config.graphics.origin);
        if aggregator.check_virtual_expand_screen_skip(
            screen,
            surfaces,
            &ctx.black_list,
            &ctx.type_black_list,
        ) {
            debug!(screen = screen.id.0, "expand screen unchanged, composition skipped");
            accumulate_dirty_state(screen, surfaces);
            processor.set_display_skip_in_mirror(true);
            canvas.restore_to_count(0);
            return MirrorDrawState::NotMirroring;
        }
        let canvas_matrix = canvas.total_matrix();
        if self.frame.virtual_dirty_enabled {
            let merged = aggregator.merge_dirty_history_in_virtual(
                screen,
                surfaces,
                processor.buffer_age(),
                &ctx.black_list,
                &ctx.type_black_list,
            );
            let mut mapped = merged.map(&canvas_matrix);
            let info = screen.params.screen_info.clone();
            if info.is_sampling_on {
                let (sampled, drawn) = aggregator.expand_for_sampling(&mapped, &info);
                screen.params.drawn_region = drawn;
                mapped = sampled;
            }
            let mut rects = screen_intersect_dirty_rects(
                &mapped,
                info.rotated_height(),
                self.config.graphics.origin,
            );
            if rects.is_empty() {
                rects.push(Rect::ZERO);
            }
            processor.set_roi_region(rects);
        }
        renderer.draw_content(&display.params, canvas);
        MirrorDrawState::NotMirroring
    }

    /// Sets up the mirror transform: visible-rect clip, SLR or uniform fit
    /// scale, then rotation correction. Width/height swap before the scale
    /// factor computation on quarter turns.
    #[allow(clippy::too_many_arguments)]
    fn prepare_mirror_canvas(
        &self,
        display: &mut LogicalDisplay,
        canvas: &mut dyn Canvas,
        source_info: &ScreenInfo,
        mirror_info: &ScreenInfo,
        source_screen: ScreenId,
        color_space: ColorSpace,
        ctx: &MirrorDrawContext,
        processor: Option<&mut VirtualScreenProcessor>,
    ) {
        let rotation = display
            .params
            .mirror_source_rotation
            .unwrap_or(source_info.rotation)
            .corrected_by(self.screen_manager.screen_correction(source_screen));
        let (src_width, src_height) = if rotation.is_quarter() {
            (source_info.height as f32, source_info.width as f32)
        } else {
            (source_info.width as f32, source_info.height as f32)
        };
        let (dst_width, dst_height) = (mirror_info.width as f32, mirror_info.height as f32);

        if let Some(visible) = ctx.visible_rect {
            // Sub-rect mirroring; the SLR scaler is not consulted on this path.
            display.session.is_mirror_slr_copy = false;
            canvas_clip_region_for_uniscale_mode(canvas, visible, dst_width, dst_height);
        } else if self.config.mirror.slr_scale_enabled {
            let slr = display.slr.get_or_insert_with(|| {
                SlrScaleFunction::new(src_width, src_height, dst_width, dst_height, color_space)
            });
            slr.check_or_refresh_screen(src_width, src_height, dst_width, dst_height, color_space);
            canvas.concat_matrix(&slr.scale_matrix());
            display.session.is_mirror_slr_copy = slr.is_slr_copy();
        } else {
            display.session.is_mirror_slr_copy = false;
            match processor {
                // The processor records the fit matrix for the codec layer.
                Some(processor) => processor
                    .scale_mirror_if_needed(src_width, src_height, dst_width, dst_height, canvas),
                // Wired targets have no virtual processor; fit in place.
                None => {
                    if src_width > 0.0 && src_height > 0.0 {
                        let scale = (dst_width / src_width).min(dst_height / src_height);
                        canvas.translate(
                            (dst_width - src_width * scale) / 2.0,
                            (dst_height - src_height * scale) / 2.0,
                        );
                        canvas.scale(scale, scale);
                    }
                }
            }
        }
        rotate_mirror_canvas(canvas, rotation, source_info.width as f32, source_info.height as f32);
    }

    fn mirror_change_detected(
        &self,
        display: &LogicalDisplay,
        ctx: &MirrorDrawContext,
        canvas_matrix: &Matrix,
        mirror_matrix: &Matrix,
    ) -> bool {
        let session = &display.session;
        display.params.special_layer_changed
            || self.frame.force_mirror_screen_dirty
            || self.frame.virtual_dirty_refresh
            || session.virtual_dirty_need_refresh
            || ctx.black_list != session.last_black_list
            || ctx.type_black_list != session.last_type_black_list
            || ctx.visible_rect != session.last_visible_rect
            || ctx.sec_exemption != session.last_sec_exemption
            || *canvas_matrix != session.last_canvas_matrix
            || *mirror_matrix != session.last_mirror_matrix
    }

    /// Virtual-target damage for this frame, in codec coordinates. Incremental
    /// history only holds while the producer's vsync is regular and nothing
    /// about the mirror setup changed; otherwise the whole surface is dirty.
    #[allow(clippy::too_many_arguments)]
    fn calculate_virtual_dirty(
        &self,
        display: &mut LogicalDisplay,
        mirror_screen: &mut ScreenDrawable,
        source_screen: &mut ScreenDrawable,
        surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
        mut buffer_age: usize,
        ctx: &MirrorDrawContext,
        canvas_matrix: Matrix,
        mirror_matrix: Matrix,
    ) -> Vec<Rect> {
        if !source_screen.params.equal_vsync_period {
            debug!("irregular vsync period, requesting unrestricted refresh");
            return Vec::new();
        }
        if self.mirror_change_detected(display, ctx, &canvas_matrix, &mirror_matrix) {
            debug!("mirror state changed, dirty history reset to full surface");
            display.session.virtual_dirty_need_refresh = false;
            mirror_screen.dirty.reset_dirty_as_surface_size();
            buffer_age = 0;
        }
        let aggregator =
            DamageAggregator::new(&self.config.dirty_region, self.config.graphics.origin);
        let merged = aggregator.merge_dirty_history_in_virtual(
            source_screen,
            surfaces,
            buffer_age,
            &ctx.black_list,
            &ctx.type_black_list,
        );
        let mut mapped = merged.map(&canvas_matrix);
        mapped.or_rect(&mirror_screen.dirty.current_frame_dirty());
        let info = mirror_screen.params.screen_info.clone();
        let mut filter_matrix = canvas_matrix;
        if info.is_sampling_on {
            let (sampled, drawn) = aggregator.expand_for_sampling(&mapped, &info);
            mirror_screen.params.drawn_region = drawn;
            mapped = sampled;
            let sampling = scale_translate(
                info.sampling_scale,
                info.sampling_translate_x,
                info.sampling_translate_y,
            );
            filter_matrix = concat(&sampling, &canvas_matrix);
        }
        // Filter expansion last, with the source filters mapped into final
        // target coordinates. Cached filter content is never trusted on
        // virtual targets.
        let cache = FilterCacheView {
            partial_render_allowed: false,
            valid_for_occlusion: &self.frame.filter_cache_valid_for_occlusion,
        };
        let filter_order = source_screen.params.surfaces.clone();
        let mut draw = mapped.clone();
        expand_filter_dirty(
            &mut mapped,
            &mut draw,
            source_screen,
            surfaces,
            &filter_order,
            Some(&filter_matrix),
            false,
            &cache,
        );
        let mut rects = screen_intersect_dirty_rects(
            &mapped,
            info.rotated_height(),
            self.config.graphics.origin,
        );
        if rects.is_empty() {
            rects.push(Rect::ZERO);
        }
        rects
    }

    /// Wired variant: same history rules, no sampling, damage stays with the
    /// wired screen drawable instead of a virtual processor.
    #[allow(clippy::too_many_arguments)]
    fn calculate_virtual_dirty_for_wired(
        &self,
        display: &mut LogicalDisplay,
        wired_screen: &mut ScreenDrawable,
        source_screen: &mut ScreenDrawable,
        surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
        mut buffer_age: usize,
        ctx: &MirrorDrawContext,
        canvas_matrix: Matrix,
        mirror_matrix: Matrix,
    ) -> Vec<Rect> {
        if !source_screen.params.equal_vsync_period {
            debug!("irregular vsync period on wired source, unrestricted refresh");
            return Vec::new();
        }
        if self.mirror_change_detected(display, ctx, &canvas_matrix, &mirror_matrix) {
            display.session.virtual_dirty_need_refresh = false;
            wired_screen.dirty.reset_dirty_as_surface_size();
            buffer_age = 0;
        }
        let aggregator =
            DamageAggregator::new(&self.config.dirty_region, self.config.graphics.origin);
        let merged = aggregator.merge_dirty_history_in_virtual(
            source_screen,
            surfaces,
            buffer_age,
            &ctx.black_list,
            &ctx.type_black_list,
        );
        let mut mapped = merged.map(&canvas_matrix);
        mapped.or_rect(&wired_screen.dirty.current_frame_dirty());
        let mut rects = screen_intersect_dirty_rects(
            &mapped,
            wired_screen.params.screen_info.rotated_height(),
            self.config.graphics.origin,
        );
        if rects.is_empty() {
            rects.push(Rect::ZERO);
        }
        rects
    }

    /// Black placeholder with the screen's mask image centered over it.
    fn draw_security_mask(&self, canvas: &mut dyn Canvas, info: &ScreenInfo, screen: ScreenId) {
        canvas.clear(Color::BLACK);
        let Some(mask) = self.screen_manager.screen_security_mask(screen) else {
            debug!(screen = screen.0, "no security mask image, blank mirror output");
            return;
        };
        let (w, h) = (info.width as f32, info.height as f32);
        let (iw, ih) = (mask.width() as f32, mask.height() as f32);
        if iw <= 0.0 || ih <= 0.0 {
            return;
        }
        let scale = (w / iw).min(h / ih);
        let dst = RectF::new(
            (w - iw * scale) / 2.0,
            (h - ih * scale) / 2.0,
            (w + iw * scale) / 2.0,
            (h + ih * scale) / 2.0,
        );
        canvas.draw_image_rect(mask, RectF::from_wh(iw, ih), dst, Sampling::LINEAR, &Paint {
            anti_alias: true,
            brightness: None,
        });
    }

    /// Full-screen watermark, drawn in panel orientation on top of whatever
    /// transform the mirror path left on the canvas.
    fn draw_watermark(&self, canvas: &mut dyn Canvas, info: &ScreenInfo) {
        let Some(watermark) = &self.frame.watermark else {
            return;
        };
        let (iw, ih) = (watermark.width() as f32, watermark.height() as f32);
        if iw <= 0.0 || ih <= 0.0 {
            return;
        }
        let save = canvas.save();
        canvas.reset_matrix();
        let (w, h) = (info.width as f32, info.height as f32);
        rotate_mirror_canvas(canvas, info.rotation, w, h);
        canvas.draw_image_rect(
            watermark,
            RectF::from_wh(iw, ih),
            RectF::from_wh(w, h),
            Sampling::LINEAR,
            &Paint { anti_alias: true, brightness: None },
        );
        canvas.restore_to_count(save - 1);
    }

    /// Snapshots this frame's context into the session for next frame's
    /// change detection. Both halves of every last/current pair are updated
    /// by this same single-threaded call chain.
    fn finish_session(
        &self,
        display: &mut LogicalDisplay,
        ctx: &MirrorDrawContext,
        canvas_matrix: Matrix,
        mirror_matrix: Matrix,
    ) {
        let session = &mut display.session;
        session.last_black_list = ctx.black_list.clone();
        session.last_type_black_list = ctx.type_black_list.clone();
        session.last_visible_rect = ctx.visible_rect;
        session.last_sec_exemption = ctx.sec_exemption;
        session.last_canvas_matrix = canvas_matrix;
        session.last_mirror_matrix = mirror_matrix;
    }
}
