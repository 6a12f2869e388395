//! Offscreen pass management.
//!
//! Effects that post-process the whole composed frame (HDR tone mapping,
//! scRGB widening, rotation buffering) draw into a temporary offscreen
//! surface and blit the snapshot back afterwards. [`OffscreenPass`] scopes
//! the redirection: the original canvas is captured by the pass and handed
//! back in `finish`, so an early return can never leave drawing pointed at a
//! stale target.

use tracing::{debug, warn};

use crate::canvas::{Canvas, ColorSpace, ColorType, ImageInfo, OffscreenSurface, Paint, Sampling};
use crate::config::OffscreenConfig;

/// Brightness ratios closer to 1.0 than this skip the tone-map pass.
pub const BRIGHTNESS_RATIO_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, Copy)]
pub struct OffscreenRequest {
    pub width: i32,
    pub height: i32,
    /// Keep the surface across frames, sized to survive a rotation animation.
    pub use_fixed_size: bool,
    /// A rotation change is in flight this frame.
    pub rotation_in_flight: bool,
    pub hdr: bool,
    pub wide_gamut: bool,
    /// Pre-rotation translate, undone when the snapshot is drawn back.
    pub offset: (f32, f32),
    pub brightness_ratio: f32,
}

impl OffscreenRequest {
    pub fn sized(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            use_fixed_size: false,
            rotation_in_flight: false,
            hdr: false,
            wide_gamut: false,
            offset: (0.0, 0.0),
            brightness_ratio: 1.0,
        }
    }
}

/// An in-flight offscreen redirection. Holds the original canvas for the
/// matching `finish`; degenerate or unsupported requests degrade to a
/// pass-through where [`OffscreenPass::canvas`] is the original canvas.
pub struct OffscreenPass<'a> {
    backup: &'a mut dyn Canvas,
    surface: Option<Box<dyn OffscreenSurface>>,
    retain: bool,
    offset: (f32, f32),
    brightness_ratio: f32,
}

impl OffscreenPass<'_> {
    /// The canvas to draw the scoped content into.
    pub fn canvas(&mut self) -> &mut dyn Canvas {
        match self.surface.as_mut() {
            Some(surface) => surface.canvas(),
            None => self.backup,
        }
    }

    pub fn is_offscreen(&self) -> bool {
        self.surface.is_some()
    }
}

pub struct OffscreenRenderCoordinator {
    config: OffscreenConfig,
    retained: Option<Box<dyn OffscreenSurface>>,
}

impl OffscreenRenderCoordinator {
    pub fn new(config: OffscreenConfig) -> Self {
        Self { config, retained: None }
    }

    /// Starts an offscreen pass. Reuses the retained fixed-size surface while
    /// its dimensions and format still match, otherwise allocates from the
    /// canvas's backing store.
    pub fn prepare<'a>(
        &mut self,
        canvas: &'a mut dyn Canvas,
        request: &OffscreenRequest,
    ) -> OffscreenPass<'a> {
        let surface = match self.surface_info(request) {
            None => None,
            Some(info) => {
                let retained = self.retained.take().filter(|s| s.image_info() == info);
                match retained {
                    Some(surface) => Some(surface),
                    None => {
                        let created = canvas.make_surface(&info);
                        if created.is_none() {
                            warn!(
                                width = info.width,
                                height = info.height,
                                "offscreen surface unavailable, drawing directly"
                            );
                        }
                        created
                    }
                }
            }
        };
        OffscreenPass {
            backup: canvas,
            surface,
            retain: request.use_fixed_size,
            offset: request.offset,
            brightness_ratio: request.brightness_ratio,
        }
    }

    /// Ends the pass: snapshots the offscreen content, applies the tone-map
    /// ratio when it deviates from 1.0, and draws the result back onto the
    /// original canvas with the pre-rotation offset undone.
    pub fn finish(&mut self, pass: OffscreenPass<'_>) {
        let OffscreenPass { backup, surface, retain, offset, brightness_ratio } = pass;
        let Some(mut surface) = surface else {
            return;
        };
        let Some(snapshot) = surface.snapshot() else {
            warn!("offscreen snapshot failed, pass content dropped");
            return;
        };
        let mut paint = Paint::default();
        if (brightness_ratio - 1.0).abs() > BRIGHTNESS_RATIO_EPSILON {
            paint.brightness = Some(brightness_ratio);
        }
        let save = backup.save();
        backup.reset_matrix();
        backup.draw_image(&snapshot, -offset.0, -offset.1, Sampling::LINEAR, &paint);
        backup.restore_to_count(save - 1);
        if retain {
            self.retained = Some(surface);
        }
    }

    pub fn has_retained_surface(&self) -> bool {
        self.retained.is_some()
    }

    pub fn release_retained_surface(&mut self) {
        self.retained = None;
    }

    fn surface_info(&self, request: &OffscreenRequest) -> Option<ImageInfo> {
        let (mut width, mut height) = (request.width, request.height);
        if width <= 0 || height <= 0 {
            debug!(width, height, "degenerate offscreen request, drawing directly");
            return None;
        }
        if self.config.rotate_offscreen_enabled
            && request.use_fixed_size
            && request.rotation_in_flight
        {
            // A square sized to the max side survives 90-degree steps; the
            // diagonal survives arbitrary intermediate angles.
            let side = if self.config.cache_optimize_rotate {
                (width as f64).hypot(height as f64).ceil() as i32
            } else {
                width.max(height)
            };
            width = side;
            height = side;
        }
        let color_type = if request.hdr || (request.wide_gamut && self.config.scrgb_for_p3) {
            ColorType::RgbaF16
        } else {
            ColorType::Rgba8888
        };
        let color_space = if request.wide_gamut && !self.config.scrgb_for_p3 {
            ColorSpace::DisplayP3
        } else {
            ColorSpace::Srgb
        };
        Some(ImageInfo::new(width, height, color_type, color_space))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{DrawOp, RecordingCanvas};
    use crate::geometry::Matrix;

    fn coordinator() -> OffscreenRenderCoordinator {
        OffscreenRenderCoordinator::new(OffscreenConfig::default())
    }

    #[test]
    fn test_prepare_finish_restores_original_canvas_state() {
        let mut canvas = RecordingCanvas::new(1080, 1920);
        canvas.translate(5.0, 5.0);
        let matrix_before = canvas.total_matrix();
        let count_before = canvas.save_count();

        let mut coord = coordinator();
        for _ in 0..3 {
            let mut pass = coord.prepare(&mut canvas, &OffscreenRequest::sized(1080, 1920));
            assert!(pass.is_offscreen());
            pass.canvas().clear(crate::canvas::Color::BLACK);
            coord.finish(pass);
        }
        assert_eq!(canvas.total_matrix(), matrix_before);
        assert_eq!(canvas.save_count(), count_before);
        // Each finished pass drew its snapshot back.
        let draws =
            canvas.ops().iter().filter(|op| matches!(op, DrawOp::DrawImage { .. })).count();
        assert_eq!(draws, 3);
    }

    #[test]
    fn test_degenerate_request_degrades_to_pass_through() {
        let mut canvas = RecordingCanvas::new(1080, 1920);
        let mut coord = coordinator();
        let mut pass = coord.prepare(&mut canvas, &OffscreenRequest::sized(0, 1920));
        assert!(!pass.is_offscreen());
        pass.canvas().clear(crate::canvas::Color::BLACK);
        coord.finish(pass);
        // The clear landed on the original canvas; nothing was blitted back.
        assert_eq!(canvas.ops(), &[DrawOp::Clear(crate::canvas::Color::BLACK)]);
    }

    #[test]
    fn test_brightness_ratio_applied_beyond_epsilon() {
        let mut canvas = RecordingCanvas::new(100, 100);
        let mut coord = coordinator();

        let mut request = OffscreenRequest::sized(100, 100);
        request.brightness_ratio = 1.0002;
        let pass = coord.prepare(&mut canvas, &request);
        coord.finish(pass);

        request.brightness_ratio = 1.3;
        let pass = coord.prepare(&mut canvas, &request);
        coord.finish(pass);

        let brightness: Vec<Option<f32>> = canvas
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::DrawImage { brightness, .. } => Some(*brightness),
                _ => None,
            })
            .collect();
        assert_eq!(brightness, vec![None, Some(1.3)]);
    }

    #[test]
    fn test_fixed_size_surface_retained_and_rotation_sized() {
        let mut canvas = RecordingCanvas::new(1080, 1920);
        let mut coord = coordinator();
        let mut request = OffscreenRequest::sized(1080, 1920);
        request.use_fixed_size = true;
        request.rotation_in_flight = true;

        let mut pass = coord.prepare(&mut canvas, &request);
        // Square sized to the longer side.
        assert_eq!(pass.canvas().width(), 1920);
        assert_eq!(pass.canvas().height(), 1920);
        coord.finish(pass);
        assert!(coord.has_retained_surface());

        // Matching request reuses; a dimension change reallocates.
        let pass = coord.prepare(&mut canvas, &request);
        coord.finish(pass);
        assert!(coord.has_retained_surface());
        request.width = 720;
        request.height = 1280;
        let mut pass = coord.prepare(&mut canvas, &request);
        assert_eq!(pass.canvas().width(), 1280);
        coord.finish(pass);
    }

    #[test]
    fn test_diagonal_sizing_with_cache_optimize_rotate() {
        let config = OffscreenConfig { cache_optimize_rotate: true, ..Default::default() };
        let mut coord = OffscreenRenderCoordinator::new(config);
        let mut canvas = RecordingCanvas::new(300, 400);
        let mut request = OffscreenRequest::sized(300, 400);
        request.use_fixed_size = true;
        request.rotation_in_flight = true;
        let mut pass = coord.prepare(&mut canvas, &request);
        assert_eq!(pass.canvas().width(), 500);
        coord.finish(pass);
    }

    #[test]
    fn test_hdr_request_uses_half_float_format() {
        let mut coord = coordinator();
        let mut request = OffscreenRequest::sized(100, 100);
        request.hdr = true;
        let info = coord.surface_info(&request).unwrap();
        assert_eq!(info.color_type, ColorType::RgbaF16);
        assert_eq!(info.color_space, ColorSpace::Srgb);

        request.hdr = false;
        request.wide_gamut = true;
        let info = coord.surface_info(&request).unwrap();
        assert_eq!(info.color_type, ColorType::Rgba8888);
        assert_eq!(info.color_space, ColorSpace::DisplayP3);

        coord.config.scrgb_for_p3 = true;
        let info = coord.surface_info(&request).unwrap();
        assert_eq!(info.color_type, ColorType::RgbaF16);
        assert_eq!(info.color_space, ColorSpace::Srgb);
    }

    #[test]
    fn test_finish_draw_ignores_canvas_transform() {
        let mut canvas = RecordingCanvas::new(100, 100);
        canvas.translate(40.0, 40.0);
        let mut coord = coordinator();
        let mut request = OffscreenRequest::sized(100, 100);
        request.offset = (10.0, 20.0);
        let pass = coord.prepare(&mut canvas, &request);
        coord.finish(pass);
        assert_ne!(canvas.total_matrix(), Matrix::identity());
        let drawn = canvas.ops().iter().any(
            |op| matches!(op, DrawOp::DrawImage { x, y, .. } if *x == -10.0 && *y == -20.0),
        );
        assert!(drawn);
    }
}
