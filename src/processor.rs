//! Virtual screen processor boundary.
//!
//! The processor fronts the hardware/virtual-screen codec layer: it receives
//! the per-frame ROI rect list and skip decisions, and owns the scale/clip
//! helpers applied to the virtual canvas before content is drawn or a cached
//! image is blitted.

use tracing::debug;

use crate::canvas::{Canvas, Image, Paint, Sampling};
use crate::geometry::{Matrix, Rect, RectF};

/// Damage sink of the codec layer.
///
/// Contract: an empty rect list means "no ROI restriction", i.e. a full
/// refresh. Callers that mean "nothing changed" must pass the zero-area
/// sentinel rect instead.
pub trait RoiSink {
    fn set_roi_region(&mut self, rects: Vec<Rect>);
    fn set_display_skip_in_mirror(&mut self, skip: bool);
    fn set_dirty_info(&mut self, rects: Vec<Rect>);
}

/// Per-frame processor for one virtual/mirror output. Created by the
/// embedder with the target buffer's age, consumed by the mirror draw call.
pub struct VirtualScreenProcessor {
    buffer_age: usize,
    display_skip_in_mirror: bool,
    mirror_copy: bool,
    canvas_matrix: Matrix,
    roi_region: Vec<Rect>,
    dirty_info: Vec<Rect>,
}

impl VirtualScreenProcessor {
    pub fn new(buffer_age: usize) -> Self {
        Self {
            buffer_age,
            display_skip_in_mirror: false,
            mirror_copy: false,
            canvas_matrix: Matrix::identity(),
            roi_region: Vec::new(),
            dirty_info: Vec::new(),
        }
    }

    pub fn buffer_age(&self) -> usize {
        self.buffer_age
    }

    pub fn display_skip_in_mirror(&self) -> bool {
        self.display_skip_in_mirror
    }

    pub fn is_mirror_copy(&self) -> bool {
        self.mirror_copy
    }

    pub fn set_mirror_copy(&mut self, copy: bool) {
        self.mirror_copy = copy;
    }

    pub fn canvas_matrix(&self) -> Matrix {
        self.canvas_matrix
    }

    pub fn roi_region(&self) -> &[Rect] {
        &self.roi_region
    }

    pub fn dirty_info(&self) -> &[Rect] {
        &self.dirty_info
    }

    /// Uniform-fit scale of the source extent into the target extent,
    /// centered. No-op when the extents already match or are degenerate.
    pub fn scale_mirror_if_needed(
        &mut self,
        src_width: f32,
        src_height: f32,
        dst_width: f32,
        dst_height: f32,
        canvas: &mut dyn Canvas,
    ) {
        if src_width <= 0.0 || src_height <= 0.0 {
            return;
        }
        if src_width != dst_width || src_height != dst_height {
            let scale = (dst_width / src_width).min(dst_height / src_height);
            canvas.translate(
                (dst_width - src_width * scale) / 2.0,
                (dst_height - src_height * scale) / 2.0,
            );
            canvas.scale(scale, scale);
        }
        self.canvas_matrix = canvas.total_matrix();
    }

    /// Blits the source screen's cached snapshot through the current canvas
    /// transform.
    pub fn process_cache_image(&self, canvas: &mut dyn Canvas, image: &Image, sampling: Sampling) {
        let paint = Paint { anti_alias: true, brightness: None };
        canvas.draw_image(image, 0.0, 0.0, sampling, &paint);
    }
}

impl RoiSink for VirtualScreenProcessor {
    fn set_roi_region(&mut self, rects: Vec<Rect>) {
        debug!(rects = rects.len(), "ROI region handed to codec");
        self.roi_region = rects;
    }

    fn set_display_skip_in_mirror(&mut self, skip: bool) {
        self.display_skip_in_mirror = skip;
    }

    fn set_dirty_info(&mut self, rects: Vec<Rect>) {
        self.dirty_info = rects;
    }
}

/// Clips the target to its own extent and maps the source's visible sub-rect
/// onto it, uniformly scaled and centered.
pub fn canvas_clip_region_for_uniscale_mode(
    canvas: &mut dyn Canvas,
    visible: Rect,
    dst_width: f32,
    dst_height: f32,
) {
    if visible.is_empty() {
        return;
    }
    let (vw, vh) = (visible.width as f32, visible.height as f32);
    let scale = (dst_width / vw).min(dst_height / vh);
    canvas.clip_rect(RectF::from_wh(dst_width, dst_height));
    canvas.translate((dst_width - vw * scale) / 2.0, (dst_height - vh * scale) / 2.0);
    canvas.scale(scale, scale);
    canvas.translate(-visible.left as f32, -visible.top as f32);
}
