//! Drawing canvas abstraction.
//!
//! The compositor core never rasterizes. It issues clear/clip/matrix/image
//! operations against this trait; the GPU-backed implementation lives with the
//! render engine. [`RecordingCanvas`] is a full software implementation of the
//! state machine (matrix stack, clip, save/restore) that records the op stream,
//! used by the test suite and for replay debugging.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::geometry::{Matrix, Rect, RectF, concat, rotation_about, scaling, translation};

/// ARGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u32);

impl Color {
    pub const TRANSPARENT: Color = Color(0x0000_0000);
    pub const BLACK: Color = Color(0xFF00_0000);
    pub const WHITE: Color = Color(0xFFFF_FFFF);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorType {
    Rgba8888,
    RgbaF16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    DisplayP3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: i32,
    pub height: i32,
    pub color_type: ColorType,
    pub color_space: ColorSpace,
}

impl ImageInfo {
    pub fn new(width: i32, height: i32, color_type: ColorType, color_space: ColorSpace) -> Self {
        Self { width, height, color_type, color_space }
    }
}

/// Opaque handle to a GPU image snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    id: u64,
    width: i32,
    height: i32,
}

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

impl Image {
    pub fn new(width: i32, height: i32) -> Self {
        Self { id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed), width, height }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Sampling request for an image draw. `box_kernel > 1` asks the backend for
/// box-filtered downsampling over that many source texels per axis; this is
/// how the SLR scaler's lattice reaches the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampling {
    pub filter: FilterMode,
    pub box_kernel: i32,
}

impl Sampling {
    pub const NEAREST: Sampling = Sampling { filter: FilterMode::Nearest, box_kernel: 1 };
    pub const LINEAR: Sampling = Sampling { filter: FilterMode::Linear, box_kernel: 1 };

    pub fn box_filtered(kernel: i32) -> Self {
        Sampling { filter: FilterMode::Linear, box_kernel: kernel.max(1) }
    }
}

/// Paint state for image/rect draws. `brightness` carries the HDR tone-map
/// ratio; backends implement it as the per-pixel `rgb *= ratio` shader or a
/// color-matrix scale when shaders are unavailable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    pub anti_alias: bool,
    pub brightness: Option<f32>,
}

impl Default for Paint {
    fn default() -> Self {
        Self { anti_alias: false, brightness: None }
    }
}

pub trait Canvas {
    fn save(&mut self) -> usize;
    fn restore(&mut self);
    /// Pops saved states until the save count is back to `count`.
    /// `restore_to_count(0)` unwinds the whole stack.
    fn restore_to_count(&mut self, count: usize);
    fn save_count(&self) -> usize;

    fn clear(&mut self, color: Color);
    fn clip_rect(&mut self, rect: RectF);

    fn concat_matrix(&mut self, matrix: &Matrix);
    fn reset_matrix(&mut self);
    fn translate(&mut self, dx: f32, dy: f32);
    fn scale(&mut self, sx: f32, sy: f32);
    fn rotate(&mut self, degrees: f32, px: f32, py: f32);
    fn total_matrix(&self) -> Matrix;

    fn width(&self) -> i32;
    fn height(&self) -> i32;
    /// Current clip bounds in device coordinates.
    fn device_clip_bounds(&self) -> Rect;

    fn draw_image(&mut self, image: &Image, x: f32, y: f32, sampling: Sampling, paint: &Paint);
    fn draw_image_rect(
        &mut self,
        image: &Image,
        src: RectF,
        dst: RectF,
        sampling: Sampling,
        paint: &Paint,
    );
    fn draw_rect(&mut self, rect: RectF, paint: &Paint);

    /// Creates an offscreen surface compatible with this canvas's backing
    /// store. Returns `None` when the canvas has no GPU surface behind it.
    fn make_surface(&self, info: &ImageInfo) -> Option<Box<dyn OffscreenSurface>>;
}

/// A temporary render target wrapping its own canvas.
pub trait OffscreenSurface {
    fn canvas(&mut self) -> &mut dyn Canvas;
    fn snapshot(&mut self) -> Option<Image>;
    fn image_info(&self) -> ImageInfo;
}

/// One recorded canvas operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear(Color),
    ClipRect(RectF),
    DrawImage { image: u64, x: f32, y: f32, sampling: Sampling, brightness: Option<f32> },
    DrawImageRect { image: u64, src: RectF, dst: RectF, sampling: Sampling, brightness: Option<f32> },
    DrawRect { rect: RectF, brightness: Option<f32> },
}

/// Software canvas that records its op stream while maintaining real
/// matrix/clip/save state.
pub struct RecordingCanvas {
    width: i32,
    height: i32,
    matrix: Matrix,
    clip: Option<Rect>,
    stack: Vec<(Matrix, Option<Rect>)>,
    ops: Vec<DrawOp>,
}

impl RecordingCanvas {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            matrix: Matrix::identity(),
            clip: None,
            stack: Vec::new(),
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }

    fn device_rect(&self, rect: RectF) -> Rect {
        crate::geometry::map_rect(&rect.round_out(), &self.matrix)
    }
}

impl Canvas for RecordingCanvas {
    fn save(&mut self) -> usize {
        self.stack.push((self.matrix, self.clip));
        self.stack.len()
    }

    fn restore(&mut self) {
        if let Some((matrix, clip)) = self.stack.pop() {
            self.matrix = matrix;
            self.clip = clip;
        }
    }

    fn restore_to_count(&mut self, count: usize) {
        while self.stack.len() > count {
            self.restore();
        }
    }

    fn save_count(&self) -> usize {
        self.stack.len()
    }

    fn clear(&mut self, color: Color) {
        self.ops.push(DrawOp::Clear(color));
    }

    fn clip_rect(&mut self, rect: RectF) {
        let device = self.device_rect(rect);
        self.clip = Some(match self.clip {
            Some(existing) => existing.intersect(&device),
            None => device,
        });
        self.ops.push(DrawOp::ClipRect(rect));
    }

    fn concat_matrix(&mut self, matrix: &Matrix) {
        self.matrix = concat(&self.matrix, matrix);
    }

    fn reset_matrix(&mut self) {
        self.matrix = Matrix::identity();
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.concat_matrix(&translation(dx, dy));
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.concat_matrix(&scaling(sx, sy));
    }

    fn rotate(&mut self, degrees: f32, px: f32, py: f32) {
        self.concat_matrix(&rotation_about(degrees, px, py));
    }

    fn total_matrix(&self) -> Matrix {
        self.matrix
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn device_clip_bounds(&self) -> Rect {
        match self.clip {
            Some(clip) => clip,
            None => Rect::new(0, 0, self.width, self.height),
        }
    }

    fn draw_image(&mut self, image: &Image, x: f32, y: f32, sampling: Sampling, paint: &Paint) {
        self.ops.push(DrawOp::DrawImage {
            image: image.id(),
            x,
            y,
            sampling,
            brightness: paint.brightness,
        });
    }

    fn draw_image_rect(
        &mut self,
        image: &Image,
        src: RectF,
        dst: RectF,
        sampling: Sampling,
        paint: &Paint,
    ) {
        self.ops.push(DrawOp::DrawImageRect {
            image: image.id(),
            src,
            dst,
            sampling,
            brightness: paint.brightness,
        });
    }

    fn draw_rect(&mut self, rect: RectF, paint: &Paint) {
        self.ops.push(DrawOp::DrawRect { rect, brightness: paint.brightness });
    }

    fn make_surface(&self, info: &ImageInfo) -> Option<Box<dyn OffscreenSurface>> {
        if info.width <= 0 || info.height <= 0 {
            return None;
        }
        Some(Box::new(RecordingSurface {
            info: *info,
            canvas: RecordingCanvas::new(info.width, info.height),
        }))
    }
}

pub struct RecordingSurface {
    info: ImageInfo,
    canvas: RecordingCanvas,
}

impl RecordingSurface {
    pub fn recorded(&self) -> &[DrawOp] {
        self.canvas.ops()
    }
}

impl OffscreenSurface for RecordingSurface {
    fn canvas(&mut self) -> &mut dyn Canvas {
        &mut self.canvas
    }

    fn snapshot(&mut self) -> Option<Image> {
        Some(Image::new(self.info.width, self.info.height))
    }

    fn image_info(&self) -> ImageInfo {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_restore_roundtrip() {
        let mut canvas = RecordingCanvas::new(100, 100);
        let before = canvas.total_matrix();
        let count = canvas.save();
        canvas.translate(10.0, 20.0);
        canvas.scale(2.0, 2.0);
        assert_ne!(canvas.total_matrix(), before);
        canvas.restore_to_count(count - 1);
        assert_eq!(canvas.total_matrix(), before);
        assert_eq!(canvas.save_count(), 0);
    }

    #[test]
    fn test_restore_to_zero_unwinds_everything() {
        let mut canvas = RecordingCanvas::new(100, 100);
        for _ in 0..5 {
            canvas.save();
            canvas.translate(1.0, 1.0);
        }
        canvas.restore_to_count(0);
        assert_eq!(canvas.save_count(), 0);
        assert_eq!(canvas.total_matrix(), Matrix::identity());
    }

    #[test]
    fn test_clip_tracked_in_device_space() {
        let mut canvas = RecordingCanvas::new(200, 200);
        canvas.translate(50.0, 50.0);
        canvas.clip_rect(RectF::from_wh(20.0, 20.0));
        assert_eq!(canvas.device_clip_bounds(), Rect::new(50, 50, 20, 20));
    }

    #[test]
    fn test_offscreen_surface_snapshot_dims() {
        let canvas = RecordingCanvas::new(64, 64);
        let info = ImageInfo::new(32, 16, ColorType::Rgba8888, ColorSpace::Srgb);
        let mut surface = canvas.make_surface(&info).unwrap();
        let image = surface.snapshot().unwrap();
        assert_eq!((image.width(), image.height()), (32, 16));
    }
}
