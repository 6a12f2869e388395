//! Super-low-resolution mirror scaling.
//!
//! Plain bilinear sampling aliases badly once a mirror target is less than
//! half the source size: each output texel sees only a fraction of the source
//! texels it represents. The SLR scaler computes a uniform fit matrix plus a
//! box-kernel size covering the full source lattice, and hands both to the
//! image draw as a sampling request.

use tracing::debug;

use crate::canvas::{ColorSpace, Sampling};
use crate::geometry::{Matrix, scale_translate};

pub struct SlrScaleFunction {
    src_width: f32,
    src_height: f32,
    dst_width: f32,
    dst_height: f32,
    color_space: ColorSpace,
    scale: f32,
    kernel: i32,
    matrix: Matrix,
}

impl SlrScaleFunction {
    pub fn new(
        src_width: f32,
        src_height: f32,
        dst_width: f32,
        dst_height: f32,
        color_space: ColorSpace,
    ) -> Self {
        let mut slr = Self {
            src_width,
            src_height,
            dst_width,
            dst_height,
            color_space,
            scale: 1.0,
            kernel: 1,
            matrix: Matrix::identity(),
        };
        slr.refresh();
        slr
    }

    /// Revalidates against the current source/target geometry and color
    /// space; recomputes the fit only when something actually changed.
    pub fn check_or_refresh_screen(
        &mut self,
        src_width: f32,
        src_height: f32,
        dst_width: f32,
        dst_height: f32,
        color_space: ColorSpace,
    ) {
        if self.src_width == src_width
            && self.src_height == src_height
            && self.dst_width == dst_width
            && self.dst_height == dst_height
            && self.color_space == color_space
        {
            return;
        }
        debug!(src_width, src_height, dst_width, dst_height, "SLR scaler refreshed");
        self.src_width = src_width;
        self.src_height = src_height;
        self.dst_width = dst_width;
        self.dst_height = dst_height;
        self.color_space = color_space;
        self.refresh();
    }

    fn refresh(&mut self) {
        if self.src_width <= 0.0
            || self.src_height <= 0.0
            || self.dst_width <= 0.0
            || self.dst_height <= 0.0
        {
            self.scale = 1.0;
            self.kernel = 1;
            self.matrix = Matrix::identity();
            return;
        }
        let scale = (self.dst_width / self.src_width).min(self.dst_height / self.src_height);
        self.scale = scale;
        self.kernel = if scale > 0.0 { (1.0 / scale).ceil() as i32 } else { 1 };
        let tx = (self.dst_width - self.src_width * scale) / 2.0;
        let ty = (self.dst_height - self.src_height * scale) / 2.0;
        self.matrix = scale_translate(scale, tx, ty);
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Source texels covered per output texel and axis.
    pub fn kernel_size(&self) -> i32 {
        self.kernel
    }

    /// Uniform fit matrix: scale about the origin, then center in the target.
    pub fn scale_matrix(&self) -> Matrix {
        self.matrix
    }

    /// Whether the cached-image path should use SLR sampling. Above half
    /// scale a single bilinear tap already covers the source lattice.
    pub fn is_slr_copy(&self) -> bool {
        self.scale <= 0.5
    }

    pub fn sampling(&self) -> Sampling {
        Sampling::box_filtered(self.kernel)
    }
}
