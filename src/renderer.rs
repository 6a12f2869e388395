//! Scene-content drawing collaborator.
//!
//! The render-node scene graph and its traversal live with the embedder;
//! this core only decides what gets drawn where. Mirror targets use the
//! capture traversal, which honors the per-draw exclusion context instead of
//! drawing the tree verbatim.

use crate::canvas::Canvas;
use crate::display::DisplayParams;
use crate::display::mirror::MirrorDrawContext;

pub trait ContentRenderer {
    /// Full scene traversal for direct and wired output.
    fn draw_content(&mut self, display: &DisplayParams, canvas: &mut dyn Canvas);

    /// Black/white-list aware capture traversal for mirror targets.
    fn capture_content(
        &mut self,
        display: &DisplayParams,
        canvas: &mut dyn Canvas,
        ctx: &MirrorDrawContext,
    );

    /// Accessibility color filter over the composed output.
    fn apply_color_filter(&mut self, canvas: &mut dyn Canvas, display_p3: bool);
}
