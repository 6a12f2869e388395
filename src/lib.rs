//! Uni-render compositor core.
//!
//! Composes a tree of surface buffers into final frames: per-frame damage
//! region algebra feeding minimal redraw rect lists to the display codec, and
//! the mirror/virtual-screen drawing state machine deciding between full
//! redraws, cached-snapshot copies and skipped frames.
//!
//! Rasterization, GPU surfaces, vsync delivery and IPC live outside this
//! crate; they are consumed through the [`canvas`], [`renderer`], [`screen`]
//! and [`processor`] collaborator interfaces.

pub mod canvas;
pub mod config;
pub mod dirty;
pub mod display;
pub mod geometry;
pub mod processor;
pub mod region;
pub mod renderer;
pub mod scene;
pub mod screen;

/// Render node id. Ids are handed out by the embedding scene graph; the core
/// only compares and stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub u64);

/// Physical or virtual screen id, matching the screen manager's numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScreenId(pub u64);

/// Logical display drawable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DisplayId(pub u64);
