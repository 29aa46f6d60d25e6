// src/lib.rs
//! Distributed maximum-intensity-projection (MIP) point splatting.
//!
//! Each rank projects its share of a point cloud into screen space and keeps
//! the largest scalar seen per pixel. The per-pixel maxima are reduced onto
//! rank 0, mapped through a colour transfer function and presented into the
//! current render target as a full-viewport overlay.
//!
//! Pipeline: bounds → viewport resolution → projection → accumulation →
//! cross-rank reduction → colour mapping → present.

pub mod accumulator;
pub mod bounds;
pub mod camera;
pub mod color;
pub mod comm;
pub mod compositor;
pub mod data;
pub mod error;
pub mod painter;
pub mod projector;
pub mod settings;
pub mod viewport;

// Re-export commonly used types for convenience.
pub use self::accumulator::{MipBuffer, MipImage, EMPTY_PIXEL};
pub use self::bounds::Bounds;
pub use self::camera::Camera;
pub use self::color::{ColorMapper, ColorTable, TransferFunction};
pub use self::comm::{ProcessGroup, ReduceOp};
pub use self::compositor::{ImageTarget, RenderTarget};
pub use self::data::{DataArray, PointCoords, PointSet, Rgb8};
pub use self::error::{CommError, MipError};
pub use self::painter::{Frame, FrameReport, MipPainter};
pub use self::settings::{ArrayAccess, MipSettings, ScalarMode};
pub use self::viewport::{TileLayout, TileRect, TiledViewport, ViewportGeometry};
