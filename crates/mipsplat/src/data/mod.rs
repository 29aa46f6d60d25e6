// src/data/mod.rs
//! Input data handled by the painter.
//!
//! This module provides:
//! - Point coordinates in single or double precision.
//! - Named, typed per-point and per-cell attribute arrays.
//! - The plain-old-data pixel type used by the compositor.

pub mod arrays;
pub mod point_set;
pub mod types;

// Re-export commonly used types for convenience.
pub use self::arrays::{ArrayValues, Attributes, DataArray, Samples};
pub use self::point_set::{PointCoords, PointSet};
pub use self::types::Rgb8;
