//! World → clip → NDC → pixel projection of individual points.

use crate::viewport::ViewportGeometry;
use glam::{DMat4, DVec4};

/// Where a point landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projected {
    /// Inside the image, as `(ix, iy)`.
    Pixel(usize, usize),
    /// Outside `[0, width) x [0, height)`.
    Offscreen,
    /// Homogeneous `w == 0`: no screen position exists.
    Degenerate,
}

/// Projects points with a fixed world → clip matrix for one frame.
#[derive(Debug, Clone, Copy)]
pub struct Projector {
    matrix: DMat4,
    scale: [f64; 2],
    extent: [usize; 2],
}

impl Projector {
    pub fn new(matrix: DMat4, geometry: &ViewportGeometry) -> Self {
        Self {
            matrix,
            scale: geometry.scale,
            extent: [geometry.width, geometry.height],
        }
    }

    /// Builds a projector from a row-major matrix (`rows[r][c]`).
    pub fn from_rows(rows: [[f64; 4]; 4], geometry: &ViewportGeometry) -> Self {
        Self::new(DMat4::from_cols_array_2d(&rows).transpose(), geometry)
    }

    #[inline]
    pub fn matrix(&self) -> &DMat4 {
        &self.matrix
    }

    /// Homogeneous clip coordinates of a world-space point.
    #[inline(always)]
    pub fn clip(&self, p: [f64; 3]) -> DVec4 {
        self.matrix * DVec4::new(p[0], p[1], p[2], 1.0)
    }

    #[inline]
    pub fn project(&self, p: [f64; 3]) -> Projected {
        let c = self.clip(p);
        if c.w == 0.0 {
            return Projected::Degenerate;
        }
        let ndc = [c.x / c.w, c.y / c.w];
        match (
            ndc_to_pixel(ndc[0], self.scale[0], self.extent[0]),
            ndc_to_pixel(ndc[1], self.scale[1], self.extent[1]),
        ) {
            (Some(ix), Some(iy)) => Projected::Pixel(ix, iy),
            _ => Projected::Offscreen,
        }
    }
}

/// `round((ndc + 1) * scale)` bounded to `[0, extent)`.
///
/// The closed frustum edge `ndc == 1` rounds to `extent`; it is folded into
/// the last pixel so the whole `[-1, 1]` range is visible.
#[inline(always)]
pub fn ndc_to_pixel(ndc: f64, scale: f64, extent: usize) -> Option<usize> {
    let f = ((ndc + 1.0) * scale + 0.5).floor();
    // Also rejects NaN.
    if !(f >= 0.0) {
        return None;
    }
    let e = extent as f64;
    if f < e {
        Some(f as usize)
    } else if f == e && ndc <= 1.0 && extent > 0 {
        Some(extent - 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(w: usize, h: usize) -> ViewportGeometry {
        ViewportGeometry::full(w, h)
    }

    #[test]
    fn ndc_corners_map_to_image_corners() {
        let g = geometry(64, 32);
        let p = Projector::new(DMat4::IDENTITY, &g);
        assert_eq!(p.project([-1.0, -1.0, 0.0]), Projected::Pixel(0, 0));
        assert_eq!(p.project([1.0, 1.0, 0.0]), Projected::Pixel(63, 31));
    }

    #[test]
    fn centre_maps_to_middle_pixel() {
        let p = Projector::new(DMat4::IDENTITY, &geometry(10, 10));
        assert_eq!(p.project([0.0, 0.0, 0.5]), Projected::Pixel(5, 5));
    }

    #[test]
    fn outside_frustum_is_offscreen() {
        let p = Projector::new(DMat4::IDENTITY, &geometry(10, 10));
        assert_eq!(p.project([1.5, 0.0, 0.0]), Projected::Offscreen);
        assert_eq!(p.project([0.0, -1.3, 0.0]), Projected::Offscreen);
    }

    #[test]
    fn zero_w_is_degenerate() {
        // Row 3 all zero: w is always 0.
        let rows = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
        ];
        let p = Projector::from_rows(rows, &geometry(10, 10));
        assert_eq!(p.project([0.1, 0.2, 0.3]), Projected::Degenerate);
    }

    #[test]
    fn perspective_divide_and_row_major_translation() {
        // Row-major: translation in the last column, w = 2.
        let rows = [
            [1.0, 0.0, 0.0, 0.5],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 2.0],
        ];
        let p = Projector::from_rows(rows, &geometry(100, 100));
        // x_ndc = (0.5 + 0.5) / 2 = 0.5 → 75; y_ndc = 0 → 50.
        assert_eq!(p.project([0.5, 0.0, 0.0]), Projected::Pixel(75, 50));
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(ndc_to_pixel(-1.0 + 0.49 / 5.0, 5.0, 10), Some(0));
        assert_eq!(ndc_to_pixel(-1.0 + 0.51 / 5.0, 5.0, 10), Some(1));
        assert_eq!(ndc_to_pixel(-1.0 - 0.2, 5.0, 10), None);
        assert_eq!(ndc_to_pixel(f64::NAN, 5.0, 10), None);
    }
}
