//! Root-side compositing: reduced maxima → RGB image → overlay in the
//! current render target.

use crate::accumulator::{MipImage, EMPTY_PIXEL};
use crate::color::ColorTable;
use crate::data::Rgb8;
use crate::error::MipError;
use glam::{DMat4, DVec3, DVec4};
use rayon::prelude::*;

/// Depth (eye-space z under the overlay's orthographic projection) at which
/// the image is drawn: just in front of the far plane, so geometry drawn
/// afterwards lands in front of it while the cleared background stays behind.
pub const OVERLAY_Z: f64 = -0.99;

/// The graphics surface the painter presents into.
///
/// Row 0 of an image passed to [`RenderTarget::draw_pixels`] is the bottom
/// row, and the viewport origin is the bottom-left corner.
pub trait RenderTarget {
    /// Current viewport as `[x, y, width, height]`.
    fn viewport(&self) -> [i32; 4];

    /// Current `(projection, modelview)` matrices.
    fn matrices(&self) -> (DMat4, DMat4);

    fn set_matrices(&mut self, projection: DMat4, modelview: DMat4);

    /// Draws a `width x height` packed RGB image with its lower-left corner at
    /// `raster_pos`, transformed by the current matrices.
    fn draw_pixels(
        &mut self,
        raster_pos: DVec3,
        width: usize,
        height: usize,
        rgb: &[u8],
    ) -> Result<(), MipError>;
}

/// Maps every reduced pixel to a colour. Untouched (or NaN) pixels take the
/// background colour; the rest go through `table`.
pub fn colorize(image: &MipImage, table: &ColorTable, background: Rgb8) -> Vec<Rgb8> {
    image
        .values
        .par_iter()
        .map(|&v| {
            if v == EMPTY_PIXEL || v.is_nan() {
                background
            } else {
                table.map_value(v)
            }
        })
        .collect()
}

/// Draws `pixels` as a full-viewport overlay, restoring the target's
/// projection and modelview matrices afterwards, also on failure.
pub fn present(
    target: &mut dyn RenderTarget,
    width: usize,
    height: usize,
    pixels: &[Rgb8],
) -> Result<(), MipError> {
    if pixels.len() != width * height {
        return Err(MipError::ImageSize {
            width,
            height,
            expected: width * height * 3,
            got: pixels.len() * 3,
        });
    }

    let (saved_projection, saved_modelview) = target.matrices();
    let [vx, vy, vw, vh] = target.viewport();
    let (left, bottom) = (vx as f64, vy as f64);

    let ortho = DMat4::orthographic_rh_gl(left, left + vw as f64, bottom, bottom + vh as f64, -1.0, 1.0);
    target.set_matrices(ortho, DMat4::IDENTITY);

    let drawn = target.draw_pixels(
        DVec3::new(left, bottom, OVERLAY_Z),
        width,
        height,
        bytemuck::cast_slice(pixels),
    );

    target.set_matrices(saved_projection, saved_modelview);
    drawn
}

/// Software framebuffer with a depth buffer. Stands in for a window surface
/// in headless runs and lets callers read the presented image back.
#[derive(Debug, Clone)]
pub struct ImageTarget {
    width: usize,
    height: usize,
    viewport: [i32; 4],
    projection: DMat4,
    modelview: DMat4,
    color: Vec<Rgb8>,
    depth: Vec<f32>,
}

impl ImageTarget {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            viewport: [0, 0, width as i32, height as i32],
            projection: DMat4::IDENTITY,
            modelview: DMat4::IDENTITY,
            color: vec![Rgb8::BLACK; width * height],
            depth: vec![1.0; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn set_viewport(&mut self, viewport: [i32; 4]) {
        self.viewport = viewport;
    }

    /// Fills colour with `background` and resets depth to the far plane.
    pub fn clear(&mut self, background: Rgb8) {
        self.color.fill(background);
        self.depth.fill(1.0);
    }

    /// Pixel at window coordinates (origin bottom-left).
    pub fn pixel(&self, x: usize, y: usize) -> Rgb8 {
        self.color[x + y * self.width]
    }

    pub fn depth(&self, x: usize, y: usize) -> f32 {
        self.depth[x + y * self.width]
    }

    /// Writes one fragment with a less-or-equal depth test. Returns whether
    /// it passed.
    pub fn plot(&mut self, x: usize, y: usize, depth: f32, rgb: Rgb8) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let i = x + y * self.width;
        if depth <= self.depth[i] {
            self.depth[i] = depth;
            self.color[i] = rgb;
            true
        } else {
            false
        }
    }

    /// Packed RGB rows, top row first (the order image encoders expect).
    pub fn to_top_down_rgb(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * self.height * 3);
        for y in (0..self.height).rev() {
            let row = &self.color[y * self.width..(y + 1) * self.width];
            out.extend_from_slice(bytemuck::cast_slice(row));
        }
        out
    }
}

impl RenderTarget for ImageTarget {
    fn viewport(&self) -> [i32; 4] {
        self.viewport
    }

    fn matrices(&self) -> (DMat4, DMat4) {
        (self.projection, self.modelview)
    }

    fn set_matrices(&mut self, projection: DMat4, modelview: DMat4) {
        self.projection = projection;
        self.modelview = modelview;
    }

    fn draw_pixels(
        &mut self,
        raster_pos: DVec3,
        width: usize,
        height: usize,
        rgb: &[u8],
    ) -> Result<(), MipError> {
        if rgb.len() != width * height * 3 {
            return Err(MipError::ImageSize {
                width,
                height,
                expected: width * height * 3,
                got: rgb.len(),
            });
        }

        let clip = self.projection * self.modelview * DVec4::from((raster_pos, 1.0));
        if clip.w == 0.0 {
            return Err(MipError::Present("raster position has w == 0".into()));
        }
        let ndc = clip.truncate() / clip.w;
        if !(-1.0..=1.0).contains(&ndc.z) {
            // Raster position clipped: nothing is drawn.
            return Ok(());
        }

        let [vx, vy, vw, vh] = self.viewport;
        let wx = (vx as f64 + (ndc.x + 1.0) * 0.5 * vw as f64).round() as i64;
        let wy = (vy as f64 + (ndc.y + 1.0) * 0.5 * vh as f64).round() as i64;
        let depth = ((ndc.z + 1.0) * 0.5) as f32;

        let src: &[Rgb8] = bytemuck::cast_slice(rgb);
        for row in 0..height {
            let y = wy + row as i64;
            if y < 0 || y >= self.height as i64 {
                continue;
            }
            for col in 0..width {
                let x = wx + col as i64;
                if x < 0 || x >= self.width as i64 {
                    continue;
                }
                self.plot(x as usize, y as usize, depth, src[col + row * width]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::TransferFunction;

    fn image_with(width: usize, height: usize, hits: &[(usize, usize, f64)]) -> MipImage {
        let mut values = vec![EMPTY_PIXEL; width * height];
        for &(x, y, v) in hits {
            values[x + y * width] = v;
        }
        MipImage::new(width, height, values)
    }

    #[test]
    fn untouched_pixels_get_background_exactly() {
        let bg = Rgb8::from_unit([0.1, 0.2, 0.3]);
        let table = TransferFunction::rainbow().build();
        let img = image_with(4, 3, &[(1, 1, 0.0), (2, 2, 1.0)]);

        let px = colorize(&img, &table, bg);

        assert_eq!(px[1 + 4], Rgb8::new(255, 0, 0));
        assert_eq!(px[2 + 2 * 4], Rgb8::new(0, 0, 255));
        let untouched = px.iter().filter(|&&p| p == bg).count();
        assert_eq!(untouched, 10);
    }

    #[test]
    fn present_draws_overlay_and_restores_matrices() {
        let mut target = ImageTarget::new(3, 2);
        let proj = DMat4::from_scale(DVec3::splat(2.0));
        let mv = DMat4::from_translation(DVec3::new(1.0, 0.0, 0.0));
        target.set_matrices(proj, mv);
        target.clear(Rgb8::BLACK);

        let pixels: Vec<Rgb8> = (0..6).map(|i| Rgb8::new(i as u8, 0, 0)).collect();
        present(&mut target, 3, 2, &pixels).unwrap();

        assert_eq!(target.matrices(), (proj, mv));
        assert_eq!(target.pixel(0, 0), Rgb8::new(0, 0, 0));
        assert_eq!(target.pixel(2, 0), Rgb8::new(2, 0, 0));
        assert_eq!(target.pixel(1, 1), Rgb8::new(4, 0, 0));
    }

    #[test]
    fn overlay_sits_between_background_and_later_geometry() {
        let mut target = ImageTarget::new(2, 2);
        target.clear(Rgb8::new(9, 9, 9));
        present(&mut target, 2, 2, &[Rgb8::new(200, 0, 0); 4]).unwrap();

        // Drawn over the cleared background...
        assert_eq!(target.pixel(0, 0), Rgb8::new(200, 0, 0));
        let overlay_depth = target.depth(0, 0);
        assert!(overlay_depth < 1.0);

        // ...but geometry at any nearer depth still wins afterwards.
        assert!(target.plot(0, 0, 0.9, Rgb8::new(0, 255, 0)));
        assert_eq!(target.pixel(0, 0), Rgb8::new(0, 255, 0));
    }

    #[test]
    fn mismatched_image_is_rejected_and_state_kept() {
        let mut target = ImageTarget::new(2, 2);
        let before = target.matrices();
        assert!(present(&mut target, 2, 2, &[Rgb8::BLACK; 3]).is_err());
        assert_eq!(target.matrices(), before);
    }

    #[test]
    fn top_down_export_flips_rows() {
        let mut target = ImageTarget::new(1, 2);
        target.plot(0, 0, 0.0, Rgb8::new(1, 1, 1));
        target.plot(0, 1, 0.0, Rgb8::new(2, 2, 2));
        assert_eq!(target.to_top_down_rgb(), vec![2, 2, 2, 1, 1, 1]);
    }
}
