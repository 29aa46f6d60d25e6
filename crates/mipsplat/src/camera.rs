use crate::bounds::Bounds;
use glam::{DMat4, DVec3};

/// Orbit camera producing OpenGL-convention (Z in [-1, 1]) world → clip
/// matrices. World "up" is +Z.
#[derive(Debug, Clone)]
pub struct Camera {
    // --- Orbital Parameters (Primary State) ---
    /// The world point the camera orbits around.
    pub target: DVec3,
    /// Distance from the camera to the target.
    pub radius: f64,
    /// Azimuth angle around the up axis (radians).
    pub azimuth_rad: f64,
    /// Elevation angle above the XY plane (radians).
    pub elevation_rad: f64,

    // --- Projection Parameters ---
    /// Vertical field of view (radians).
    pub fov_y_rad: f64,
    pub near: f64,
    pub far: f64,

    // --- Derived Properties (Updated by `update()`) ---
    position: DVec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(DVec3::ZERO, 10.0)
    }
}

impl Camera {
    /// Creates a camera orbiting `target` at `radius`.
    pub fn new(target: DVec3, radius: f64) -> Self {
        let mut camera = Self {
            target,
            radius,
            azimuth_rad: 45.0f64.to_radians(),
            elevation_rad: 30.0f64.to_radians(),
            fov_y_rad: 30.0f64.to_radians(),
            near: 0.01,
            far: 1000.0,
            position: DVec3::ZERO, // placeholder
        };

        camera.update(); // Calculate initial position
        camera
    }

    /// Recalculates the camera position from its orbital parameters. Must be
    /// called after any orbital parameter changes.
    pub fn update(&mut self) {
        // Elevation stays short of the poles so the up vector never aligns
        // with the view direction.
        let limit = 89.0f64.to_radians();
        self.elevation_rad = self.elevation_rad.clamp(-limit, limit);

        let (sin_az, cos_az) = self.azimuth_rad.sin_cos();
        let (sin_el, cos_el) = self.elevation_rad.sin_cos();
        let offset = DVec3::new(
            self.radius * cos_el * cos_az,
            self.radius * cos_el * sin_az,
            self.radius * sin_el,
        );
        self.position = self.target + offset;
    }

    /// Sets a new orbit target and radius, then updates the camera state.
    pub fn set_target_and_radius(&mut self, target: [f64; 3], radius: f64) {
        self.target = DVec3::from(target);
        self.radius = radius;
        self.update();
    }

    /// Centres the orbit on `bounds` and backs off until the bounding sphere
    /// fits the vertical field of view. Near/far planes follow the radius.
    pub fn frame_bounds(&mut self, bounds: &Bounds) {
        if bounds.is_empty() {
            return;
        }
        let half_diag = (0.5 * bounds.diagonal()).max(1e-6);
        let radius = half_diag / (0.5 * self.fov_y_rad).sin();

        self.near = (radius - half_diag).max(radius * 1e-3);
        self.far = radius + half_diag * 2.0;
        self.set_target_and_radius(bounds.center(), radius);
    }

    #[inline]
    pub fn position(&self) -> [f64; 3] {
        self.position.into()
    }

    pub fn view(&self) -> DMat4 {
        DMat4::look_at_rh(self.position, self.target, DVec3::Z)
    }

    pub fn projection(&self, aspect: f64) -> DMat4 {
        DMat4::perspective_rh_gl(self.fov_y_rad, aspect, self.near, self.far)
    }

    /// Combined world → clip matrix for a tiled image of the given aspect
    /// ratio (width / height).
    pub fn composite_projection(&self, tiled_aspect: f64) -> DMat4 {
        self.projection(tiled_aspect) * self.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec4;

    #[test]
    fn target_projects_to_screen_centre() {
        let cam = Camera::new(DVec3::new(1.0, 2.0, 3.0), 5.0);
        let clip = cam.composite_projection(1.5) * DVec4::new(1.0, 2.0, 3.0, 1.0);
        assert!((clip.x / clip.w).abs() < 1e-12);
        assert!((clip.y / clip.w).abs() < 1e-12);
        assert!(clip.w > 0.0);
    }

    #[test]
    fn framed_bounds_fit_the_frustum() {
        let mut cam = Camera::default();
        let b = Bounds::new([-2.0, -1.0, 0.0], [2.0, 1.0, 0.5]);
        cam.frame_bounds(&b);
        let m = cam.composite_projection(1.0);
        for &x in &[b.min[0], b.max[0]] {
            for &y in &[b.min[1], b.max[1]] {
                for &z in &[b.min[2], b.max[2]] {
                    let c = m * DVec4::new(x, y, z, 1.0);
                    assert!((c.x / c.w).abs() <= 1.0);
                    assert!((c.y / c.w).abs() <= 1.0);
                }
            }
        }
    }

    #[test]
    fn elevation_is_clamped() {
        let mut cam = Camera::default();
        cam.elevation_rad = 3.0;
        cam.update();
        assert!(cam.elevation_rad < 90.0f64.to_radians());
    }
}
