//! Reconciles the logical (render-window) viewport with the viewport of the
//! tiled display that actually receives the image.
//!
//! Only single-level tiling is supported: a tile layout reports a flat list of
//! tile rectangles, and tiles-of-tiles are not resolved.

/// Tile counts at or above this are treated as bogus.
pub const MAX_TRUSTED_TILES: i32 = 32;

/// Size and origin of the full tiled image as the render window reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiledViewport {
    pub size: [i32; 2],
    pub origin: [i32; 2],
}

impl TiledViewport {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            size: [width, height],
            origin: [0, 0],
        }
    }
}

/// One display tile in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Query interface onto an external distributed-display system.
pub trait TileLayout {
    /// Number of tiles, or `None` when the display system is not initialized.
    fn tile_count(&self) -> Option<i32>;

    /// Tile rectangles, in tile order.
    fn tile_viewports(&self) -> Vec<TileRect>;
}

/// A fixed tile list, for front ends that know their wall layout up front.
#[derive(Debug, Clone, Default)]
pub struct StaticTileLayout {
    pub tiles: Vec<TileRect>,
}

impl TileLayout for StaticTileLayout {
    fn tile_count(&self) -> Option<i32> {
        Some(self.tiles.len() as i32)
    }

    fn tile_viewports(&self) -> Vec<TileRect> {
        self.tiles.clone()
    }
}

/// Per-frame pixel geometry of the MIP image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportGeometry {
    pub width: usize,
    pub height: usize,
    pub origin: [i32; 2],
    /// Multiplies `ndc + 1` to give a pixel coordinate, per axis.
    pub scale: [f64; 2],
}

impl ViewportGeometry {
    /// Geometry for a plain `width x height` image covering the whole window.
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            origin: [0, 0],
            scale: [width as f64 / 2.0, height as f64 / 2.0],
        }
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Resolves the authoritative image size and NDC → pixel scale.
///
/// `renderer_viewport` is the local renderer's `[x_min, y_min, x_max, y_max]`
/// fraction of the window. Returns `None` when the resolved size is empty, in
/// which case nothing is rendered.
pub fn resolve_viewport(
    tiled: &TiledViewport,
    renderer_viewport: [f64; 4],
    layout: Option<&dyn TileLayout>,
) -> Option<ViewportGeometry> {
    let mut tile = [tiled.size[0], tiled.size[1]];

    if let Some(layout) = layout {
        match layout.tile_count() {
            Some(n) if n > 0 && n < MAX_TRUSTED_TILES => {
                if let Some(first) = layout.tile_viewports().first() {
                    tile = [first.width, first.height];
                } else {
                    log::warn!("display reports {} tiles but no viewports; using window size", n);
                }
            }
            Some(n) => {
                log::debug!("ignoring implausible tile count {}; using window size", n);
            }
            None => {}
        }
    }

    if tile[0] <= 0 || tile[1] <= 0 {
        log::debug!("empty viewport {}x{}; nothing to render", tile[0], tile[1]);
        return None;
    }

    let [x0, y0, x1, y1] = renderer_viewport;
    let ratio = |dim: i32, lo: f64, hi: f64| dim as f64 * (hi - lo) / 2.0 + dim as f64 * lo;

    Some(ViewportGeometry {
        width: tile[0] as usize,
        height: tile[1] as usize,
        origin: tiled.origin,
        scale: [ratio(tile[0], x0, x1), ratio(tile[1], y0, y1)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: [f64; 4] = [0.0, 0.0, 1.0, 1.0];

    struct Uninitialized;

    impl TileLayout for Uninitialized {
        fn tile_count(&self) -> Option<i32> {
            None
        }
        fn tile_viewports(&self) -> Vec<TileRect> {
            Vec::new()
        }
    }

    fn tiles(n: usize, w: i32, h: i32) -> StaticTileLayout {
        StaticTileLayout {
            tiles: (0..n)
                .map(|i| TileRect { x: i as i32 * w, y: 0, width: w, height: h })
                .collect(),
        }
    }

    #[test]
    fn no_layout_uses_window() {
        let g = resolve_viewport(&TiledViewport::new(640, 480), FULL, None).unwrap();
        assert_eq!((g.width, g.height), (640, 480));
        assert_eq!(g.scale, [320.0, 240.0]);
    }

    #[test]
    fn uninitialized_display_uses_window() {
        let g = resolve_viewport(&TiledViewport::new(100, 50), FULL, Some(&Uninitialized)).unwrap();
        assert_eq!((g.width, g.height), (100, 50));
    }

    #[test]
    fn trusted_tile_count_overrides_window() {
        let layout = tiles(4, 256, 128);
        let g = resolve_viewport(&TiledViewport::new(1024, 128), FULL, Some(&layout)).unwrap();
        assert_eq!((g.width, g.height), (256, 128));
        assert_eq!(g.scale, [128.0, 64.0]);
    }

    #[test]
    fn implausible_tile_counts_fall_back() {
        let layout = tiles(32, 10, 10);
        let g = resolve_viewport(&TiledViewport::new(300, 200), FULL, Some(&layout)).unwrap();
        assert_eq!((g.width, g.height), (300, 200));

        let layout = tiles(0, 10, 10);
        let g = resolve_viewport(&TiledViewport::new(300, 200), FULL, Some(&layout)).unwrap();
        assert_eq!((g.width, g.height), (300, 200));
    }

    #[test]
    fn sub_viewport_ratio() {
        // Renderer covers the right half of the window horizontally.
        let g = resolve_viewport(&TiledViewport::new(400, 200), [0.5, 0.0, 1.0, 1.0], None).unwrap();
        assert_eq!(g.scale, [400.0 * 0.5 / 2.0 + 400.0 * 0.5, 100.0]);
    }

    #[test]
    fn empty_viewport_renders_nothing() {
        assert!(resolve_viewport(&TiledViewport::new(0, 480), FULL, None).is_none());
        let layout = tiles(1, 0, 0);
        assert!(resolve_viewport(&TiledViewport::new(640, 480), FULL, Some(&layout)).is_none());
    }
}
