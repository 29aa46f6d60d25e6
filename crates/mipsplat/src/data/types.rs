//! Small POD types shared by the colour mapper and compositor.

/// One RGB pixel. `#[repr(C)]` so an image of `Rgb8` can be viewed as packed
/// `u8` triples via `bytemuck::cast_slice`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable, Debug, Default, PartialEq, Eq)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const BLACK: Rgb8 = Rgb8 { r: 0, g: 0, b: 0 };

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Converts a colour with components in `[0, 1]` to bytes using
    /// `round(c * 255)`. Out-of-range components saturate.
    #[inline]
    pub fn from_unit(rgb: [f64; 3]) -> Self {
        #[inline(always)]
        fn q(c: f64) -> u8 {
            (c * 255.0 + 0.5).clamp(0.0, 255.0) as u8
        }
        Self {
            r: q(rgb[0]),
            g: q(rgb[1]),
            b: q(rgb[2]),
        }
    }

    #[inline]
    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}
