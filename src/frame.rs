//! Application-owned image buffers.
//!
//! [`Framebuffer`] holds one [`Color`] per pixel, [`OverlayBuffer`] holds a
//! 4-bit palette index per pixel where 0 means "show the framebuffer". Both
//! are sized from a [`PanelConfig`] and implement `embedded-graphics`
//! [`DrawTarget`] so regular drawing primitives can target either one.

use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;

use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::pixelcolor::raw::RawU4;
use embedded_graphics::pixelcolor::PixelColor;
use embedded_graphics::pixelcolor::RgbColor;
use embedded_graphics::prelude::OriginDimensions;
use embedded_graphics::prelude::Point;
use embedded_graphics::prelude::Size;
use embedded_graphics::Pixel;

use crate::color::quantize_color;
use crate::color::rgb565_to_color;
use crate::panel::BitDepth;
use crate::panel::PanelConfig;
use crate::Color;

/// Number of palette entries, including the reserved index 0.
pub const PALETTE_SIZE: usize = 16;

fn index_of(point: Point, width: usize, height: usize) -> Option<usize> {
    let x = usize::try_from(point.x).ok()?;
    let y = usize::try_from(point.y).ok()?;
    if x >= width || y >= height {
        return None;
    }
    Some(y * width + x)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyColor {
    quantized: (u8, u8, u8),
    bits: BitDepth,
}

/// The logical image, one [`Color`] per pixel.
#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer {
    width: usize,
    height: usize,
    pixels: Vec<Color>,
    key: Option<KeyColor>,
}

impl Framebuffer {
    /// Create a black framebuffer sized for `panel`.
    #[must_use]
    pub fn new(panel: &PanelConfig) -> Self {
        Self {
            width: panel.width(),
            height: panel.height(),
            pixels: vec![Color::BLACK; panel.pixel_count()],
            key: None,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Color at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside the framebuffer.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> Color {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        self.pixels[y * self.width + x]
    }

    /// All pixels in row-major order.
    #[must_use]
    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    /// Set the pixel at `(x, y)`. Coordinates outside the framebuffer and
    /// pixels matching the key color are ignored.
    pub fn set_pixel(&mut self, x: usize, y: usize, color: Color) {
        if x >= self.width || y >= self.height || self.is_keyed(color) {
            return;
        }
        self.pixels[y * self.width + x] = color;
    }

    /// Suppress drawing of every color that quantizes to the same value as
    /// `key` at `bits` planes. `None` disables keying.
    pub fn set_key_color(&mut self, key: Option<Color>, bits: BitDepth) {
        self.key = key.map(|color| KeyColor {
            quantized: quantize_color(color, bits),
            bits,
        });
    }

    fn is_keyed(&self, color: Color) -> bool {
        self.key
            .is_some_and(|key| quantize_color(color, key.bits) == key.quantized)
    }

    /// Copy a full RGB565 image into the framebuffer with gamma correction.
    ///
    /// Extra source values are ignored, missing ones leave the remaining
    /// pixels untouched. Keying applies as for [`Framebuffer::set_pixel`].
    pub fn fill_from_rgb565(&mut self, raw: &[u16]) {
        let key = self.key;
        for (pixel, &value) in self.pixels.iter_mut().zip(raw) {
            let color = rgb565_to_color(value);
            if key.is_some_and(|key| quantize_color(color, key.bits) == key.quantized) {
                continue;
            }
            *pixel = color;
        }
    }
}

impl core::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("keyed", &self.key.is_some())
            .finish_non_exhaustive()
    }
}

impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl DrawTarget for Framebuffer {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Some(index) = index_of(point, self.width, self.height) {
                if !self.is_keyed(color) {
                    self.pixels[index] = color;
                }
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.pixels.fill(color);
        Ok(())
    }
}

/// A palette index drawn into the [`OverlayBuffer`].
///
/// Only the low four bits are kept; index 0 is transparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayIndex(u8);

impl OverlayIndex {
    /// The transparent index.
    pub const TRANSPARENT: Self = Self(0);

    /// Create an index, masking it to four bits.
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index & 0x0f)
    }

    /// The palette index.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl PixelColor for OverlayIndex {
    type Raw = RawU4;
}

/// Per-pixel palette indices shown on top of the [`Framebuffer`].
#[derive(Clone, PartialEq, Eq)]
pub struct OverlayBuffer {
    width: usize,
    height: usize,
    indices: Vec<u8>,
}

impl OverlayBuffer {
    /// Create a fully transparent overlay sized for `panel`.
    #[must_use]
    pub fn new(panel: &PanelConfig) -> Self {
        Self {
            width: panel.width(),
            height: panel.height(),
            indices: vec![0; panel.pixel_count()],
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Palette index at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside the overlay.
    #[must_use]
    pub fn index(&self, x: usize, y: usize) -> u8 {
        assert!(x < self.width && y < self.height, "overlay index out of bounds");
        self.indices[y * self.width + x]
    }

    /// Set the palette index at `(x, y)`, masked to four bits. Coordinates
    /// outside the overlay are ignored.
    pub fn set_index(&mut self, x: usize, y: usize, index: u8) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.indices[y * self.width + x] = index & 0x0f;
    }

    /// Make every pixel transparent.
    pub fn erase(&mut self) {
        self.indices.fill(0);
    }
}

impl core::fmt::Debug for OverlayBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let used = self.indices.iter().filter(|&&i| i != 0).count();
        f.debug_struct("OverlayBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("used", &used)
            .finish()
    }
}

impl OriginDimensions for OverlayBuffer {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl DrawTarget for OverlayBuffer {
    type Color = OverlayIndex;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, index) in pixels {
            if let Some(i) = index_of(point, self.width, self.height) {
                self.indices[i] = index.get();
            }
        }
        Ok(())
    }

    fn clear(&mut self, index: Self::Color) -> Result<(), Self::Error> {
        self.indices.fill(index.get());
        Ok(())
    }
}

/// Colors for overlay indices 1..=15. Index 0 is reserved for "transparent"
/// and can never be assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayPalette([Color; PALETTE_SIZE]);

impl OverlayPalette {
    /// A palette with every entry black.
    #[must_use]
    pub const fn new() -> Self {
        Self([Color::BLACK; PALETTE_SIZE])
    }

    /// Assign a color to `index`. Index 0 and indices above 15 are ignored.
    pub fn set(&mut self, index: usize, color: Color) {
        if (1..PALETTE_SIZE).contains(&index) {
            self.0[index] = color;
        }
    }

    /// Color for `index`, or `None` for the transparent index.
    #[must_use]
    pub fn get(&self, index: u8) -> Option<Color> {
        match index & 0x0f {
            0 => None,
            i => Some(self.0[usize::from(i)]),
        }
    }
}

impl Default for OverlayPalette {
    fn default() -> Self {
        Self::new()
    }
}

/// A framebuffer and its overlay, the unit the encoder consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The logical image.
    pub framebuffer: Framebuffer,
    /// Palette overlay shown on top of the image.
    pub overlay: OverlayBuffer,
}

impl Frame {
    /// Create a black, overlay-free frame sized for `panel`.
    #[must_use]
    pub fn new(panel: &PanelConfig) -> Self {
        Self {
            framebuffer: Framebuffer::new(panel),
            overlay: OverlayBuffer::new(panel),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Framebuffer {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Framebuffer({}x{})", self.width, self.height);
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for OverlayBuffer {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "OverlayBuffer({}x{})", self.width, self.height);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::format;

    use embedded_graphics::prelude::Primitive;
    use embedded_graphics::primitives::PrimitiveStyle;
    use embedded_graphics::primitives::Rectangle;
    use embedded_graphics::Drawable;

    use super::*;
    use crate::color::color_to_rgb565;
    use crate::panel::PANEL_64X32;
    use crate::panel::PANEL_64X64;

    #[test]
    fn test_new_framebuffer_is_black() {
        let fb = Framebuffer::new(&PANEL_64X64);
        assert_eq!(fb.width(), 64);
        assert_eq!(fb.height(), 64);
        assert!(fb.pixels().iter().all(|&c| c == Color::BLACK));
    }

    #[test]
    fn test_set_pixel_ignores_out_of_bounds() {
        let mut fb = Framebuffer::new(&PANEL_64X32);
        fb.set_pixel(64, 0, Color::RED);
        fb.set_pixel(0, 32, Color::RED);
        fb.set_pixel(63, 31, Color::RED);
        assert_eq!(fb.pixel(63, 31), Color::RED);
        assert_eq!(fb.pixels().iter().filter(|&&c| c == Color::RED).count(), 1);
    }

    #[test]
    fn test_draw_target_clips() {
        let mut fb = Framebuffer::new(&PANEL_64X32);
        Rectangle::new(Point::new(-4, -4), Size::new(8, 8))
            .into_styled(PrimitiveStyle::with_fill(Color::BLUE))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.pixel(0, 0), Color::BLUE);
        assert_eq!(fb.pixel(3, 3), Color::BLUE);
        assert_eq!(fb.pixel(4, 4), Color::BLACK);
        assert_eq!(fb.pixels().iter().filter(|&&c| c == Color::BLUE).count(), 16);
    }

    #[test]
    fn test_key_color_suppresses_matching_pixels() {
        let mut fb = Framebuffer::new(&PANEL_64X32);
        fb.set_key_color(Some(Color::new(0xf0, 0x00, 0xf0)), BitDepth::MIN);
        // same value once reduced to four planes
        fb.set_pixel(1, 1, Color::new(0xff, 0x0f, 0xf3));
        fb.set_pixel(2, 1, Color::new(0xe0, 0x00, 0xf0));
        assert_eq!(fb.pixel(1, 1), Color::BLACK);
        assert_eq!(fb.pixel(2, 1), Color::new(0xe0, 0x00, 0xf0));

        fb.set_key_color(None, BitDepth::MIN);
        fb.set_pixel(1, 1, Color::new(0xf0, 0x00, 0xf0));
        assert_eq!(fb.pixel(1, 1), Color::new(0xf0, 0x00, 0xf0));
    }

    #[test]
    fn test_key_color_applies_to_primitives() {
        let mut fb = Framebuffer::new(&PANEL_64X32);
        Rectangle::new(Point::new(0, 0), Size::new(4, 4))
            .into_styled(PrimitiveStyle::with_fill(Color::GREEN))
            .draw(&mut fb)
            .unwrap();
        fb.set_key_color(Some(Color::MAGENTA), BitDepth::MAX);

        Rectangle::new(Point::new(2, 2), Size::new(4, 4))
            .into_styled(PrimitiveStyle::with_fill(Color::MAGENTA))
            .draw(&mut fb)
            .unwrap();
        Rectangle::new(Point::new(10, 0), Size::new(2, 2))
            .into_styled(PrimitiveStyle::with_fill(Color::BLUE))
            .draw(&mut fb)
            .unwrap();

        assert_eq!(fb.pixel(3, 3), Color::GREEN);
        assert_eq!(fb.pixel(5, 5), Color::BLACK);
        assert_eq!(fb.pixel(10, 1), Color::BLUE);
        assert!(fb.pixels().iter().all(|&c| c != Color::MAGENTA));
    }

    #[test]
    fn test_fill_from_rgb565() {
        let mut fb = Framebuffer::new(&PANEL_64X32);
        let raw = std::vec![color_to_rgb565(Color::WHITE); 10];
        fb.fill_from_rgb565(&raw);
        assert_eq!(fb.pixel(9, 0), rgb565_to_color(0xffff));
        assert_eq!(fb.pixel(10, 0), Color::BLACK);
    }

    #[test]
    fn test_overlay_masks_to_four_bits() {
        let mut overlay = OverlayBuffer::new(&PANEL_64X32);
        overlay.set_index(3, 4, 0x1f);
        assert_eq!(overlay.index(3, 4), 0x0f);
        assert_eq!(OverlayIndex::new(0x12).get(), 0x02);
        overlay.erase();
        assert_eq!(overlay.index(3, 4), 0);
    }

    #[test]
    fn test_overlay_draw_target() {
        let mut overlay = OverlayBuffer::new(&PANEL_64X32);
        Rectangle::new(Point::new(60, 30), Size::new(10, 10))
            .into_styled(PrimitiveStyle::with_fill(OverlayIndex::new(5)))
            .draw(&mut overlay)
            .unwrap();
        assert_eq!(overlay.index(63, 31), 5);
        assert_eq!(overlay.index(59, 31), 0);
        let debug = format!("{overlay:?}");
        assert!(debug.contains("used: 8"));
    }

    #[test]
    fn test_palette_ignores_reserved_and_out_of_range() {
        let mut palette = OverlayPalette::new();
        palette.set(0, Color::RED);
        palette.set(16, Color::RED);
        palette.set(usize::MAX, Color::RED);
        assert_eq!(palette, OverlayPalette::new());
        assert_eq!(palette.get(0), None);

        palette.set(15, Color::GREEN);
        palette.set(1, Color::BLUE);
        assert_eq!(palette.get(15), Some(Color::GREEN));
        assert_eq!(palette.get(1), Some(Color::BLUE));
        assert_eq!(palette.get(2), Some(Color::BLACK));
    }

    #[test]
    fn test_frame_dimensions_match_panel() {
        let frame = Frame::new(&PANEL_64X64);
        assert_eq!(frame.framebuffer.width(), frame.overlay.width());
        assert_eq!(frame.framebuffer.height(), frame.overlay.height());
    }
}
