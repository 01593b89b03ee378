//! Color pipeline.
//!
//! Pure functions that turn 8-bit-per-channel colors (and legacy RGB565 values)
//! into the per-plane bits the encoder shifts out. Nothing in here keeps state
//! and nothing can fail: out-of-range bits are masked away.

use bitfield::bitfield;
use embedded_graphics::pixelcolor::RgbColor;

use crate::panel::BitDepth;
use crate::Color;

/// Quantize one 8-bit channel to the active bit depth.
///
/// Only the `bits` most significant bits survive, so with 4 bit planes
/// `0xF7` becomes `0x0F`.
#[inline]
#[must_use]
pub const fn quantize(channel: u8, bits: BitDepth) -> u8 {
    channel >> (8 - bits.get())
}

/// Returns bit `plane` of the quantized channel.
///
/// Plane 0 is the least significant retained bit; plane `bits - 1` is the
/// channel's most significant bit.
#[inline]
#[must_use]
pub const fn plane_bit(channel: u8, plane: u8, bits: BitDepth) -> bool {
    (quantize(channel, bits) >> plane) & 1 != 0
}

/// Quantize all three channels of a color.
#[inline]
#[must_use]
pub fn quantize_color(color: Color, bits: BitDepth) -> (u8, u8, u8) {
    (
        quantize(color.r(), bits),
        quantize(color.g(), bits),
        quantize(color.b(), bits),
    )
}

bitfield! {
    /// The three data bits one pixel contributes to one output lane for one
    /// bit plane, in panel pin order.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct LaneCode(u8);
    impl Debug;
    pub red, set_red: 0;
    pub green, set_green: 1;
    pub blue, set_blue: 2;
}

impl LaneCode {
    /// Lane code of already quantized channels for `plane`.
    #[inline]
    #[must_use]
    pub fn from_quantized((r, g, b): (u8, u8, u8), plane: u8) -> Self {
        Self(((r >> plane) & 1) | (((g >> plane) & 1) << 1) | (((b >> plane) & 1) << 2))
    }

    /// Raw 3-bit value.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Lane code of `color` for bit `plane` at the given depth.
#[inline]
#[must_use]
pub fn lane_code(color: Color, plane: u8, bits: BitDepth) -> LaneCode {
    LaneCode::from_quantized(quantize_color(color, bits), plane)
}

/// Pack a color into the `0x00RRGGBB` word layout.
#[inline]
#[must_use]
pub fn pack(color: Color) -> u32 {
    (u32::from(color.r()) << 16) | (u32::from(color.g()) << 8) | u32::from(color.b())
}

/// Unpack a `0x00RRGGBB` word. The top byte is ignored.
#[inline]
#[must_use]
pub const fn unpack(packed: u32) -> Color {
    Color::new(
        ((packed >> 16) & 0xff) as u8,
        ((packed >> 8) & 0xff) as u8,
        (packed & 0xff) as u8,
    )
}

/// Convert an RGB565 value to a color, squaring each channel so that the
/// linear 5/6-bit ramp becomes perceptually even on the LEDs.
#[must_use]
pub const fn rgb565_to_color(raw: u16) -> Color {
    let raw = raw as u32;
    let r = raw & 0xf800;
    let g = raw & 0x07e0;
    let b = raw & 0x001f;
    Color::new(
        ((r * r) >> 24) as u8,
        ((g * g) >> 14) as u8,
        ((b * b) >> 2) as u8,
    )
}

/// Convert an RGB565 value to a color without gamma correction.
#[must_use]
pub const fn rgb565_to_color_linear(raw: u16) -> Color {
    let raw = raw as u32;
    Color::new(
        ((raw >> 8) & 0xf8) as u8,
        ((raw >> 3) & 0xfc) as u8,
        ((raw << 3) & 0xf8) as u8,
    )
}

/// Convert a color to RGB565, dropping the low channel bits.
#[must_use]
pub fn color_to_rgb565(color: Color) -> u16 {
    (u16::from(color.r() & 0xf8) << 8)
        | (u16::from(color.g() & 0xfc) << 3)
        | u16::from(color.b() >> 3)
}
