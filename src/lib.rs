//! Bit-plane display engine for HUB75 LED matrix panels.
//!
//! ## How a HUB75 panel is driven
//!
//! A HUB75 panel has no frame memory. It is a chain of shift registers with a
//! row decoder in front, and the controller has to keep it fed forever:
//!
//! - **R G B data lines** (one set per lane) carry one bit per color per pixel;
//!   every **CLK** edge shifts them one column further.
//! - **LAT** copies the shifted row into the LED drivers.
//! - **OE** (active low) lights the latched row; pulling it high blanks it.
//! - **A..E** select which row (one per lane) is lit.
//!
//! Each LED is either on or off, so shades come from time: a channel's bit
//! `p` must be visible `2^p` times as long as bit 0. This is Binary Code
//! Modulation (BCM). The engine splits every channel into 4 to 8 **bit
//! planes** and stores them as ready-to-stream words.
//!
//! ## Pieces
//!
//! - [`color`]: quantization, lane codes and RGB565 conversion.
//! - [`panel`]: panel geometry plus the clamped [`panel::BitDepth`] and
//!   [`panel::Brightness`] values.
//! - [`frame`]: the drawable image and its 15-color overlay.
//! - [`encoder`]: turns a frame into scan and control words, for either
//!   [`encoder::Strategy`].
//! - [`bcm`]: the plane schedule the weighted strategy walks.
//! - [`transfer`]: re-arms two hardware channels from their completion
//!   interrupts through the [`transfer::TransferChannel`] trait.
//! - [`gate`] and [`refresh`]: a bounded-wait lock around encode passes and
//!   the loop that re-encodes at a fixed cadence.
//! - [`display`]: owns the buffers and ties it all together.
//!
//! Everything is `no_std` and uses `alloc` for buffers sized at runtime.
//!
//! ## Brightness strategies
//!
//! - **Gated**: the whole scan buffer streams in one transfer. Each control
//!   word tells the timing hardware how long to show its plane and how long to
//!   hold OE off.
//! - **Weighted**: every transfer is one plane. The transfer engine picks
//!   planes from a table so plane `p` comes up `2^p` times per cycle, and
//!   brightness comes from blank bits at the end of each row.
//!
//! ## Available Feature Flags
//!
//! ### `log` Feature
//! Emits engine events (configuration, skipped passes, channel start
//! failures) through the `log` crate.
//!
//! ### `defmt` Feature
//! Emits the same events through `defmt` and implements `defmt::Format` for
//! the public value types. No functional changes.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

extern crate alloc;

// must stay first so the logging macros are visible to every module
mod fmt;

pub mod bcm;
pub mod color;
pub mod display;
pub mod encoder;
pub mod frame;
pub mod gate;
pub mod panel;
pub mod refresh;
pub mod transfer;

use embedded_graphics::pixelcolor::Rgb888;

pub use display::Display;
pub use display::EngineConfig;
pub use encoder::Strategy;
pub use panel::PanelConfig;

/// Color type used in the framebuffer
pub type Color = Rgb888;

/// Number of transfers in one weighted cycle for a given bit depth.
///
/// Plane `p` is shown `2^p` times per cycle, so the cycle is
/// `1 + 2 + ... + 2^(bits-1) = 2^bits - 1` transfers long.
#[must_use]
pub const fn compute_frame_count(bits: u8) -> usize {
    (1usize << bits) - 1
}

/// Errors reported by [`transfer::TransferChannel`] implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Hub75Error {
    /// The channel is not claimed or not configured.
    ChannelUnavailable,
    /// The transfer is longer than the channel can move in one go.
    TransferTooLong {
        /// Words requested.
        words: usize,
        /// Longest transfer the channel supports.
        max: usize,
    },
    /// The channel reported a bus or descriptor fault.
    Fault,
}

impl core::fmt::Display for Hub75Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ChannelUnavailable => f.write_str("transfer channel unavailable"),
            Self::TransferTooLong { words, max } => {
                write!(f, "transfer of {words} words exceeds channel limit of {max}")
            }
            Self::Fault => f.write_str("transfer channel fault"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Hub75Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::ChannelUnavailable => defmt::write!(f, "transfer channel unavailable"),
            Self::TransferTooLong { words, max } => defmt::write!(
                f,
                "transfer of {} words exceeds channel limit of {}",
                words,
                max
            ),
            Self::Fault => defmt::write!(f, "transfer channel fault"),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::format;
    use std::string::ToString;

    use super::*;
    use embedded_graphics::pixelcolor::RgbColor;

    #[test]
    fn test_compute_frame_count() {
        assert_eq!(compute_frame_count(4), 15);
        assert_eq!(compute_frame_count(5), 31);
        assert_eq!(compute_frame_count(6), 63);
        assert_eq!(compute_frame_count(7), 127);
        assert_eq!(compute_frame_count(8), 255);

        for bits in 1..=8 {
            assert_eq!(compute_frame_count(bits), (1usize << bits) - 1);
        }
    }

    #[test]
    fn test_compute_frame_count_is_sum_of_plane_weights() {
        for bits in 4..=8u8 {
            let weights: usize = (0..bits).map(|p| 1usize << p).sum();
            assert_eq!(compute_frame_count(bits), weights);
        }
    }

    #[test]
    fn test_helper_functions_const() {
        const BITS: u8 = 4;
        const FRAME_COUNT: usize = compute_frame_count(BITS);
        assert_eq!(FRAME_COUNT, 15);
    }

    #[test]
    fn test_color_type_alias() {
        let red_color: Color = Color::RED;
        let red_rgb888: Rgb888 = Rgb888::RED;

        assert_eq!(red_color, red_rgb888);
        assert_eq!(red_color.r(), 255);
        assert_eq!(red_color.g(), 0);
        assert_eq!(red_color.b(), 0);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Hub75Error::ChannelUnavailable.to_string(),
            "transfer channel unavailable"
        );
        assert_eq!(
            Hub75Error::TransferTooLong {
                words: 70_000,
                max: 65_535
            }
            .to_string(),
            "transfer of 70000 words exceeds channel limit of 65535"
        );
        assert_eq!(format!("{:?}", Hub75Error::Fault), "Fault");
    }
}
