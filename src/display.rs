//! The display: hardware buffers plus everything an encode pass needs.
//!
//! # Example
//! ```rust
//! use embedded_graphics::pixelcolor::RgbColor;
//! use embedded_graphics::prelude::*;
//! use embedded_graphics::primitives::PrimitiveStyle;
//! use embedded_graphics::primitives::Rectangle;
//! use hub75_bitplane::display::Display;
//! use hub75_bitplane::display::EngineConfig;
//! use hub75_bitplane::encoder::Strategy;
//! use hub75_bitplane::frame::Frame;
//! use hub75_bitplane::panel::PANEL_64X32;
//! use hub75_bitplane::Color;
//!
//! let config = EngineConfig {
//!     panel: PANEL_64X32,
//!     strategy: Strategy::Weighted,
//!     bit_planes: 6,
//!     brightness: 40,
//! };
//! let mut display = Display::new(config);
//! let mut frame = Frame::new(&config.panel);
//!
//! Rectangle::new(Point::new(4, 4), Size::new(16, 8))
//!     .into_styled(PrimitiveStyle::with_fill(Color::RED))
//!     .draw(&mut frame.framebuffer)
//!     .unwrap();
//! display.set_overlay_color(1, Color::WHITE);
//! frame.overlay.set_index(0, 0, 1);
//!
//! display.encode_frame(&frame);
//! assert_eq!(display.buffers().scan().len(), 6 * 16 * 16);
//! ```

use crate::bcm::AddressTable;
use crate::encoder::encode;
use crate::encoder::encode_control;
use crate::encoder::HardwareBuffers;
use crate::encoder::Strategy;
use crate::frame::Frame;
use crate::frame::OverlayPalette;
use crate::panel::BitDepth;
use crate::panel::Brightness;
use crate::panel::PanelConfig;
use crate::panel::PANEL_64X64;
use crate::transfer::TransferChannel;
use crate::transfer::TransferEngine;
use crate::transfer::TransferLayout;
use crate::Color;

/// Everything needed to bring up a [`Display`].
///
/// Out-of-range bit depths and brightness values are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Panel geometry.
    pub panel: PanelConfig,
    /// Brightness realization.
    pub strategy: Strategy,
    /// Requested bit planes per channel, clamped to `4..=8`.
    pub bit_planes: i32,
    /// Requested brightness, clamped per [`Brightness::clamped`].
    pub brightness: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            panel: PANEL_64X64,
            strategy: Strategy::Gated,
            bit_planes: i32::from(BitDepth::MAX.get()),
            brightness: i32::MAX,
        }
    }
}

/// Outcome of [`Display::encode_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodeStatus {
    /// The hardware buffers now hold the frame.
    Encoded,
}

/// Owns the hardware buffers, palette, brightness and strategy.
#[derive(Debug)]
pub struct Display {
    strategy: Strategy,
    brightness: Brightness,
    palette: OverlayPalette,
    buffers: HardwareBuffers,
    table: Option<AddressTable>,
}

fn schedule(strategy: Strategy, panel: &PanelConfig, bits: BitDepth) -> Option<AddressTable> {
    match strategy {
        Strategy::Gated => None,
        Strategy::Weighted => Some(AddressTable::new(panel, bits)),
    }
}

impl Display {
    /// Allocate buffers for `config`. The control buffer is valid right away;
    /// the scan buffer is black until the first [`Display::encode_frame`].
    ///
    /// # Panics
    ///
    /// Panics if the buffers cannot be allocated.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let bits = BitDepth::clamped(config.bit_planes);
        let brightness = Brightness::clamped(config.brightness, &config.panel);
        let mut buffers = HardwareBuffers::allocate(&config.panel, bits);
        encode_control(&mut buffers, config.strategy, brightness);
        info!(
            "display {}x{}, {} bit planes, brightness {}",
            config.panel.width(),
            config.panel.height(),
            bits.get(),
            brightness.level()
        );
        Self {
            strategy: config.strategy,
            brightness,
            palette: OverlayPalette::new(),
            buffers,
            table: schedule(config.strategy, &config.panel, bits),
        }
    }

    /// Change the bit depth.
    ///
    /// Stops `transfer`, replaces the buffers and schedule with ones sized
    /// for the clamped depth, then restarts `transfer` on them. The old
    /// buffers are freed after the stop and before the new ones are
    /// allocated. The new scan buffer is black until the next encode pass.
    ///
    /// Returns the depth actually configured.
    ///
    /// # Panics
    ///
    /// Panics if the new buffers cannot be allocated.
    pub fn configure<D, C>(
        &mut self,
        transfer: &mut TransferEngine<D, C>,
        bit_planes: i32,
    ) -> BitDepth
    where
        D: TransferChannel,
        C: TransferChannel,
    {
        transfer.stop();
        let panel = *self.panel();
        let bits = BitDepth::clamped(bit_planes);
        self.table = None;
        self.buffers.reallocate(bits);
        encode_control(&mut self.buffers, self.strategy, self.brightness);
        self.table = schedule(self.strategy, &panel, bits);
        info!("configured {} bit planes", bits.get());
        transfer.start(self.transfer_layout());
        bits
    }

    /// Arm `transfer` on the current buffers.
    pub fn start<D, C>(&self, transfer: &mut TransferEngine<D, C>)
    where
        D: TransferChannel,
        C: TransferChannel,
    {
        transfer.start(self.transfer_layout());
    }

    /// Rewrite the hardware buffers from `frame` in place.
    ///
    /// # Panics
    ///
    /// Panics if `frame` was not created for this display's panel.
    pub fn encode_frame(&mut self, frame: &Frame) -> EncodeStatus {
        encode(
            &mut self.buffers,
            frame,
            &self.palette,
            self.strategy,
            self.brightness,
        );
        EncodeStatus::Encoded
    }

    /// Set the brightness used from the next encode pass on.
    pub fn set_brightness(&mut self, value: i32) {
        self.brightness = Brightness::clamped(value, self.panel());
        trace!("brightness level {}", self.brightness.level());
    }

    /// Assign an overlay palette color. Indices other than 1..=15 are
    /// ignored.
    pub fn set_overlay_color(&mut self, index: usize, color: Color) {
        self.palette.set(index, color);
    }

    /// Addresses and sizes for the transfer engine.
    #[must_use]
    pub fn transfer_layout(&self) -> TransferLayout {
        TransferLayout::new(&self.buffers, self.strategy, self.table.as_ref())
    }

    /// Panel geometry.
    #[must_use]
    pub fn panel(&self) -> &PanelConfig {
        self.buffers.panel()
    }

    /// Brightness realization.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Configured bit depth.
    #[must_use]
    pub fn bits(&self) -> BitDepth {
        self.buffers.bits()
    }

    /// Current brightness.
    #[must_use]
    pub fn brightness(&self) -> Brightness {
        self.brightness
    }

    /// Overlay palette.
    #[must_use]
    pub fn palette(&self) -> &OverlayPalette {
        &self.palette
    }

    /// Hardware buffers.
    #[must_use]
    pub fn buffers(&self) -> &HardwareBuffers {
        &self.buffers
    }

    /// Weighted plane schedule, if any.
    #[must_use]
    pub fn address_table(&self) -> Option<&AddressTable> {
        self.table.as_ref()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Display {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Display {} bits: {} brightness: {}",
            self.buffers.panel(),
            self.buffers.bits(),
            self.brightness
        );
        defmt::write!(f, " scan words: {}", self.buffers.scan().len());
    }
}
