//! Bit-plane encoder.
//!
//! Reduces a [`Frame`] into the two buffers the transfer engine streams:
//!
//! - the **scan buffer**, plane-major, then scan row, then word column. Each
//!   `u32` packs [`pixels_per_word`] slots; a slot holds one [`LaneCode`]
//!   per output lane, lane `k` shifted left by `3 * k`.
//! - the **control buffer**, one [`ControlWord`] per scan row per plane, in
//!   the same plane-major order.
//!
//! The whole buffer is rewritten on every pass, so encoding the same inputs
//! twice leaves identical buffers.
//!
//! [`pixels_per_word`]: crate::panel::PixelPacking::pixels_per_word

use alloc::vec::Vec;

use bitfield::bitfield;
use embedded_dma::ReadBuffer;

use crate::color::quantize_color;
use crate::color::LaneCode;
use crate::frame::Frame;
use crate::frame::OverlayPalette;
use crate::panel::BitDepth;
use crate::panel::Brightness;
use crate::panel::PanelConfig;

/// How brightness and bit-plane weighting are realized in hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Every plane is shown once per frame; the control word stretches the
    /// display time of plane `p` to weight `2^p` and gates output enable for
    /// brightness.
    #[default]
    Gated,
    /// Planes are shown for equal time, plane `p` repeated `2^p` times per
    /// cycle through the [`AddressTable`](crate::bcm::AddressTable);
    /// brightness comes from blank bits in the scan words.
    Weighted,
}

bitfield! {
    /// Per-row control word read by the row/timing channel.
    ///
    /// The bit layout is as follows:
    /// - Bits 30-18: output-enable gate length (gated strategy only)
    /// - Bits 17-5: display delay (gated strategy only)
    /// - Bits 4-0: row address
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct ControlWord(u32);
    impl Debug;
    pub u16, gate, set_gate: 30, 18;
    pub u16, delay, set_delay: 17, 5;
    pub u8, row, set_row: 4, 0;
}

impl ControlWord {
    /// Control word for the weighted strategy: the row address only.
    #[must_use]
    pub fn weighted(row: usize, panel: &PanelConfig) -> Self {
        let mut word = Self(0);
        word.set_row((row as u32 & panel.row_address_mask()) as u8);
        word
    }

    /// Control word for the gated strategy.
    ///
    /// Plane `p` gets a delay of `(2^p - 1) << 6` and keeps output enable
    /// off for `(width - 1 - level) << max(p - 1, 0)` clocks.
    #[must_use]
    pub fn gated(row: usize, plane: u8, brightness: Brightness, panel: &PanelConfig) -> Self {
        let mut word = Self::weighted(row, panel);
        word.set_delay((((1u32 << plane) - 1) << 6) as u16);
        let dark = (panel.width() as u32 - 1).saturating_sub(u32::from(brightness.level()));
        word.set_gate((dark << plane.saturating_sub(1)) as u16);
        word
    }

    /// Wrap a raw word read back from a control buffer.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw word.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ControlWord {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "ControlWord({=u32:#x})", self.0);
    }
}

/// A word buffer handed to a transfer channel.
#[derive(Clone, PartialEq, Eq)]
pub struct DmaWords(Vec<u32>);

impl DmaWords {
    /// Allocate `len` zeroed words.
    ///
    /// # Panics
    ///
    /// Panics if the allocation fails. A display cannot run on a partially
    /// sized buffer, so this is treated as fatal.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        let mut words = Vec::new();
        if words.try_reserve_exact(len).is_err() {
            panic!("failed to allocate {} hardware words ({} bytes)", len, len * 4);
        }
        words.resize(len, 0);
        Self(words)
    }

    /// Number of words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the buffer holds no words.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Base address for a transfer channel.
    #[must_use]
    pub fn as_ptr(&self) -> *const u32 {
        self.0.as_ptr()
    }

    /// The words.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.0
    }
}

impl core::fmt::Debug for DmaWords {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DmaWords")
            .field("len", &self.0.len())
            .field("size", &core::mem::size_of_val(self.0.as_slice()))
            .finish()
    }
}

unsafe impl ReadBuffer for DmaWords {
    type Word = u32;

    unsafe fn read_buffer(&self) -> (*const u32, usize) {
        (self.0.as_ptr(), self.0.len())
    }
}

/// The scan and control buffers for one panel at one bit depth.
///
/// Both are sized at allocation and never grow, so their base addresses stay
/// valid until the buffers are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareBuffers {
    panel: PanelConfig,
    bits: BitDepth,
    scan: DmaWords,
    control: DmaWords,
}

impl HardwareBuffers {
    /// Allocate zeroed buffers for `panel` at `bits` planes.
    ///
    /// # Panics
    ///
    /// Panics if either buffer cannot be allocated.
    #[must_use]
    pub fn allocate(panel: &PanelConfig, bits: BitDepth) -> Self {
        Self {
            panel: *panel,
            bits,
            scan: DmaWords::zeroed(panel.scan_words(bits)),
            control: DmaWords::zeroed(panel.control_words(bits)),
        }
    }

    /// Resize for `bits` planes. The old buffers are freed before the new
    /// ones are allocated, so peak memory stays at one set of buffers.
    ///
    /// # Panics
    ///
    /// Panics if either buffer cannot be allocated.
    pub fn reallocate(&mut self, bits: BitDepth) {
        self.scan = DmaWords(Vec::new());
        self.control = DmaWords(Vec::new());
        self.bits = bits;
        self.scan = DmaWords::zeroed(self.panel.scan_words(bits));
        self.control = DmaWords::zeroed(self.panel.control_words(bits));
    }

    /// Panel the buffers were sized for.
    #[must_use]
    pub fn panel(&self) -> &PanelConfig {
        &self.panel
    }

    /// Number of bit planes held.
    #[must_use]
    pub fn bits(&self) -> BitDepth {
        self.bits
    }

    /// The scan buffer.
    #[must_use]
    pub fn scan(&self) -> &DmaWords {
        &self.scan
    }

    /// The control buffer.
    #[must_use]
    pub fn control(&self) -> &DmaWords {
        &self.control
    }

    /// Scan words of a single plane.
    ///
    /// # Panics
    ///
    /// Panics if `plane` is not below the configured bit depth.
    #[must_use]
    pub fn plane(&self, plane: u8) -> &[u32] {
        let len = self.panel.words_per_plane();
        let start = usize::from(plane) * len;
        &self.scan.as_slice()[start..start + len]
    }

    /// Control words of a single plane.
    ///
    /// # Panics
    ///
    /// Panics if `plane` is not below the configured bit depth.
    #[must_use]
    pub fn plane_control(&self, plane: u8) -> &[u32] {
        let len = self.panel.scan_rows();
        let start = usize::from(plane) * len;
        &self.control.as_slice()[start..start + len]
    }
}

/// Rewrite the control buffer for `strategy`.
pub fn encode_control(buffers: &mut HardwareBuffers, strategy: Strategy, brightness: Brightness) {
    let panel = buffers.panel;
    let scan_rows = panel.scan_rows();
    for (i, word) in buffers.control.as_mut_slice().iter_mut().enumerate() {
        let plane = (i / scan_rows) as u8;
        let row = i % scan_rows;
        *word = match strategy {
            Strategy::Gated => ControlWord::gated(row, plane, brightness, &panel),
            Strategy::Weighted => ControlWord::weighted(row, &panel),
        }
        .bits();
    }
}

/// Rewrite the scan buffer from `frame`.
///
/// Pixels with a non-zero overlay index take their color from `palette`.
/// With [`Strategy::Weighted`] every slot past the brightness level in its
/// row also gets the blank bit.
///
/// # Panics
///
/// Panics if the frame was not sized for the buffers' panel.
pub fn encode_scan(
    buffers: &mut HardwareBuffers,
    frame: &Frame,
    palette: &OverlayPalette,
    strategy: Strategy,
    brightness: Brightness,
) {
    let panel = buffers.panel;
    assert!(
        frame.framebuffer.width() == panel.width() && frame.framebuffer.height() == panel.height(),
        "framebuffer does not match the panel"
    );
    assert!(
        frame.overlay.width() == panel.width() && frame.overlay.height() == panel.height(),
        "overlay does not match the panel"
    );

    let bits = buffers.bits;
    let planes = usize::from(bits.get());
    let packing = panel.packing();
    let lanes = packing.lanes();
    let pixels_per_word = packing.pixels_per_word();
    let slot_bits = packing.slot_bits();
    let blank = 1u32 << packing.blank_bit();
    let scan_rows = panel.scan_rows();
    let words_per_row = panel.words_per_row();
    let words_per_plane = panel.words_per_plane();
    let level = usize::from(brightness.level());
    let pixels = frame.framebuffer.pixels();
    let width = panel.width();

    let scan = buffers.scan.as_mut_slice();
    let mut quantized = [(0u8, 0u8, 0u8); 4];
    let mut words = [0u32; BitDepth::MAX.get() as usize];

    for y in 0..scan_rows {
        for column in 0..words_per_row {
            words.fill(0);
            for slot in 0..pixels_per_word {
                let x = column * pixels_per_word + slot;
                for (lane, q) in quantized.iter_mut().enumerate().take(lanes) {
                    let row = y + lane * scan_rows;
                    let color = palette
                        .get(frame.overlay.index(x, row))
                        .unwrap_or(pixels[row * width + x]);
                    *q = quantize_color(color, bits);
                }
                // slots are counted from 1 within the row
                let blanked = strategy == Strategy::Weighted && x + 1 > level;
                let shift = slot * slot_bits;
                for (plane, word) in words.iter_mut().enumerate().take(planes) {
                    let mut value = 0u32;
                    for (lane, q) in quantized.iter().enumerate().take(lanes) {
                        let code = LaneCode::from_quantized(*q, plane as u8);
                        value |= u32::from(code.bits()) << (3 * lane);
                    }
                    if blanked {
                        value |= blank;
                    }
                    *word |= value << shift;
                }
            }
            let offset = y * words_per_row + column;
            for (plane, word) in words.iter().enumerate().take(planes) {
                scan[plane * words_per_plane + offset] = *word;
            }
        }
    }
}

/// Rewrite both buffers from `frame`.
///
/// # Panics
///
/// Panics if the frame was not sized for the buffers' panel.
pub fn encode(
    buffers: &mut HardwareBuffers,
    frame: &Frame,
    palette: &OverlayPalette,
    strategy: Strategy,
    brightness: Brightness,
) {
    encode_scan(buffers, frame, palette, strategy, brightness);
    encode_control(buffers, strategy, brightness);
}
