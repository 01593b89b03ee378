//! Panel geometry and the clamped value types that configure the engine.
//!
//! A HUB75 panel is driven as `lanes` horizontal bands that are shifted out in
//! parallel: lane `k` shows physical row `y + k * scan_rows` while the row
//! address lines select `y`. Standard panels have two lanes (top and bottom
//! half); double-size panels on wide controller boards have four.

/// How many source pixels share one 32-bit hardware word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelPacking {
    /// Four pixels per word, 8-bit slots, two lanes (R1 G1 B1 R2 G2 B2).
    Quad,
    /// Two pixels per word, 16-bit slots, four lanes.
    Dual,
}

impl PixelPacking {
    /// Pixels packed into one hardware word.
    #[must_use]
    pub const fn pixels_per_word(self) -> usize {
        match self {
            Self::Quad => 4,
            Self::Dual => 2,
        }
    }

    /// Width of one pixel slot in bits.
    #[must_use]
    pub const fn slot_bits(self) -> usize {
        32 / self.pixels_per_word()
    }

    /// Number of output lanes shifted out in parallel.
    #[must_use]
    pub const fn lanes(self) -> usize {
        match self {
            Self::Quad => 2,
            Self::Dual => 4,
        }
    }

    /// Bit inside a slot that blanks the panel (output enable high) while the
    /// slot is clocked out.
    #[must_use]
    pub const fn blank_bit(self) -> usize {
        match self {
            Self::Quad => 7,
            Self::Dual => 12,
        }
    }
}

/// Maximum number of row address lines (A..E).
pub const MAX_ROW_ADDRESS_BITS: u32 = 5;

/// Runtime panel geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelConfig {
    width: usize,
    height: usize,
    scan_rows: usize,
    packing: PixelPacking,
}

/// 64 × 32 panel, 1/16 scan.
pub const PANEL_64X32: PanelConfig = PanelConfig::new(64, 32, PixelPacking::Quad);
/// 64 × 64 panel, 1/32 scan.
pub const PANEL_64X64: PanelConfig = PanelConfig::new(64, 64, PixelPacking::Quad);
/// 128 × 128 display made of four 1/32 scan bands on a four-lane board.
pub const PANEL_128X128: PanelConfig = PanelConfig::new(128, 128, PixelPacking::Dual);

impl PanelConfig {
    /// Describe a panel. The scan row count is derived from the height and
    /// the number of lanes of the packing.
    ///
    /// # Panics
    ///
    /// Panics if the geometry cannot be driven: the height must split evenly
    /// into the packing's lanes, the resulting scan row count must be a power
    /// of two addressable with five row lines, and the width must be a
    /// multiple of the pixels per word, at least 8 and narrow enough for the
    /// gated blanking window of the deepest plane to fit its control field.
    #[must_use]
    pub const fn new(width: usize, height: usize, packing: PixelPacking) -> Self {
        let lanes = packing.lanes();
        assert!(height % lanes == 0, "height must split evenly into lanes");
        let scan_rows = height / lanes;
        assert!(scan_rows.is_power_of_two(), "scan rows must be a power of two");
        assert!(
            scan_rows <= 1 << MAX_ROW_ADDRESS_BITS,
            "too many scan rows for five address lines"
        );
        assert!(width >= 8, "panel too narrow");
        assert!(
            width % packing.pixels_per_word() == 0,
            "width must be a multiple of the pixels per word"
        );
        let widest_gate = (width - 1 - BLANKING_TAIL as usize) << (BitDepth::MAX.0 - 2);
        assert!(
            widest_gate < (1 << GATE_FIELD_BITS),
            "panel too wide for the gate field"
        );
        Self {
            width,
            height,
            scan_rows,
            packing,
        }
    }

    /// Panel width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Panel height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Number of multiplexed row addresses.
    #[must_use]
    pub const fn scan_rows(&self) -> usize {
        self.scan_rows
    }

    /// Pixel packing used for hardware words.
    #[must_use]
    pub const fn packing(&self) -> PixelPacking {
        self.packing
    }

    /// Number of pixels in the logical image.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Hardware words per scan row of one bit plane.
    #[must_use]
    pub const fn words_per_row(&self) -> usize {
        self.width / self.packing.pixels_per_word()
    }

    /// Hardware words in one complete bit plane.
    #[must_use]
    pub const fn words_per_plane(&self) -> usize {
        self.words_per_row() * self.scan_rows
    }

    /// Mask applied to row addresses in control words.
    #[must_use]
    pub const fn row_address_mask(&self) -> u32 {
        (self.scan_rows - 1) as u32
    }

    /// Size of the scan buffer in words for the given depth.
    #[must_use]
    pub const fn scan_words(&self, bits: BitDepth) -> usize {
        self.words_per_plane() * bits.get() as usize
    }

    /// Size of the control buffer in words for the given depth.
    #[must_use]
    pub const fn control_words(&self, bits: BitDepth) -> usize {
        self.scan_rows * bits.get() as usize
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        PANEL_64X64
    }
}

/// Number of bit planes per color channel, always within `4..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BitDepth(u8);

impl BitDepth {
    /// Fewest planes the engine drives.
    pub const MIN: Self = Self(4);
    /// Most planes the engine drives.
    pub const MAX: Self = Self(8);

    /// Clamp a requested plane count into `4..=8`. Never fails.
    #[must_use]
    pub const fn clamped(requested: i32) -> Self {
        if requested < Self::MIN.0 as i32 {
            Self::MIN
        } else if requested > Self::MAX.0 as i32 {
            Self::MAX
        } else {
            Self(requested as u8)
        }
    }

    /// Number of planes.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Channel bits dropped by quantization.
    #[must_use]
    pub const fn shift(self) -> u8 {
        8 - self.0
    }

    /// Steps in one full weighted cycle: `2^bits - 1`.
    #[must_use]
    pub const fn cycle_len(self) -> usize {
        crate::compute_frame_count(self.0)
    }
}

impl Default for BitDepth {
    fn default() -> Self {
        Self::MAX
    }
}

/// Pixel clocks at the end of every scan row that are always blanked so the
/// row address can change without ghosting.
pub const BLANKING_TAIL: u16 = 4;

// width of the gate field in a gated control word
const GATE_FIELD_BITS: usize = 13;

/// Master brightness as the number of lit pixel clocks per scan row.
///
/// Requested values are biased by [`BLANKING_TAIL`] and saturated to
/// `BLANKING_TAIL..=width - 1`, so any request maps onto a valid duty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Brightness {
    level: u16,
}

impl Brightness {
    /// Clamp a requested brightness for the given panel.
    #[must_use]
    pub fn clamped(requested: i32, panel: &PanelConfig) -> Self {
        let max = i32::try_from(panel.width() - 1).unwrap_or(i32::MAX);
        let level = requested
            .saturating_add(i32::from(BLANKING_TAIL))
            .clamp(i32::from(BLANKING_TAIL), max);
        Self {
            level: level as u16,
        }
    }

    /// Brightest setting for the panel.
    #[must_use]
    pub fn full(panel: &PanelConfig) -> Self {
        Self::clamped(i32::MAX, panel)
    }

    /// Lit pixel clocks per row; slots counted past this are blanked.
    #[must_use]
    pub const fn level(self) -> u16 {
        self.level
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PanelConfig {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "PanelConfig({}x{}, scan {}, {} px/word)",
            self.width,
            self.height,
            self.scan_rows,
            self.packing.pixels_per_word()
        );
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BitDepth {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "BitDepth({=u8})", self.0);
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Brightness {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Brightness({=u16})", self.level);
    }
}
