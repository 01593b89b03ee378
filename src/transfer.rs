//! Interrupt re-armed transfer engine.
//!
//! Two channels stream the hardware buffers to the panel: the data channel
//! shifts out scan words, the control channel feeds row addresses and timing.
//! Once started, each channel is restarted from its completion interrupt and
//! the CPU does no per-row work. The handlers only pick the next source
//! address, so they are safe to run at high interrupt priority.
//!
//! The hardware itself sits behind [`TransferChannel`]; a board support crate
//! implements it for its DMA or PIO engine and calls
//! [`TransferEngine::on_interrupt`] (or the per-channel variants) from the
//! completion handlers.

use crate::bcm::next_index;
use crate::bcm::AddressTable;
use crate::encoder::HardwareBuffers;
use crate::encoder::Strategy;
use crate::Hub75Error;

/// One hardware transfer channel.
pub trait TransferChannel {
    /// Start streaming `words` words from `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot start the transfer.
    fn start(&mut self, source: *const u32, words: usize) -> Result<(), Hub75Error>;

    /// Abort any transfer in flight.
    fn abort(&mut self);

    /// Enable or disable the completion interrupt.
    fn set_interrupt_enabled(&mut self, enabled: bool);

    /// Acknowledge a pending completion. Returns `false` if there was none.
    fn take_completion(&mut self) -> bool;
}

/// Lifecycle of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Not running; completions are ignored.
    #[default]
    Idle,
    /// A transfer is in flight.
    Armed,
    /// The transfer completed and the next one is being set up.
    AwaitingRestart,
}

/// Where the channels read from, captured from a set of [`HardwareBuffers`].
///
/// The addresses stay valid for as long as the buffers they were taken from
/// are alive and not reallocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLayout {
    strategy: Strategy,
    scan_base: *const u32,
    scan_words: usize,
    plane_words: usize,
    control_base: *const u32,
    control_words: usize,
    table: Option<AddressTable>,
}

// SAFETY: the layout only carries addresses for the transfer hardware; the
// engine never dereferences them.
unsafe impl Send for TransferLayout {}

impl TransferLayout {
    /// Capture the layout of `buffers` for `strategy`. The weighted strategy
    /// needs the plane schedule in `table`.
    ///
    /// # Panics
    ///
    /// Panics if `strategy` is [`Strategy::Weighted`] and `table` is `None`.
    #[must_use]
    pub fn new(
        buffers: &HardwareBuffers,
        strategy: Strategy,
        table: Option<&AddressTable>,
    ) -> Self {
        let panel = buffers.panel();
        let table = match strategy {
            Strategy::Gated => None,
            Strategy::Weighted => {
                assert!(table.is_some(), "weighted transfers need an address table");
                table.cloned()
            }
        };
        let control_words = match strategy {
            Strategy::Gated => buffers.control().len(),
            Strategy::Weighted => panel.scan_rows(),
        };
        Self {
            strategy,
            scan_base: buffers.scan().as_ptr(),
            scan_words: buffers.scan().len(),
            plane_words: panel.words_per_plane(),
            control_base: buffers.control().as_ptr(),
            control_words,
            table,
        }
    }

    /// Strategy the layout was captured for.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Scan buffer base address.
    #[must_use]
    pub fn scan_base(&self) -> *const u32 {
        self.scan_base
    }

    /// Words per data transfer: the whole scan buffer when gated, one plane
    /// when weighted.
    #[must_use]
    pub fn data_words(&self) -> usize {
        match self.strategy {
            Strategy::Gated => self.scan_words,
            Strategy::Weighted => self.plane_words,
        }
    }

    /// Control buffer base address.
    #[must_use]
    pub fn control_base(&self) -> *const u32 {
        self.control_base
    }

    /// Words per control transfer.
    #[must_use]
    pub fn control_words(&self) -> usize {
        self.control_words
    }

    /// Plane schedule for the weighted strategy.
    #[must_use]
    pub fn table(&self) -> Option<&AddressTable> {
        self.table.as_ref()
    }
}

fn arm<T: TransferChannel>(
    channel: &mut T,
    name: &str,
    source: *const u32,
    words: usize,
) -> ChannelState {
    match channel.start(source, words) {
        Ok(()) => ChannelState::Armed,
        Err(e) => {
            warn!("{} channel failed to start: {}", name, e);
            ChannelState::Idle
        }
    }
}

/// Drives a data and a control channel from their completion interrupts.
#[derive(Debug)]
pub struct TransferEngine<D, C> {
    data: D,
    control: C,
    data_state: ChannelState,
    control_state: ChannelState,
    layout: Option<TransferLayout>,
    counter: usize,
    cycles: u32,
}

impl<D: TransferChannel, C: TransferChannel> TransferEngine<D, C> {
    /// Wrap two idle channels.
    pub const fn new(data: D, control: C) -> Self {
        Self {
            data,
            control,
            data_state: ChannelState::Idle,
            control_state: ChannelState::Idle,
            layout: None,
            counter: 1,
            cycles: 0,
        }
    }

    /// Arm both channels from the start of `layout` and enable their
    /// interrupts. A running engine is stopped first.
    ///
    /// The first data transfer shows the plane at the scan base; the weighted
    /// schedule takes over from the first completion.
    pub fn start(&mut self, layout: TransferLayout) {
        self.stop();
        self.counter = 1;
        self.data_state = arm(&mut self.data, "data", layout.scan_base, layout.data_words());
        self.control_state = arm(
            &mut self.control,
            "control",
            layout.control_base,
            layout.control_words,
        );
        self.layout = Some(layout);
        self.data.set_interrupt_enabled(true);
        self.control.set_interrupt_enabled(true);
        debug!("transfer engine started");
    }

    /// Disable interrupts, abort both channels and forget the layout.
    ///
    /// After this returns the buffers the layout pointed at may be freed.
    pub fn stop(&mut self) {
        self.data.set_interrupt_enabled(false);
        self.control.set_interrupt_enabled(false);
        self.data.abort();
        self.control.abort();
        self.data_state = ChannelState::Idle;
        self.control_state = ChannelState::Idle;
        self.layout = None;
    }

    /// Service both channels. Call from a shared completion interrupt.
    pub fn on_interrupt(&mut self) {
        self.on_data_interrupt();
        self.on_control_interrupt();
    }

    /// Acknowledge and handle a data channel completion.
    pub fn on_data_interrupt(&mut self) {
        if !self.data.take_completion() || self.data_state != ChannelState::Armed {
            return;
        }
        self.data_state = ChannelState::AwaitingRestart;
        let Some(layout) = &self.layout else {
            self.data_state = ChannelState::Idle;
            return;
        };
        let (offset, words) = match &layout.table {
            Some(table) if layout.strategy == Strategy::Weighted => {
                let (next, offset) = next_index(table, self.counter);
                if next == 1 {
                    self.cycles = self.cycles.wrapping_add(1);
                }
                self.counter = next;
                (offset, layout.plane_words)
            }
            _ => {
                self.cycles = self.cycles.wrapping_add(1);
                (0, layout.scan_words)
            }
        };
        let source = layout.scan_base.wrapping_add(offset);
        self.data_state = arm(&mut self.data, "data", source, words);
    }

    /// Acknowledge and handle a control channel completion.
    pub fn on_control_interrupt(&mut self) {
        if !self.control.take_completion() || self.control_state != ChannelState::Armed {
            return;
        }
        self.control_state = ChannelState::AwaitingRestart;
        let Some(layout) = &self.layout else {
            self.control_state = ChannelState::Idle;
            return;
        };
        self.control_state = arm(
            &mut self.control,
            "control",
            layout.control_base,
            layout.control_words,
        );
    }

    /// State of the data channel.
    pub fn data_state(&self) -> ChannelState {
        self.data_state
    }

    /// State of the control channel.
    pub fn control_state(&self) -> ChannelState {
        self.control_state
    }

    /// Returns `true` while both channels are armed.
    pub fn is_running(&self) -> bool {
        self.data_state == ChannelState::Armed && self.control_state == ChannelState::Armed
    }

    /// Full frames shown since creation: whole scan buffer passes when gated,
    /// whole schedule cycles when weighted. Wraps on overflow.
    pub fn completed_cycles(&self) -> u32 {
        self.cycles
    }

    /// Current position in the weighted schedule.
    pub fn schedule_position(&self) -> usize {
        self.counter
    }

    /// Layout currently streamed, if running.
    pub fn layout(&self) -> Option<&TransferLayout> {
        self.layout.as_ref()
    }

    /// Mutable access to the channels, for example to retune clocks while
    /// stopped.
    pub fn channels_mut(&mut self) -> (&mut D, &mut C) {
        (&mut self.data, &mut self.control)
    }

    /// Stop and hand the channels back.
    pub fn release(mut self) -> (D, C) {
        self.stop();
        (self.data, self.control)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ChannelState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Idle => defmt::write!(f, "Idle"),
            Self::Armed => defmt::write!(f, "Armed"),
            Self::AwaitingRestart => defmt::write!(f, "AwaitingRestart"),
        }
    }
}
