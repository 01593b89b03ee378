//! Fixed-cadence re-encoding.
//!
//! [`refresh_loop`] runs forever in a low-priority task: take the
//! [`FlushGate`], encode the current frame, release, then idle a few ticks so
//! drawing tasks get the frame back. The transfer engine keeps streaming
//! whatever is in the hardware buffers the whole time.

use core::cell::RefCell;
use core::sync::atomic::AtomicU32;
use core::sync::atomic::Ordering;

use embassy_sync::blocking_mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Duration;
use embassy_time::Timer;

use crate::display::Display;
use crate::frame::Frame;
use crate::gate::FlushGate;
use crate::gate::DEFAULT_GATE_TIMEOUT;

/// Somewhere the refresh loop can read a [`Frame`] from.
///
/// The frame is borrowed for the whole encode pass, so drawing into it is
/// excluded until the pass ends and the encoded image is never torn.
pub trait FrameSource {
    /// Run `f` with the current frame.
    fn with_frame<R>(&self, f: impl FnOnce(&Frame) -> R) -> R;
}

impl FrameSource for Frame {
    fn with_frame<R>(&self, f: impl FnOnce(&Frame) -> R) -> R {
        f(self)
    }
}

impl<M: RawMutex> FrameSource for blocking_mutex::Mutex<M, RefCell<Frame>> {
    fn with_frame<R>(&self, f: impl FnOnce(&Frame) -> R) -> R {
        self.lock(|frame| f(&frame.borrow()))
    }
}

/// Refresh loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    /// How long to wait for the gate before skipping a pass.
    pub gate_timeout: Duration,
    /// Timer ticks to sleep between passes.
    pub idle_ticks: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            gate_timeout: DEFAULT_GATE_TIMEOUT,
            idle_ticks: 3,
        }
    }
}

/// Pass counters, readable from any task.
#[derive(Debug, Default)]
pub struct RefreshStats {
    encoded: AtomicU32,
    skipped: AtomicU32,
}

impl RefreshStats {
    /// Zeroed counters.
    pub const fn new() -> Self {
        Self {
            encoded: AtomicU32::new(0),
            skipped: AtomicU32::new(0),
        }
    }

    /// Passes that encoded a frame.
    pub fn encoded(&self) -> u32 {
        self.encoded.load(Ordering::Relaxed)
    }

    /// Passes skipped because the gate stayed busy.
    pub fn skipped(&self) -> u32 {
        self.skipped.load(Ordering::Relaxed)
    }

    // single writer; plain load/store also builds on cores without atomic
    // read-modify-write
    fn bump(counter: &AtomicU32) -> u32 {
        let value = counter.load(Ordering::Relaxed).wrapping_add(1);
        counter.store(value, Ordering::Relaxed);
        value
    }
}

/// Run one pass: acquire the gate, encode, release.
///
/// Returns `false` if the gate could not be taken within
/// `config.gate_timeout` and the pass was skipped.
pub async fn refresh_once<M, S>(
    gate: &FlushGate<M, Display>,
    source: &S,
    config: &RefreshConfig,
    stats: &RefreshStats,
) -> bool
where
    M: RawMutex,
    S: FrameSource,
{
    let Some(mut display) = gate.acquire_within(config.gate_timeout).await else {
        let skipped = RefreshStats::bump(&stats.skipped);
        debug!("flush gate busy, pass skipped ({} total)", skipped);
        return false;
    };
    source.with_frame(|frame| display.encode_frame(frame));
    display.release();
    RefreshStats::bump(&stats.encoded);
    true
}

/// Re-encode `source` forever at the cadence in `config`.
pub async fn refresh_loop<M, S>(
    gate: &FlushGate<M, Display>,
    source: &S,
    config: RefreshConfig,
    stats: &RefreshStats,
) -> !
where
    M: RawMutex,
    S: FrameSource,
{
    info!("refresh loop running, {} idle ticks per pass", config.idle_ticks);
    loop {
        refresh_once(gate, source, &config, stats).await;
        Timer::after_ticks(config.idle_ticks).await;
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use embassy_futures::block_on;
    use embassy_futures::select::select;
    use embassy_futures::select::Either;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embedded_graphics::pixelcolor::RgbColor;

    use super::*;
    use crate::display::EngineConfig;
    use crate::encoder::HardwareBuffers;
    use crate::panel::BitDepth;
    use crate::Color;

    fn config() -> RefreshConfig {
        RefreshConfig {
            gate_timeout: Duration::from_millis(10),
            idle_ticks: 1,
        }
    }

    #[test]
    fn test_default_config() {
        let config = RefreshConfig::default();
        assert_eq!(config.gate_timeout, Duration::from_millis(100));
        assert_eq!(config.idle_ticks, 3);
    }

    #[test]
    fn test_refresh_once_encodes_frame() {
        let engine = EngineConfig::default();
        let gate: FlushGate<NoopRawMutex, Display> = FlushGate::new(Display::new(engine));
        let mut frame = Frame::new(&engine.panel);
        frame.framebuffer.set_pixel(0, 0, Color::WHITE);
        let stats = RefreshStats::new();

        assert!(block_on(refresh_once(&gate, &frame, &config(), &stats)));
        assert_eq!(stats.encoded(), 1);
        assert_eq!(stats.skipped(), 0);

        let display = gate.into_inner();
        let mut expected = HardwareBuffers::allocate(&engine.panel, BitDepth::MAX);
        crate::encoder::encode(
            &mut expected,
            &frame,
            display.palette(),
            display.strategy(),
            display.brightness(),
        );
        assert_eq!(display.buffers(), &expected);
    }

    #[test]
    fn test_refresh_once_skips_when_gate_held() {
        let engine = EngineConfig::default();
        let gate: FlushGate<NoopRawMutex, Display> = FlushGate::new(Display::new(engine));
        let frame = Frame::new(&engine.panel);
        let stats = RefreshStats::new();

        let held = gate.try_acquire().expect("gate is free");
        assert!(!block_on(refresh_once(&gate, &frame, &config(), &stats)));
        assert!(!block_on(refresh_once(&gate, &frame, &config(), &stats)));
        drop(held);
        assert_eq!(stats.skipped(), 2);
        assert_eq!(stats.encoded(), 0);
    }

    #[test]
    fn test_mutex_frame_source() {
        let engine = EngineConfig::default();
        let shared: blocking_mutex::Mutex<NoopRawMutex, RefCell<Frame>> =
            blocking_mutex::Mutex::new(RefCell::new(Frame::new(&engine.panel)));
        shared.lock(|frame| frame.borrow_mut().framebuffer.set_pixel(2, 3, Color::RED));
        let color = shared.with_frame(|frame| frame.framebuffer.pixel(2, 3));
        assert_eq!(color, Color::RED);
    }

    #[test]
    fn test_refresh_loop_keeps_encoding() {
        let engine = EngineConfig::default();
        let gate: FlushGate<NoopRawMutex, Display> = FlushGate::new(Display::new(engine));
        let frame = Frame::new(&engine.panel);
        let stats = RefreshStats::new();

        let result = block_on(select(
            refresh_loop(&gate, &frame, config(), &stats),
            Timer::after_millis(50),
        ));
        assert!(matches!(result, Either::Second(())));
        assert!(stats.encoded() >= 2);
    }
}
