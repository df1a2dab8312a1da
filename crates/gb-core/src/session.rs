//! The two-thread contract the core is designed against: an emulation
//! thread owns the `GameBoy` (CPU, Bus, PPU, cartridge) outright and drives
//! the master clock; a host-owned presentation thread only ever touches the
//! pixel buffer, the button state and the `closed` flag through the shared
//! handles below. Nothing here is required to use `GameBoy` directly on a
//! single thread (the test suite does exactly that) — `GbSession` exists for
//! hosts that want the threaded discipline described by the core's
//! concurrency model.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::bus::Bus;
use crate::cartridge::{Cartridge, CartridgeError};
use crate::cpu::Cpu;
use crate::gb::GameBoy;
use crate::input::Button;
use crate::ppu::{Framebuffer, FRAMEBUFFER_LEN, LCD_WIDTH};

/// M-cycles in one 154-line frame (§2): `154 * 114 = 17_556`.
pub const MCYCLES_PER_FRAME: u32 = 154 * 114;

const FRAME_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// The only mutable buffer shared between threads: the completed-frame
/// pixel data. The emulation thread locks it once per finished scanline
/// (an 160-pixel slice); the presentation thread locks it once per frame
/// to `memcpy` the whole thing into its own staging buffer.
pub struct SharedFrame {
    buffer: Mutex<Framebuffer>,
    invalidated: AtomicBool,
}

impl SharedFrame {
    fn new() -> Self {
        Self {
            buffer: Mutex::new([0xFFFF_FFFF; FRAMEBUFFER_LEN]),
            invalidated: AtomicBool::new(false),
        }
    }

    fn publish_row(&self, row: usize, pixels: &[u32]) {
        let mut guard = self.buffer.lock().unwrap();
        let start = row * LCD_WIDTH;
        guard[start..start + LCD_WIDTH].copy_from_slice(pixels);
    }

    fn mark_invalidated(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    /// True once a frame has completed since the last `copy_into`.
    pub fn invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    /// Presentation-side: copy the latest complete frame into `out` and
    /// clear the invalidated flag. Held only for the `memcpy`.
    pub fn copy_into(&self, out: &mut Framebuffer) {
        let guard = self.buffer.lock().unwrap();
        out.copy_from_slice(&guard[..]);
        drop(guard);
        self.invalidated.store(false, Ordering::Release);
    }
}

/// Button state written by the presentation thread, read by the emulation
/// thread. A single atomic byte: updates are idempotent (setting the same
/// button pressed twice is harmless) so a torn read across M-cycle
/// boundaries can't desync the two sides, matching real hardware's own
/// asynchronous polling.
pub struct SharedInput {
    buttons: AtomicU8,
}

impl SharedInput {
    fn new() -> Self {
        Self {
            buttons: AtomicU8::new(0),
        }
    }

    pub fn set_button(&self, button: Button, pressed: bool) {
        if pressed {
            self.buttons.fetch_or(button.mask(), Ordering::Relaxed);
        } else {
            self.buttons.fetch_and(!button.mask(), Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> u8 {
        self.buttons.load(Ordering::Relaxed)
    }
}

/// Owns the emulated machine and the handles a host shares with its
/// presentation thread. Construct with [`GbSession::new`], clone out the
/// `Arc`s the presentation side needs, then hand the session itself to
/// [`GbSession::run`] on a dedicated thread.
pub struct GbSession {
    gb: GameBoy,
    frame: Arc<SharedFrame>,
    input: Arc<SharedInput>,
    frame_counter: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl GbSession {
    pub fn new(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        let cart = Cartridge::from_rom(rom)?;
        Ok(Self::from_parts(Bus::new(cart)))
    }

    pub fn with_boot_rom(rom: Vec<u8>, boot_rom: [u8; 256]) -> Result<Self, CartridgeError> {
        let cart = Cartridge::from_rom(rom)?;
        Ok(Self::from_parts(Bus::with_boot_rom(cart, boot_rom)))
    }

    fn from_parts(bus: Bus) -> Self {
        Self {
            gb: GameBoy { cpu: Cpu::new(), bus },
            frame: Arc::new(SharedFrame::new()),
            input: Arc::new(SharedInput::new()),
            frame_counter: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shared_frame(&self) -> Arc<SharedFrame> {
        self.frame.clone()
    }

    pub fn shared_input(&self) -> Arc<SharedInput> {
        self.input.clone()
    }

    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        self.frame_counter.clone()
    }

    /// Presentation thread calls this (or sets the flag it already holds)
    /// to request a cooperative shutdown; the emulation thread observes it
    /// at the top of each frame.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    /// Spawns the emulation thread and returns its `JoinHandle`. The thread
    /// runs until `closed_flag()` is set, pacing itself to 60 Hz.
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("gb-emulation".into())
            .spawn(move || self.run())
            .expect("spawn emulation thread")
    }

    /// Runs the frame loop on the calling thread. Intended to be invoked
    /// from a host-spawned emulation thread; blocks until `closed_flag()`
    /// is observed set.
    pub fn run(mut self) {
        while !self.closed.load(Ordering::Relaxed) {
            let frame_start = Instant::now();
            self.run_one_frame();
            self.frame_counter.fetch_add(1, Ordering::Relaxed);

            let elapsed = frame_start.elapsed();
            if elapsed < FRAME_PERIOD {
                thread::sleep(FRAME_PERIOD - elapsed);
            }
        }
    }

    fn apply_input(&mut self) {
        let snapshot = self.input.snapshot();
        for button in Button::ALL {
            let pressed = (snapshot & button.mask()) != 0;
            self.gb
                .bus
                .input
                .set_button(button, pressed, &mut self.gb.bus.iflag);
        }
    }

    fn run_one_frame(&mut self) {
        while !self.gb.bus.ppu.frame_ready() {
            self.apply_input();
            self.gb.step();

            if let Some(ly) = self.gb.bus.ppu.take_rendered_line() {
                let row_start = ly as usize * LCD_WIDTH;
                let row = &self.gb.bus.ppu.framebuffer()[row_start..row_start + LCD_WIDTH];
                self.frame.publish_row(ly as usize, row);
            }
        }
        self.gb.bus.ppu.clear_frame_ready();
        self.frame.mark_invalidated();
    }
}
