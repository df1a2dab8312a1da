use crate::cartridge::mbc::Mbc;
use crate::cartridge::{Cartridge, CartridgeError};
use crate::dma::OamDma;
use crate::input::Joypad;
use crate::interrupt::Interrupt;
use crate::ppu::Ppu;
use crate::serial::Serial;
use crate::timer::Timer;

const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;
const VRAM_SIZE: usize = 0x2000;
const OAM_SIZE: usize = 0xA0;
const IO_SIZE: usize = 0x80;
const BOOT_ROM_SIZE: usize = 0x100;

/// The address bus and everything it addresses apart from the CPU's own
/// register file: cartridge, PPU, timer, joypad, serial stub, OAM DMA and
/// the flat RAM/IO regions.
pub struct Bus {
    pub cart: Cartridge,
    pub ppu: Ppu,
    pub timer: Timer,
    pub input: Joypad,
    pub serial: Serial,

    pub vram: [u8; VRAM_SIZE],
    pub oam: [u8; OAM_SIZE],
    wram: [u8; WRAM_SIZE],
    pub io: [u8; IO_SIZE],
    pub hram: [u8; HRAM_SIZE],

    pub ie: u8,
    pub iflag: u8,

    oam_dma: OamDma,
    /// Set for exactly the tick following an FF46 write; armed and consumed
    /// on the very next `tick()` call so the transfer's first byte lands
    /// within that same M-cycle (no startup delay, per the 160-M-cycle
    /// transfer-time invariant).
    oam_dma_pending_start: Option<u8>,

    boot_rom: Option<[u8; BOOT_ROM_SIZE]>,
    boot_locked: bool,
}

impl Bus {
    pub fn new(cart: Cartridge) -> Self {
        Self {
            cart,
            ppu: Ppu::new(),
            timer: Timer::new(),
            input: Joypad::new(),
            serial: Serial::new(),

            vram: [0; VRAM_SIZE],
            oam: [0; OAM_SIZE],
            wram: [0; WRAM_SIZE],
            io: [0; IO_SIZE],
            hram: [0; HRAM_SIZE],

            ie: 0,
            iflag: 0,

            oam_dma: OamDma::default(),
            oam_dma_pending_start: None,

            boot_rom: None,
            boot_locked: false,
        }
    }

    /// Overlay a 256-byte boot ROM at `0000-00FF` until the cartridge writes
    /// `0x01` to `FF50`.
    pub fn with_boot_rom(cart: Cartridge, boot_rom: [u8; BOOT_ROM_SIZE]) -> Self {
        let mut bus = Self::new(cart);
        bus.boot_rom = Some(boot_rom);
        bus.boot_locked = true;
        bus
    }

    /// Replace the loaded cartridge in place.
    pub fn load_cartridge(&mut self, rom: Vec<u8>) -> Result<(), CartridgeError> {
        self.cart = Cartridge::from_rom(rom)?;
        Ok(())
    }

    pub fn raise_interrupt(&mut self, kind: Interrupt) {
        self.iflag |= kind.bit();
    }

    fn vram_blocked(&self) -> bool {
        self.ppu.mode() == 3
    }

    fn oam_blocked(&self) -> bool {
        matches!(self.ppu.mode(), 2 | 3)
    }

    #[inline]
    fn dma_exempt(addr: u16) -> bool {
        addr >= 0xFF80
    }

    pub fn read8(&self, addr: u16) -> u8 {
        if self.oam_dma.active() && !Self::dma_exempt(addr) {
            return self.read8_raw(self.oam_dma.current_source_addr());
        }
        self.read8_raw(addr)
    }

    fn read8_raw(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x00FF if self.boot_locked => {
                self.boot_rom.map_or(0xFF, |rom| rom[addr as usize])
            }
            0x0000..=0x7FFF => self.cart.mbc.read_rom(&self.cart.rom, addr),
            0x8000..=0x9FFF => {
                if self.vram_blocked() {
                    0xFF
                } else {
                    self.vram[addr as usize - 0x8000]
                }
            }
            0xA000..=0xBFFF => self.cart.mbc.read_ram(&self.cart.ram, addr),
            0xC000..=0xDFFF => self.wram[addr as usize - 0xC000],
            0xE000..=0xFDFF => self.wram[addr as usize - 0xE000],
            0xFE00..=0xFE9F => {
                if self.oam_blocked() {
                    0xFF
                } else {
                    self.oam[addr as usize - 0xFE00]
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.input.read_joyp(),
            0xFF01 => self.io[0x01],
            0xFF02 => self.io[0x02] | 0x7E,
            0xFF04 => self.timer.read_div(),
            0xFF05 => self.timer.read_tima(),
            0xFF06 => self.timer.read_tma(),
            0xFF07 => self.timer.read_tac(),
            0xFF0F => self.iflag | 0xE0,
            0xFF10..=0xFF3F => 0xFF,
            0xFF40..=0xFF4B => self.io[addr as usize - 0xFF00],
            0xFF50 => {
                if self.boot_locked {
                    0x00
                } else {
                    0x01
                }
            }
            0xFF80..=0xFFFE => self.hram[addr as usize - 0xFF80],
            0xFFFF => self.ie,
            _ => 0xFF,
        }
    }

    pub fn write8(&mut self, addr: u16, val: u8) {
        if self.oam_dma.active() && !Self::dma_exempt(addr) {
            // Diverted away from its intended target: the write never lands.
            return;
        }
        self.write8_raw(addr, val);
    }

    fn write8_raw(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => self.cart.mbc.write_rom(addr, val),
            0x8000..=0x9FFF => {
                if !self.vram_blocked() {
                    self.vram[addr as usize - 0x8000] = val;
                }
            }
            0xA000..=0xBFFF => self.cart.mbc.write_ram(&mut self.cart.ram, addr, val),
            0xC000..=0xDFFF => self.wram[addr as usize - 0xC000] = val,
            0xE000..=0xFDFF => self.wram[addr as usize - 0xE000] = val,
            0xFE00..=0xFE9F => {
                if !self.oam_blocked() {
                    self.oam[addr as usize - 0xFE00] = val;
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.input.write_joyp(val),
            0xFF01 => self.io[0x01] = val,
            0xFF02 => {
                self.io[0x02] = val;
                if val & 0x80 != 0 {
                    self.serial.on_transfer(self.io[0x01]);
                    self.io[0x02] &= 0x7F;
                }
            }
            0xFF04 => self.timer.write_div(&mut self.iflag),
            0xFF05 => self.timer.write_tima(val),
            0xFF06 => self.timer.write_tma(val),
            0xFF07 => self.timer.write_tac(val, &mut self.iflag),
            0xFF0F => self.iflag = val & 0x1F,
            0xFF10..=0xFF3F => log::debug!("sound register write {addr:#06x}={val:#04x} ignored"),
            0xFF41 => self.io[0x41] = (self.io[0x41] & !0x78) | (val & 0x78),
            0xFF44 => self.ppu.reset_ly(),
            0xFF46 => self.oam_dma_pending_start = Some(val),
            0xFF40..=0xFF4B => self.io[addr as usize - 0xFF00] = val,
            0xFF50 => {
                if val & 0x01 != 0 {
                    self.boot_locked = false;
                }
            }
            0xFF80..=0xFFFE => self.hram[addr as usize - 0xFF80] = val,
            0xFFFF => self.ie = val,
            _ => {}
        }
    }

    fn tick_oam_dma(&mut self, cycles: u32) {
        if let Some(page) = self.oam_dma_pending_start.take() {
            self.oam_dma.start(page);
        }

        if !self.oam_dma.active() {
            return;
        }

        self.oam_dma.add_cycles(cycles);
        while let Some((src, dst)) = self.oam_dma.pop_transfer() {
            self.oam[dst] = self.read8_raw(src);
        }
    }

    /// Advance every subsystem by `cycles` master-clock cycles.
    pub fn tick(&mut self, cycles: u32) {
        self.timer.tick(cycles, &mut self.iflag);
        self.tick_oam_dma(cycles);
        self.ppu
            .tick(cycles, &mut self.io, &mut self.iflag, &self.vram, &self.oam);
    }
}
