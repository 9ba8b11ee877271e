//! C64 bus: memory and I/O routing.
//!
//! Implements `emu_core::Bus` for the main C64 CPU. Routes addresses
//! through the memory banking logic and the I/O chip register map, and
//! owns the chips that the VIC-II and CIAs need wired to each other
//! (VIC bank select from CIA2, keyboard scan through CIA1).
//!
//! The C64 is fully memory-mapped — there is no separate I/O address
//! space, so the 6502 `io_read`/`io_write` methods are unused.

#![allow(clippy::cast_possible_truncation)]

use emu_core::{Bus, ReadResult};
use mos_cia_6526::Cia6526;
use mos_vic_ii::{Vic, VicMemory};

use crate::input::JoystickState;
use crate::keyboard::KeyboardMatrix;
use crate::memory::C64Memory;
use crate::sid::Sid;

struct VicView<'a> {
    memory: &'a C64Memory,
    bank: u8,
}

impl VicMemory for VicView<'_> {
    fn vic_read(&self, addr: u16) -> u8 {
        self.memory.vic_read(self.bank, addr)
    }

    fn colour_ram_read(&self, addr: u16) -> u8 {
        self.memory.colour_ram_read(addr)
    }
}

/// The C64 bus, implementing `emu_core::Bus`. Owns every subsystem the CPU
/// can reach; the CPU touches all of them only through this trait.
pub struct C64Bus {
    pub memory: C64Memory,
    pub vic: Vic,
    pub sid: Sid,
    pub cia1: Cia6526,
    pub cia2: Cia6526,
    pub keyboard: KeyboardMatrix,
    /// Port 2: shares CIA1 port A with the keyboard column select.
    pub joystick2: JoystickState,
    /// Port 1: shares CIA1 port B with the keyboard row sense.
    pub joystick1: JoystickState,
    vic_bank: u8,
}

impl C64Bus {
    #[must_use]
    pub fn new(memory: C64Memory) -> Self {
        Self {
            memory,
            vic: Vic::new(),
            sid: Sid::new(),
            cia1: Cia6526::new(),
            cia2: Cia6526::new(),
            keyboard: KeyboardMatrix::new(),
            joystick2: JoystickState::default(),
            joystick1: JoystickState::default(),
            vic_bank: 0,
        }
    }

    /// Re-derive the VIC-II's 16K bank from CIA2 port A (bits 0-1, active low).
    pub fn update_vic_bank(&mut self) {
        let pa = self.cia2.port_a_output();
        self.vic_bank = (!pa) & 0x03;
    }

    /// Run one raster line of video generation, stepping the VIC against
    /// the memory view selected by the current bank.
    pub fn step_video_line(&mut self) -> mos_vic_ii::LineOutcome {
        let view = VicView {
            memory: &self.memory,
            bank: self.vic_bank,
        };
        self.vic.step_line(&view)
    }

    /// Drive CIA1 port B from the current keyboard matrix state, using
    /// CIA1 port A's output as the column-select mask, before a CPU read
    /// of $dc00 or $dc01 reaches the chip.
    ///
    /// Both joystick ports share these same pins on real hardware. Port 2
    /// lands on port A: software normally reads it directly at $dc00 with
    /// those bits configured as inputs, but a held button can also pull a
    /// driven column line low and disturb the keyboard scan, which is why
    /// it's ANDed into the column-select mask too. Port 1 lands on port B
    /// alongside the row-sense result.
    fn scan_keyboard(&mut self) {
        self.cia1.external_a = self.joystick2.bits();
        let col_mask = self.cia1.port_a_output() & self.joystick2.bits();
        self.cia1.external_b = self.keyboard.scan(col_mask) & self.joystick1.bits();
    }
}

impl Bus for C64Bus {
    fn read(&mut self, addr: u32) -> ReadResult {
        let addr16 = addr as u16;

        if (0xD000..=0xDFFF).contains(&addr16) && self.memory.is_io_visible() {
            let data = match addr16 {
                0xD000..=0xD3FF => {
                    let reg = (addr16 & 0x3F) as u8;
                    match reg {
                        0x1E => self.vic.take_sprite_collision(),
                        0x1F => self.vic.take_background_collision(),
                        _ => self.vic.read(reg),
                    }
                }
                0xD400..=0xD7FF => self.sid.read((addr16 & 0x1F) as u8),
                0xD800..=0xDBFF => self.memory.colour_ram_read(addr16 - 0xD800),
                0xDC00..=0xDCFF => {
                    let reg = (addr16 & 0x0F) as u8;
                    self.scan_keyboard();
                    if reg == 0x0D {
                        self.cia1.read_icr_and_clear()
                    } else {
                        self.cia1.read(reg)
                    }
                }
                0xDD00..=0xDDFF => {
                    let reg = (addr16 & 0x0F) as u8;
                    if reg == 0x0D {
                        self.cia2.read_icr_and_clear()
                    } else {
                        self.cia2.read(reg)
                    }
                }
                _ => 0xFF,
            };
            return ReadResult::new(data);
        }

        ReadResult::new(self.memory.cpu_read(addr16))
    }

    fn write(&mut self, addr: u32, value: u8) -> u8 {
        let addr16 = addr as u16;
        self.memory.cpu_write(addr16, value);

        if (0xD000..=0xDFFF).contains(&addr16) && self.memory.is_io_visible() {
            match addr16 {
                0xD000..=0xD3FF => self.vic.write((addr16 & 0x3F) as u8, value),
                0xD400..=0xD7FF => self.sid.write((addr16 & 0x1F) as u8, value),
                0xD800..=0xDBFF => self.memory.colour_ram_write(addr16 - 0xD800, value),
                0xDC00..=0xDCFF => self.cia1.write((addr16 & 0x0F) as u8, value),
                0xDD00..=0xDDFF => {
                    self.cia2.write((addr16 & 0x0F) as u8, value);
                    if matches!(addr16 & 0x0F, 0x00 | 0x02) {
                        self.update_vic_bank();
                    }
                }
                _ => {}
            }
        }

        0
    }

    fn io_read(&mut self, _addr: u32) -> ReadResult {
        ReadResult::new(0xFF)
    }

    fn io_write(&mut self, _addr: u32, _value: u8) -> u8 {
        0
    }
}
