//! MOS 6526 Complex Interface Adapter (CIA).
//!
//! The C64 carries two: CIA1 ($dc00-$dc0f) drives the keyboard matrix and
//! joystick ports and raises IRQ; CIA2 ($dd00-$dd0f) drives the VIC-II bank
//! select, the IEC serial lines, and the user port, and raises NMI. Both are
//! the same chip — which interrupt line a given instance feeds is a wiring
//! decision made by the caller, not something this type knows about.
//!
//! Port input/output follows the same external-latch pattern as
//! [`mos_via_6522::Via6522`]: `external_a`/`external_b` hold whatever the
//! rest of the system is driving onto the port pins, and a register read
//! merges them with the chip's own output through the data-direction
//! registers.
//!
//! # Registers (per CIA, offsets $0-$f)
//!
//! | Reg | Read                | Write               |
//! |-----|---------------------|---------------------|
//! | $0  | Port A data         | Port A data         |
//! | $1  | Port B data         | Port B data         |
//! | $2  | Port A DDR          | Port A DDR          |
//! | $3  | Port B DDR          | Port B DDR          |
//! | $4  | Timer A low (cnt)   | Timer A low (latch) |
//! | $5  | Timer A high (cnt)  | Timer A high (latch)|
//! | $6  | Timer B low (cnt)   | Timer B low (latch) |
//! | $7  | Timer B high (cnt)  | Timer B high (latch)|
//! | $8  | TOD 10ths           | TOD 10ths           |
//! | $9  | TOD seconds         | TOD seconds         |
//! | $A  | TOD minutes         | TOD minutes         |
//! | $B  | TOD hours           | TOD hours           |
//! | $C  | Serial shift reg    | Serial shift reg    |
//! | $D  | ICR (read/clear)    | ICR (set/clear mask)|
//! | $E  | Control reg A       | Control reg A       |
//! | $F  | Control reg B       | Control reg B       |

#![allow(clippy::cast_possible_truncation)]

use serde::{Deserialize, Serialize};

/// MOS 6526 CIA instance. TOD and the serial shift register are not modelled
/// — nothing in this core's scope drives the TOD alarm or CIA-to-CIA serial
/// transfer, only the IEC bus (handled at a higher level) and timers/ICR.
pub struct Cia6526 {
    port_a: u8,
    port_b: u8,
    ddr_a: u8,
    ddr_b: u8,
    /// External input lines for port A (active-high, directly readable).
    pub external_a: u8,
    /// External input lines for port B (active-high, directly readable).
    pub external_b: u8,

    timer_a: u16,
    timer_a_latch: u16,
    timer_a_running: bool,
    timer_a_oneshot: bool,
    timer_a_force_load: bool,

    timer_b: u16,
    timer_b_latch: u16,
    timer_b_running: bool,
    timer_b_oneshot: bool,
    timer_b_force_load: bool,

    icr_status: u8,
    icr_mask: u8,

    cra: u8,
    crb: u8,
}

impl Default for Cia6526 {
    fn default() -> Self {
        Self::new()
    }
}

impl Cia6526 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            port_a: 0xFF,
            port_b: 0xFF,
            ddr_a: 0,
            ddr_b: 0,
            external_a: 0xFF,
            external_b: 0xFF,
            timer_a: 0xFFFF,
            timer_a_latch: 0xFFFF,
            timer_a_running: false,
            timer_a_oneshot: false,
            timer_a_force_load: false,
            timer_b: 0xFFFF,
            timer_b_latch: 0xFFFF,
            timer_b_running: false,
            timer_b_oneshot: false,
            timer_b_force_load: false,
            icr_status: 0,
            icr_mask: 0,
            cra: 0,
            crb: 0,
        }
    }

    /// Count down Timer A and Timer B by one CPU cycle, reloading from their
    /// latches on underflow and stopping one-shot timers.
    pub fn tick(&mut self) {
        if self.timer_a_force_load {
            self.timer_a = self.timer_a_latch;
            self.timer_a_force_load = false;
        }
        if self.timer_a_running {
            if self.timer_a == 0 {
                self.icr_status |= 0x01;
                self.timer_a = self.timer_a_latch;
                if self.timer_a_oneshot {
                    self.timer_a_running = false;
                    self.cra &= !0x01;
                }
            } else {
                self.timer_a -= 1;
            }
        }

        if self.timer_b_force_load {
            self.timer_b = self.timer_b_latch;
            self.timer_b_force_load = false;
        }
        if self.timer_b_running {
            if self.timer_b == 0 {
                self.icr_status |= 0x02;
                self.timer_b = self.timer_b_latch;
                if self.timer_b_oneshot {
                    self.timer_b_running = false;
                    self.crb &= !0x01;
                }
            } else {
                self.timer_b -= 1;
            }
        }
    }

    #[must_use]
    pub const fn irq_active(&self) -> bool {
        (self.icr_status & self.icr_mask & 0x1F) != 0
    }

    /// Port A as seen from the outside: chip-driven bits plus the external
    /// latch for input bits.
    #[must_use]
    pub const fn port_a_output(&self) -> u8 {
        (self.port_a & self.ddr_a) | (self.external_a & !self.ddr_a)
    }

    /// Port B as seen from the outside (see [`Self::port_a_output`]).
    #[must_use]
    pub const fn port_b_output(&self) -> u8 {
        (self.port_b & self.ddr_b) | (self.external_b & !self.ddr_b)
    }

    #[must_use]
    pub fn read(&self, reg: u8) -> u8 {
        match reg & 0x0F {
            0x00 => self.port_a_output(),
            0x01 => self.port_b_output(),
            0x02 => self.ddr_a,
            0x03 => self.ddr_b,
            0x04 => self.timer_a as u8,
            0x05 => (self.timer_a >> 8) as u8,
            0x06 => self.timer_b as u8,
            0x07 => (self.timer_b >> 8) as u8,
            0x08..=0x0B => 0,
            0x0C => 0,
            0x0D => {
                let any = u8::from(self.irq_active()) << 7;
                self.icr_status | any
            }
            0x0E => self.cra,
            0x0F => self.crb,
            _ => 0xFF,
        }
    }

    /// Read the ICR and clear its status bits, the side effect real hardware
    /// performs on any read of $xD. The bus layer is responsible for routing
    /// reads of that register here instead of through [`Self::read`].
    pub fn read_icr_and_clear(&mut self) -> u8 {
        let value = self.read(0x0D);
        self.icr_status = 0;
        value
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 0x0F {
            0x00 => self.port_a = value,
            0x01 => self.port_b = value,
            0x02 => self.ddr_a = value,
            0x03 => self.ddr_b = value,
            0x04 => self.timer_a_latch = (self.timer_a_latch & 0xFF00) | u16::from(value),
            0x05 => {
                self.timer_a_latch = (self.timer_a_latch & 0x00FF) | (u16::from(value) << 8);
                if !self.timer_a_running {
                    self.timer_a = self.timer_a_latch;
                }
            }
            0x06 => self.timer_b_latch = (self.timer_b_latch & 0xFF00) | u16::from(value),
            0x07 => {
                self.timer_b_latch = (self.timer_b_latch & 0x00FF) | (u16::from(value) << 8);
                if !self.timer_b_running {
                    self.timer_b = self.timer_b_latch;
                }
            }
            0x08..=0x0B | 0x0C => {}
            0x0D => {
                if value & 0x80 != 0 {
                    self.icr_mask |= value & 0x1F;
                } else {
                    self.icr_mask &= !(value & 0x1F);
                }
            }
            0x0E => {
                self.cra = value;
                self.timer_a_running = value & 0x01 != 0;
                self.timer_a_oneshot = value & 0x08 != 0;
                if value & 0x10 != 0 {
                    self.timer_a_force_load = true;
                }
            }
            0x0F => {
                self.crb = value;
                self.timer_b_running = value & 0x01 != 0;
                self.timer_b_oneshot = value & 0x08 != 0;
                if value & 0x10 != 0 {
                    self.timer_b_force_load = true;
                }
            }
            _ => {}
        }
    }

    #[must_use]
    pub const fn timer_a(&self) -> u16 {
        self.timer_a
    }

    #[must_use]
    pub const fn timer_b(&self) -> u16 {
        self.timer_b
    }

    #[must_use]
    pub const fn icr_status(&self) -> u8 {
        self.icr_status
    }

    #[must_use]
    pub const fn icr_mask(&self) -> u8 {
        self.icr_mask
    }

    /// Capture every register and latch needed to resume this chip, for
    /// save states. TOD and the serial shift register are never part of
    /// the live state (see the module doc), so there is nothing to omit.
    #[must_use]
    pub fn snapshot(&self) -> CiaSnapshot {
        CiaSnapshot {
            port_a: self.port_a,
            port_b: self.port_b,
            ddr_a: self.ddr_a,
            ddr_b: self.ddr_b,
            external_a: self.external_a,
            external_b: self.external_b,
            timer_a: self.timer_a,
            timer_a_latch: self.timer_a_latch,
            timer_a_running: self.timer_a_running,
            timer_a_oneshot: self.timer_a_oneshot,
            timer_a_force_load: self.timer_a_force_load,
            timer_b: self.timer_b,
            timer_b_latch: self.timer_b_latch,
            timer_b_running: self.timer_b_running,
            timer_b_oneshot: self.timer_b_oneshot,
            timer_b_force_load: self.timer_b_force_load,
            icr_status: self.icr_status,
            icr_mask: self.icr_mask,
            cra: self.cra,
            crb: self.crb,
        }
    }

    /// Restore state captured by [`Cia6526::snapshot`].
    pub fn restore(&mut self, snap: &CiaSnapshot) {
        self.port_a = snap.port_a;
        self.port_b = snap.port_b;
        self.ddr_a = snap.ddr_a;
        self.ddr_b = snap.ddr_b;
        self.external_a = snap.external_a;
        self.external_b = snap.external_b;
        self.timer_a = snap.timer_a;
        self.timer_a_latch = snap.timer_a_latch;
        self.timer_a_running = snap.timer_a_running;
        self.timer_a_oneshot = snap.timer_a_oneshot;
        self.timer_a_force_load = snap.timer_a_force_load;
        self.timer_b = snap.timer_b;
        self.timer_b_latch = snap.timer_b_latch;
        self.timer_b_running = snap.timer_b_running;
        self.timer_b_oneshot = snap.timer_b_oneshot;
        self.timer_b_force_load = snap.timer_b_force_load;
        self.icr_status = snap.icr_status;
        self.icr_mask = snap.icr_mask;
        self.cra = snap.cra;
        self.crb = snap.crb;
    }
}

/// Serializable snapshot of a [`Cia6526`], for save states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiaSnapshot {
    port_a: u8,
    port_b: u8,
    ddr_a: u8,
    ddr_b: u8,
    external_a: u8,
    external_b: u8,
    timer_a: u16,
    timer_a_latch: u16,
    timer_a_running: bool,
    timer_a_oneshot: bool,
    timer_a_force_load: bool,
    timer_b: u16,
    timer_b_latch: u16,
    timer_b_running: bool,
    timer_b_oneshot: bool,
    timer_b_force_load: bool,
    icr_status: u8,
    icr_mask: u8,
    cra: u8,
    crb: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_a_countdown_underflows() {
        let mut cia = Cia6526::new();
        cia.write(0x04, 10);
        cia.write(0x05, 0);
        cia.write(0x0E, 0x01);
        for _ in 0..11 {
            cia.tick();
        }
        assert!(cia.icr_status() & 0x01 != 0);
    }

    #[test]
    fn timer_a_oneshot_stops() {
        let mut cia = Cia6526::new();
        cia.write(0x04, 5);
        cia.write(0x05, 0);
        cia.write(0x0E, 0x09);
        for _ in 0..6 {
            cia.tick();
        }
        assert!(cia.icr_status() & 0x01 != 0);
        assert_eq!(cia.cra & 0x01, 0);
    }

    #[test]
    fn icr_read_clears_status() {
        let mut cia = Cia6526::new();
        cia.icr_status = 0x01;
        cia.icr_mask = 0x01;
        let val = cia.read_icr_and_clear();
        assert_eq!(val, 0x81);
        assert_eq!(cia.icr_status(), 0);
    }

    #[test]
    fn icr_mask_set_and_clear() {
        let mut cia = Cia6526::new();
        cia.write(0x0D, 0x83);
        assert_eq!(cia.icr_mask(), 0x03);
        cia.write(0x0D, 0x01);
        assert_eq!(cia.icr_mask(), 0x02);
    }

    #[test]
    fn irq_active_requires_mask_and_status() {
        let mut cia = Cia6526::new();
        cia.icr_status = 0x01;
        assert!(!cia.irq_active());
        cia.icr_mask = 0x01;
        assert!(cia.irq_active());
    }

    #[test]
    fn port_merges_output_and_external_by_direction() {
        let mut cia = Cia6526::new();
        cia.write(0x02, 0x0F); // low nibble output, high nibble input
        cia.write(0x00, 0xFF);
        cia.external_a = 0xA0;
        assert_eq!(cia.port_a_output(), 0xAF);
    }
}
