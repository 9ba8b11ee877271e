//! A cycle-stepped MOS 6502 core shared by the main C64 CPU and the 1541
//! drive's CPU.
//!
//! Real 6502 hardware overlaps instruction fetch with the tail of the
//! previous instruction's execution, and several addressing modes interleave
//! reads and writes across specific cycles. This core does not model that:
//! each instruction's full effect (operand fetch, ALU operation, writeback)
//! happens atomically on the first `tick()` of that instruction, and the
//! remaining cycles it's entitled to are then paced out as no-op ticks. This
//! keeps bus timing compatible with callers that step a whole line of CPU
//! cycles at once without needing a true per-cycle microcode sequencer.

pub mod addressing;
mod execute;
pub mod flags;
mod opcodes;
pub mod registers;

pub use flags::Status;
pub use registers::Registers;

use emu_core::{Bus, Cpu};
use serde::{Deserialize, Serialize};

/// A one-shot notification the owning scheduler should observe and consume.
///
/// These are not errors: a jammed CPU or an extension call are both expected,
/// handled outcomes, just not ones that fit into the normal register/flag
/// state a caller already polls every line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuEvent {
    /// The CPU executed a documented jam/`KIL` opcode and is now frozen.
    Jammed { pc: u16 },
    /// The drive CPU hit its `$f2` extension opcode above `$c000`; the
    /// payload is the selector byte that followed it.
    ExtensionCall(u8),
}

/// A MOS 6502 (or 6510) compatible CPU core.
pub struct Mos6502 {
    pub regs: Registers,
    /// True for the 1541 drive's CPU, which recognises the `$f2` extension
    /// opcode above `$c000` instead of jamming on it.
    pub is_drive: bool,
    /// Cycles still owed for the instruction in flight. Zero means the next
    /// `tick()` starts a new instruction.
    pending_cycles: u8,
    halted: bool,
    nmi_pending: bool,
    irq_line: bool,
    reset_pending: bool,
    event: Option<CpuEvent>,
}

impl Default for Mos6502 {
    fn default() -> Self {
        Self::new()
    }
}

impl Mos6502 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            is_drive: false,
            pending_cycles: 0,
            halted: false,
            nmi_pending: false,
            irq_line: false,
            reset_pending: true,
            event: None,
        }
    }

    /// Whether the instruction started by the most recent `tick()` has
    /// finished running (all of its owed cycles have been paced out).
    #[must_use]
    pub const fn is_instruction_complete(&self) -> bool {
        self.pending_cycles == 0
    }

    /// Drain the last pending notification, if any.
    pub fn take_event(&mut self) -> Option<CpuEvent> {
        self.event.take()
    }

    /// Raise the CPU's level-sensitive IRQ line. The caller is responsible
    /// for holding it while the interrupt source is asserted and clearing it
    /// once acknowledged, matching real open-collector IRQ wiring.
    pub fn set_irq_line(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    /// Capture the state needed to resume this CPU exactly where it left
    /// off: registers, the in-flight instruction's remaining cycle budget,
    /// and pending interrupt lines. Excludes `event`, which is a one-shot
    /// notification the scheduler is expected to have already drained.
    #[must_use]
    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            regs: self.regs,
            is_drive: self.is_drive,
            pending_cycles: self.pending_cycles,
            halted: self.halted,
            nmi_pending: self.nmi_pending,
            irq_line: self.irq_line,
            reset_pending: self.reset_pending,
        }
    }

    /// Restore state captured by [`Mos6502::snapshot`].
    pub fn restore(&mut self, snap: &CpuSnapshot) {
        self.regs = snap.regs;
        self.is_drive = snap.is_drive;
        self.pending_cycles = snap.pending_cycles;
        self.halted = snap.halted;
        self.nmi_pending = snap.nmi_pending;
        self.irq_line = snap.irq_line;
        self.reset_pending = snap.reset_pending;
        self.event = None;
    }

    fn service_interrupt(&mut self, bus: &mut impl Bus, vector: u16, set_break: bool) -> u8 {
        let pc = self.regs.pc;
        let [lo, hi] = pc.to_le_bytes();
        let sp_hi = self.regs.push();
        bus.write(u32::from(sp_hi), hi);
        let sp_lo = self.regs.push();
        bus.write(u32::from(sp_lo), lo);
        let p = self.regs.p.push_value(set_break);
        let sp_p = self.regs.push();
        bus.write(u32::from(sp_p), p);
        self.regs.p.set(flags::I, true);
        let vlo = bus.read(u32::from(vector)).data;
        let vhi = bus.read(u32::from(vector + 1)).data;
        self.regs.pc = u16::from_le_bytes([vlo, vhi]);
        7
    }
}

/// Serializable snapshot of a [`Mos6502`], for save states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuSnapshot {
    regs: Registers,
    is_drive: bool,
    pending_cycles: u8,
    halted: bool,
    nmi_pending: bool,
    irq_line: bool,
    reset_pending: bool,
}

impl Cpu for Mos6502 {
    type Registers = Registers;

    fn tick<B: Bus>(&mut self, bus: &mut B) {
        if self.halted {
            return;
        }
        if self.pending_cycles > 0 {
            self.pending_cycles -= 1;
            return;
        }

        if self.reset_pending {
            self.reset_pending = false;
            let lo = bus.read(0xFFFC).data;
            let hi = bus.read(0xFFFD).data;
            self.regs.pc = u16::from_le_bytes([lo, hi]);
            self.pending_cycles = 6;
            return;
        }

        if self.nmi_pending {
            self.nmi_pending = false;
            self.pending_cycles = self.service_interrupt(bus, 0xFFFA, false) - 1;
            return;
        }

        if self.irq_line && !self.regs.p.is_set(flags::I) {
            self.pending_cycles = self.service_interrupt(bus, 0xFFFE, false) - 1;
            return;
        }

        let total = self.step_instruction(bus);
        self.pending_cycles = if self.halted {
            0
        } else {
            total.saturating_sub(1)
        };
    }

    fn pc(&self) -> u32 {
        u32::from(self.regs.pc)
    }

    fn registers(&self) -> Self::Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.halted
    }

    fn interrupt(&mut self) -> bool {
        let accepted = !self.regs.p.is_set(flags::I);
        self.irq_line = true;
        accepted
    }

    fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    fn reset(&mut self) {
        self.regs = Registers::new();
        self.pending_cycles = 0;
        self.halted = false;
        self.nmi_pending = false;
        self.irq_line = false;
        self.reset_pending = true;
        self.event = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::SimpleBus;

    #[test]
    fn reset_loads_vector() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.write(0xFFFC, 0x00);
        bus.write(0xFFFD, 0x80);
        while !cpu.is_instruction_complete() || cpu.regs.pc == 0 {
            cpu.tick(&mut bus);
        }
        assert_eq!(cpu.regs.pc, 0x8000);
    }

    #[test]
    fn irq_ignored_when_interrupt_disabled() {
        let mut cpu = Mos6502::new();
        cpu.reset_pending = false;
        cpu.regs.p.set(flags::I, true);
        cpu.regs.pc = 0x1234;
        let mut bus = SimpleBus::new();
        bus.write(0x1234, 0xEA); // NOP
        cpu.interrupt();
        cpu.tick(&mut bus);
        assert_eq!(cpu.regs.pc, 0x1235);
    }

    #[test]
    fn nmi_always_serviced() {
        let mut cpu = Mos6502::new();
        cpu.reset_pending = false;
        cpu.regs.pc = 0x1234;
        cpu.regs.p.set(flags::I, true);
        let mut bus = SimpleBus::new();
        bus.write(0xFFFA, 0x00);
        bus.write(0xFFFB, 0x90);
        cpu.nmi();
        cpu.tick(&mut bus);
        assert_eq!(cpu.regs.pc, 0x9000);
    }
}
