//! Instruction effects.
//!
//! One method per opcode family, dispatched from [`crate::Mos6502::step_instruction`].
//! Addressing is resolved first (see `addressing.rs`), then the effect reads
//! and/or writes through the operand address. Page-cross and branch-taken
//! cycle penalties are returned to the caller rather than applied here, since
//! they're additive on top of the opcode table's base cycle count.

use emu_core::Bus;

use crate::addressing::{Mode, Operand};
use crate::flags::{C, D, I, N, V, Z};
use crate::opcodes::{OpInfo, JAM_OPCODES, OPCODE_TABLE};
use crate::{CpuEvent, Mos6502};

/// Drive-CPU extension entrypoint: opcode `$f2` at `pc >= $c000` reads one
/// selector byte instead of jamming.
const EXTENSION_OPCODE: u8 = 0xF2;
const EXTENSION_THRESHOLD: u16 = 0xC000;

impl Mos6502 {
    /// Fetch and run exactly one instruction, returning its total cycle cost.
    pub(crate) fn step_instruction(&mut self, bus: &mut impl Bus) -> u8 {
        let opcode_addr = self.regs.pc;
        let opcode = self.fetch(bus);

        if self.is_drive && opcode == EXTENSION_OPCODE && opcode_addr >= EXTENSION_THRESHOLD {
            let selector = self.fetch(bus);
            self.event = Some(CpuEvent::ExtensionCall(selector));
            return 2;
        }

        if JAM_OPCODES.contains(&opcode) {
            self.halted = true;
            self.event = Some(CpuEvent::Jammed { pc: opcode_addr });
            return 2;
        }

        let info = OPCODE_TABLE[opcode as usize];
        let (operand, extra) = self.resolve(info, bus);
        let branch_extra = self.execute(opcode, info, operand.as_ref(), bus);
        info.cycles + extra + branch_extra
    }

    fn resolve(&mut self, info: OpInfo, bus: &mut impl Bus) -> (Option<Operand>, u8) {
        let operand = match info.mode {
            Mode::Implied | Mode::Accumulator => None,
            Mode::Immediate => Some(self.addr_immediate(bus)),
            Mode::ZeroPage => Some(self.addr_zero_page(bus)),
            Mode::ZeroPageX => Some(self.addr_zero_page_x(bus)),
            Mode::ZeroPageY => Some(self.addr_zero_page_y(bus)),
            Mode::Absolute => Some(self.addr_absolute(bus)),
            Mode::AbsoluteX => Some(self.addr_absolute_x(bus)),
            Mode::AbsoluteY => Some(self.addr_absolute_y(bus)),
            Mode::Indirect => Some(self.addr_indirect(bus)),
            Mode::IndexedIndirect => Some(self.addr_indexed_indirect(bus)),
            Mode::IndirectIndexed => Some(self.addr_indirect_indexed(bus)),
            Mode::Relative => Some(self.addr_relative(bus)),
        };
        let extra = match &operand {
            Some(op) if info.page_penalty && op.page_crossed => 1,
            _ => 0,
        };
        (operand, extra)
    }

    #[allow(clippy::too_many_lines)]
    fn execute(
        &mut self,
        opcode: u8,
        info: OpInfo,
        operand: Option<&Operand>,
        bus: &mut impl Bus,
    ) -> u8 {
        let addr = operand.map(|o| o.addr);
        match opcode {
            // Loads
            0xA9 | 0xA5 | 0xB5 | 0xAD | 0xBD | 0xB9 | 0xA1 | 0xB1 => {
                let v = self.read_operand(bus, addr.unwrap());
                self.regs.a = v;
                self.regs.p.set_zn(v);
            }
            0xA2 | 0xA6 | 0xB6 | 0xAE | 0xBE => {
                let v = self.read_operand(bus, addr.unwrap());
                self.regs.x = v;
                self.regs.p.set_zn(v);
            }
            0xA0 | 0xA4 | 0xB4 | 0xAC | 0xBC => {
                let v = self.read_operand(bus, addr.unwrap());
                self.regs.y = v;
                self.regs.p.set_zn(v);
            }
            // Stores
            0x85 | 0x95 | 0x8D | 0x9D | 0x99 | 0x81 | 0x91 => {
                let v = self.regs.a;
                self.write_operand(bus, addr.unwrap(), v);
            }
            0x86 | 0x96 | 0x8E => {
                let v = self.regs.x;
                self.write_operand(bus, addr.unwrap(), v);
            }
            0x84 | 0x94 | 0x8C => {
                let v = self.regs.y;
                self.write_operand(bus, addr.unwrap(), v);
            }
            // Transfers
            0xAA => {
                self.regs.x = self.regs.a;
                self.regs.p.set_zn(self.regs.x);
            }
            0xA8 => {
                self.regs.y = self.regs.a;
                self.regs.p.set_zn(self.regs.y);
            }
            0x8A => {
                self.regs.a = self.regs.x;
                self.regs.p.set_zn(self.regs.a);
            }
            0x98 => {
                self.regs.a = self.regs.y;
                self.regs.p.set_zn(self.regs.a);
            }
            0xBA => {
                self.regs.x = self.regs.s;
                self.regs.p.set_zn(self.regs.x);
            }
            0x9A => self.regs.s = self.regs.x,
            // Stack
            0x48 => {
                let a = self.regs.a;
                self.push_byte(bus, a);
            }
            0x68 => {
                self.regs.a = self.pop_byte(bus);
                self.regs.p.set_zn(self.regs.a);
            }
            0x08 => {
                let p = self.regs.p.push_value(true);
                self.push_byte(bus, p);
            }
            0x28 => {
                let p = self.pop_byte(bus);
                self.regs.p = crate::Status::from_pulled(p);
            }
            // ADC / SBC
            0x69 | 0x65 | 0x75 | 0x6D | 0x7D | 0x79 | 0x61 | 0x71 => {
                let v = self.read_operand(bus, addr.unwrap());
                self.adc(v);
            }
            0xE9 | 0xE5 | 0xF5 | 0xED | 0xFD | 0xF9 | 0xE1 | 0xF1 => {
                let v = self.read_operand(bus, addr.unwrap());
                self.sbc(v);
            }
            // INC/DEC memory
            0xE6 | 0xF6 | 0xEE | 0xFE => {
                let v = self.read_operand(bus, addr.unwrap()).wrapping_add(1);
                self.write_operand(bus, addr.unwrap(), v);
                self.regs.p.set_zn(v);
            }
            0xC6 | 0xD6 | 0xCE | 0xDE => {
                let v = self.read_operand(bus, addr.unwrap()).wrapping_sub(1);
                self.write_operand(bus, addr.unwrap(), v);
                self.regs.p.set_zn(v);
            }
            0xE8 => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.regs.p.set_zn(self.regs.x);
            }
            0xC8 => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.regs.p.set_zn(self.regs.y);
            }
            0xCA => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.regs.p.set_zn(self.regs.x);
            }
            0x88 => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.regs.p.set_zn(self.regs.y);
            }
            // Logic
            0x29 | 0x25 | 0x35 | 0x2D | 0x3D | 0x39 | 0x21 | 0x31 => {
                let v = self.read_operand(bus, addr.unwrap());
                self.regs.a &= v;
                self.regs.p.set_zn(self.regs.a);
            }
            0x09 | 0x05 | 0x15 | 0x0D | 0x1D | 0x19 | 0x01 | 0x11 => {
                let v = self.read_operand(bus, addr.unwrap());
                self.regs.a |= v;
                self.regs.p.set_zn(self.regs.a);
            }
            0x49 | 0x45 | 0x55 | 0x4D | 0x5D | 0x59 | 0x41 | 0x51 => {
                let v = self.read_operand(bus, addr.unwrap());
                self.regs.a ^= v;
                self.regs.p.set_zn(self.regs.a);
            }
            0x24 | 0x2C => {
                let v = self.read_operand(bus, addr.unwrap());
                self.regs.p.set(Z, (self.regs.a & v) == 0);
                self.regs.p.set(N, v & N != 0);
                self.regs.p.set(V, v & V != 0);
            }
            // Shifts/rotates
            0x0A | 0x06 | 0x16 | 0x0E | 0x1E => self.rmw(info, addr, bus, Self::asl),
            0x4A | 0x46 | 0x56 | 0x4E | 0x5E => self.rmw(info, addr, bus, Self::lsr),
            0x2A | 0x26 | 0x36 | 0x2E | 0x3E => self.rmw(info, addr, bus, Self::rol),
            0x6A | 0x66 | 0x76 | 0x6E | 0x7E => self.rmw(info, addr, bus, Self::ror),
            // Compare
            0xC9 | 0xC5 | 0xD5 | 0xCD | 0xDD | 0xD9 | 0xC1 | 0xD1 => {
                let v = self.read_operand(bus, addr.unwrap());
                self.compare(self.regs.a, v);
            }
            0xE0 | 0xE4 | 0xEC => {
                let v = self.read_operand(bus, addr.unwrap());
                self.compare(self.regs.x, v);
            }
            0xC0 | 0xC4 | 0xCC => {
                let v = self.read_operand(bus, addr.unwrap());
                self.compare(self.regs.y, v);
            }
            // Branches
            0x10 => return self.branch(!self.regs.p.is_set(N), addr.unwrap()),
            0x30 => return self.branch(self.regs.p.is_set(N), addr.unwrap()),
            0x50 => return self.branch(!self.regs.p.is_set(V), addr.unwrap()),
            0x70 => return self.branch(self.regs.p.is_set(V), addr.unwrap()),
            0x90 => return self.branch(!self.regs.p.is_set(C), addr.unwrap()),
            0xB0 => return self.branch(self.regs.p.is_set(C), addr.unwrap()),
            0xD0 => return self.branch(!self.regs.p.is_set(Z), addr.unwrap()),
            0xF0 => return self.branch(self.regs.p.is_set(Z), addr.unwrap()),
            // Jumps
            0x4C | 0x6C => self.regs.pc = addr.unwrap(),
            0x20 => {
                let ret = self.regs.pc.wrapping_sub(1);
                self.push_word(bus, ret);
                self.regs.pc = addr.unwrap();
            }
            0x60 => {
                let ret = self.pop_word(bus);
                self.regs.pc = ret.wrapping_add(1);
            }
            0x40 => {
                let p = self.pop_byte(bus);
                self.regs.p = crate::Status::from_pulled(p);
                self.regs.pc = self.pop_word(bus);
            }
            0x00 => self.brk(bus),
            // Flags
            0x18 => self.regs.p.set(C, false),
            0x38 => self.regs.p.set(C, true),
            0x58 => self.regs.p.set(I, false),
            0x78 => self.regs.p.set(I, true),
            0xB8 => self.regs.p.set(V, false),
            0xD8 => self.regs.p.set(D, false),
            0xF8 => self.regs.p.set(D, true),
            0xEA => {}
            // Stable illegal subset
            0x07 | 0x17 | 0x0F | 0x1F | 0x1B | 0x03 | 0x13 => self.rmw_illegal(info, addr, bus, Self::asl, |cpu, v| cpu.regs.a |= v),
            0x27 | 0x37 | 0x2F | 0x3F | 0x3B | 0x23 | 0x33 => self.rmw_illegal(info, addr, bus, Self::rol, |cpu, v| cpu.regs.a &= v),
            0x47 | 0x57 | 0x4F | 0x5F | 0x5B | 0x43 | 0x53 => self.rmw_illegal(info, addr, bus, Self::lsr, |cpu, v| cpu.regs.a ^= v),
            0x67 | 0x77 | 0x6F | 0x7F | 0x7B | 0x63 | 0x73 => {
                self.rmw_illegal(info, addr, bus, Self::ror, Self::adc);
            }
            0x87 | 0x97 | 0x8F | 0x83 => {
                let v = self.regs.a & self.regs.x;
                self.write_operand(bus, addr.unwrap(), v);
            }
            0xA7 | 0xB7 | 0xAF | 0xBF | 0xA3 | 0xB3 => {
                let v = self.read_operand(bus, addr.unwrap());
                self.regs.a = v;
                self.regs.x = v;
                self.regs.p.set_zn(v);
            }
            0xC7 | 0xD7 | 0xCF | 0xDF | 0xDB | 0xC3 | 0xD3 => {
                let v = self.read_operand(bus, addr.unwrap()).wrapping_sub(1);
                self.write_operand(bus, addr.unwrap(), v);
                self.compare(self.regs.a, v);
            }
            0xE7 | 0xF7 | 0xEF | 0xFF | 0xFB | 0xE3 | 0xF3 => {
                let v = self.read_operand(bus, addr.unwrap()).wrapping_add(1);
                self.write_operand(bus, addr.unwrap(), v);
                self.sbc(v);
            }
            _ => {} // remaining illegal opcodes: behave as NOP
        }
        0
    }

    fn read_operand(&mut self, bus: &mut impl Bus, addr: u16) -> u8 {
        bus.read(u32::from(addr)).data
    }

    fn write_operand(&mut self, bus: &mut impl Bus, addr: u16, value: u8) {
        bus.write(u32::from(addr), value);
    }

    fn push_byte(&mut self, bus: &mut impl Bus, value: u8) {
        let addr = self.regs.push();
        bus.write(u32::from(addr), value);
    }

    fn pop_byte(&mut self, bus: &mut impl Bus) -> u8 {
        let addr = self.regs.pop();
        bus.read(u32::from(addr)).data
    }

    fn push_word(&mut self, bus: &mut impl Bus, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.push_byte(bus, hi);
        self.push_byte(bus, lo);
    }

    fn pop_word(&mut self, bus: &mut impl Bus) -> u16 {
        let lo = self.pop_byte(bus);
        let hi = self.pop_byte(bus);
        u16::from_le_bytes([lo, hi])
    }

    fn brk(&mut self, bus: &mut impl Bus) {
        let _padding = self.fetch(bus);
        let ret = self.regs.pc;
        self.push_word(bus, ret);
        let p = self.regs.p.push_value(true);
        self.push_byte(bus, p);
        self.regs.p.set(I, true);
        let lo = bus.read(0xFFFE).data;
        let hi = bus.read(0xFFFF).data;
        self.regs.pc = u16::from_le_bytes([lo, hi]);
    }

    fn branch(&mut self, taken: bool, target: u16) -> u8 {
        if !taken {
            return 0;
        }
        let old_page = self.regs.pc & 0xFF00;
        self.regs.pc = target;
        if old_page == (target & 0xFF00) {
            1
        } else {
            2
        }
    }

    fn compare(&mut self, reg: u8, value: u8) {
        let result = reg.wrapping_sub(value);
        self.regs.p.set(C, reg >= value);
        self.regs.p.set_zn(result);
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.regs.p.set(C, value & 0x80 != 0);
        let result = value << 1;
        self.regs.p.set_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.regs.p.set(C, value & 0x01 != 0);
        let result = value >> 1;
        self.regs.p.set_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.regs.p.is_set(C));
        self.regs.p.set(C, value & 0x80 != 0);
        let result = (value << 1) | carry_in;
        self.regs.p.set_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.regs.p.is_set(C));
        self.regs.p.set(C, value & 0x01 != 0);
        let result = (value >> 1) | (carry_in << 7);
        self.regs.p.set_zn(result);
        result
    }

    fn rmw(
        &mut self,
        info: OpInfo,
        addr: Option<u16>,
        bus: &mut impl Bus,
        op: fn(&mut Self, u8) -> u8,
    ) {
        if info.mode == Mode::Accumulator {
            let v = op(self, self.regs.a);
            self.regs.a = v;
            return;
        }
        let addr = addr.expect("memory-form shift always has an operand address");
        let v = self.read_operand(bus, addr);
        let result = op(self, v);
        self.write_operand(bus, addr, result);
    }

    fn rmw_illegal(
        &mut self,
        _info: OpInfo,
        addr: Option<u16>,
        bus: &mut impl Bus,
        shift: fn(&mut Self, u8) -> u8,
        combine: fn(&mut Self, u8),
    ) {
        let addr = addr.expect("illegal RMW opcodes are never implied/accumulator");
        let v = self.read_operand(bus, addr);
        let result = shift(self, v);
        self.write_operand(bus, addr, result);
        combine(self, result);
        self.regs.p.set_zn(self.regs.a);
    }

    fn adc(&mut self, value: u8) {
        let a = self.regs.a;
        let carry = u16::from(self.regs.p.is_set(C));
        if self.regs.p.is_set(D) {
            let mut al = u16::from(a & 0x0F) + u16::from(value & 0x0F) + carry;
            if al > 0x09 {
                al += 0x06;
            }
            let mut ah = u16::from(a >> 4) + u16::from(value >> 4) + u16::from(al > 0x0F);

            let bin = u16::from(a) + u16::from(value) + carry;
            self.regs.p.set(Z, (bin & 0xFF) == 0);
            let pre_correct = (((ah << 4) | (al & 0x0F)) & 0xFF) as u8;
            self.regs.p.set(N, pre_correct & 0x80 != 0);
            self.regs
                .p
                .set(V, (!(a ^ value) & (a ^ pre_correct)) & 0x80 != 0);

            if ah > 0x09 {
                ah += 0x06;
            }
            self.regs.p.set(C, ah > 0x0F);
            self.regs.a = (((ah << 4) | (al & 0x0F)) & 0xFF) as u8;
        } else {
            let sum = u16::from(a) + u16::from(value) + carry;
            let result = sum as u8;
            self.regs.p.set(C, sum > 0xFF);
            self.regs.p.set(V, !(a ^ value) & (a ^ result) & 0x80 != 0);
            self.regs.a = result;
            self.regs.p.set_zn(result);
        }
    }

    fn sbc(&mut self, value: u8) {
        if !self.regs.p.is_set(D) {
            self.adc(!value);
            return;
        }
        let a = self.regs.a;
        let borrow = i16::from(!self.regs.p.is_set(C));
        let mut al = i16::from(a & 0x0F) - i16::from(value & 0x0F) - borrow;
        let mut ah = i16::from(a >> 4) - i16::from(value >> 4);
        if al < 0 {
            al -= 0x06;
            ah -= 1;
        }
        if ah < 0 {
            ah -= 0x06;
        }

        let bin = i16::from(a) - i16::from(value) - borrow;
        self.regs.p.set(C, bin >= 0);
        let bin_result = bin as u8;
        self.regs
            .p
            .set(V, (a ^ value) & (a ^ bin_result) & 0x80 != 0);
        self.regs.p.set_zn(bin_result);
        self.regs.a = (((ah << 4) | (al & 0x0F)) & 0xFF) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::{Cpu, SimpleBus};

    fn run(cpu: &mut Mos6502, bus: &mut SimpleBus) {
        cpu.tick(bus);
        let mut guard = 0;
        while !cpu.is_instruction_complete() {
            cpu.tick(bus);
            guard += 1;
            assert!(guard < 20, "instruction never completed");
        }
    }

    #[test]
    fn lda_immediate_sets_flags() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.load(0x0200, &[0xA9, 0x00]);
        cpu.regs.pc = 0x0200;
        run(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.a, 0);
        assert!(cpu.regs.p.is_set(Z));
    }

    #[test]
    fn adc_binary_carry() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.load(0x0200, &[0x69, 0x01]);
        cpu.regs.pc = 0x0200;
        cpu.regs.a = 0xFF;
        run(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.a, 0x00);
        assert!(cpu.regs.p.is_set(C));
        assert!(cpu.regs.p.is_set(Z));
    }

    #[test]
    fn adc_decimal_mode() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.load(0x0200, &[0x69, 0x01]);
        cpu.regs.pc = 0x0200;
        cpu.regs.a = 0x09;
        cpu.regs.p.set(D, true);
        run(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.a, 0x10);
    }

    #[test]
    fn jam_opcode_halts() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.load(0x0200, &[0x02]);
        cpu.regs.pc = 0x0200;
        run(&mut cpu, &mut bus);
        assert!(cpu.is_halted());
        assert!(matches!(cpu.take_event(), Some(CpuEvent::Jammed { .. })));
    }

    #[test]
    fn drive_extension_opcode_above_threshold() {
        let mut cpu = Mos6502::new();
        cpu.is_drive = true;
        let mut bus = SimpleBus::new();
        bus.load(0xC000, &[0xF2, 0x01]);
        cpu.regs.pc = 0xC000;
        run(&mut cpu, &mut bus);
        assert!(!cpu.is_halted());
        assert!(matches!(
            cpu.take_event(),
            Some(CpuEvent::ExtensionCall(0x01))
        ));
    }
}
