//! Per-opcode addressing mode, base cycle count, and page-cross penalty.
//!
//! `KIL` marks the documented jam opcodes; everything else not explicitly
//! listed falls back to a one-byte, 2-cycle NOP-shaped illegal opcode,
//! matching how unstable illegals behave closely enough for this core's
//! purposes (the spec only requires the *stable* illegal subset).

use crate::addressing::Mode;

#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub mode: Mode,
    pub cycles: u8,
    pub page_penalty: bool,
}

const fn op(mode: Mode, cycles: u8, page_penalty: bool) -> OpInfo {
    OpInfo {
        mode,
        cycles,
        page_penalty,
    }
}

/// Opcodes that jam the CPU (the documented "KIL"/"HLT" family). `$f2` is
/// excluded: on the drive CPU it is the emulator's extension opcode when
/// `pc >= $c000`, and falls through to this table (jam) everywhere else.
pub const JAM_OPCODES: [u8; 12] = [
    0x02, 0x12, 0x22, 0x32, 0x42, 0x52, 0x62, 0x72, 0x92, 0xB2, 0xD2, 0xF2,
];

pub const OPCODE_TABLE: [OpInfo; 256] = build_table();

const fn build_table() -> [OpInfo; 256] {
    use Mode::{
        Absolute, AbsoluteX, AbsoluteY, Accumulator, Immediate, Implied, IndexedIndirect,
        Indirect, IndirectIndexed, Relative, ZeroPage, ZeroPageX, ZeroPageY,
    };

    // Default: illegal opcode, 1 byte, 2 cycles.
    let mut table = [op(Implied, 2, false); 256];

    macro_rules! set {
        ($($opcode:expr => ($mode:expr, $cycles:expr, $penalty:expr)),* $(,)?) => {
            $(table[$opcode] = op($mode, $cycles, $penalty);)*
        };
    }

    set! {
        // LDA
        0xA9 => (Immediate, 2, false), 0xA5 => (ZeroPage, 3, false), 0xB5 => (ZeroPageX, 4, false),
        0xAD => (Absolute, 4, false), 0xBD => (AbsoluteX, 4, true), 0xB9 => (AbsoluteY, 4, true),
        0xA1 => (IndexedIndirect, 6, false), 0xB1 => (IndirectIndexed, 5, true),
        // LDX
        0xA2 => (Immediate, 2, false), 0xA6 => (ZeroPage, 3, false), 0xB6 => (ZeroPageY, 4, false),
        0xAE => (Absolute, 4, false), 0xBE => (AbsoluteY, 4, true),
        // LDY
        0xA0 => (Immediate, 2, false), 0xA4 => (ZeroPage, 3, false), 0xB4 => (ZeroPageX, 4, false),
        0xAC => (Absolute, 4, false), 0xBC => (AbsoluteX, 4, true),
        // STA
        0x85 => (ZeroPage, 3, false), 0x95 => (ZeroPageX, 4, false), 0x8D => (Absolute, 4, false),
        0x9D => (AbsoluteX, 5, false), 0x99 => (AbsoluteY, 5, false), 0x81 => (IndexedIndirect, 6, false),
        0x91 => (IndirectIndexed, 6, false),
        // STX / STY
        0x86 => (ZeroPage, 3, false), 0x96 => (ZeroPageY, 4, false), 0x8E => (Absolute, 4, false),
        0x84 => (ZeroPage, 3, false), 0x94 => (ZeroPageX, 4, false), 0x8C => (Absolute, 4, false),
        // Transfers / stack
        0xAA => (Implied, 2, false), 0xA8 => (Implied, 2, false), 0xBA => (Implied, 2, false),
        0x8A => (Implied, 2, false), 0x9A => (Implied, 2, false), 0x98 => (Implied, 2, false),
        0x48 => (Implied, 3, false), 0x68 => (Implied, 4, false),
        0x08 => (Implied, 3, false), 0x28 => (Implied, 4, false),
        // ADC / SBC
        0x69 => (Immediate, 2, false), 0x65 => (ZeroPage, 3, false), 0x75 => (ZeroPageX, 4, false),
        0x6D => (Absolute, 4, false), 0x7D => (AbsoluteX, 4, true), 0x79 => (AbsoluteY, 4, true),
        0x61 => (IndexedIndirect, 6, false), 0x71 => (IndirectIndexed, 5, true),
        0xE9 => (Immediate, 2, false), 0xE5 => (ZeroPage, 3, false), 0xF5 => (ZeroPageX, 4, false),
        0xED => (Absolute, 4, false), 0xFD => (AbsoluteX, 4, true), 0xF9 => (AbsoluteY, 4, true),
        0xE1 => (IndexedIndirect, 6, false), 0xF1 => (IndirectIndexed, 5, true),
        // INC/DEC memory and registers
        0xE6 => (ZeroPage, 5, false), 0xF6 => (ZeroPageX, 6, false), 0xEE => (Absolute, 6, false),
        0xFE => (AbsoluteX, 7, false), 0xE8 => (Implied, 2, false), 0xC8 => (Implied, 2, false),
        0xC6 => (ZeroPage, 5, false), 0xD6 => (ZeroPageX, 6, false), 0xCE => (Absolute, 6, false),
        0xDE => (AbsoluteX, 7, false), 0xCA => (Implied, 2, false), 0x88 => (Implied, 2, false),
        // Logic
        0x29 => (Immediate, 2, false), 0x25 => (ZeroPage, 3, false), 0x35 => (ZeroPageX, 4, false),
        0x2D => (Absolute, 4, false), 0x3D => (AbsoluteX, 4, true), 0x39 => (AbsoluteY, 4, true),
        0x21 => (IndexedIndirect, 6, false), 0x31 => (IndirectIndexed, 5, true),
        0x09 => (Immediate, 2, false), 0x05 => (ZeroPage, 3, false), 0x15 => (ZeroPageX, 4, false),
        0x0D => (Absolute, 4, false), 0x1D => (AbsoluteX, 4, true), 0x19 => (AbsoluteY, 4, true),
        0x01 => (IndexedIndirect, 6, false), 0x11 => (IndirectIndexed, 5, true),
        0x49 => (Immediate, 2, false), 0x45 => (ZeroPage, 3, false), 0x55 => (ZeroPageX, 4, false),
        0x4D => (Absolute, 4, false), 0x5D => (AbsoluteX, 4, true), 0x59 => (AbsoluteY, 4, true),
        0x41 => (IndexedIndirect, 6, false), 0x51 => (IndirectIndexed, 5, true),
        0x24 => (ZeroPage, 3, false), 0x2C => (Absolute, 4, false),
        // Shifts/rotates
        0x0A => (Accumulator, 2, false), 0x06 => (ZeroPage, 5, false), 0x16 => (ZeroPageX, 6, false),
        0x0E => (Absolute, 6, false), 0x1E => (AbsoluteX, 7, false),
        0x4A => (Accumulator, 2, false), 0x46 => (ZeroPage, 5, false), 0x56 => (ZeroPageX, 6, false),
        0x4E => (Absolute, 6, false), 0x5E => (AbsoluteX, 7, false),
        0x2A => (Accumulator, 2, false), 0x26 => (ZeroPage, 5, false), 0x36 => (ZeroPageX, 6, false),
        0x2E => (Absolute, 6, false), 0x3E => (AbsoluteX, 7, false),
        0x6A => (Accumulator, 2, false), 0x66 => (ZeroPage, 5, false), 0x76 => (ZeroPageX, 6, false),
        0x6E => (Absolute, 6, false), 0x7E => (AbsoluteX, 7, false),
        // Compare
        0xC9 => (Immediate, 2, false), 0xC5 => (ZeroPage, 3, false), 0xD5 => (ZeroPageX, 4, false),
        0xCD => (Absolute, 4, false), 0xDD => (AbsoluteX, 4, true), 0xD9 => (AbsoluteY, 4, true),
        0xC1 => (IndexedIndirect, 6, false), 0xD1 => (IndirectIndexed, 5, true),
        0xE0 => (Immediate, 2, false), 0xE4 => (ZeroPage, 3, false), 0xEC => (Absolute, 4, false),
        0xC0 => (Immediate, 2, false), 0xC4 => (ZeroPage, 3, false), 0xCC => (Absolute, 4, false),
        // Branches
        0x90 => (Relative, 2, false), 0xB0 => (Relative, 2, false), 0xF0 => (Relative, 2, false),
        0x30 => (Relative, 2, false), 0xD0 => (Relative, 2, false), 0x10 => (Relative, 2, false),
        0x50 => (Relative, 2, false), 0x70 => (Relative, 2, false),
        // Jumps / subroutine / BRK/RTI/RTS
        0x4C => (Absolute, 3, false), 0x6C => (Indirect, 5, false),
        0x20 => (Absolute, 6, false), 0x00 => (Implied, 7, false),
        0x40 => (Implied, 6, false), 0x60 => (Implied, 6, false),
        // Flags
        0x18 => (Implied, 2, false), 0x38 => (Implied, 2, false), 0x58 => (Implied, 2, false),
        0x78 => (Implied, 2, false), 0xB8 => (Implied, 2, false), 0xD8 => (Implied, 2, false),
        0xF8 => (Implied, 2, false),
        // NOP
        0xEA => (Implied, 2, false),
        // Stable illegal opcodes: SLO, RLA, SRE, RRA, SAX, LAX, DCP, ISC
        0x07 => (ZeroPage, 5, false), 0x17 => (ZeroPageX, 6, false), 0x0F => (Absolute, 6, false),
        0x1F => (AbsoluteX, 7, false), 0x1B => (AbsoluteY, 7, false), 0x03 => (IndexedIndirect, 8, false),
        0x13 => (IndirectIndexed, 8, false),
        0x27 => (ZeroPage, 5, false), 0x37 => (ZeroPageX, 6, false), 0x2F => (Absolute, 6, false),
        0x3F => (AbsoluteX, 7, false), 0x3B => (AbsoluteY, 7, false), 0x23 => (IndexedIndirect, 8, false),
        0x33 => (IndirectIndexed, 8, false),
        0x47 => (ZeroPage, 5, false), 0x57 => (ZeroPageX, 6, false), 0x4F => (Absolute, 6, false),
        0x5F => (AbsoluteX, 7, false), 0x5B => (AbsoluteY, 7, false), 0x43 => (IndexedIndirect, 8, false),
        0x53 => (IndirectIndexed, 8, false),
        0x67 => (ZeroPage, 5, false), 0x77 => (ZeroPageX, 6, false), 0x6F => (Absolute, 6, false),
        0x7F => (AbsoluteX, 7, false), 0x7B => (AbsoluteY, 7, false), 0x63 => (IndexedIndirect, 8, false),
        0x73 => (IndirectIndexed, 8, false),
        0x87 => (ZeroPage, 3, false), 0x97 => (ZeroPageY, 4, false), 0x8F => (Absolute, 4, false),
        0x83 => (IndexedIndirect, 6, false),
        0xA7 => (ZeroPage, 3, false), 0xB7 => (ZeroPageY, 4, false), 0xAF => (Absolute, 4, false),
        0xBF => (AbsoluteY, 4, true), 0xA3 => (IndexedIndirect, 6, false), 0xB3 => (IndirectIndexed, 5, true),
        0xC7 => (ZeroPage, 5, false), 0xD7 => (ZeroPageX, 6, false), 0xCF => (Absolute, 6, false),
        0xDF => (AbsoluteX, 7, false), 0xDB => (AbsoluteY, 7, false), 0xC3 => (IndexedIndirect, 8, false),
        0xD3 => (IndirectIndexed, 8, false),
        0xE7 => (ZeroPage, 5, false), 0xF7 => (ZeroPageX, 6, false), 0xEF => (Absolute, 6, false),
        0xFF => (AbsoluteX, 7, false), 0xFB => (AbsoluteY, 7, false), 0xE3 => (IndexedIndirect, 8, false),
        0xF3 => (IndirectIndexed, 8, false),
    }

    table
}
