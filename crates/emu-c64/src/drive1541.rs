//! 1541 floppy disk drive emulation.
//!
//! The 1541 contains its own 6502-class CPU running at ~1 MHz, 2KB RAM,
//! 16KB ROM, and two MOS 6522 VIAs:
//!
//!   VIA1 ($1800): IEC serial bus interface
//!     Port B: bit 0 = DATA IN, bit 1 = DATA OUT, bit 2 = CLK IN,
//!             bit 3 = CLK OUT, bit 4 = ATN ACK (auto-pulls DATA low),
//!             bit 7 = ATN IN (active-low: 0 = ATN asserted)
//!     CA1:    ATN edge detect (directly wired to ATN line)
//!
//!   VIA2 ($1C00): Disk controller
//!     Port A: GCR data byte (directly connected to read/write head)
//!     Port B: bit 0-1 = stepper motor phase
//!             bit 2 = motor on
//!             bit 3 = LED
//!             bit 4 = write protect sense
//!             bit 5-6 = density select (speed zone)
//!             bit 7 = SYNC detect (active-low: 0 = in sync)
//!     CB1:    byte-ready signal (triggers IRQ)
//!     CB2:    read/write mode (active-low: 0 = write mode)
//!
//! The drive's CPU also recognises a private `$f2` extension opcode once
//! the program counter has entered ROM (`pc >= $c000`): it lets the
//! scheduler short-circuit whole DOS routines (sector write, track format)
//! into a direct call against the GCR subsystem instead of executing
//! thousands of real drive-ROM cycles.

#![allow(clippy::cast_possible_truncation)]

use emu_core::Cpu;
use format_d64::D64Image;
use mos_6502::{CpuEvent, Mos6502};

use crate::drive1541_bus::Drive1541Bus;
use crate::iec::{IecBus, IecParticipant};

/// Selector byte values for the `$f2` extension opcode. `0` (idle-in-DOS-
/// loop) needs no handling — the CPU already resumed past the selector
/// byte by the time `take_event` reports it.
const EXTENSION_WRITE_SECTOR: u8 = 0x01;
const EXTENSION_FORMAT_TRACK: u8 = 0x02;

/// 1541 floppy disk drive.
pub struct Drive1541 {
    cpu: Mos6502,
    bus: Drive1541Bus,
    d64: Option<D64Image>,
    current_track: u8,
    half_track: u8,
    motor_on: bool,
    led_on: bool,
    gcr_track: Vec<u8>,
    gcr_position: usize,
    byte_counter: u32,
    prev_stepper_phase: u8,
    prev_atn: bool,
    prev_byte_ready: bool,
    write_mode: bool,
    write_buffer: Vec<u8>,
    iec_id: Option<IecParticipant>,
    pending_jam: Option<u16>,
}

impl Drive1541 {
    /// Create a new 1541 drive with the given ROM (must be 16,384 bytes).
    #[must_use]
    pub fn new(rom: Vec<u8>) -> Self {
        let bus = Drive1541Bus::new(rom);
        let mut cpu = Mos6502::new();
        cpu.is_drive = true;

        let lo = bus.rom()[0x3FFC];
        let hi = bus.rom()[0x3FFD];
        cpu.regs.pc = u16::from(lo) | (u16::from(hi) << 8);

        Self {
            cpu,
            bus,
            d64: None,
            current_track: 18,
            half_track: 34,
            motor_on: false,
            led_on: false,
            gcr_track: Vec::new(),
            gcr_position: 0,
            byte_counter: 0,
            prev_stepper_phase: 0,
            prev_atn: true,
            prev_byte_ready: false,
            write_mode: false,
            write_buffer: Vec::new(),
            iec_id: None,
            pending_jam: None,
        }
    }

    /// Takes the drive's jam notification, if it has jammed since the last
    /// call.
    pub fn take_jam(&mut self) -> Option<u16> {
        self.pending_jam.take()
    }

    /// Register this drive as a participant on an IEC bus. Must be called
    /// once before `tick`.
    pub fn attach_to_iec(&mut self, iec: &mut IecBus) {
        self.iec_id = Some(iec.register());
    }

    pub fn insert_disk(&mut self, d64: D64Image) {
        log::info!("disk mounted, id {:02x?}", d64.disk_id());
        self.d64 = Some(d64);
        self.encode_current_track();
    }

    pub fn eject_disk(&mut self) {
        log::info!("disk ejected");
        self.d64 = None;
        self.gcr_track.clear();
        self.gcr_position = 0;
    }

    #[must_use]
    pub fn has_disk(&self) -> bool {
        self.d64.is_some()
    }

    #[must_use]
    pub fn track(&self) -> u8 {
        self.current_track
    }

    #[must_use]
    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    #[must_use]
    pub fn led_on(&self) -> bool {
        self.led_on
    }

    #[must_use]
    pub fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    #[must_use]
    pub fn ram(&self) -> &[u8; 2048] {
        self.bus.ram()
    }

    /// Capture CPU registers and the 2K RAM image for a save state. VIA1
    /// and VIA2 state is not part of the snapshot, matching the covered
    /// component list the rest of this core saves.
    #[must_use]
    pub fn snapshot(&self) -> DriveSnapshot {
        DriveSnapshot {
            cpu: self.cpu.snapshot(),
            ram: *self.bus.ram(),
        }
    }

    /// Restore state captured by [`Drive1541::snapshot`]. Disk contents and
    /// GCR track buffers are untouched — re-insert the disk after restoring
    /// if the snapshot was taken with a different one mounted.
    pub fn restore(&mut self, snap: &DriveSnapshot) {
        self.cpu.restore(&snap.cpu);
        self.bus.restore_ram(&snap.ram);
    }

    /// Tick the drive for one CPU cycle. Must be called once per main CPU
    /// cycle, since both CPUs run at approximately the same rate.
    pub fn tick(&mut self, iec: &mut IecBus) {
        let id = self.iec_id.expect("attach_to_iec called before tick");

        self.update_via1_from_iec(iec);

        let atn_level = !iec.atn();
        if atn_level != self.prev_atn {
            self.bus.via1.set_ca1(atn_level);
            self.prev_atn = atn_level;
        }

        self.cpu.tick(&mut self.bus);
        if let Some(event) = self.cpu.take_event() {
            self.handle_cpu_event(event);
        }

        self.bus.via1.tick();
        self.bus.via2.tick();

        self.update_iec_from_via1(iec, id);
        self.update_mechanics();
        self.advance_disk();

        if self.bus.via1.irq_active() || self.bus.via2.irq_active() {
            self.cpu.interrupt();
        }
    }

    /// Handle a one-shot CPU notification: ROM jam (left alone — the PC
    /// stays put for inspection) or a fast-path extension call.
    fn handle_cpu_event(&mut self, event: CpuEvent) {
        match event {
            CpuEvent::Jammed { pc } => {
                log::warn!("drive CPU jammed at ${pc:04x}");
                self.pending_jam = Some(pc);
            }
            CpuEvent::ExtensionCall(selector) => match selector {
                EXTENSION_WRITE_SECTOR => self.fast_write_current_sector(),
                EXTENSION_FORMAT_TRACK => self.fast_format_current_track(),
                _ => {} // EXTENSION_IDLE: nothing to do but resume
            },
        }
    }

    /// Fast-path equivalent of the drive ROM's sector-write loop: decode
    /// whatever GCR data is already staged in the write buffer and commit
    /// it straight to the mounted image, skipping the bit-banged transfer.
    fn fast_write_current_sector(&mut self) {
        self.flush_write_buffer();
    }

    /// Fast-path equivalent of the drive ROM's track-format loop: lay down
    /// a freshly GCR-encoded, all-zero track without bit-banging each byte.
    fn fast_format_current_track(&mut self) {
        if let Some(d64) = &mut self.d64 {
            let blank = [0u8; 256];
            for sector in 0..D64Image::sectors_per_track(self.current_track) {
                let _ = d64.write_sector(self.current_track, sector, &blank);
            }
        }
        self.encode_current_track();
    }

    fn update_via1_from_iec(&mut self, iec: &IecBus) {
        let mut ext = self.bus.via1.external_b;
        ext = (ext & !0x01) | u8::from(!iec.data());
        ext = (ext & !0x04) | (u8::from(!iec.clk()) << 2);
        ext = (ext & !0x80) | (u8::from(iec.atn()) << 7);
        self.bus.via1.external_b = ext;
    }

    fn update_iec_from_via1(&mut self, iec: &mut IecBus, id: IecParticipant) {
        let pb = self.bus.via1.port_b_output();
        let atn_ack = pb & 0x10 != 0;
        iec.set_data(id, (pb & 0x02 != 0) || atn_ack);
        iec.set_clk(id, pb & 0x08 != 0);
    }

    fn update_mechanics(&mut self) {
        let pb = self.bus.via2.port_b_output();
        let was_running = self.motor_on;
        self.motor_on = pb & 0x04 != 0;
        self.led_on = pb & 0x08 != 0;
        if self.motor_on != was_running {
            log::info!(
                "drive motor {} on track {}",
                if self.motor_on { "spinning up" } else { "idle" },
                self.current_track
            );
        }

        let phase = pb & 0x03;
        if phase != self.prev_stepper_phase {
            self.step_head(phase);
            self.prev_stepper_phase = phase;
        }

        let wp = if self.d64.is_some() { 0x10 } else { 0x00 };
        self.bus.via2.external_b = (self.bus.via2.external_b & !0x10) | wp;

        let crb = self.bus.via2.read(0x0F);
        let cb2_low = (crb & 0xE0) == 0xC0;
        let was_writing = self.write_mode;
        self.write_mode = cb2_low;

        if was_writing && !self.write_mode {
            self.flush_write_buffer();
        }
    }

    fn advance_disk(&mut self) {
        if !self.motor_on || self.gcr_track.is_empty() {
            return;
        }

        self.byte_counter += 1;
        let cpb = format_gcr::cycles_per_byte(self.current_track);

        if self.byte_counter >= cpb {
            self.byte_counter = 0;

            if self.write_mode {
                let byte = self.bus.via2.port_a_output();
                if self.gcr_position < self.gcr_track.len() {
                    self.gcr_track[self.gcr_position] = byte;
                }
                self.write_buffer.push(byte);
            } else {
                let byte = self.gcr_track[self.gcr_position];
                self.bus.via2.external_a = byte;
                let in_sync = byte == 0xFF;
                self.bus.via2.external_b =
                    (self.bus.via2.external_b & !0x80) | if in_sync { 0x00 } else { 0x80 };
            }

            self.gcr_position += 1;
            if self.gcr_position >= self.gcr_track.len() {
                self.gcr_position = 0;
            }

            if !self.prev_byte_ready {
                self.bus.via2.set_cb1(true);
            }
            self.prev_byte_ready = true;
        } else if self.prev_byte_ready {
            self.bus.via2.set_cb1(false);
            self.prev_byte_ready = false;
        }
    }

    fn flush_write_buffer(&mut self) {
        if self.write_buffer.is_empty() || self.d64.is_none() {
            self.write_buffer.clear();
            return;
        }

        let mut writes: Vec<(u8, Vec<u8>)> = Vec::new();
        let sector_num = self.find_sector_at_track_position();

        let buf = &self.write_buffer;
        let mut i = 0;
        while i + 5 + 325 <= buf.len() {
            if buf[i..i + 5].iter().all(|&b| b == 0xFF) {
                let gcr_start = i + 5;
                if gcr_start + 325 <= buf.len() {
                    if let Some(sector_data) = format_gcr::decode_data_block(&buf[gcr_start..gcr_start + 325]) {
                        if let Some(sector) = sector_num {
                            writes.push((sector, sector_data));
                        }
                    }
                }
                i = gcr_start + 325;
            } else {
                i += 1;
            }
        }
        self.write_buffer.clear();

        let track = self.current_track;
        if let Some(d64) = &mut self.d64 {
            for (sector, data) in &writes {
                let _ = d64.write_sector(track, *sector, data);
            }
        }

        self.encode_current_track();
    }

    fn find_sector_at_track_position(&self) -> Option<u8> {
        if self.gcr_track.is_empty() {
            return None;
        }
        let len = self.gcr_track.len();
        let start = if self.gcr_position == 0 { len - 1 } else { self.gcr_position - 1 };

        for offset in 0..len {
            let pos = (start + len - offset) % len;
            let mut sync_count = 0;
            for j in 0..5 {
                if self.gcr_track[(pos + len - j) % len] == 0xFF {
                    sync_count += 1;
                } else {
                    break;
                }
            }
            if sync_count >= 5 {
                let hdr_start = (pos + 1) % len;
                if hdr_start + 10 <= len {
                    let mut group = [0u8; 5];
                    group.copy_from_slice(&self.gcr_track[hdr_start..hdr_start + 5]);
                    if let Some(decoded) = format_gcr::decode_gcr_group(&group) {
                        if decoded[0] == 0x08 {
                            return Some(decoded[2]);
                        }
                    }
                }
            }
        }
        None
    }

    #[must_use]
    pub fn d64(&self) -> Option<&D64Image> {
        self.d64.as_ref()
    }

    fn step_head(&mut self, new_phase: u8) {
        let delta = (i16::from(new_phase) - i16::from(self.prev_stepper_phase) + 4) % 4;
        match delta {
            1 => {
                if self.half_track < 69 {
                    self.half_track += 1;
                }
            }
            3 => {
                if self.half_track > 0 {
                    self.half_track -= 1;
                }
            }
            _ => {}
        }

        let new_track = (self.half_track / 2) + 1;
        if new_track != self.current_track {
            self.current_track = new_track;
            self.encode_current_track();
        }
    }

    fn encode_current_track(&mut self) {
        let on_half_track = self.half_track & 1 != 0;

        if on_half_track || !(1..=35).contains(&self.current_track) {
            self.gcr_track = vec![0x00; 7692];
            self.gcr_position = 0;
            return;
        }

        if let Some(d64) = &self.d64 {
            self.gcr_track = format_gcr::encode_track(d64, self.current_track);
            if self.gcr_position >= self.gcr_track.len() {
                self.gcr_position = 0;
            }
        } else {
            self.gcr_track.clear();
            self.gcr_position = 0;
        }
    }
}

/// Serializable snapshot of a [`Drive1541`], for save states.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct DriveSnapshot {
    cpu: mos_6502::CpuSnapshot,
    #[serde(with = "crate::big_array_serde")]
    ram: [u8; 2048],
}
