//! Top-level C64 system: the scheduler tying the VIC-II, both 6502 cores,
//! both CIAs, and the IEC bus together.
//!
//! # Scheduling model
//!
//! Execution is single-threaded and cooperative, driven one raster line at
//! a time rather than one master-clock tick at a time:
//!
//! 1. [`mos_vic_ii::Vic::step_line`] renders the line and reports how many
//!    CPU cycles the rest of the system gets before the next one (63
//!    normally, 23 on a bad line).
//! 2. The main CPU's interrupt line is re-levelled from the VIC-II raster
//!    IRQ and CIA1's IRQ output before each of those cycles runs.
//! 3. The main CPU runs for that many cycles; CIA1 and CIA2 tick their
//!    timers alongside it, and CIA2's output bits are mirrored onto the
//!    IEC bus each cycle so the drive sees them promptly.
//! 4. The drive CPU always gets a fixed 63-cycle budget for the line,
//!    regardless of whether the main line was a bad line — the two
//!    processors are independent 1 MHz-class cores with no shared stall
//!    signal between them.
//!
//! One frame is 312 lines; [`C64::run_frame`] runs until the VIC-II
//! signals it has wrapped back to line 0.

#![allow(clippy::cast_possible_truncation)]

use emu_core::Cpu;
use mos_6502::{CpuEvent, Mos6502};

use crate::bus::C64Bus;
use crate::config::{C64Config, C64Model};
use crate::drive1541::Drive1541;
use crate::error::{CpuNotification, EmuError};
use crate::iec::{IecBus, IecParticipant};
use crate::input::{C64Key, InputQueue, JoystickState};
use crate::memory::C64Memory;

/// Fixed per-line cycle budget for the drive CPU, independent of whether
/// the main line this tick was a bad line.
const DRIVE_CYCLES_PER_LINE: u32 = mos_vic_ii::CYCLES_NORMAL_LINE;

/// C64 system: main CPU, bus (which owns VIC/SID/CIAs/memory), the IEC
/// bus, and an optional attached 1541 drive.
pub struct C64 {
    pub(crate) cpu: Mos6502,
    pub(crate) bus: C64Bus,
    pub(crate) drive: Option<Drive1541>,
    iec: IecBus,
    main_iec_id: IecParticipant,
    /// Edge-detect for CIA2's level-sensitive IRQ output, which this core
    /// wires to the CPU's edge-triggered NMI line.
    cia2_irq_prev: bool,
    main_cycles: u64,
    frame_count: u64,
    input_queue: InputQueue,
    /// One-shot CPU jam notifications accumulated since the last
    /// [`C64::take_notifications`] call.
    notifications: Vec<CpuNotification>,
}

impl C64 {
    /// Create a new C64 from the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the model is not PAL (only PAL supported in v1).
    #[must_use]
    pub fn new(config: &C64Config) -> Self {
        assert!(
            config.model == C64Model::C64Pal,
            "Only PAL model is supported in v1"
        );

        let memory = C64Memory::new(&config.kernal_rom, &config.basic_rom, &config.char_rom);
        let mut bus = C64Bus::new(memory);

        bus.cia1.write(0x02, 0xFF); // DDR A: all output (column select)
        bus.cia1.write(0x03, 0x00); // DDR B: all input (row sense)
        bus.cia1.write(0x00, 0xFF); // Port A: all columns deselected

        bus.cia2.write(0x02, 0x3F); // DDR A: VIC bank + IEC outputs
        bus.cia2.write(0x00, 0x17); // Bank 0, ATN/CLK/DATA released
        bus.update_vic_bank();

        let mut cpu = Mos6502::new();
        let reset_lo = bus.memory.cpu_read(0xFFFC);
        let reset_hi = bus.memory.cpu_read(0xFFFD);
        cpu.regs.pc = u16::from(reset_lo) | (u16::from(reset_hi) << 8);

        let mut iec = IecBus::new();
        let main_iec_id = iec.register();

        let drive = config.drive.as_ref().map(|drive_config| {
            let mut drive = Drive1541::new(drive_config.rom.clone());
            drive.attach_to_iec(&mut iec);
            if let Some(d64_bytes) = &drive_config.mounted_d64 {
                match format_d64::D64Image::from_bytes(d64_bytes) {
                    Ok(image) => drive.insert_disk(image),
                    Err(err) => log::error!("failed to mount configured disk image: {err}"),
                }
            }
            drive
        });

        Self {
            cpu,
            bus,
            drive,
            iec,
            main_iec_id,
            cia2_irq_prev: false,
            main_cycles: 0,
            frame_count: 0,
            input_queue: InputQueue::new(),
            notifications: Vec::new(),
        }
    }

    /// Mount a D64 disk image into the attached drive, replacing any disk
    /// already inserted.
    ///
    /// # Errors
    ///
    /// Returns [`EmuError::DiskMount`] if no drive is attached or the bytes
    /// don't parse as a valid D64 image.
    pub fn mount_disk(&mut self, d64_bytes: &[u8]) -> Result<(), EmuError> {
        let drive = self
            .drive
            .as_mut()
            .ok_or_else(|| EmuError::DiskMount("no drive attached".to_string()))?;
        let image = format_d64::D64Image::from_bytes(d64_bytes).map_err(EmuError::DiskMount)?;
        drive.insert_disk(image);
        Ok(())
    }

    /// Drain CPU jam notifications accumulated since the last call.
    ///
    /// Intended to be polled once per frame by the embedding application.
    pub fn take_notifications(&mut self) -> Vec<CpuNotification> {
        std::mem::take(&mut self.notifications)
    }

    /// Run one complete frame (312 raster lines).
    ///
    /// Processes any pending input queue events at the start of the frame.
    /// Returns the number of main-CPU cycles executed during the frame.
    pub fn run_frame(&mut self) -> u64 {
        self.input_queue
            .process(self.frame_count, &mut self.bus.keyboard);
        self.frame_count += 1;

        let start_cycles = self.main_cycles;
        loop {
            self.step_line();
            if self.bus.vic.take_frame_complete() {
                break;
            }
        }
        self.main_cycles - start_cycles
    }

    /// Run exactly one raster line's worth of video, CPU, and CIA work.
    fn step_line(&mut self) {
        let outcome = self.bus.step_video_line();

        for _ in 0..outcome.cpu_cycles_consumed {
            self.cpu
                .set_irq_line(self.bus.vic.irq_active() || self.bus.cia1.irq_active());

            self.cpu.tick(&mut self.bus);
            self.bus.cia1.tick();
            self.bus.cia2.tick();
            self.drive_iec_from_cia2();
            self.sense_iec_into_cia2();

            let cia2_irq = self.bus.cia2.irq_active();
            if cia2_irq && !self.cia2_irq_prev {
                self.cpu.nmi();
            }
            self.cia2_irq_prev = cia2_irq;

            self.main_cycles += 1;
        }

        if let Some(event) = self.cpu.take_event() {
            if let CpuEvent::Jammed { pc } = event {
                log::warn!("main CPU jammed at ${pc:04x}");
                self.notifications
                    .push(CpuNotification::Jammed { drive: false, pc });
            }
        }

        if let Some(drive) = &mut self.drive {
            for _ in 0..DRIVE_CYCLES_PER_LINE {
                drive.tick(&mut self.iec);
            }
            if let Some(pc) = drive.take_jam() {
                self.notifications
                    .push(CpuNotification::Jammed { drive: true, pc });
            }
        }
    }

    /// Mirror CIA2 port A's IEC output bits onto the bus: bit 3 is ATN OUT,
    /// bit 4 CLK OUT, bit 5 DATA OUT, each active-low.
    fn drive_iec_from_cia2(&mut self) {
        let pa = self.bus.cia2.port_a_output();
        self.iec.set_atn(self.main_iec_id, pa & 0x08 == 0);
        self.iec.set_clk(self.main_iec_id, pa & 0x10 == 0);
        self.iec.set_data(self.main_iec_id, pa & 0x20 == 0);
    }

    /// Mirror the IEC bus's CLK/DATA lines onto CIA2 port A's input bits:
    /// bit 6 is CLK IN, bit 7 DATA IN, each active-low.
    fn sense_iec_into_cia2(&mut self) {
        let mut ext = self.bus.cia2.external_a;
        ext = (ext & !0x40) | (u8::from(!self.iec.clk()) << 6);
        ext = (ext & !0x80) | (u8::from(!self.iec.data()) << 7);
        self.bus.cia2.external_a = ext;
    }

    /// Reference to the VIC-II's chunky (palette-index) frame buffer.
    /// Mapping to displayable colour is the host's job — see
    /// [`crate::palette::PALETTE`].
    #[must_use]
    pub fn chunky_buffer(&self) -> &[u8] {
        self.bus.vic.chunky_buffer()
    }

    #[must_use]
    pub fn chunky_width(&self) -> u32 {
        mos_vic_ii::DISPLAY_X as u32
    }

    #[must_use]
    pub fn chunky_height(&self) -> u32 {
        mos_vic_ii::DISPLAY_Y as u32
    }

    #[must_use]
    pub fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Mos6502 {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &C64Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut C64Bus {
        &mut self.bus
    }

    /// Reference to the attached 1541 drive, if one was configured.
    #[must_use]
    pub fn drive(&self) -> Option<&Drive1541> {
        self.drive.as_ref()
    }

    pub fn drive_mut(&mut self) -> Option<&mut Drive1541> {
        self.drive.as_mut()
    }

    #[must_use]
    pub fn main_cycles(&self) -> u64 {
        self.main_cycles
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn input_queue(&mut self) -> &mut InputQueue {
        &mut self.input_queue
    }

    pub fn press_key(&mut self, key: C64Key) {
        let (row, col) = key.matrix();
        self.bus.keyboard.set_key(row, col, true);
    }

    pub fn release_key(&mut self, key: C64Key) {
        let (row, col) = key.matrix();
        self.bus.keyboard.set_key(row, col, false);
    }

    pub fn release_all_keys(&mut self) {
        self.bus.keyboard.release_all();
    }

    /// Set joystick port 1's current direction/fire state.
    pub fn set_joystick1(&mut self, state: JoystickState) {
        self.bus.joystick1 = state;
    }

    /// Set joystick port 2's current direction/fire state.
    pub fn set_joystick2(&mut self, state: JoystickState) {
        self.bus.joystick2 = state;
    }

    /// Load a PRG image directly into RAM at its stored load address.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` isn't a valid PRG image.
    pub fn load_prg(&mut self, data: &[u8]) -> Result<u16, String> {
        let image = format_prg::PrgImage::from_bytes(data)?;
        for (offset, &byte) in image.data.iter().enumerate() {
            self.bus
                .memory
                .ram_write(image.load_addr.wrapping_add(offset as u16), byte);
        }
        Ok(image.load_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Drive1541Config;
    use emu_core::Bus;

    fn make_c64() -> C64 {
        let mut kernal = vec![0xEA; 8192]; // NOP sled
        kernal[0x1FFC] = 0x00;
        kernal[0x1FFD] = 0xE0; // reset vector -> $E000

        C64::new(&C64Config {
            model: C64Model::C64Pal,
            kernal_rom: kernal,
            basic_rom: vec![0; 8192],
            char_rom: vec![0; 4096],
            drive: None,
        })
    }

    #[test]
    fn reset_vector_is_loaded() {
        let mut c64 = make_c64();
        // Drain the reset sequence.
        for _ in 0..10 {
            c64.step_line();
        }
        assert_eq!(c64.cpu().pc(), 0xE000);
    }

    #[test]
    fn run_frame_advances_cycles_and_raster() {
        let mut c64 = make_c64();
        let cycles = c64.run_frame();
        assert!(cycles > 0);
        assert_eq!(c64.bus().vic.raster_line(), 0);
        assert_eq!(c64.frame_count(), 1);
    }

    #[test]
    fn chunky_buffer_has_expected_dimensions() {
        let c64 = make_c64();
        assert_eq!(
            c64.chunky_buffer().len(),
            c64.chunky_width() as usize * c64.chunky_height() as usize
        );
    }

    #[test]
    fn load_prg_places_bytes_at_load_address() {
        let mut c64 = make_c64();
        let prg = [0x01, 0x08, 0xAA, 0xBB];
        let addr = c64.load_prg(&prg).expect("valid prg");
        assert_eq!(addr, 0x0801);
        assert_eq!(c64.bus().memory.peek(0x0801), 0xAA);
        assert_eq!(c64.bus().memory.peek(0x0802), 0xBB);
    }

    #[test]
    fn press_key_reaches_cia1_port_b() {
        let mut c64 = make_c64();
        c64.bus_mut().cia1.write(0x02, 0xFF);
        c64.bus_mut().cia1.write(0x03, 0x00);
        c64.press_key(C64Key::A);
        let (row, col) = C64Key::A.matrix();
        c64.bus_mut().cia1.write(0x00, !(1 << row));
        let pb = c64.bus_mut().read(0xDC01).data;
        assert_eq!(pb & (1 << col), 0);
    }

    #[test]
    fn joystick2_fire_reaches_cia1_port_a() {
        let mut c64 = make_c64();
        c64.bus_mut().cia1.write(0x02, 0x00); // DDR A: all input (joystick read mode)
        c64.set_joystick2(JoystickState {
            fire: true,
            ..Default::default()
        });
        let pa = c64.bus_mut().read(0xDC00).data;
        assert_eq!(pa & 0x10, 0x00);
    }

    #[test]
    fn drive_runs_alongside_main_cpu_when_attached() {
        let mut rom = vec![0xEA; 16384];
        rom[0x3FFC] = 0x00;
        rom[0x3FFD] = 0xC0;

        let mut kernal = vec![0xEA; 8192];
        kernal[0x1FFC] = 0x00;
        kernal[0x1FFD] = 0xE0;

        let mut c64 = C64::new(&C64Config {
            model: C64Model::C64Pal,
            kernal_rom: kernal,
            basic_rom: vec![0; 8192],
            char_rom: vec![0; 4096],
            drive: Some(Drive1541Config {
                rom,
                mounted_d64: None,
            }),
        });

        c64.run_frame();
        assert!(c64.drive().expect("drive attached").cpu().pc() >= 0xC000);
    }

    #[test]
    fn mount_disk_without_a_drive_attached_is_an_error() {
        let mut c64 = make_c64();
        assert!(matches!(
            c64.mount_disk(&[0; 174_848]),
            Err(crate::EmuError::DiskMount(_))
        ));
    }

    #[test]
    fn main_cpu_jam_is_surfaced_as_a_notification() {
        let mut kernal = vec![0xEA; 8192];
        kernal[0x0000] = 0x02; // illegal opcode: jams the main CPU
        kernal[0x1FFC] = 0x00;
        kernal[0x1FFD] = 0xE0;

        let mut c64 = C64::new(&C64Config {
            model: C64Model::C64Pal,
            kernal_rom: kernal,
            basic_rom: vec![0; 8192],
            char_rom: vec![0; 4096],
            drive: None,
        });

        c64.run_frame();
        let notifications = c64.take_notifications();
        assert_eq!(
            notifications,
            vec![CpuNotification::Jammed {
                drive: false,
                pc: 0xE000
            }]
        );
        assert!(c64.take_notifications().is_empty());
    }
}
