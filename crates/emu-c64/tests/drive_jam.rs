//! Illegal opcode jam: the drive CPU halts on an undefined opcode and stays
//! frozen at that address across subsequent lines until reset.

use emu_c64::{C64, C64Config, C64Model, Drive1541Config};
use emu_core::Cpu;

fn make_c64() -> C64 {
    let mut kernal = vec![0xEA; 8192];
    kernal[0x1FFC] = 0x00;
    kernal[0x1FFD] = 0xE0;

    let mut rom = vec![0xEA; 16384];
    rom[0x0000] = 0x02; // illegal opcode: jams the drive CPU
    rom[0x3FFC] = 0x00; // reset vector -> $c000
    rom[0x3FFD] = 0xC0;

    C64::new(&C64Config {
        model: C64Model::C64Pal,
        kernal_rom: kernal,
        basic_rom: vec![0; 8192],
        char_rom: vec![0; 4096],
        drive: Some(Drive1541Config {
            rom,
            mounted_d64: None,
        }),
    })
}

#[test]
fn illegal_opcode_freezes_the_drive_cpu_in_place() {
    let mut c64 = make_c64();

    c64.run_frame();
    let pc_after_jam = c64.drive().expect("drive attached").cpu().pc();
    assert_eq!(pc_after_jam, 0xC000);

    c64.run_frame();
    c64.run_frame();
    assert_eq!(c64.drive().expect("drive attached").cpu().pc(), pc_after_jam);
    assert!(!c64.drive().expect("drive attached").motor_on());
}
