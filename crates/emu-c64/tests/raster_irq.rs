//! Raster IRQ end-to-end test: a tiny hand-assembled 6502 program acks the
//! VIC-II's raster interrupt and counts how many times it fired.

use emu_c64::{C64, C64Config, C64Model};

fn make_c64() -> C64 {
    let mut kernal = vec![0xEA; 8192]; // NOP sled

    // Reset routine at $e000: CLI; loop: JMP loop.
    kernal[0x0000] = 0x58; // CLI
    kernal[0x0001] = 0x4C; // JMP $e001
    kernal[0x0002] = 0x01;
    kernal[0x0003] = 0xE0;

    // IRQ handler at $e010: INC $c000; LDA #$01; STA $d019; RTI.
    kernal[0x0010] = 0xEE; // INC $c000
    kernal[0x0011] = 0x00;
    kernal[0x0012] = 0xC0;
    kernal[0x0013] = 0xA9; // LDA #$01
    kernal[0x0014] = 0x01;
    kernal[0x0015] = 0x8D; // STA $d019
    kernal[0x0016] = 0x19;
    kernal[0x0017] = 0xD0;
    kernal[0x0018] = 0x40; // RTI

    kernal[0x1FFC] = 0x00; // reset vector -> $e000
    kernal[0x1FFD] = 0xE0;
    kernal[0x1FFE] = 0x10; // IRQ/BRK vector -> $e010
    kernal[0x1FFF] = 0xE0;

    C64::new(&C64Config {
        model: C64Model::C64Pal,
        kernal_rom: kernal,
        basic_rom: vec![0; 8192],
        char_rom: vec![0; 4096],
        drive: None,
    })
}

#[test]
fn raster_100_irq_fires_exactly_once_per_frame() {
    let mut c64 = make_c64();
    c64.bus_mut().vic.write(0x12, 100); // irq_raster low byte
    c64.bus_mut().vic.write(0x1A, 0x01); // enable raster IRQ

    c64.run_frame();
    assert_eq!(c64.bus().memory.peek(0xC000), 1);

    c64.run_frame();
    assert_eq!(c64.bus().memory.peek(0xC000), 2);
}
