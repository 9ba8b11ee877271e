//! Versioned save-state format.
//!
//! Covers the VIC-II, both 6502 cores, both CIAs, colour RAM, main RAM, and
//! the drive's RAM — the state a restored machine needs to keep running
//! exactly where it left off. The audio chip and cartridge state are never
//! part of this: [`crate::sid::Sid`] is a register-write stub with no
//! meaningful state to restore, and cartridge banking isn't modelled here
//! at all.

use serde::{Deserialize, Serialize};

use crate::drive1541::Drive1541;
use crate::error::SnapshotError;
use crate::memory::MemorySnapshot;
use crate::C64;

const MAGIC: u32 = 0x4336_3453; // ASCII "C64S"

#[derive(Serialize, Deserialize)]
struct SnapshotData {
    main_cpu: mos_6502::CpuSnapshot,
    vic: mos_vic_ii::VicSnapshot,
    cia1: mos_cia_6526::CiaSnapshot,
    cia2: mos_cia_6526::CiaSnapshot,
    memory: MemorySnapshot,
    drive: Option<crate::drive1541::DriveSnapshot>,
}

/// Serialize the machine's current state into a versioned byte buffer.
#[must_use]
pub fn save(c64: &C64) -> Vec<u8> {
    let data = SnapshotData {
        main_cpu: c64.cpu.snapshot(),
        vic: c64.bus.vic.snapshot(),
        cia1: c64.bus.cia1.snapshot(),
        cia2: c64.bus.cia2.snapshot(),
        memory: c64.bus.memory.snapshot(),
        drive: c64.drive.as_ref().map(Drive1541::snapshot),
    };

    let body = bincode::serialize(&data).expect("snapshot data is always serializable");
    let mut out = Vec::with_capacity(body.len() + 5);
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.push(mos_vic_ii::VIC_SNAPSHOT_VERSION);
    out.extend_from_slice(&body);
    out
}

/// Restore the machine's state from a buffer produced by [`save`].
///
/// # Errors
///
/// Returns [`SnapshotError::BadMagic`] if the buffer isn't a snapshot,
/// [`SnapshotError::UnsupportedVersion`] if it was written by an
/// incompatible version of this format, [`SnapshotError::Truncated`] if
/// the header is incomplete, or [`SnapshotError::Decode`] if the body
/// doesn't decode.
pub fn load(c64: &mut C64, bytes: &[u8]) -> Result<(), SnapshotError> {
    parse_and_apply(c64, bytes).inspect_err(|err| log::error!("snapshot restore failed: {err}"))
}

fn parse_and_apply(c64: &mut C64, bytes: &[u8]) -> Result<(), SnapshotError> {
    if bytes.len() < 5 {
        return Err(SnapshotError::Truncated);
    }
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = bytes[4];
    if version != mos_vic_ii::VIC_SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: version,
            expected: mos_vic_ii::VIC_SNAPSHOT_VERSION,
        });
    }

    let data: SnapshotData = bincode::deserialize(&bytes[5..])?;

    c64.cpu.restore(&data.main_cpu);
    c64.bus
        .vic
        .restore(&data.vic)
        .map_err(|found| SnapshotError::UnsupportedVersion {
            found,
            expected: mos_vic_ii::VIC_SNAPSHOT_VERSION,
        })?;
    c64.bus.cia1.restore(&data.cia1);
    c64.bus.cia2.restore(&data.cia2);
    c64.bus.memory.restore(&data.memory);
    if let (Some(drive), Some(snap)) = (c64.drive.as_mut(), &data.drive) {
        drive.restore(snap);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{C64Config, C64Model};

    fn make_c64() -> C64 {
        let mut kernal = vec![0xEA; 8192];
        kernal[0x1FFC] = 0x00;
        kernal[0x1FFD] = 0xE0;
        C64::new(&C64Config {
            model: C64Model::C64Pal,
            kernal_rom: kernal,
            basic_rom: vec![0; 8192],
            char_rom: vec![0; 4096],
            drive: None,
        })
    }

    #[test]
    fn round_trips_cpu_state() {
        let mut c64 = make_c64();
        c64.bus_mut().memory.ram_write(0x1000, 0x77);
        let bytes = save(&c64);

        let mut restored = make_c64();
        load(&mut restored, &bytes).expect("valid snapshot");
        assert_eq!(restored.bus().memory.peek(0x1000), 0x77);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut c64 = make_c64();
        let err = load(&mut c64, &[0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, SnapshotError::BadMagic));
    }

    #[test]
    fn rejects_short_buffer() {
        let mut c64 = make_c64();
        let err = load(&mut c64, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated));
    }

    #[test]
    fn rejects_future_version() {
        let mut c64 = make_c64();
        let mut bytes = save(&c64);
        bytes[4] = mos_vic_ii::VIC_SNAPSHOT_VERSION + 1;
        let err = load(&mut c64, &bytes).unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedVersion { .. }));
    }
}
