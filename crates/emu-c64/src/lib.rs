//! Cycle-accurate Commodore 64 emulator core: VIC-II video, dual 6502-class
//! CPUs (main + 1541 drive), and the IEC serial bus joining them.
//!
//! The main machine runs at CPU cycle rate (985,248 Hz PAL). One frame is
//! 312 raster lines, scheduled through [`C64::run_frame`] — see
//! [`mod@c64`] for the per-line scheduling model.

mod big_array_serde;
mod bus;
mod c64;
mod config;
mod drive1541;
mod drive1541_bus;
mod error;
mod iec;
pub mod input;
mod keyboard;
mod memory;
pub mod palette;
mod sid;
mod snapshot;

pub use bus::C64Bus;
pub use c64::C64;
pub use config::{C64Config, C64Model, Drive1541Config};
pub use drive1541::Drive1541;
pub use error::{CpuNotification, EmuError, SnapshotError};
pub use input::{C64Key, InputQueue, JoystickState};
pub use keyboard::KeyboardMatrix;
pub use memory::C64Memory;
pub use mos_vic_ii::Vic;
pub use snapshot::{load as load_snapshot, save as save_snapshot};
