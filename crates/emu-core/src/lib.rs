//! Core traits and types for cycle-accurate emulation.
//!
//! Everything ticks at the master crystal frequency. All component timing
//! derives from this. No exceptions.

mod bus;
mod cpu;

pub use bus::{Bus, ReadResult, SimpleBus};
pub use cpu::Cpu;
