//! Error types surfaced across the crate boundary.
//!
//! Most day-to-day chip/bus operations here are infallible by construction
//! (a register write is just a byte write; an out-of-range address clamps
//! rather than fails) — these types exist for the handful of operations
//! that cross an actual trust boundary: a save state blob of unknown
//! provenance, or a disk image that may not be a valid D64.

use thiserror::Error;

/// Top-level error type for operations the host can fail at.
#[derive(Debug, Error)]
pub enum EmuError {
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("cannot mount disk image: {0}")]
    DiskMount(String),

    #[error("CPU halted unexpectedly: {0}")]
    CpuNotification(String),
}

/// A one-shot event surfaced to the host once per frame, drained with
/// [`crate::C64::take_notifications`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuNotification {
    /// A CPU jammed on an illegal opcode and is frozen at `pc`.
    Jammed { drive: bool, pc: u16 },
}

/// Errors restoring a save state produced by [`crate::snapshot::save`].
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("not a snapshot (bad magic)")]
    BadMagic,

    #[error("snapshot format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },

    #[error("snapshot buffer is truncated")]
    Truncated,

    #[error("snapshot decode failed: {0}")]
    Decode(#[from] Box<bincode::ErrorKind>),
}
