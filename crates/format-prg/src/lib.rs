//! PRG file parsing.
//!
//! A PRG file is the simplest C64 binary format: a 2-byte little-endian load
//! address followed by the data to place there. This crate only parses the
//! header and hands back the load address and payload — writing the bytes
//! into a particular memory map is the caller's job, since a PRG can target
//! either the main C64's RAM or (via a wrapped D64 program) a location the
//! drive never sees directly.

/// A parsed PRG image: where it loads and what goes there.
#[derive(Debug, Clone)]
pub struct PrgImage {
    pub load_addr: u16,
    pub data: Vec<u8>,
}

impl PrgImage {
    /// Parse a PRG file from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is too short to contain a 2-byte load
    /// address plus at least one payload byte.
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        if data.len() < 3 {
            return Err(format!(
                "PRG file too short: {} bytes (need at least 3)",
                data.len()
            ));
        }
        let load_addr = u16::from_le_bytes([data[0], data[1]]);
        Ok(Self {
            load_addr,
            data: data[2..].to_vec(),
        })
    }

    /// The address one past the last byte this image occupies.
    #[must_use]
    pub fn end_addr(&self) -> u16 {
        self.load_addr.wrapping_add(self.data.len() as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_load_address_and_payload() {
        let prg = PrgImage::from_bytes(&[0x01, 0x08, 0x0A, 0x0B]).expect("valid");
        assert_eq!(prg.load_addr, 0x0801);
        assert_eq!(prg.data, vec![0x0A, 0x0B]);
    }

    #[test]
    fn rejects_short_input() {
        assert!(PrgImage::from_bytes(&[0x01, 0x08]).is_err());
    }

    #[test]
    fn end_addr_wraps() {
        let prg = PrgImage {
            load_addr: 0xFFFE,
            data: vec![0, 0, 0],
        };
        assert_eq!(prg.end_addr(), 0x0001);
    }
}
