//! D64 disk image parsing.
//!
//! A D64 image holds 35 tracks with variable sectors per track:
//!
//! ```text
//! Tracks  1-17: 21 sectors (zone 0)
//! Tracks 18-24: 19 sectors (zone 1)
//! Tracks 25-30: 18 sectors (zone 2)
//! Tracks 31-35: 17 sectors (zone 3)
//! ```
//!
//! Total: 683 sectors x 256 bytes = 174,848 bytes. Images may also carry a
//! trailing per-sector error-info byte each, for 175,531 bytes.

const D64_SIZE: usize = 174_848;
const D64_SIZE_WITH_ERRORS: usize = 175_531;
const SECTOR_SIZE: usize = 256;

/// Sectors per track, 1-indexed (index 0 unused).
const SECTORS_PER_TRACK: [u8; 36] = [
    0, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, // 1-17
    19, 19, 19, 19, 19, 19, 19, // 18-24
    18, 18, 18, 18, 18, 18, // 25-30
    17, 17, 17, 17, 17, // 31-35
];

/// Byte offset of the first sector of each track, precomputed.
const TRACK_OFFSETS: [usize; 36] = {
    let mut offsets = [0usize; 36];
    let mut track = 1;
    let mut offset = 0;
    while track < 36 {
        offsets[track] = offset;
        offset += SECTORS_PER_TRACK[track] as usize * SECTOR_SIZE;
        track += 1;
    }
    offsets
};

/// A parsed D64 disk image.
pub struct D64Image {
    data: Vec<u8>,
}

impl D64Image {
    /// Parse a D64 image from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not a standard or error-info-sized D64.
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        if data.len() != D64_SIZE && data.len() != D64_SIZE_WITH_ERRORS {
            return Err(format!(
                "invalid D64 size: {} bytes (expected {D64_SIZE} or {D64_SIZE_WITH_ERRORS})",
                data.len()
            ));
        }
        Ok(Self {
            data: data.to_vec(),
        })
    }

    /// Number of sectors on a given track (1-35); 0 for an invalid track.
    #[must_use]
    pub fn sectors_per_track(track: u8) -> u8 {
        if (1..=35).contains(&track) {
            SECTORS_PER_TRACK[track as usize]
        } else {
            0
        }
    }

    /// Byte offset of a sector within the image, or `None` if out of range.
    #[must_use]
    pub fn sector_offset(track: u8, sector: u8) -> Option<usize> {
        if !(1..=35).contains(&track) || sector >= SECTORS_PER_TRACK[track as usize] {
            return None;
        }
        Some(TRACK_OFFSETS[track as usize] + sector as usize * SECTOR_SIZE)
    }

    #[must_use]
    pub fn read_sector(&self, track: u8, sector: u8) -> Option<&[u8]> {
        let offset = Self::sector_offset(track, sector)?;
        Some(&self.data[offset..offset + SECTOR_SIZE])
    }

    pub fn write_sector(&mut self, track: u8, sector: u8, data: &[u8]) -> bool {
        if data.len() != SECTOR_SIZE {
            return false;
        }
        let Some(offset) = Self::sector_offset(track, sector) else {
            return false;
        };
        self.data[offset..offset + SECTOR_SIZE].copy_from_slice(data);
        true
    }

    /// The disk ID from the BAM sector (track 18, sector 0, bytes $A2-$A3).
    #[must_use]
    pub fn disk_id(&self) -> [u8; 2] {
        let bam = self
            .read_sector(18, 0)
            .expect("track 18 sector 0 always exists in a valid image");
        [bam[0xA2], bam[0xA3]]
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_image() -> Vec<u8> {
        vec![0; D64_SIZE]
    }

    #[test]
    fn rejects_bad_size() {
        assert!(D64Image::from_bytes(&[0; 100]).is_err());
        assert!(D64Image::from_bytes(&[0; D64_SIZE + 1]).is_err());
    }

    #[test]
    fn accepts_standard_and_error_info_sizes() {
        assert!(D64Image::from_bytes(&make_image()).is_ok());
        assert!(D64Image::from_bytes(&vec![0; D64_SIZE_WITH_ERRORS]).is_ok());
    }

    #[test]
    fn sectors_per_track_matches_zones() {
        assert_eq!(D64Image::sectors_per_track(1), 21);
        assert_eq!(D64Image::sectors_per_track(18), 19);
        assert_eq!(D64Image::sectors_per_track(25), 18);
        assert_eq!(D64Image::sectors_per_track(31), 17);
        assert_eq!(D64Image::sectors_per_track(36), 0);
    }

    #[test]
    fn sector_offset_within_track_1() {
        assert_eq!(D64Image::sector_offset(1, 0), Some(0));
        assert_eq!(D64Image::sector_offset(1, 20), Some(20 * 256));
        assert_eq!(D64Image::sector_offset(1, 21), None);
    }

    #[test]
    fn total_offsets_consistent() {
        let last = D64Image::sector_offset(35, 16).expect("valid");
        assert_eq!(last + SECTOR_SIZE, D64_SIZE);
    }

    #[test]
    fn sector_round_trip() {
        let mut image = D64Image::from_bytes(&make_image()).expect("valid");
        let mut buf = [0u8; 256];
        buf[0] = 0xAB;
        buf[255] = 0xCD;
        assert!(image.write_sector(18, 0, &buf));
        let read = image.read_sector(18, 0).expect("valid");
        assert_eq!(read[0], 0xAB);
        assert_eq!(read[255], 0xCD);
    }

    #[test]
    fn disk_id_reads_bam() {
        let mut raw = make_image();
        let offset = D64Image::sector_offset(18, 0).expect("valid");
        raw[offset + 0xA2] = 0x41;
        raw[offset + 0xA3] = 0x42;
        let image = D64Image::from_bytes(&raw).expect("valid");
        assert_eq!(image.disk_id(), [0x41, 0x42]);
    }
}
