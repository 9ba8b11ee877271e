//! GCR (Group Code Recording) encoding for 1541 disk sectors.
//!
//! The 1541 stores data on disk using GCR encoding: every 4 bits map to a
//! unique 5-bit pattern that guarantees no more than two consecutive zero
//! bits, which is what the drive's analog read circuitry needs to stay
//! synchronised to the bit stream. This crate only deals in encoded bytes —
//! nothing here understands drive head positioning or bus timing, by design
//! (see the GCR-fidelity non-goal this core is scoped to).
//!
//! Each sector on disk is laid out as:
//!
//! ```text
//! sync (5x $ff) | header (10 GCR bytes) | gap (9x $55)
//!   | sync (5x $ff) | data (325 GCR bytes) | gap (9x $55)
//! ```
//!
//! Zone-dependent byte rate (at the drive's ~1 MHz CPU clock):
//!
//! ```text
//! Zone 0 (tracks  1-17): 208 cycles/byte
//! Zone 1 (tracks 18-24): 224 cycles/byte
//! Zone 2 (tracks 25-30): 240 cycles/byte
//! Zone 3 (tracks 31-35): 256 cycles/byte
//! ```

#![allow(clippy::cast_possible_truncation)]

use format_d64::D64Image;

const GCR_ENCODE: [u8; 16] = [
    0x0A, 0x0B, 0x12, 0x13, 0x0E, 0x0F, 0x16, 0x17, 0x09, 0x19, 0x1A, 0x1B, 0x0D, 0x1D, 0x1E, 0x15,
];

const GCR_DECODE: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // 00-07
    0xFF, 0x08, 0x00, 0x01, 0xFF, 0x0C, 0x04, 0x05, // 08-0F
    0xFF, 0xFF, 0x02, 0x03, 0xFF, 0x0F, 0x06, 0x07, // 10-17
    0xFF, 0x09, 0x0A, 0x0B, 0xFF, 0x0D, 0x0E, 0xFF, // 18-1F
];

/// Speed zone (0-3) for a track number, which determines the bit rate.
#[must_use]
pub fn speed_zone(track: u8) -> u8 {
    match track {
        1..=17 => 0,
        18..=24 => 1,
        25..=30 => 2,
        31..=35 => 3,
        _ => 0,
    }
}

/// Drive CPU cycles to read/write one GCR byte on a given track.
#[must_use]
pub fn cycles_per_byte(track: u8) -> u32 {
    match speed_zone(track) {
        0 => 208,
        1 => 224,
        2 => 240,
        _ => 256,
    }
}

/// Decode 5 GCR bytes (8 GCR nibbles) into 4 raw bytes. `None` on any
/// invalid GCR code.
#[must_use]
pub fn decode_gcr_group(input: &[u8; 5]) -> Option<[u8; 4]> {
    let g0 = (input[0] >> 3) & 0x1F;
    let g1 = ((input[0] << 2) | (input[1] >> 6)) & 0x1F;
    let g2 = (input[1] >> 1) & 0x1F;
    let g3 = ((input[1] << 4) | (input[2] >> 4)) & 0x1F;
    let g4 = ((input[2] << 1) | (input[3] >> 7)) & 0x1F;
    let g5 = (input[3] >> 2) & 0x1F;
    let g6 = ((input[3] << 3) | (input[4] >> 5)) & 0x1F;
    let g7 = input[4] & 0x1F;

    let d = [g0, g1, g2, g3, g4, g5, g6, g7].map(|nibble| GCR_DECODE[nibble as usize]);
    if d.iter().any(|&b| b == 0xFF) {
        return None;
    }
    Some([
        (d[0] << 4) | d[1],
        (d[2] << 4) | d[3],
        (d[4] << 4) | d[5],
        (d[6] << 4) | d[7],
    ])
}

/// Decode a 325-byte GCR data block into its 256 payload bytes, verifying
/// the XOR checksum. `None` on decode error or checksum mismatch.
#[must_use]
pub fn decode_data_block(gcr: &[u8]) -> Option<Vec<u8>> {
    if gcr.len() < 325 {
        return None;
    }
    let mut raw = Vec::with_capacity(260);
    for chunk in gcr[..325].chunks_exact(5) {
        let group = decode_gcr_group(&[chunk[0], chunk[1], chunk[2], chunk[3], chunk[4]])?;
        raw.extend_from_slice(&group);
    }
    if raw.len() < 260 {
        return None;
    }
    let data = &raw[1..257];
    let expected = raw[257];
    let checksum = data.iter().fold(0u8, |acc, &b| acc ^ b);
    (checksum == expected).then(|| data.to_vec())
}

fn encode_gcr_group(input: &[u8; 4]) -> [u8; 5] {
    let n: [u8; 8] = [
        GCR_ENCODE[(input[0] >> 4) as usize],
        GCR_ENCODE[(input[0] & 0x0F) as usize],
        GCR_ENCODE[(input[1] >> 4) as usize],
        GCR_ENCODE[(input[1] & 0x0F) as usize],
        GCR_ENCODE[(input[2] >> 4) as usize],
        GCR_ENCODE[(input[2] & 0x0F) as usize],
        GCR_ENCODE[(input[3] >> 4) as usize],
        GCR_ENCODE[(input[3] & 0x0F) as usize],
    ];
    [
        (n[0] << 3) | (n[1] >> 2),
        (n[1] << 6) | (n[2] << 1) | (n[3] >> 4),
        (n[3] << 4) | (n[4] >> 1),
        (n[4] << 7) | (n[5] << 2) | (n[6] >> 3),
        (n[6] << 5) | n[7],
    ]
}

fn encode_header(track: u8, sector: u8, disk_id: [u8; 2]) -> [u8; 10] {
    let checksum = sector ^ track ^ disk_id[0] ^ disk_id[1];
    let raw: [u8; 8] = [
        0x08, checksum, sector, track, disk_id[1], disk_id[0], 0x0F, 0x0F,
    ];
    let g0 = encode_gcr_group(&[raw[0], raw[1], raw[2], raw[3]]);
    let g1 = encode_gcr_group(&[raw[4], raw[5], raw[6], raw[7]]);
    [
        g0[0], g0[1], g0[2], g0[3], g0[4], g1[0], g1[1], g1[2], g1[3], g1[4],
    ]
}

fn encode_data_block(sector_data: &[u8]) -> Vec<u8> {
    assert!(sector_data.len() == 256, "sector must be 256 bytes");
    let checksum = sector_data.iter().fold(0u8, |acc, &b| acc ^ b);

    let mut raw = Vec::with_capacity(260);
    raw.push(0x07);
    raw.extend_from_slice(sector_data);
    raw.push(checksum);
    raw.push(0x00);
    raw.push(0x00);

    let mut gcr = Vec::with_capacity(325);
    for chunk in raw.chunks_exact(4) {
        gcr.extend_from_slice(&encode_gcr_group(&[chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    gcr
}

fn encode_sector(track: u8, sector: u8, data: &[u8], disk_id: [u8; 2]) -> Vec<u8> {
    let mut out = Vec::with_capacity(380);
    out.extend_from_slice(&[0xFF; 5]);
    out.extend_from_slice(&encode_header(track, sector, disk_id));
    out.extend_from_slice(&[0x55; 9]);
    out.extend_from_slice(&[0xFF; 5]);
    out.extend_from_slice(&encode_data_block(data));
    out.extend_from_slice(&[0x55; 9]);
    out
}

/// Encode a whole track from a D64 image into the byte stream the drive
/// head reads as it spins past, looping forever in real use.
#[must_use]
pub fn encode_track(image: &D64Image, track: u8) -> Vec<u8> {
    let num_sectors = D64Image::sectors_per_track(track);
    let disk_id = image.disk_id();
    let mut gcr_track = Vec::with_capacity(num_sectors as usize * 380);
    for sector in 0..num_sectors {
        let data = image
            .read_sector(track, sector)
            .expect("valid track/sector within the image");
        gcr_track.extend_from_slice(&encode_sector(track, sector, data, disk_id));
    }
    gcr_track
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcr_group_encode_known_values() {
        let result = encode_gcr_group(&[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(result, [0x52, 0x94, 0xA5, 0x29, 0x4A]);
    }

    #[test]
    fn gcr_group_roundtrip_all_ff() {
        let result = encode_gcr_group(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(result, [0xAD, 0x6B, 0x5A, 0xD6, 0xB5]);
    }

    #[test]
    fn decode_is_inverse_of_encode() {
        let input = [0x12, 0x34, 0x56, 0x78];
        let encoded = encode_gcr_group(&input);
        let decoded = decode_gcr_group(&encoded).expect("valid codes");
        assert_eq!(decoded, input);
    }

    #[test]
    fn sector_has_sync_header_data_layout() {
        let data = [0u8; 256];
        let encoded = encode_sector(1, 0, &data, [0x41, 0x42]);
        assert_eq!(&encoded[0..5], &[0xFF; 5]);
        assert_eq!(&encoded[15..24], &[0x55; 9]);
        assert_eq!(&encoded[24..29], &[0xFF; 5]);
        assert_eq!(&encoded[354..363], &[0x55; 9]);
        assert_eq!(encoded.len(), 363);
    }

    #[test]
    fn data_block_round_trips_through_checksum() {
        let mut data = [0u8; 256];
        data[0] = 0xAB;
        data[1] = 0xCD;
        let encoded = encode_data_block(&data);
        assert_eq!(encoded.len(), 325);
        let decoded = decode_data_block(&encoded).expect("checksum matches");
        assert_eq!(&decoded[..2], &[0xAB, 0xCD]);
    }

    #[test]
    fn track_length_matches_zone_sector_count() {
        let image = D64Image::from_bytes(&vec![0u8; 174_848]).expect("valid");
        assert_eq!(encode_track(&image, 1).len(), 21 * 363);
        assert_eq!(encode_track(&image, 18).len(), 19 * 363);
        assert_eq!(encode_track(&image, 31).len(), 17 * 363);
    }

    #[test]
    fn speed_zone_and_cycle_rate_track_boundaries() {
        assert_eq!(speed_zone(17), 0);
        assert_eq!(speed_zone(18), 1);
        assert_eq!(cycles_per_byte(1), 208);
        assert_eq!(cycles_per_byte(31), 256);
    }
}
