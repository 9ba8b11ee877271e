//! Per-sprite state and the hardware-accurate bit/pixel expansion used to
//! paint a sprite's 24-pixel-wide (48 when X-expanded) scan line.
//!
//! Expansion here is a direct bit-doubling pass rather than a full
//! 16x16x256 cross-product lookup table: at one raster line per call there
//! is no per-cycle budget to amortise a giant precomputed table against, so
//! a handful of shifts per sprite per line is the simpler and equally fast
//! choice.

#![allow(clippy::cast_possible_truncation)]

/// Per-sprite register and DMA-fetch state.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct SpriteUnit {
    pub enabled: bool,
    pub on: bool,
    pub x: u16,
    pub y: u8,
    pub colour: u8,
    pub multicolor: bool,
    pub x_expand: bool,
    pub y_expand: bool,
    pub y_expand_phase: bool,
    pub priority_behind_foreground: bool,
    /// Data-fetch counter (0..=62), advances 3 bytes per displayed line.
    pub mc: u8,
}

/// One pixel's raw 2-bit (multicolor) or 1-bit (hires) sprite code before
/// colour resolution. `0` is always transparent.
pub type SpritePixel = u8;

/// Expand a sprite's 3 fetched data bytes into one [`SpritePixel`] per
/// screen column, honouring X-expansion.
#[must_use]
pub fn expand_span(data: [u8; 3], multicolor: bool, x_expand: bool) -> Vec<SpritePixel> {
    let bits: Vec<SpritePixel> = if multicolor {
        let combined = (u32::from(data[0]) << 16) | (u32::from(data[1]) << 8) | u32::from(data[2]);
        (0..12)
            .map(|pair| ((combined >> (22 - pair * 2)) & 0x03) as u8)
            .flat_map(|code| [code, code])
            .collect()
    } else {
        let combined = (u32::from(data[0]) << 16) | (u32::from(data[1]) << 8) | u32::from(data[2]);
        (0..24).map(|i| ((combined >> (23 - i)) & 0x01) as u8).collect()
    };

    if x_expand {
        bits.into_iter().flat_map(|b| [b, b]).collect()
    } else {
        bits
    }
}

/// Resolve a raw sprite pixel code to a chunky colour index, or `None` if
/// the pixel is transparent.
#[must_use]
pub fn resolve_colour(pixel: SpritePixel, sprite: SpriteUnit, mm: &[u8; 2]) -> Option<u8> {
    if sprite.multicolor {
        match pixel {
            0 => None,
            1 => Some(mm[0]),
            2 => Some(sprite.colour),
            3 => Some(mm[1]),
            _ => None,
        }
    } else if pixel == 0 {
        None
    } else {
        Some(sprite.colour)
    }
}
