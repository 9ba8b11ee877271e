//! MOS 6569 (PAL) VIC-II video generator.
//!
//! Unlike the per-cycle raster beam a real VIC-II drives, this chip is
//! stepped one whole raster line at a time: [`Vic::step_line`] renders the
//! line's 40-column text/bitmap row, overlays sprites, paints the borders,
//! and returns the CPU cycle budget the rest of the system should spend
//! before moving to the next line (63 cycles normally, 23 on a bad line,
//! since the VIC steals the other 40 for its own character/colour fetch).
//! Register writes a CPU instruction makes mid-line are visible starting
//! the *next* line, never retroactively — the scheduler is expected to call
//! `step_line` before running that line's CPU cycles, not after.

#![allow(clippy::cast_possible_truncation, clippy::too_many_lines)]

mod sprites;

pub use sprites::SpriteUnit;

use serde::{Deserialize, Serialize};

/// Save-state format version for [`VicSnapshot`]. Bumped whenever a change
/// would alter how a restored snapshot behaves under the same register
/// writes — e.g. the collision-flag clear semantics on $1e/$1f moved from
/// "any write clears" to "write-1-to-clear", which changes what a replayed
/// write sequence after restore would do to `clx_spr`/`clx_bgr`. Bumped
/// again to add `vc`/`vc_base`/`rc`/`display_state`/`bad_lines_enabled`:
/// without them a restore mid-character-row would lose the row, and a
/// restore mid-frame would lose the DEN latch.
pub const VIC_SNAPSHOT_VERSION: u8 = 3;

/// Total raster lines per PAL frame.
pub const TOTAL_RASTERS: u16 = 312;
/// CPU cycles in a normal (non-bad) line.
pub const CYCLES_NORMAL_LINE: u32 = 63;
/// CPU cycles in a bad line (40 are stolen for character/colour DMA).
pub const CYCLES_BAD_LINE: u32 = 23;
/// Chunky framebuffer width in pixels.
pub const DISPLAY_X: usize = 384;
/// Chunky framebuffer height in pixels (visible raster lines).
pub const DISPLAY_Y: usize = 272;
/// First pixel column of the 40-column display window.
pub const COL40_XSTART: usize = 0x20;
/// One past the last pixel column of the 40-column display window.
pub const COL40_XSTOP: usize = COL40_XSTART + 320;

/// One of the six graphics modes selectable by ECM/BMM/MCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    StandardText,
    MulticolorText,
    StandardBitmap,
    MulticolorBitmap,
    ExtendedColorText,
    Invalid,
}

impl DisplayMode {
    #[must_use]
    pub const fn from_bits(ecm: bool, bmm: bool, mcm: bool) -> Self {
        match (ecm, bmm, mcm) {
            (false, false, false) => Self::StandardText,
            (false, false, true) => Self::MulticolorText,
            (false, true, false) => Self::StandardBitmap,
            (false, true, true) => Self::MulticolorBitmap,
            (true, false, false) => Self::ExtendedColorText,
            _ => Self::Invalid,
        }
    }
}

/// Outcome of rendering one raster line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOutcome {
    /// True on the line where a new frame begins (raster wrapped to 0).
    pub vblank: bool,
    /// CPU cycles the caller should run before stepping the next line.
    pub cpu_cycles_consumed: u32,
}

/// Read access into the 16 KiB VIC bank view (video matrix, character data,
/// sprite pointers). The caller resolves VIC-bank-relative addresses against
/// whatever RAM/char-ROM is currently switched into that bank.
pub trait VicMemory {
    fn vic_read(&self, addr: u16) -> u8;
    fn colour_ram_read(&self, addr: u16) -> u8;
}

/// MOS 6569 VIC-II.
pub struct Vic {
    raster_y: u16,
    irq_raster: u16,
    irq_flag: u8,
    irq_mask: u8,

    ctrl1: u8,
    ctrl2: u8,
    display_idx: DisplayMode,
    den: bool,
    rsel: bool,
    x_scroll: u8,

    border_on: bool,
    dy_start: u16,
    dy_stop: u16,

    /// Sampled from DEN at raster 0x30 and held for the rest of the frame
    /// (§3: "may be set only at raster 0x30 each frame").
    bad_lines_enabled: bool,
    /// Video matrix counter: indexes the current character row's column in
    /// `screen_base`/`color_ram`. Advances by 40 at the end of each row.
    vc: u16,
    /// `vc` at the start of the current (or next) character row; latched
    /// at end-of-row and end-of-frame.
    vc_base: u16,
    /// Character row counter (0-7) within the current text row.
    rc: u8,
    /// True from the bad line of a row until `rc` wraps past 7.
    display_state: bool,
    /// Screen codes latched on the row's bad line, reused for all 8 lines
    /// of the row.
    matrix_line: [u8; 40],
    /// Colour RAM nibbles latched alongside `matrix_line`.
    color_line: [u8; 40],

    ec: u8,
    bxc: [u8; 4],
    mm: [u8; 2],

    memory_ptrs: u8,

    sprites: [SpriteUnit; 8],
    clx_spr: u8,
    clx_bgr: u8,

    chunky: Vec<u8>,
    fore_mask_buf: [u64; DISPLAY_X / 64 + 1],
    spr_coll_buf: [u8; DISPLAY_X],

    frame_complete: bool,
}

impl Default for Vic {
    fn default() -> Self {
        Self::new()
    }
}

impl Vic {
    #[must_use]
    pub fn new() -> Self {
        Self {
            raster_y: 0,
            irq_raster: 0,
            irq_flag: 0,
            irq_mask: 0,
            ctrl1: 0,
            ctrl2: 0,
            display_idx: DisplayMode::StandardText,
            den: false,
            rsel: true,
            x_scroll: 0,
            border_on: true,
            dy_start: 0x33,
            dy_stop: 0xFB,
            bad_lines_enabled: false,
            vc: 0,
            vc_base: 0,
            rc: 0,
            display_state: false,
            matrix_line: [0; 40],
            color_line: [0; 40],
            ec: 0,
            bxc: [0; 4],
            mm: [0; 2],
            memory_ptrs: 0,
            sprites: [SpriteUnit::default(); 8],
            clx_spr: 0,
            clx_bgr: 0,
            chunky: vec![0; DISPLAY_X * DISPLAY_Y],
            fore_mask_buf: [0; DISPLAY_X / 64 + 1],
            spr_coll_buf: [0; DISPLAY_X],
            frame_complete: false,
        }
    }

    /// Render one raster line and advance to the next.
    pub fn step_line(&mut self, mem: &impl VicMemory) -> LineOutcome {
        if self.raster_y == 0x30 {
            self.bad_lines_enabled = self.den;
        }

        let bad_line = self.is_bad_line();
        if bad_line {
            self.display_state = true;
            self.rc = 0;
            self.fetch_row(mem);
        }

        if self.raster_y == self.irq_raster {
            self.raise_irq(0x01);
        }

        self.update_border_latch();

        self.fore_mask_buf = [0; DISPLAY_X / 64 + 1];
        if !self.border_on && (self.raster_y as usize) < DISPLAY_Y {
            if self.display_state {
                self.render_row(mem);
            } else {
                self.render_idle_row(mem);
            }
        }

        self.paint_borders();

        if self.sprites.iter().any(|s| s.on) {
            self.spr_coll_buf = [0; DISPLAY_X];
            self.render_sprites(mem);
        }

        self.sprite_dma_update();

        if self.display_state {
            if self.rc == 7 {
                self.display_state = false;
                self.vc = (self.vc + 40) & 0x3FF;
                self.vc_base = self.vc;
            } else {
                self.rc += 1;
            }
        }

        let vblank = self.raster_y + 1 >= TOTAL_RASTERS;
        self.raster_y = if vblank { 0 } else { self.raster_y + 1 };
        if vblank {
            self.vc = 0;
            self.vc_base = 0;
        }
        self.frame_complete |= vblank;

        LineOutcome {
            vblank,
            cpu_cycles_consumed: if bad_line {
                CYCLES_BAD_LINE
            } else {
                CYCLES_NORMAL_LINE
            },
        }
    }

    fn is_bad_line(&self) -> bool {
        self.bad_lines_enabled
            && (0x30..0xF8).contains(&self.raster_y)
            && (self.raster_y & 7) == u16::from(self.x_scroll_y())
    }

    /// Latches the row's 40 screen-code/colour pairs, starting at `vc_base`
    /// (which, going into a bad line, already equals `vc_base` latched at
    /// the previous row's end — see step_line's end-of-row advance).
    fn fetch_row(&mut self, mem: &impl VicMemory) {
        let screen_base = u16::from((self.memory_ptrs >> 4) & 0x0F) * 0x0400;
        for col in 0..40usize {
            let addr = self.vc_base + col as u16;
            self.matrix_line[col] = mem.vic_read((screen_base + addr) & 0x3FFF);
            self.color_line[col] = mem.colour_ram_read(addr) & 0x0F;
        }
        self.vc = self.vc_base;
    }

    fn x_scroll_y(&self) -> u8 {
        self.ctrl1 & 0x07
    }

    fn update_border_latch(&mut self) {
        if self.raster_y == self.dy_stop {
            self.border_on = true;
        }
        if self.raster_y == self.dy_start && self.den {
            self.border_on = false;
        }
    }

    fn render_row(&mut self, mem: &impl VicMemory) {
        let screen_base = u16::from((self.memory_ptrs >> 4) & 0x0F) * 0x0400;
        let char_base = u16::from((self.memory_ptrs >> 1) & 0x07) * 0x0800;
        let char_row = u16::from(self.rc);
        let bg0 = self.bxc[0];

        let row = self.raster_y as usize;
        let line_start = row * DISPLAY_X;
        for px in &mut self.chunky[line_start..line_start + DISPLAY_X] {
            *px = bg0;
        }

        for col in 0..40usize {
            let screen_code = self.matrix_line[col];
            let colour = self.color_line[col];

            let (bitmap_addr, multicolor_char) = match self.display_idx {
                DisplayMode::StandardBitmap | DisplayMode::MulticolorBitmap => {
                    let bank = screen_base & 0x2000;
                    (
                        bank | ((self.vc + col as u16) * 8 + char_row),
                        colour & 0x08 != 0,
                    )
                }
                _ => (
                    char_base + u16::from(screen_code) * 8 + char_row,
                    colour & 0x08 != 0,
                ),
            };
            let bitmap = mem.vic_read(bitmap_addr & 0x3FFF);

            // §4.3 step 3: leading x_scroll pixels of the window stay
            // background (already true, since the row was pre-filled with
            // bg0 above) by shifting where each column's pixels land.
            // The foreground mask is kept at the character grid's nominal,
            // unshifted column so sprite alignment (mx[n] + 8 - x_scroll,
            // see fore_mask_for_sprite) can map a screen pixel back onto it.
            let grid_x0 = COL40_XSTART + col * 8;
            let pixel_x0 = grid_x0 + usize::from(self.x_scroll);

            let (pixels, fg_mask) = self.render_char_pixels(screen_code, colour, bitmap, multicolor_char);
            for (i, colour_index) in pixels.into_iter().enumerate() {
                let x = pixel_x0 + i;
                if (COL40_XSTART..COL40_XSTOP).contains(&x) {
                    self.chunky[line_start + x] = colour_index;
                }
            }
            if fg_mask != 0 {
                self.set_fore_mask(grid_x0, fg_mask);
            }
        }
    }

    /// §4.3 idle state: no character row is being displayed (no bad line
    /// has latched one this frame, or the row just ended). The sequencer
    /// still fetches a single byte at a fixed idle address and replicates
    /// it across all 40 columns, producing a foreground mask (for sprite
    /// priority) even though the colour never leaves background 0.
    fn render_idle_row(&mut self, mem: &impl VicMemory) {
        let idle_addr = if matches!(self.display_idx, DisplayMode::ExtendedColorText) {
            0x39FF
        } else {
            0x3FFF
        };
        let bitmap = mem.vic_read(idle_addr);
        let bg0 = self.bxc[0];

        let row = self.raster_y as usize;
        let line_start = row * DISPLAY_X;
        for px in &mut self.chunky[line_start..line_start + DISPLAY_X] {
            *px = bg0;
        }

        let mut fg_mask = 0u8;
        for i in 0..8 {
            if (bitmap >> (7 - i)) & 1 != 0 {
                fg_mask |= 0x80 >> i;
            }
        }
        if fg_mask != 0 {
            for col in 0..40usize {
                self.set_fore_mask(COL40_XSTART + col * 8, fg_mask);
            }
        }
    }

    /// Returns 8 chunky colour indices and an 8-bit foreground mask (bit 7 = leftmost pixel).
    fn render_char_pixels(&self, screen_code: u8, colour: u8, bitmap: u8, multicolor_char: bool) -> ([u8; 8], u8) {
        let mut pixels = [self.bxc[0]; 8];
        let mut fg_mask = 0u8;
        match self.display_idx {
            DisplayMode::StandardText => {
                for i in 0..8 {
                    let bit = (bitmap >> (7 - i)) & 1;
                    if bit != 0 {
                        pixels[i] = colour;
                        fg_mask |= 0x80 >> i;
                    }
                }
            }
            DisplayMode::ExtendedColorText => {
                let bg = self.bxc[(screen_code >> 6) as usize];
                for i in 0..8 {
                    let bit = (bitmap >> (7 - i)) & 1;
                    pixels[i] = if bit != 0 { colour } else { bg };
                    if bit != 0 {
                        fg_mask |= 0x80 >> i;
                    }
                }
            }
            DisplayMode::MulticolorText => {
                if multicolor_char {
                    let palette = [self.bxc[0], self.bxc[1], self.bxc[2], colour & 0x07];
                    for pair in 0..4 {
                        let bits = (bitmap >> (6 - pair * 2)) & 0x03;
                        let c = palette[bits as usize];
                        pixels[pair * 2] = c;
                        pixels[pair * 2 + 1] = c;
                        if bits & 0x02 != 0 {
                            fg_mask |= 0xC0 >> (pair * 2);
                        }
                    }
                } else {
                    for i in 0..8 {
                        let bit = (bitmap >> (7 - i)) & 1;
                        if bit != 0 {
                            pixels[i] = colour;
                            fg_mask |= 0x80 >> i;
                        }
                    }
                }
            }
            DisplayMode::StandardBitmap => {
                let fg = colour >> 4;
                let bg = colour & 0x0F;
                for i in 0..8 {
                    let bit = (bitmap >> (7 - i)) & 1;
                    pixels[i] = if bit != 0 { fg } else { bg };
                    if bit != 0 {
                        fg_mask |= 0x80 >> i;
                    }
                }
            }
            DisplayMode::MulticolorBitmap => {
                let palette = [self.bxc[0], screen_code >> 4, screen_code & 0x0F, colour];
                for pair in 0..4 {
                    let bits = (bitmap >> (6 - pair * 2)) & 0x03;
                    let c = palette[bits as usize];
                    pixels[pair * 2] = c;
                    pixels[pair * 2 + 1] = c;
                    if bits & 0x02 != 0 {
                        fg_mask |= 0xC0 >> (pair * 2);
                    }
                }
            }
            DisplayMode::Invalid => {}
        }
        (pixels, fg_mask)
    }

    fn set_fore_mask(&mut self, x0: usize, mask8: u8) {
        for i in 0..8 {
            if mask8 & (0x80 >> i) != 0 {
                let x = x0 + i;
                let word = x / 64;
                let bit = x % 64;
                if word < self.fore_mask_buf.len() {
                    self.fore_mask_buf[word] |= 1 << bit;
                }
            }
        }
    }

    fn fore_mask_at(&self, x: usize) -> bool {
        let word = x / 64;
        let bit = x % 64;
        word < self.fore_mask_buf.len() && self.fore_mask_buf[word] & (1 << bit) != 0
    }

    /// Sprites sit in absolute screen coordinates and never shift with
    /// `x_scroll`, but the foreground mask is stored at the character
    /// grid's nominal (unscrolled) column — see render_row. Map back from
    /// screen space to grid space before sampling it.
    fn fore_mask_for_sprite(&self, x: usize) -> bool {
        match x.checked_sub(usize::from(self.x_scroll)) {
            Some(grid_x) => self.fore_mask_at(grid_x),
            None => false,
        }
    }

    /// Paints the border colour. The vertical (top/bottom) border covers
    /// the whole line; the horizontal (left/right) border always covers
    /// the side strips outside the 40-column window, whether or not the
    /// vertical latch is on. 38-column mode additionally overpaints the
    /// outermost character column on each side.
    fn paint_borders(&mut self) {
        if (self.raster_y as usize) >= DISPLAY_Y {
            return;
        }
        let row = self.raster_y as usize;
        let line_start = row * DISPLAY_X;

        if self.border_on {
            for px in &mut self.chunky[line_start..line_start + DISPLAY_X] {
                *px = self.ec;
            }
            return;
        }

        for px in &mut self.chunky[line_start..line_start + COL40_XSTART] {
            *px = self.ec;
        }
        for px in &mut self.chunky[line_start + COL40_XSTOP..line_start + DISPLAY_X] {
            *px = self.ec;
        }

        if self.ctrl2 & 0x08 == 0 {
            for px in &mut self.chunky[line_start + COL40_XSTART..line_start + COL40_XSTART + 8] {
                *px = self.ec;
            }
            for px in &mut self.chunky[line_start + COL40_XSTOP - 8..line_start + COL40_XSTOP] {
                *px = self.ec;
            }
        }
    }

    fn render_sprites(&mut self, mem: &impl VicMemory) {
        let row = self.raster_y as usize;
        if row >= DISPLAY_Y {
            return;
        }
        let line_start = row * DISPLAY_X;

        for n in (0..8).rev() {
            let sprite = self.sprites[n];
            if !sprite.on || sprite.x as usize >= DISPLAY_X.saturating_sub(32) {
                continue;
            }
            let pointer_addr = 0x3F8 + n as u16;
            let pointer = mem.vic_read(pointer_addr & 0x3FFF);
            let base = u16::from(pointer) * 64 + u16::from(sprite.mc);
            let data = [
                mem.vic_read(base & 0x3FFF),
                mem.vic_read((base + 1) & 0x3FFF),
                mem.vic_read((base + 2) & 0x3FFF),
            ];

            let span = sprites::expand_span(data, sprite.multicolor, sprite.x_expand);
            // §4.4: the sprite's drawn position stays in screen space (x_scroll
            // doesn't move sprites); fore_mask_for_sprite applies the matching
            // mx[n] + 8 - x_scroll offset when it samples the foreground mask.
            let start_x = usize::from(sprite.x) + 8;

            for (i, pixel) in span.iter().enumerate() {
                let x = start_x + i;
                if x >= DISPLAY_X {
                    break;
                }
                let Some(colour_index) = sprites::resolve_colour(*pixel, sprite, &self.mm) else {
                    continue;
                };
                if self.fore_mask_for_sprite(x) {
                    self.clx_bgr |= 1 << n;
                }
                if self.spr_coll_buf[x] != 0 {
                    self.clx_spr |= (1 << n) | self.spr_coll_buf[x];
                } else {
                    self.spr_coll_buf[x] = 1 << n;
                }
                let behind_foreground = self.fore_mask_for_sprite(x) && (self.clx_bgr_priority(n));
                if !behind_foreground {
                    self.chunky[line_start + x] = colour_index;
                }
            }
        }

        if self.clx_spr != 0 {
            self.raise_irq(0x04);
        }
        if self.clx_bgr != 0 {
            self.raise_irq(0x02);
        }
    }

    fn clx_bgr_priority(&self, n: usize) -> bool {
        self.sprites[n].priority_behind_foreground
    }

    fn sprite_dma_update(&mut self) {
        for sprite in &mut self.sprites {
            if sprite.enabled && sprite.y == (self.raster_y & 0xFF) as u8 {
                sprite.mc = 0;
                sprite.on = true;
            } else if sprite.on {
                let step = if sprite.y_expand && !sprite.y_expand_phase {
                    0
                } else {
                    3
                };
                sprite.y_expand_phase = !sprite.y_expand_phase;
                sprite.mc = sprite.mc.saturating_add(step);
                if sprite.mc >= 63 {
                    sprite.on = false;
                }
            }
        }
    }

    fn raise_irq(&mut self, bit: u8) {
        self.irq_flag |= bit;
    }

    #[must_use]
    pub const fn irq_active(&self) -> bool {
        (self.irq_flag & self.irq_mask) != 0
    }

    #[must_use]
    pub fn read(&self, reg: u8) -> u8 {
        match reg & 0x3F {
            0x11 => (self.ctrl1 & 0x7F) | (((self.raster_y & 0x100) >> 1) as u8),
            0x12 => (self.raster_y & 0xFF) as u8,
            0x16 => self.ctrl2 | 0xC0,
            0x18 => self.memory_ptrs | 0x01,
            0x19 => self.irq_flag | (u8::from(self.irq_active()) << 7) | 0x70,
            0x1A => self.irq_mask | 0xF0,
            0x1E => self.clx_spr,
            0x1F => self.clx_bgr,
            0x20 => self.ec | 0xF0,
            0x21..=0x24 => self.bxc[(reg - 0x21) as usize] | 0xF0,
            0x25 => self.mm[0] | 0xF0,
            0x26 => self.mm[1] | 0xF0,
            0x00..=0x0F => {
                let n = (reg >> 1) as usize;
                if reg & 1 == 0 {
                    self.sprites[n].x as u8
                } else {
                    self.sprites[n].y
                }
            }
            0x10 => self.sprites.iter().enumerate().fold(0u8, |acc, (n, s)| {
                acc | (u8::from(s.x >= 256) << n)
            }),
            0x15 => self.sprites.iter().enumerate().fold(0u8, |acc, (n, s)| acc | (u8::from(s.enabled) << n)),
            0x17 => self.sprites.iter().enumerate().fold(0u8, |acc, (n, s)| acc | (u8::from(s.y_expand) << n)),
            0x1B => self.sprites.iter().enumerate().fold(0u8, |acc, (n, s)| acc | (u8::from(s.priority_behind_foreground) << n)),
            0x1C => self.sprites.iter().enumerate().fold(0u8, |acc, (n, s)| acc | (u8::from(s.multicolor) << n)),
            0x1D => self.sprites.iter().enumerate().fold(0u8, |acc, (n, s)| acc | (u8::from(s.x_expand) << n)),
            0x27..=0x2E => self.sprites[(reg - 0x27) as usize].colour | 0xF0,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 0x3F {
            0x11 => {
                self.ctrl1 = value;
                self.den = value & 0x10 != 0;
                self.rsel = value & 0x08 != 0;
                let (start, stop) = if self.rsel { (0x33, 0xFB) } else { (0x37, 0xF7) };
                self.dy_start = start;
                self.dy_stop = stop;
                let new_raster = (self.irq_raster & 0x00FF) | (u16::from(value & 0x80) << 1);
                self.set_irq_raster(new_raster);
                self.display_idx = DisplayMode::from_bits(value & 0x40 != 0, value & 0x20 != 0, self.ctrl2 & 0x10 != 0);
            }
            0x12 => {
                let new_raster = (self.irq_raster & 0x0100) | u16::from(value);
                self.set_irq_raster(new_raster);
            }
            0x16 => {
                self.ctrl2 = value;
                self.x_scroll = value & 0x07;
                self.display_idx = DisplayMode::from_bits(self.ctrl1 & 0x40 != 0, self.ctrl1 & 0x20 != 0, value & 0x10 != 0);
            }
            0x18 => self.memory_ptrs = value,
            0x19 => self.irq_flag &= !(value & 0x0F),
            0x1A => self.irq_mask = value & 0x0F,
            0x1E => {} // read-only
            0x1F => {} // read-only
            0x20 => self.ec = value & 0x0F,
            0x21..=0x24 => self.bxc[(reg - 0x21) as usize] = value & 0x0F,
            0x25 => self.mm[0] = value & 0x0F,
            0x26 => self.mm[1] = value & 0x0F,
            0x00..=0x0F => {
                let n = (reg >> 1) as usize;
                if reg & 1 == 0 {
                    self.sprites[n].x = (self.sprites[n].x & 0x100) | u16::from(value);
                } else {
                    self.sprites[n].y = value;
                }
            }
            0x10 => {
                for (n, sprite) in self.sprites.iter_mut().enumerate() {
                    let hi = u16::from(value & (1 << n) != 0) << 8;
                    sprite.x = (sprite.x & 0xFF) | hi;
                }
            }
            0x15 => {
                for (n, sprite) in self.sprites.iter_mut().enumerate() {
                    sprite.enabled = value & (1 << n) != 0;
                }
            }
            0x17 => {
                for (n, sprite) in self.sprites.iter_mut().enumerate() {
                    sprite.y_expand = value & (1 << n) != 0;
                }
            }
            0x1B => {
                for (n, sprite) in self.sprites.iter_mut().enumerate() {
                    sprite.priority_behind_foreground = value & (1 << n) != 0;
                }
            }
            0x1C => {
                for (n, sprite) in self.sprites.iter_mut().enumerate() {
                    sprite.multicolor = value & (1 << n) != 0;
                }
            }
            0x1D => {
                for (n, sprite) in self.sprites.iter_mut().enumerate() {
                    sprite.x_expand = value & (1 << n) != 0;
                }
            }
            0x27..=0x2E => self.sprites[(reg - 0x27) as usize].colour = value & 0x0F,
            _ => {}
        }
    }

    fn set_irq_raster(&mut self, new_value: u16) {
        let changed = new_value != self.irq_raster;
        self.irq_raster = new_value;
        if changed && self.irq_raster == self.raster_y {
            self.raise_irq(0x01);
        }
    }

    /// Acknowledge and clear a pending sprite-sprite collision (register $1e is cleared on read).
    pub fn take_sprite_collision(&mut self) -> u8 {
        std::mem::take(&mut self.clx_spr)
    }

    /// Acknowledge and clear a pending sprite-background collision (register $1f is cleared on read).
    pub fn take_background_collision(&mut self) -> u8 {
        std::mem::take(&mut self.clx_bgr)
    }

    #[must_use]
    pub fn chunky_buffer(&self) -> &[u8] {
        &self.chunky
    }

    #[must_use]
    pub const fn raster_line(&self) -> u16 {
        self.raster_y
    }

    pub fn take_frame_complete(&mut self) -> bool {
        std::mem::take(&mut self.frame_complete)
    }

    /// Capture register and DMA-fetch state for a save state. The chunky
    /// frame buffer and the per-line scratch masks are excluded: both are
    /// fully rebuilt by the next `step_line` call, so persisting them would
    /// only bloat the snapshot.
    #[must_use]
    pub fn snapshot(&self) -> VicSnapshot {
        VicSnapshot {
            version: VIC_SNAPSHOT_VERSION,
            raster_y: self.raster_y,
            irq_raster: self.irq_raster,
            irq_flag: self.irq_flag,
            irq_mask: self.irq_mask,
            ctrl1: self.ctrl1,
            ctrl2: self.ctrl2,
            den: self.den,
            rsel: self.rsel,
            x_scroll: self.x_scroll,
            border_on: self.border_on,
            dy_start: self.dy_start,
            dy_stop: self.dy_stop,
            ec: self.ec,
            bxc: self.bxc,
            mm: self.mm,
            memory_ptrs: self.memory_ptrs,
            sprites: self.sprites,
            clx_spr: self.clx_spr,
            clx_bgr: self.clx_bgr,
            bad_lines_enabled: self.bad_lines_enabled,
            vc: self.vc,
            vc_base: self.vc_base,
            rc: self.rc,
            display_state: self.display_state,
        }
    }

    /// Restore state captured by [`Vic::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns the snapshot's version if it doesn't match
    /// [`VIC_SNAPSHOT_VERSION`] — the caller decides whether that's fatal.
    pub fn restore(&mut self, snap: &VicSnapshot) -> Result<(), u8> {
        if snap.version != VIC_SNAPSHOT_VERSION {
            return Err(snap.version);
        }
        self.raster_y = snap.raster_y;
        self.irq_raster = snap.irq_raster;
        self.irq_flag = snap.irq_flag;
        self.irq_mask = snap.irq_mask;
        self.ctrl1 = snap.ctrl1;
        self.ctrl2 = snap.ctrl2;
        self.den = snap.den;
        self.rsel = snap.rsel;
        self.x_scroll = snap.x_scroll;
        self.border_on = snap.border_on;
        self.dy_start = snap.dy_start;
        self.dy_stop = snap.dy_stop;
        self.ec = snap.ec;
        self.bxc = snap.bxc;
        self.mm = snap.mm;
        self.memory_ptrs = snap.memory_ptrs;
        self.sprites = snap.sprites;
        self.clx_spr = snap.clx_spr;
        self.clx_bgr = snap.clx_bgr;
        self.bad_lines_enabled = snap.bad_lines_enabled;
        self.vc = snap.vc;
        self.vc_base = snap.vc_base;
        self.rc = snap.rc;
        self.display_state = snap.display_state;
        // Not restored: matrix_line/color_line. They're only consulted
        // mid-row (rc in 1..=7), and the next bad line overwrites them
        // regardless, same tradeoff as the excluded scratch buffers below.
        self.display_idx = DisplayMode::from_bits(
            self.ctrl1 & 0x40 != 0,
            self.ctrl1 & 0x20 != 0,
            self.ctrl2 & 0x10 != 0,
        );
        self.fore_mask_buf = [0; DISPLAY_X / 64 + 1];
        self.spr_coll_buf = [0; DISPLAY_X];
        self.frame_complete = false;
        Ok(())
    }
}

/// Serializable snapshot of a [`Vic`], for save states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VicSnapshot {
    version: u8,
    raster_y: u16,
    irq_raster: u16,
    irq_flag: u8,
    irq_mask: u8,
    ctrl1: u8,
    ctrl2: u8,
    den: bool,
    rsel: bool,
    x_scroll: u8,
    border_on: bool,
    dy_start: u16,
    dy_stop: u16,
    ec: u8,
    bxc: [u8; 4],
    mm: [u8; 2],
    memory_ptrs: u8,
    sprites: [SpriteUnit; 8],
    clx_spr: u8,
    clx_bgr: u8,
    bad_lines_enabled: bool,
    vc: u16,
    vc_base: u16,
    rc: u8,
    display_state: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BlankMemory;
    impl VicMemory for BlankMemory {
        fn vic_read(&self, _addr: u16) -> u8 {
            0
        }
        fn colour_ram_read(&self, _addr: u16) -> u8 {
            0
        }
    }

    #[test]
    fn raster_advances_and_wraps() {
        let mut vic = Vic::new();
        let mem = BlankMemory;
        for _ in 0..TOTAL_RASTERS - 1 {
            let outcome = vic.step_line(&mem);
            assert!(!outcome.vblank);
        }
        let last = vic.step_line(&mem);
        assert!(last.vblank);
        assert_eq!(vic.raster_line(), 0);
    }

    #[test]
    fn raster_irq_fires_at_compare_line() {
        let mut vic = Vic::new();
        let mem = BlankMemory;
        vic.write(0x12, 10);
        vic.write(0x1A, 0x01);
        for _ in 0..=10 {
            vic.step_line(&mem);
        }
        assert!(vic.irq_active());
    }

    #[test]
    fn irq_flag_write_clears_only_written_bits() {
        let mut vic = Vic::new();
        vic.irq_flag = 0x07;
        vic.write(0x19, 0x05);
        assert_eq!(vic.irq_flag, 0x02);
    }

    #[test]
    fn bad_line_cycle_budget() {
        let mut vic = Vic::new();
        let mem = BlankMemory;
        vic.write(0x11, 0x1B); // DEN=1, RSEL=1, YSCROLL=3
        for _ in 0..0x33 {
            vic.step_line(&mem);
        }
        let outcome = vic.step_line(&mem);
        assert_eq!(outcome.cpu_cycles_consumed, CYCLES_BAD_LINE);
    }

    #[test]
    fn immediate_irq_on_raster_register_write_matching_current_line() {
        let mut vic = Vic::new();
        let mem = BlankMemory;
        vic.write(0x1A, 0x01);
        for _ in 0..5 {
            vic.step_line(&mem);
        }
        vic.write(0x12, 5);
        assert!(vic.irq_active());
    }

    #[test]
    fn snapshot_round_trips_register_state() {
        let mut vic = Vic::new();
        let mem = BlankMemory;
        vic.write(0x11, 0x1B);
        vic.write(0x12, 100);
        vic.write(0x1A, 0x01);
        vic.write(0x20, 0x06);
        for _ in 0..50 {
            vic.step_line(&mem);
        }
        let snap = vic.snapshot();

        let mut restored = Vic::new();
        restored.restore(&snap).expect("matching version");
        assert_eq!(restored.raster_line(), vic.raster_line());
        assert_eq!(restored.read(0x20), vic.read(0x20));
        assert_eq!(restored.irq_active(), vic.irq_active());
    }

    #[test]
    fn restore_rejects_mismatched_version() {
        let mut vic = Vic::new();
        let mut snap = vic.snapshot();
        snap.version = VIC_SNAPSHOT_VERSION + 1;
        assert_eq!(vic.restore(&snap), Err(VIC_SNAPSHOT_VERSION + 1));
    }

    struct OpaqueSpriteMemory;
    impl VicMemory for OpaqueSpriteMemory {
        fn vic_read(&self, _addr: u16) -> u8 {
            0xFF
        }
        fn colour_ram_read(&self, _addr: u16) -> u8 {
            0
        }
    }

    #[test]
    fn overlapping_sprites_raise_and_latch_a_collision() {
        let mut vic = Vic::new();
        let mem = OpaqueSpriteMemory;
        vic.write(0x00, 0x20); // sprite 0 x
        vic.write(0x01, 0x40); // sprite 0 y
        vic.write(0x02, 0x24); // sprite 1 x, overlapping sprite 0's 24-wide span
        vic.write(0x03, 0x40); // sprite 1 y
        vic.write(0x15, 0x03); // both enabled

        // DMA latches `on` for the matching line only after that line has
        // already rendered, so pixels appear starting the following line.
        for _ in 0..=0x40 {
            vic.step_line(&mem);
        }
        vic.step_line(&mem);

        assert_eq!(vic.take_sprite_collision(), 0x03);
        assert_eq!(vic.take_sprite_collision(), 0x00);
    }

    #[test]
    fn multicolor_text_blank_column_has_no_foreground() {
        struct HighBitColour;
        impl VicMemory for HighBitColour {
            fn vic_read(&self, _addr: u16) -> u8 {
                0 // space glyph, all bits clear
            }
            fn colour_ram_read(&self, addr: u16) -> u8 {
                if addr == 0 {
                    0x08 // multicolor bit set, background-only nibble
                } else {
                    0
                }
            }
        }

        let mut vic = Vic::new();
        let mem = HighBitColour;
        vic.write(0x16, 0x10); // MCM on
        vic.write(0x11, 0x1B); // DEN, RSEL, YSCROLL=3

        // Border stays latched on until the raster reaches the top of the
        // display window; that same line is the first one rendered.
        for _ in 0..0x33 {
            vic.step_line(&mem);
        }
        vic.step_line(&mem);

        let row_start = 0x33 * DISPLAY_X;
        let col0_start = COL40_XSTART;
        for x in col0_start..col0_start + 8 {
            assert_eq!(vic.chunky_buffer()[row_start + x], vic.bxc[0]);
            assert!(!vic.fore_mask_at(x));
        }
    }

    #[test]
    fn exactly_25_bad_lines_per_frame() {
        let mut vic = Vic::new();
        let mem = BlankMemory;
        vic.write(0x11, 0x10); // DEN=1, RSEL=0, YSCROLL=0
        let mut bad_lines = 0;
        for _ in 0..TOTAL_RASTERS {
            let outcome = vic.step_line(&mem);
            if outcome.cpu_cycles_consumed == CYCLES_BAD_LINE {
                bad_lines += 1;
            }
        }
        assert_eq!(bad_lines, 25);
    }

    #[test]
    fn bad_lines_enabled_latches_at_raster_0x30_and_survives_a_mid_frame_den_drop() {
        let mut vic = Vic::new();
        let mem = BlankMemory;
        vic.write(0x11, 0x10); // DEN=1, RSEL=0, YSCROLL=0
        for _ in 0..0x31 {
            vic.step_line(&mem); // crosses raster 0x30 with DEN still high
        }
        vic.write(0x11, 0x00); // drop DEN mid-frame; the latch should ignore this
        for _ in 0x31..0x38 {
            vic.step_line(&mem);
        }
        let still_latched = vic.step_line(&mem); // raster 0x38
        assert_eq!(
            still_latched.cpu_cycles_consumed, CYCLES_BAD_LINE,
            "a live DEN drop must not un-latch bad lines mid-frame"
        );

        // Wrap into the next frame with DEN still low: the latch resamples
        // at raster 0x30 and should gate bad lines off for this new frame.
        for _ in 0x39..TOTAL_RASTERS {
            vic.step_line(&mem);
        }
        for _ in 0..0x38 {
            vic.step_line(&mem);
        }
        let after_relatch = vic.step_line(&mem); // raster 0x38, next frame
        assert_eq!(after_relatch.cpu_cycles_consumed, CYCLES_NORMAL_LINE);
    }

    #[test]
    fn idle_state_renders_from_fixed_address_and_still_sets_foreground_mask() {
        struct IdleByteMemory;
        impl VicMemory for IdleByteMemory {
            fn vic_read(&self, addr: u16) -> u8 {
                if addr == 0x3FFF {
                    0xFF
                } else {
                    0
                }
            }
            fn colour_ram_read(&self, _addr: u16) -> u8 {
                0
            }
        }

        let mut vic = Vic::new();
        let mem = IdleByteMemory;
        for _ in 0..0x31 {
            vic.step_line(&mem); // DEN off through raster 0x30: bad_lines_enabled latches false
        }
        vic.write(0x11, 0x18); // DEN=1, RSEL=1 -- turned on only after the latch point
        for _ in 0x31..0x33 {
            vic.step_line(&mem);
        }
        vic.step_line(&mem); // raster 0x33: border opens, but no bad line ever fired this frame

        let row_start = 0x33 * DISPLAY_X;
        assert_eq!(vic.chunky_buffer()[row_start + COL40_XSTART], vic.bxc[0]);
        for x in COL40_XSTART..COL40_XSTART + 8 {
            assert!(vic.fore_mask_at(x));
        }
    }

    #[test]
    fn side_borders_paint_every_display_line_and_38_column_mode_widens_them() {
        let mut vic = Vic::new();
        let mem = BlankMemory;
        vic.write(0x20, 0x0E); // border colour
        vic.write(0x16, 0x08); // CSEL=1: 40-column mode
        vic.write(0x11, 0x18); // DEN=1, RSEL=1
        for _ in 0..0x33 {
            vic.step_line(&mem);
        }
        vic.step_line(&mem); // raster 0x33, first display line, 40-column mode

        let row_start = 0x33 * DISPLAY_X;
        assert_eq!(vic.chunky_buffer()[row_start], vic.ec);
        assert_eq!(vic.chunky_buffer()[row_start + COL40_XSTOP], vic.ec);
        assert_ne!(vic.chunky_buffer()[row_start + COL40_XSTART], vic.ec);

        vic.write(0x16, 0x00); // CSEL=0: 38-column mode
        vic.step_line(&mem); // raster 0x34

        let row_start2 = 0x34 * DISPLAY_X;
        assert_eq!(vic.chunky_buffer()[row_start2 + COL40_XSTART], vic.ec);
        assert_eq!(vic.chunky_buffer()[row_start2 + COL40_XSTOP - 1], vic.ec);
    }

    #[test]
    fn x_scroll_shifts_the_character_grid_and_sprite_alignment_compensates() {
        struct OpaqueText;
        impl VicMemory for OpaqueText {
            fn vic_read(&self, _addr: u16) -> u8 {
                0xFF // every character's bitmap byte is fully set
            }
            fn colour_ram_read(&self, _addr: u16) -> u8 {
                0x01 // foreground colour 1
            }
        }

        let mut vic = Vic::new();
        let mem = OpaqueText;
        vic.write(0x16, 0x03); // x_scroll = 3
        vic.write(0x11, 0x18); // DEN=1, RSEL=1
        for _ in 0..0x33 {
            vic.step_line(&mem);
        }
        vic.step_line(&mem); // raster 0x33, first display line

        let row_start = 0x33 * DISPLAY_X;
        for x in COL40_XSTART..COL40_XSTART + 3 {
            assert_eq!(vic.chunky_buffer()[row_start + x], vic.bxc[0]);
        }
        assert_eq!(vic.chunky_buffer()[row_start + COL40_XSTART + 3], 1);

        // The mask is stored at the nominal (unshifted) grid column; a
        // sprite sampling it must subtract x_scroll to land on the pixel
        // that's visually foreground.
        assert!(vic.fore_mask_at(COL40_XSTART));
        assert!(vic.fore_mask_for_sprite(COL40_XSTART + 3));
        assert!(!vic.fore_mask_for_sprite(COL40_XSTART));
    }
}
