//! Commodore Denise OCS/ECS — video output, bitplane shifter, sprite
//! engine, and collision detector.
//!
//! Denise receives bitplane data fetched by Agnus DMA and shifts it out one
//! pixel at a time, combining it with sprite data and the colour palette to
//! produce pixels. The machine crate drives Denise directly off the beam
//! position, so Denise itself carries no notion of CCK timing beyond a
//! per-line parity bit used to hold lores pixels for two half-CCK calls.
//!
//! `framebuffer_raster` is the beam-addressed output surface, one entry per
//! quarter-CCK subpixel, sized for the full (including blanking) raster.
//! This is what `write_raster_pixel` writes and what viewport extraction
//! crops down to a displayable image.

use std::collections::VecDeque;

/// Conventional lo-res display width used by viewport extraction.
pub const FB_WIDTH: u32 = 320;
/// Conventional lo-res display height used by viewport extraction.
pub const FB_HEIGHT: u32 = 256;

/// Raster buffer width: 227 CCKs/line times 4 quarter-CCK subpixel slots.
pub const RASTER_FB_WIDTH: u32 = 908;
/// Raster buffer height for a 312-line (PAL) frame, two rows per line to
/// leave room for the alternate interlace field.
pub const PAL_RASTER_FB_HEIGHT: u32 = 624;
/// Raster buffer height for a 262-line (NTSC) frame, two rows per line.
pub const NTSC_RASTER_FB_HEIGHT: u32 = 524;

const BPLCON0_HIRES: u16 = 0x8000;
const BPLCON0_HAM: u16 = 0x0800;
const BPLCON0_DBLPF: u16 = 0x0400;
const BPLCON2_PF2PRI: u16 = 0x0040;

/// Which cropped view of the raster buffer to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportPreset {
    /// The conventional 320x256-ish visible display area.
    Standard,
}

/// A cropped, display-ready view extracted from the raster buffer.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

/// Per-call debug/compositing output from a single beam-position pixel
/// evaluation. `hires_pair_color_idx` holds the raw (pre-RGB-resolve)
/// palette indices for the two subpixels produced by this call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeniseOutputPixelDebug {
    pub hires_pair_color_idx: [u8; 2],
    pub sprite_group_hit: Option<u8>,
}

/// Commodore Denise: bitplane shifter, sprite engine, and colour palette.
pub struct DeniseOcs {
    pub palette: [u16; 32],

    pub bplcon0: u16,
    pub bplcon1: u16,
    pub bplcon2: u16,
    pub bplcon3: u16,
    pub clxcon: u16,
    clxdat: u16,

    pub lof: bool,
    pub interlace_active: bool,

    bpl_dat: [u16; 8],
    bpl_fifo: [VecDeque<u16>; 8],
    pub bpl_shift: [u16; 8],
    lores_parity: bool,
    ham_last: u16,

    pub spr_pos: [u16; 8],
    pub spr_ctl: [u16; 8],
    pub spr_data: [u16; 8],
    pub spr_datb: [u16; 8],
    sprite_render_scale: u8,

    pub framebuffer_raster: Vec<u32>,
    pub raster_fb_height: u32,
}

impl DeniseOcs {
    /// Create an OCS/ECS Denise with a PAL-sized raster buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_raster_height(PAL_RASTER_FB_HEIGHT)
    }

    /// Create an OCS/ECS Denise with an explicit raster buffer height
    /// (`PAL_RASTER_FB_HEIGHT` or `NTSC_RASTER_FB_HEIGHT`).
    #[must_use]
    pub fn new_with_raster_height(raster_fb_height: u32) -> Self {
        Self {
            palette: [0; 32],
            bplcon0: 0,
            bplcon1: 0,
            bplcon2: 0,
            bplcon3: 0,
            clxcon: 0,
            clxdat: 0,
            lof: false,
            interlace_active: false,
            bpl_dat: [0; 8],
            bpl_fifo: Default::default(),
            bpl_shift: [0; 8],
            lores_parity: false,
            ham_last: 0,
            spr_pos: [0; 8],
            spr_ctl: [0; 8],
            spr_data: [0; 8],
            spr_datb: [0; 8],
            sprite_render_scale: 1,
            framebuffer_raster: vec![0xFF00_0000; (RASTER_FB_WIDTH * raster_fb_height) as usize],
            raster_fb_height,
        }
    }

    /// Reset per-line state. Called once at the start of every display line.
    pub fn begin_beam_line(&mut self) {
        self.lores_parity = false;
        self.ham_last = self.palette[0];
    }

    pub fn set_palette(&mut self, idx: usize, val: u16) {
        if idx < self.palette.len() {
            self.palette[idx] = val & 0x0FFF;
        }
    }

    /// Load the last word of a bitplane fetch group into its holding latch.
    pub fn load_bitplane(&mut self, idx: usize, val: u16) {
        if idx < self.bpl_dat.len() {
            self.bpl_dat[idx] = val;
        }
    }

    /// Queue a non-final word of a wide bitplane fetch for a plane.
    pub fn push_bpl_fifo(&mut self, idx: usize, val: u16) {
        if idx < self.bpl_fifo.len() {
            self.bpl_fifo[idx].push_back(val);
        }
    }

    /// Schedule the shift-register load that real hardware performs when
    /// BPL1DAT (the final plane of a fetch group) is written: all bitplane
    /// holding latches are copied into the live shift registers together.
    pub fn queue_shift_load_from_bpl1dat(&mut self) {
        for idx in 0..self.bpl_dat.len() {
            self.bpl_shift[idx] = self.bpl_dat[idx];
        }
    }

    #[must_use]
    fn num_bitplanes(&self) -> usize {
        usize::from((self.bplcon0 >> 12) & 0x07).min(self.bpl_shift.len())
    }

    fn shift_planes(&mut self) -> u8 {
        let num_bpl = self.num_bitplanes();
        let mut idx = 0u8;
        for (plane, shift) in self.bpl_shift.iter_mut().enumerate() {
            if plane < num_bpl && (*shift & 0x8000) != 0 {
                idx |= 1 << plane;
            }
            let refill = self.bpl_fifo[plane].pop_front().unwrap_or(0);
            *shift = (*shift << 1) | (refill >> 15);
        }
        idx
    }

    fn sprite_x(pos: u16, ctl: u16) -> u16 {
        ((pos & 0x00FF) << 1) | (ctl & 1)
    }

    fn sprite_vstart(pos: u16, ctl: u16) -> u16 {
        ((pos >> 8) & 0x00FF) | (((ctl >> 2) & 1) << 8)
    }

    fn sprite_vstop(ctl: u16) -> u16 {
        ((ctl >> 8) & 0x00FF) | (((ctl >> 1) & 1) << 8)
    }

    /// Raw 2-bit sprite colour code at this beam position, or 0 if the
    /// sprite is not active here.
    fn sprite_code(&self, sprite: usize, beam_x: u32, vpos: u16) -> u8 {
        let pos = self.spr_pos[sprite];
        let ctl = self.spr_ctl[sprite];
        let vstart = Self::sprite_vstart(pos, ctl);
        let vstop = Self::sprite_vstop(ctl);
        if vpos < vstart || vpos >= vstop {
            return 0;
        }
        let x0 = u32::from(Self::sprite_x(pos, ctl));
        let scale = u32::from(self.sprite_render_scale.max(1));
        let span = 16 * scale;
        if beam_x < x0 || beam_x >= x0 + span {
            return 0;
        }
        let bit = 15 - (beam_x - x0) / scale;
        let a = (self.spr_data[sprite] >> bit) & 1;
        let b = (self.spr_datb[sprite] >> bit) & 1;
        ((b << 1) | a) as u8
    }

    /// Composed sprite colour index (0 if transparent) and which of the
    /// four sprite-pair groups produced it, used for BPLCON2 priority.
    fn sprite_composite(&self, beam_x: u32, vpos: u16) -> (u8, Option<u8>) {
        for group in 0..4u8 {
            let even = usize::from(group) * 2;
            let odd = even + 1;
            let even_code = self.sprite_code(even, beam_x, vpos);
            let odd_code = self.sprite_code(odd, beam_x, vpos);
            let attached = (self.spr_ctl[odd] & 0x0080) != 0;
            let color = if attached {
                let combined = (odd_code << 2) | even_code;
                if combined == 0 {
                    0
                } else {
                    16 + combined
                }
            } else if even_code != 0 {
                16 + group * 4 + even_code
            } else if odd_code != 0 {
                16 + group * 4 + odd_code
            } else {
                0
            };
            if color != 0 {
                return (color, Some(group));
            }
        }
        (0, None)
    }

    fn ham_active(&self) -> bool {
        (self.bplcon0 & BPLCON0_HAM) != 0 && self.num_bitplanes() >= 5
    }

    fn ehb_active(&self) -> bool {
        self.num_bitplanes() == 6
            && (self.bplcon0 & BPLCON0_HAM) == 0
            && (self.bplcon0 & BPLCON0_DBLPF) == 0
    }

    fn apply_ham(&mut self, code: u8) -> u16 {
        let control = (code >> 4) & 0x3;
        let data = u16::from(code & 0x0F);
        self.ham_last = match control {
            0b01 => (self.ham_last & 0x0FF0) | data, // hold, modify blue nibble
            0b10 => (self.ham_last & 0x00FF) | (data << 8), // hold, modify red nibble
            0b11 => (self.ham_last & 0x0F0F) | (data << 4), // hold, modify green nibble
            _ => self.palette[usize::from(code) & 0x1F],
        };
        self.ham_last
    }

    fn halve_rgb12(rgb12: u16) -> u16 {
        let r = (rgb12 >> 8) & 0xF;
        let g = (rgb12 >> 4) & 0xF;
        let b = rgb12 & 0xF;
        ((r >> 1) << 8) | ((g >> 1) << 4) | (b >> 1)
    }

    /// Look up the resolved OCS/ECS 12-bit colour for a raw palette index
    /// as produced by `output_pixel_with_beam_and_playfield_gate`. Applies
    /// HAM hold-and-modify and EHB half-brite decoding; HAM carries state
    /// across calls, so callers must invoke this exactly once per distinct
    /// displayed pixel, in beam order.
    #[must_use]
    pub fn resolve_color_rgb12(&mut self, idx: u8) -> u16 {
        if self.ham_active() {
            self.apply_ham(idx)
        } else if self.ehb_active() && (idx & 0x20) != 0 {
            Self::halve_rgb12(self.palette[usize::from(idx) & 0x1F])
        } else {
            self.palette[usize::from(idx) & 0x1F]
        }
    }

    fn playfield_indices(&mut self, raw_idx: u8) -> (bool, u8, bool, u8) {
        let dual = (self.bplcon0 & BPLCON0_DBLPF) != 0;
        if !dual {
            return (raw_idx != 0, raw_idx, false, 0);
        }
        let mut pf1 = 0u8;
        let mut pf2 = 0u8;
        for plane in 0..3 {
            if (raw_idx >> (plane * 2)) & 1 != 0 {
                pf1 |= 1 << plane;
            }
            if (raw_idx >> (plane * 2 + 1)) & 1 != 0 {
                pf2 |= 1 << plane;
            }
        }
        (pf1 != 0, pf1, pf2 != 0, 8 + pf2)
    }

    fn compose(
        &mut self,
        sprite_opaque: bool,
        group: u8,
        sprite_idx: u8,
        pf1_opaque: bool,
        pf1_idx: u8,
        pf2_opaque: bool,
        pf2_idx: u8,
    ) -> u8 {
        let dual = (self.bplcon0 & BPLCON0_DBLPF) != 0;
        let pf1p = self.bplcon2 & 0x7;
        let pf2p = (self.bplcon2 >> 3) & 0x7;
        if !dual {
            if sprite_opaque && u16::from(group) < pf1p {
                return sprite_idx;
            }
            if pf1_opaque {
                return pf1_idx;
            }
            if sprite_opaque {
                return sprite_idx;
            }
            return 0;
        }
        let pf2pri = (self.bplcon2 & BPLCON2_PF2PRI) != 0;
        let (front_opaque, front_idx, front_p, back_opaque, back_idx, back_p) = if pf2pri {
            (pf2_opaque, pf2_idx, pf2p, pf1_opaque, pf1_idx, pf1p)
        } else {
            (pf1_opaque, pf1_idx, pf1p, pf2_opaque, pf2_idx, pf2p)
        };
        if sprite_opaque && u16::from(group) < front_p {
            return sprite_idx;
        }
        if front_opaque {
            return front_idx;
        }
        if sprite_opaque && u16::from(group) < back_p {
            return sprite_idx;
        }
        if back_opaque {
            return back_idx;
        }
        if sprite_opaque {
            return sprite_idx;
        }
        0
    }

    fn record_collisions(&mut self, sprite_group: Option<u8>, pf1_opaque: bool, pf2_opaque: bool) {
        let Some(group) = sprite_group else { return };
        if pf1_opaque {
            self.clxdat |= 0x02 << (group * 2);
        }
        if pf2_opaque {
            self.clxdat |= 0x04 << (group * 2);
        }
    }

    /// Compose the pixel at the given beam/display position from the
    /// current bitplane shift registers, sprite engine, and priority
    /// registers. `gate` disables playfield output (display-window
    /// blanking) while leaving sprites and background unaffected.
    pub fn output_pixel_with_beam_and_playfield_gate(
        &mut self,
        _x: u32,
        _y: u32,
        beam_x: u32,
        beam_y: u32,
        gate: bool,
    ) -> DeniseOutputPixelDebug {
        let hires = (self.bplcon0 & BPLCON0_HIRES) != 0;
        let shift_now = hires || self.lores_parity;
        self.lores_parity = !self.lores_parity;
        let raw_idx = if shift_now {
            self.shift_planes()
        } else {
            0
        };
        let raw_idx = if gate { raw_idx } else { 0 };

        let vpos = u16::try_from(beam_y).unwrap_or(u16::MAX);
        let (sprite_idx, sprite_group) = self.sprite_composite(beam_x, vpos);
        let sprite_opaque = sprite_idx != 0;

        let (pf1_opaque, pf1_idx, pf2_opaque, pf2_idx) = self.playfield_indices(raw_idx);
        self.record_collisions(sprite_group, pf1_opaque, pf2_opaque);

        let composed = self.compose(
            sprite_opaque,
            sprite_group.unwrap_or(0),
            sprite_idx,
            pf1_opaque,
            pf1_idx,
            pf2_opaque,
            pf2_idx,
        );

        DeniseOutputPixelDebug {
            hires_pair_color_idx: [composed, composed],
            sprite_group_hit: sprite_group,
        }
    }

    /// Write an already-resolved ARGB32 pixel into the beam-addressed
    /// raster buffer. `hpos`/`vpos` are raw CCK/line beam coordinates;
    /// `sub` (0..=3) selects one of the four quarter-CCK subpixel slots.
    pub fn write_raster_pixel(&mut self, hpos: u16, vpos: u16, sub: u8, argb32: u32) {
        let col = u32::from(hpos) * 4 + u32::from(sub);
        let field_offset = u32::from(self.interlace_active && self.lof);
        let row = u32::from(vpos) * 2 + field_offset;
        if col >= RASTER_FB_WIDTH || row >= self.raster_fb_height {
            return;
        }
        let index = (row * RASTER_FB_WIDTH + col) as usize;
        if let Some(pixel) = self.framebuffer_raster.get_mut(index) {
            *pixel = argb32;
        }
    }

    pub fn write_sprite_pos(&mut self, sprite: usize, word: u16) {
        if sprite < self.spr_pos.len() {
            self.spr_pos[sprite] = word;
        }
    }

    pub fn write_sprite_ctl(&mut self, sprite: usize, word: u16) {
        if sprite < self.spr_ctl.len() {
            self.spr_ctl[sprite] = word;
        }
    }

    pub fn write_sprite_data(&mut self, sprite: usize, word: u16) {
        if sprite < self.spr_data.len() {
            self.spr_data[sprite] = word;
        }
    }

    pub fn write_sprite_data_wide(&mut self, sprite: usize, words: &[u16]) {
        if let Some(&word) = words.last() {
            self.write_sprite_data(sprite, word);
        }
    }

    pub fn write_sprite_datb(&mut self, sprite: usize, word: u16) {
        if sprite < self.spr_datb.len() {
            self.spr_datb[sprite] = word;
        }
    }

    pub fn write_sprite_datb_wide(&mut self, sprite: usize, words: &[u16]) {
        if let Some(&word) = words.last() {
            self.write_sprite_datb(sprite, word);
        }
    }

    /// Read CLXDAT. Reading clears the latched collision bits.
    pub fn read_clxdat(&mut self) -> u16 {
        std::mem::take(&mut self.clxdat)
    }

    #[must_use]
    pub fn rgb12_to_argb32(rgb12: u16) -> u32 {
        let r = u32::from((rgb12 >> 8) & 0xF);
        let g = u32::from((rgb12 >> 4) & 0xF);
        let b = u32::from(rgb12 & 0xF);
        0xFF00_0000 | ((r << 4 | r) << 16) | ((g << 4 | g) << 8) | (b << 4 | b)
    }

    #[must_use]
    pub fn rgb24_to_argb32(rgb24: u32) -> u32 {
        0xFF00_0000 | (rgb24 & 0x00FF_FFFF)
    }

    /// Extract a cropped, display-ready image from the raster buffer.
    ///
    /// `pal` selects PAL vs NTSC line geometry; the third argument widens
    /// the crop by the border margin instead of cropping tight to the
    /// documented active display area, matching what most capture tools
    /// default to.
    #[must_use]
    pub fn extract_viewport(&self, preset: ViewportPreset, pal: bool, with_border: bool) -> Viewport {
        match preset {
            ViewportPreset::Standard => {
                let lines = if pal { 312u32 } else { 262u32 };
                let margin = if with_border { 8u32 } else { 0 };
                let width = FB_WIDTH + margin * 2;
                let height = (lines - 2 * 24).min(self.raster_fb_height / 2);
                let mut pixels = vec![0xFF00_0000u32; (width * height) as usize];
                let row_start = 24u32 * 2;
                let col_start = (RASTER_FB_WIDTH.saturating_sub(width * 2)) / 2;
                for y in 0..height {
                    let raster_row = row_start + y * 2;
                    if raster_row >= self.raster_fb_height {
                        break;
                    }
                    for x in 0..width {
                        let raster_col = col_start + x * 2;
                        if raster_col >= RASTER_FB_WIDTH {
                            break;
                        }
                        let src = (raster_row * RASTER_FB_WIDTH + raster_col) as usize;
                        if let Some(&pixel) = self.framebuffer_raster.get(src) {
                            pixels[(y * width + x) as usize] = pixel;
                        }
                    }
                }
                Viewport {
                    width,
                    height,
                    pixels,
                }
            }
        }
    }
}

impl Default for DeniseOcs {
    fn default() -> Self {
        Self::new()
    }
}
