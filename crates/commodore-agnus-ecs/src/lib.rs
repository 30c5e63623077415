//! Thin Commodore Super Agnus (ECS) wrapper crate.
//!
//! This crate starts the ECS path as a composition layer over the existing OCS
//! Agnus implementation. It preserves current behavior while giving us a place
//! to add ECS-specific DMA/register/timing deltas incrementally.

use std::ops::{Deref, DerefMut};

pub use commodore_agnus_ocs::Agnus as InnerAgnusOcs;
pub use commodore_agnus_ocs::{
    BlitterDmaOp, CckBusPlan, Copper, CopperState, LOWRES_DDF_TO_PLANE, PAL_CCKS_PER_LINE,
    PAL_LINES_PER_FRAME, PaulaReturnProgressPolicy, SlotOwner,
};

// BEAMCON0 bit assignments (ECS programmable sync/blank control).
const BEAMCON0_CSCBEN: u16 = 0x0010;
const BEAMCON0_VARCSYEN: u16 = 0x0020;
const BEAMCON0_VARHSYEN: u16 = 0x0040;
const BEAMCON0_VARVSYEN: u16 = 0x0080;
const BEAMCON0_HSYTRUE: u16 = 0x0400;
const BEAMCON0_VSYTRUE: u16 = 0x0800;
const BEAMCON0_CSYTRUE: u16 = 0x1000;
const BEAMCON0_BLANKEN: u16 = 0x2000;

/// Thin ECS wrapper that currently reuses the OCS Agnus implementation.
pub struct AgnusEcs {
    inner: InnerAgnusOcs,
    beamcon0: u16,
    diwhigh: u16,
    diwhigh_written: bool,
    htotal: u16,
    hsstop: u16,
    hbstrt: u16,
    hbstop: u16,
    vtotal: u16,
    vsstop: u16,
    vbstrt: u16,
    vbstop: u16,
    hsstrt: u16,
    vsstrt: u16,
}

impl AgnusEcs {
    /// Create a new ECS Agnus wrapper.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: InnerAgnusOcs::new(),
            beamcon0: 0,
            diwhigh: 0,
            diwhigh_written: false,
            htotal: 0,
            hsstop: 0,
            hbstrt: 0,
            hbstop: 0,
            vtotal: 0,
            vsstop: 0,
            vbstrt: 0,
            vbstop: 0,
            hsstrt: 0,
            vsstrt: 0,
        }
    }

    /// Wrap an existing OCS Agnus core while starting ECS extension registers
    /// from reset state. Useful for behavior-identical OCS paths that route
    /// through the ECS wrapper constructor during Phase 3 bring-up.
    #[must_use]
    pub fn from_ocs(inner: InnerAgnusOcs) -> Self {
        Self {
            inner,
            beamcon0: 0,
            diwhigh: 0,
            diwhigh_written: false,
            htotal: 0,
            hsstop: 0,
            hbstrt: 0,
            hbstop: 0,
            vtotal: 0,
            vsstop: 0,
            vbstrt: 0,
            vbstop: 0,
            hsstrt: 0,
            vsstrt: 0,
        }
    }

    /// Borrow the wrapped OCS Agnus core.
    #[must_use]
    pub const fn as_inner(&self) -> &InnerAgnusOcs {
        &self.inner
    }

    /// Mutably borrow the wrapped OCS Agnus core.
    #[must_use]
    pub fn as_inner_mut(&mut self) -> &mut InnerAgnusOcs {
        &mut self.inner
    }

    /// Consume the wrapper and return the wrapped OCS Agnus core.
    #[must_use]
    pub fn into_inner(self) -> InnerAgnusOcs {
        self.inner
    }

    /// ECS `BEAMCON0` latch (register semantics are not fully modeled yet).
    #[must_use]
    pub const fn beamcon0(&self) -> u16 {
        self.beamcon0
    }

    /// Store ECS `BEAMCON0` for later timing/beam model work.
    pub fn write_beamcon0(&mut self, val: u16) {
        self.beamcon0 = val;
    }

    /// ECS `DIWHIGH` latch (used by ECS display window extensions).
    #[must_use]
    pub const fn diwhigh(&self) -> u16 {
        self.diwhigh
    }

    /// Store ECS `DIWHIGH` for later extended DIW timing/composition work.
    pub fn write_diwhigh(&mut self, val: u16) {
        self.diwhigh = val;
        self.diwhigh_written = true;
    }

    /// `true` once `DIWHIGH` has been written at least once. Until then the
    /// display window decodes using the legacy OCS implicit H8/V8 scheme.
    #[must_use]
    pub const fn diwhigh_written(&self) -> bool {
        self.diwhigh_written
    }

    /// Total horizontal line length, in CCKs (`HTOTAL`).
    #[must_use]
    pub const fn htotal(&self) -> u16 {
        self.htotal
    }

    /// Store `HTOTAL`.
    pub fn write_htotal(&mut self, val: u16) {
        self.htotal = val;
    }

    /// Horizontal sync stop position (`HSSTOP`).
    #[must_use]
    pub const fn hsstop(&self) -> u16 {
        self.hsstop
    }

    /// Store `HSSTOP`.
    pub fn write_hsstop(&mut self, val: u16) {
        self.hsstop = val;
    }

    /// Horizontal sync start position (`HSSTRT`).
    #[must_use]
    pub const fn hsstrt(&self) -> u16 {
        self.hsstrt
    }

    /// Store `HSSTRT`.
    pub fn write_hsstrt(&mut self, val: u16) {
        self.hsstrt = val;
    }

    /// Horizontal blank start position (`HBSTRT`).
    #[must_use]
    pub const fn hbstrt(&self) -> u16 {
        self.hbstrt
    }

    /// Store `HBSTRT`.
    pub fn write_hbstrt(&mut self, val: u16) {
        self.hbstrt = val;
    }

    /// Horizontal blank stop position (`HBSTOP`).
    #[must_use]
    pub const fn hbstop(&self) -> u16 {
        self.hbstop
    }

    /// Store `HBSTOP`.
    pub fn write_hbstop(&mut self, val: u16) {
        self.hbstop = val;
    }

    /// Total vertical line count (`VTOTAL`).
    #[must_use]
    pub const fn vtotal(&self) -> u16 {
        self.vtotal
    }

    /// Store `VTOTAL`.
    pub fn write_vtotal(&mut self, val: u16) {
        self.vtotal = val;
    }

    /// Vertical sync stop position (`VSSTOP`).
    #[must_use]
    pub const fn vsstop(&self) -> u16 {
        self.vsstop
    }

    /// Store `VSSTOP`.
    pub fn write_vsstop(&mut self, val: u16) {
        self.vsstop = val;
    }

    /// Vertical sync start position (`VSSTRT`).
    #[must_use]
    pub const fn vsstrt(&self) -> u16 {
        self.vsstrt
    }

    /// Store `VSSTRT`.
    pub fn write_vsstrt(&mut self, val: u16) {
        self.vsstrt = val;
    }

    /// Vertical blank start position (`VBSTRT`).
    #[must_use]
    pub const fn vbstrt(&self) -> u16 {
        self.vbstrt
    }

    /// Store `VBSTRT`.
    pub fn write_vbstrt(&mut self, val: u16) {
        self.vbstrt = val;
    }

    /// Vertical blank stop position (`VBSTOP`).
    #[must_use]
    pub const fn vbstop(&self) -> u16 {
        self.vbstop
    }

    /// Store `VBSTOP`.
    pub fn write_vbstop(&mut self, val: u16) {
        self.vbstop = val;
    }

    /// `true` when `BEAMCON0.VARHSYEN` selects the programmable horizontal
    /// sync window over the fixed OCS timing.
    #[must_use]
    pub const fn varhsyen_enabled(&self) -> bool {
        self.beamcon0 & BEAMCON0_VARHSYEN != 0
    }

    /// `true` when `BEAMCON0.VARVSYEN` selects the programmable vertical
    /// sync window over the fixed OCS timing.
    #[must_use]
    pub const fn varvsyen_enabled(&self) -> bool {
        self.beamcon0 & BEAMCON0_VARVSYEN != 0
    }

    /// `true` when `BEAMCON0.VARCSYEN` selects the programmable composite
    /// sync source.
    #[must_use]
    pub const fn varcsyen_enabled(&self) -> bool {
        self.beamcon0 & BEAMCON0_VARCSYEN != 0
    }

    /// Polarity of the HSYNC output pin when `BEAMCON0.HSYTRUE` is set.
    #[must_use]
    pub const fn hsytrue_enabled(&self) -> bool {
        self.beamcon0 & BEAMCON0_HSYTRUE != 0
    }

    /// Polarity of the VSYNC output pin when `BEAMCON0.VSYTRUE` is set.
    #[must_use]
    pub const fn vsytrue_enabled(&self) -> bool {
        self.beamcon0 & BEAMCON0_VSYTRUE != 0
    }

    /// Polarity of the composite sync output when `BEAMCON0.CSYTRUE` is set.
    #[must_use]
    pub const fn csytrue_enabled(&self) -> bool {
        self.beamcon0 & BEAMCON0_CSYTRUE != 0
    }

    /// `true` when `BEAMCON0.CSCBEN` redirects composite sync to the CSY pin.
    #[must_use]
    pub const fn cscben_enabled(&self) -> bool {
        self.beamcon0 & BEAMCON0_CSCBEN != 0
    }

    /// `true` when `BEAMCON0.BLANKEN` enables the programmable blank output.
    #[must_use]
    pub const fn blanken_enabled(&self) -> bool {
        self.beamcon0 & BEAMCON0_BLANKEN != 0
    }

    /// `true` while `hpos_cck` falls inside the programmable `HSSTRT..HSSTOP`
    /// sync window. Returns `false` (never active) until both registers have
    /// been programmed to distinct values.
    #[must_use]
    pub fn hsync_window_active(&self, hpos_cck: u16) -> bool {
        Self::window_active(self.hsstrt, self.hsstop, hpos_cck)
    }

    /// `true` while `vpos` falls inside the programmable `VSSTRT..VSSTOP`
    /// sync window.
    #[must_use]
    pub fn vsync_window_active(&self, vpos: u16) -> bool {
        Self::window_active(self.vsstrt, self.vsstop, vpos)
    }

    /// `true` while `hpos_cck` falls inside the programmable `HBSTRT..HBSTOP`
    /// blank window.
    #[must_use]
    pub fn hblank_window_active(&self, hpos_cck: u16) -> bool {
        Self::window_active(self.hbstrt, self.hbstop, hpos_cck)
    }

    /// `true` while `vpos` falls inside the programmable `VBSTRT..VBSTOP`
    /// blank window.
    #[must_use]
    pub fn vblank_window_active(&self, vpos: u16) -> bool {
        Self::window_active(self.vbstrt, self.vbstop, vpos)
    }

    /// Wrapping `[start, stop)` range test shared by the sync/blank window
    /// helpers above. Identical start/stop (including the reset default of
    /// `0`/`0`) means the window has not been programmed, so it is reported
    /// as never active.
    fn window_active(start: u16, stop: u16, pos: u16) -> bool {
        if start == stop {
            return false;
        }
        if start < stop {
            pos >= start && pos < stop
        } else {
            pos >= start || pos < stop
        }
    }
}

impl Default for AgnusEcs {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for AgnusEcs {
    type Target = InnerAgnusOcs;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for AgnusEcs {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl From<AgnusEcs> for InnerAgnusOcs {
    fn from(agnus: AgnusEcs) -> Self {
        agnus.into_inner()
    }
}
