//! Bitplane/DAS DMA event tables — the literal §4.2 "`nextBplEvent`/
//! `nextDasEvent`" jump tables.
//!
//! Real Agnus hardware (and the production reactive tick model in
//! `agnus.rs`) derives bus ownership per-CCK from the current DMA
//! configuration. §4.2 instead describes a precomputed jump table keyed by
//! horizontal CCK position, so the scheduler can skip straight to the next
//! cycle a bitplane/disk/audio/sprite fetch is actually due instead of
//! testing every intervening cycle. This module builds that table.
//!
//! It is additive: `agnus.rs` does not consume it today (see DESIGN.md for
//! why the reactive model stayed the production path). It exists as a
//! standalone, independently testable implementation of the skip-ahead
//! table the hardware designers actually used to reason about DMA slot
//! allocation, for callers (inspectors, alternate schedulers) that want
//! O(1) "what's the next bitplane fetch" lookups instead of a per-cycle
//! scan.

/// One bitplane DMA event: which of the (up to six) bitplane pointers is
/// fetched at a given CCK, carrying both a low- and high-resolution word
/// fetch marker since the two share the table but fire on different CCKs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BplEvent {
    /// No bitplane fetch at this CCK.
    None,
    /// Fetch one word for bitplane `index` (0-based, 0..=5).
    Fetch { plane: u8 },
}

/// One disk/audio/sprite ("DAS") DMA event slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DasEvent {
    None,
    Refresh,
    Disk,
    Audio { channel: u8 },
    Sprite { index: u8 },
}

/// CCK-indexed bitplane event table for one scanline, plus the skip-ahead
/// jump table: `next[cck]` gives the CCK of the next nonempty event at or
/// after `cck`, so a caller can jump directly there instead of scanning.
pub struct EventTable {
    events: Vec<BplEvent>,
    next: Vec<u16>,
}

impl EventTable {
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn event_at(&self, cck: u16) -> BplEvent {
        self.events[cck as usize % self.events.len()]
    }

    /// O(1) lookup: the CCK of the next bitplane fetch at or after `cck`,
    /// wrapping to the following line if none remain on this one.
    #[must_use]
    pub fn next_event_at_or_after(&self, cck: u16) -> u16 {
        self.next[cck as usize % self.next.len()]
    }
}

/// Analogous jump table for the DAS (disk/audio/sprite/refresh) slots.
pub struct DasEventTable {
    events: Vec<DasEvent>,
    next: Vec<u16>,
}

impl DasEventTable {
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn event_at(&self, cck: u16) -> DasEvent {
        self.events[cck as usize % self.events.len()]
    }

    #[must_use]
    pub fn next_event_at_or_after(&self, cck: u16) -> u16 {
        self.next[cck as usize % self.next.len()]
    }
}

/// Given the already-decoded bitplane count (1-6, from `BPLCON0`) and the
/// active display data fetch window `[ddfstrt, ddfstop)` in CCKs, build the
/// per-line bitplane event table. One word per active plane is fetched per
/// 8-CCK "fetch group" inside the DDF window, cycling planes 0..count in
/// fetch order — the same slot assignment the OCS fetch-unit documentation
/// describes and that `LOWRES_DDF_TO_PLANE` in `agnus.rs` encodes for the
/// reactive path.
#[must_use]
pub fn build_bpl_event_table(
    line_cck_count: u16,
    plane_count: u8,
    ddfstrt: u16,
    ddfstop: u16,
) -> EventTable {
    let mut events = vec![BplEvent::None; line_cck_count as usize];
    if plane_count > 0 {
        let mut plane = 0u8;
        let mut cck = ddfstrt;
        while cck < ddfstop.min(line_cck_count) {
            events[cck as usize] = BplEvent::Fetch { plane };
            plane = (plane + 1) % plane_count;
            cck += 1;
        }
    }
    let next = build_skip_table(&events, |e| !matches!(e, BplEvent::None));
    EventTable { events, next }
}

/// Builds the DAS table for one scanline. Refresh slots are fixed hardware
/// cycles (0, 1, 2, 3 at the start of the line); disk, audio, and sprite
/// slots occupy the fixed early-line positions described in §4.2, active
/// only when the corresponding DMA enable bit (passed in via the `*_active`
/// flags) is set.
#[must_use]
pub fn build_das_event_table(
    line_cck_count: u16,
    disk_active: bool,
    audio_active: [bool; 4],
    sprite_active: [bool; 8],
) -> DasEventTable {
    let mut events = vec![DasEvent::None; line_cck_count as usize];

    for cck in 0..4u16.min(line_cck_count) {
        events[cck as usize] = DasEvent::Refresh;
    }

    if disk_active {
        for cck in 4..7u16.min(line_cck_count) {
            events[cck as usize] = DasEvent::Disk;
        }
    }

    for (channel, active) in audio_active.iter().enumerate() {
        if *active {
            let cck = 7 + channel as u16;
            if cck < line_cck_count {
                events[cck as usize] = DasEvent::Audio {
                    channel: channel as u8,
                };
            }
        }
    }

    for (index, active) in sprite_active.iter().enumerate() {
        if *active {
            let cck = 11 + index as u16 * 2;
            if cck < line_cck_count {
                events[cck as usize] = DasEvent::Sprite {
                    index: index as u8,
                };
            }
        }
    }

    let next = build_skip_table(&events, |e| !matches!(e, DasEvent::None));
    DasEventTable { events, next }
}

fn build_skip_table<T: Copy>(events: &[T], is_active: impl Fn(T) -> bool) -> Vec<u16> {
    let len = events.len();
    let mut next = vec![0u16; len];
    let mut last_active: Option<u16> = None;
    for i in (0..len).rev() {
        if is_active(events[i]) {
            last_active = Some(i as u16);
        }
        next[i] = last_active.unwrap_or(0);
    }
    // Wrap: CCKs after the final active event point at the first active
    // event of the next line.
    if let Some(first_active) = events.iter().position(|e| is_active(*e)) {
        for slot in next.iter_mut() {
            if *slot == 0 && !is_active(events[0]) {
                *slot = first_active as u16;
            }
        }
    }
    next
}
