//! Event slot scheduler — the literal §3/§4.1 data model and contract.
//!
//! The rest of this crate (and `amiga-core`) drives Agnus forward with a
//! direct per-CCK derivation of DMA ownership (see `agnus.rs`), which is
//! faster and was the architecture this codebase was already built around.
//! This module provides the slot-array event scheduler described by the
//! specification verbatim — a fixed-size array of event *slots* grouped into
//! primary/secondary/tertiary tiers with a gate-slot invariant — for the
//! handful of consumers (interrupt-source promises, disk mechanical delays,
//! inspector polling) that are naturally expressed as "do X at cycle Y"
//! rather than as a per-CCK table lookup.
//!
//! A cycle here is a master clock tick (`Cycle`, a signed 64-bit count);
//! `NEVER` is the sentinel used for "no event pending".

/// A tick of the ~28 MHz master clock. Signed so cycle arithmetic (deltas,
/// comparisons against sentinels) never needs a wrapping check.
pub type Cycle = i64;

/// Sentinel trigger cycle meaning "this slot holds no pending event".
pub const NEVER: Cycle = i64::MAX;

/// Per-slot event id namespace marker: zero always means empty.
pub const EVENT_NONE: u32 = 0;

pub const PRIMARY_SLOTS: usize = 8;
pub const SECONDARY_SLOTS: usize = 13;
pub const TERTIARY_SLOTS: usize = 10;

// Primary slot indices (§3).
pub const REG_CHANGE_SLOT: usize = 0;
pub const CIA_A_SLOT: usize = 1;
pub const CIA_B_SLOT: usize = 2;
pub const BPL_SLOT: usize = 3;
pub const DAS_SLOT: usize = 4;
pub const COPPER_SLOT: usize = 5;
pub const BLITTER_SLOT: usize = 6;
pub const SEC_GATE_SLOT: usize = 7;

// Secondary slot indices (§3). Serial TX and RX share one slot index; the
// event id distinguishes which half of the UART fired.
pub const AUD0_SLOT: usize = 0;
pub const AUD1_SLOT: usize = 1;
pub const AUD2_SLOT: usize = 2;
pub const AUD3_SLOT: usize = 3;
pub const DISK_SLOT: usize = 4;
pub const VBLANK_SLOT: usize = 5;
pub const IRQ_CHECK_SLOT: usize = 6;
pub const IRQ_PIPELINE_SLOT: usize = 7;
pub const KEYBOARD_SLOT: usize = 8;
pub const SERIAL_SLOT: usize = 9;
pub const POTGO_SLOT: usize = 10;
pub const RASTERLINE_END_SLOT: usize = 11;
pub const TERT_GATE_SLOT: usize = 12;

// Tertiary slot indices (§3), one per drive/port plus the named singletons.
pub const DISK_CHANGE_SLOT: [usize; 4] = [0, 1, 2, 3];
pub const MOUSE_SLOT: [usize; 2] = [4, 5];
pub const AUTOTYPE_SLOT: usize = 6;
pub const REMOTE_SERVER_SLOT: usize = 7;
pub const INSPECTOR_SLOT: usize = 8;
pub const SNAPSHOT_SLOT: usize = 9;

/// Which tier a slot index belongs to. Needed because scheduling a secondary
/// or tertiary slot must also min-update the gate slot(s) above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Primary,
    Secondary,
    Tertiary,
}

/// One pending (or empty) event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub trigger: Cycle,
    pub id: u32,
    pub data: i64,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            trigger: NEVER,
            id: EVENT_NONE,
            data: 0,
        }
    }
}

/// The slot-array scheduler. Owns all three tiers and the `next_trigger`
/// cache (the min of all primary trigger cycles, §4.1 and §8 property 2).
pub struct Scheduler {
    pub clock: Cycle,
    pub primary: [Slot; PRIMARY_SLOTS],
    pub secondary: [Slot; SECONDARY_SLOTS],
    pub tertiary: [Slot; TERTIARY_SLOTS],
    next_trigger: Cycle,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: 0,
            primary: [Slot::default(); PRIMARY_SLOTS],
            secondary: [Slot::default(); SECONDARY_SLOTS],
            tertiary: [Slot::default(); TERTIARY_SLOTS],
            next_trigger: NEVER,
        }
    }

    /// §8 property 2: `next_trigger` must always equal the minimum trigger
    /// cycle among the primary slots.
    #[must_use]
    pub fn next_trigger(&self) -> Cycle {
        self.next_trigger
    }

    fn recompute_next_trigger(&mut self) {
        self.next_trigger = self.primary.iter().map(|s| s.trigger).min().unwrap_or(NEVER);
    }

    /// §8 property 3: the secondary-gate slot's trigger must equal the min of
    /// all secondary slots' triggers; the tertiary-gate slot likewise for
    /// tertiary. Recomputed from scratch (cheap, n ≤ 13) so that both
    /// tightening (a new near event) and loosening (a cancelled near event)
    /// keep the gates exactly in sync rather than merely conservative —
    /// otherwise a cancelled event can wedge a gate open forever.
    /// Tertiary is resynced first so its result feeds into the secondary
    /// gate's own minimum (the tertiary-gate slot is itself a secondary slot).
    fn resync_gates(&mut self) {
        let min_tertiary = self.tertiary.iter().map(|s| s.trigger).min().unwrap_or(NEVER);
        self.secondary[TERT_GATE_SLOT].trigger = min_tertiary;
        self.secondary[TERT_GATE_SLOT].id = if min_tertiary == NEVER { EVENT_NONE } else { 1 };

        let min_secondary = self.secondary.iter().map(|s| s.trigger).min().unwrap_or(NEVER);
        self.primary[SEC_GATE_SLOT].trigger = min_secondary;
        self.primary[SEC_GATE_SLOT].id = if min_secondary == NEVER { EVENT_NONE } else { 1 };
    }

    fn slot_mut(&mut self, group: Group, idx: usize) -> &mut Slot {
        match group {
            Group::Primary => &mut self.primary[idx],
            Group::Secondary => &mut self.secondary[idx],
            Group::Tertiary => &mut self.tertiary[idx],
        }
    }

    /// §4.1 `schedule_abs`.
    pub fn schedule_abs(&mut self, group: Group, idx: usize, cycle: Cycle, id: u32, data: i64) {
        {
            let slot = self.slot_mut(group, idx);
            slot.trigger = cycle;
            slot.id = id;
            slot.data = data;
        }
        match group {
            Group::Primary => {
                if cycle < self.next_trigger {
                    self.next_trigger = cycle;
                }
            }
            Group::Secondary | Group::Tertiary => {
                self.resync_gates();
                self.recompute_next_trigger();
            }
        }
    }

    /// §4.1 `schedule_rel`: relative to the current clock.
    pub fn schedule_rel(&mut self, group: Group, idx: usize, delta: Cycle, id: u32, data: i64) {
        self.schedule_abs(group, idx, self.clock + delta, id, data);
    }

    /// §4.1 `schedule_inc`: relative to the slot's own previous trigger.
    pub fn schedule_inc(&mut self, group: Group, idx: usize, delta: Cycle, id: u32, data: i64) {
        let base = self.slot_mut(group, idx).trigger;
        let base = if base == NEVER { self.clock } else { base };
        self.schedule_abs(group, idx, base + delta, id, data);
    }

    /// §4.1 `cancel`.
    pub fn cancel(&mut self, group: Group, idx: usize) {
        let slot = self.slot_mut(group, idx);
        slot.trigger = NEVER;
        slot.id = EVENT_NONE;
        slot.data = 0;
        match group {
            Group::Primary => self.recompute_next_trigger(),
            Group::Secondary | Group::Tertiary => {
                self.resync_gates();
                self.recompute_next_trigger();
            }
        }
    }

    /// Dispatch every due event (trigger ≤ `target`) in strictly nondecreasing
    /// trigger-cycle order, ties broken by slot index, then advance
    /// `self.clock` to `target` (§4.1, §8 property 6). The handler is given
    /// the group/index/id/data of the due slot; it is responsible for
    /// rescheduling or cancelling the slot as its own logic requires —
    /// the scheduler does not auto-clear a dispatched slot.
    pub fn execute_until<F>(&mut self, target: Cycle, mut handler: F)
    where
        F: FnMut(&mut Scheduler, Group, usize, u32, i64),
    {
        while self.next_trigger <= target {
            let Some((group, idx)) = self.earliest_due() else {
                break;
            };
            let slot = *self.slot_mut(group, idx);
            self.clock = slot.trigger;
            handler(self, group, idx, slot.id, slot.data);
            self.recompute_next_trigger();
        }
        if self.clock < target {
            self.clock = target;
        }
    }

    /// Finds the earliest-due dispatchable event, honoring the gate
    /// contract: secondary slots are only inspected when the secondary-gate
    /// slot is itself due, likewise tertiary behind the tertiary-gate. The
    /// gate slots themselves are bookkeeping only — they never surface as a
    /// dispatchable event in their own right, only as the condition that
    /// opens up the tier below them.
    fn earliest_due(&self) -> Option<(Group, usize)> {
        let mut best: Option<(Group, usize, Cycle)> = None;
        let mut consider = |group, idx, trigger: Cycle, best: &mut Option<(Group, usize, Cycle)>| {
            if trigger == NEVER {
                return;
            }
            match *best {
                Some((_, _, t)) if t <= trigger => {}
                _ => *best = Some((group, idx, trigger)),
            }
        };

        for (idx, slot) in self.primary.iter().enumerate() {
            if idx == SEC_GATE_SLOT {
                continue;
            }
            consider(Group::Primary, idx, slot.trigger, &mut best);
        }

        if self.primary[SEC_GATE_SLOT].trigger <= self.next_trigger {
            for (idx, slot) in self.secondary.iter().enumerate() {
                if idx == TERT_GATE_SLOT {
                    continue;
                }
                consider(Group::Secondary, idx, slot.trigger, &mut best);
            }
            if self.secondary[TERT_GATE_SLOT].trigger <= self.next_trigger {
                for (idx, slot) in self.tertiary.iter().enumerate() {
                    consider(Group::Tertiary, idx, slot.trigger, &mut best);
                }
            }
        }

        best.map(|(g, i, _)| (g, i))
    }
}
