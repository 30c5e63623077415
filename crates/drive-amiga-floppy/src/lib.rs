//! Amiga floppy drive mechanism emulator.
//!
//! Emulates the physical drive: head positioning, motor control, disk
//! change detection, and MFM track encoding. Control signals come from
//! CIA-B port B; status signals feed back to CIA-A port A.

pub mod mfm;

use format_adf::Adf;
use mfm::{decode_mfm_track, encode_mfm_track};

/// E-clock ticks for motor spin-up (~500ms at 709 kHz).
const MOTOR_SPINUP_TICKS: u32 = 350_000;

/// Drive status bits for CIA-A PRA (active-low: 0 = asserted).
pub struct DriveStatus {
    /// PA2: /DSKCHANGE — low when disk has been removed since last step.
    pub disk_change: bool,
    /// PA3: /DSKPROT — low when disk is write-protected.
    pub write_protect: bool,
    /// PA4: /DSKTRACK0 — low when head is at cylinder 0.
    pub track0: bool,
    /// PA5: /DSKRDY — low when motor is at speed.
    pub ready: bool,
}

pub struct AmigaFloppyDrive {
    disk: Option<Adf>,
    cylinder: u32,
    head: u32,
    motor_on: bool,
    motor_spinning: bool,
    spin_timer: u32,
    selected: bool,
    disk_changed: bool,
    prev_step: bool,
    /// Lazily (re-)encoded MFM bitstream for the track currently under the head.
    track_buf: Option<Vec<u8>>,
    /// Word cursor into `track_buf`, in units of 16-bit MFM words.
    bit_cursor: usize,
    /// Set when a DMA write has landed in `track_buf`; forces a re-decode
    /// into the backing ADF image before the head leaves the track.
    track_dirty: bool,
    /// MFM words captured from the Agnus disk DMA write path (§4.10),
    /// independent of the cursor-based `write_mfm_word` path used by direct
    /// streaming tests. Committed to the backing ADF image on
    /// `flush_write_capture`.
    write_capture: Vec<u8>,
}

impl AmigaFloppyDrive {
    pub fn new() -> Self {
        Self {
            disk: None,
            cylinder: 0,
            head: 0,
            motor_on: false,
            motor_spinning: false,
            spin_timer: 0,
            selected: false,
            disk_changed: true, // No disk at power-on
            prev_step: true,    // Active-low: idle = high
            track_buf: None,
            bit_cursor: 0,
            track_dirty: false,
            write_capture: Vec::new(),
        }
    }

    pub fn insert_disk(&mut self, adf: Adf) {
        self.disk = Some(adf);
        self.disk_changed = false;
        self.track_buf = None;
        self.track_dirty = false;
    }

    pub fn eject_disk(&mut self) {
        self.flush_track();
        self.disk = None;
        self.disk_changed = true;
    }

    /// Update control signals from CIA-B PRB.
    /// All active-low: the boolean parameters are true when the signal
    /// is asserted (pin driven low).
    pub fn update_control(
        &mut self,
        step: bool,
        dir_inward: bool,
        side_upper: bool,
        sel: bool,
        motor: bool,
    ) {
        // Drive select latches motor state (active-low select)
        if sel {
            self.selected = true;
            self.motor_on = motor;
            if motor && !self.motor_spinning {
                self.spin_timer = 0;
            }
            if !motor {
                self.motor_spinning = false;
                self.spin_timer = 0;
            }
        } else {
            self.selected = false;
        }

        // Head side: 0 = upper (head 1), 1 = lower (head 0)
        // The parameter is already decoded: side_upper = true means DSKSIDE* asserted (low)
        let new_head = if side_upper { 1 } else { 0 };
        if new_head != self.head {
            self.flush_track();
        }
        self.head = new_head;

        // Step on falling edge (prev was high/deasserted, now low/asserted)
        let step_edge = step && !self.prev_step;
        self.prev_step = step;

        if step_edge {
            self.flush_track();
            if dir_inward {
                if self.cylinder < 79 {
                    self.cylinder += 1;
                }
            } else if self.cylinder > 0 {
                self.cylinder -= 1;
            }
            // Any step pulse clears DSKCHANGE when a disk is present
            if self.disk.is_some() {
                self.disk_changed = false;
            }
        }
    }

    /// Write back any dirty in-flight track buffer to the backing ADF image
    /// and drop it, so the next word read/write re-encodes the new track.
    fn flush_track(&mut self) {
        if self.track_dirty {
            if let (Some(buf), Some(adf)) = (self.track_buf.take(), self.disk.as_mut()) {
                let decoded = decode_mfm_track(&buf, adf.sectors_per_track());
                for sector in 0..adf.sectors_per_track() {
                    let start = sector as usize * 512;
                    adf.write_sector(
                        self.cylinder,
                        self.head,
                        sector,
                        &decoded[start..start + 512],
                    );
                }
            }
            self.track_dirty = false;
        }
        self.track_buf = None;
        self.bit_cursor = 0;
    }

    fn ensure_track_loaded(&mut self) {
        if self.track_buf.is_none() {
            if let Some(adf) = self.disk.as_ref() {
                let track_num = (self.cylinder * 2 + self.head) as u8;
                let sectors = adf.read_track_sectors(self.cylinder, self.head);
                self.track_buf = Some(encode_mfm_track(sectors, track_num, adf.sectors_per_track()));
                self.bit_cursor = 0;
            }
        }
    }

    /// Read the next 16-bit MFM word from the current track and advance the
    /// cursor, wrapping at the end of the track. Returns `None` with no
    /// disk inserted.
    pub fn read_mfm_word(&mut self) -> Option<u16> {
        self.ensure_track_loaded();
        let buf = self.track_buf.as_ref()?;
        let word_count = buf.len() / 2;
        if word_count == 0 {
            return None;
        }
        let idx = (self.bit_cursor % word_count) * 2;
        let word = u16::from_be_bytes([buf[idx], buf[idx + 1]]);
        self.bit_cursor = (self.bit_cursor + 1) % word_count;
        Some(word)
    }

    /// Write a 16-bit MFM word at the current cursor and advance it,
    /// wrapping at the end of the track. No-op with no disk inserted.
    pub fn write_mfm_word(&mut self, value: u16) {
        self.ensure_track_loaded();
        let Some(buf) = self.track_buf.as_mut() else { return };
        let word_count = buf.len() / 2;
        if word_count == 0 {
            return;
        }
        let idx = (self.bit_cursor % word_count) * 2;
        let bytes = value.to_be_bytes();
        buf[idx] = bytes[0];
        buf[idx + 1] = bytes[1];
        self.bit_cursor = (self.bit_cursor + 1) % word_count;
        self.track_dirty = true;
    }

    /// Append one MFM word to the Agnus DMA write capture buffer. Unlike
    /// `write_mfm_word`, this does not touch the cursor-based `track_buf` —
    /// the machine's disk DMA slot service streams a whole block this way,
    /// then calls `flush_write_capture` once the transfer completes.
    pub fn note_write_mfm_word(&mut self, value: u16) {
        self.write_capture.extend_from_slice(&value.to_be_bytes());
    }

    /// Decode the captured DMA write stream and commit it to the backing ADF
    /// image at the current cylinder/head, then clear the capture buffer.
    /// No-op with no disk inserted or an empty capture.
    pub fn flush_write_capture(&mut self) {
        if self.write_capture.is_empty() {
            return;
        }
        let captured = std::mem::take(&mut self.write_capture);
        let Some(adf) = self.disk.as_mut() else {
            return;
        };
        let sectors_per_track = adf.sectors_per_track();
        let decoded = decode_mfm_track(&captured, sectors_per_track);
        let sector_bytes = 512usize;
        let available_sectors = decoded.len() / sector_bytes;
        for sector in 0..sectors_per_track.min(available_sectors as u32) {
            let start = sector as usize * sector_bytes;
            adf.write_sector(
                self.cylinder,
                self.head,
                sector,
                &decoded[start..start + sector_bytes],
            );
        }
        // The in-flight cursor-based track buffer (if any) is now stale.
        self.track_buf = None;
        self.bit_cursor = 0;
        self.track_dirty = false;
    }

    /// Return the backing ADF image's raw bytes, or `None` if no disk is
    /// inserted. Reflects whatever has already been committed via
    /// `flush_write_capture`/stepping off a dirty track; callers that need a
    /// fully up-to-date snapshot mid-track should step or eject first.
    #[must_use]
    pub fn save_adf(&self) -> Option<Vec<u8>> {
        self.disk.as_ref().map(|adf| adf.data().to_vec())
    }

    /// Advance motor spin-up timer. Call at E-clock rate.
    pub fn tick(&mut self) {
        if self.motor_on && !self.motor_spinning {
            self.spin_timer += 1;
            if self.spin_timer >= MOTOR_SPINUP_TICKS {
                self.motor_spinning = true;
            }
        }
    }

    /// Current drive status for CIA-A PRA input.
    /// All values are active-low booleans (true = signal asserted = pin low).
    pub fn status(&self) -> DriveStatus {
        DriveStatus {
            disk_change: self.disk_changed,
            write_protect: false, // Not write-protected
            track0: self.cylinder == 0,
            ready: self.motor_spinning,
        }
    }

    /// Encode the current track as raw MFM data. Returns `None` if no disk.
    pub fn encode_mfm_track(&self) -> Option<Vec<u8>> {
        let adf = self.disk.as_ref()?;
        let track_num = (self.cylinder * 2 + self.head) as u8;
        let sectors = adf.read_track_sectors(self.cylinder, self.head);
        Some(encode_mfm_track(
            sectors,
            track_num,
            adf.sectors_per_track(),
        ))
    }

    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    pub fn cylinder(&self) -> u32 {
        self.cylinder
    }

    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn motor_on(&self) -> bool {
        self.motor_on
    }
}

impl Default for AmigaFloppyDrive {
    fn default() -> Self {
        Self::new()
    }
}
