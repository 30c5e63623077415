//! Amiga Disk File (ADF) image parser.
//!
//! ADF is a raw sector dump: 80 cylinders x 2 heads x 11 sectors x 512 bytes
//! = 901,120 bytes for double-density disks. HD disks double the sector count.

pub const SECTOR_SIZE: u32 = 512;
pub const SECTORS_PER_TRACK_DD: u32 = 11;
pub const SECTORS_PER_TRACK_HD: u32 = 22;
pub const CYLINDERS: u32 = 80;
pub const HEADS: u32 = 2;
pub const ADF_SIZE_DD: usize = (CYLINDERS * HEADS * SECTORS_PER_TRACK_DD * SECTOR_SIZE) as usize;
pub const ADF_SIZE_HD: usize = (CYLINDERS * HEADS * SECTORS_PER_TRACK_HD * SECTOR_SIZE) as usize;

#[derive(Debug, thiserror::Error)]
pub enum AdfError {
    #[error("invalid ADF size: {0} bytes (expected {ADF_SIZE_DD} for DD or {ADF_SIZE_HD} for HD)")]
    InvalidSize(usize),
}

pub struct Adf {
    data: Vec<u8>,
    sectors_per_track: u32,
}

impl Adf {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, AdfError> {
        let sectors_per_track = match data.len() {
            ADF_SIZE_DD => SECTORS_PER_TRACK_DD,
            ADF_SIZE_HD => SECTORS_PER_TRACK_HD,
            other => return Err(AdfError::InvalidSize(other)),
        };
        Ok(Self {
            data,
            sectors_per_track,
        })
    }

    pub fn sectors_per_track(&self) -> u32 {
        self.sectors_per_track
    }

    fn offset(&self, cyl: u32, head: u32, sector: u32) -> usize {
        ((cyl * HEADS + head) * self.sectors_per_track + sector) as usize * SECTOR_SIZE as usize
    }

    pub fn read_sector(&self, cyl: u32, head: u32, sector: u32) -> &[u8] {
        let start = self.offset(cyl, head, sector);
        &self.data[start..start + SECTOR_SIZE as usize]
    }

    pub fn write_sector(&mut self, cyl: u32, head: u32, sector: u32, data: &[u8]) {
        let start = self.offset(cyl, head, sector);
        self.data[start..start + SECTOR_SIZE as usize].copy_from_slice(data);
    }

    /// Return the raw ADF image data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn read_track_sectors(&self, cyl: u32, head: u32) -> &[u8] {
        let start = self.offset(cyl, head, 0);
        let len = self.sectors_per_track as usize * SECTOR_SIZE as usize;
        &self.data[start..start + len]
    }
}
