//! Effective-address mode decoding (the 3-bit mode + 3-bit register field
//! that follows most opcode words).

/// A decoded effective-address mode. Register-relative variants carry the
/// 0-7 register index; the purely PC-relative and immediate modes don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    DataReg(u8),
    AddrReg(u8),
    AddrInd(u8),
    AddrIndPostInc(u8),
    AddrIndPreDec(u8),
    AddrIndDisp(u8),
    AddrIndIndex(u8),
    AbsShort,
    AbsLong,
    PcDisp,
    PcIndex,
    Immediate,
}

impl AddrMode {
    /// Decode a 3-bit mode field and 3-bit register field into an
    /// addressing mode. `mode == 7` uses `reg` to select among the
    /// register-independent modes; `reg` values 5-7 there are unassigned
    /// and decode to `None`.
    #[must_use]
    pub fn decode(mode: u8, reg: u8) -> Option<Self> {
        match mode & 7 {
            0 => Some(Self::DataReg(reg)),
            1 => Some(Self::AddrReg(reg)),
            2 => Some(Self::AddrInd(reg)),
            3 => Some(Self::AddrIndPostInc(reg)),
            4 => Some(Self::AddrIndPreDec(reg)),
            5 => Some(Self::AddrIndDisp(reg)),
            6 => Some(Self::AddrIndIndex(reg)),
            7 => match reg & 7 {
                0 => Some(Self::AbsShort),
                1 => Some(Self::AbsLong),
                2 => Some(Self::PcDisp),
                3 => Some(Self::PcIndex),
                4 => Some(Self::Immediate),
                _ => None,
            },
            _ => unreachable!(),
        }
    }
}
