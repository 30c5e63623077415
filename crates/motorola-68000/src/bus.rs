//! The bus interface the 68000 core drives. A `Cpu68000` never touches
//! memory directly — every access, IPL poll, and reset line goes through
//! an `M68kBus` implementation the owner supplies.

/// Mirrors the 68000's three function-code output lines (FC0-FC2), which
/// classify every bus cycle as supervisor/user and program/data, plus the
/// dedicated interrupt-acknowledge code asserted during an IACK cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    UserData,
    UserProgram,
    SupervisorData,
    SupervisorProgram,
    InterruptAck,
}

/// Result of polling an in-progress bus cycle. Real hardware also has a
/// `/BERR` line; `Error` represents that terminating condition separately
/// from a normal `Wait` (DTACK not yet asserted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStatus {
    /// DTACK asserted; `Ready` carries the read data (ignored on writes).
    Ready(u16),
    /// DTACK not yet asserted; the CPU keeps waiting.
    Wait,
    /// Bus error asserted; the CPU enters its exception sequence.
    Error,
}

/// The owner-supplied bus the CPU core polls every crystal cycle.
///
/// All methods take `&mut self` because satisfying a bus cycle can have
/// side effects (DMA-visible register writes, interrupt acknowledgement
/// clearing the pending request).
pub trait M68kBus {
    /// Poll an in-progress bus cycle. Called repeatedly (once per crystal
    /// tick, after the minimum 4-cycle bus cycle length has elapsed) until
    /// it returns something other than `Wait`.
    fn poll_cycle(
        &mut self,
        addr: u32,
        fc: FunctionCode,
        is_read: bool,
        is_word: bool,
        data: Option<u16>,
    ) -> BusStatus;

    /// Current interrupt priority level (0-7) presented on IPL0-IPL2.
    fn poll_ipl(&mut self) -> u8;

    /// Resolve an interrupt-acknowledge cycle for the given level, normally
    /// returning an autovector number. Distinct from `poll_cycle` with
    /// `FunctionCode::InterruptAck` for buses that want to special-case the
    /// acknowledge handshake independently of the generic cycle path.
    fn poll_interrupt_ack(&mut self, level: u8) -> BusStatus;

    /// Assert the hardware reset line, as driven by the RESET instruction
    /// or external reset. Must reset every peripheral owned by the bus.
    fn reset(&mut self);
}
