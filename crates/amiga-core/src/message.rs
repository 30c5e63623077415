//! Outbound message queue and inbound command channel (§5).
//!
//! The core is single-threaded and event-driven internally; it talks to a
//! host thread through two one-directional channels rather than locks:
//! [`CoreMessage`] flows core → host (frame done, disk events, IRQ edges,
//! runtime signals), and [`CoreCommand`] flows host → core (power, pause,
//! reset, warp mode, snapshot requests, config changes). The host drains
//! inbound commands once per outer-loop iteration; the core posts outbound
//! messages as they occur and the host drains them whenever convenient.

use std::collections::VecDeque;

use crate::config::ConfigOption;
use crate::error::RuntimeSignal;

/// A message posted by the core for the host to observe.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreMessage {
    /// A video frame completed; `nr` is the frame counter at VSYNC.
    FrameDone { nr: u64 },
    /// A disk was inserted into the named drive.
    DiskInserted { drive: u8 },
    /// A disk was ejected from the named drive.
    DiskEjected { drive: u8 },
    /// The CPU's IPL pins changed to `level`.
    IrqRaised { level: u8 },
    /// A breakpoint or watchpoint fired; the run loop halted.
    RunSignal(RuntimeSignal),
    /// A non-fatal configuration error, for host display.
    ConfigError(String),
    /// A non-fatal media error, for host display.
    MediaError(String),
    /// The power/run state changed.
    StateChanged(RunState),
}

/// A command submitted by the host for the core to act on at the next
/// outer-loop boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    PowerOn,
    PowerOff,
    Pause,
    Run,
    Reset,
    SetWarpMode(bool),
    RequestSnapshot,
    SetConfig(ConfigOption),
}

/// The outer run loop's state (§9: "coroutine-like emulator thread that
/// just runs forever" re-expressed as an explicit state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Off,
    Paused,
    Running,
    Halted,
}

/// The two message channels the host and core communicate through.
///
/// Both directions are plain FIFOs rather than `std::sync::mpsc`: the core
/// described by this crate is driven synchronously by its caller (see
/// `Amiga::tick`/`run_frame`), so there is no second thread on the other
/// end of these queues within this crate; a host embedding the core across
/// threads is expected to wrap a `MessageQueue` behind its own
/// synchronization.
#[derive(Debug, Default)]
pub struct MessageQueue {
    outbound: VecDeque<CoreMessage>,
    inbound: VecDeque<CoreCommand>,
}

impl MessageQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a message for the host to observe.
    pub fn post(&mut self, msg: CoreMessage) {
        self.outbound.push_back(msg);
    }

    /// Drain all pending outbound messages, in post order.
    pub fn drain_outbound(&mut self) -> Vec<CoreMessage> {
        self.outbound.drain(..).collect()
    }

    /// Submit a command from the host, to be drained by the core later.
    pub fn submit(&mut self, cmd: CoreCommand) {
        self.inbound.push_back(cmd);
    }

    /// Drain all pending inbound commands, in submit order. Called once
    /// per outer-loop iteration by the core.
    pub fn drain_inbound(&mut self) -> Vec<CoreCommand> {
        self.inbound.drain(..).collect()
    }

    #[must_use]
    pub fn has_pending_inbound(&self) -> bool {
        !self.inbound.is_empty()
    }
}
