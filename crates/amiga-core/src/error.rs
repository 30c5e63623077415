//! Typed errors surfaced at the core's external boundaries (§7).
//!
//! Runtime "errors" like breakpoints are deliberately not part of this
//! module: they are recoverable signals carried in [`RuntimeSignal`] and
//! posted on the message queue, never propagated as `Err`.

use thiserror::Error;

/// Errors raised while validating or applying machine configuration.
///
/// Surfaced at the single entry point that caused them (`power_on`,
/// `new_with_config`, `apply_config`); core state is left unchanged on
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no Kickstart ROM image supplied")]
    MissingRom,

    #[error(
        "chip RAM size {requested} exceeds the {limit} byte limit for this Agnus revision"
    )]
    ChipRamExceedsAgnusLimit { requested: usize, limit: usize },

    #[error("extended ROM is required by this configuration but was not supplied")]
    ExtendedRomRequired,

    #[error(
        "this ROM requires at least {required} bytes of RAM, but only {available} are configured"
    )]
    InsufficientRamForRom { available: usize, required: usize },

    #[error("invalid value for option {option:?}: {reason}")]
    InvalidOptionValue { option: String, reason: String },
}

/// Errors raised while decoding or accepting externally-supplied media
/// (floppy images, ROM images). The core never parses files itself; these
/// errors describe byte arrays that external parsers handed it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("file does not look like a supported {expected} image")]
    TypeMismatch { expected: &'static str },

    #[error("media file could not be read: {reason}")]
    Unreadable { reason: String },

    #[error("unsupported disk density or diameter")]
    UnsupportedGeometry,

    #[error("MFM decode failed at track {track}")]
    DecodeFailed { track: u8 },
}

/// Errors raised while loading a snapshot byte stream (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("not a valid snapshot file (magic mismatch)")]
    MagicMismatch,

    #[error("snapshot version {found:?} is older than the minimum supported {minimum:?}")]
    TooOld {
        found: (u8, u8, u8),
        minimum: (u8, u8, u8),
    },

    #[error("snapshot version {found:?} is newer than this build ({current:?})")]
    TooNew {
        found: (u8, u8, u8),
        current: (u8, u8, u8),
    },
}

/// Recoverable runtime signals (§7). These are not errors: they set a bit
/// in the run loop's control word and are cleanly handled at the next
/// event boundary rather than unwinding the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeSignal {
    BreakpointReached { pc: u32 },
    WatchpointReached { addr: u32 },
}
