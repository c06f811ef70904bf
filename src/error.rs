// SPDX-License-Identifier: AGPL-3.0-or-later

//! Crate-wide error taxonomy.
//!
//! Each subsystem owns a small `thiserror` leaf enum; callers that cross
//! subsystem boundaries use `anyhow::Result` (see `crate::client` style in
//! the rest of the crate). [`LonError`] exists so a caller that wants a
//! single typed error (rather than `anyhow::Error`) can match on it.

use thiserror::Error;

/// Parameter-class errors: invalid index, out-of-range enum, null where
/// required. Never mutates state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("invalid interface id {0}")]
    InvalidInterfaceId(u8),
    #[error("index {index} out of range (table size {size})")]
    IndexOutOfRange { index: u16, size: u16 },
}

/// Persistence failure classification (spec.md §4.B).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PersistError {
    #[error("no persistence image for this segment")]
    NoPersistence,
    #[error("corruption detected (short read or checksum mismatch)")]
    Corruption,
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("stored version not supported")]
    VersionNotSupported,
    #[error("stored length differs from current program footprint")]
    ProgramAttributeChange,
    #[error("reset detected during update")]
    ResetDuringUpdate,
}

/// LON USB link errors (spec.md §4.C / §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("invalid interface id {0}")]
    InvalidInterfaceId(u8),
    #[error("framing error")]
    FrameError,
    #[error("header checksum mismatch")]
    ChecksumMismatch,
    #[error("unexpected sequence number: expected {expected}, got {got}")]
    SequenceMismatch { expected: u8, got: u8 },
    #[error("ack timeout")]
    AckTimeout,
    #[error("reject timer expired")]
    RejectTimeout,
    #[error("write failed")]
    WriteFailed,
    #[error("read failed")]
    ReadFailed,
    #[error("no message available")]
    NoMessageAvailable,
    #[error("interface closed")]
    InterfaceClosed,
}

/// ISI engine API errors (spec.md §6, §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IsiApiError {
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("engine not running")]
    NotRunning,
    #[error("engine already running")]
    AlreadyRunning,
    #[error("assembly index {0} out of range")]
    InvalidAssembly(u16),
    #[error("connection table exhausted")]
    ConnectionTableFull,
    #[error("address table exhausted")]
    AddressTableFull,
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Single typed error composing every subsystem's leaf errors.
#[derive(Debug, Error)]
pub enum LonError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Isi(#[from] IsiApiError),
}
