// SPDX-License-Identifier: AGPL-3.0-or-later

//! Segmented persistence (spec.md §4.B). A segment is identified by
//! [`Segment`] and written/read as a single transactional image: header
//! `{version, length, signature, app_signature, checksum}` followed by the
//! serialized body.

pub mod backend;
pub mod codec;

use tracing::warn;

use crate::{
    error::PersistError,
    persist::{
        backend::Backend,
        codec::{checksum, SegmentHeader, HEADER_LEN},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Node,
    Isi,
    ConnectionTable,
    Application,
}

/// Constant ISI persistence signature (spec.md §6).
pub const SIGNATURE_ISI: u16 = 0xCF82;
pub const SIGNATURE_NODE: u16 = 0x4E44; // "ND"
pub const SIGNATURE_CONNECTION_TABLE: u16 = 0x4354; // "CT"
pub const SIGNATURE_APPLICATION: u16 = 0x4150; // "AP"

/// Writes `body` to `segment` as one transactional image.
pub fn write_image(
    backend: &dyn Backend,
    segment: Segment,
    version: u16,
    signature: u16,
    app_signature: u32,
    body: &[u8],
) -> Result<(), PersistError> {
    let header = SegmentHeader {
        version,
        length: body.len() as u32,
        signature,
        app_signature,
        checksum: checksum(body),
    };

    let total = HEADER_LEN + body.len();
    let mut handle = backend.open_for_write(segment, total)?;
    backend.write(&mut handle, 0, &header.to_bytes())?;
    backend.write(&mut handle, HEADER_LEN, body)?;
    backend.close(handle)
}

/// Reads and validates `segment`, classifying any failure per spec.md §4.B.
/// `current_version`/`expected_signature`/`expected_app_signature`/
/// `expected_body_len` describe the caller's current program image.
pub fn read_image(
    backend: &dyn Backend,
    segment: Segment,
    current_version: u16,
    expected_signature: u16,
    expected_app_signature: u32,
    expected_body_len: usize,
) -> Result<Vec<u8>, PersistError> {
    let handle = backend.open_for_read(segment)?;

    if handle.len() < HEADER_LEN {
        warn!(?segment, "persistence: short read of segment header");
        return Err(PersistError::Corruption);
    }

    let header_bytes: [u8; HEADER_LEN] = backend
        .read(&handle, 0, HEADER_LEN)?
        .try_into()
        .map_err(|_| PersistError::Corruption)?;
    let header = SegmentHeader::from_bytes(&header_bytes);

    let declared_len = header.length as usize;
    let available_body_len = handle.len().saturating_sub(HEADER_LEN);
    if available_body_len < declared_len {
        warn!(?segment, "persistence: partial image (reset during update)");
        return Err(PersistError::ResetDuringUpdate);
    }

    let body = backend.read(&handle, HEADER_LEN, declared_len)?;
    if checksum(&body) != header.checksum {
        warn!(?segment, "persistence: checksum mismatch");
        return Err(PersistError::Corruption);
    }

    if header.signature != expected_signature || header.app_signature != expected_app_signature {
        warn!(?segment, "persistence: signature mismatch");
        return Err(PersistError::SignatureMismatch);
    }

    if header.version > current_version {
        warn!(?segment, stored = header.version, current = current_version, "persistence: unsupported version");
        return Err(PersistError::VersionNotSupported);
    }

    if declared_len != expected_body_len {
        warn!(?segment, declared_len, expected_body_len, "persistence: program attribute changed");
        return Err(PersistError::ProgramAttributeChange);
    }

    Ok(body)
}
