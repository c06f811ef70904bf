// SPDX-License-Identifier: AGPL-3.0-or-later

//! The `Backend` collaborator contract (spec.md §4.B): `OpenForWrite/Write/
//! Close/OpenForRead/Read` against a segment-granular store. The concrete
//! backing store (file, flash region, key-value blob) is external to this
//! crate; [`MemBackend`] is the in-process stand-in used by tests and the
//! demo CLI.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{error::PersistError, persist::Segment};

/// Handle to an in-flight write session. Bytes are staged here and only
/// published to the backend on [`Backend::close`], so a concurrent reader
/// never observes a partial image (spec.md §4.B's transactional-write
/// invariant; see DESIGN.md for the Open Question this resolves).
pub struct WriteHandle {
    segment: Segment,
    staging: Vec<u8>,
}

/// Handle to a point-in-time read snapshot of a segment.
pub struct ReadHandle {
    segment: Segment,
    image: Vec<u8>,
}

pub trait Backend: Send + Sync {
    fn open_for_write(
        &self,
        segment: Segment,
        size: usize,
    ) -> Result<WriteHandle, PersistError>;

    fn write(
        &self,
        handle: &mut WriteHandle,
        offset: usize,
        buf: &[u8],
    ) -> Result<(), PersistError>;

    fn close(&self, handle: WriteHandle) -> Result<(), PersistError>;

    fn open_for_read(&self, segment: Segment) -> Result<ReadHandle, PersistError>;

    fn read(
        &self,
        handle: &ReadHandle,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, PersistError>;
}

/// In-process backend backed by a `Mutex<HashMap<Segment, Vec<u8>>>`.
#[derive(Default)]
pub struct MemBackend {
    store: Mutex<HashMap<Segment, Vec<u8>>>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemBackend {
    fn open_for_write(
        &self,
        segment: Segment,
        size: usize,
    ) -> Result<WriteHandle, PersistError> {
        Ok(WriteHandle {
            segment,
            staging: vec![0u8; size],
        })
    }

    fn write(
        &self,
        handle: &mut WriteHandle,
        offset: usize,
        buf: &[u8],
    ) -> Result<(), PersistError> {
        let end = offset.checked_add(buf.len()).ok_or(PersistError::Corruption)?;
        let slot = handle
            .staging
            .get_mut(offset..end)
            .ok_or(PersistError::Corruption)?;
        slot.copy_from_slice(buf);
        Ok(())
    }

    fn close(&self, handle: WriteHandle) -> Result<(), PersistError> {
        self.store
            .lock()
            .expect("persistence store lock poisoned")
            .insert(handle.segment, handle.staging);
        Ok(())
    }

    fn open_for_read(&self, segment: Segment) -> Result<ReadHandle, PersistError> {
        let image = self
            .store
            .lock()
            .expect("persistence store lock poisoned")
            .get(&segment)
            .cloned()
            .ok_or(PersistError::NoPersistence)?;
        Ok(ReadHandle { segment, image })
    }

    fn read(
        &self,
        handle: &ReadHandle,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, PersistError> {
        let end = offset.checked_add(len).ok_or(PersistError::Corruption)?;
        handle
            .image
            .get(offset..end)
            .map(<[u8]>::to_vec)
            .ok_or(PersistError::Corruption)
    }
}

impl ReadHandle {
    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_before_write_is_no_persistence() {
        let backend = MemBackend::new();
        let err = backend.open_for_read(Segment::Node).unwrap_err();
        assert_eq!(err, PersistError::NoPersistence);
    }

    #[test]
    fn write_then_read_round_trips() {
        let backend = MemBackend::new();
        let mut h = backend.open_for_write(Segment::Isi, 8).expect("open for write");
        backend.write(&mut h, 0, &[1, 2, 3, 4]).expect("write");
        backend.write(&mut h, 4, &[5, 6, 7, 8]).expect("write");
        backend.close(h).expect("close");

        let r = backend.open_for_read(Segment::Isi).expect("open for read");
        assert_eq!(r.len(), 8);
        assert_eq!(backend.read(&r, 0, 8).expect("read"), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn a_read_started_before_the_next_close_sees_the_old_image() {
        let backend = MemBackend::new();
        let mut h = backend.open_for_write(Segment::Node, 2).expect("open");
        backend.write(&mut h, 0, &[1, 1]).expect("write");
        backend.close(h).expect("close");

        let snapshot = backend.open_for_read(Segment::Node).expect("open for read");

        let mut h2 = backend.open_for_write(Segment::Node, 2).expect("open");
        backend.write(&mut h2, 0, &[2, 2]).expect("write");
        backend.close(h2).expect("close");

        assert_eq!(backend.read(&snapshot, 0, 2).expect("read"), vec![1, 1]);
    }
}
