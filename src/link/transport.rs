// SPDX-License-Identifier: AGPL-3.0-or-later

//! The raw byte transport collaborator contract (`HalOpenUsb`/`HalReadUsb`/
//! `HalWriteUsb`, spec.md §6) and [`SimulatedUsbTransport`], an in-process
//! loopback stand-in used by tests and the demo CLI in place of a physical
//! HAL — grounded in the teacher's TCP-backed integration test harness.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::LinkError;

/// Non-blocking byte transport beneath a link interface.
pub trait UsbTransport: Send + Sync {
    /// Reads up to `buf.len()` bytes without blocking; `Ok(0)` means no
    /// bytes are currently available (maps to `HalReadUsb`'s
    /// `NoMessageAvailable`).
    fn read(&self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Writes `buf` in full or fails.
    fn write(&self, buf: &[u8]) -> Result<usize, LinkError>;
}

/// In-process loopback pipe: bytes written are immediately available to
/// read back, modeling a peer echoing or a test harness injecting bytes
/// directly into the inbound side.
#[derive(Default)]
pub struct SimulatedUsbTransport {
    inbound: Mutex<VecDeque<u8>>,
    outbound: Mutex<VecDeque<u8>>,
}

impl SimulatedUsbTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/CLI helper: injects bytes as if received from the peer.
    pub fn inject(&self, data: &[u8]) {
        self.inbound.lock().expect("inbound lock poisoned").extend(data);
    }

    /// Test helper: drains bytes this transport's owner has written out.
    pub fn take_written(&self) -> Vec<u8> {
        self.outbound.lock().expect("outbound lock poisoned").drain(..).collect()
    }
}

impl UsbTransport for SimulatedUsbTransport {
    fn read(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let mut inbound = self.inbound.lock().expect("inbound lock poisoned");
        let n = buf.len().min(inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = inbound.pop_front().expect("checked length above");
        }
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, LinkError> {
        self.outbound.lock().expect("outbound lock poisoned").extend(buf);
        Ok(buf.len())
    }
}
