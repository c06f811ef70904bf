// SPDX-License-Identifier: AGPL-3.0-or-later

//! The LON USB link driver (spec.md §4.C): a framed, sequenced, ACK'd
//! protocol over a raw byte transport, with byte-stuffing, retries, unique
//! ID acquisition, and the concurrency discipline from spec.md §5.

pub mod downlink;
pub mod frame;
pub mod rx_ring;
pub mod transport;
pub mod uplink;

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::{
    error::LinkError,
    link::{
        downlink::Downlink,
        frame::LinkModel,
        rx_ring::{RxRing, RxRingStats},
        transport::UsbTransport,
        uplink::{Uplink, UplinkMessage},
    },
};

/// Read-memory command used for the unique-ID request (spec.md §8
/// scenario 3): read 6 bytes at offset 0x2D of the read-only-memory space.
const NI_READ_MEMORY_CMD: u8 = 0x16;
const UID_OFFSET: u8 = 0x2D;
const UID_RESPONSE_LEN: usize = 23;
const UID_WAIT_TIME_MS: u32 = 500;
const MAX_UID_RETRIES: u8 = 10;
const LAYER_MODE_5_CMD: u8 = 0xD0;
const LAYER_MODE_2_CMD: u8 = 0xD1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum IfaceMode {
    Layer2,
    Layer5,
}

struct UidState {
    known: bool,
    waiting: bool,
    retries: u8,
    elapsed_ms: u32,
    uid: [u8; 6],
}

impl Default for UidState {
    fn default() -> Self {
        Self { known: false, waiting: false, retries: 0, elapsed_ms: 0, uid: [0; 6] }
    }
}

/// Per-interface state. `queue_lock` guards the RX ring and uplink
/// assembly (via `Mutex` on [`Uplink`]); `state_lock` guards the downlink
/// queue and state machine, matching spec.md §5's two-mutex discipline.
pub struct LonUsbLinkInterface {
    index: u8,
    iface_mode: IfaceMode,
    shutdown: std::sync::atomic::AtomicBool,
    transport: Arc<dyn UsbTransport>,
    rx_ring: RxRing,
    queue_lock: Mutex<Uplink>,
    state_lock: Mutex<Downlink>,
    uid: Mutex<UidState>,
}

impl LonUsbLinkInterface {
    pub fn open(
        index: u8,
        model: LinkModel,
        iface_mode: IfaceMode,
        transport: Arc<dyn UsbTransport>,
    ) -> Self {
        let iface = Self {
            index,
            iface_mode,
            shutdown: std::sync::atomic::AtomicBool::new(false),
            transport,
            rx_ring: RxRing::new(4096),
            queue_lock: Mutex::new(Uplink::new(model)),
            state_lock: Mutex::new(Downlink::new()),
            uid: Mutex::new(UidState::default()),
        };
        iface.request_uid();
        info!(index, "usb link interface opened");
        iface
    }

    pub fn close(&self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        info!(index = self.index, "usb link interface closed");
    }

    fn ensure_open(&self) -> Result<(), LinkError> {
        if self.shutdown.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(LinkError::InvalidInterfaceId(self.index));
        }
        Ok(())
    }

    /// Producer entry point (spec.md §5): may be called from any
    /// byte-feeder context. Only touches `queue_lock`'s ring.
    pub fn feed_rx(&self, data: &[u8]) -> Result<(), LinkError> {
        self.ensure_open()?;
        self.rx_ring.feed(data);
        Ok(())
    }

    pub fn rx_stats(&self) -> RxRingStats {
        self.rx_ring.stats()
    }

    pub fn downlink_stats(&self) -> crate::link::downlink::DownlinkStats {
        self.state_lock.lock().expect("state_lock poisoned").stats()
    }

    pub fn downlink_state(&self) -> crate::link::downlink::DownlinkState {
        self.state_lock.lock().expect("state_lock poisoned").state()
    }

    /// Drains the RX ring and runs the uplink parser outside the ring
    /// lock, then applies the UID-acquisition inbound filter.
    pub fn service_uplink(&self) -> Result<Vec<UplinkMessage>, LinkError> {
        self.ensure_open()?;
        let mut scratch = Vec::new();
        self.rx_ring.drain_into(&mut scratch);

        let mut uplink = self.queue_lock.lock().expect("queue_lock poisoned");
        for byte in scratch {
            uplink.feed_byte(byte);
        }
        let mut out = Vec::new();
        while let Some(msg) = uplink.pop_message() {
            out.push(msg);
        }
        let mut code_packets = Vec::new();
        while let Some(header) = uplink.pop_code_packet() {
            code_packets.push(header);
        }
        drop(uplink);

        if !code_packets.is_empty() {
            let mut downlink = self.state_lock.lock().expect("state_lock poisoned");
            for header in code_packets {
                downlink.on_code_packet(header);
            }
        }

        let mut filtered = Vec::new();
        let mut uid_state = self.uid.lock().expect("uid lock poisoned");
        for msg in out {
            if uid_state.waiting {
                if msg.cmd == NI_READ_MEMORY_CMD
                    && msg.payload.len() == UID_RESPONSE_LEN
                    && msg.payload.first() == Some(&UID_OFFSET)
                {
                    uid_state.uid.copy_from_slice(&msg.payload[1..7]);
                    uid_state.known = true;
                    uid_state.waiting = false;
                    info!(index = self.index, "usb link unique id acquired");
                    self.send_layer_mode();
                } else {
                    warn!(index = self.index, "uid wait: dropping unrelated inbound message");
                }
                continue;
            }
            filtered.push(msg);
        }
        Ok(filtered)
    }

    /// Drains downlink queues/timers and writes any framed bytes to the
    /// transport (spec.md §4.E core-glue responsibility, performed here
    /// per interface).
    pub fn service_downlink(&self, elapsed_ms: u32) -> Result<(), LinkError> {
        self.ensure_open()?;
        let mut out = Vec::new();
        let result = {
            let mut downlink = self.state_lock.lock().expect("state_lock poisoned");
            downlink.tick(elapsed_ms, &mut out)
        };

        let mut uid_state = self.uid.lock().expect("uid lock poisoned");
        if uid_state.waiting {
            uid_state.elapsed_ms += elapsed_ms;
            if uid_state.elapsed_ms > UID_WAIT_TIME_MS {
                uid_state.elapsed_ms = 0;
                if uid_state.retries < MAX_UID_RETRIES {
                    uid_state.retries += 1;
                    drop(uid_state);
                    self.request_uid();
                } else {
                    uid_state.waiting = false;
                    drop(uid_state);
                    warn!(index = self.index, "uid retries exhausted, proceeding without unique id");
                    self.send_layer_mode();
                }
            }
        }

        if !out.is_empty() {
            self.transport.write(&out)?;
        }
        result
    }

    pub fn enqueue_message(&self, payload: Vec<u8>, priority: bool) -> Result<(), LinkError> {
        self.ensure_open()?;
        self.state_lock
            .lock()
            .expect("state_lock poisoned")
            .enqueue_message(payload, priority);
        Ok(())
    }

    fn request_uid(&self) {
        let mut uid_state = self.uid.lock().expect("uid lock poisoned");
        uid_state.waiting = true;
        uid_state.elapsed_ms = 0;
        drop(uid_state);
        let request = [NI_READ_MEMORY_CMD, UID_OFFSET, 6];
        let _ = self.transport.write(&request);
    }

    fn send_layer_mode(&self) {
        let cmd = match self.iface_mode {
            IfaceMode::Layer5 => LAYER_MODE_5_CMD,
            IfaceMode::Layer2 => LAYER_MODE_2_CMD,
        };
        let _ = self.transport.write(&[cmd]);
    }

    pub fn unique_id(&self) -> Option<[u8; 6]> {
        let uid_state = self.uid.lock().expect("uid lock poisoned");
        uid_state.known.then_some(uid_state.uid)
    }
}
