// SPDX-License-Identifier: AGPL-3.0-or-later

//! Uplink parser (spec.md §4.C): consumes raw bytes drained from the
//! [`crate::link::rx_ring::RxRing`] and assembles code packets and
//! byte-stuffed messages, applying duplicate suppression before handing
//! completed messages to the uplink queue.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::link::frame::{self, CodePacketHeader, FrameCmd, FrameCode, SYNC};

/// `NI_DRIVER_CMD` messages are consumed internally, never queued.
pub const NI_DRIVER_CMD: u8 = 0x40;
/// Records TXID and layer mode from the external interface.
pub const NI_RESET_DEV_CMD: u8 = 0x50;
/// Increments a CRC-error counter; never queued.
pub const NI_CRC_ERROR: u8 = 0x7E;
/// Wink command: triggers the identify callback instead of queuing.
pub const NI_WINK_CMD: u8 = 0x5B;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkState {
    Idle,
    FrameCodeByte,
    FrameParameter,
    CodePacketChecksum,
    Message,
    EscapedData,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UplinkStats {
    pub frame_errors: u64,
    pub duplicates: u64,
    pub crc_errors: u64,
    pub resets_seen: u64,
}

/// A fully assembled uplink message, ready for `Route`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkMessage {
    pub cmd: u8,
    pub payload: Vec<u8>,
}

pub struct Uplink {
    model: super::frame::LinkModel,
    state: UplinkState,
    frame_code: Option<FrameCode>,
    parameter: u8,
    header_bytes: Vec<u8>,
    assembly: Vec<u8>,
    declared_length: Option<u16>,
    last_seq: Option<u8>,
    stats: UplinkStats,
    queue: VecDeque<UplinkMessage>,
    code_packets: VecDeque<CodePacketHeader>,
    pub last_reset_txid: Option<u8>,
    pub last_layer_mode: Option<u8>,
    pub wink_requested: bool,
}

impl Uplink {
    pub fn new(model: super::frame::LinkModel) -> Self {
        Self {
            model,
            state: UplinkState::Idle,
            frame_code: None,
            parameter: 0,
            header_bytes: Vec::new(),
            assembly: Vec::new(),
            declared_length: None,
            last_seq: None,
            stats: UplinkStats::default(),
            queue: VecDeque::new(),
            code_packets: VecDeque::new(),
            last_reset_txid: None,
            last_layer_mode: None,
            wink_requested: false,
        }
    }

    pub fn state(&self) -> UplinkState {
        self.state
    }

    pub fn stats(&self) -> UplinkStats {
        self.stats
    }

    pub fn pop_message(&mut self) -> Option<UplinkMessage> {
        self.queue.pop_front()
    }

    /// Pops the next ack/reject code packet observed, for the caller to
    /// hand to the downlink state machine (spec.md §8 scenario 1).
    pub fn pop_code_packet(&mut self) -> Option<CodePacketHeader> {
        self.code_packets.pop_front()
    }

    /// Feeds one byte at a time through the parser (called for every byte
    /// drained from the RX ring).
    pub fn feed_byte(&mut self, byte: u8) {
        match self.state {
            UplinkState::Idle => {
                if byte == SYNC {
                    self.header_bytes.clear();
                    self.state = UplinkState::FrameCodeByte;
                } else {
                    self.stats.frame_errors += 1;
                }
            }
            UplinkState::FrameCodeByte => self.on_frame_code_byte(byte),
            UplinkState::FrameParameter => {
                self.parameter = byte;
                self.state = UplinkState::CodePacketChecksum;
            }
            UplinkState::CodePacketChecksum => self.on_header_checksum(byte),
            UplinkState::Message => self.on_message_byte(byte),
            UplinkState::EscapedData => self.on_escaped_byte(byte),
        }
    }

    fn on_frame_code_byte(&mut self, byte: u8) {
        match self.model {
            super::frame::LinkModel::U61 => {
                if byte != 0x00 {
                    self.stats.frame_errors += 1;
                    self.state = UplinkState::Idle;
                    return;
                }
                self.frame_code = None;
                self.begin_message_if_msg_cmd(FrameCode { seq: 0, ack: false, cmd: FrameCmd::Msg });
            }
            super::frame::LinkModel::U50 => {
                self.frame_code = Some(FrameCode::from_byte(byte));
                self.state = UplinkState::FrameParameter;
            }
        }
    }

    fn on_header_checksum(&mut self, byte: u8) {
        let Some(frame_code) = self.frame_code else {
            self.state = UplinkState::Idle;
            return;
        };
        let header = [SYNC, frame_code.to_byte(), self.parameter, byte];
        if frame::checksum(&header[0..3]) != byte {
            warn!("uplink header checksum mismatch");
            self.stats.frame_errors += 1;
            self.state = UplinkState::Idle;
            return;
        }
        self.begin_message_if_msg_cmd(frame_code);
    }

    fn begin_message_if_msg_cmd(&mut self, frame_code: FrameCode) {
        if frame_code.cmd == FrameCmd::Msg && !frame_code.ack {
            self.assembly.clear();
            self.declared_length = None;
            self.state = UplinkState::Message;
        } else {
            self.deliver_code_packet_only(frame_code);
            self.state = UplinkState::Idle;
        }
    }

    fn deliver_code_packet_only(&mut self, frame_code: FrameCode) {
        debug!(?frame_code, "uplink code packet (no payload)");
        self.code_packets.push_back(CodePacketHeader { frame_code, parameter: self.parameter });
    }

    fn on_message_byte(&mut self, byte: u8) {
        if byte == SYNC {
            self.state = UplinkState::EscapedData;
            return;
        }
        self.push_assembly_byte(byte);
    }

    fn on_escaped_byte(&mut self, byte: u8) {
        match byte {
            SYNC => {
                self.state = UplinkState::Message;
                self.push_assembly_byte(byte);
            }
            0x00 => {
                debug!("uplink message buffer reset by peer");
                self.assembly.clear();
                self.declared_length = None;
                self.state = UplinkState::Message;
            }
            _ => {
                warn!("uplink frame error: invalid escape byte");
                self.stats.frame_errors += 1;
                self.state = UplinkState::Idle;
            }
        }
    }

    fn push_assembly_byte(&mut self, byte: u8) {
        self.assembly.push(byte);
        if self.declared_length.is_none() {
            if let Ok((len, consumed)) = frame::decode_length(&self.assembly) {
                if self.assembly.len() >= consumed {
                    self.declared_length = Some(len);
                }
            }
        }
        if let Some(declared) = self.declared_length {
            let header_len = if self.assembly.first() == Some(&0xFF) { 3 } else { 1 };
            // Message complete when index (bytes after header+declared body
            // +1 trailing checksum byte) exceeds declared_length, per spec.
            if self.assembly.len() >= header_len + declared as usize + 1 {
                self.complete_message();
            }
        }
    }

    fn complete_message(&mut self) {
        let seq = self.frame_code.map(|fc| fc.seq).unwrap_or(0);
        let header_len = if self.assembly.first() == Some(&0xFF) { 3 } else { 1 };
        let declared = self.declared_length.unwrap_or(0) as usize;
        let content_end = (header_len + declared).min(self.assembly.len().saturating_sub(1));
        let cmd = self.assembly.get(header_len).copied().unwrap_or(0);
        let body = if content_end > header_len + 1 {
            self.assembly[header_len + 1..content_end].to_vec()
        } else {
            Vec::new()
        };

        let checksum_ok = self
            .assembly
            .get(content_end)
            .is_some_and(|&byte| frame::checksum(&self.assembly[..content_end]) == byte);

        // U61 carries no sequence number (the second header byte is fixed
        // 0x00), so there is nothing to key duplicate suppression on; only
        // U50 frames can be deduplicated by sequence.
        let is_duplicate = self.model == super::frame::LinkModel::U50
            && self.last_seq == Some(seq)
            && cmd != NI_RESET_DEV_CMD;
        self.last_seq = Some(seq);

        self.state = UplinkState::Idle;
        self.assembly.clear();
        self.declared_length = None;
        self.frame_code = None;

        if !checksum_ok {
            warn!("uplink message checksum mismatch");
            self.stats.frame_errors += 1;
            return;
        }

        if is_duplicate {
            self.stats.duplicates += 1;
            debug!(seq, "uplink duplicate suppressed");
            return;
        }

        match cmd {
            NI_DRIVER_CMD => debug!("uplink NI driver command consumed internally"),
            NI_RESET_DEV_CMD => {
                self.stats.resets_seen += 1;
                self.last_reset_txid = body.first().copied();
                self.last_layer_mode = body.get(1).copied();
            }
            NI_CRC_ERROR => self.stats.crc_errors += 1,
            NI_WINK_CMD => self.wink_requested = true,
            _ => self.queue.push_back(UplinkMessage { cmd, payload: body }),
        }
    }
}
