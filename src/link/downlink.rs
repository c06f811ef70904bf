// SPDX-License-Identifier: AGPL-3.0-or-later

//! Downlink state machine (spec.md §4.C): drains the downlink queues,
//! frames outgoing code/message packets, waits for the ACK that releases
//! the sequence number, and escalates through resync on timeout.

use tracing::{debug, warn};

use crate::{
    error::LinkError,
    link::frame::{self, CodePacketHeader, FrameCmd, FrameCode},
};

/// Time the ack timer is allowed to run before a timeout is counted.
pub const ACK_TIMEOUT_MS: u32 = 200;
/// Reject-timer ceiling before a `SHORT_NI_CMD(NI_RESET_DEV_CMD)` is sent
/// (spec.md §8 scenario 6).
pub const DOWNLINK_WAIT_TIME_MS: u32 = 1000;
/// Resync phases attempted before the link gives up and resets.
pub const MAX_RESYNC_PHASES: u8 = 5;
/// `SHORT_NI_CMD` parameter that resets the external LON network interface.
pub const NI_RESET_DEV_CMD: u8 = 0x50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownlinkState {
    Idle,
    CpAckWait,
    CpResponseWait,
    MsgAckWait,
    CpMsgReqAckWait,
    Start,
}

/// A pending outbound unit: either a framed message payload or a local NI
/// short command (optionally awaiting a response code instead of a plain
/// ACK).
enum Pending {
    Message(Vec<u8>),
    ShortNi { parameter: u8, expects_response: bool },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DownlinkStats {
    pub acks: u64,
    pub ack_timeouts: u64,
    pub resyncs: u64,
    pub resets: u64,
}

pub struct Downlink {
    state: DownlinkState,
    seq_number: u8,
    ack_elapsed_ms: u32,
    reject_elapsed_ms: Option<u32>,
    resync_phase: u8,
    normal_queue: std::collections::VecDeque<Pending>,
    priority_queue: std::collections::VecDeque<Pending>,
    stats: DownlinkStats,
}

impl Default for Downlink {
    fn default() -> Self {
        Self {
            state: DownlinkState::Start,
            seq_number: 1,
            ack_elapsed_ms: 0,
            reject_elapsed_ms: None,
            resync_phase: 0,
            normal_queue: Default::default(),
            priority_queue: Default::default(),
            stats: DownlinkStats::default(),
        }
    }
}

impl Downlink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DownlinkState {
        self.state
    }

    pub fn stats(&self) -> DownlinkStats {
        self.stats
    }

    pub fn enqueue_message(&mut self, payload: Vec<u8>, priority: bool) {
        let entry = Pending::Message(payload);
        if priority {
            self.priority_queue.push_back(entry);
        } else {
            self.normal_queue.push_back(entry);
        }
    }

    pub fn enqueue_short_ni(&mut self, parameter: u8, expects_response: bool) {
        self.priority_queue.push_back(Pending::ShortNi { parameter, expects_response });
    }

    /// Advances the state machine by `elapsed_ms`, writing any framed
    /// bytes it needs to send to `out`. Returns the bytes actually
    /// written this call.
    pub fn tick(&mut self, elapsed_ms: u32, out: &mut Vec<u8>) -> Result<(), LinkError> {
        if self.state == DownlinkState::Start {
            self.normal_queue.clear();
            self.state = DownlinkState::Idle;
        }

        if self.state == DownlinkState::Idle {
            self.dequeue_next(out);
            return Ok(());
        }

        self.ack_elapsed_ms += elapsed_ms;
        if let Some(reject_ms) = self.reject_elapsed_ms.as_mut() {
            *reject_ms += elapsed_ms;
            if *reject_ms > DOWNLINK_WAIT_TIME_MS {
                warn!("downlink reject timer expired, resetting external interface");
                self.stats.resets += 1;
                self.reject_elapsed_ms = None;
                self.send_reset(out);
                self.state = DownlinkState::Idle;
                return Err(LinkError::RejectTimeout);
            }
            return Ok(());
        }

        if self.ack_elapsed_ms > ACK_TIMEOUT_MS {
            self.on_ack_timeout(out);
        }

        Ok(())
    }

    fn dequeue_next(&mut self, out: &mut Vec<u8>) {
        let Some(pending) = self.priority_queue.pop_front().or_else(|| self.normal_queue.pop_front()) else {
            return;
        };
        match pending {
            Pending::Message(payload) => {
                let header = frame::encode_u50_header(
                    FrameCode { seq: self.seq_number, ack: false, cmd: FrameCmd::Msg },
                    0,
                );
                let mut content = frame::encode_length(payload.len() as u16);
                content.extend_from_slice(&payload);
                out.extend_from_slice(&header);
                out.extend_from_slice(&frame::stuff(&content));
                out.push(frame::checksum(&content));
                self.state = DownlinkState::MsgAckWait;
            }
            Pending::ShortNi { parameter, expects_response } => {
                let header = frame::encode_u50_header(
                    FrameCode { seq: self.seq_number, ack: false, cmd: FrameCmd::ShortNiCmd },
                    parameter,
                );
                out.extend_from_slice(&header);
                self.state = if expects_response {
                    DownlinkState::CpResponseWait
                } else {
                    DownlinkState::CpAckWait
                };
            }
        }
        self.ack_elapsed_ms = 0;
    }

    fn send_reset(&mut self, out: &mut Vec<u8>) {
        let header = frame::encode_u50_header(
            FrameCode { seq: self.seq_number, ack: false, cmd: FrameCmd::ShortNiCmd },
            NI_RESET_DEV_CMD,
        );
        out.extend_from_slice(&header);
    }

    fn on_ack_timeout(&mut self, out: &mut Vec<u8>) {
        self.stats.ack_timeouts += 1;
        self.resync_phase += 1;
        self.ack_elapsed_ms = 0;
        if self.resync_phase > MAX_RESYNC_PHASES {
            warn!("downlink resync exhausted, resetting link");
            self.stats.resets += 1;
            self.resync_phase = 0;
            self.send_reset(out);
            self.state = DownlinkState::Idle;
            return;
        }
        debug!(phase = self.resync_phase, "downlink resync burst: querying node status");
        self.stats.resyncs += 1;
        // Query node status (status short-NI command) while escalating phase.
        let header = frame::encode_u50_header(
            FrameCode { seq: self.seq_number, ack: false, cmd: FrameCmd::ShortNiCmd },
            0x00,
        );
        out.extend_from_slice(&header);
    }

    /// A code packet's `frame_code` was observed for the frame currently
    /// being waited on; advances sequence/state on ACK, starts the reject
    /// timer on `MSG_REJECT`.
    pub fn on_code_packet(&mut self, header: CodePacketHeader) {
        match header.frame_code.cmd {
            FrameCmd::MsgReject if self.waiting_for_ack() => {
                self.reject_elapsed_ms = Some(0);
            }
            _ if header.frame_code.ack && self.matches_expected(&header.frame_code) => {
                self.on_ack();
            }
            _ => {}
        }
    }

    fn waiting_for_ack(&self) -> bool {
        matches!(
            self.state,
            DownlinkState::MsgAckWait
                | DownlinkState::CpAckWait
                | DownlinkState::CpResponseWait
                | DownlinkState::CpMsgReqAckWait
        )
    }

    fn matches_expected(&self, frame_code: &FrameCode) -> bool {
        self.waiting_for_ack() && frame_code.seq == self.seq_number
    }

    fn on_ack(&mut self) {
        self.stats.acks += 1;
        self.reject_elapsed_ms = None;
        self.resync_phase = 0;
        // Sequence numbers rotate 1..7, skipping 0 (spec.md §8 Invariant 1).
        self.seq_number = if self.seq_number >= 7 { 1 } else { self.seq_number + 1 };
        self.state = DownlinkState::Idle;
    }
}
