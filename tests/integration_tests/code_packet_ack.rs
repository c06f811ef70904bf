// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end version of spec.md §8 scenario 1: a queued message reaches
//! `MSG_ACK_WAIT`, and the matching inbound ack code packet drives the
//! link back to `IDLE` with `acks` incremented, through the public
//! `LonUsbLinkInterface` surface rather than the `Downlink` unit directly.

use lon_dx_stack::link::{
    IfaceMode,
    downlink::DownlinkState,
    frame::{self, FrameCmd, FrameCode, LinkModel},
};

use super::common::open_link_with_transport;

#[test]
fn queued_message_ack_returns_link_to_idle() {
    let (link, transport) = open_link_with_transport(LinkModel::U50, IfaceMode::Layer5);

    // Drain the Start->Idle transition before anything is queued.
    link.service_downlink(0).expect("start tick");

    link.enqueue_message(vec![1, 2, 3], false).expect("enqueue");
    link.service_downlink(0).expect("dequeue tick");
    assert_eq!(link.downlink_state(), DownlinkState::MsgAckWait);
    assert!(!transport.take_written().is_empty(), "framed message was written to the wire");

    let ack = FrameCode { seq: 1, ack: true, cmd: FrameCmd::Msg };
    let header = frame::encode_u50_header(ack, 0);
    link.feed_rx(&header).expect("feed ack bytes");
    link.service_uplink().expect("parse ack");

    assert_eq!(link.downlink_state(), DownlinkState::Idle);
    assert_eq!(link.downlink_stats().acks, 1);
}
