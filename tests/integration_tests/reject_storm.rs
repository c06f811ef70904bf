// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end version of spec.md §8 scenario 6: a string of `MSG_REJECT`
//! code packets for the outstanding sequence number holds the reject
//! timer open; once it exceeds `DOWNLINK_WAIT_TIME_MS` the link gives up
//! and resets the external interface instead of retrying forever.

use lon_dx_stack::{
    error::LinkError,
    link::{
        downlink::{DOWNLINK_WAIT_TIME_MS, NI_RESET_DEV_CMD},
        frame::{self, FrameCmd, FrameCode, LinkModel},
        IfaceMode,
    },
};

use super::common::open_link_with_transport;

#[test]
fn sustained_reject_storm_resets_the_external_interface() {
    let (link, transport) = open_link_with_transport(LinkModel::U50, IfaceMode::Layer5);

    link.service_downlink(0).expect("start tick");
    link.enqueue_message(vec![0x42], false).expect("enqueue");
    link.service_downlink(0).expect("dequeue tick");
    transport.take_written();

    // Ten consecutive rejects for the outstanding sequence number (1),
    // each re-arming the reject timer.
    for _ in 0..10 {
        let wire = frame::encode_u50_header(FrameCode { seq: 1, ack: false, cmd: FrameCmd::MsgReject }, 0);
        link.feed_rx(&wire).expect("feed reject");
        link.service_uplink().expect("route reject code packet");
    }

    let err = link.service_downlink(DOWNLINK_WAIT_TIME_MS + 1).unwrap_err();
    assert_eq!(err, LinkError::RejectTimeout);

    let expected_reset = frame::encode_u50_header(
        FrameCode { seq: 1, ack: false, cmd: FrameCmd::ShortNiCmd },
        NI_RESET_DEV_CMD,
    );
    assert_eq!(transport.take_written(), expected_reset.to_vec());
}
