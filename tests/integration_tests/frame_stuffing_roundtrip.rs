// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end version of spec.md §8 scenario 2: a payload containing a
//! literal 0x7E survives framing from one `LonUsbLinkInterface`'s downlink
//! encoder, across a raw byte wire, into a second interface's uplink
//! parser.

use lon_dx_stack::link::{IfaceMode, frame::LinkModel};

use super::common::{complete_uid_acquisition, open_link_with_transport};

#[test]
fn embedded_sync_byte_survives_the_wire() {
    let (sender, sender_transport) = open_link_with_transport(LinkModel::U61, IfaceMode::Layer5);
    sender.service_downlink(0).expect("start tick");

    let payload = vec![0x30u8, 0x7E, 0x99];
    sender.enqueue_message(payload.clone(), false).expect("enqueue");
    sender.service_downlink(0).expect("dequeue tick");

    let wire_bytes = sender_transport.take_written();
    assert!(wire_bytes.len() > payload.len(), "stuffed bytes include header/checksum overhead");

    let (receiver, _receiver_transport) =
        open_link_with_transport(LinkModel::U61, IfaceMode::Layer5);
    complete_uid_acquisition(&receiver, [0; 6]);
    receiver.feed_rx(&wire_bytes).expect("feed wire bytes");
    let received = receiver.service_uplink().expect("parse");

    assert_eq!(received.len(), 1);
    assert_eq!(received[0].cmd, 0x30);
    assert_eq!(received[0].payload, vec![0x7E, 0x99]);
}

#[test]
fn empty_payload_message_round_trips() {
    let (sender, sender_transport) = open_link_with_transport(LinkModel::U61, IfaceMode::Layer5);
    sender.service_downlink(0).expect("start tick");

    sender.enqueue_message(vec![0x41], false).expect("enqueue cmd with no body");
    sender.service_downlink(0).expect("dequeue tick");
    let wire_bytes = sender_transport.take_written();

    let (receiver, _receiver_transport) =
        open_link_with_transport(LinkModel::U61, IfaceMode::Layer5);
    complete_uid_acquisition(&receiver, [0; 6]);
    receiver.feed_rx(&wire_bytes).expect("feed wire bytes");
    let received = receiver.service_uplink().expect("parse");

    assert_eq!(received.len(), 1);
    assert_eq!(received[0].cmd, 0x41);
    assert!(received[0].payload.is_empty());
}
