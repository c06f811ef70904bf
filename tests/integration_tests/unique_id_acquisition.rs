// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end version of spec.md §8 scenario 3: on open the link requests
//! the unique ID, retries on timeout, and falls back to sending the
//! layer-mode command once retries are exhausted.

use lon_dx_stack::link::{IfaceMode, frame, frame::LinkModel};

use super::common::open_link_with_transport;

const NI_READ_MEMORY_CMD: u8 = 0x16;
const UID_OFFSET: u8 = 0x2D;
const UID_WAIT_TIME_MS: u32 = 500;

#[test]
fn open_issues_a_read_memory_request() {
    let (_link, transport) = open_link_with_transport(LinkModel::U61, IfaceMode::Layer5);
    let written = transport.take_written();
    assert_eq!(written, vec![NI_READ_MEMORY_CMD, UID_OFFSET, 6]);
}

#[test]
fn a_successful_response_acquires_the_uid_and_sets_layer_mode() {
    let (link, transport) = open_link_with_transport(LinkModel::U61, IfaceMode::Layer5);

    let uid = [0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02];
    let mut data = vec![UID_OFFSET];
    data.extend_from_slice(&uid);
    data.extend(std::iter::repeat(0u8).take(23 - data.len()));

    let mut content = frame::encode_length((1 + data.len()) as u16);
    content.push(NI_READ_MEMORY_CMD);
    content.extend_from_slice(&data);

    let mut wire = vec![frame::SYNC, 0x00];
    wire.extend_from_slice(&frame::stuff(&content));
    wire.push(frame::checksum(&content));

    link.feed_rx(&wire).expect("feed uid response");
    link.service_uplink().expect("parse uid response");

    assert_eq!(link.unique_id(), Some(uid));
    assert_eq!(transport.take_written(), vec![0xD0]); // layer-5 mode command
}

#[test]
fn no_response_retries_until_ceiling_then_sets_layer_mode_without_uid() {
    let (link, transport) = open_link_with_transport(LinkModel::U61, IfaceMode::Layer5);

    for _ in 0..10 {
        link.service_downlink(UID_WAIT_TIME_MS + 1).expect("tick");
        // Each timeout re-issues the read-memory request.
        assert_eq!(transport.take_written(), vec![NI_READ_MEMORY_CMD, UID_OFFSET, 6]);
    }

    // The 11th timeout exceeds the retry ceiling: no further request is
    // sent, just the layer-mode command.
    link.service_downlink(UID_WAIT_TIME_MS + 1).expect("tick past ceiling");
    assert_eq!(transport.take_written(), vec![0xD0]);
    assert_eq!(link.unique_id(), None);
}
