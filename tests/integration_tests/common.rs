// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use lon_dx_stack::{
    isi::{IsiEngine, IsiStartParams, volatile::ChannelType},
    link::{IfaceMode, LonUsbLinkInterface, frame, frame::LinkModel, transport::SimulatedUsbTransport},
    persist::backend::{Backend, MemBackend},
};

/// Read-memory command and offset used for unique-ID acquisition
/// (spec.md §8 scenario 3); mirrored here since the constants are
/// private to the link module.
const NI_READ_MEMORY_CMD: u8 = 0x16;
const UID_OFFSET: u8 = 0x2D;
const UID_RESPONSE_LEN: usize = 23;

/// Opens a `LonUsbLinkInterface` over a fresh loopback transport and
/// returns both, discarding the UID-request bytes the interface writes
/// on open so callers start from an empty wire.
pub fn open_link_with_transport(
    model: LinkModel,
    mode: IfaceMode,
) -> (Arc<LonUsbLinkInterface>, Arc<SimulatedUsbTransport>) {
    let transport = Arc::new(SimulatedUsbTransport::new());
    let link = Arc::new(LonUsbLinkInterface::open(
        0,
        model,
        mode,
        transport.clone() as Arc<dyn lon_dx_stack::link::transport::UsbTransport>,
    ));
    transport.take_written();
    (link, transport)
}

/// Starts an `IsiEngine` against a fresh in-memory backend with sensible
/// defaults for a Simple device with six-byte domains.
pub fn running_isi(backend: Arc<dyn Backend>) -> Arc<IsiEngine> {
    let isi = Arc::new(IsiEngine::new(backend, false, false));
    isi.start(IsiStartParams {
        device_type: lon_dx_stack::isi::IsiDeviceType::Simple,
        connections: 16,
        did_length: 6,
        default_did: [0; 6],
        repeat_count: 1,
        channel_type: ChannelType::TpFt,
    })
    .expect("isi start");
    isi
}

pub fn fresh_backend() -> Arc<dyn Backend> {
    Arc::new(MemBackend::new())
}

/// Feeds a unique-ID read-memory response to `link`, clearing its
/// UID-wait filter so subsequent messages reach `service_uplink`'s
/// caller instead of being swallowed by the acquisition handshake.
pub fn complete_uid_acquisition(link: &LonUsbLinkInterface, uid: [u8; 6]) {
    let mut data = vec![UID_OFFSET];
    data.extend_from_slice(&uid);
    data.extend(std::iter::repeat(0u8).take(UID_RESPONSE_LEN - data.len()));

    let mut content = frame::encode_length((1 + data.len()) as u16);
    content.push(NI_READ_MEMORY_CMD);
    content.extend_from_slice(&data);

    let mut wire = vec![frame::SYNC, 0x00];
    wire.extend_from_slice(&frame::stuff(&content));
    wire.push(frame::checksum(&content));

    link.feed_rx(&wire).expect("feed uid response");
    link.service_uplink().expect("parse uid response");
}
