// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end version of spec.md §8 scenario 5: a corrupted ISI segment
//! is detected on start, the engine reverts to factory defaults instead
//! of failing, and a diagnostic event is raised for the application.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use lon_dx_stack::{
    isi::{volatile::ChannelType, IsiDeviceType, IsiEngine, IsiStartParams, PROTOCOL_VERSION},
    persist::{
        backend::{Backend, MemBackend},
        codec::HEADER_LEN,
        write_image, Segment, SIGNATURE_ISI,
    },
};

#[test]
fn corrupted_isi_segment_falls_back_to_factory_defaults() {
    let backend: Arc<dyn Backend> = Arc::new(MemBackend::new());

    write_image(backend.as_ref(), Segment::Isi, PROTOCOL_VERSION as u16, SIGNATURE_ISI, 0, &[7u8; 9])
        .expect("seed a persisted image");

    // Flip a body byte directly in the backend, simulating storage
    // corruption discovered on the next start.
    let read_handle = backend.open_for_read(Segment::Isi).expect("open for read");
    let mut whole = backend.read(&read_handle, 0, read_handle.len()).expect("read whole image");
    whole[HEADER_LEN] ^= 0xFF;
    let mut write_handle = backend.open_for_write(Segment::Isi, whole.len()).expect("reopen for write");
    backend.write(&mut write_handle, 0, &whole).expect("write corrupted image");
    backend.close(write_handle).expect("close");

    let isi = Arc::new(IsiEngine::new(backend, false, false));
    let diagnostic_raised = Arc::new(AtomicBool::new(false));
    let flag = diagnostic_raised.clone();
    isi.callbacks_mut().set_update_diagnostics(Some(Box::new(move |_event, _param| {
        flag.store(true, Ordering::SeqCst);
    })));

    isi.start(IsiStartParams {
        device_type: IsiDeviceType::Simple,
        connections: 16,
        did_length: 6,
        default_did: [0; 6],
        repeat_count: 1,
        channel_type: ChannelType::TpFt,
    })
    .expect("start recovers instead of failing");

    assert!(isi.is_running());
    assert!(diagnostic_raised.load(Ordering::SeqCst), "expected a diagnostic event on corruption");
    assert!(!isi.is_connected(1).expect("connection table reset"));
}
