// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

#![allow(clippy::all)]

mod integration_tests {
    pub mod common;

    pub mod code_packet_ack;
    pub mod frame_stuffing_roundtrip;
    pub mod isi_open_enrollment;
    pub mod persistence_corruption;
    pub mod reject_storm;
    pub mod unique_id_acquisition;
}
