// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end version of spec.md §8 scenario 4: `OpenEnrollment` broadcasts
//! a CSMO, a CSME received within the window moves the assembly to
//! `PlannedParty`, and `CreateEnrollment` (whether called explicitly or
//! triggered by window expiry) emits a CSMC and connects the assembly.

use lon_dx_stack::isi::messages::{ISI_MESSAGE_CODE, IsiSubcode};

use super::common::{fresh_backend, running_isi};

#[test]
fn csme_within_window_leads_to_connection_on_create() {
    let isi = running_isi(fresh_backend());
    isi.open_enrollment(3).expect("open enrollment");

    let outbound = isi.drain_outbound();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].code, ISI_MESSAGE_CODE);
    assert_eq!(IsiSubcode::from_byte(outbound[0].body[0]), IsiSubcode::Csmo);

    isi.on_csme_received(3).expect("csme received");
    assert!(isi.is_becoming_host(3).expect("becoming host"));

    isi.create_enrollment(3).expect("create enrollment");
    assert!(isi.is_connected(3).expect("connected"));
}

#[test]
fn window_expiry_without_csme_still_creates_the_enrollment() {
    let isi = running_isi(fresh_backend());
    isi.open_enrollment(7).expect("open enrollment");
    isi.drain_outbound();

    // Advance past ISI_T_CSMO (5s) without a CSME ever arriving.
    isi.tick(5_001).expect("tick past enrollment window");

    assert!(isi.is_connected(7).expect("connected"));
    let outbound = isi.drain_outbound();
    assert!(
        outbound
            .iter()
            .any(|m| m.code == ISI_MESSAGE_CODE && IsiSubcode::from_byte(m.body[0]) == IsiSubcode::Csmc),
        "expected a CSMC among the outbound messages: {outbound:?}"
    );
}
