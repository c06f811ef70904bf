// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use lon_dx_stack::{
    cfg::config::Config, isi::IsiDeviceType, isi::volatile::ChannelType, link::frame::LinkModel,
};

fn repo_file(rel: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(rel)
}

#[test]
fn sample_config_loads_and_validates() {
    let cfg = Config::load_from_file(repo_file("config/lon.yaml")).expect("load sample config");

    assert_eq!(cfg.isi.device_type, IsiDeviceType::Simple);
    assert_eq!(cfg.isi.channel_type, ChannelType::TpFt);
    assert_eq!(cfg.link.model, LinkModel::U61);
    assert_eq!(cfg.runtime.tick_millis, 10);
    assert_eq!(cfg.isi.default_did_bytes().expect("did"), [0xa1, 0xb2, 0xc3, 0, 0, 0]);
}

#[test]
fn malformed_yaml_is_rejected() {
    let tmp = std::env::temp_dir().join("lon-dx-stack-bad-config-test.yaml");
    std::fs::write(&tmp, "isi: {DeviceType: Simple, Connections: 16, DidLength: 9, DefaultDid: \"ab\", RepeatCount: 1, ChannelType: TpFt}\nlink: {InterfaceCount: 1, Model: U61, Mode: Layer5}\nruntime: {TickMillis: 10, PersistencePath: null}\n").expect("write tmp config");

    let result = Config::load_from_file(&tmp);
    let _ = std::fs::remove_file(&tmp);

    assert!(result.is_err(), "DidLength=9 must fail validation");
}
