// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use lon_dx_stack::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    core_glue::CoreGlue,
    isi::{IsiEngine, IsiStartParams},
    link::{IfaceMode, LonUsbLinkInterface, transport::SimulatedUsbTransport, transport::UsbTransport},
    persist::backend::{Backend, MemBackend},
    tables::node::NodeTables,
};
use tokio::time::sleep;
use tracing::info;

/// Number of ticks the demo loop runs before exiting. This binary exists to
/// exercise the stack end to end, not to run as a long-lived daemon.
const DEMO_TICK_COUNT: u32 = 100;

/// Demo harness: loads configuration, brings up the node tables, the ISI
/// self-installation engine, and the configured USB link interfaces, then
/// drives `CoreGlue::run_once` on a fixed tick for `DEMO_TICK_COUNT` rounds.
///
/// The transport is a loopback [`SimulatedUsbTransport`] rather than a real
/// serial device, since this binary exists to exercise the stack end to
/// end, not to ship a vendor driver.
#[tokio::main]
async fn main() -> Result<()> {
    let _init_logger = init_logger("config/logger.yaml")?;

    let cfg = resolve_config_path("config/lon.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let _node_tables = Arc::new(NodeTables::default());

    let backend: Arc<dyn Backend> = Arc::new(MemBackend::new());
    let isi = Arc::new(IsiEngine::new(
        backend,
        cfg.isi.support_dadas,
        cfg.isi.support_heartbeats,
    ));
    isi.start(IsiStartParams {
        device_type: cfg.isi.device_type,
        connections: cfg.isi.connections,
        did_length: cfg.isi.did_length,
        default_did: cfg.isi.default_did_bytes().context("invalid DefaultDid")?,
        repeat_count: cfg.isi.repeat_count,
        channel_type: cfg.isi.channel_type,
    })
    .context("failed to start ISI engine")?;
    info!("ISI engine started");

    let mut links = Vec::with_capacity(cfg.link.interface_count as usize);
    for index in 0..cfg.link.interface_count {
        let transport = Arc::new(SimulatedUsbTransport::new());
        links.push(Arc::new(LonUsbLinkInterface::open(
            index,
            cfg.link.model,
            cfg.link.mode,
            transport as Arc<dyn UsbTransport>,
        )));
    }
    info!(count = links.len(), "usb link interfaces opened");

    let glue = CoreGlue::new(isi, links);

    let tick = Duration::from_millis(u64::from(cfg.runtime.tick_millis));
    for _ in 0..DEMO_TICK_COUNT {
        let routed = glue.run_once(cfg.runtime.tick_millis)?;
        for msg in routed {
            info!(?msg, "message routed");
        }
        sleep(tick).await;
    }

    Ok(())
}
