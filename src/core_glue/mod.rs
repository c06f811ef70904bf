// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core glue (spec.md §4.E): bridges the ISI engine and the USB link
//! interfaces to the application, advancing ticks and routing inbound
//! messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    error::LinkError,
    isi::{messages::ISI_MESSAGE_CODE, IsiEngine},
    link::LonUsbLinkInterface,
};

/// Destination classification for an inbound LON message (spec.md §4.E).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedMessage {
    DatapointUpdate { cmd: u8, payload: Vec<u8> },
    ExplicitMessage { cmd: u8, payload: Vec<u8> },
    IsiInbound { payload: Vec<u8> },
}

pub struct CoreGlue {
    isi: Arc<IsiEngine>,
    links: Vec<Arc<LonUsbLinkInterface>>,
    address_derivable_ip: AtomicBool,
}

impl CoreGlue {
    pub fn new(isi: Arc<IsiEngine>, links: Vec<Arc<LonUsbLinkInterface>>) -> Self {
        Self { isi, links, address_derivable_ip: AtomicBool::new(false) }
    }

    pub fn set_address_derivable_ip(&self, value: bool) {
        self.address_derivable_ip.store(value, Ordering::SeqCst);
    }

    pub fn address_derivable_ip(&self) -> bool {
        self.address_derivable_ip.load(Ordering::SeqCst)
    }

    /// Advances the ISI tick, services each link's retry/queue timers,
    /// drains inbound uplink messages and routes them, and forwards any
    /// ISI outbound messages to the first open link interface.
    pub fn run_once(&self, tick_duration_ms: u32) -> Result<Vec<RoutedMessage>, LinkError> {
        if self.isi.is_running() {
            if let Err(err) = self.isi.tick(tick_duration_ms) {
                warn!(?err, "core glue: isi tick failed");
            }
        }

        let mut routed = Vec::new();
        for link in &self.links {
            link.service_downlink(tick_duration_ms)?;
            for msg in link.service_uplink()? {
                routed.push(self.route(msg.cmd, msg.payload));
            }
        }

        for outbound in self.isi.drain_outbound() {
            if let Some(link) = self.links.first() {
                link.enqueue_message(
                    std::iter::once(outbound.code).chain(outbound.body).collect(),
                    false,
                )?;
            }
        }

        for msg in &routed {
            if let RoutedMessage::IsiInbound { payload } = msg {
                debug!(len = payload.len(), "core glue: isi inbound message routed");
            }
        }

        Ok(routed)
    }

    fn route(&self, cmd: u8, payload: Vec<u8>) -> RoutedMessage {
        if cmd == ISI_MESSAGE_CODE {
            RoutedMessage::IsiInbound { payload }
        } else if cmd & 0x80 != 0 {
            RoutedMessage::ExplicitMessage { cmd, payload }
        } else {
            RoutedMessage::DatapointUpdate { cmd, payload }
        }
    }
}
