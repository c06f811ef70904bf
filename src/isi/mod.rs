// SPDX-License-Identifier: AGPL-3.0-or-later

//! The ISI self-installation engine (spec.md §4.D): a periodic state
//! machine that discovers peers, negotiates connections, allocates
//! selectors and addresses, and reconciles the persisted connection
//! table.

pub mod callbacks;
pub mod connection;
pub mod messages;
pub mod persist;
pub mod scheduler;
pub mod selector;
pub mod volatile;

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::{
    error::IsiApiError,
    isi::{
        callbacks::IsiCallbacks,
        connection::{ConnectionState, ConnectionTable, IsiConnection, Role},
        messages::{encode_csmo, IsiSubcode, ISI_MESSAGE_CODE},
        persist::IsiPersist,
        scheduler::PeriodicScheduler,
        selector::SelectorPool,
        volatile::{ChannelType, IsiState, IsiVolatile, BUCKET_SIZE},
    },
    persist::{backend::Backend, read_image, write_image, Segment, SIGNATURE_ISI},
    tables::{
        address::{AddressEntry, GroupAddress, ADDRESS_TABLE_SIZE, ADDRESS_UNBOUND},
        node::NodeTables,
    },
};

/// `ISI_T_ENROLL`: manual/automatic enrollment window (spec.md §4.D).
pub const ISI_T_ENROLL_MS: u32 = 5 * 60 * 1000;
/// `ISI_T_CSMO`: CSMO broadcast window (spec.md §8 scenario 4).
pub const ISI_T_CSMO_MS: u32 = 5 * 1000;

pub const PROTOCOL_VERSION: u8 = 1;
pub const IMPLEMENTATION_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum IsiDeviceType {
    Simple,
    Da,
    Das,
}

pub struct IsiStartParams {
    pub device_type: IsiDeviceType,
    pub connections: u16,
    pub did_length: u8,
    pub default_did: [u8; 6],
    pub repeat_count: u8,
    pub channel_type: ChannelType,
}

/// An outbound ISI message awaiting delivery via the host stack's
/// `MsgSend` (spec.md §4.D's messaging contract); drained by core glue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsiOutbound {
    pub code: u8,
    pub body: Vec<u8>,
}

pub struct IsiEngine {
    backend: std::sync::Arc<dyn Backend>,
    support_dadas: bool,
    support_heartbeats: bool,
    persist: Mutex<IsiPersist>,
    volatile: Mutex<IsiVolatile>,
    connections: ConnectionTable,
    selectors: SelectorPool,
    scheduler: Mutex<PeriodicScheduler>,
    callbacks: Mutex<IsiCallbacks>,
    outbound: Mutex<VecDeque<IsiOutbound>>,
    /// The node's address/datapoint/alias tables, so the engine can bind a
    /// connection to an address-table entry and reprogram datapoints on
    /// selector conflicts without the host application wiring it in.
    node_tables: NodeTables,
}

impl IsiEngine {
    pub fn new(backend: std::sync::Arc<dyn Backend>, support_dadas: bool, support_heartbeats: bool) -> Self {
        Self {
            backend,
            support_dadas,
            support_heartbeats,
            persist: Mutex::new(IsiPersist::default()),
            volatile: Mutex::new(IsiVolatile::default()),
            connections: ConnectionTable::default(),
            selectors: SelectorPool::new(),
            scheduler: Mutex::new(PeriodicScheduler::new()),
            callbacks: Mutex::new(IsiCallbacks::new()),
            outbound: Mutex::new(VecDeque::new()),
            node_tables: NodeTables::default(),
        }
    }

    pub fn callbacks_mut(&self) -> std::sync::MutexGuard<'_, IsiCallbacks> {
        self.callbacks.lock().expect("callbacks lock poisoned")
    }

    /// Validates `params`, loads persisted state (restoring factory
    /// defaults on signature mismatch or corruption), seeds the
    /// connection table if empty, and arms the periodic scheduler
    /// (spec.md §4.D).
    pub fn start(&self, params: IsiStartParams) -> Result<(), IsiApiError> {
        if !matches!(params.did_length, 1 | 3 | 6) {
            return Err(IsiApiError::InvalidParameter);
        }
        if !matches!(params.repeat_count, 1 | 2 | 3) {
            return Err(IsiApiError::InvalidParameter);
        }

        let loaded = read_image(
            self.backend.as_ref(),
            Segment::Isi,
            PROTOCOL_VERSION as u16,
            SIGNATURE_ISI,
            0,
            IsiPersist::WIRE_LEN,
        );
        match loaded {
            Ok(bytes) => {
                let exact: [u8; IsiPersist::WIRE_LEN] =
                    bytes.try_into().map_err(|_| IsiApiError::InvalidParameter)?;
                *self.persist.lock().expect("persist lock poisoned") = IsiPersist::from_bytes(&exact);
                info!("isi engine: persisted state loaded");
            }
            Err(err) => {
                warn!(?err, "isi engine: persistence unavailable, restoring factory defaults");
                self.callbacks_mut().notify_diagnostics(0, 0);
                *self.persist.lock().expect("persist lock poisoned") = IsiPersist::default();
                self.connections.clear_all();
            }
        }

        {
            let mut volatile = self.volatile.lock().expect("volatile lock poisoned");
            volatile.running = true;
            volatile.state = IsiState::Normal;
            volatile.channel_type = params.channel_type;
        }

        info!(connections = params.connections, "isi engine started");
        Ok(())
    }

    /// Idempotent: `Stop; Stop` is equivalent to `Stop` (spec.md §8).
    pub fn stop(&self) {
        let mut volatile = self.volatile.lock().expect("volatile lock poisoned");
        volatile.running = false;
        volatile.state = IsiState::Stopped;
    }

    pub fn is_running(&self) -> bool {
        self.volatile.lock().expect("volatile lock poisoned").running
    }

    /// Advances one scheduler tick, emitting any due periodic message.
    pub fn tick(&self, elapsed_ms: u32) -> Result<(), IsiApiError> {
        if !self.is_running() {
            return Err(IsiApiError::NotRunning);
        }

        let kind = self.scheduler.lock().expect("scheduler lock poisoned").tick();
        match kind {
            scheduler::SlotKind::Drum => self.send_drum()?,
            scheduler::SlotKind::Csmr | scheduler::SlotKind::Csmi => {
                self.push_outbound(IsiSubcode::Csmr, vec![]);
            }
            scheduler::SlotKind::Timg => self.push_outbound(IsiSubcode::Timg, vec![]),
            scheduler::SlotKind::Heartbeat if self.support_heartbeats => {}
            scheduler::SlotKind::Heartbeat | scheduler::SlotKind::Application => {}
        }

        self.advance_enrollment_timers(elapsed_ms);
        self.sweep_address_table();
        Ok(())
    }

    /// `_IsiSweepAddressTable` equivalent (spec.md §4.D): frees any
    /// address-table entry no longer referenced by a connection, so
    /// cancelled/deleted enrollments don't permanently consume a bucket
    /// slot.
    fn sweep_address_table(&self) {
        let referenced: std::collections::HashSet<u8> = self
            .connections
            .iter_snapshot()
            .into_iter()
            .filter(|c| c.state != ConnectionState::Unused)
            .map(|c| c.address_table_index)
            .collect();

        for idx in 0..ADDRESS_TABLE_SIZE {
            if referenced.contains(&(idx as u8)) {
                continue;
            }
            if !matches!(self.node_tables.query_address(idx), Ok(AddressEntry::Unassigned)) {
                let _ = self.node_tables.free_address(idx);
            }
        }
    }

    /// Binds a fresh address-table entry from the bucket reserved for the
    /// current channel type (TP/FT=64, PL20=128, other=192; spec.md §4.D),
    /// clamped to the table's actual size.
    fn allocate_address_entry(&self, group: u8) -> Result<u8, IsiApiError> {
        let channel_type = self.volatile.lock().expect("volatile lock poisoned").channel_type;
        let start = channel_type.bucket_start() as usize;
        let end = (start + BUCKET_SIZE as usize).min(ADDRESS_TABLE_SIZE);

        for idx in start..end {
            if matches!(self.node_tables.query_address(idx), Ok(AddressEntry::Unassigned)) {
                self.node_tables
                    .update_address(idx, AddressEntry::Group(GroupAddress { group_id: group, ..GroupAddress::default() }))
                    .map_err(IsiApiError::from)?;
                return Ok(idx as u8);
            }
        }
        Err(IsiApiError::AddressTableFull)
    }

    /// Reprograms every local datapoint/alias bound to `old` onto `new`,
    /// so an assembly that is issued a replacement selector keeps working
    /// without the application having to notice the change.
    fn reprogram_selector(&self, old: u16, new: u16) {
        for idx in 0..NodeTables::dp_config_table_size() {
            let Ok(mut cfg) = self.node_tables.query_dp_config(idx) else { continue };
            if cfg.selector() == old {
                cfg.set_selector(new);
                let _ = self.node_tables.update_dp_config(idx, cfg);
            }
        }
        for idx in 0..NodeTables::alias_table_size() {
            let Ok(mut alias) = self.node_tables.query_alias_config(idx) else { continue };
            if alias.config.selector() == old {
                alias.config.set_selector(new);
                let _ = self.node_tables.update_alias_config(idx, alias);
            }
        }
    }

    /// Finds another assembly's connection already holding `selector`, if
    /// any — the case where an incoming CSMO's announced selector collides
    /// with one this node already assigned to a different assembly.
    fn find_other_connection_holding(&self, selector: u16, assembly: u16) -> Option<usize> {
        self.connections
            .iter_snapshot()
            .into_iter()
            .enumerate()
            .find(|(_, c)| c.state != ConnectionState::Unused && c.assembly != assembly && c.selector == selector)
            .map(|(idx, _)| idx)
    }

    /// Decrements the CSMO window for assemblies currently `Inviting` or
    /// `PlannedParty`; at expiry the host confirms the connection by
    /// emitting CSMC regardless of whether a CSME arrived in the window
    /// (spec.md §8 scenario 4).
    fn advance_enrollment_timers(&self, elapsed_ms: u32) {
        let due: Vec<u16> = self
            .connections
            .iter_snapshot()
            .into_iter()
            .enumerate()
            .filter_map(|(idx, mut conn)| {
                if matches!(conn.state, ConnectionState::Inviting | ConnectionState::PlannedParty)
                    && conn.enroll_timeout_ticks > 0
                {
                    conn.enroll_timeout_ticks = conn.enroll_timeout_ticks.saturating_sub(elapsed_ms);
                    let expired = conn.enroll_timeout_ticks == 0;
                    let assembly = conn.assembly;
                    let _ = self.connections.set(idx, conn);
                    expired.then_some(assembly)
                } else {
                    None
                }
            })
            .collect();

        for assembly in due {
            let _ = self.create_enrollment(assembly);
        }
    }

    /// Clears every persisted/volatile ISI data structure and restarts
    /// from factory. Idempotent.
    pub fn return_to_factory_defaults(&self) {
        self.connections.clear_all();
        *self.persist.lock().expect("persist lock poisoned") = IsiPersist::default();
        let _ = write_image(
            self.backend.as_ref(),
            Segment::Isi,
            PROTOCOL_VERSION as u16,
            SIGNATURE_ISI,
            0,
            &IsiPersist::default().to_bytes(),
        );
        info!("isi engine: returned to factory defaults");
    }

    pub fn fetch_domain(&self) -> Result<[u8; 6], IsiApiError> {
        if !self.is_running() {
            return Err(IsiApiError::NotRunning);
        }
        Ok([0; 6])
    }

    pub fn fetch_device(&self) -> Result<u32, IsiApiError> {
        if !self.is_running() {
            return Err(IsiApiError::NotRunning);
        }
        Ok(self.persist.lock().expect("persist lock poisoned").serial)
    }

    /// Manual enrollment entry point (spec.md §8 scenario 4):
    /// broadcasts CSMO and arms the `ISI_T_CSMO` window.
    pub fn open_enrollment(&self, assembly: u16) -> Result<(), IsiApiError> {
        self.begin_enrollment(assembly, false)
    }

    /// Automatic enrollment entry point, driven by an inbound CSMO.
    pub fn initiate_auto_enrollment(&self, csmo: &[u8], assembly: u16) -> Result<(), IsiApiError> {
        let decoded = messages::decode_csmo(csmo).ok_or(IsiApiError::InvalidParameter)?;

        if let Some(conflicting_idx) = self.find_other_connection_holding(decoded.selector, assembly) {
            // A different local assembly already owns this selector: that
            // assembly keeps running, just under a freshly issued one, so
            // the incoming CSMO's selector is free for `assembly` to use.
            let mut conflicting = self.connections.get(conflicting_idx)?;
            let replacement = self.selectors.allocate()?;
            self.reprogram_selector(conflicting.selector, replacement);
            conflicting.selector = replacement;
            self.connections.set(conflicting_idx, conflicting)?;
        } else if !self.selectors.is_allocated(decoded.selector) {
            self.selectors.mark_allocated(decoded.selector);
        }

        let idx = self.connections.find_or_allocate(assembly)?;
        let mut conn = self.connections.get(idx)?;
        if conn.address_table_index == ADDRESS_UNBOUND {
            conn.address_table_index = self.allocate_address_entry(decoded.group)?;
        }
        conn.selector = decoded.selector;
        conn.group = decoded.group;
        conn.role = Role::Member;
        conn.state = ConnectionState::Accepted;
        conn.automatic = true;
        self.connections.set(idx, conn)
    }

    fn begin_enrollment(&self, assembly: u16, automatic: bool) -> Result<(), IsiApiError> {
        if !self.is_running() {
            return Err(IsiApiError::NotRunning);
        }
        let selector = self.selectors.allocate()?;
        let group = self.callbacks_mut().get_primary_group.as_ref().map_or(0, |f| f(assembly));

        let idx = self.connections.find_or_allocate(assembly)?;
        let mut conn = self.connections.get(idx)?;
        if conn.address_table_index == ADDRESS_UNBOUND {
            conn.address_table_index = self.allocate_address_entry(group)?;
        }
        conn.selector = selector;
        conn.role = Role::Host;
        conn.state = ConnectionState::Inviting;
        conn.enroll_timeout_ticks = ISI_T_CSMO_MS;
        conn.automatic = automatic;
        self.connections.set(idx, conn)?;

        self.push_outbound(IsiSubcode::Csmo, encode_csmo(assembly, selector, group));
        Ok(())
    }

    /// Called on receiving a CSME for `assembly`: transitions to
    /// `PlannedParty` (spec.md §4.D).
    pub fn on_csme_received(&self, assembly: u16) -> Result<(), IsiApiError> {
        let idx = self.connections.find_or_allocate(assembly)?;
        let mut conn = self.connections.get(idx)?;
        if conn.state == ConnectionState::Inviting {
            conn.state = ConnectionState::PlannedParty;
            self.connections.set(idx, conn)?;
        }
        Ok(())
    }

    /// At window expiry (or on explicit call), the host emits CSMC and
    /// commits the connection.
    pub fn create_enrollment(&self, assembly: u16) -> Result<(), IsiApiError> {
        let idx = self.connections.find_or_allocate(assembly)?;
        let mut conn = self.connections.get(idx)?;
        if !matches!(conn.state, ConnectionState::PlannedParty | ConnectionState::Inviting) {
            return Err(IsiApiError::InvalidParameter);
        }
        conn.state = ConnectionState::Host;
        self.connections.set(idx, conn)?;
        self.push_outbound(IsiSubcode::Csmc, assembly.to_be_bytes().to_vec());
        Ok(())
    }

    pub fn extend_enrollment(&self, assembly: u16) -> Result<(), IsiApiError> {
        let idx = self.connections.find_or_allocate(assembly)?;
        let mut conn = self.connections.get(idx)?;
        conn.enroll_timeout_ticks = ISI_T_ENROLL_MS;
        self.connections.set(idx, conn)
    }

    pub fn cancel_enrollment(&self, assembly: u16) -> Result<(), IsiApiError> {
        let idx = self.connections.find_or_allocate(assembly)?;
        let mut conn = self.connections.get(idx)?;
        self.selectors.release(conn.selector);
        conn.state = ConnectionState::Unused;
        self.connections.set(idx, conn)?;
        self.push_outbound(IsiSubcode::Csmx, assembly.to_be_bytes().to_vec());
        Ok(())
    }

    pub fn leave_enrollment(&self, assembly: u16) -> Result<(), IsiApiError> {
        self.cancel_enrollment(assembly)
    }

    pub fn delete_enrollment(&self, assembly: u16) -> Result<(), IsiApiError> {
        let idx = self.connections.find_or_allocate(assembly)?;
        let mut conn = self.connections.get(idx)?;
        self.selectors.release(conn.selector);
        conn.state = ConnectionState::Unused;
        self.connections.set(idx, conn)?;
        self.push_outbound(IsiSubcode::Csmd, assembly.to_be_bytes().to_vec());
        Ok(())
    }

    pub fn is_connected(&self, assembly: u16) -> Result<bool, IsiApiError> {
        let idx = self.connections.find_or_allocate(assembly)?;
        let conn = self.connections.get(idx)?;
        Ok(matches!(conn.state, ConnectionState::Host | ConnectionState::Member))
    }

    pub fn is_automatically_enrolled(&self, assembly: u16) -> Result<bool, IsiApiError> {
        let idx = self.connections.find_or_allocate(assembly)?;
        Ok(self.connections.get(idx)?.automatic)
    }

    pub fn is_becoming_host(&self, assembly: u16) -> Result<bool, IsiApiError> {
        let idx = self.connections.find_or_allocate(assembly)?;
        let conn = self.connections.get(idx)?;
        Ok(conn.role == Role::Host && matches!(conn.state, ConnectionState::Inviting | ConnectionState::PlannedParty))
    }

    pub fn send_drum(&self) -> Result<(), IsiApiError> {
        if !self.is_running() {
            return Err(IsiApiError::NotRunning);
        }
        let serial = self.persist.lock().expect("persist lock poisoned").serial;
        self.push_outbound(IsiSubcode::Drum, serial.to_be_bytes().to_vec());
        Ok(())
    }

    pub fn protocol_version(&self) -> u8 {
        PROTOCOL_VERSION
    }

    pub fn implementation_version(&self) -> u8 {
        IMPLEMENTATION_VERSION
    }

    pub fn issue_heartbeat(&self, dp_index: u16) -> Result<(), IsiApiError> {
        if !self.support_heartbeats {
            return Err(IsiApiError::InvalidParameter);
        }
        let due = self.callbacks_mut().query_heartbeat.as_ref().map_or(true, |f| f(dp_index));
        if due {
            self.push_outbound(IsiSubcode::Timg, dp_index.to_be_bytes().to_vec());
        }
        Ok(())
    }

    pub fn control_command(&self, unique_id: [u8; 6], assembly: u16, command: u8) -> Result<(), IsiApiError> {
        if !self.is_running() {
            return Err(IsiApiError::NotRunning);
        }
        info!(?unique_id, assembly, command, "isi control command");
        Ok(())
    }

    pub fn supports_dadas(&self) -> bool {
        self.support_dadas
    }

    fn push_outbound(&self, subcode: IsiSubcode, mut body: Vec<u8>) {
        let mut full = vec![subcode.to_byte()];
        full.append(&mut body);
        self.outbound
            .lock()
            .expect("outbound lock poisoned")
            .push_back(IsiOutbound { code: ISI_MESSAGE_CODE, body: full });
    }

    pub fn drain_outbound(&self) -> Vec<IsiOutbound> {
        self.outbound.lock().expect("outbound lock poisoned").drain(..).collect()
    }
}
