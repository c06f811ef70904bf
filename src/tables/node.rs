// SPDX-License-Identifier: AGPL-3.0-or-later

//! Aggregate node-table state and the index-addressed operations exposed by
//! spec.md §4.A: `Query*/Update*`, `SetNodeMode`, `SendServicePin`.
//!
//! Each table lives behind its own [`std::sync::Mutex`] so a reader of one
//! table is never blocked by a writer of another — the same per-resource
//! locking granularity the teacher applies to `ClientConnection`'s
//! independent `reader`/`writer` mutexes.

use std::sync::Mutex;

use tracing::info;

use crate::{
    error::TableError,
    tables::{
        address::{AddressEntry, AddressTable, ADDRESS_TABLE_SIZE},
        alias::{Alias, AliasTable, ALIAS_TABLE_SIZE},
        domain::{Domain, DomainTable},
        dp_config::{DpConfig, DpConfigTable, DP_CONFIG_TABLE_SIZE},
    },
};

/// LON node modes (ISO/IEC 14908-1 §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeMode {
    Offline,
    Online,
    Reset,
    ReturnToFactory,
}

/// Auxiliary state argument accompanying a mode transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeState {
    Normal,
    Flush,
    Wink,
    Unconfigured,
}

/// Opaque, fixed-size blob table standing in for the node's read-only data
/// and application config segments (spec.md §3's supplemented tables —
/// field-level decoding of those segments is product-specific and out of
/// scope per spec.md §1).
#[derive(Debug, Clone)]
pub struct BlobTable {
    data: Vec<u8>,
}

impl BlobTable {
    pub fn new(size: usize) -> Self {
        Self { data: vec![0; size] }
    }

    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, TableError> {
        self.data
            .get(offset..offset + len)
            .map(<[u8]>::to_vec)
            .ok_or(TableError::InvalidParameter)
    }

    pub fn write(&mut self, offset: usize, buf: &[u8]) -> Result<(), TableError> {
        let end = offset.checked_add(buf.len()).ok_or(TableError::InvalidParameter)?;
        let slot = self.data.get_mut(offset..end).ok_or(TableError::InvalidParameter)?;
        slot.copy_from_slice(buf);
        Ok(())
    }
}

/// Aggregate of every node table, addressed by stable index per spec.md §4.A.
pub struct NodeTables {
    domains: Mutex<DomainTable>,
    addresses: Mutex<AddressTable>,
    dp_configs: Mutex<DpConfigTable>,
    aliases: Mutex<AliasTable>,
    read_only: Mutex<BlobTable>,
    config_data: Mutex<BlobTable>,
    mode: Mutex<(NodeMode, ModeState)>,
}

impl Default for NodeTables {
    fn default() -> Self {
        Self {
            domains: Mutex::new(DomainTable::default()),
            addresses: Mutex::new(AddressTable::default()),
            dp_configs: Mutex::new(DpConfigTable::default()),
            aliases: Mutex::new(AliasTable::default()),
            read_only: Mutex::new(BlobTable::new(64)),
            config_data: Mutex::new(BlobTable::new(256)),
            mode: Mutex::new((NodeMode::Offline, ModeState::Normal)),
        }
    }
}

impl NodeTables {
    pub fn query_domain(&self, index: usize) -> Result<Domain, TableError> {
        self.domains.lock().expect("domain table lock poisoned").query(index)
    }

    pub fn update_domain(&self, index: usize, domain: Domain) -> Result<(), TableError> {
        self.domains.lock().expect("domain table lock poisoned").update(index, domain)
    }

    pub fn query_address(&self, index: usize) -> Result<AddressEntry, TableError> {
        self.addresses.lock().expect("address table lock poisoned").query(index)
    }

    pub fn update_address(
        &self,
        index: usize,
        entry: AddressEntry,
    ) -> Result<(), TableError> {
        self.addresses
            .lock()
            .expect("address table lock poisoned")
            .update(index, entry)
    }

    pub fn free_address(&self, index: usize) -> Result<(), TableError> {
        self.addresses.lock().expect("address table lock poisoned").free(index)
    }

    pub fn query_dp_config(&self, index: usize) -> Result<DpConfig, TableError> {
        self.dp_configs.lock().expect("dp config table lock poisoned").query(index)
    }

    pub fn update_dp_config(
        &self,
        index: usize,
        cfg: DpConfig,
    ) -> Result<(), TableError> {
        DpConfigTable::validate_address_index(
            cfg.address_table_index,
            ADDRESS_TABLE_SIZE as u8,
        )?;
        self.dp_configs.lock().expect("dp config table lock poisoned").update(index, cfg)
    }

    pub fn query_alias_config(&self, index: usize) -> Result<Alias, TableError> {
        self.aliases.lock().expect("alias table lock poisoned").query(index)
    }

    pub fn update_alias_config(
        &self,
        index: usize,
        alias: Alias,
    ) -> Result<(), TableError> {
        self.aliases.lock().expect("alias table lock poisoned").update(index, alias)
    }

    pub fn query_read_only_data(
        &self,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, TableError> {
        self.read_only.lock().expect("read-only table lock poisoned").read(offset, len)
    }

    pub fn query_config_data(
        &self,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, TableError> {
        self.config_data.lock().expect("config data table lock poisoned").read(offset, len)
    }

    pub fn update_config_data(&self, offset: usize, buf: &[u8]) -> Result<(), TableError> {
        self.config_data
            .lock()
            .expect("config data table lock poisoned")
            .write(offset, buf)
    }

    /// Sets the node mode/state, per ISO 14908-1 §9. Every transition is
    /// audited at info level since it is operationally significant.
    pub fn set_node_mode(&self, mode: NodeMode, state: ModeState) {
        info!(?mode, ?state, "node mode transition");
        *self.mode.lock().expect("mode lock poisoned") = (mode, state);
    }

    pub fn node_mode(&self) -> (NodeMode, ModeState) {
        *self.mode.lock().expect("mode lock poisoned")
    }

    /// Emits the service-pin message. The actual LON message send is a
    /// core-glue responsibility; here we only record the audit event.
    pub fn send_service_pin(&self) {
        info!("service pin message requested");
    }

    pub const fn dp_config_table_size() -> usize {
        DP_CONFIG_TABLE_SIZE
    }

    pub const fn alias_table_size() -> usize {
        ALIAS_TABLE_SIZE
    }

    pub const fn address_table_size() -> usize {
        ADDRESS_TABLE_SIZE
    }
}
