// SPDX-License-Identifier: AGPL-3.0-or-later

//! The ISI connection table (spec.md §3, §4.D): up to [`CONNECTION_TABLE_SIZE`]
//! records tying a local assembly to a selector, address-table index, and
//! enrollment role/state.

use std::sync::Mutex;

use crate::{error::IsiApiError, tables::address::ADDRESS_UNBOUND};

pub const CONNECTION_TABLE_SIZE: usize = 256;

/// Per-assembly enrollment state (spec.md §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unused,
    Pending,
    Approved,
    Inviting,
    PlannedParty,
    Invited,
    Accepted,
    Host,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsiConnection {
    pub assembly: u16,
    pub selector: u16,
    pub address_table_index: u8,
    pub group: u8,
    pub role: Role,
    pub state: ConnectionState,
    /// Ticks remaining before an open enrollment window expires
    /// (`ISI_T_ENROLL`, spec.md §4.D).
    pub enroll_timeout_ticks: u32,
    pub automatic: bool,
}

impl Default for IsiConnection {
    fn default() -> Self {
        Self {
            assembly: 0,
            selector: 0,
            address_table_index: ADDRESS_UNBOUND,
            group: 0,
            role: Role::Member,
            state: ConnectionState::Unused,
            enroll_timeout_ticks: 0,
            automatic: false,
        }
    }
}

pub struct ConnectionTable {
    rows: Mutex<Vec<IsiConnection>>,
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self { rows: Mutex::new(vec![IsiConnection::default(); CONNECTION_TABLE_SIZE]) }
    }
}

impl ConnectionTable {
    pub fn get(&self, index: usize) -> Result<IsiConnection, IsiApiError> {
        self.rows
            .lock()
            .expect("connection table lock poisoned")
            .get(index)
            .copied()
            .ok_or(IsiApiError::InvalidParameter)
    }

    pub fn set(&self, index: usize, conn: IsiConnection) -> Result<(), IsiApiError> {
        let mut rows = self.rows.lock().expect("connection table lock poisoned");
        let slot = rows.get_mut(index).ok_or(IsiApiError::InvalidParameter)?;
        *slot = conn;
        Ok(())
    }

    /// Finds the row for `assembly`, creating one in an unused slot if
    /// none exists yet. Fails with `ConnectionTableFull` if none free.
    pub fn find_or_allocate(&self, assembly: u16) -> Result<usize, IsiApiError> {
        let mut rows = self.rows.lock().expect("connection table lock poisoned");
        if let Some(idx) = rows.iter().position(|c| c.state != ConnectionState::Unused && c.assembly == assembly) {
            return Ok(idx);
        }
        let idx = rows
            .iter()
            .position(|c| c.state == ConnectionState::Unused)
            .ok_or(IsiApiError::ConnectionTableFull)?;
        rows[idx] = IsiConnection { assembly, ..IsiConnection::default() };
        Ok(idx)
    }

    pub fn clear_all(&self) {
        let mut rows = self.rows.lock().expect("connection table lock poisoned");
        for row in rows.iter_mut() {
            *row = IsiConnection::default();
        }
    }

    pub fn iter_snapshot(&self) -> Vec<IsiConnection> {
        self.rows.lock().expect("connection table lock poisoned").clone()
    }
}
