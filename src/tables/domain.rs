// SPDX-License-Identifier: AGPL-3.0-or-later

//! Domain table (spec.md §3, §4.A). At most [`DOMAIN_TABLE_SIZE`] entries;
//! index 0 is the node's primary domain.

use crate::error::TableError;

pub const DOMAIN_TABLE_SIZE: usize = 2;

/// Domain id length. LON domains encode 0, 1, 3 or 6 significant bytes of
/// `id`; any other declared length is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainIdLength {
    Zero,
    One,
    Three,
    Six,
}

impl DomainIdLength {
    pub fn byte_len(self) -> usize {
        match self {
            DomainIdLength::Zero => 0,
            DomainIdLength::One => 1,
            DomainIdLength::Three => 3,
            DomainIdLength::Six => 6,
        }
    }

    pub fn from_byte_len(len: usize) -> Option<Self> {
        Some(match len {
            0 => DomainIdLength::Zero,
            1 => DomainIdLength::One,
            3 => DomainIdLength::Three,
            6 => DomainIdLength::Six,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Domain {
    pub id: [u8; 6],
    pub invalid: bool,
    pub id_length: DomainIdLength,
    pub subnet: u8,
    pub nonclone: bool,
    pub node: u8,
    pub key: [u8; 6],
}

impl Default for Domain {
    fn default() -> Self {
        Self {
            id: [0; 6],
            invalid: true,
            id_length: DomainIdLength::Zero,
            subnet: 0,
            nonclone: false,
            node: 0,
            key: [0; 6],
        }
    }
}

impl Domain {
    /// Significant bytes of `id`, per the declared length.
    pub fn id_bytes(&self) -> &[u8] {
        &self.id[..self.id_length.byte_len()]
    }
}

/// Domain table. Index 0 is the primary domain; index 1 is optional.
#[derive(Debug, Clone)]
pub struct DomainTable {
    entries: [Domain; DOMAIN_TABLE_SIZE],
}

impl Default for DomainTable {
    fn default() -> Self {
        Self {
            entries: [Domain::default(); DOMAIN_TABLE_SIZE],
        }
    }
}

impl DomainTable {
    pub fn query(&self, index: usize) -> Result<Domain, TableError> {
        self.entries.get(index).copied().ok_or(TableError::IndexOutOfRange {
            index: index as u16,
            size: DOMAIN_TABLE_SIZE as u16,
        })
    }

    /// Updates a domain entry. A non-invalid domain must carry a real
    /// declared `id_length` (guaranteed by the type, which has no
    /// invalid-length variant) and is stored with its invalid flag forced
    /// off. Marking a domain invalid zeroes its id/length/key instead of
    /// storing the caller's bytes verbatim, so a later update can't
    /// resurrect the previous id by flipping the flag alone without
    /// re-supplying one (spec.md §3/§4.A).
    pub fn update(&mut self, index: usize, mut domain: Domain) -> Result<(), TableError> {
        if index >= DOMAIN_TABLE_SIZE {
            return Err(TableError::IndexOutOfRange {
                index: index as u16,
                size: DOMAIN_TABLE_SIZE as u16,
            });
        }
        if domain.invalid {
            domain.id = [0; 6];
            domain.id_length = DomainIdLength::Zero;
            domain.key = [0; 6];
        } else {
            domain.invalid = false;
        }
        self.entries[index] = domain;
        Ok(())
    }
}
