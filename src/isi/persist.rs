// SPDX-License-Identifier: AGPL-3.0-or-later

//! ISI persistent state (spec.md §3): survives restarts, serialized via
//! [`crate::persist`].

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootType {
    Reboot,
    Reset,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsiPersist {
    pub device_count: Option<u16>,
    pub local_non_unique_id: u8,
    pub serial: u32,
    pub boot_type: BootType,
    pub repeat_count: u8,
}

impl Default for IsiPersist {
    fn default() -> Self {
        Self {
            device_count: None,
            local_non_unique_id: 0,
            serial: 0,
            boot_type: BootType::Reset,
            repeat_count: 1,
        }
    }
}

impl IsiPersist {
    pub const WIRE_LEN: usize = 9;

    pub fn to_bytes(self) -> [u8; Self::WIRE_LEN] {
        let mut buf = [0u8; Self::WIRE_LEN];
        let (has_count, count) = match self.device_count {
            Some(c) => (1u8, c),
            None => (0u8, 0u16),
        };
        buf[0] = has_count;
        buf[1..3].copy_from_slice(&count.to_be_bytes());
        buf[3] = self.local_non_unique_id;
        buf[4..8].copy_from_slice(&self.serial.to_be_bytes());
        buf[8] = match self.boot_type {
            BootType::Reboot => 0,
            BootType::Reset => 1,
            BootType::Restart => 2,
        };
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::WIRE_LEN]) -> Self {
        let device_count = if buf[0] != 0 {
            Some(u16::from_be_bytes([buf[1], buf[2]]))
        } else {
            None
        };
        Self {
            device_count,
            local_non_unique_id: buf[3],
            serial: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            boot_type: match buf[8] {
                0 => BootType::Reboot,
                2 => BootType::Restart,
                _ => BootType::Reset,
            },
            repeat_count: 1,
        }
    }
}
