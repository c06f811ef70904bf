// SPDX-License-Identifier: AGPL-3.0-or-later

//! ISI volatile state (spec.md §3): never persisted, rebuilt on `Start`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsiState {
    Stopped,
    Normal,
    Inviting,
    PlannedParty,
    Invited,
    Accepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChannelType {
    /// Twisted-pair / free-topology.
    TpFt,
    /// Power line (PL-20).
    Pl20,
    Other,
}

impl ChannelType {
    /// Starting address-table bucket for this channel (spec.md §4.D).
    pub fn bucket_start(self) -> u8 {
        match self {
            ChannelType::TpFt => 64,
            ChannelType::Pl20 => 128,
            ChannelType::Other => 192,
        }
    }
}

pub const BUCKET_SIZE: u8 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyType {
    Simple,
    Da,
    Das,
}

#[derive(Debug, Clone, Copy)]
pub struct IsiVolatile {
    pub running: bool,
    pub state: IsiState,
    pub channel_type: ChannelType,
    pub wait_ticks: u32,
    pub startup_ticks: u32,
    pub timeout_ticks: u32,
    pub spreading_interval_ticks: u32,
    pub current_slot: u8,
    pub pending_connection: Option<u16>,
}

impl Default for IsiVolatile {
    fn default() -> Self {
        Self {
            running: false,
            state: IsiState::Stopped,
            channel_type: ChannelType::TpFt,
            wait_ticks: 0,
            startup_ticks: 0,
            timeout_ticks: 0,
            spreading_interval_ticks: 50,
            current_slot: 0,
            pending_connection: None,
        }
    }
}
