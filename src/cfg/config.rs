// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    isi::{IsiDeviceType, volatile::ChannelType},
    link::{IfaceMode, frame::LinkModel},
};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// ISI self-installation engine startup parameters.
    pub isi: IsiConfig,
    /// USB link interface parameters.
    pub link: LinkConfig,
    /// Implementation/runtime parameters outside the LON protocol proper.
    pub runtime: RuntimeConfig,
}

/// Parameters passed to [`crate::isi::IsiEngine::start`] (spec.md §4.D, §6).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct IsiConfig {
    #[serde(rename = "DeviceType")]
    pub device_type: IsiDeviceType,

    #[serde(rename = "Connections")]
    /// Size of the connection table to allocate.
    pub connections: u16,

    #[serde(rename = "DidLength")]
    /// Length in bytes of `default_did`; must be 1, 3, or 6.
    pub did_length: u8,

    #[serde(rename = "DefaultDid")]
    /// Default domain ID, as up to 12 hex characters (e.g. `"a1b2c3"`).
    pub default_did: String,

    #[serde(rename = "RepeatCount")]
    /// CSMA repeat count used for ISI broadcasts; must be 1, 2, or 3.
    pub repeat_count: u8,

    #[serde(rename = "ChannelType")]
    pub channel_type: ChannelType,

    #[serde(rename = "SupportDaDas", default)]
    pub support_dadas: bool,

    #[serde(rename = "SupportHeartbeats", default)]
    pub support_heartbeats: bool,
}

impl IsiConfig {
    /// Parses [`Self::default_did`] into the fixed six-byte form the engine
    /// expects, left-padding unused trailing bytes with zero.
    pub fn default_did_bytes(&self) -> Result<[u8; 6]> {
        let digits = self.default_did.trim();
        ensure!(
            digits.len() == (self.did_length as usize) * 2,
            "DefaultDid must contain exactly {} hex characters for a {}-byte domain",
            (self.did_length as usize) * 2,
            self.did_length
        );
        let mut out = [0u8; 6];
        for (i, out_byte) in out.iter_mut().take(self.did_length as usize).enumerate() {
            let byte_str = digits
                .get(i * 2..i * 2 + 2)
                .context("DefaultDid has an odd number of hex characters")?;
            *out_byte =
                u8::from_str_radix(byte_str, 16).context("DefaultDid is not valid hex")?;
        }
        Ok(out)
    }
}

/// USB link interface configuration.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LinkConfig {
    #[serde(rename = "InterfaceCount")]
    /// Number of LON USB interfaces to open.
    pub interface_count: u8,

    #[serde(rename = "Model")]
    pub model: LinkModel,

    #[serde(rename = "Mode")]
    pub mode: IfaceMode,
}

/// Implementation-level runtime parameters.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    #[serde(rename = "TickMillis")]
    /// Duration, in milliseconds, of a single `CoreGlue::run_once` tick.
    pub tick_millis: u32,

    #[serde(rename = "PersistencePath")]
    /// Directory backing the on-disk persistence segments; `None` selects
    /// the in-memory backend.
    pub persistence_path: Option<String>,
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            matches!(self.isi.did_length, 1 | 3 | 6),
            "DidLength must be 1, 3, or 6"
        );
        ensure!(
            matches!(self.isi.repeat_count, 1 | 2 | 3),
            "RepeatCount must be 1, 2, or 3"
        );
        ensure!(self.isi.connections >= 1, "Connections must be >= 1");
        self.isi
            .default_did_bytes()
            .context("invalid DefaultDid")?;

        ensure!(
            self.link.interface_count >= 1,
            "InterfaceCount must be >= 1"
        );

        ensure!(self.runtime.tick_millis >= 1, "TickMillis must be >= 1");
        if let Some(path) = &self.runtime.persistence_path {
            ensure!(!path.is_empty(), "PersistencePath must not be empty when set");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            isi: IsiConfig {
                device_type: IsiDeviceType::Simple,
                connections: 16,
                did_length: 3,
                default_did: "a1b2c3".to_string(),
                repeat_count: 1,
                channel_type: ChannelType::TpFt,
                support_dadas: false,
                support_heartbeats: true,
            },
            link: LinkConfig {
                interface_count: 1,
                model: LinkModel::U61,
                mode: IfaceMode::Layer5,
            },
            runtime: RuntimeConfig { tick_millis: 10, persistence_path: None },
        }
    }

    #[test]
    fn valid_config_normalizes_cleanly() {
        let mut cfg = sample();
        cfg.validate_and_normalize().expect("valid");
    }

    #[test]
    fn rejects_bad_did_length() {
        let mut cfg = sample();
        cfg.isi.did_length = 4;
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn rejects_mismatched_default_did_digits() {
        let mut cfg = sample();
        cfg.isi.default_did = "ab".to_string();
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn default_did_bytes_pads_with_zero() {
        let cfg = sample();
        let bytes = cfg.isi.default_did_bytes().expect("parse");
        assert_eq!(bytes, [0xa1, 0xb2, 0xc3, 0, 0, 0]);
    }

    #[test]
    fn rejects_empty_persistence_path() {
        let mut cfg = sample();
        cfg.runtime.persistence_path = Some(String::new());
        assert!(cfg.validate_and_normalize().is_err());
    }
}
