// SPDX-License-Identifier: AGPL-3.0-or-later

//! ISI wire messages (spec.md §4.D, §6, GLOSSARY): all carried as LON
//! explicit messages of code [`ISI_MESSAGE_CODE`] with a one-byte subcode.

pub const ISI_MESSAGE_CODE: u8 = 0x3D;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsiSubcode {
    /// Connection invite.
    Csmo,
    /// Enrollment acceptance.
    Csme,
    /// Connection create (host confirms).
    Csmc,
    /// Cancel an open enrollment.
    Csmx,
    /// Delete an existing connection.
    Csmd,
    /// Connection-status maintenance reminder.
    Csmr,
    /// Connection-status maintenance invariant.
    Csmi,
    /// Device-reset-and-update announcement.
    Drum,
    /// Timing/device-count message.
    Timg,
    Unknown(u8),
}

impl IsiSubcode {
    const CSMO: u8 = 0x01;
    const CSME: u8 = 0x02;
    const CSMC: u8 = 0x03;
    const CSMX: u8 = 0x04;
    const CSMD: u8 = 0x05;
    const CSMR: u8 = 0x06;
    const CSMI: u8 = 0x07;
    const DRUM: u8 = 0x08;
    const TIMG: u8 = 0x09;

    pub fn from_byte(byte: u8) -> Self {
        match byte {
            Self::CSMO => Self::Csmo,
            Self::CSME => Self::Csme,
            Self::CSMC => Self::Csmc,
            Self::CSMX => Self::Csmx,
            Self::CSMD => Self::Csmd,
            Self::CSMR => Self::Csmr,
            Self::CSMI => Self::Csmi,
            Self::DRUM => Self::Drum,
            Self::TIMG => Self::Timg,
            other => Self::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Csmo => Self::CSMO,
            Self::Csme => Self::CSME,
            Self::Csmc => Self::CSMC,
            Self::Csmx => Self::CSMX,
            Self::Csmd => Self::CSMD,
            Self::Csmr => Self::CSMR,
            Self::Csmi => Self::CSMI,
            Self::Drum => Self::DRUM,
            Self::Timg => Self::TIMG,
            Self::Unknown(b) => b,
        }
    }
}

/// Encodes a CSMO body: subcode, assembly, selector (spec.md §8
/// scenario 4's "body encoding per ISI spec" left as an implementation
/// detail — a flat big-endian struct is sufficient here).
pub fn encode_csmo(assembly: u16, selector: u16, group: u8) -> Vec<u8> {
    let mut out = vec![IsiSubcode::Csmo.to_byte()];
    out.extend_from_slice(&assembly.to_be_bytes());
    out.extend_from_slice(&selector.to_be_bytes());
    out.push(group);
    out
}

pub struct DecodedCsmo {
    pub assembly: u16,
    pub selector: u16,
    pub group: u8,
}

pub fn decode_csmo(body: &[u8]) -> Option<DecodedCsmo> {
    if body.len() < 6 || IsiSubcode::from_byte(body[0]) != IsiSubcode::Csmo {
        return None;
    }
    Some(DecodedCsmo {
        assembly: u16::from_be_bytes([body[1], body[2]]),
        selector: u16::from_be_bytes([body[3], body[4]]),
        group: body[5],
    })
}
