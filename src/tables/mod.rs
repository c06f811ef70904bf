// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod address;
pub mod alias;
pub mod domain;
pub mod dp_config;
pub mod node;
