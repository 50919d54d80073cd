// This file is part of rackmond, a Modbus/RS-485 rack power-shelf monitoring service.
//
// Copyright 2026 The rackmond authors.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// rackmond is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// rackmond is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Helpers shared by the D-Bus interfaces.

use crate::error::RackmonError;

pub mod control_interface;
pub mod status_interface;

/// Parse a whitespace-tolerant hex string ("a4 03 00 68" or "a4030068")
/// into bytes.
pub fn parse_hex_payload(hex: &str) -> Result<Vec<u8>, RackmonError> {
    let compact: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(RackmonError::Argument(String::from("empty hex payload")));
    }
    if compact.len() % 2 != 0 {
        return Err(RackmonError::Argument(format!(
            "hex payload has odd length {}",
            compact.len()
        )));
    }
    (0..compact.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&compact[i..i + 2], 16).map_err(|_| {
                RackmonError::Argument(format!("invalid hex byte '{}'", &compact[i..i + 2]))
            })
        })
        .collect()
}

/// Render bytes as space-separated lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
