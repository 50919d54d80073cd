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

//! Mutating operations over D-Bus: pause/resume the poll loops, force
//! a scan, and issue commands on the bus.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use zbus::fdo;
use zbus::interface;

use crate::comm::dbus::parse_hex_payload;
use crate::comm::dbus::to_hex;
use crate::error::RackmonError;
use crate::rackmon::Rackmon;

pub struct RackmondControl {
    service: Arc<Rackmon>,
}

impl RackmondControl {
    pub fn new(service: Arc<Rackmon>) -> Self {
        Self { service }
    }
}

#[interface(name = "org.openbmc.rackmond.control")]
impl RackmondControl {
    /// Stop the scan and monitor loops. Returns the previous state.
    async fn pause_monitoring(&self) -> Result<String, fdo::Error> {
        info!("pause_monitoring called");
        let was_paused = self.service.pause();
        Ok(format!("previously {}", if was_paused { "paused" } else { "running" }))
    }

    /// Restart the scan and monitor loops. Returns the previous state.
    async fn resume_monitoring(&self) -> Result<String, fdo::Error> {
        info!("resume_monitoring called");
        let was_paused = self.service.resume();
        Ok(format!("previously {}", if was_paused { "paused" } else { "running" }))
    }

    /// Wake the scan loop for an immediate device scan.
    async fn force_scan(&self) -> Result<String, fdo::Error> {
        info!("force_scan called");
        self.service.force_scan();
        Ok(String::from("scan requested"))
    }

    /// Send a raw frame (hex, no CRC) and return the hex response
    /// payload. `timeout_ms` of 0 uses the bus default.
    async fn raw_command(
        &self,
        payload: String,
        expected_len: u32,
        timeout_ms: u32,
    ) -> Result<String, fdo::Error> {
        info!("raw_command called with payload: '{payload}', expected_len: {expected_len}");
        let req = parse_hex_payload(&payload)?;
        let timeout = match timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(u64::from(ms))),
        };
        let expected = usize::try_from(expected_len)
            .map_err(|_| RackmonError::Argument(format!("bad expected_len {expected_len}")))?;
        let resp = self.service.raw_command(req, expected, timeout).await?;
        Ok(to_hex(&resp))
    }

    /// Read `count` holding registers from a discovered device. Returns
    /// a JSON array of register values.
    async fn read_holding_registers(
        &self,
        addr: u8,
        reg: u16,
        count: u16,
    ) -> Result<String, fdo::Error> {
        info!("read_holding_registers called with addr: 0x{addr:02x}, reg: {reg}, count: {count}");
        if count == 0 || count > 127 {
            return Err(RackmonError::Argument(format!(
                "register count {count} out of range 1..=127"
            ))
            .into());
        }
        let values = self.service.read_holding_registers(addr, reg, count).await?;
        Ok(serde_json::to_string(&values)
            .map_err(|e| RackmonError::Internal(e.to_string()))?)
    }

    /// Write one holding register on a discovered device. Returns the
    /// value echoed by the device.
    async fn write_single_register(
        &self,
        addr: u8,
        reg: u16,
        value: u16,
    ) -> Result<String, fdo::Error> {
        info!(
            "write_single_register called with addr: 0x{addr:02x}, reg: {reg}, value: 0x{value:04x}"
        );
        let echoed = self.service.write_single_register(addr, reg, value).await?;
        Ok(format!("0x{echoed:04x}"))
    }
}
