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

//! Read-only view of the service over D-Bus.

use std::sync::Arc;

use log::info;
use zbus::fdo;
use zbus::interface;

use crate::rackmon::Rackmon;

pub struct RackmondStatus {
    service: Arc<Rackmon>,
}

impl RackmondStatus {
    pub fn new(service: Arc<Rackmon>) -> Self {
        Self { service }
    }
}

#[interface(name = "org.openbmc.rackmond.status")]
impl RackmondStatus {
    /// Addresses of every discovered device, as a JSON array.
    async fn list_devices(&self) -> Result<String, fdo::Error> {
        info!("list_devices called");
        let addrs = self.service.list_devices().await;
        Ok(serde_json::to_string(&addrs)
            .map_err(|e| crate::error::RackmonError::Internal(e.to_string()))?)
    }

    /// Health counters and mode of one device, as a JSON object.
    async fn get_device_status(&self, addr: u8) -> Result<String, fdo::Error> {
        info!("get_device_status called with addr: 0x{addr:02x}");
        let status = self.service.device_status(addr).await?;
        Ok(serde_json::to_string(&status)
            .map_err(|e| crate::error::RackmonError::Internal(e.to_string()))?)
    }

    /// Status of every device plus paused state, as a JSON object.
    async fn get_status(&self) -> Result<String, fdo::Error> {
        info!("get_status called");
        Ok(self.service.status_json().await.to_string())
    }

    /// Monitor history of every device with raw register words.
    async fn get_monitor_data_raw(&self) -> Result<String, fdo::Error> {
        info!("get_monitor_data_raw called");
        Ok(self.service.data_json(true).await.to_string())
    }

    /// Monitor history of every device with values decoded per each
    /// block's format.
    async fn get_monitor_data_value(&self) -> Result<String, fdo::Error> {
        info!("get_monitor_data_value called");
        Ok(self.service.data_json(false).await.to_string())
    }

    /// Uptime, intervals, and last-scan bookkeeping.
    async fn get_scan_info(&self) -> Result<String, fdo::Error> {
        info!("get_scan_info called");
        Ok(self.service.scan_info().to_string())
    }
}
