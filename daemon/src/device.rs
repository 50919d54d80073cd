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

//! One discovered Modbus device.
//!
//! Tracks error counters and health, polls the register blocks its map
//! describes, and keeps a bounded history of readings per block. A
//! device that fails too many commands in a row goes dormant and is
//! skipped by the monitor loop until a later scan revives it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use log::debug;
use log::info;
use log::warn;
use serde::Serialize;
use serde_json::json;

use crate::error::RackmonError;
use crate::modbus::Modbus;
use crate::modbus::wire;
use crate::regmap::RegisterDescriptor;
use crate::regmap::RegisterFormat;
use crate::regmap::RegisterMap;

/// Consecutive command failures before a device is declared dormant.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    Active,
    Dormant,
}

/// Snapshot of a device's health, as reported over D-Bus.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub addr: u8,
    #[serde(rename = "type")]
    pub device_type: String,
    pub mode: DeviceMode,
    pub baudrate: u32,
    pub crc_fails: u64,
    pub timeouts: u64,
    pub misc_fails: u64,
    pub consecutive_fails: u32,
    /// Unix time of the last successful exchange.
    pub last_active: u64,
}

/// One register block's reading history.
struct RegisterStore {
    desc: RegisterDescriptor,
    /// Oldest first, at most `desc.keep` entries.
    history: VecDeque<Reading>,
}

struct Reading {
    time: u64,
    data: Vec<u16>,
}

impl RegisterStore {
    fn new(desc: &RegisterDescriptor) -> Self {
        Self {
            desc: desc.clone(),
            history: VecDeque::with_capacity(desc.keep),
        }
    }

    fn push(&mut self, time: u64, data: Vec<u16>) {
        if self.history.len() == self.desc.keep {
            self.history.pop_front();
        }
        self.history.push_back(Reading { time, data });
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Render one reading's raw words per the block's format.
fn decode_value(desc: &RegisterDescriptor, data: &[u16]) -> serde_json::Value {
    match desc.format {
        RegisterFormat::Hex => {
            let hex: String = data
                .iter()
                .flat_map(|word| word.to_be_bytes())
                .map(|byte| format!("{byte:02x}"))
                .collect();
            json!(hex)
        }
        RegisterFormat::String => {
            let text: String = data
                .iter()
                .flat_map(|word| word.to_be_bytes())
                .take_while(|byte| *byte != 0)
                .map(|byte| byte as char)
                .collect();
            json!(text)
        }
        RegisterFormat::Integer => {
            let mut value: u64 = 0;
            for word in data {
                value = (value << 16) | u64::from(*word);
            }
            json!(value)
        }
        RegisterFormat::Float => {
            let mut raw: u64 = 0;
            for word in data {
                raw = (raw << 16) | u64::from(*word);
            }
            json!(raw as f64 / 2.0f64.powi(desc.scale as i32))
        }
        RegisterFormat::Flags => {
            let mut raw: u64 = 0;
            for word in data {
                raw = (raw << 16) | u64::from(*word);
            }
            let bits: Vec<serde_json::Value> = desc
                .flags
                .iter()
                .map(|flag| json!([flag.0, flag.1, (raw >> flag.0) & 1 == 1]))
                .collect();
            json!(bits)
        }
    }
}

/// A device discovered on one of the buses.
pub struct ModbusDevice {
    bus: Arc<Modbus>,
    addr: u8,
    map: Arc<RegisterMap>,
    baudrate: u32,
    mode: DeviceMode,
    crc_fails: u64,
    timeouts: u64,
    misc_fails: u64,
    consecutive_fails: u32,
    last_active: u64,
    stores: Vec<RegisterStore>,
}

impl ModbusDevice {
    pub fn new(bus: Arc<Modbus>, addr: u8, map: Arc<RegisterMap>) -> Self {
        let stores = map.registers.iter().map(RegisterStore::new).collect();
        let baudrate = map.default_baudrate;
        Self {
            bus,
            addr,
            map,
            baudrate,
            mode: DeviceMode::Active,
            crc_fails: 0,
            timeouts: 0,
            misc_fails: 0,
            consecutive_fails: 0,
            last_active: 0,
            stores,
        }
    }

    pub fn addr(&self) -> u8 {
        self.addr
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn map(&self) -> &Arc<RegisterMap> {
        &self.map
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            addr: self.addr,
            device_type: self.map.name.clone(),
            mode: self.mode,
            baudrate: self.baudrate,
            crc_fails: self.crc_fails,
            timeouts: self.timeouts,
            misc_fails: self.misc_fails,
            consecutive_fails: self.consecutive_fails,
            last_active: self.last_active,
        }
    }

    /// Run one exchange and update health counters from the outcome.
    ///
    /// Exception responses count as proof of life: the device decoded
    /// our frame and answered, so they clear the consecutive-failure
    /// streak even though the error still propagates to the caller.
    fn command(
        &mut self,
        req: Vec<u8>,
        expected_len: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, RackmonError> {
        if self.mode == DeviceMode::Dormant {
            return Err(RackmonError::Dormant { addr: self.addr });
        }
        let result = self.bus.command(req, expected_len, timeout, self.baudrate);
        match &result {
            Ok(_) => self.note_success(),
            Err(RackmonError::Exception { .. }) => self.note_success(),
            Err(RackmonError::Crc { .. }) => {
                self.crc_fails += 1;
                self.note_failure();
            }
            Err(RackmonError::Timeout { .. }) => {
                self.timeouts += 1;
                self.note_failure();
            }
            Err(_) => {
                self.misc_fails += 1;
                self.note_failure();
            }
        }
        result
    }

    fn note_success(&mut self) {
        self.consecutive_fails = 0;
        self.last_active = unix_now();
    }

    fn note_failure(&mut self) {
        self.consecutive_fails += 1;
        if self.consecutive_fails >= MAX_CONSECUTIVE_FAILURES {
            warn!(
                "device 0x{:02x} failed {} commands in a row, marking dormant",
                self.addr, self.consecutive_fails
            );
            self.mode = DeviceMode::Dormant;
        }
    }

    pub fn read_holding_registers(
        &mut self,
        reg: u16,
        count: u16,
        timeout: Option<Duration>,
    ) -> Result<Vec<u16>, RackmonError> {
        let req = wire::read_holding_registers_req(self.addr, reg, count);
        let expected = wire::read_holding_registers_resp_len(count);
        let payload = self.command(req, expected, timeout)?;
        wire::parse_read_holding_registers(self.addr, count, &payload)
    }

    pub fn write_single_register(
        &mut self,
        reg: u16,
        value: u16,
        timeout: Option<Duration>,
    ) -> Result<u16, RackmonError> {
        let req = wire::write_single_register_req(self.addr, reg, value);
        let payload = self.command(req, wire::WRITE_SINGLE_REGISTER_RESP_LEN, timeout)?;
        wire::parse_write_single_register(self.addr, reg, &payload)
    }

    pub fn write_multiple_registers(
        &mut self,
        reg: u16,
        values: &[u16],
        timeout: Option<Duration>,
    ) -> Result<(), RackmonError> {
        let req = wire::write_multiple_registers_req(self.addr, reg, values);
        let payload = self.command(req, wire::WRITE_MULTIPLE_REGISTERS_RESP_LEN, timeout)?;
        wire::parse_write_multiple_registers(self.addr, reg, values.len() as u16, &payload)
    }

    /// Send an arbitrary request frame (without CRC) and return the
    /// CRC-stripped response payload.
    pub fn raw_command(
        &mut self,
        req: Vec<u8>,
        expected_len: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, RackmonError> {
        self.command(req, expected_len, timeout)
    }

    /// Read the map's probe register. Succeeding revives a dormant
    /// device.
    pub fn probe(&mut self) -> Result<(), RackmonError> {
        let was_dormant = self.mode == DeviceMode::Dormant;
        // Bypass the dormancy fast-fail so the scan loop can revive us.
        self.mode = DeviceMode::Active;
        let req = wire::read_holding_registers_req(self.addr, self.map.probe_register, 1);
        let expected = wire::read_holding_registers_resp_len(1);
        let result = self
            .command(req, expected, None)
            .and_then(|payload| wire::parse_read_holding_registers(self.addr, 1, &payload));
        match result {
            Ok(_) => {
                if was_dormant {
                    info!("device 0x{:02x} is responding again", self.addr);
                    self.consecutive_fails = 0;
                }
                Ok(())
            }
            Err(e) => {
                if was_dormant {
                    self.mode = DeviceMode::Dormant;
                }
                Err(e)
            }
        }
    }

    /// Ask the device to move to its map's preferred baud rate, then
    /// follow it there. A device without a baud_config stays at its
    /// default rate.
    pub fn negotiate_baudrate(&mut self) -> Result<(), RackmonError> {
        let preferred = self.map.preferred_baudrate;
        if preferred == 0 || preferred == self.baudrate {
            return Ok(());
        }
        let Some(config) = self.map.baud_config.clone() else {
            return Ok(());
        };
        let Some(value) = config.value_for(preferred) else {
            warn!(
                "device 0x{:02x}: no baud_value_map entry for {} baud",
                self.addr, preferred
            );
            return Ok(());
        };
        self.write_single_register(config.reg, value, None)?;
        info!(
            "device 0x{:02x} moved from {} to {} baud",
            self.addr, self.baudrate, preferred
        );
        self.baudrate = preferred;
        Ok(())
    }

    /// Put the device back at its default baud rate, for a clean
    /// handoff to whatever talks to the bus next.
    pub fn restore_default_baudrate(&mut self) -> Result<(), RackmonError> {
        let default = self.map.default_baudrate;
        if self.baudrate == default {
            return Ok(());
        }
        let Some(config) = self.map.baud_config.clone() else {
            return Ok(());
        };
        let Some(value) = config.value_for(default) else {
            return Ok(());
        };
        self.write_single_register(config.reg, value, None)?;
        info!("device 0x{:02x} restored to {} baud", self.addr, default);
        self.baudrate = default;
        Ok(())
    }

    /// Poll every register block in the map once. Individual block
    /// failures are tolerated so one bad block does not starve the
    /// rest; the counters still record them.
    pub fn monitor(&mut self) {
        for i in 0..self.stores.len() {
            if self.mode == DeviceMode::Dormant {
                break;
            }
            let (begin, length) = {
                let desc = &self.stores[i].desc;
                (desc.begin, desc.length)
            };
            match self.read_holding_registers(begin, length, None) {
                Ok(data) => self.stores[i].push(unix_now(), data),
                Err(e) => {
                    debug!(
                        "device 0x{:02x}: poll of register 0x{begin:04x} failed: {e}",
                        self.addr
                    );
                }
            }
        }
    }

    /// Monitor history with raw register words, oldest reading first.
    pub fn raw_data(&self) -> serde_json::Value {
        self.data(false)
    }

    /// Monitor history with formatted values, oldest reading first.
    pub fn value_data(&self) -> serde_json::Value {
        self.data(true)
    }

    fn data(&self, decode: bool) -> serde_json::Value {
        let ranges: Vec<serde_json::Value> = self
            .stores
            .iter()
            .map(|store| {
                let readings: Vec<serde_json::Value> = store
                    .history
                    .iter()
                    .map(|reading| {
                        if decode {
                            json!({
                                "time": reading.time,
                                "value": decode_value(&store.desc, &reading.data),
                                "type": store.desc.format,
                            })
                        } else {
                            json!({
                                "time": reading.time,
                                "data": reading.data,
                            })
                        }
                    })
                    .collect();
                json!({
                    "begin": store.desc.begin,
                    "name": store.desc.name,
                    "readings": readings,
                })
            })
            .collect();
        json!({
            "addr": self.addr,
            "type": self.map.name,
            "now": unix_now(),
            "ranges": ranges,
        })
    }
}
