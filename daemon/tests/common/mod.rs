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

//! A simulated RS-485 bus for exercising the daemon without hardware.
//!
//! [`FakeBus`] holds a set of simulated Modbus devices that answer read
//! and write requests with correctly framed responses, and knobs to
//! inject timeouts and CRC corruption for the failure-path tests.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use rackmond::error::RackmonError;
use rackmond::modbus::wire;
use rackmond::transport::Transport;

pub struct FakeDevice {
    pub registers: BTreeMap<u16, u16>,
    /// Reads of these registers answer with exception code 2.
    pub exception_regs: BTreeSet<u16>,
}

impl FakeDevice {
    pub fn new(registers: &[(u16, u16)]) -> Self {
        Self {
            registers: registers.iter().copied().collect(),
            exception_regs: BTreeSet::new(),
        }
    }
}

#[derive(Default)]
pub struct FakeBus {
    pub devices: BTreeMap<u8, FakeDevice>,
    pub baudrate: u32,
    /// Swallow this many requests (the caller sees a timeout).
    pub drop_requests: u32,
    /// Corrupt the CRC of this many responses.
    pub corrupt_responses: u32,
    /// Answer this many reads with a CRC-valid frame whose data field
    /// is empty.
    pub truncate_responses: u32,
    pending: Vec<u8>,
}

impl FakeBus {
    fn respond(&mut self, frame: &[u8]) {
        self.pending.clear();
        if self.drop_requests > 0 {
            self.drop_requests -= 1;
            return;
        }
        let Ok(req) = wire::verify(frame) else {
            return;
        };
        let addr = req[0];
        let function = req[1];
        let Some(device) = self.devices.get_mut(&addr) else {
            return;
        };
        let payload = match function {
            wire::READ_HOLDING_REGISTERS if req.len() == 6 => {
                let reg = u16::from_be_bytes([req[2], req[3]]);
                let count = u16::from_be_bytes([req[4], req[5]]);
                if (reg..reg + count).any(|r| device.exception_regs.contains(&r)) {
                    vec![addr, function | wire::EXCEPTION_FLAG, 2]
                } else {
                    let mut payload = vec![addr, function, (2 * count) as u8];
                    for r in reg..reg + count {
                        let value = device.registers.get(&r).copied().unwrap_or(0);
                        payload.extend_from_slice(&value.to_be_bytes());
                    }
                    payload
                }
            }
            wire::WRITE_SINGLE_REGISTER if req.len() == 6 => {
                let reg = u16::from_be_bytes([req[2], req[3]]);
                let value = u16::from_be_bytes([req[4], req[5]]);
                device.registers.insert(reg, value);
                req.to_vec()
            }
            wire::WRITE_MULTIPLE_REGISTERS if req.len() >= 7 => {
                let reg = u16::from_be_bytes([req[2], req[3]]);
                let count = u16::from_be_bytes([req[4], req[5]]);
                for (i, pair) in req[7..].chunks_exact(2).take(count as usize).enumerate() {
                    device
                        .registers
                        .insert(reg + i as u16, u16::from_be_bytes([pair[0], pair[1]]));
                }
                req[..6].to_vec()
            }
            _ => vec![addr, function | wire::EXCEPTION_FLAG, 1],
        };
        let payload = if self.truncate_responses > 0 && function == wire::READ_HOLDING_REGISTERS {
            self.truncate_responses -= 1;
            vec![addr, function, 0]
        } else {
            payload
        };
        let mut resp = wire::finalize(payload);
        if self.corrupt_responses > 0 {
            self.corrupt_responses -= 1;
            let last = resp.len() - 1;
            resp[last] ^= 0xFF;
        }
        self.pending = resp;
    }
}

/// Transport half of the fake bus; clone the inner handle to reach the
/// simulation state from the test body.
pub struct FakeTransport {
    pub bus: Arc<Mutex<FakeBus>>,
    path: String,
}

impl FakeTransport {
    pub fn new(bus: Arc<Mutex<FakeBus>>) -> Self {
        Self {
            bus,
            path: String::from("/dev/null"),
        }
    }
}

impl Transport for FakeTransport {
    fn path(&self) -> &str {
        &self.path
    }

    fn set_baud_rate(&mut self, baudrate: u32) -> Result<(), RackmonError> {
        self.bus.lock().unwrap().baudrate = baudrate;
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), RackmonError> {
        self.bus.lock().unwrap().respond(frame);
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, RackmonError> {
        let mut bus = self.bus.lock().unwrap();
        let n = bus.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&bus.pending[..n]);
        bus.pending.drain(..n);
        Ok(n)
    }
}

pub mod maps {
    /// A PSU model claiming addresses 160-165, probing register 104.
    pub const PSU: &str = r#"{
        "name": "test_psu",
        "address_range": [160, 165],
        "probe_register": 104,
        "default_baudrate": 19200,
        "preferred_baudrate": 19200,
        "baud_config": null,
        "registers": [
            {"begin": 0, "length": 2, "format": "hex", "name": "Model"},
            {"begin": 104, "length": 1, "keep": 3, "format": "float", "scale": 4, "name": "Input VAC"}
        ]
    }"#;

    /// A battery model that prefers a faster baud rate, switched by
    /// writing register 163.
    pub const BBU: &str = r#"{
        "name": "test_bbu",
        "address_range": [16, 18],
        "probe_register": 0,
        "default_baudrate": 19200,
        "preferred_baudrate": 115200,
        "baud_config": {"reg": 163, "baud_value_map": [[19200, 1], [115200, 4]]},
        "registers": [
            {"begin": 0, "length": 1, "format": "integer", "name": "State"}
        ]
    }"#;
}

/// Write the given register maps into a directory and load them.
pub fn regmap_db(dir: &std::path::Path, maps: &[&str]) -> rackmond::regmap::RegisterMapDatabase {
    for (i, map) in maps.iter().enumerate() {
        std::fs::write(dir.join(format!("map{i}.json")), map).unwrap();
    }
    rackmond::regmap::RegisterMapDatabase::load(dir).unwrap()
}

/// A [`rackmond::modbus::Modbus`] wired to a fresh fake bus.
pub fn fake_modbus() -> (Arc<rackmond::modbus::Modbus>, Arc<Mutex<FakeBus>>) {
    let bus = Arc::new(Mutex::new(FakeBus {
        baudrate: 19200,
        ..FakeBus::default()
    }));
    let modbus = Arc::new(rackmond::modbus::Modbus::new(
        Box::new(FakeTransport::new(Arc::clone(&bus))),
        19200,
        Duration::from_millis(10),
        Duration::ZERO,
    ));
    (modbus, bus)
}
