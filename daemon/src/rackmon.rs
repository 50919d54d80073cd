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

//! The monitoring service itself.
//!
//! Owns the buses and the set of discovered devices, and runs two
//! periodic loops: a scan pass that probes for new or recovered
//! devices, and a monitor pass that polls the register blocks of every
//! active device. The D-Bus interfaces call into this type.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use log::debug;
use log::info;
use log::warn;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::sync::RwLock;

use crate::config::ServiceConfig;
use crate::device::DeviceStatus;
use crate::device::ModbusDevice;
use crate::error::RackmonError;
use crate::modbus::Modbus;
use crate::regmap::RegisterMapDatabase;

struct DeviceEntry {
    bus: usize,
    device: Mutex<ModbusDevice>,
}

pub struct Rackmon {
    buses: Vec<Arc<Modbus>>,
    regmaps: RegisterMapDatabase,
    devices: RwLock<BTreeMap<u8, DeviceEntry>>,
    paused: AtomicBool,
    stopping: AtomicBool,
    rescan: Notify,
    scanned: Notify,
    stop: Notify,
    scan_interval: Duration,
    monitor_interval: Duration,
    started_at: Instant,
    last_scan: std::sync::Mutex<Option<Instant>>,
}

impl Rackmon {
    pub fn new(buses: Vec<Arc<Modbus>>, regmaps: RegisterMapDatabase, config: &ServiceConfig) -> Self {
        Self {
            buses,
            regmaps,
            devices: RwLock::new(BTreeMap::new()),
            paused: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            rescan: Notify::new(),
            scanned: Notify::new(),
            stop: Notify::new(),
            scan_interval: config.scan_interval,
            monitor_interval: config.monitor_interval,
            started_at: Instant::now(),
            last_scan: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the scan and monitor loops. Both run until [`shutdown`]
    /// fires.
    ///
    /// [`shutdown`]: Rackmon::shutdown
    pub fn start(self: &Arc<Self>) {
        let scanner = Arc::clone(self);
        tokio::spawn(async move { scanner.scan_loop().await });
        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.monitor_loop().await });
    }

    async fn scan_loop(self: Arc<Self>) {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            self.scan_once().await;
            self.scanned.notify_one();
            tokio::select! {
                _ = tokio::time::sleep(self.scan_interval) => {}
                _ = self.rescan.notified() => {
                    info!("scan requested over D-Bus");
                }
                _ = self.stop.notified() => break,
            }
        }
        debug!("scan loop exited");
    }

    async fn monitor_loop(self: Arc<Self>) {
        // The first sweep runs as soon as the initial scan pass has
        // discovered devices, not a full interval later.
        tokio::select! {
            _ = self.scanned.notified() => {}
            _ = self.stop.notified() => return,
        }
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            self.monitor_once().await;
            tokio::select! {
                _ = tokio::time::sleep(self.monitor_interval) => {}
                _ = self.stop.notified() => break,
            }
        }
        debug!("monitor loop exited");
    }

    /// One full scan pass: probe every mapped address on every bus for
    /// devices not yet known, and re-probe dormant devices.
    pub async fn scan_once(&self) {
        if self.paused.load(Ordering::SeqCst) {
            debug!("monitoring paused, skipping scan pass");
            return;
        }
        *self.last_scan.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        let known: Vec<u8> = {
            let devices = self.devices.read().await;
            devices.keys().copied().collect()
        };
        for addr in self.regmaps.all_addresses() {
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }
            if known.contains(&addr) {
                continue;
            }
            self.probe_new(addr).await;
        }
        self.recover_dormant().await;
    }

    async fn probe_new(&self, addr: u8) {
        let Some(map) = self.regmaps.find(addr) else {
            return;
        };
        for (bus_index, bus) in self.buses.iter().enumerate() {
            let mut device = ModbusDevice::new(Arc::clone(bus), addr, Arc::clone(&map));
            if device.probe().is_err() {
                continue;
            }
            info!(
                "found {} device at 0x{addr:02x} on {}",
                map.name,
                bus.path()
            );
            if let Err(e) = device.negotiate_baudrate() {
                warn!("device 0x{addr:02x}: baud negotiation failed: {e}");
            }
            let mut devices = self.devices.write().await;
            devices.insert(
                addr,
                DeviceEntry {
                    bus: bus_index,
                    device: Mutex::new(device),
                },
            );
            return;
        }
    }

    async fn recover_dormant(&self) {
        let devices = self.devices.read().await;
        for entry in devices.values() {
            let mut device = entry.device.lock().await;
            if device.mode() == crate::device::DeviceMode::Dormant {
                if let Err(e) = device.probe() {
                    debug!("device 0x{:02x} still dormant: {e}", device.addr());
                }
            }
        }
    }

    /// One monitor pass: poll every active device's register blocks.
    pub async fn monitor_once(&self) {
        if self.paused.load(Ordering::SeqCst) {
            debug!("monitoring paused, skipping monitor pass");
            return;
        }
        let devices = self.devices.read().await;
        for entry in devices.values() {
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }
            let mut device = entry.device.lock().await;
            if device.mode() == crate::device::DeviceMode::Active {
                device.monitor();
            }
        }
    }

    /// Stop polling. Returns the previous paused state.
    pub fn pause(&self) -> bool {
        self.paused.swap(true, Ordering::SeqCst)
    }

    /// Resume polling. Returns the previous paused state.
    pub fn resume(&self) -> bool {
        self.paused.swap(false, Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Wake the scan loop for an immediate pass.
    pub fn force_scan(&self) {
        self.rescan.notify_one();
    }

    pub async fn list_devices(&self) -> Vec<u8> {
        let devices = self.devices.read().await;
        devices.keys().copied().collect()
    }

    pub async fn device_status(&self, addr: u8) -> Result<DeviceStatus, RackmonError> {
        let devices = self.devices.read().await;
        let entry = devices
            .get(&addr)
            .ok_or(RackmonError::DeviceNotFound { addr })?;
        let device = entry.device.lock().await;
        Ok(device.status())
    }

    /// Status of every device plus bus inventory, as one JSON document.
    pub async fn status_json(&self) -> serde_json::Value {
        let devices = self.devices.read().await;
        let mut statuses = Vec::with_capacity(devices.len());
        for entry in devices.values() {
            let device = entry.device.lock().await;
            let mut status = serde_json::to_value(device.status()).unwrap_or(json!({}));
            if let Some(obj) = status.as_object_mut() {
                obj.insert(String::from("bus"), json!(self.buses[entry.bus].path()));
            }
            statuses.push(status);
        }
        json!({
            "paused": self.is_paused(),
            "devices": statuses,
        })
    }

    /// Monitor data for every device: raw register words if `raw`,
    /// formatted values otherwise.
    pub async fn data_json(&self, raw: bool) -> serde_json::Value {
        let devices = self.devices.read().await;
        let mut dumps = Vec::with_capacity(devices.len());
        for entry in devices.values() {
            let device = entry.device.lock().await;
            dumps.push(if raw {
                device.raw_data()
            } else {
                device.value_data()
            });
        }
        json!(dumps)
    }

    /// Scan bookkeeping: uptime, intervals, and time since the last
    /// scan pass.
    pub fn scan_info(&self) -> serde_json::Value {
        let last_scan = self
            .last_scan
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|at| at.elapsed().as_secs());
        json!({
            "uptime_s": self.started_at.elapsed().as_secs(),
            "scan_interval_s": self.scan_interval.as_secs(),
            "monitor_interval_s": self.monitor_interval.as_secs(),
            "seconds_since_last_scan": last_scan,
            "paused": self.is_paused(),
        })
    }

    pub async fn read_holding_registers(
        &self,
        addr: u8,
        reg: u16,
        count: u16,
    ) -> Result<Vec<u16>, RackmonError> {
        let devices = self.devices.read().await;
        let entry = devices
            .get(&addr)
            .ok_or(RackmonError::DeviceNotFound { addr })?;
        let mut device = entry.device.lock().await;
        device.read_holding_registers(reg, count, None)
    }

    pub async fn write_single_register(
        &self,
        addr: u8,
        reg: u16,
        value: u16,
    ) -> Result<u16, RackmonError> {
        let devices = self.devices.read().await;
        let entry = devices
            .get(&addr)
            .ok_or(RackmonError::DeviceNotFound { addr })?;
        let mut device = entry.device.lock().await;
        device.write_single_register(reg, value, None)
    }

    /// Pass an arbitrary frame through to the bus. The destination does
    /// not have to be a discovered device; unknown addresses go out on
    /// the first bus at their map's default rate (19200 when unmapped).
    pub async fn raw_command(
        &self,
        req: Vec<u8>,
        expected_len: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, RackmonError> {
        if req.is_empty() {
            return Err(RackmonError::Argument(String::from(
                "raw command payload is empty",
            )));
        }
        let addr = req[0];
        let devices = self.devices.read().await;
        if let Some(entry) = devices.get(&addr) {
            let mut device = entry.device.lock().await;
            return device.raw_command(req, expected_len, timeout);
        }
        let Some(bus) = self.buses.first() else {
            return Err(RackmonError::Internal(String::from("no buses configured")));
        };
        let map = self.regmaps.find(addr);
        let baudrate = map.map(|m| m.default_baudrate).unwrap_or(19200);
        bus.command(req, expected_len, timeout, baudrate)
    }

    /// Stop the loops and hand the devices back at their default baud
    /// rates.
    pub async fn shutdown(&self) {
        info!("shutting down, restoring device baud rates");
        self.stopping.store(true, Ordering::SeqCst);
        self.stop.notify_waiters();
        let devices = self.devices.read().await;
        for entry in devices.values() {
            let mut device = entry.device.lock().await;
            if let Err(e) = device.restore_default_baudrate() {
                warn!(
                    "device 0x{:02x}: failed to restore baud rate: {e}",
                    device.addr()
                );
            }
        }
    }
}
