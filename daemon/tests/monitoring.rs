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

//! Service-level behavior against a simulated bus: discovery, polling,
//! pause/resume, dormancy recovery, and shutdown.

mod common;

use std::sync::Arc;

use googletest::prelude::*;
use rackmond::config::ServiceConfig;
use rackmond::device::{DeviceMode, MAX_CONSECUTIVE_FAILURES};
use rackmond::error::RackmonError;
use rackmond::rackmon::Rackmon;

use common::{FakeBus, FakeDevice, fake_modbus, maps, regmap_db};

fn service_with(
    devices: &[(u8, &[(u16, u16)])],
    map_jsons: &[&str],
) -> (Arc<Rackmon>, Arc<std::sync::Mutex<FakeBus>>, tempfile::TempDir) {
    let (modbus, bus) = fake_modbus();
    {
        let mut bus = bus.lock().unwrap();
        for (addr, regs) in devices {
            bus.devices.insert(*addr, FakeDevice::new(regs));
        }
    }
    let dir = tempfile::tempdir().unwrap();
    let db = regmap_db(dir.path(), map_jsons);
    let service = Arc::new(Rackmon::new(vec![modbus], db, &ServiceConfig::default()));
    (service, bus, dir)
}

#[gtest]
#[tokio::test]
async fn scan_discovers_mapped_devices() {
    let (service, _bus, _dir) = service_with(
        &[
            (0xA0, &[(104, 1)]),
            (0xA4, &[(104, 2)]),
            // A device outside every map's range is ignored.
            (0x50, &[(104, 3)]),
        ],
        &[maps::PSU],
    );
    service.scan_once().await;
    assert_that!(service.list_devices().await, eq(&vec![0xA0, 0xA4]));

    let status = service.device_status(0xA0).await.unwrap();
    assert_that!(status.device_type, eq("test_psu"));
    assert_that!(status.mode, eq(DeviceMode::Active));

    let result = service.device_status(0x50).await;
    assert_that!(
        result,
        err(matches_pattern!(RackmonError::DeviceNotFound { .. }))
    );
}

#[gtest]
#[tokio::test]
async fn monitor_collects_data_for_active_devices() {
    let (service, _bus, _dir) = service_with(&[(0xA0, &[(0, 0x1111), (104, 0x20)])], &[maps::PSU]);
    service.scan_once().await;
    service.monitor_once().await;

    let data = service.data_json(true).await;
    let devices = data.as_array().unwrap();
    assert_that!(devices.len(), eq(1));
    let ranges = devices[0]["ranges"].as_array().unwrap();
    assert_that!(ranges.len(), eq(2));
    assert_that!(ranges[1]["readings"][0]["data"], eq(&serde_json::json!([0x20])));

    let status = service.status_json().await;
    assert_that!(status["paused"], eq(&serde_json::json!(false)));
    assert_that!(status["devices"][0]["addr"], eq(&serde_json::json!(0xA0)));
}

#[gtest]
#[tokio::test]
async fn first_sweep_runs_right_after_discovery() {
    let (service, _bus, _dir) = service_with(&[(0xA0, &[(0, 0x1111), (104, 0x20)])], &[maps::PSU]);
    service.start();

    // With the default 60s monitor interval, readings showing up this
    // early can only come from a sweep chained onto the initial scan.
    let mut readings = 0;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let data = service.data_json(true).await;
        readings = data[0]["ranges"][1]["readings"]
            .as_array()
            .map_or(0, |r| r.len());
        if readings > 0 {
            break;
        }
    }
    assert_that!(readings, gt(0));
    service.shutdown().await;
}

#[gtest]
#[tokio::test]
async fn pause_skips_polling_until_resumed() {
    let (service, _bus, _dir) = service_with(&[(0xA0, &[(104, 1)])], &[maps::PSU]);
    service.scan_once().await;

    assert_that!(service.pause(), eq(false));
    service.monitor_once().await;
    let data = service.data_json(true).await;
    assert_that!(data[0]["ranges"][1]["readings"].as_array().unwrap().len(), eq(0));

    assert_that!(service.resume(), eq(true));
    service.monitor_once().await;
    let data = service.data_json(true).await;
    assert_that!(data[0]["ranges"][1]["readings"].as_array().unwrap().len(), eq(1));
}

#[gtest]
#[tokio::test]
async fn unplugged_device_goes_dormant_and_recovers_on_scan() {
    let (service, bus, _dir) = service_with(&[(0xA0, &[(104, 1)])], &[maps::PSU]);
    service.scan_once().await;

    // Unplug the device; each monitor pass fails both register blocks.
    bus.lock().unwrap().devices.remove(&0xA0);
    for _ in 0..MAX_CONSECUTIVE_FAILURES {
        service.monitor_once().await;
    }
    let status = service.device_status(0xA0).await.unwrap();
    assert_that!(status.mode, eq(DeviceMode::Dormant));

    // Still dormant after a scan with the device absent.
    service.scan_once().await;
    assert_that!(
        service.device_status(0xA0).await.unwrap().mode,
        eq(DeviceMode::Dormant)
    );

    // Plug it back in; the next scan revives it.
    bus.lock()
        .unwrap()
        .devices
        .insert(0xA0, FakeDevice::new(&[(104, 1)]));
    service.scan_once().await;
    assert_that!(
        service.device_status(0xA0).await.unwrap().mode,
        eq(DeviceMode::Active)
    );
}

#[gtest]
#[tokio::test]
async fn register_access_requires_a_discovered_device() {
    let (service, _bus, _dir) = service_with(&[(0xA0, &[(104, 0x2A)])], &[maps::PSU]);
    service.scan_once().await;

    let values = service.read_holding_registers(0xA0, 104, 1).await.unwrap();
    assert_that!(values, eq(&vec![0x2A]));

    let echoed = service.write_single_register(0xA0, 104, 0x55).await.unwrap();
    assert_that!(echoed, eq(0x55));

    let result = service.read_holding_registers(0xA1, 104, 1).await;
    assert_that!(
        result,
        err(matches_pattern!(RackmonError::DeviceNotFound { addr: eq(&0xA1) }))
    );
}

#[gtest]
#[tokio::test]
async fn raw_command_reaches_undiscovered_addresses() {
    let (service, _bus, _dir) = service_with(&[(0xA4, &[(0x68, 0x2A)])], &[maps::PSU]);
    // No scan: 0xA4 is on the bus but not discovered.
    let req = vec![0xA4, 0x03, 0x00, 0x68, 0x00, 0x01];
    let resp = service.raw_command(req, 7, None).await.unwrap();
    assert_that!(resp, eq(&vec![0xA4, 0x03, 0x02, 0x00, 0x2A]));

    let result = service.raw_command(Vec::new(), 7, None).await;
    assert_that!(result, err(matches_pattern!(RackmonError::Argument(_))));
}

#[gtest]
#[tokio::test]
async fn shutdown_restores_default_baud_rates() {
    let (service, bus, _dir) = service_with(&[(0x10, &[(0, 1), (163, 1)])], &[maps::BBU]);
    service.scan_once().await;

    // Discovery negotiated the preferred rate.
    assert_that!(service.device_status(0x10).await.unwrap().baudrate, eq(115200));
    assert_that!(bus.lock().unwrap().devices[&0x10].registers[&163], eq(4));

    service.shutdown().await;
    assert_that!(bus.lock().unwrap().devices[&0x10].registers[&163], eq(1));
}
