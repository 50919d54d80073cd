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

//! Rack power-shelf monitor daemon (rackmond).
//!
//! Opens the configured RS-485 ttys, loads the register map database,
//! starts the scan and monitor loops, and serves two DBus interfaces
//! until terminated. The daemon:
//! - Discovers Modbus devices by probing mapped addresses
//! - Polls each active device's register blocks on an interval
//! - Marks unresponsive devices dormant and revives them on later scans
//! - Restores device baud rates on shutdown
//!
//! # DBus Service
//!
//! - **Service Name**: `org.openbmc.rackmond`
//! - **Status Interface**: `/org/openbmc/rackmond/status` - Read-only operations
//! - **Control Interface**: `/org/openbmc/rackmond/control` - Write operations
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`
//! - `RACKMOND_CONF_DIR` - Register map directory. Defaults to `/etc/rackmon.d`
//! - `RACKMOND_TTYS` - Comma-separated serial devices. Defaults to `/dev/ttyS3`
//! - `RACKMOND_TIMEOUT_MS` - Per-command response timeout. Defaults to 300
//! - `RACKMOND_MIN_DELAY_MS` - Quiet time between bus exchanges. Defaults to 0
//! - `RACKMOND_SCAN_INTERVAL_S` - Device scan period. Defaults to 120
//! - `RACKMOND_MONITOR_INTERVAL_S` - Register poll period. Defaults to 60

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use log::info;
use log::warn;
use zbus::connection;

use rackmond::comm::dbus::control_interface::RackmondControl;
use rackmond::comm::dbus::status_interface::RackmondStatus;
use rackmond::config::ServiceConfig;
use rackmond::modbus::Modbus;
use rackmond::rackmon::Rackmon;
use rackmond::regmap::RegisterMapDatabase;
use rackmond::transport::SerialTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::from_env();
    let regmaps = RegisterMapDatabase::load(Path::new(&config.conf_dir))?;
    if regmaps.is_empty() {
        warn!(
            "no register maps in {}, no devices will be discovered",
            config.conf_dir
        );
    }

    let mut buses = Vec::new();
    for tty in &config.ttys {
        // 19200 is the rate power shelves ship at; each device's map
        // retunes the bus as needed.
        let transport = SerialTransport::open(tty, 19200)?;
        buses.push(Arc::new(Modbus::new(
            Box::new(transport),
            19200,
            config.timeout,
            config.min_delay,
        )));
        info!("opened bus {tty}");
    }

    let service = Arc::new(Rackmon::new(buses, regmaps, &config));
    service.start();

    let _conn = connection::Builder::system()?
        .name("org.openbmc.rackmond")?
        .serve_at(
            "/org/openbmc/rackmond/status",
            RackmondStatus::new(Arc::clone(&service)),
        )?
        .serve_at(
            "/org/openbmc/rackmond/control",
            RackmondControl::new(Arc::clone(&service)),
        )?
        .build()
        .await?;
    info!("rackmond serving on the system bus");

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
    service.shutdown().await;
    Ok(())
}
