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

use clap::{Parser, Subcommand};
use log::debug;
use zbus::Connection;

mod proxies;

use proxies::control_proxy::ControlProxy;
use proxies::status_proxy::StatusProxy;

#[derive(Parser, Debug)]
#[command(name = "rackmon")]
#[command(bin_name = "rackmon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show health counters and mode of every discovered device
    Status,
    /// List the addresses of discovered devices
    List,
    /// Dump collected monitor data
    Data {
        /// Print raw register words instead of decoded values
        #[arg(long)]
        raw: bool,
    },
    /// Show scan loop bookkeeping
    Info,
    /// Pause the scan and monitor loops
    Pause,
    /// Resume the scan and monitor loops
    Resume,
    /// Request an immediate device scan
    Rescan,
    /// Read holding registers from a device
    Read {
        /// Device address, decimal or 0x-prefixed hex
        addr: String,
        /// First register offset
        reg: u16,
        /// Number of registers
        #[arg(default_value_t = 1)]
        count: u16,
    },
    /// Write one holding register on a device
    Write {
        /// Device address, decimal or 0x-prefixed hex
        addr: String,
        /// Register offset
        reg: u16,
        /// Value to write
        value: u16,
    },
    /// Send a raw Modbus frame (hex, without CRC) on the bus
    Raw {
        /// Request payload, e.g. "a4 03 00 68 00 01"
        payload: String,
        /// Expected on-wire response length in bytes
        #[arg(long, default_value_t = 16)]
        expected_len: u32,
        /// Response timeout in milliseconds, 0 for the bus default
        #[arg(long, default_value_t = 0)]
        timeout_ms: u32,
    },
}

fn parse_addr(addr: &str) -> Result<u8, Box<dyn std::error::Error>> {
    let parsed = match addr.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => addr.parse(),
    };
    Ok(parsed.map_err(|_| format!("invalid device address '{addr}'"))?)
}

/// Reprint a JSON payload from the daemon with indentation.
fn pretty(json: &str) -> String {
    serde_json::from_str::<serde_json::Value>(json)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| json.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    let connection = Connection::system().await?;
    match cli.command {
        Commands::Status => {
            let proxy = StatusProxy::new(&connection).await?;
            println!("{}", pretty(&proxy.get_status().await?));
        }
        Commands::List => {
            let proxy = StatusProxy::new(&connection).await?;
            println!("{}", pretty(&proxy.list_devices().await?));
        }
        Commands::Data { raw } => {
            let proxy = StatusProxy::new(&connection).await?;
            let data = if raw {
                proxy.get_monitor_data_raw().await?
            } else {
                proxy.get_monitor_data_value().await?
            };
            println!("{}", pretty(&data));
        }
        Commands::Info => {
            let proxy = StatusProxy::new(&connection).await?;
            println!("{}", pretty(&proxy.get_scan_info().await?));
        }
        Commands::Pause => {
            let proxy = ControlProxy::new(&connection).await?;
            println!("{}", proxy.pause_monitoring().await?);
        }
        Commands::Resume => {
            let proxy = ControlProxy::new(&connection).await?;
            println!("{}", proxy.resume_monitoring().await?);
        }
        Commands::Rescan => {
            let proxy = ControlProxy::new(&connection).await?;
            println!("{}", proxy.force_scan().await?);
        }
        Commands::Read { addr, reg, count } => {
            let addr = parse_addr(&addr)?;
            let proxy = ControlProxy::new(&connection).await?;
            println!("{}", proxy.read_holding_registers(addr, reg, count).await?);
        }
        Commands::Write { addr, reg, value } => {
            let addr = parse_addr(&addr)?;
            let proxy = ControlProxy::new(&connection).await?;
            println!("{}", proxy.write_single_register(addr, reg, value).await?);
        }
        Commands::Raw {
            payload,
            expected_len,
            timeout_ms,
        } => {
            let proxy = ControlProxy::new(&connection).await?;
            println!(
                "{}",
                proxy.raw_command(&payload, expected_len, timeout_ms).await?
            );
        }
    }
    Ok(())
}
