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

use log::error;
use std::path::PathBuf;
use std::time::Duration;
use zbus::fdo;

#[derive(Debug, thiserror::Error)]
pub enum RackmonError {
    #[error("RackmonError::Argument: {0}")]
    Argument(String),
    #[error("RackmonError::Timeout: no response from device 0x{addr:02x} within {timeout:?}")]
    Timeout { addr: u8, timeout: Duration },
    #[error(
        "RackmonError::Crc: CRC mismatch: expected 0x{expected:04x}, received 0x{received:04x}"
    )]
    Crc { expected: u16, received: u16 },
    #[error("RackmonError::BadResponse: {0}")]
    BadResponse(String),
    #[error(
        "RackmonError::Exception: device 0x{addr:02x} returned exception 0x{code:02x} for function 0x{function:02x}"
    )]
    Exception { addr: u8, function: u8, code: u8 },
    #[error("RackmonError::Dormant: device 0x{addr:02x} is dormant")]
    Dormant { addr: u8 },
    #[error("RackmonError::DeviceNotFound: no probed device at address 0x{addr:02x}")]
    DeviceNotFound { addr: u8 },
    #[error("RackmonError::Serial: serial port {path} failed: {e}")]
    Serial { path: String, e: serialport::Error },
    #[error("RackmonError::IO: an IO error occurred on {path}: {e}")]
    IO { path: String, e: std::io::Error },
    #[error("RackmonError::ConfigRead: failed to read register map {file:?}: {e}")]
    ConfigRead { file: PathBuf, e: std::io::Error },
    #[error("RackmonError::ConfigParse: failed to parse register map {file:?}: {e}")]
    ConfigParse { file: PathBuf, e: serde_json::Error },
    #[error("RackmonError::Internal: an internal error occurred: {0}")]
    Internal(String),
}

impl From<RackmonError> for fdo::Error {
    fn from(err: RackmonError) -> Self {
        error!("{err}");
        match err {
            RackmonError::Argument(..) | RackmonError::DeviceNotFound { .. } => {
                fdo::Error::InvalidArgs(err.to_string())
            }
            RackmonError::Serial { .. } | RackmonError::IO { .. } => {
                fdo::Error::IOError(err.to_string())
            }
            _ => fdo::Error::Failed(err.to_string()),
        }
    }
}
