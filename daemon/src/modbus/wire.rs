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

//! Modbus RTU wire codec.
//!
//! Builds request frames for the function codes the power shelves speak
//! (read holding registers, write single register, write multiple
//! registers), parses their responses, and handles the trailing CRC-16.
//! All frames are raw RTU: `addr(1) function(1) payload(..) crc(2)`,
//! CRC transmitted low byte first.

use crate::error::RackmonError;

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Set in the function byte of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// A valid RTU frame carries at least addr + function + crc.
pub const MIN_FRAME_LEN: usize = 4;

/// CRC-16/MODBUS over `data`: init 0xFFFF, reflected polynomial 0xA001.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Append the CRC to a request frame, low byte first.
pub fn finalize(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&frame);
    frame.push((crc & 0xFF) as u8);
    frame.push((crc >> 8) as u8);
    frame
}

/// Check the trailing CRC of a received frame and return the payload
/// (everything before the CRC).
pub fn verify(frame: &[u8]) -> Result<&[u8], RackmonError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(RackmonError::BadResponse(format!(
            "frame too short for CRC check ({} bytes)",
            frame.len()
        )));
    }
    let (payload, trailer) = frame.split_at(frame.len() - 2);
    let expected = crc16(payload);
    let received = u16::from(trailer[0]) | (u16::from(trailer[1]) << 8);
    if expected != received {
        return Err(RackmonError::Crc { expected, received });
    }
    Ok(payload)
}

/// Build a Read Holding Registers (0x03) request.
pub fn read_holding_registers_req(addr: u8, reg: u16, count: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(6);
    frame.push(addr);
    frame.push(READ_HOLDING_REGISTERS);
    frame.extend_from_slice(&reg.to_be_bytes());
    frame.extend_from_slice(&count.to_be_bytes());
    frame
}

/// Full on-wire length of the expected 0x03 response:
/// addr + function + byte count + data + crc.
pub fn read_holding_registers_resp_len(count: u16) -> usize {
    5 + 2 * count as usize
}

/// Build a Write Single Register (0x06) request.
pub fn write_single_register_req(addr: u8, reg: u16, value: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(6);
    frame.push(addr);
    frame.push(WRITE_SINGLE_REGISTER);
    frame.extend_from_slice(&reg.to_be_bytes());
    frame.extend_from_slice(&value.to_be_bytes());
    frame
}

/// On-wire length of the 0x06 response (an echo of the request plus crc).
pub const WRITE_SINGLE_REGISTER_RESP_LEN: usize = 8;

/// Build a Write Multiple Registers (0x10) request.
pub fn write_multiple_registers_req(addr: u8, reg: u16, values: &[u16]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(7 + 2 * values.len());
    frame.push(addr);
    frame.push(WRITE_MULTIPLE_REGISTERS);
    frame.extend_from_slice(&reg.to_be_bytes());
    frame.extend_from_slice(&(values.len() as u16).to_be_bytes());
    frame.push((2 * values.len()) as u8);
    for value in values {
        frame.extend_from_slice(&value.to_be_bytes());
    }
    frame
}

/// On-wire length of the 0x10 response: addr + function + reg + count + crc.
pub const WRITE_MULTIPLE_REGISTERS_RESP_LEN: usize = 8;

/// Validate the `addr`/`function` header of a CRC-stripped response and
/// surface exception responses (function byte with the high bit set,
/// followed by a one-byte exception code).
fn check_reply_header(addr: u8, function: u8, payload: &[u8]) -> Result<(), RackmonError> {
    if payload.len() < 2 {
        return Err(RackmonError::BadResponse(format!(
            "response payload too short ({} bytes)",
            payload.len()
        )));
    }
    if payload[0] != addr {
        return Err(RackmonError::BadResponse(format!(
            "response from address 0x{:02x}, expected 0x{addr:02x}",
            payload[0]
        )));
    }
    if payload[1] == function | EXCEPTION_FLAG {
        let code = payload.get(2).copied().unwrap_or(0);
        return Err(RackmonError::Exception {
            addr,
            function,
            code,
        });
    }
    if payload[1] != function {
        return Err(RackmonError::BadResponse(format!(
            "response function 0x{:02x}, expected 0x{function:02x}",
            payload[1]
        )));
    }
    Ok(())
}

/// Decode a CRC-stripped 0x03 response into register values.
pub fn parse_read_holding_registers(
    addr: u8,
    count: u16,
    payload: &[u8],
) -> Result<Vec<u16>, RackmonError> {
    check_reply_header(addr, READ_HOLDING_REGISTERS, payload)?;
    let data = &payload[2..];
    if data.is_empty() || usize::from(data[0]) != 2 * count as usize {
        return Err(RackmonError::BadResponse(format!(
            "got {} register data bytes, expected {}",
            data.first().copied().unwrap_or(0),
            2 * count
        )));
    }
    let regs = &data[1..];
    if regs.len() != 2 * count as usize {
        return Err(RackmonError::BadResponse(format!(
            "register data truncated ({} of {} bytes)",
            regs.len(),
            2 * count
        )));
    }
    Ok(regs
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Decode a CRC-stripped 0x06 response, returning the echoed value.
pub fn parse_write_single_register(
    addr: u8,
    reg: u16,
    payload: &[u8],
) -> Result<u16, RackmonError> {
    check_reply_header(addr, WRITE_SINGLE_REGISTER, payload)?;
    if payload.len() != 6 {
        return Err(RackmonError::BadResponse(format!(
            "write-single echo has {} bytes, expected 6",
            payload.len()
        )));
    }
    let echoed_reg = u16::from_be_bytes([payload[2], payload[3]]);
    if echoed_reg != reg {
        return Err(RackmonError::BadResponse(format!(
            "write-single echoed register 0x{echoed_reg:04x}, expected 0x{reg:04x}"
        )));
    }
    Ok(u16::from_be_bytes([payload[4], payload[5]]))
}

/// Decode a CRC-stripped 0x10 response, checking the echoed register
/// offset and count.
pub fn parse_write_multiple_registers(
    addr: u8,
    reg: u16,
    count: u16,
    payload: &[u8],
) -> Result<(), RackmonError> {
    check_reply_header(addr, WRITE_MULTIPLE_REGISTERS, payload)?;
    if payload.len() != 6 {
        return Err(RackmonError::BadResponse(format!(
            "write-multiple echo has {} bytes, expected 6",
            payload.len()
        )));
    }
    let echoed_reg = u16::from_be_bytes([payload[2], payload[3]]);
    let echoed_count = u16::from_be_bytes([payload[4], payload[5]]);
    if echoed_reg != reg || echoed_count != count {
        return Err(RackmonError::BadResponse(format!(
            "write-multiple echoed 0x{echoed_reg:04x}/{echoed_count}, expected 0x{reg:04x}/{count}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    #[rstest]
    #[case::reference_frame(vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A], 0xCDC5)]
    #[case::read_req(vec![0x32, 0x03, 0x00, 0x64, 0x00, 0x02], 0x1780)]
    #[case::read_resp(vec![0x32, 0x03, 0x04, 0x11, 0x22, 0x33, 0x44], 0xC548)]
    #[case::write_req(vec![0x32, 0x06, 0x00, 0x64, 0x11, 0x22], 0x9F41)]
    fn crc16_known_vectors(#[case] frame: Vec<u8>, #[case] expected: u16) {
        assert_that!(crc16(&frame), eq(expected));
    }

    #[gtest]
    fn finalize_appends_crc_low_byte_first() {
        let frame = finalize(vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_that!(
            frame,
            eq(&vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD])
        );
    }

    #[gtest]
    fn verify_roundtrips_finalize() {
        let frame = finalize(vec![0x32, 0x03, 0x02, 0x00, 0x2A]);
        let payload = verify(&frame).expect("CRC should verify");
        assert_that!(payload, eq(&[0x32, 0x03, 0x02, 0x00, 0x2A]));
    }

    #[gtest]
    fn verify_rejects_corrupt_frame() {
        let mut frame = finalize(vec![0x32, 0x03, 0x02, 0x00, 0x2A]);
        frame[3] ^= 0xFF;
        let result = verify(&frame);
        assert_that!(result, err(matches_pattern!(RackmonError::Crc { .. })));
    }

    #[gtest]
    #[rstest]
    #[case::empty(vec![])]
    #[case::three_bytes(vec![0x32, 0x03, 0x00])]
    fn verify_rejects_short_frames(#[case] frame: Vec<u8>) {
        let result = verify(&frame);
        assert_that!(
            result,
            err(matches_pattern!(RackmonError::BadResponse(_)))
        );
    }

    #[gtest]
    fn read_request_layout() {
        assert_that!(
            read_holding_registers_req(0x32, 0x0064, 2),
            eq(&vec![0x32, 0x03, 0x00, 0x64, 0x00, 0x02])
        );
        assert_that!(read_holding_registers_resp_len(2), eq(9));
    }

    #[gtest]
    fn write_single_request_layout() {
        assert_that!(
            write_single_register_req(0x32, 0x0064, 0x1122),
            eq(&vec![0x32, 0x06, 0x00, 0x64, 0x11, 0x22])
        );
    }

    #[gtest]
    fn write_multiple_request_layout() {
        assert_that!(
            write_multiple_registers_req(0x32, 0x0064, &[0x1122, 0x3344]),
            eq(&vec![0x32, 0x10, 0x00, 0x64, 0x00, 0x02, 0x04, 0x11, 0x22, 0x33, 0x44])
        );
    }

    #[gtest]
    fn parse_read_response() {
        let regs = parse_read_holding_registers(0x32, 2, &[0x32, 0x03, 0x04, 0x11, 0x22, 0x33, 0x44])
            .expect("should parse");
        assert_that!(regs, eq(&vec![0x1122, 0x3344]));
    }

    #[gtest]
    #[rstest]
    #[case::wrong_addr(&[0x33, 0x03, 0x04, 0x11, 0x22, 0x33, 0x44])]
    #[case::wrong_function(&[0x32, 0x04, 0x04, 0x11, 0x22, 0x33, 0x44])]
    #[case::wrong_byte_count(&[0x32, 0x03, 0x02, 0x11, 0x22, 0x33, 0x44])]
    #[case::truncated(&[0x32, 0x03, 0x04, 0x11, 0x22])]
    fn parse_read_response_rejects_mismatches(#[case] payload: &[u8]) {
        let result = parse_read_holding_registers(0x32, 2, payload);
        assert_that!(
            result,
            err(matches_pattern!(RackmonError::BadResponse(_)))
        );
    }

    #[gtest]
    fn exception_response_is_surfaced() {
        // Function 0x83: read holding registers exception, code 2
        // (illegal data address).
        let result = parse_read_holding_registers(0x32, 2, &[0x32, 0x83, 0x02]);
        assert_that!(
            result,
            err(matches_pattern!(RackmonError::Exception {
                addr: eq(&0x32),
                function: eq(&READ_HOLDING_REGISTERS),
                code: eq(&2),
            }))
        );
    }

    #[gtest]
    fn parse_write_single_echo() {
        let value = parse_write_single_register(0x32, 0x0064, &[0x32, 0x06, 0x00, 0x64, 0x11, 0x22])
            .expect("should parse");
        assert_that!(value, eq(0x1122));
    }

    #[gtest]
    fn parse_write_multiple_echo() {
        let result =
            parse_write_multiple_registers(0x32, 0x0064, 2, &[0x32, 0x10, 0x00, 0x64, 0x00, 0x02]);
        assert_that!(result, ok(anything()));
    }

    #[gtest]
    fn parse_write_multiple_rejects_wrong_count() {
        let result =
            parse_write_multiple_registers(0x32, 0x0064, 3, &[0x32, 0x10, 0x00, 0x64, 0x00, 0x02]);
        assert_that!(
            result,
            err(matches_pattern!(RackmonError::BadResponse(_)))
        );
    }
}
