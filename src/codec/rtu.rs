// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU
//!
//! `[unit][function][data...][crc lo][crc hi]`

use byteorder::{ByteOrder, LittleEndian};

use crate::{DecodedFrame, Error, Result, UnitId, util::crc16};

/// Size of the RTU frame buffer.
pub const BUFF_SZ: usize = 264;

/// Maximum payload: the buffer minus unit, function and CRC.
pub const MAX_PAYLOAD: usize = BUFF_SZ - 4;

const MIN_FRAME_LEN: usize = 5;

/// Encode an RTU frame into `buf`.
///
/// It returns the number of bytes of the frame.
pub fn encode(buf: &mut [u8], unit: UnitId, function: u8, payload: &[u8]) -> Result<usize> {
    if payload.len() > MAX_PAYLOAD || buf.len() < payload.len() + 4 {
        return Err(Error::WriteBufferOverflow);
    }
    buf[0] = unit;
    buf[1] = function;
    let len = payload.len() + 2;
    buf[2..len].copy_from_slice(payload);
    let crc = crc16(&buf[..len]);
    LittleEndian::write_u16(&mut buf[len..], crc);
    Ok(len + 2)
}

/// Decode a complete RTU frame and verify its CRC.
pub fn decode(frame: &[u8]) -> Result<DecodedFrame<'_>> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(Error::NotCorrectRequest(
            "RTU. Frame length is too small".into(),
        ));
    }
    let (adu_buf, crc_buf) = frame.split_at(frame.len() - 2);
    let expected_crc = LittleEndian::read_u16(crc_buf);
    let actual_crc = crc16(adu_buf);
    if expected_crc != actual_crc {
        return Err(Error::Crc(expected_crc, actual_crc));
    }
    Ok(DecodedFrame {
        unit: adu_buf[0],
        function: adu_buf[1],
        data: &adu_buf[2..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_read_holding_registers_request() {
        let buf = &mut [0; BUFF_SZ];
        let len = encode(buf, 0x01, 0x03, &[0x00, 0x00, 0x00, 0x02]).unwrap();
        assert_eq!(
            &buf[..len],
            &[
                0x01, // unit
                0x03, // function code
                0x00, // offset
                0x00, // offset
                0x00, // count
                0x02, // count
                0xC4, // crc lo
                0x0B, // crc hi
            ]
        );
    }

    #[test]
    fn encode_payload_at_the_limit() {
        let buf = &mut [0; BUFF_SZ];
        let payload = [0xAA; MAX_PAYLOAD];
        assert_eq!(encode(buf, 1, 0x10, &payload).unwrap(), BUFF_SZ);
    }

    #[test]
    fn reject_payload_overflow_without_touching_the_buffer() {
        let buf = &mut [0x55; BUFF_SZ];
        let payload = [0xAA; MAX_PAYLOAD + 1];
        assert_eq!(
            encode(buf, 1, 0x10, &payload).err().unwrap(),
            Error::WriteBufferOverflow
        );
        assert!(buf.iter().all(|b| *b == 0x55));
    }

    #[test]
    fn decode_response_frame() {
        let mut frame = vec![
            0x01, // unit
            0x03, // function code
            0x04, // byte count
            0x00, 0x0A, // value
            0x00, 0x14, // value
        ];
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        let DecodedFrame {
            unit,
            function,
            data,
        } = decode(&frame).unwrap();
        assert_eq!(unit, 0x01);
        assert_eq!(function, 0x03);
        assert_eq!(data, &[0x04, 0x00, 0x0A, 0x00, 0x14]);
    }

    #[test]
    fn decode_too_short_frame() {
        let err = decode(&[0x01, 0x03, 0x00, 0x00]).err().unwrap();
        assert!(matches!(err, Error::NotCorrectRequest(_)));
    }

    #[test]
    fn decode_frame_with_invalid_crc() {
        let frame = &[0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0C];
        assert_eq!(decode(frame).err().unwrap(), Error::Crc(0x0CC4, 0x0BC4));
    }
}
