// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP
//!
//! MBAP header `[transaction hi][transaction lo][0][0][length hi][length lo]`
//! followed by `[unit][function][data...]`.

use byteorder::{BigEndian, ByteOrder};

use crate::{DecodedFrame, Error, Result, TransactionId, UnitId};

/// Size of the TCP frame buffer.
pub const BUFF_SZ: usize = 268;

/// Size of the MBAP prefix up to and including the length field.
pub const PREFIX_SZ: usize = 6;

/// Maximum payload: the buffer minus prefix, unit and function.
pub const MAX_PAYLOAD: usize = BUFF_SZ - PREFIX_SZ - 2;

const MIN_FRAME_LEN: usize = PREFIX_SZ + 2;

/// Encode a TCP frame into `buf`.
///
/// It returns the number of bytes of the frame.
pub fn encode(
    buf: &mut [u8],
    transaction_id: TransactionId,
    unit: UnitId,
    function: u8,
    payload: &[u8],
) -> Result<usize> {
    if payload.len() > MAX_PAYLOAD || buf.len() < payload.len() + MIN_FRAME_LEN {
        return Err(Error::WriteBufferOverflow);
    }
    BigEndian::write_u16(&mut buf[0..2], transaction_id);
    BigEndian::write_u16(&mut buf[2..4], 0);
    // `payload.len() + 2` always fits, see `MAX_PAYLOAD`
    BigEndian::write_u16(&mut buf[4..6], (payload.len() + 2) as u16);
    buf[6] = unit;
    buf[7] = function;
    let len = payload.len() + MIN_FRAME_LEN;
    buf[MIN_FRAME_LEN..len].copy_from_slice(payload);
    Ok(len)
}

/// Total frame length announced by a (partly) received MBAP prefix.
#[must_use]
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < PREFIX_SZ {
        // incomplete prefix
        return None;
    }
    Some(PREFIX_SZ + usize::from(BigEndian::read_u16(&buf[4..6])))
}

/// Decode a complete TCP frame.
pub fn decode(frame: &[u8]) -> Result<(TransactionId, DecodedFrame<'_>)> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(Error::NotCorrectResponse(
            "TCP. Frame length is too small".into(),
        ));
    }
    let protocol_id = BigEndian::read_u16(&frame[2..4]);
    if protocol_id != 0 {
        return Err(Error::NotCorrectResponse(format!(
            "TCP. Protocol not Modbus(0), received {protocol_id} instead"
        )));
    }
    let length = usize::from(BigEndian::read_u16(&frame[4..6]));
    if length != frame.len() - PREFIX_SZ {
        return Err(Error::NotCorrectResponse(format!(
            "TCP. Length field {length} does not match received {}",
            frame.len() - PREFIX_SZ
        )));
    }
    let transaction_id = BigEndian::read_u16(&frame[0..2]);
    Ok((
        transaction_id,
        DecodedFrame {
            unit: frame[6],
            function: frame[7],
            data: &frame[MIN_FRAME_LEN..],
        },
    ))
}
