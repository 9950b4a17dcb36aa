// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus ASCII
//!
//! `':' hex([unit][function][data...][lrc]) CR LF`

use crate::{
    DecodedFrame, Error, Result, UnitId,
    util::{ascii_to_bytes, bytes_to_ascii, lrc},
};

/// Size of the ASCII frame buffer.
pub const BUFF_SZ: usize = 529;

/// Maximum payload so that colon, hex digits and CR LF fit into the buffer.
pub const MAX_PAYLOAD: usize = (BUFF_SZ - 3) / 2 - 3;

/// Size of the decoded binary frame (unit, function, payload, LRC).
pub const BIN_BUFF_SZ: usize = MAX_PAYLOAD + 4;

const MIN_FRAME_LEN: usize = 9;

/// Encode an ASCII frame into `buf`.
///
/// It returns the number of characters of the frame.
pub fn encode(buf: &mut [u8], unit: UnitId, function: u8, payload: &[u8]) -> Result<usize> {
    let bin_len = payload.len() + 3;
    if payload.len() > MAX_PAYLOAD || buf.len() < bin_len * 2 + 3 {
        return Err(Error::WriteBufferOverflow);
    }
    let mut bin = [0; BIN_BUFF_SZ];
    bin[0] = unit;
    bin[1] = function;
    bin[2..bin_len - 1].copy_from_slice(payload);
    bin[bin_len - 1] = lrc(&bin[..bin_len - 1]);

    buf[0] = b':';
    let len = bytes_to_ascii(&bin[..bin_len], &mut buf[1..])? + 1;
    buf[len] = b'\r';
    buf[len + 1] = b'\n';
    Ok(len + 2)
}

/// Decode a complete ASCII frame into `bin` and verify its LRC.
pub fn decode<'a>(frame: &[u8], bin: &'a mut [u8]) -> Result<DecodedFrame<'a>> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(Error::NotCorrectRequest(
            "ASCII. Frame length is too small".into(),
        ));
    }
    if frame[0] != b':' {
        return Err(Error::AscMissColon);
    }
    let Some(hex) = frame[1..].strip_suffix(b"\r\n") else {
        return Err(Error::AscMissCrLf);
    };
    let len = ascii_to_bytes(hex, bin)?;
    let (adu_buf, lrc_buf) = bin[..len].split_at(len - 1);
    let expected_lrc = lrc_buf[0];
    let actual_lrc = lrc(adu_buf);
    if expected_lrc != actual_lrc {
        return Err(Error::Lrc(expected_lrc, actual_lrc));
    }
    Ok(DecodedFrame {
        unit: adu_buf[0],
        function: adu_buf[1],
        data: &adu_buf[2..],
    })
}
