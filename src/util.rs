// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common helpers

use core::fmt::Write as _;

use crate::{Error, Exception, Result};

/// Calculate the CRC (Cyclic Redundancy Check) sum.
///
/// The low byte of the result is transmitted first.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            // if we followed clippy's suggestion to move out the crc >>= 1, the condition may not be met any more
            // the recommended action therefore makes no sense and it is better to allow this lint
            #[allow(clippy::branches_sharing_code)]
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Calculate the LRC (Longitudinal Redundancy Check) sum.
#[must_use]
pub fn lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |sum, x| sum.wrapping_add(*x))
        .wrapping_neg()
}

const fn hex_digit(nibble: u8) -> u8 {
    if nibble < 10 {
        b'0' + nibble
    } else {
        b'A' + nibble - 10
    }
}

const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Encode bytes as upper case hex digits, two per byte.
///
/// It returns the number of ASCII characters written.
pub fn bytes_to_ascii(bytes: &[u8], ascii: &mut [u8]) -> Result<usize> {
    let len = bytes.len() * 2;
    if ascii.len() < len {
        return Err(Error::WriteBufferOverflow);
    }
    for (i, b) in bytes.iter().enumerate() {
        ascii[i * 2] = hex_digit(b >> 4);
        ascii[i * 2 + 1] = hex_digit(b & 0x0F);
    }
    Ok(len)
}

/// Decode upper case hex digits into bytes.
///
/// An odd trailing digit becomes the high nibble of the last byte.
/// It returns the number of bytes written.
pub fn ascii_to_bytes(ascii: &[u8], bytes: &mut [u8]) -> Result<usize> {
    let len = ascii.len().div_ceil(2);
    if bytes.len() < len {
        return Err(Error::ReadBufferOverflow);
    }
    for (i, c) in ascii.iter().enumerate() {
        let nibble = hex_value(*c).ok_or(Error::AscChar)?;
        if i % 2 == 0 {
            bytes[i / 2] = nibble << 4;
        } else {
            bytes[i / 2] |= nibble;
        }
    }
    Ok(len)
}

/// Hex dump of a binary frame, e.g. `01 03 00 00 `.
#[must_use]
pub fn bytes_to_string(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 3);
    for b in bytes {
        let _ = write!(s, "{b:0>2X} ");
    }
    s
}

/// Printable dump of an ASCII frame with `CR`/`LF` spelled out.
#[must_use]
pub fn ascii_to_string(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() + 6);
    for &b in bytes {
        match b {
            b'\r' => s.push_str(" CR"),
            b'\n' => s.push_str(" LF"),
            0x20..=0x7E => s.push(char::from(b)),
            _ => {
                let _ = write!(s, "\\x{b:0>2X}");
            }
        }
    }
    s
}

/// Get a single bit out of a packed bit buffer.
#[must_use]
pub fn get_bit(bits: &[u8], bit_num: usize) -> bool {
    (bits[bit_num / 8] >> (bit_num % 8)) & 0b1 != 0
}

/// Set a single bit of a packed bit buffer.
pub fn set_bit(bits: &mut [u8], bit_num: usize, value: bool) {
    let mask = 1 << (bit_num % 8);
    if value {
        bits[bit_num / 8] |= mask;
    } else {
        bits[bit_num / 8] &= !mask;
    }
}

/// Copy `count` bits starting at `bit_num` into `values`.
pub fn get_bits(bits: &[u8], bit_num: usize, values: &mut [bool]) {
    values
        .iter_mut()
        .enumerate()
        .for_each(|(i, v)| *v = get_bit(bits, bit_num + i));
}

/// Store `values` as bits starting at `bit_num`.
pub fn set_bits(bits: &mut [u8], bit_num: usize, values: &[bool]) {
    values
        .iter()
        .enumerate()
        .for_each(|(i, v)| set_bit(bits, bit_num + i, *v));
}

/// Turn a bool into a u16 coil value
#[must_use]
pub const fn bool_to_u16_coil(state: bool) -> u16 {
    if state { 0xFF00 } else { 0x0000 }
}

/// Turn a u16 coil value into a boolean value.
pub fn u16_coil_to_bool(coil: u16) -> Result<bool> {
    match coil {
        0xFF00 => Ok(true),
        0x0000 => Ok(false),
        _ => Err(Error::Exception(Exception::IllegalDataValue)),
    }
}

/// Calculate the number of bytes required for a given number of coils.
#[must_use]
pub const fn packed_coils_len(bitcount: usize) -> usize {
    bitcount.div_ceil(8)
}

///  Pack coils into a byte array.
///
///  It returns the number of bytes used to pack the coils.
pub fn pack_coils(coils: &[bool], bytes: &mut [u8]) -> Result<usize> {
    let packed_size = packed_coils_len(coils.len());
    if bytes.len() < packed_size {
        return Err(Error::WriteBufferOverflow);
    }
    bytes[..packed_size].fill(0);
    set_bits(bytes, 0, coils);
    Ok(packed_size)
}

///  Unpack coils from a byte array.
pub fn unpack_coils(bytes: &[u8], coils: &mut [bool]) -> Result<()> {
    if bytes.len() < packed_coils_len(coils.len()) {
        return Err(Error::ReadBufferOverflow);
    }
    get_bits(bytes, 0, coils);
    Ok(())
}

fn check_mem_range(offset: u16, count: u16, mem_len: usize) -> Result<(usize, usize)> {
    let (offset, count) = (usize::from(offset), usize::from(count));
    if offset + count > mem_len {
        return Err(Exception::IllegalDataAddress.into());
    }
    Ok((offset, count))
}

/// Copy registers out of a memory block.
pub fn read_mem_regs(offset: u16, count: u16, values: &mut [u16], memory: &[u16]) -> Result<()> {
    let (offset, count) = check_mem_range(offset, count, memory.len())?;
    if values.len() < count {
        return Err(Error::ReadBufferOverflow);
    }
    values[..count].copy_from_slice(&memory[offset..offset + count]);
    Ok(())
}

/// Copy registers into a memory block.
pub fn write_mem_regs(offset: u16, count: u16, values: &[u16], memory: &mut [u16]) -> Result<()> {
    let (offset, count) = check_mem_range(offset, count, memory.len())?;
    if values.len() < count {
        return Err(Error::WriteBufferOverflow);
    }
    memory[offset..offset + count].copy_from_slice(&values[..count]);
    Ok(())
}

/// Copy bits out of a packed memory block of `mem_bit_count` bits.
///
/// The bits are packed into `values` starting with bit 0 of the first byte.
pub fn read_mem_bits(
    offset: u16,
    count: u16,
    values: &mut [u8],
    memory: &[u8],
    mem_bit_count: usize,
) -> Result<()> {
    let (offset, count) = check_mem_range(offset, count, mem_bit_count)?;
    if values.len() < packed_coils_len(count) || memory.len() < packed_coils_len(offset + count) {
        return Err(Error::ReadBufferOverflow);
    }
    values[..packed_coils_len(count)].fill(0);
    for i in 0..count {
        set_bit(values, i, get_bit(memory, offset + i));
    }
    Ok(())
}

/// Copy packed bits into a packed memory block of `mem_bit_count` bits.
pub fn write_mem_bits(
    offset: u16,
    count: u16,
    values: &[u8],
    memory: &mut [u8],
    mem_bit_count: usize,
) -> Result<()> {
    let (offset, count) = check_mem_range(offset, count, mem_bit_count)?;
    if values.len() < packed_coils_len(count) || memory.len() < packed_coils_len(offset + count) {
        return Err(Error::WriteBufferOverflow);
    }
    for i in 0..count {
        set_bit(memory, offset + i, get_bit(values, i));
    }
    Ok(())
}
