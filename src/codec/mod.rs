// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire formats

use core::{fmt, str::FromStr};

use crate::{
    DecodedFrame, Error, Result, TransactionId, UnitId,
    util::{ascii_to_string, bytes_to_string},
};

pub mod ascii;
pub mod rtu;
pub mod tcp;

/// Modbus transport variant.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolType {
    Asc,
    Rtu,
    Tcp,
}

impl ProtocolType {
    const fn get_name(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Rtu => "RTU",
            Self::Tcp => "TCP",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.get_name())
    }
}

impl FromStr for ProtocolType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ASC" => Ok(Self::Asc),
            "RTU" => Ok(Self::Rtu),
            "TCP" => Ok(Self::Tcp),
            _ => Err(Error::InvalidSetting {
                key: "type".into(),
                value: s.into(),
            }),
        }
    }
}

/// Framing state of a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Codec {
    Rtu,
    Ascii,
    Tcp {
        transaction_id: TransactionId,
        auto_increment: bool,
    },
}

impl Codec {
    pub(crate) const fn new(protocol: ProtocolType) -> Self {
        match protocol {
            ProtocolType::Rtu => Self::Rtu,
            ProtocolType::Asc => Self::Ascii,
            ProtocolType::Tcp => Self::Tcp {
                transaction_id: 0,
                auto_increment: true,
            },
        }
    }

    pub(crate) const fn protocol(&self) -> ProtocolType {
        match self {
            Self::Rtu => ProtocolType::Rtu,
            Self::Ascii => ProtocolType::Asc,
            Self::Tcp { .. } => ProtocolType::Tcp,
        }
    }

    /// Capacity of the frame buffers.
    pub(crate) const fn buffer_size(&self) -> usize {
        match self {
            Self::Rtu => rtu::BUFF_SZ,
            Self::Ascii => ascii::BUFF_SZ,
            Self::Tcp { .. } => tcp::BUFF_SZ,
        }
    }

    /// TCP frames announce their length, serial frames end with a silence gap.
    pub(crate) const fn is_length_prefixed(&self) -> bool {
        matches!(self, Self::Tcp { .. })
    }

    /// Total length of a length prefixed frame, once enough bytes arrived.
    pub(crate) fn frame_len(&self, received: &[u8]) -> Option<usize> {
        match self {
            Self::Tcp { .. } => tcp::frame_len(received),
            Self::Rtu | Self::Ascii => None,
        }
    }

    /// In client mode the next request after a repeated one keeps its
    /// transaction id. Serial framings have no transaction id.
    pub(crate) fn set_next_request_repeated(&mut self, repeated: bool) {
        if let Self::Tcp { auto_increment, .. } = self {
            *auto_increment = !repeated;
        }
    }

    pub(crate) fn encode(
        &mut self,
        server_mode: bool,
        buf: &mut [u8],
        unit: UnitId,
        function: u8,
        payload: &[u8],
    ) -> Result<usize> {
        match self {
            Self::Rtu => rtu::encode(buf, unit, function, payload),
            Self::Ascii => ascii::encode(buf, unit, function, payload),
            Self::Tcp {
                transaction_id,
                auto_increment,
            } => {
                if payload.len() > tcp::MAX_PAYLOAD {
                    return Err(Error::WriteBufferOverflow);
                }
                if !server_mode {
                    if *auto_increment {
                        *transaction_id = transaction_id.wrapping_add(1);
                    }
                    *auto_increment = true;
                }
                tcp::encode(buf, *transaction_id, unit, function, payload)
            }
        }
    }

    /// Decode a received frame.
    ///
    /// ASCII frames are decoded into `bin`; binary frames are borrowed.
    pub(crate) fn decode<'a>(
        &mut self,
        server_mode: bool,
        frame: &'a [u8],
        bin: &'a mut [u8],
    ) -> Result<DecodedFrame<'a>> {
        match self {
            Self::Rtu => rtu::decode(frame),
            Self::Ascii => ascii::decode(frame, bin),
            Self::Tcp { transaction_id, .. } => {
                let (received_id, decoded) = tcp::decode(frame)?;
                if server_mode {
                    *transaction_id = received_id;
                } else if received_id != *transaction_id {
                    return Err(Error::NotCorrectResponse(format!(
                        "TCP. Transaction id {received_id} is not equal to requested {transaction_id}"
                    )));
                }
                Ok(decoded)
            }
        }
    }

    /// Printable dump of a raw frame.
    pub(crate) fn dump(&self, frame: &[u8]) -> String {
        match self {
            Self::Ascii => ascii_to_string(frame),
            Self::Rtu | Self::Tcp { .. } => bytes_to_string(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_type_names() {
        for protocol in [ProtocolType::Asc, ProtocolType::Rtu, ProtocolType::Tcp] {
            assert_eq!(protocol.to_string().parse::<ProtocolType>(), Ok(protocol));
        }
        assert!("UDP".parse::<ProtocolType>().is_err());
    }

    mod transaction_id {

        use super::*;

        fn encode_request(codec: &mut Codec, buf: &mut [u8]) -> TransactionId {
            codec.encode(false, buf, 1, 0x03, &[0, 0, 0, 1]).unwrap();
            u16::from_be_bytes([buf[0], buf[1]])
        }

        #[test]
        fn increments_per_request() {
            let mut codec = Codec::new(ProtocolType::Tcp);
            let buf = &mut [0; tcp::BUFF_SZ];
            assert_eq!(encode_request(&mut codec, buf), 1);
            assert_eq!(encode_request(&mut codec, buf), 2);
            assert_eq!(encode_request(&mut codec, buf), 3);
        }

        #[test]
        fn repeated_request_keeps_the_id() {
            let mut codec = Codec::new(ProtocolType::Tcp);
            let buf = &mut [0; tcp::BUFF_SZ];
            assert_eq!(encode_request(&mut codec, buf), 1);
            codec.set_next_request_repeated(true);
            assert_eq!(encode_request(&mut codec, buf), 1);
            assert_eq!(encode_request(&mut codec, buf), 2);
        }

        #[test]
        fn client_rejects_foreign_id() {
            let mut codec = Codec::new(ProtocolType::Tcp);
            let buf = &mut [0; tcp::BUFF_SZ];
            encode_request(&mut codec, buf);
            let response = &[0x00, 0x02, 0x00, 0x00, 0x00, 0x03, 0x01, 0x03, 0x00];
            let err = codec.decode(false, response, &mut []).err().unwrap();
            assert!(matches!(err, Error::NotCorrectResponse(_)));

            let response = &[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x03, 0x00];
            assert!(codec.decode(false, response, &mut []).is_ok());
        }

        #[test]
        fn server_echoes_the_request_id() {
            let mut codec = Codec::new(ProtocolType::Tcp);
            let request = &[0xAB, 0xCD, 0x00, 0x00, 0x00, 0x02, 0x01, 0x07];
            codec.decode(true, request, &mut []).unwrap();
            let buf = &mut [0; tcp::BUFF_SZ];
            let len = codec.encode(true, buf, 1, 0x07, &[0x00]).unwrap();
            assert_eq!(&buf[..len], &[0xAB, 0xCD, 0x00, 0x00, 0x00, 0x03, 0x01, 0x07, 0x00]);
        }
    }

    #[test]
    fn serial_codecs_ignore_repeat_hint() {
        let mut codec = Codec::new(ProtocolType::Rtu);
        codec.set_next_request_repeated(true);
        assert_eq!(codec, Codec::Rtu);
        assert!(!codec.is_length_prefixed());
        assert_eq!(codec.frame_len(&[0; 8]), None);
    }
}
