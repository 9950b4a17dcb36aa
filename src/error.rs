// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{Exception, StatusCode};

/// modbus-port Error
///
/// Every variant maps to exactly one [`StatusCode`], see [`Error::status`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Standard Modbus exception
    #[error("Modbus exception: {0}")]
    Exception(Exception),
    /// Exception response with a non-standard code
    #[error("Returned Modbus-exception with code {0}")]
    ExceptionCode(u8),
    #[error("Empty response")]
    EmptyResponse,
    #[error("Not correct request. {0}")]
    NotCorrectRequest(String),
    #[error("Not correct response. {0}")]
    NotCorrectResponse(String),
    #[error("Write-buffer overflow")]
    WriteBufferOverflow,
    #[error("Read-buffer overflow")]
    ReadBufferOverflow,
    #[error("Failed to open serial port: {0}")]
    SerialOpen(String),
    #[error("Error while writing serial port: {0}")]
    SerialWrite(String),
    #[error("Error while reading serial port: {0}")]
    SerialRead(String),
    #[error("ASCII. Missing colon ':' at frame start")]
    AscMissColon,
    #[error("ASCII. Missing CR LF at frame end")]
    AscMissCrLf,
    #[error("ASCII. Frame contains a non-hex character")]
    AscChar,
    /// Invalid LRC
    #[error("Invalid LRC: expected = 0x{0:0>2X}, actual = 0x{1:0>2X}")]
    Lrc(u8, u8),
    /// Invalid CRC
    #[error("Invalid CRC: expected = 0x{0:0>4X}, actual = 0x{1:0>4X}")]
    Crc(u16, u16),
    #[error("TCP. Error while creating socket: {0}")]
    TcpCreate(String),
    #[error("TCP. Error while connecting: {0}")]
    TcpConnect(String),
    #[error("TCP. Error while writing: {0}")]
    TcpWrite(String),
    #[error("TCP. Error while reading: {0}")]
    TcpRead(String),
    #[error("TCP. Bind error: {0}")]
    TcpBind(String),
    #[error("TCP. Listen error: {0}")]
    TcpListen(String),
    #[error("TCP. Accept error: {0}")]
    TcpAccept(String),
    #[error("TCP. Remote connection closed")]
    TcpDisconnect,
    /// A settings value could not be parsed
    #[error("Invalid value for setting '{key}': {value}")]
    InvalidSetting { key: String, value: String },
}

impl Error {
    /// The stable numeric status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        use Error::*;

        match self {
            Exception(ex) => StatusCode::from_exception_code(*ex as u8),
            ExceptionCode(code) => StatusCode::from_exception_code(*code),
            EmptyResponse => StatusCode::BAD_EMPTY_RESPONSE,
            NotCorrectRequest(_) => StatusCode::BAD_NOT_CORRECT_REQUEST,
            NotCorrectResponse(_) => StatusCode::BAD_NOT_CORRECT_RESPONSE,
            WriteBufferOverflow => StatusCode::BAD_WRITE_BUFFER_OVERFLOW,
            ReadBufferOverflow => StatusCode::BAD_READ_BUFFER_OVERFLOW,
            SerialOpen(_) => StatusCode::BAD_SERIAL_OPEN,
            SerialWrite(_) => StatusCode::BAD_SERIAL_WRITE,
            SerialRead(_) => StatusCode::BAD_SERIAL_READ,
            AscMissColon => StatusCode::BAD_ASC_MISS_COLON,
            AscMissCrLf => StatusCode::BAD_ASC_MISS_CR_LF,
            AscChar => StatusCode::BAD_ASC_CHAR,
            Lrc(_, _) => StatusCode::BAD_LRC,
            Crc(_, _) => StatusCode::BAD_CRC,
            TcpCreate(_) => StatusCode::BAD_TCP_CREATE,
            TcpConnect(_) => StatusCode::BAD_TCP_CONNECT,
            TcpWrite(_) => StatusCode::BAD_TCP_WRITE,
            TcpRead(_) => StatusCode::BAD_TCP_READ,
            TcpBind(_) => StatusCode::BAD_TCP_BIND,
            TcpListen(_) => StatusCode::BAD_TCP_LISTEN,
            TcpAccept(_) => StatusCode::BAD_TCP_ACCEPT,
            TcpDisconnect => StatusCode::BAD_TCP_DISCONNECT,
            InvalidSetting { .. } => StatusCode::BAD,
        }
    }

    /// Build the error for an exception response code.
    #[must_use]
    pub fn from_exception_code(code: u8) -> Self {
        Exception::try_from(code).map_or(Self::ExceptionCode(code), Self::Exception)
    }
}

impl From<Exception> for Error {
    fn from(ex: Exception) -> Self {
        Self::Exception(ex)
    }
}
